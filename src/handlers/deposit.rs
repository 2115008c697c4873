use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use bigdecimal::BigDecimal;
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::AuthenticatedUser;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositBody {
    #[serde(deserialize_with = "crate::ozow::decimal_from_number_or_string")]
    pub amount: BigDecimal,
    #[serde(default, deserialize_with = "optional_decimal")]
    pub fee: Option<BigDecimal>,
    #[serde(default)]
    pub bank_reference: Option<String>,
    #[serde(default)]
    pub is_test: bool,
    /// Ask the gateway for a hosted short link instead of a signed redirect.
    #[serde(default)]
    pub generate_url: bool,
}

fn optional_decimal<'de, D>(deserializer: D) -> Result<Option<BigDecimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    crate::ozow::decimal_from_number_or_string(deserializer).map(Some)
}

pub async fn create_deposit(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<DepositBody>,
) -> Result<impl IntoResponse, AppError> {
    let initiation = state
        .deposits
        .initiate(
            &user.id,
            body.amount,
            body.fee.unwrap_or_else(|| BigDecimal::from(0)),
            body.bank_reference,
            body.is_test,
            body.generate_url,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(initiation)))
}
