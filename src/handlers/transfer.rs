use axum::{extract::State, response::IntoResponse, Json};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::middleware::AuthenticatedUser;
use crate::services::TransferRequest;
use crate::validation;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferBody {
    pub sender_id: String,
    pub recipient_id: String,
    #[serde(deserialize_with = "crate::ozow::decimal_from_number_or_string")]
    pub amount: BigDecimal,
    #[serde(default = "zero", deserialize_with = "crate::ozow::decimal_from_number_or_string")]
    pub fee: BigDecimal,
    #[serde(default)]
    pub note: Option<String>,
}

fn zero() -> BigDecimal {
    BigDecimal::from(0)
}

pub async fn create_transfer(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<TransferBody>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_user_id("senderId", &body.sender_id)?;
    validation::validate_user_id("recipientId", &body.recipient_id)?;
    validation::validate_positive_amount("amount", &body.amount)?;
    validation::validate_fee(&body.fee)?;
    let note = body
        .note
        .as_deref()
        .map(validation::sanitize_string)
        .filter(|n| !n.is_empty());
    if let Some(note) = &note {
        validation::validate_note(note)?;
    }

    if body.sender_id != user.id {
        return Err(AppError::Forbidden(
            "senderId does not match the signed-in user".to_string(),
        ));
    }

    let tx = state
        .transfers
        .transfer(TransferRequest {
            sender_id: body.sender_id,
            recipient_id: body.recipient_id,
            amount: body.amount,
            fee: body.fee,
            note,
        })
        .await?;

    Ok(Json(json!({ "success": true, "transactionId": tx.id })))
}
