use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use crate::utils::constant_time_eq;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_USER_HEADER: &str = "X-Session-User";
pub const SESSION_SIGNATURE_HEADER: &str = "X-Session-Signature";

/// Signed-in actor, established by the session layer in front of this
/// service.
///
/// `X-Session-User` carries `<id>:<email>`; `X-Session-Signature` is the
/// hex HMAC-SHA256 of that value under the session secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: String,
}

impl AuthenticatedUser {
    fn verify_signature(secret: &str, value: &str, signature_header: &str) -> Result<(), AuthError> {
        let expected_signature =
            hex::decode(signature_header.trim()).map_err(|_| AuthError::InvalidSignatureFormat)?;

        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidSecret)?;
        mac.update(value.as_bytes());

        mac.verify_slice(&expected_signature)
            .map_err(|_| AuthError::SignatureMismatch)
    }

    fn parse(value: &str) -> Result<Self, AuthError> {
        let (id, email) = value.split_once(':').ok_or(AuthError::MalformedIdentity)?;
        let (id, email) = (id.trim(), email.trim());
        if id.is_empty() || !email.contains('@') {
            return Err(AuthError::MalformedIdentity);
        }
        Ok(Self {
            id: id.to_string(),
            email: email.to_string(),
        })
    }
}

/// Signature for an `X-Session-User` value. Used by the session layer and by
/// tests.
pub fn sign_session(secret: &str, value: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(value.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(SESSION_USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingIdentity)?;

        let signature = parts
            .headers
            .get(SESSION_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingSignature)?;

        Self::verify_signature(&state.config.session_secret, value, signature)?;
        Self::parse(value)
    }
}

/// Guards admin routes with `Authorization: Bearer <ADMIN_API_KEY>`.
pub async fn admin_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AuthError::MissingIdentity)?;

    if !constant_time_eq(token.as_bytes(), state.config.admin_api_key.as_bytes()) {
        return Err(AuthError::SignatureMismatch);
    }

    Ok(next.run(req).await)
}

#[derive(Debug)]
pub enum AuthError {
    MissingIdentity,
    MissingSignature,
    MalformedIdentity,
    InvalidSignatureFormat,
    InvalidSecret,
    SignatureMismatch,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingIdentity => (StatusCode::UNAUTHORIZED, "Not authenticated"),
            AuthError::MissingSignature => {
                (StatusCode::UNAUTHORIZED, "Missing X-Session-Signature header")
            }
            AuthError::MalformedIdentity => (StatusCode::UNAUTHORIZED, "Malformed session identity"),
            AuthError::InvalidSignatureFormat => (StatusCode::UNAUTHORIZED, "Invalid signature format"),
            AuthError::InvalidSecret => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Invalid session secret configuration")
            }
            AuthError::SignatureMismatch => (StatusCode::UNAUTHORIZED, "Signature verification failed"),
        };

        tracing::warn!("Authentication failed: {:?}", self);
        (
            status,
            Json(json!({ "error": message, "status": status.as_u16() })),
        )
            .into_response()
    }
}
