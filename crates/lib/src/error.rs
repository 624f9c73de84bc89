//! Gateway error taxonomy and its mapping to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::validate::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Required secret or setting missing/malformed. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Caller payload violates a field contract.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Request could not be read at all (malformed JSON, missing file part).
    #[error("{0}")]
    BadRequest(String),

    /// Assertion signing or token exchange failed.
    #[error("failed to obtain access token: {0}")]
    Auth(String),

    /// Upload exceeded the configured body limit.
    #[error("upload too large: {0}")]
    PayloadTooLarge(String),

    /// Upload or download call to the attachment API failed.
    #[error("attachment transfer failed: {0}")]
    Transfer(String),

    /// Unknown message type, or the attachment API does not know the file.
    #[error("not found: {0}")]
    NotFound(String),

    /// The messaging API rejected the forwarded payload.
    #[error("message delivery failed: {0}")]
    Upstream(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) | GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Configuration(_)
            | GatewayError::Auth(_)
            | GatewayError::Transfer(_)
            | GatewayError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::warn!("request failed: {}", self);
        } else {
            log::debug!("request rejected: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
