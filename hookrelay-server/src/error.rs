use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hookrelay_core::error::RelayError;
use hookrelay_core::payload::PayloadError;
use hookrelay_core::signature::SignatureError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Relay(#[from] RelayError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Missing Bearer token")]
    MissingToken,

    #[error("Invalid or expired token")]
    InvalidToken,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Relay(e) => match e {
                RelayError::EndpointNotFound
                | RelayError::DeliveryNotFound
                | RelayError::DlqNotFound
                | RelayError::EndpointInactive => (StatusCode::NOT_FOUND, e.to_string()),
                RelayError::EndpointAlreadyExists => (StatusCode::CONFLICT, e.to_string()),
                RelayError::DeliveryNotRetryable => (StatusCode::BAD_REQUEST, e.to_string()),
                RelayError::InvalidEndpoint(_) => (StatusCode::BAD_REQUEST, e.to_string()),
                RelayError::Verification(sig_err) => match sig_err {
                    SignatureError::MissingSecret => {
                        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                    }
                    _ => (StatusCode::UNAUTHORIZED, e.to_string()),
                },
                RelayError::InvalidPayload(payload_err) => match payload_err {
                    PayloadError::TooLarge => (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()),
                    PayloadError::Empty | PayloadError::ContentLengthMismatch => {
                        (StatusCode::BAD_REQUEST, e.to_string())
                    }
                },
                RelayError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                RelayError::InvalidSettings(_) => (StatusCode::BAD_REQUEST, e.to_string()),
            },
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            ApiError::MissingToken => {
                (StatusCode::UNAUTHORIZED, "Missing Bearer token".to_string())
            }
            ApiError::InvalidToken => {
                (StatusCode::UNAUTHORIZED, "Invalid or expired token".to_string())
            }
        };

        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}
