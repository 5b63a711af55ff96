use crate::payload::PayloadError;
use crate::signature::SignatureError;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("endpoint not found")]
    EndpointNotFound,
    #[error("endpoint already exists")]
    EndpointAlreadyExists,
    #[error("endpoint is not active")]
    EndpointInactive,
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("delivery not found")]
    DeliveryNotFound,
    #[error("delivery is not retryable")]
    DeliveryNotRetryable,
    #[error("dead-letter item not found")]
    DlqNotFound,
    #[error("store error: {0}")]
    Store(String),
    #[error("invalid system settings: {0}")]
    InvalidSettings(String),
    #[error("signature verification failed: {0}")]
    Verification(#[from] SignatureError),
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] PayloadError),
}

impl From<crate::types::StoreError> for RelayError {
    fn from(err: crate::types::StoreError) -> Self {
        RelayError::Store(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_error_wraps_signature_error() {
        let err: RelayError = SignatureError::MissingHeader.into();
        assert!(matches!(err, RelayError::Verification(SignatureError::MissingHeader)));
    }

    #[test]
    fn invalid_endpoint_carries_reason() {
        let err = RelayError::InvalidEndpoint("destUrl must be https".to_string());
        assert_eq!(err.to_string(), "invalid endpoint: destUrl must be https");
    }
}
