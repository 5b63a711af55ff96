#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("request body is empty")]
    Empty,
    #[error("request body exceeds the configured size limit")]
    TooLarge,
    #[error("content-length header disagrees with received bytes")]
    ContentLengthMismatch,
}

/// Validates a raw inbound body against the endpoint's size policy. JSON
/// well-formedness is deliberately not checked here — webhooks may
/// legitimately send form-encoded or XML bodies.
pub fn validate_payload(
    body: &[u8],
    content_length: Option<usize>,
    max_size_bytes: usize,
) -> Result<(), PayloadError> {
    if body.is_empty() {
        return Err(PayloadError::Empty);
    }
    if body.len() > max_size_bytes {
        return Err(PayloadError::TooLarge);
    }
    if let Some(declared) = content_length {
        if declared != body.len() {
            return Err(PayloadError::ContentLengthMismatch);
        }
    }
    Ok(())
}

pub fn mb_to_bytes(mb: u64) -> usize {
    (mb as usize).saturating_mul(1024 * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_rejected() {
        assert_eq!(validate_payload(&[], None, 1024), Err(PayloadError::Empty));
    }

    #[test]
    fn body_within_limit_is_accepted() {
        let body = vec![0u8; 100];
        assert_eq!(validate_payload(&body, Some(100), 1024), Ok(()));
    }

    #[test]
    fn oversize_body_is_rejected() {
        let body = vec![0u8; 3 * 1024 * 1024];
        assert_eq!(
            validate_payload(&body, None, mb_to_bytes(2)),
            Err(PayloadError::TooLarge)
        );
    }

    #[test]
    fn content_length_mismatch_is_rejected() {
        let body = vec![0u8; 10];
        assert_eq!(
            validate_payload(&body, Some(11), 1024),
            Err(PayloadError::ContentLengthMismatch)
        );
    }

    #[test]
    fn mb_to_bytes_conversion() {
        assert_eq!(mb_to_bytes(2), 2 * 1024 * 1024);
    }
}
