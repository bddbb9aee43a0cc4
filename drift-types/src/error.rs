//! Wire-level error types for driftkv.

use thiserror::Error;

/// Errors arising while encoding or decoding wire messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Base64 payload decoding failed
    #[error("invalid payload encoding: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WireError>();
    }

    #[test]
    fn encoding_error_display() {
        let err = crate::Envelope::decode_data("!!!").unwrap_err();
        assert!(err.to_string().starts_with("invalid payload encoding"));
    }
}
