//! Protocol definitions shared by the upload client and the gateway

use std::time::Duration;

/// How long a presigned part URL stays valid (30 minutes)
pub const PART_URL_VALIDITY: Duration = Duration::from_secs(60 * 30);

/// Maximum size of a JSON control body (prevents DoS)
pub const MAX_CONTROL_BODY_SIZE: usize = 1024 * 1024; // 1MB

/// Content type used for part bodies
pub const OCTET_STREAM: &str = "application/octet-stream";

pub const APPLICATION_JSON: &str = "application/json";

/// Response header carrying the integrity tag of a stored part
pub const ETAG_HEADER: &str = "etag";

/// Route paths
pub mod routes {
    pub const BEGIN_UPLOAD: &str = "/api/multi-part-upload/begin-upload";
    pub const PRESIGNED_URLS: &str = "/api/multi-part-upload/get-presigned-urls";
    pub const COMPLETE_UPLOAD: &str = "/api/multi-part-upload/complete-upload";
    pub const ABORT_UPLOAD: &str = "/api/multi-part-upload/abort-upload";
    pub const HEALTH: &str = "/health";

    /// Prefix of loopback part intake paths: `/parts/{uploadId}/{partNumber}`
    pub const PARTS_PREFIX: &str = "/parts/";
}

/// Protocol error types
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Body too large: {0} bytes (max: {1})")]
    BodyTooLarge(usize, usize),

    #[error("Malformed body: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Reject control bodies above `MAX_CONTROL_BODY_SIZE`
pub fn check_body_size(len: usize) -> Result<(), WireError> {
    if len > MAX_CONTROL_BODY_SIZE {
        return Err(WireError::BodyTooLarge(len, MAX_CONTROL_BODY_SIZE));
    }
    Ok(())
}

pub(crate) fn require(field: &'static str, value: &str) -> Result<(), WireError> {
    if value.trim().is_empty() {
        return Err(WireError::MissingField(field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_size_limit() {
        assert!(check_body_size(512).is_ok());
        assert!(check_body_size(MAX_CONTROL_BODY_SIZE).is_ok());
        assert!(matches!(
            check_body_size(MAX_CONTROL_BODY_SIZE + 1),
            Err(WireError::BodyTooLarge(_, _))
        ));
    }

    #[test]
    fn test_validity_window_is_thirty_minutes() {
        assert_eq!(PART_URL_VALIDITY.as_secs(), 1800);
    }
}
