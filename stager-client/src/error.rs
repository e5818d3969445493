//! Client error types

use std::time::Duration;
use thiserror::Error;

use stager_core::CoreError;

/// Transport-level failure talking to the backend or a part target
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Network-level failures and overloaded/unavailable responses
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Connection(_) | ClientError::Timeout(_) | ClientError::Io(_) => true,
            ClientError::Http { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// The part target refused the token (expired or revoked presigned URL)
    pub fn is_authorization_rejected(&self) -> bool {
        matches!(self, ClientError::Http { status: 403, .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<hyper_util::client::legacy::Error> for ClientError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        if err.is_connect() {
            ClientError::Connection(format!("connect: {}", err))
        } else {
            ClientError::Connection(err.to_string())
        }
    }
}

impl From<hyper::Error> for ClientError {
    fn from(err: hyper::Error) -> Self {
        ClientError::Connection(err.to_string())
    }
}

impl From<hyper::http::Error> for ClientError {
    fn from(err: hyper::http::Error) -> Self {
        ClientError::Request(err.to_string())
    }
}

/// Why an upload did not complete. One variant per failure kind.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Nothing to upload: the file is empty")]
    EmptySource,

    #[error("Could not start the upload: {0}")]
    SessionOpen(#[source] ClientError),

    #[error("Could not authorize parts: {0}")]
    Authorization(#[source] ClientError),

    #[error("Part {part_number} failed: {cause}")]
    Transfer {
        part_number: u32,
        #[source]
        cause: ClientError,
    },

    #[error("Could not read part {part_number} from the file: {cause}")]
    Source {
        part_number: u32,
        #[source]
        cause: std::io::Error,
    },

    #[error("Could not finalize the upload: {0}")]
    Finalize(#[source] ClientError),

    #[error("Could not abort the upload: {0}")]
    Abort(#[source] ClientError),

    #[error("Upload cancelled")]
    Cancelled,

    #[error("Upload contract violated: {0}")]
    Contract(#[from] CoreError),

    #[error("Transfer worker failed: {0}")]
    Worker(String),
}

impl UploadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled)
    }

    /// Part the failure is attributed to, if any
    pub fn part_number(&self) -> Option<u32> {
        match self {
            UploadError::Transfer { part_number, .. } | UploadError::Source { part_number, .. } => {
                Some(*part_number)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ClientError::Connection("reset".to_string()).is_transient());
        assert!(ClientError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ClientError::Http { status: 503, body: String::new() }.is_transient());
        assert!(ClientError::Http { status: 429, body: String::new() }.is_transient());

        assert!(!ClientError::Http { status: 400, body: String::new() }.is_transient());
        assert!(!ClientError::Http { status: 403, body: String::new() }.is_transient());
        assert!(!ClientError::InvalidResponse("no etag".to_string()).is_transient());
    }

    #[test]
    fn test_upload_error_messages_name_the_part() {
        let err = UploadError::Transfer {
            part_number: 2,
            cause: ClientError::Http { status: 500, body: "boom".to_string() },
        };
        assert_eq!(err.to_string(), "Part 2 failed: HTTP 500: boom");
        assert_eq!(err.part_number(), Some(2));
    }
}
