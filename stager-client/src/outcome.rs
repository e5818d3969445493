//! Terminal result of an upload

use stager_core::{ObjectKey, UploadState};

use crate::UploadError;

/// Exactly one of these is produced per `start_upload` call
#[derive(Debug)]
pub enum UploadOutcome {
    /// Every part was finalized under this key
    Completed(ObjectKey),
    /// A session was opened and then abandoned
    Aborted(UploadError),
    /// No session was ever opened
    Failed(UploadError),
}

impl UploadOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, UploadOutcome::Completed(_))
    }

    pub fn object_key(&self) -> Option<&ObjectKey> {
        match self {
            UploadOutcome::Completed(key) => Some(key),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<&UploadError> {
        match self {
            UploadOutcome::Completed(_) => None,
            UploadOutcome::Aborted(reason) | UploadOutcome::Failed(reason) => Some(reason),
        }
    }

    pub fn state(&self) -> UploadState {
        match self {
            UploadOutcome::Completed(_) => UploadState::Completed,
            UploadOutcome::Aborted(_) => UploadState::Aborted,
            UploadOutcome::Failed(_) => UploadState::Failed,
        }
    }

    /// One line for the person who started the upload
    pub fn message(&self) -> String {
        match self {
            UploadOutcome::Completed(key) => format!("Upload complete: {}", key),
            UploadOutcome::Aborted(UploadError::Cancelled) => {
                "Upload cancelled; the partial upload was discarded".to_string()
            }
            UploadOutcome::Aborted(reason) => {
                format!("Upload failed and was discarded: {}", reason)
            }
            UploadOutcome::Failed(reason) => format!("Upload failed: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientError;

    #[test]
    fn test_messages() {
        let done = UploadOutcome::Completed(ObjectKey::new("reel.zip-01HZX").unwrap());
        assert_eq!(done.message(), "Upload complete: reel.zip-01HZX");
        assert_eq!(done.state(), UploadState::Completed);
        assert!(done.reason().is_none());

        let aborted = UploadOutcome::Aborted(UploadError::Transfer {
            part_number: 2,
            cause: ClientError::Http { status: 400, body: "bad digest".to_string() },
        });
        assert_eq!(
            aborted.message(),
            "Upload failed and was discarded: Part 2 failed: HTTP 400: bad digest"
        );

        let failed = UploadOutcome::Failed(UploadError::EmptySource);
        assert_eq!(failed.message(), "Upload failed: Nothing to upload: the file is empty");
        assert_eq!(failed.state(), UploadState::Failed);
    }
}
