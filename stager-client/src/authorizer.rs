//! Backend control plane seen by the coordinator

use async_trait::async_trait;
use std::collections::BTreeMap;

use stager_core::{ObjectKey, PartAuthorization, PartReceipt, SessionId, UploadSession};

use crate::Result;

/// Identifiers the backend hands out when a session opens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedSession {
    pub object_key: ObjectKey,
    pub session_id: SessionId,
}

/// Opens, authorizes, finalizes and aborts multipart sessions.
///
/// Implementations do not retry; the coordinator owns retry policy.
#[async_trait]
pub trait UploadAuthorizer: Send + Sync {
    async fn open_session(&self, file_name: &str, content_type: &str) -> Result<OpenedSession>;

    /// Authorizations keyed by part number for the requested parts
    async fn authorize_parts(
        &self,
        session: &UploadSession,
        part_numbers: &[u32],
    ) -> Result<BTreeMap<u32, PartAuthorization>>;

    /// Commit the session; `receipts` must be ascending and complete
    async fn finalize(&self, session: &UploadSession, receipts: &[PartReceipt]) -> Result<ObjectKey>;

    async fn abort(&self, session: &UploadSession) -> Result<()>;
}
