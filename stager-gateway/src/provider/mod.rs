//! Object storage providers behind the multipart routes

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

use stager_net::UploadedPart;

mod memory;
mod s3;

pub use memory::MemoryProvider;
pub use s3::S3Provider;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("No such upload: {0}")]
    NoSuchUpload(String),

    #[error("Rejected by storage: {0}")]
    Rejected(String),

    #[error("Part authorization denied: {0}")]
    Denied(String),

    #[error("The {0} provider does not accept parts directly")]
    IntakeUnsupported(&'static str),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Multipart operations the gateway forwards to object storage
#[async_trait]
pub trait StorageProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start a multipart upload; returns the provider's upload id
    async fn create_upload(&self, object_key: &str, content_type: &str) -> ProviderResult<String>;

    /// URL a client may `PUT` one part to until `validity` elapses
    async fn presign_part(
        &self,
        object_key: &str,
        upload_id: &str,
        part_number: u32,
        validity: Duration,
    ) -> ProviderResult<String>;

    /// Commit the upload; `parts` is ascending and contiguous from 1
    async fn complete_upload(
        &self,
        object_key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> ProviderResult<()>;

    async fn abort_upload(&self, object_key: &str, upload_id: &str) -> ProviderResult<()>;

    /// Store a part sent to a URL this gateway signed; returns its ETag
    async fn accept_part(
        &self,
        _upload_id: &str,
        _part_number: u32,
        _query: &str,
        _body: Bytes,
    ) -> ProviderResult<String> {
        Err(ProviderError::IntakeUnsupported(self.name()))
    }
}
