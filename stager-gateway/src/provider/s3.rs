//! Amazon S3 multipart uploads with presigned part URLs

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use std::time::Duration;
use tracing::{debug, info};

use stager_net::UploadedPart;

use super::{ProviderError, ProviderResult, StorageProvider};

/// Forwards multipart operations to one S3 bucket
#[derive(Clone, Debug)]
pub struct S3Provider {
    client: Client,
    bucket: String,
}

impl S3Provider {
    /// Load credentials from the environment and target `bucket` in `region`
    pub async fn from_env(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        let region = region.into();
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .load()
            .await;
        let bucket = bucket.into();
        info!("Using S3 bucket {} in {}", bucket, region);
        S3Provider::new(Client::new(&config), bucket)
    }

    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        S3Provider {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn classify<E, R>(operation: &str, err: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let detail = format!("{}: {}", operation, DisplayErrorContext(&err));
    match err.code() {
        Some("NoSuchUpload") => ProviderError::NoSuchUpload(detail),
        Some("InvalidPart") | Some("InvalidPartOrder") | Some("EntityTooSmall") => {
            ProviderError::Rejected(detail)
        }
        _ => ProviderError::Backend(detail),
    }
}

fn to_i32(part_number: u32) -> ProviderResult<i32> {
    i32::try_from(part_number)
        .map_err(|_| ProviderError::Rejected(format!("part number {} out of range", part_number)))
}

#[async_trait]
impl StorageProvider for S3Provider {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn create_upload(&self, object_key: &str, content_type: &str) -> ProviderResult<String> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(object_key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| classify("CreateMultipartUpload", e))?;

        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Backend("CreateMultipartUpload returned no upload id".to_string()))
    }

    async fn presign_part(
        &self,
        object_key: &str,
        upload_id: &str,
        part_number: u32,
        validity: Duration,
    ) -> ProviderResult<String> {
        let presigning = PresigningConfig::expires_in(validity)
            .map_err(|e| ProviderError::Backend(format!("invalid presign window: {}", e)))?;
        let request = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(object_key)
            .upload_id(upload_id)
            .part_number(to_i32(part_number)?)
            .presigned(presigning)
            .await
            .map_err(|e| classify("UploadPart presign", e))?;

        debug!("Presigned part {} of {}", part_number, object_key);
        Ok(request.uri().to_string())
    }

    async fn complete_upload(
        &self,
        object_key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> ProviderResult<()> {
        let mut completed = Vec::with_capacity(parts.len());
        for part in parts {
            completed.push(
                CompletedPart::builder()
                    .part_number(to_i32(part.part_number)?)
                    .e_tag(&part.etag)
                    .build(),
            );
        }

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(object_key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| classify("CompleteMultipartUpload", e))?;
        Ok(())
    }

    async fn abort_upload(&self, object_key: &str, upload_id: &str) -> ProviderResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(object_key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| classify("AbortMultipartUpload", e))?;
        Ok(())
    }
}
