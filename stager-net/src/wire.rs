//! JSON request and response bodies of the multipart upload routes

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

use stager_core::limits::MAX_PARTS;
use stager_core::{PartAuthorization, PartReceipt};

use crate::protocol::{require, WireError, OCTET_STREAM, PART_URL_VALIDITY};

fn default_content_type() -> String {
    OCTET_STREAM.to_string()
}

/// `POST begin-upload`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginUploadRequest {
    pub file_name: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

impl BeginUploadRequest {
    pub fn validate(&self) -> Result<(), WireError> {
        require("fileName", &self.file_name)?;
        if self.file_name.contains('/') || self.file_name.chars().any(|c| c.is_control()) {
            return Err(WireError::InvalidField {
                field: "fileName",
                reason: "must be a plain file name".to_string(),
            });
        }
        require("contentType", &self.content_type)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginUploadResponse {
    pub upload_id: String,
    pub object_key: String,
}

/// `POST get-presigned-urls`.
///
/// `partNumbers` is preferred; `numParts` asks for `1..=numParts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignRequest {
    pub object_key: String,
    pub upload_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub part_numbers: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_parts: Option<u32>,
}

impl PresignRequest {
    pub fn for_parts(object_key: &str, upload_id: &str, part_numbers: Vec<u32>) -> Self {
        PresignRequest {
            object_key: object_key.to_string(),
            upload_id: upload_id.to_string(),
            part_numbers,
            num_parts: None,
        }
    }

    /// Validated, deduplicated, ascending part numbers requested
    pub fn requested_parts(&self) -> Result<Vec<u32>, WireError> {
        require("objectKey", &self.object_key)?;
        require("uploadId", &self.upload_id)?;

        let mut parts = if !self.part_numbers.is_empty() {
            self.part_numbers.clone()
        } else {
            match self.num_parts {
                Some(n) if n > 0 => (1..=n).collect(),
                _ => return Err(WireError::MissingField("partNumbers")),
            }
        };

        parts.sort_unstable();
        parts.dedup();

        if let Some(bad) = parts.iter().find(|n| **n == 0 || u64::from(**n) > MAX_PARTS) {
            return Err(WireError::InvalidField {
                field: "partNumbers",
                reason: format!("part number {} outside 1..={}", bad, MAX_PARTS),
            });
        }

        Ok(parts)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUrl {
    pub part_number: u32,
    pub signed_url: String,
    /// Seconds until the URL expires; absent means the protocol default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

impl PresignedUrl {
    /// Turn into an authorization whose validity window starts at `issued_at`
    pub fn into_authorization(self, issued_at: SystemTime) -> PartAuthorization {
        let validity = self
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(PART_URL_VALIDITY);
        PartAuthorization::with_expiry(self.part_number, self.signed_url, issued_at + validity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignResponse {
    pub upload_id: String,
    pub object_key: String,
    pub presigned_urls: Vec<PresignedUrl>,
}

/// One completed part in storage-provider casing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedPart {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
}

impl From<&PartReceipt> for UploadedPart {
    fn from(receipt: &PartReceipt) -> Self {
        UploadedPart {
            part_number: receipt.part_number,
            etag: receipt.integrity_tag.clone(),
        }
    }
}

impl From<UploadedPart> for PartReceipt {
    fn from(part: UploadedPart) -> Self {
        PartReceipt::new(part.part_number, part.etag)
    }
}

/// `POST complete-upload`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    pub object_key: String,
    pub upload_id: String,
    pub uploaded_parts: Vec<UploadedPart>,
}

impl CompleteUploadRequest {
    pub fn validate(&self) -> Result<(), WireError> {
        require("objectKey", &self.object_key)?;
        require("uploadId", &self.upload_id)?;
        if self.uploaded_parts.is_empty() {
            return Err(WireError::MissingField("uploadedParts"));
        }
        if let Some(part) = self.uploaded_parts.iter().find(|p| p.etag.is_empty()) {
            return Err(WireError::InvalidField {
                field: "uploadedParts",
                reason: format!("part {} has no ETag", part.part_number),
            });
        }
        stager_core::validate_part_sequence(self.uploaded_parts.iter().map(|p| p.part_number))
            .map_err(|e| WireError::InvalidField {
                field: "uploadedParts",
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadResponse {
    pub object_key: String,
}

/// `DELETE abort-upload`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortUploadRequest {
    pub object_key: String,
    pub upload_id: String,
}

impl AbortUploadRequest {
    pub fn validate(&self) -> Result<(), WireError> {
        require("objectKey", &self.object_key)?;
        require("uploadId", &self.upload_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbortUploadResponse {
    pub success: String,
}

/// Body of every non-2xx gateway response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Parse a JSON control body, enforcing the size limit first
pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, WireError> {
    crate::protocol::check_body_size(bytes.len())?;
    Ok(serde_json::from_slice(bytes)?)
}
