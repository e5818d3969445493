//! Core data types for stager

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Range, RangeInclusive};
use std::time::{Duration, SystemTime};

use crate::{CoreError, Result};

/// Key identifying the remote object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Create a new object key with validation
    pub fn new(key: &str) -> Result<Self> {
        if key.is_empty() {
            return Err(CoreError::InvalidObjectKey("empty key".to_string()));
        }

        if key.chars().any(|c| c.is_control()) {
            return Err(CoreError::InvalidObjectKey(
                "control characters not allowed".to_string(),
            ));
        }

        Ok(ObjectKey(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque upload session identifier issued by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: &str) -> Result<Self> {
        if id.trim().is_empty() {
            return Err(CoreError::InvalidSessionId("empty id".to_string()));
        }
        Ok(SessionId(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend-tracked context binding a set of parts to one eventual object.
///
/// Immutable once opened; the coordinator that opened it owns it until the
/// session reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    object_key: ObjectKey,
    session_id: SessionId,
    total_parts: u32,
}

impl UploadSession {
    pub fn new(object_key: ObjectKey, session_id: SessionId, total_parts: u32) -> Result<Self> {
        if total_parts == 0 {
            return Err(CoreError::EmptyPlan);
        }

        Ok(UploadSession {
            object_key,
            session_id,
            total_parts,
        })
    }

    pub fn object_key(&self) -> &ObjectKey {
        &self.object_key
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn total_parts(&self) -> u32 {
        self.total_parts
    }

    /// Every part number this session expects, ascending
    pub fn part_numbers(&self) -> RangeInclusive<u32> {
        1..=self.total_parts
    }
}

/// Contiguous byte range of the source uploaded as one part (end exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartDescriptor {
    pub part_number: u32,
    pub start: u64,
    pub end: u64,
}

impl PartDescriptor {
    /// Number of bytes in this part
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<u64> {
        self.start..self.end
    }
}

/// Short-lived capability permitting one upload of a single part.
///
/// The token is usually a presigned URL, so `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct PartAuthorization {
    pub part_number: u32,
    pub token: String,
    pub expires_at: SystemTime,
}

impl PartAuthorization {
    /// Authorization issued now and valid for `validity`
    pub fn new(part_number: u32, token: impl Into<String>, validity: Duration) -> Self {
        PartAuthorization {
            part_number,
            token: token.into(),
            expires_at: SystemTime::now() + validity,
        }
    }

    pub fn with_expiry(part_number: u32, token: impl Into<String>, expires_at: SystemTime) -> Self {
        PartAuthorization {
            part_number,
            token: token.into(),
            expires_at,
        }
    }

    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        now < self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        !self.is_valid_at(SystemTime::now())
    }
}

impl fmt::Debug for PartAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartAuthorization")
            .field("part_number", &self.part_number)
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Proof of a successful part transfer, required to finalize.
///
/// `integrity_tag` is kept exactly as the backend returned it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartReceipt {
    pub part_number: u32,
    pub integrity_tag: String,
}

impl PartReceipt {
    pub fn new(part_number: u32, integrity_tag: impl Into<String>) -> Self {
        PartReceipt {
            part_number,
            integrity_tag: integrity_tag.into(),
        }
    }
}
