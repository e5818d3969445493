//! Error types for stager-core

use thiserror::Error;

use crate::limits::ByteSize;
use crate::state::UploadState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid object key: {0}")]
    InvalidObjectKey(String),

    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("Upload plan has no parts")]
    EmptyPlan,

    #[error("Too many parts: {parts} (max: {max})")]
    TooManyParts { parts: u64, max: u64 },

    #[error("Duplicate receipt for part {0}")]
    DuplicateReceipt(u32),

    #[error("Unexpected part {part_number} (session has {total_parts} parts)")]
    UnexpectedPart { part_number: u32, total_parts: u32 },

    #[error("Parts out of order: {next} follows {previous}")]
    UnorderedParts { previous: u32, next: u32 },

    #[error("Incomplete receipts: missing parts {missing:?}")]
    IncompleteReceipts { missing: Vec<u32> },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: UploadState, to: UploadState },

    #[error("Only .zip files are supported: {0}")]
    UnsupportedExtension(String),

    #[error("File of {size} exceeds the {limit} limit")]
    FileTooLarge { size: ByteSize, limit: ByteSize },
}
