//! Core data model for staging large archives as multipart uploads

pub mod chunker;
pub mod error;
pub mod limits;
pub mod receipts;
pub mod state;
pub mod types;

pub use chunker::{chunk, part_count};
pub use error::*;
pub use limits::{check_file, fit_chunk_size, format_size, ByteSize};
pub use receipts::{validate_part_sequence, ReceiptSet};
pub use state::{StateMachine, UploadState};
pub use types::*;

/// Result type alias for stager-core operations
pub type Result<T> = std::result::Result<T, CoreError>;
