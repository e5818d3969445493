//! File acceptance rules and size helpers

use std::fmt;
use std::num::NonZeroU64;

use crate::{CoreError, Result};

const MIB: u64 = 1024 * 1024;

/// Largest archive accepted for staging (500 GB)
pub const MAX_SIZE_BYTES: u64 = 500 * 1024 * MIB;

/// Default part size (10 MB)
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * MIB;

/// Backend ceiling on the number of parts in one session
pub const MAX_PARTS: u64 = 10_000;

pub const ACCEPTED_EXTENSIONS: &[&str] = &[".zip"];

/// Byte count rendered as MB below 1024 MB, GB above
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(pub u64);

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mb = self.0 as f64 / MIB as f64;
        if mb < 1024.0 {
            write!(f, "{:.2} MB", mb)
        } else {
            write!(f, "{:.2} GB", mb / 1024.0)
        }
    }
}

pub fn format_size(bytes: u64) -> String {
    ByteSize(bytes).to_string()
}

/// Check that a file may be staged: accepted extension and within size limit
pub fn check_file(name: &str, size: u64) -> Result<()> {
    let lower_name = name.to_lowercase();
    if !ACCEPTED_EXTENSIONS.iter().any(|ext| lower_name.ends_with(ext)) {
        return Err(CoreError::UnsupportedExtension(name.to_string()));
    }

    if size > MAX_SIZE_BYTES {
        return Err(CoreError::FileTooLarge {
            size: ByteSize(size),
            limit: ByteSize(MAX_SIZE_BYTES),
        });
    }

    Ok(())
}

/// Smallest chunk size `>= preferred` that keeps the plan within `MAX_PARTS`
pub fn fit_chunk_size(file_size: u64, preferred: NonZeroU64) -> NonZeroU64 {
    let required = file_size.div_ceil(MAX_PARTS);
    NonZeroU64::new(required.max(preferred.get())).unwrap_or(preferred)
}
