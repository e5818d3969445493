//! Part planning: splits a byte source of known size into fixed-size parts

use std::num::NonZeroU64;

use crate::{CoreError, PartDescriptor, Result};

/// Number of parts `chunk` produces for the given sizes
pub fn part_count(file_size: u64, chunk_size: NonZeroU64) -> u64 {
    file_size.div_ceil(chunk_size.get())
}

/// Partition `[0, file_size)` into parts of `chunk_size` bytes.
///
/// Part numbers start at 1 and are contiguous. Every part but the last is
/// exactly `chunk_size` long; the last holds the remainder. An empty source
/// yields no parts. Pure and deterministic.
pub fn chunk(file_size: u64, chunk_size: NonZeroU64) -> Result<Vec<PartDescriptor>> {
    let count = part_count(file_size, chunk_size);
    if count > u64::from(u32::MAX) {
        return Err(CoreError::TooManyParts {
            parts: count,
            max: u64::from(u32::MAX),
        });
    }

    let step = chunk_size.get();
    let mut parts = Vec::with_capacity(count as usize);
    let mut start = 0u64;
    let mut part_number = 1u32;

    while start < file_size {
        let end = start.saturating_add(step).min(file_size);
        parts.push(PartDescriptor {
            part_number,
            start,
            end,
        });
        start = end;
        part_number += 1;
    }

    Ok(parts)
}
