//! Property-based tests for part planning and receipt ordering

use proptest::prelude::*;
use std::num::NonZeroU64;
use stager_core::*;

proptest! {
    #[test]
    fn props_parts_exactly_cover_the_source(
        file_size in 0u64..50_000_000,
        chunk_size in 1u64..5_000_000,
    ) {
        let parts = chunk(file_size, NonZeroU64::new(chunk_size).unwrap()).unwrap();

        // Contiguous, non-overlapping, starting at 0 and ending at file_size
        let mut cursor = 0u64;
        for (i, part) in parts.iter().enumerate() {
            prop_assert_eq!(part.part_number, i as u32 + 1);
            prop_assert_eq!(part.start, cursor);
            prop_assert!(part.end > part.start);
            cursor = part.end;
        }
        prop_assert_eq!(cursor, file_size);
        prop_assert_eq!(parts.is_empty(), file_size == 0);
        prop_assert_eq!(parts.len() as u64, part_count(file_size, NonZeroU64::new(chunk_size).unwrap()));
    }

    #[test]
    fn props_only_the_last_part_may_be_short(
        file_size in 1u64..50_000_000,
        chunk_size in 1u64..5_000_000,
    ) {
        let parts = chunk(file_size, NonZeroU64::new(chunk_size).unwrap()).unwrap();
        let (last, rest) = parts.split_last().unwrap();

        for part in rest {
            prop_assert_eq!(part.len(), chunk_size);
        }
        prop_assert!(last.len() > 0 && last.len() <= chunk_size);
    }

    #[test]
    fn props_receipts_come_out_sorted_regardless_of_arrival(
        order in Just((1u32..=40).collect::<Vec<_>>()).prop_shuffle()
    ) {
        let mut set = ReceiptSet::new(40);
        for n in &order {
            set.record(PartReceipt::new(*n, format!("tag-{}", n))).unwrap();
        }

        let ordered = set.into_ordered().unwrap();
        let numbers: Vec<u32> = ordered.iter().map(|r| r.part_number).collect();
        prop_assert_eq!(numbers, (1u32..=40).collect::<Vec<_>>());
        prop_assert!(validate_part_sequence(ordered.iter().map(|r| r.part_number)).is_ok());
    }

    #[test]
    fn props_any_gap_blocks_finalization(
        total in 2u32..60,
        dropped in any::<prop::sample::Index>(),
    ) {
        let skip = dropped.index(total as usize) as u32 + 1;
        let mut set = ReceiptSet::new(total);
        for n in (1..=total).filter(|n| *n != skip) {
            set.record(PartReceipt::new(n, "tag")).unwrap();
        }

        prop_assert_eq!(
            set.into_ordered().unwrap_err(),
            CoreError::IncompleteReceipts { missing: vec![skip] }
        );
    }
}

#[cfg(test)]
mod plan_tests {
    use super::*;

    #[test]
    fn test_fitted_plan_respects_part_ceiling() {
        let preferred = NonZeroU64::new(limits::DEFAULT_CHUNK_SIZE).unwrap();
        let fitted = fit_chunk_size(limits::MAX_SIZE_BYTES, preferred);
        let parts = chunk(limits::MAX_SIZE_BYTES, fitted).unwrap();

        assert!(parts.len() as u64 <= limits::MAX_PARTS);
        assert_eq!(parts.last().unwrap().end, limits::MAX_SIZE_BYTES);
    }
}
