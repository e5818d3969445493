//! Receipt bookkeeping for one upload session

use std::collections::BTreeMap;

use crate::{CoreError, PartReceipt, Result};

/// Receipts collected for a session, at most one per part number.
///
/// The only way to obtain the list handed to finalize is `into_ordered`,
/// which refuses anything but the exact set `{1..total_parts}`.
#[derive(Debug, Clone)]
pub struct ReceiptSet {
    total_parts: u32,
    receipts: BTreeMap<u32, PartReceipt>,
}

impl ReceiptSet {
    pub fn new(total_parts: u32) -> Self {
        ReceiptSet {
            total_parts,
            receipts: BTreeMap::new(),
        }
    }

    /// Record a receipt. Duplicates are rejected, never overwritten.
    pub fn record(&mut self, receipt: PartReceipt) -> Result<()> {
        let part_number = receipt.part_number;
        if part_number == 0 || part_number > self.total_parts {
            return Err(CoreError::UnexpectedPart {
                part_number,
                total_parts: self.total_parts,
            });
        }

        if self.receipts.contains_key(&part_number) {
            return Err(CoreError::DuplicateReceipt(part_number));
        }

        self.receipts.insert(part_number, receipt);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }

    pub fn total_parts(&self) -> u32 {
        self.total_parts
    }

    pub fn contains(&self, part_number: u32) -> bool {
        self.receipts.contains_key(&part_number)
    }

    pub fn is_complete(&self) -> bool {
        self.receipts.len() == self.total_parts as usize
    }

    /// Part numbers still without a receipt
    pub fn missing(&self) -> Vec<u32> {
        (1..=self.total_parts)
            .filter(|n| !self.receipts.contains_key(n))
            .collect()
    }

    /// Receipts sorted ascending by part number, only when complete
    pub fn into_ordered(self) -> Result<Vec<PartReceipt>> {
        if self.total_parts == 0 {
            return Err(CoreError::EmptyPlan);
        }

        if !self.is_complete() {
            return Err(CoreError::IncompleteReceipts {
                missing: self.missing(),
            });
        }

        Ok(self.receipts.into_values().collect())
    }
}

/// Check that `part_numbers` is exactly `1, 2, ..., n` for some `n >= 1`
pub fn validate_part_sequence(part_numbers: impl IntoIterator<Item = u32>) -> Result<u32> {
    let mut previous = 0u32;

    for next in part_numbers {
        if next == previous {
            return Err(CoreError::DuplicateReceipt(next));
        }
        if next < previous {
            return Err(CoreError::UnorderedParts { previous, next });
        }
        if next != previous + 1 {
            return Err(CoreError::IncompleteReceipts {
                missing: (previous + 1..next).collect(),
            });
        }
        previous = next;
    }

    if previous == 0 {
        return Err(CoreError::EmptyPlan);
    }

    Ok(previous)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(n: u32) -> PartReceipt {
        PartReceipt::new(n, format!("\"etag-{}\"", n))
    }

    #[test]
    fn test_out_of_order_records_come_back_sorted() {
        let mut set = ReceiptSet::new(3);
        set.record(receipt(3)).unwrap();
        set.record(receipt(1)).unwrap();
        set.record(receipt(2)).unwrap();

        let ordered = set.into_ordered().unwrap();
        let numbers: Vec<u32> = ordered.iter().map(|r| r.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_duplicate_is_rejected_and_original_kept() {
        let mut set = ReceiptSet::new(2);
        set.record(receipt(1)).unwrap();

        let err = set.record(PartReceipt::new(1, "other")).unwrap_err();
        assert_eq!(err, CoreError::DuplicateReceipt(1));
        assert_eq!(set.len(), 1);

        set.record(receipt(2)).unwrap();
        let ordered = set.into_ordered().unwrap();
        assert_eq!(ordered[0].integrity_tag, "\"etag-1\"");
    }

    #[test]
    fn test_out_of_range_part_is_rejected() {
        let mut set = ReceiptSet::new(2);
        assert!(matches!(set.record(receipt(0)), Err(CoreError::UnexpectedPart { .. })));
        assert!(matches!(set.record(receipt(3)), Err(CoreError::UnexpectedPart { .. })));
        assert!(set.is_empty());
    }

    #[test]
    fn test_incomplete_set_cannot_be_ordered() {
        let mut set = ReceiptSet::new(4);
        set.record(receipt(1)).unwrap();
        set.record(receipt(3)).unwrap();

        assert_eq!(
            set.into_ordered().unwrap_err(),
            CoreError::IncompleteReceipts { missing: vec![2, 4] }
        );
    }

    #[test]
    fn test_validate_part_sequence() {
        assert_eq!(validate_part_sequence([1, 2, 3]), Ok(3));
        assert_eq!(validate_part_sequence(Vec::new()), Err(CoreError::EmptyPlan));
        assert_eq!(validate_part_sequence([1, 1]), Err(CoreError::DuplicateReceipt(1)));
        assert_eq!(
            validate_part_sequence([2, 1]),
            Err(CoreError::IncompleteReceipts { missing: vec![1] })
        );
        assert_eq!(
            validate_part_sequence([1, 3, 2]),
            Err(CoreError::IncompleteReceipts { missing: vec![2] })
        );
        assert_eq!(
            validate_part_sequence([1, 2, 1]),
            Err(CoreError::UnorderedParts { previous: 2, next: 1 })
        );
    }
}
