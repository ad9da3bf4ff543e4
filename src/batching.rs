use crate::error::GeneratorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Fixed-size partition of a unit list. `total_batches` is at least 1, so a
/// scope with zero units still has one valid (empty, last) batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    total_units: usize,
    batch_size: usize,
}

impl BatchPlan {
    pub fn new(total_units: usize, batch_size: usize) -> Result<Self, GeneratorError> {
        if batch_size == 0 {
            return Err(GeneratorError::InvalidRequest("batchSize must be at least 1".to_string()));
        }
        Ok(Self { total_units, batch_size })
    }

    pub fn total_units(&self) -> usize {
        self.total_units
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn total_batches(&self) -> usize {
        let batches = (self.total_units + self.batch_size - 1) / self.batch_size;
        batches.max(1)
    }

    pub fn is_last(&self, batch_index: usize) -> bool {
        batch_index + 1 == self.total_batches()
    }

    fn check_index(&self, batch_index: usize) -> Result<(), GeneratorError> {
        if batch_index >= self.total_batches() {
            return Err(GeneratorError::BatchOutOfRange {
                requested: batch_index,
                total: self.total_batches(),
            });
        }
        Ok(())
    }

    /// The slice of `units` belonging to `batch_index`. The batches partition
    /// the list without overlap or omission; an out-of-range index is an
    /// error, never a panic.
    pub fn slice<'a, T>(&self, units: &'a [T], batch_index: usize) -> Result<&'a [T], GeneratorError> {
        self.check_index(batch_index)?;
        let start = (batch_index * self.batch_size).min(units.len());
        let end = (start + self.batch_size).min(units.len());
        Ok(&units[start..end])
    }

    /// Units handled once `batch_index` completes.
    pub fn processed_after(&self, batch_index: usize) -> usize {
        ((batch_index + 1) * self.batch_size).min(self.total_units)
    }
}

/// Point-in-time progress of a multi-batch generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub current_batch: usize,
    pub total_batches: usize,
    pub processed_units: usize,
    pub total_units: usize,
    pub started_at: DateTime<Utc>,
}

impl BatchProgress {
    /// Share of units processed, 0 to 100.
    pub fn percent_complete(&self) -> u32 {
        if self.total_units == 0 {
            return 100;
        }
        ((self.processed_units * 100) / self.total_units) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twelve_units_in_fives_make_three_batches() {
        let units: Vec<usize> = (0..12).collect();
        let plan = BatchPlan::new(units.len(), 5).unwrap();

        assert_eq!(plan.total_batches(), 3);
        assert_eq!(plan.slice(&units, 0).unwrap().len(), 5);
        assert_eq!(plan.slice(&units, 1).unwrap().len(), 5);
        assert_eq!(plan.slice(&units, 2).unwrap(), &[10, 11]);
        assert!(!plan.is_last(1));
        assert!(plan.is_last(2));
    }

    #[test]
    fn batches_partition_without_overlap_or_omission() {
        for total in 0..40usize {
            for size in 1..9usize {
                let units: Vec<usize> = (0..total).collect();
                let plan = BatchPlan::new(total, size).unwrap();
                let mut seen = Vec::new();
                for i in 0..plan.total_batches() {
                    seen.extend_from_slice(plan.slice(&units, i).unwrap());
                }
                assert_eq!(seen, units, "total={} size={}", total, size);
            }
        }
    }

    #[test]
    fn zero_units_still_have_one_empty_last_batch() {
        let plan = BatchPlan::new(0, 5).unwrap();
        assert_eq!(plan.total_batches(), 1);
        assert!(plan.is_last(0));
        assert_eq!(plan.slice::<usize>(&[], 0).unwrap().len(), 0);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let plan = BatchPlan::new(12, 5).unwrap();
        assert!(matches!(
            plan.slice(&(0..12).collect::<Vec<_>>(), 3),
            Err(GeneratorError::BatchOutOfRange { requested: 3, total: 3 })
        ));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(BatchPlan::new(10, 0).is_err());
    }

    #[test]
    fn processed_counts_clamp_to_total() {
        let plan = BatchPlan::new(12, 5).unwrap();
        assert_eq!(plan.processed_after(0), 5);
        assert_eq!(plan.processed_after(1), 10);
        assert_eq!(plan.processed_after(2), 12);
    }
}
