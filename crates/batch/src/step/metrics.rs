//! Per-partition step counters

use serde::{Deserialize, Serialize};

/// Counters owned by one step executor
///
/// `write_count`, `commit_count` and `rollback_count` are item counts, not
/// transaction counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMetrics {
    /// Items handed out by the reader
    pub read_count: u64,

    /// Items persisted by committed chunks
    pub write_count: u64,

    /// Items marked Failed without further retries
    pub skip_count: u64,

    /// Operation re-invocations after transient faults
    pub retry_count: u64,

    /// Items in committed chunks
    pub commit_count: u64,

    /// Items in chunks that were discarded
    pub rollback_count: u64,
}

impl StepMetrics {
    /// Add another step's counters to these
    pub fn merge(&mut self, other: &StepMetrics) {
        self.read_count += other.read_count;
        self.write_count += other.write_count;
        self.skip_count += other.skip_count;
        self.retry_count += other.retry_count;
        self.commit_count += other.commit_count;
        self.rollback_count += other.rollback_count;
    }

    /// Sum of a set of step counters
    pub fn sum<'a>(metrics: impl IntoIterator<Item = &'a StepMetrics>) -> Self {
        metrics.into_iter().fold(Self::default(), |mut total, m| {
            total.merge(m);
            total
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum() {
        let a = StepMetrics {
            read_count: 10,
            write_count: 10,
            commit_count: 10,
            skip_count: 1,
            ..Default::default()
        };
        let b = StepMetrics {
            read_count: 5,
            retry_count: 2,
            rollback_count: 5,
            ..Default::default()
        };

        let total = StepMetrics::sum([&a, &b]);

        assert_eq!(total.read_count, 15);
        assert_eq!(total.write_count, 10);
        assert_eq!(total.commit_count, 10);
        assert_eq!(total.skip_count, 1);
        assert_eq!(total.retry_count, 2);
        assert_eq!(total.rollback_count, 5);
    }

    #[test]
    fn test_sum_of_nothing_is_zero() {
        assert_eq!(StepMetrics::sum(std::iter::empty()), StepMetrics::default());
    }
}
