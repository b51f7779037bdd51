//! Range partitioning of pending work
//!
//! A [`Partitioner`] splits the pending id space into contiguous, disjoint
//! [`PartitionRange`]s. Ranges are computed once per job, before any worker
//! starts, and are handed to workers by value.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::item::PartitionRange;
use crate::persistence::{StoreError, WorkItemStore};

/// Splits pending work into key ranges
#[async_trait]
pub trait Partitioner: Send + Sync {
    /// Compute up to `grid_size` ranges, in ascending id order
    ///
    /// An empty result means there is no pending work.
    async fn partition(&self, grid_size: usize) -> Result<Vec<PartitionRange>, StoreError>;
}

/// Label of the `index`-th partition
pub fn partition_label(index: usize) -> String {
    format!("partition{index}")
}

/// Split `[min_id, max_id]` into at most `grid_size` equal-width ranges
///
/// Each range is `ceil(span / grid_size)` ids wide except the last, which is
/// clipped to `max_id`. Ranges that would start above `max_id` are omitted, so
/// small id spans produce fewer than `grid_size` ranges.
pub fn split_id_range(min_id: i64, max_id: i64, grid_size: usize) -> Vec<PartitionRange> {
    if grid_size == 0 || min_id > max_id {
        return vec![];
    }

    let span = max_id as i128 - min_id as i128 + 1;
    let grid = grid_size as i128;
    let target_size = (span + grid - 1) / grid;

    let mut ranges = Vec::with_capacity(grid_size);
    for index in 0..grid_size {
        let start = min_id as i128 + index as i128 * target_size;
        if start > max_id as i128 {
            break;
        }
        let end = (start + target_size - 1).min(max_id as i128);
        // Both bounds lie inside [min_id, max_id]
        ranges.push(PartitionRange::new(
            start as i64,
            end as i64,
            partition_label(index),
        ));
    }
    ranges
}

/// Partitions the id span of pending items into equal-width ranges
pub struct IdRangePartitioner {
    store: Arc<dyn WorkItemStore>,
}

impl IdRangePartitioner {
    pub fn new(store: Arc<dyn WorkItemStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Partitioner for IdRangePartitioner {
    #[instrument(skip(self))]
    async fn partition(&self, grid_size: usize) -> Result<Vec<PartitionRange>, StoreError> {
        let Some((min_id, max_id)) = self.store.min_max_pending_id().await? else {
            info!("No pending items found, skipping partitioning");
            return Ok(vec![]);
        };

        info!(min_id, max_id, grid_size, "Partitioning pending item ids");

        let ranges = split_id_range(min_id, max_id, grid_size);
        for range in &ranges {
            debug!(
                label = %range.label,
                min_id = range.min_id,
                max_id = range.max_id,
                "created partition"
            );
        }
        Ok(ranges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::WorkItem;
    use crate::persistence::InMemoryWorkItemStore;

    fn bounds(ranges: &[PartitionRange]) -> Vec<(i64, i64)> {
        ranges.iter().map(|r| (r.min_id, r.max_id)).collect()
    }

    #[test]
    fn test_even_split() {
        let ranges = split_id_range(1, 100, 4);
        assert_eq!(bounds(&ranges), vec![(1, 25), (26, 50), (51, 75), (76, 100)]);
        assert_eq!(ranges[3].label, "partition3");
    }

    #[test]
    fn test_uneven_split_clips_last_range() {
        let ranges = split_id_range(1, 10, 3);
        assert_eq!(bounds(&ranges), vec![(1, 4), (5, 8), (9, 10)]);
    }

    #[test]
    fn test_small_span_yields_fewer_partitions() {
        // ceil(5 / 4) = 2 ids per range, the fourth range would start at 7
        let ranges = split_id_range(1, 5, 4);
        assert_eq!(bounds(&ranges), vec![(1, 2), (3, 4), (5, 5)]);

        let ranges = split_id_range(7, 7, 4);
        assert_eq!(bounds(&ranges), vec![(7, 7)]);
    }

    #[test]
    fn test_single_partition_covers_span() {
        let ranges = split_id_range(3, 9_999, 1);
        assert_eq!(bounds(&ranges), vec![(3, 9_999)]);
    }

    #[test]
    fn test_extreme_bounds_do_not_overflow() {
        let ranges = split_id_range(i64::MIN, i64::MAX, 2);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].min_id, i64::MIN);
        assert_eq!(ranges[0].max_id, -1);
        assert_eq!(ranges[1].min_id, 0);
        assert_eq!(ranges[1].max_id, i64::MAX);
    }

    #[test]
    fn test_ranges_cover_every_id_exactly_once() {
        let spans = [(1, 1), (1, 2), (5, 17), (100, 1_000), (-50, 50), (0, 4_096)];
        for (min_id, max_id) in spans {
            for grid_size in 1..=9 {
                let ranges = split_id_range(min_id, max_id, grid_size);
                assert!(!ranges.is_empty());
                assert!(ranges.len() <= grid_size);
                assert_eq!(ranges.first().unwrap().min_id, min_id);
                assert_eq!(ranges.last().unwrap().max_id, max_id);
                for pair in ranges.windows(2) {
                    // contiguous and disjoint
                    assert_eq!(pair[0].max_id + 1, pair[1].min_id);
                }
                for id in min_id..=max_id {
                    let owners = ranges.iter().filter(|r| r.contains(id)).count();
                    assert_eq!(owners, 1, "id {id} grid {grid_size}");
                }
            }
        }
    }

    #[tokio::test]
    async fn test_partitioner_uses_pending_bounds() {
        let store = Arc::new(InMemoryWorkItemStore::new());
        store.seed([10, 11, 40, 90].map(|id| WorkItem::pending(id, serde_json::json!({}))));
        let mut done = WorkItem::pending(95, serde_json::json!({}));
        done.mark_succeeded(0);
        store.seed([done]);

        let partitioner = IdRangePartitioner::new(store);
        let ranges = partitioner.partition(2).await.unwrap();

        assert_eq!(bounds(&ranges), vec![(10, 50), (51, 90)]);
    }

    #[tokio::test]
    async fn test_partitioner_without_pending_items() {
        let store = Arc::new(InMemoryWorkItemStore::new());
        let partitioner = IdRangePartitioner::new(store);

        assert!(partitioner.partition(4).await.unwrap().is_empty());
    }
}
