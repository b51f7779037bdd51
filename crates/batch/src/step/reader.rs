//! Paged reader of pending items

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use crate::item::{PartitionRange, WorkItem};
use crate::persistence::{StoreError, WorkItemStore};

/// Default number of items fetched per store round trip
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Lazy, finite sequence of pending items in ascending id order
///
/// Pages are fetched on demand, `page_size` items at a time. Each page starts
/// just after the last id already handed out (keyset paging), so items that
/// earlier chunks moved out of `Pending` never shift later pages.
///
/// Once [`ChunkReader::next`] returns `None` the reader stays exhausted, even
/// if new items become pending afterwards.
pub struct ChunkReader {
    store: Arc<dyn WorkItemStore>,
    range: Option<PartitionRange>,
    page_size: usize,
    buffer: VecDeque<WorkItem>,
    last_id: Option<i64>,
    drained: bool,
}

impl ChunkReader {
    /// Reader over all pending items
    pub fn global(store: Arc<dyn WorkItemStore>, page_size: usize) -> Self {
        Self::new(store, None, page_size)
    }

    /// Reader over the pending items of one partition
    pub fn partitioned(
        store: Arc<dyn WorkItemStore>,
        range: PartitionRange,
        page_size: usize,
    ) -> Self {
        Self::new(store, Some(range), page_size)
    }

    pub fn new(
        store: Arc<dyn WorkItemStore>,
        range: Option<PartitionRange>,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            range,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            last_id: None,
            drained: false,
        }
    }

    /// Next pending item, or `None` once the sequence is exhausted
    ///
    /// Store failures are returned as-is; the reader does not retry them.
    pub async fn next(&mut self) -> Result<Option<WorkItem>, StoreError> {
        if self.buffer.is_empty() && !self.drained {
            self.fetch_page().await?;
        }
        Ok(self.buffer.pop_front())
    }

    /// Whether every item has been handed out
    pub fn is_exhausted(&self) -> bool {
        self.drained && self.buffer.is_empty()
    }

    /// The range still to be scanned, or `None` when nothing is left
    fn remaining_range(&self) -> Option<Option<PartitionRange>> {
        let Some(last_id) = self.last_id else {
            return Some(self.range.clone());
        };
        self.range
            .clone()
            .unwrap_or_else(|| PartitionRange::full("global"))
            .after(last_id)
            .map(Some)
    }

    async fn fetch_page(&mut self) -> Result<(), StoreError> {
        let Some(range) = self.remaining_range() else {
            self.drained = true;
            return Ok(());
        };

        let page = self
            .store
            .read_pending(range.as_ref(), 0, self.page_size)
            .await?;

        debug!(
            range = ?range.as_ref().map(|r| r.to_string()),
            items = page.len(),
            "fetched page"
        );

        if page.len() < self.page_size {
            self.drained = true;
        }
        if let Some(last) = page.last() {
            self.last_id = Some(last.id);
        }
        self.buffer.extend(page);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{FailurePlan, InMemoryWorkItemStore};

    async fn store_with(count: usize) -> Arc<InMemoryWorkItemStore> {
        let store = Arc::new(InMemoryWorkItemStore::new());
        store
            .insert_pending((0..count).map(|i| serde_json::json!({ "n": i })).collect())
            .await
            .unwrap();
        store
    }

    async fn drain(reader: &mut ChunkReader) -> Vec<i64> {
        let mut ids = vec![];
        while let Some(item) = reader.next().await.unwrap() {
            ids.push(item.id);
        }
        ids
    }

    #[tokio::test]
    async fn test_global_reader_reads_everything_in_order() {
        let store = store_with(25).await;
        let mut reader = ChunkReader::global(store, 10);

        let ids = drain(&mut reader).await;

        assert_eq!(ids, (1..=25).collect::<Vec<_>>());
        assert!(reader.is_exhausted());
    }

    #[tokio::test]
    async fn test_partitioned_reader_stays_in_range() {
        let store = store_with(30).await;
        let range = PartitionRange::new(11, 20, "partition1");
        let mut reader = ChunkReader::partitioned(store, range, 3);

        let ids = drain(&mut reader).await;

        assert_eq!(ids, (11..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_pages_do_not_skip_items_processed_meanwhile() {
        let store = store_with(6).await;
        let mut reader = ChunkReader::global(store.clone(), 2);

        // Mark each item done as soon as it is read, like a chunk writer would
        let mut ids = vec![];
        while let Some(mut item) = reader.next().await.unwrap() {
            ids.push(item.id);
            item.mark_succeeded(0);
            store.write_all(&[item]).await.unwrap();
        }

        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_exhaustion_is_permanent() {
        let store = store_with(2).await;
        let mut reader = ChunkReader::global(store.clone(), 10);

        assert_eq!(drain(&mut reader).await, vec![1, 2]);

        store.insert_pending(vec![serde_json::json!({})]).await.unwrap();
        assert!(reader.next().await.unwrap().is_none());
        assert!(reader.is_exhausted());
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = store_with(0).await;
        let mut reader = ChunkReader::global(store, 10);

        assert!(reader.next().await.unwrap().is_none());
        assert!(reader.is_exhausted());
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let store = store_with(5).await;
        store.set_failure_plan(FailurePlan::fail_read(2));
        let mut reader = ChunkReader::global(store, 2);

        assert!(reader.next().await.unwrap().is_some());
        assert!(reader.next().await.unwrap().is_some());
        assert!(matches!(
            reader.next().await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
