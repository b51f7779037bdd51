//! Transactional chunk writer

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};

use super::metrics::StepMetrics;
use crate::item::WorkItem;
use crate::persistence::{StoreError, WorkItemStore};

/// Persists a processed chunk as one store transaction
///
/// A failed write is not retried: store faults are infrastructure faults and
/// end the owning partition.
pub struct ChunkWriter {
    store: Arc<dyn WorkItemStore>,
}

impl ChunkWriter {
    pub fn new(store: Arc<dyn WorkItemStore>) -> Self {
        Self { store }
    }

    /// Write every item of `chunk` or none of them
    ///
    /// On success `write_count` and `commit_count` grow by the chunk length;
    /// on failure `rollback_count` does.
    pub async fn write(
        &self,
        chunk: &[WorkItem],
        metrics: &mut StepMetrics,
    ) -> Result<(), StoreError> {
        if chunk.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        match self.store.write_all(chunk).await {
            Ok(()) => {
                let len = chunk.len() as u64;
                metrics.write_count += len;
                metrics.commit_count += len;
                info!(
                    items = chunk.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Updated chunk"
                );
                Ok(())
            }
            Err(e) => {
                metrics.rollback_count += chunk.len() as u64;
                error!(items = chunk.len(), error = %e, "Chunk write rolled back");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{FailurePlan, InMemoryWorkItemStore};

    async fn processed_chunk(store: &InMemoryWorkItemStore, count: usize) -> Vec<WorkItem> {
        let ids = store
            .insert_pending(vec![serde_json::json!({}); count])
            .await
            .unwrap();
        ids.into_iter()
            .map(|id| {
                let mut item = store.get(id).unwrap();
                item.mark_succeeded(0);
                item
            })
            .collect()
    }

    #[tokio::test]
    async fn test_write_updates_metrics() {
        let store = Arc::new(InMemoryWorkItemStore::new());
        let chunk = processed_chunk(&store, 4).await;
        let writer = ChunkWriter::new(store.clone());
        let mut metrics = StepMetrics::default();

        writer.write(&chunk, &mut metrics).await.unwrap();

        assert_eq!(metrics.write_count, 4);
        assert_eq!(metrics.commit_count, 4);
        assert_eq!(metrics.rollback_count, 0);
        assert_eq!(store.count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back_whole_chunk() {
        let store = Arc::new(InMemoryWorkItemStore::new());
        let chunk = processed_chunk(&store, 4).await;
        store.set_failure_plan(FailurePlan::fail_write(1).after_items(3));
        let writer = ChunkWriter::new(store.clone());
        let mut metrics = StepMetrics::default();

        let result = writer.write(&chunk, &mut metrics).await;

        assert!(result.is_err());
        assert_eq!(metrics.write_count, 0);
        assert_eq!(metrics.commit_count, 0);
        assert_eq!(metrics.rollback_count, 4);
        assert_eq!(store.count_pending().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_empty_chunk_is_a_no_op() {
        let store = Arc::new(InMemoryWorkItemStore::new());
        let writer = ChunkWriter::new(store.clone());
        let mut metrics = StepMetrics::default();

        writer.write(&[], &mut metrics).await.unwrap();

        assert_eq!(metrics, StepMetrics::default());
        assert!(store.commit_log().is_empty());
    }
}
