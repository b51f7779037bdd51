//! WorkItemStore trait definition

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::item::{ItemStatus, PartitionRange, WorkItem};

/// Error type for store operations
///
/// Every variant is an infrastructure fault: the engine treats it as fatal
/// to the partition that hit it and never retries it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Item not found
    #[error("work item not found: {0}")]
    ItemNotFound(i64),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Store unreachable or failed mid-operation
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Item counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub success: u64,
    pub failed: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.success + self.failed
    }

    /// Add one item with the given status
    pub fn record(&mut self, status: ItemStatus) {
        match status {
            ItemStatus::Pending => self.pending += 1,
            ItemStatus::Success => self.success += 1,
            ItemStatus::Failed => self.failed += 1,
        }
    }
}

/// Time window over `updated_at`, inclusive at both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdatedWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl UpdatedWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at <= self.to
    }
}

/// Durable store of work items
///
/// Implementations must be thread-safe: one store instance is shared by every
/// partition worker of a run.
#[async_trait]
pub trait WorkItemStore: Send + Sync + 'static {
    // =========================================================================
    // Engine Operations
    // =========================================================================

    /// Number of pending items
    async fn count_pending(&self) -> Result<u64, StoreError>;

    /// Smallest and largest pending id, or `None` when nothing is pending
    async fn min_max_pending_id(&self) -> Result<Option<(i64, i64)>, StoreError>;

    /// Read pending items in ascending id order
    ///
    /// `range` restricts ids to an inclusive interval; `offset`/`limit`
    /// select a page of the filtered result.
    async fn read_pending(
        &self,
        range: Option<&PartitionRange>,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<WorkItem>, StoreError>;

    /// Persist all items in one transaction
    ///
    /// Either every item is updated or none is.
    async fn write_all(&self, items: &[WorkItem]) -> Result<(), StoreError>;

    // =========================================================================
    // Producer and Reporting Operations
    // =========================================================================

    /// Create pending items, returning their ids in insertion order
    async fn insert_pending(
        &self,
        payloads: Vec<serde_json::Value>,
    ) -> Result<Vec<i64>, StoreError>;

    /// Count items per status, optionally restricted to an `updated_at` window
    async fn status_counts(
        &self,
        window: Option<UpdatedWindow>,
    ) -> Result<StatusCounts, StoreError>;

    /// All items with the given status in ascending id order
    async fn list_by_status(&self, status: ItemStatus) -> Result<Vec<WorkItem>, StoreError>;

    /// Put every item back into the pending state
    ///
    /// Returns the number of items reset.
    async fn reset_all_to_pending(&self) -> Result<u64, StoreError>;
}
