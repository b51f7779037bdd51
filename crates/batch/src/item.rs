//! Work items and partition ranges

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing status of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Waiting to be processed
    Pending,

    /// Operation completed successfully
    Success,

    /// Operation failed permanently (validation fault or exhausted retries)
    Failed,
}

impl ItemStatus {
    /// Column value used by the SQL store
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Parse a column value written by [`ItemStatus::as_str`]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work
///
/// Items are created `Pending` by a producer and mutated only by the
/// processor/writer pair of the partition that owns their id.
///
/// Invariants kept by [`WorkItem::mark_succeeded`] and [`WorkItem::mark_failed`]:
/// - `Success` implies `error_message` is `None`
/// - `Failed` implies `error_message` is `Some` and `retry_count >= 1`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Store-assigned, monotonically increasing key
    pub id: i64,

    /// Opaque operation input
    pub payload: serde_json::Value,

    pub status: ItemStatus,

    pub error_message: Option<String>,

    /// Failed operation invocations across runs
    pub retry_count: u32,

    /// When the operation last succeeded
    pub completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    /// Create a pending item (used by stores and tests)
    pub fn pending(id: i64, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id,
            payload,
            status: ItemStatus::Pending,
            error_message: None,
            retry_count: 0,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the item successful after `failed_attempts` failed invocations
    pub fn mark_succeeded(&mut self, failed_attempts: u32) {
        self.status = ItemStatus::Success;
        self.error_message = None;
        self.retry_count += failed_attempts;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the item permanently failed
    ///
    /// `failed_attempts` is clamped to at least one so a failed item always
    /// reports a non-zero retry count.
    pub fn mark_failed(&mut self, message: impl Into<String>, failed_attempts: u32) {
        self.status = ItemStatus::Failed;
        self.error_message = Some(message.into());
        self.retry_count += failed_attempts.max(1);
        self.completed_at = None;
    }

    /// Return the item to the pending state
    pub fn reset(&mut self) {
        self.status = ItemStatus::Pending;
        self.error_message = None;
        self.retry_count = 0;
        self.completed_at = None;
    }

    pub fn is_pending(&self) -> bool {
        self.status == ItemStatus::Pending
    }
}

/// Inclusive key interval `[min_id, max_id]` over [`WorkItem::id`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionRange {
    pub min_id: i64,
    pub max_id: i64,
    pub label: String,
}

impl PartitionRange {
    pub fn new(min_id: i64, max_id: i64, label: impl Into<String>) -> Self {
        Self {
            min_id,
            max_id,
            label: label.into(),
        }
    }

    /// Range covering every possible id
    ///
    /// Used when partitioning finds no pending items, so the job still runs
    /// one (empty) partition.
    pub fn full(label: impl Into<String>) -> Self {
        Self::new(i64::MIN, i64::MAX, label)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.min_id <= id && id <= self.max_id
    }

    /// Number of ids covered by the range
    pub fn span(&self) -> u64 {
        if self.max_id < self.min_id {
            0
        } else {
            self.max_id.abs_diff(self.min_id).saturating_add(1)
        }
    }

    /// The sub-range of ids strictly greater than `id`, or `None` when empty
    pub fn after(&self, id: i64) -> Option<Self> {
        if id >= self.max_id {
            return None;
        }
        Some(Self {
            min_id: self.min_id.max(id + 1),
            max_id: self.max_id,
            label: self.label.clone(),
        })
    }
}

impl std::fmt::Display for PartitionRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}..={}]", self.label, self.min_id, self.max_id)
    }
}
