//! In-memory implementation of WorkItemStore for testing

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use super::store::*;
use crate::item::{ItemStatus, PartitionRange, WorkItem};

/// Injected store faults
///
/// Call numbers are 1-based and count calls made since the plan was installed.
#[derive(Debug, Clone, Default)]
pub struct FailurePlan {
    /// Fail this `read_pending` call
    pub fail_read_call: Option<usize>,

    /// Fail this `write_all` call
    pub fail_write_call: Option<usize>,

    /// How many items of the failing write are staged before the fault
    pub fail_write_after_items: usize,
}

impl FailurePlan {
    pub fn fail_read(call: usize) -> Self {
        Self {
            fail_read_call: Some(call),
            ..Default::default()
        }
    }

    pub fn fail_write(call: usize) -> Self {
        Self {
            fail_write_call: Some(call),
            ..Default::default()
        }
    }

    /// Stage `items` rows of the failing write before it errors
    pub fn after_items(mut self, items: usize) -> Self {
        self.fail_write_after_items = items;
        self
    }
}

/// In-memory implementation of WorkItemStore
///
/// This is primarily for testing. It keeps items in an ordered map and
/// provides the same semantics as the PostgreSQL implementation, including
/// all-or-nothing chunk writes.
///
/// # Example
///
/// ```
/// use chunkwise_batch::InMemoryWorkItemStore;
///
/// let store = InMemoryWorkItemStore::new();
/// assert_eq!(store.item_count(), 0);
/// ```
pub struct InMemoryWorkItemStore {
    items: RwLock<BTreeMap<i64, WorkItem>>,
    next_id: AtomicI64,
    failures: RwLock<FailurePlan>,
    read_calls: AtomicUsize,
    write_calls: AtomicUsize,
    commit_log: Mutex<Vec<Vec<i64>>>,
}

impl InMemoryWorkItemStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            failures: RwLock::new(FailurePlan::default()),
            read_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
            commit_log: Mutex::new(Vec::new()),
        }
    }

    /// Install a failure plan and restart call counting
    pub fn set_failure_plan(&self, plan: FailurePlan) {
        *self.failures.write() = plan;
        self.read_calls.store(0, Ordering::SeqCst);
        self.write_calls.store(0, Ordering::SeqCst);
    }

    /// Insert items with explicit ids (for sparse id layouts in tests)
    pub fn seed(&self, items: impl IntoIterator<Item = WorkItem>) {
        let mut map = self.items.write();
        for item in items {
            self.next_id.fetch_max(item.id + 1, Ordering::SeqCst);
            map.insert(item.id, item);
        }
    }

    /// Get a copy of one item
    pub fn get(&self, id: i64) -> Option<WorkItem> {
        self.items.read().get(&id).cloned()
    }

    /// Get the number of items
    pub fn item_count(&self) -> usize {
        self.items.read().len()
    }

    /// Ids of every committed write, in commit order
    pub fn commit_log(&self) -> Vec<Vec<i64>> {
        self.commit_log.lock().clone()
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.items.write().clear();
        self.commit_log.lock().clear();
        self.next_id.store(1, Ordering::SeqCst);
    }
}

impl Default for InMemoryWorkItemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkItemStore for InMemoryWorkItemStore {
    async fn count_pending(&self) -> Result<u64, StoreError> {
        Ok(self.items.read().values().filter(|i| i.is_pending()).count() as u64)
    }

    async fn min_max_pending_id(&self) -> Result<Option<(i64, i64)>, StoreError> {
        let items = self.items.read();
        let mut pending = items.values().filter(|i| i.is_pending()).map(|i| i.id);
        let Some(first) = pending.next() else {
            return Ok(None);
        };
        // BTreeMap iterates in key order
        let last = pending.last().unwrap_or(first);
        Ok(Some((first, last)))
    }

    async fn read_pending(
        &self,
        range: Option<&PartitionRange>,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<WorkItem>, StoreError> {
        let call = self.read_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failures.read().fail_read_call == Some(call) {
            return Err(StoreError::Unavailable(format!(
                "injected read failure on call {call}"
            )));
        }

        let items = self.items.read();
        let (min, max) = range
            .map(|r| (r.min_id, r.max_id))
            .unwrap_or((i64::MIN, i64::MAX));
        if min > max {
            return Ok(vec![]);
        }

        Ok(items
            .range(min..=max)
            .map(|(_, item)| item)
            .filter(|item| item.is_pending())
            .skip(offset as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn write_all(&self, items: &[WorkItem]) -> Result<(), StoreError> {
        let call = self.write_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let plan = self.failures.read().clone();
        let fail_at = (plan.fail_write_call == Some(call)).then_some(plan.fail_write_after_items);

        let mut map = self.items.write();

        // Stage into a copy so a failure leaves the committed map untouched
        let now = Utc::now();
        let mut staged = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            if fail_at == Some(index) {
                return Err(StoreError::Unavailable(format!(
                    "injected write failure on call {call} after {index} items"
                )));
            }
            if !map.contains_key(&item.id) {
                return Err(StoreError::ItemNotFound(item.id));
            }
            let mut updated = item.clone();
            updated.updated_at = now;
            staged.push(updated);
        }
        if fail_at.is_some() {
            return Err(StoreError::Unavailable(format!(
                "injected write failure on call {call} at commit"
            )));
        }

        let ids = staged.iter().map(|i| i.id).collect();
        for item in staged {
            map.insert(item.id, item);
        }
        self.commit_log.lock().push(ids);
        Ok(())
    }

    async fn insert_pending(
        &self,
        payloads: Vec<serde_json::Value>,
    ) -> Result<Vec<i64>, StoreError> {
        let mut map = self.items.write();
        let mut ids = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            map.insert(id, WorkItem::pending(id, payload));
            ids.push(id);
        }
        Ok(ids)
    }

    async fn status_counts(
        &self,
        window: Option<UpdatedWindow>,
    ) -> Result<StatusCounts, StoreError> {
        let mut counts = StatusCounts::default();
        for item in self.items.read().values() {
            if window.map_or(true, |w| w.contains(item.updated_at)) {
                counts.record(item.status);
            }
        }
        Ok(counts)
    }

    async fn list_by_status(&self, status: ItemStatus) -> Result<Vec<WorkItem>, StoreError> {
        Ok(self
            .items
            .read()
            .values()
            .filter(|i| i.status == status)
            .cloned()
            .collect())
    }

    async fn reset_all_to_pending(&self) -> Result<u64, StoreError> {
        let mut map = self.items.write();
        let now = Utc::now();
        for item in map.values_mut() {
            item.reset();
            item.updated_at = now;
        }
        Ok(map.len() as u64)
    }
}
