//! Item processing and fault classification
//!
//! The processor never lets an item fault escape: every item comes back
//! marked `Success` or `Failed`, so the surrounding chunk can always be
//! written as one unit.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::item::WorkItem;
use crate::operation::{ItemFault, ItemOperation};
use crate::reliability::RetryPolicy;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultDecision {
    /// Invoke the operation again after `delay`
    Retry { delay: Duration },

    /// Give up: mark the item Failed and count it as skipped
    Skip,
}

/// Decide whether a fault on attempt `attempt` (1-based) is retried
///
/// Validation faults are skipped immediately. Transient faults are retried
/// until the policy runs out of attempts, then skipped.
pub fn classify(fault: &ItemFault, attempt: u32, policy: &RetryPolicy) -> FaultDecision {
    match fault {
        ItemFault::Transient(_) if policy.has_attempts_remaining(attempt) => FaultDecision::Retry {
            delay: policy.delay_for_attempt(attempt + 1),
        },
        _ => FaultDecision::Skip,
    }
}

/// An item after processing
#[derive(Debug, Clone)]
pub struct ProcessedItem {
    /// The item with its status updated in memory
    pub item: WorkItem,

    /// Operation invocations spent on the item
    pub attempts: u32,

    /// Whether the item ended Failed and counts against the skip limit
    pub skip_eligible: bool,
}

/// Applies the injected operation to items with retry/skip handling
pub struct ItemProcessor {
    operation: Arc<dyn ItemOperation>,
    retry_policy: RetryPolicy,
}

impl ItemProcessor {
    pub fn new(operation: Arc<dyn ItemOperation>, retry_policy: RetryPolicy) -> Self {
        Self {
            operation,
            retry_policy,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Run the operation on one item until it succeeds or is skipped
    ///
    /// Never changes the item id.
    pub async fn process(&self, mut item: WorkItem) -> ProcessedItem {
        let mut attempt = 1;
        loop {
            let fault = match self.operation.operate(&item.payload).await {
                Ok(()) => {
                    item.mark_succeeded(attempt - 1);
                    debug!(item_id = item.id, attempt, "item processed");
                    return ProcessedItem {
                        item,
                        attempts: attempt,
                        skip_eligible: false,
                    };
                }
                Err(fault) => fault,
            };

            match classify(&fault, attempt, &self.retry_policy) {
                FaultDecision::Retry { delay } => {
                    debug!(
                        item_id = item.id,
                        attempt,
                        error = %fault,
                        "transient fault, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                FaultDecision::Skip => {
                    if fault.is_retryable() {
                        error!(
                            item_id = item.id,
                            attempts = attempt,
                            error = %fault,
                            "retries exhausted"
                        );
                    } else {
                        warn!(item_id = item.id, error = %fault, "invalid item");
                    }
                    item.mark_failed(fault.message(), attempt);
                    return ProcessedItem {
                        item,
                        attempts: attempt,
                        skip_eligible: true,
                    };
                }
            }
        }
    }
}
