//! Chunk loop for one partition
//!
//! ```text
//! Idle ─► Reading ─► Processing ─► Writing ─┐
//!            ▲                              │
//!            └────────── more items ────────┤
//!                                           ▼
//!                    Done ─► Completed | Failed | Stopped
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::metrics::StepMetrics;
use super::processor::ItemProcessor;
use super::reader::{ChunkReader, DEFAULT_PAGE_SIZE};
use super::writer::ChunkWriter;
use crate::item::{PartitionRange, WorkItem};
use crate::persistence::{StoreError, WorkItemStore};

/// Internal state of a step executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Idle,
    Reading,
    Processing,
    Writing,
    Done,
    Completed,
    Failed,
    Stopped,
}

/// Terminal status of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The reader was exhausted
    Completed,

    /// A store fault, a panicking operation or the skip limit ended the
    /// step early
    Failed,

    /// Cancelled at a chunk boundary
    Stopped,
}

/// Why a step terminated Failed
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("read failed: {0}")]
    Read(#[source] StoreError),

    #[error("write failed: {0}")]
    Write(#[source] StoreError),

    #[error("skip limit of {limit} exceeded")]
    SkipLimitExceeded { limit: u64 },

    #[error("operation panicked on item {item_id}")]
    OperationPanicked { item_id: i64 },
}

/// Chunking parameters of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSettings {
    /// Items per committed chunk
    pub chunk_size: usize,

    /// Items per store read
    pub page_size: usize,

    /// Skip-eligible items tolerated before the step fails
    pub skip_limit: u64,
}

impl Default for StepSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            page_size: DEFAULT_PAGE_SIZE,
            skip_limit: 100,
        }
    }
}

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    /// Range the step covered, `None` for a global step
    pub range: Option<PartitionRange>,
    pub status: StepStatus,
    pub metrics: StepMetrics,

    /// Failure text when `status` is `Failed`
    pub failure: Option<String>,
}

/// Drives reader, processor and writer over one range
///
/// Every chunk is fully processed before it is written, so a chunk is either
/// committed as a whole or not at all. Committed chunks stay committed when a
/// later chunk fails.
pub struct StepExecutor {
    store: Arc<dyn WorkItemStore>,
    processor: Arc<ItemProcessor>,
    settings: StepSettings,
    range: Option<PartitionRange>,
    cancel: CancellationToken,
    state: StepState,
    metrics: StepMetrics,
}

impl StepExecutor {
    pub fn new(
        store: Arc<dyn WorkItemStore>,
        processor: Arc<ItemProcessor>,
        settings: StepSettings,
    ) -> Self {
        Self {
            store,
            processor,
            settings: StepSettings {
                chunk_size: settings.chunk_size.max(1),
                page_size: settings.page_size.max(1),
                skip_limit: settings.skip_limit,
            },
            range: None,
            cancel: CancellationToken::new(),
            state: StepState::Idle,
            metrics: StepMetrics::default(),
        }
    }

    /// Restrict the step to one partition
    pub fn with_range(mut self, range: PartitionRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Stop at the next chunk boundary once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn transition(&mut self, next: StepState) {
        debug!(from = ?self.state, to = ?next, "step state transition");
        self.state = next;
    }

    /// Run the chunk loop to a terminal state
    #[instrument(
        skip(self),
        fields(partition = self.range.as_ref().map(|r| r.label.as_str()).unwrap_or("global"))
    )]
    pub async fn execute(mut self) -> StepExecution {
        let reader = ChunkReader::new(
            self.store.clone(),
            self.range.clone(),
            self.settings.page_size,
        );
        let writer = ChunkWriter::new(self.store.clone());

        let (status, failure) = match self.run_chunks(reader, &writer).await {
            Ok(status) => (status, None),
            Err(e) => {
                error!(error = %e, metrics = ?self.metrics, "step failed");
                self.transition(StepState::Failed);
                (StepStatus::Failed, Some(e.to_string()))
            }
        };

        match status {
            StepStatus::Completed => {
                self.transition(StepState::Completed);
                info!(
                    read = self.metrics.read_count,
                    written = self.metrics.write_count,
                    skipped = self.metrics.skip_count,
                    "step completed"
                );
            }
            StepStatus::Stopped => {
                self.transition(StepState::Stopped);
                warn!(written = self.metrics.write_count, "step stopped");
            }
            StepStatus::Failed => {}
        }

        StepExecution {
            range: self.range,
            status,
            metrics: self.metrics,
            failure,
        }
    }

    async fn run_chunks(
        &mut self,
        mut reader: ChunkReader,
        writer: &ChunkWriter,
    ) -> Result<StepStatus, StepError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(StepStatus::Stopped);
            }

            self.transition(StepState::Reading);
            let chunk = self.read_chunk(&mut reader).await?;
            if chunk.is_empty() {
                self.transition(StepState::Done);
                return Ok(StepStatus::Completed);
            }

            self.transition(StepState::Processing);
            let processed = self.process_chunk(chunk).await?;

            self.transition(StepState::Writing);
            writer
                .write(&processed, &mut self.metrics)
                .await
                .map_err(StepError::Write)?;

            if reader.is_exhausted() {
                self.transition(StepState::Done);
                return Ok(StepStatus::Completed);
            }
        }
    }

    async fn read_chunk(&mut self, reader: &mut ChunkReader) -> Result<Vec<WorkItem>, StepError> {
        let mut chunk = Vec::with_capacity(self.settings.chunk_size.min(self.settings.page_size));
        while chunk.len() < self.settings.chunk_size {
            match reader.next().await.map_err(StepError::Read)? {
                Some(item) => {
                    self.metrics.read_count += 1;
                    chunk.push(item);
                }
                None => break,
            }
        }
        Ok(chunk)
    }

    async fn process_chunk(&mut self, chunk: Vec<WorkItem>) -> Result<Vec<WorkItem>, StepError> {
        let chunk_len = chunk.len() as u64;
        let mut processed = Vec::with_capacity(chunk.len());

        for item in chunk {
            let item_id = item.id;
            let Ok(outcome) = AssertUnwindSafe(self.processor.process(item))
                .catch_unwind()
                .await
            else {
                self.metrics.rollback_count += chunk_len;
                return Err(StepError::OperationPanicked { item_id });
            };
            self.metrics.retry_count += u64::from(outcome.attempts.saturating_sub(1));

            if outcome.skip_eligible {
                if self.metrics.skip_count >= self.settings.skip_limit {
                    // Nothing from this chunk is written
                    self.metrics.rollback_count += chunk_len;
                    return Err(StepError::SkipLimitExceeded {
                        limit: self.settings.skip_limit,
                    });
                }
                self.metrics.skip_count += 1;
            }
            processed.push(outcome.item);
        }

        Ok(processed)
    }
}
