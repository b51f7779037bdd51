//! Partitioned job runs over a bounded worker pool

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn, Instrument};

use super::listener::JobExecutionListener;
use super::record::{JobExecutionRecord, PartitionExecution};
use crate::config::{BatchConfig, ConfigError, JobParameters};
use crate::item::PartitionRange;
use crate::operation::ItemOperation;
use crate::partition::{partition_label, IdRangePartitioner, Partitioner};
use crate::persistence::WorkItemStore;
use crate::step::{ItemProcessor, StepExecution, StepExecutor, StepMetrics, StepStatus};

/// Name given to jobs that are not named explicitly
pub const DEFAULT_JOB_NAME: &str = "batch_job";

/// Runs one step executor per partition
///
/// At most `thread_count` partitions run at the same time; the rest wait for
/// a free slot. A failed partition never cancels its siblings.
///
/// # Example
///
/// ```ignore
/// use chunkwise_batch::prelude::*;
///
/// let coordinator = JobCoordinator::new(store, Arc::new(SendEmail::new()), BatchConfig::default())
///     .with_listener(Arc::new(LoggingJobListener));
///
/// let record = coordinator.run(JobParameters::new(4, 1000, 4)).await?;
/// println!("{} items written", record.totals().write_count);
/// ```
pub struct JobCoordinator {
    store: Arc<dyn WorkItemStore>,
    operation: Arc<dyn ItemOperation>,
    partitioner: Arc<dyn Partitioner>,
    listeners: Vec<Arc<dyn JobExecutionListener>>,
    config: BatchConfig,
    job_name: String,
}

impl JobCoordinator {
    /// Create a coordinator that partitions by pending id range
    pub fn new(
        store: Arc<dyn WorkItemStore>,
        operation: Arc<dyn ItemOperation>,
        config: BatchConfig,
    ) -> Self {
        Self {
            partitioner: Arc::new(IdRangePartitioner::new(store.clone())),
            store,
            operation,
            listeners: vec![],
            config,
            job_name: DEFAULT_JOB_NAME.to_string(),
        }
    }

    pub fn with_partitioner(mut self, partitioner: Arc<dyn Partitioner>) -> Self {
        self.partitioner = partitioner;
        self
    }

    /// Register a listener; listeners run in registration order
    pub fn with_listener(mut self, listener: Arc<dyn JobExecutionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_job_name(mut self, name: impl Into<String>) -> Self {
        self.job_name = name.into();
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run the job to completion
    ///
    /// Only invalid parameters are returned as errors. Store faults end up
    /// in the returned record.
    pub async fn run(&self, params: JobParameters) -> Result<JobExecutionRecord, ConfigError> {
        self.run_until_cancelled(params, CancellationToken::new())
            .await
    }

    /// Run the job, stopping every partition at its next chunk boundary once
    /// `timeout` has elapsed
    pub async fn run_with_timeout(
        &self,
        params: JobParameters,
        timeout: Duration,
    ) -> Result<JobExecutionRecord, ConfigError> {
        let token = CancellationToken::new();
        let timer = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                warn!(?timeout, "job timed out, stopping");
                token.cancel();
            })
        };

        let result = self.run_until_cancelled(params, token).await;
        timer.abort();
        result
    }

    /// Run the job until it completes or `token` is cancelled
    ///
    /// Cancellation is honored at chunk boundaries: in-flight chunks are
    /// committed or rolled back first, and queued partitions report `Stopped`
    /// without reading anything.
    #[instrument(skip(self, token), fields(job = %self.job_name))]
    pub async fn run_until_cancelled(
        &self,
        params: JobParameters,
        token: CancellationToken,
    ) -> Result<JobExecutionRecord, ConfigError> {
        params.validate()?;
        self.config.validate_run_settings()?;

        let mut record = JobExecutionRecord::start(self.job_name.clone());
        info!(job_id = %record.job_id, ?params, "Starting job");
        for listener in &self.listeners {
            listener.before_job(&record);
        }

        match self.partitioner.partition(params.grid_size).await {
            Ok(ranges) => {
                let ranges = if ranges.is_empty() {
                    vec![PartitionRange::full(partition_label(0))]
                } else {
                    ranges
                };
                let partitions = self.run_partitions(ranges, params, &token).await;
                record.finish(partitions);
            }
            Err(e) => {
                error!(error = %e, "Partitioning failed");
                record.fail(format!("partitioning failed: {e}"));
            }
        }

        let totals = record.totals();
        info!(
            job_id = %record.job_id,
            status = %record.status,
            partitions = record.partitions.len(),
            written = totals.write_count,
            skipped = totals.skip_count,
            "Job finished"
        );
        for listener in &self.listeners {
            listener.after_job(&record);
        }

        Ok(record)
    }

    async fn run_partitions(
        &self,
        ranges: Vec<PartitionRange>,
        params: JobParameters,
        token: &CancellationToken,
    ) -> Vec<PartitionExecution> {
        let processor = Arc::new(ItemProcessor::new(
            self.operation.clone(),
            self.config.retry_policy(),
        ));
        let settings = self.config.step_settings(params.chunk_size);
        // Never more permits than partitions
        let permits = params.thread_count.min(ranges.len()).max(1);
        let slots = Arc::new(Semaphore::new(permits));
        let mut tasks = JoinSet::new();

        for range in ranges {
            // The semaphore is never closed
            let Ok(permit) = slots.clone().acquire_owned().await else {
                break;
            };

            let step = StepExecutor::new(self.store.clone(), processor.clone(), settings)
                .with_range(range.clone())
                .with_cancellation(token.clone());

            let task = async move {
                let outcome = AssertUnwindSafe(step.execute()).catch_unwind().await;
                drop(permit);
                match outcome {
                    Ok(execution) => PartitionExecution::from_step(execution, range),
                    Err(_) => {
                        error!(partition = %range, "partition task panicked");
                        let execution = StepExecution {
                            range: Some(range.clone()),
                            status: StepStatus::Failed,
                            metrics: StepMetrics::default(),
                            failure: Some("partition task panicked".to_string()),
                        };
                        PartitionExecution::from_step(execution, range)
                    }
                }
            };
            tasks.spawn(task.in_current_span());
        }

        let mut partitions = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(partition) => partitions.push(partition),
                Err(e) => error!(error = %e, "partition task did not finish"),
            }
        }
        partitions
    }
}
