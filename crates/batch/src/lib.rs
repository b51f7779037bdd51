//! # Chunkwise Batch Engine
//!
//! A chunk-oriented, partitionable batch execution engine: pending work items
//! are read from a durable store in bounded chunks, transformed one by one,
//! and every chunk is committed atomically.
//!
//! ## Features
//!
//! - **Chunk transactions**: a chunk is written as a whole or not at all
//! - **Per-item fault handling**: transient faults are retried in place, permanent faults are recorded and skipped
//! - **Skip limit**: too many failed items abort the partition instead of the whole job
//! - **Range partitioning**: pending ids are split into disjoint ranges processed in parallel
//! - **Bounded worker pool**: at most `thread_count` partitions run at once
//! - **Cooperative cancellation**: workers stop at chunk boundaries, never mid-write
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      JobCoordinator                          │
//! │  (partitions pending ids, bounded pool, listeners, record)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ one per partition
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       StepExecutor                           │
//! │     ChunkReader ──► ItemProcessor ──► ChunkWriter           │
//! │  (keyset pages)    (retry / skip)    (one tx per chunk)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkItemStore                           │
//! │        (PostgreSQL: work_items, or in-memory for tests)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use chunkwise_batch::prelude::*;
//!
//! let store = Arc::new(PostgresWorkItemStore::new(pool));
//! store.migrate().await?;
//!
//! let send = operation_fn(|payload| async move {
//!     let to = payload["to"]
//!         .as_str()
//!         .ok_or_else(|| ItemFault::validation("missing recipient"))?;
//!     mailer::send(to).await.map_err(|e| ItemFault::transient(e.to_string()))
//! });
//!
//! let config = BatchConfig::from_env()?;
//! let record = JobCoordinator::new(store, Arc::new(send), config.clone())
//!     .with_listener(Arc::new(LoggingJobListener))
//!     .run(config.job_parameters())
//!     .await?;
//! ```

pub mod config;
pub mod item;
pub mod job;
pub mod operation;
pub mod partition;
pub mod persistence;
pub mod reliability;
pub mod step;

/// Prelude for common imports
pub mod prelude {
    pub use std::sync::Arc;

    pub use async_trait::async_trait;

    pub use crate::config::{BatchConfig, ConfigError, JobParameters};
    pub use crate::item::{ItemStatus, PartitionRange, WorkItem};
    pub use crate::job::{
        JobCoordinator, JobExecutionListener, JobExecutionRecord, JobStatus, LoggingJobListener,
        PartitionExecution,
    };
    pub use crate::operation::{operation_fn, ItemFault, ItemOperation, OperationResult};
    pub use crate::partition::{IdRangePartitioner, Partitioner};
    pub use crate::persistence::{
        InMemoryWorkItemStore, PostgresWorkItemStore, StatusCounts, StoreError, WorkItemStore,
    };
    pub use crate::reliability::RetryPolicy;
    pub use crate::step::{StepMetrics, StepStatus};
}

// Re-export key types at crate root
pub use config::{BatchConfig, ConfigError, JobParameters};
pub use item::{ItemStatus, PartitionRange, WorkItem};
pub use job::{
    JobCoordinator, JobExecutionListener, JobExecutionRecord, JobStatus, LoggingJobListener,
    PartitionExecution,
};
pub use operation::{operation_fn, ItemFault, ItemOperation, OperationFn, OperationResult};
pub use partition::{split_id_range, IdRangePartitioner, Partitioner};
pub use persistence::{
    FailurePlan, InMemoryWorkItemStore, PostgresWorkItemStore, StatusCounts, StoreError,
    UpdatedWindow, WorkItemStore,
};
pub use reliability::RetryPolicy;
pub use step::{
    ChunkReader, ChunkWriter, ItemProcessor, StepError, StepExecution, StepExecutor, StepMetrics,
    StepSettings, StepStatus,
};
