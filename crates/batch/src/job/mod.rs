//! Job coordination
//!
//! This module provides:
//! - [`JobCoordinator`] - partitions pending work and runs one step per partition
//! - [`JobExecutionRecord`] - the outcome of a run
//! - [`JobExecutionListener`] - before/after hooks

mod coordinator;
mod listener;
mod record;

pub use coordinator::{JobCoordinator, DEFAULT_JOB_NAME};
pub use listener::{JobExecutionListener, LoggingJobListener};
pub use record::{JobExecutionRecord, JobStatus, PartitionExecution};
