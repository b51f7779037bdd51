//! Job execution records

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::item::PartitionRange;
use crate::step::{StepExecution, StepMetrics, StepStatus};

/// Overall status of a job run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

impl JobStatus {
    /// Combine partition outcomes: Failed wins over Stopped, Stopped over Completed
    pub fn from_partitions<'a>(statuses: impl IntoIterator<Item = &'a StepStatus>) -> Self {
        statuses
            .into_iter()
            .fold(JobStatus::Completed, |job, status| match (job, status) {
                (JobStatus::Failed, _) | (_, StepStatus::Failed) => JobStatus::Failed,
                (JobStatus::Stopped, _) | (_, StepStatus::Stopped) => JobStatus::Stopped,
                _ => JobStatus::Completed,
            })
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}

/// Outcome of one partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionExecution {
    pub range: PartitionRange,
    pub status: StepStatus,
    pub metrics: StepMetrics,
    pub failure: Option<String>,
}

impl PartitionExecution {
    /// Wrap a step outcome, using `range` when the step ran unscoped
    pub fn from_step(execution: StepExecution, range: PartitionRange) -> Self {
        Self {
            range: execution.range.unwrap_or(range),
            status: execution.status,
            metrics: execution.metrics,
            failure: execution.failure,
        }
    }
}

/// Record of one job run
///
/// Created `Running` when the job starts and finalized once every partition
/// has finished. Listeners only ever see it by shared reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecutionRecord {
    pub job_id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: JobStatus,

    /// Per-partition outcomes in ascending `min_id` order
    pub partitions: Vec<PartitionExecution>,

    /// Job-level failure (e.g. partitioning could not query the store)
    pub failure: Option<String>,
}

impl JobExecutionRecord {
    pub(crate) fn start(job_name: impl Into<String>) -> Self {
        Self {
            job_id: Uuid::now_v7(),
            job_name: job_name.into(),
            started_at: Utc::now(),
            ended_at: None,
            status: JobStatus::Running,
            partitions: vec![],
            failure: None,
        }
    }

    pub(crate) fn finish(&mut self, mut partitions: Vec<PartitionExecution>) {
        partitions.sort_by_key(|p| p.range.min_id);
        self.status = JobStatus::from_partitions(partitions.iter().map(|p| &p.status));
        self.partitions = partitions;
        self.ended_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, failure: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.failure = Some(failure.into());
        self.ended_at = Some(Utc::now());
    }

    /// Counters summed over every partition
    pub fn totals(&self) -> StepMetrics {
        StepMetrics::sum(self.partitions.iter().map(|p| &p.metrics))
    }

    /// Wall-clock run time, once the job has ended
    pub fn duration(&self) -> Option<Duration> {
        self.ended_at
            .and_then(|ended_at| (ended_at - self.started_at).to_std().ok())
    }
}
