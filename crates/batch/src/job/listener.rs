//! Job lifecycle hooks

use tracing::info;

use super::record::JobExecutionRecord;

/// Callbacks around a job run
///
/// Hooks run on the coordinator task, in registration order. `before_job`
/// sees the `Running` record, `after_job` the finalized one.
pub trait JobExecutionListener: Send + Sync {
    fn before_job(&self, _record: &JobExecutionRecord) {}

    fn after_job(&self, _record: &JobExecutionRecord) {}
}

/// Logs a start banner and a per-partition summary
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingJobListener;

const BANNER: &str = "========================================";

impl JobExecutionListener for LoggingJobListener {
    fn before_job(&self, record: &JobExecutionRecord) {
        info!("{BANNER}");
        info!("Job Started");
        info!("Job Name: {}", record.job_name);
        info!("Job Id: {}", record.job_id);
        info!("Start Time: {}", record.started_at);
        info!("{BANNER}");
    }

    fn after_job(&self, record: &JobExecutionRecord) {
        let seconds = record.duration().map(|d| d.as_secs()).unwrap_or(0);

        info!("{BANNER}");
        info!("Job Finished");
        info!("Status: {}", record.status);
        if let Some(failure) = &record.failure {
            info!("Failure: {failure}");
        }
        info!("Duration: {seconds} seconds");
        for partition in &record.partitions {
            let m = &partition.metrics;
            info!("Partition: {} ({:?})", partition.range, partition.status);
            info!("  - Read Count: {}", m.read_count);
            info!("  - Write Count: {}", m.write_count);
            info!("  - Skip Count: {}", m.skip_count);
            info!("  - Retry Count: {}", m.retry_count);
            info!("  - Commit Count: {}", m.commit_count);
            info!("  - Rollback Count: {}", m.rollback_count);
        }
        info!("{BANNER}");
    }
}
