//! Engine configuration
//!
//! Values come from code (`with_*` builders), serde, or `BATCH_*` environment
//! variables:
//!
//! | variable                 | default |
//! |--------------------------|---------|
//! | `BATCH_CHUNK_SIZE`       | 1000    |
//! | `BATCH_PAGE_SIZE`        | 1000    |
//! | `BATCH_GRID_SIZE`        | 4       |
//! | `BATCH_THREAD_COUNT`     | 4       |
//! | `BATCH_RETRY_LIMIT`      | 3       |
//! | `BATCH_RETRY_BACKOFF_MS` | 0       |
//! | `BATCH_SKIP_LIMIT`       | 100     |

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reliability::RetryPolicy;
use crate::step::StepSettings;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A numeric setting is out of range
    #[error("{field} must be at least {min}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: u64,
        value: u64,
    },

    /// An environment variable does not parse
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

fn at_least(field: &'static str, value: u64, min: u64) -> Result<(), ConfigError> {
    if value < min {
        return Err(ConfigError::OutOfRange { field, min, value });
    }
    Ok(())
}

/// Per-run arguments of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParameters {
    /// Target number of partitions
    pub grid_size: usize,

    /// Items per committed chunk
    pub chunk_size: usize,

    /// Partitions running at the same time
    pub thread_count: usize,
}

impl Default for JobParameters {
    fn default() -> Self {
        BatchConfig::default().job_parameters()
    }
}

impl JobParameters {
    pub fn new(grid_size: usize, chunk_size: usize, thread_count: usize) -> Self {
        Self {
            grid_size,
            chunk_size,
            thread_count,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        at_least("grid_size", self.grid_size as u64, 1)?;
        at_least("chunk_size", self.chunk_size as u64, 1)?;
        at_least("thread_count", self.thread_count as u64, 1)
    }
}

/// Batch engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Items per committed chunk
    pub chunk_size: usize,

    /// Items fetched per store read
    pub page_size: usize,

    /// Target number of partitions
    pub grid_size: usize,

    /// Partitions running at the same time
    pub thread_count: usize,

    /// Operation attempts per item for transient faults
    pub retry_limit: u32,

    /// Initial delay between transient retries, doubled per retry
    pub retry_backoff_ms: u64,

    /// Skip-eligible items tolerated per partition
    pub skip_limit: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            page_size: 1000,
            grid_size: 4,
            thread_count: 4,
            retry_limit: 3,
            retry_backoff_ms: 0,
            skip_limit: 100,
        }
    }
}

impl BatchConfig {
    /// Load configuration from `BATCH_*` environment variables
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through a variable lookup function
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn read<T: FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            var: &'static str,
            default: T,
        ) -> Result<T, ConfigError> {
            match lookup(var) {
                None => Ok(default),
                Some(value) => value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidEnv { var, value }),
            }
        }

        let defaults = Self::default();
        Ok(Self {
            chunk_size: read(&lookup, "BATCH_CHUNK_SIZE", defaults.chunk_size)?,
            page_size: read(&lookup, "BATCH_PAGE_SIZE", defaults.page_size)?,
            grid_size: read(&lookup, "BATCH_GRID_SIZE", defaults.grid_size)?,
            thread_count: read(&lookup, "BATCH_THREAD_COUNT", defaults.thread_count)?,
            retry_limit: read(&lookup, "BATCH_RETRY_LIMIT", defaults.retry_limit)?,
            retry_backoff_ms: read(&lookup, "BATCH_RETRY_BACKOFF_MS", defaults.retry_backoff_ms)?,
            skip_limit: read(&lookup, "BATCH_SKIP_LIMIT", defaults.skip_limit)?,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_grid_size(mut self, grid_size: usize) -> Self {
        self.grid_size = grid_size;
        self
    }

    pub fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_skip_limit(mut self, skip_limit: u64) -> Self {
        self.skip_limit = skip_limit;
        self
    }

    /// Check every bound
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.job_parameters().validate()?;
        self.validate_run_settings()
    }

    /// Check the bounds that [`JobParameters`] do not override
    pub fn validate_run_settings(&self) -> Result<(), ConfigError> {
        at_least("page_size", self.page_size as u64, 1)?;
        at_least("retry_limit", u64::from(self.retry_limit), 1)
    }

    /// Retry policy for transient item faults
    pub fn retry_policy(&self) -> RetryPolicy {
        if self.retry_backoff_ms == 0 {
            RetryPolicy::immediate(self.retry_limit)
        } else {
            RetryPolicy::exponential()
                .with_max_attempts(self.retry_limit)
                .with_initial_interval(Duration::from_millis(self.retry_backoff_ms))
        }
    }

    /// Run arguments derived from this configuration
    pub fn job_parameters(&self) -> JobParameters {
        JobParameters::new(self.grid_size, self.chunk_size, self.thread_count)
    }

    /// Step settings for the given chunk size
    pub(crate) fn step_settings(&self, chunk_size: usize) -> StepSettings {
        StepSettings {
            chunk_size,
            page_size: self.page_size,
            skip_limit: self.skip_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BatchConfig::default();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.page_size, 1000);
        assert_eq!(config.grid_size, 4);
        assert_eq!(config.thread_count, 4);
        assert_eq!(config.retry_limit, 3);
        assert_eq!(config.skip_limit, 100);
        assert!(config.validate().is_ok());
        assert_eq!(JobParameters::default(), JobParameters::new(4, 1000, 4));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = BatchConfig::from_lookup(lookup(&[
            ("BATCH_CHUNK_SIZE", "50"),
            ("BATCH_THREAD_COUNT", " 8 "),
            ("BATCH_SKIP_LIMIT", "0"),
        ]))
        .unwrap();

        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.thread_count, 8);
        assert_eq!(config.skip_limit, 0);
        assert_eq!(config.grid_size, 4);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = BatchConfig::from_lookup(lookup(&[("BATCH_GRID_SIZE", "four")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnv {
                var: "BATCH_GRID_SIZE",
                value: "four".to_string()
            }
        );
    }

    #[test]
    fn test_validate_bounds() {
        let err = BatchConfig::default().with_chunk_size(0).validate().unwrap_err();
        assert_eq!(err.to_string(), "chunk_size must be at least 1, got 0");

        assert!(BatchConfig::default().with_thread_count(0).validate().is_err());
        assert!(BatchConfig::default().with_grid_size(0).validate().is_err());
        assert!(BatchConfig::default().with_page_size(0).validate().is_err());
        assert!(BatchConfig::default().with_retry_limit(0).validate().is_err());
        assert!(BatchConfig::default().with_skip_limit(0).validate().is_ok());
    }

    #[test]
    fn test_run_settings_ignore_job_parameters() {
        let config = BatchConfig::default()
            .with_grid_size(0)
            .with_chunk_size(0)
            .with_thread_count(0);
        assert!(config.validate().is_err());
        assert!(config.validate_run_settings().is_ok());

        let err = config.with_page_size(0).validate_run_settings().unwrap_err();
        assert_eq!(err.to_string(), "page_size must be at least 1, got 0");
    }

    #[test]
    fn test_retry_policy() {
        let immediate = BatchConfig::default().with_retry_limit(5).retry_policy();
        assert_eq!(immediate.max_attempts, 5);
        assert_eq!(immediate.delay_for_attempt(2), Duration::ZERO);

        let backoff = BatchConfig::default()
            .with_retry_backoff(Duration::from_millis(250))
            .retry_policy();
        assert_eq!(backoff.max_attempts, 3);
        assert_eq!(backoff.initial_interval, Duration::from_millis(250));

        let saturated = BatchConfig::default().with_retry_backoff(Duration::MAX);
        assert_eq!(saturated.retry_backoff_ms, u64::MAX);
    }

    #[test]
    fn test_serde_fills_missing_fields() {
        let config: BatchConfig = serde_json::from_str(r#"{"chunk_size": 10}"#).unwrap();
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.skip_limit, 100);
    }
}
