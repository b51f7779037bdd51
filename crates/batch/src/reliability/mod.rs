//! Reliability patterns for item processing
//!
//! This module provides:
//! - [`RetryPolicy`] - In-process retry of transient item faults

mod retry;

pub use retry::RetryPolicy;
