//! Persistence layer for work items
//!
//! This module provides:
//! - [`WorkItemStore`] trait for paged reads and transactional chunk writes
//! - [`InMemoryWorkItemStore`] for testing, with injectable faults
//! - [`PostgresWorkItemStore`] for production

mod memory;
mod postgres;
mod store;

pub use memory::{FailurePlan, InMemoryWorkItemStore};
pub use postgres::PostgresWorkItemStore;
pub use store::{StatusCounts, StoreError, UpdatedWindow, WorkItemStore};
