//! Chunk-oriented step execution
//!
//! A step reads pending items in chunks, applies the item operation to each
//! one and commits every chunk as a single store transaction:
//! - [`ChunkReader`] - keyset-paged reader, optionally scoped to a partition
//! - [`ItemProcessor`] - retry/skip handling around the item operation
//! - [`ChunkWriter`] - all-or-nothing chunk persistence
//! - [`StepExecutor`] - the loop tying them together

mod executor;
mod metrics;
mod processor;
mod reader;
mod writer;

pub use executor::{StepError, StepExecution, StepExecutor, StepSettings, StepState, StepStatus};
pub use metrics::StepMetrics;
pub use processor::{classify, FaultDecision, ItemProcessor, ProcessedItem};
pub use reader::{ChunkReader, DEFAULT_PAGE_SIZE};
pub use writer::ChunkWriter;
