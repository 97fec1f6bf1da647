//! Persisted state layout: the `CanvasStore` trait plus an in-memory
//! reference implementation.
//!
//! This crate owns the tables `canvas-graph` has no reason to know about
//! — `TaskBatch`/`Task` run bookkeeping and `FileAsset` metadata — and the
//! storage boundary (`CanvasStore`) that `canvas-mutation` and
//! `workflow-processor` are written against. Nothing here decides *when*
//! to call these operations; that's each caller's job.

pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use memory::InMemoryCanvasStore;
pub use store::{CanvasGraphData, CanvasStore};
pub use types::{BatchId, DispatchEnvelope, FileAsset, Task, TaskBatch, TaskError, TaskId, TaskStatus};
