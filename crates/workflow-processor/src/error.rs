//! Error types for plan construction and task execution (`spec.md` §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProcessError>;

/// Failures surfaced synchronously from `process_nodes`, before any batch
/// is created.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("canvas not found: {0}")]
    CanvasNotFound(String),

    /// `spec.md` §4.4.1 step 7: the retained subgraph's topological sort
    /// did not cover every retained node.
    #[error("cycle detected in selection closure")]
    CycleDetected,

    /// `spec.md` §4.4.1 step 8 / §4.4.1 step 3: a necessary node could not
    /// be loaded, or the caller selected an id that doesn't exist.
    #[error("inconsistent canvas: {0}")]
    InconsistentCanvas(String),

    #[error(transparent)]
    Store(#[from] canvas_store::StoreError),
}

/// The distinct task-level failure messages named in `spec.md` §4.4.4,
/// mapped onto `canvas_store::TaskError` at the point a task is marked
/// `FAILED`.
#[derive(Debug, Error, Clone)]
pub enum TaskFailure {
    #[error("Node removed before processing")]
    NodeRemoved,

    #[error("No processor for type {0}")]
    NoProcessor(String),

    #[error("{0}")]
    Processor(String),
}

impl TaskFailure {
    pub fn into_task_error(self) -> canvas_store::TaskError {
        canvas_store::TaskError::new(self.to_string())
    }
}
