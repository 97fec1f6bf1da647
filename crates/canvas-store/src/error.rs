//! Error types for the persisted-state layer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("canvas not found: {0}")]
    CanvasNotFound(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("batch not found: {0}")]
    BatchNotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("asset not found: {0}")]
    AssetNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn canvas_not_found(id: impl Into<String>) -> Self {
        Self::CanvasNotFound(id.into())
    }
}
