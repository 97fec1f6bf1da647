//! Error types for the Canvas Mutation Engine and Canvas Cloner.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MutationError>;

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("canvas not found: {0}")]
    CanvasNotFound(String),

    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    #[error(transparent)]
    Store(#[from] canvas_store::StoreError),
}
