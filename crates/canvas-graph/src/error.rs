//! Error types for the canvas data model and graph resolver

use thiserror::Error;

/// Result type alias using GraphError
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised while resolving node inputs against a canvas snapshot
#[derive(Debug, Error)]
pub enum GraphError {
    /// A required input handle had no resolvable upstream value
    #[error("missing required input: node {node_id} handle '{label}'")]
    MissingRequiredInput { node_id: String, label: String },

    /// The node referenced does not exist in the snapshot
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// A handle referenced by id does not exist in the snapshot
    #[error("handle not found: {0}")]
    HandleNotFound(String),

    /// An item's data could not be resolved into a media buffer
    #[error("failed to load media buffer: {0}")]
    MediaLoadFailed(String),

    /// Serialization error touching an opaque JSON field
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error surfaced while decoding a data URL or similar
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphError {
    pub fn missing_required(node_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::MissingRequiredInput {
            node_id: node_id.into(),
            label: label.into(),
        }
    }
}
