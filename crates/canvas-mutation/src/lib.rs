//! Canvas Mutation Engine and Canvas Cloner: the two graph-editing
//! operations that sit in front of the Workflow Processor.

mod cloner;
mod error;
mod mutation;
mod patch;
mod remap;

pub use cloner::{duplicate, CloneOptions};
pub use error::{MutationError, Result};
pub use mutation::apply_canvas_update;
pub use patch::{is_temp_id, ApplyResult, CanvasPatch, EdgePatchItem, HandlePatchItem, NodePatchItem};
pub use remap::IdMaps;
