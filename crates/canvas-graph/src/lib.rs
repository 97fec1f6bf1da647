//! Canvas data model and Graph Resolver (C1).
//!
//! This crate owns the shared vocabulary every other crate in the workspace
//! builds on: the Canvas/Node/Handle/Edge/NodeTemplate data model, the
//! Result Envelope every node produces, and a pure, read-only resolver over
//! a canvas snapshot that looks up a node's inputs by handle label or data
//! type.
//!
//! Nothing here mutates a canvas — that's `canvas-mutation`'s job — and
//! nothing here schedules work — that's `workflow-processor`'s job. This
//! crate is the shared ground floor both stand on.

pub mod builder;
pub mod error;
pub mod resolver;
pub mod snapshot;
pub mod types;

pub use builder::{BuiltIds, CanvasBuilder};
pub use error::{GraphError, Result};
pub use resolver::{GraphResolver, InputSelector, MediaBufferSource, NullMediaBufferSource, ResolvedInput};
pub use snapshot::CanvasSnapshot;
pub use types::{
    Canvas, CanvasId, DataType, Edge, EdgeId, FileReference, Handle, HandleDirection, HandleId,
    Item, ItemData, MediaOperation, Node, NodeId, NodeKind, NodeTemplate, Output, Position,
    ProcessData, ResultEnvelope, TemplateId, VirtualMediaTree,
};
