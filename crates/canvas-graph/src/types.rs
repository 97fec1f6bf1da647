//! Core data model for canvases: nodes, handles, edges, templates and the
//! result envelope every node produces.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Unique identifier for a canvas
pub type CanvasId = String;
/// Unique identifier for a node
pub type NodeId = String;
/// Unique identifier for a handle
pub type HandleId = String;
/// Unique identifier for an edge
pub type EdgeId = String;
/// Unique identifier for a node template
pub type TemplateId = String;

/// The typed kind of data carried by a handle / item.
///
/// Closed set, extended only by adding a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Text,
    Number,
    Boolean,
    Image,
    Mask,
    Video,
    Audio,
    File,
    Lottie,
}

/// Direction of a handle on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleDirection {
    Input,
    Output,
}

/// The tag identifying a node's processor. The set of well-known kinds is
/// closed for the engine's own purposes, but the wire representation stays
/// an open string so a patch naming a kind the engine doesn't recognize
/// still round-trips instead of being rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKind(pub String);

impl NodeKind {
    pub const TEXT: &'static str = "text";
    pub const FILE: &'static str = "file";
    pub const LLM: &'static str = "llm";
    pub const IMAGE_GEN: &'static str = "image-gen";
    pub const COMPOSITOR: &'static str = "compositor";
    pub const VIDEO_COMPOSITOR: &'static str = "video-compositor";
    pub const PAINT: &'static str = "paint";
    pub const PREVIEW: &'static str = "preview";
    pub const EXPORT: &'static str = "export";

    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_compositor(&self) -> bool {
        self.0 == Self::COMPOSITOR || self.0 == Self::VIDEO_COMPOSITOR
    }

    pub fn is_export(&self) -> bool {
        self.0 == Self::EXPORT
    }
}

impl From<&str> for NodeKind {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 2D position on the canvas surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A typed port on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handle {
    pub id: HandleId,
    pub node_id: NodeId,
    pub direction: HandleDirection,
    pub data_types: HashSet<DataType>,
    pub label: String,
    /// Only meaningful for `Input` handles.
    pub required: bool,
    pub order: u32,
    pub template_handle_id: Option<String>,
}

impl Handle {
    pub fn accepts(&self, data_type: DataType) -> bool {
        self.data_types.contains(&data_type)
    }
}

/// A directed connection between an output handle and an input handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub source_handle_id: HandleId,
    pub target_handle_id: HandleId,
}

/// Static metadata describing a node type, used by the engine only for its
/// terminal/transient flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTemplate {
    pub kind: NodeKind,
    pub display_name: String,
    pub variable_inputs: bool,
    pub variable_outputs: bool,
    pub is_terminal_node: bool,
    pub is_transient: bool,
}

/// A processing unit on a canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub canvas_id: CanvasId,
    pub kind: NodeKind,
    pub name: String,
    pub position: Position,
    pub width: f64,
    pub height: f64,
    pub template_id: TemplateId,
    pub config: serde_json::Value,
    pub result: ResultEnvelope,
    /// Set when this node was produced by duplication: points at the
    /// source-canvas node it was cloned from.
    pub original_node_id: Option<NodeId>,
}

/// A top-level container owning nodes, handles and edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub id: CanvasId,
    pub owner: String,
    /// Set when this canvas was produced by duplication.
    pub original_canvas_id: Option<CanvasId>,
    pub is_api_canvas: bool,
    pub version: u64,
}

/// Reference to a persisted asset (object storage is out of scope; this is
/// the metadata shape the engine passes around).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReference {
    pub id: String,
    pub key: String,
    pub bucket: String,
    pub mime_type: String,
    pub dimensions: Option<(u32, u32)>,
    pub duration_ms: Option<u64>,
}

/// Inline, transient form of media data: a data URL / signed URL plus
/// metadata, used when persisting a full asset would be wasteful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessData {
    pub data_url: Option<String>,
    pub signed_url: Option<String>,
    pub mime_type: String,
}

/// The operation tag on one node of a `VirtualMediaTree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaOperation {
    Source,
    Text,
    Cut,
    Crop,
    Speed,
    Filter,
    Flip,
    Rotate,
    Compose,
    Layer,
}

/// A recursive operation tree used by video/compositor pipelines. Leaves are
/// source nodes; the root's metadata describes the final rendered output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMediaTree {
    pub operation: MediaOperation,
    pub source_meta: serde_json::Value,
    #[serde(default)]
    pub children: Vec<VirtualMediaTree>,
}

/// The polymorphic payload an item can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemData {
    Primitive(serde_json::Value),
    FileReference(FileReference),
    ProcessData(ProcessData),
    VirtualMediaTree(VirtualMediaTree),
}

/// One piece of data flowing out of an output handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub data_type: DataType,
    pub data: ItemData,
    pub output_handle_id: HandleId,
}

/// One output slot of a node's result (a node may offer several candidate
/// outputs; `selected_output_index` on the envelope picks one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Output {
    pub items: Vec<Item>,
}

/// Every node's `result` conforms to this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResultEnvelope {
    pub outputs: Vec<Output>,
    pub selected_output_index: usize,
}

impl ResultEnvelope {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The currently selected output, if any. `selected_output_index` is
    /// only meaningful when `outputs` is non-empty (it is `0` otherwise).
    pub fn selected_output(&self) -> Option<&Output> {
        self.outputs.get(self.selected_output_index)
    }
}
