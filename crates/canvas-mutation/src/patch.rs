//! The wire shape of a bulk canvas patch.

use std::collections::HashSet;

use canvas_graph::{DataType, HandleDirection, NodeId, Position, ResultEnvelope};
use serde::{Deserialize, Serialize};

/// `patch = { nodes?, handles?, edges? }`. Items may carry a `temp-`
/// prefixed client-allocated placeholder id or a real server id (for
/// updates).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasPatch {
    #[serde(default)]
    pub nodes: Option<Vec<NodePatchItem>>,
    #[serde(default)]
    pub handles: Option<Vec<HandlePatchItem>>,
    #[serde(default)]
    pub edges: Option<Vec<EdgePatchItem>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatchItem {
    pub id: String,
    pub kind: canvas_graph::NodeKind,
    pub name: String,
    pub position: Position,
    pub width: f64,
    pub height: f64,
    pub template_id: String,
    #[serde(default)]
    pub config: serde_json::Value,
    /// Present only when the client is submitting a new result for this
    /// node (most patches leave this `None`; node execution writes results
    /// through the Workflow Processor, not through a patch).
    #[serde(default)]
    pub result: Option<ResultEnvelope>,
    #[serde(default)]
    pub original_node_id: Option<NodeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlePatchItem {
    pub id: String,
    pub node_id: String,
    pub direction: HandleDirection,
    pub data_types: HashSet<DataType>,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    pub order: u32,
    #[serde(default)]
    pub template_handle_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgePatchItem {
    pub id: String,
    pub source: String,
    pub target: String,
    pub source_handle_id: String,
    pub target_handle_id: String,
}

/// Outcome of a successful [`crate::mutation::apply_canvas_update`] call:
/// the new canvas version and the id mapping table so the client can
/// reconcile optimistic-update state.
#[derive(Debug, Clone, Default)]
pub struct ApplyResult {
    pub version: u64,
    pub node_id_map: std::collections::HashMap<String, String>,
    pub handle_id_map: std::collections::HashMap<String, String>,
    pub edge_id_map: std::collections::HashMap<String, String>,
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with("temp-")
}
