//! A read-only, in-memory view of a canvas: the input the Graph Resolver,
//! Workflow Processor and Canvas Mutation Engine all operate over.

use std::collections::HashMap;

use crate::types::{Canvas, Edge, Handle, HandleId, Node, NodeId, NodeTemplate, TemplateId};

/// An immutable snapshot of one canvas's nodes, handles and edges, plus the
/// templates referenced by those nodes.
///
/// Resolver operations are pure over a snapshot; nothing in this crate
/// mutates one in place. Callers that need a fresher view (e.g. the worker
/// refreshing upstream results between tasks) build a new snapshot or patch
/// individual node results via [`CanvasSnapshot::with_node_result`].
#[derive(Debug, Clone)]
pub struct CanvasSnapshot {
    pub canvas: Canvas,
    pub nodes: HashMap<NodeId, Node>,
    pub handles: HashMap<HandleId, Handle>,
    pub edges: Vec<Edge>,
    pub templates: HashMap<TemplateId, NodeTemplate>,
}

impl CanvasSnapshot {
    pub fn new(
        canvas: Canvas,
        nodes: Vec<Node>,
        handles: Vec<Handle>,
        edges: Vec<Edge>,
        templates: Vec<NodeTemplate>,
    ) -> Self {
        let nodes = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        let handles = handles.into_iter().map(|h| (h.id.clone(), h)).collect();
        let templates = templates
            .into_iter()
            .map(|t| (t.kind.as_str().to_string(), t))
            .collect();
        Self {
            canvas,
            nodes,
            handles,
            edges,
            templates,
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn handle(&self, id: &str) -> Option<&Handle> {
        self.handles.get(id)
    }

    pub fn template_for(&self, node: &Node) -> Option<&NodeTemplate> {
        self.templates.get(&node.template_id)
    }

    /// Input handles on `node_id`, in ascending `order`.
    pub fn input_handles(&self, node_id: &str) -> Vec<&Handle> {
        let mut handles: Vec<&Handle> = self
            .handles
            .values()
            .filter(|h| {
                h.node_id == node_id && matches!(h.direction, crate::types::HandleDirection::Input)
            })
            .collect();
        handles.sort_by_key(|h| h.order);
        handles
    }

    /// The edge whose `target_handle_id` equals `handle_id`, if any. A given
    /// target handle receives at most one edge.
    pub fn edge_into(&self, handle_id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.target_handle_id == handle_id)
    }

    /// Replace a node's `result` in place, used to thread freshly-produced
    /// results through the in-memory snapshot during batch execution.
    pub fn with_node_result(&mut self, node_id: &str, result: crate::types::ResultEnvelope) {
        if let Some(node) = self.nodes.get_mut(node_id) {
            node.result = result;
        }
    }
}
