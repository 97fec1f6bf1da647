//! Fluent builder for constructing canvas fixtures in tests.
//!
//! A chainable API that assembles a graph plus the template/handle
//! scaffolding it needs to resolve. Node keys are used verbatim as node ids and
//! `"{node}:{label}"` as handle ids, so tests can address fixtures by the
//! same short names they were declared with.

use std::collections::{HashMap, HashSet};

use crate::types::{
    Canvas, DataType, Edge, Handle, HandleDirection, Item, ItemData, Node, NodeKind, NodeTemplate,
    Output, Position, ResultEnvelope,
};
use crate::snapshot::CanvasSnapshot;

/// Maps the short keys passed to [`CanvasBuilder`] back to the ids they were
/// assigned (currently identical, but callers should go through this rather
/// than assume that).
pub struct BuiltIds {
    node_ids: HashMap<String, String>,
    handle_ids: HashMap<(String, String), String>,
}

impl BuiltIds {
    pub fn node(&self, key: &str) -> String {
        self.node_ids
            .get(key)
            .unwrap_or_else(|| panic!("unknown node key '{key}'"))
            .clone()
    }

    pub fn handle(&self, node_key: &str, label: &str) -> String {
        self.handle_ids
            .get(&(node_key.to_string(), label.to_string()))
            .unwrap_or_else(|| panic!("unknown handle '{node_key}:{label}'"))
            .clone()
    }
}

pub struct CanvasBuilder {
    canvas: Canvas,
    nodes: Vec<Node>,
    handles: Vec<Handle>,
    edges: Vec<Edge>,
    templates: HashMap<String, NodeTemplate>,
    node_ids: HashMap<String, String>,
    handle_ids: HashMap<(String, String), String>,
    handle_order: HashMap<String, u32>,
    edge_counter: usize,
}

impl CanvasBuilder {
    pub fn new(canvas_id: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            canvas: Canvas {
                id: canvas_id.into(),
                owner: owner.into(),
                original_canvas_id: None,
                is_api_canvas: false,
                version: 0,
            },
            nodes: Vec::new(),
            handles: Vec::new(),
            edges: Vec::new(),
            templates: HashMap::new(),
            node_ids: HashMap::new(),
            handle_ids: HashMap::new(),
            handle_order: HashMap::new(),
            edge_counter: 0,
        }
    }

    /// Add a node of `kind`, defaulting its template to non-terminal,
    /// non-transient. Use [`Self::terminal_node`] / [`Self::transient_node`]
    /// to override.
    pub fn node(mut self, key: &str, kind: &str) -> Self {
        self.insert_node(key, kind, false, false);
        self
    }

    pub fn terminal_node(mut self, key: &str, kind: &str) -> Self {
        self.insert_node(key, kind, true, false);
        self
    }

    pub fn transient_node(mut self, key: &str, kind: &str) -> Self {
        self.insert_node(key, kind, false, true);
        self
    }

    fn insert_node(&mut self, key: &str, kind: &str, is_terminal: bool, is_transient: bool) {
        // `CanvasSnapshot` keys templates by `kind`, not a separate template
        // id (there is exactly one template per node kind), so the two must
        // agree here.
        let template_id = kind.to_string();
        self.templates.entry(template_id.clone()).or_insert_with(|| NodeTemplate {
            kind: NodeKind::new(kind),
            display_name: kind.to_string(),
            variable_inputs: false,
            variable_outputs: false,
            is_terminal_node: is_terminal,
            is_transient,
        });
        self.nodes.push(Node {
            id: key.to_string(),
            canvas_id: self.canvas.id.clone(),
            kind: NodeKind::new(kind),
            name: key.to_string(),
            position: Position { x: 0.0, y: 0.0 },
            width: 200.0,
            height: 100.0,
            template_id,
            config: serde_json::json!({}),
            result: ResultEnvelope::empty(),
            original_node_id: None,
        });
        self.node_ids.insert(key.to_string(), key.to_string());
    }

    pub fn input_handle(mut self, node_key: &str, label: &str, data_type: DataType, required: bool) -> Self {
        self.insert_handle(node_key, label, HandleDirection::Input, data_type, required);
        self
    }

    pub fn output_handle(mut self, node_key: &str, label: &str, data_type: DataType) -> Self {
        self.insert_handle(node_key, label, HandleDirection::Output, data_type, false);
        self
    }

    fn insert_handle(
        &mut self,
        node_key: &str,
        label: &str,
        direction: HandleDirection,
        data_type: DataType,
        required: bool,
    ) {
        let id = format!("{node_key}:{label}");
        let order = self.handle_order.entry(node_key.to_string()).or_insert(0);
        let mut data_types = HashSet::new();
        data_types.insert(data_type);
        self.handles.push(Handle {
            id: id.clone(),
            node_id: node_key.to_string(),
            direction,
            data_types,
            label: label.to_string(),
            required,
            order: *order,
            template_handle_id: None,
        });
        *order += 1;
        self.handle_ids
            .insert((node_key.to_string(), label.to_string()), id);
    }

    /// Connect the output handle `src_label` on `src_key` to the input
    /// handle `tgt_label` on `tgt_key`.
    pub fn edge(mut self, src_key: &str, src_label: &str, tgt_key: &str, tgt_label: &str) -> Self {
        let id = format!("e{}", self.edge_counter);
        self.edge_counter += 1;
        self.edges.push(Edge {
            id,
            source: src_key.to_string(),
            target: tgt_key.to_string(),
            source_handle_id: format!("{src_key}:{src_label}"),
            target_handle_id: format!("{tgt_key}:{tgt_label}"),
        });
        self
    }

    /// Stamp a one-item text result onto `node_key`'s output handle
    /// `label`, as if that node had already executed.
    pub fn with_text_output(mut self, node_key: &str, label: &str, text: &str) -> Self {
        self.with_item_output(
            node_key,
            label,
            DataType::Text,
            ItemData::Primitive(serde_json::json!(text)),
        )
    }

    pub fn with_item_output(
        mut self,
        node_key: &str,
        label: &str,
        data_type: DataType,
        data: ItemData,
    ) -> Self {
        let handle_id = format!("{node_key}:{label}");
        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == node_key) {
            let item = Item {
                data_type,
                data,
                output_handle_id: handle_id,
            };
            if node.result.outputs.is_empty() {
                node.result.outputs.push(Output { items: vec![item] });
            } else {
                node.result.outputs[node.result.selected_output_index]
                    .items
                    .push(item);
            }
        }
        self
    }

    pub fn build(self) -> (CanvasSnapshot, BuiltIds) {
        let templates: Vec<NodeTemplate> = self.templates.into_values().collect();
        let snapshot = CanvasSnapshot::new(self.canvas, self.nodes, self.handles, self.edges, templates);
        let ids = BuiltIds {
            node_ids: self.node_ids,
            handle_ids: self.handle_ids,
        };
        (snapshot, ids)
    }
}
