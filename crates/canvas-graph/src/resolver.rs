//! Graph Resolver (C1): per-node I/O lookup over a [`CanvasSnapshot`].
//!
//! Every function here is pure over its snapshot argument — none of them
//! mutate the canvas. This is the boundary the Workflow Processor hands to
//! node processors so they can read their own inputs without knowing
//! anything about edges or upstream node layout.

use crate::error::{GraphError, Result};
use crate::snapshot::CanvasSnapshot;
use crate::types::{DataType, HandleDirection, Item, NodeId};

/// Selector used by [`GraphResolver::get_input_value`] and
/// [`GraphResolver::get_input_values_by_type`]: a handle is matched by its
/// accepted data type and, for the single-value lookup, its label too.
#[derive(Debug, Clone)]
pub struct InputSelector {
    pub data_type: DataType,
    pub label: Option<String>,
}

/// A resolved input: the handle it arrived on (preserving declaration
/// order) and the item found there, if the edge resolved to one.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub handle_id: String,
    pub item: Option<Item>,
}

pub struct GraphResolver<'a> {
    snapshot: &'a CanvasSnapshot,
}

impl<'a> GraphResolver<'a> {
    pub fn new(snapshot: &'a CanvasSnapshot) -> Self {
        Self { snapshot }
    }

    /// Find the Input handle on `node_id` matching both `label` and
    /// `data_type`, follow its unique incoming edge to the upstream node,
    /// and select the item in that node's current result matching the
    /// edge's `source_handle_id`.
    ///
    /// Fails `MissingRequiredInput` if `required` and any step fails;
    /// returns `Ok(None)` if not required and any step fails.
    pub fn get_input_value(
        &self,
        node_id: &str,
        required: bool,
        selector: &InputSelector,
    ) -> Result<Option<Item>> {
        let label = selector.label.as_deref().unwrap_or_default();
        let handle = self
            .snapshot
            .input_handles(node_id)
            .into_iter()
            .find(|h| h.label == label && h.accepts(selector.data_type));

        let resolved = handle.and_then(|h| self.resolve_handle(&h.id));

        match resolved {
            Some(item) => Ok(Some(item)),
            None if required => Err(GraphError::missing_required(node_id, label)),
            None => Ok(None),
        }
    }

    /// All Input handles on `node_id` whose `data_types` include
    /// `data_type`, each resolved to its item (or skipped if unresolved),
    /// in handle `order`.
    pub fn get_input_values_by_type(&self, node_id: &str, data_type: DataType) -> Vec<Item> {
        self.snapshot
            .input_handles(node_id)
            .into_iter()
            .filter(|h| h.accepts(data_type))
            .filter_map(|h| self.resolve_handle(&h.id))
            .collect()
    }

    /// Every Input handle on the node, each paired with its currently
    /// resolved item (or `None`), preserving handle `order`.
    pub fn get_all_input_values_with_handle(&self, node_id: &str) -> Vec<ResolvedInput> {
        self.snapshot
            .input_handles(node_id)
            .into_iter()
            .map(|h| ResolvedInput {
                handle_id: h.id.clone(),
                item: self.resolve_handle(&h.id),
            })
            .collect()
    }

    /// Look up the item feeding a single input handle by id.
    fn resolve_handle(&self, handle_id: &str) -> Option<Item> {
        let edge = self.snapshot.edge_into(handle_id)?;
        let source_node = self.snapshot.node(&edge.source)?;
        let output = source_node.result.selected_output()?;
        output
            .items
            .iter()
            .find(|item| item.output_handle_id == edge.source_handle_id)
            .cloned()
    }

    /// Resolve an item carrying a `FileReference` or `ProcessData` payload
    /// into raw bytes. This is the single boundary across which media bytes
    /// enter node processors; fetching from storage / decoding a data URL
    /// is delegated to a host-supplied [`MediaBufferSource`] since object
    /// storage is out of scope for this engine.
    pub fn load_media_buffer(
        &self,
        item: &Item,
        source: &dyn MediaBufferSource,
    ) -> Result<Vec<u8>> {
        source.load(item)
    }

    /// Full reverse-dependency graph over every node on the canvas: for
    /// each edge, `target -> source`. Used by the Workflow Processor to
    /// compute the upstream closure of a selection.
    pub fn reverse_dependencies(&self) -> std::collections::HashMap<NodeId, Vec<NodeId>> {
        let mut reverse: std::collections::HashMap<NodeId, Vec<NodeId>> =
            std::collections::HashMap::new();
        for edge in &self.snapshot.edges {
            reverse
                .entry(edge.target.clone())
                .or_default()
                .push(edge.source.clone());
        }
        reverse
    }
}

/// Host boundary for turning a `FileReference`/`ProcessData` item into raw
/// bytes. Implemented by whatever embeds this crate; never implemented
/// here, since object storage and media decoding are out of scope.
pub trait MediaBufferSource {
    fn load(&self, item: &Item) -> Result<Vec<u8>>;
}

/// A source that always fails — useful as a default in tests that never
/// touch media bytes.
pub struct NullMediaBufferSource;

impl MediaBufferSource for NullMediaBufferSource {
    fn load(&self, item: &Item) -> Result<Vec<u8>> {
        Err(GraphError::MediaLoadFailed(format!(
            "no media buffer source configured (item on handle {})",
            item.output_handle_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CanvasBuilder;

    #[test]
    fn resolves_required_input_across_an_edge() {
        let (snapshot, ids) = CanvasBuilder::new("c1", "owner")
            .node("a", "text")
            .output_handle("a", "out", DataType::Text)
            .node("b", "echo")
            .input_handle("b", "in", DataType::Text, true)
            .edge("a", "out", "b", "in")
            .with_text_output("a", "out", "hi")
            .build();

        let resolver = GraphResolver::new(&snapshot);
        let item = resolver
            .get_input_value(
                &ids.node("b"),
                true,
                &InputSelector {
                    data_type: DataType::Text,
                    label: Some("in".to_string()),
                },
            )
            .unwrap()
            .expect("resolved item");

        match item.data {
            crate::types::ItemData::Primitive(v) => assert_eq!(v, serde_json::json!("hi")),
            other => panic!("unexpected item data: {other:?}"),
        }
    }

    #[test]
    fn missing_required_input_fails() {
        let (snapshot, ids) = CanvasBuilder::new("c1", "owner")
            .node("b", "echo")
            .input_handle("b", "in", DataType::Text, true)
            .build();

        let resolver = GraphResolver::new(&snapshot);
        let err = resolver
            .get_input_value(
                &ids.node("b"),
                true,
                &InputSelector {
                    data_type: DataType::Text,
                    label: Some("in".to_string()),
                },
            )
            .unwrap_err();

        assert!(matches!(err, GraphError::MissingRequiredInput { .. }));
    }

    #[test]
    fn missing_optional_input_returns_none() {
        let (snapshot, ids) = CanvasBuilder::new("c1", "owner")
            .node("b", "echo")
            .input_handle("b", "in", DataType::Text, false)
            .build();

        let resolver = GraphResolver::new(&snapshot);
        let result = resolver
            .get_input_value(
                &ids.node("b"),
                false,
                &InputSelector {
                    data_type: DataType::Text,
                    label: Some("in".to_string()),
                },
            )
            .unwrap();

        assert!(result.is_none());
    }
}
