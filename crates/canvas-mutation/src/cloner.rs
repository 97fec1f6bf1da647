//! Canvas Cloner (C3): deep duplication of a canvas with full reference
//! rewriting.

use std::collections::HashMap;

use canvas_graph::{Canvas, Edge, Handle, Node};
use canvas_store::CanvasStore;

use crate::error::{MutationError, Result};
use crate::remap::rewrite_layer_updates;

/// Options controlling what survives into the duplicate (`spec.md` §4.3:
/// `{ isAPICanvas, keepResults, ownerOverride? }`).
#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    /// Carry over each node's persisted `result` rather than resetting it
    /// to `ResultEnvelope::empty()`.
    pub keep_results: bool,
    /// Stamped onto the new canvas's `is_api_canvas` flag (`spec.md` §3:
    /// "cloned for one-shot API runs").
    pub is_api_canvas: bool,
    /// Owner of the new canvas. Defaults to the source canvas's own owner
    /// when unset, per `spec.md` §4.3's optional `ownerOverride`.
    pub owner_override: Option<String>,
}

/// Deep-duplicate `source_canvas_id` into a brand-new canvas: fetch, first
/// pass (nodes+handles with fresh ids), second pass (reference fixup),
/// third pass (edges via the two id maps, defensively dropping anything
/// that doesn't fully resolve). The new canvas's owner is `options`'
/// `owner_override` if set, otherwise the source canvas's own owner
/// (`spec.md` §4.3 step 2: "given ownership").
pub async fn duplicate(store: &dyn CanvasStore, source_canvas_id: &str, options: CloneOptions) -> Result<Canvas> {
    if !store.canvas_exists(source_canvas_id).await {
        return Err(MutationError::CanvasNotFound(source_canvas_id.to_string()));
    }
    let source = store.load_graph(source_canvas_id).await?;

    let owner = options.owner_override.clone().unwrap_or_else(|| source.canvas.owner.clone());
    let new_canvas = Canvas {
        id: store.allocate_id(),
        owner,
        original_canvas_id: Some(source_canvas_id.to_string()),
        is_api_canvas: options.is_api_canvas,
        version: 0,
    };
    store.create_canvas(new_canvas.clone()).await?;

    // --- First pass: allocate fresh ids for every node and handle, and
    // persist the nodes (without edges, which need both maps complete).
    let mut node_map: HashMap<String, String> = HashMap::with_capacity(source.nodes.len());
    for node in &source.nodes {
        node_map.insert(node.id.clone(), store.allocate_id());
    }
    let mut handle_map: HashMap<String, String> = HashMap::with_capacity(source.handles.len());
    for handle in &source.handles {
        handle_map.insert(handle.id.clone(), store.allocate_id());
    }

    // --- Second pass: rewrite config/result references and write nodes.
    for node in source.nodes {
        let new_id = node_map.get(&node.id).expect("allocated above").clone();
        let mut config = node.config;
        rewrite_layer_updates(&mut config, &handle_map);

        let result = if options.keep_results {
            let mut result = node.result;
            for output in &mut result.outputs {
                for item in &mut output.items {
                    if let Some(mapped) = handle_map.get(&item.output_handle_id) {
                        item.output_handle_id = mapped.clone();
                    }
                }
            }
            result
        } else {
            canvas_graph::ResultEnvelope::empty()
        };

        store
            .create_node(Node {
                id: new_id,
                canvas_id: new_canvas.id.clone(),
                kind: node.kind,
                name: node.name,
                position: node.position,
                width: node.width,
                height: node.height,
                template_id: node.template_id,
                config,
                result,
                original_node_id: Some(node.id),
            })
            .await?;
    }

    for handle in source.handles {
        let new_id = handle_map.get(&handle.id).expect("allocated above").clone();
        let new_node_id = match node_map.get(&handle.node_id) {
            Some(id) => id.clone(),
            None => {
                log::warn!("dropping handle '{}': owning node was not part of the source graph", handle.id);
                continue;
            }
        };
        store
            .create_handle(Handle {
                id: new_id,
                node_id: new_node_id,
                direction: handle.direction,
                data_types: handle.data_types,
                label: handle.label,
                required: handle.required,
                order: handle.order,
                template_handle_id: handle.template_handle_id,
            })
            .await?;
    }

    // --- Third pass: edges, via both id maps. An edge that doesn't fully
    // resolve (shouldn't happen against a consistent source graph, but the
    // engine never trusts that) is dropped rather than failing the clone.
    for edge in source.edges {
        let (Some(source_node), Some(target_node), Some(source_handle), Some(target_handle)) = (
            node_map.get(&edge.source),
            node_map.get(&edge.target),
            handle_map.get(&edge.source_handle_id),
            handle_map.get(&edge.target_handle_id),
        ) else {
            log::warn!("dropping edge '{}' while cloning: incomplete id mapping", edge.id);
            continue;
        };

        store
            .create_edge(Edge {
                id: store.allocate_id(),
                source: source_node.clone(),
                target: target_node.clone(),
                source_handle_id: source_handle.clone(),
                target_handle_id: target_handle.clone(),
            })
            .await?;
    }

    Ok(new_canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_graph::{DataType, HandleDirection, NodeKind, Position, ResultEnvelope};
    use canvas_store::InMemoryCanvasStore;

    async fn canvas_with_two_linked_nodes() -> (InMemoryCanvasStore, String) {
        let store = InMemoryCanvasStore::new();
        let canvas_id = "src".to_string();
        store
            .create_canvas(Canvas { id: canvas_id.clone(), owner: "owner".to_string(), original_canvas_id: None, is_api_canvas: false, version: 0 })
            .await
            .unwrap();

        let a = Node {
            id: "n-a".to_string(),
            canvas_id: canvas_id.clone(),
            kind: NodeKind::new("text"),
            name: "a".to_string(),
            position: Position { x: 0.0, y: 0.0 },
            width: 1.0,
            height: 1.0,
            template_id: "text".to_string(),
            config: serde_json::json!({}),
            result: ResultEnvelope::empty(),
            original_node_id: None,
        };
        let b = Node { id: "n-b".to_string(), name: "b".to_string(), ..a.clone() };
        store.create_node(a).await.unwrap();
        store.create_node(b).await.unwrap();

        store
            .create_handle(Handle {
                id: "h-out".to_string(),
                node_id: "n-a".to_string(),
                direction: HandleDirection::Output,
                data_types: [DataType::Text].into_iter().collect(),
                label: "out".to_string(),
                required: false,
                order: 0,
                template_handle_id: None,
            })
            .await
            .unwrap();
        store
            .create_handle(Handle {
                id: "h-in".to_string(),
                node_id: "n-b".to_string(),
                direction: HandleDirection::Input,
                data_types: [DataType::Text].into_iter().collect(),
                label: "in".to_string(),
                required: true,
                order: 0,
                template_handle_id: None,
            })
            .await
            .unwrap();
        store
            .create_edge(Edge { id: "e1".to_string(), source: "n-a".to_string(), target: "n-b".to_string(), source_handle_id: "h-out".to_string(), target_handle_id: "h-in".to_string() })
            .await
            .unwrap();

        (store, canvas_id)
    }

    #[tokio::test]
    async fn duplicate_defaults_owner_to_source_canvas_owner() {
        let (store, canvas_id) = canvas_with_two_linked_nodes().await;
        let cloned = duplicate(&store, &canvas_id, CloneOptions { owner_override: Some("other-user".to_string()), ..Default::default() }).await.unwrap();
        assert_eq!(cloned.owner, "other-user");
    }

    #[tokio::test]
    async fn duplicate_produces_a_fresh_canvas_with_rewritten_edges() {
        let (store, canvas_id) = canvas_with_two_linked_nodes().await;

        let cloned = duplicate(&store, &canvas_id, CloneOptions::default()).await.unwrap();
        assert_ne!(cloned.id, canvas_id);
        assert_eq!(cloned.original_canvas_id.as_deref(), Some(canvas_id.as_str()));
        assert_eq!(cloned.owner, "owner");

        let graph = store.load_graph(&cloned.id).await.unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.handles.len(), 2);
        assert_eq!(graph.edges.len(), 1);

        let edge = &graph.edges[0];
        assert_ne!(edge.source, "n-a");
        assert_ne!(edge.target, "n-b");
        let source_handle = graph.handles.iter().find(|h| h.id == edge.source_handle_id).unwrap();
        assert_eq!(source_handle.node_id, edge.source);
    }

    #[tokio::test]
    async fn unknown_source_canvas_fails() {
        let store = InMemoryCanvasStore::new();
        let err = duplicate(&store, "missing", CloneOptions::default()).await.unwrap_err();
        assert!(matches!(err, MutationError::CanvasNotFound(_)));
    }
}
