//! Canvas Mutation Engine (C2): atomic bulk patch apply with stable id
//! remapping and reference fixup.

use std::collections::{HashMap, HashSet};

use canvas_graph::{Edge, Handle, Node, NodeTemplate, ResultEnvelope};
use canvas_store::CanvasStore;

use crate::error::{MutationError, Result};
use crate::patch::{is_temp_id, ApplyResult, CanvasPatch, EdgePatchItem, HandlePatchItem, NodePatchItem};
use crate::remap::{rewrite_layer_updates, rewrite_result_handle_ids, IdMaps};

/// Apply a bulk patch to `canvas_id`: classify each item as a create,
/// update or implicit delete, allocate fresh ids for creates, rewrite every
/// reference through those ids, then commit the whole patch in one pass.
///
/// All computation — classification, id allocation, reference fixup — is
/// done against an in-memory working copy before a single store write is
/// issued; a failure anywhere in that computation (`CanvasNotFound`,
/// `InvalidPatch`) leaves the store untouched, which is what "the entire
/// transaction rolls back" means for a store that has no partial-failure
/// mode of its own.
pub async fn apply_canvas_update(store: &dyn CanvasStore, canvas_id: &str, patch: CanvasPatch) -> Result<ApplyResult> {
    if !store.canvas_exists(canvas_id).await {
        return Err(MutationError::CanvasNotFound(canvas_id.to_string()));
    }

    let graph = store.load_graph(canvas_id).await?;
    let existing_node_ids: HashSet<String> = graph.nodes.iter().map(|n| n.id.clone()).collect();
    let existing_handle_ids: HashSet<String> = graph.handles.iter().map(|h| h.id.clone()).collect();
    let existing_edge_ids: HashSet<String> = graph.edges.iter().map(|e| e.id.clone()).collect();
    let existing_nodes_by_id: HashMap<String, Node> = graph.nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
    let templates_by_id: HashMap<String, NodeTemplate> =
        graph.templates.into_iter().map(|t| (t.kind.as_str().to_string(), t)).collect();

    let patch_nodes = patch.nodes.unwrap_or_default();
    let patch_handles = patch.handles.unwrap_or_default();
    let patch_edges = patch.edges.unwrap_or_default();

    // --- Step 3/4: classify and allocate fresh ids for every temp/unknown id.
    let mut maps = IdMaps::default();
    for item in &patch_nodes {
        if is_temp_id(&item.id) || !existing_node_ids.contains(&item.id) {
            maps.nodes.insert(item.id.clone(), store.allocate_id());
        }
    }
    for item in &patch_handles {
        if is_temp_id(&item.id) || !existing_handle_ids.contains(&item.id) {
            maps.handles.insert(item.id.clone(), store.allocate_id());
        }
    }
    for item in &patch_edges {
        if is_temp_id(&item.id) || !existing_edge_ids.contains(&item.id) {
            maps.edges.insert(item.id.clone(), store.allocate_id());
        }
    }

    let resolve_node = |id: &str| maps.node(id).map(str::to_string).unwrap_or_else(|| id.to_string());
    let resolve_handle = |id: &str| maps.handle(id).map(str::to_string).unwrap_or_else(|| id.to_string());
    let resolve_edge = |id: &str| maps.edges.get(id).cloned().unwrap_or_else(|| id.to_string());

    // keepIds per kind: real ids the client intends to retain (the rest of
    // what currently exists is implicitly deleted).
    let keep_node_ids: HashSet<String> = patch_nodes
        .iter()
        .filter(|i| !is_temp_id(&i.id) && existing_node_ids.contains(&i.id))
        .map(|i| i.id.clone())
        .collect();
    let keep_handle_ids: HashSet<String> = patch_handles
        .iter()
        .filter(|i| !is_temp_id(&i.id) && existing_handle_ids.contains(&i.id))
        .map(|i| i.id.clone())
        .collect();
    let keep_edge_ids: HashSet<String> = patch_edges
        .iter()
        .filter(|i| !is_temp_id(&i.id) && existing_edge_ids.contains(&i.id))
        .map(|i| i.id.clone())
        .collect();

    // --- Step 5/6/7: finalize nodes (config + result reference fixup, terminal rule).
    let mut final_nodes: Vec<(bool, Node)> = Vec::with_capacity(patch_nodes.len());
    for item in patch_nodes {
        let is_update = !is_temp_id(&item.id) && existing_node_ids.contains(&item.id);
        let final_id = resolve_node(&item.id);

        let mut config = item.config;
        rewrite_layer_updates(&mut config, &maps.handles);

        let result = finalize_node_result(&item.template_id, &templates_by_id, is_update, existing_nodes_by_id.get(&item.id), item.result, &maps.handles);

        final_nodes.push((
            is_update,
            Node {
                id: final_id,
                canvas_id: canvas_id.to_string(),
                kind: item.kind,
                name: item.name,
                position: item.position,
                width: item.width,
                height: item.height,
                template_id: item.template_id,
                config,
                result,
                original_node_id: item.original_node_id,
            },
        ));
    }
    let final_node_ids: HashSet<String> = final_nodes.iter().map(|(_, n)| n.id.clone()).collect();
    let surviving_node_ids: HashSet<String> = final_node_ids.union(&keep_node_ids).cloned().collect();

    // --- Finalize handles (node_id rewrite).
    let mut final_handles: Vec<(bool, Handle)> = Vec::with_capacity(patch_handles.len());
    for item in patch_handles {
        let is_update = !is_temp_id(&item.id) && existing_handle_ids.contains(&item.id);
        let final_id = resolve_handle(&item.id);
        let node_id = resolve_node(&item.node_id);

        if !surviving_node_ids.contains(&node_id) {
            return Err(MutationError::InvalidPatch(format!(
                "handle '{}' references node '{}' which is not present in this patch",
                item.id, item.node_id
            )));
        }

        final_handles.push((
            is_update,
            Handle {
                id: final_id,
                node_id,
                direction: item.direction,
                data_types: item.data_types,
                label: item.label,
                required: item.required,
                order: item.order,
                template_handle_id: item.template_handle_id,
            },
        ));
    }
    let final_handle_ids: HashSet<String> = final_handles.iter().map(|(_, h)| h.id.clone()).collect();

    // --- Finalize edges: drop unresolvable references and duplicate target
    // handles silently (a target handle may carry at most one incoming edge).
    let mut final_edges: Vec<(bool, Edge)> = Vec::with_capacity(patch_edges.len());
    let mut claimed_target_handles: HashSet<String> = HashSet::new();
    for item in patch_edges {
        let is_update = !is_temp_id(&item.id) && existing_edge_ids.contains(&item.id);
        let final_id = resolve_edge(&item.id);
        let source = resolve_node(&item.source);
        let target = resolve_node(&item.target);
        let source_handle_id = resolve_handle(&item.source_handle_id);
        let target_handle_id = resolve_handle(&item.target_handle_id);

        if !final_handle_ids.contains(&source_handle_id) || !final_handle_ids.contains(&target_handle_id) {
            log::warn!("dropping edge '{}': references a handle outside this patch", item.id);
            continue;
        }
        if !claimed_target_handles.insert(target_handle_id.clone()) {
            log::warn!("dropping edge '{}': target handle already has an incoming edge", item.id);
            continue;
        }

        final_edges.push((is_update, Edge { id: final_id, source, target, source_handle_id, target_handle_id }));
    }

    // --- Commit. Deletes first (edges, then handles, then nodes)
    // to respect referential integrity, then creates/updates.
    for edge_id in existing_edge_ids.difference(&keep_edge_ids) {
        store.delete_edge(edge_id).await?;
    }
    for handle_id in existing_handle_ids.difference(&keep_handle_ids) {
        store.delete_handle(handle_id).await?;
    }
    for node_id in existing_node_ids.difference(&keep_node_ids) {
        store.delete_node(node_id).await?;
    }

    for (is_update, node) in final_nodes {
        if is_update {
            store.update_node(node).await?;
        } else {
            store.create_node(node).await?;
        }
    }
    for (is_update, handle) in final_handles {
        if is_update {
            store.update_handle(handle).await?;
        } else {
            store.create_handle(handle).await?;
        }
    }
    for (is_update, edge) in final_edges {
        if is_update {
            store.update_edge(edge).await?;
        } else {
            store.create_edge(edge).await?;
        }
    }

    let version = store.bump_canvas_version(canvas_id).await?;

    Ok(ApplyResult { version, node_id_map: maps.nodes, handle_id_map: maps.handles, edge_id_map: maps.edges })
}

/// For a node being updated whose template is terminal, preserve historical
/// outputs and only take
/// `selectedOutputIndex`/structural metadata from the patch; otherwise the
/// patch's result may fully replace the persisted one.
fn finalize_node_result(
    template_id: &str,
    templates_by_id: &HashMap<String, NodeTemplate>,
    is_update: bool,
    existing: Option<&Node>,
    submitted: Option<ResultEnvelope>,
    handle_map: &HashMap<String, String>,
) -> ResultEnvelope {
    let is_terminal = templates_by_id.get(template_id).map(|t| t.is_terminal_node).unwrap_or(false);

    match (is_update, is_terminal, submitted, existing) {
        (true, true, Some(submitted), Some(existing)) => {
            let mut preserved = existing.result.clone();
            preserved.selected_output_index = if preserved.outputs.is_empty() {
                0
            } else {
                submitted.selected_output_index.min(preserved.outputs.len() - 1)
            };
            preserved
        }
        (true, _, None, Some(existing)) => existing.result.clone(),
        (_, _, Some(mut submitted), _) => {
            rewrite_result_handle_ids(&mut submitted, handle_map);
            submitted
        }
        _ => ResultEnvelope::empty(),
    }
}
