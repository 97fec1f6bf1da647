//! Plan construction (`spec.md` §4.4.1): selection set, upstream closure,
//! terminal filtering, and a Kahn's-algorithm topological sort over the
//! retained subgraph. Grounded in the teacher's cycle detector
//! (`node-engine/src/validation.rs::detect_cycles`), extended here to
//! also produce the sorted order rather than only detect its absence.

use std::collections::{HashMap, HashSet, VecDeque};

use canvas_graph::NodeId;
use canvas_store::CanvasGraphData;

use crate::error::{ProcessError, Result};

/// The output of plan construction: a topologically sorted task order plus
/// which of those nodes were explicitly selected by the caller (`spec.md`
/// §4.4.2's `selectionMap`).
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub order: Vec<NodeId>,
    pub selection_map: HashMap<NodeId, bool>,
}

/// `spec.md` §4.4.1 steps 2-8. `node_ids = None` selects every node on the
/// canvas; `Some(ids)` restricts the explicit selection to `ids` (each of
/// which must name a node that was actually loaded).
pub fn build_plan(graph: &CanvasGraphData, node_ids: Option<&[String]>) -> Result<ExecutionPlan> {
    let nodes_by_id: HashMap<&str, &canvas_graph::Node> = graph.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let selection_set: HashSet<String> = match node_ids {
        Some(ids) => {
            for id in ids {
                if !nodes_by_id.contains_key(id.as_str()) {
                    return Err(ProcessError::InconsistentCanvas(format!("selected node '{id}' was not found on this canvas")));
                }
            }
            ids.iter().cloned().collect()
        }
        None => nodes_by_id.keys().map(|id| id.to_string()).collect(),
    };

    // Step 2: full reverse-dependency graph over every node on the canvas.
    let mut reverse: HashMap<&str, Vec<&str>> = nodes_by_id.keys().map(|id| (*id, Vec::new())).collect();
    for edge in &graph.edges {
        reverse.entry(edge.target.as_str()).or_default().push(edge.source.as_str());
    }

    // Step 4: upstream closure, breadth-first over the reverse graph.
    let mut necessary: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = selection_set.iter().map(|s| s.as_str()).collect();
    while let Some(id) = queue.pop_front() {
        if !necessary.insert(id) {
            continue;
        }
        if let Some(parents) = reverse.get(id) {
            for parent in parents {
                if !necessary.contains(parent) {
                    queue.push_back(parent);
                }
            }
        }
    }

    // Step 5: terminal filtering. A node is retained iff explicitly
    // selected, or its template is not terminal.
    let templates_by_kind: HashMap<&str, &canvas_graph::NodeTemplate> =
        graph.templates.iter().map(|t| (t.kind.as_str(), t)).collect();

    let mut retained: HashSet<&str> = HashSet::new();
    for id in &necessary {
        let node = nodes_by_id.get(id).ok_or_else(|| {
            ProcessError::InconsistentCanvas(format!("node '{id}' is reachable from the selection but was not loaded"))
        })?;
        let is_terminal = templates_by_kind.get(node.template_id.as_str()).map(|t| t.is_terminal_node).unwrap_or(false);
        if selection_set.contains(*id) || !is_terminal {
            retained.insert(id);
        }
    }

    // Step 6: subgraph dependency graph restricted to the retained set.
    // Iterate nodes in load order so the ready queue (and thus the
    // resulting order among ties) is deterministic.
    let mut in_degree: HashMap<&str, usize> = retained.iter().map(|id| (*id, 0)).collect();
    let mut forward: HashMap<&str, Vec<&str>> = retained.iter().map(|id| (*id, Vec::new())).collect();
    for edge in &graph.edges {
        let (source, target) = (edge.source.as_str(), edge.target.as_str());
        if retained.contains(source) && retained.contains(target) {
            forward.get_mut(source).expect("retained").push(target);
            *in_degree.get_mut(target).expect("retained") += 1;
        }
    }

    // Step 7: Kahn's algorithm.
    let mut ready: VecDeque<&str> = graph
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| retained.contains(id) && in_degree[id] == 0)
        .collect();

    let mut order: Vec<NodeId> = Vec::with_capacity(retained.len());
    while let Some(id) = ready.pop_front() {
        order.push(id.to_string());
        for &downstream in &forward[id] {
            let degree = in_degree.get_mut(downstream).expect("retained");
            *degree -= 1;
            if *degree == 0 {
                ready.push_back(downstream);
            }
        }
    }

    if order.len() != retained.len() {
        return Err(ProcessError::CycleDetected);
    }

    let selection_map = order.iter().map(|id| (id.clone(), selection_set.contains(id))).collect();

    Ok(ExecutionPlan { order, selection_map })
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_graph::CanvasBuilder;
    use canvas_store::CanvasGraphData;

    fn graph_data(snapshot: canvas_graph::CanvasSnapshot) -> CanvasGraphData {
        CanvasGraphData {
            canvas: snapshot.canvas,
            nodes: snapshot.nodes.into_values().collect(),
            handles: snapshot.handles.into_values().collect(),
            edges: snapshot.edges,
            templates: snapshot.templates.into_values().collect(),
        }
    }

    #[test]
    fn linear_chain_orders_upstream_first() {
        let (snapshot, ids) = CanvasBuilder::new("c1", "owner")
            .node("a", "text")
            .output_handle("a", "out", canvas_graph::DataType::Text)
            .node("b", "echo")
            .input_handle("b", "in", canvas_graph::DataType::Text, true)
            .edge("a", "out", "b", "in")
            .build();
        let graph = graph_data(snapshot);

        let plan = build_plan(&graph, Some(&[ids.node("b")])).unwrap();
        assert_eq!(plan.order, vec![ids.node("a"), ids.node("b")]);
        assert_eq!(plan.selection_map[&ids.node("a")], false);
        assert_eq!(plan.selection_map[&ids.node("b")], true);
    }

    #[test]
    fn diamond_respects_partial_order() {
        let (snapshot, ids) = CanvasBuilder::new("c1", "owner")
            .node("a", "text")
            .output_handle("a", "out", canvas_graph::DataType::Text)
            .node("b", "echo")
            .input_handle("b", "in", canvas_graph::DataType::Text, true)
            .output_handle("b", "out", canvas_graph::DataType::Text)
            .node("c", "echo")
            .input_handle("c", "in", canvas_graph::DataType::Text, true)
            .output_handle("c", "out", canvas_graph::DataType::Text)
            .node("d", "echo")
            .input_handle("d", "in1", canvas_graph::DataType::Text, true)
            .input_handle("d", "in2", canvas_graph::DataType::Text, true)
            .edge("a", "out", "b", "in")
            .edge("a", "out", "c", "in")
            .edge("b", "out", "d", "in1")
            .edge("c", "out", "d", "in2")
            .build();
        let graph = graph_data(snapshot);

        let plan = build_plan(&graph, Some(&[ids.node("d")])).unwrap();
        assert_eq!(plan.order.len(), 4);
        let pos = |key: &str| plan.order.iter().position(|id| id == &ids.node(key)).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }

    #[test]
    fn cycle_is_detected() {
        let (snapshot, _ids) = CanvasBuilder::new("c1", "owner")
            .node("a", "echo")
            .input_handle("a", "in", canvas_graph::DataType::Text, true)
            .output_handle("a", "out", canvas_graph::DataType::Text)
            .node("b", "echo")
            .input_handle("b", "in", canvas_graph::DataType::Text, true)
            .output_handle("b", "out", canvas_graph::DataType::Text)
            .edge("a", "out", "b", "in")
            .edge("b", "out", "a", "in")
            .build();
        let graph = graph_data(snapshot);

        let err = build_plan(&graph, None).unwrap_err();
        assert!(matches!(err, ProcessError::CycleDetected));
    }

    #[test]
    fn terminal_upstream_is_excluded_unless_selected() {
        let (snapshot, ids) = CanvasBuilder::new("c1", "owner")
            .terminal_node("export1", "export")
            .output_handle("export1", "out", canvas_graph::DataType::Text)
            .node("llm", "llm")
            .input_handle("llm", "in", canvas_graph::DataType::Text, true)
            .output_handle("llm", "out", canvas_graph::DataType::Text)
            .terminal_node("export2", "export")
            .input_handle("export2", "in", canvas_graph::DataType::Text, true)
            .edge("export1", "out", "llm", "in")
            .edge("llm", "out", "export2", "in")
            .build();
        let graph = graph_data(snapshot);

        let plan = build_plan(&graph, Some(&[ids.node("export2")])).unwrap();
        assert_eq!(plan.order, vec![ids.node("llm"), ids.node("export2")]);
    }

    #[test]
    fn empty_selection_yields_empty_order() {
        let (snapshot, _ids) = CanvasBuilder::new("c1", "owner").build();
        let graph = graph_data(snapshot);
        let plan = build_plan(&graph, Some(&[])).unwrap();
        assert!(plan.order.is_empty());
    }
}
