//! Batch and task materialization (`spec.md` §4.4.2) and the
//! `process_nodes` entry point that ties plan construction, materialization
//! and dispatch together.

use std::collections::HashMap;

use canvas_store::{CanvasStore, DispatchEnvelope, Task, TaskBatch};

use crate::dispatch::{dispatch_envelope, WorkQueue};
use crate::error::{ProcessError, Result};
use crate::plan::build_plan;

/// Result of a `process_nodes` call: the created batch, its materialized
/// tasks in topological order, and whether the batch's envelope was
/// dispatched immediately (`true`) or deferred behind another active batch
/// on the same canvas (`false`).
#[derive(Debug, Clone)]
pub struct ProcessNodesOutcome {
    pub batch: TaskBatch,
    pub tasks: Vec<Task>,
    pub dispatched: bool,
}

/// `spec.md` §4.4.1–§4.4.3: snapshot the canvas, build the execution plan,
/// create the batch and one task per retained node in topological order,
/// then dispatch (or defer) the envelope.
///
/// If the topological order is empty (`spec.md` §4.4.2), the batch is
/// finalized immediately and no envelope is ever built.
pub async fn process_nodes(
    store: &dyn CanvasStore,
    queue: &dyn WorkQueue,
    canvas_id: &str,
    node_ids: Option<&[String]>,
    api_key: Option<String>,
) -> Result<ProcessNodesOutcome> {
    if !store.canvas_exists(canvas_id).await {
        return Err(ProcessError::CanvasNotFound(canvas_id.to_string()));
    }

    let graph = store.load_graph(canvas_id).await?;
    let plan = build_plan(&graph, node_ids)?;

    let batch_id = store.allocate_id();
    let created_at = chrono::Utc::now();
    let batch = TaskBatch::new(batch_id.clone(), canvas_id.to_string(), created_at);
    store.create_batch(batch.clone()).await?;
    log::info!("created batch '{batch_id}' on canvas '{canvas_id}' with {} task(s)", plan.order.len());

    if plan.order.is_empty() {
        let finished = store.finish_batch(&batch_id, created_at).await?;
        log::info!("batch '{batch_id}' has no retained nodes; finalized immediately");
        return Ok(ProcessNodesOutcome { batch: finished, tasks: vec![], dispatched: false });
    }

    let names_by_node: HashMap<&str, &str> = graph.nodes.iter().map(|n| (n.id.as_str(), n.name.as_str())).collect();

    let mut tasks = Vec::with_capacity(plan.order.len());
    let mut task_sequence = Vec::with_capacity(plan.order.len());
    let mut selection_map = HashMap::with_capacity(plan.order.len());

    for node_id in &plan.order {
        let task_id = store.allocate_id();
        let name = names_by_node.get(node_id.as_str()).copied().unwrap_or(node_id.as_str()).to_string();
        let task = Task::queued(task_id.clone(), batch_id.clone(), node_id.clone(), name);
        store.create_task(task.clone()).await?;

        let is_selected = *plan.selection_map.get(node_id).unwrap_or(&false);
        selection_map.insert(task_id.clone(), is_selected);
        task_sequence.push(task_id);
        tasks.push(task);
    }

    let envelope = DispatchEnvelope {
        batch_id: batch_id.clone(),
        canvas_id: canvas_id.to_string(),
        task_sequence,
        selection_map,
        api_key,
    };

    let dispatched = dispatch_envelope(store, queue, envelope).await?;
    let batch = store.get_batch(&batch_id).await?;

    Ok(ProcessNodesOutcome { batch, tasks, dispatched })
}
