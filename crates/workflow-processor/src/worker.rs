//! The worker loop: per-task execution within a batch (`spec.md` §4.4.4)
//! and batch completion / next-batch handoff (`spec.md` §4.4.5).
//!
//! Grounded in the teacher's `ExecutionManager` (`src-tauri/src/workflow/
//! execution_manager.rs`): a long-lived loop that consumes units of work
//! from a channel and drives state transitions against shared storage.
//! Tasks run strictly serially within one envelope (`spec.md` §4.4.4); the
//! baseline contract does not parallelize independent chains.

use canvas_graph::{CanvasSnapshot, MediaBufferSource, Node, NodeId};
use canvas_store::{CanvasStore, DispatchEnvelope, Task, TaskStatus};
use node_processor_contract::{ProcessorInput, ProcessorRegistry};
use tokio::sync::mpsc;

use crate::dispatch::WorkQueue;
use crate::error::{Result, TaskFailure};

/// Consume dispatch envelopes from `receiver` until the channel closes,
/// executing each batch to completion before pulling the next one. Mirrors
/// the teacher's single-consumer workflow-queue pattern: one worker, one
/// batch in flight at a time.
pub async fn run_worker_loop(
    store: &dyn CanvasStore,
    registry: &ProcessorRegistry,
    storage: &dyn MediaBufferSource,
    queue: &dyn WorkQueue,
    mut receiver: mpsc::Receiver<DispatchEnvelope>,
) {
    while let Some(envelope) = receiver.recv().await {
        let batch_id = envelope.batch_id.clone();
        if let Err(err) = execute_batch(store, registry, storage, queue, envelope).await {
            log::error!("batch '{batch_id}' failed to execute: {err}");
        }
    }
}

/// Execute every task in `envelope.task_sequence`, serially and in order,
/// then finalize the batch and hand off the next pending batch on the same
/// canvas, if any (`spec.md` §4.4.4, §4.4.5).
pub async fn execute_batch(
    store: &dyn CanvasStore,
    registry: &ProcessorRegistry,
    storage: &dyn MediaBufferSource,
    queue: &dyn WorkQueue,
    envelope: DispatchEnvelope,
) -> Result<()> {
    let graph = store.load_graph(&envelope.canvas_id).await?;
    let mut snapshot = CanvasSnapshot::new(graph.canvas, graph.nodes, graph.handles, graph.edges, graph.templates);

    for task_id in &envelope.task_sequence {
        execute_task(store, registry, storage, &mut snapshot, task_id, &envelope).await;
    }

    let finished_at = chrono::Utc::now();
    store.finish_batch(&envelope.batch_id, finished_at).await?;
    log::info!("batch '{}' finished", envelope.batch_id);

    if let Some(next) = store.dequeue_next_pending(&envelope.canvas_id, finished_at).await? {
        log::info!("handing off to deferred batch '{}' on canvas '{}'", next.batch_id, envelope.canvas_id);
        queue.enqueue(next).await;
    }

    Ok(())
}

/// One task's full lifecycle: `QUEUED -> EXECUTING -> {COMPLETED, FAILED}`
/// (`spec.md` §4.4.4 steps 1-10). Never returns an error: a failure here is
/// always surfaced as a task-level `FAILED` status, and the rest of the
/// batch keeps running (`spec.md` §4.4.6).
async fn execute_task(
    store: &dyn CanvasStore,
    registry: &ProcessorRegistry,
    storage: &dyn MediaBufferSource,
    snapshot: &mut CanvasSnapshot,
    task_id: &str,
    envelope: &DispatchEnvelope,
) {
    let mut task = match store.get_task(task_id).await {
        Ok(task) => task,
        Err(err) => {
            log::error!("task '{task_id}' vanished before execution: {err}");
            return;
        }
    };

    let started_at = chrono::Utc::now();
    task.status = TaskStatus::Executing;
    task.started_at = Some(started_at);
    if let Err(err) = store.update_task(task.clone()).await {
        log::error!("failed to mark task '{task_id}' executing: {err}");
        return;
    }

    // Step 2: re-fetch the node; it may have been deleted concurrently.
    let node = match store.get_node(&task.node_id).await {
        Ok(node) => node,
        Err(_) => {
            finish_task(store, task, started_at, Err(TaskFailure::NodeRemoved)).await;
            return;
        }
    };
    snapshot.with_node_result(&node.id, node.result.clone());

    // Step 3: template flags.
    let template = store.get_template(&node.template_id).await.ok().flatten();
    let is_terminal = template.as_ref().map(|t| t.is_terminal_node).unwrap_or(false);
    let is_transient = template.as_ref().map(|t| t.is_transient).unwrap_or(false);
    let is_explicitly_selected = *envelope.selection_map.get(task_id).unwrap_or(&false);

    // Step 4: terminal skip rule.
    if is_terminal && !is_explicitly_selected {
        log::debug!("skipping terminal, non-selected node '{}' (task '{task_id}')", node.id);
        finish_task(store, task, started_at, Ok(None)).await;
        return;
    }

    // Step 5: processor lookup.
    let Some(processor) = registry.get_processor(node.kind.as_str()) else {
        finish_task(store, task, started_at, Err(TaskFailure::NoProcessor(node.kind.to_string()))).await;
        return;
    };

    // Step 6: result hydration. Refresh every upstream node's result from
    // storage so later tasks in this batch observe earlier ones.
    if let Err(err) = refresh_upstream_results(store, snapshot, &node).await {
        log::warn!("failed to refresh upstream results for node '{}': {err}", node.id);
    }

    // Step 7: invoke the processor.
    let input = ProcessorInput::new(&node, snapshot, storage, envelope.api_key.as_deref());
    let output = processor.process(input).await;

    if output.success {
        if let Some(new_result) = output.new_result {
            snapshot.with_node_result(&node.id, new_result.clone());
            if !is_transient {
                let mut updated = node;
                updated.result = new_result;
                if let Err(err) = store.update_node(updated).await {
                    if !matches!(err, canvas_store::StoreError::NodeNotFound(_)) {
                        log::error!("failed to persist result for node '{}': {err}", task.node_id);
                    }
                }
            }
        }
        finish_task(store, task, started_at, Ok(None)).await;
    } else {
        let message = output.error.unwrap_or_else(|| "processor reported failure with no message".to_string());
        finish_task(store, task, started_at, Err(TaskFailure::Processor(message))).await;
    }
}

/// `spec.md` §4.4.4 step 6: before calling the processor, make sure every
/// upstream node this node's input handles depend on reflects its latest
/// persisted result, not a stale copy from the batch's original snapshot.
///
/// Transient upstream nodes are skipped: their result is never written to
/// `store` (step 8 keeps it in-memory only), so a node already advanced
/// this batch carries the authoritative value in `snapshot` already —
/// pulling from storage here would clobber it with a stale/empty row.
async fn refresh_upstream_results(store: &dyn CanvasStore, snapshot: &mut CanvasSnapshot, node: &Node) -> canvas_store::Result<()> {
    let source_ids: Vec<NodeId> = snapshot
        .edges
        .iter()
        .filter(|e| snapshot.handle(&e.target_handle_id).map(|h| h.node_id == node.id).unwrap_or(false))
        .map(|e| e.source.clone())
        .collect();

    for source_id in source_ids {
        let is_transient = snapshot.node(&source_id).and_then(|n| snapshot.template_for(n)).map(|t| t.is_transient).unwrap_or(false);
        if is_transient {
            continue;
        }
        if let Ok(fresh) = store.get_node(&source_id).await {
            snapshot.with_node_result(&source_id, fresh.result);
        }
    }
    Ok(())
}

/// Finalize a task: `Ok(None)` marks `COMPLETED`, `Err(failure)` marks
/// `FAILED` with the corresponding message.
async fn finish_task(store: &dyn CanvasStore, mut task: Task, started_at: chrono::DateTime<chrono::Utc>, outcome: std::result::Result<Option<()>, TaskFailure>) {
    let finished_at = chrono::Utc::now();
    task.finished_at = Some(finished_at);
    task.duration_ms = Some((finished_at - started_at).num_milliseconds().max(0) as u64);

    match outcome {
        Ok(_) => {
            task.status = TaskStatus::Completed;
            task.error = None;
        }
        Err(failure) => {
            task.status = TaskStatus::Failed;
            log::warn!("task '{}' (node '{}') failed: {}", task.id, task.node_id, failure);
            task.error = Some(failure.into_task_error());
        }
    }

    if let Err(err) = store.update_task(task.clone()).await {
        log::error!("failed to persist terminal status for task '{}': {err}", task.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_graph::{CanvasBuilder, DataType, NullMediaBufferSource, ResultEnvelope};
    use canvas_store::InMemoryCanvasStore;
    use node_processor_contract::ProcessorOutput;
    use std::collections::HashMap;

    use crate::dispatch::InMemoryWorkQueue;

    async fn seed(snapshot: CanvasSnapshot) -> InMemoryCanvasStore {
        let store = InMemoryCanvasStore::new();
        store.create_canvas(snapshot.canvas.clone()).await.unwrap();
        for node in snapshot.nodes.into_values() {
            store.create_node(node).await.unwrap();
        }
        for handle in snapshot.handles.into_values() {
            store.create_handle(handle).await.unwrap();
        }
        for edge in snapshot.edges {
            store.create_edge(edge).await.unwrap();
        }
        for template in snapshot.templates.into_values() {
            store.register_template(template).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn linear_chain_executes_and_propagates_result() {
        let (snapshot, ids) = CanvasBuilder::new("c1", "owner")
            .node("a", "text")
            .output_handle("a", "out", DataType::Text)
            .node("b", "echo")
            .input_handle("b", "in", DataType::Text, true)
            .output_handle("b", "out", DataType::Text)
            .edge("a", "out", "b", "in")
            .with_text_output("a", "out", "hi")
            .build();
        let store = seed(snapshot).await;

        let mut registry = ProcessorRegistry::new();
        registry.register_callback("echo", |input: ProcessorInput<'_>| {
            Box::pin(async move {
                let value = input.resolver.get_input_value(
                    &input.node.id,
                    true,
                    &canvas_graph::InputSelector { data_type: DataType::Text, label: Some("in".to_string()) },
                );
                match value {
                    Ok(Some(item)) => {
                        let mut result = ResultEnvelope::empty();
                        result.outputs.push(canvas_graph::Output {
                            items: vec![canvas_graph::Item { data_type: DataType::Text, data: item.data, output_handle_id: format!("{}:out", input.node.id) }],
                        });
                        ProcessorOutput::succeeded(result)
                    }
                    Ok(None) => ProcessorOutput::succeeded_unchanged(),
                    Err(err) => ProcessorOutput::failed(err.to_string()),
                }
            })
        });

        let (queue, _rx) = InMemoryWorkQueue::channel(4);
        let storage = NullMediaBufferSource;

        let outcome = crate::batch::process_nodes(&store, &queue, "c1", Some(&[ids.node("b")]), None).await.unwrap();
        let envelope = DispatchEnvelope {
            batch_id: outcome.batch.id.clone(),
            canvas_id: "c1".to_string(),
            task_sequence: outcome.tasks.iter().map(|t| t.id.clone()).collect(),
            selection_map: outcome.tasks.iter().map(|t| (t.id.clone(), t.node_id == ids.node("b"))).collect(),
            api_key: None,
        };

        execute_batch(&store, &registry, &storage, &queue, envelope).await.unwrap();

        let tasks = store.list_tasks(&outcome.batch.id).await.unwrap();
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));

        let b = store.get_node(&ids.node("b")).await.unwrap();
        let item = &b.result.outputs[0].items[0];
        assert_eq!(item.data, canvas_graph::ItemData::Primitive(serde_json::json!("hi")));

        let batch = store.get_batch(&outcome.batch.id).await.unwrap();
        assert!(batch.finished_at.is_some());
    }

    #[tokio::test]
    async fn terminal_non_selected_upstream_completes_without_reexecuting() {
        let (snapshot, ids) = CanvasBuilder::new("c1", "owner")
            .terminal_node("export1", "export")
            .output_handle("export1", "out", DataType::Text)
            .node("llm", "llm")
            .input_handle("llm", "in", DataType::Text, true)
            .output_handle("llm", "out", DataType::Text)
            .terminal_node("export2", "export")
            .input_handle("export2", "in", DataType::Text, true)
            .edge("export1", "out", "llm", "in")
            .edge("llm", "out", "export2", "in")
            .with_text_output("export1", "out", "seed")
            .build();
        let store = seed(snapshot).await;

        let mut registry = ProcessorRegistry::new();
        registry.register_callback("llm", |input: ProcessorInput<'_>| {
            Box::pin(async move {
                let _ = input.node;
                ProcessorOutput::succeeded(ResultEnvelope::empty())
            })
        });
        registry.register_callback("export", |_| Box::pin(async { ProcessorOutput::succeeded_unchanged() }));

        let (queue, _rx) = InMemoryWorkQueue::channel(4);
        let storage = NullMediaBufferSource;

        let outcome = crate::batch::process_nodes(&store, &queue, "c1", Some(&[ids.node("export2")]), None).await.unwrap();
        assert_eq!(outcome.tasks.len(), 2);

        let mut selection_map = HashMap::new();
        for task in &outcome.tasks {
            selection_map.insert(task.id.clone(), task.node_id == ids.node("export2"));
        }
        let envelope = DispatchEnvelope {
            batch_id: outcome.batch.id.clone(),
            canvas_id: "c1".to_string(),
            task_sequence: outcome.tasks.iter().map(|t| t.id.clone()).collect(),
            selection_map,
            api_key: None,
        };

        execute_batch(&store, &registry, &storage, &queue, envelope).await.unwrap();

        let tasks = store.list_tasks(&outcome.batch.id).await.unwrap();
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));
        // export1 was never part of the retained set, so nothing asserts its
        // result here; the terminal skip rule only applies to retained
        // terminal nodes that were not explicitly selected (none in this
        // fixture, since export1 is filtered out by terminal filtering).
    }

    #[tokio::test]
    async fn missing_processor_fails_the_task_without_stopping_the_batch() {
        let (snapshot, ids) = CanvasBuilder::new("c1", "owner").node("a", "mystery").build();
        let store = seed(snapshot).await;
        let registry = ProcessorRegistry::new();
        let (queue, _rx) = InMemoryWorkQueue::channel(4);
        let storage = NullMediaBufferSource;

        let outcome = crate::batch::process_nodes(&store, &queue, "c1", None, None).await.unwrap();
        let envelope = DispatchEnvelope {
            batch_id: outcome.batch.id.clone(),
            canvas_id: "c1".to_string(),
            task_sequence: outcome.tasks.iter().map(|t| t.id.clone()).collect(),
            selection_map: outcome.tasks.iter().map(|t| (t.id.clone(), true)).collect(),
            api_key: None,
        };
        execute_batch(&store, &registry, &storage, &queue, envelope).await.unwrap();

        let tasks = store.list_tasks(&outcome.batch.id).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Failed);
        assert_eq!(tasks[0].node_id, ids.node("a"));
        assert!(tasks[0].error.as_ref().unwrap().message.contains("No processor"));
    }
}
