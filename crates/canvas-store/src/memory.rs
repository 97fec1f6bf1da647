//! In-memory `CanvasStore`: a single `tokio::sync::RwLock<HashMap<..>>`
//! per table with small, short-held critical sections per operation. Used
//! by the test suite and usable as-is by any embedding host that doesn't
//! need a real database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use canvas_graph::{Canvas, Edge, Handle, Node, NodeTemplate};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::store::{CanvasGraphData, CanvasStore};
use crate::types::{DispatchEnvelope, FileAsset, Task, TaskBatch};

#[derive(Default)]
struct Inner {
    canvases: HashMap<String, Canvas>,
    nodes: HashMap<String, Node>,
    handles: HashMap<String, Handle>,
    edges: HashMap<String, Edge>,
    templates: HashMap<String, NodeTemplate>,
    batches: HashMap<String, TaskBatch>,
    tasks: HashMap<String, Task>,
    assets: HashMap<String, FileAsset>,
}

/// In-memory reference implementation of [`CanvasStore`].
pub struct InMemoryCanvasStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryCanvasStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }
}

impl Default for InMemoryCanvasStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for InMemoryCanvasStore {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

#[async_trait]
impl CanvasStore for InMemoryCanvasStore {
    async fn get_canvas(&self, canvas_id: &str) -> Result<Canvas> {
        self.inner
            .read()
            .await
            .canvases
            .get(canvas_id)
            .cloned()
            .ok_or_else(|| StoreError::canvas_not_found(canvas_id))
    }

    async fn canvas_exists(&self, canvas_id: &str) -> bool {
        self.inner.read().await.canvases.contains_key(canvas_id)
    }

    async fn create_canvas(&self, canvas: Canvas) -> Result<()> {
        self.inner.write().await.canvases.insert(canvas.id.clone(), canvas);
        Ok(())
    }

    async fn bump_canvas_version(&self, canvas_id: &str) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let canvas = inner
            .canvases
            .get_mut(canvas_id)
            .ok_or_else(|| StoreError::canvas_not_found(canvas_id))?;
        canvas.version += 1;
        Ok(canvas.version)
    }

    async fn load_graph(&self, canvas_id: &str) -> Result<CanvasGraphData> {
        let inner = self.inner.read().await;
        let canvas = inner
            .canvases
            .get(canvas_id)
            .cloned()
            .ok_or_else(|| StoreError::canvas_not_found(canvas_id))?;
        let nodes: Vec<Node> = inner.nodes.values().filter(|n| n.canvas_id == canvas_id).cloned().collect();
        let node_ids: std::collections::HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        let handles: Vec<Handle> = inner
            .handles
            .values()
            .filter(|h| node_ids.contains(h.node_id.as_str()))
            .cloned()
            .collect();
        let edges: Vec<Edge> = inner
            .edges
            .values()
            .filter(|e| node_ids.contains(e.source.as_str()) || node_ids.contains(e.target.as_str()))
            .cloned()
            .collect();
        let template_ids: std::collections::HashSet<&str> = nodes.iter().map(|n| n.template_id.as_str()).collect();
        let templates: Vec<NodeTemplate> = inner
            .templates
            .iter()
            .filter(|(id, _)| template_ids.contains(id.as_str()))
            .map(|(_, t)| t.clone())
            .collect();
        Ok(CanvasGraphData { canvas, nodes, handles, edges, templates })
    }

    async fn get_node(&self, node_id: &str) -> Result<Node> {
        self.inner
            .read()
            .await
            .nodes
            .get(node_id)
            .cloned()
            .ok_or_else(|| StoreError::NodeNotFound(node_id.to_string()))
    }

    async fn node_exists(&self, node_id: &str) -> bool {
        self.inner.read().await.nodes.contains_key(node_id)
    }

    async fn create_node(&self, node: Node) -> Result<()> {
        self.inner.write().await.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    async fn update_node(&self, node: Node) -> Result<()> {
        self.inner.write().await.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    async fn delete_node(&self, node_id: &str) -> Result<()> {
        self.inner.write().await.nodes.remove(node_id);
        Ok(())
    }

    async fn create_handle(&self, handle: Handle) -> Result<()> {
        self.inner.write().await.handles.insert(handle.id.clone(), handle);
        Ok(())
    }

    async fn update_handle(&self, handle: Handle) -> Result<()> {
        self.inner.write().await.handles.insert(handle.id.clone(), handle);
        Ok(())
    }

    async fn delete_handle(&self, handle_id: &str) -> Result<()> {
        self.inner.write().await.handles.remove(handle_id);
        Ok(())
    }

    async fn create_edge(&self, edge: Edge) -> Result<()> {
        self.inner.write().await.edges.insert(edge.id.clone(), edge);
        Ok(())
    }

    async fn update_edge(&self, edge: Edge) -> Result<()> {
        self.inner.write().await.edges.insert(edge.id.clone(), edge);
        Ok(())
    }

    async fn delete_edge(&self, edge_id: &str) -> Result<()> {
        self.inner.write().await.edges.remove(edge_id);
        Ok(())
    }

    async fn get_template(&self, template_id: &str) -> Result<Option<NodeTemplate>> {
        Ok(self.inner.read().await.templates.get(template_id).cloned())
    }

    async fn register_template(&self, template: NodeTemplate) -> Result<()> {
        self.inner.write().await.templates.insert(template.kind.as_str().to_string(), template);
        Ok(())
    }

    async fn create_batch(&self, batch: TaskBatch) -> Result<()> {
        self.inner.write().await.batches.insert(batch.id.clone(), batch);
        Ok(())
    }

    async fn get_batch(&self, batch_id: &str) -> Result<TaskBatch> {
        self.inner
            .read()
            .await
            .batches
            .get(batch_id)
            .cloned()
            .ok_or_else(|| StoreError::BatchNotFound(batch_id.to_string()))
    }

    async fn create_task(&self, task: Task) -> Result<()> {
        self.inner.write().await.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> Result<Task> {
        self.inner
            .read()
            .await
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))
    }

    async fn update_task(&self, task: Task) -> Result<()> {
        self.inner.write().await.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn list_tasks(&self, batch_id: &str) -> Result<Vec<Task>> {
        Ok(self
            .inner
            .read()
            .await
            .tasks
            .values()
            .filter(|t| t.batch_id == batch_id)
            .cloned()
            .collect())
    }

    async fn finish_batch(&self, batch_id: &str, finished_at: DateTime<Utc>) -> Result<TaskBatch> {
        let mut inner = self.inner.write().await;
        let batch = inner
            .batches
            .get_mut(batch_id)
            .ok_or_else(|| StoreError::BatchNotFound(batch_id.to_string()))?;
        batch.finished_at = Some(finished_at);
        Ok(batch.clone())
    }

    async fn try_start_batch(&self, batch_id: &str, started_at: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let canvas_id = inner
            .batches
            .get(batch_id)
            .ok_or_else(|| StoreError::BatchNotFound(batch_id.to_string()))?
            .canvas_id
            .clone();

        let another_active = inner
            .batches
            .values()
            .any(|b| b.canvas_id == canvas_id && b.id != batch_id && b.is_active());

        if another_active {
            return Ok(false);
        }

        let batch = inner.batches.get_mut(batch_id).expect("checked above");
        batch.started_at = Some(started_at);
        Ok(true)
    }

    async fn set_pending_job_data(&self, batch_id: &str, envelope: DispatchEnvelope) -> Result<()> {
        let mut inner = self.inner.write().await;
        let batch = inner
            .batches
            .get_mut(batch_id)
            .ok_or_else(|| StoreError::BatchNotFound(batch_id.to_string()))?;
        batch.pending_job_data = Some(envelope);
        Ok(())
    }

    async fn dequeue_next_pending(&self, canvas_id: &str, started_at: DateTime<Utc>) -> Result<Option<DispatchEnvelope>> {
        let mut inner = self.inner.write().await;
        let next_id = inner
            .batches
            .values()
            .filter(|b| b.canvas_id == canvas_id && b.pending_job_data.is_some())
            .min_by_key(|b| b.created_at)
            .map(|b| b.id.clone());

        let Some(next_id) = next_id else {
            return Ok(None);
        };

        let batch = inner.batches.get_mut(&next_id).expect("looked up above");
        let envelope = batch.pending_job_data.take();
        batch.started_at = Some(started_at);
        Ok(envelope)
    }

    async fn get_asset(&self, asset_id: &str) -> Result<Option<FileAsset>> {
        Ok(self.inner.read().await.assets.get(asset_id).cloned())
    }

    async fn put_asset(&self, asset: FileAsset) -> Result<()> {
        self.inner.write().await.assets.insert(asset.id.clone(), asset);
        Ok(())
    }
}
