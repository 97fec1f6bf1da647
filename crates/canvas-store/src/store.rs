//! The `CanvasStore` trait: the persisted-state boundary every other
//! engine crate talks to. Backed by a relational store with foreign keys
//! between these tables; this trait models exactly the operations the
//! Canvas Mutation Engine, Canvas Cloner, Workflow Processor and Batch
//! Resolver need against it, so a host can back it with an actual database
//! without the engine crates knowing the difference.

use async_trait::async_trait;

use canvas_graph::{Canvas, Edge, Handle, Node, NodeTemplate};

use crate::error::Result;
use crate::types::{DispatchEnvelope, FileAsset, Task, TaskBatch};

/// A full read of one canvas's current graph, used to build a
/// [`canvas_graph::CanvasSnapshot`] without this crate depending on the
/// resolver crate's internal snapshot type directly.
#[derive(Debug, Clone)]
pub struct CanvasGraphData {
    pub canvas: Canvas,
    pub nodes: Vec<Node>,
    pub handles: Vec<Handle>,
    pub edges: Vec<Edge>,
    pub templates: Vec<NodeTemplate>,
}

#[async_trait]
pub trait CanvasStore: Send + Sync {
    // -- Canvas -----------------------------------------------------------

    async fn get_canvas(&self, canvas_id: &str) -> Result<Canvas>;
    async fn canvas_exists(&self, canvas_id: &str) -> bool;
    async fn create_canvas(&self, canvas: Canvas) -> Result<()>;
    /// Persist `canvas` and bump its `version` by one, returning the new
    /// version.
    async fn bump_canvas_version(&self, canvas_id: &str) -> Result<u64>;

    /// Full graph read for one canvas, used to build a snapshot.
    async fn load_graph(&self, canvas_id: &str) -> Result<CanvasGraphData>;

    // -- Nodes --------------------------------------------------------------

    async fn get_node(&self, node_id: &str) -> Result<Node>;
    async fn node_exists(&self, node_id: &str) -> bool;
    async fn create_node(&self, node: Node) -> Result<()>;
    async fn update_node(&self, node: Node) -> Result<()>;
    async fn delete_node(&self, node_id: &str) -> Result<()>;

    // -- Handles --------------------------------------------------------------

    async fn create_handle(&self, handle: Handle) -> Result<()>;
    async fn update_handle(&self, handle: Handle) -> Result<()>;
    async fn delete_handle(&self, handle_id: &str) -> Result<()>;

    // -- Edges --------------------------------------------------------------

    async fn create_edge(&self, edge: Edge) -> Result<()>;
    async fn update_edge(&self, edge: Edge) -> Result<()>;
    async fn delete_edge(&self, edge_id: &str) -> Result<()>;

    // -- Templates --------------------------------------------------------------

    async fn get_template(&self, template_id: &str) -> Result<Option<NodeTemplate>>;
    async fn register_template(&self, template: NodeTemplate) -> Result<()>;

    // -- Task batches / tasks -------------------------------------------------

    async fn create_batch(&self, batch: TaskBatch) -> Result<()>;
    async fn get_batch(&self, batch_id: &str) -> Result<TaskBatch>;
    async fn create_task(&self, task: Task) -> Result<()>;
    async fn get_task(&self, task_id: &str) -> Result<Task>;
    async fn update_task(&self, task: Task) -> Result<()>;
    async fn list_tasks(&self, batch_id: &str) -> Result<Vec<Task>>;

    /// Atomically mark `finished_at=now` on `batch_id` and return it.
    /// Called exactly once, when every task in the batch has reached a
    /// terminal state.
    async fn finish_batch(&self, batch_id: &str, finished_at: chrono::DateTime<chrono::Utc>) -> Result<TaskBatch>;

    /// The check-and-set enforcing per-canvas exclusivity: atomically set
    /// `started_at=now` on `batch_id` iff no other batch on the same canvas
    /// currently has `started_at != null && finished_at == null`. Returns
    /// `true` if this batch was started, `false` if another batch is
    /// active and the caller must defer (persist `pending_job_data`
    /// instead).
    async fn try_start_batch(&self, batch_id: &str, started_at: chrono::DateTime<chrono::Utc>) -> Result<bool>;

    /// Persist a dispatch envelope onto a deferred batch's
    /// `pending_job_data`.
    async fn set_pending_job_data(&self, batch_id: &str, envelope: DispatchEnvelope) -> Result<()>;

    /// The oldest batch on `canvas_id` with non-null `pending_job_data`,
    /// if any — the next-batch lookup a worker performs after finishing one
    /// batch on this canvas. Clears its
    /// `pending_job_data` and sets `started_at=now` atomically with the
    /// lookup, returning the envelope to enqueue.
    async fn dequeue_next_pending(&self, canvas_id: &str, started_at: chrono::DateTime<chrono::Utc>) -> Result<Option<DispatchEnvelope>>;

    // -- File assets ----------------------------------------------------------

    async fn get_asset(&self, asset_id: &str) -> Result<Option<FileAsset>>;
    async fn put_asset(&self, asset: FileAsset) -> Result<()>;

    // -- ID allocation ----------------------------------------------------------

    /// Allocate a fresh, opaque server-side id. Used by the Canvas
    /// Mutation Engine and Canvas Cloner wherever a fresh identifier is
    /// needed for a created entity.
    fn allocate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
