//! Persisted-state types that sit outside `canvas-graph`'s data model:
//! the run/task bookkeeping (`TaskBatch`, `Task`) and the file-asset
//! metadata the Batch Resolver and run-payload ingestion path need.
//!
//! `Canvas`/`Node`/`Handle`/`Edge`/`NodeTemplate`/`ResultEnvelope` live in
//! `canvas-graph` and are re-exported from there; this module only adds
//! what the graph crate has no reason to know about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type BatchId = String;
pub type TaskId = String;
pub type AssetId = String;

/// One node-execution unit within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub batch_id: BatchId,
    pub node_id: canvas_graph::NodeId,
    pub name: String,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error: Option<TaskError>,
}

impl Task {
    pub fn queued(id: impl Into<String>, batch_id: impl Into<String>, node_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            batch_id: batch_id.into(),
            node_id: node_id.into(),
            name: name.into(),
            status: TaskStatus::Queued,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn is_terminal_status(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Tasks transition `QUEUED -> EXECUTING -> {COMPLETED, FAILED}`.
/// Never re-executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Executing,
    Completed,
    Failed,
}

/// Error detail attached to a `FAILED` task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskError {
    pub message: String,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// A single run of (part of) a canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskBatch {
    pub id: BatchId,
    pub canvas_id: canvas_graph::CanvasId,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Non-null only while queued behind another batch on the same canvas.
    pub pending_job_data: Option<DispatchEnvelope>,
}

impl TaskBatch {
    pub fn new(id: impl Into<String>, canvas_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            canvas_id: canvas_id.into(),
            created_at,
            started_at: None,
            finished_at: None,
            pending_job_data: None,
        }
    }

    /// A batch is "active" when it has started but not finished — at most
    /// one such batch may exist per canvas at any instant.
    pub fn is_active(&self) -> bool {
        self.started_at.is_some() && self.finished_at.is_none()
    }
}

/// The workflow-queue job envelope published under the `process-node` job
/// name, and also the shape persisted onto `TaskBatch.pending_job_data`
/// while a batch is deferred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchEnvelope {
    pub batch_id: BatchId,
    pub canvas_id: canvas_graph::CanvasId,
    /// Task ids in topological order; the worker executes them serially in
    /// this order.
    pub task_sequence: Vec<TaskId>,
    /// `taskId -> was this node explicitly selected by the caller`.
    pub selection_map: std::collections::HashMap<TaskId, bool>,
    pub api_key: Option<String>,
}

/// Metadata for a persisted asset, referenced by `FileReference` items and
/// by the run-payload `assetId` variant. Asset bytes themselves are out of
/// scope; only the lookup this engine needs (id -> metadata) is modeled
/// here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAsset {
    pub id: AssetId,
    pub bucket: String,
    pub key: String,
    pub mime_type: String,
    pub dimensions: Option<(u32, u32)>,
    pub duration_ms: Option<u64>,
}
