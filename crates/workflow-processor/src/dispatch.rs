//! The workflow queue boundary (`spec.md` §6's "workflow queue protocol").
//! Resolves Open Question 1 (`SPEC_FULL.md` §4.4): the queue-based model is
//! authoritative, so this crate only ever talks to a `WorkQueue`, never to
//! an in-process sequential executor.

use async_trait::async_trait;
use canvas_store::{CanvasStore, DispatchEnvelope};
use tokio::sync::mpsc;

use crate::error::Result;

/// `spec.md` §4.4.3: the per-canvas exclusivity check-and-enqueue. Set
/// `started_at` on the batch iff no other batch on the same canvas is
/// currently active; if one is, persist the envelope onto
/// `pending_job_data` instead and let the active batch's worker hand it
/// off when it finishes (`spec.md` §4.4.5).
///
/// Returns `true` if the envelope was enqueued onto `queue` now, `false`
/// if it was deferred.
pub async fn dispatch_envelope(store: &dyn CanvasStore, queue: &dyn WorkQueue, envelope: DispatchEnvelope) -> Result<bool> {
    let started = store.try_start_batch(&envelope.batch_id, chrono::Utc::now()).await?;
    if started {
        log::info!("batch '{}' on canvas '{}' dispatched immediately", envelope.batch_id, envelope.canvas_id);
        queue.enqueue(envelope).await;
        Ok(true)
    } else {
        log::info!(
            "batch '{}' on canvas '{}' deferred: another batch is active on this canvas",
            envelope.batch_id,
            envelope.canvas_id
        );
        store.set_pending_job_data(&envelope.batch_id, envelope).await?;
        Ok(false)
    }
}

/// A durable FIFO queue publishing `process-node` jobs (`spec.md` §6). A
/// real deployment backs this with whatever message broker the host
/// already runs; this crate only needs `enqueue`.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue(&self, envelope: DispatchEnvelope);
}

/// `tokio::sync::mpsc`-backed queue for tests and single-process hosts,
/// grounded in the teacher's `Arc<RwLock<HashMap<..>>>`-plus-accessor-
/// methods shape for in-process shared state (`src-tauri/src/workflow/
/// execution_manager.rs`), adapted here to an async channel since the
/// consumer is a single worker loop rather than keyed lookups.
pub struct InMemoryWorkQueue {
    sender: mpsc::Sender<DispatchEnvelope>,
}

impl InMemoryWorkQueue {
    /// Build a queue and its receiving half. The caller typically hands
    /// the receiver to a worker loop (see [`crate::worker::run_worker_loop`]).
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<DispatchEnvelope>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn enqueue(&self, envelope: DispatchEnvelope) {
        let batch_id = envelope.batch_id.clone();
        if self.sender.send(envelope).await.is_err() {
            log::error!("work queue receiver dropped; envelope for batch '{batch_id}' was lost");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_store::{Canvas, InMemoryCanvasStore, TaskBatch};
    use std::collections::HashMap;

    fn envelope(batch_id: &str, canvas_id: &str) -> DispatchEnvelope {
        DispatchEnvelope {
            batch_id: batch_id.to_string(),
            canvas_id: canvas_id.to_string(),
            task_sequence: vec![],
            selection_map: HashMap::new(),
            api_key: None,
        }
    }

    #[tokio::test]
    async fn second_concurrent_run_is_deferred() {
        let store = InMemoryCanvasStore::new();
        store
            .create_canvas(Canvas { id: "c1".to_string(), owner: "owner".to_string(), original_canvas_id: None, is_api_canvas: false, version: 0 })
            .await
            .unwrap();
        let now = chrono::Utc::now();
        store.create_batch(TaskBatch::new("b1", "c1", now)).await.unwrap();
        store.create_batch(TaskBatch::new("b2", "c1", now)).await.unwrap();

        let (queue, mut receiver) = InMemoryWorkQueue::channel(4);

        assert!(dispatch_envelope(&store, &queue, envelope("b1", "c1")).await.unwrap());
        assert!(!dispatch_envelope(&store, &queue, envelope("b2", "c1")).await.unwrap());

        let b1 = store.get_batch("b1").await.unwrap();
        let b2 = store.get_batch("b2").await.unwrap();
        assert!(b1.started_at.is_some());
        assert!(b2.started_at.is_none());
        assert!(b2.pending_job_data.is_some());

        let dispatched = receiver.try_recv().unwrap();
        assert_eq!(dispatched.batch_id, "b1");
        assert!(receiver.try_recv().is_err());
    }
}
