//! Node-Processor Contract (C6): the typed boundary the Workflow Processor
//! uses to call into external per-node processors.
//!
//! Everything a processor's internals do — calling an LLM, rendering an
//! image, compositing a `VirtualMediaTree` — is explicitly out of scope;
//! this module only models the calling contract.

use async_trait::async_trait;
use canvas_graph::{CanvasSnapshot, GraphResolver, MediaBufferSource, Node, ResultEnvelope};

/// Everything a processor needs to do its job, borrowed for the duration
/// of one call. Must not mutate the snapshot in place (copy-on-write is
/// fine) — processors only ever see a `&CanvasSnapshot`.
pub struct ProcessorInput<'a> {
    pub node: &'a Node,
    pub snapshot: &'a CanvasSnapshot,
    pub resolver: GraphResolver<'a>,
    pub storage: &'a dyn MediaBufferSource,
    pub api_key: Option<&'a str>,
}

impl<'a> ProcessorInput<'a> {
    pub fn new(node: &'a Node, snapshot: &'a CanvasSnapshot, storage: &'a dyn MediaBufferSource, api_key: Option<&'a str>) -> Self {
        Self {
            node,
            snapshot,
            resolver: GraphResolver::new(snapshot),
            storage,
            api_key,
        }
    }
}

/// A processor's verdict on one node execution.
#[derive(Debug, Clone, Default)]
pub struct ProcessorOutput {
    pub success: bool,
    pub error: Option<String>,
    pub new_result: Option<ResultEnvelope>,
}

impl ProcessorOutput {
    pub fn succeeded(new_result: ResultEnvelope) -> Self {
        Self { success: true, error: None, new_result: Some(new_result) }
    }

    /// Success with no new result — used by the terminal-skip path and by
    /// processors that have nothing new to contribute this run.
    pub fn succeeded_unchanged() -> Self {
        Self { success: true, error: None, new_result: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()), new_result: None }
    }
}

/// The interface the executor uses to call into external per-node
/// processors. Implementers:
/// - must not mutate the snapshot in place (copy-on-write is fine)
/// - must not write to the Node row directly — persistence is the
///   engine's responsibility
/// - may use `storage` to read asset bytes; any asset created must be
///   surfaced through the returned result
#[async_trait]
pub trait NodeProcessor: Send + Sync {
    async fn process<'a>(&self, input: ProcessorInput<'a>) -> ProcessorOutput;
}
