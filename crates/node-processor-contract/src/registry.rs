//! The processor registry: binds node `kind` strings to `Arc<dyn
//! NodeProcessor>` — `register`, `register_callback`, `get_processor`,
//! `has_kind`, `kinds`, `merge`.
//!
//! The only legitimate singleton in this crate, and even then only in the
//! sense that it's constructed once; it is always passed into the
//! `WorkflowProcessor` as a value (typically `Arc`), never reached through
//! a module-global.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::contract::{NodeProcessor, ProcessorInput, ProcessorOutput};

/// Registry mapping node `kind` strings to their processor.
#[derive(Default)]
pub struct ProcessorRegistry {
    entries: HashMap<String, Arc<dyn NodeProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, processor: Arc<dyn NodeProcessor>) {
        self.entries.insert(kind.into(), processor);
    }

    /// Register a node kind using an async closure (handy in tests and for
    /// FFI-style bridging).
    pub fn register_callback<F>(&mut self, kind: impl Into<String>, callback: F)
    where
        F: for<'a> Fn(ProcessorInput<'a>) -> Pin<Box<dyn Future<Output = ProcessorOutput> + Send + 'a>>
            + Send
            + Sync
            + 'static,
    {
        self.register(kind, Arc::new(CallbackNodeProcessor { callback: Box::new(callback) }));
    }

    pub fn get_processor(&self, kind: &str) -> Option<Arc<dyn NodeProcessor>> {
        self.entries.get(kind).cloned()
    }

    pub fn has_kind(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Merge another registry into this one. Entries from `other`
    /// override entries in `self` sharing the same kind.
    pub fn merge(&mut self, other: ProcessorRegistry) {
        self.entries.extend(other.entries);
    }
}

type BoxedCallback =
    Box<dyn for<'a> Fn(ProcessorInput<'a>) -> Pin<Box<dyn Future<Output = ProcessorOutput> + Send + 'a>> + Send + Sync>;

struct CallbackNodeProcessor {
    callback: BoxedCallback,
}

#[async_trait]
impl NodeProcessor for CallbackNodeProcessor {
    async fn process<'a>(&self, input: ProcessorInput<'a>) -> ProcessorOutput {
        (self.callback)(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_graph::{CanvasBuilder, DataType, NullMediaBufferSource, ResultEnvelope};

    #[tokio::test]
    async fn register_and_invoke_callback_processor() {
        let mut registry = ProcessorRegistry::new();
        registry.register_callback("echo", |input: ProcessorInput<'_>| {
            Box::pin(async move {
                let _ = input.node;
                ProcessorOutput::succeeded(ResultEnvelope::empty())
            })
        });

        assert!(registry.has_kind("echo"));
        assert!(!registry.has_kind("missing"));

        let processor = registry.get_processor("echo").unwrap();
        let (snapshot, ids) = CanvasBuilder::new("c1", "owner")
            .node("a", "echo")
            .output_handle("a", "out", DataType::Text)
            .build();
        let node = snapshot.node(&ids.node("a")).unwrap();
        let storage = NullMediaBufferSource;
        let input = ProcessorInput::new(node, &snapshot, &storage, None);

        let output = processor.process(input).await;
        assert!(output.success);
    }

    #[test]
    fn merge_overrides_on_conflict() {
        let mut a = ProcessorRegistry::new();
        a.register_callback("x", |_| Box::pin(async { ProcessorOutput::succeeded_unchanged() }));

        let mut b = ProcessorRegistry::new();
        b.register_callback("x", |_| Box::pin(async { ProcessorOutput::failed("from b") }));
        b.register_callback("y", |_| Box::pin(async { ProcessorOutput::succeeded_unchanged() }));

        a.merge(b);
        assert_eq!(a.kinds().len(), 2);
        assert!(a.has_kind("x"));
        assert!(a.has_kind("y"));
    }
}
