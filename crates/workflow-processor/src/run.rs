//! `POST /api/v1/run` / `GET /api/v1/run/{batchId}/status` (`spec.md` §6):
//! typed request/response envelopes and the payload-ingestion step that
//! precedes dispatch. HTTP transport itself is out of scope (`spec.md`
//! §1) — this module models the request/response shape and the run-payload
//! write path as plain async functions a transport layer calls into.

use std::collections::HashMap;

use canvas_graph::{Canvas, DataType, FileReference, HandleDirection, Item, ItemData, Node, NodeKind, Output, ResultEnvelope};
use canvas_mutation::{duplicate, CloneOptions};
use canvas_store::{CanvasStore, FileAsset};
use serde::{Deserialize, Serialize};

use crate::batch::process_nodes;
use crate::batch_resolver::{resolve_batch_result, AssetUrlResolver, ExportResult};
use crate::dispatch::WorkQueue;
use crate::error::{ProcessError, Result};

/// One entry of a run payload (`spec.md` §6 "Run payload shape"), keyed by
/// `originalNodeId` in [`RunRequest::payload`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum RunPayloadValue {
    Base64 {
        data: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    Url {
        url: String,
    },
    AssetId {
        asset_id: String,
    },
}

/// `POST /api/v1/run` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub canvas_id: String,
    #[serde(default)]
    pub payload: HashMap<String, RunPayloadValue>,
    #[serde(default = "default_true")]
    pub duplicate: bool,
}

fn default_true() -> bool {
    true
}

/// Shared response shape for both the run-creation and run-status
/// endpoints (`spec.md` §6: "same response schema").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub batch_handle_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<HashMap<String, ExportResult>>,
}

/// `spec.md` §6: accept a run request, optionally duplicate the target
/// canvas, ingest the run payload into the (possibly duplicated) canvas,
/// then hand off to `process_nodes`. `result` is populated only when the
/// batch already finished synchronously (empty selection, `spec.md`
/// §4.4.2) — the common case of a long-running batch leaves it unset and
/// callers poll `run_status`.
pub async fn run(
    store: &dyn CanvasStore,
    queue: &dyn WorkQueue,
    asset_resolver: &dyn AssetUrlResolver,
    request: RunRequest,
) -> Result<RunResult> {
    let target_canvas_id = if request.duplicate {
        let cloned: Canvas = duplicate(
            store,
            &request.canvas_id,
            CloneOptions { keep_results: false, is_api_canvas: true, owner_override: None },
        )
        .await
        .map_err(|err| ProcessError::InconsistentCanvas(err.to_string()))?;
        cloned.id
    } else {
        if !store.canvas_exists(&request.canvas_id).await {
            return Err(ProcessError::CanvasNotFound(request.canvas_id.clone()));
        }
        request.canvas_id.clone()
    };

    apply_run_payload(store, &target_canvas_id, &request.payload).await?;

    let outcome = process_nodes(store, queue, &target_canvas_id, None, None).await?;

    let result = if outcome.batch.finished_at.is_some() {
        Some(resolve_batch_result(store, &outcome.batch.id, asset_resolver).await?)
    } else {
        None
    };

    Ok(RunResult { batch_handle_id: outcome.batch.id, success: true, error: None, result })
}

/// `GET /api/v1/run/{batchId}/status` (`spec.md` §6): `result` is omitted
/// until the batch has finished.
pub async fn run_status(store: &dyn CanvasStore, asset_resolver: &dyn AssetUrlResolver, batch_id: &str) -> Result<RunResult> {
    let batch = store.get_batch(batch_id).await?;
    let result = if batch.finished_at.is_some() {
        Some(resolve_batch_result(store, &batch.id, asset_resolver).await?)
    } else {
        None
    };
    Ok(RunResult { batch_handle_id: batch.id, success: true, error: None, result })
}

/// `spec.md` §6 "Run payload shape": write each payload entry into the
/// matching node on `canvas_id`, resolved by `originalNodeId` when the
/// canvas carries one (i.e. it was just duplicated), falling back to
/// matching by the node's own id otherwise. Text nodes receive the value
/// into `config.content`; File nodes receive a `FileReference` written
/// into `result`. Entries with no matching node are dropped with a
/// warning rather than failing the whole run.
async fn apply_run_payload(store: &dyn CanvasStore, canvas_id: &str, payload: &HashMap<String, RunPayloadValue>) -> Result<()> {
    if payload.is_empty() {
        return Ok(());
    }

    let graph = store.load_graph(canvas_id).await?;
    let mut by_original: HashMap<&str, &Node> = HashMap::new();
    let mut by_id: HashMap<&str, &Node> = HashMap::new();
    for node in &graph.nodes {
        by_id.insert(node.id.as_str(), node);
        if let Some(original) = &node.original_node_id {
            by_original.insert(original.as_str(), node);
        }
    }

    for (original_node_id, value) in payload {
        let Some(node) = by_original.get(original_node_id.as_str()).or_else(|| by_id.get(original_node_id.as_str())) else {
            log::warn!("run payload entry '{original_node_id}' matches no node on canvas '{canvas_id}'; dropping");
            continue;
        };

        if node.kind.as_str() == NodeKind::TEXT {
            let text = match value {
                RunPayloadValue::Base64 { data, .. } => data.clone(),
                RunPayloadValue::Url { url } => url.clone(),
                RunPayloadValue::AssetId { asset_id } => asset_id.clone(),
            };
            let mut updated = (*node).clone();
            if !updated.config.is_object() {
                updated.config = serde_json::Value::Object(serde_json::Map::new());
            }
            updated.config.as_object_mut().expect("set to an object above").insert("content".to_string(), serde_json::Value::String(text));
            store.update_node(updated).await?;
            continue;
        }

        if node.kind.as_str() == NodeKind::FILE {
            let file_ref = match value {
                RunPayloadValue::Base64 { data, mime_type } => {
                    let asset_id = store.allocate_id();
                    let asset = FileAsset {
                        id: asset_id.clone(),
                        bucket: "run-payloads".to_string(),
                        key: asset_id.clone(),
                        mime_type: mime_type.clone().unwrap_or_else(|| "application/octet-stream".to_string()),
                        dimensions: None,
                        duration_ms: None,
                    };
                    store.put_asset(asset).await?;
                    FileReference {
                        id: asset_id.clone(),
                        key: asset_id,
                        bucket: "run-payloads".to_string(),
                        mime_type: mime_type.clone().unwrap_or_else(|| "application/octet-stream".to_string()),
                        dimensions: None,
                        duration_ms: None,
                    }
                }
                RunPayloadValue::AssetId { asset_id } => match store.get_asset(asset_id).await? {
                    Some(asset) => FileReference {
                        id: asset.id,
                        key: asset.key,
                        bucket: asset.bucket,
                        mime_type: asset.mime_type,
                        dimensions: asset.dimensions,
                        duration_ms: asset.duration_ms,
                    },
                    None => {
                        log::warn!("run payload entry '{original_node_id}' references unknown asset '{asset_id}'; dropping");
                        continue;
                    }
                },
                RunPayloadValue::Url { url } => {
                    log::warn!("run payload entry '{original_node_id}' is a bare URL reference; File nodes require a materialized asset, dropping");
                    let _ = url;
                    continue;
                }
            };

            let output_handle_id = graph
                .handles
                .iter()
                .filter(|h| h.node_id == node.id && matches!(h.direction, HandleDirection::Output))
                .min_by_key(|h| h.order)
                .map(|h| h.id.clone())
                .unwrap_or_default();

            let mut updated = (*node).clone();
            updated.result = ResultEnvelope {
                outputs: vec![Output { items: vec![Item { data_type: DataType::File, data: ItemData::FileReference(file_ref), output_handle_id }] }],
                selected_output_index: 0,
            };
            store.update_node(updated).await?;
            continue;
        }

        log::warn!("run payload entry '{original_node_id}' targets node kind '{}' which accepts no payload; dropping", node.kind.as_str());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_graph::{CanvasBuilder, DataType as DT};
    use canvas_store::InMemoryCanvasStore;

    use crate::batch_resolver::NullAssetUrlResolver;
    use crate::dispatch::InMemoryWorkQueue;

    async fn seed(snapshot: canvas_graph::CanvasSnapshot) -> InMemoryCanvasStore {
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
    async fn run_without_duplicate_writes_text_payload_and_dispatches() {
        let (snapshot, ids) = CanvasBuilder::new("c1", "owner").terminal_node("t", "text").output_handle("t", "out", DT::Text).build();
        let store = seed(snapshot).await;
        let (queue, _rx) = InMemoryWorkQueue::channel(4);

        let mut payload = HashMap::new();
        payload.insert(ids.node("t"), RunPayloadValue::Base64 { data: "hello".to_string(), mime_type: None });

        let request = RunRequest { canvas_id: "c1".to_string(), payload, duplicate: false };
        let response = run(&store, &queue, &NullAssetUrlResolver, request).await.unwrap();
        assert!(response.success);

        let node = store.get_node(&ids.node("t")).await.unwrap();
        assert_eq!(node.config["content"], serde_json::json!("hello"));
    }

    #[tokio::test]
    async fn run_with_empty_canvas_resolves_synchronously() {
        let (snapshot, _ids) = CanvasBuilder::new("c1", "owner").build();
        let store = seed(snapshot).await;
        let (queue, _rx) = InMemoryWorkQueue::channel(4);

        let request = RunRequest { canvas_id: "c1".to_string(), payload: HashMap::new(), duplicate: false };
        let response = run(&store, &queue, &NullAssetUrlResolver, request).await.unwrap();
        assert!(response.result.is_some());
    }

    #[tokio::test]
    async fn run_with_duplicate_keys_result_by_original_node_id_end_to_end() {
        use crate::worker::execute_batch;
        use canvas_graph::{Item, ItemData, Output, ResultEnvelope};
        use node_processor_contract::{ProcessorInput, ProcessorOutput, ProcessorRegistry};

        let (snapshot, ids) = CanvasBuilder::new("c1", "owner")
            .node("a", "text")
            .output_handle("a", "out", DT::Text)
            .terminal_node("export", "export")
            .input_handle("export", "in", DT::Text, true)
            .edge("a", "out", "export", "in")
            .build();
        let store = seed(snapshot).await;
        let (queue, mut receiver) = InMemoryWorkQueue::channel(4);

        let source_export_id = ids.node("export");
        let mut payload = HashMap::new();
        payload.insert(ids.node("a"), RunPayloadValue::Base64 { data: "hello".to_string(), mime_type: None });

        let request = RunRequest { canvas_id: "c1".to_string(), payload, duplicate: true };
        let response = run(&store, &queue, &NullAssetUrlResolver, request).await.unwrap();
        assert!(response.success);
        assert!(response.result.is_none(), "batch has retained nodes and has not executed yet");

        let mut registry = ProcessorRegistry::new();
        registry.register_callback("text", |input: ProcessorInput<'_>| {
            Box::pin(async move {
                let content = input.node.config.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let mut result = ResultEnvelope::empty();
                result.outputs.push(Output {
                    items: vec![Item { data_type: DT::Text, data: ItemData::Primitive(serde_json::json!(content)), output_handle_id: format!("{}:out", input.node.id) }],
                });
                ProcessorOutput::succeeded(result)
            })
        });
        registry.register_callback("export", |input: ProcessorInput<'_>| {
            Box::pin(async move {
                let value = input.resolver.get_input_value(&input.node.id, true, &canvas_graph::InputSelector { data_type: DT::Text, label: Some("in".to_string()) });
                match value {
                    Ok(Some(item)) => {
                        let mut result = ResultEnvelope::empty();
                        result.outputs.push(Output { items: vec![Item { data_type: DT::Text, data: item.data, output_handle_id: format!("{}:in", input.node.id) }] });
                        ProcessorOutput::succeeded(result)
                    }
                    Ok(None) => ProcessorOutput::succeeded_unchanged(),
                    Err(err) => ProcessorOutput::failed(err.to_string()),
                }
            })
        });

        let envelope = receiver.try_recv().expect("run() dispatches the duplicated canvas's batch immediately");
        let storage = canvas_graph::NullMediaBufferSource;
        execute_batch(&store, &registry, &storage, &queue, envelope).await.unwrap();

        let status = run_status(&store, &NullAssetUrlResolver, &response.batch_handle_id).await.unwrap();
        let result = status.result.expect("batch finished");
        assert_eq!(result.len(), 1);
        assert_eq!(result[&source_export_id].data, crate::batch_resolver::ExportData::Primitive(serde_json::json!("hello")));
    }

    #[tokio::test]
    async fn run_status_omits_result_until_finished() {
        let (snapshot, ids) = CanvasBuilder::new("c1", "owner")
            .node("a", "text")
            .output_handle("a", "out", DT::Text)
            .node("b", "echo")
            .input_handle("b", "in", DT::Text, true)
            .edge("a", "out", "b", "in")
            .with_text_output("a", "out", "hi")
            .build();
        let store = seed(snapshot).await;
        let (queue, _rx) = InMemoryWorkQueue::channel(4);

        let outcome = process_nodes(&store, &queue, "c1", Some(&[ids.node("b")]), None).await.unwrap();
        let status = run_status(&store, &NullAssetUrlResolver, &outcome.batch.id).await.unwrap();
        assert!(status.result.is_none());
    }
}
