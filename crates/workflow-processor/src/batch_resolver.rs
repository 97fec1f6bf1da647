//! Batch Resolver (C5, `spec.md` §4.5): composes the final API-visible
//! result set from a finished batch, keyed by the *original*
//! (pre-duplication) node id.

use std::collections::HashMap;

use canvas_graph::{DataType, FileReference, ItemData, NodeId, NodeKind};
use canvas_store::CanvasStore;

use crate::error::Result;

/// The resolved form of one Export node's selected item: either the
/// primitive value itself, or a data URL / signed URL standing in for a
/// `FileReference`/`ProcessData` payload (`spec.md` §4.5 step 5).
#[derive(Debug, Clone, PartialEq)]
pub enum ExportData {
    Primitive(serde_json::Value),
    Url(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportResult {
    pub data_type: DataType,
    pub data: ExportData,
}

/// Host boundary for turning a `FileReference` into a client-consumable
/// URL. Object storage itself is out of scope (`spec.md` §1); this trait
/// models only the lookup the Batch Resolver needs.
pub trait AssetUrlResolver: Send + Sync {
    fn resolve(&self, file_ref: &FileReference) -> Option<String>;
}

/// An `AssetUrlResolver` that never resolves anything — useful in tests
/// that only exercise the primitive / already-materialized-URL paths.
pub struct NullAssetUrlResolver;

impl AssetUrlResolver for NullAssetUrlResolver {
    fn resolve(&self, _file_ref: &FileReference) -> Option<String> {
        None
    }
}

/// `spec.md` §4.5 steps 1-6: collect the results of every Export-type node
/// that ran in `batch_id`, resolve each to a client-consumable form, and
/// key the result by the node's `original_node_id` (falling back to the
/// node's own id when it has none — i.e. the batch ran on a canvas that
/// was never duplicated). A batch with no Export nodes returns an empty
/// map, not an error.
pub async fn resolve_batch_result(store: &dyn CanvasStore, batch_id: &str, asset_resolver: &dyn AssetUrlResolver) -> Result<HashMap<NodeId, ExportResult>> {
    let tasks = store.list_tasks(batch_id).await?;

    let mut results = HashMap::new();
    for task in tasks {
        let node = match store.get_node(&task.node_id).await {
            Ok(node) => node,
            Err(_) => {
                log::debug!("skipping task '{}': node '{}' no longer exists", task.id, task.node_id);
                continue;
            }
        };

        if node.kind.as_str() != NodeKind::EXPORT {
            continue;
        }

        let Some(output) = node.result.selected_output() else {
            log::debug!("export node '{}' has no selected output; skipping", node.id);
            continue;
        };
        let Some(item) = output.items.first() else {
            log::debug!("export node '{}' has an empty selected output; skipping", node.id);
            continue;
        };

        let data = match &item.data {
            ItemData::Primitive(value) => ExportData::Primitive(value.clone()),
            ItemData::FileReference(file_ref) => match asset_resolver.resolve(file_ref) {
                Some(url) => ExportData::Url(url),
                None => {
                    log::warn!("could not resolve a URL for file asset '{}' on export node '{}'", file_ref.id, node.id);
                    continue;
                }
            },
            ItemData::ProcessData(process_data) => {
                let url = process_data.data_url.clone().or_else(|| process_data.signed_url.clone());
                match url {
                    Some(url) => ExportData::Url(url),
                    None => {
                        log::warn!("process data on export node '{}' carries neither a data url nor a signed url", node.id);
                        continue;
                    }
                }
            }
            ItemData::VirtualMediaTree(tree) => ExportData::Primitive(serde_json::to_value(tree).unwrap_or(serde_json::Value::Null)),
        };

        let key = node.original_node_id.clone().unwrap_or_else(|| node.id.clone());
        results.insert(key, ExportResult { data_type: item.data_type, data });
    }

    Ok(results)
}
