// Document-store boundary: bulk indexing and runtime-config documents

pub mod elasticsearch;

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::config::runtime::ConfigDocument;
use crate::error::Result;

/// Per-item outcome of one bulk submission.
#[derive(Debug, Clone)]
pub struct BulkItemOutcome {
    pub status: u16,
    pub error: Option<String>,
}

/// Response of a bulk-index operation with per-item success reporting.
#[derive(Debug, Clone, Default)]
pub struct BulkResponse {
    pub items: Vec<BulkItemOutcome>,
}

impl BulkResponse {
    pub fn failed(&self) -> usize {
        self.items.iter().filter(|i| i.error.is_some()).count()
    }

    pub fn succeeded(&self) -> usize {
        self.items.len() - self.failed()
    }

    pub fn errors(&self) -> Vec<String> {
        self.items.iter().filter_map(|i| i.error.clone()).collect()
    }
}

/// Blocking boundary to the document store.
///
/// All access happens from the single sequential run loop; one connection is
/// created from the bootstrap configuration and reused across cycles.
pub trait MetricStore: Send + Sync {
    /// Connection test; returns a human-readable identity of the store.
    fn cluster_info(&self) -> Result<String>;

    /// Submits all documents as one bulk operation. Partial item failure is
    /// reported, not raised.
    fn bulk_index(&self, index: &str, documents: &[Value]) -> Result<BulkResponse>;

    /// The latest configuration document by `@timestamp`, if any.
    fn latest_config(&self, index: &str) -> Result<Option<ConfigDocument>>;

    /// Persists a configuration document; returns its assigned id.
    fn put_config(&self, index: &str, document: &ConfigDocument) -> Result<String>;
}

/// In-memory store for development and testing.
///
/// Bulk items whose position appears in `failing_indices` report an
/// item-level error, mimicking partial bulk failure.
#[derive(Default)]
pub struct InMemoryStore {
    documents: Mutex<BTreeMap<String, Vec<Value>>>,
    configs: Mutex<Vec<ConfigDocument>>,
    failing_indices: Vec<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_indices(indices: Vec<usize>) -> Self {
        Self {
            failing_indices: indices,
            ..Self::default()
        }
    }

    pub fn push_config(&self, document: ConfigDocument) {
        self.configs.lock().unwrap().push(document);
    }

    pub fn documents_in(&self, index: &str) -> Vec<Value> {
        self.documents
            .lock()
            .unwrap()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }
}

impl MetricStore for InMemoryStore {
    fn cluster_info(&self) -> Result<String> {
        Ok("in-memory".to_string())
    }

    fn bulk_index(&self, index: &str, documents: &[Value]) -> Result<BulkResponse> {
        let mut stored = self.documents.lock().unwrap();
        let slot = stored.entry(index.to_string()).or_default();
        let mut items = Vec::with_capacity(documents.len());
        for (i, doc) in documents.iter().enumerate() {
            if self.failing_indices.contains(&i) {
                items.push(BulkItemOutcome {
                    status: 400,
                    error: Some(format!("injected failure for document {i}")),
                });
            } else {
                slot.push(doc.clone());
                items.push(BulkItemOutcome {
                    status: 201,
                    error: None,
                });
            }
        }
        Ok(BulkResponse { items })
    }

    fn latest_config(&self, _index: &str) -> Result<Option<ConfigDocument>> {
        let configs = self.configs.lock().unwrap();
        Ok(configs
            .iter()
            .max_by_key(|c| c.timestamp)
            .cloned())
    }

    fn put_config(&self, _index: &str, document: &ConfigDocument) -> Result<String> {
        let mut configs = self.configs.lock().unwrap();
        configs.push(document.clone());
        Ok(format!("config-{}", configs.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn bulk_response_counts_partial_failures() {
        let store = InMemoryStore::with_failing_indices(vec![1, 3]);
        let docs: Vec<Value> = (0..5).map(|i| json!({"n": i})).collect();
        let response = store.bulk_index("idx", &docs).unwrap();
        assert_eq!(response.succeeded(), 3);
        assert_eq!(response.failed(), 2);
        assert_eq!(store.documents_in("idx").len(), 3);
    }

    #[test]
    fn latest_config_is_newest_by_timestamp() {
        let store = InMemoryStore::new();
        for (ts, version) in [(100, "old"), (300, "new"), (200, "mid")] {
            store.push_config(ConfigDocument {
                timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
                config: json!({}),
                version: version.to_string(),
                description: None,
            });
        }
        let latest = store.latest_config("any").unwrap().unwrap();
        assert_eq!(latest.version, "new");
    }
}
