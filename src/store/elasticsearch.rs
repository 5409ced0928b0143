use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::config::bootstrap::StoreConfig;
use crate::config::runtime::ConfigDocument;
use crate::error::{BridgeError, Result};
use crate::fetch::{apply_auth, apply_tls};
use crate::store::{BulkItemOutcome, BulkResponse, MetricStore};

const STORE_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Blocking Elasticsearch client, created once from the bootstrap
/// configuration and shared across all cycles.
pub struct ElasticsearchStore {
    base_url: String,
    config: StoreConfig,
    client: Client,
}

impl ElasticsearchStore {
    pub fn connect(config: &StoreConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(Duration::from_secs(STORE_REQUEST_TIMEOUT_SECS));
        if let Some(tls) = &config.tls {
            builder = apply_tls(builder, tls, "elasticsearch")?;
        }
        let client = builder
            .build()
            .map_err(|e| BridgeError::Store(format!("failed to build store client: {e}")))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            config: config.clone(),
            client,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        apply_auth(
            self.client.request(method, url),
            self.config.auth.as_ref(),
            "elasticsearch",
        )
    }

    fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request.send().map_err(|e| BridgeError::Store(e.to_string()))?;
        let status = response.status();
        let body: Value = response
            .json()
            .map_err(|e| BridgeError::Store(format!("invalid store response: {e}")))?;
        if !status.is_success() {
            return Err(BridgeError::Store(format!(
                "store request failed with status {status}: {body}"
            )));
        }
        Ok(body)
    }
}

impl MetricStore for ElasticsearchStore {
    fn cluster_info(&self) -> Result<String> {
        let info = self.send(self.request(reqwest::Method::GET, "/"))?;
        let name = info
            .get("cluster_name")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        info!("Connected to Elasticsearch cluster: {name}");
        Ok(name)
    }

    fn bulk_index(&self, index: &str, documents: &[Value]) -> Result<BulkResponse> {
        if documents.is_empty() {
            return Ok(BulkResponse::default());
        }

        let mut body = String::new();
        for doc in documents {
            body.push_str(&json!({"index": {"_index": index}}).to_string());
            body.push('\n');
            body.push_str(&doc.to_string());
            body.push('\n');
        }

        let response = self.send(
            self.request(reqwest::Method::POST, "/_bulk?refresh=true")
                .header(CONTENT_TYPE, "application/x-ndjson")
                .body(body),
        )?;

        let items = response
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        let action = item.get("index").unwrap_or(item);
                        BulkItemOutcome {
                            status: action
                                .get("status")
                                .and_then(Value::as_u64)
                                .unwrap_or(0) as u16,
                            error: action.get("error").map(|e| {
                                e.get("reason")
                                    .and_then(Value::as_str)
                                    .map(str::to_string)
                                    .unwrap_or_else(|| e.to_string())
                            }),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let bulk = BulkResponse { items };
        if bulk.failed() > 0 {
            error!(
                "Errors occurred during bulk indexing: {} documents failed",
                bulk.failed()
            );
            for reason in bulk.errors().iter().take(5) {
                error!("Bulk item error: {reason}");
            }
        } else {
            debug!("Successfully indexed {} documents", bulk.succeeded());
        }
        Ok(bulk)
    }

    fn latest_config(&self, index: &str) -> Result<Option<ConfigDocument>> {
        let body = json!({
            "size": 1,
            "sort": [{"@timestamp": {"order": "desc"}}]
        });
        let response = self.send(
            self.request(reqwest::Method::POST, &format!("/{index}/_search"))
                .json(&body),
        )?;

        let hit = response
            .pointer("/hits/hits/0/_source")
            .cloned();
        match hit {
            None => Ok(None),
            Some(source) => {
                let document: ConfigDocument = serde_json::from_value(source)
                    .map_err(|e| BridgeError::Store(format!("invalid config document: {e}")))?;
                Ok(Some(document))
            }
        }
    }

    fn put_config(&self, index: &str, document: &ConfigDocument) -> Result<String> {
        let response = self.send(
            self.request(reqwest::Method::POST, &format!("/{index}/_doc?refresh=true"))
                .json(document),
        )?;
        Ok(response
            .get("_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}
