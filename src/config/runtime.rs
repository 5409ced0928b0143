use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default Elasticsearch index for metric documents.
pub const DEFAULT_METRICS_INDEX: &str = "prometheus-bridge-metrics";

/// Authentication credentials, shared by the bootstrap and runtime scopes.
///
/// Exactly one variant is active per entity. Each variant denies unknown
/// fields, so an object mixing fields from two variants fails to
/// deserialize instead of silently matching the first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthMethod {
    Basic(BasicAuth),
    Bearer(BearerAuth),
    ApiKey(ApiKeyAuth),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BearerAuth {
    pub bearer_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiKeyAuth {
    pub api_key: String,
}

/// TLS settings as they appear on the wire.
///
/// Consumers never read `verify`/`ca_cert` directly; they go through
/// [`TlsConfig::verify_mode`] which resolves the pair into a single variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    #[serde(default = "default_verify")]
    pub verify: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,
}

fn default_verify() -> bool {
    true
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            verify: true,
            ca_cert: None,
            client_cert: None,
            client_key: None,
        }
    }
}

/// Resolved certificate-verification behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsVerify {
    /// Verify against the platform trust store.
    Default,
    /// Skip certificate verification entirely.
    Disabled,
    /// Verify against a CA bundle at the given path.
    CaBundle(PathBuf),
}

impl TlsConfig {
    pub fn verify_mode(&self) -> TlsVerify {
        if !self.verify {
            TlsVerify::Disabled
        } else if let Some(ca) = &self.ca_cert {
            TlsVerify::CaBundle(PathBuf::from(ca))
        } else {
            TlsVerify::Default
        }
    }

    /// Client certificate pair, present only when both halves are configured.
    pub fn client_identity(&self) -> Option<(PathBuf, PathBuf)> {
        match (&self.client_cert, &self.client_key) {
            (Some(cert), Some(key)) => Some((PathBuf::from(cert), PathBuf::from(key))),
            _ => None,
        }
    }
}

/// Valid ECS field types for explicit metric mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EcsFieldType {
    Keyword,
    Text,
    Long,
    Integer,
    Short,
    Byte,
    Double,
    Float,
    Date,
    Boolean,
    Ip,
}

impl EcsFieldType {
    /// String-like types prefer a matching label value over the raw sample value.
    pub fn is_string_like(self) -> bool {
        matches!(self, EcsFieldType::Keyword | EcsFieldType::Text)
    }
}

/// Explicit mapping from a metric family to an ECS field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EcsMapping {
    pub field: String,
    #[serde(rename = "type")]
    pub field_type: EcsFieldType,
}

/// One metric to collect from a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricConfig {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ecs_mapping: Option<EcsMapping>,
}

/// A Prometheus exporter endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    #[serde(rename = "type")]
    pub exporter_type: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// A target to scrape through one of the configured exporters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Must name a key in the exporters map; enforced by the validator.
    pub exporter: String,
    /// Per-target override of the exporter's URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exporter_url: Option<String>,
    pub interval: u64,
    /// Legacy free-form query parameters, superseded by the structured fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    pub metrics: Vec<MetricConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default = "default_metrics_index")]
    pub index: String,
}

fn default_metrics_index() -> String {
    DEFAULT_METRICS_INDEX.to_string()
}

impl TargetConfig {
    /// Query parameters for the scrape request. Structured fields win over
    /// the legacy params map when any of them is set.
    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(module) = &self.module {
            params.push(("module".to_string(), module.clone()));
        }
        if let Some(target) = &self.target {
            params.push(("target".to_string(), target.clone()));
        }
        if let Some(auth) = &self.auth {
            params.push(("auth".to_string(), auth.clone()));
        }
        if params.is_empty() {
            if let Some(legacy) = &self.params {
                params.extend(legacy.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        params
    }

    /// Configured metrics keyed by family name.
    pub fn metrics_by_name(&self) -> BTreeMap<&str, &MetricConfig> {
        self.metrics.iter().map(|m| (m.name.as_str(), m)).collect()
    }
}

/// Global settings applying to all exporters and targets.
///
/// `retries`, `retry_interval` and `concurrency` are accepted and validated
/// but not consumed by the fetch path; the validator warns when they are
/// present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default = "default_global_timeout")]
    pub timeout: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_interval")]
    pub retry_interval: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    /// Collection-cycle interval in seconds.
    #[serde(default = "default_cycle_interval")]
    pub interval: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

pub fn default_global_timeout() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}

fn default_retry_interval() -> u64 {
    5
}

fn default_concurrency() -> u32 {
    10
}

pub fn default_cycle_interval() -> u64 {
    60
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            timeout: default_global_timeout(),
            retries: default_retries(),
            retry_interval: default_retry_interval(),
            concurrency: default_concurrency(),
            interval: default_cycle_interval(),
            metadata: None,
        }
    }
}

/// Runtime configuration, loaded from the config index and replaced
/// wholesale at cycle boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub version: String,
    pub exporters: BTreeMap<String, ExporterConfig>,
    pub targets: BTreeMap<String, TargetConfig>,
    #[serde(default, rename = "global", skip_serializing_if = "Option::is_none")]
    pub global: Option<GlobalConfig>,
}

impl RuntimeConfig {
    /// Effective request timeout for a target: target override, then the
    /// exporter's setting, then the global default.
    pub fn effective_timeout(&self, target: &TargetConfig, exporter: &ExporterConfig) -> u64 {
        target
            .timeout
            .or(exporter.timeout)
            .or(self.global.as_ref().map(|g| g.timeout))
            .unwrap_or_else(default_global_timeout)
    }

    pub fn global_metadata(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.global.as_ref().and_then(|g| g.metadata.as_ref())
    }

    pub fn cycle_interval(&self) -> u64 {
        self.global
            .as_ref()
            .map(|g| g.interval)
            .unwrap_or_else(default_cycle_interval)
    }
}

/// Envelope for runtime configuration documents persisted in the config index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(rename = "@timestamp")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub config: serde_json::Value,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
