// Scrape path: connection resolution, one blocking GET, exposition parsing

pub mod exposition;

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use tracing::{debug, info, warn};

use crate::config::runtime::{
    AuthMethod, ExporterConfig, RuntimeConfig, TargetConfig, TlsConfig, TlsVerify,
};
use crate::error::{BridgeError, Result};

/// A metric value as carried through the mapping pipeline.
///
/// The exposition grammar only yields floats; the other kinds appear when
/// values are re-coerced during document mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
    Text(String),
}

/// One label-tagged value instance collected from a target.
#[derive(Debug, Clone)]
pub struct MetricSample {
    pub family: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: MetricValue,
    /// Fetch time; every sample from one scrape carries the same stamp.
    pub timestamp: DateTime<Utc>,
    /// Whether the family name matches a configured MetricConfig.
    pub configured: bool,
}

/// Fetches and parses metrics for one target.
///
/// Any transport, status or parse problem is fatal to this target for this
/// cycle only; the caller logs it and moves on to the next target.
pub fn fetch(config: &RuntimeConfig, target_name: &str) -> Result<Vec<MetricSample>> {
    let fetch_err = |message: String| BridgeError::Fetch {
        target: target_name.to_string(),
        message,
    };

    let target = config
        .targets
        .get(target_name)
        .ok_or_else(|| fetch_err("target not found in configuration".to_string()))?;
    let exporter = config.exporters.get(&target.exporter).ok_or_else(|| {
        fetch_err(format!("exporter '{}' not found in configuration", target.exporter))
    })?;

    let url = effective_url(target, exporter);
    let params = target.query_params();
    let timeout = config.effective_timeout(target, exporter);
    info!(%target_name, %url, timeout, "Fetching metrics");

    let client = build_client(&target.exporter, exporter, timeout).map_err(|e| match e {
        BridgeError::Fetch { .. } => e,
        other => fetch_err(other.to_string()),
    })?;

    let mut request = client.get(&url);
    if !params.is_empty() {
        request = request.query(&params);
    }
    request = apply_auth(request, exporter.auth.as_ref(), &target.exporter);

    let response = request
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| fetch_err(e.to_string()))?;
    let body = response.text().map_err(|e| fetch_err(e.to_string()))?;

    let raw = exposition::parse_exposition(&body).map_err(|e| fetch_err(e.to_string()))?;
    let configured_names: std::collections::BTreeSet<&str> =
        target.metrics.iter().map(|m| m.name.as_str()).collect();
    let timestamp = Utc::now();

    let samples: Vec<MetricSample> = raw
        .into_iter()
        .map(|s| MetricSample {
            configured: configured_names.contains(s.family.as_str()),
            family: s.family,
            name: s.name,
            labels: s.labels,
            value: MetricValue::Float(s.value),
            timestamp,
        })
        .collect();
    debug!(%target_name, count = samples.len(), "Parsed samples");
    Ok(samples)
}

/// Target-specific URL override wins over the exporter's default.
fn effective_url(target: &TargetConfig, exporter: &ExporterConfig) -> String {
    target
        .exporter_url
        .as_deref()
        .unwrap_or(&exporter.url)
        .trim_end_matches('/')
        .to_string()
}

fn build_client(exporter_name: &str, exporter: &ExporterConfig, timeout: u64) -> Result<Client> {
    let mut builder = Client::builder().timeout(Duration::from_secs(timeout.max(1)));

    if let Some(headers) = &exporter.headers {
        builder = builder.default_headers(header_map(headers)?);
    }

    if let Some(tls) = &exporter.tls {
        builder = apply_tls(builder, tls, exporter_name)?;
    }

    builder
        .build()
        .map_err(|e| BridgeError::Store(format!("failed to build HTTP client: {e}")))
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| BridgeError::Configuration(format!("invalid header name '{key}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| BridgeError::Configuration(format!("invalid header value for '{key}': {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Applies resolved TLS settings to a client builder. Shared by the scrape
/// path and the store connection.
pub(crate) fn apply_tls(
    mut builder: reqwest::blocking::ClientBuilder,
    tls: &TlsConfig,
    entity: &str,
) -> Result<reqwest::blocking::ClientBuilder> {
    match tls.verify_mode() {
        TlsVerify::Default => {}
        TlsVerify::Disabled => {
            warn!("TLS certificate verification is disabled for '{entity}'");
            builder = builder.danger_accept_invalid_certs(true);
        }
        TlsVerify::CaBundle(path) => {
            let pem = std::fs::read(&path)?;
            let cert = reqwest::Certificate::from_pem(&pem)?;
            builder = builder.add_root_certificate(cert);
        }
    }
    if let Some((cert_path, key_path)) = tls.client_identity() {
        let mut pem = std::fs::read(&cert_path)?;
        pem.extend(std::fs::read(&key_path)?);
        let identity = reqwest::Identity::from_pem(&pem)?;
        builder = builder.identity(identity);
    }
    Ok(builder)
}

/// Resolves the auth variant into the transport mechanism.
pub fn apply_auth(
    request: RequestBuilder,
    auth: Option<&AuthMethod>,
    entity: &str,
) -> RequestBuilder {
    match auth {
        None => request,
        Some(AuthMethod::Basic(basic)) => {
            debug!("Using basic authentication for '{entity}'");
            request.basic_auth(&basic.username, Some(&basic.password))
        }
        Some(AuthMethod::Bearer(bearer)) => {
            debug!("Using bearer token authentication for '{entity}'");
            request.header(AUTHORIZATION, format!("Bearer {}", bearer.bearer_token))
        }
        Some(AuthMethod::ApiKey(key)) => {
            debug!("Using API key authentication for '{entity}'");
            request.header(AUTHORIZATION, format!("ApiKey {}", key.api_key))
        }
    }
}
