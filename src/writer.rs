//! Groups mapped samples into per-cycle documents and bulk-writes them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::runtime::TargetConfig;
use crate::fetch::MetricSample;
use crate::mapping::{insert_nested, map_sample};
use crate::store::MetricStore;
use crate::error::Result;

/// Outcome of one bulk submission; partial failure is expected and
/// tolerated, callers continue with subsequent targets and cycles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteResult {
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Builds one output document per fetch timestamp.
///
/// Mapped fields merge under `metrics` (later field for the same path
/// wins); sample labels merge under `labels` (first writer wins, filtered
/// by each configured metric's allowlist); global then target metadata
/// merge at the top level.
pub fn build_documents(
    samples: &[MetricSample],
    target: &TargetConfig,
    global_metadata: Option<&Map<String, Value>>,
) -> Vec<Value> {
    let metric_configs = target.metrics_by_name();

    let mut by_timestamp: BTreeMap<DateTime<Utc>, Vec<&MetricSample>> = BTreeMap::new();
    for sample in samples {
        by_timestamp.entry(sample.timestamp).or_default().push(sample);
    }

    let mut documents = Vec::with_capacity(by_timestamp.len());
    for (timestamp, group) in by_timestamp {
        let mut doc = Map::new();

        if let Some(global) = global_metadata {
            for (key, value) in global {
                doc.insert(key.clone(), value.clone());
            }
        }
        if let Some(metadata) = &target.metadata {
            for (key, value) in metadata {
                doc.insert(key.clone(), value.clone());
            }
        }

        doc.insert(
            "@timestamp".to_string(),
            Value::String(timestamp.to_rfc3339()),
        );
        doc.insert(
            "event".to_string(),
            json!({"kind": "metric", "dataset": "prometheus", "module": "prometheus"}),
        );
        doc.insert("service".to_string(), json!({"type": "prometheus"}));

        let mut metrics = Map::new();
        let mut labels = Map::new();
        for sample in group {
            let mapped = map_sample(sample, &metric_configs);
            insert_nested(&mut metrics, &mapped.path, mapped.value);

            let allowlist = metric_configs
                .get(sample.family.as_str())
                .and_then(|c| c.labels.as_ref());
            for (key, value) in &sample.labels {
                let allowed = allowlist.map_or(true, |list| list.iter().any(|l| l == key));
                if allowed && !labels.contains_key(key) {
                    labels.insert(key.clone(), Value::String(value.clone()));
                }
            }
        }
        doc.insert("metrics".to_string(), Value::Object(metrics));
        doc.insert("labels".to_string(), Value::Object(labels));

        documents.push(Value::Object(doc));
    }
    documents
}

/// Writes all samples for one target as a single bulk submission.
pub fn write_metrics(
    store: &dyn MetricStore,
    samples: &[MetricSample],
    target: &TargetConfig,
    global_metadata: Option<&Map<String, Value>>,
) -> Result<WriteResult> {
    if samples.is_empty() {
        warn!("No metrics to write");
        return Ok(WriteResult::default());
    }

    let documents = build_documents(samples, target, global_metadata);
    let response = store.bulk_index(&target.index, &documents)?;

    let result = WriteResult {
        success: response.succeeded(),
        failed: response.failed(),
        errors: response.errors(),
    };
    debug!(
        index = %target.index,
        success = result.success,
        failed = result.failed,
        "Bulk write complete"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MetricValue;
    use crate::store::InMemoryStore;
    use chrono::TimeZone;
    use serde_json::json;

    fn target(metrics: Vec<crate::config::runtime::MetricConfig>) -> TargetConfig {
        serde_json::from_value(json!({
            "exporter": "e",
            "interval": 60,
            "metrics": [],
            "index": "test-metrics"
        }))
        .map(|mut t: TargetConfig| {
            t.metrics = metrics;
            t
        })
        .unwrap()
    }

    fn sample_at(ts: i64, family: &str, value: f64) -> MetricSample {
        MetricSample {
            family: family.to_string(),
            name: family.to_string(),
            labels: BTreeMap::new(),
            value: MetricValue::Float(value),
            timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
            configured: false,
        }
    }

    #[test]
    fn samples_sharing_a_timestamp_produce_one_document() {
        let samples = vec![
            sample_at(1000, "node_load1", 0.5),
            sample_at(1000, "node_load5", 0.7),
        ];
        let docs = build_documents(&samples, &target(vec![]), None);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["metrics"]["node"]["load1"], json!(0.5));
        assert_eq!(docs[0]["metrics"]["node"]["load5"], json!(0.7));
    }

    #[test]
    fn distinct_timestamps_produce_distinct_documents() {
        let samples = vec![
            sample_at(1000, "node_load1", 0.5),
            sample_at(2000, "node_load1", 0.6),
        ];
        let docs = build_documents(&samples, &target(vec![]), None);
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn label_collisions_keep_the_first_writer() {
        let mut first = sample_at(1000, "iface_in", 1.0);
        first
            .labels
            .insert("device".to_string(), "eth0".to_string());
        let mut second = sample_at(1000, "iface_out", 2.0);
        second
            .labels
            .insert("device".to_string(), "eth1".to_string());

        let docs = build_documents(&[first, second], &target(vec![]), None);
        assert_eq!(docs[0]["labels"]["device"], json!("eth0"));
    }

    #[test]
    fn label_allowlist_filters_merged_labels() {
        let metric: crate::config::runtime::MetricConfig = serde_json::from_value(json!({
            "name": "iface_in",
            "path": "iface_in",
            "labels": ["device"]
        }))
        .unwrap();
        let mut sample = sample_at(1000, "iface_in", 1.0);
        sample.labels.insert("device".to_string(), "eth0".to_string());
        sample.labels.insert("noisy".to_string(), "x".to_string());

        let docs = build_documents(&[sample], &target(vec![metric]), None);
        assert_eq!(docs[0]["labels"], json!({"device": "eth0"}));
    }

    #[test]
    fn metadata_merges_with_target_overriding_global() {
        let mut global = Map::new();
        global.insert("site".to_string(), json!("global-site"));
        global.insert("team".to_string(), json!("netops"));

        let mut t = target(vec![]);
        t.metadata = Some(
            json!({"site": "rack-12"})
                .as_object()
                .cloned()
                .unwrap(),
        );

        let docs = build_documents(&[sample_at(1000, "up", 1.0)], &t, Some(&global));
        assert_eq!(docs[0]["site"], json!("rack-12"));
        assert_eq!(docs[0]["team"], json!("netops"));
        assert_eq!(docs[0]["event"]["kind"], json!("metric"));
    }

    #[test]
    fn colliding_field_paths_keep_the_later_sample() {
        let samples = vec![
            sample_at(1000, "node_load1", 0.5),
            sample_at(1000, "node_load1", 0.9),
        ];
        let docs = build_documents(&samples, &target(vec![]), None);
        assert_eq!(docs[0]["metrics"]["node"]["load1"], json!(0.9));
    }

    #[test]
    fn partial_bulk_failure_is_counted_not_raised() {
        let store = InMemoryStore::with_failing_indices(vec![0, 3]);
        let samples: Vec<MetricSample> = (0..5)
            .map(|i| sample_at(1000 + i, "node_load1", i as f64))
            .collect();
        let result = write_metrics(&store, &samples, &target(vec![]), None).unwrap();
        assert_eq!(result.success, 3);
        assert_eq!(result.failed, 2);
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn empty_samples_write_nothing() {
        let store = InMemoryStore::new();
        let result = write_metrics(&store, &[], &target(vec![]), None).unwrap();
        assert_eq!(result, WriteResult::default());
        assert!(store.documents_in("test-metrics").is_empty());
    }
}
