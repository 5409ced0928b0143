//! Converts metric samples into ECS-style nested document fields.
//!
//! Explicitly configured metrics use their declared field path and type;
//! everything else maps automatically by turning the underscore-separated
//! metric name into a dotted path.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

use crate::config::runtime::MetricConfig;
use crate::fetch::{MetricSample, MetricValue};

/// A resolved dotted path and coerced value, derived from one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedField {
    pub path: String,
    pub value: Value,
}

/// Maps one sample to its document field.
pub fn map_sample(
    sample: &MetricSample,
    metric_configs: &BTreeMap<&str, &MetricConfig>,
) -> MappedField {
    let mapping = metric_configs
        .get(sample.family.as_str())
        .and_then(|c| c.ecs_mapping.as_ref());

    match mapping {
        Some(mapping) => {
            let value = if mapping.field_type.is_string_like() {
                label_value(sample).unwrap_or_else(|| coerce_value(&sample.value))
            } else {
                coerce_value(&sample.value)
            };
            MappedField {
                path: mapping.field.clone(),
                value,
            }
        }
        None => MappedField {
            path: auto_field_path(&sample.family),
            value: coerce_value(&sample.value),
        },
    }
}

/// For string-like fields, a label keyed by the metric's base name (the
/// portion before the first underscore) supplies the value.
fn label_value(sample: &MetricSample) -> Option<Value> {
    let base = sample.name.split('_').next().unwrap_or(&sample.name);
    sample
        .labels
        .get(base)
        .map(|v| Value::String(v.clone()))
}

/// Derives a dotted field path from a metric name:
/// `node_memory_MemFree_bytes` becomes `node.memory.MemFree.bytes`.
pub fn auto_field_path(metric_name: &str) -> String {
    metric_name.replace('_', ".")
}

/// Coerces a sample value into a JSON value.
///
/// Numeric and boolean values pass through unchanged. Text tries boolean
/// literal, then integer, then float, and falls back to the raw string.
pub fn coerce_value(value: &MetricValue) -> Value {
    match value {
        MetricValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        MetricValue::Integer(i) => Value::Number((*i).into()),
        MetricValue::Boolean(b) => Value::Bool(*b),
        MetricValue::Text(s) => coerce_text(s),
    }
}

fn coerce_text(s: &str) -> Value {
    let lowered = s.to_lowercase();
    if lowered == "true" || lowered == "false" {
        return Value::Bool(lowered == "true");
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = s.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(s.to_string())
}

/// Sets a dotted-path field in a nested document, creating intermediate
/// objects as needed. The final segment overwrites any existing value at
/// that exact path.
pub fn insert_nested(doc: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = doc;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return;
        }
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = slot.as_object_mut().expect("slot was just made an object");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::runtime::{EcsFieldType, EcsMapping};
    use chrono::Utc;
    use serde_json::json;

    fn sample(family: &str, name: &str, value: MetricValue) -> MetricSample {
        MetricSample {
            family: family.to_string(),
            name: name.to_string(),
            labels: BTreeMap::new(),
            value,
            timestamp: Utc::now(),
            configured: false,
        }
    }

    fn metric_config(name: &str, mapping: Option<EcsMapping>) -> MetricConfig {
        MetricConfig {
            name: name.to_string(),
            path: name.to_string(),
            labels: None,
            ecs_mapping: mapping,
        }
    }

    #[test]
    fn auto_path_replaces_underscores_with_dots() {
        assert_eq!(
            auto_field_path("node_memory_MemFree_bytes"),
            "node.memory.MemFree.bytes"
        );
    }

    #[test]
    fn unconfigured_sample_maps_automatically() {
        let s = sample(
            "node_memory_MemFree_bytes",
            "node_memory_MemFree_bytes",
            MetricValue::Float(1024.0),
        );
        let mapped = map_sample(&s, &BTreeMap::new());
        assert_eq!(mapped.path, "node.memory.MemFree.bytes");
        assert_eq!(mapped.value, json!(1024.0));
    }

    #[test]
    fn explicit_keyword_mapping_prefers_matching_label() {
        let mut s = sample("interface_status", "interface_status", MetricValue::Float(1.0));
        s.labels.insert("interface".to_string(), "eth0".to_string());

        let config = metric_config(
            "interface_status",
            Some(EcsMapping {
                field: "network.interface.name".to_string(),
                field_type: EcsFieldType::Keyword,
            }),
        );
        let configs: BTreeMap<&str, &MetricConfig> =
            [("interface_status", &config)].into_iter().collect();

        let mapped = map_sample(&s, &configs);
        assert_eq!(mapped.path, "network.interface.name");
        assert_eq!(mapped.value, json!("eth0"));
    }

    #[test]
    fn explicit_keyword_mapping_without_label_falls_back_to_value() {
        let s = sample("interface_status", "interface_status", MetricValue::Float(1.0));
        let config = metric_config(
            "interface_status",
            Some(EcsMapping {
                field: "network.interface.name".to_string(),
                field_type: EcsFieldType::Keyword,
            }),
        );
        let configs: BTreeMap<&str, &MetricConfig> =
            [("interface_status", &config)].into_iter().collect();
        assert_eq!(map_sample(&s, &configs).value, json!(1.0));
    }

    #[test]
    fn explicit_numeric_mapping_ignores_labels() {
        let mut s = sample("load_average", "load_average", MetricValue::Float(0.5));
        s.labels.insert("load".to_string(), "high".to_string());
        let config = metric_config(
            "load_average",
            Some(EcsMapping {
                field: "system.load.avg".to_string(),
                field_type: EcsFieldType::Double,
            }),
        );
        let configs: BTreeMap<&str, &MetricConfig> =
            [("load_average", &config)].into_iter().collect();
        let mapped = map_sample(&s, &configs);
        assert_eq!(mapped.path, "system.load.avg");
        assert_eq!(mapped.value, json!(0.5));
    }

    #[test]
    fn text_values_coerce_bool_int_float_then_string() {
        assert_eq!(coerce_value(&MetricValue::Text("true".to_string())), json!(true));
        assert_eq!(coerce_value(&MetricValue::Text("42".to_string())), json!(42));
        assert_eq!(coerce_value(&MetricValue::Text("3.14".to_string())), json!(3.14));
        assert_eq!(coerce_value(&MetricValue::Text("abc".to_string())), json!("abc"));
    }

    #[test]
    fn numeric_and_boolean_values_pass_through() {
        assert_eq!(coerce_value(&MetricValue::Integer(7)), json!(7));
        assert_eq!(coerce_value(&MetricValue::Boolean(false)), json!(false));
        assert_eq!(coerce_value(&MetricValue::Float(2.5)), json!(2.5));
    }

    #[test]
    fn non_finite_floats_map_to_null() {
        assert_eq!(coerce_value(&MetricValue::Float(f64::NAN)), Value::Null);
        assert_eq!(coerce_value(&MetricValue::Float(f64::INFINITY)), Value::Null);
    }

    #[test]
    fn nested_insert_creates_intermediate_levels() {
        let mut doc = Map::new();
        insert_nested(&mut doc, "a.b.c", json!(1));
        insert_nested(&mut doc, "a.b.d", json!(2));
        assert_eq!(Value::Object(doc), json!({"a": {"b": {"c": 1, "d": 2}}}));
    }

    #[test]
    fn nested_insert_overwrites_exact_path() {
        let mut doc = Map::new();
        insert_nested(&mut doc, "a.b", json!(1));
        insert_nested(&mut doc, "a.b", json!(2));
        assert_eq!(Value::Object(doc), json!({"a": {"b": 2}}));
    }
}
