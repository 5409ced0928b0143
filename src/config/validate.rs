use std::fmt;

use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::warn;

use crate::config::bootstrap::BootstrapConfig;
use crate::config::runtime::RuntimeConfig;
use crate::error::{BridgeError, Result};

static BOOTSTRAP_SCHEMA: Lazy<JSONSchema> =
    Lazy::new(|| compile_schema(include_str!("../../schemas/bootstrap.schema.json")));

static RUNTIME_SCHEMA: Lazy<JSONSchema> =
    Lazy::new(|| compile_schema(include_str!("../../schemas/runtime.schema.json")));

fn compile_schema(raw: &str) -> JSONSchema {
    let schema_json: Value = serde_json::from_str(raw).expect("embedded schema is valid JSON");
    let schema_static: &'static Value = Box::leak(Box::new(schema_json));
    JSONSchema::options()
        .compile(schema_static)
        .expect("embedded schema compiles")
}

/// One validation problem, located by a dotted path into the config tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

fn schema_issues(schema: &JSONSchema, tree: &Value) -> Vec<ValidationIssue> {
    match schema.validate(tree) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|e| {
                let path = e
                    .instance_path
                    .to_string()
                    .trim_start_matches('/')
                    .replace('/', ".");
                ValidationIssue::new(path, e.to_string())
            })
            .collect(),
    }
}

/// Validates the `bootstrap` subtree and deserializes it into the typed
/// configuration. All structural problems are reported together.
pub fn validate_bootstrap(tree: &Value) -> Result<BootstrapConfig> {
    let issues = schema_issues(&BOOTSTRAP_SCHEMA, tree);
    if !issues.is_empty() {
        return Err(BridgeError::Validation(issues));
    }
    Ok(serde_json::from_value(tree.clone())?)
}

/// Validates a runtime configuration tree and deserializes it.
///
/// Single pass, no short-circuit: structural schema violations, unresolved
/// exporter references and unparsable metric path patterns are collected
/// into one complete issue list.
pub fn validate_runtime(tree: &Value) -> Result<RuntimeConfig> {
    let mut issues = schema_issues(&RUNTIME_SCHEMA, tree);
    issues.extend(cross_reference_issues(tree));
    issues.extend(metric_path_issues(tree));
    if !issues.is_empty() {
        return Err(BridgeError::Validation(issues));
    }

    let config: RuntimeConfig = serde_json::from_value(tree.clone())?;
    warn_inert_global_fields(tree);
    Ok(config)
}

/// Every target's exporter reference must resolve to a declared exporter.
/// The issue names both the target and the missing exporter.
fn cross_reference_issues(tree: &Value) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let exporters = tree.get("exporters").and_then(Value::as_object);
    let targets = tree.get("targets").and_then(Value::as_object);

    if let Some(targets) = targets {
        for (target_name, target) in targets {
            let Some(exporter_ref) = target.get("exporter").and_then(Value::as_str) else {
                // Missing/mistyped exporter field is already a schema issue
                continue;
            };
            let known = exporters.map(|e| e.contains_key(exporter_ref)).unwrap_or(false);
            if !known {
                issues.push(ValidationIssue::new(
                    format!("targets.{target_name}.exporter"),
                    format!(
                        "target '{target_name}' references unknown exporter '{exporter_ref}'"
                    ),
                ));
            }
        }
    }
    issues
}

/// Metric path patterns must compile as regexes.
fn metric_path_issues(tree: &Value) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let Some(targets) = tree.get("targets").and_then(Value::as_object) else {
        return issues;
    };
    for (target_name, target) in targets {
        let Some(metrics) = target.get("metrics").and_then(Value::as_array) else {
            continue;
        };
        for (i, metric) in metrics.iter().enumerate() {
            let Some(path) = metric.get("path").and_then(Value::as_str) else {
                continue;
            };
            if let Err(e) = regex::Regex::new(path) {
                issues.push(ValidationIssue::new(
                    format!("targets.{target_name}.metrics[{i}].path"),
                    format!("invalid pattern: {e}"),
                ));
            }
        }
    }
    issues
}

/// Retry and concurrency settings are schema-valid but not consumed by the
/// fetch path; surface that instead of silently dropping them.
fn warn_inert_global_fields(tree: &Value) {
    if let Some(global) = tree.get("global").and_then(Value::as_object) {
        for field in ["retries", "retry_interval", "concurrency"] {
            if global.contains_key(field) {
                warn!(
                    "global.{field} is configured but not applied; requests are issued once, sequentially"
                );
            }
        }
    }
}
