use thiserror::Error;

use crate::config::validate::ValidationIssue;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML deserialization failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Configuration validation failed:{}", format_issues(.0))]
    Validation(Vec<ValidationIssue>),

    #[error("Fetch failed for target '{target}': {message}")]
    Fetch { target: String, message: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Reload failed: {0}")]
    Reload(String),
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("\n  - {}", i))
        .collect::<String>()
}

pub type Result<T> = std::result::Result<T, BridgeError>;
