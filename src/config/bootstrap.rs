use serde::{Deserialize, Serialize};

use crate::config::runtime::{AuthMethod, TlsConfig};
use crate::config::{resolver, validate};
use crate::error::Result;

/// Valid logging levels for the bootstrap logging section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Connection settings for the document store holding configuration and
/// metric documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

/// Minimal configuration needed to reach the store that holds everything
/// else. Created once at process start; immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub elasticsearch: StoreConfig,
    pub config_index: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

impl BootstrapConfig {
    /// Resolves bootstrap configuration from the standard source chain
    /// (defaults file, explicit file, environment, overrides) and validates
    /// the `bootstrap` subtree.
    pub fn load(explicit_file: Option<&std::path::Path>) -> Result<Self> {
        let tree = resolver::ConfigResolver::standard(explicit_file).resolve()?;
        validate::validate_bootstrap(&tree[resolver::ROOT_KEY])
    }
}
