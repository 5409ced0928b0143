use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};

/// Prefix carried by every bridge environment variable.
pub const ENV_PREFIX: &str = "BRIDGE_";
/// Reserved variable naming an override config-file path.
pub const ENV_CONFIG_FILE: &str = "BRIDGE_CONFIG_FILE";
/// Nesting delimiter inside environment-variable names.
pub const ENV_DELIMITER: &str = "__";
/// Canonical root key of the resolved configuration tree.
pub const ROOT_KEY: &str = "bootstrap";

/// Default file locations probed in order when no explicit file is given.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "/etc/prometheus-bridge/config.yaml",
    "/etc/prometheus-bridge/config.json",
    "~/.prometheus-bridge/config.yaml",
    "~/.prometheus-bridge/config.json",
    "./config.yaml",
    "./config.json",
];

/// One configuration fragment source, listed lowest precedence first.
pub enum ConfigSource {
    /// Probe the packaged default paths, first readable file wins.
    DefaultPaths,
    /// An explicit file; unreadable is a hard error.
    File(PathBuf),
    /// `BRIDGE_*` environment variables.
    Environment,
    /// An explicit override fragment, e.g. assembled from command-line flags.
    Overrides(Value),
}

/// Loads and deep-merges configuration fragments in ascending precedence.
pub struct ConfigResolver {
    sources: Vec<ConfigSource>,
}

impl ConfigResolver {
    pub fn new(sources: Vec<ConfigSource>) -> Self {
        Self { sources }
    }

    /// The standard chain: default paths, then an explicit file (CLI flag
    /// first, else the `BRIDGE_CONFIG_FILE` pointer), then the environment.
    pub fn standard(explicit_file: Option<&Path>) -> Self {
        let mut sources = vec![ConfigSource::DefaultPaths];
        let pointer = explicit_file
            .map(|p| p.to_path_buf())
            .or_else(|| std::env::var(ENV_CONFIG_FILE).ok().map(PathBuf::from));
        if let Some(path) = pointer {
            sources.push(ConfigSource::File(path));
        }
        sources.push(ConfigSource::Environment);
        Self::new(sources)
    }

    /// Resolves all sources into one configuration tree.
    ///
    /// Fails if no source produced a non-empty tree or the canonical root
    /// key is absent after the merge.
    pub fn resolve(&self) -> Result<Value> {
        let mut tree = Value::Object(Map::new());

        for source in &self.sources {
            match source {
                ConfigSource::DefaultPaths => {
                    // Skipped entirely once an explicit file is in the chain
                    if self.has_explicit_file() {
                        continue;
                    }
                    for path in DEFAULT_CONFIG_PATHS {
                        let expanded = expand_home(path);
                        if !expanded.exists() {
                            continue;
                        }
                        match load_tree_from_file(&expanded) {
                            Ok(fragment) => {
                                info!("Loaded configuration from {}", expanded.display());
                                deep_merge(&mut tree, fragment);
                                break;
                            }
                            Err(e) => {
                                warn!(
                                    "Failed to load configuration from {}: {}",
                                    expanded.display(),
                                    e
                                );
                            }
                        }
                    }
                }
                ConfigSource::File(path) => {
                    let fragment = load_tree_from_file(path).map_err(|e| {
                        BridgeError::Configuration(format!(
                            "Failed to load configuration from {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                    info!("Loaded configuration from {}", path.display());
                    deep_merge(&mut tree, fragment);
                }
                ConfigSource::Environment => {
                    let fragment = parse_env(std::env::vars());
                    if !is_empty_tree(&fragment) {
                        info!("Merged configuration from environment variables");
                        deep_merge(&mut tree, fragment);
                    }
                }
                ConfigSource::Overrides(fragment) => {
                    if !is_empty_tree(fragment) {
                        debug!("Merged explicit configuration overrides");
                        deep_merge(&mut tree, fragment.clone());
                    }
                }
            }
        }

        if is_empty_tree(&tree) {
            return Err(BridgeError::Configuration(
                "No valid bootstrap configuration found".to_string(),
            ));
        }
        if tree.get(ROOT_KEY).is_none() {
            return Err(BridgeError::Configuration(format!(
                "Resolved configuration is missing the '{ROOT_KEY}' root key"
            )));
        }
        Ok(tree)
    }

    fn has_explicit_file(&self) -> bool {
        self.sources
            .iter()
            .any(|s| matches!(s, ConfigSource::File(_)))
    }
}

/// Deep-merges `source` onto `target`: nested objects merge key-wise, any
/// other value is overwritten by the higher-precedence side.
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value);
                    }
                    _ => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target_slot, source_value) => *target_slot = source_value,
    }
}

/// Builds a nested tree from prefixed environment variables.
///
/// Keys are lowercased after the prefix is stripped and split on the
/// double-underscore delimiter; the first segment is forced to the canonical
/// root if absent.
pub fn parse_env(vars: impl Iterator<Item = (String, String)>) -> Value {
    let mut tree = Value::Object(Map::new());
    // BTreeMap for deterministic merge order across runs
    let filtered: BTreeMap<String, String> = vars
        .filter(|(key, _)| key.starts_with(ENV_PREFIX) && key != ENV_CONFIG_FILE)
        .collect();

    for (key, raw) in filtered {
        let mut segments: Vec<String> = key[ENV_PREFIX.len()..]
            .to_lowercase()
            .split(ENV_DELIMITER)
            .map(|s| s.to_string())
            .collect();
        if segments.first().map(String::as_str) != Some(ROOT_KEY) {
            segments.insert(0, ROOT_KEY.to_string());
        }

        let mut fragment = coerce_env_value(&raw);
        for segment in segments.into_iter().rev() {
            let mut map = Map::new();
            map.insert(segment, fragment);
            fragment = Value::Object(map);
        }
        deep_merge(&mut tree, fragment);
    }
    tree
}

/// Coerces an environment-variable value: boolean literal, then integer,
/// then float, then a structured JSON parse, else the raw string.
pub fn coerce_env_value(raw: &str) -> Value {
    let lowered = raw.to_lowercase();
    if lowered == "true" || lowered == "false" {
        return Value::Bool(lowered == "true");
    }
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = raw.parse::<i64>() {
            return Value::Number(n.into());
        }
    }
    if raw.matches('.').count() == 1 && raw.replacen('.', "", 1).bytes().all(|b| b.is_ascii_digit())
    {
        if let Ok(f) = raw.parse::<f64>() {
            if let Some(num) = serde_json::Number::from_f64(f) {
                return Value::Number(num);
            }
        }
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
        return parsed;
    }
    Value::String(raw.to_string())
}

fn is_empty_tree(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// Loads a YAML or JSON configuration file into a tree, keyed on extension.
pub fn load_tree_from_file(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match extension.as_str() {
        "yaml" | "yml" => Ok(serde_yaml::from_str(&content)?),
        "json" => Ok(serde_json::from_str(&content)?),
        other => Err(BridgeError::Configuration(format!(
            "Unsupported config file format: '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_combines_nested_maps() {
        let mut base = json!({"a": {"x": 1, "y": 2}});
        deep_merge(&mut base, json!({"a": {"y": 3, "z": 4}}));
        assert_eq!(base, json!({"a": {"x": 1, "y": 3, "z": 4}}));
    }

    #[test]
    fn deep_merge_overwrites_scalars_and_arrays() {
        let mut base = json!({"a": [1, 2], "b": {"c": 1}});
        deep_merge(&mut base, json!({"a": [3], "b": "flat"}));
        assert_eq!(base, json!({"a": [3], "b": "flat"}));
    }

    #[test]
    fn env_values_coerce_in_documented_order() {
        assert_eq!(coerce_env_value("true"), json!(true));
        assert_eq!(coerce_env_value("False"), json!(false));
        assert_eq!(coerce_env_value("42"), json!(42));
        assert_eq!(coerce_env_value("3.14"), json!(3.14));
        assert_eq!(coerce_env_value("abc"), json!("abc"));
        assert_eq!(coerce_env_value("{\"k\": 1}"), json!({"k": 1}));
        assert_eq!(coerce_env_value("1.2.3"), json!("1.2.3"));
    }

    #[test]
    fn env_keys_nest_on_double_delimiter_under_forced_root() {
        let vars = vec![
            (
                "BRIDGE_ELASTICSEARCH__AUTH__USERNAME".to_string(),
                "admin".to_string(),
            ),
            ("BRIDGE_CONFIG_INDEX".to_string(), "bridge-config".to_string()),
            ("BRIDGE_CONFIG_FILE".to_string(), "/tmp/ignored.yaml".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ];
        let tree = parse_env(vars.into_iter());
        assert_eq!(
            tree,
            json!({
                "bootstrap": {
                    "elasticsearch": {"auth": {"username": "admin"}},
                    "config_index": "bridge-config"
                }
            })
        );
    }

    #[test]
    fn explicit_root_segment_is_not_duplicated() {
        let vars = vec![(
            "BRIDGE_BOOTSTRAP__CONFIG_INDEX".to_string(),
            "idx".to_string(),
        )];
        let tree = parse_env(vars.into_iter());
        assert_eq!(tree, json!({"bootstrap": {"config_index": "idx"}}));
    }

    #[test]
    fn file_layer_then_overrides_follow_precedence() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(
            f,
            "bootstrap:\n  config_index: from-file\n  elasticsearch:\n    url: http://file:9200"
        )
        .unwrap();

        // File only
        let resolver = ConfigResolver::new(vec![ConfigSource::File(path.clone())]);
        let tree = resolver.resolve().unwrap();
        assert_eq!(tree["bootstrap"]["config_index"], "from-file");

        // Overrides beat the file, untouched keys fall through
        let resolver = ConfigResolver::new(vec![
            ConfigSource::File(path),
            ConfigSource::Overrides(json!({"bootstrap": {"config_index": "from-override"}})),
        ]);
        let tree = resolver.resolve().unwrap();
        assert_eq!(tree["bootstrap"]["config_index"], "from-override");
        assert_eq!(tree["bootstrap"]["elasticsearch"]["url"], "http://file:9200");
    }

    #[test]
    fn missing_root_key_is_a_configuration_error() {
        let resolver = ConfigResolver::new(vec![ConfigSource::Overrides(json!({"other": 1}))]);
        let err = resolver.resolve().unwrap_err();
        assert!(err.to_string().contains("bootstrap"));
    }

    #[test]
    fn empty_resolution_is_a_configuration_error() {
        let resolver = ConfigResolver::new(vec![]);
        assert!(resolver.resolve().is_err());
    }

    #[test]
    fn unreadable_explicit_file_is_fatal() {
        let resolver = ConfigResolver::new(vec![ConfigSource::File(PathBuf::from(
            "/nonexistent/config.yaml",
        ))]);
        assert!(resolver.resolve().is_err());
    }
}
