use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use prometheus_bridge::config::bootstrap::BootstrapConfig;
use prometheus_bridge::config::runtime::ConfigDocument;
use prometheus_bridge::config::{resolver, validate};
use prometheus_bridge::error::{BridgeError, Result};
use prometheus_bridge::runner::{self, Bridge};
use prometheus_bridge::store::elasticsearch::ElasticsearchStore;
use prometheus_bridge::store::MetricStore;
use prometheus_bridge::{logging, RuntimeConfig};

const EXAMPLE_RUNTIME_CONFIG: &str = include_str!("../sample_configs/runtime_example.json");
const BAD_EXAMPLE_RUNTIME_CONFIG: &str =
    include_str!("../sample_configs/runtime_bad_example.json");

#[derive(Parser)]
#[command(name = "prometheus-bridge")]
#[command(about = "Bridges Prometheus exporter metrics into Elasticsearch")]
#[command(version = "0.1.0")]
struct Cli {
    /// Enable verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge service
    Run {
        /// Path to the bootstrap configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Local runtime-configuration fallback used when the store holds none
        #[arg(long)]
        runtime_config: Option<PathBuf>,
        /// Execute one collection cycle without writing to the store
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a runtime configuration file
    Validate {
        /// Path to the runtime configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Validate the embedded example configuration
        #[arg(long)]
        example: bool,
        /// Validate the embedded bad example to demonstrate error reporting
        #[arg(long)]
        bad_example: bool,
    },
    /// Upload a runtime configuration file to the config index
    Upload {
        /// Path to the runtime configuration file
        #[arg(long)]
        config: PathBuf,
        /// Path to the bootstrap configuration file
        #[arg(long)]
        bootstrap: Option<PathBuf>,
        /// Description stored with the configuration document
        #[arg(long)]
        description: Option<String>,
    },
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let verbose = cli.verbose;

    let outcome = match cli.command {
        Commands::Run {
            config,
            runtime_config,
            dry_run,
        } => cmd_run(config.as_deref(), runtime_config.as_deref(), dry_run, verbose),
        Commands::Validate {
            config,
            example,
            bad_example,
        } => cmd_validate(config.as_deref(), example, bad_example, verbose),
        Commands::Upload {
            config,
            bootstrap,
            description,
        } => cmd_upload(&config, bootstrap.as_deref(), description, verbose),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_run(
    config_file: Option<&Path>,
    runtime_config_file: Option<&Path>,
    dry_run: bool,
    verbose: bool,
) -> Result<()> {
    let bootstrap = BootstrapConfig::load(config_file)?;
    logging::init_logging(bootstrap.logging.as_ref(), verbose);
    info!("Starting Prometheus Bridge");
    info!("Connecting to Elasticsearch at {}", bootstrap.elasticsearch.url);

    let store = Arc::new(ElasticsearchStore::connect(&bootstrap.elasticsearch)?);
    store
        .cluster_info()
        .map_err(|e| BridgeError::Configuration(format!("failed to connect to store: {e}")))?;

    let runtime = match runner::load_runtime_config(store.as_ref(), &bootstrap.config_index) {
        Ok(config) => config,
        Err(e) => {
            warn!("Falling back to local runtime configuration: {e}");
            let path = runtime_config_file.ok_or_else(|| {
                BridgeError::Configuration(
                    "no runtime configuration in the store and no --runtime-config fallback given"
                        .to_string(),
                )
            })?;
            let tree = resolver::load_tree_from_file(path)?;
            let config = validate::validate_runtime(&tree)?;
            info!(version = %config.version, "Loaded runtime configuration from {}", path.display());
            config
        }
    };

    let mut bridge = Bridge::new(bootstrap, store, runtime);
    bridge.run(dry_run)
}

fn cmd_validate(
    config_file: Option<&Path>,
    example: bool,
    bad_example: bool,
    verbose: bool,
) -> Result<()> {
    logging::init_logging(None, verbose);

    let (tree, source): (serde_json::Value, String) = if let Some(path) = config_file {
        (resolver::load_tree_from_file(path)?, path.display().to_string())
    } else if bad_example {
        (
            serde_json::from_str(BAD_EXAMPLE_RUNTIME_CONFIG)?,
            "embedded bad example".to_string(),
        )
    } else if example {
        (
            serde_json::from_str(EXAMPLE_RUNTIME_CONFIG)?,
            "embedded example".to_string(),
        )
    } else {
        return Err(BridgeError::Configuration(
            "no configuration specified; pass --config, --example or --bad-example".to_string(),
        ));
    };

    info!("Validating configuration from {source}");
    match validate::validate_runtime(&tree) {
        Ok(config) => {
            println!("Runtime configuration loaded successfully!");
            println!("\nVersion: {}", config.version);
            println!("Exporters: {}", config.exporters.len());
            for (name, exporter) in &config.exporters {
                println!("  - {}: {} ({})", name, exporter.exporter_type, exporter.url);
            }
            println!("Targets: {}", config.targets.len());
            for (name, target) in &config.targets {
                println!(
                    "  - {}: using {}, interval {}s, {} metrics, index {}",
                    name,
                    target.exporter,
                    target.interval,
                    target.metrics.len(),
                    target.index
                );
            }
            Ok(())
        }
        Err(BridgeError::Validation(issues)) => {
            if bad_example {
                eprintln!("Configuration validation error (expected for bad example):");
            } else {
                eprintln!("Configuration validation error:");
            }
            for issue in &issues {
                eprintln!("  - {issue}");
            }
            if bad_example {
                Ok(())
            } else {
                Err(BridgeError::Validation(issues))
            }
        }
        Err(e) => Err(e),
    }
}

fn cmd_upload(
    config_file: &Path,
    bootstrap_file: Option<&Path>,
    description: Option<String>,
    verbose: bool,
) -> Result<()> {
    let bootstrap = BootstrapConfig::load(bootstrap_file)?;
    logging::init_logging(bootstrap.logging.as_ref(), verbose);

    let tree = resolver::load_tree_from_file(config_file)?;
    let config: RuntimeConfig = validate::validate_runtime(&tree)?;
    info!(
        version = %config.version,
        "Loaded and validated configuration from {}",
        config_file.display()
    );

    let store = ElasticsearchStore::connect(&bootstrap.elasticsearch)?;
    store
        .cluster_info()
        .map_err(|e| BridgeError::Configuration(format!("failed to connect to store: {e}")))?;

    let now = chrono::Utc::now();
    let document = ConfigDocument {
        timestamp: now,
        config: tree,
        version: config.version.clone(),
        description: Some(
            description.unwrap_or_else(|| format!("Runtime configuration uploaded at {now}")),
        ),
    };

    match store.put_config(&bootstrap.config_index, &document) {
        Ok(id) => {
            info!(
                "Uploaded configuration version {} to index '{}', document id {}",
                config.version, bootstrap.config_index, id
            );
            println!("Uploaded configuration version {} (id {id})", config.version);
            Ok(())
        }
        Err(e) => {
            error!("Failed to upload configuration: {e}");
            Err(e)
        }
    }
}
