//! Collection run loop: sequential targets, cycle pacing, boundary reloads.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::config::bootstrap::BootstrapConfig;
use crate::config::runtime::RuntimeConfig;
use crate::config::validate;
use crate::error::{BridgeError, Result};
use crate::fetch;
use crate::store::MetricStore;
use crate::writer;

/// Counters from one collection cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleStats {
    pub targets_processed: usize,
    pub targets_failed: usize,
    pub documents_written: usize,
    pub documents_failed: usize,
}

/// The bridge service: one store connection, one runtime-config snapshot,
/// iterated by a single-threaded cooperative loop.
pub struct Bridge {
    bootstrap: BootstrapConfig,
    store: Arc<dyn MetricStore>,
    config: RuntimeConfig,
}

impl Bridge {
    pub fn new(
        bootstrap: BootstrapConfig,
        store: Arc<dyn MetricStore>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            bootstrap,
            store,
            config,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Runs collection cycles until the process is stopped.
    ///
    /// With `dry_run` set, exactly one cycle executes and nothing is
    /// written.
    pub fn run(&mut self, dry_run: bool) -> Result<()> {
        loop {
            let started = Instant::now();
            info!("Starting metrics collection cycle");
            let stats = self.run_cycle(dry_run);
            let elapsed = started.elapsed();
            info!(
                targets = stats.targets_processed,
                failed_targets = stats.targets_failed,
                documents = stats.documents_written,
                elapsed_secs = elapsed.as_secs_f64(),
                "Completed metrics collection cycle"
            );

            if dry_run {
                return Ok(());
            }

            let interval = Duration::from_secs(self.config.cycle_interval());
            if let Some(sleep_for) = interval.checked_sub(elapsed) {
                info!(
                    sleep_secs = sleep_for.as_secs_f64(),
                    "Sleeping until next collection cycle"
                );
                std::thread::sleep(sleep_for);
            } else {
                warn!(
                    elapsed_secs = elapsed.as_secs_f64(),
                    interval_secs = interval.as_secs_f64(),
                    "Collection cycle took longer than the interval"
                );
            }

            // Reload only at cycle boundaries; a cycle in progress always
            // sees one consistent snapshot.
            self.reload();
        }
    }

    /// One pass over all targets in fixed enumeration order. Each target's
    /// write happens immediately after its fetch; a failing target never
    /// blocks the ones after it.
    pub fn run_cycle(&self, dry_run: bool) -> CycleStats {
        let mut stats = CycleStats::default();
        let global_metadata = self.config.global_metadata();

        for (target_name, target) in &self.config.targets {
            info!(%target_name, "Processing target");
            let samples = match fetch::fetch(&self.config, target_name) {
                Ok(samples) => samples,
                Err(e) => {
                    error!(%target_name, "Error processing target: {e}");
                    stats.targets_failed += 1;
                    continue;
                }
            };
            if samples.is_empty() {
                warn!(%target_name, "No metrics fetched");
                stats.targets_processed += 1;
                continue;
            }

            if dry_run {
                let documents = writer::build_documents(&samples, target, global_metadata);
                info!(
                    %target_name,
                    samples = samples.len(),
                    documents = documents.len(),
                    "Dry run: skipping write"
                );
                stats.targets_processed += 1;
                continue;
            }

            match writer::write_metrics(self.store.as_ref(), &samples, target, global_metadata) {
                Ok(result) => {
                    info!(
                        %target_name,
                        success = result.success,
                        failed = result.failed,
                        "Wrote metrics"
                    );
                    stats.documents_written += result.success;
                    stats.documents_failed += result.failed;
                    stats.targets_processed += 1;
                }
                Err(e) => {
                    error!(%target_name, "Error writing metrics: {e}");
                    stats.targets_failed += 1;
                }
            }
        }
        stats
    }

    /// Replaces the runtime configuration wholesale; on failure the
    /// previous, still-valid snapshot is retained.
    fn reload(&mut self) {
        match load_runtime_config(self.store.as_ref(), &self.bootstrap.config_index) {
            Ok(config) => {
                info!(version = %config.version, "Reloaded runtime configuration");
                self.config = config;
            }
            Err(e) => {
                warn!("Failed to reload runtime configuration, retaining previous: {e}");
            }
        }
    }
}

/// Loads and validates the latest runtime configuration from the store.
pub fn load_runtime_config(store: &dyn MetricStore, config_index: &str) -> Result<RuntimeConfig> {
    let document = store
        .latest_config(config_index)
        .map_err(|e| BridgeError::Reload(e.to_string()))?
        .ok_or_else(|| {
            BridgeError::Reload(format!(
                "no runtime configuration document found in index '{config_index}'"
            ))
        })?;
    let config = validate::validate_runtime(&document.config)
        .map_err(|e| BridgeError::Reload(e.to_string()))?;
    info!(
        version = %config.version,
        "Loaded runtime configuration from store"
    );
    Ok(config)
}
