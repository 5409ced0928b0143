use std::path::Path;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::bootstrap::{LogLevel, LoggingConfig};

/// Initializes the logging system from the bootstrap logging section.
///
/// Console output is always enabled; if a log file is configured, a JSON
/// layer is added writing to it through a non-blocking appender.
pub fn init_logging(config: Option<&LoggingConfig>, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        match config.map(|c| c.level).unwrap_or_default() {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("prometheus_bridge={level}").parse().unwrap());

    let console_layer = fmt::layer().with_writer(std::io::stdout);

    let file_layer = config.and_then(|c| c.file.as_deref()).map(|file| {
        let path = Path::new(file);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        let appender =
            tracing_appender::rolling::never(dir.unwrap_or_else(|| Path::new(".")), name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        // Keep the guard alive for the process lifetime so logs flush on exit
        std::mem::forget(guard);
        fmt::layer().json().with_writer(writer)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();
}
