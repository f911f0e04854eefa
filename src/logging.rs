//! Tracing subscriber setup for the CLI.
//!
//! Logs go to stderr so stdout stays clean for tables and JSON. `RUST_LOG`
//! wins over the configured level when set.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Filter directive for the configured level, optionally forced to debug.
pub fn filter_directive(config: &LoggingConfig, verbose: bool) -> String {
    if verbose {
        return "kbsearch=debug".to_string();
    }
    match config.level.trim().to_lowercase().as_str() {
        level @ ("error" | "warn" | "info" | "debug" | "trace" | "off") => level.to_string(),
        _ => "warn".to_string(),
    }
}

/// Install the global subscriber. Calling it twice is a no-op.
pub fn init(config: &LoggingConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(filter_directive(config, verbose))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter_directive(config, verbose)))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
