use std::path::PathBuf;

use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::EngineConfig;

const LOG_FILE: &str = "audio-dispatch.log";

/// Log directory under the user config folder
pub fn log_dir() -> PathBuf {
    EngineConfig::config_dir()
        .map(|dir| dir.join("logs"))
        .unwrap_or_else(|_| PathBuf::from("logs"))
}

fn build_filter(config: &EngineConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber: `RUST_LOG` or the configured filter, a
/// daily log file when enabled, and console output in debug builds or when
/// there is no log file. Returns the log directory in use, if any.
///
/// Calling this more than once keeps the first subscriber.
pub fn initialize_tracing(config: &EngineConfig) -> Option<PathBuf> {
    let filter = build_filter(config);

    let log_dir = config.log_to_file.then(log_dir);
    let file_layer = log_dir.as_ref().and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Warning: Failed to create log directory: {}", e);
            return None;
        }

        let file_appender = rolling::daily(dir, LOG_FILE);
        Some(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true),
        )
    });

    let console = cfg!(debug_assertions) || file_layer.is_none();
    let console_layer = console.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false)
    });

    let has_file = file_layer.is_some();
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .is_ok();

    if !installed {
        return None;
    }

    let log_dir = log_dir.filter(|_| has_file);
    if let Some(dir) = &log_dir {
        tracing::info!("Log directory: {}", dir.display());
    }
    log_dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_is_under_config_dir() {
        let dir = log_dir();
        assert!(dir.ends_with("logs"));
    }

    #[test]
    fn test_invalid_filter_falls_back() {
        let config = EngineConfig {
            log_filter: "[[not a filter".to_string(),
            ..EngineConfig::default()
        };
        // Building must not panic even with a malformed directive
        let _ = build_filter(&config);
    }
}
