//! Structured session lifecycle events as JSON lines, kept apart from the debug log.

use crate::config::AppConfig;
use crate::log_debug;
use anyhow::{Context, Result};
use std::env;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tracing::Level;
use tracing_subscriber::fmt::time::UtcTime;

const TRACE_LOG_ENV: &str = "DUPTERM_TRACE_LOG";

static TRACING: OnceLock<bool> = OnceLock::new();

pub(crate) fn trace_log_path() -> PathBuf {
    env::var_os(TRACE_LOG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| env::temp_dir().join("dupterm_trace.jsonl"))
}

/// Install the JSON subscriber once. Returns whether events are being recorded.
pub fn init_tracing(config: &AppConfig) -> bool {
    if !config.logging_enabled() {
        return false;
    }
    *TRACING.get_or_init(|| match install(&trace_log_path()) {
        Ok(()) => true,
        Err(err) => {
            log_debug(&format!("trace log unavailable: {err:#}"));
            false
        }
    })
}

fn install(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_timer(UtcTime::rfc_3339())
        .with_max_level(Level::DEBUG)
        .with_thread_names(true)
        .with_target(true)
        .with_writer(Mutex::new(file))
        .with_current_span(false)
        .with_span_list(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("another tracing subscriber is already installed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn disabled_logging_skips_subscriber() {
        let config = AppConfig::parse_from(["dupterm", "--no-logs"]);
        assert!(!init_tracing(&config));
        assert!(TRACING.get().is_none());
    }
}
