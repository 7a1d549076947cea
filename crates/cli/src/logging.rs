use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Stdout carries client output, so logs go
/// to stderr or `log_file`. Keep the guard alive until exit.
pub fn init(log_file: Option<&Path>) -> Result<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard, ansi) = match log_file {
        Some(path) => {
            let name = path.file_name().context("log file path has no file name")?;
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create log dir: {}", dir.display()))?;
            let file = tracing_appender::rolling::never(dir, name);
            let (w, g) = tracing_appender::non_blocking(file);
            (w, g, false)
        }
        None => {
            let (w, g) = tracing_appender::non_blocking(std::io::stderr());
            (w, g, true)
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install log subscriber: {e}"))?;
    Ok(guard)
}
