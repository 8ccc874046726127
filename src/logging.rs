//! Tracing subscriber setup for the `crucible` binary.
//!
//! Two layers share one registry:
//! - a human-readable `fmt` layer on stderr
//! - a JSON layer written to `.crucible/logs/crucible.<date>.log` through a
//!   daily rolling, non-blocking appender
//!
//! Both honour `RUST_LOG`; without it the level is `info` (`debug` with
//! `--verbose`). The library itself only emits events.

use anyhow::{Context, Result};
use std::io;
use std::path::Path;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "crucible";

/// Keeps the file writer flushing until dropped. Hold it for the life of `main`.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber. When `log_dir` is `None` only stderr is used.
pub fn init(log_dir: Option<&Path>, verbose: bool) -> Result<LogGuard> {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(verbose)
        .with_filter(env_filter(default_level));

    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry()
            .with(stderr_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
        return Ok(LogGuard { _file: None });
    };

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(log_dir)
        .with_context(|| format!("Failed to open log directory {}", log_dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .with_ansi(false)
        .with_current_span(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter(default_level));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuard { _file: Some(guard) })
}

fn env_filter(default_level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy()
}
