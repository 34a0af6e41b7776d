use crate::error::VectorDbError;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Log file written inside the configured log directory
pub const LOG_FILE_NAME: &str = "vitaledge.log";

/// Dependencies that log every statement at info level
const QUIET_TARGETS: &[&str] = &["sqlx::query=warn"];

/// Install console and file logging
///
/// `RUST_LOG` replaces the configured level when set. The file layer writes
/// `vitaledge.log` in `log_dir` without ANSI colors.
pub fn setup_logging(log_dir: &Path, log_level: &str) -> Result<(), VectorDbError> {
    let (log_file_path, log_file) = open_log_file(log_dir)?;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(build_filter(log_level)?);

    let file_layer = fmt::layer()
        .with_writer(log_file)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(build_filter(log_level)?);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| VectorDbError::config(format!("Logging already initialized: {}", e)))?;

    tracing::info!(
        "Logging initialized: level={}, log_file={}",
        parse_log_level(log_level),
        log_file_path.display()
    );

    Ok(())
}

/// Console-only logging for tools and tests
pub fn setup_console_logging(log_level: &str) -> Result<(), VectorDbError> {
    tracing_subscriber::fmt()
        .with_target(true)
        .with_line_number(true)
        .with_env_filter(build_filter(log_level)?)
        .try_init()
        .map_err(|e| VectorDbError::config(format!("Logging already initialized: {}", e)))?;

    Ok(())
}

/// Parse string to tracing Level
pub fn parse_log_level(level: &str) -> Level {
    match level.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!("Invalid log level '{}', defaulting to INFO", level);
            Level::INFO
        }
    }
}

fn build_filter(log_level: &str) -> Result<EnvFilter, VectorDbError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::default()
        .add_directive(LevelFilter::from_level(parse_log_level(log_level)).into());
    for target in QUIET_TARGETS {
        let directive = target
            .parse()
            .map_err(|e| VectorDbError::config(format!("Bad log directive '{}': {}", target, e)))?;
        filter = filter.add_directive(directive);
    }

    Ok(filter)
}

fn open_log_file(log_dir: &Path) -> Result<(PathBuf, File), VectorDbError> {
    std::fs::create_dir_all(log_dir).map_err(|e| {
        VectorDbError::config(format!(
            "Failed to create log directory {}: {}",
            log_dir.display(),
            e
        ))
    })?;

    let path = log_dir.join(LOG_FILE_NAME);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| {
            VectorDbError::config(format!("Failed to open log file {}: {}", path.display(), e))
        })?;

    Ok((path, file))
}
