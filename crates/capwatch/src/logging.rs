//! Logging configuration for capwatch.
//!
//! Initialization for the tracing-based logging system, with an optional
//! dated log file alongside console output so detection history survives
//! the session.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Suppress all output except errors.
    Quiet,
    /// Normal output level (info and above).
    #[default]
    Normal,
    /// Verbose output (debug and above).
    Verbose,
    /// Very verbose output (trace level).
    Trace,
}

impl Verbosity {
    /// Convert verbosity to tracing level filter.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }
}

/// Initialize the logging system.
///
/// Called once at startup. The level can be controlled via the `verbosity`
/// parameter or overridden with `RUST_LOG`. When `log_dir` is given, a
/// `capwatch_YYYYMMDD.log` file is created there and receives the same
/// stream without ANSI colors.
///
/// # Errors
///
/// Returns an error if the log directory or file cannot be created.
pub fn init_logging(verbosity: Verbosity, log_dir: Option<&Path>) -> Result<()> {
    let default_filter = format!("capwatch={}", verbosity.to_level_filter());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let name = format!("capwatch_{}.log", chrono::Local::now().format("%Y%m%d"));
            let file = File::options()
                .create(true)
                .append(true)
                .open(dir.join(name))?;
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .with(file_layer);

    // Ignore the error if a subscriber is already set.
    let _ = subscriber.try_init();
    Ok(())
}
