//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

/// Watch command arguments.
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Stop automatically after this many seconds (runs until Ctrl-C
    /// when omitted)
    #[arg(short, long)]
    pub duration_secs: Option<u64>,

    /// Write recorded events to this file on exit
    #[arg(short, long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Export format (defaults to the configured one)
    #[arg(short, long, value_enum)]
    pub format: Option<ExportFormatArg>,

    /// Also record whitelisted (authorized) capture activity
    #[arg(long)]
    pub log_safe: bool,
}

/// Scan command arguments.
#[derive(Debug, Args)]
pub struct ScanCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Export format argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormatArg {
    /// Comma-separated values
    Csv,
    /// Pretty-printed JSON
    Json,
}

impl From<ExportFormatArg> for crate::config::ExportFormat {
    fn from(arg: ExportFormatArg) -> Self {
        match arg {
            ExportFormatArg::Csv => Self::Csv,
            ExportFormatArg::Json => Self::Json,
        }
    }
}
