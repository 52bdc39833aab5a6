//! Configuration management for capwatch.
//!
//! Configuration loading and validation using figment, supporting TOML
//! config files, environment variables, and defaults. The policy
//! vocabularies are opaque string sets to the engine; they are normalized
//! and interpreted only by the classifier.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default config directory name.
const CONFIG_DIR_NAME: &str = "capwatch";

/// Application configuration.
///
/// Loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `CAPWATCH_`)
/// 2. TOML config file at `~/.config/capwatch/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine timing and buffering.
    pub engine: EngineConfig,
    /// Classification vocabularies.
    pub policy: PolicyConfig,
    /// Export rendering.
    pub export: ExportConfig,
}

/// Engine-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interval between detection ticks in milliseconds.
    pub tick_interval_ms: u64,
    /// Sleep after a failed tick before retrying, in milliseconds.
    pub error_backoff_ms: u64,
    /// How long `stop()` waits for the tick loop to exit, in milliseconds.
    pub stop_timeout_ms: u64,
    /// Maximum number of events retained in memory.
    pub event_log_capacity: usize,
    /// Also record whitelisted (authorized) capture activity.
    pub log_safe_processes: bool,
}

/// Classification policy vocabularies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Trusted applications matched exactly (case-insensitive) by name.
    pub whitelist: Vec<String>,
    /// Malicious substrings matched against name, path and command line.
    pub blacklist: Vec<String>,
    /// Capture-related substrings that make a process worth evaluating.
    pub capture_indicators: Vec<String>,
    /// Window-title substrings that mark an open capture tool.
    pub window_keywords: Vec<String>,
}

/// Export format for detection logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Comma-separated values.
    #[default]
    Csv,
    /// Pretty-printed JSON.
    Json,
}

/// Export-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Format used when none is given on the command line.
    pub format: ExportFormat,
    /// Emit a header row in CSV output.
    pub include_headers: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: ExportFormat::Csv,
            include_headers: true,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            error_backoff_ms: 2_000,
            stop_timeout_ms: 2_000,
            event_log_capacity: 10_000,
            log_safe_processes: false,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            whitelist: default_whitelist(),
            blacklist: default_blacklist(),
            capture_indicators: default_capture_indicators(),
            window_keywords: default_window_keywords(),
        }
    }
}

/// Trusted applications that are never flagged.
fn default_whitelist() -> Vec<String> {
    [
        // Windows built-in tools
        "SnippingTool.exe",
        "ScreenSketch.exe",
        "mspaint.exe",
        "explorer.exe",
        "dwm.exe",
        // Popular legitimate screen capture tools
        "ShareX.exe",
        "Greenshot.exe",
        "LightShot.exe",
        "PicPick.exe",
        "ScreenToGif.exe",
        // Video recording/streaming
        "obs64.exe",
        "obs32.exe",
        "OBS.exe",
        "XSplit.Broadcaster.exe",
        // Communication tools
        "Discord.exe",
        "Skype.exe",
        "TEAMS.exe",
        "zoom.exe",
        "Slack.exe",
        // Remote desktop
        "mstsc.exe",
        "TeamViewer.exe",
        "AnyDesk.exe",
        // Development tools
        "Code.exe",
        "devenv.exe",
        "WindowsTerminal.exe",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

/// Known malicious naming patterns.
fn default_blacklist() -> Vec<String> {
    [
        "keylogger",
        "stealer",
        "trojan",
        "backdoor",
        "rat",
        "screenlogger",
        "spyware",
        "grabber",
        "dumper",
        "inject",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

/// Substrings that mark an identifier as capture-related.
fn default_capture_indicators() -> Vec<String> {
    [
        "screenshot",
        "screencap",
        "capture",
        "printscreen",
        "getdc",
        "bitblt",
        "screengrab",
        "snapshot",
        "imagecapture",
        "screenrecord",
        "obs",
        "broadcast",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

/// Window-title substrings of open capture tools.
fn default_window_keywords() -> Vec<String> {
    ["snip", "screenshot", "screen record", "screen capture", "screengrab"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed("CAPWATCH_").split("_"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.engine.tick_interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "tick_interval_ms must be greater than 0".to_string(),
            });
        }
        if self.engine.stop_timeout_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "stop_timeout_ms must be greater than 0".to_string(),
            });
        }
        if self.engine.event_log_capacity == 0 {
            return Err(Error::ConfigValidation {
                message: "event_log_capacity must be greater than 0".to_string(),
            });
        }
        // A monitor with nothing to look for would observe nothing while
        // appearing healthy.
        if self
            .policy
            .capture_indicators
            .iter()
            .all(|s| s.trim().is_empty())
        {
            return Err(Error::ConfigValidation {
                message: "capture_indicators must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Get the tick interval as a Duration.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.engine.tick_interval_ms)
    }

    /// Get the error backoff as a Duration.
    #[must_use]
    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.engine.error_backoff_ms)
    }

    /// Get the stop timeout as a Duration.
    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.stop_timeout_ms)
    }
}
