//! Core event types for capwatch.
//!
//! This module defines the fundamental data structures for representing
//! detected screen-capture activity and the running detection counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel used when the OS refuses to reveal a process's executable path.
pub const ACCESS_DENIED_PATH: &str = "access-denied";

/// The detector path that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMethod {
    /// Flagged by the periodic process-table scan.
    ProcessScan,
    /// An image landed in the clipboard and was attributed to a process.
    ClipboardCapture,
    /// A visible window title matched a capture-tool keyword.
    ActiveCaptureTool,
}

impl std::fmt::Display for CaptureMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProcessScan => write!(f, "process_scan"),
            Self::ClipboardCapture => write!(f, "clipboard_capture"),
            Self::ActiveCaptureTool => write!(f, "active_capture_tool"),
        }
    }
}

/// Risk verdict for an observed process.
///
/// Ordered from least to most severe. `NotRelevant` is internal to the
/// classifier: it marks observations with no capture signal at all, which
/// are dropped before recording and never appear in an event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// No screen-capture indicators anywhere; silently dropped.
    NotRelevant,
    /// Exact match against the trusted-application whitelist.
    Safe,
    /// Capture-relevant but no stronger signal.
    Low,
    /// Capture indicator in the process name only.
    Medium,
    /// Capture indicator in the command line or executable path, or an
    /// unknown process attributed to a genuine capture.
    High,
    /// Matched a malicious pattern.
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotRelevant => write!(f, "NOT_RELEVANT"),
            Self::Safe => write!(f, "SAFE"),
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A detected screen-capture event.
///
/// Immutable once created; the recorder only ever appends copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureEvent {
    /// Executable file name of the process (not the full path).
    pub process_name: String,

    /// Process identifier. PIDs are reused by the OS over time and are not
    /// a stable identity across ticks.
    pub pid: u32,

    /// Which detector path produced this event.
    pub method: CaptureMethod,

    /// Classified risk.
    pub risk: RiskLevel,

    /// When the event was detected.
    pub timestamp: DateTime<Utc>,

    /// Best-effort title of the first visible window owned by the process.
    pub window_title: String,

    /// Best-effort executable path; `"access-denied"` when the OS withheld it.
    pub executable_path: String,
}

impl CaptureEvent {
    /// Create a new event stamped with the current time.
    #[must_use]
    pub fn new(
        process_name: impl Into<String>,
        pid: u32,
        method: CaptureMethod,
        risk: RiskLevel,
    ) -> Self {
        Self {
            process_name: process_name.into(),
            pid,
            method,
            risk,
            timestamp: Utc::now(),
            window_title: String::new(),
            executable_path: String::new(),
        }
    }

    /// Attach a window title.
    #[must_use]
    pub fn with_window_title(mut self, title: impl Into<String>) -> Self {
        self.window_title = title.into();
        self
    }

    /// Attach an executable path.
    #[must_use]
    pub fn with_executable_path(mut self, path: impl Into<String>) -> Self {
        self.executable_path = path.into();
        self
    }
}

/// Running detection counters.
///
/// Monotonically non-decreasing while the engine runs; reset only by an
/// explicit clear. Callers always receive a detached copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionStats {
    /// All recorded events.
    pub total: u64,
    /// Events classified `Critical` or `High`.
    pub critical_or_high: u64,
    /// Events classified `Medium`.
    pub medium: u64,
    /// Events classified `Low`.
    pub low: u64,
    /// Whitelisted events recorded in log-safe mode.
    pub safe_logged: u64,
}

impl DetectionStats {
    /// Bump the bucket matching `risk`.
    pub fn count(&mut self, risk: RiskLevel) {
        self.total += 1;
        match risk {
            RiskLevel::Critical | RiskLevel::High => self.critical_or_high += 1,
            RiskLevel::Medium => self.medium += 1,
            RiskLevel::Safe => self.safe_logged += 1,
            RiskLevel::Low | RiskLevel::NotRelevant => self.low += 1,
        }
    }
}
