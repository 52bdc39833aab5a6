//! Windows-specific observation primitives for capwatch.
//!
//! This crate provides the raw Win32 queries the detection engine polls:
//! the clipboard change counter and formats, the foreground window, and
//! visible top-level windows with their owning processes.

#![cfg(target_os = "windows")]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod probe;

pub use probe::{ProbeError, ProcessRecord, WindowRecord, WindowsProbe};

/// Initialize Windows-specific components.
///
/// # Errors
///
/// Returns an error if initialization fails.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Initializing Windows platform components");
    Ok(())
}

/// Get the platform name.
#[must_use]
pub fn platform_name() -> &'static str {
    "Windows"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        assert!(init().is_ok());
    }

    #[test]
    fn test_platform_name() {
        assert_eq!(platform_name(), "Windows");
    }

    #[test]
    fn test_probe_exports() {
        let probe = WindowsProbe::new();
        assert!(probe.clipboard_sequence().is_ok());
    }
}
