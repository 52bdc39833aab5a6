//! Clipboard change detection with foreground attribution.
//!
//! The watcher tracks the OS clipboard change-sequence counter. When the
//! counter moves and the clipboard holds image data, the change is
//! attributed to the process owning the foreground window — the most
//! probable source, an explicit approximation since no OS-level actor
//! attribution exists without a kernel hook.

use tracing::{debug, trace};

use crate::classify::Classifier;
use crate::event::{CaptureEvent, CaptureMethod, RiskLevel};
use crate::probe::SystemProbe;

/// Polls the clipboard change counter once per engine tick.
///
/// Created fresh on every engine start; the cursor is `None` until the
/// first successful read.
#[derive(Debug)]
pub struct ClipboardWatcher {
    cursor: Option<u64>,
    log_safe_processes: bool,
}

impl ClipboardWatcher {
    /// Create a watcher with no primed cursor.
    #[must_use]
    pub fn new(log_safe_processes: bool) -> Self {
        Self {
            cursor: None,
            log_safe_processes,
        }
    }

    /// Last observed change-sequence number, if any.
    #[must_use]
    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    /// Check the clipboard once.
    ///
    /// Transient clipboard errors (another process holds the lock) are
    /// swallowed without advancing the cursor, so the same change is
    /// re-examined next tick. Once a new sequence number has been read the
    /// cursor advances no matter what, so a single unattributable change
    /// is never re-evaluated.
    pub fn poll(
        &mut self,
        probe: &dyn SystemProbe,
        classifier: &Classifier,
    ) -> Option<CaptureEvent> {
        let sequence = match probe.clipboard_sequence() {
            Ok(sequence) => sequence,
            Err(err) if err.is_unsupported() => return None,
            Err(err) => {
                debug!(error = %err, "clipboard read failed, retrying next tick");
                return None;
            }
        };

        let Some(previous) = self.cursor else {
            self.cursor = Some(sequence);
            return None;
        };
        if previous == sequence {
            return None;
        }
        self.cursor = Some(sequence);

        let has_image = match probe.clipboard_has_image() {
            Ok(has_image) => has_image,
            Err(err) => {
                debug!(error = %err, "clipboard format check failed");
                false
            }
        };
        if !has_image {
            trace!(sequence, "clipboard changed without image data");
            return None;
        }

        let pid = match probe.foreground_pid() {
            Ok(Some(pid)) => pid,
            Ok(None) => {
                debug!(sequence, "clipboard image with no foreground window");
                return None;
            }
            Err(err) => {
                debug!(error = %err, "foreground attribution failed");
                return None;
            }
        };
        let observed = match probe.process_info(pid) {
            Ok(Some(observed)) => observed,
            Ok(None) | Err(_) => {
                debug!(pid, "foreground process vanished before attribution");
                return None;
            }
        };

        let risk = classifier.classify_attribution(&observed);
        if risk == RiskLevel::Safe && !self.log_safe_processes {
            trace!(process = %observed.name, "authorized capture, not logged");
            return None;
        }

        let title = probe.window_title_for_pid(pid);
        Some(
            CaptureEvent::new(observed.name, pid, CaptureMethod::ClipboardCapture, risk)
                .with_window_title(title)
                .with_executable_path(observed.exe_path),
        )
    }
}
