//! Process-table snapshot scan and active-capture-tool window sweep.
//!
//! Both paths produce candidate observations only; classification and
//! recording stay with the engine. The recorder's seen-process table keeps
//! every pid to at-most-once evaluation per engine run.

use tracing::trace;

use crate::probe::{ObservedProcess, Result, SystemProbe};
use crate::recorder::EventRecorder;

/// Kernel/idle process identifiers that are never worth evaluating.
const RESERVED_PIDS: [u32; 2] = [0, 4];

/// Stateless scanner over the probe's process and window views.
#[derive(Debug, Clone)]
pub struct SnapshotScanner {
    window_keywords: Vec<String>,
}

impl SnapshotScanner {
    /// Create a scanner with the given capture-tool window-title keywords.
    #[must_use]
    pub fn new(window_keywords: &[String]) -> Self {
        Self {
            window_keywords: window_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Candidate observations from the current process table.
    ///
    /// Skips reserved pids, nameless entries, and pids already evaluated
    /// this engine run. A single unreadable process never aborts the scan.
    ///
    /// # Errors
    ///
    /// Returns an error only when the whole process enumeration fails.
    pub fn scan(
        &self,
        probe: &dyn SystemProbe,
        recorder: &EventRecorder,
    ) -> Result<Vec<ObservedProcess>> {
        let snapshot = probe.process_snapshot()?;
        let mut candidates = Vec::new();

        for observed in snapshot {
            if RESERVED_PIDS.contains(&observed.pid) || observed.name.is_empty() {
                continue;
            }
            if recorder.is_seen(observed.pid) {
                continue;
            }
            candidates.push(observed);
        }

        trace!(candidates = candidates.len(), "process scan complete");
        Ok(candidates)
    }

    /// Processes owning a visible window whose title looks like an open
    /// capture tool, resolved once per pid.
    ///
    /// # Errors
    ///
    /// Returns an error when window enumeration fails outright.
    pub fn sweep_titles(
        &self,
        probe: &dyn SystemProbe,
        recorder: &EventRecorder,
    ) -> Result<Vec<ObservedProcess>> {
        let windows = probe.visible_windows()?;
        let mut candidates: Vec<ObservedProcess> = Vec::new();

        for window in windows {
            let title = window.title.to_lowercase();
            if !self.window_keywords.iter().any(|k| title.contains(k.as_str())) {
                continue;
            }
            if RESERVED_PIDS.contains(&window.pid) || recorder.is_seen(window.pid) {
                continue;
            }
            if candidates.iter().any(|c| c.pid == window.pid) {
                continue;
            }
            // The process may have exited between enumeration and lookup.
            match probe.process_info(window.pid) {
                Ok(Some(observed)) if !observed.name.is_empty() => candidates.push(observed),
                Ok(_) => {}
                Err(err) => {
                    trace!(pid = window.pid, error = %err, "skipping window owner");
                }
            }
        }

        trace!(candidates = candidates.len(), "title sweep complete");
        Ok(candidates)
    }
}
