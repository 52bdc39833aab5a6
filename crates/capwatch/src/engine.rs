//! The detection engine: a cancellable polling loop over the probe.
//!
//! One background tokio task per engine instance ticks the clipboard
//! watcher, the active-tool sweep and the process scan, in that order, and
//! feeds every verdict through the recorder. All control methods are safe
//! to call from the foreground while the loop runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::classify::Classifier;
use crate::config::Config;
use crate::event::{CaptureEvent, CaptureMethod, DetectionStats, RiskLevel};
use crate::probe::{ProbeError, SystemProbe};
use crate::recorder::EventRecorder;
use crate::scanner::SnapshotScanner;
use crate::watcher::ClipboardWatcher;

/// Orchestrates detection over a platform probe.
///
/// Two states: `Stopped` (initial and terminal) and `Running`. Cancellation
/// is cooperative — the loop checks the stop flag once per tick boundary,
/// so `stop()` has a worst-case latency of one full tick plus OS-call
/// time, bounded by the configured stop timeout. After a timed-out stop
/// the old loop is abandoned; it exits at its next tick boundary, which
/// means one stale tick may still record after a back-to-back restart.
pub struct DetectionEngine {
    probe: Arc<dyn SystemProbe>,
    recorder: Arc<EventRecorder>,
    classifier: Arc<Classifier>,
    scanner: SnapshotScanner,
    tick_interval: Duration,
    error_backoff: Duration,
    stop_timeout: Duration,
    log_safe_processes: bool,
    running: AtomicBool,
    cancel: Mutex<Option<Arc<AtomicBool>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DetectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionEngine")
            .field("running", &self.is_running())
            .field("tick_interval", &self.tick_interval)
            .finish_non_exhaustive()
    }
}

impl DetectionEngine {
    /// Create an engine over the given probe with the given configuration.
    #[must_use]
    pub fn new(config: &Config, probe: Arc<dyn SystemProbe>) -> Self {
        Self {
            probe,
            recorder: Arc::new(EventRecorder::new(config.engine.event_log_capacity)),
            classifier: Arc::new(Classifier::new(&config.policy)),
            scanner: SnapshotScanner::new(&config.policy.window_keywords),
            tick_interval: config.tick_interval(),
            error_backoff: config.error_backoff(),
            stop_timeout: config.stop_timeout(),
            log_safe_processes: config.engine.log_safe_processes,
            running: AtomicBool::new(false),
            cancel: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Whether the engine is currently `Running`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The recorder, for collaborators that read events directly.
    #[must_use]
    pub fn recorder(&self) -> Arc<EventRecorder> {
        Arc::clone(&self.recorder)
    }

    /// Register a subscriber for every recorded event.
    pub fn register_callback(&self, callback: impl Fn(&CaptureEvent) + Send + Sync + 'static) {
        self.recorder.register_callback(callback);
    }

    /// The most recent `limit` events, oldest first.
    #[must_use]
    pub fn get_recent(&self, limit: usize) -> Vec<CaptureEvent> {
        self.recorder.get_recent(limit)
    }

    /// Detached snapshot of the detection counters.
    #[must_use]
    pub fn get_statistics(&self) -> DetectionStats {
        self.recorder.statistics()
    }

    /// Drop all events, the seen-process table and the counters.
    pub fn clear(&self) {
        self.recorder.clear();
    }

    /// Start the polling loop. No-op when already `Running`.
    ///
    /// # Errors
    ///
    /// Returns an error when the probe cannot observe anything at all — a
    /// monitor that cannot observe must not pretend to.
    pub fn start(&self) -> crate::error::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(err) = self.probe.ensure_available() {
            self.running.store(false, Ordering::SeqCst);
            return Err(err.into());
        }

        let probe = Arc::clone(&self.probe);
        let recorder = Arc::clone(&self.recorder);
        let classifier = Arc::clone(&self.classifier);
        let scanner = self.scanner.clone();
        // Each run gets its own token: a loop abandoned by a timed-out
        // stop() must stay cancelled across a back-to-back restart.
        let cancel = Arc::new(AtomicBool::new(true));
        *self.cancel.lock() = Some(Arc::clone(&cancel));
        let tick_interval = self.tick_interval;
        let error_backoff = self.error_backoff;
        let log_safe = self.log_safe_processes;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut watcher = ClipboardWatcher::new(log_safe);
            debug!("monitoring loop started");

            while cancel.load(Ordering::SeqCst) {
                ticker.tick().await;
                if !cancel.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(err) = run_tick(
                    probe.as_ref(),
                    &recorder,
                    &classifier,
                    &scanner,
                    &mut watcher,
                    log_safe,
                ) {
                    warn!(error = %err, "detection tick failed, backing off");
                    tokio::time::sleep(error_backoff).await;
                }
            }
            debug!("monitoring loop exited");
        });

        *self.task.lock() = Some(handle);
        info!(interval_ms = self.tick_interval.as_millis() as u64, "detection engine started");
        Ok(())
    }

    /// Signal the loop to stop and wait up to the stop timeout.
    ///
    /// The engine is `Stopped` when this returns even if the loop has not
    /// yet observed the flag; a timed-out loop is abandoned, not aborted.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(cancel) = self.cancel.lock().take() {
            cancel.store(false, Ordering::SeqCst);
        }
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(self.stop_timeout, handle).await.is_err() {
                warn!(
                    timeout_ms = self.stop_timeout.as_millis() as u64,
                    "tick loop did not exit in time, abandoning it"
                );
            }
        }
        info!("detection engine stopped");
    }
}

/// One full detection pass: clipboard, then window sweep, then process scan.
fn run_tick(
    probe: &dyn SystemProbe,
    recorder: &EventRecorder,
    classifier: &Classifier,
    scanner: &SnapshotScanner,
    watcher: &mut ClipboardWatcher,
    log_safe: bool,
) -> Result<(), ProbeError> {
    if let Some(event) = watcher.poll(probe, classifier) {
        recorder.record(event);
    }

    match scanner.sweep_titles(probe, recorder) {
        Ok(candidates) => {
            for observed in candidates {
                recorder.mark_seen(observed.pid, &observed.name);
                let risk = classifier.classify_attribution(&observed);
                if risk == RiskLevel::Safe && !log_safe {
                    continue;
                }
                let title = probe.window_title_for_pid(observed.pid);
                recorder.record(
                    CaptureEvent::new(
                        observed.name,
                        observed.pid,
                        CaptureMethod::ActiveCaptureTool,
                        risk,
                    )
                    .with_window_title(title)
                    .with_executable_path(observed.exe_path),
                );
            }
        }
        Err(err) if err.is_unsupported() => debug!(error = %err, "window sweep skipped"),
        Err(err) => return Err(err),
    }

    for observed in scanner.scan(probe, recorder)? {
        recorder.mark_seen(observed.pid, &observed.name);
        let risk = classifier.classify(&observed);
        if risk == RiskLevel::NotRelevant {
            continue;
        }
        if risk == RiskLevel::Safe && !log_safe {
            continue;
        }
        let title = probe.window_title_for_pid(observed.pid);
        recorder.record(
            CaptureEvent::new(observed.name, observed.pid, CaptureMethod::ProcessScan, risk)
                .with_window_title(title)
                .with_executable_path(observed.exe_path),
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::testing::{proc, ScriptedProbe};
    use crate::probe::WindowInfo;
    use std::time::Duration;

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.engine.tick_interval_ms = 10;
        config.engine.error_backoff_ms = 10;
        config.engine.stop_timeout_ms = 500;
        config
    }

    fn engine_with(probe: ScriptedProbe, config: &Config) -> DetectionEngine {
        DetectionEngine::new(config, Arc::new(probe))
    }

    #[tokio::test]
    async fn test_start_stop_leaves_stopped() {
        let engine = engine_with(ScriptedProbe::new(), &fast_config());

        engine.start().unwrap();
        assert!(engine.is_running());

        engine.stop().await;
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_start_is_noop_when_running() {
        let engine = engine_with(ScriptedProbe::new(), &fast_config());

        engine.start().unwrap();
        engine.start().unwrap();
        assert!(engine.is_running());

        engine.stop().await;
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let engine = engine_with(ScriptedProbe::new(), &fast_config());
        engine.stop().await;
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_start_fails_when_probe_unavailable() {
        let probe = ScriptedProbe::new();
        probe.state.lock().unavailable = true;
        let engine = engine_with(probe, &fast_config());

        let err = engine.start().unwrap_err();
        assert!(err.is_probe_error());
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_scan_records_risky_process_once() {
        let probe = ScriptedProbe::with_processes(vec![proc(
            60,
            "unknown.exe",
            "C:\\Temp\\unknown.exe",
            &["unknown.exe", "--screenshot"],
        )]);
        let engine = engine_with(probe, &fast_config());

        engine.start().unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        engine.stop().await;

        let events = engine.get_recent(10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].risk, RiskLevel::High);
        assert_eq!(events[0].method, CaptureMethod::ProcessScan);
    }

    #[tokio::test]
    async fn test_irrelevant_and_safe_processes_not_recorded() {
        let probe = ScriptedProbe::with_processes(vec![
            proc(61, "Spotify.exe", "C:\\Spotify.exe", &[]),
            proc(62, "SnippingTool.exe", "C:\\Windows\\SnippingTool.exe", &[]),
        ]);
        let engine = engine_with(probe, &fast_config());

        engine.start().unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        engine.stop().await;

        assert!(engine.get_recent(10).is_empty());
        assert_eq!(engine.get_statistics().total, 0);
    }

    #[tokio::test]
    async fn test_safe_processes_recorded_in_log_safe_mode() {
        let probe = ScriptedProbe::with_processes(vec![proc(
            63,
            "SnippingTool.exe",
            "C:\\Windows\\SnippingTool.exe",
            &[],
        )]);
        let mut config = fast_config();
        config.engine.log_safe_processes = true;
        let engine = engine_with(probe, &config);

        engine.start().unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        engine.stop().await;

        let events = engine.get_recent(10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].risk, RiskLevel::Safe);
        assert_eq!(engine.get_statistics().safe_logged, 1);
    }

    #[tokio::test]
    async fn test_sweep_records_active_capture_tool() {
        let probe = ScriptedProbe::with_processes(vec![proc(
            64,
            "rogue_recorder.exe",
            "C:\\Temp\\rogue_recorder.exe",
            &[],
        )]);
        probe.state.lock().windows.push(WindowInfo {
            pid: 64,
            title: "Screen Record - live".to_string(),
        });
        let engine = engine_with(probe, &fast_config());

        engine.start().unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        engine.stop().await;

        let events = engine.get_recent(10);
        // Swept once, then de-duplicated by the seen-process table.
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].method, CaptureMethod::ActiveCaptureTool);
        assert_eq!(events[0].risk, RiskLevel::High);
        assert_eq!(events[0].window_title, "Screen Record - live");
    }

    #[tokio::test]
    async fn test_clipboard_capture_flows_to_recorder() {
        let probe = Arc::new(ScriptedProbe::with_processes(vec![proc(
            65,
            "shadow.exe",
            "C:\\Temp\\shadow.exe",
            &[],
        )]));
        probe.set_foreground(Some(65));
        probe.set_clipboard(1, true);
        let engine = DetectionEngine::new(
            &fast_config(),
            Arc::clone(&probe) as Arc<dyn crate::probe::SystemProbe>,
        );

        engine.start().unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        // A new clipboard image arrives mid-run.
        probe.set_clipboard(2, true);
        tokio::time::sleep(Duration::from_millis(40)).await;
        engine.stop().await;

        let events = engine.get_recent(10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].method, CaptureMethod::ClipboardCapture);
        assert_eq!(events[0].pid, 65);
        assert_eq!(events[0].risk, RiskLevel::High);
    }

    #[tokio::test]
    async fn test_stats_monotonic_while_running() {
        let probe = ScriptedProbe::with_processes(vec![proc(
            66,
            "grab_tool.exe",
            "C:\\Temp\\screengrab\\grab_tool.exe",
            &[],
        )]);
        let engine = engine_with(probe, &fast_config());

        engine.start().unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let first = engine.get_statistics().total;
        tokio::time::sleep(Duration::from_millis(40)).await;
        let second = engine.get_statistics().total;
        engine.stop().await;

        assert!(second >= first);
    }

    #[tokio::test]
    async fn test_clear_resets_state_and_allows_redetection() {
        let probe = ScriptedProbe::with_processes(vec![proc(
            67,
            "unknown.exe",
            "C:\\Temp\\unknown.exe",
            &["unknown.exe", "--capture"],
        )]);
        let engine = engine_with(probe, &fast_config());

        engine.start().unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(engine.get_recent(10).len(), 1);

        engine.clear();
        assert!(engine.get_recent(10).is_empty());
        assert_eq!(engine.get_statistics(), DetectionStats::default());

        // The seen table was cleared too, so the process is found again.
        tokio::time::sleep(Duration::from_millis(60)).await;
        engine.stop().await;
        assert_eq!(engine.get_recent(10).len(), 1);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let engine = engine_with(ScriptedProbe::new(), &fast_config());

        engine.start().unwrap();
        engine.stop().await;
        engine.start().unwrap();
        assert!(engine.is_running());
        engine.stop().await;
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_subscribers_notified_from_tick_loop() {
        use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

        let probe = ScriptedProbe::with_processes(vec![proc(
            68,
            "stealer_svc.exe",
            "C:\\Temp\\stealer_svc.exe",
            &[],
        )]);
        let engine = engine_with(probe, &fast_config());
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        engine.register_callback(move |event| {
            assert_eq!(event.risk, RiskLevel::Critical);
            seen_clone.fetch_add(1, AtomicOrdering::SeqCst);
        });

        engine.start().unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        engine.stop().await;

        assert_eq!(seen.load(AtomicOrdering::SeqCst), 1);
    }
}
