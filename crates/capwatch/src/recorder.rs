//! Bounded in-memory event log with fan-out to subscribers.
//!
//! The recorder owns the only mutable detection state: the event ring, the
//! seen-process table and the counters, all behind one lock that is held
//! only for the append/update itself — never across an OS call and never
//! while subscribers run.

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::event::{CaptureEvent, DetectionStats, RiskLevel};

type Subscriber = Box<dyn Fn(&CaptureEvent) + Send + Sync>;

#[derive(Debug, Default)]
struct RecorderState {
    events: VecDeque<CaptureEvent>,
    seen: HashMap<u32, String>,
    stats: DetectionStats,
}

/// Append-only event log, de-duplication table and counters.
pub struct EventRecorder {
    capacity: usize,
    state: Mutex<RecorderState>,
    subscribers: RwLock<Vec<Subscriber>>,
}

impl std::fmt::Debug for EventRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRecorder")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscribers.read().len())
            .finish_non_exhaustive()
    }
}

impl EventRecorder {
    /// Create a recorder keeping at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(RecorderState::default()),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Register a subscriber invoked synchronously for every recorded event.
    ///
    /// Subscribers run outside the state lock and each inside its own panic
    /// boundary: one failing subscriber never blocks the rest and never
    /// corrupts the log or the counters.
    pub fn register_callback(&self, callback: impl Fn(&CaptureEvent) + Send + Sync + 'static) {
        self.subscribers.write().push(Box::new(callback));
    }

    /// Append an event, bump its risk bucket and notify subscribers.
    pub fn record(&self, event: CaptureEvent) {
        {
            let mut state = self.state.lock();
            if state.events.len() >= self.capacity {
                state.events.pop_front();
            }
            state.stats.count(event.risk);
            state.events.push_back(event.clone());
        }

        // Structured line consumed by whatever logger the host wired up.
        if event.risk == RiskLevel::Safe {
            info!(
                process = %event.process_name,
                pid = event.pid,
                method = %event.method,
                risk = %event.risk,
                "capture activity recorded"
            );
        } else {
            warn!(
                process = %event.process_name,
                pid = event.pid,
                method = %event.method,
                risk = %event.risk,
                window = %event.window_title,
                "capture activity detected"
            );
        }

        let subscribers = self.subscribers.read();
        for (index, subscriber) in subscribers.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| subscriber(&event))).is_err() {
                error!(subscriber = index, "event subscriber panicked");
            }
        }
    }

    /// Whether `pid` was already evaluated during this engine run.
    #[must_use]
    pub fn is_seen(&self, pid: u32) -> bool {
        self.state.lock().seen.contains_key(&pid)
    }

    /// Remember `pid` with its last-known process name.
    pub fn mark_seen(&self, pid: u32, name: &str) {
        self.state.lock().seen.insert(pid, name.to_string());
    }

    /// The most recent `limit` events, oldest of the window first.
    #[must_use]
    pub fn get_recent(&self, limit: usize) -> Vec<CaptureEvent> {
        let state = self.state.lock();
        let skip = state.events.len().saturating_sub(limit);
        state.events.iter().skip(skip).cloned().collect()
    }

    /// Detached snapshot of the counters.
    #[must_use]
    pub fn statistics(&self) -> DetectionStats {
        self.state.lock().stats
    }

    /// Number of events currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().events.is_empty()
    }

    /// Drop all events, the seen-process table and the counters at once.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.events.clear();
        state.seen.clear();
        state.stats = DetectionStats::default();
        info!("detection events cleared");
    }
}
