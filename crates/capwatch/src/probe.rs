//! Platform observation abstraction.
//!
//! This module defines the trait the detection engine uses to look at the
//! operating system: the process table, the clipboard change counter, and
//! the set of visible top-level windows. Platform crates implement the raw
//! queries; everything above this seam is OS-independent and testable with
//! a scripted probe.

use parking_lot::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};
use thiserror::Error;

use crate::event::ACCESS_DENIED_PATH;

/// Sentinel title when a process owns no visible window.
pub const NO_WINDOW_TITLE: &str = "no window title";

/// Sentinel title when window enumeration itself failed.
pub const UNKNOWN_WINDOW_TITLE: &str = "unknown";

/// Errors from platform observation calls.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// A required OS facility is missing; surfaced at engine start.
    #[error("observation facility unavailable: {0}")]
    Unavailable(String),

    /// The query is not implemented on this platform.
    #[error("observation not supported on this platform: {0}")]
    Unsupported(&'static str),

    /// An OS call failed. Usually transient (clipboard held by another
    /// process, process vanished mid-query).
    #[error("os query failed: {0}")]
    Os(String),
}

impl ProbeError {
    /// Whether this error means the feature simply does not exist here.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

/// Result type for probe operations.
pub type Result<T> = std::result::Result<T, ProbeError>;

/// One process as seen in a snapshot of the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedProcess {
    /// Process identifier.
    pub pid: u32,
    /// Executable file name.
    pub name: String,
    /// Executable path, or the `"access-denied"` sentinel.
    pub exe_path: String,
    /// Command-line arguments as reported by the OS.
    pub cmdline: Vec<String>,
}

/// A visible top-level window and its owning process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    /// Owning process identifier.
    pub pid: u32,
    /// Window title text.
    pub title: String,
}

/// Read-only view of the OS state the engine polls each tick.
///
/// All methods are bounded-latency OS queries; none blocks on user input or
/// the network. Implementations must be callable from the engine's
/// background task while the foreground thread reads statistics.
pub trait SystemProbe: Send + Sync {
    /// Verify that the probe can observe anything at all.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Unavailable`] when a required facility is
    /// missing; the engine refuses to start rather than report false
    /// confidence.
    fn ensure_available(&self) -> Result<()>;

    /// Snapshot the current process table.
    ///
    /// # Errors
    ///
    /// Returns an error only when the whole enumeration fails; individual
    /// unreadable processes are simply absent.
    fn process_snapshot(&self) -> Result<Vec<ObservedProcess>>;

    /// Look up a single process by pid, `None` if it no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the lookup itself cannot be performed.
    fn process_info(&self, pid: u32) -> Result<Option<ObservedProcess>>;

    /// Current clipboard change-sequence number.
    ///
    /// # Errors
    ///
    /// Returns an error when the counter cannot be read; the caller treats
    /// this as transient and retries next tick.
    fn clipboard_sequence(&self) -> Result<u64>;

    /// Whether the clipboard currently holds image-format data.
    ///
    /// # Errors
    ///
    /// Returns an error when the clipboard cannot be inspected.
    fn clipboard_has_image(&self) -> Result<bool>;

    /// Pid owning the current foreground window, `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error when the foreground window cannot be resolved.
    fn foreground_pid(&self) -> Result<Option<u32>>;

    /// Enumerate visible top-level windows.
    ///
    /// # Errors
    ///
    /// Returns an error when enumeration fails.
    fn visible_windows(&self) -> Result<Vec<WindowInfo>>;

    /// Best-effort title of the first visible window owned by `pid`.
    ///
    /// Infallible by design: failures degrade to sentinel titles.
    fn window_title_for_pid(&self, pid: u32) -> String {
        match self.visible_windows() {
            Ok(windows) => windows
                .into_iter()
                .find(|w| w.pid == pid && !w.title.is_empty())
                .map_or_else(|| NO_WINDOW_TITLE.to_string(), |w| w.title),
            Err(_) => UNKNOWN_WINDOW_TITLE.to_string(),
        }
    }
}

fn observed_from(pid: u32, proc_info: &sysinfo::Process) -> ObservedProcess {
    ObservedProcess {
        pid,
        name: proc_info.name().to_string(),
        exe_path: proc_info
            .exe()
            .map_or_else(|| ACCESS_DENIED_PATH.to_string(), |p| p.display().to_string()),
        cmdline: proc_info.cmd().to_vec(),
    }
}

/// Process-table-only probe that works on any OS.
///
/// Clipboard and window queries report [`ProbeError::Unsupported`]; the
/// engine degrades to process scanning alone. Used on non-Windows hosts
/// and handy for exercising the scan path anywhere.
pub struct PortableProbe {
    system: Mutex<System>,
}

impl std::fmt::Debug for PortableProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortableProbe").finish_non_exhaustive()
    }
}

impl PortableProbe {
    /// Create a probe over a fresh process-table view.
    #[must_use]
    pub fn new() -> Self {
        let refresh = RefreshKind::new().with_processes(ProcessRefreshKind::everything());
        Self {
            system: Mutex::new(System::new_with_specifics(refresh)),
        }
    }
}

impl Default for PortableProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for PortableProbe {
    fn ensure_available(&self) -> Result<()> {
        Ok(())
    }

    fn process_snapshot(&self) -> Result<Vec<ObservedProcess>> {
        let mut sys = self.system.lock();
        sys.refresh_processes();
        Ok(sys
            .processes()
            .iter()
            .map(|(pid, p)| observed_from(pid.as_u32(), p))
            .collect())
    }

    fn process_info(&self, pid: u32) -> Result<Option<ObservedProcess>> {
        let mut sys = self.system.lock();
        let sys_pid = Pid::from_u32(pid);
        sys.refresh_process(sys_pid);
        Ok(sys.process(sys_pid).map(|p| observed_from(pid, p)))
    }

    fn clipboard_sequence(&self) -> Result<u64> {
        Err(ProbeError::Unsupported("clipboard change counter"))
    }

    fn clipboard_has_image(&self) -> Result<bool> {
        Err(ProbeError::Unsupported("clipboard format inspection"))
    }

    fn foreground_pid(&self) -> Result<Option<u32>> {
        Err(ProbeError::Unsupported("foreground window"))
    }

    fn visible_windows(&self) -> Result<Vec<WindowInfo>> {
        Err(ProbeError::Unsupported("window enumeration"))
    }
}

/// Native probe backed by the Win32 observation APIs.
#[cfg(target_os = "windows")]
pub mod native {
    use super::{ObservedProcess, ProbeError, Result, SystemProbe, WindowInfo};
    use crate::event::ACCESS_DENIED_PATH;

    /// Windows implementation of [`SystemProbe`].
    #[derive(Debug)]
    pub struct NativeProbe {
        inner: capwatch_windows::WindowsProbe,
    }

    impl NativeProbe {
        /// Create a probe over the live Win32 APIs.
        #[must_use]
        pub fn new() -> Self {
            Self {
                inner: capwatch_windows::WindowsProbe::new(),
            }
        }
    }

    impl Default for NativeProbe {
        fn default() -> Self {
            Self::new()
        }
    }

    fn map_err(err: capwatch_windows::ProbeError) -> ProbeError {
        match err {
            capwatch_windows::ProbeError::Unavailable(msg) => ProbeError::Unavailable(msg),
            capwatch_windows::ProbeError::Os(msg) => ProbeError::Os(msg),
        }
    }

    fn map_process(rec: capwatch_windows::ProcessRecord) -> ObservedProcess {
        ObservedProcess {
            pid: rec.pid,
            name: rec.name,
            exe_path: rec
                .exe_path
                .unwrap_or_else(|| ACCESS_DENIED_PATH.to_string()),
            cmdline: rec.cmdline,
        }
    }

    impl SystemProbe for NativeProbe {
        fn ensure_available(&self) -> Result<()> {
            self.inner.ensure_available().map_err(map_err)
        }

        fn process_snapshot(&self) -> Result<Vec<ObservedProcess>> {
            Ok(self
                .inner
                .process_records()
                .map_err(map_err)?
                .into_iter()
                .map(map_process)
                .collect())
        }

        fn process_info(&self, pid: u32) -> Result<Option<ObservedProcess>> {
            Ok(self
                .inner
                .process_record(pid)
                .map_err(map_err)?
                .map(map_process))
        }

        fn clipboard_sequence(&self) -> Result<u64> {
            self.inner.clipboard_sequence().map_err(map_err)
        }

        fn clipboard_has_image(&self) -> Result<bool> {
            self.inner.clipboard_has_image().map_err(map_err)
        }

        fn foreground_pid(&self) -> Result<Option<u32>> {
            self.inner.foreground_pid().map_err(map_err)
        }

        fn visible_windows(&self) -> Result<Vec<WindowInfo>> {
            Ok(self
                .inner
                .visible_windows()
                .map_err(map_err)?
                .into_iter()
                .map(|w| WindowInfo {
                    pid: w.pid,
                    title: w.title,
                })
                .collect())
        }
    }
}

/// Scripted probe for tests: every query answers from pre-set state.
#[cfg(test)]
pub(crate) mod testing {
    use super::{ObservedProcess, ProbeError, Result, SystemProbe, WindowInfo};
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    pub struct ScriptedState {
        pub processes: Vec<ObservedProcess>,
        pub windows: Vec<WindowInfo>,
        pub clipboard_sequence: Option<u64>,
        pub clipboard_has_image: bool,
        pub foreground_pid: Option<u32>,
        pub clipboard_locked: bool,
        pub windows_broken: bool,
        pub unavailable: bool,
    }

    #[derive(Debug, Default)]
    pub struct ScriptedProbe {
        pub state: Mutex<ScriptedState>,
    }

    impl ScriptedProbe {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_processes(processes: Vec<ObservedProcess>) -> Self {
            let probe = Self::new();
            probe.state.lock().processes = processes;
            probe
        }

        pub fn set_clipboard(&self, sequence: u64, has_image: bool) {
            let mut state = self.state.lock();
            state.clipboard_sequence = Some(sequence);
            state.clipboard_has_image = has_image;
        }

        pub fn set_foreground(&self, pid: Option<u32>) {
            self.state.lock().foreground_pid = pid;
        }
    }

    pub fn proc(pid: u32, name: &str, exe: &str, cmdline: &[&str]) -> ObservedProcess {
        ObservedProcess {
            pid,
            name: name.to_string(),
            exe_path: exe.to_string(),
            cmdline: cmdline.iter().map(ToString::to_string).collect(),
        }
    }

    impl SystemProbe for ScriptedProbe {
        fn ensure_available(&self) -> Result<()> {
            if self.state.lock().unavailable {
                return Err(ProbeError::Unavailable("scripted facility down".into()));
            }
            Ok(())
        }

        fn process_snapshot(&self) -> Result<Vec<ObservedProcess>> {
            Ok(self.state.lock().processes.clone())
        }

        fn process_info(&self, pid: u32) -> Result<Option<ObservedProcess>> {
            Ok(self
                .state
                .lock()
                .processes
                .iter()
                .find(|p| p.pid == pid)
                .cloned())
        }

        fn clipboard_sequence(&self) -> Result<u64> {
            let state = self.state.lock();
            if state.clipboard_locked {
                return Err(ProbeError::Os("clipboard is held by another process".into()));
            }
            state
                .clipboard_sequence
                .ok_or_else(|| ProbeError::Os("no clipboard yet".into()))
        }

        fn clipboard_has_image(&self) -> Result<bool> {
            Ok(self.state.lock().clipboard_has_image)
        }

        fn foreground_pid(&self) -> Result<Option<u32>> {
            Ok(self.state.lock().foreground_pid)
        }

        fn visible_windows(&self) -> Result<Vec<WindowInfo>> {
            let state = self.state.lock();
            if state.windows_broken {
                return Err(ProbeError::Os("window enumeration failed".into()));
            }
            Ok(state.windows.clone())
        }
    }
}
