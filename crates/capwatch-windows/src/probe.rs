//! Raw Win32 observation queries.
//!
//! Everything here is a short, bounded syscall. No query opens the
//! clipboard or takes a lock another process could be starved by; the
//! change counter and format checks are lock-free Win32 reads.

use parking_lot::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};
use thiserror::Error;

use windows_sys::Win32::Foundation::{BOOL, HWND, LPARAM};
use windows_sys::Win32::System::DataExchange::{
    GetClipboardSequenceNumber, IsClipboardFormatAvailable,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetForegroundWindow, GetWindowTextW, GetWindowThreadProcessId, IsWindowVisible,
};

// Standard clipboard formats (winuser.h).
const CF_BITMAP: u32 = 2;
const CF_DIB: u32 = 8;
const CF_DIBV5: u32 = 17;

/// Upper bound on windows examined per enumeration.
const MAX_WINDOW_SCAN: usize = 512;

/// Window title buffer length in UTF-16 units.
const MAX_TITLE_LEN: usize = 512;

/// Errors from Win32 observation queries.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// A required facility is missing entirely.
    #[error("observation facility unavailable: {0}")]
    Unavailable(String),

    /// An OS call failed.
    #[error("win32 call failed: {0}")]
    Os(String),
}

/// Result type for probe operations.
pub type Result<T> = std::result::Result<T, ProbeError>;

/// One process from the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    /// Process identifier.
    pub pid: u32,
    /// Executable file name.
    pub name: String,
    /// Executable path; `None` when the OS denies the query.
    pub exe_path: Option<String>,
    /// Command-line arguments.
    pub cmdline: Vec<String>,
}

/// A visible top-level window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRecord {
    /// Owning process identifier.
    pub pid: u32,
    /// Window title text.
    pub title: String,
}

/// Win32-backed system observation.
pub struct WindowsProbe {
    system: Mutex<System>,
}

impl std::fmt::Debug for WindowsProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowsProbe").finish_non_exhaustive()
    }
}

impl WindowsProbe {
    /// Create a probe over a fresh process-table view.
    #[must_use]
    pub fn new() -> Self {
        let refresh = RefreshKind::new().with_processes(ProcessRefreshKind::everything());
        Self {
            system: Mutex::new(System::new_with_specifics(refresh)),
        }
    }

    /// Verify that window enumeration works at all.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Unavailable`] when the desktop cannot be
    /// enumerated, e.g. in a session with no window station.
    pub fn ensure_available(&self) -> Result<()> {
        self.visible_windows()
            .map(|_| ())
            .map_err(|err| ProbeError::Unavailable(err.to_string()))
    }

    /// Snapshot the process table.
    ///
    /// # Errors
    ///
    /// Currently infallible in practice; kept fallible for the seam.
    pub fn process_records(&self) -> Result<Vec<ProcessRecord>> {
        let mut sys = self.system.lock();
        sys.refresh_processes();
        Ok(sys
            .processes()
            .iter()
            .map(|(pid, p)| record_from(pid.as_u32(), p))
            .collect())
    }

    /// Look up a single process, `None` if it no longer exists.
    ///
    /// # Errors
    ///
    /// Currently infallible in practice; kept fallible for the seam.
    pub fn process_record(&self, pid: u32) -> Result<Option<ProcessRecord>> {
        let mut sys = self.system.lock();
        let sys_pid = Pid::from_u32(pid);
        sys.refresh_process(sys_pid);
        Ok(sys.process(sys_pid).map(|p| record_from(pid, p)))
    }

    /// Current clipboard change-sequence number.
    ///
    /// The counter increments on every clipboard content change and never
    /// requires opening the clipboard.
    ///
    /// # Errors
    ///
    /// Returns an error when the calling session has no clipboard access.
    pub fn clipboard_sequence(&self) -> Result<u64> {
        // Returns 0 when the window station denies clipboard access.
        let sequence = unsafe { GetClipboardSequenceNumber() };
        Ok(u64::from(sequence))
    }

    /// Whether the clipboard currently holds bitmap-format data.
    ///
    /// # Errors
    ///
    /// Currently infallible; the format check does not take the clipboard
    /// lock.
    pub fn clipboard_has_image(&self) -> Result<bool> {
        let has_image = unsafe {
            IsClipboardFormatAvailable(CF_DIB) != 0
                || IsClipboardFormatAvailable(CF_BITMAP) != 0
                || IsClipboardFormatAvailable(CF_DIBV5) != 0
        };
        Ok(has_image)
    }

    /// Pid owning the foreground window, `None` when there is none.
    ///
    /// # Errors
    ///
    /// Returns an error when the owning process cannot be resolved.
    pub fn foreground_pid(&self) -> Result<Option<u32>> {
        let hwnd = unsafe { GetForegroundWindow() };
        if hwnd.is_null() {
            return Ok(None);
        }
        let mut pid: u32 = 0;
        let thread = unsafe { GetWindowThreadProcessId(hwnd, &mut pid) };
        if thread == 0 || pid == 0 {
            return Err(ProbeError::Os(
                "foreground window has no resolvable owner".to_string(),
            ));
        }
        Ok(Some(pid))
    }

    /// Enumerate visible top-level windows, capped at [`MAX_WINDOW_SCAN`].
    ///
    /// # Errors
    ///
    /// Returns an error when `EnumWindows` fails outright.
    pub fn visible_windows(&self) -> Result<Vec<WindowRecord>> {
        let mut windows: Vec<WindowRecord> = Vec::new();
        let ok = unsafe {
            EnumWindows(
                Some(enum_windows_proc),
                std::ptr::addr_of_mut!(windows) as LPARAM,
            )
        };
        // EnumWindows reports failure when the callback stops it early;
        // hitting the scan cap is not an error.
        if ok == 0 && windows.len() < MAX_WINDOW_SCAN {
            return Err(ProbeError::Os("EnumWindows failed".to_string()));
        }
        Ok(windows)
    }
}

impl Default for WindowsProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn record_from(pid: u32, proc_info: &sysinfo::Process) -> ProcessRecord {
    ProcessRecord {
        pid,
        name: proc_info.name().to_string(),
        exe_path: proc_info.exe().map(|p| p.display().to_string()),
        cmdline: proc_info.cmd().to_vec(),
    }
}

unsafe extern "system" fn enum_windows_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let windows = &mut *(lparam as *mut Vec<WindowRecord>);
    if windows.len() >= MAX_WINDOW_SCAN {
        return 0;
    }
    if IsWindowVisible(hwnd) == 0 {
        return 1;
    }

    let mut pid: u32 = 0;
    GetWindowThreadProcessId(hwnd, &mut pid);
    if pid == 0 {
        return 1;
    }

    let mut buffer = [0u16; MAX_TITLE_LEN];
    let len = GetWindowTextW(hwnd, buffer.as_mut_ptr(), buffer.len() as i32);
    let title = if len > 0 {
        String::from_utf16_lossy(&buffer[..len as usize])
    } else {
        String::new()
    };

    windows.push(WindowRecord { pid, title });
    1
}
