//! Window and process queries backing the tracker.

use crate::WatchFilter;
use std::ffi::c_void;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use unminimize_core::{ProcessId, ProcessInfo, SourceError, WindowId, WindowSource};
use windows::core::PWSTR;
use windows::Win32::Foundation::{CloseHandle, BOOL, E_ACCESSDENIED, HANDLE, HWND, LPARAM, TRUE};
use windows::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
    PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetAncestor, GetForegroundWindow, GetWindow, GetWindowLongW, GetWindowTextLengthW,
    GetWindowTextW, GetWindowThreadProcessId, IsIconic, IsWindow, IsWindowVisible, SetForegroundWindow,
    ShowWindow, GA_ROOT, GWL_EXSTYLE, GW_OWNER, SW_MINIMIZE, SW_RESTORE, WS_EX_TOOLWINDOW,
};

/// Exit code reported for processes that have not exited.
const STILL_ACTIVE: u32 = 259;

pub(crate) fn window_id(hwnd: HWND) -> WindowId {
    WindowId(hwnd.0 as usize as u64)
}

pub(crate) fn hwnd(window: WindowId) -> HWND {
    HWND(window.raw() as usize as *mut c_void)
}

pub(crate) fn window_pid(hwnd: HWND) -> ProcessId {
    let mut pid = 0u32;
    unsafe { GetWindowThreadProcessId(hwnd, Some(&mut pid as *mut u32)) };
    pid
}

/// Visible, unowned, top-level and not a tool window: what the taskbar shows.
pub(crate) fn is_eligible_window(hwnd: HWND) -> bool {
    unsafe {
        if !IsWindowVisible(hwnd).as_bool() {
            return false;
        }
        if GetWindowLongW(hwnd, GWL_EXSTYLE) as u32 & WS_EX_TOOLWINDOW.0 != 0 {
            return false;
        }
        if GetAncestor(hwnd, GA_ROOT) != hwnd {
            return false;
        }
        match GetWindow(hwnd, GW_OWNER) {
            Ok(owner) => owner.is_invalid(),
            Err(_) => true,
        }
    }
}

unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let windows = &mut *(lparam.0 as *mut Vec<WindowId>);
    windows.push(window_id(hwnd));
    TRUE
}

fn top_level_windows() -> Result<Vec<WindowId>, SourceError> {
    let mut windows: Vec<WindowId> = Vec::new();
    unsafe { EnumWindows(Some(collect_window), LPARAM(&mut windows as *mut _ as isize)) }
        .map_err(|e| SourceError::Unsupported(format!("EnumWindows failed: {}", e)))?;
    Ok(windows)
}

fn eligible_windows() -> Result<Vec<(ProcessId, WindowId)>, SourceError> {
    Ok(top_level_windows()?
        .into_iter()
        .filter(|&w| is_eligible_window(hwnd(w)))
        .map(|w| (window_pid(hwnd(w)), w))
        .collect())
}

/// Process handle closed on drop.
struct ProcessHandle(HANDLE);

impl ProcessHandle {
    fn open(pid: ProcessId) -> Result<Self, SourceError> {
        match unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) } {
            Ok(handle) => Ok(Self(handle)),
            Err(e) if e.code() == E_ACCESSDENIED => Err(SourceError::PermissionDenied),
            Err(_) => Err(SourceError::ProcessGone(pid)),
        }
    }

    fn image_path(&self) -> Option<String> {
        let mut buffer = [0u16; 1024];
        let mut len = buffer.len() as u32;
        unsafe { QueryFullProcessImageNameW(self.0, PROCESS_NAME_WIN32, PWSTR(buffer.as_mut_ptr()), &mut len) }
            .ok()?;
        Some(String::from_utf16_lossy(&buffer[..len as usize]))
    }

    fn is_running(&self) -> bool {
        let mut code = 0u32;
        unsafe { GetExitCodeProcess(self.0, &mut code) }.is_ok() && code == STILL_ACTIVE
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        let _ = unsafe { CloseHandle(self.0) };
    }
}

/// Check whether a process still exists.
///
/// A process we may not query is assumed alive; it owns windows we could see.
pub(crate) fn is_process_alive(pid: ProcessId) -> bool {
    match ProcessHandle::open(pid) {
        Ok(handle) => handle.is_running(),
        Err(SourceError::PermissionDenied) => true,
        Err(_) => false,
    }
}

/// Lowercased executable path of a process.
pub(crate) fn process_app_id(pid: ProcessId) -> Result<String, SourceError> {
    ProcessHandle::open(pid)?
        .image_path()
        .map(|path| path.to_lowercase())
        .ok_or(SourceError::PermissionDenied)
}

fn process_info(pid: ProcessId, regular: bool) -> Result<ProcessInfo, SourceError> {
    let app_id = process_app_id(pid)?;
    let display_name = Path::new(&app_id)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| app_id.clone());
    Ok(ProcessInfo {
        pid,
        app_id,
        display_name,
        regular,
    })
}

fn validate(window: WindowId) -> Result<HWND, SourceError> {
    let handle = hwnd(window);
    if unsafe { IsWindow(Some(handle)) }.as_bool() {
        Ok(handle)
    } else {
        Err(SourceError::WindowGone(window))
    }
}

/// Subscription handle: an entry in the shared [`WatchFilter`].
#[derive(Debug)]
pub struct Win32Subscription {
    id: u64,
    pid: ProcessId,
}

/// [`WindowSource`] over Win32.
///
/// Notifications are not pulled from here; the hook thread started by
/// [`install_event_hooks`](crate::install_event_hooks) reads the same filter.
pub struct Win32WindowSource {
    filter: Arc<WatchFilter>,
}

impl Win32WindowSource {
    /// Create a source registering subscriptions in `filter`.
    pub fn new(filter: Arc<WatchFilter>) -> Self {
        Self { filter }
    }

    /// The shared watch filter.
    pub fn filter(&self) -> &Arc<WatchFilter> {
        &self.filter
    }
}

impl WindowSource for Win32WindowSource {
    type Subscription = Win32Subscription;

    fn running_processes(&self) -> Result<Vec<ProcessInfo>, SourceError> {
        let mut pids: Vec<ProcessId> = eligible_windows()?.into_iter().map(|(pid, _)| pid).collect();
        pids.sort_unstable();
        pids.dedup();

        let mut processes = Vec::with_capacity(pids.len());
        for pid in pids {
            match process_info(pid, true) {
                Ok(info) => processes.push(info),
                Err(e) => debug!("Skipping pid {}: {}", pid, e),
            }
        }
        Ok(processes)
    }

    fn process(&self, pid: ProcessId) -> Result<ProcessInfo, SourceError> {
        let regular = eligible_windows()?.iter().any(|&(p, _)| p == pid);
        process_info(pid, regular)
    }

    fn windows(&self, pid: ProcessId) -> Result<Vec<WindowId>, SourceError> {
        // EnumWindows runs top of the Z order first and a minimized window
        // drops to the bottom, so the latest minimize comes last.
        Ok(eligible_windows()?
            .into_iter()
            .filter(|&(p, _)| p == pid)
            .map(|(_, w)| w)
            .collect())
    }

    fn is_minimized(&self, window: WindowId) -> Result<bool, SourceError> {
        let handle = validate(window)?;
        Ok(unsafe { IsIconic(handle) }.as_bool())
    }

    fn set_minimized(&mut self, window: WindowId, minimized: bool) -> Result<(), SourceError> {
        let handle = validate(window)?;
        if unsafe { IsIconic(handle) }.as_bool() == minimized {
            return Ok(());
        }

        let command = if minimized { SW_MINIMIZE } else { SW_RESTORE };
        let _ = unsafe { ShowWindow(handle, command) };

        if unsafe { IsIconic(handle) }.as_bool() != minimized {
            return Err(SourceError::AttributeRejected(format!(
                "window {} did not change minimized state",
                window
            )));
        }
        Ok(())
    }

    fn title(&self, window: WindowId) -> Option<String> {
        let handle = hwnd(window);
        let len = unsafe { GetWindowTextLengthW(handle) };
        if len <= 0 {
            return None;
        }
        let mut buffer = vec![0u16; len as usize + 1];
        let copied = unsafe { GetWindowTextW(handle, &mut buffer) };
        if copied <= 0 {
            return None;
        }
        Some(String::from_utf16_lossy(&buffer[..copied as usize]))
    }

    fn subscribe_process(&mut self, process: &ProcessInfo) -> Result<Win32Subscription, SourceError> {
        if !is_process_alive(process.pid) {
            return Err(SourceError::ProcessGone(process.pid));
        }
        let id = self.filter.subscribe(process.pid);
        Ok(Win32Subscription { id, pid: process.pid })
    }

    fn watch_window(&mut self, subscription: &mut Win32Subscription, window: WindowId) -> Result<(), SourceError> {
        validate(window)?;
        if self.filter.watch_window(subscription.id, window) {
            Ok(())
        } else {
            Err(SourceError::SubscriptionFailed(format!(
                "subscription for pid {} was released",
                subscription.pid
            )))
        }
    }

    fn unwatch_window(&mut self, subscription: &mut Win32Subscription, window: WindowId) {
        self.filter.unwatch_window(subscription.id, window);
    }

    fn watch_window_created(&mut self, subscription: &mut Win32Subscription) -> Result<(), SourceError> {
        if self.filter.watch_created(subscription.id) {
            Ok(())
        } else {
            Err(SourceError::SubscriptionFailed(format!(
                "subscription for pid {} was released",
                subscription.pid
            )))
        }
    }

    fn release_subscription(&mut self, subscription: Win32Subscription) {
        self.filter.release(subscription.id);
    }

    fn frontmost_app_id(&self) -> Option<String> {
        let foreground = unsafe { GetForegroundWindow() };
        if foreground.is_invalid() {
            return None;
        }
        process_app_id(window_pid(foreground)).ok()
    }

    fn activate(&mut self, _pid: ProcessId, window: WindowId) -> Result<(), SourceError> {
        let handle = validate(window)?;
        if unsafe { SetForegroundWindow(handle) }.as_bool() {
            Ok(())
        } else {
            Err(SourceError::AttributeRejected(
                "SetForegroundWindow was refused".to_string(),
            ))
        }
    }
}
