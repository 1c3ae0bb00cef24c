//! In-memory window source and hotkey backend for daemon tests.

use std::collections::HashMap;
use std::path::Path;
use unminimize_core::{
    HotkeyBackend, HotkeyError, KeyCombo, ProcessId, ProcessInfo, SourceError, WindowId, WindowSource,
};

#[derive(Debug, Default)]
pub(crate) struct FakeSource {
    processes: HashMap<ProcessId, ProcessInfo>,
    windows: HashMap<WindowId, (ProcessId, bool)>,
    pub frontmost: Option<String>,
    pub live_subscriptions: usize,
}

impl FakeSource {
    /// Add an application with unminimized windows. The display name is the
    /// file stem of `app_id`.
    pub fn add_app(&mut self, pid: ProcessId, app_id: &str, windows: &[u64]) {
        let name = Path::new(&app_id.replace('\\', "/"))
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| app_id.to_string());
        self.processes.insert(pid, ProcessInfo::regular(pid, app_id, name));
        for &raw in windows {
            self.windows.insert(WindowId(raw), (pid, false));
        }
    }

    pub fn set_minimized_flag(&mut self, window: WindowId, minimized: bool) {
        if let Some(entry) = self.windows.get_mut(&window) {
            entry.1 = minimized;
        }
    }

    pub fn is_minimized_flag(&self, window: WindowId) -> bool {
        self.windows.get(&window).is_some_and(|&(_, minimized)| minimized)
    }
}

impl WindowSource for FakeSource {
    type Subscription = ProcessId;

    fn running_processes(&self) -> Result<Vec<ProcessInfo>, SourceError> {
        let mut processes: Vec<_> = self.processes.values().cloned().collect();
        processes.sort_by_key(|p| p.pid);
        Ok(processes)
    }

    fn process(&self, pid: ProcessId) -> Result<ProcessInfo, SourceError> {
        self.processes.get(&pid).cloned().ok_or(SourceError::ProcessGone(pid))
    }

    fn windows(&self, pid: ProcessId) -> Result<Vec<WindowId>, SourceError> {
        let mut ids: Vec<_> = self
            .windows
            .iter()
            .filter(|(_, &(owner, _))| owner == pid)
            .map(|(&id, _)| id)
            .collect();
        ids.sort_by_key(|id| id.raw());
        Ok(ids)
    }

    fn is_minimized(&self, window: WindowId) -> Result<bool, SourceError> {
        self.windows
            .get(&window)
            .map(|&(_, minimized)| minimized)
            .ok_or(SourceError::WindowGone(window))
    }

    fn set_minimized(&mut self, window: WindowId, minimized: bool) -> Result<(), SourceError> {
        let entry = self.windows.get_mut(&window).ok_or(SourceError::WindowGone(window))?;
        entry.1 = minimized;
        Ok(())
    }

    fn title(&self, window: WindowId) -> Option<String> {
        self.windows.contains_key(&window).then(|| format!("Window {}", window))
    }

    fn subscribe_process(&mut self, process: &ProcessInfo) -> Result<ProcessId, SourceError> {
        self.live_subscriptions += 1;
        Ok(process.pid)
    }

    fn watch_window(&mut self, _subscription: &mut ProcessId, _window: WindowId) -> Result<(), SourceError> {
        Ok(())
    }

    fn unwatch_window(&mut self, _subscription: &mut ProcessId, _window: WindowId) {}

    fn watch_window_created(&mut self, _subscription: &mut ProcessId) -> Result<(), SourceError> {
        Ok(())
    }

    fn release_subscription(&mut self, _subscription: ProcessId) {
        self.live_subscriptions -= 1;
    }

    fn frontmost_app_id(&self) -> Option<String> {
        self.frontmost.clone()
    }

    fn activate(&mut self, _pid: ProcessId, _window: WindowId) -> Result<(), SourceError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeBackend {
    pub handler_installed: bool,
    pub bound: Vec<KeyCombo>,
    pub refuse: Option<KeyCombo>,
}

impl HotkeyBackend for FakeBackend {
    fn install_handler(&mut self) -> Result<(), HotkeyError> {
        self.handler_installed = true;
        Ok(())
    }

    fn remove_handler(&mut self) {
        self.handler_installed = false;
    }

    fn bind(&mut self, combo: KeyCombo) -> Result<(), HotkeyError> {
        if self.refuse == Some(combo) {
            return Err(HotkeyError::RegistrationFailed {
                combo,
                reason: "already registered by another application".to_string(),
            });
        }
        self.bound.push(combo);
        Ok(())
    }

    fn unbind(&mut self, combo: KeyCombo) {
        self.bound.retain(|c| *c != combo);
    }
}
