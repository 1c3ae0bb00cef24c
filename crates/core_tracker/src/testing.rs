//! In-memory window source and hotkey backend for unit tests.

use crate::hotkey::{HotkeyBackend, HotkeyError, KeyCombo};
use crate::{ProcessId, ProcessInfo, SourceError, WindowId, WindowSource};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub(crate) struct FakeWindow {
    pub pid: ProcessId,
    pub minimized: bool,
    pub title: Option<String>,
}

#[derive(Debug)]
pub(crate) struct FakeSubscription {
    pub id: u64,
    pub pid: ProcessId,
}

/// Simulated OS: processes, windows and subscription bookkeeping.
#[derive(Debug, Default)]
pub(crate) struct FakeSource {
    pub processes: HashMap<ProcessId, ProcessInfo>,
    pub windows: HashMap<WindowId, FakeWindow>,
    pub frontmost: Option<String>,
    next_subscription: u64,
    /// Live subscription id -> pid.
    pub live_subscriptions: HashMap<u64, ProcessId>,
    /// Every successful watch_window call, in order.
    pub window_watches: Vec<(ProcessId, WindowId)>,
    /// Every unwatch_window call, in order.
    pub window_unwatches: Vec<(ProcessId, WindowId)>,
    /// Every successful watch_window_created call, in order.
    pub created_watches: Vec<ProcessId>,
    pub activations: Vec<(ProcessId, WindowId)>,
    pub fail_subscribe: HashSet<ProcessId>,
    pub fail_windows: HashSet<ProcessId>,
    pub fail_watch: HashSet<WindowId>,
    pub reject_restore: HashSet<WindowId>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_app(&mut self, pid: ProcessId, app_id: &str) -> ProcessInfo {
        let info = ProcessInfo::regular(pid, app_id, app_id.to_uppercase());
        self.processes.insert(pid, info.clone());
        info
    }

    pub fn add_background(&mut self, pid: ProcessId, app_id: &str) -> ProcessInfo {
        let info = ProcessInfo {
            regular: false,
            ..ProcessInfo::regular(pid, app_id, app_id)
        };
        self.processes.insert(pid, info.clone());
        info
    }

    pub fn add_window(&mut self, pid: ProcessId, raw: u64, minimized: bool) -> WindowId {
        let id = WindowId(raw);
        self.windows.insert(
            id,
            FakeWindow {
                pid,
                minimized,
                title: Some(format!("Window {}", raw)),
            },
        );
        id
    }

    pub fn minimize(&mut self, window: WindowId) {
        if let Some(w) = self.windows.get_mut(&window) {
            w.minimized = true;
        }
    }

    pub fn close_window(&mut self, window: WindowId) {
        self.windows.remove(&window);
    }

    pub fn kill(&mut self, pid: ProcessId) {
        self.processes.remove(&pid);
        self.windows.retain(|_, w| w.pid != pid);
    }

    pub fn live_subscription_for(&self, pid: ProcessId) -> usize {
        self.live_subscriptions.values().filter(|&&p| p == pid).count()
    }

    pub fn watch_count(&self, window: WindowId) -> usize {
        self.window_watches.iter().filter(|(_, w)| *w == window).count()
    }
}

impl WindowSource for FakeSource {
    type Subscription = FakeSubscription;

    fn running_processes(&self) -> Result<Vec<ProcessInfo>, SourceError> {
        let mut processes: Vec<_> = self.processes.values().cloned().collect();
        processes.sort_by_key(|p| p.pid);
        Ok(processes)
    }

    fn process(&self, pid: ProcessId) -> Result<ProcessInfo, SourceError> {
        self.processes.get(&pid).cloned().ok_or(SourceError::ProcessGone(pid))
    }

    fn windows(&self, pid: ProcessId) -> Result<Vec<WindowId>, SourceError> {
        if self.fail_windows.contains(&pid) {
            return Err(SourceError::PermissionDenied);
        }
        if !self.processes.contains_key(&pid) {
            return Err(SourceError::ProcessGone(pid));
        }
        let mut ids: Vec<_> = self
            .windows
            .iter()
            .filter(|(_, w)| w.pid == pid)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_by_key(|id| id.raw());
        Ok(ids)
    }

    fn is_minimized(&self, window: WindowId) -> Result<bool, SourceError> {
        self.windows
            .get(&window)
            .map(|w| w.minimized)
            .ok_or(SourceError::WindowGone(window))
    }

    fn set_minimized(&mut self, window: WindowId, minimized: bool) -> Result<(), SourceError> {
        if self.reject_restore.contains(&window) {
            return Err(SourceError::AttributeRejected("refused".to_string()));
        }
        let w = self.windows.get_mut(&window).ok_or(SourceError::WindowGone(window))?;
        w.minimized = minimized;
        Ok(())
    }

    fn title(&self, window: WindowId) -> Option<String> {
        self.windows.get(&window).and_then(|w| w.title.clone())
    }

    fn subscribe_process(&mut self, process: &ProcessInfo) -> Result<FakeSubscription, SourceError> {
        if self.fail_subscribe.contains(&process.pid) {
            return Err(SourceError::SubscriptionFailed("denied".to_string()));
        }
        self.next_subscription += 1;
        let id = self.next_subscription;
        self.live_subscriptions.insert(id, process.pid);
        Ok(FakeSubscription { id, pid: process.pid })
    }

    fn watch_window(
        &mut self,
        subscription: &mut FakeSubscription,
        window: WindowId,
    ) -> Result<(), SourceError> {
        if self.fail_watch.contains(&window) {
            return Err(SourceError::SubscriptionFailed("watch refused".to_string()));
        }
        self.window_watches.push((subscription.pid, window));
        Ok(())
    }

    fn unwatch_window(&mut self, subscription: &mut FakeSubscription, window: WindowId) {
        self.window_unwatches.push((subscription.pid, window));
    }

    fn watch_window_created(&mut self, subscription: &mut FakeSubscription) -> Result<(), SourceError> {
        self.created_watches.push(subscription.pid);
        Ok(())
    }

    fn release_subscription(&mut self, subscription: FakeSubscription) {
        self.live_subscriptions.remove(&subscription.id);
    }

    fn frontmost_app_id(&self) -> Option<String> {
        self.frontmost.clone()
    }

    fn activate(&mut self, pid: ProcessId, window: WindowId) -> Result<(), SourceError> {
        self.activations.push((pid, window));
        Ok(())
    }
}

/// Simulated key-event dispatcher.
#[derive(Debug, Default)]
pub(crate) struct FakeHotkeyBackend {
    pub handler_installed: bool,
    pub handler_installs: usize,
    pub bound: Vec<KeyCombo>,
    pub refuse: HashSet<KeyCombo>,
}

impl FakeHotkeyBackend {
    /// Simulate a key press; returns whether the OS would deliver it.
    pub fn press(&self, combo: KeyCombo) -> bool {
        self.handler_installed && self.bound.contains(&combo)
    }
}

impl HotkeyBackend for FakeHotkeyBackend {
    fn install_handler(&mut self) -> Result<(), HotkeyError> {
        self.handler_installed = true;
        self.handler_installs += 1;
        Ok(())
    }

    fn remove_handler(&mut self) {
        self.handler_installed = false;
    }

    fn bind(&mut self, combo: KeyCombo) -> Result<(), HotkeyError> {
        if self.refuse.contains(&combo) {
            return Err(HotkeyError::RegistrationFailed {
                combo,
                reason: "already bound".to_string(),
            });
        }
        self.bound.push(combo);
        Ok(())
    }

    fn unbind(&mut self, combo: KeyCombo) {
        self.bound.retain(|c| *c != combo);
    }
}
