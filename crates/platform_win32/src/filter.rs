//! Shared watch list consulted by the hook thread.
//!
//! Subscriptions handed out by the window source are entries here. The hook
//! callback runs on its own thread, so the state sits behind a mutex; every
//! critical section is a handful of map operations.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use unminimize_core::{ProcessId, TrackerEvent, WindowId};

#[derive(Debug)]
struct Watch {
    pid: ProcessId,
    windows: HashSet<WindowId>,
    created: bool,
}

#[derive(Debug, Default)]
struct FilterState {
    next_id: u64,
    watches: HashMap<u64, Watch>,
}

/// Which processes and windows currently have subscribers.
#[derive(Debug, Default)]
pub struct WatchFilter {
    state: Mutex<FilterState>,
}

impl WatchFilter {
    /// Create an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FilterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a subscription for `pid` and return its id.
    pub fn subscribe(&self, pid: ProcessId) -> u64 {
        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.watches.insert(
            id,
            Watch {
                pid,
                windows: HashSet::new(),
                created: false,
            },
        );
        id
    }

    /// Remove a subscription. Returns false for unknown ids.
    pub fn release(&self, id: u64) -> bool {
        self.lock().watches.remove(&id).is_some()
    }

    /// Deliver minimize/deminimize for `window` to subscription `id`.
    pub fn watch_window(&self, id: u64, window: WindowId) -> bool {
        match self.lock().watches.get_mut(&id) {
            Some(watch) => {
                watch.windows.insert(window);
                true
            }
            None => false,
        }
    }

    /// Stop delivering state changes of `window` to subscription `id`.
    pub fn unwatch_window(&self, id: u64, window: WindowId) -> bool {
        self.lock()
            .watches
            .get_mut(&id)
            .is_some_and(|watch| watch.windows.remove(&window))
    }

    /// Deliver window-created notifications to subscription `id`.
    pub fn watch_created(&self, id: u64) -> bool {
        match self.lock().watches.get_mut(&id) {
            Some(watch) => {
                watch.created = true;
                true
            }
            None => false,
        }
    }

    /// Whether any subscription exists for `pid`.
    pub fn is_process_watched(&self, pid: ProcessId) -> bool {
        self.lock().watches.values().any(|w| w.pid == pid)
    }

    /// Whether `window` of `pid` is registered for state changes.
    pub fn is_window_watched(&self, pid: ProcessId, window: WindowId) -> bool {
        self.lock()
            .watches
            .values()
            .any(|w| w.pid == pid && w.windows.contains(&window))
    }

    /// Whether `pid` wants window-created notifications.
    pub fn wants_created(&self, pid: ProcessId) -> bool {
        self.lock().watches.values().any(|w| w.pid == pid && w.created)
    }

    /// Distinct pids with at least one subscription.
    pub fn watched_pids(&self) -> Vec<ProcessId> {
        let state = self.lock();
        let mut pids: Vec<_> = state.watches.values().map(|w| w.pid).collect();
        pids.sort_unstable();
        pids.dedup();
        pids
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.lock().watches.len()
    }

    /// Check if there are no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.lock().watches.is_empty()
    }

    /// Map a raw hook notification to a tracker event.
    ///
    /// `top_level` tells whether the window is an eligible top-level window,
    /// which is the only kind that can announce an unseen process.
    pub fn classify(
        &self,
        kind: HookKind,
        pid: ProcessId,
        window: WindowId,
        top_level: bool,
    ) -> Option<TrackerEvent> {
        let process_watched = self.is_process_watched(pid);
        match kind {
            HookKind::Foreground if process_watched => Some(TrackerEvent::ProcessActivated(pid)),
            HookKind::MinimizeStart if self.is_window_watched(pid, window) => {
                Some(TrackerEvent::WindowMinimized { pid, window })
            }
            // Known process, window we have not registered yet: re-scan it
            HookKind::MinimizeStart if process_watched => Some(TrackerEvent::WindowCreated { pid, window }),
            HookKind::MinimizeEnd if self.is_window_watched(pid, window) => {
                Some(TrackerEvent::WindowDeminimized { pid, window })
            }
            HookKind::MinimizeEnd => None,
            HookKind::Shown if process_watched => self
                .wants_created(pid)
                .then_some(TrackerEvent::WindowCreated { pid, window }),
            _ if !process_watched && top_level => Some(TrackerEvent::ProcessLaunched(pid)),
            _ => None,
        }
    }
}

/// WinEvent kinds the hook thread listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// `EVENT_SYSTEM_FOREGROUND`
    Foreground,
    /// `EVENT_SYSTEM_MINIMIZESTART`
    MinimizeStart,
    /// `EVENT_SYSTEM_MINIMIZEEND`
    MinimizeEnd,
    /// `EVENT_OBJECT_CREATE` or `EVENT_OBJECT_SHOW`
    Shown,
}
