//! Window tracker: keeps the minimized-window store in sync with OS events.
//!
//! A window's state is implicit in store membership: absent means
//! unminimized, present means minimized. All mutation happens through
//! [`WindowTracker::handle_event`] and [`WindowTracker::restore`], which must
//! be called from a single control thread.

use crate::{
    AppRule, EventOutcome, MinimizedWindow, MinimizedWindowStore, ObservationRegistry, ProcessId,
    ProcessInfo, Scope, SourceError, TrackerEvent, WindowId, WindowSource,
};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Tracker settings, supplied by the settings owner.
#[derive(Debug, Clone, Default)]
pub struct TrackerConfig {
    /// Scope used when the hotkey is pressed.
    pub scope: Scope,
    /// Applications that are never observed.
    pub ignore_rules: Vec<AppRule>,
}

/// Reacts to window lifecycle events and answers "which window next".
pub struct WindowTracker<S: WindowSource> {
    source: S,
    registry: ObservationRegistry<S::Subscription>,
    store: MinimizedWindowStore,
    config: TrackerConfig,
    running: bool,
}

impl<S: WindowSource> WindowTracker<S> {
    /// Create a stopped tracker.
    pub fn new(source: S, config: TrackerConfig) -> Self {
        Self {
            source,
            registry: ObservationRegistry::new(),
            store: MinimizedWindowStore::new(),
            config,
            running: false,
        }
    }

    /// Start tracking: observe every running application.
    ///
    /// Returns the number of observed processes. Calling it again while
    /// running does nothing.
    pub fn start(&mut self) -> usize {
        if self.running {
            return self.registry.len();
        }
        self.running = true;
        self.rescan();
        info!(
            "Tracking started: {} processes observed, {} windows already minimized",
            self.registry.len(),
            self.store.len()
        );
        self.registry.len()
    }

    /// Stop tracking and release every subscription before returning.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        let released = self.registry.unobserve_all(&mut self.source);
        self.store.clear();
        self.running = false;
        info!("Tracking stopped: released {} subscriptions", released);
    }

    /// Re-observe every running application. Returns the observed count.
    pub fn rescan(&mut self) -> usize {
        if !self.running {
            return 0;
        }
        match self.source.running_processes() {
            Ok(processes) => {
                for process in &processes {
                    self.observe_process(process);
                }
            }
            Err(e) => warn!("Failed to enumerate running processes: {}", e),
        }
        self.registry.len()
    }

    /// Single ingress for every OS notification and the hotkey press.
    pub fn handle_event(&mut self, event: TrackerEvent) -> EventOutcome {
        if !self.running && event != TrackerEvent::HotkeyPressed {
            debug!("Tracker stopped, ignoring {:?}", event);
            return EventOutcome::Ignored;
        }

        match event {
            TrackerEvent::WindowMinimized { pid, window } => self.on_minimized(pid, window),
            TrackerEvent::WindowDeminimized { window, .. } => {
                if self.store.remove(window).is_some() {
                    debug!("Window {} deminimized", window);
                    EventOutcome::Handled
                } else {
                    EventOutcome::Ignored
                }
            }
            TrackerEvent::WindowCreated { pid, .. }
            | TrackerEvent::ProcessLaunched(pid)
            | TrackerEvent::ProcessActivated(pid) => self.observe_pid(pid),
            TrackerEvent::ProcessTerminated(pid) => self.on_terminated(pid),
            TrackerEvent::HotkeyPressed => self.restore_most_recent(self.config.scope),
        }
    }

    /// The window that should be restored next under `scope`.
    ///
    /// For [`Scope::ActiveApplicationOnly`] the frontmost application is
    /// queried now; there is no fallback to other applications.
    pub fn most_recent_minimized(&self, scope: Scope) -> Option<&MinimizedWindow> {
        match scope {
            Scope::AnyApplication => self.store.most_recent(),
            Scope::ActiveApplicationOnly => {
                let app_id = self.source.frontmost_app_id()?;
                self.store.most_recent_for_app(&app_id)
            }
        }
    }

    /// Restore a window and bring its application to the front.
    ///
    /// On success the record is removed. On failure the store is left
    /// untouched, so the same record may surface again.
    pub fn restore(&mut self, record: &MinimizedWindow) -> Result<(), SourceError> {
        self.source.set_minimized(record.window, false)?;
        if let Err(e) = self.source.activate(record.pid, record.window) {
            warn!("Restored window {} but failed to activate {}: {}", record.window, record.app_name, e);
        }
        self.store.remove(record.window);
        info!(
            "Restored window {} of {} ({})",
            record.window,
            record.app_name,
            record.title.as_deref().unwrap_or("untitled")
        );
        Ok(())
    }

    /// Restore the most recent window under `scope`.
    pub fn restore_most_recent(&mut self, scope: Scope) -> EventOutcome {
        let Some(record) = self.most_recent_minimized(scope).cloned() else {
            debug!("No minimized window to restore ({:?})", scope);
            return EventOutcome::NothingToRestore;
        };
        match self.restore(&record) {
            Ok(()) => EventOutcome::Restored(record),
            Err(e) => {
                warn!("Failed to restore window {} of {}: {}", record.window, record.app_name, e);
                EventOutcome::RestoreFailed(record)
            }
        }
    }

    /// Replace the configuration. Processes that are now ignored are dropped.
    pub fn update_config(&mut self, config: TrackerConfig) {
        self.config = config;
        let ignored: Vec<ProcessInfo> = self
            .registry
            .pids()
            .into_iter()
            .filter_map(|pid| self.registry.process(pid).cloned())
            .filter(|process| self.is_ignored(process))
            .collect();
        for process in ignored {
            self.forget_process(&process);
            info!("Stopped observing ignored application {}", process.display_name);
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Whether the tracker is started.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// All minimized windows, most recent first.
    pub fn minimized_windows(&self) -> Vec<&MinimizedWindow> {
        self.store.newest_first()
    }

    /// Number of observed processes.
    pub fn observed_process_count(&self) -> usize {
        self.registry.len()
    }

    /// The minimized window store.
    pub fn store(&self) -> &MinimizedWindowStore {
        &self.store
    }

    /// The observation registry.
    pub fn registry(&self) -> &ObservationRegistry<S::Subscription> {
        &self.registry
    }

    /// The window source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The window source, mutably.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    fn on_minimized(&mut self, pid: ProcessId, window: WindowId) -> EventOutcome {
        if self.store.contains(window) {
            debug!("Window {} already recorded as minimized", window);
            return EventOutcome::Ignored;
        }
        let Some(process) = self.registry.process(pid).cloned() else {
            debug!("Minimize of window {} from unobserved pid {}", window, pid);
            return EventOutcome::Ignored;
        };
        let title = self.source.title(window);
        self.store
            .insert(MinimizedWindow::new(window, &process, title, Instant::now()));
        debug!("Window {} of {} minimized", window, process.display_name);
        EventOutcome::Handled
    }

    fn on_terminated(&mut self, pid: ProcessId) -> EventOutcome {
        let Some(process) = self.registry.process(pid).cloned() else {
            return EventOutcome::Ignored;
        };
        let removed = self.forget_process(&process);
        info!(
            "{} (pid {}) terminated, dropped {} minimized window(s)",
            process.display_name, pid, removed
        );
        EventOutcome::Handled
    }

    /// Drop all records of the process's application and its subscription.
    ///
    /// Other processes may share the application id. Their purged windows
    /// are unregistered so the next observe re-records the ones still
    /// minimized.
    fn forget_process(&mut self, process: &ProcessInfo) -> usize {
        let removed: Vec<WindowId> = self
            .store
            .remove_app(&process.app_id)
            .into_iter()
            .map(|record| record.window)
            .collect();
        self.registry.unobserve(&mut self.source, process.pid);
        self.registry.forget_windows(&removed);
        removed.len()
    }

    fn observe_pid(&mut self, pid: ProcessId) -> EventOutcome {
        match self.source.process(pid) {
            Ok(process) => self.observe_process(&process),
            Err(e) => {
                debug!("Cannot observe pid {}: {}", pid, e);
                EventOutcome::Ignored
            }
        }
    }

    fn observe_process(&mut self, process: &ProcessInfo) -> EventOutcome {
        if !process.regular {
            return EventOutcome::Ignored;
        }
        if self.is_ignored(process) {
            debug!("Ignoring {} by rule", process.display_name);
            return EventOutcome::Ignored;
        }
        match self.registry.observe(&mut self.source, &mut self.store, process) {
            Ok(_) => EventOutcome::Handled,
            Err(e) => {
                warn!(
                    "Failed to observe {} (pid {}): {}. Will retry on next activation.",
                    process.display_name, process.pid, e
                );
                EventOutcome::Ignored
            }
        }
    }

    fn is_ignored(&self, process: &ProcessInfo) -> bool {
        self.config.ignore_rules.iter().any(|rule| rule.matches(process))
    }
}

impl<S: WindowSource> Drop for WindowTracker<S> {
    fn drop(&mut self) {
        self.stop();
    }
}
