//! Daemon state owned by the event loop.
//!
//! Everything here runs on the event-loop task, the single control thread:
//! the tracker, its store and registry, and the hotkey manager are never
//! touched from anywhere else.

use crate::config::{Config, ScopeConfig};
use std::time::Instant;
use tracing::{debug, info, warn};
use unminimize_core::{
    EventOutcome, HotkeyBackend, HotkeyManager, KeyCombo, MinimizedWindow, Scope, TrackerEvent,
    WindowSource, WindowTracker,
};
use unminimize_ipc::{IpcCommand, IpcResponse, IpcScope, MinimizedWindowInfo};

/// Application state: tracker, hotkey and configuration.
pub struct AppState<S: WindowSource, B: HotkeyBackend> {
    tracker: WindowTracker<S>,
    hotkey: HotkeyManager<B>,
    config: Config,
    hotkey_suspended: bool,
    start_time: Instant,
}

impl<S: WindowSource, B: HotkeyBackend> AppState<S, B> {
    /// Create state with a stopped tracker and no hotkey bound.
    pub fn new(source: S, backend: B, config: Config) -> Self {
        Self {
            tracker: WindowTracker::new(source, config.tracker_config()),
            hotkey: HotkeyManager::new(backend),
            config,
            hotkey_suspended: false,
            start_time: Instant::now(),
        }
    }

    /// Start tracking and register the configured hotkey.
    pub fn start(&mut self) -> usize {
        let observed = self.tracker.start();
        self.setup_hotkey();
        observed
    }

    /// Stop tracking and release the hotkey. Runs before the daemon exits.
    pub fn shutdown(&mut self) {
        self.tracker.stop();
        self.hotkey.clear();
        info!(
            "State torn down after {}s",
            self.start_time.elapsed().as_secs()
        );
    }

    /// Feed an OS or hotkey event to the tracker.
    pub fn handle_tracker_event(&mut self, event: TrackerEvent) -> EventOutcome {
        if event == TrackerEvent::HotkeyPressed && !self.hotkey.is_registered() {
            // A press queued before the key was released
            debug!("Dropping hotkey press while unregistered");
            return EventOutcome::Ignored;
        }
        self.tracker.handle_event(event)
    }

    /// Whether a restore would find a window right now.
    pub fn has_restore_candidate(&self) -> bool {
        self.tracker.most_recent_minimized(self.scope()).is_some()
    }

    /// Configured restore scope.
    pub fn scope(&self) -> Scope {
        self.config.behavior.scope.into()
    }

    /// Whether the hotkey is suspended.
    pub fn is_hotkey_suspended(&self) -> bool {
        self.hotkey_suspended
    }

    /// Current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The tracker.
    pub fn tracker(&self) -> &WindowTracker<S> {
        &self.tracker
    }

    /// The hotkey manager.
    pub fn hotkey(&self) -> &HotkeyManager<B> {
        &self.hotkey
    }

    /// Replace the configuration and apply it live.
    ///
    /// The tracker picks up the new scope and ignore rules; the hotkey is
    /// re-registered if it changed.
    pub fn apply_config(&mut self, config: Config) {
        self.config = config;
        self.tracker.update_config(self.config.tracker_config());
        self.setup_hotkey();
        info!("Configuration applied");
    }

    /// Register the hotkey from config unless suspended or disabled.
    fn setup_hotkey(&mut self) {
        let combo = match self.config.hotkey.combo() {
            Ok(Some(combo)) => combo,
            Ok(None) => {
                info!("Global hotkey disabled by config (hotkey.enabled = false)");
                self.hotkey.clear();
                return;
            }
            Err(e) => {
                warn!("Invalid hotkey in config: {}. Global hotkey disabled.", e);
                self.hotkey.clear();
                return;
            }
        };

        if self.hotkey_suspended {
            debug!("Hotkey suspended, {} applies on resume", combo);
            return;
        }
        if self.hotkey.current() == Some(combo) {
            return;
        }
        if let Err(e) = self.hotkey.register(combo) {
            warn!("Failed to register hotkey {}: {}. Global hotkey disabled.", combo, e);
        }
    }

    /// The combination the config asks for, if valid and enabled.
    fn configured_combo(&self) -> Option<KeyCombo> {
        self.config.hotkey.combo().ok().flatten()
    }

    /// Handle an IPC command.
    ///
    /// `Stop` only acknowledges; the connection handler triggers shutdown
    /// once the reply has been written.
    pub fn handle_command(&mut self, cmd: IpcCommand) -> IpcResponse {
        match cmd {
            IpcCommand::RestoreLatest { scope } => {
                let scope = scope.map(Scope::from_ipc).unwrap_or_else(|| self.scope());
                match self.tracker.restore_most_recent(scope) {
                    EventOutcome::Restored(record) => IpcResponse::Restored {
                        window: window_info(&record),
                    },
                    EventOutcome::RestoreFailed(record) => IpcResponse::error(format!(
                        "Failed to restore window {} of {}",
                        record.window, record.app_name
                    )),
                    _ => IpcResponse::error("No minimized window to restore"),
                }
            }
            IpcCommand::QueryLatest { scope } => {
                let scope = scope.map(Scope::from_ipc).unwrap_or_else(|| self.scope());
                IpcResponse::Window {
                    window: self.tracker.most_recent_minimized(scope).map(window_info),
                }
            }
            IpcCommand::ListMinimized => IpcResponse::WindowList {
                windows: self.tracker.minimized_windows().into_iter().map(window_info).collect(),
            },
            IpcCommand::Status => IpcResponse::Status {
                tracking: self.tracker.is_running(),
                observed_processes: self.tracker.observed_process_count(),
                minimized_windows: self.tracker.store().len(),
                scope: self.scope().to_ipc(),
                hotkey: if self.hotkey_suspended {
                    self.configured_combo()
                } else {
                    self.hotkey.current()
                }
                .map(|combo| combo.to_string()),
                hotkey_suspended: self.hotkey_suspended,
            },
            IpcCommand::SuspendHotkey => {
                self.hotkey.suspend();
                self.hotkey_suspended = true;
                info!("Hotkey suspended");
                IpcResponse::Ok
            }
            IpcCommand::ResumeHotkey => {
                if !self.hotkey_suspended {
                    return IpcResponse::Ok;
                }
                self.hotkey_suspended = false;
                let result = match self.config.hotkey.combo() {
                    // Unchanged while suspended: bring back the last binding
                    Ok(Some(combo)) if self.hotkey.last_combo() == Some(combo) => self.hotkey.resume(),
                    Ok(Some(combo)) => self.hotkey.register(combo),
                    Ok(None) => return IpcResponse::Ok,
                    Err(e) => return IpcResponse::error(e.to_string()),
                };
                match result {
                    Ok(()) => {
                        info!("Hotkey resumed");
                        IpcResponse::Ok
                    }
                    Err(e) => IpcResponse::error(e.to_string()),
                }
            }
            IpcCommand::SetHotkey { shortcut } => self.set_hotkey(&shortcut),
            IpcCommand::SetScope { scope } => {
                self.config.behavior.scope = ScopeConfig::from(Scope::from_ipc(scope));
                self.tracker.update_config(self.config.tracker_config());
                info!("Scope set to {:?}", self.config.behavior.scope);
                IpcResponse::Ok
            }
            IpcCommand::Rescan => {
                let observed = self.tracker.rescan();
                info!("Rescan: {} processes observed", observed);
                IpcResponse::Ok
            }
            IpcCommand::Reload => match Config::load() {
                Ok(mut config) => {
                    for w in config.validate() {
                        warn!("Config: {} - {}", w.field, w.message);
                    }
                    self.apply_config(config);
                    IpcResponse::Ok
                }
                Err(e) => IpcResponse::error(format!("Failed to reload config: {:#}", e)),
            },
            IpcCommand::Stop => {
                info!("Stop requested");
                IpcResponse::Ok
            }
        }
    }

    fn set_hotkey(&mut self, shortcut: &str) -> IpcResponse {
        let combo: KeyCombo = match shortcut.parse() {
            Ok(combo) => combo,
            Err(e) => return IpcResponse::error(e.to_string()),
        };

        self.config.hotkey.enabled = true;
        self.config.hotkey.shortcut = combo.to_string();
        self.config.hotkey.key_code = None;
        self.config.hotkey.modifiers = None;

        if self.hotkey_suspended {
            return IpcResponse::Ok;
        }

        match self.hotkey.register(combo) {
            Ok(()) => IpcResponse::Ok,
            Err(e) => IpcResponse::error(e.to_string()),
        }
    }
}

/// Conversions between the tracker's scope and the wire scope.
trait IpcScopeExt {
    fn from_ipc(scope: IpcScope) -> Self;
    fn to_ipc(self) -> IpcScope;
}

impl IpcScopeExt for Scope {
    fn from_ipc(scope: IpcScope) -> Self {
        match scope {
            IpcScope::AnyApplication => Scope::AnyApplication,
            IpcScope::ActiveApplication => Scope::ActiveApplicationOnly,
        }
    }

    fn to_ipc(self) -> IpcScope {
        match self {
            Scope::AnyApplication => IpcScope::AnyApplication,
            Scope::ActiveApplicationOnly => IpcScope::ActiveApplication,
        }
    }
}

fn window_info(record: &MinimizedWindow) -> MinimizedWindowInfo {
    MinimizedWindowInfo {
        window_id: record.window.raw(),
        pid: record.pid,
        app_id: record.app_id.clone(),
        app_name: record.app_name.clone(),
        title: record.title.clone(),
        minimized_secs_ago: record.minimized_at.elapsed().as_secs(),
    }
}
