//! Unminimize Daemon
//!
//! Background process that remembers minimized windows and brings the most
//! recent one back on a global hotkey.
//!
//! Responsibilities:
//! - Track minimized windows from WinEvent notifications
//! - Register the global restore hotkey
//! - Handle IPC commands from the CLI
//! - System tray icon and menu
//!
//! The event loop in `main` is the only place tracker and hotkey state is
//! touched. Hook, hotkey and tray threads feed it through channels.

#![cfg_attr(not(windows), allow(dead_code))]

mod config;
mod server;
mod state;
#[cfg(test)]
mod testing;
#[cfg(windows)]
mod tray;

use anyhow::Result;
use config::Config;
use tokio::sync::{mpsc, oneshot};
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;
use unminimize_core::TrackerEvent;
use unminimize_ipc::{IpcCommand, IpcResponse};

/// Events that the daemon event loop processes.
enum DaemonEvent {
    /// A window, process or hotkey event for the tracker.
    Tracker(TrackerEvent),
    /// An IPC command from a CLI client.
    Ipc {
        cmd: IpcCommand,
        responder: oneshot::Sender<IpcResponse>,
    },
    /// A tray menu event.
    #[cfg(windows)]
    Tray(tray::TrayEvent),
    /// Shutdown signal.
    Shutdown,
}

/// Load configuration, falling back to defaults.
///
/// Runs before logging is set up, so problems go to stderr.
fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {:#}. Using defaults.", e);
        Config::default()
    })
}

/// Install the global tracing subscriber with the configured log level.
fn init_logging(config: &Config) -> Result<()> {
    let log_level = match config.behavior.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn log_config_warnings(config: &mut Config) {
    for w in config.validate() {
        warn!("Config: {} - {}", w.field, w.message);
    }
}

/// Spawn a named forwarding thread that receives events from a std::sync::mpsc channel
/// and forwards them to a tokio mpsc sender. Returns the JoinHandle for graceful shutdown.
fn spawn_forwarding_thread<T: Send + 'static>(
    name: &str,
    receiver: std::sync::mpsc::Receiver<T>,
    sender: mpsc::Sender<DaemonEvent>,
    map_fn: impl Fn(T) -> DaemonEvent + Send + 'static,
) -> Result<std::thread::JoinHandle<()>> {
    let thread_name = name.to_string();
    std::thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            while let Ok(event) = receiver.recv() {
                if sender.blocking_send(map_fn(event)).is_err() {
                    break; // Channel closed, daemon shutting down
                }
            }
        })
        .map_err(|e| anyhow::anyhow!("Failed to spawn {} thread: {}", thread_name, e))
}

#[cfg(windows)]
#[tokio::main]
async fn main() -> Result<()> {
    use state::AppState;
    use std::sync::Arc;
    use tracing::{debug, error, info};
    use unminimize_ipc::PIPE_NAME;
    use unminimize_platform_win32::{alert, install_event_hooks, WatchFilter, Win32HotkeyBackend, Win32WindowSource};

    let mut config = load_config();
    init_logging(&config)?;
    log_config_warnings(&mut config);

    info!("Unminimize daemon starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if server::check_already_running().await {
        error!("Another unminimize daemon is already running (pipe {} is active)", PIPE_NAME);
        return Ok(());
    }

    info!(
        "Configuration loaded: scope={:?}, hotkey={}, ignore_rules={}, log_level={}",
        config.behavior.scope,
        if config.hotkey.enabled { config.hotkey.shortcut.as_str() } else { "disabled" },
        config.ignore.len(),
        config.behavior.log_level
    );

    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(100);

    // Collect forwarding thread handles for graceful shutdown
    let mut thread_handles: Vec<std::thread::JoinHandle<()>> = Vec::new();

    let filter = Arc::new(WatchFilter::new());

    // Without hooks nothing is learned about minimizes; the hotkey still
    // restores windows that were already minimized at startup.
    let hook_handle = match install_event_hooks(filter.clone()) {
        Ok((handle, event_receiver)) => {
            info!("WinEvent hooks installed");
            match spawn_forwarding_thread("winevent-fwd", event_receiver, event_tx.clone(), DaemonEvent::Tracker) {
                Ok(handle) => thread_handles.push(handle),
                Err(e) => warn!("{}", e),
            }
            Some(handle)
        }
        Err(e) => {
            warn!("Failed to install WinEvent hooks: {}. Live window tracking disabled.", e);
            None
        }
    };

    let (hotkey_tx, hotkey_rx) = std::sync::mpsc::channel::<TrackerEvent>();
    match spawn_forwarding_thread("hotkey-fwd", hotkey_rx, event_tx.clone(), DaemonEvent::Tracker) {
        Ok(handle) => thread_handles.push(handle),
        Err(e) => warn!("{}", e),
    }

    let mut state = AppState::new(
        Win32WindowSource::new(filter),
        Win32HotkeyBackend::new(hotkey_tx),
        config,
    );
    let observed = state.start();
    info!(
        "Observing {} applications, {} windows already minimized",
        observed,
        state.tracker().store().len()
    );

    // Initialize system tray icon. The menu thread blocks on the global menu
    // channel for the life of the process, so its forwarder is not joined.
    let mut tray_manager = {
        let (tray_sync_tx, tray_sync_rx) = std::sync::mpsc::channel();
        if let Err(e) = spawn_forwarding_thread("tray-fwd", tray_sync_rx, event_tx.clone(), DaemonEvent::Tray) {
            warn!("{}", e);
        }
        match tray::TrayManager::new(tray_sync_tx) {
            Ok(manager) => {
                info!("System tray icon initialized");
                Some(manager)
            }
            Err(e) => {
                warn!("Failed to create system tray icon: {}. Tray disabled.", e);
                None
            }
        }
    };
    refresh_tray(&mut tray_manager, &state);

    let ipc_tx = event_tx.clone();
    tokio::spawn(async move {
        server::run_ipc_server(ipc_tx).await;
    });
    info!("IPC server listening on {}", PIPE_NAME);

    // Install Ctrl+C handler so terminal kill triggers graceful shutdown
    {
        let shutdown_tx = event_tx.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Ctrl+C received, initiating shutdown...");
                let _ = shutdown_tx.send(DaemonEvent::Shutdown).await;
            }
        });
    }

    info!("Ready. Use unminimize-cli to send commands.");

    while let Some(event) = event_rx.recv().await {
        match event {
            DaemonEvent::Tracker(tracker_event) => {
                let outcome = state.handle_tracker_event(tracker_event);
                if outcome.needs_alert() {
                    alert();
                }
            }
            DaemonEvent::Ipc { cmd, responder } => {
                let response = state.handle_command(cmd);
                if responder.send(response).is_err() {
                    debug!("Client disconnected before receiving IPC response");
                }
            }
            DaemonEvent::Tray(tray_event) => {
                let Some(cmd) = tray_command(tray_event, &state) else {
                    match tray_event {
                        tray::TrayEvent::OpenConfig => open_config(),
                        tray::TrayEvent::Exit => {
                            info!("Tray: Exit requested");
                            break;
                        }
                        _ => {}
                    }
                    continue;
                };
                info!("Tray: {:?}", tray_event);
                if let IpcResponse::Error { message } = state.handle_command(cmd) {
                    warn!("Tray command failed: {}", message);
                    if tray_event == tray::TrayEvent::RestoreLast {
                        alert();
                    }
                }
            }
            DaemonEvent::Shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
        refresh_tray(&mut tray_manager, &state);
    }

    state.shutdown();
    // Dropping the state stops the hotkey thread, dropping the hook handle
    // stops the hook thread; their forwarders then see closed channels.
    drop(state);
    drop(hook_handle);
    drop(event_rx);

    info!("Waiting for forwarding threads to exit...");
    for handle in thread_handles {
        let _ = handle.join();
    }

    info!("Unminimize daemon shutting down.");
    Ok(())
}

/// The IPC command a tray click stands for, if any.
#[cfg(windows)]
fn tray_command<S, B>(event: tray::TrayEvent, state: &state::AppState<S, B>) -> Option<IpcCommand>
where
    S: unminimize_core::WindowSource,
    B: unminimize_core::HotkeyBackend,
{
    use tray::TrayEvent;
    use unminimize_core::Scope;
    use unminimize_ipc::IpcScope;

    Some(match event {
        TrayEvent::RestoreLast => IpcCommand::RestoreLatest { scope: None },
        TrayEvent::ToggleScope => IpcCommand::SetScope {
            scope: match state.scope() {
                Scope::AnyApplication => IpcScope::ActiveApplication,
                Scope::ActiveApplicationOnly => IpcScope::AnyApplication,
            },
        },
        TrayEvent::ToggleSuspend if state.is_hotkey_suspended() => IpcCommand::ResumeHotkey,
        TrayEvent::ToggleSuspend => IpcCommand::SuspendHotkey,
        TrayEvent::Rescan => IpcCommand::Rescan,
        TrayEvent::Reload => IpcCommand::Reload,
        TrayEvent::OpenConfig | TrayEvent::Exit => return None,
    })
}

#[cfg(windows)]
fn refresh_tray<S, B>(tray: &mut Option<tray::TrayManager>, state: &state::AppState<S, B>)
where
    S: unminimize_core::WindowSource,
    B: unminimize_core::HotkeyBackend,
{
    if let Some(tray) = tray {
        tray.update(tray::TrayStatus {
            can_restore: state.has_restore_candidate(),
            current_app_only: state.scope() == unminimize_core::Scope::ActiveApplicationOnly,
            suspended: state.is_hotkey_suspended(),
        });
    }
}

/// Open the config file in the default editor, creating it if missing.
#[cfg(windows)]
fn open_config() {
    use tracing::info;

    let Some(config_path) = config::preferred_config_path() else {
        warn!("No config directory available");
        return;
    };
    if !config_path.exists() {
        if let Err(e) = config::write_default_config(&config_path) {
            warn!("Failed to create {}: {:#}", config_path.display(), e);
            return;
        }
    }
    info!("Tray: Opening {}", config_path.display());
    if let Err(e) = std::process::Command::new("cmd")
        .args(["/c", "start", ""])
        .arg(&config_path)
        .spawn()
    {
        warn!("Failed to open config: {}", e);
    }
}

#[cfg(not(windows))]
fn main() -> Result<()> {
    let mut config = load_config();
    init_logging(&config)?;
    log_config_warnings(&mut config);
    tracing::error!("Unminimize needs Win32 window hooks; this platform is not supported");
    anyhow::bail!("unsupported platform")
}
