//! Unminimize Platform Win32
//!
//! Windows-specific window tracking using Win32 APIs.
//!
//! This crate handles:
//! - Process and window enumeration (the [`WindowSource`] for the tracker)
//! - Minimized state queries and restore via `IsIconic` / `ShowWindow`
//! - WinEvent hooks for minimize, foreground and window-creation events
//! - The global restore hotkey via `RegisterHotKey`
//!
//! [`WindowSource`]: unminimize_core::WindowSource

mod filter;
#[cfg(windows)]
mod hooks;
#[cfg(windows)]
mod hotkey;
#[cfg(windows)]
mod source;

pub use filter::{HookKind, WatchFilter};
#[cfg(windows)]
pub use hooks::{install_event_hooks, EventHookHandle, LIVENESS_INTERVAL_MS};
#[cfg(windows)]
pub use hotkey::Win32HotkeyBackend;
#[cfg(windows)]
pub use source::{Win32Subscription, Win32WindowSource};

use thiserror::Error;

/// Errors that can occur during Win32 operations.
#[derive(Debug, Error)]
pub enum Win32Error {
    #[error("Failed to install event hook: {0}")]
    HookInstallFailed(String),
}

/// Play the system warning sound.
///
/// Used when the hotkey is pressed but nothing can be restored.
#[cfg(windows)]
pub fn alert() {
    use windows::Win32::System::Diagnostics::Debug::MessageBeep;
    use windows::Win32::UI::WindowsAndMessaging::MB_ICONWARNING;

    if let Err(e) = unsafe { MessageBeep(MB_ICONWARNING) } {
        tracing::debug!("MessageBeep failed: {}", e);
    }
}

/// Play the system warning sound.
#[cfg(not(windows))]
pub fn alert() {
    tracing::debug!("Alert requested (no sound on this platform)");
}
