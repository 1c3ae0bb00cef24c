//! Unminimize Core
//!
//! Platform-agnostic engine that remembers which windows were minimized and
//! picks the one to bring back.
//!
//! This crate handles:
//! - Per-process notification subscriptions ([`ObservationRegistry`])
//! - The record of currently minimized windows ([`MinimizedWindowStore`])
//! - Reacting to window lifecycle events and restoring windows ([`WindowTracker`])
//! - The single global shortcut binding ([`HotkeyManager`])
//!
//! Everything OS-specific sits behind [`WindowSource`] and [`HotkeyBackend`].

mod event;
pub mod hotkey;
mod registry;
mod rules;
mod source;
mod store;
mod tracker;

#[cfg(test)]
mod testing;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use event::{EventOutcome, TrackerEvent};
pub use hotkey::{HotkeyBackend, HotkeyError, HotkeyManager, HotkeyState, KeyCombo, Modifiers};
pub use registry::{ObservationRegistry, ProcessSubscription};
pub use rules::AppRule;
pub use source::{SourceError, WindowSource};
pub use store::{MinimizedWindow, MinimizedWindowStore, Scope};
pub use tracker::{TrackerConfig, WindowTracker};

/// Opaque handle to a single OS window.
///
/// On Windows this carries the HWND value. Equality is identity of the
/// underlying OS object. The handle is borrowed: the window may be gone by
/// the time it is used, so every operation on it is fallible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowId(pub u64);

impl WindowId {
    /// The raw OS value behind this handle.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// OS process identifier.
pub type ProcessId = u32;

/// A running application as reported by the window source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Process ID.
    pub pid: ProcessId,
    /// Stable application identifier (bundle id, or executable path on Windows).
    pub app_id: String,
    /// Human-readable application name.
    pub display_name: String,
    /// Whether this is a foreground-capable application eligible for observation.
    pub regular: bool,
}

impl ProcessInfo {
    /// Create info for a regular, foreground-capable application.
    pub fn regular(pid: ProcessId, app_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            pid,
            app_id: app_id.into(),
            display_name: display_name.into(),
            regular: true,
        }
    }
}
