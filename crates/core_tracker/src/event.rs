use crate::{MinimizedWindow, ProcessId, WindowId};

/// Everything the tracker reacts to, delivered through
/// [`WindowTracker::handle_event`](crate::WindowTracker::handle_event).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// A watched window was minimized.
    WindowMinimized { pid: ProcessId, window: WindowId },
    /// A watched window was restored from the minimized state.
    WindowDeminimized { pid: ProcessId, window: WindowId },
    /// A watched process created a new window.
    WindowCreated { pid: ProcessId, window: WindowId },
    /// A process was launched.
    ProcessLaunched(ProcessId),
    /// A process terminated.
    ProcessTerminated(ProcessId),
    /// A process became the frontmost application.
    ProcessActivated(ProcessId),
    /// The global restore shortcut was pressed.
    HotkeyPressed,
}

/// What handling a [`TrackerEvent`] amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Tracker state was updated.
    Handled,
    /// Nothing to do (duplicate, unknown process, or tracker stopped).
    Ignored,
    /// A window was restored.
    Restored(MinimizedWindow),
    /// A restore was requested but no candidate window exists.
    NothingToRestore,
    /// The candidate window could not be restored; its record was kept.
    RestoreFailed(MinimizedWindow),
}

impl EventOutcome {
    /// Whether the user should hear the failure alert.
    pub fn needs_alert(&self) -> bool {
        matches!(self, Self::NothingToRestore | Self::RestoreFailed(_))
    }
}
