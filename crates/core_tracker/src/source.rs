//! The Window Notification Source: the OS side of window tracking.

use crate::{ProcessId, ProcessInfo, WindowId};
use thiserror::Error;

/// Errors reported by a [`WindowSource`].
///
/// None of these are fatal to the tracker; they leave the affected process
/// or window unobserved until the next re-scan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("Window introspection permission denied")]
    PermissionDenied,

    #[error("Process {0} is no longer running")]
    ProcessGone(ProcessId),

    #[error("Window {0} no longer exists")]
    WindowGone(WindowId),

    #[error("Failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    #[error("Window attribute change rejected: {0}")]
    AttributeRejected(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),
}

/// Access to processes, windows and lifecycle notifications of the host OS.
///
/// The tracker owns the source and calls it only from the control thread.
/// Notifications themselves arrive separately, as
/// [`TrackerEvent`](crate::TrackerEvent)s fed into
/// [`WindowTracker::handle_event`](crate::WindowTracker::handle_event).
pub trait WindowSource {
    /// Handle granting notification delivery for one process.
    type Subscription;

    /// Enumerate running processes.
    fn running_processes(&self) -> Result<Vec<ProcessInfo>, SourceError>;

    /// Look up a single process.
    fn process(&self, pid: ProcessId) -> Result<ProcessInfo, SourceError>;

    /// Enumerate the current windows of a process.
    ///
    /// Windows found already minimized are recorded in this order with one
    /// shared timestamp, so the last one listed counts as most recent.
    fn windows(&self, pid: ProcessId) -> Result<Vec<WindowId>, SourceError>;

    /// Read a window's minimized attribute.
    fn is_minimized(&self, window: WindowId) -> Result<bool, SourceError>;

    /// Write a window's minimized attribute.
    fn set_minimized(&mut self, window: WindowId, minimized: bool) -> Result<(), SourceError>;

    /// Read a window's title, if the OS can supply one.
    fn title(&self, window: WindowId) -> Option<String>;

    /// Create the notification subscription for a process.
    fn subscribe_process(&mut self, process: &ProcessInfo) -> Result<Self::Subscription, SourceError>;

    /// Register minimize/deminimize interest for one window.
    fn watch_window(
        &mut self,
        subscription: &mut Self::Subscription,
        window: WindowId,
    ) -> Result<(), SourceError>;

    /// Drop minimize/deminimize interest for a window that no longer exists.
    fn unwatch_window(&mut self, subscription: &mut Self::Subscription, window: WindowId);

    /// Register window-created interest for the subscribed process.
    fn watch_window_created(&mut self, subscription: &mut Self::Subscription) -> Result<(), SourceError>;

    /// Release a subscription. No notifications for it are delivered afterwards.
    fn release_subscription(&mut self, subscription: Self::Subscription);

    /// Application identifier of the frontmost process, queried live.
    fn frontmost_app_id(&self) -> Option<String>;

    /// Bring the owning application of `window` to the front.
    fn activate(&mut self, pid: ProcessId, window: WindowId) -> Result<(), SourceError>;
}
