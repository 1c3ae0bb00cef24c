//! Observation registry: one notification subscription per running process.

use crate::{MinimizedWindow, MinimizedWindowStore, ProcessId, ProcessInfo, SourceError, WindowId, WindowSource};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, warn};

/// Subscription state for one observed process.
#[derive(Debug)]
pub struct ProcessSubscription<S> {
    process: ProcessInfo,
    handle: S,
    subscribed_windows: HashSet<WindowId>,
}

impl<S> ProcessSubscription<S> {
    /// The process this subscription belongs to.
    pub fn process(&self) -> &ProcessInfo {
        &self.process
    }

    /// Whether minimize/deminimize interest is registered for a window.
    pub fn is_window_subscribed(&self, window: WindowId) -> bool {
        self.subscribed_windows.contains(&window)
    }

    /// Number of windows with registered interest.
    pub fn subscribed_window_count(&self) -> usize {
        self.subscribed_windows.len()
    }
}

/// Owns every process subscription handle.
///
/// Subscribing is idempotent: re-observing a process only registers windows
/// that were not registered before.
#[derive(Debug)]
pub struct ObservationRegistry<S> {
    processes: HashMap<ProcessId, ProcessSubscription<S>>,
}

impl<S> Default for ObservationRegistry<S> {
    fn default() -> Self {
        Self {
            processes: HashMap::new(),
        }
    }
}

impl<S> ObservationRegistry<S> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe a process: subscribe once, then register every window not yet
    /// registered. Windows found already minimized are recorded in `store`.
    ///
    /// Returns the number of newly registered windows. Non-regular processes
    /// are skipped and yield `Ok(0)`. On error the process is left as it was
    /// (possibly subscribed without windows) until the next call.
    pub fn observe<W>(
        &mut self,
        source: &mut W,
        store: &mut MinimizedWindowStore,
        process: &ProcessInfo,
    ) -> Result<usize, SourceError>
    where
        W: WindowSource<Subscription = S>,
    {
        if !process.regular {
            debug!("Skipping non-regular process {} ({})", process.pid, process.app_id);
            return Ok(0);
        }

        if !self.processes.contains_key(&process.pid) {
            let mut handle = source.subscribe_process(process)?;
            if let Err(e) = source.watch_window_created(&mut handle) {
                warn!(
                    "Failed to watch window creation for {} (pid {}): {}",
                    process.display_name, process.pid, e
                );
            }
            debug!("Subscribed to process {} (pid {})", process.display_name, process.pid);
            self.processes.insert(
                process.pid,
                ProcessSubscription {
                    process: process.clone(),
                    handle,
                    subscribed_windows: HashSet::new(),
                },
            );
        }

        let windows = source.windows(process.pid)?;

        let Some(entry) = self.processes.get_mut(&process.pid) else {
            return Ok(0);
        };

        // Destroyed windows
        let stale: Vec<WindowId> = entry
            .subscribed_windows
            .iter()
            .copied()
            .filter(|window| !windows.contains(window))
            .collect();
        for window in stale {
            source.unwatch_window(&mut entry.handle, window);
            entry.subscribed_windows.remove(&window);
        }

        let healed_at = Instant::now();
        let mut added = 0;
        for window in windows {
            if entry.subscribed_windows.contains(&window) {
                continue;
            }
            if let Err(e) = source.watch_window(&mut entry.handle, window) {
                warn!("Failed to watch window {} of pid {}: {}", window, process.pid, e);
                continue;
            }
            entry.subscribed_windows.insert(window);
            added += 1;

            // Catch windows that were minimized before we were listening
            if matches!(source.is_minimized(window), Ok(true)) {
                let record = MinimizedWindow::new(window, &entry.process, source.title(window), healed_at);
                if store.insert(record) {
                    debug!("Window {} of {} already minimized", window, entry.process.display_name);
                }
            }
        }

        if added > 0 {
            debug!(
                "Watching {} new window(s) of {} (pid {})",
                added, process.display_name, process.pid
            );
        }
        Ok(added)
    }

    /// Release a process's subscription. Unknown pids are a no-op.
    ///
    /// Returns the process info of the removed entry.
    pub fn unobserve<W>(&mut self, source: &mut W, pid: ProcessId) -> Option<ProcessInfo>
    where
        W: WindowSource<Subscription = S>,
    {
        let entry = self.processes.remove(&pid)?;
        source.release_subscription(entry.handle);
        debug!("Released subscription for pid {}", pid);
        Some(entry.process)
    }

    /// Mark windows as unregistered in every subscription, so the next
    /// `observe` of their process registers them again and re-records them
    /// if they are still minimized.
    pub fn forget_windows(&mut self, windows: &[WindowId]) {
        for entry in self.processes.values_mut() {
            for window in windows {
                entry.subscribed_windows.remove(window);
            }
        }
    }

    /// Release every subscription. Returns how many were released.
    pub fn unobserve_all<W>(&mut self, source: &mut W) -> usize
    where
        W: WindowSource<Subscription = S>,
    {
        let count = self.processes.len();
        for (_, entry) in self.processes.drain() {
            source.release_subscription(entry.handle);
        }
        count
    }

    /// Check whether a process is observed.
    pub fn is_observed(&self, pid: ProcessId) -> bool {
        self.processes.contains_key(&pid)
    }

    /// Get the subscription for a process.
    pub fn get(&self, pid: ProcessId) -> Option<&ProcessSubscription<S>> {
        self.processes.get(&pid)
    }

    /// Get the cached info of an observed process.
    pub fn process(&self, pid: ProcessId) -> Option<&ProcessInfo> {
        self.processes.get(&pid).map(|entry| &entry.process)
    }

    /// Pids of all observed processes.
    pub fn pids(&self) -> Vec<ProcessId> {
        self.processes.keys().copied().collect()
    }

    /// Number of observed processes.
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    /// Check if no process is observed.
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSource, FakeSubscription};

    fn setup() -> (FakeSource, ObservationRegistry<FakeSubscription>, MinimizedWindowStore) {
        (FakeSource::new(), ObservationRegistry::new(), MinimizedWindowStore::new())
    }

    #[test]
    fn test_observe_subscribes_process_and_windows() {
        let (mut source, mut registry, mut store) = setup();
        let app = source.add_app(10, "app1");
        source.add_window(10, 1, false);
        source.add_window(10, 2, false);

        let added = registry.observe(&mut source, &mut store, &app).unwrap();

        assert_eq!(added, 2);
        assert!(registry.is_observed(10));
        assert_eq!(source.live_subscription_for(10), 1);
        assert_eq!(source.created_watches, vec![10]);
        assert_eq!(registry.get(10).map(|s| s.subscribed_window_count()), Some(2));
        assert!(store.is_empty());
    }

    #[test]
    fn test_observe_twice_is_idempotent() {
        let (mut source, mut registry, mut store) = setup();
        let app = source.add_app(10, "app1");
        let w = source.add_window(10, 1, true);

        registry.observe(&mut source, &mut store, &app).unwrap();
        let added = registry.observe(&mut source, &mut store, &app).unwrap();

        assert_eq!(added, 0);
        assert_eq!(source.live_subscription_for(10), 1);
        assert_eq!(source.watch_count(w), 1);
        assert_eq!(source.created_watches.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_observe_picks_up_new_windows_only() {
        let (mut source, mut registry, mut store) = setup();
        let app = source.add_app(10, "app1");
        let first = source.add_window(10, 1, false);
        registry.observe(&mut source, &mut store, &app).unwrap();

        let second = source.add_window(10, 2, false);
        let added = registry.observe(&mut source, &mut store, &app).unwrap();

        assert_eq!(added, 1);
        assert_eq!(source.watch_count(first), 1);
        assert_eq!(source.watch_count(second), 1);
    }

    #[test]
    fn test_observe_records_already_minimized_windows() {
        let (mut source, mut registry, mut store) = setup();
        let app = source.add_app(10, "app1");
        source.add_window(10, 1, false);
        let minimized = source.add_window(10, 2, true);

        registry.observe(&mut source, &mut store, &app).unwrap();

        assert_eq!(store.len(), 1);
        let record = store.get(minimized).unwrap();
        assert_eq!(record.pid, 10);
        assert_eq!(record.app_id, "app1");
        assert_eq!(record.app_name, "APP1");
        assert_eq!(record.title.as_deref(), Some("Window 2"));
    }

    #[test]
    fn test_already_minimized_windows_share_a_stamp() {
        let (mut source, mut registry, mut store) = setup();
        let app = source.add_app(10, "app1");
        let first = source.add_window(10, 1, true);
        source.add_window(10, 2, false);
        let last = source.add_window(10, 3, true);

        registry.observe(&mut source, &mut store, &app).unwrap();

        let stamps: Vec<_> = store.newest_first().iter().map(|r| r.minimized_at).collect();
        assert_eq!(stamps.len(), 2);
        assert_eq!(stamps[0], stamps[1]);
        // Enumeration order decides
        assert_eq!(store.most_recent().map(|r| r.window), Some(last));
        assert_eq!(store.newest_first()[1].window, first);
    }

    #[test]
    fn test_observe_drops_destroyed_windows() {
        let (mut source, mut registry, mut store) = setup();
        let app = source.add_app(10, "app1");
        let kept = source.add_window(10, 1, false);
        let closed = source.add_window(10, 2, false);
        registry.observe(&mut source, &mut store, &app).unwrap();

        source.close_window(closed);
        registry.observe(&mut source, &mut store, &app).unwrap();

        let entry = registry.get(10).unwrap();
        assert_eq!(entry.subscribed_window_count(), 1);
        assert!(entry.is_window_subscribed(kept));
        assert!(!entry.is_window_subscribed(closed));
        assert_eq!(source.window_unwatches, vec![(10, closed)]);
    }

    #[test]
    fn test_forgotten_windows_are_recorded_again() {
        let (mut source, mut registry, mut store) = setup();
        let app = source.add_app(10, "app1");
        let w = source.add_window(10, 1, true);
        registry.observe(&mut source, &mut store, &app).unwrap();

        store.clear();
        registry.observe(&mut source, &mut store, &app).unwrap();
        assert!(store.is_empty());

        registry.forget_windows(&[w]);
        assert!(!registry.get(10).unwrap().is_window_subscribed(w));
        assert_eq!(registry.observe(&mut source, &mut store, &app), Ok(1));
        assert!(store.contains(w));
        assert_eq!(source.live_subscription_for(10), 1);
    }

    #[test]
    fn test_observe_skips_background_process() {
        let (mut source, mut registry, mut store) = setup();
        let daemon = source.add_background(20, "helper");
        source.add_window(20, 1, true);

        let added = registry.observe(&mut source, &mut store, &daemon).unwrap();

        assert_eq!(added, 0);
        assert!(!registry.is_observed(20));
        assert!(source.live_subscriptions.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_subscription_failure_leaves_process_unobserved() {
        let (mut source, mut registry, mut store) = setup();
        let app = source.add_app(10, "app1");
        source.add_window(10, 1, true);
        source.fail_subscribe.insert(10);

        let result = registry.observe(&mut source, &mut store, &app);

        assert!(matches!(result, Err(SourceError::SubscriptionFailed(_))));
        assert!(!registry.is_observed(10));
        assert!(store.is_empty());

        // Next trigger succeeds once the OS allows it
        source.fail_subscribe.clear();
        registry.observe(&mut source, &mut store, &app).unwrap();
        assert!(registry.is_observed(10));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_window_enumeration_failure_retried_later() {
        let (mut source, mut registry, mut store) = setup();
        let app = source.add_app(10, "app1");
        let w = source.add_window(10, 1, false);
        source.fail_windows.insert(10);

        assert_eq!(
            registry.observe(&mut source, &mut store, &app),
            Err(SourceError::PermissionDenied)
        );
        // Subscription exists, but no window is registered yet
        assert_eq!(source.live_subscription_for(10), 1);
        assert_eq!(source.watch_count(w), 0);

        source.fail_windows.clear();
        assert_eq!(registry.observe(&mut source, &mut store, &app), Ok(1));
        assert_eq!(source.live_subscription_for(10), 1);
    }

    #[test]
    fn test_failed_window_watch_is_retried() {
        let (mut source, mut registry, mut store) = setup();
        let app = source.add_app(10, "app1");
        let w = source.add_window(10, 1, false);
        source.fail_watch.insert(w);

        assert_eq!(registry.observe(&mut source, &mut store, &app), Ok(0));
        assert!(!registry.get(10).unwrap().is_window_subscribed(w));

        source.fail_watch.clear();
        assert_eq!(registry.observe(&mut source, &mut store, &app), Ok(1));
        assert!(registry.get(10).unwrap().is_window_subscribed(w));
    }

    #[test]
    fn test_unobserve_releases_and_is_idempotent() {
        let (mut source, mut registry, mut store) = setup();
        let app = source.add_app(10, "app1");
        registry.observe(&mut source, &mut store, &app).unwrap();

        let removed = registry.unobserve(&mut source, 10);
        assert_eq!(removed.map(|p| p.app_id), Some("app1".to_string()));
        assert!(!registry.is_observed(10));
        assert_eq!(source.live_subscription_for(10), 0);

        assert!(registry.unobserve(&mut source, 10).is_none());
        assert!(registry.unobserve(&mut source, 999).is_none());
    }

    #[test]
    fn test_unobserve_all_releases_everything() {
        let (mut source, mut registry, mut store) = setup();
        let a = source.add_app(10, "app1");
        let b = source.add_app(11, "app2");
        registry.observe(&mut source, &mut store, &a).unwrap();
        registry.observe(&mut source, &mut store, &b).unwrap();

        assert_eq!(registry.unobserve_all(&mut source), 2);
        assert!(registry.is_empty());
        assert!(source.live_subscriptions.is_empty());
        assert_eq!(registry.unobserve_all(&mut source), 0);
    }
}
