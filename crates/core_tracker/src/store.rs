//! Record of the windows currently known to be minimized.

use crate::{ProcessId, ProcessInfo, WindowId};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Which windows are candidates when picking the one to restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Any minimized window of any application.
    #[default]
    AnyApplication,
    /// Only windows of the frontmost application.
    ActiveApplicationOnly,
}

/// A window observed to be minimized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinimizedWindow {
    /// The window handle (borrowed, may have vanished).
    pub window: WindowId,
    /// Process owning the window.
    pub pid: ProcessId,
    /// Stable identifier of the owning application.
    pub app_id: String,
    /// Display name of the owning application.
    pub app_name: String,
    /// Window title, if the OS supplied one.
    pub title: Option<String>,
    /// When the minimize was detected.
    pub minimized_at: Instant,
    /// Insertion order, assigned by the store.
    seq: u64,
}

impl MinimizedWindow {
    /// Create a record for a window of `process`.
    pub fn new(
        window: WindowId,
        process: &ProcessInfo,
        title: Option<String>,
        minimized_at: Instant,
    ) -> Self {
        Self {
            window,
            pid: process.pid,
            app_id: process.app_id.clone(),
            app_name: process.display_name.clone(),
            title,
            minimized_at,
            seq: 0,
        }
    }
}

/// Ordered, append-biased store of minimized windows.
///
/// Holds at most one record per [`WindowId`].
#[derive(Debug, Default)]
pub struct MinimizedWindowStore {
    records: Vec<MinimizedWindow>,
    next_seq: u64,
}

impl MinimizedWindowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record unless one already exists for the same window.
    ///
    /// Returns `true` if the record was inserted.
    pub fn insert(&mut self, mut record: MinimizedWindow) -> bool {
        if self.contains(record.window) {
            return false;
        }
        record.seq = self.next_seq;
        self.next_seq += 1;
        self.records.push(record);
        true
    }

    /// Check whether a window has a record.
    pub fn contains(&self, window: WindowId) -> bool {
        self.records.iter().any(|r| r.window == window)
    }

    /// Get the record for a window.
    pub fn get(&self, window: WindowId) -> Option<&MinimizedWindow> {
        self.records.iter().find(|r| r.window == window)
    }

    /// Remove the record for a window.
    pub fn remove(&mut self, window: WindowId) -> Option<MinimizedWindow> {
        let pos = self.records.iter().position(|r| r.window == window)?;
        Some(self.records.remove(pos))
    }

    /// Remove every record belonging to an application and return them.
    pub fn remove_app(&mut self, app_id: &str) -> Vec<MinimizedWindow> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|r| r.app_id == app_id);
        self.records = kept;
        removed
    }

    /// The most recently minimized window across all applications.
    ///
    /// Equal timestamps resolve to the record inserted last.
    pub fn most_recent(&self) -> Option<&MinimizedWindow> {
        self.records.iter().max_by_key(|r| (r.minimized_at, r.seq))
    }

    /// The most recently minimized window of one application.
    pub fn most_recent_for_app(&self, app_id: &str) -> Option<&MinimizedWindow> {
        self.records
            .iter()
            .filter(|r| r.app_id == app_id)
            .max_by_key(|r| (r.minimized_at, r.seq))
    }

    /// All records, most recently minimized first.
    pub fn newest_first(&self) -> Vec<&MinimizedWindow> {
        let mut records: Vec<_> = self.records.iter().collect();
        records.sort_by(|a, b| (b.minimized_at, b.seq).cmp(&(a.minimized_at, a.seq)));
        records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop all records.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn app(pid: ProcessId, app_id: &str) -> ProcessInfo {
        ProcessInfo::regular(pid, app_id, app_id)
    }

    fn record(window: u64, process: &ProcessInfo, at: Instant) -> MinimizedWindow {
        MinimizedWindow::new(WindowId(window), process, None, at)
    }

    #[test]
    fn test_insert_ignores_duplicate_window() {
        let mut store = MinimizedWindowStore::new();
        let p = app(1, "app1");
        let t = Instant::now();

        assert!(store.insert(record(10, &p, t)));
        assert!(!store.insert(record(10, &p, t + Duration::from_secs(1))));
        assert!(!store.insert(record(10, &p, t + Duration::from_secs(2))));

        assert_eq!(store.len(), 1);
        // The first detection time is kept
        assert_eq!(store.get(WindowId(10)).map(|r| r.minimized_at), Some(t));
    }

    #[test]
    fn test_empty_store_has_no_candidate() {
        let store = MinimizedWindowStore::new();
        assert!(store.is_empty());
        assert!(store.most_recent().is_none());
        assert!(store.most_recent_for_app("app1").is_none());
    }

    #[test]
    fn test_most_recent_by_timestamp() {
        let mut store = MinimizedWindowStore::new();
        let app1 = app(1, "app1");
        let app2 = app(2, "app2");
        let t0 = Instant::now();

        // Inserted out of timestamp order on purpose
        store.insert(record(3, &app1, t0 + Duration::from_secs(3)));
        store.insert(record(1, &app1, t0 + Duration::from_secs(1)));
        store.insert(record(2, &app2, t0 + Duration::from_secs(2)));

        assert_eq!(store.most_recent().map(|r| r.window), Some(WindowId(3)));
        assert_eq!(store.most_recent_for_app("app2").map(|r| r.window), Some(WindowId(2)));
        assert!(store.most_recent_for_app("app3").is_none());
    }

    #[test]
    fn test_timestamp_tie_goes_to_later_insert() {
        let mut store = MinimizedWindowStore::new();
        let p = app(1, "app1");
        let t = Instant::now();

        store.insert(record(1, &p, t));
        store.insert(record(2, &p, t));

        assert_eq!(store.most_recent().map(|r| r.window), Some(WindowId(2)));
        assert_eq!(store.most_recent_for_app("app1").map(|r| r.window), Some(WindowId(2)));
    }

    #[test]
    fn test_remove_single_record() {
        let mut store = MinimizedWindowStore::new();
        let p = app(1, "app1");
        let t = Instant::now();
        store.insert(record(1, &p, t));
        store.insert(record(2, &p, t));

        let removed = store.remove(WindowId(1));
        assert_eq!(removed.map(|r| r.window), Some(WindowId(1)));
        assert!(store.remove(WindowId(1)).is_none());
        assert_eq!(store.len(), 1);
        assert!(store.contains(WindowId(2)));
    }

    #[test]
    fn test_remove_app_bulk() {
        let mut store = MinimizedWindowStore::new();
        let app1 = app(1, "app1");
        let app2 = app(2, "app2");
        let t = Instant::now();
        store.insert(record(1, &app1, t));
        store.insert(record(2, &app2, t));
        store.insert(record(3, &app1, t));

        let removed: Vec<_> = store.remove_app("app1").into_iter().map(|r| r.window).collect();
        assert_eq!(removed, vec![WindowId(1), WindowId(3)]);
        assert_eq!(store.len(), 1);
        assert!(store.contains(WindowId(2)));
        assert!(store.remove_app("app1").is_empty());
    }

    #[test]
    fn test_newest_first_ordering() {
        let mut store = MinimizedWindowStore::new();
        let p = app(1, "app1");
        let t0 = Instant::now();
        store.insert(record(1, &p, t0 + Duration::from_secs(1)));
        store.insert(record(2, &p, t0 + Duration::from_secs(5)));
        store.insert(record(3, &p, t0 + Duration::from_secs(3)));

        let order: Vec<_> = store.newest_first().iter().map(|r| r.window).collect();
        assert_eq!(order, vec![WindowId(2), WindowId(3), WindowId(1)]);
    }
}
