//! Immutable snapshots and the cell that publishes them.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use upfs_store::{resolve, Index, NameMapping};

/// One published generation of the virtual namespace.
#[derive(Debug, Default)]
pub struct Snapshot {
    /// Monotonic generation number, 0 for the initial empty snapshot
    pub generation: u64,
    /// When the snapshot was published
    pub published_at: Option<SystemTime>,
    pub mapping: NameMapping,
    pub index: Index,
}

impl Snapshot {
    fn build(index: Index) -> Self {
        Self {
            generation: 0,
            published_at: Some(SystemTime::now()),
            mapping: resolve(&index),
            index,
        }
    }
}

/// Holds the current snapshot.
///
/// Readers clone the `Arc` under the read lock and work on it after the
/// guard is dropped. Writers hold the write lock only for the pointer swap.
#[derive(Debug, Default)]
pub struct SnapshotCell {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot
    pub fn load(&self) -> Arc<Snapshot> {
        // A panicking reader cannot leave a half-written Arc behind
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Resolve names for `index` and make the result current.
    ///
    /// Resolution happens before the write lock is taken.
    pub fn publish(&self, index: Index) -> Arc<Snapshot> {
        let mut next = Snapshot::build(index);

        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        next.generation = guard.generation + 1;
        let next = Arc::new(next);
        *guard = Arc::clone(&next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use upfs_store::Item;

    fn index(ids: &[&str]) -> Index {
        ids.iter()
            .map(|id| Item {
                id: id.to_string(),
                name: "same.txt".to_string(),
                size: 1,
                modified: SystemTime::UNIX_EPOCH + Duration::from_secs(1),
                url: String::new(),
            })
            .collect()
    }

    #[test]
    fn test_initial_snapshot_is_empty() {
        let cell = SnapshotCell::new();
        let snap = cell.load();
        assert_eq!(snap.generation, 0);
        assert!(snap.mapping.is_empty());
        assert!(snap.published_at.is_none());
    }

    #[test]
    fn test_publish_replaces_snapshot() {
        let cell = SnapshotCell::new();
        let before = cell.load();

        let published = cell.publish(index(&["1", "2"]));
        assert_eq!(published.generation, 1);
        assert_eq!(cell.load().mapping.len(), 2);

        // Old readers keep their generation
        assert_eq!(before.generation, 0);
        assert!(before.mapping.is_empty());
    }

    #[test]
    fn test_generations_increase() {
        let cell = SnapshotCell::new();
        cell.publish(index(&["1"]));
        cell.publish(index(&["1", "2"]));
        let last = cell.publish(index(&["2"]));
        assert_eq!(last.generation, 3);
        assert_eq!(cell.load().mapping.get("same.txt").unwrap().id, "2");
    }
}
