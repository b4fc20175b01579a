//! Staleness-gated refreshes of the virtual filesystem.
//!
//! The scheduler is FRESH for `staleness` after each successful check and
//! STALE afterwards. A call to [`RefreshScheduler::maybe_refresh`] while
//! FRESH does no I/O; while STALE it rebuilds the index and publishes a new
//! snapshot when the index changed.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use upfs_config::{log_refresh_debug, log_refresh_error, log_refresh_info, ChangeDetection, Config};
use upfs_store::{Index, Item, StoreError, StoreLayout};
use upfs_vfs::VirtualFs;

use crate::listing::ListingSink;

/// What a refresh call did
#[derive(Debug)]
pub enum RefreshOutcome {
    /// Checked recently; nothing was read
    Fresh,
    /// Rebuilt, but no change was detected
    Unchanged { entries: usize },
    /// Rebuilt and published a new snapshot
    Published { generation: u64, entries: usize },
    /// The build failed; the previous snapshot is still served
    Failed(StoreError),
}

impl RefreshOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, RefreshOutcome::Published { .. })
    }
}

struct State {
    previous: Index,
    last_check: Option<Instant>,
}

/// Owns the refresh state and pushes snapshots into a [`VirtualFs`]
pub struct RefreshScheduler {
    layout: StoreLayout,
    vfs: VirtualFs,
    sinks: Vec<Arc<dyn ListingSink>>,
    staleness: Duration,
    detection: ChangeDetection,
    state: Mutex<State>,
}

impl RefreshScheduler {
    pub fn new(layout: StoreLayout, vfs: VirtualFs) -> Self {
        let defaults = Config::default().refresh;
        Self {
            layout,
            vfs,
            sinks: Vec::new(),
            staleness: defaults.staleness(),
            detection: defaults.change_detection,
            state: Mutex::new(State {
                previous: Index::new(),
                last_check: None,
            }),
        }
    }

    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn with_change_detection(mut self, detection: ChangeDetection) -> Self {
        self.detection = detection;
        self
    }

    /// Notify `sink` with the item collection on every publish
    pub fn with_sink(mut self, sink: Arc<dyn ListingSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn vfs(&self) -> &VirtualFs {
        &self.vfs
    }

    /// True when the next [`maybe_refresh`](Self::maybe_refresh) will rebuild
    pub fn is_stale(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Self::stale(&state, self.staleness)
    }

    /// Rebuild if STALE, otherwise return [`RefreshOutcome::Fresh`]
    pub fn maybe_refresh(&self) -> RefreshOutcome {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !Self::stale(&state, self.staleness) {
            return RefreshOutcome::Fresh;
        }
        self.refresh_locked(&mut state)
    }

    /// Rebuild regardless of staleness
    pub fn force_refresh(&self) -> RefreshOutcome {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refresh_locked(&mut state)
    }

    fn stale(state: &State, staleness: Duration) -> bool {
        match state.last_check {
            None => true,
            Some(at) => at.elapsed() >= staleness,
        }
    }

    fn changed(&self, previous: &Index, next: &Index) -> bool {
        match self.detection {
            ChangeDetection::Count => previous.len() != next.len(),
            ChangeDetection::Content => !previous.same_ids(next),
        }
    }

    fn refresh_locked(&self, state: &mut State) -> RefreshOutcome {
        let next = match self.layout.build(&state.previous) {
            Ok(index) => index,
            Err(e) => {
                log_refresh_error!(
                    "Index build failed, keeping previous snapshot",
                    dir = self.layout.dir().display().to_string(),
                    error = e.to_string()
                );
                // Retry on the next call
                state.last_check = None;
                return RefreshOutcome::Failed(e);
            }
        };
        state.last_check = Some(Instant::now());

        if !self.changed(&state.previous, &next) {
            log_refresh_debug!("No change detected", entries = next.len());
            return RefreshOutcome::Unchanged {
                entries: next.len(),
            };
        }

        let delta = next.len() as i64 - state.previous.len() as i64;
        log_refresh_info!("Read new file(s)", count = delta, entries = next.len());

        let items: Vec<Arc<Item>> = next.items().cloned().collect();
        let snapshot = self.vfs.refresh(next.clone());
        state.previous = next;

        for sink in &self.sinks {
            if let Err(e) = sink.publish(&items) {
                log_refresh_error!("Listing publish failed", error = e.to_string());
            }
        }

        RefreshOutcome::Published {
            generation: snapshot.generation,
            entries: snapshot.mapping.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use upfs_config::testing::StoreFixture;
    use upfs_vfs::{FileSystem, VfsError};

    #[derive(Default)]
    struct CountingSink {
        calls: AtomicUsize,
        last_len: AtomicUsize,
    }

    impl ListingSink for CountingSink {
        fn publish(&self, items: &[Arc<Item>]) -> std::io::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_len.store(items.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    fn scheduler(store: &StoreFixture, staleness: Duration) -> RefreshScheduler {
        let layout = StoreLayout::from_config(&store.config().store);
        RefreshScheduler::new(layout, VirtualFs::new(&store.store_dir)).with_staleness(staleness)
    }

    #[test]
    fn test_first_call_is_stale() {
        let store = StoreFixture::new().unwrap();
        store.upload("1", "a.txt", b"a", 100).unwrap();

        let sched = scheduler(&store, Duration::from_secs(3600));
        assert!(sched.is_stale());
        assert!(sched.maybe_refresh().is_published());
        assert!(sched.vfs().exists("/a.txt"));
    }

    #[test]
    fn test_fresh_does_nothing() {
        let store = StoreFixture::new().unwrap();
        store.upload("1", "a.txt", b"a", 100).unwrap();

        let sched = scheduler(&store, Duration::from_secs(3600));
        sched.maybe_refresh();
        assert!(!sched.is_stale());

        store.upload("2", "b.txt", b"b", 200).unwrap();
        assert!(matches!(sched.maybe_refresh(), RefreshOutcome::Fresh));
        assert!(!sched.vfs().exists("/b.txt"));

        // Forcing bypasses the gate
        assert!(sched.force_refresh().is_published());
        assert!(sched.vfs().exists("/b.txt"));
    }

    #[test]
    fn test_publishes_only_on_count_change() {
        let store = StoreFixture::new().unwrap();
        store.upload("1", "a.txt", b"a", 100).unwrap();

        let sched = scheduler(&store, Duration::ZERO);
        let first = sched.maybe_refresh();
        assert!(matches!(first, RefreshOutcome::Published { generation: 1, entries: 1 }));

        assert!(matches!(
            sched.maybe_refresh(),
            RefreshOutcome::Unchanged { entries: 1 }
        ));
        assert_eq!(sched.vfs().snapshot().generation, 1);

        store.upload("2", "a.txt", b"b", 200).unwrap();
        assert!(matches!(
            sched.maybe_refresh(),
            RefreshOutcome::Published { generation: 2, entries: 2 }
        ));
        assert!(sched.vfs().exists("/a (1).txt"));
    }

    #[test]
    fn test_count_mode_misses_same_size_swap() {
        let store = StoreFixture::new().unwrap();
        store.upload("1", "a.txt", b"a", 100).unwrap();

        let sched = scheduler(&store, Duration::ZERO);
        sched.maybe_refresh();

        store.remove("1").unwrap();
        store.upload("2", "b.txt", b"b", 200).unwrap();
        assert!(matches!(
            sched.maybe_refresh(),
            RefreshOutcome::Unchanged { .. }
        ));
        assert!(sched.vfs().exists("/a.txt"));
        assert!(!sched.vfs().exists("/b.txt"));
    }

    #[test]
    fn test_content_mode_catches_same_size_swap() {
        let store = StoreFixture::new().unwrap();
        store.upload("1", "a.txt", b"a", 100).unwrap();

        let sched = scheduler(&store, Duration::ZERO)
            .with_change_detection(ChangeDetection::Content);
        sched.maybe_refresh();

        store.remove("1").unwrap();
        store.upload("2", "b.txt", b"b", 200).unwrap();
        assert!(sched.maybe_refresh().is_published());
        assert!(!sched.vfs().exists("/a.txt"));
        assert!(sched.vfs().exists("/b.txt"));
    }

    #[test]
    fn test_failure_keeps_snapshot_and_retries() {
        let store = StoreFixture::new().unwrap();
        store.upload("1", "a.txt", b"a", 100).unwrap();

        let sched = scheduler(&store, Duration::from_secs(3600));
        sched.maybe_refresh();

        // New primary without a sidecar fails the build
        store.orphan("2", b"b").unwrap();
        let outcome = sched.force_refresh();
        assert!(matches!(
            outcome,
            RefreshOutcome::Failed(StoreError::SidecarMissing { .. })
        ));
        assert!(sched.vfs().exists("/a.txt"));
        assert_eq!(sched.vfs().snapshot().generation, 1);

        // Still stale despite the long threshold
        assert!(sched.is_stale());

        std::fs::write(store.store_dir.join("2-fname"), "b.txt\n").unwrap();
        assert!(sched.maybe_refresh().is_published());
        assert!(sched.vfs().exists("/b.txt"));
    }

    #[test]
    fn test_deleted_upload_disappears() {
        let store = StoreFixture::new().unwrap();
        store.upload("1", "a.txt", b"a", 100).unwrap();
        store.upload("2", "b.txt", b"b", 200).unwrap();

        let sched = scheduler(&store, Duration::ZERO);
        sched.maybe_refresh();

        store.remove("2").unwrap();
        assert!(sched.maybe_refresh().is_published());
        assert!(matches!(
            sched.vfs().stat("/b.txt"),
            Err(VfsError::NotFound(_))
        ));
    }

    #[test]
    fn test_sinks_notified_on_publish_only() {
        let store = StoreFixture::new().unwrap();
        store.upload("1", "a.txt", b"a", 100).unwrap();

        let sink = Arc::new(CountingSink::default());
        let sched = scheduler(&store, Duration::ZERO).with_sink(sink.clone());

        sched.maybe_refresh();
        sched.maybe_refresh();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.last_len.load(Ordering::SeqCst), 1);

        store.upload("2", "b.txt", b"b", 200).unwrap();
        sched.maybe_refresh();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert_eq!(sink.last_len.load(Ordering::SeqCst), 2);
    }
}
