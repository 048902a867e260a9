//! Precomputing work cache.
//!
//! After a block is confirmed its hash becomes the root of the account's next
//! block. Computing that nonce in the background as soon as the frontier moves
//! means the user never waits on PoW when they submit a transaction.
//!
//! - Entries are keyed by the root they were computed against and are only
//!   ever returned for that root.
//! - At most one computation per root is in flight; later requests join it.
//! - A computation whose root stops being a frontier is cancelled and its
//!   result discarded.
//! - The cache is bounded; roots that are not a current frontier are evicted
//!   first, least recently used first.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use troll_types::BlockHash;

use crate::persist::PersistedWork;
use crate::validator::validate_work;
use crate::{WorkError, WorkNonce, WorkSolver};

/// Where a cached nonce came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkOrigin {
    /// Computed locally in the background.
    Precomputed,
    /// Loaded from a previous session and revalidated.
    Restored,
    /// Supplied by the node and verified locally.
    Remote,
}

type Outcome = Option<Result<WorkNonce, WorkError>>;

struct CacheEntry {
    work: WorkNonce,
    origin: WorkOrigin,
    last_used: u64,
}

struct Job {
    id: u64,
    cancel: Arc<AtomicBool>,
    done: watch::Receiver<Outcome>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<BlockHash, CacheEntry>,
    in_flight: HashMap<BlockHash, Job>,
    /// Roots that are some account's current frontier; evicted last.
    frontiers: HashSet<BlockHash>,
    clock: u64,
    next_job: u64,
    computations: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn insert(&mut self, root: BlockHash, work: WorkNonce, origin: WorkOrigin, capacity: usize) {
        if !self.entries.contains_key(&root) && self.entries.len() >= capacity {
            self.evict_one();
        }
        let last_used = self.tick();
        self.entries.insert(
            root,
            CacheEntry {
                work,
                origin,
                last_used,
            },
        );
    }

    fn evict_one(&mut self) {
        let victim = self
            .entries
            .iter()
            .filter(|(root, _)| !self.frontiers.contains(*root))
            .min_by_key(|(_, e)| e.last_used)
            .or_else(|| self.entries.iter().min_by_key(|(_, e)| e.last_used))
            .map(|(root, _)| *root);
        if let Some(root) = victim {
            tracing::debug!(root = %root, "evicting work cache entry");
            self.entries.remove(&root);
        }
    }

    fn cancel(&mut self, root: &BlockHash) {
        if let Some(job) = self.in_flight.remove(root) {
            tracing::debug!(root = %root, "cancelling stale work computation");
            job.cancel.store(true, Ordering::Relaxed);
        }
    }
}

struct Shared {
    state: Mutex<CacheState>,
    solver: Arc<dyn WorkSolver>,
    difficulty: u64,
    capacity: usize,
}

enum Lookup {
    Ready(WorkNonce),
    Pending(watch::Receiver<Outcome>),
}

/// Bounded, coalescing cache of precomputed work keyed by root.
///
/// Cloning is cheap and every clone shares the same cache. Methods that may
/// start a computation must be called from within a tokio runtime; the search
/// itself runs on the blocking pool so it never stalls async tasks.
#[derive(Clone)]
pub struct WorkCache {
    shared: Arc<Shared>,
}

impl WorkCache {
    /// Create a cache that precomputes at `difficulty` using `solver`.
    pub fn new(solver: Arc<dyn WorkSolver>, difficulty: u64, capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(CacheState::default()),
                solver,
                difficulty,
                capacity: capacity.max(1),
            }),
        }
    }

    /// The difficulty every cached nonce meets.
    pub fn difficulty(&self) -> u64 {
        self.shared.difficulty
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        // A panic while holding the lock cannot leave the maps half-updated,
        // so a poisoned lock is still usable.
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached work for exactly `root`, if any.
    pub fn get(&self, root: &BlockHash) -> Option<WorkNonce> {
        let mut state = self.state();
        let now = state.tick();
        state.entries.get_mut(root).map(|entry| {
            entry.last_used = now;
            entry.work
        })
    }

    /// Origin of the cached entry for `root`.
    pub fn origin(&self, root: &BlockHash) -> Option<WorkOrigin> {
        self.state().entries.get(root).map(|e| e.origin)
    }

    /// Whether a computation for `root` is currently running.
    pub fn is_pending(&self, root: &BlockHash) -> bool {
        self.state().in_flight.contains_key(root)
    }

    /// Number of computations ever started by this cache.
    pub fn computations_started(&self) -> u64 {
        self.state().computations
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }

    /// Start computing work for `root` unless it is cached or already running.
    pub fn ensure(&self, root: BlockHash) {
        let _ = self.lookup_or_start(root);
    }

    /// Cached work for `root`, computing it (or joining the running
    /// computation) if necessary.
    pub async fn wait_for(&self, root: BlockHash) -> Result<WorkNonce, WorkError> {
        match self.lookup_or_start(root) {
            Lookup::Ready(work) => Ok(work),
            Lookup::Pending(mut done) => {
                let outcome = done
                    .wait_for(|outcome| outcome.is_some())
                    .await
                    .map_err(|_| WorkError::Cancelled)?
                    .clone();
                outcome.unwrap_or(Err(WorkError::Cancelled))
            }
        }
    }

    /// Store work obtained elsewhere (e.g. from the node). The nonce must
    /// meet this cache's difficulty for `root`.
    pub fn insert(&self, root: BlockHash, work: WorkNonce, origin: WorkOrigin) -> Result<(), WorkError> {
        if !validate_work(&root, work.0, self.shared.difficulty) {
            return Err(WorkError::InsufficientDifficulty {
                actual: crate::work_value(&root, work.0),
                minimum: self.shared.difficulty,
            });
        }
        let mut state = self.state();
        state.cancel(&root);
        state.insert(root, work, origin, self.shared.capacity);
        Ok(())
    }

    /// Drop the entry for `root` once its work has been used in a block.
    pub fn remove(&self, root: &BlockHash) {
        self.state().entries.remove(root);
    }

    /// An account's frontier moved from `old` to `new`: cancel any
    /// computation for the old root and precompute for the new one.
    pub fn frontier_changed(&self, old: Option<BlockHash>, new: BlockHash) {
        {
            let mut state = self.state();
            if let Some(old) = old.filter(|old| *old != new) {
                state.frontiers.remove(&old);
                state.cancel(&old);
            }
            state.frontiers.insert(new);
        }
        self.ensure(new);
    }

    /// Replace the set of current frontiers, cancelling computations for roots
    /// that are no longer frontiers and precomputing for the rest.
    pub fn track_frontiers(&self, roots: impl IntoIterator<Item = BlockHash>) {
        let roots: HashSet<BlockHash> = roots.into_iter().collect();
        {
            let mut state = self.state();
            let stale: Vec<BlockHash> = state
                .in_flight
                .keys()
                .filter(|root| !roots.contains(*root))
                .copied()
                .collect();
            for root in stale {
                state.cancel(&root);
            }
            state.frontiers = roots.clone();
        }
        for root in roots {
            self.ensure(root);
        }
    }

    /// Entries worth keeping across a restart.
    pub fn snapshot(&self) -> Vec<PersistedWork> {
        let state = self.state();
        let mut entries: Vec<PersistedWork> = state
            .entries
            .iter()
            .map(|(root, entry)| PersistedWork {
                root: *root,
                work: entry.work,
            })
            .collect();
        entries.sort_by_key(|e| e.root);
        entries
    }

    /// Load persisted entries, keeping only those whose root is still a
    /// current frontier and whose nonce still meets the difficulty. The
    /// frontiers are registered so eviction spares them. Returns the number
    /// of entries kept.
    pub fn restore(&self, entries: Vec<PersistedWork>, frontiers: &HashSet<BlockHash>) -> usize {
        let mut state = self.state();
        state.frontiers.extend(frontiers.iter().copied());
        let mut kept = 0;
        for entry in entries {
            if !frontiers.contains(&entry.root) {
                tracing::debug!(root = %entry.root, "discarding persisted work for stale root");
                continue;
            }
            if !validate_work(&entry.root, entry.work.0, self.shared.difficulty) {
                tracing::warn!(root = %entry.root, "discarding persisted work below difficulty");
                continue;
            }
            state.insert(entry.root, entry.work, WorkOrigin::Restored, self.shared.capacity);
            kept += 1;
        }
        tracing::info!(kept, "restored work cache");
        kept
    }

    fn lookup_or_start(&self, root: BlockHash) -> Lookup {
        let mut state = self.state();
        let now = state.tick();
        if let Some(entry) = state.entries.get_mut(&root) {
            entry.last_used = now;
            return Lookup::Ready(entry.work);
        }
        if let Some(job) = state.in_flight.get(&root) {
            return Lookup::Pending(job.done.clone());
        }

        let (tx, rx) = watch::channel(None);
        let cancel = Arc::new(AtomicBool::new(false));
        state.next_job += 1;
        state.computations += 1;
        let id = state.next_job;
        state.in_flight.insert(
            root,
            Job {
                id,
                cancel: cancel.clone(),
                done: rx.clone(),
            },
        );
        drop(state);

        tracing::debug!(root = %root, "starting work computation");
        let cache = self.clone();
        tokio::spawn(async move {
            let solver = cache.shared.solver.clone();
            let difficulty = cache.shared.difficulty;
            let flag = cancel.clone();
            let result = tokio::task::spawn_blocking(move || solver.solve(&root, difficulty, &flag))
                .await
                .unwrap_or_else(|e| Err(WorkError::Worker(e.to_string())));
            let outcome = cache.finish(root, id, &cancel, result);
            let _ = tx.send(Some(outcome));
        });

        Lookup::Pending(rx)
    }

    fn finish(
        &self,
        root: BlockHash,
        id: u64,
        cancel: &AtomicBool,
        result: Result<WorkNonce, WorkError>,
    ) -> Result<WorkNonce, WorkError> {
        let mut state = self.state();
        if state.in_flight.get(&root).is_some_and(|job| job.id == id) {
            state.in_flight.remove(&root);
        }
        if cancel.load(Ordering::Relaxed) {
            tracing::debug!(root = %root, "discarding result of cancelled computation");
            return Err(WorkError::Cancelled);
        }
        match result {
            Ok(work) => {
                tracing::debug!(root = %root, work = %work, "work computed");
                state.insert(root, work, WorkOrigin::Precomputed, self.shared.capacity);
                Ok(work)
            }
            Err(e) => {
                tracing::warn!(root = %root, error = %e, "work computation failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkGenerator;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    // One nonce in sixteen qualifies, so both valid and invalid nonces are quick to find.
    const EASY: u64 = 0xF000_0000_0000_0000;

    /// Counts calls and blocks until released, so concurrent requests overlap.
    struct GatedSolver {
        calls: AtomicUsize,
        release: AtomicBool,
    }

    impl GatedSolver {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                release: AtomicBool::new(false),
            })
        }
    }

    impl WorkSolver for GatedSolver {
        fn solve(&self, root: &BlockHash, difficulty: u64, cancel: &AtomicBool) -> Result<WorkNonce, WorkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            while !self.release.load(Ordering::SeqCst) {
                if cancel.load(Ordering::SeqCst) {
                    return Err(WorkError::Cancelled);
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            WorkGenerator.generate_cancellable(root, difficulty, cancel)
        }
    }

    fn root(byte: u8) -> BlockHash {
        BlockHash::new([byte; 32])
    }

    #[tokio::test]
    async fn computed_work_is_cached_for_its_root_only() {
        let cache = WorkCache::new(Arc::new(WorkGenerator), EASY, 8);
        let work = cache.wait_for(root(1)).await.unwrap();
        assert!(validate_work(&root(1), work.0, EASY));
        assert_eq!(cache.get(&root(1)), Some(work));
        assert_eq!(cache.get(&root(2)), None);
        assert_eq!(cache.origin(&root(1)), Some(WorkOrigin::Precomputed));
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_computation() {
        let solver = GatedSolver::new();
        let cache = WorkCache::new(solver.clone(), EASY, 8);

        cache.ensure(root(3));
        let a = tokio::spawn({
            let cache = cache.clone();
            async move { cache.wait_for(root(3)).await }
        });
        let b = tokio::spawn({
            let cache = cache.clone();
            async move { cache.wait_for(root(3)).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        solver.release.store(true, Ordering::SeqCst);

        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert_eq!(a, b);
        assert_eq!(solver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.computations_started(), 1);
    }

    #[tokio::test]
    async fn frontier_change_cancels_old_computation() {
        let solver = GatedSolver::new();
        let cache = WorkCache::new(solver.clone(), EASY, 8);

        cache.frontier_changed(None, root(4));
        let waiter = tokio::spawn({
            let cache = cache.clone();
            async move { cache.wait_for(root(4)).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        cache.frontier_changed(Some(root(4)), root(5));
        assert_eq!(waiter.await.unwrap(), Err(WorkError::Cancelled));
        assert_eq!(cache.get(&root(4)), None);

        solver.release.store(true, Ordering::SeqCst);
        let work = cache.wait_for(root(5)).await.unwrap();
        assert!(validate_work(&root(5), work.0, EASY));
    }

    #[tokio::test]
    async fn eviction_prefers_non_frontier_roots() {
        let cache = WorkCache::new(Arc::new(WorkGenerator), 0, 2);
        cache.track_frontiers([root(1)]);
        cache.wait_for(root(1)).await.unwrap();
        cache.insert(root(2), WorkNonce(0), WorkOrigin::Remote).unwrap();
        cache.insert(root(3), WorkNonce(0), WorkOrigin::Remote).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&root(1)).is_some(), "frontier entry must survive");
        assert!(cache.get(&root(2)).is_none(), "oldest non-frontier entry evicted");
        assert!(cache.get(&root(3)).is_some());
    }

    #[tokio::test]
    async fn insert_rejects_work_below_difficulty() {
        let cache = WorkCache::new(Arc::new(WorkGenerator), EASY, 4);
        let mut bad = 0;
        while validate_work(&root(7), bad, EASY) {
            bad += 1;
        }
        assert!(cache.insert(root(7), WorkNonce(bad), WorkOrigin::Remote).is_err());
        assert!(cache.get(&root(7)).is_none());
    }

    #[tokio::test]
    async fn restore_keeps_only_valid_current_frontiers() {
        let cache = WorkCache::new(Arc::new(WorkGenerator), EASY, 8);
        let good = WorkGenerator.generate(&root(8), EASY).unwrap();
        let stale = WorkGenerator.generate(&root(9), EASY).unwrap();
        let mut bad = 0;
        while validate_work(&root(10), bad, EASY) {
            bad += 1;
        }
        let frontiers: HashSet<BlockHash> = [root(8), root(10)].into_iter().collect();
        let kept = cache.restore(
            vec![
                PersistedWork { root: root(8), work: good },
                PersistedWork { root: root(9), work: stale },
                PersistedWork { root: root(10), work: WorkNonce(bad) },
            ],
            &frontiers,
        );
        assert_eq!(kept, 1);
        assert_eq!(cache.get(&root(8)), Some(good));
        assert_eq!(cache.origin(&root(8)), Some(WorkOrigin::Restored));
        assert_eq!(cache.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn restored_frontier_work_survives_eviction() {
        let cache = WorkCache::new(Arc::new(WorkGenerator), 0, 2);
        let frontiers: HashSet<BlockHash> = [root(1)].into_iter().collect();
        cache.restore(vec![PersistedWork { root: root(1), work: WorkNonce(0) }], &frontiers);
        cache.insert(root(2), WorkNonce(0), WorkOrigin::Remote).unwrap();
        cache.insert(root(3), WorkNonce(0), WorkOrigin::Remote).unwrap();

        assert_eq!(cache.get(&root(1)), Some(WorkNonce(0)));
        assert!(cache.get(&root(2)).is_none());
        assert!(cache.get(&root(3)).is_some());
    }
}
