//! Cooperative, single-threaded scheduling of reindex work.
//!
//! There is exactly one logical loop here: the host calls [`Scheduler::tick`]
//! from whatever timer it already runs (an interval, an idle callback), and
//! every operation inside is `.await`ed in place — nothing is spawned onto a
//! background task. A file that changes repeatedly in quick succession is
//! coalesced into a single reindex once it settles (debounce); a file that's
//! actively open for editing is skipped entirely until editing stops, since
//! re-embedding a half-typed sentence wastes a request and produces a chunk
//! that will be stale within seconds anyway.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::SchedulerConfig;
use crate::error::CoreResult;
use crate::indexer::{IndexRunSummary, Indexer};
use crate::store::VectorStore;
use crate::watcher::CorpusEvent;

/// A cooperative cancellation flag shared between a [`Scheduler`] and the
/// [`Indexer`] run it kicked off. Checked between sources, not inside one —
/// an in-flight embedding call always runs to completion.
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct SchedulerState {
    /// Path -> the instant after which it should be reindexed, absent the
    /// active-editing rule below.
    debounce_deadlines: HashMap<String, Instant>,
    /// Paths the host currently reports as open for editing.
    active_editing: HashSet<String>,
    last_active_path: Option<String>,
}

/// Which paths are past their debounce deadline and not currently being
/// edited. Split out as a pure function so the coalescing logic is testable
/// without spinning up a real [`Indexer`].
fn due_paths(
    deadlines: &HashMap<String, Instant>,
    active: &HashSet<String>,
    now: Instant,
) -> Vec<String> {
    deadlines
        .iter()
        .filter(|(path, deadline)| **deadline <= now && !active.contains(path.as_str()))
        .map(|(path, _)| path.clone())
        .collect()
}

pub struct Scheduler {
    indexer: Arc<Indexer>,
    store: Arc<Mutex<VectorStore>>,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    /// True while a reindex run (debounced or full) is in flight. The
    /// watcher consults this to decide whether to forward file-change
    /// events at all, so a rebuild in progress isn't interrupted by a
    /// flood of per-file debounce bookkeeping for files it's about to
    /// visit anyway.
    indexing: Arc<AtomicBool>,
    cancel: CancelToken,
    last_sweep: Mutex<Instant>,
}

impl Scheduler {
    pub fn new(indexer: Arc<Indexer>, store: Arc<Mutex<VectorStore>>, config: SchedulerConfig) -> Self {
        Self {
            indexer,
            store,
            config,
            state: Mutex::new(SchedulerState::default()),
            indexing: Arc::new(AtomicBool::new(false)),
            cancel: CancelToken::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    pub fn is_indexing(&self) -> bool {
        self.indexing.load(Ordering::SeqCst)
    }

    pub fn cancel_handle(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Handle one file-system event from the host.
    pub async fn on_event(&self, event: CorpusEvent) {
        match event {
            CorpusEvent::Modified { path } => self.mark_dirty(path).await,
            CorpusEvent::Renamed { from, to } => {
                self.forget(&from).await;
                self.store.lock().await.remove_source(&from);
                self.mark_dirty(to).await;
            }
            CorpusEvent::Deleted { path } => {
                self.forget(&path).await;
                self.store.lock().await.remove_source(&path);
            }
            CorpusEvent::ActiveDocumentChanged { path } => self.set_active_path(path).await,
        }
    }

    async fn mark_dirty(&self, path: String) {
        let mut state = self.state.lock().await;
        let deadline = Instant::now() + Duration::from_millis(self.config.debounce_ms);
        state.debounce_deadlines.insert(path, deadline);
    }

    async fn forget(&self, path: &str) {
        let mut state = self.state.lock().await;
        state.debounce_deadlines.remove(path);
        state.active_editing.remove(path);
    }

    async fn set_active_path(&self, path: Option<String>) {
        let mut state = self.state.lock().await;
        if let Some(prev) = state.last_active_path.take() {
            state.active_editing.remove(&prev);
            // Editing stopped; make sure the file is picked up on the next
            // tick even if no further modify event arrives.
            state
                .debounce_deadlines
                .entry(prev)
                .and_modify(|deadline| *deadline = Instant::now())
                .or_insert_with(Instant::now);
        }
        if let Some(p) = &path {
            state.active_editing.insert(p.clone());
        }
        state.last_active_path = path;
    }

    /// Drive the scheduler forward: reindex anything past its debounce
    /// deadline, and once every `periodic_sweep_secs` run a full
    /// consistency sweep in case an event was ever missed (a host restart
    /// mid-edit, a watcher hiccup).
    pub async fn tick(&self) -> CoreResult<()> {
        self.process_due().await?;

        let mut last_sweep = self.last_sweep.lock().await;
        if last_sweep.elapsed() >= Duration::from_secs(self.config.periodic_sweep_secs) {
            *last_sweep = Instant::now();
            drop(last_sweep);
            self.update(false).await?;
        }
        Ok(())
    }

    async fn process_due(&self) -> CoreResult<()> {
        let due = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let due = due_paths(&state.debounce_deadlines, &state.active_editing, now);
            for path in &due {
                state.debounce_deadlines.remove(path);
            }
            due
        };
        if due.is_empty() {
            return Ok(());
        }
        self.update(false).await.map(|_| ())
    }

    /// Run [`Indexer::smart_update`] under the indexing guard.
    pub async fn update(&self, dry_run: bool) -> CoreResult<IndexRunSummary> {
        self.indexing.store(true, Ordering::SeqCst);
        let mut store = self.store.lock().await;
        let result = self.indexer.smart_update(&mut store, dry_run, &self.cancel).await;
        self.indexing.store(false, Ordering::SeqCst);
        result
    }

    /// Run [`Indexer::full_rebuild`] under the indexing guard.
    pub async fn rebuild(&self, dry_run: bool) -> CoreResult<IndexRunSummary> {
        self.indexing.store(true, Ordering::SeqCst);
        let mut store = self.store.lock().await;
        let result = self.indexer.full_rebuild(&mut store, dry_run, &self.cancel).await;
        self.indexing.store(false, Ordering::SeqCst);
        result
    }
}
