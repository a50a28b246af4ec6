//! Progress reporting for long-running indexing operations.
//!
//! The host owns presentation (a status bar, a log pane); this crate only
//! emits structured events through a [`ProgressSink`] so the two concerns
//! stay decoupled.

use std::sync::Mutex;

/// Which stage of an indexing run is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPhase {
    /// Walking the corpus to find sources needing (re)indexing.
    Scanning,
    /// Chunking and embedding sources.
    Indexing,
}

/// A single progress notification. Scanning is reported in source units;
/// indexing is reported in chunk units, since embedding cost scales with
/// chunk count rather than source count.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    PhaseStarted { phase: IndexPhase },
    /// Scanning found `total` sources needing an update.
    SourcesDiscovered { total: usize },
    /// One source finished its full chunk+embed pipeline.
    SourceCompleted { path: String, sources_done: usize, sources_total: usize },
    /// `completed` of `total` chunks across the whole run have been embedded.
    ChunksEmbedded { completed: usize, total: usize },
    PhaseCompleted { phase: IndexPhase },
    /// A single source failed; the run continues with the rest.
    SourceError { path: String, message: String },
}

/// Anything that wants to observe indexing progress.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Discards every event. The default when the host doesn't care.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Collects every event in order, for tests and for hosts that want to
/// inspect a run's history after the fact rather than stream it live.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().expect("progress lock poisoned").clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().expect("progress lock poisoned").push(event);
    }
}
