//! End-to-end scenarios run against stub host and embedding implementations
//! so the full scan → chunk → embed → store → search pipeline is exercised
//! without any real network access.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::Mutex;

use vault_retrieval_core::config::Config;
use vault_retrieval_core::embedding::EmbeddingProvider;
use vault_retrieval_core::error::EmbeddingError;
use vault_retrieval_core::error::SourceError;
use vault_retrieval_core::indexer::Indexer;
use vault_retrieval_core::progress::NoopProgress;
use vault_retrieval_core::query::QueryEngine;
use vault_retrieval_core::scheduler::{CancelToken, Scheduler};
use vault_retrieval_core::store::VectorStore;
use vault_retrieval_core::watcher::{CorpusEvent, CorpusHost, SourceMeta, SourceType};

struct FakeHost {
    sources: StdMutex<HashMap<String, (Vec<u8>, i64, SourceType)>>,
    active: StdMutex<Option<String>>,
}

impl FakeHost {
    fn new() -> Self {
        Self {
            sources: StdMutex::new(HashMap::new()),
            active: StdMutex::new(None),
        }
    }

    fn put(&self, path: &str, text: &str, modified_ms: i64) {
        self.sources.lock().unwrap().insert(
            path.to_string(),
            (text.as_bytes().to_vec(), modified_ms, SourceType::Markdown),
        );
    }

    fn remove(&self, path: &str) {
        self.sources.lock().unwrap().remove(path);
    }
}

#[async_trait]
impl CorpusHost for FakeHost {
    async fn list_sources(&self) -> Result<Vec<SourceMeta>, SourceError> {
        Ok(self
            .sources
            .lock()
            .unwrap()
            .iter()
            .map(|(path, (bytes, modified_ms, kind))| SourceMeta {
                path: path.clone(),
                kind: *kind,
                size: bytes.len() as u64,
                modified_ms: *modified_ms,
            })
            .collect())
    }

    async fn read_source(&self, path: &str) -> Result<Vec<u8>, SourceError> {
        self.sources
            .lock()
            .unwrap()
            .get(path)
            .map(|(bytes, _, _)| bytes.clone())
            .ok_or_else(|| SourceError::Read {
                path: path.to_string(),
                reason: "not found".to_string(),
            })
    }

    fn active_path(&self) -> Option<String> {
        self.active.lock().unwrap().clone()
    }
}

/// Deterministic, non-semantic embedding: buckets character counts into a
/// fixed 4-dimensional vector. Good enough to exercise ordering and
/// dimension invariants without a real model.
struct FakeEmbedder;

fn fake_embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 4];
    for c in text.chars() {
        let idx = match c.to_ascii_lowercase() {
            'a'..='f' => 0,
            'g'..='l' => 1,
            'm'..='r' => 2,
            _ => 3,
        };
        v[idx] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(fake_embed(text))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| fake_embed(t)).collect())
    }

    async fn test(&self) -> Result<(), EmbeddingError> {
        Ok(())
    }
}

fn words(n: usize, prefix: &str) -> String {
    (0..n).map(|i| format!("{prefix}{i}")).collect::<Vec<_>>().join(" ")
}

fn make_indexer(host: Arc<FakeHost>) -> Arc<Indexer> {
    Arc::new(Indexer::new(
        host,
        Arc::new(FakeEmbedder),
        None,
        Arc::new(NoopProgress),
        Config::default(),
    ))
}

#[tokio::test]
async fn full_rebuild_indexes_every_source() {
    let host = Arc::new(FakeHost::new());
    host.put("notes/a.md", &words(30, "alpha"), 1);
    host.put("notes/b.md", &words(30, "beta"), 1);

    let indexer = make_indexer(host);
    let mut store = VectorStore::new("/tmp/e2e-unused.json");
    let cancel = CancelToken::new();

    let summary = indexer.full_rebuild(&mut store, false, &cancel).await.unwrap();
    assert_eq!(summary.sources_updated, 2);
    assert!(store.len() > 0);
    assert!(store.dimension() > 0);
}

#[tokio::test]
async fn smart_update_skips_unchanged_sources() {
    let host = Arc::new(FakeHost::new());
    host.put("notes/a.md", &words(30, "alpha"), 1);

    let indexer = make_indexer(host.clone());
    let mut store = VectorStore::new("/tmp/e2e-unused.json");
    let cancel = CancelToken::new();

    let first = indexer.smart_update(&mut store, false, &cancel).await.unwrap();
    assert_eq!(first.sources_updated, 1);

    let second = indexer.smart_update(&mut store, false, &cancel).await.unwrap();
    assert_eq!(second.sources_updated, 0, "unchanged source should be skipped");

    host.put("notes/a.md", &words(30, "completely-different-text-here"), 2);
    let third = indexer.smart_update(&mut store, false, &cancel).await.unwrap();
    assert_eq!(third.sources_updated, 1, "changed checksum should trigger reindex");
}

#[tokio::test]
async fn deleted_source_is_pruned_on_next_scan() {
    let host = Arc::new(FakeHost::new());
    host.put("notes/a.md", &words(30, "alpha"), 1);
    host.put("notes/b.md", &words(30, "beta"), 1);

    let indexer = make_indexer(host.clone());
    let mut store = VectorStore::new("/tmp/e2e-unused.json");
    let cancel = CancelToken::new();
    indexer.smart_update(&mut store, false, &cancel).await.unwrap();
    assert_eq!(store.stats().total_sources, 2);

    host.remove("notes/b.md");
    indexer.smart_update(&mut store, false, &cancel).await.unwrap();
    assert_eq!(store.stats().total_sources, 1);
}

#[tokio::test]
async fn dry_run_reports_counts_without_touching_store() {
    let host = Arc::new(FakeHost::new());
    host.put("notes/a.md", &words(30, "alpha"), 1);

    let indexer = make_indexer(host);
    let mut store = VectorStore::new("/tmp/e2e-unused.json");
    let cancel = CancelToken::new();

    let summary = indexer.smart_update(&mut store, true, &cancel).await.unwrap();
    assert!(summary.dry_run);
    assert_eq!(summary.sources_updated, 1);
    assert_eq!(store.len(), 0, "dry run must not mutate the store");
}

#[tokio::test]
async fn query_engine_finds_the_most_relevant_chunk() {
    let host = Arc::new(FakeHost::new());
    host.put("notes/a.md", &words(30, "aaaaaaaaaaaaaaaaa"), 1);
    host.put("notes/b.md", &words(30, "mnopqr"), 1);

    let indexer = make_indexer(host);
    let mut store = VectorStore::new("/tmp/e2e-unused.json");
    let cancel = CancelToken::new();
    indexer.full_rebuild(&mut store, false, &cancel).await.unwrap();

    let store = Arc::new(Mutex::new(store));
    let engine = QueryEngine::new(
        store,
        Arc::new(FakeEmbedder),
        vault_retrieval_core::config::RetrievalConfig::default(),
    );

    let hits = engine.search("aaaaaaaaaa", -1.0).await.unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].record.source_path, "notes/a.md");
}

#[tokio::test]
async fn scheduler_defers_reindex_while_source_is_actively_edited() {
    let host = Arc::new(FakeHost::new());
    host.put("notes/a.md", &words(30, "alpha"), 1);

    let indexer = make_indexer(host.clone());
    let store = Arc::new(Mutex::new(VectorStore::new("/tmp/e2e-unused.json")));
    let mut scheduler_config = vault_retrieval_core::config::SchedulerConfig::default();
    scheduler_config.debounce_ms = 0;
    let scheduler = Scheduler::new(indexer, store.clone(), scheduler_config);

    scheduler
        .on_event(CorpusEvent::ActiveDocumentChanged {
            path: Some("notes/a.md".to_string()),
        })
        .await;
    scheduler
        .on_event(CorpusEvent::Modified {
            path: "notes/a.md".to_string(),
        })
        .await;

    // Still being edited: a tick must not reindex it yet.
    scheduler.tick().await.unwrap();
    assert_eq!(store.lock().await.len(), 0);

    // Editing stops: the next tick picks it up.
    scheduler
        .on_event(CorpusEvent::ActiveDocumentChanged { path: None })
        .await;
    scheduler.tick().await.unwrap();
    assert!(store.lock().await.len() > 0);
}
