//! Brute-force cosine vector store, persisted as a single JSON document.
//!
//! There is no index structure beyond a flat `Vec<ChunkRecord>`: search is a
//! linear scan that scores every chunk and keeps the top results. For a
//! personal vault this is fast enough and avoids the maintenance cost of an
//! approximate-nearest-neighbor structure (an explicit non-goal).

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::models::{ChunkRecord, IndexDocument, SearchHit, SourceKindCounts, SCHEMA_VERSION};

/// Aggregate counts reported by [`VectorStore::stats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexStats {
    pub total_chunks: usize,
    pub total_sources: usize,
    pub dimension: usize,
    pub last_updated: i64,
    pub by_kind: SourceKindCounts,
}

/// The in-memory index plus its on-disk location.
pub struct VectorStore {
    path: PathBuf,
    doc: IndexDocument,
}

impl VectorStore {
    /// An empty store at `path`, not yet loaded or saved.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            doc: IndexDocument::default(),
        }
    }

    /// Load the index document at `path`. Any failure to read, parse, or a
    /// `schema_version` mismatch is treated identically: the store starts
    /// empty. A corrupt or stale index file is never fatal to startup.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<IndexDocument>(&bytes) {
                Ok(doc) if doc.schema_version == SCHEMA_VERSION => doc,
                Ok(doc) => {
                    tracing::warn!(
                        found = doc.schema_version,
                        expected = SCHEMA_VERSION,
                        "discarding index with mismatched schema version"
                    );
                    IndexDocument::default()
                }
                Err(err) => {
                    tracing::warn!(%err, path = %path.display(), "failed to parse index document, starting empty");
                    IndexDocument::default()
                }
            },
            Err(err) => {
                tracing::debug!(%err, path = %path.display(), "no existing index found, starting empty");
                IndexDocument::default()
            }
        };
        Self { path, doc }
    }

    /// Write the current in-memory state to `path` via a temp file and
    /// rename, so a crash mid-write never leaves a truncated index on disk.
    pub async fn save(&self) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&self.doc)
            .map_err(|err| StoreError::StoreIo(err.to_string()))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| StoreError::StoreIo(err.to_string()))?;
        }

        let tmp_path = tmp_path_for(&self.path);
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|err| StoreError::StoreIo(err.to_string()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|err| StoreError::StoreIo(err.to_string()))?;

        Ok(())
    }

    /// The embedding dimension locked in by the first chunk ever inserted,
    /// or 0 if the store is empty.
    pub fn dimension(&self) -> usize {
        self.doc.dimension
    }

    pub fn len(&self) -> usize {
        self.doc.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.chunks.is_empty()
    }

    /// Replace every chunk previously stored for `source_path` with
    /// `records`. All vectors in `records`, and the store's locked-in
    /// dimension if one already exists, must agree in length.
    pub fn upsert_source(
        &mut self,
        source_path: &str,
        records: Vec<ChunkRecord>,
    ) -> Result<(), StoreError> {
        let expected = if self.doc.dimension != 0 {
            Some(self.doc.dimension)
        } else {
            records.first().map(|r| r.vector.len())
        };

        if let Some(expected) = expected {
            for record in &records {
                if record.vector.len() != expected {
                    return Err(StoreError::DimensionMismatch {
                        expected,
                        got: record.vector.len(),
                    });
                }
            }
        }

        self.doc.chunks.retain(|c| c.source_path != source_path);
        self.doc.chunks.extend(records);

        if self.doc.dimension == 0 {
            if let Some(expected) = expected {
                self.doc.dimension = expected;
            }
        }
        self.doc.last_updated = now_millis();
        Ok(())
    }

    /// Drop every chunk for `source_path`. Returns whether anything changed.
    pub fn remove_source(&mut self, source_path: &str) -> bool {
        let before = self.doc.chunks.len();
        self.doc.chunks.retain(|c| c.source_path != source_path);
        let changed = self.doc.chunks.len() != before;
        if changed {
            self.doc.last_updated = now_millis();
        }
        changed
    }

    /// Drop every chunk whose source is not in `existing`. Used after a full
    /// vault scan to prune chunks for files that have since been deleted.
    pub fn remove_sources_not_in(&mut self, existing: &HashSet<String>) -> usize {
        let before = self.doc.chunks.len();
        self.doc
            .chunks
            .retain(|c| existing.contains(&c.source_path));
        let removed = before - self.doc.chunks.len();
        if removed > 0 {
            self.doc.last_updated = now_millis();
        }
        removed
    }

    /// Whether `source_path` is missing from the index entirely, or present
    /// with a different checksum than `checksum`.
    pub fn source_needs_update(&self, source_path: &str, checksum: &str) -> bool {
        match self
            .doc
            .chunks
            .iter()
            .find(|c| c.source_path == source_path)
        {
            Some(existing) => existing.source_checksum != checksum,
            None => true,
        }
    }

    /// Score every chunk against `query` and return the `top_k` highest
    /// with similarity at least `threshold`, sorted by descending
    /// similarity.
    pub fn search(&self, query: &[f32], top_k: usize, threshold: f32) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = self
            .score_all(query)
            .into_iter()
            .filter(|hit| hit.similarity >= threshold)
            .collect();
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        hits.truncate(top_k);
        hits
    }

    /// Like [`search`](Self::search), but buckets hits by source and caps
    /// both how many hits come from any one source (`max_per_source`) and
    /// how many distinct sources are represented at all (`max_sources`).
    ///
    /// Candidates are drawn from `search` with `2 * max_sources *
    /// max_per_source` headroom, so a source whose best hit ranks outside
    /// the raw top-k can still surface once per-source caps are applied.
    /// Buckets are ordered by their own best hit, so the first bucket's
    /// first hit always equals the unbounded top hit for the same query
    /// and threshold.
    pub fn search_grouped(
        &self,
        query: &[f32],
        threshold: f32,
        max_sources: usize,
        max_per_source: usize,
    ) -> Vec<SearchHit> {
        let headroom = 2 * max_sources.max(1) * max_per_source.max(1);
        let candidates = self.search(query, headroom, threshold);

        let mut buckets: Vec<(String, Vec<SearchHit>)> = Vec::new();
        for hit in candidates {
            if let Some(bucket) = buckets
                .iter_mut()
                .find(|(path, _)| *path == hit.record.source_path)
            {
                if bucket.1.len() < max_per_source {
                    bucket.1.push(hit);
                }
            } else if buckets.len() < max_sources {
                buckets.push((hit.record.source_path.clone(), vec![hit]));
            }
        }

        buckets.into_iter().flat_map(|(_, hits)| hits).collect()
    }

    fn score_all(&self, query: &[f32]) -> Vec<SearchHit> {
        self.doc
            .chunks
            .iter()
            .map(|record| SearchHit {
                record: record.clone(),
                similarity: cosine_similarity(query, &record.vector),
            })
            .collect()
    }

    pub fn stats(&self) -> IndexStats {
        let mut sources = HashSet::new();
        let mut by_kind = SourceKindCounts::default();
        for chunk in &self.doc.chunks {
            sources.insert(chunk.source_path.as_str());
            match chunk.source_kind {
                crate::models::SourceKind::Markdown => by_kind.markdown_chunks += 1,
                crate::models::SourceKind::Image => by_kind.image_chunks += 1,
            }
        }
        IndexStats {
            total_chunks: self.doc.chunks.len(),
            total_sources: sources.len(),
            dimension: self.doc.dimension,
            last_updated: self.doc.last_updated,
            by_kind,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Cosine similarity between two vectors. Mismatched lengths or a zero-norm
/// vector score 0.0 rather than panicking or producing NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    fn record(path: &str, idx: usize, vector: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            id: ChunkRecord::chunk_id(path, idx),
            vector,
            source_path: path.to_string(),
            source_name: path.to_string(),
            title: path.to_string(),
            paragraph_index: idx,
            paragraph_text: format!("chunk {idx}"),
            source_checksum: "abc123".to_string(),
            last_modified: 0,
            source_size: 0,
            source_kind: SourceKind::Markdown,
            extracted_text: false,
        }
    }

    #[test]
    fn cosine_similarity_identical_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn cosine_similarity_mismatched_length_is_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn upsert_locks_in_dimension() {
        let mut store = VectorStore::new("/tmp/does-not-matter.json");
        store
            .upsert_source("a.md", vec![record("a.md", 0, vec![1.0, 0.0])])
            .unwrap();
        assert_eq!(store.dimension(), 2);

        let err = store
            .upsert_source("b.md", vec![record("b.md", 0, vec![1.0, 0.0, 0.0])])
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch { expected: 2, got: 3 }
        ));
    }

    #[test]
    fn upsert_replaces_prior_chunks_for_same_source() {
        let mut store = VectorStore::new("/tmp/does-not-matter.json");
        store
            .upsert_source(
                "a.md",
                vec![record("a.md", 0, vec![1.0, 0.0]), record("a.md", 1, vec![0.0, 1.0])],
            )
            .unwrap();
        assert_eq!(store.len(), 2);

        store
            .upsert_source("a.md", vec![record("a.md", 0, vec![1.0, 0.0])])
            .unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn search_is_sorted_descending() {
        let mut store = VectorStore::new("/tmp/does-not-matter.json");
        store
            .upsert_source(
                "a.md",
                vec![
                    record("a.md", 0, vec![1.0, 0.0]),
                    record("a.md", 1, vec![0.0, 1.0]),
                    record("a.md", 2, vec![0.7, 0.7]),
                ],
            )
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 10, 0.0);
        assert_eq!(hits.len(), 3);
        for window in hits.windows(2) {
            assert!(window[0].similarity >= window[1].similarity);
        }
        assert_eq!(hits[0].record.paragraph_index, 0);
    }

    #[test]
    fn search_grouped_caps_hits_per_source() {
        let mut store = VectorStore::new("/tmp/does-not-matter.json");
        let records = (0..5)
            .map(|i| record("a.md", i, vec![1.0, 0.0]))
            .collect();
        store.upsert_source("a.md", records).unwrap();
        store
            .upsert_source("b.md", vec![record("b.md", 0, vec![1.0, 0.0])])
            .unwrap();

        let hits = store.search_grouped(&[1.0, 0.0], 0.0, 10, 2);
        let from_a = hits.iter().filter(|h| h.record.source_path == "a.md").count();
        assert_eq!(from_a, 2);
        assert!(hits.iter().any(|h| h.record.source_path == "b.md"));
    }

    #[test]
    fn search_grouped_caps_number_of_sources() {
        let mut store = VectorStore::new("/tmp/does-not-matter.json");
        for name in ["a.md", "b.md", "c.md"] {
            store
                .upsert_source(name, vec![record(name, 0, vec![1.0, 0.0])])
                .unwrap();
        }

        let hits = store.search_grouped(&[1.0, 0.0], 0.0, 2, 5);
        let sources: HashSet<String> = hits.iter().map(|h| h.record.source_path.clone()).collect();
        assert_eq!(sources.len(), 2);
    }

    #[test]
    fn search_applies_similarity_threshold() {
        let mut store = VectorStore::new("/tmp/does-not-matter.json");
        store
            .upsert_source(
                "a.md",
                vec![
                    record("a.md", 0, vec![1.0, 0.0]),
                    record("a.md", 1, vec![0.0, 1.0]),
                ],
            )
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 10, 0.5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.paragraph_index, 0);
    }

    #[test]
    fn remove_sources_not_in_prunes_deleted_files() {
        let mut store = VectorStore::new("/tmp/does-not-matter.json");
        store
            .upsert_source("a.md", vec![record("a.md", 0, vec![1.0, 0.0])])
            .unwrap();
        store
            .upsert_source("b.md", vec![record("b.md", 0, vec![1.0, 0.0])])
            .unwrap();

        let existing: HashSet<String> = ["a.md".to_string()].into_iter().collect();
        let removed = store.remove_sources_not_in(&existing);
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn load_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let store = VectorStore::load(&path).await;
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn load_tolerates_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        let store = VectorStore::load(&path).await;
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn load_tolerates_wrong_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let stale = serde_json::json!({
            "schema_version": 1,
            "dimension": 2,
            "last_updated": 0,
            "chunks": [],
        });
        tokio::fs::write(&path, serde_json::to_vec(&stale).unwrap())
            .await
            .unwrap();
        let store = VectorStore::load(&path).await;
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let mut store = VectorStore::new(&path);
        store
            .upsert_source("a.md", vec![record("a.md", 0, vec![1.0, 0.0])])
            .unwrap();
        store.save().await.unwrap();

        let reloaded = VectorStore::load(&path).await;
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.dimension(), 2);
    }
}
