//! Orchestrates a single indexing pass: scan the vault, decide which
//! sources changed, chunk and embed them, and commit the result to the
//! [`VectorStore`].

use std::collections::HashSet;
use std::sync::Arc;

use crate::chunk::chunk_text_with_bounds;
use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::{CoreError, CoreResult, SourceError};
use crate::models::{ChunkRecord, SourceKind};
use crate::progress::{IndexPhase, ProgressEvent, ProgressSink};
use crate::scheduler::CancelToken;
use crate::store::VectorStore;
use crate::vision::VisionTextExtractor;
use crate::watcher::{CorpusHost, SourceMeta, SourceType};

/// Counts from one completed `smart_update` or `full_rebuild` call.
#[derive(Debug, Clone, Default)]
pub struct IndexRunSummary {
    pub sources_scanned: usize,
    pub sources_updated: usize,
    pub sources_removed: usize,
    pub chunks_embedded: usize,
    pub dry_run: bool,
}

pub struct Indexer {
    host: Arc<dyn CorpusHost>,
    embedder: Arc<dyn EmbeddingProvider>,
    vision: Option<Arc<dyn VisionTextExtractor>>,
    progress: Arc<dyn ProgressSink>,
    config: Config,
}

impl Indexer {
    pub fn new(
        host: Arc<dyn CorpusHost>,
        embedder: Arc<dyn EmbeddingProvider>,
        vision: Option<Arc<dyn VisionTextExtractor>>,
        progress: Arc<dyn ProgressSink>,
        config: Config,
    ) -> Self {
        Self {
            host,
            embedder,
            vision,
            progress,
            config,
        }
    }

    /// Reindex only sources whose checksum has changed since the store was
    /// last updated, and drop chunks for sources that no longer exist.
    pub async fn smart_update(
        &self,
        store: &mut VectorStore,
        dry_run: bool,
        cancel: &CancelToken,
    ) -> CoreResult<IndexRunSummary> {
        self.run(store, dry_run, false, cancel).await
    }

    /// Reindex every source regardless of checksum, as if the store were
    /// empty. Existing chunks are replaced source-by-source rather than
    /// cleared up front, so a rebuild interrupted partway through still
    /// leaves a usable (if stale) index behind.
    pub async fn full_rebuild(
        &self,
        store: &mut VectorStore,
        dry_run: bool,
        cancel: &CancelToken,
    ) -> CoreResult<IndexRunSummary> {
        self.run(store, dry_run, true, cancel).await
    }

    /// Retry connecting to the embedding endpoint up to 10 times, 2 seconds
    /// apart, before giving up. Called by the host before a long indexing
    /// run so a transient cold-start failure doesn't abort immediately.
    pub async fn ensure_connection(&self) -> CoreResult<()> {
        const ATTEMPTS: u32 = 10;
        const SPACING: std::time::Duration = std::time::Duration::from_secs(2);

        let mut last_err = None;
        for attempt in 1..=ATTEMPTS {
            match self.embedder.test().await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(attempt, %err, "embedding endpoint not ready");
                    last_err = Some(err);
                    if attempt < ATTEMPTS {
                        tokio::time::sleep(SPACING).await;
                    }
                }
            }
        }
        Err(CoreError::Embedding(last_err.expect("at least one attempt runs")))
    }

    async fn run(
        &self,
        store: &mut VectorStore,
        dry_run: bool,
        force: bool,
        cancel: &CancelToken,
    ) -> CoreResult<IndexRunSummary> {
        self.progress.report(ProgressEvent::PhaseStarted {
            phase: IndexPhase::Scanning,
        });
        let sources = self
            .host
            .list_sources()
            .await
            .map_err(CoreError::Source)?;
        self.progress.report(ProgressEvent::SourcesDiscovered {
            total: sources.len(),
        });
        self.progress.report(ProgressEvent::PhaseCompleted {
            phase: IndexPhase::Scanning,
        });

        self.progress.report(ProgressEvent::PhaseStarted {
            phase: IndexPhase::Indexing,
        });

        let mut summary = IndexRunSummary {
            sources_scanned: sources.len(),
            dry_run,
            ..Default::default()
        };

        let existing_paths: HashSet<String> = sources.iter().map(|s| s.path.clone()).collect();
        if !dry_run {
            summary.sources_removed = store.remove_sources_not_in(&existing_paths);
        }

        for (i, meta) in sources.iter().enumerate() {
            if cancel.is_cancelled() {
                if !dry_run {
                    store.save().await?;
                }
                return Err(CoreError::Cancelled);
            }

            match self.process_source(meta, store, dry_run, force).await {
                Ok(Some(chunk_count)) => {
                    summary.sources_updated += 1;
                    summary.chunks_embedded += chunk_count;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(path = %meta.path, %err, "failed to index source, skipping");
                    self.progress.report(ProgressEvent::SourceError {
                        path: meta.path.clone(),
                        message: err.to_string(),
                    });
                }
            }

            self.progress.report(ProgressEvent::SourceCompleted {
                path: meta.path.clone(),
                sources_done: i + 1,
                sources_total: sources.len(),
            });

            if !dry_run && (i + 1) % 10 == 0 {
                store.save().await?;
            }
        }

        if !dry_run {
            store.save().await?;
        }

        self.progress.report(ProgressEvent::PhaseCompleted {
            phase: IndexPhase::Indexing,
        });
        Ok(summary)
    }

    /// Returns `Ok(Some(chunk_count))` if the source was (or, in dry-run
    /// mode, would be) reindexed, `Ok(None)` if it was already current.
    async fn process_source(
        &self,
        meta: &SourceMeta,
        store: &mut VectorStore,
        dry_run: bool,
        force: bool,
    ) -> CoreResult<Option<usize>> {
        let bytes = self
            .host
            .read_source(&meta.path)
            .await
            .map_err(CoreError::Source)?;

        let (text, checksum, extracted_text) = match meta.kind {
            SourceType::Markdown => {
                let text = String::from_utf8(bytes).map_err(|err| {
                    CoreError::Source(SourceError::Read {
                        path: meta.path.clone(),
                        reason: err.to_string(),
                    })
                })?;
                let checksum = crc32_hex(text.as_bytes());
                (Some(text), checksum, false)
            }
            SourceType::Image => match &self.vision {
                Some(vision) if self.config.vision.enabled => {
                    match vision.extract(&bytes, &meta.path).await {
                        Ok(Some(text)) => {
                            let checksum = crc32_hex(text.as_bytes());
                            (Some(text), checksum, true)
                        }
                        Ok(None) => (None, crc32_hex(&bytes), true),
                        Err(err) => return Err(CoreError::Vision(err)),
                    }
                }
                _ => return Ok(None),
            },
        };

        if !force && !store.source_needs_update(&meta.path, &checksum) {
            return Ok(None);
        }

        let Some(text) = text else {
            // Vision found nothing legible; drop any prior chunks for this
            // source rather than leaving stale text indexed.
            if !dry_run {
                store.remove_source(&meta.path);
            }
            return Ok(Some(0));
        };

        let bounds = &self.config.chunking;
        let pieces = chunk_text_with_bounds(
            &text,
            bounds.target_words,
            bounds.max_words,
            bounds.min_words,
        );

        if dry_run {
            return Ok(Some(pieces.len()));
        }

        let vectors = if pieces.is_empty() {
            Vec::new()
        } else {
            self.embedder
                .embed_many(&pieces)
                .await
                .map_err(CoreError::Embedding)?
        };

        self.progress.report(ProgressEvent::ChunksEmbedded {
            completed: vectors.len(),
            total: vectors.len(),
        });

        let source_name = basename(&meta.path);
        let source_kind = match meta.kind {
            SourceType::Markdown => SourceKind::Markdown,
            SourceType::Image => SourceKind::Image,
        };
        // Images never run frontmatter/heading derivation over their
        // transcribed text; the title is always the literal source name.
        let title = match meta.kind {
            SourceType::Markdown => derive_title(&text, &meta.path),
            SourceType::Image => format!("Image: {source_name}"),
        };

        let records: Vec<ChunkRecord> = pieces
            .into_iter()
            .zip(vectors.into_iter())
            .enumerate()
            .map(|(idx, (paragraph_text, vector))| ChunkRecord {
                id: ChunkRecord::chunk_id(&meta.path, idx),
                vector,
                source_path: meta.path.clone(),
                source_name: source_name.clone(),
                title: title.clone(),
                paragraph_index: idx,
                paragraph_text,
                source_checksum: checksum.clone(),
                last_modified: meta.modified_ms,
                source_size: meta.size,
                source_kind,
                extracted_text,
            })
            .collect();

        let count = records.len();
        store.upsert_source(&meta.path, records)?;
        Ok(Some(count))
    }
}

fn crc32_hex(bytes: &[u8]) -> String {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    format!("{:08x}", hasher.finalize())
}

fn basename(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// Strips a trailing `.ext` from a basename, for use in title derivation
/// only — `source_name` keeps the extension.
fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// Frontmatter `title:`, else the first heading, else the file's basename
/// with its extension stripped.
fn derive_title(text: &str, path: &str) -> String {
    let mut lines = text.lines();
    if let Some(first) = lines.next() {
        if first.trim() == "---" {
            for line in lines.by_ref() {
                if line.trim() == "---" {
                    break;
                }
                if let Some(rest) = line.trim().strip_prefix("title:") {
                    let title = rest.trim().trim_matches('"').trim_matches('\'');
                    if !title.is_empty() {
                        return title.to_string();
                    }
                }
            }
        }
    }

    for line in text.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("# ") {
            return rest.trim().to_string();
        }
    }

    strip_extension(&basename(path)).to_string()
}
