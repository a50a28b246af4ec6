//! The read side: turn a natural-language query into an embedding, search
//! the store, and format hits for injection into a chat model's context.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{CoreError, CoreResult};
use crate::models::SearchHit;
use crate::store::VectorStore;

const RELEVANT_NOTES_BANNER: &str = "--- RELEVANT NOTES ---\n\n";

/// A query result grouped by source path. Order matches [`VectorStore::search_grouped`]'s
/// bucket order: the first entry's first hit is always the same hit
/// `search` would rank first for the same query and threshold.
pub type GroupedHits = Vec<(String, Vec<SearchHit>)>;

pub struct QueryEngine {
    store: Arc<Mutex<VectorStore>>,
    embedder: Arc<dyn EmbeddingProvider>,
    retrieval: RetrievalConfig,
}

impl QueryEngine {
    pub fn new(
        store: Arc<Mutex<VectorStore>>,
        embedder: Arc<dyn EmbeddingProvider>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            retrieval,
        }
    }

    /// Plain top-k search, no cap on hits per source. Only hits with
    /// similarity at least `threshold` are returned.
    pub async fn search(&self, query_text: &str, threshold: f32) -> CoreResult<Vec<SearchHit>> {
        let vector = self
            .embedder
            .embed_one(query_text)
            .await
            .map_err(CoreError::Embedding)?;
        let store = self.store.lock().await;
        Ok(store.search(&vector, self.retrieval.top_k, threshold))
    }

    /// Search capped at `max_chunks_per_source` hits from any one source
    /// and `max_sources` distinct sources, grouped by source path with
    /// each source's hits sorted by `paragraph_index` ascending for
    /// readability. Group order follows each source's best hit, so the
    /// first group's first hit is the overall top hit.
    pub async fn search_grouped(&self, query_text: &str, threshold: f32) -> CoreResult<GroupedHits> {
        let vector = self
            .embedder
            .embed_one(query_text)
            .await
            .map_err(CoreError::Embedding)?;
        let store = self.store.lock().await;
        let flat = store.search_grouped(
            &vector,
            threshold,
            self.retrieval.max_sources,
            self.retrieval.max_chunks_per_source,
        );
        drop(store);

        let mut grouped: GroupedHits = Vec::new();
        for hit in flat {
            match grouped
                .iter_mut()
                .find(|(path, _)| *path == hit.record.source_path)
            {
                Some((_, hits)) => hits.push(hit),
                None => grouped.push((hit.record.source_path.clone(), vec![hit])),
            }
        }
        for (_, hits) in grouped.iter_mut() {
            hits.sort_by_key(|hit| hit.record.paragraph_index);
        }
        Ok(grouped)
    }

    /// Render flat `hits` as a context block for a downstream chat model,
    /// capped at `max_chars` (falling back to the configured budget).
    /// Prefixed with the fixed `--- RELEVANT NOTES ---` banner; each hit's
    /// header carries its similarity as a percentage. Hits are dropped
    /// whole from the end rather than truncated mid-hit; a footer reports
    /// how many were left out.
    pub fn format_for_context(&self, hits: &[SearchHit], max_chars: Option<usize>) -> String {
        if hits.is_empty() {
            return String::new();
        }

        let budget = max_chars.unwrap_or(self.retrieval.context_char_budget);
        let mut out = String::from(RELEVANT_NOTES_BANNER);
        let mut included = 0;

        for hit in hits {
            let block = format!(
                "### {} ({}) — {:.0}% match\n{}\n\n",
                hit.record.title,
                hit.record.source_path,
                hit.similarity * 100.0,
                hit.record.paragraph_text
            );
            if included > 0 && out.len() + block.len() > budget {
                break;
            }
            out.push_str(&block);
            included += 1;
        }

        let omitted = hits.len() - included;
        if omitted > 0 {
            out.push_str(&format!("({omitted} more matches omitted)\n"));
        }

        out
    }

    /// Like [`format_for_context`](Self::format_for_context), but for
    /// grouped results: each source gets its own section, and each hit's
    /// header carries both its paragraph index and similarity percentage.
    pub fn format_grouped_for_context(&self, groups: &GroupedHits, max_chars: Option<usize>) -> String {
        if groups.is_empty() {
            return String::new();
        }

        let budget = max_chars.unwrap_or(self.retrieval.context_char_budget);
        let mut out = String::from(RELEVANT_NOTES_BANNER);
        let mut included = 0;
        let total_hits: usize = groups.iter().map(|(_, hits)| hits.len()).sum();
        let mut included_hits = 0;

        for (source_path, hits) in groups {
            let mut sorted_hits: Vec<&SearchHit> = hits.iter().collect();
            sorted_hits.sort_by_key(|hit| hit.record.paragraph_index);

            let mut section = format!("### {source_path}\n");
            for hit in sorted_hits {
                section.push_str(&format!(
                    "- [¶{}] {:.0}% match: {}\n",
                    hit.record.paragraph_index,
                    hit.similarity * 100.0,
                    hit.record.paragraph_text
                ));
            }
            section.push('\n');

            if included > 0 && out.len() + section.len() > budget {
                break;
            }
            out.push_str(&section);
            included += 1;
            included_hits += hits.len();
        }

        let omitted = total_hits - included_hits;
        if omitted > 0 {
            out.push_str(&format!("({omitted} more matches omitted)\n"));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkRecord, SourceKind};

    fn hit(path: &str, idx: usize, text: &str) -> SearchHit {
        SearchHit {
            record: ChunkRecord {
                id: ChunkRecord::chunk_id(path, idx),
                vector: vec![1.0],
                source_path: path.to_string(),
                source_name: path.to_string(),
                title: "Title".to_string(),
                paragraph_index: idx,
                paragraph_text: text.to_string(),
                source_checksum: "0".to_string(),
                last_modified: 0,
                source_size: 0,
                source_kind: SourceKind::Markdown,
                extracted_text: false,
            },
            similarity: 0.9,
        }
    }

    fn engine() -> QueryEngine {
        QueryEngine::new(
            Arc::new(Mutex::new(VectorStore::new("/tmp/unused.json"))),
            Arc::new(crate::embedding::HttpEmbeddingClient::new(Default::default())),
            RetrievalConfig::default(),
        )
    }

    #[test]
    fn format_includes_banner_and_similarity() {
        let engine = engine();
        let hits = vec![hit("a.md", 0, "alpha")];
        let out = engine.format_for_context(&hits, Some(10_000));
        assert!(out.starts_with("--- RELEVANT NOTES ---"));
        assert!(out.contains("90% match"));
        assert!(out.contains("alpha"));
    }

    #[test]
    fn format_includes_all_hits_within_budget() {
        let engine = engine();
        let hits = vec![hit("a.md", 0, "alpha"), hit("b.md", 0, "beta")];
        let out = engine.format_for_context(&hits, Some(10_000));
        assert!(out.contains("alpha"));
        assert!(out.contains("beta"));
        assert!(!out.contains("omitted"));
    }

    #[test]
    fn format_drops_whole_hits_when_over_budget() {
        let engine = engine();
        let hits = vec![
            hit("a.md", 0, "alpha"),
            hit("b.md", 0, "beta"),
            hit("c.md", 0, "gamma"),
        ];
        let out = engine.format_for_context(&hits, Some(1));
        // Always includes at least the first hit, never truncates mid-hit.
        assert!(out.contains("alpha"));
        assert!(!out.contains("beta"));
        assert!(out.contains("2 more matches omitted"));
    }

    #[test]
    fn format_empty_hits_is_empty_string() {
        let engine = engine();
        let out = engine.format_for_context(&[], Some(500));
        assert_eq!(out, "");
    }

    #[test]
    fn format_grouped_sorts_paragraph_indices_for_readability() {
        let engine = engine();
        let groups: GroupedHits = vec![(
            "a.md".to_string(),
            vec![hit("a.md", 2, "second"), hit("a.md", 0, "first")],
        )];
        let out = engine.format_grouped_for_context(&groups, Some(10_000));
        assert!(out.starts_with("--- RELEVANT NOTES ---"));
        assert!(out.find("[¶0]").unwrap() < out.find("[¶2]").unwrap());
    }

    #[test]
    fn format_grouped_empty_is_empty_string() {
        let engine = engine();
        let out = engine.format_grouped_for_context(&Vec::new(), Some(500));
        assert_eq!(out, "");
    }
}
