//! Core data types that flow through the indexing and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// Current on-disk schema version. Loading any other version discards the
/// index and starts empty (see [`crate::store::VectorStore::load`]).
pub const SCHEMA_VERSION: u32 = 2;

/// What kind of file a chunk was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Markdown,
    Image,
}

/// A single persisted chunk record — the only first-class entity in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Stable identifier: `"<source_path>#c<paragraph_index>"`.
    pub id: String,
    /// Embedding vector. Length is fixed for the lifetime of a non-empty index.
    pub vector: Vec<f32>,
    /// Path of the note or image the chunk came from.
    pub source_path: String,
    /// Display basename.
    pub source_name: String,
    /// Derived title (frontmatter, first heading, or basename).
    pub title: String,
    /// 0-based, contiguous ordinal within the source.
    pub paragraph_index: usize,
    /// The exact chunk text that was embedded.
    pub paragraph_text: String,
    /// Hex-encoded CRC32 of the source's bytes (markdown) or extracted text (image).
    pub source_checksum: String,
    /// Source mtime in milliseconds since the epoch.
    pub last_modified: i64,
    /// Source size in bytes.
    pub source_size: u64,
    /// Markdown or image.
    pub source_kind: SourceKind,
    /// True only for image-derived chunks.
    pub extracted_text: bool,
}

impl ChunkRecord {
    pub fn chunk_id(source_path: &str, paragraph_index: usize) -> String {
        format!("{source_path}#c{paragraph_index}")
    }
}

/// The persisted index document: header metadata plus the chunk list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDocument {
    pub schema_version: u32,
    /// Embedding length; 0 until the first chunk is inserted.
    pub dimension: usize,
    /// Timestamp in milliseconds since the epoch of the last committed write.
    pub last_updated: i64,
    /// Ordered chunk list. Order is not semantically meaningful but is
    /// preserved across save/load for stability.
    pub chunks: Vec<ChunkRecord>,
}

impl Default for IndexDocument {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            dimension: 0,
            last_updated: 0,
            chunks: Vec::new(),
        }
    }
}

/// A single search hit, paired with its similarity to the query.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record: ChunkRecord,
    pub similarity: f32,
}

/// Per-source-kind breakdown used by [`crate::store::IndexStats`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SourceKindCounts {
    pub markdown_chunks: usize,
    pub image_chunks: usize,
}
