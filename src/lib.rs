//! Indexing and retrieval core for a local, retrieval-augmented search
//! engine over a personal markdown-and-image note vault.
//!
//! This crate is a library, not an application: it owns no event loop, no
//! CLI, and no settings file. A host (an editor plugin, typically) supplies
//! file-system events through the [`CorpusHost`] trait, drives the
//! [`Scheduler`] forward from whatever timer it already runs, and reads
//! results back out through [`QueryEngine`].
//!
//! ```text
//! CorpusHost (host-owned) ──events──▶ Scheduler ──▶ Indexer ──▶ VectorStore
//!                                                      │             │
//!                                              EmbeddingProvider     │
//!                                              VisionTextExtractor   │
//!                                                                    ▼
//!                                                             QueryEngine
//! ```
//!
//! | Module | Responsibility |
//! |---|---|
//! | [`models`] | The data types that flow through the pipeline |
//! | [`chunk`] | Pure, I/O-free text chunking |
//! | [`store`] | The brute-force cosine vector store and its JSON persistence |
//! | [`embedding`] | HTTP client for an OpenAI-compatible embeddings endpoint |
//! | [`vision`] | HTTP client for extracting text from images via a vision model |
//! | [`indexer`] | Orchestrates a scan-chunk-embed-commit pass |
//! | [`scheduler`] | Debounced, cooperative scheduling of reindex work |
//! | [`watcher`] | The host-facing [`CorpusHost`] trait and change-event types |
//! | [`query`] | Query-time search and context formatting |
//! | [`progress`] | Structured progress reporting for long-running runs |
//! | [`config`] | Runtime configuration, supplied by the host |
//! | [`error`] | Tagged error enums shared across every component |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod indexer;
pub mod models;
pub mod progress;
pub mod query;
pub mod scheduler;
pub mod store;
pub mod vision;
pub mod watcher;

pub use config::Config;
pub use embedding::{EmbeddingConfig, EmbeddingProvider, HttpEmbeddingClient};
pub use error::{CoreError, CoreResult};
pub use indexer::{IndexRunSummary, Indexer};
pub use models::{ChunkRecord, SearchHit, SourceKind};
pub use progress::{IndexPhase, NoopProgress, ProgressEvent, ProgressSink};
pub use query::QueryEngine;
pub use scheduler::{CancelToken, Scheduler};
pub use store::{IndexStats, VectorStore};
pub use vision::{VisionConfig, VisionTextExtractor};
pub use watcher::{CorpusEvent, CorpusHost, SourceMeta, SourceType};
