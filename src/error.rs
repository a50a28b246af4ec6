//! Tagged error enums for every component family.
//!
//! Each variant corresponds to an error kind named in the design's error
//! handling section. No variant wraps a foreign error type directly in its
//! `Display` output — messages are rendered as plain strings so the core
//! never leaks transport or serialization library identities to callers.

use thiserror::Error;

/// Errors raised by [`crate::store::VectorStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("vector length {got} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("index file I/O failed: {0}")]
    StoreIo(String),
}

/// Errors raised by [`crate::embedding::EmbeddingProvider`] implementations.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding request failed (transient): {0}")]
    Transient(String),

    #[error("embedding response malformed: {0}")]
    Protocol(String),
}

/// Errors raised by [`crate::vision::VisionTextExtractor`] implementations.
#[derive(Error, Debug)]
pub enum VisionError {
    #[error("vision model does not support image input")]
    Unsupported,

    #[error("vision extraction request failed: {0}")]
    Protocol(String),
}

/// Errors raised while reading a single corpus source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read source {path}: {reason}")]
    Read { path: String, reason: String },
}

/// Top-level error returned from indexing and query operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("operation cancelled")]
    Cancelled,
}

pub type CoreResult<T> = Result<T, CoreError>;
