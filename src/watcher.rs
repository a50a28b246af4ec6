//! The host-facing surface: an explicit interface for the vault the host
//! owns, plus the file-system change events the host forwards in.
//!
//! Earlier designs let hosts pass in whatever object happened to have the
//! right methods (a duck-typed adapter). That made the boundary implicit
//! and hard to test in isolation, so it is replaced here with a named
//! trait the host implements once.

use async_trait::async_trait;

use crate::error::SourceError;

/// What kind of file a source is, as seen from outside the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Markdown,
    Image,
}

/// Metadata for one source in the vault, as reported by a directory scan.
#[derive(Debug, Clone)]
pub struct SourceMeta {
    pub path: String,
    pub kind: SourceType,
    pub size: u64,
    pub modified_ms: i64,
}

/// The vault the indexing core operates over. The host implements this
/// once; every other component only ever sees a `dyn CorpusHost`.
#[async_trait]
pub trait CorpusHost: Send + Sync {
    /// Every indexable source currently in the vault.
    async fn list_sources(&self) -> Result<Vec<SourceMeta>, SourceError>;

    /// The raw bytes of one source, for checksumming and chunking.
    async fn read_source(&self, path: &str) -> Result<Vec<u8>, SourceError>;

    /// The path of the document the user currently has open for editing,
    /// if any. Used by the scheduler's active-editing liveness rule.
    fn active_path(&self) -> Option<String>;
}

/// A single file-system change the host observed, forwarded in for the
/// scheduler to act on.
#[derive(Debug, Clone)]
pub enum CorpusEvent {
    Modified { path: String },
    Renamed { from: String, to: String },
    Deleted { path: String },
    /// The user switched which document they're actively editing, or
    /// stopped editing entirely (`None`).
    ActiveDocumentChanged { path: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_cheap_to_construct_and_clone() {
        let event = CorpusEvent::Modified {
            path: "notes/a.md".to_string(),
        };
        let cloned = event.clone();
        assert!(matches!(cloned, CorpusEvent::Modified { path } if path == "notes/a.md"));
    }
}
