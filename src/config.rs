//! Runtime configuration.
//!
//! Unlike the typical standalone tool, this crate never reads a config file
//! or an environment variable itself — the host owns its own settings
//! store (plugin preferences, a TOML file, whatever) and constructs this
//! struct from whatever it finds there. This module only validates.

use crate::embedding::EmbeddingConfig;
use crate::vision::VisionConfig;

/// Chunking knobs. The target/max/min word bounds are part of the chunking
/// algorithm's contract and are not expected to change per-vault, but are
/// exposed here in case a host wants to tune them for unusually dense or
/// sparse notes.
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub target_words: usize,
    pub max_words: usize,
    pub min_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_words: 200,
            max_words: 250,
            min_words: 10,
        }
    }
}

/// Retrieval knobs.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub max_sources: usize,
    pub max_chunks_per_source: usize,
    pub similarity_threshold: f32,
    pub context_char_budget: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            max_sources: 5,
            max_chunks_per_source: 3,
            similarity_threshold: 0.0,
            context_char_budget: 8000,
        }
    }
}

/// Scheduler timing knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub debounce_ms: u64,
    pub periodic_sweep_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2_000,
            periodic_sweep_secs: 30,
        }
    }
}

/// Whether vision-based image indexing is enabled at all, independent of
/// whether the configured model turns out to support image input.
#[derive(Debug, Clone, Default)]
pub struct VisionFeature {
    pub enabled: bool,
    pub config: VisionConfig,
}

/// The complete set of knobs the host hands to every component at
/// construction time. No field is ever populated from a file or the
/// environment inside this crate.
#[derive(Debug, Clone)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub vision: VisionFeature,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub scheduler: SchedulerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            vision: VisionFeature::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Config {
    /// Basic sanity checks a host should run before constructing the rest
    /// of the pipeline. Returns a human-readable reason on failure; this
    /// crate does not use `CoreError` here since these are caller
    /// programming errors, not runtime failures.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunking.min_words == 0 {
            return Err("chunking.min_words must be at least 1".to_string());
        }
        if self.chunking.max_words < self.chunking.target_words {
            return Err("chunking.max_words must be >= chunking.target_words".to_string());
        }
        if self.chunking.target_words < self.chunking.min_words {
            return Err("chunking.target_words must be >= chunking.min_words".to_string());
        }
        if self.retrieval.top_k == 0 {
            return Err("retrieval.top_k must be at least 1".to_string());
        }
        if self.retrieval.max_chunks_per_source == 0 {
            return Err("retrieval.max_chunks_per_source must be at least 1".to_string());
        }
        if self.retrieval.max_sources == 0 {
            return Err("retrieval.max_sources must be at least 1".to_string());
        }
        if self.embedding.model.trim().is_empty() {
            return Err("embedding.model must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_chunk_bounds() {
        let mut config = Config::default();
        config.chunking.max_words = 5;
        config.chunking.target_words = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_model_name() {
        let mut config = Config::default();
        config.embedding.model = "".to_string();
        assert!(config.validate().is_err());
    }
}
