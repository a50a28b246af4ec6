//! HTTP client for an OpenAI-compatible embeddings endpoint.
//!
//! Works against any server speaking the `POST /embeddings` wire protocol —
//! OpenAI itself, a local Ollama or vLLM instance, or a LiteLLM proxy — since
//! the endpoint and model are both caller-supplied rather than hardcoded.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::EmbeddingError;

/// Connection details for an embeddings endpoint. Cheap to clone; held
/// behind a lock inside [`HttpEmbeddingClient`] so it can be swapped out
/// without recreating the underlying HTTP client.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Base URL, e.g. `"http://localhost:11434/v1"` or
    /// `"https://api.openai.com/v1"`. Never read from an environment
    /// variable — supplied by the host.
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/v1".to_string(),
            api_key: None,
            model: "nomic-embed-text".to_string(),
            batch_size: 32,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

/// Anything that can turn text into embedding vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
    /// A cheap connectivity probe the host can call after the user edits
    /// endpoint settings, before committing to a real indexing run.
    async fn test(&self) -> Result<(), EmbeddingError>;
}

/// The default [`EmbeddingProvider`]: a `reqwest` client against an
/// OpenAI-compatible server, with exponential backoff on transient failures.
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    config: RwLock<EmbeddingConfig>,
}

impl HttpEmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config: RwLock::new(config),
        }
    }

    /// Replace the entire configuration.
    pub async fn update_config(&self, config: EmbeddingConfig) {
        *self.config.write().await = config;
    }

    /// Rotate the API key without touching endpoint or model.
    pub async fn update_api_key(&self, api_key: Option<String>) {
        self.config.write().await.api_key = api_key;
    }

    pub async fn current_model(&self) -> String {
        self.config.read().await.model.clone()
    }

    /// List models the endpoint serves, for host-side model pickers. A thin
    /// passthrough with no caching; callers are expected to invoke this
    /// rarely (e.g. when a settings panel opens).
    pub async fn list_models(&self) -> Result<Vec<String>, EmbeddingError> {
        let (endpoint, api_key, timeout_secs) = {
            let config = self.config.read().await;
            (
                config.endpoint.clone(),
                config.api_key.clone(),
                config.timeout_secs,
            )
        };

        let url = models_url(&endpoint);
        let mut req = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(timeout_secs));
        if let Some(key) = &api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|err| EmbeddingError::Transient(err.to_string()))?;
        if !resp.status().is_success() {
            return Err(EmbeddingError::Protocol(format!(
                "HTTP {} listing models",
                resp.status()
            )));
        }

        let parsed: ModelListResponse = resp
            .json()
            .await
            .map_err(|err| EmbeddingError::Protocol(err.to_string()))?;
        Ok(parsed.data.into_iter().map(|m| m.id).collect())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let (endpoint, api_key, model, max_retries, timeout_secs) = {
            let config = self.config.read().await;
            (
                config.endpoint.clone(),
                config.api_key.clone(),
                config.model.clone(),
                config.max_retries,
                config.timeout_secs,
            )
        };

        let url = format!("{}/embeddings", endpoint.trim_end_matches('/'));
        let body = EmbeddingRequest {
            input: texts.to_vec(),
            model,
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut req = self
                .client
                .post(&url)
                .json(&body)
                .timeout(Duration::from_secs(timeout_secs));
            if let Some(key) = &api_key {
                req = req.bearer_auth(key);
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: EmbeddingResponse = resp
                            .json()
                            .await
                            .map_err(|err| EmbeddingError::Protocol(err.to_string()))?;
                        return Ok(reorder(parsed));
                    }

                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if retryable && attempt <= max_retries {
                        let wait = backoff_secs(attempt);
                        tracing::warn!(%status, attempt, wait, "embedding request failed, retrying");
                        tokio::time::sleep(Duration::from_secs(wait)).await;
                        continue;
                    }

                    let text = resp.text().await.unwrap_or_default();
                    return Err(EmbeddingError::Protocol(format!(
                        "HTTP {status}: {text}"
                    )));
                }
                Err(err) => {
                    if attempt <= max_retries {
                        let wait = backoff_secs(attempt);
                        tracing::warn!(%err, attempt, wait, "embedding request error, retrying");
                        tokio::time::sleep(Duration::from_secs(wait)).await;
                        continue;
                    }
                    return Err(EmbeddingError::Transient(err.to_string()));
                }
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        Ok(vectors.pop().unwrap_or_default())
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let batch_size = self.config.read().await.batch_size.max(1);
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            out.extend(self.embed_batch(batch).await?);
        }
        Ok(out)
    }

    async fn test(&self) -> Result<(), EmbeddingError> {
        self.embed_one("connectivity check").await.map(|_| ())
    }
}

/// `1, 2, 4, 8, 16, 32` seconds, capped at the sixth attempt.
fn backoff_secs(attempt: u32) -> u64 {
    1u64 << (attempt - 1).min(5)
}

fn models_url(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    if let Some(base) = trimmed.strip_suffix("/embeddings") {
        format!("{base}/models")
    } else {
        format!("{trimmed}/models")
    }
}

fn reorder(response: EmbeddingResponse) -> Vec<Vec<f32>> {
    let mut data = response.data;
    data.sort_by_key(|d| d.index);
    data.into_iter().map(|d| d.embedding).collect()
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
    #[allow(dead_code)]
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ModelListResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}
