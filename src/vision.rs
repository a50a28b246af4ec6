//! HTTP client for extracting text from images via a vision-capable chat
//! model, speaking the OpenAI-compatible `POST /chat/completions` protocol
//! with `image_url` content parts.
//!
//! Not every endpoint the host points this at actually supports image
//! input, and there is no capabilities header to query — so capability is
//! detected empirically with a one-shot probe whose result is cached for
//! the lifetime of the client.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::VisionError;

const PROBE_SENTINEL: &str = "VISION_PROBE_OK";
const NOTHING_FOUND_SENTINEL: &str = "NO_TEXT_FOUND";

/// A single transparent 1x1 PNG, used to probe capability without touching
/// the caller's actual images.
const PROBE_IMAGE_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/v1".to_string(),
            api_key: None,
            model: "llava".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Anything that can pull legible text out of an image.
#[async_trait]
pub trait VisionTextExtractor: Send + Sync {
    /// Whether the configured model accepts image input at all. Cheap to
    /// call repeatedly — implementations cache the result.
    async fn probe(&self) -> Result<bool, VisionError>;

    /// Extract legible text from `image_bytes`, or `Ok(None)` if the model
    /// reports finding nothing (a photo with no text, a diagram with no
    /// labels). Returns [`VisionError::Unsupported`] if a prior or
    /// on-demand probe determined the model cannot see images at all.
    async fn extract(&self, image_bytes: &[u8], file_name: &str) -> Result<Option<String>, VisionError>;
}

pub struct HttpVisionClient {
    client: reqwest::Client,
    config: RwLock<VisionConfig>,
    capable: RwLock<Option<bool>>,
}

impl HttpVisionClient {
    pub fn new(config: VisionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config: RwLock::new(config),
            capable: RwLock::new(None),
        }
    }

    pub async fn update_config(&self, config: VisionConfig) {
        *self.config.write().await = config;
        *self.capable.write().await = None;
    }

    async fn chat(&self, image_base64: &str, mime: &str, prompt: &str) -> Result<String, VisionError> {
        let (endpoint, api_key, model, timeout_secs) = {
            let config = self.config.read().await;
            (
                config.endpoint.clone(),
                config.api_key.clone(),
                config.model.clone(),
                config.timeout_secs,
            )
        };

        let url = format!("{}/chat/completions", endpoint.trim_end_matches('/'));
        let data_uri = format!("data:{mime};base64,{image_base64}");
        let body = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ChatContent::Text { text: prompt.to_string() },
                    ChatContent::ImageUrl {
                        image_url: ImageUrl { url: data_uri },
                    },
                ],
            }],
        };

        let mut req = self
            .client
            .post(&url)
            .json(&body)
            .timeout(Duration::from_secs(timeout_secs));
        if let Some(key) = &api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|err| VisionError::Protocol(err.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(VisionError::Protocol(format!("HTTP {status}: {text}")));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|err| VisionError::Protocol(err.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| VisionError::Protocol("no choices in response".to_string()))
    }
}

#[async_trait]
impl VisionTextExtractor for HttpVisionClient {
    async fn probe(&self) -> Result<bool, VisionError> {
        if let Some(cached) = *self.capable.read().await {
            return Ok(cached);
        }

        let prompt = format!(
            "If you can see this image, respond with exactly the single word {PROBE_SENTINEL} and nothing else."
        );
        let capable = match self.chat(PROBE_IMAGE_PNG_BASE64, "image/png", &prompt).await {
            Ok(text) => text.contains(PROBE_SENTINEL),
            Err(_) => false,
        };

        *self.capable.write().await = Some(capable);
        Ok(capable)
    }

    async fn extract(&self, image_bytes: &[u8], file_name: &str) -> Result<Option<String>, VisionError> {
        if !self.probe().await? {
            return Err(VisionError::Unsupported);
        }

        let mime = infer_mime(file_name);
        let encoded = base64::engine::general_purpose::STANDARD.encode(image_bytes);
        let prompt = format!(
            "Transcribe all legible text visible in this image verbatim. \
             If there is no legible text at all, respond with exactly {NOTHING_FOUND_SENTINEL} and nothing else."
        );

        let text = self.chat(&encoded, mime, &prompt).await?;
        if text.trim() == NOTHING_FOUND_SENTINEL {
            Ok(None)
        } else {
            Ok(Some(text))
        }
    }
}

/// Infer a MIME type from a file extension, defaulting to `image/png` for
/// anything unrecognized.
fn infer_mime(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "image/png",
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ChatContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChatContent {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_inference_covers_common_extensions() {
        assert_eq!(infer_mime("scan.jpg"), "image/jpeg");
        assert_eq!(infer_mime("scan.JPEG"), "image/jpeg");
        assert_eq!(infer_mime("scan.gif"), "image/gif");
        assert_eq!(infer_mime("scan.webp"), "image/webp");
        assert_eq!(infer_mime("scan.svg"), "image/svg+xml");
        assert_eq!(infer_mime("scan.bmp"), "image/bmp");
        assert_eq!(infer_mime("scan.tiff"), "image/tiff");
        assert_eq!(infer_mime("scan.png"), "image/png");
        assert_eq!(infer_mime("no_extension"), "image/png");
    }
}
