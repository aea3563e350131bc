//! Model interaction: send the extraction prompt to an OpenAI-compatible endpoint.
//!
//! All prompt wording lives in [`crate::prompts`] and all reply validation in
//! [`crate::pipeline::postprocess`]; this module only moves text over HTTP
//! and classifies transport failures.
//!
//! [`CompletionBackend`] is the seam between the pipeline and the model
//! server. [`OpenAiCompatibleClient`] speaks `POST {base}/chat/completions`,
//! which Ollama, LM Studio, vLLM and llama.cpp all serve. One pooled
//! `reqwest::Client` is shared by every document. How many requests may be in
//! flight at once is decided by the caller, see [`crate::Extractor`].

use crate::config::ExtractorConfig;
use crate::error::{DocumentError, ExtractorError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Produces a free-form completion for a list of messages.
///
/// Errors are already classified as per-document failures:
/// [`DocumentError::ExtractionTimeout`] or [`DocumentError::ExtractionFailed`].
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Model identifier reported alongside every record.
    fn model(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, DocumentError>;

    /// Startup reachability check. Backends without one report success.
    async fn probe(&self) -> Result<(), ExtractorError> {
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: usize,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    num_predict: usize,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug)]
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: usize,
    num_predict: usize,
    timeout_secs: u64,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &ExtractorConfig) -> Result<Self, ExtractorError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.llm_connect_timeout_secs))
            .timeout(Duration::from_secs(config.llm_timeout_secs))
            .http1_only()
            .build()
            .map_err(|e| ExtractorError::HttpClient {
                base_url: config.llm_base_url.clone(),
                detail: e.to_string(),
            })?;

        Ok(Self {
            http,
            base_url: config.llm_base_url.clone(),
            model: config.model.clone(),
            api_key: config.llm_api_key.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            num_predict: config.num_predict,
            timeout_secs: config.llm_timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => req.bearer_auth(key),
            None => req,
        }
    }

    fn classify(&self, e: reqwest::Error) -> DocumentError {
        if e.is_timeout() {
            DocumentError::ExtractionTimeout {
                secs: self.timeout_secs,
            }
        } else if e.is_connect() {
            DocumentError::ExtractionFailed {
                detail: format!("cannot connect to {}: {e}", self.base_url),
            }
        } else {
            DocumentError::ExtractionFailed {
                detail: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompatibleClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, DocumentError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
            options: OllamaOptions {
                num_predict: self.num_predict,
            },
        };

        let start = Instant::now();
        let response = self
            .authorized(self.http.post(self.url("chat/completions")))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(500).collect();
            warn!("LLM call failed: status={} body={}", status, snippet);
            return Err(DocumentError::ExtractionFailed {
                detail: format!("status={} body={}", status.as_u16(), snippet),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.classify(e)
            } else {
                DocumentError::ExtractionFailed {
                    detail: format!("unexpected response body: {e}"),
                }
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| DocumentError::ExtractionFailed {
                detail: "response has no choices[0].message.content".into(),
            })?;

        debug!(
            "LLM replied with {} chars in {:?}",
            content.len(),
            start.elapsed()
        );
        Ok(content)
    }

    /// Check that the endpoint answers `GET /models`.
    ///
    /// Used at service startup so a dead model server is reported up front
    /// instead of as a wave of per-document failures.
    async fn probe(&self) -> Result<(), ExtractorError> {
        let unreachable = |detail: String| ExtractorError::LlmUnreachable {
            base_url: self.base_url.clone(),
            detail,
        };

        let response = self
            .authorized(self.http.get(self.url("models")))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(unreachable(format!("HTTP {}", response.status())));
        }
        Ok(())
    }
}
