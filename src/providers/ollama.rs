//! Ollama backend client
//!
//! Talks to the Ollama HTTP API:
//! - `POST /api/chat` for completions (NDJSON when streaming)
//! - `GET /api/tags` for model discovery and the health probe
//!
//! Sampling parameters travel in the `options` object; `max_tokens`
//! maps to Ollama's `num_predict`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::{RelayError, Result};
use crate::providers::{
    wire_messages, Completion, CompletionRequest, FragmentStream, ProviderClient,
};
use crate::streaming::{ollama_fragment, LineDecoder};
use crate::types::{ModelInfo, ProviderKind, Usage};

/// HTTP client for an Ollama server
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    /// Create a client for the given base URL
    ///
    /// The timeout bounds every call made through this client,
    /// including the full lifetime of a streaming response.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn chat_payload<'a>(&self, request: &'a CompletionRequest, stream: bool) -> ChatPayload<'a> {
        ChatPayload {
            model: request.model.clone(),
            messages: wire_messages(&request.messages),
            stream,
            options: SamplingOptions {
                temperature: request.temperature,
                top_p: request.top_p,
                top_k: request.top_k,
                num_predict: request.max_tokens,
            },
        }
    }
}

#[async_trait]
impl ProviderClient for OllamaClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let url = format!("{}/api/chat", self.base_url);
        let payload = self.chat_payload(&request, false);

        let response = self.client.post(&url).json(&payload).send().await?;

        if !response.status().is_success() {
            return Err(RelayError::Upstream(format!(
                "ollama returned HTTP {}",
                response.status()
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| RelayError::Upstream(format!("unreadable ollama response: {}", e)))?;

        let usage = Usage {
            prompt_tokens: body.prompt_eval_count,
            completion_tokens: body.eval_count,
            total_tokens: body.prompt_eval_count + body.eval_count,
        };

        Ok(Completion {
            content: body.message.content,
            usage,
        })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<FragmentStream> {
        let url = format!("{}/api/chat", self.base_url);
        let payload = self.chat_payload(&request, true);

        let response = self.client.post(&url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(RelayError::Upstream(format!(
                "ollama returned HTTP {}: {}",
                status, detail
            )));
        }

        let mut bytes = response.bytes_stream();

        let fragments = async_stream::stream! {
            let mut decoder = LineDecoder::new();

            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => {
                        for line in decoder.feed(&chunk) {
                            if let Some(fragment) = ollama_fragment(&line) {
                                yield Ok(fragment);
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(RelayError::Upstream(e.to_string()));
                        return;
                    }
                }
            }

            if let Some(line) = decoder.finish() {
                if let Some(fragment) = ollama_fragment(&line) {
                    yield Ok(fragment);
                }
            }
        };

        Ok(Box::pin(fragments))
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        let url = format!("{}/api/tags", self.base_url);

        let response = match self.client.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::warn!(status = %r.status(), "ollama model listing failed");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(error = %e, "ollama unreachable while listing models");
                return Vec::new();
            }
        };

        let tags: TagsResponse = match response.json().await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "unreadable ollama tags response");
                return Vec::new();
            }
        };

        tags.models
            .into_iter()
            .map(|m| ModelInfo {
                name: m.name,
                provider: ProviderKind::Ollama,
                description: None,
                context_length: None,
                available: true,
            })
            .collect()
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Ollama chat request body
#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    model: String,
    messages: Vec<super::WireMessage<'a>>,
    stream: bool,
    options: SamplingOptions,
}

#[derive(Debug, Serialize)]
struct SamplingOptions {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Non-streaming chat response; usage counters default to zero
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}
