//! llama.cpp server backend client
//!
//! Talks to the OpenAI-compatible surface exposed by llama.cpp's
//! built-in server (and compatible servers such as LM Studio):
//! - `POST /v1/chat/completions` (SSE when streaming)
//! - `GET /v1/models` for discovery
//! - `GET /health`, falling back to `/v1/models`, for the health probe
//!
//! These servers usually host a single loaded model, so discovery falls
//! back to the configured default model name when `/v1/models` is not
//! implemented but the server is up.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::{RelayError, Result};
use crate::providers::{
    wire_messages, Completion, CompletionRequest, FragmentStream, ProviderClient,
};
use crate::streaming::{llamacpp_frame, LineDecoder, SseFrame};
use crate::types::{ModelInfo, ProviderKind, Usage};

/// Context length reported when the server does not advertise one
const DEFAULT_CONTEXT_LENGTH: u64 = 4096;

/// HTTP client for a llama.cpp-compatible server
#[derive(Debug, Clone)]
pub struct LlamaCppClient {
    client: Client,
    base_url: String,
    default_model: String,
}

impl LlamaCppClient {
    pub fn new(
        base_url: impl Into<String>,
        default_model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            default_model: default_model.into(),
        })
    }

    fn chat_payload<'a>(&self, request: &'a CompletionRequest, stream: bool) -> ChatPayload<'a> {
        ChatPayload {
            model: request.model.clone(),
            messages: wire_messages(&request.messages),
            temperature: request.temperature,
            top_p: request.top_p,
            top_k: request.top_k,
            max_tokens: request.max_tokens,
            stream,
        }
    }
}

#[async_trait]
impl ProviderClient for LlamaCppClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::LlamaCpp
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let payload = self.chat_payload(&request, false);

        let response = self.client.post(&url).json(&payload).send().await?;

        if !response.status().is_success() {
            return Err(RelayError::Upstream(format!(
                "llama.cpp returned HTTP {}",
                response.status()
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| RelayError::Upstream(format!("unreadable llama.cpp response: {}", e)))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| RelayError::Upstream("llama.cpp response had no choices".to_string()))?;

        Ok(Completion {
            content,
            usage: body.usage,
        })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<FragmentStream> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let payload = self.chat_payload(&request, true);

        let response = self.client.post(&url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(RelayError::Upstream(format!(
                "llama.cpp returned HTTP {}: {}",
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
                            match llamacpp_frame(&line) {
                                Some(SseFrame::Fragment(text)) => yield Ok(text),
                                Some(SseFrame::Done) => return,
                                None => {}
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(RelayError::Upstream(e.to_string()));
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(fragments))
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        let url = format!("{}/v1/models", self.base_url);

        if let Ok(response) = self.client.get(&url).send().await {
            if response.status().is_success() {
                if let Ok(listing) = response.json::<ModelsResponse>().await {
                    return listing
                        .data
                        .into_iter()
                        .map(|m| ModelInfo {
                            name: m.id,
                            provider: ProviderKind::LlamaCpp,
                            description: None,
                            context_length: Some(DEFAULT_CONTEXT_LENGTH),
                            available: true,
                        })
                        .collect();
                }
            }
        }

        // Single-model servers may not implement /v1/models; report the
        // configured model as long as the server answers at all.
        if self.health_check().await {
            return vec![ModelInfo {
                name: self.default_model.clone(),
                provider: ProviderKind::LlamaCpp,
                description: None,
                context_length: Some(DEFAULT_CONTEXT_LENGTH),
                available: true,
            }];
        }

        tracing::warn!(base_url = %self.base_url, "llama.cpp unreachable while listing models");
        Vec::new()
    }

    async fn health_check(&self) -> bool {
        let health_url = format!("{}/health", self.base_url);
        if let Ok(response) = self.client.get(&health_url).send().await {
            if response.status().is_success() {
                return true;
            }
        }

        let models_url = format!("{}/v1/models", self.base_url);
        match self.client.get(&models_url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

/// OpenAI-style chat request body; sampling parameters are top-level
#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    model: String,
    messages: Vec<super::WireMessage<'a>>,
    temperature: f32,
    top_p: f32,
    top_k: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}
