//! Provider backends
//!
//! A uniform client interface over the supported inference servers,
//! with one concrete implementation per backend API:
//! - Ollama (`/api/chat`, NDJSON streaming)
//! - llama.cpp-compatible servers (`/v1/chat/completions`, SSE streaming)

pub mod llamacpp;
pub mod ollama;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;
use serde::Serialize;

use crate::config::Settings;
use crate::errors::Result;
use crate::types::{Message, ModelInfo, ProviderKind, Role, Usage};

pub use llamacpp::LlamaCppClient;
pub use ollama::OllamaClient;

/// Parameters for one completion call, streaming or not
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_tokens: Option<u32>,
}

/// Result of a non-streaming completion call
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: Usage,
}

/// Ordered sequence of incremental text fragments from a backend
///
/// Single-consumer and forward-only; dropping it closes the underlying
/// network stream.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Uniform interface over a remote inference server
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Which backend this client talks to
    fn kind(&self) -> ProviderKind;

    /// Base URL the client was configured with
    fn base_url(&self) -> &str;

    /// Issue a non-streaming completion request
    ///
    /// Any non-success HTTP status is an upstream failure.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;

    /// Open a streaming completion request
    async fn stream(&self, request: CompletionRequest) -> Result<FragmentStream>;

    /// Discover available models
    ///
    /// Never fails: transient errors resolve to an empty list so
    /// aggregation across providers can continue.
    async fn list_models(&self) -> Vec<ModelInfo>;

    /// Lightweight reachability probe; failures resolve to `false`
    async fn health_check(&self) -> bool;
}

/// Wire form of a message: role and content only
#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

/// Strip messages down to the role/content pairs backends accept
fn wire_messages(messages: &[Message]) -> Vec<WireMessage<'_>> {
    messages
        .iter()
        .map(|m| WireMessage {
            role: m.role,
            content: &m.content,
        })
        .collect()
}

/// Build the provider lookup table from settings
///
/// Backends with an empty base URL are skipped; requesting them later
/// fails with a provider-unavailable error.
pub fn build_registry(
    settings: &Settings,
) -> Result<HashMap<ProviderKind, Arc<dyn ProviderClient>>> {
    let timeout = Duration::from_secs(settings.chat.request_timeout_secs);
    let mut registry: HashMap<ProviderKind, Arc<dyn ProviderClient>> = HashMap::new();

    if settings.ollama.is_enabled() {
        let client = OllamaClient::new(&settings.ollama.base_url, timeout)?;
        registry.insert(ProviderKind::Ollama, Arc::new(client));
    }

    if settings.llamacpp.is_enabled() {
        let client = LlamaCppClient::new(
            &settings.llamacpp.base_url,
            &settings.llamacpp.default_model,
            timeout,
        )?;
        registry.insert(ProviderKind::LlamaCpp, Arc::new(client));
    }

    Ok(registry)
}
