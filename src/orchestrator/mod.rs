//! Conversation orchestration
//!
//! The long-lived coordinator owning all mutable service state: the
//! provider registry, the conversation table, the context manager, and
//! the prompt store. Request handlers hold it behind an `Arc`; nothing
//! here is a global.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::config::{ChatSettings, Settings};
use crate::context::ContextManager;
use crate::errors::{RelayError, Result};
use crate::prompts::PromptStore;
use crate::providers::{build_registry, CompletionRequest, FragmentStream, ProviderClient};
use crate::types::{
    Conversation, Message, ModelInfo, ProviderKind, ProviderStatus, RequestOptions, Role, Usage,
};

/// Result of a non-streaming chat call
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub message: Message,
    pub conversation_id: String,
    pub provider: ProviderKind,
    pub model: String,
    pub usage: Usage,
}

/// A live streaming chat call
///
/// Fragments are handed to the caller as they arrive; nothing is
/// persisted into the conversation history for streamed responses.
pub struct StreamHandle {
    pub fragments: FragmentStream,
    pub conversation_id: String,
    pub provider: ProviderKind,
    pub model: String,
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("fragments", &"<stream>")
            .field("conversation_id", &self.conversation_id)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .finish()
    }
}

/// What a chat call produced, depending on the streaming flag
#[derive(Debug)]
pub enum ChatOutcome {
    Complete(ChatResponse),
    Stream(StreamHandle),
}

/// Coordinates prompt resolution, context fitting, provider dispatch,
/// and conversation bookkeeping
pub struct ChatOrchestrator {
    providers: HashMap<ProviderKind, Arc<dyn ProviderClient>>,
    conversations: Mutex<HashMap<String, Conversation>>,
    context: ContextManager,
    prompts: PromptStore,
    chat: ChatSettings,
}

impl ChatOrchestrator {
    /// Create an orchestrator over an explicit provider registry
    pub fn new(
        settings: &Settings,
        providers: HashMap<ProviderKind, Arc<dyn ProviderClient>>,
    ) -> Self {
        Self {
            providers,
            conversations: Mutex::new(HashMap::new()),
            context: ContextManager::new(
                settings.memory.truncation_threshold,
                settings.memory.max_stored_messages,
            ),
            prompts: PromptStore::new(),
            chat: settings.chat.clone(),
        }
    }

    /// Create an orchestrator with clients built from settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let providers = build_registry(settings)?;
        Ok(Self::new(settings, providers))
    }

    /// Handle one chat request
    ///
    /// Resolves the conversation, prepends the system prompt when one
    /// is requested and none is present, fits the history to the token
    /// budget, and dispatches to the selected provider. Non-streaming
    /// responses are folded back into the conversation; streamed
    /// responses are handed to the caller as-is. Any failure leaves
    /// conversation history untouched.
    pub async fn handle(
        &self,
        messages: Vec<Message>,
        options: RequestOptions,
    ) -> Result<ChatOutcome> {
        options.validate()?;

        let conversation_id = options
            .conversation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        {
            let mut conversations = self.conversations.lock().expect("conversation table poisoned");
            conversations
                .entry(conversation_id.clone())
                .or_insert_with(|| Conversation::new(conversation_id.as_str()));
        }

        let mut messages = messages;
        if let Some(prompt_id) = &options.system_prompt_id {
            let has_system = messages.iter().any(|m| m.role == Role::System);
            if !has_system {
                if let Some(system_message) =
                    self.prompts.resolve(prompt_id, &options.prompt_variables)
                {
                    messages.insert(0, system_message);
                }
            }
        }

        let budget = options
            .max_context_length
            .unwrap_or(self.chat.max_context_length);
        let messages = self.context.fit(&messages, budget);

        let provider_kind = options.provider.unwrap_or(self.chat.default_provider);
        let provider = self
            .providers
            .get(&provider_kind)
            .cloned()
            .ok_or_else(|| RelayError::ProviderUnavailable(provider_kind.to_string()))?;

        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.chat.default_model.clone());

        let request = CompletionRequest {
            messages: messages.clone(),
            model: model.clone(),
            temperature: options.temperature.unwrap_or(self.chat.temperature),
            top_p: options.top_p.unwrap_or(self.chat.top_p),
            top_k: options.top_k.unwrap_or(self.chat.top_k),
            max_tokens: options.max_tokens.or(Some(self.chat.max_tokens)),
        };

        tracing::debug!(
            conversation_id = %conversation_id,
            provider = %provider_kind,
            model = %model,
            stream = options.stream,
            message_count = messages.len(),
            "dispatching chat request"
        );

        if options.stream {
            let fragments = provider.stream(request).await?;
            return Ok(ChatOutcome::Stream(StreamHandle {
                fragments,
                conversation_id,
                provider: provider_kind,
                model,
            }));
        }

        let completion = provider.complete(request).await?;
        let assistant_message = Message::assistant(completion.content);

        let transcript = {
            let mut conversations = self.conversations.lock().expect("conversation table poisoned");
            // Re-created if the conversation was deleted mid-request
            let conversation = conversations
                .entry(conversation_id.clone())
                .or_insert_with(|| Conversation::new(conversation_id.as_str()));

            if let Some(last) = messages.last() {
                conversation.messages.push(last.clone());
            }
            conversation.messages.push(assistant_message.clone());
            conversation.updated_at = Utc::now();
            conversation.messages.clone()
        };
        self.context.store_conversation(&conversation_id, &transcript);

        Ok(ChatOutcome::Complete(ChatResponse {
            message: assistant_message,
            conversation_id,
            provider: provider_kind,
            model,
            usage: completion.usage,
        }))
    }

    /// Fetch a conversation record
    ///
    /// Falls back to the context manager's backing store for
    /// transcripts whose table entry is gone.
    pub fn get_conversation(&self, conversation_id: &str) -> Option<Conversation> {
        {
            let conversations = self.conversations.lock().expect("conversation table poisoned");
            if let Some(conversation) = conversations.get(conversation_id) {
                return Some(conversation.clone());
            }
        }

        self.context.get_conversation(conversation_id).map(|messages| {
            let mut conversation = Conversation::new(conversation_id);
            conversation.messages = messages;
            conversation
        })
    }

    /// Remove a conversation from the table and the backing store
    ///
    /// Returns false when the id was never seen.
    pub fn delete_conversation(&self, conversation_id: &str) -> bool {
        let removed = {
            let mut conversations = self.conversations.lock().expect("conversation table poisoned");
            conversations.remove(conversation_id).is_some()
        };

        if removed {
            self.context.clear_conversation(conversation_id);
        }
        removed
    }

    /// Aggregate model listings across all registered providers
    ///
    /// One backend failing (already folded to an empty list by the
    /// client) never hides the others' results.
    pub async fn list_models(&self) -> Vec<ModelInfo> {
        let mut all_models = Vec::new();

        for kind in ProviderKind::ALL {
            if let Some(provider) = self.providers.get(&kind) {
                all_models.extend(provider.list_models().await);
            }
        }

        all_models
    }

    /// Health and configuration status for every known provider kind
    pub async fn provider_status(&self) -> Vec<ProviderStatus> {
        let mut statuses = Vec::new();

        for kind in ProviderKind::ALL {
            match self.providers.get(&kind) {
                Some(provider) => {
                    let healthy = provider.health_check().await;
                    statuses.push(ProviderStatus {
                        provider: kind,
                        available: healthy,
                        base_url: Some(provider.base_url().to_string()),
                        error: if healthy {
                            None
                        } else {
                            Some("Provider is not accessible".to_string())
                        },
                    });
                }
                None => statuses.push(ProviderStatus {
                    provider: kind,
                    available: false,
                    base_url: None,
                    error: Some("Provider not configured".to_string()),
                }),
            }
        }

        statuses
    }

    /// Whether a provider kind has a registered client
    pub fn has_provider(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }

    /// The prompt template store
    pub fn prompts(&self) -> &PromptStore {
        &self.prompts
    }
}
