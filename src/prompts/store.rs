//! Prompt template storage
//!
//! A fixed default set is seeded at construction and can never be
//! updated or deleted; custom templates support full CRUD. Resolution
//! produces a ready-to-send system message with all substitutions
//! applied.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::prompts::template::{apply_dynamic_context, substitute_variables};
use crate::types::Message;

/// A named prompt template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPrompt {
    pub id: String,
    pub name: String,
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default)]
    pub is_default: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a custom template
#[derive(Debug, Clone, Deserialize)]
pub struct PromptDraft {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update for a custom template; unset fields are untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Why a prompt mutation was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PromptWriteError {
    #[error("prompt not found")]
    NotFound,
    /// The id belongs to the immutable default set
    #[error("default prompts cannot be modified")]
    NotPermitted,
}

/// Per-tag and per-kind counts over the store
#[derive(Debug, Clone, Serialize)]
pub struct PromptStatistics {
    pub total_prompts: usize,
    pub default_prompts: usize,
    pub custom_prompts: usize,
    pub tags: HashMap<String, usize>,
}

/// In-memory template table with an immutable default set
#[derive(Debug)]
pub struct PromptStore {
    prompts: Mutex<HashMap<String, SystemPrompt>>,
    default_ids: HashSet<String>,
}

impl PromptStore {
    /// Create a store seeded with the default templates
    pub fn new() -> Self {
        let defaults = default_prompts();
        let default_ids = defaults.iter().map(|p| p.id.clone()).collect();
        let prompts = defaults.into_iter().map(|p| (p.id.clone(), p)).collect();

        Self {
            prompts: Mutex::new(prompts),
            default_ids,
        }
    }

    /// Resolve a template id into a system message
    ///
    /// Unknown ids yield `None`: callers treat that as "no system
    /// message to prepend", not an error.
    pub fn resolve(
        &self,
        prompt_id: &str,
        variables: &HashMap<String, serde_json::Value>,
    ) -> Option<Message> {
        let content = {
            let prompts = self.prompts.lock().expect("prompt store poisoned");
            prompts.get(prompt_id)?.content.clone()
        };

        let content = substitute_variables(&content, variables);
        let content = apply_dynamic_context(&content);

        Some(Message::system(content))
    }

    /// Fetch a template by id
    pub fn get(&self, prompt_id: &str) -> Option<SystemPrompt> {
        let prompts = self.prompts.lock().expect("prompt store poisoned");
        prompts.get(prompt_id).cloned()
    }

    /// List templates, optionally filtered to those carrying any of
    /// the given tags
    ///
    /// Ordered defaults-first, then by name, for stable output.
    pub fn list(&self, tags: Option<&[String]>) -> Vec<SystemPrompt> {
        let prompts = self.prompts.lock().expect("prompt store poisoned");

        let mut listed: Vec<SystemPrompt> = prompts
            .values()
            .filter(|p| match tags {
                Some(wanted) if !wanted.is_empty() => {
                    p.tags.iter().any(|t| wanted.contains(t))
                }
                _ => true,
            })
            .cloned()
            .collect();

        listed.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then_with(|| a.name.cmp(&b.name))
        });
        listed
    }

    /// Create a custom template, generating an id when none is given
    ///
    /// Ids in the default set are refused so the seeded templates can
    /// never be shadowed.
    pub fn create(&self, draft: PromptDraft) -> Result<SystemPrompt, PromptWriteError> {
        let id = draft.id.unwrap_or_else(|| Uuid::new_v4().to_string());

        if self.default_ids.contains(&id) {
            return Err(PromptWriteError::NotPermitted);
        }

        let now = Utc::now();
        let prompt = SystemPrompt {
            id: id.clone(),
            name: draft.name,
            content: draft.content,
            description: draft.description,
            tags: draft.tags,
            is_default: false,
            created_at: now,
            updated_at: now,
        };

        let mut prompts = self.prompts.lock().expect("prompt store poisoned");
        prompts.insert(id, prompt.clone());
        Ok(prompt)
    }

    /// Update a custom template; default-set ids are never touched
    pub fn update(
        &self,
        prompt_id: &str,
        update: PromptUpdate,
    ) -> Result<SystemPrompt, PromptWriteError> {
        if self.default_ids.contains(prompt_id) {
            return Err(PromptWriteError::NotPermitted);
        }

        let mut prompts = self.prompts.lock().expect("prompt store poisoned");
        let prompt = prompts.get_mut(prompt_id).ok_or(PromptWriteError::NotFound)?;

        if let Some(name) = update.name {
            prompt.name = name;
        }
        if let Some(content) = update.content {
            prompt.content = content;
        }
        if let Some(description) = update.description {
            prompt.description = Some(description);
        }
        if let Some(tags) = update.tags {
            prompt.tags = tags;
        }
        prompt.updated_at = Utc::now();

        Ok(prompt.clone())
    }

    /// Delete a custom template; default-set ids are never touched
    pub fn delete(&self, prompt_id: &str) -> Result<(), PromptWriteError> {
        if self.default_ids.contains(prompt_id) {
            return Err(PromptWriteError::NotPermitted);
        }

        let mut prompts = self.prompts.lock().expect("prompt store poisoned");
        prompts
            .remove(prompt_id)
            .map(|_| ())
            .ok_or(PromptWriteError::NotFound)
    }

    /// Counts over the current store contents
    pub fn statistics(&self) -> PromptStatistics {
        let prompts = self.prompts.lock().expect("prompt store poisoned");

        let total_prompts = prompts.len();
        let default_prompts = self.default_ids.len();

        let mut tags: HashMap<String, usize> = HashMap::new();
        for prompt in prompts.values() {
            for tag in &prompt.tags {
                *tags.entry(tag.clone()).or_insert(0) += 1;
            }
        }

        PromptStatistics {
            total_prompts,
            default_prompts,
            custom_prompts: total_prompts - default_prompts,
            tags,
        }
    }
}

impl Default for PromptStore {
    fn default() -> Self {
        Self::new()
    }
}

/// The seeded default templates
fn default_prompts() -> Vec<SystemPrompt> {
    let now = Utc::now();
    let seeded = |id: &str, name: &str, content: &str, description: &str, tags: &[&str]| {
        SystemPrompt {
            id: id.to_string(),
            name: name.to_string(),
            content: content.to_string(),
            description: Some(description.to_string()),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            is_default: true,
            created_at: now,
            updated_at: now,
        }
    };

    vec![
        seeded(
            "default",
            "Default Assistant",
            "You are a helpful AI assistant. Provide clear, accurate, and helpful responses.",
            "Default system prompt for general assistance",
            &[],
        ),
        seeded(
            "coding",
            "Coding Assistant",
            "You are an expert programmer. Help with coding questions, debugging, and best \
             practices. Provide clear explanations and working code examples.",
            "System prompt for programming assistance",
            &["programming", "technical"],
        ),
        seeded(
            "creative",
            "Creative Writing Assistant",
            "You are a creative writing assistant. Help with storytelling, creative ideas, and \
             writing improvement. Be imaginative and encouraging.",
            "System prompt for creative writing tasks",
            &["writing", "creative"],
        ),
        seeded(
            "analytical",
            "Analytical Assistant",
            "You are an analytical assistant. Provide data-driven insights, logical reasoning, \
             and thorough analysis. Break down complex problems systematically.",
            "System prompt for analytical tasks",
            &["analysis", "data"],
        ),
    ]
}
