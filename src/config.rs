//! Service configuration
//!
//! Loaded from a TOML file with full defaults, so the service starts
//! with no config file present. Setting a backend's `base_url` to an
//! empty string disables that backend.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::ProviderKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bind address for the HTTP server
    pub host: String,
    pub port: u16,

    #[serde(default = "BackendSettings::ollama_default")]
    pub ollama: BackendSettings,
    #[serde(default = "BackendSettings::llamacpp_default")]
    pub llamacpp: BackendSettings,

    pub chat: ChatSettings,
    pub memory: MemorySettings,
}

/// Connection settings for one inference backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Base URL of the backend; empty string disables it
    pub base_url: String,
    pub default_model: String,
}

/// Defaults applied when a request leaves a field unset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub default_provider: ProviderKind,
    pub default_model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_tokens: u32,
    /// Context window budget for history truncation
    pub max_context_length: usize,
    /// Ceiling on every outbound provider call, in seconds
    pub request_timeout_secs: u64,
}

/// Conversation store limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Per-conversation message cap; oldest entries are evicted first
    pub max_stored_messages: usize,
    /// Fraction of the available budget the retained tail may fill
    pub truncation_threshold: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            ollama: BackendSettings::ollama_default(),
            llamacpp: BackendSettings::llamacpp_default(),
            chat: ChatSettings::default(),
            memory: MemorySettings::default(),
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            default_model: String::new(),
        }
    }
}

impl BackendSettings {
    fn ollama_default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            default_model: "llama3.1:8b".to_string(),
        }
    }

    fn llamacpp_default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            default_model: "mistral-7b-instruct".to_string(),
        }
    }

    /// A backend with an empty base URL is not registered
    pub fn is_enabled(&self) -> bool {
        !self.base_url.is_empty()
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            default_provider: ProviderKind::Ollama,
            default_model: "llama3.1:8b".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            max_tokens: 2048,
            max_context_length: 4096,
            request_timeout_secs: 120,
        }
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            max_stored_messages: 100,
            truncation_threshold: 0.8,
        }
    }
}

impl Settings {
    /// Load settings from the given path, or the default location
    ///
    /// A missing file yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        if !config_path.exists() {
            return Ok(Settings::default());
        }

        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;

        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;

        Ok(settings)
    }

    /// Default config file location
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".llm-relay").join("config.toml"))
    }

    /// Backend settings for a provider kind
    pub fn backend(&self, kind: ProviderKind) -> &BackendSettings {
        match kind {
            ProviderKind::Ollama => &self.ollama,
            ProviderKind::LlamaCpp => &self.llamacpp,
        }
    }
}
