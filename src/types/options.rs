//! Per-request options and their validation
//!
//! Sampling parameters are range-checked before any network call so an
//! out-of-range request never reaches a backend.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::{RelayError, Result};
use crate::types::ProviderKind;

/// Options accompanying a chat request
///
/// Every field is optional; unset fields fall back to configured
/// defaults at dispatch time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    /// Maximum tokens the model may generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Override for the context window budget used during truncation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_id: Option<String>,

    /// Values substituted into `{variable}` placeholders of the
    /// resolved system prompt
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub prompt_variables: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub stream: bool,
}

impl RequestOptions {
    /// Validate sampling parameter ranges
    ///
    /// Ranges: temperature ∈ [0, 2], top_p ∈ [0, 1], top_k > 0,
    /// max_tokens > 0. The first violation is reported with the field
    /// name and offending value.
    pub fn validate(&self) -> Result<()> {
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(RelayError::InvalidParameter {
                    field: "temperature",
                    reason: format!("{} is outside the range [0.0, 2.0]", t),
                });
            }
        }

        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(RelayError::InvalidParameter {
                    field: "top_p",
                    reason: format!("{} is outside the range [0.0, 1.0]", p),
                });
            }
        }

        if let Some(k) = self.top_k {
            if k == 0 {
                return Err(RelayError::InvalidParameter {
                    field: "top_k",
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if let Some(m) = self.max_tokens {
            if m == 0 {
                return Err(RelayError::InvalidParameter {
                    field: "max_tokens",
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        Ok(())
    }
}
