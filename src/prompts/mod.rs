//! System prompt templates
//!
//! Named templates with `{variable}` interpolation and dynamic
//! substitutions, a seeded immutable default set, and CRUD for custom
//! templates.

pub mod store;
pub mod template;

pub use store::{PromptDraft, PromptStore, PromptUpdate, PromptWriteError, SystemPrompt};
pub use template::{validate_template, TemplateValidation};
