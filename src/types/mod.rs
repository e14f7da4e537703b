//! Shared data model for the relay service
//!
//! Message and conversation types exchanged between the HTTP layer,
//! the orchestrator, and the provider backends.

pub mod messages;
pub mod options;

pub use messages::{Conversation, Message, ModelInfo, ProviderKind, ProviderStatus, Role, Usage};
pub use options::RequestOptions;
