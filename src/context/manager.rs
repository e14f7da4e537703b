//! Context window fitting and the conversation backing store
//!
//! Fitting algorithm:
//! - Token estimate per message: `chars / 4`, integer division
//! - Under budget: input returned unchanged
//! - Over budget: system messages are always kept; the most recent
//!   non-system messages are retained newest-first until the running
//!   sum would exceed `threshold` of the remaining budget; everything
//!   older is replaced by a single synthesized summary message
//!
//! The summary message itself is not charged against the budget.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::types::{Message, Role};

/// Default fraction of the available budget the retained tail may fill
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Default per-conversation message cap in the backing store
pub const DEFAULT_MAX_STORED: usize = 100;

/// Manages history truncation and stored transcripts
#[derive(Debug)]
pub struct ContextManager {
    /// Fraction of the post-system budget the retained tail may fill
    threshold: f64,

    /// Per-conversation message cap; oldest evicted first
    max_stored: usize,

    /// Stored transcripts keyed by conversation id
    store: Mutex<HashMap<String, VecDeque<Message>>>,
}

impl ContextManager {
    pub fn new(threshold: f64, max_stored: usize) -> Self {
        Self {
            threshold,
            max_stored,
            store: Mutex::new(HashMap::new()),
        }
    }

    /// Truncate `messages` to fit within `max_tokens`
    ///
    /// Output order: original system messages (original order), then
    /// the summary message if anything was dropped, then the retained
    /// tail oldest to newest. The retained tail is always a contiguous
    /// suffix of the non-system input.
    pub fn fit(&self, messages: &[Message], max_tokens: usize) -> Vec<Message> {
        let total: usize = messages.iter().map(|m| m.estimate_tokens()).sum();

        if total <= max_tokens {
            return messages.to_vec();
        }

        let (system_messages, other_messages): (Vec<Message>, Vec<Message>) = messages
            .iter()
            .cloned()
            .partition(|m| m.role == Role::System);

        let system_tokens: usize = system_messages.iter().map(|m| m.estimate_tokens()).sum();

        // May go negative when system messages alone exceed the budget;
        // the cap then rejects every non-system message.
        let available = max_tokens as i64 - system_tokens as i64;
        let cap = available as f64 * self.threshold;

        let mut kept: VecDeque<Message> = VecDeque::new();
        let mut current_tokens = 0usize;

        for msg in other_messages.iter().rev() {
            let msg_tokens = msg.estimate_tokens();
            if (current_tokens + msg_tokens) as f64 <= cap {
                kept.push_front(msg.clone());
                current_tokens += msg_tokens;
            } else {
                break;
            }
        }

        if kept.len() < other_messages.len() {
            let dropped = &other_messages[..other_messages.len() - kept.len()];
            kept.push_front(summarize_dropped(dropped));
        }

        let mut result = system_messages;
        result.extend(kept);
        result
    }

    /// Record messages into a conversation's transcript
    ///
    /// Messages already present are not appended again; once the cap is
    /// reached the oldest entries are evicted first.
    pub fn store_conversation(&self, conversation_id: &str, messages: &[Message]) {
        let mut store = self.store.lock().expect("context store poisoned");
        let transcript = store.entry(conversation_id.to_string()).or_default();

        for message in messages {
            if !transcript.contains(message) {
                transcript.push_back(message.clone());
                if transcript.len() > self.max_stored {
                    transcript.pop_front();
                }
            }
        }
    }

    /// Retrieve a stored transcript
    pub fn get_conversation(&self, conversation_id: &str) -> Option<Vec<Message>> {
        let store = self.store.lock().expect("context store poisoned");
        store.get(conversation_id).map(|t| t.iter().cloned().collect())
    }

    /// Drop a conversation's transcript
    pub fn clear_conversation(&self, conversation_id: &str) {
        let mut store = self.store.lock().expect("context store poisoned");
        store.remove(conversation_id);
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_MAX_STORED)
    }
}

/// Build the summary message standing in for dropped history
fn summarize_dropped(dropped: &[Message]) -> Message {
    let user_count = dropped.iter().filter(|m| m.role == Role::User).count();
    let assistant_count = dropped.iter().filter(|m| m.role == Role::Assistant).count();

    let content = format!(
        "[Previous conversation summary: {} messages ({} user, {} assistant) were exchanged. \
         The conversation covered various topics that have been truncated to fit context limits.]",
        dropped.len(),
        user_count,
        assistant_count
    );

    Message::system(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A message of exactly `tokens` estimated tokens
    fn sized_message(role: Role, tokens: usize) -> Message {
        Message::new(role, "a".repeat(tokens * 4))
    }

    fn total_tokens(messages: &[Message]) -> usize {
        messages.iter().map(|m| m.estimate_tokens()).sum()
    }

    #[test]
    fn test_identity_under_budget() {
        let manager = ContextManager::default();
        let messages = vec![
            sized_message(Role::System, 10),
            sized_message(Role::User, 20),
            sized_message(Role::Assistant, 20),
        ];

        let fitted = manager.fit(&messages, 100);
        assert_eq!(fitted, messages);
    }

    #[test]
    fn test_identity_at_exact_budget() {
        let manager = ContextManager::default();
        let messages = vec![sized_message(Role::User, 50), sized_message(Role::Assistant, 50)];

        assert_eq!(total_tokens(&messages), 100);
        let fitted = manager.fit(&messages, 100);
        assert_eq!(fitted, messages);
    }

    #[test]
    fn test_system_messages_preserved_verbatim() {
        let manager = ContextManager::default();
        let mut messages = vec![
            sized_message(Role::System, 20),
            sized_message(Role::System, 10),
        ];
        for _ in 0..20 {
            messages.push(sized_message(Role::User, 30));
            messages.push(sized_message(Role::Assistant, 30));
        }

        let fitted = manager.fit(&messages, 200);

        let fitted_system: Vec<&Message> =
            fitted.iter().filter(|m| m.content.starts_with('a') && m.role == Role::System).collect();
        assert_eq!(fitted_system.len(), 2);
        assert_eq!(fitted_system[0], &messages[0]);
        assert_eq!(fitted_system[1], &messages[1]);
        // System messages come first in the output
        assert_eq!(fitted[0], messages[0]);
        assert_eq!(fitted[1], messages[1]);
    }

    #[test]
    fn test_single_summary_with_role_split() {
        let manager = ContextManager::default();
        let mut messages = Vec::new();
        for _ in 0..10 {
            messages.push(sized_message(Role::User, 50));
            messages.push(sized_message(Role::Assistant, 50));
        }

        // Budget of 200 tokens, threshold 0.8 → cap 160 → keeps 3 of 20
        let fitted = manager.fit(&messages, 200);

        let summaries: Vec<&Message> = fitted
            .iter()
            .filter(|m| m.role == Role::System && m.content.starts_with("[Previous"))
            .collect();
        assert_eq!(summaries.len(), 1);

        // 17 dropped: 9 user, 8 assistant
        let summary = summaries[0];
        assert!(summary.content.contains("17 messages"), "got: {}", summary.content);
        assert!(summary.content.contains("9 user"));
        assert!(summary.content.contains("8 assistant"));

        // Summary sits immediately before the retained tail
        assert_eq!(fitted[0], *summary);
        assert_eq!(fitted.len(), 4);
    }

    #[test]
    fn test_retained_tail_is_contiguous_suffix() {
        let manager = ContextManager::default();
        let messages: Vec<Message> = (0..30)
            .map(|i| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                Message::new(role, format!("{:0>40}", i)) // 40 chars = 10 tokens
            })
            .collect();

        let fitted = manager.fit(&messages, 100);

        let retained: Vec<&Message> =
            fitted.iter().filter(|m| m.role != Role::System).collect();
        assert!(!retained.is_empty());

        let suffix = &messages[messages.len() - retained.len()..];
        for (kept, original) in retained.iter().zip(suffix) {
            assert_eq!(*kept, original);
        }
    }

    #[test]
    fn test_threshold_caps_retained_tokens() {
        let manager = ContextManager::new(0.8, DEFAULT_MAX_STORED);
        let mut messages = Vec::new();
        for _ in 0..10 {
            messages.push(sized_message(Role::User, 50));
        }

        let fitted = manager.fit(&messages, 200);
        let retained: Vec<&Message> =
            fitted.iter().filter(|m| m.role != Role::System).collect();

        // cap = 200 * 0.8 = 160 → three 50-token messages fit
        assert_eq!(retained.len(), 3);
        let retained_tokens: usize = retained.iter().map(|m| m.estimate_tokens()).sum();
        assert_eq!(retained_tokens, 150);
    }

    #[test]
    fn test_all_system_messages_noop_truncation() {
        let manager = ContextManager::default();
        let messages = vec![
            sized_message(Role::System, 100),
            sized_message(Role::System, 100),
        ];

        let fitted = manager.fit(&messages, 50);
        assert_eq!(fitted, messages);
    }

    #[test]
    fn test_system_exceeding_budget_drops_all_others() {
        let manager = ContextManager::default();
        let messages = vec![
            sized_message(Role::System, 100),
            sized_message(Role::User, 10),
            sized_message(Role::Assistant, 10),
        ];

        let fitted = manager.fit(&messages, 50);

        // Negative available budget: nothing non-system survives, one
        // summary accounts for the two dropped messages
        assert_eq!(fitted.len(), 2);
        assert_eq!(fitted[0], messages[0]);
        assert!(fitted[1].content.contains("2 messages"));
        assert!(fitted[1].content.contains("1 user"));
        assert!(fitted[1].content.contains("1 assistant"));
    }

    #[test]
    fn test_store_and_get_conversation() {
        let manager = ContextManager::default();
        let messages = vec![Message::user("hello"), Message::assistant("hi")];

        manager.store_conversation("c1", &messages);
        let stored = manager.get_conversation("c1").unwrap();
        assert_eq!(stored, messages);

        assert!(manager.get_conversation("missing").is_none());
    }

    #[test]
    fn test_store_suppresses_duplicates() {
        let manager = ContextManager::default();
        let messages = vec![Message::user("hello"), Message::assistant("hi")];

        manager.store_conversation("c1", &messages);
        manager.store_conversation("c1", &messages);

        assert_eq!(manager.get_conversation("c1").unwrap().len(), 2);
    }

    #[test]
    fn test_store_evicts_oldest_at_cap() {
        let manager = ContextManager::new(DEFAULT_THRESHOLD, 3);

        for i in 0..5 {
            manager.store_conversation("c1", &[Message::user(format!("msg {}", i))]);
        }

        let stored = manager.get_conversation("c1").unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].content, "msg 2");
        assert_eq!(stored[2].content, "msg 4");
    }

    #[test]
    fn test_clear_conversation() {
        let manager = ContextManager::default();
        manager.store_conversation("c1", &[Message::user("hello")]);

        manager.clear_conversation("c1");
        assert!(manager.get_conversation("c1").is_none());
    }
}
