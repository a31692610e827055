//! Conversation state threaded through the pipeline, and its merge rules.
//!
//! Stages never overwrite the state wholesale. Each returns a [`StateUpdate`]
//! that is folded into the current [`ConversationState`] field by field:
//!
//! | Field      | Merge            |
//! |------------|------------------|
//! | `messages` | [`merge_messages`]: append, order and content preserved |
//! | `context`  | [`merge_context`]: last write replaces              |

use lore_ai::Message;
use serde::{Deserialize, Serialize};

/// The unit of data flowing through the pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Conversation history, oldest first
    pub messages: Vec<Message>,
    /// Document fragments retrieved for the current turn only
    pub context: Vec<String>,
}

/// Partial state produced by one stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Messages to append to the history
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
    /// Replacement context, if this stage recomputed it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<String>>,
}

impl StateUpdate {
    /// An update that appends messages
    pub fn messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            context: None,
        }
    }

    /// An update that replaces the context
    pub fn context(context: Vec<String>) -> Self {
        Self {
            messages: vec![],
            context: Some(context),
        }
    }
}

/// Append `new` after `existing`. Never drops, reorders or rewrites a message.
pub fn merge_messages(mut existing: Vec<Message>, new: Vec<Message>) -> Vec<Message> {
    existing.extend(new);
    existing
}

/// Context is recomputed every turn, so the newest value wins outright.
pub fn merge_context(_existing: Vec<String>, new: Vec<String>) -> Vec<String> {
    new
}

impl ConversationState {
    /// A fresh state holding a single user turn
    pub fn from_input(text: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(text)],
            context: vec![],
        }
    }

    /// Fold a stage update into this state
    pub fn apply(&mut self, update: StateUpdate) {
        if !update.messages.is_empty() {
            let existing = std::mem::take(&mut self.messages);
            self.messages = merge_messages(existing, update.messages);
        }
        if let Some(context) = update.context {
            let existing = std::mem::take(&mut self.context);
            self.context = merge_context(existing, context);
        }
    }

    /// The most recent user message, if any
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_user())
    }

    /// The most recent assistant message, if any
    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_assistant())
    }

    /// Text of the newest assistant reply
    pub fn reply(&self) -> Option<&str> {
        self.last_assistant_message().map(|m| m.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_messages_appends_in_order() {
        let existing = vec![Message::user("a"), Message::assistant("b")];
        let merged = merge_messages(existing.clone(), vec![Message::user("c")]);

        assert_eq!(merged.len(), 3);
        assert_eq!(&merged[..2], &existing[..]);
        assert_eq!(merged[2].text(), "c");
    }

    #[test]
    fn test_merge_messages_with_nothing_new_is_identity() {
        let existing = vec![Message::user("a")];
        assert_eq!(merge_messages(existing.clone(), vec![]), existing);
    }

    #[test]
    fn test_merge_context_replaces() {
        let merged = merge_context(vec!["old".into()], vec!["new".into()]);
        assert_eq!(merged, vec!["new".to_string()]);

        let cleared = merge_context(vec!["old".into()], vec![]);
        assert!(cleared.is_empty());
    }

    #[test]
    fn test_apply_context_update_keeps_messages() {
        let mut state = ConversationState::from_input("hi");
        state.context = vec!["stale".into()];

        state.apply(StateUpdate::context(vec!["fresh".into()]));

        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.context, vec!["fresh".to_string()]);
    }

    #[test]
    fn test_apply_message_update_keeps_context() {
        let mut state = ConversationState::from_input("hi");
        state.context = vec!["doc".into()];

        state.apply(StateUpdate::messages(vec![Message::assistant("hello")]));

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.context, vec!["doc".to_string()]);
        assert_eq!(state.reply(), Some("hello"));
    }

    #[test]
    fn test_last_user_message_skips_assistant() {
        let mut state = ConversationState::from_input("first");
        state.apply(StateUpdate::messages(vec![
            Message::assistant("reply"),
            Message::user("second"),
            Message::assistant("reply 2"),
        ]));
        assert_eq!(state.last_user_message().map(|m| m.text()), Some("second"));
    }

    #[test]
    fn test_update_serde_omits_untouched_fields() {
        let json = serde_json::to_value(StateUpdate::context(vec![])).unwrap();
        assert!(json.get("messages").is_none());
        assert_eq!(json["context"], serde_json::json!([]));
    }
}
