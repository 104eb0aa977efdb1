//! Conversation memory for one agent.
//!
//! A thin wrapper over the message history. The agent locks it only for
//! short, synchronous push/snapshot operations; no lock is ever held across
//! a model or tool call.

use crate::backend::ChatMessage;

/// Ordered message history of one agent's conversation.
#[derive(Debug, Default)]
pub struct ConversationMemory {
    messages: Vec<ChatMessage>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Clone of the full window, used to build an outgoing request.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop the entire history. Used between independent user turns, never
    /// inside a single execution.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ChatRole;

    #[test]
    fn push_and_snapshot_preserve_order() {
        let mut memory = ConversationMemory::new();
        memory.push(ChatMessage::user("first"));
        memory.push(ChatMessage::assistant("second"));

        let snapshot = memory.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].role, ChatRole::User);
        assert_eq!(snapshot[1].content, "second");
    }

    #[test]
    fn clear_empties_history() {
        let mut memory = ConversationMemory::new();
        memory.push(ChatMessage::user("x"));
        memory.clear();
        assert!(memory.is_empty());
    }
}
