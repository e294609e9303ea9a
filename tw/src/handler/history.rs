//! Conversation history with atomic working-history commits

use std::collections::HashSet;

use tracing::debug;

use crate::llm::{ChatMessage, Role};

/// Ordered message log owned by one Handler session
///
/// Appends are serialised; tool-result injection is idempotent by
/// `tool_call_id`; a turn's working history lands in one commit so a failed
/// turn leaves no trace.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
    seen_tool_results: HashSet<String>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one message
    ///
    /// A tool message whose `tool_call_id` was already recorded is a no-op.
    pub fn push(&mut self, message: ChatMessage) {
        if message.role == Role::Tool {
            if let Some(ref id) = message.tool_call_id {
                if !self.seen_tool_results.insert(id.clone()) {
                    debug!(tool_call_id = %id, "ConversationHistory::push: duplicate tool result ignored");
                    return;
                }
            }
        }
        self.messages.push(message);
    }

    /// Commit a completed turn's working history in one step
    pub fn commit(&mut self, working: Vec<ChatMessage>) {
        debug!(count = working.len(), "ConversationHistory::commit: called");
        for message in working {
            self.push(message);
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of assistant messages (the turn count)
    pub fn assistant_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_assistant()).count()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.seen_tool_results.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_preserves_order() {
        let mut history = ConversationHistory::new();
        history.push(ChatMessage::user("one"));
        history.push(ChatMessage::assistant("two"));

        assert_eq!(history.len(), 2);
        assert_eq!(history.messages()[0].content, "one");
        assert_eq!(history.messages()[1].content, "two");
    }

    #[test]
    fn test_duplicate_tool_result_is_noop() {
        let mut history = ConversationHistory::new();
        history.push(ChatMessage::tool("read_file", "call_1", "contents"));
        history.push(ChatMessage::tool("read_file", "call_1", "contents"));

        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_distinct_tool_results_both_kept() {
        let mut history = ConversationHistory::new();
        history.push(ChatMessage::tool("read_file", "call_1", "a"));
        history.push(ChatMessage::tool("read_file", "call_2", "b"));

        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_assistant_count_ignores_user_and_tool() {
        let mut history = ConversationHistory::new();
        history.push(ChatMessage::user("q"));
        history.push(ChatMessage::assistant("a1"));
        history.push(ChatMessage::tool("t", "call_1", "r"));
        history.push(ChatMessage::assistant("a2"));

        assert_eq!(history.assistant_count(), 2);
    }

    #[test]
    fn test_commit_appends_in_order() {
        let mut history = ConversationHistory::new();
        history.push(ChatMessage::user("hello"));

        history.commit(vec![ChatMessage::assistant("working"), ChatMessage::assistant("done")]);

        assert_eq!(history.len(), 3);
        assert_eq!(history.messages()[2].content, "done");
    }
}
