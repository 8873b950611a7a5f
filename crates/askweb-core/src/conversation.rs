//! Per-request conversation history.
//!
//! A [`Conversation`] is the literal audit trail of one request: messages are
//! only ever appended, never reordered, edited, or removed.

use crate::error::{AskwebError, Result};
use crate::types::{Message, Role, ToolCall};

#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Start a conversation as `[system, user]`.
    pub fn new(system_prompt: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt), Message::user(user_message)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Append an assistant turn exactly as the model produced it.
    pub fn push_assistant(&mut self, message: Message) -> Result<()> {
        if message.role != Role::Assistant {
            return Err(AskwebError::Conversation(format!(
                "expected an assistant message, got {}",
                message.role.as_str()
            )));
        }
        self.messages.push(message);
        Ok(())
    }

    /// Append the result of `call`. The call must belong to the most recent
    /// assistant message.
    pub fn push_tool_result(&mut self, call: &ToolCall, content: impl Into<String>) -> Result<()> {
        let pending = self
            .last_assistant()
            .is_some_and(|m| m.tool_calls.iter().any(|c| c.id == call.id));
        if !pending {
            return Err(AskwebError::Conversation(format!(
                "tool call '{}' does not belong to the preceding assistant message",
                call.id
            )));
        }
        self.messages.push(Message::tool_result(call, content));
        Ok(())
    }

    /// Messages appended after the initial `[system, user]` pair.
    pub fn appended(&self) -> &[Message] {
        self.messages.get(2..).unwrap_or_default()
    }

    /// Check the structural invariants of the history.
    pub fn validate(&self) -> Result<()> {
        match self.messages.as_slice() {
            [first, second, ..] if first.role == Role::System && second.role == Role::User => {}
            _ => {
                return Err(AskwebError::Conversation(
                    "conversation must start with a system and a user message".into(),
                ));
            }
        }

        let mut open_calls: &[ToolCall] = &[];
        for (idx, msg) in self.messages.iter().enumerate() {
            match msg.role {
                Role::Assistant => open_calls = &msg.tool_calls,
                Role::Tool => {
                    let id = msg.tool_call_id.as_deref().unwrap_or_default();
                    if !open_calls.iter().any(|c| c.id == id) {
                        return Err(AskwebError::Conversation(format!(
                            "tool message at {idx} answers unknown call '{id}'"
                        )));
                    }
                }
                Role::System | Role::User => open_calls = &[],
            }
        }
        Ok(())
    }

    fn last_assistant(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role != Role::Tool)
            .filter(|m| m.role == Role::Assistant)
    }
}
