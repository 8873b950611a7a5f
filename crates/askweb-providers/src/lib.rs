//! Model client abstraction.
//!
//! A [`ModelClient`] performs one chat completion per call: given the full
//! message history and the advertised tools it returns either a final answer
//! or the tool calls the model wants executed. Failures come back as a
//! classified [`ProviderError`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use askweb_core::types::{Message, ToolCall, ToolDescriptor};

pub mod error;
pub mod openai;

pub use error::{ProviderError, classify_error};

/// How the model may use the advertised tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Required,
}

impl ToolChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolChoice::Auto => "auto",
            ToolChoice::None => "none",
            ToolChoice::Required => "required",
        }
    }
}

/// A request to the model.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDescriptor>,
    pub tool_choice: ToolChoice,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
}

/// The model's reply to one completion request.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantTurn {
    /// Final answer, no tools requested.
    Answer { content: String },
    /// One or more tool calls, in emission order.
    ToolCalls {
        content: Option<String>,
        calls: Vec<ToolCall>,
    },
}

impl AssistantTurn {
    /// Build a turn from the raw parts of a provider reply. An empty call list
    /// counts as a final answer; missing content becomes the empty string.
    pub fn from_parts(content: Option<String>, calls: Vec<ToolCall>) -> Self {
        if calls.is_empty() {
            AssistantTurn::Answer {
                content: content.unwrap_or_default(),
            }
        } else {
            AssistantTurn::ToolCalls { content, calls }
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            AssistantTurn::Answer { .. } => &[],
            AssistantTurn::ToolCalls { calls, .. } => calls,
        }
    }

    /// The assistant message to append to the conversation.
    pub fn to_message(&self) -> Message {
        match self {
            AssistantTurn::Answer { content } => Message::assistant(content.clone()),
            AssistantTurn::ToolCalls { content, calls } => {
                Message::assistant_tool_calls(content.clone(), calls.clone())
            }
        }
    }
}

/// The core model client trait.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Provider identifier (e.g., "groq", "openai").
    fn id(&self) -> &str;

    /// Run one completion. Must return [`ProviderError::Cancelled`] promptly
    /// once `cancel` fires.
    async fn complete(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<AssistantTurn, ProviderError>;
}
