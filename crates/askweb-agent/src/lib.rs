//! Agent loop: alternates model completions with tool execution until the
//! model produces a final answer.
//!
//! The loop owns no transport concerns. Callers build a [`Conversation`]
//! (see [`prompt::initial_conversation`]), hand it to [`AgentLoop::run`], and
//! map the [`AgentError`] classification to their own response format.
//!
//! [`Conversation`]: askweb_core::conversation::Conversation

pub mod error;
pub mod prompt;
pub mod runtime;

pub use error::{AgentError, AgentErrorKind};
pub use runtime::{AgentLoop, AgentOptions, AgentOutcome};
