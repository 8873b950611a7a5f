//! Tools the model may call during an agent run.
//!
//! Each tool implements the [`Tool`] trait. Execution is total: a tool always
//! produces text, even when the work behind it failed. Problems with the call
//! itself (unknown tool, malformed arguments) are caught earlier by
//! [`ToolRegistry::prepare`] and surface as [`ToolCallError`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use askweb_core::config::Config;
use askweb_core::types::{ToolCall, ToolDescriptor};

pub mod schema;
pub mod web_search;

pub use web_search::{SearchBackend, SearchHit, WebSearchTool};

/// Context provided to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub cancel: CancellationToken,
    /// Upper bound for a single execution.
    pub timeout: Duration,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken, timeout: Duration) -> Self {
        Self { cancel, timeout }
    }
}

/// Output from a tool execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// Degraded output: still plain text for the model, flagged for logging.
    pub fn degraded(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// The core tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as exposed to the model (e.g., "webSearch").
    fn name(&self) -> &str;

    /// JSON Schema describing the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Human-readable description for the model.
    fn description(&self) -> &str;

    /// Execute the tool with already-checked parameters.
    async fn execute(&self, params: serde_json::Value, context: &ToolContext) -> ToolOutput;
}

/// A tool call that cannot be executed as requested.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolCallError {
    #[error("unknown tool '{name}'")]
    UnknownTool { name: String },

    #[error("arguments for '{tool}' are not valid JSON: {reason}")]
    MalformedArguments { tool: String, reason: String },

    #[error("arguments for '{tool}' do not match its schema: {reason}")]
    SchemaMismatch { tool: String, reason: String },
}

/// A tool call resolved against the registry with parsed, checked arguments.
pub struct PreparedCall<'a> {
    pub call: &'a ToolCall,
    pub tool: &'a dyn Tool,
    pub params: serde_json::Value,
}

impl PreparedCall<'_> {
    pub async fn execute(self, context: &ToolContext) -> ToolOutput {
        self.tool.execute(self.params, context).await
    }
}

/// Registry of available tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the web search tool wired to the configured backend.
    pub fn from_config(config: &Config) -> Self {
        let backend = web_search::backend_from_config(config);
        let mut registry = Self::new();
        registry.register(Box::new(WebSearchTool::new(backend)));
        registry
    }

    pub fn with_web_search(backend: Arc<dyn SearchBackend>) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(WebSearchTool::new(backend)));
        registry
    }

    /// Register a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Descriptors advertised to the model on every turn.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|t| ToolDescriptor {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Resolve `call` to a tool and check its raw arguments.
    pub fn prepare<'a>(&'a self, call: &'a ToolCall) -> Result<PreparedCall<'a>, ToolCallError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolCallError::UnknownTool {
                name: call.name.clone(),
            })?;

        // Some models send an empty string for "no arguments".
        let raw = if call.arguments.trim().is_empty() {
            "{}"
        } else {
            call.arguments.as_str()
        };
        let params: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| ToolCallError::MalformedArguments {
                tool: call.name.clone(),
                reason: e.to_string(),
            })?;

        schema::check(&tool.parameters_schema(), &params).map_err(|reason| {
            ToolCallError::SchemaMismatch {
                tool: call.name.clone(),
                reason,
            }
        })?;

        Ok(PreparedCall { call, tool, params })
    }
}
