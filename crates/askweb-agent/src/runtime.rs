//! Agent runtime loop: model completion, tool execution, repeat.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use askweb_core::config::Config;
use askweb_core::conversation::Conversation;
use askweb_providers::{AssistantTurn, CompletionRequest, ModelClient, ProviderError, ToolChoice};
use askweb_tools::{ToolContext, ToolRegistry};

use crate::error::AgentError;

/// Completions always sample at zero so identical inputs behave identically.
pub const TEMPERATURE: f64 = 0.0;

/// Tunables for one [`AgentLoop`].
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOptions {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    /// Model completions allowed per run.
    pub max_iterations: u32,
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
    /// Wall-clock budget for the whole run.
    pub request_deadline: Duration,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl AgentOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.model_id(),
            temperature: TEMPERATURE,
            max_tokens: config.max_tokens(),
            max_iterations: config.max_iterations(),
            model_timeout: Duration::from_secs(config.model_timeout_secs()),
            tool_timeout: Duration::from_secs(config.tool_timeout_secs()),
            request_deadline: Duration::from_secs(config.request_deadline_secs()),
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentOutcome {
    pub answer: String,
    pub iterations: u32,
    pub tool_calls: u32,
    pub duration_ms: u64,
}

/// Drives a [`ModelClient`] and a [`ToolRegistry`] over one conversation.
pub struct AgentLoop {
    model: Arc<dyn ModelClient>,
    tools: Arc<ToolRegistry>,
    options: AgentOptions,
}

impl AgentLoop {
    pub fn new(model: Arc<dyn ModelClient>, tools: Arc<ToolRegistry>, options: AgentOptions) -> Self {
        Self {
            model,
            tools,
            options,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    /// Run until the model answers without tool calls.
    ///
    /// Messages are appended to `conversation` as each step completes. A
    /// model or tool call interrupted by `cancel` or the request deadline
    /// appends nothing.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome, AgentError> {
        let start = Instant::now();
        let deadline = deadline_after(self.options.request_deadline);
        let mut tool_call_count: u32 = 0;

        for iteration in 1..=self.options.max_iterations {
            debug!(iteration, messages = conversation.len(), "Agent loop iteration");

            let request = CompletionRequest {
                model: self.options.model.clone(),
                messages: conversation.messages().to_vec(),
                tools: self.tools.descriptors(),
                tool_choice: ToolChoice::Auto,
                temperature: self.options.temperature,
                max_tokens: self.options.max_tokens,
            };

            let turn = self
                .interruptible(
                    tokio::time::timeout(
                        self.options.model_timeout,
                        self.model.complete(&request, cancel),
                    ),
                    cancel,
                    deadline,
                )
                .await?
                .unwrap_or(Err(ProviderError::Timeout))?;

            conversation
                .push_assistant(turn.to_message())
                .map_err(|e| AgentError::Unknown(e.to_string()))?;

            let calls = match turn {
                AssistantTurn::Answer { content } => {
                    let outcome = AgentOutcome {
                        answer: content,
                        iterations: iteration,
                        tool_calls: tool_call_count,
                        duration_ms: start.elapsed().as_millis() as u64,
                    };
                    info!(
                        iterations = outcome.iterations,
                        tool_calls = outcome.tool_calls,
                        duration_ms = outcome.duration_ms,
                        "Agent run complete"
                    );
                    return Ok(outcome);
                }
                AssistantTurn::ToolCalls { calls, .. } => calls,
            };

            // Reject the whole turn before running anything if one call is bad.
            let prepared = calls
                .iter()
                .map(|call| self.tools.prepare(call))
                .collect::<Result<Vec<_>, _>>()
                .inspect_err(|e| warn!(error = %e, "Model requested an invalid tool call"))?;

            for call in prepared {
                let call_ref = call.call;
                let tool_start = Instant::now();
                info!(tool = %call_ref.name, id = %call_ref.id, "Executing tool");

                let context = ToolContext::new(cancel.child_token(), self.options.tool_timeout);
                let output = self
                    .interruptible(call.execute(&context), cancel, deadline)
                    .await?;

                info!(
                    tool = %call_ref.name,
                    is_error = output.is_error,
                    duration_ms = tool_start.elapsed().as_millis() as u64,
                    "Tool finished"
                );
                conversation
                    .push_tool_result(call_ref, output.content)
                    .map_err(|e| AgentError::Unknown(e.to_string()))?;
                tool_call_count += 1;
            }
        }

        warn!(
            max_iterations = self.options.max_iterations,
            tool_calls = tool_call_count,
            "Agent loop hit iteration limit"
        );
        Err(AgentError::IterationLimit(self.options.max_iterations))
    }

    /// Race `fut` against cancellation and the run deadline.
    async fn interruptible<F: Future>(
        &self,
        fut: F,
        cancel: &CancellationToken,
        deadline: tokio::time::Instant,
    ) -> Result<F::Output, AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => {
                Err(AgentError::DeadlineExceeded(self.options.request_deadline))
            }
            out = fut => Ok(out),
        }
    }
}

/// `now + budget`, saturating at roughly thirty years out.
fn deadline_after(budget: Duration) -> tokio::time::Instant {
    let now = tokio::time::Instant::now();
    now.checked_add(budget)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}
