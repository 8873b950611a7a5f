use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use askweb_providers::ProviderError;
use askweb_tools::ToolCallError;

/// Why an agent run failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("rate limited: {message}")]
    RateLimited {
        retry_after: Option<u64>,
        message: String,
    },

    #[error("model '{model}' unavailable: {message}")]
    ModelUnavailable { model: String, message: String },

    #[error("{0}")]
    ProviderService(String),

    #[error("invalid tool call: {0}")]
    InvalidToolCall(#[from] ToolCallError),

    #[error("no final answer after {0} iterations")]
    IterationLimit(u32),

    #[error("request deadline of {}s exceeded", .0.as_secs())]
    DeadlineExceeded(Duration),

    #[error("request aborted")]
    Cancelled,

    #[error("{0}")]
    Unknown(String),
}

/// Machine-readable classification of an [`AgentError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentErrorKind {
    RateLimited,
    ModelUnavailable,
    ServiceUnavailable,
    InvalidToolCall,
    IterationLimit,
    DeadlineExceeded,
    Aborted,
    UnknownError,
}

impl AgentErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentErrorKind::RateLimited => "rate_limited",
            AgentErrorKind::ModelUnavailable => "model_unavailable",
            AgentErrorKind::ServiceUnavailable => "service_unavailable",
            AgentErrorKind::InvalidToolCall => "invalid_tool_call",
            AgentErrorKind::IterationLimit => "iteration_limit",
            AgentErrorKind::DeadlineExceeded => "deadline_exceeded",
            AgentErrorKind::Aborted => "aborted",
            AgentErrorKind::UnknownError => "unknown_error",
        }
    }
}

impl std::fmt::Display for AgentErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AgentError {
    pub fn kind(&self) -> AgentErrorKind {
        match self {
            AgentError::RateLimited { .. } => AgentErrorKind::RateLimited,
            AgentError::ModelUnavailable { .. } => AgentErrorKind::ModelUnavailable,
            AgentError::ProviderService(_) => AgentErrorKind::ServiceUnavailable,
            AgentError::InvalidToolCall(_) => AgentErrorKind::InvalidToolCall,
            AgentError::IterationLimit(_) => AgentErrorKind::IterationLimit,
            AgentError::DeadlineExceeded(_) => AgentErrorKind::DeadlineExceeded,
            AgentError::Cancelled => AgentErrorKind::Aborted,
            AgentError::Unknown(_) => AgentErrorKind::UnknownError,
        }
    }
}

impl From<ProviderError> for AgentError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::RateLimited {
                retry_after,
                message,
            } => AgentError::RateLimited {
                retry_after,
                message,
            },
            ProviderError::ModelUnavailable { model, message } => {
                AgentError::ModelUnavailable { model, message }
            }
            e @ (ProviderError::Service { .. } | ProviderError::Timeout) => {
                AgentError::ProviderService(e.to_string())
            }
            ProviderError::Cancelled => AgentError::Cancelled,
            ProviderError::Unknown(message) => AgentError::Unknown(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_errors_map_once() {
        let rate = AgentError::from(ProviderError::RateLimited {
            retry_after: Some(2),
            message: "slow down".into(),
        });
        assert_eq!(rate.kind(), AgentErrorKind::RateLimited);

        let gone = AgentError::from(ProviderError::ModelUnavailable {
            model: "m".into(),
            message: "retired".into(),
        });
        assert_eq!(gone.kind(), AgentErrorKind::ModelUnavailable);

        let timeout = AgentError::from(ProviderError::Timeout);
        assert_eq!(timeout.kind(), AgentErrorKind::ServiceUnavailable);
        assert_eq!(timeout.to_string(), "provider call timed out");

        assert_eq!(AgentError::from(ProviderError::Cancelled), AgentError::Cancelled);
        assert_eq!(
            AgentError::from(ProviderError::Unknown("?".into())).kind(),
            AgentErrorKind::UnknownError
        );
    }

    #[test]
    fn test_tool_call_error_is_invalid_tool_call() {
        let err = AgentError::from(ToolCallError::UnknownTool { name: "x".into() });
        assert_eq!(err.kind(), AgentErrorKind::InvalidToolCall);
        assert_eq!(err.to_string(), "invalid tool call: unknown tool 'x'");
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(AgentError::Cancelled.kind().as_str(), "aborted");
        assert_eq!(AgentError::IterationLimit(3).kind().to_string(), "iteration_limit");
        assert_eq!(
            serde_json::to_value(AgentErrorKind::DeadlineExceeded).unwrap(),
            "deadline_exceeded"
        );
    }
}
