//! The chat contract shared by every transport.

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use chrono::Utc;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use askweb_agent::{AgentError, AgentLoop, prompt};

/// Seconds suggested to clients when the provider gave no hint.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 3;

/// Transport-neutral reply: status, JSON body, optional retry hint.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub status: StatusCode,
    pub body: Value,
    /// Mirrored into a `Retry-After` header by transports that support one.
    pub retry_after: Option<u64>,
}

impl ChatReply {
    fn new(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            body,
            retry_after: None,
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, json!({ "error": message }))
    }

    pub fn method_not_allowed() -> Self {
        Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            json!({ "error": "Method not allowed" }),
        )
    }
}

/// Validates chat requests and runs them through the agent loop.
#[derive(Clone)]
pub struct ChatService {
    agent: Arc<AgentLoop>,
}

impl ChatService {
    pub fn new(agent: Arc<AgentLoop>) -> Self {
        Self { agent }
    }

    pub fn agent(&self) -> &AgentLoop {
        &self.agent
    }

    /// Handle one raw `POST /api/chat` body.
    pub async fn handle(&self, body: &[u8], cancel: &CancellationToken) -> ChatReply {
        let started = Instant::now();
        #[cfg(feature = "metrics")]
        let request_metrics = crate::metrics::ChatRequestGuard::start();

        let reply = match parse_message(body) {
            Ok(message) => self.run(&message, cancel).await,
            Err(reply) => reply,
        };

        #[cfg(feature = "metrics")]
        request_metrics.finish(reply.status.as_u16());

        info!(
            status = reply.status.as_u16(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Chat request finished"
        );
        reply
    }

    async fn run(&self, message: &str, cancel: &CancellationToken) -> ChatReply {
        info!(chars = message.chars().count(), "Chat message received");
        let mut conversation = prompt::initial_conversation(message, self.agent.tools(), Utc::now());

        #[cfg(feature = "metrics")]
        let run_metrics = crate::metrics::AgentRunGuard::start();
        let result = self.agent.run(&mut conversation, cancel).await;
        #[cfg(feature = "metrics")]
        run_metrics.finish(&result);

        match result {
            Ok(outcome) => ChatReply::new(StatusCode::OK, json!({ "response": outcome.answer })),
            Err(err) => {
                warn!(kind = %err.kind(), error = %err, "Agent run failed");
                error_reply(&err)
            }
        }
    }
}

/// Extract the non-empty `message` string, or the 400 reply explaining why not.
fn parse_message(body: &[u8]) -> Result<String, ChatReply> {
    let payload: Value = if body.iter().all(u8::is_ascii_whitespace) {
        json!({})
    } else {
        serde_json::from_slice(body).map_err(|e| {
            warn!(error = %e, "Rejected malformed chat body");
            ChatReply::bad_request("Invalid JSON body")
        })?
    };

    match payload.get("message").and_then(Value::as_str) {
        Some(message) if !message.is_empty() => Ok(message.to_string()),
        _ => Err(ChatReply::bad_request("Message is required")),
    }
}

/// Map an agent failure to its externally visible reply.
pub fn error_reply(err: &AgentError) -> ChatReply {
    match err {
        AgentError::RateLimited { retry_after, .. } => {
            let retry_after = retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            ChatReply {
                status: StatusCode::TOO_MANY_REQUESTS,
                body: json!({
                    "error": "Rate limit exceeded. Please wait a moment and try again.",
                    "details": "The AI service is currently busy. Please try again in a few seconds.",
                    "retryAfter": retry_after,
                }),
                retry_after: Some(retry_after),
            }
        }
        AgentError::ModelUnavailable { .. } => ChatReply::new(
            StatusCode::BAD_REQUEST,
            json!({
                "error": "AI model temporarily unavailable",
                "details": "The AI model is currently being updated. Please try again in a few minutes.",
                "type": "model_unavailable",
            }),
        ),
        AgentError::ProviderService(_) => ChatReply::new(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({
                "error": "AI service temporarily unavailable",
                "details": "Please try again in a moment.",
                "type": "service_unavailable",
            }),
        ),
        other => ChatReply::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({
                "error": "An error occurred while processing your request",
                "details": other.to_string(),
                "type": other.kind().as_str(),
            }),
        ),
    }
}
