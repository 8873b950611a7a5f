//! Classified model-provider failures.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider is throttling us.
    #[error("rate limited: {message}")]
    RateLimited {
        retry_after: Option<u64>,
        message: String,
    },

    /// The requested model was retired or does not exist.
    #[error("model '{model}' unavailable: {message}")]
    ModelUnavailable { model: String, message: String },

    /// Any other upstream failure (auth, 5xx, connection).
    #[error("provider service error{}: {message}", status_suffix(.status))]
    Service {
        status: Option<u16>,
        message: String,
    },

    #[error("provider call timed out")]
    Timeout,

    #[error("provider call cancelled")]
    Cancelled,

    #[error("unknown provider error: {0}")]
    Unknown(String),
}

impl ProviderError {
    /// Map a transport-level `reqwest` failure.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Unknown(err.to_string())
        } else {
            ProviderError::Service {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

const RATE_LIMIT_CODES: &[&str] = &["rate_limit_exceeded"];
const MODEL_GONE_CODES: &[&str] = &["model_decommissioned", "model_not_found"];

/// Classify a non-success provider response.
///
/// Order: structured error code, then HTTP 429, then keyword inspection of the
/// message when the body carried no code, then the remaining status range.
pub fn classify_error(
    status: u16,
    retry_after: Option<u64>,
    body: &str,
    model: &str,
) -> ProviderError {
    let detail = serde_json::from_str::<ApiErrorBody>(body).ok().map(|b| b.error);
    let message = detail
        .as_ref()
        .and_then(|d| d.message.clone())
        .unwrap_or_else(|| truncate(body, 500));
    let code = detail
        .as_ref()
        .and_then(|d| d.code.as_ref())
        .and_then(|c| c.as_str())
        .map(str::to_string);

    if let Some(code) = code.as_deref() {
        if RATE_LIMIT_CODES.contains(&code) {
            return ProviderError::RateLimited { retry_after, message };
        }
        if MODEL_GONE_CODES.contains(&code) {
            return ProviderError::ModelUnavailable {
                model: model.to_string(),
                message,
            };
        }
    }

    if status == 429 {
        return ProviderError::RateLimited { retry_after, message };
    }

    if code.is_none() {
        let lowered = message.to_lowercase();
        if lowered.contains("decommissioned") {
            return ProviderError::ModelUnavailable {
                model: model.to_string(),
                message,
            };
        }
        if lowered.contains("rate limit") {
            return ProviderError::RateLimited { retry_after, message };
        }
    }

    if (400..600).contains(&status) {
        ProviderError::Service {
            status: Some(status),
            message,
        }
    } else {
        ProviderError::Unknown(message)
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
