//! Serverless function adapter.
//!
//! Accepts a function-platform HTTP event, answers CORS preflight itself,
//! and sends POST bodies through the shared [`ChatService`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::chat::{ChatReply, ChatService};

/// Inbound HTTP event as delivered by the function platform.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionEvent {
    pub http_method: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Response handed back to the function platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

fn cors_headers() -> BTreeMap<String, String> {
    [
        ("Access-Control-Allow-Origin", "*"),
        ("Access-Control-Allow-Headers", "Content-Type"),
        ("Access-Control-Allow-Methods", "POST, OPTIONS"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl From<ChatReply> for FunctionResponse {
    fn from(reply: ChatReply) -> Self {
        let mut headers = cors_headers();
        headers.insert("Content-Type".into(), "application/json".into());
        if let Some(secs) = reply.retry_after {
            headers.insert("Retry-After".into(), secs.to_string());
        }
        Self {
            status_code: reply.status.as_u16(),
            headers,
            body: reply.body.to_string(),
        }
    }
}

/// Handle one function invocation.
pub async fn handle_event(
    chat: &ChatService,
    event: &FunctionEvent,
    cancel: &CancellationToken,
) -> FunctionResponse {
    let method = event.http_method.to_ascii_uppercase();
    debug!(method = %method, "Function invoked");

    match method.as_str() {
        "OPTIONS" => FunctionResponse {
            status_code: 200,
            headers: cors_headers(),
            body: String::new(),
        },
        "POST" => {
            let body = event.body.as_deref().unwrap_or_default();
            chat.handle(body.as_bytes(), cancel).await.into()
        }
        _ => ChatReply::method_not_allowed().into(),
    }
}
