//! OpenAI-compatible Chat Completions client.
//!
//! Talks to `/v1/chat/completions` without streaming. Groq exposes the same
//! API under `https://api.groq.com/openai`, so one client serves both.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use askweb_core::config::{Config, ModelProviderKind};
use askweb_core::types::{Message, Role, ToolCall, ToolDescriptor};

use crate::error::{ProviderError, classify_error};
use crate::{AssistantTurn, CompletionRequest, ModelClient};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct OpenAiCompatibleClient {
    pub base_url: String,
    provider_id: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiCompatibleClient {
    pub fn groq(base_url: Option<&str>, api_key: Option<String>) -> Self {
        Self::new("groq", base_url.unwrap_or(GROQ_BASE_URL), api_key)
    }

    pub fn openai(base_url: Option<&str>, api_key: Option<String>) -> Self {
        Self::new("openai", base_url.unwrap_or(OPENAI_BASE_URL), api_key)
    }

    /// Build the client described by the `model` config section.
    pub fn from_config(config: &Config) -> Self {
        let model = config.model_config();
        let api_key = model.resolve_api_key();
        let base_url = model.base_url.as_deref();
        let client = match model.provider {
            ModelProviderKind::Groq => Self::groq(base_url, api_key),
            ModelProviderKind::OpenAi => Self::openai(base_url, api_key),
        };
        client.with_timeout(Duration::from_secs(config.model_timeout_secs()))
    }

    fn new(provider_id: &str, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            provider_id: provider_id.to_string(),
            api_key,
            timeout: DEFAULT_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    /// Per-call timeout applied to each completion request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn send(&self, request: &CompletionRequest) -> Result<AssistantTurn, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::Service {
                status: None,
                message: format!("no API key configured for {}", self.provider_id),
            });
        };

        let body = OpenAiRequest {
            model: request.model.clone(),
            messages: format_messages(&request.messages),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: (!request.tools.is_empty()).then(|| format_tools(&request.tools)),
            tool_choice: (!request.tools.is_empty()).then(|| request.tool_choice.as_str()),
            stream: false,
        };

        debug!(
            model = %body.model,
            base_url = %self.base_url,
            messages = body.messages.len(),
            "Calling chat completions"
        );

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();
            let err = classify_error(status.as_u16(), retry_after, &text, &request.model);
            warn!(provider = %self.provider_id, status = status.as_u16(), %err, "Completion failed");
            return Err(err);
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(ProviderError::from_transport)?;
        parse_completion(completion)
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatibleClient {
    fn id(&self) -> &str {
        &self.provider_id
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<AssistantTurn, ProviderError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            result = self.send(request) => result,
        }
    }
}

// --- OpenAI request/response types ---

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn parse_completion(completion: ChatCompletion) -> Result<AssistantTurn, ProviderError> {
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Unknown("completion contained no choices".into()))?;

    let calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCall {
            id: tc.id,
            name: tc.function.name,
            arguments: tc.function.arguments,
        })
        .collect();

    Ok(AssistantTurn::from_parts(choice.message.content, calls))
}

/// Convert tool descriptors to the `{"type":"function"}` wrapper.
pub fn format_tools(tools: &[ToolDescriptor]) -> Vec<serde_json::Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                }
            })
        })
        .collect()
}

/// Convert conversation messages to the chat wire format.
pub fn format_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| {
            let mut msg = json!({ "role": m.role.as_str() });
            match m.role {
                Role::Assistant if m.has_tool_calls() => {
                    msg["content"] = json!(m.content);
                    msg["tool_calls"] = m
                        .tool_calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": tc.arguments,
                                }
                            })
                        })
                        .collect();
                }
                Role::Tool => {
                    msg["tool_call_id"] = json!(m.tool_call_id);
                    msg["name"] = json!(m.name);
                    msg["content"] = json!(m.content.clone().unwrap_or_default());
                }
                _ => {
                    msg["content"] = json!(m.content.clone().unwrap_or_default());
                }
            }
            msg
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groq_client_creation() {
        let client = OpenAiCompatibleClient::groq(None, Some("gsk".into()));
        assert_eq!(client.id(), "groq");
        assert_eq!(client.base_url, GROQ_BASE_URL);
    }

    #[test]
    fn test_openai_client_creation() {
        let client = OpenAiCompatibleClient::openai(None, None);
        assert_eq!(client.id(), "openai");
        assert_eq!(client.base_url, OPENAI_BASE_URL);
    }

    #[test]
    fn test_custom_base_url() {
        let client = OpenAiCompatibleClient::openai(Some("https://my-proxy.example.com/"), None);
        assert_eq!(client.base_url, "https://my-proxy.example.com");
    }

    #[test]
    fn test_format_tools_function_wrapper() {
        let tools = vec![ToolDescriptor {
            name: "webSearch".into(),
            description: "Search the web".into(),
            parameters: json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
            }),
        }];
        let formatted = format_tools(&tools);
        assert_eq!(formatted.len(), 1);
        assert_eq!(formatted[0]["type"], "function");
        assert_eq!(formatted[0]["function"]["name"], "webSearch");
        assert!(formatted[0]["function"]["parameters"].is_object());
    }

    #[test]
    fn test_format_messages_with_tool_round() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "webSearch".into(),
            arguments: r#"{"query":"rust"}"#.into(),
        };
        let messages = vec![
            Message::system("sys"),
            Message::user("find rust"),
            Message::assistant_tool_calls(None, vec![call.clone()]),
            Message::tool_result(&call, "Rust is a language"),
        ];

        let wire = format_messages(&messages);
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[2]["role"], "assistant");
        assert!(wire[2]["content"].is_null());
        assert_eq!(wire[2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(wire[2]["tool_calls"][0]["function"]["arguments"], r#"{"query":"rust"}"#);
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "call_1");
        assert_eq!(wire[3]["name"], "webSearch");
    }

    #[test]
    fn test_parse_completion_text() {
        let json = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Hello"},"finish_reason":"stop"}]}"#;
        let completion: ChatCompletion = serde_json::from_str(json).unwrap();
        assert_eq!(
            parse_completion(completion).unwrap(),
            AssistantTurn::Answer { content: "Hello".into() }
        );
    }

    #[test]
    fn test_parse_completion_tool_calls() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":null,"tool_calls":[
            {"id":"call_a","type":"function","function":{"name":"webSearch","arguments":"{\"query\":\"a\"}"}},
            {"id":"call_b","type":"function","function":{"name":"webSearch","arguments":"{\"query\":\"b\"}"}}
        ]},"finish_reason":"tool_calls"}]}"#;
        let completion: ChatCompletion = serde_json::from_str(json).unwrap();
        let turn = parse_completion(completion).unwrap();
        let ids: Vec<&str> = turn.tool_calls().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["call_a", "call_b"]);
    }

    #[test]
    fn test_parse_completion_without_choices() {
        let completion: ChatCompletion = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            parse_completion(completion),
            Err(ProviderError::Unknown(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_service_error() {
        let client = OpenAiCompatibleClient::groq(None, None);
        let request = CompletionRequest {
            model: "m".into(),
            messages: vec![Message::user("hi")],
            tools: vec![],
            tool_choice: Default::default(),
            temperature: 0.0,
            max_tokens: None,
        };
        let err = client
            .complete(&request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Service { status: None, .. }));
    }
}
