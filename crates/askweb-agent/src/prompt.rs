//! System prompt builder for the agent.

use chrono::{DateTime, Utc};

use askweb_core::conversation::Conversation;
use askweb_tools::ToolRegistry;

const IDENTITY: &str = "You are a smart personal assistant who answers the asked questions.";

/// Build the system prompt: persona, numbered tool list, current UTC time.
pub fn build_system_prompt(tools: &ToolRegistry, now: DateTime<Utc>) -> String {
    let mut lines = vec![IDENTITY.to_string()];

    let descriptors = tools.descriptors();
    if !descriptors.is_empty() {
        lines.push("You have access to following tools:".to_string());
        for (i, tool) in descriptors.iter().enumerate() {
            let params: Vec<&str> = tool
                .parameters
                .get("properties")
                .and_then(|p| p.as_object())
                .map(|p| p.keys().map(String::as_str).collect())
                .unwrap_or_default();
            let signature: Vec<String> = tool
                .parameters
                .get("properties")
                .and_then(|p| p.as_object())
                .map(|p| {
                    p.iter()
                        .map(|(name, schema)| {
                            let ty = schema.get("type").and_then(|t| t.as_str()).unwrap_or("any");
                            format!("{name}: {ty}")
                        })
                        .collect()
                })
                .unwrap_or_default();
            lines.push(format!(
                "{}. {}({{{}}}: {{{}}}) //{}",
                i + 1,
                tool.name,
                params.join(", "),
                signature.join(", "),
                tool.description
            ));
        }
    }

    lines.push(format!("current date and time: {}", utc_string(now)));
    lines.join("\n")
}

/// Start a conversation for `message` with a freshly built system prompt.
pub fn initial_conversation(message: &str, tools: &ToolRegistry, now: DateTime<Utc>) -> Conversation {
    Conversation::new(build_system_prompt(tools, now), message)
}

/// RFC 1123 form, e.g. `Sat, 17 Oct 2026 09:30:00 GMT`.
fn utc_string(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
