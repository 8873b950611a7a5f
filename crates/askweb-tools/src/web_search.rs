//! webSearch tool and the search backends behind it.
//!
//! Backends: Tavily (default), Brave Search API, SearXNG.

use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use askweb_core::config::{Config, SearchBackendKind};

use crate::{Tool, ToolContext, ToolOutput};

/// Returned to the model whenever a search cannot be completed.
pub const SEARCH_APOLOGY: &str = "Sorry, I encountered an error while searching the web.";

const TAVILY_BASE_URL: &str = "https://api.tavily.com";
const BRAVE_BASE_URL: &str = "https://api.search.brave.com";

/// One normalized search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// An external search provider.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Backend identifier (e.g., "tavily").
    fn id(&self) -> &str;

    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchHit>>;
}

/// Build the backend selected by the `search` config section.
pub fn backend_from_config(config: &Config) -> Arc<dyn SearchBackend> {
    let search = config.search_config();
    let max_results = config.max_search_results();
    let base_url = search.base_url.clone();
    let api_key = search.resolve_api_key();

    match search.backend {
        SearchBackendKind::Tavily => Arc::new(TavilyBackend::new(base_url.as_deref(), api_key, max_results)),
        SearchBackendKind::Brave => Arc::new(BraveBackend::new(base_url.as_deref(), api_key, max_results)),
        SearchBackendKind::Searxng => Arc::new(SearxngBackend::new(
            base_url.as_deref().unwrap_or_default(),
            max_results,
        )),
    }
}

// --- Tavily ---

pub struct TavilyBackend {
    base_url: String,
    api_key: Option<String>,
    max_results: usize,
    client: reqwest::Client,
}

impl TavilyBackend {
    pub fn new(base_url: Option<&str>, api_key: Option<String>, max_results: usize) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(TAVILY_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            max_results,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
}

#[async_trait]
impl SearchBackend for TavilyBackend {
    fn id(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchHit>> {
        let Some(key) = self.api_key.as_deref() else {
            bail!("no API key configured for tavily");
        };

        let resp = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(key)
            .json(&TavilyRequest {
                query,
                max_results: self.max_results,
            })
            .send()
            .await
            .context("tavily request failed")?;

        if !resp.status().is_success() {
            bail!("tavily returned HTTP {}", resp.status());
        }

        let body: serde_json::Value = resp.json().await.context("tavily response was not JSON")?;
        Ok(parse_tavily_results(&body, self.max_results))
    }
}

fn parse_tavily_results(body: &serde_json::Value, max: usize) -> Vec<SearchHit> {
    let empty = vec![];
    let results = body["results"].as_array().unwrap_or(&empty);
    results
        .iter()
        .take(max)
        .filter_map(|r| {
            Some(SearchHit {
                title: r["title"].as_str().unwrap_or("").to_string(),
                url: r["url"].as_str().unwrap_or("").to_string(),
                content: r["content"].as_str()?.to_string(),
            })
        })
        .collect()
}

// --- Brave ---

pub struct BraveBackend {
    base_url: String,
    api_key: Option<String>,
    max_results: usize,
    client: reqwest::Client,
}

impl BraveBackend {
    pub fn new(base_url: Option<&str>, api_key: Option<String>, max_results: usize) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(BRAVE_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            max_results,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SearchBackend for BraveBackend {
    fn id(&self) -> &str {
        "brave"
    }

    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchHit>> {
        let Some(key) = self.api_key.as_deref() else {
            bail!("no API key configured for brave");
        };

        let count = self.max_results.to_string();
        let resp = self
            .client
            .get(format!("{}/res/v1/web/search", self.base_url))
            .header("X-Subscription-Token", key)
            .query(&[("q", query), ("count", count.as_str())])
            .send()
            .await
            .context("brave request failed")?;

        if !resp.status().is_success() {
            bail!("brave returned HTTP {}", resp.status());
        }

        let body: serde_json::Value = resp.json().await.context("brave response was not JSON")?;
        Ok(parse_brave_results(&body, self.max_results))
    }
}

fn parse_brave_results(body: &serde_json::Value, max: usize) -> Vec<SearchHit> {
    let empty = vec![];
    let results = body["web"]["results"].as_array().unwrap_or(&empty);
    results
        .iter()
        .take(max)
        .filter_map(|r| {
            Some(SearchHit {
                title: r["title"].as_str()?.to_string(),
                url: r["url"].as_str()?.to_string(),
                content: r["description"].as_str().unwrap_or("").to_string(),
            })
        })
        .collect()
}

// --- SearXNG ---

pub struct SearxngBackend {
    base_url: String,
    max_results: usize,
    client: reqwest::Client,
}

impl SearxngBackend {
    pub fn new(base_url: &str, max_results: usize) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            max_results,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SearchBackend for SearxngBackend {
    fn id(&self) -> &str {
        "searxng"
    }

    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchHit>> {
        if self.base_url.is_empty() {
            bail!("no base_url configured for searxng");
        }

        let resp = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .context("searxng request failed")?;

        if !resp.status().is_success() {
            bail!("searxng returned HTTP {}", resp.status());
        }

        let body: serde_json::Value = resp.json().await.context("searxng response was not JSON")?;
        Ok(parse_searxng_results(&body, self.max_results))
    }
}

fn parse_searxng_results(body: &serde_json::Value, max: usize) -> Vec<SearchHit> {
    let empty = vec![];
    let results = body["results"].as_array().unwrap_or(&empty);
    results
        .iter()
        .take(max)
        .filter_map(|r| {
            Some(SearchHit {
                title: r["title"].as_str()?.to_string(),
                url: r["url"].as_str()?.to_string(),
                content: r["content"].as_str().unwrap_or("").to_string(),
            })
        })
        .collect()
}

// --- Tool ---

pub struct WebSearchTool {
    backend: Arc<dyn SearchBackend>,
}

impl WebSearchTool {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }
}

#[derive(Deserialize)]
struct Params {
    query: String,
}

/// Join every hit's content with a blank line.
pub fn join_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|h| h.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "webSearch"
    }

    fn description(&self) -> &str {
        "Search the latest information and realtime data on the internet."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to perform search on."
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: serde_json::Value, context: &ToolContext) -> ToolOutput {
        let query = match serde_json::from_value::<Params>(params) {
            Ok(p) => p.query,
            Err(e) => {
                warn!(error = %e, "webSearch called with invalid parameters");
                return ToolOutput::degraded(SEARCH_APOLOGY);
            }
        };

        info!(backend = self.backend.id(), query = %query, "Searching the web");

        let result = tokio::select! {
            biased;
            _ = context.cancel.cancelled() => {
                debug!("webSearch cancelled");
                return ToolOutput::degraded(SEARCH_APOLOGY);
            }
            result = tokio::time::timeout(context.timeout, self.backend.search(&query)) => result,
        };

        match result {
            Ok(Ok(hits)) => {
                debug!(hits = hits.len(), "webSearch finished");
                ToolOutput::text(join_hits(&hits))
            }
            Ok(Err(e)) => {
                warn!(backend = self.backend.id(), error = %e, "Search failed");
                ToolOutput::degraded(SEARCH_APOLOGY)
            }
            Err(_) => {
                warn!(
                    backend = self.backend.id(),
                    timeout_ms = context.timeout.as_millis() as u64,
                    "Search timed out"
                );
                ToolOutput::degraded(SEARCH_APOLOGY)
            }
        }
    }
}
