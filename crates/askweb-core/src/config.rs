//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

/// Top-level askweb configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

// --- Model provider ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelProviderKind {
    #[default]
    Groq,
    #[serde(rename = "openai")]
    OpenAi,
}

impl ModelProviderKind {
    pub fn id(&self) -> &'static str {
        match self {
            ModelProviderKind::Groq => "groq",
            ModelProviderKind::OpenAi => "openai",
        }
    }

    fn default_api_key_env(&self) -> &'static str {
        match self {
            ModelProviderKind::Groq => "GROQ_API_KEY",
            ModelProviderKind::OpenAi => "OPENAI_API_KEY",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ModelProviderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Only `0` is accepted; completions always run at temperature zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ModelConfig {
    /// Resolve the API key: `api_key` first, then `api_key_env`, then the
    /// provider's conventional environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        let env = self
            .api_key_env
            .clone()
            .or_else(|| Some(self.provider.default_api_key_env().to_string()));
        resolve_secret_field(&self.api_key, &env)
    }
}

// --- Search provider ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchBackendKind {
    #[default]
    Tavily,
    Brave,
    Searxng,
}

impl SearchBackendKind {
    pub fn id(&self) -> &'static str {
        match self {
            SearchBackendKind::Tavily => "tavily",
            SearchBackendKind::Brave => "brave",
            SearchBackendKind::Searxng => "searxng",
        }
    }

    fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            SearchBackendKind::Tavily => Some("TAVILY_API_KEY"),
            SearchBackendKind::Brave => Some("BRAVE_API_KEY"),
            SearchBackendKind::Searxng => None,
        }
    }

    /// Whether the backend can be used without an API key.
    pub fn is_keyless(&self) -> bool {
        self.default_api_key_env().is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub backend: SearchBackendKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

impl SearchConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        let env = self
            .api_key_env
            .clone()
            .or_else(|| self.backend.default_api_key_env().map(str::to_string));
        resolve_secret_field(&self.api_key, &env)
    }
}

// --- Agent loop ---

/// Largest accepted value for any agent timeout (one day).
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Upper bound on model calls per request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_timeout_secs: Option<u64>,
    /// Wall-clock budget for a whole request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_deadline_secs: Option<u64>,
}

// --- HTTP server ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    3000
}

// --- Logging ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "askweb_agent=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: None,
            filters: Vec::new(),
            output: default_log_output(),
        }
    }
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

static ENV_VAR_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is a valid regex")
});

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::AskwebError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file location.
    pub fn default_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn model_config(&self) -> ModelConfig {
        self.model.clone().unwrap_or_default()
    }

    pub fn search_config(&self) -> SearchConfig {
        self.search.clone().unwrap_or_default()
    }

    pub fn logging_config(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Model identifier sent to the provider.
    pub fn model_id(&self) -> String {
        self.model
            .as_ref()
            .and_then(|m| m.model.clone())
            .unwrap_or_else(|| "llama-3.1-8b-instant".to_string())
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.model.as_ref().and_then(|m| m.max_tokens)
    }

    pub fn max_iterations(&self) -> u32 {
        self.agent
            .as_ref()
            .and_then(|a| a.max_iterations)
            .unwrap_or(10)
    }

    pub fn model_timeout_secs(&self) -> u64 {
        self.agent
            .as_ref()
            .and_then(|a| a.model_timeout_secs)
            .unwrap_or(60)
    }

    pub fn tool_timeout_secs(&self) -> u64 {
        self.agent
            .as_ref()
            .and_then(|a| a.tool_timeout_secs)
            .unwrap_or(15)
    }

    pub fn request_deadline_secs(&self) -> u64 {
        self.agent
            .as_ref()
            .and_then(|a| a.request_deadline_secs)
            .unwrap_or(120)
    }

    pub fn max_search_results(&self) -> usize {
        self.search
            .as_ref()
            .and_then(|s| s.max_results)
            .unwrap_or(5)
    }

    pub fn bind_address(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn server_port(&self) -> u16 {
        self.server.as_ref().map(|s| s.port).unwrap_or_else(default_port)
    }

    /// Whether the model provider has credentials configured.
    pub fn model_configured(&self) -> bool {
        self.model_config().resolve_api_key().is_some()
    }

    /// Whether the search backend is usable (keyless backends need a base URL).
    pub fn search_configured(&self) -> bool {
        let search = self.search_config();
        if search.backend.is_keyless() {
            search.base_url.as_deref().is_some_and(|u| !u.is_empty())
        } else {
            search.resolve_api_key().is_some()
        }
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if !self.model_configured() {
            warnings.push(format!(
                "Model provider '{}' has no API key configured",
                self.model_config().provider.id()
            ));
        }

        let search = self.search_config();
        if !self.search_configured() {
            if search.backend.is_keyless() {
                warnings.push(format!(
                    "Search backend '{}' has no base_url configured",
                    search.backend.id()
                ));
            } else {
                warnings.push(format!(
                    "Search backend '{}' has no API key configured",
                    search.backend.id()
                ));
            }
        }

        if self.max_iterations() == 0 {
            errors.push("agent.max_iterations must be at least 1".to_string());
        }
        if let Some(t) = self.model.as_ref().and_then(|m| m.temperature) {
            if t != 0.0 {
                errors.push(format!("model.temperature must be 0 (got {t})"));
            }
        }
        let timeouts = [
            ("model_timeout_secs", self.model_timeout_secs()),
            ("tool_timeout_secs", self.tool_timeout_secs()),
            ("request_deadline_secs", self.request_deadline_secs()),
        ];
        for (name, secs) in timeouts {
            if secs == 0 || secs > MAX_TIMEOUT_SECS {
                errors.push(format!(
                    "agent.{name} must be between 1 and {MAX_TIMEOUT_SECS} (got {secs})"
                ));
            }
        }
        if let Some(server) = &self.server {
            if server.port == 0 {
                errors.push("Server port cannot be 0".to_string());
            }
        }

        (warnings, errors)
    }
}

/// Base directory for askweb data: `~/.askweb/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".askweb")
}
