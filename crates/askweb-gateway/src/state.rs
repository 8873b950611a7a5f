//! Gateway shared state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use askweb_agent::{AgentLoop, AgentOptions};
use askweb_core::config::Config;
use askweb_providers::ModelClient;
use askweb_providers::openai::OpenAiCompatibleClient;
use askweb_tools::ToolRegistry;

use crate::chat::ChatService;

/// Shared state accessible from all handlers.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub chat: ChatService,
    /// Cancelled on shutdown; every request runs under a child token.
    pub shutdown: CancellationToken,
    #[cfg(feature = "metrics")]
    pub metrics: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl GatewayState {
    pub fn new(config: Arc<Config>, chat: ChatService) -> Self {
        Self {
            config,
            chat,
            shutdown: CancellationToken::new(),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Wire the configured model client and search backend into a chat service.
    pub fn from_config(config: Arc<Config>) -> Self {
        let model: Arc<dyn ModelClient> = Arc::new(OpenAiCompatibleClient::from_config(&config));
        let tools = Arc::new(ToolRegistry::from_config(&config));
        let agent = AgentLoop::new(model, tools, AgentOptions::from_config(&config));
        Self::new(config, ChatService::new(Arc::new(agent)))
    }

    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, handle: metrics_exporter_prometheus::PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
