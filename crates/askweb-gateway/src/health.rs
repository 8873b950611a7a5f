//! Credential health report.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use askweb_core::config::Config;

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    /// ISO-8601 with millisecond precision.
    pub timestamp: String,
    /// Provider/backend id to "credentials configured".
    pub services: BTreeMap<String, bool>,
}

pub fn health_report(config: &Config) -> HealthReport {
    let mut services = BTreeMap::new();
    services.insert(
        config.model_config().provider.id().to_string(),
        config.model_configured(),
    );
    services.insert(
        config.search_config().backend.id().to_string(),
        config.search_configured(),
    );

    HealthReport {
        status: "OK",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        services,
    }
}
