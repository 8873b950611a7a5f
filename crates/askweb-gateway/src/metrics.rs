//! Prometheus metrics recording and endpoint.

use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use askweb_agent::{AgentError, AgentErrorKind, AgentOutcome};

/// Status recorded for requests whose future was dropped (client closed request).
pub const STATUS_CLIENT_CLOSED: u16 = 499;

/// Install the Prometheus metrics recorder and return the handle for rendering.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Record a finished chat request with its status and duration.
pub fn record_chat(status: u16, duration_secs: f64) {
    let labels = [("status", status.to_string())];
    metrics::counter!("chat_requests_total", &labels).increment(1);
    metrics::histogram!("chat_request_duration_seconds", &labels).record(duration_secs);
}

/// Record an error of a given kind.
pub fn record_error(kind: &str) {
    let labels = [("kind", kind.to_string())];
    metrics::counter!("errors_total", &labels).increment(1);
}

/// Times one chat request; records it on drop, as 499 if never finished.
pub struct ChatRequestGuard {
    started: Instant,
    status: Option<u16>,
}

impl ChatRequestGuard {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            status: None,
        }
    }

    pub fn finish(mut self, status: u16) {
        self.status = Some(status);
    }
}

impl Drop for ChatRequestGuard {
    fn drop(&mut self) {
        record_chat(
            self.status.unwrap_or(STATUS_CLIENT_CLOSED),
            self.started.elapsed().as_secs_f64(),
        );
    }
}

/// Holds the `agent_active` gauge up for one run and releases it on drop.
pub struct AgentRunGuard {
    finished: bool,
}

impl AgentRunGuard {
    pub fn start() -> Self {
        metrics::gauge!("agent_active").increment(1.0);
        Self { finished: false }
    }

    /// Record the run's tool usage or error kind.
    pub fn finish(mut self, result: &Result<AgentOutcome, AgentError>) {
        self.finished = true;
        match result {
            Ok(outcome) => {
                metrics::counter!("agent_runs_total", "outcome" => "answered").increment(1);
                metrics::counter!("tool_calls_total").increment(u64::from(outcome.tool_calls));
            }
            Err(err) => {
                metrics::counter!("agent_runs_total", "outcome" => "failed").increment(1);
                record_error(err.kind().as_str());
            }
        }
    }
}

impl Drop for AgentRunGuard {
    fn drop(&mut self) {
        metrics::gauge!("agent_active").decrement(1.0);
        if !self.finished {
            metrics::counter!("agent_runs_total", "outcome" => "aborted").increment(1);
            record_error(AgentErrorKind::Aborted.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(f: impl FnOnce()) -> String {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, f);
        handle.render()
    }

    #[test]
    fn test_record_chat_does_not_panic() {
        // The metrics crate falls back to a no-op recorder.
        record_chat(200, 0.123);
    }

    #[test]
    fn test_finished_run_releases_gauge() {
        let rendered = render(|| {
            AgentRunGuard::start().finish(&Ok(AgentOutcome {
                answer: "ok".into(),
                iterations: 1,
                tool_calls: 2,
                duration_ms: 5,
            }));
        });
        assert!(rendered.contains("agent_active"), "{rendered}");
        assert!(!rendered.contains("agent_active 1"), "{rendered}");
        assert!(rendered.contains(r#"agent_runs_total{outcome="answered"} 1"#));
        assert!(rendered.contains("tool_calls_total 2"));
    }

    #[test]
    fn test_dropped_run_releases_gauge_and_counts_abort() {
        let rendered = render(|| {
            let _run = AgentRunGuard::start();
            let _request = ChatRequestGuard::start();
        });
        assert!(!rendered.contains("agent_active 1"), "{rendered}");
        assert!(rendered.contains(r#"agent_runs_total{outcome="aborted"} 1"#));
        assert!(rendered.contains(r#"errors_total{kind="aborted"} 1"#));
        assert!(rendered.contains(r#"chat_requests_total{status="499"} 1"#));
    }
}
