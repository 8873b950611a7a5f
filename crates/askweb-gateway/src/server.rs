//! Axum-based HTTP server.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::chat::ChatReply;
use crate::health::health_report;
use crate::state::GatewayState;

/// Build the application router. Exposed separately so tests can drive it
/// without binding a socket.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    let router = Router::new()
        .route(
            "/api/chat",
            post(chat_handler).fallback(method_not_allowed_handler),
        )
        .route("/api/health", get(health_handler));

    #[cfg(feature = "metrics")]
    let router = router.route("/metrics", get(metrics_handler));

    router
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server and serve until Ctrl-C.
pub async fn start_gateway(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let bind_addr = state.config.bind_address();
    let shutdown = state.shutdown.clone();
    let app = build_router(state);

    let addr = format!("{bind_addr}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Gateway listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // In-flight agent runs stop at their next suspension point.
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

async fn chat_handler(State(state): State<Arc<GatewayState>>, body: Bytes) -> Response {
    let request_id = Uuid::new_v4();
    // Dropped with this future when the client disconnects.
    let cancel = state.shutdown.child_token();
    let _guard = cancel.clone().drop_guard();

    state
        .chat
        .handle(&body, &cancel)
        .instrument(info_span!("chat", %request_id))
        .await
        .into_response()
}

async fn method_not_allowed_handler() -> Response {
    ChatReply::method_not_allowed().into_response()
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(health_report(&state.config))
}

#[cfg(feature = "metrics")]
async fn metrics_handler(State(state): State<Arc<GatewayState>>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => axum::http::StatusCode::NOT_FOUND.into_response(),
    }
}

impl IntoResponse for ChatReply {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

async fn shutdown_signal() {
    wait_for_signal(tokio::signal::ctrl_c()).await;
}

/// Resolve when `signal` fires; never resolve if it could not be installed.
async fn wait_for_signal(signal: impl Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        warn!(error = %e, "Failed to listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
