use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::core::subscription::SubscriptionSlot;
use crate::metrics::{self, METRICS_ROUTE};
use crate::ports::http_server::{HttpServer, ServerRunFuture};
use crate::utils::graceful_shutdown::GracefulShutdown;

const LIVENESS_BODY: &str = "System Running";

// Shared state for the axum handlers
#[derive(Clone)]
struct AppState {
    slot: Arc<SubscriptionSlot>,
    metrics_handle: Option<PrometheusHandle>,
}

pub struct SubscriptionServer {
    listen_addr: String,
    sub_path: String,
    app_state: AppState,
    shutdown: Arc<GracefulShutdown>,
}

impl SubscriptionServer {
    pub fn with_dependencies(
        listen_addr: impl Into<String>,
        sub_path: impl Into<String>,
        slot: Arc<SubscriptionSlot>,
        metrics_handle: Option<PrometheusHandle>,
        shutdown: Arc<GracefulShutdown>,
    ) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            sub_path: sub_path.into(),
            app_state: AppState {
                slot,
                metrics_handle,
            },
            shutdown,
        }
    }

    /// Liveness at `/`, the scrape endpoint, and the subscription at `/<sub_path>`.
    pub fn build_app(&self) -> Router {
        Router::new()
            .route("/", get(liveness_handler))
            .route(&format!("/{METRICS_ROUTE}"), get(metrics_handler))
            .route(&format!("/{}", self.sub_path), get(subscription_handler))
            .with_state(self.app_state.clone())
            .layer(TraceLayer::new_for_http())
    }
}

async fn liveness_handler() -> &'static str {
    LIVENESS_BODY
}

async fn metrics_handler(State(app_state): State<AppState>) -> AxumResponse {
    match &app_state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "Metrics recorder not installed").into_response(),
    }
}

async fn subscription_handler(State(app_state): State<AppState>) -> AxumResponse {
    match app_state.slot.get() {
        Some(blob) => {
            metrics::increment_subscription_requests(StatusCode::OK.as_u16());
            (
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                blob.to_string(),
            )
                .into_response()
        }
        None => {
            tracing::debug!("Subscription requested before it was generated");
            metrics::increment_subscription_requests(StatusCode::NOT_FOUND.as_u16());
            (StatusCode::NOT_FOUND, "Not Found").into_response()
        }
    }
}

impl HttpServer for SubscriptionServer {
    fn run<'a>(&'a self) -> ServerRunFuture<'a> {
        Box::pin(async move {
            let addr: SocketAddr = self
                .listen_addr
                .parse()
                .with_context(|| format!("Invalid listen address: {}", self.listen_addr))?;

            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind to address: {}", addr))?;
            tracing::info!("HTTP server listening on {}", addr);

            let shutdown = self.shutdown.clone();
            axum::serve(listener, self.build_app().into_make_service())
                .with_graceful_shutdown(async move {
                    shutdown.wait_for_shutdown_signal().await;
                })
                .await
                .map_err(|e| anyhow!("HTTP Server error: {}", e))?;

            tracing::info!("HTTP server stopped");
            Ok(())
        })
    }
}
