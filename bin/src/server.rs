use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use eyre::{Result, WrapErr};
use nmz_common::{config::MetricsConfig, metrics::gather_text};
use nmz_ingest::IngestClient;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub fn router(ingest: Arc<IngestClient>) -> Router {
    Router::new()
        .route("/metrics", get(handle_metrics))
        .route("/health", get(handle_health))
        .with_state(ingest)
}

/// Serves `/metrics` and `/health` until `cancel` fires.
pub async fn serve(
    config: MetricsConfig,
    ingest: Arc<IngestClient>,
    cancel: CancellationToken,
) -> Result<()> {
    let address = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&address)
        .await
        .wrap_err_with(|| format!("failed to bind metrics server on {address}"))?;
    info!(%address, "serving metrics");

    axum::serve(listener, router(ingest))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .wrap_err("metrics server failed")
}

async fn handle_metrics() -> Response {
    match gather_text() {
        Ok(body) => ([(CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn handle_health(State(ingest): State<Arc<IngestClient>>) -> Response {
    let connected = ingest.is_connected();
    let status = if connected { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    let body = json!({
        "status": if connected { "ok" } else { "degraded" },
        "upstream_connected": connected,
        "reconnects": ingest.reconnect_count(),
    });

    (status, Json(body)).into_response()
}
