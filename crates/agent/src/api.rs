//! Health, readiness and metrics endpoints
//!
//! `/healthz` fails only while a pipeline stage is down, `/readyz` also
//! waits for the first completed polling cycle.

use autoscale_lib::health::{HealthRegistry, HealthResponse, ReadinessResponse};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use tracing::{error, info};

fn status_code(ok: bool) -> StatusCode {
    if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// A degraded dispatcher still passes liveness
async fn liveness(State(health): State<HealthRegistry>) -> (StatusCode, Json<HealthResponse>) {
    let report = health.health().await;
    (status_code(report.status.is_operational()), Json(report))
}

async fn readiness(State(health): State<HealthRegistry>) -> (StatusCode, Json<ReadinessResponse>) {
    let readiness = health.readiness().await;
    (status_code(readiness.ready), Json(readiness))
}

async fn prometheus_metrics() -> Response {
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&prometheus::gather()) {
        Ok(body) => (
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn create_router(health: HealthRegistry) -> Router {
    Router::new()
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .with_state(health)
}

/// Serve the health API until the listener fails
pub async fn serve(port: u16, health: HealthRegistry) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Health API listening");

    axum::serve(listener, create_router(health)).await?;
    Ok(())
}
