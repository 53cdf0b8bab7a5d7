//! Health and metrics endpoints
use crate::{context::AppContext, error::AuthzResult, metrics};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;

/// Health status response
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// "ok" or "degraded"
    pub status: &'static str,
    pub version: String,
    pub uptime_seconds: u64,
    pub database: bool,
    pub agent: bool,
}

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
}

/// Reports 503 when the database or the agent task is down
pub async fn health(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthStatus>) {
    let database = sqlx::query("SELECT 1").fetch_one(&ctx.db).await.is_ok();
    let agent = ctx.agent.is_running();

    if !database {
        tracing::warn!("health_check_failed: database unreachable");
    }

    let healthy = database && agent;
    let status = HealthStatus {
        status: if healthy { "ok" } else { "degraded" },
        version: ctx.config.service.version.clone(),
        uptime_seconds: ctx.started_at.elapsed().as_secs(),
        database,
        agent,
    };

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(status))
}

/// Prometheus text exposition
pub async fn prometheus_metrics() -> AuthzResult<Response> {
    let body = metrics::render_metrics()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
