//! Transport entry point for authorization messages
use crate::{
    agent::Delivery, authorization::AuthorizationMessage, context::AppContext,
    error::AuthzResult,
};
use axum::{extract::State, routing::post, Json, Router};

pub fn routes() -> Router<AppContext> {
    Router::new().route("/inbound", post(deliver))
}

/// POST /inbound
pub async fn deliver(
    State(ctx): State<AppContext>,
    Json(message): Json<AuthorizationMessage>,
) -> AuthzResult<Json<Delivery>> {
    Ok(Json(ctx.agent.deliver(message).await?))
}
