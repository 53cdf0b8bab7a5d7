//! Compose-side identity endpoints
//!
//! `POST /identifier` feeds the recipient field; the answer reflects the
//! state at the time of the call and later lookup results arrive on
//! `/events`. `POST /outgoing` builds our own request to that recipient.
use crate::{
    agent::IdentifierView,
    authorization::{CapabilityFlags, OutboundMessage},
    context::AppContext,
    error::AuthzResult,
};
use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/identifier", post(edit_identifier))
        .route("/outgoing", post(compose))
}

#[derive(Debug, Deserialize)]
pub struct IdentifierBody {
    pub identifier: String,
}

/// POST /identifier
pub async fn edit_identifier(
    State(ctx): State<AppContext>,
    Json(body): Json<IdentifierBody>,
) -> AuthzResult<Json<IdentifierView>> {
    Ok(Json(ctx.agent.edit_identifier(body.identifier).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeBody {
    pub capabilities: u16,
    #[serde(default)]
    pub greeting: String,
    #[serde(default)]
    pub attach_extended_key: bool,
}

/// POST /outgoing
pub async fn compose(
    State(ctx): State<AppContext>,
    Json(body): Json<ComposeBody>,
) -> AuthzResult<Json<OutboundMessage>> {
    let message = ctx
        .agent
        .compose(
            CapabilityFlags::from_bits(body.capabilities),
            body.greeting,
            body.attach_extended_key,
        )
        .await?;

    Ok(Json(message))
}
