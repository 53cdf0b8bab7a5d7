//! Pending request endpoints
//!
//! Listing, inspection and decisions on authorization requests waiting for
//! the user.
use crate::{
    agent::RequestView,
    authorization::{Decision, RequestGroup, Settlement, UserChoices},
    context::AppContext,
    error::{AuthzError, AuthzResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/requests", get(list_requests))
        .route("/requests/:id", get(get_request).delete(dismiss_request))
        .route("/requests/:id/decision", post(decide_request))
}

/// GET /requests
pub async fn list_requests(State(ctx): State<AppContext>) -> AuthzResult<Json<RequestGroup>> {
    Ok(Json(ctx.agent.pending().await?))
}

/// GET /requests/:id
pub async fn get_request(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> AuthzResult<Json<RequestView>> {
    ctx.agent
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AuthzError::NotFound(format!("Authorization request {}", id)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionBody {
    pub decision: Decision,
    #[serde(default)]
    pub add_as_contact: bool,
    #[serde(default)]
    pub accept_extended_key: bool,
    pub privacy: Option<crate::contacts::PrivacySetting>,
    pub icon: Option<String>,
}

impl DecisionBody {
    fn choices(&self) -> UserChoices {
        UserChoices {
            add_as_contact: self.add_as_contact,
            accept_extended_key: self.accept_extended_key,
            privacy: self.privacy,
            icon: self.icon.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    /// False when the request was already settled
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement: Option<Settlement>,
}

/// POST /requests/:id/decision
///
/// 422 with the reason when the choices are invalid, 409 when accepting a
/// request that is gone, 503 when the contact could not be saved.
pub async fn decide_request(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<DecisionBody>,
) -> AuthzResult<Json<DecisionResponse>> {
    let settlement = ctx.agent.decide(id, body.decision, body.choices()).await?;

    Ok(Json(DecisionResponse {
        applied: settlement.is_some(),
        settlement,
    }))
}

/// DELETE /requests/:id
pub async fn dismiss_request(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> AuthzResult<StatusCode> {
    if ctx.agent.dismiss(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AuthzError::NotFound(format!("Authorization request {}", id)))
    }
}
