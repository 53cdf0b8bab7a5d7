//! API routes and handlers
pub mod events;
pub mod health;
pub mod identity;
pub mod inbound;
pub mod requests;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(requests::routes())
        .merge(inbound::routes())
        .merge(identity::routes())
        .merge(events::routes())
}
