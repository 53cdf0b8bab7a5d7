//! Contact trust negotiation
//!
//! Lets a user request an identity exchange with a peer, and Accept, Deny
//! or Block the requests peers send. Identifiers are resolved to validated
//! keys, pending requests are kept one per sender, and decisions turn into
//! contact writes and outbound messages for the transport layer.

pub mod agent;
pub mod api;
pub mod authorization;
pub mod config;
pub mod contacts;
pub mod context;
pub mod db;
pub mod error;
pub mod identity;
pub mod jobs;
pub mod metrics;
pub mod rate_limit;
pub mod server;

pub use agent::{AgentEvent, AgentHandle, AuthorizationAgent};
pub use context::AppContext;
pub use error::{AuthzError, AuthzResult};
