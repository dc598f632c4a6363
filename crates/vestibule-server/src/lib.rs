pub mod auth;
pub mod branding;
pub mod gate;
pub mod handlers;
pub mod headers;
pub mod install;
pub mod projects;
pub mod routes;
pub mod server;
pub mod session;
pub mod store;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: store::Store,
    pub sessions: session::SessionStore,
    pub gate: Arc<gate::RequestGate>,
    /// Administrator login; `None` disables `/auth/login`.
    pub credentials: Option<auth::StaticCredentials>,
}

pub use gate::{GateConfig, RequestGate};
pub use server::{build_state, resolve_data_dir, router, run, ServerConfig};
