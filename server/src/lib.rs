//! Gitoboros server: session store, contribution ingester, repository
//! builder, and the smart HTTP protocol surface wired together with axum.

pub mod api;
pub mod builder;
pub mod config;
pub mod errors;
pub mod git_http;
pub mod ingest;
pub mod session;
pub mod validation;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use builder::RepositoryBuilder;
use session::KvStore;

/// Shared handler state: the key-value backend, the builder that drives
/// engine + ingester against it, and the bits of config handlers need
/// directly (session TTL for `repo_ttl` responses, the namespace for
/// re-deriving a fingerprint in the DELETE route).
#[derive(Clone)]
pub struct AppState {
    pub kv: Arc<dyn KvStore>,
    pub builder: Arc<RepositoryBuilder>,
    pub session_expiry_secs: u64,
    pub session_namespace: Uuid,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::router())
        .merge(git_http::routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
