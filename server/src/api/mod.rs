//! The JSON API surface: `/api/migrate` and its DELETE counterpart.

pub mod migrate;

use axum::routing::{delete, post};
use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/migrate", post(migrate::migrate))
        .route("/api/migrate/{repo_id}", delete(migrate::delete_migration))
}
