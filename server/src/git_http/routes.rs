//! Axum router assembly for the `/repo/{repo_id}` smart HTTP surface.

use axum::routing::{get, post};
use axum::Router;

use crate::git_http::{advertise, upload_pack};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/repo/{repo_id}/info/refs", get(advertise::handle))
        .route("/repo/{repo_id}/git-upload-pack", post(upload_pack::handle))
}
