//! `POST /api/migrate` and `DELETE /api/migrate/{repo_id}` — the
//! migration request surface (spec.md §6, DELETE route additive per
//! SPEC_FULL.md §5 item 3).

use std::time::Instant;

use axum::extract::{Path, State};
use axum::Json;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};

use crate::errors::ApiError;
use crate::session::Session;
use crate::validation::{self, DEFAULT_BRANCH};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct MigrateRequest {
    pub handle: String,
    pub email: String,
    #[serde(default)]
    pub branch: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MigrateResponse {
    pub repo_id: String,
    pub repo_ttl: u64,
}

pub async fn migrate(
    State(app): State<AppState>,
    Json(req): Json<MigrateRequest>,
) -> Result<Json<MigrateResponse>, ApiError> {
    let start = Instant::now();
    counter!("api.migrate").increment(1);
    let branch = req.branch.as_deref().unwrap_or(DEFAULT_BRANCH);
    validation::validate_handle(&req.handle)?;
    validation::validate_email(&req.email)?;
    validation::validate_branch(branch)?;

    let repo_id = app
        .builder
        .build_or_reuse(&req.handle, &req.email, branch)
        .await
        .map_err(|e| {
            counter!("api.migrate.failed").increment(1);
            tracing::warn!(handle = %req.handle, error = %e, "migrate request failed");
            e
        })?;

    histogram!("api.migrate_ms").record(start.elapsed().as_millis() as f64);
    Ok(Json(MigrateResponse { repo_id, repo_ttl: app.session_expiry_secs }))
}

#[derive(Debug, Deserialize)]
pub struct DeleteMigrationRequest {
    pub handle: String,
    pub email: String,
    #[serde(default)]
    pub branch: Option<String>,
}

/// Deletes a session's backing hash if and only if the caller's
/// fingerprint (derived the same way migrate derives it) matches the
/// `repo_id` in the path. The original source's `delete_migration_handler`
/// is a no-op stub; this workspace implements it for real (SPEC_FULL.md §5.3).
pub async fn delete_migration(
    State(app): State<AppState>,
    Path(repo_id): Path<String>,
    Json(req): Json<DeleteMigrationRequest>,
) -> Result<axum::http::StatusCode, ApiError> {
    let branch = req.branch.as_deref().unwrap_or(DEFAULT_BRANCH);
    validation::validate_handle(&req.handle)?;
    validation::validate_email(&req.email)?;
    validation::validate_branch(branch)?;

    let session = Session::make_from_data(
        app.kv.clone(),
        app.session_namespace,
        &req.handle,
        &req.email,
        branch,
        app.session_expiry_secs,
    )
    .await
    .map_err(ApiError::from)?;

    if session.as_uri() != repo_id {
        return Err(ApiError::invalid_input("repo_id does not match the given fingerprint"));
    }

    session.delete().await.map_err(ApiError::from)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
