//! `GET /repo/{repo_id}/info/refs?service=git-upload-pack` — reference
//! advertisement (spec.md §4.6).

use std::collections::HashMap;

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use gitoboros_engine::pktline;
use metrics::{counter, histogram};

use crate::errors::ApiError;
use crate::git_http::{common_git_headers, validate_repo_id_length};
use crate::session::Session;
use crate::AppState;

const CAPABILITIES: &str = "side-band side-band-64k object-format=sha1 allow-tip-sha1-in-want no-progress agent=git/fakegit";

pub async fn handle(
    State(app): State<AppState>,
    Path(repo_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let start = Instant::now();
    counter!("git_http.info_refs").increment(1);
    if params.get("service").map(String::as_str) != Some("git-upload-pack") {
        return Err(ApiError::malformed_git_request(
            "info/refs requires service=git-upload-pack",
        ));
    }

    validate_repo_id_length(&repo_id)?;
    let session = Session::make_from_uri(app.kv.clone(), &repo_id, app.session_expiry_secs)
        .map_err(|e| ApiError::unknown_repo(e.to_string()))?;
    if !session.is_valid().await.map_err(|e| ApiError::unknown_repo(e.to_string()))? {
        return Err(ApiError::unknown_repo("session is not built"));
    }
    let data = session.get_data().await.map_err(|e| ApiError::unknown_repo(e.to_string()))?;

    let head = data.latest_object.to_string();
    let caps = format!("{CAPABILITIES} symref=HEAD:refs/heads/{}", data.branch);

    let mut body = Vec::new();
    body.extend(pktline::encode_str("# service=git-upload-pack\n")?);
    body.extend(pktline::encode(None)?);
    body.extend(pktline::encode_str(&format!("{head} HEAD\0{caps}\n"))?);
    body.extend(pktline::encode_str(&format!("{head} refs/heads/{}\n", data.branch))?);
    body.extend(pktline::encode(None)?);

    let mut headers = common_git_headers();
    headers.insert(
        "content-type",
        axum::http::HeaderValue::from_static("application/x-git-upload-pack-advertisement"),
    );

    histogram!("git_http.info_refs_ms").record(start.elapsed().as_millis() as f64);
    Ok((headers, body).into_response())
}
