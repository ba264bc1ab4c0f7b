//! The smart HTTP protocol surface: reference advertisement, upload-pack
//! negotiation, and sideband-multiplexed streaming delivery. Grounded in
//! the teacher's `server/src/git_http/{pkt,pack,v2}.rs`, adapted from
//! protocol v2 (`ls-refs`/`fetch`) to the v0 `want`/`have`/`done` grammar.

pub mod advertise;
pub mod routes;
pub mod sideband;
pub mod upload_pack;

use axum::http::HeaderMap;
use axum::http::HeaderValue;

use crate::errors::ApiError;

/// External session ids are always exactly this many base58 characters.
pub const SESSION_ID_LENGTH: usize = 22;

pub fn validate_repo_id_length(repo_id: &str) -> Result<(), ApiError> {
    if repo_id.chars().count() != SESSION_ID_LENGTH {
        return Err(ApiError::unknown_repo(format!(
            "repo id must be {SESSION_ID_LENGTH} characters, got {}",
            repo_id.chars().count()
        )));
    }
    Ok(())
}

/// `Pragma`/`Cache-Control`/`Expires` headers every git-http response carries.
pub fn common_git_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("pragma", HeaderValue::from_static("No-Cache"));
    headers.insert(
        "cache-control",
        HeaderValue::from_static("No-Cache, Max-Age=0, Must-Revalidate"),
    );
    headers.insert("expires", HeaderValue::from_static("Fri, 01 Jan 1980 00:00:00 GMT"));
    headers
}
