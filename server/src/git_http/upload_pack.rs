//! `POST /repo/{repo_id}/git-upload-pack` — fetch negotiation and
//! streaming pack delivery (spec.md §4.6).

use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use gitoboros_engine::pktline::{self, PktLine};
use metrics::{counter, histogram};
use tokio_stream::wrappers::ReceiverStream;

use crate::errors::ApiError;
use crate::git_http::sideband::{stream_response, NegotiatedCaps, SidebandKind};
use crate::git_http::{common_git_headers, validate_repo_id_length};
use crate::session::Session;
use crate::AppState;

struct ParsedRequest {
    wants: Vec<String>,
    caps: NegotiatedCaps,
}

fn parse_request(body: &[u8]) -> Result<ParsedRequest, ApiError> {
    let lines = pktline::decode(body)?;

    let mut wants = Vec::new();
    let mut caps = NegotiatedCaps::default();
    let mut saw_side_band = false;
    let mut saw_side_band_64k = false;
    let mut done = false;

    for line in lines {
        let PktLine::Data(data) = line else { continue };
        let text = String::from_utf8_lossy(&data);
        let text = text.trim_end();

        if let Some(rest) = text.strip_prefix("want ") {
            let mut tokens = rest.split_whitespace();
            let id = tokens
                .next()
                .ok_or_else(|| ApiError::malformed_git_request("want line missing object id"))?;
            if wants.is_empty() {
                for cap in tokens {
                    match cap {
                        "side-band" => saw_side_band = true,
                        "side-band-64k" => saw_side_band_64k = true,
                        "no-progress" => caps.no_progress = true,
                        _ => {}
                    }
                }
            }
            wants.push(id.to_string());
        } else if text == "done" {
            done = true;
        }
        // "have" lines and anything else are ignored: no graph walk.
    }

    if saw_side_band && saw_side_band_64k {
        return Err(ApiError::malformed_git_request(
            "side-band and side-band-64k are mutually exclusive",
        ));
    }
    caps.sideband = if saw_side_band {
        Some(SidebandKind::Narrow)
    } else if saw_side_band_64k {
        Some(SidebandKind::Wide)
    } else {
        None
    };

    if !done {
        return Err(ApiError::malformed_git_request("request is missing a terminating done line"));
    }

    Ok(ParsedRequest { wants, caps })
}

pub async fn handle(
    State(app): State<AppState>,
    Path(repo_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let start = Instant::now();
    counter!("git_http.upload_pack").increment(1);
    let content_type = headers.get("content-type").and_then(|v| v.to_str().ok());
    let accept = headers.get("accept").and_then(|v| v.to_str().ok());
    if content_type != Some("application/x-git-upload-pack-request")
        || accept != Some("application/x-git-upload-pack-result")
    {
        return Err(ApiError::malformed_git_request(
            "expected application/x-git-upload-pack-request / -result",
        ));
    }

    validate_repo_id_length(&repo_id)?;
    let session = Session::make_from_uri(app.kv.clone(), &repo_id, app.session_expiry_secs)
        .map_err(|e| ApiError::unknown_repo(e.to_string()))?;
    if !session.is_valid().await.map_err(|e| ApiError::unknown_repo(e.to_string()))? {
        return Err(ApiError::unknown_repo("session is not built"));
    }
    let data = session.get_data().await.map_err(|e| ApiError::unknown_repo(e.to_string()))?;

    let parsed = parse_request(&body)?;
    let head = data.latest_object.to_string();
    if !parsed.wants.iter().any(|w| w == &head) {
        return Err(ApiError::malformed_git_request("want does not include the session HEAD"));
    }

    counter!("git_http.pack.objects").increment(data.total_objects);
    histogram!("git_http.upload_pack_ms").record(start.elapsed().as_millis() as f64);

    let (tx, rx) = tokio::sync::mpsc::channel(32);
    let total_objects = data.total_objects;
    let packfile = data.packfile;
    let caps = parsed.caps;
    tokio::spawn(async move {
        if let Err(e) = stream_response(tx, packfile, total_objects, caps).await {
            tracing::warn!(error = %e, "upload-pack response stream ended with an error");
        }
    });

    let mut response_headers = common_git_headers();
    response_headers.insert(
        "content-type",
        axum::http::HeaderValue::from_static("application/x-git-upload-pack-result"),
    );

    let stream = ReceiverStream::new(rx);
    Ok((response_headers, Body::from_stream(stream)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_want_and_done() {
        let mut body = Vec::new();
        body.extend(pktline::encode_str("want abc123 side-band-64k no-progress\n").unwrap());
        body.extend(pktline::encode_str("have def456\n").unwrap());
        body.extend(pktline::encode(None).unwrap());
        body.extend(pktline::encode_str("done\n").unwrap());

        let parsed = parse_request(&body).unwrap();
        assert_eq!(parsed.wants, vec!["abc123"]);
        assert!(parsed.caps.no_progress);
        assert_eq!(parsed.caps.sideband, Some(SidebandKind::Wide));
    }

    #[test]
    fn missing_done_is_rejected() {
        let mut body = Vec::new();
        body.extend(pktline::encode_str("want abc123\n").unwrap());
        assert!(parse_request(&body).is_err());
    }

    #[test]
    fn both_sidebands_is_rejected() {
        let mut body = Vec::new();
        body.extend(pktline::encode_str("want abc123 side-band side-band-64k\n").unwrap());
        body.extend(pktline::encode_str("done\n").unwrap());
        assert!(parse_request(&body).is_err());
    }
}
