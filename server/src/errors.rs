//! The typed, `IntoResponse`-implementing error boundary, mirroring the
//! teacher's `git_http::errors::GitHttpError` split between internal
//! `anyhow::Error` propagation and a small enum surfaced to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    InvalidSession,
    UnknownRepo,
    SessionWaitTimeout,
    UpstreamFetchFailed,
    MalformedGitRequest,
    PktLineOverflow,
    SidebandOverflow,
    UnknownObject,
}

impl ErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid-input",
            ErrorKind::InvalidSession => "invalid-session",
            ErrorKind::UnknownRepo => "unknown-repo",
            ErrorKind::SessionWaitTimeout => "session-wait-timeout",
            ErrorKind::UpstreamFetchFailed => "upstream-fetch-failed",
            ErrorKind::MalformedGitRequest => "malformed-git-request",
            ErrorKind::PktLineOverflow => "pkt-line-overflow",
            ErrorKind::SidebandOverflow => "sideband-overflow",
            ErrorKind::UnknownObject => "unknown-object",
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub details: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, details: impl Into<String>) -> Self {
        Self { kind, details: details.into() }
    }

    pub fn invalid_input(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, details)
    }

    pub fn invalid_session(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidSession, details)
    }

    pub fn unknown_repo(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownRepo, details)
    }

    pub fn session_wait_timeout(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::SessionWaitTimeout, details)
    }

    pub fn upstream_fetch_failed(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamFetchFailed, details)
    }

    pub fn malformed_git_request(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedGitRequest, details)
    }

    pub fn pkt_line_overflow(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::PktLineOverflow, details)
    }

    pub fn sideband_overflow(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::SidebandOverflow, details)
    }

    pub fn unknown_object(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownObject, details)
    }

    /// Route a lower-level `anyhow::Error` raised by the engine crate (which
    /// tags its own failures with a `kind: ` prefix in the message, e.g.
    /// "unknown-object: ...") to the matching `ErrorKind`, defaulting to
    /// `malformed-git-request` for anything else raised mid-protocol.
    pub fn from_engine_error(err: anyhow::Error) -> Self {
        let msg = err.to_string();
        if msg.contains("unknown-object") {
            Self::unknown_object(msg)
        } else if msg.contains("pkt-line-overflow") {
            Self::pkt_line_overflow(msg)
        } else if msg.contains("sideband-overflow") {
            Self::sideband_overflow(msg)
        } else {
            Self::malformed_git_request(msg)
        }
    }

    fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::InvalidSession => StatusCode::NOT_FOUND,
            ErrorKind::UnknownRepo => StatusCode::NOT_FOUND,
            ErrorKind::SessionWaitTimeout => StatusCode::BAD_REQUEST,
            ErrorKind::UpstreamFetchFailed => StatusCode::BAD_REQUEST,
            ErrorKind::MalformedGitRequest => StatusCode::BAD_REQUEST,
            ErrorKind::PktLineOverflow => StatusCode::BAD_REQUEST,
            ErrorKind::SidebandOverflow => StatusCode::BAD_REQUEST,
            ErrorKind::UnknownObject => StatusCode::BAD_REQUEST,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.details)
    }
}

impl std::error::Error for ApiError {}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::from_engine_error(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    details: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(kind = self.kind.as_str(), details = %self.details, "request resolution failed");
        } else {
            tracing::warn!(kind = self.kind.as_str(), details = %self.details, "request rejected");
        }
        let body = ErrorBody { error: self.kind.as_str(), details: self.details };
        (status, Json(body)).into_response()
    }
}
