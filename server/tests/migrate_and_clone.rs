//! End-to-end HTTP-router tests built against the assembled `axum::Router`,
//! in the teacher's own `tower::ServiceExt::oneshot` style
//! (`server/tests/clone_repository_test.rs`).

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use gitoboros_engine::pktline;
use gitoboros_server::builder::{ReadmeMode, RepositoryBuilder};
use gitoboros_server::ingest::StaticIngester;
use gitoboros_server::session::InMemoryKvStore;
use gitoboros_server::{build_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn app_with_ingester(timestamps: Vec<i64>) -> axum::Router {
    let kv: Arc<dyn gitoboros_server::session::KvStore> = Arc::new(InMemoryKvStore::new());
    let builder = Arc::new(RepositoryBuilder::new(
        kv.clone(),
        Arc::new(StaticIngester::new(timestamps)),
        Uuid::NAMESPACE_URL,
        300,
        500,
        ReadmeMode::Fixed,
    ));
    build_router(AppState {
        kv,
        builder,
        session_expiry_secs: 300,
        session_namespace: Uuid::NAMESPACE_URL,
    })
}

async fn migrate(app: &axum::Router, body: Value) -> Value {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/migrate")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn s1_empty_history_builds_three_objects() {
    let app = app_with_ingester(vec![]);
    let body = json!({"handle": "alice", "email": "a@example.com", "branch": "main"});
    let resp = migrate(&app, body).await;
    assert_eq!(resp["repo_id"].as_str().unwrap().len(), 22);
    assert_eq!(resp["repo_ttl"], 300);
}

#[tokio::test]
async fn idempotent_migrate_returns_same_repo_id() {
    let app = app_with_ingester(vec![1_700_000_000]);
    let body = json!({"handle": "alice", "email": "a@example.com", "branch": "main"});
    let first = migrate(&app, body.clone()).await;
    let second = migrate(&app, body).await;
    assert_eq!(first["repo_id"], second["repo_id"]);
}

#[tokio::test]
async fn s5_invalid_repo_id_is_404() {
    let app = app_with_ingester(vec![]);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/repo/xxxxxxxxxxxxxxxxxxxxxx/info/refs?service=git-upload-pack")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn s3_info_refs_then_upload_pack_round_trip() {
    let app = app_with_ingester(vec![1_700_000_000]);
    let body = json!({"handle": "alice", "email": "a@example.com", "branch": "main"});
    let migrated = migrate(&app, body).await;
    let repo_id = migrated["repo_id"].as_str().unwrap().to_string();

    let refs_response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/repo/{repo_id}/info/refs?service=git-upload-pack"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(refs_response.status(), StatusCode::OK);
    let refs_body = axum::body::to_bytes(refs_response.into_body(), usize::MAX).await.unwrap();
    let lines = pktline::decode(&refs_body).unwrap();
    assert!(!lines.is_empty());
    let head_line = lines
        .iter()
        .filter_map(|l| l.as_data())
        .map(|d| String::from_utf8_lossy(d).to_string())
        .find(|s| s.contains("HEAD"))
        .unwrap();
    let head = head_line.split(' ').next().unwrap().to_string();
    assert_eq!(head.len(), 40);

    let mut want_body = Vec::new();
    want_body.extend(pktline::encode_str(&format!("want {head} side-band-64k\n")).unwrap());
    want_body.extend(pktline::encode(None).unwrap());
    want_body.extend(pktline::encode_str("done\n").unwrap());

    let upload_response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/repo/{repo_id}/git-upload-pack"))
                .header("content-type", "application/x-git-upload-pack-request")
                .header("accept", "application/x-git-upload-pack-result")
                .body(Body::from(want_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(upload_response.status(), StatusCode::OK);
    let pack_body = axum::body::to_bytes(upload_response.into_body(), usize::MAX).await.unwrap();

    let lines = pktline::decode(&pack_body).unwrap();
    assert_eq!(lines.first().unwrap().as_data(), Some(&b"NAK"[..]));
    assert_eq!(lines.last().unwrap(), &pktline::PktLine::Flush);
    let pack_bytes: Vec<u8> = lines
        .iter()
        .filter_map(|l| l.as_data())
        .filter(|d| d.first() == Some(&1u8))
        .flat_map(|d| d[1..].to_vec())
        .collect();
    assert!(pack_bytes.starts_with(b"PACK"));
}

#[tokio::test]
async fn delete_migration_removes_the_session() {
    let app = app_with_ingester(vec![]);
    let body = json!({"handle": "carol", "email": "c@example.com", "branch": "main"});
    let migrated = migrate(&app, body.clone()).await;
    let repo_id = migrated["repo_id"].as_str().unwrap().to_string();

    let delete_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/migrate/{repo_id}"))
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(delete_response.status(), StatusCode::NO_CONTENT);

    let refs_response = app
        .oneshot(
            Request::builder()
                .uri(format!("/repo/{repo_id}/info/refs?service=git-upload-pack"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(refs_response.status(), StatusCode::NOT_FOUND);
}
