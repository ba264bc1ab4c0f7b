use std::sync::Arc;

use anyhow::Context as _;
use gitoboros_server::builder::{ReadmeMode, RepositoryBuilder};
use gitoboros_server::config::Config;
use gitoboros_server::ingest::UpstreamIngester;
use gitoboros_server::session::RedisKvStore;
use gitoboros_server::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    tracing::info!(
        workers = config.http_workers,
        redis = %config.redis_url(),
        "starting gitoboros-server"
    );

    let kv = Arc::new(
        RedisKvStore::connect(&config.redis_url())
            .await
            .context("failed to connect to redis")?,
    );

    let upstream_url = std::env::var("CONTRIB_SOURCE_URL")
        .unwrap_or_else(|_| "http://localhost:9000/contributions".to_string());
    let ingester = Arc::new(UpstreamIngester::new(upstream_url));

    let readme_mode = match std::env::var("GITOBOROS_README_TEMPLATE").as_deref() {
        Ok("rich") => ReadmeMode::Rich,
        _ => ReadmeMode::Fixed,
    };

    let builder = Arc::new(RepositoryBuilder::new(
        kv.clone(),
        ingester,
        config.session_namespace,
        config.session_expiry_secs,
        config.session_wait_timeout_ms,
        readme_mode,
    ));

    let state = AppState {
        kv,
        builder,
        session_expiry_secs: config.session_expiry_secs,
        session_namespace: config.session_namespace,
    };

    let app = build_router(state);

    let addr = format!("{}:{}", config.http_host, config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
