//! Drives the object engine and the ingester collaborator to materialize
//! a session's packfile, per spec.md §4.5: dedup short-circuit, bounded
//! wait for an in-flight build, or a fresh build.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::Context as _;
use gitoboros_engine::{ObjectKind, Repository, DEFAULT_AUTHOR};
use uuid::Uuid;

use crate::errors::ApiError;
use crate::ingest::{ContributionIngester, MAX_CONTRIBS};
use crate::session::{KvStore, Session, SessionData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadmeMode {
    /// spec.md §4.5 step 2: a fixed body, required by the S1/S2 fixtures.
    Fixed,
    /// `GITOBOROS_README_TEMPLATE=rich`: the original's templated body
    /// (account, branch, generation time), opt-in only.
    Rich,
}

pub struct RepositoryBuilder {
    kv: Arc<dyn KvStore>,
    ingester: Arc<dyn ContributionIngester>,
    namespace: Uuid,
    expiry_secs: u64,
    wait_timeout_ms: u64,
    readme_mode: ReadmeMode,
}

impl RepositoryBuilder {
    pub fn new(
        kv: Arc<dyn KvStore>,
        ingester: Arc<dyn ContributionIngester>,
        namespace: Uuid,
        expiry_secs: u64,
        wait_timeout_ms: u64,
        readme_mode: ReadmeMode,
    ) -> Self {
        Self { kv, ingester, namespace, expiry_secs, wait_timeout_ms, readme_mode }
    }

    /// Returns the session's external (base58) URI, building fresh,
    /// reusing a valid build, or waiting for one already in flight.
    pub async fn build_or_reuse(
        &self,
        handle: &str,
        email: &str,
        branch: &str,
    ) -> Result<String, ApiError> {
        let session = Session::make_from_data(
            self.kv.clone(),
            self.namespace,
            handle,
            email,
            branch,
            self.expiry_secs,
        )
        .await
        .map_err(store_err)?;

        if session.is_valid().await.map_err(store_err)? {
            session.extend().await.map_err(store_err)?;
            return Ok(session.as_uri());
        }

        if session.is_opened().await.map_err(store_err)? {
            return self.wait_for_build(&session).await;
        }

        self.build_fresh(&session, handle, email, branch).await
    }

    async fn wait_for_build(&self, session: &Session) -> Result<String, ApiError> {
        let deadline = Instant::now() + Duration::from_millis(self.wait_timeout_ms);
        loop {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if session.is_valid().await.map_err(store_err)? {
                session.extend().await.map_err(store_err)?;
                return Ok(session.as_uri());
            }
            if Instant::now() >= deadline {
                return Err(ApiError::session_wait_timeout(
                    "build did not complete within SESSION_WAIT_TIMEOUT",
                ));
            }
        }
    }

    async fn build_fresh(
        &self,
        session: &Session,
        handle: &str,
        email: &str,
        branch: &str,
    ) -> Result<String, ApiError> {
        session.open().await.map_err(store_err)?;

        let timestamps = self
            .ingester
            .contributions(handle)
            .await
            .map_err(|e| ApiError::upstream_fetch_failed(e.to_string()))?;
        if timestamps.len() > MAX_CONTRIBS {
            return Err(ApiError::upstream_fetch_failed(format!(
                "{} timestamps exceeds MAX_CONTRIBS ({MAX_CONTRIBS})",
                timestamps.len()
            )));
        }

        let mut repo = Repository::new();
        for (i, ts) in timestamps.iter().enumerate() {
            repo.commit(DEFAULT_AUTHOR, email, &format!("Contribution #{i}"), Some(*ts))
                .map_err(ApiError::from_engine_error)?;
        }

        let readme_ts = now_unix();
        let readme_body = render_readme(self.readme_mode, handle, branch, readme_ts);
        repo.add_blob("README", &readme_body, Some(readme_ts))
            .map_err(ApiError::from_engine_error)?;
        repo.commit(DEFAULT_AUTHOR, email, "Added readme", Some(readme_ts))
            .map_err(ApiError::from_engine_error)?;

        let ids: Vec<_> = repo.store().all_ids().collect();
        let packfile = repo.pack(&ids).map_err(ApiError::from_engine_error)?;
        let head = repo
            .head()
            .context("unknown-object: repository has no HEAD after build")
            .map_err(ApiError::from_engine_error)?;

        let data = SessionData {
            total_objects: ids.len() as u64,
            latest_object: head,
            packfile,
            branch: branch.to_string(),
        };
        session.set_data(&data).await.map_err(store_err)?;
        session.close().await.map_err(store_err)?;
        session.extend().await.map_err(store_err)?;

        Ok(session.as_uri())
    }
}

fn store_err(e: anyhow::Error) -> ApiError {
    // The key-value store is listed alongside the upstream scraper as an
    // out-of-scope external collaborator in spec.md §1; a backend outage
    // surfaces the same way a scraper outage would.
    ApiError::upstream_fetch_failed(format!("session store error: {e}"))
}

fn render_readme(mode: ReadmeMode, handle: &str, branch: &str, generated_at: i64) -> Vec<u8> {
    match mode {
        ReadmeMode::Fixed => b"Hello, world!\n".to_vec(),
        ReadmeMode::Rich => format!(
            "# {handle}\n\nSynthesized from {handle}'s contribution history on branch `{branch}`.\nGenerated at unix time {generated_at}.\n"
        )
        .into_bytes(),
    }
}

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}
