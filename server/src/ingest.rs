//! The contribution ingester collaborator (spec.md §4.4): takes a handle,
//! returns an unordered list of Unix timestamps to synthesize as commits.
//! The actual upstream scraper is out of scope; this module only defines
//! the contract and two implementations a caller can plug in.

use anyhow::{ensure, Result};
use async_trait::async_trait;

/// Documented bound on how many timestamps a single ingest may return.
pub const MAX_CONTRIBS: usize = 1 << 24;

#[async_trait]
pub trait ContributionIngester: Send + Sync {
    async fn contributions(&self, handle: &str) -> Result<Vec<i64>>;
}

/// Fixed-list test double.
pub struct StaticIngester {
    timestamps: Vec<i64>,
}

impl StaticIngester {
    pub fn new(timestamps: Vec<i64>) -> Self {
        Self { timestamps }
    }
}

#[async_trait]
impl ContributionIngester for StaticIngester {
    async fn contributions(&self, _handle: &str) -> Result<Vec<i64>> {
        Ok(self.timestamps.clone())
    }
}

/// Fetches a pre-scraped `{handle} -> [unix_ts...]` JSON document from a
/// configured endpoint. The actual HTML scraping of the upstream
/// contribution graph (rate limiting, page parsing) is a genuinely
/// external collaborator per spec.md §1 and is not implemented here;
/// this is the pluggable seam a real scraper would sit behind.
pub struct UpstreamIngester {
    client: reqwest::Client,
    base_url: String,
}

impl UpstreamIngester {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl ContributionIngester for UpstreamIngester {
    async fn contributions(&self, handle: &str) -> Result<Vec<i64>> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), handle);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("upstream-fetch-failed: {e}"))?;
        let timestamps: Vec<i64> = response
            .error_for_status()
            .map_err(|e| anyhow::anyhow!("upstream-fetch-failed: {e}"))?
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("upstream-fetch-failed: bad response body: {e}"))?;
        ensure!(
            timestamps.len() <= MAX_CONTRIBS,
            "upstream-fetch-failed: {} timestamps exceeds MAX_CONTRIBS",
            timestamps.len()
        );
        Ok(timestamps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_ingester_returns_configured_timestamps() {
        let ingester = StaticIngester::new(vec![1, 2, 3]);
        let ts = ingester.contributions("anyone").await.unwrap();
        assert_eq!(ts, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn static_ingester_supports_empty_history() {
        let ingester = StaticIngester::new(vec![]);
        let ts = ingester.contributions("anyone").await.unwrap();
        assert!(ts.is_empty());
    }
}
