//! JSON REST deal feed client.
//!
//! Each configured endpoint serves a JSON array of listing entries for one
//! source category. Feeds come and go; a failing endpoint is logged and
//! skipped, and the fetch only fails outright when every endpoint does.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::DealFeed;
use crate::types::{DealSource, DealhawkError, RawListing};

/// One listing entry as served by a feed endpoint.
#[derive(Debug, Deserialize)]
struct FeedEntry {
    title: String,
    #[serde(default)]
    summary: String,
    url: String,
}

/// A feed endpoint paired with its source category.
#[derive(Debug, Clone)]
pub struct FeedSource {
    pub url: String,
    pub source: DealSource,
}

pub struct RestFeedClient {
    http: Client,
    sources: Vec<FeedSource>,
    /// Cap on total listings returned per fetch, across all sources.
    max_items: usize,
}

impl RestFeedClient {
    pub fn new(sources: Vec<FeedSource>, max_items: usize, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build feed HTTP client")?;
        Ok(Self {
            http,
            sources,
            max_items,
        })
    }

    async fn fetch_source(&self, source: &FeedSource) -> Result<Vec<RawListing>> {
        debug!(url = %source.url, source = %source.source, "Fetching feed");

        let response = self
            .http
            .get(&source.url)
            .send()
            .await
            .with_context(|| format!("Feed request failed: {}", source.url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Feed {} returned HTTP {status}", source.url);
        }

        let entries: Vec<FeedEntry> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse feed body: {}", source.url))?;

        Ok(entries
            .into_iter()
            .filter(|e| !e.title.is_empty() && !e.url.is_empty())
            .map(|e| RawListing {
                title: e.title,
                summary: e.summary,
                url: e.url,
                source: source.source,
            })
            .collect())
    }
}

#[async_trait]
impl DealFeed for RestFeedClient {
    async fn fetch_raw(&self) -> Result<Vec<RawListing>> {
        let mut listings = Vec::new();
        let mut failures = 0usize;

        for source in &self.sources {
            match self.fetch_source(source).await {
                Ok(batch) => {
                    debug!(source = %source.source, count = batch.len(), "Feed fetched");
                    listings.extend(batch);
                }
                Err(e) => {
                    warn!(source = %source.source, error = %e, "Feed fetch failed, skipping");
                    failures += 1;
                }
            }
            if listings.len() >= self.max_items {
                break;
            }
        }

        if listings.is_empty() && failures == self.sources.len() && !self.sources.is_empty() {
            return Err(DealhawkError::Feed {
                feed: "all".to_string(),
                message: format!("all {failures} feeds failed"),
            }
            .into());
        }

        listings.truncate(self.max_items);
        info!(
            listings = listings.len(),
            failed_feeds = failures,
            "Feed scan complete"
        );
        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_deserialization() {
        let entry: FeedEntry = serde_json::from_str(
            r#"{"title": "55\" TV for $178", "summary": "HDR10, 3x HDMI", "url": "https://deals.example.com/tv"}"#,
        )
        .unwrap();
        assert_eq!(entry.title, "55\" TV for $178");
        assert_eq!(entry.summary, "HDR10, 3x HDMI");
    }

    #[test]
    fn test_entry_missing_summary_defaults_empty() {
        let entry: FeedEntry =
            serde_json::from_str(r#"{"title": "Drill kit", "url": "https://x.example/d"}"#)
                .unwrap();
        assert!(entry.summary.is_empty());
    }

    #[test]
    fn test_construction() {
        let client = RestFeedClient::new(
            vec![FeedSource {
                url: "https://deals.example.com/electronics.json".into(),
                source: DealSource::Electronics,
            }],
            50,
            Duration::from_secs(20),
        )
        .unwrap();
        assert_eq!(client.sources.len(), 1);
        assert_eq!(client.max_items, 50);
    }

    #[tokio::test]
    async fn test_every_feed_down_is_feed_error() {
        // Nothing listens on this port; both endpoints fail, so the fetch
        // fails as a whole with the feed variant.
        let client = RestFeedClient::new(
            vec![
                FeedSource {
                    url: "http://127.0.0.1:9/electronics.json".into(),
                    source: DealSource::Electronics,
                },
                FeedSource {
                    url: "http://127.0.0.1:9/computers.json".into(),
                    source: DealSource::Computers,
                },
            ],
            50,
            Duration::from_millis(500),
        )
        .unwrap();

        let err = client.fetch_raw().await.unwrap_err();
        match err.downcast_ref::<DealhawkError>() {
            Some(DealhawkError::Feed { feed, .. }) => assert_eq!(feed, "all"),
            other => panic!("Expected Feed error, got {other:?}"),
        }
    }
}
