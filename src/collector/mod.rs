//! Candidate collection: fetch raw listings, drop already-seen ones, and
//! shortlist the remainder into structured deals.
//!
//! Dedup happens on the raw listings, before the shortlister is invoked,
//! so listings we have already acted on never cost a model call.

pub mod shortlist;

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::feeds::DealFeed;
use crate::types::Deal;
use shortlist::Shortlister;

/// Outcome of one collection pass.
#[derive(Debug)]
pub struct Collected {
    /// Raw listings fetched, before dedup and shortlisting.
    pub raw_listings: usize,
    pub deals: Vec<Deal>,
}

pub struct Collector {
    feed: Arc<dyn DealFeed>,
    shortlister: Arc<dyn Shortlister>,
    shortlist_size: usize,
}

impl Collector {
    pub fn new(
        feed: Arc<dyn DealFeed>,
        shortlister: Arc<dyn Shortlister>,
        shortlist_size: usize,
    ) -> Self {
        Self {
            feed,
            shortlister,
            shortlist_size,
        }
    }

    /// Fetch, dedup against `seen_urls`, and shortlist.
    pub async fn collect(&self, seen_urls: &HashSet<String>) -> Result<Collected> {
        let raw = self.feed.fetch_raw().await?;
        let raw_count = raw.len();

        let unseen: Vec<_> = raw
            .into_iter()
            .filter(|listing| !seen_urls.contains(&listing.url))
            .collect();
        debug!(
            raw = raw_count,
            unseen = unseen.len(),
            "Dedup against memory complete"
        );

        if unseen.is_empty() {
            info!(raw = raw_count, "No unseen listings this cycle");
            return Ok(Collected {
                raw_listings: raw_count,
                deals: Vec::new(),
            });
        }

        let deals = self
            .shortlister
            .shortlist(&unseen, self.shortlist_size)
            .await?;

        info!(
            raw = raw_count,
            unseen = unseen.len(),
            shortlisted = deals.len(),
            "Collection complete"
        );
        Ok(Collected {
            raw_listings: raw_count,
            deals,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DealSource, RawListing};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedFeed {
        listings: Vec<RawListing>,
    }

    #[async_trait]
    impl DealFeed for CannedFeed {
        async fn fetch_raw(&self) -> Result<Vec<RawListing>> {
            Ok(self.listings.clone())
        }
    }

    /// Turns every listing it receives into a deal, counting invocations.
    struct PassthroughShortlister {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Shortlister for PassthroughShortlister {
        async fn shortlist(&self, listings: &[RawListing], max: usize) -> Result<Vec<Deal>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            listings
                .iter()
                .take(max)
                .map(|l| Deal::new(l.summary.clone(), 100.0, l.url.clone(), l.source))
                .collect()
        }
    }

    fn listing(url: &str) -> RawListing {
        RawListing {
            title: "A deal".into(),
            summary: "Something priced attractively".into(),
            url: url.into(),
            source: DealSource::Electronics,
        }
    }

    #[tokio::test]
    async fn test_collect_filters_seen_urls() {
        let feed = Arc::new(CannedFeed {
            listings: vec![listing("https://x.example/a"), listing("https://x.example/b")],
        });
        let shortlister = Arc::new(PassthroughShortlister {
            calls: AtomicUsize::new(0),
        });
        let collector = Collector::new(feed, shortlister.clone(), 10);

        let seen = HashSet::from(["https://x.example/a".to_string()]);
        let collected = collector.collect(&seen).await.unwrap();

        assert_eq!(collected.raw_listings, 2);
        assert_eq!(collected.deals.len(), 1);
        assert_eq!(collected.deals[0].url, "https://x.example/b");
    }

    #[tokio::test]
    async fn test_collect_all_seen_skips_shortlister() {
        let feed = Arc::new(CannedFeed {
            listings: vec![listing("https://x.example/a")],
        });
        let shortlister = Arc::new(PassthroughShortlister {
            calls: AtomicUsize::new(0),
        });
        let collector = Collector::new(feed, shortlister.clone(), 10);

        let seen = HashSet::from(["https://x.example/a".to_string()]);
        let collected = collector.collect(&seen).await.unwrap();

        assert_eq!(collected.raw_listings, 1);
        assert!(collected.deals.is_empty());
        // Nothing unseen means no model call at all.
        assert_eq!(shortlister.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_collect_caps_shortlist() {
        let feed = Arc::new(CannedFeed {
            listings: (0..8).map(|i| listing(&format!("https://x.example/{i}"))).collect(),
        });
        let shortlister = Arc::new(PassthroughShortlister {
            calls: AtomicUsize::new(0),
        });
        let collector = Collector::new(feed, shortlister, 3);

        let collected = collector.collect(&HashSet::new()).await.unwrap();
        assert_eq!(collected.raw_listings, 8);
        assert_eq!(collected.deals.len(), 3);
    }
}
