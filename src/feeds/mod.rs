//! Deal feed abstraction.
//!
//! A feed yields raw listings for one source category. The production
//! implementation is a JSON REST client (`rest`); the collector talks to
//! the trait so tests can substitute canned feeds.

pub mod rest;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::RawListing;

/// Source of raw deal listings.
#[async_trait]
pub trait DealFeed: Send + Sync {
    /// Fetch the current batch of raw listings across all configured
    /// sources. Individual source failures are tolerated; an error means
    /// nothing at all could be fetched.
    async fn fetch_raw(&self) -> Result<Vec<RawListing>>;
}
