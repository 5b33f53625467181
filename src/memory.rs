//! Persistent deal memory.
//!
//! A JSON file holding one record per acted-upon opportunity, loaded whole
//! at startup and appended to as alerts go out. Writes go to a temp file
//! in the same directory followed by a rename, so a crash mid-write leaves
//! the previous file intact. The planner appends before notifying; losing
//! an alert is acceptable, alerting twice for the same listing is not.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{DealhawkError, Opportunity};

/// One acted-upon opportunity, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub opportunity_id: Uuid,
    pub url: String,
    pub description: String,
    pub listed_price: f64,
    pub estimated_price: f64,
    pub discount: f64,
    pub notified_at: DateTime<Utc>,
}

impl MemoryRecord {
    fn from_opportunity(opportunity: &Opportunity) -> Self {
        Self {
            opportunity_id: opportunity.deal.id,
            url: opportunity.deal.url.clone(),
            description: opportunity.deal.description.clone(),
            listed_price: opportunity.deal.listed_price,
            estimated_price: opportunity.combined_estimate.price,
            discount: opportunity.discount(),
            notified_at: Utc::now(),
        }
    }
}

pub struct DealMemory {
    path: PathBuf,
    records: Vec<MemoryRecord>,
    seen_urls: HashSet<String>,
    seen_ids: HashSet<Uuid>,
}

impl DealMemory {
    /// Load memory from disk. A missing file is an empty memory; a file
    /// that exists but does not parse is an error, because running with a
    /// silently emptied memory would re-alert on everything.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let records: Vec<MemoryRecord> = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read memory file: {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse memory file: {}", path.display()))?
        } else {
            debug!(path = %path.display(), "No memory file yet, starting empty");
            Vec::new()
        };

        let seen_urls = records.iter().map(|r| r.url.clone()).collect();
        let seen_ids = records.iter().map(|r| r.opportunity_id).collect();

        info!(path = %path.display(), records = records.len(), "Deal memory loaded");
        Ok(Self {
            path,
            records,
            seen_urls,
            seen_ids,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.seen_urls.contains(url)
    }

    pub fn contains_id(&self, id: &Uuid) -> bool {
        self.seen_ids.contains(id)
    }

    /// URLs of every acted-upon deal, for pre-shortlist dedup.
    pub fn seen_urls(&self) -> &HashSet<String> {
        &self.seen_urls
    }

    pub fn records(&self) -> &[MemoryRecord] {
        &self.records
    }

    /// Record an opportunity and flush to disk. The in-memory state is only
    /// updated once the file write has succeeded.
    pub fn append(&mut self, opportunity: &Opportunity) -> Result<()> {
        let record = MemoryRecord::from_opportunity(opportunity);
        let url = record.url.clone();
        let id = record.opportunity_id;
        let discount = record.discount;

        self.records.push(record);
        if let Err(e) = self.write_file() {
            self.records.pop();
            return Err(DealhawkError::Memory(format!("{e:#}")).into());
        }

        self.seen_urls.insert(url.clone());
        self.seen_ids.insert(id);
        debug!(
            url = %url,
            discount = format!("${discount:.2}"),
            "Opportunity recorded"
        );
        Ok(())
    }

    /// Serialize all records to a temp file, then rename into place.
    fn write_file(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.records)
            .context("Failed to serialize deal memory")?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write memory temp file: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace memory file: {}", self.path.display()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
