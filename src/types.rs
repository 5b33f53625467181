//! Shared types for the DEALHAWK agent.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that feed, estimator, and planner
//! modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Descriptions longer than this are truncated at construction time.
/// Keeps prompts and notification payloads bounded.
pub const MAX_DESCRIPTION_CHARS: usize = 2000;

// ---------------------------------------------------------------------------
// Raw listings
// ---------------------------------------------------------------------------

/// A raw listing as it arrives from a deal feed, before classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawListing {
    pub title: String,
    pub summary: String,
    pub url: String,
    /// Category of the feed that produced this listing.
    pub source: DealSource,
}

impl fmt::Display for RawListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> {}", self.title, self.url)
    }
}

impl RawListing {
    /// Text handed to the classifier for this listing.
    pub fn describe(&self) -> String {
        format!("Title: {}\nSummary: {}\nURL: {}", self.title, self.summary, self.url)
    }
}

/// Which feed category a deal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DealSource {
    Electronics,
    Computers,
    Automotive,
    SmartHome,
    HomeGarden,
    Other,
}

impl DealSource {
    /// All known sources (useful for iteration).
    pub const ALL: &'static [DealSource] = &[
        DealSource::Electronics,
        DealSource::Computers,
        DealSource::Automotive,
        DealSource::SmartHome,
        DealSource::HomeGarden,
        DealSource::Other,
    ];
}

impl fmt::Display for DealSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DealSource::Electronics => write!(f, "Electronics"),
            DealSource::Computers => write!(f, "Computers"),
            DealSource::Automotive => write!(f, "Automotive"),
            DealSource::SmartHome => write!(f, "Smart Home"),
            DealSource::HomeGarden => write!(f, "Home & Garden"),
            DealSource::Other => write!(f, "Other"),
        }
    }
}

/// Attempt to parse a string into a DealSource (case-insensitive).
impl std::str::FromStr for DealSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace([' ', '-', '&'], "").as_str() {
            "electronics" => Ok(DealSource::Electronics),
            "computers" | "computer" => Ok(DealSource::Computers),
            "automotive" | "auto" => Ok(DealSource::Automotive),
            "smarthome" => Ok(DealSource::SmartHome),
            "homegarden" | "homeandgarden" => Ok(DealSource::HomeGarden),
            "other" => Ok(DealSource::Other),
            _ => Err(anyhow::anyhow!("Unknown deal source: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Deal
// ---------------------------------------------------------------------------

/// An immutable candidate listing selected by the classifier.
///
/// `id` is derived from the URL (UUIDv5), so the same listing always maps
/// to the same identifier across cycles and restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub description: String,
    /// Advertised price in USD. Never negative.
    pub listed_price: f64,
    pub url: String,
    pub source: DealSource,
    pub discovered_at: DateTime<Utc>,
}

impl Deal {
    /// Construct a deal, deriving the stable id from the URL, truncating
    /// over-long descriptions, and rejecting negative prices.
    pub fn new(
        description: impl Into<String>,
        listed_price: f64,
        url: impl Into<String>,
        source: DealSource,
    ) -> anyhow::Result<Self> {
        if listed_price < 0.0 || !listed_price.is_finite() {
            anyhow::bail!("Invalid listed price: {listed_price}");
        }
        let url = url.into();
        let mut description = description.into();
        if description.chars().count() > MAX_DESCRIPTION_CHARS {
            description = description.chars().take(MAX_DESCRIPTION_CHARS).collect();
        }
        Ok(Self {
            id: Self::id_for_url(&url),
            description,
            listed_price,
            url,
            source,
            discovered_at: Utc::now(),
        })
    }

    /// Stable identifier for a listing URL.
    pub fn id_for_url(url: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, url.as_bytes())
    }

    /// Helper to build a test deal with sensible defaults.
    #[cfg(test)]
    pub fn sample() -> Self {
        Deal::new(
            "A 55-inch 4K smart TV with HDR10 and three HDMI ports.",
            178.0,
            "https://deals.example.com/tv-55-4k",
            DealSource::Electronics,
        )
        .unwrap()
    }
}

impl fmt::Display for Deal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short: String = self.description.chars().take(60).collect();
        write!(f, "[{}] ${:.2} {} ({})", self.source, self.listed_price, short, self.url)
    }
}

// ---------------------------------------------------------------------------
// Estimates
// ---------------------------------------------------------------------------

/// One backend's opinion about a deal's fair value.
///
/// `price: None` means the backend failed or timed out. Scoped to a single
/// evaluation; only the combined result is persisted.
#[derive(Debug, Clone)]
pub struct ComponentEstimate {
    pub agent: String,
    pub price: Option<f64>,
    pub latency: Duration,
}

impl ComponentEstimate {
    pub fn succeeded(&self) -> bool {
        self.price.is_some()
    }
}

impl fmt::Display for ComponentEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.price {
            Some(p) => write!(f, "{}: ${:.2} ({}ms)", self.agent, p, self.latency.as_millis()),
            None => write!(f, "{}: failed ({}ms)", self.agent, self.latency.as_millis()),
        }
    }
}

/// Output of the ensemble combiner.
///
/// `components` keeps the per-agent prices that fed the meta-model, in a
/// stable order, for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedEstimate {
    /// Calibrated price. Never negative.
    pub price: f64,
    /// Ordered (agent, price) pairs that contributed.
    pub components: Vec<(String, f64)>,
    pub min: f64,
    pub max: f64,
}

impl fmt::Display for CombinedEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .components
            .iter()
            .map(|(a, p)| format!("{a}=${p:.2}"))
            .collect();
        write!(f, "${:.2} [{}]", self.price, parts.join(" "))
    }
}

// ---------------------------------------------------------------------------
// Opportunity
// ---------------------------------------------------------------------------

/// A deal paired with its evaluation outcome.
///
/// The discount is always recomputed from its two inputs rather than stored,
/// so the three values can never drift apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub deal: Deal,
    pub combined_estimate: CombinedEstimate,
    pub evaluated_at: DateTime<Utc>,
}

impl Opportunity {
    pub fn new(deal: Deal, combined_estimate: CombinedEstimate) -> Self {
        Self {
            deal,
            combined_estimate,
            evaluated_at: Utc::now(),
        }
    }

    /// Estimated fair value minus advertised price. Positive = bargain.
    pub fn discount(&self) -> f64 {
        self.combined_estimate.price - self.deal.listed_price
    }
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "listed=${:.2} est=${:.2} discount=${:.2} {}",
            self.deal.listed_price,
            self.combined_estimate.price,
            self.discount(),
            self.deal.url,
        )
    }
}

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleOutcome {
    /// Nothing new from the feeds or classifier.
    NoCandidates,
    /// Opportunities were found but none cleared the discount threshold.
    BelowThreshold,
    /// The best opportunity was persisted and the alert delivered.
    Notified,
    /// The best opportunity was persisted but alert delivery failed.
    NotifyFailed,
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::NoCandidates => write!(f, "no candidates"),
            CycleOutcome::BelowThreshold => write!(f, "below threshold"),
            CycleOutcome::Notified => write!(f, "notified"),
            CycleOutcome::NotifyFailed => write!(f, "notify failed"),
        }
    }
}

/// Summary of a single collect → evaluate → notify cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_number: u64,
    pub timestamp: DateTime<Utc>,
    /// Raw listings fetched from the feeds (pre-dedup, pre-classification).
    pub raw_listings: usize,
    /// Deals that survived dedup + classification.
    pub shortlisted: usize,
    /// Deals that produced a valid opportunity (quorum met).
    pub evaluated: usize,
    /// Discount of the acted-upon opportunity, if one was selected.
    pub best_discount: Option<f64>,
    pub outcome: CycleOutcome,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cycle #{}: raw={} shortlisted={} evaluated={} best={} → {}",
            self.cycle_number,
            self.raw_listings,
            self.shortlisted,
            self.evaluated,
            self.best_discount
                .map(|d| format!("${d:.2}"))
                .unwrap_or_else(|| "-".to_string()),
            self.outcome,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for DEALHAWK.
#[derive(Debug, thiserror::Error)]
pub enum DealhawkError {
    #[error("Feed error ({feed}): {message}")]
    Feed { feed: String, message: String },

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Estimator error ({agent}): {message}")]
    Estimator { agent: String, message: String },

    #[error("Quorum not met: {got} of {need} estimators succeeded")]
    QuorumNotMet { got: usize, need: usize },

    #[error("Ensemble error: {0}")]
    Ensemble(String),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
