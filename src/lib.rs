//! DEALHAWK — autonomous deal-discovery and price-estimation agent.
//!
//! On a fixed cadence the agent pulls raw listings from deal feeds,
//! shortlists the promising ones with an LLM, prices each shortlisted deal
//! with an ensemble of estimators, and raises a push alert when the best
//! deal's discount against its estimated fair value clears a configured
//! threshold. Acted-upon deals are remembered on disk so the same listing
//! is never alerted twice.

pub mod collector;
pub mod config;
pub mod ensemble;
pub mod estimators;
pub mod evaluator;
pub mod feeds;
pub mod index;
pub mod memory;
pub mod notifier;
pub mod planner;
pub mod types;

pub use config::AppConfig;
pub use planner::Planner;
pub use types::{CycleOutcome, CycleReport, Deal, DealhawkError, Opportunity};
