//! Cycle orchestration.
//!
//! One cycle runs collect → evaluate → select → act. Evaluation fans out
//! across deals with bounded concurrency; a deal that fails evaluation is
//! logged and dropped without affecting the others. When the best
//! opportunity clears the discount threshold it is written to memory first
//! and notified second, so a crash between the two steps can only lose an
//! alert, never duplicate one.

use anyhow::{Context, Result};
use chrono::Utc;
use futures::{stream, StreamExt};
use tracing::{debug, info, warn};

use crate::collector::Collector;
use crate::evaluator::Evaluator;
use crate::memory::DealMemory;
use crate::notifier::Notifier;
use crate::types::{CycleOutcome, CycleReport, Opportunity};

pub struct Planner {
    collector: Collector,
    evaluator: Evaluator,
    memory: DealMemory,
    /// Absent when alerts are disabled in config.
    notifier: Option<Notifier>,
    discount_threshold: f64,
    /// Deals evaluated concurrently per cycle.
    workers: usize,
    cycle_number: u64,
}

impl Planner {
    pub fn new(
        collector: Collector,
        evaluator: Evaluator,
        memory: DealMemory,
        notifier: Option<Notifier>,
        discount_threshold: f64,
        workers: usize,
    ) -> Self {
        Self {
            collector,
            evaluator,
            memory,
            notifier,
            discount_threshold,
            workers,
            cycle_number: 0,
        }
    }

    pub fn memory(&self) -> &DealMemory {
        &self.memory
    }

    /// Run one full cycle. Errors out only on failures that make continuing
    /// unsafe (feed totally down, memory not writable); everything per-deal
    /// degrades to a smaller cycle instead.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.cycle_number += 1;
        let cycle_number = self.cycle_number;
        info!(cycle = cycle_number, "Cycle starting");

        // Feed and classifier outages are transient: the cycle degrades to
        // "nothing new" rather than failing, and the next tick retries.
        let collected = match self.collector.collect(self.memory.seen_urls()).await {
            Ok(collected) => collected,
            Err(e) => {
                warn!(cycle = cycle_number, error = %e, "Collection failed, no candidates this cycle");
                return Ok(self.report(0, 0, 0, None, CycleOutcome::NoCandidates));
            }
        };
        let shortlisted = collected.deals.len();

        // The shortlister only sees unseen listings, but ids are checked
        // again here so a rewritten URL variant cannot sneak a repeat through.
        let deals: Vec<_> = collected
            .deals
            .into_iter()
            .filter(|deal| !self.memory.contains_id(&deal.id))
            .collect();

        if deals.is_empty() {
            info!(cycle = cycle_number, "No candidates to evaluate");
            return Ok(self.report(
                collected.raw_listings,
                shortlisted,
                0,
                None,
                CycleOutcome::NoCandidates,
            ));
        }

        let opportunities = self.evaluate_all(deals).await;
        let evaluated = opportunities.len();

        let Some(best) = opportunities.into_iter().max_by(|a, b| {
            a.discount()
                .partial_cmp(&b.discount())
                .unwrap_or(std::cmp::Ordering::Equal)
        }) else {
            info!(cycle = cycle_number, "No deal survived evaluation");
            return Ok(self.report(
                collected.raw_listings,
                shortlisted,
                0,
                None,
                CycleOutcome::NoCandidates,
            ));
        };

        let discount = best.discount();
        info!(cycle = cycle_number, best = %best, "Best opportunity selected");

        // Strictly exceeds: a discount exactly at the threshold stays quiet.
        if discount <= self.discount_threshold {
            info!(
                cycle = cycle_number,
                discount = format!("${discount:.2}"),
                threshold = format!("${:.2}", self.discount_threshold),
                "Below threshold, no action"
            );
            return Ok(self.report(
                collected.raw_listings,
                shortlisted,
                evaluated,
                Some(discount),
                CycleOutcome::BelowThreshold,
            ));
        }

        // Persist first. If this fails the cycle fails, and no alert is sent
        // for an opportunity the memory does not know about.
        self.memory
            .append(&best)
            .context("Failed to persist opportunity")?;

        let outcome = match &self.notifier {
            Some(notifier) => match notifier.notify(&best).await {
                Ok(()) => CycleOutcome::Notified,
                Err(e) => {
                    warn!(cycle = cycle_number, error = %e, "Opportunity persisted but alert failed");
                    CycleOutcome::NotifyFailed
                }
            },
            None => {
                info!(cycle = cycle_number, "Alerts disabled, opportunity recorded only");
                CycleOutcome::Notified
            }
        };

        let report = self.report(
            collected.raw_listings,
            shortlisted,
            evaluated,
            Some(discount),
            outcome,
        );
        info!(cycle = cycle_number, "{report}");
        Ok(report)
    }

    /// Evaluate deals with bounded concurrency. Quorum failures and other
    /// per-deal errors are dropped here.
    async fn evaluate_all(&self, deals: Vec<crate::types::Deal>) -> Vec<Opportunity> {
        let evaluator = &self.evaluator;
        stream::iter(deals)
            .map(|deal| async move {
                match evaluator.evaluate(&deal).await {
                    Ok(opportunity) => Some(opportunity),
                    Err(e) => {
                        debug!(deal = %deal.url, error = %e, "Deal dropped during evaluation");
                        None
                    }
                }
            })
            .buffer_unordered(self.workers)
            .filter_map(|result| async move { result })
            .collect()
            .await
    }

    fn report(
        &self,
        raw_listings: usize,
        shortlisted: usize,
        evaluated: usize,
        best_discount: Option<f64>,
        outcome: CycleOutcome,
    ) -> CycleReport {
        CycleReport {
            cycle_number: self.cycle_number,
            timestamp: Utc::now(),
            raw_listings,
            shortlisted,
            evaluated,
            best_discount,
            outcome,
        }
    }
}
