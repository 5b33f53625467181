//! Ensemble combiner — pretrained linear meta-model over component prices.
//!
//! The artifact is versioned and produced offline by the training pipeline;
//! this module only loads and applies it. Inference is pure f64 arithmetic
//! in a fixed feature order, so the same component prices always produce
//! the same combined price.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::types::{CombinedEstimate, ComponentEstimate, DealhawkError};

/// On-disk meta-model artifact.
///
/// `agents` fixes the feature order; `weights` must match it one-to-one.
/// Two extra features, the min and max of the present component prices,
/// carry their own weights.
#[derive(Debug, Deserialize)]
struct EnsembleArtifact {
    version: String,
    agents: Vec<String>,
    weights: Vec<f64>,
    min_weight: f64,
    max_weight: f64,
    intercept: f64,
}

/// Loaded, read-only meta-model. Shared across concurrent evaluations.
pub struct EnsembleModel {
    version: String,
    agents: Vec<String>,
    weights: Vec<f64>,
    min_weight: f64,
    max_weight: f64,
    intercept: f64,
    /// Successful component estimates required before combining.
    min_components: usize,
}

impl EnsembleModel {
    /// Load the artifact. Called once at startup; a missing or malformed
    /// artifact is fatal (the agent must not run without its meta-model).
    pub fn load(path: impl AsRef<Path>, min_components: usize) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ensemble model: {}", path.display()))?;
        let artifact: EnsembleArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse ensemble model: {}", path.display()))?;
        Self::from_artifact(artifact, min_components)
    }

    fn from_artifact(artifact: EnsembleArtifact, min_components: usize) -> Result<Self> {
        if artifact.agents.is_empty() {
            anyhow::bail!("Ensemble model has no component agents");
        }
        if artifact.agents.len() != artifact.weights.len() {
            anyhow::bail!(
                "Ensemble model weight count ({}) does not match agent count ({})",
                artifact.weights.len(),
                artifact.agents.len()
            );
        }
        if min_components == 0 || min_components > artifact.agents.len() {
            anyhow::bail!(
                "min_components ({min_components}) out of range for {} agents",
                artifact.agents.len()
            );
        }

        info!(
            version = %artifact.version,
            agents = ?artifact.agents,
            min_components,
            "Ensemble model loaded"
        );

        Ok(Self {
            version: artifact.version,
            agents: artifact.agents,
            weights: artifact.weights,
            min_weight: artifact.min_weight,
            max_weight: artifact.max_weight,
            intercept: artifact.intercept,
            min_components,
        })
    }

    /// Build a model directly (tests).
    #[cfg(test)]
    pub fn for_test(
        agents: Vec<&str>,
        weights: Vec<f64>,
        min_weight: f64,
        max_weight: f64,
        intercept: f64,
        min_components: usize,
    ) -> Self {
        Self {
            version: "test".into(),
            agents: agents.into_iter().map(String::from).collect(),
            weights,
            min_weight,
            max_weight,
            intercept,
            min_components,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Agent names in feature order.
    pub fn agents(&self) -> &[String] {
        &self.agents
    }

    pub fn min_components(&self) -> usize {
        self.min_components
    }

    /// Combine component estimates into one calibrated price.
    ///
    /// Fails with `QuorumNotMet` when fewer than `min_components` components
    /// succeeded. Prices for agents that failed (or are unknown to the
    /// model) are imputed with the mean of the present ones, so the trained
    /// weights always see a full feature vector.
    pub fn combine(
        &self,
        components: &[ComponentEstimate],
    ) -> Result<CombinedEstimate, DealhawkError> {
        // Present prices in model feature order.
        let mut present: Vec<(String, f64)> = Vec::new();
        for agent in &self.agents {
            if let Some(est) = components.iter().find(|c| &c.agent == agent) {
                if let Some(price) = est.price {
                    present.push((agent.clone(), price));
                }
            }
        }

        if present.len() < self.min_components {
            return Err(DealhawkError::QuorumNotMet {
                got: present.len(),
                need: self.min_components,
            });
        }

        for (agent, price) in &present {
            if *price < 0.0 || !price.is_finite() {
                return Err(DealhawkError::Ensemble(format!(
                    "Component {agent} produced invalid price {price}"
                )));
            }
        }

        let mean: f64 =
            present.iter().map(|(_, p)| p).sum::<f64>() / present.len() as f64;
        let min = present
            .iter()
            .map(|(_, p)| *p)
            .fold(f64::INFINITY, f64::min);
        let max = present
            .iter()
            .map(|(_, p)| *p)
            .fold(f64::NEG_INFINITY, f64::max);

        let mut price = self.intercept + self.min_weight * min + self.max_weight * max;
        for (agent, weight) in self.agents.iter().zip(&self.weights) {
            let feature = present
                .iter()
                .find(|(a, _)| a == agent)
                .map(|(_, p)| *p)
                .unwrap_or(mean);
            price += weight * feature;
        }

        Ok(CombinedEstimate {
            price: price.max(0.0),
            components: present,
            min,
            max,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
