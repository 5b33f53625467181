//! Regressor estimator — local linear model over hashed text features.
//!
//! Loads a small pretrained artifact (weights, bias, target scaling) and
//! scores descriptions entirely in process. No network, no latency worth
//! measuring, and fully deterministic: the same description always yields
//! the same price. The model predicts in standardised log-price space and
//! the output is mapped back to dollars.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

use super::Estimator;
use crate::index::hash_vectorize;

pub const AGENT_NAME: &str = "regressor";

/// On-disk regressor artifact. `weights` length must equal `dims`.
#[derive(Debug, Deserialize)]
struct RegressorArtifact {
    version: String,
    dims: usize,
    weights: Vec<f64>,
    bias: f64,
    /// Mean and std of ln(price) over the training set, used to
    /// de-standardise predictions.
    y_mean: f64,
    y_std: f64,
}

pub struct RegressorEstimator {
    version: String,
    dims: usize,
    weights: Vec<f64>,
    bias: f64,
    y_mean: f64,
    y_std: f64,
}

impl RegressorEstimator {
    /// Load the artifact. A missing or inconsistent artifact is fatal at
    /// startup, same as the ensemble model.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read regressor model: {}", path.display()))?;
        let artifact: RegressorArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse regressor model: {}", path.display()))?;
        Self::from_artifact(artifact)
    }

    fn from_artifact(artifact: RegressorArtifact) -> Result<Self> {
        if artifact.dims == 0 {
            anyhow::bail!("Regressor model declares zero dimensions");
        }
        if artifact.weights.len() != artifact.dims {
            anyhow::bail!(
                "Regressor weight count ({}) does not match dims ({})",
                artifact.weights.len(),
                artifact.dims
            );
        }
        if artifact.y_std <= 0.0 || !artifact.y_std.is_finite() {
            anyhow::bail!("Regressor y_std must be positive, got {}", artifact.y_std);
        }

        info!(
            version = %artifact.version,
            dims = artifact.dims,
            "Regressor model loaded"
        );

        Ok(Self {
            version: artifact.version,
            dims: artifact.dims,
            weights: artifact.weights,
            bias: artifact.bias,
            y_mean: artifact.y_mean,
            y_std: artifact.y_std,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    fn predict(&self, description: &str) -> f64 {
        let features = hash_vectorize(description, self.dims);
        let z: f64 = features
            .iter()
            .zip(&self.weights)
            .map(|(x, w)| x * w)
            .sum::<f64>()
            + self.bias;
        // De-standardise out of log-price space.
        let price = (z * self.y_std + self.y_mean).exp();
        if price.is_finite() {
            price.max(0.0)
        } else {
            0.0
        }
    }
}

#[async_trait]
impl Estimator for RegressorEstimator {
    fn name(&self) -> &str {
        AGENT_NAME
    }

    async fn estimate(&self, description: &str) -> Result<f64> {
        let price = self.predict(description);
        debug!(price = format!("${price:.2}"), "Regressor estimate complete");
        Ok(price)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Zero weights, so every prediction collapses to exp(y_mean).
    fn flat_model() -> RegressorEstimator {
        RegressorEstimator::from_artifact(RegressorArtifact {
            version: "test".into(),
            dims: 64,
            weights: vec![0.0; 64],
            bias: 0.0,
            y_mean: 100.0_f64.ln(),
            y_std: 1.0,
        })
        .unwrap()
    }

    #[test]
    fn test_flat_model_predicts_geometric_mean() {
        let model = flat_model();
        let price = model.predict("55 inch smart TV");
        assert!((price - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_predict_deterministic() {
        let model = RegressorEstimator::from_artifact(RegressorArtifact {
            version: "test".into(),
            dims: 64,
            weights: (0..64).map(|i| (i as f64) * 0.01 - 0.3).collect(),
            bias: 0.1,
            y_mean: 4.5,
            y_std: 1.2,
        })
        .unwrap();
        let a = model.predict("gaming laptop with RTX graphics");
        let b = model.predict("gaming laptop with RTX graphics");
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn test_predict_never_negative() {
        let model = RegressorEstimator::from_artifact(RegressorArtifact {
            version: "test".into(),
            dims: 16,
            weights: vec![-50.0; 16],
            bias: -50.0,
            y_mean: 0.0,
            y_std: 10.0,
        })
        .unwrap();
        // exp of a huge negative number underflows toward zero, never below.
        assert!(model.predict("cheap widget thing") >= 0.0);
    }

    #[test]
    fn test_artifact_dims_mismatch_rejected() {
        let artifact = RegressorArtifact {
            version: "bad".into(),
            dims: 8,
            weights: vec![0.0; 4],
            bias: 0.0,
            y_mean: 0.0,
            y_std: 1.0,
        };
        assert!(RegressorEstimator::from_artifact(artifact).is_err());
    }

    #[test]
    fn test_artifact_bad_y_std_rejected() {
        let artifact = RegressorArtifact {
            version: "bad".into(),
            dims: 4,
            weights: vec![0.0; 4],
            bias: 0.0,
            y_mean: 0.0,
            y_std: 0.0,
        };
        assert!(RegressorEstimator::from_artifact(artifact).is_err());
    }

    #[test]
    fn test_load_missing_artifact_fails() {
        assert!(RegressorEstimator::load("/tmp/dealhawk_missing_regressor.json").is_err());
    }

    #[tokio::test]
    async fn test_estimate_via_trait() {
        let model = flat_model();
        let price = model.estimate("anything at all").await.unwrap();
        assert!((price - 100.0).abs() < 1e-6);
        assert_eq!(model.name(), "regressor");
    }
}
