//! Opportunity evaluation: fan a deal out to every estimator, combine the
//! surviving opinions through the ensemble model, and report the result.
//!
//! Each estimator call runs concurrently under its own timeout; a slow or
//! failing backend costs its timeout at worst and never poisons the others.
//! An outer deadline bounds the whole fan-out for one deal.

use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::ensemble::EnsembleModel;
use crate::estimators::Estimator;
use crate::types::{ComponentEstimate, Deal, DealhawkError, Opportunity};

pub struct Evaluator {
    estimators: Vec<Arc<dyn Estimator>>,
    model: Arc<EnsembleModel>,
    adapter_timeout: Duration,
    deadline: Duration,
}

impl Evaluator {
    pub fn new(
        estimators: Vec<Arc<dyn Estimator>>,
        model: Arc<EnsembleModel>,
        adapter_timeout: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            estimators,
            model,
            adapter_timeout,
            deadline,
        }
    }

    /// Evaluate one deal. Fails with `QuorumNotMet` when too few estimators
    /// produced a price within their timeout.
    pub async fn evaluate(&self, deal: &Deal) -> Result<Opportunity, DealhawkError> {
        let components = match timeout(self.deadline, self.fan_out(deal)).await {
            Ok(components) => components,
            Err(_) => {
                warn!(deal = %deal.url, "Evaluation deadline exceeded");
                return Err(DealhawkError::QuorumNotMet {
                    got: 0,
                    need: self.model.min_components(),
                });
            }
        };

        for component in &components {
            debug!(deal = %deal.url, "{component}");
        }

        let combined = self.model.combine(&components)?;
        debug!(deal = %deal.url, estimate = %combined, "Combined estimate");
        Ok(Opportunity::new(deal.clone(), combined))
    }

    /// Run every estimator concurrently, each under the adapter timeout.
    /// Failures and timeouts come back as `price: None` components.
    async fn fan_out(&self, deal: &Deal) -> Vec<ComponentEstimate> {
        let calls = self.estimators.iter().map(|estimator| {
            let estimator = Arc::clone(estimator);
            let description = deal.description.clone();
            let adapter_timeout = self.adapter_timeout;
            async move {
                let start = Instant::now();
                let price = match timeout(adapter_timeout, estimator.estimate(&description)).await
                {
                    Ok(Ok(price)) => Some(price),
                    Ok(Err(e)) => {
                        warn!(agent = estimator.name(), error = %e, "Estimator failed");
                        None
                    }
                    Err(_) => {
                        warn!(
                            agent = estimator.name(),
                            timeout_ms = adapter_timeout.as_millis() as u64,
                            "Estimator timed out"
                        );
                        None
                    }
                };
                ComponentEstimate {
                    agent: estimator.name().to_string(),
                    price,
                    latency: start.elapsed(),
                }
            }
        });
        join_all(calls).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    struct FixedEstimator {
        name: &'static str,
        price: f64,
        delay: Duration,
    }

    #[async_trait]
    impl Estimator for FixedEstimator {
        fn name(&self) -> &str {
            self.name
        }

        async fn estimate(&self, _description: &str) -> Result<f64> {
            tokio::time::sleep(self.delay).await;
            Ok(self.price)
        }
    }

    fn failing(name: &'static str) -> Arc<dyn Estimator> {
        let mut mock = crate::estimators::MockEstimator::new();
        mock.expect_name().return_const(name.to_string());
        mock.expect_estimate()
            .returning(|_| Err(anyhow::anyhow!("backend unavailable")));
        Arc::new(mock)
    }

    fn fixed(name: &'static str, price: f64, delay_ms: u64) -> Arc<dyn Estimator> {
        Arc::new(FixedEstimator {
            name,
            price,
            delay: Duration::from_millis(delay_ms),
        })
    }

    fn mean_model() -> Arc<EnsembleModel> {
        Arc::new(EnsembleModel::for_test(
            vec!["specialist", "frontier", "regressor"],
            vec![1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
            0.0,
            0.0,
            0.0,
            2,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluate_all_succeed() {
        let evaluator = Evaluator::new(
            vec![
                fixed("specialist", 60.0, 10),
                fixed("frontier", 55.0, 20),
                fixed("regressor", 58.0, 1),
            ],
            mean_model(),
            Duration::from_millis(500),
            Duration::from_millis(2000),
        );

        let opp = evaluator.evaluate(&Deal::sample()).await.unwrap();
        let expected = (60.0 + 55.0 + 58.0) / 3.0;
        assert!((opp.combined_estimate.price - expected).abs() < 1e-10);
        assert_eq!(opp.combined_estimate.components.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluate_tolerates_one_timeout() {
        let evaluator = Evaluator::new(
            vec![
                fixed("specialist", 100.0, 10),
                // Sleeps well past the adapter timeout.
                fixed("frontier", 999.0, 10_000),
                fixed("regressor", 200.0, 10),
            ],
            mean_model(),
            Duration::from_millis(500),
            Duration::from_millis(5000),
        );

        let opp = evaluator.evaluate(&Deal::sample()).await.unwrap();
        // Frontier never answered: mean imputation over (100, 200).
        assert!((opp.combined_estimate.price - 150.0).abs() < 1e-10);
        assert_eq!(opp.combined_estimate.components.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluate_quorum_not_met() {
        let evaluator = Evaluator::new(
            vec![
                fixed("specialist", 100.0, 10),
                failing("frontier"),
                failing("regressor"),
            ],
            mean_model(),
            Duration::from_millis(500),
            Duration::from_millis(2000),
        );

        match evaluator.evaluate(&Deal::sample()).await {
            Err(DealhawkError::QuorumNotMet { got, need }) => {
                assert_eq!(got, 1);
                assert_eq!(need, 2);
            }
            other => panic!("Expected QuorumNotMet, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluate_deadline_exceeded() {
        let evaluator = Evaluator::new(
            vec![
                fixed("specialist", 100.0, 10_000),
                fixed("frontier", 100.0, 10_000),
            ],
            mean_model(),
            // Adapter timeout alone would let these finish; the outer
            // deadline fires first.
            Duration::from_millis(60_000),
            Duration::from_millis(100),
        );

        match evaluator.evaluate(&Deal::sample()).await {
            Err(DealhawkError::QuorumNotMet { got, .. }) => assert_eq!(got, 0),
            other => panic!("Expected QuorumNotMet, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluate_runs_adapters_concurrently() {
        // Three adapters at 400ms each under a 600ms deadline only fit if
        // they run in parallel.
        let evaluator = Evaluator::new(
            vec![
                fixed("specialist", 60.0, 400),
                fixed("frontier", 55.0, 400),
                fixed("regressor", 58.0, 400),
            ],
            mean_model(),
            Duration::from_millis(500),
            Duration::from_millis(600),
        );

        let opp = evaluator.evaluate(&Deal::sample()).await.unwrap();
        assert_eq!(opp.combined_estimate.components.len(), 3);
    }
}
