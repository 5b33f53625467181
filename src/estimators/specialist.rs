//! Specialist estimator — remote fine-tuned pricing model.
//!
//! Talks to a model-serving endpoint that hosts a model fine-tuned on
//! historical product prices. The endpoint scales to zero when idle, so
//! the first call of a cycle can hit a cold start measured in tens of
//! seconds; the HTTP timeout is configured accordingly and transient
//! server errors are retried with backoff.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::Estimator;
use crate::types::DealhawkError;

pub const AGENT_NAME: &str = "specialist";

/// Maximum retries on rate limit / server errors.
const MAX_RETRIES: u32 = 2;

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 500;

#[derive(Debug, Serialize)]
struct PriceRequest<'a> {
    description: &'a str,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    price: f64,
}

pub struct SpecialistEstimator {
    http: Client,
    endpoint: String,
}

impl SpecialistEstimator {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build specialist HTTP client")?;
        Ok(Self { http, endpoint })
    }

    async fn call_endpoint(&self, description: &str) -> Result<f64> {
        let request = PriceRequest { description };
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, "Retrying specialist call");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let resp = self.http.post(&self.endpoint).json(&request).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: PriceResponse = response
                            .json()
                            .await
                            .context("Failed to parse specialist response")?;
                        if body.price < 0.0 || !body.price.is_finite() {
                            anyhow::bail!("Specialist returned invalid price {}", body.price);
                        }
                        return Ok(body.price);
                    }

                    // Retryable: 429 (rate limit), 5xx (cold start, overload)
                    if status.as_u16() == 429 || status.as_u16() >= 500 {
                        let error_text = response.text().await.unwrap_or_default();
                        warn!(status = %status, attempt, error = %error_text, "Retryable specialist error");
                        last_error = Some(format!("HTTP {status}: {error_text}"));
                        continue;
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    anyhow::bail!("Specialist endpoint error {status}: {error_text}");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Specialist request failed");
                    last_error = Some(format!("Request error: {e}"));
                    continue;
                }
            }
        }

        Err(DealhawkError::Estimator {
            agent: AGENT_NAME.to_string(),
            message: format!(
                "endpoint failed after {MAX_RETRIES} retries: {}",
                last_error.unwrap_or_default()
            ),
        }
        .into())
    }
}

#[async_trait]
impl Estimator for SpecialistEstimator {
    fn name(&self) -> &str {
        AGENT_NAME
    }

    async fn estimate(&self, description: &str) -> Result<f64> {
        let price = self.call_endpoint(description).await?;
        debug!(price = format!("${price:.2}"), "Specialist estimate complete");
        Ok(price)
    }
}
