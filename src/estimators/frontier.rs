//! Frontier estimator — retrieval-augmented LLM pricing.
//!
//! Looks up the most similar historical items in the in-process similarity
//! index, builds a prompt with their known prices as context, and asks an
//! OpenAI-compatible chat-completions endpoint for a single price. The
//! reply is expected to be just the number; parsing is tolerant of currency
//! symbols and surrounding words.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{parse_price, Estimator};
use crate::index::SimilarityIndex;
use crate::types::DealhawkError;

pub const AGENT_NAME: &str = "frontier";

const DEFAULT_MAX_TOKENS: u32 = 16;

/// Maximum retries on rate limit / server errors.
const MAX_RETRIES: u32 = 2;

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    /// Fixed seed for reproducible sampling where the provider supports it.
    seed: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

pub struct FrontierEstimator {
    http: Client,
    endpoint: String,
    model: String,
    api_key: String,
    index: Arc<SimilarityIndex>,
    top_k: usize,
}

impl FrontierEstimator {
    pub fn new(
        endpoint: String,
        model: String,
        api_key: String,
        index: Arc<SimilarityIndex>,
        top_k: usize,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build frontier HTTP client")?;
        Ok(Self {
            http,
            endpoint,
            model,
            api_key,
            index,
            top_k,
        })
    }

    fn system_prompt() -> &'static str {
        "You estimate prices of items. Reply only with the price in USD, \
         with no explanation."
    }

    /// Context block with similar items and their known prices.
    fn build_context(similars: &[(&crate::index::PricedItem, f64)]) -> String {
        let mut context = String::from(
            "For context, here are some other items that may be similar to \
             the item you need to estimate.\n\n",
        );
        for (item, _) in similars {
            context.push_str(&format!(
                "Potentially related item:\n{}\nPrice: ${:.2}\n\n",
                item.description, item.price
            ));
        }
        context
    }

    fn build_user_prompt(description: &str, context: &str) -> String {
        format!("{context}And now the question for you:\n\nHow much does this item cost?\n\n{description}")
    }

    async fn call_api(&self, user_prompt: String) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Self::system_prompt().to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt,
                },
            ],
            max_tokens: DEFAULT_MAX_TOKENS,
            seed: 42,
        };

        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, "Retrying frontier API call");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: ChatResponse = response
                            .json()
                            .await
                            .context("Failed to parse frontier response")?;
                        let text = body
                            .choices
                            .first()
                            .map(|c| c.message.content.clone())
                            .unwrap_or_default();
                        return Ok(text);
                    }

                    if status.as_u16() == 429 || status.as_u16() >= 500 {
                        let error_text = response.text().await.unwrap_or_default();
                        warn!(status = %status, attempt, error = %error_text, "Retryable frontier API error");
                        last_error = Some(format!("HTTP {status}: {error_text}"));
                        continue;
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    anyhow::bail!("Frontier API error {status}: {error_text}");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Frontier request failed");
                    last_error = Some(format!("Request error: {e}"));
                    continue;
                }
            }
        }

        Err(DealhawkError::Estimator {
            agent: AGENT_NAME.to_string(),
            message: format!(
                "API failed after {MAX_RETRIES} retries: {}",
                last_error.unwrap_or_default()
            ),
        }
        .into())
    }
}

#[async_trait]
impl Estimator for FrontierEstimator {
    fn name(&self) -> &str {
        AGENT_NAME
    }

    async fn estimate(&self, description: &str) -> Result<f64> {
        let similars = self.index.top_k(description, self.top_k);
        debug!(
            similars = similars.len(),
            "Frontier retrieval complete, calling model"
        );

        let context = Self::build_context(&similars);
        let reply = self
            .call_api(Self::build_user_prompt(description, &context))
            .await?;

        let price = parse_price(&reply)
            .with_context(|| format!("No price in frontier reply: {reply:?}"))?;
        if price < 0.0 || !price.is_finite() {
            anyhow::bail!("Frontier produced invalid price {price}");
        }

        debug!(price = format!("${price:.2}"), "Frontier estimate complete");
        Ok(price)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
