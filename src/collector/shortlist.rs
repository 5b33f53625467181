//! LLM-backed shortlister.
//!
//! Feed listings are noisy: vague titles, "up to X% off" ranges, bundles
//! with no clear price. The shortlister hands a batch of raw listings to an
//! OpenAI-compatible chat model and asks it to pick the few with a genuinely
//! detailed description and one unambiguous price, rewriting each into a
//! clean paragraph. The reply must be strict JSON; anything that does not
//! parse, lacks a price, or references a URL we never sent is dropped.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::{Deal, DealSource, DealhawkError, RawListing};

/// Maximum retries on rate limit / server errors.
const MAX_RETRIES: u32 = 2;

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 1000;

/// Selects the most promising listings and normalises them into deals.
#[async_trait]
pub trait Shortlister: Send + Sync {
    /// Pick at most `max` deals from the given listings.
    async fn shortlist(&self, listings: &[RawListing], max: usize) -> Result<Vec<Deal>>;
}

// ---------------------------------------------------------------------------
// LLM shortlister
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
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

/// Strict reply shape expected from the model.
#[derive(Debug, Deserialize)]
struct SelectionReply {
    deals: Vec<SelectedDeal>,
}

#[derive(Debug, Deserialize)]
struct SelectedDeal {
    description: String,
    price: f64,
    url: String,
}

pub struct LlmShortlister {
    http: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl LlmShortlister {
    pub fn new(endpoint: String, model: String, api_key: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .context("Failed to build shortlister HTTP client")?;
        Ok(Self {
            http,
            endpoint,
            model,
            api_key,
        })
    }

    fn system_prompt(max: usize) -> String {
        format!(
            "You identify the {max} most promising deals from a list, selecting \
             those with the most detailed, high-quality description and a clear \
             price for a single item. Respond strictly in JSON: \
             {{\"deals\": [{{\"description\": \"4-5 sentences summarising the \
             item itself, not the deal terms\", \"price\": 99.99, \"url\": \
             \"the exact url given\"}}]}}. The price must be the actual price \
             of one item, never a percentage or amount off. Skip any listing \
             whose price you are not certain of."
        )
    }

    fn build_user_prompt(listings: &[RawListing]) -> String {
        let mut prompt = String::from("Here are the listings:\n\n");
        for listing in listings {
            prompt.push_str(&listing.describe());
            prompt.push_str("\n\n");
        }
        prompt
    }

    /// Parse the model reply into deals, mapping each back to the source of
    /// the listing it came from. Entries with unknown URLs or non-positive
    /// prices are dropped rather than failing the batch.
    fn parse_reply(reply: &str, sources: &HashMap<&str, DealSource>, max: usize) -> Vec<Deal> {
        let cleaned = reply
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();

        let selection: SelectionReply = match serde_json::from_str(cleaned) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Shortlist reply was not valid JSON, dropping batch");
                return Vec::new();
            }
        };

        let mut deals = Vec::new();
        for selected in selection.deals {
            if deals.len() >= max {
                break;
            }
            let Some(&source) = sources.get(selected.url.as_str()) else {
                warn!(url = %selected.url, "Shortlist referenced an unknown URL, dropping");
                continue;
            };
            if selected.price <= 0.0 || !selected.price.is_finite() {
                debug!(url = %selected.url, price = selected.price, "Dropping deal without a usable price");
                continue;
            }
            match Deal::new(selected.description, selected.price, selected.url, source) {
                Ok(deal) => deals.push(deal),
                Err(e) => warn!(error = %e, "Dropping malformed deal"),
            }
        }
        deals
    }

    async fn call_api(&self, request: &ChatRequest) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, "Retrying shortlist API call");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: ChatResponse = response
                            .json()
                            .await
                            .context("Failed to parse shortlist response")?;
                        return Ok(body
                            .choices
                            .first()
                            .map(|c| c.message.content.clone())
                            .unwrap_or_default());
                    }

                    if status.as_u16() == 429 || status.as_u16() >= 500 {
                        let error_text = response.text().await.unwrap_or_default();
                        warn!(status = %status, attempt, error = %error_text, "Retryable shortlist API error");
                        last_error = Some(format!("HTTP {status}: {error_text}"));
                        continue;
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    anyhow::bail!("Shortlist API error {status}: {error_text}");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Shortlist request failed");
                    last_error = Some(format!("Request error: {e}"));
                    continue;
                }
            }
        }

        Err(DealhawkError::Classifier(format!(
            "API failed after {MAX_RETRIES} retries: {}",
            last_error.unwrap_or_default()
        ))
        .into())
    }
}

#[async_trait]
impl Shortlister for LlmShortlister {
    async fn shortlist(&self, listings: &[RawListing], max: usize) -> Result<Vec<Deal>> {
        if listings.is_empty() {
            return Ok(Vec::new());
        }

        let sources: HashMap<&str, DealSource> = listings
            .iter()
            .map(|l| (l.url.as_str(), l.source))
            .collect();

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Self::system_prompt(max),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Self::build_user_prompt(listings),
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object".to_string(),
            },
        };

        let reply = self.call_api(&request).await?;
        let deals = Self::parse_reply(&reply, &sources, max);
        debug!(
            listings = listings.len(),
            selected = deals.len(),
            "Shortlist complete"
        );
        Ok(deals)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sources() -> HashMap<&'static str, DealSource> {
        HashMap::from([
            ("https://deals.example.com/tv", DealSource::Electronics),
            ("https://deals.example.com/drill", DealSource::HomeGarden),
        ])
    }

    #[test]
    fn test_parse_reply_valid() {
        let reply = r#"{"deals": [
            {"description": "A 55-inch 4K TV with HDR10.", "price": 178.0, "url": "https://deals.example.com/tv"},
            {"description": "A cordless drill kit.", "price": 89.0, "url": "https://deals.example.com/drill"}
        ]}"#;
        let deals = LlmShortlister::parse_reply(reply, &sources(), 5);
        assert_eq!(deals.len(), 2);
        assert_eq!(deals[0].source, DealSource::Electronics);
        assert_eq!(deals[1].source, DealSource::HomeGarden);
        assert_eq!(deals[0].id, Deal::id_for_url("https://deals.example.com/tv"));
    }

    #[test]
    fn test_parse_reply_strips_markdown_fence() {
        let reply = "```json\n{\"deals\": [{\"description\": \"TV.\", \"price\": 178.0, \"url\": \"https://deals.example.com/tv\"}]}\n```";
        let deals = LlmShortlister::parse_reply(reply, &sources(), 5);
        assert_eq!(deals.len(), 1);
    }

    #[test]
    fn test_parse_reply_drops_non_positive_price() {
        let reply = r#"{"deals": [
            {"description": "TV.", "price": 0.0, "url": "https://deals.example.com/tv"},
            {"description": "Drill.", "price": -5.0, "url": "https://deals.example.com/drill"}
        ]}"#;
        assert!(LlmShortlister::parse_reply(reply, &sources(), 5).is_empty());
    }

    #[test]
    fn test_parse_reply_drops_hallucinated_url() {
        let reply = r#"{"deals": [
            {"description": "Mystery.", "price": 9.0, "url": "https://invented.example.com/x"}
        ]}"#;
        assert!(LlmShortlister::parse_reply(reply, &sources(), 5).is_empty());
    }

    #[test]
    fn test_parse_reply_caps_at_max() {
        let reply = r#"{"deals": [
            {"description": "TV.", "price": 178.0, "url": "https://deals.example.com/tv"},
            {"description": "Drill.", "price": 89.0, "url": "https://deals.example.com/drill"}
        ]}"#;
        let deals = LlmShortlister::parse_reply(reply, &sources(), 1);
        assert_eq!(deals.len(), 1);
    }

    #[test]
    fn test_parse_reply_garbage_yields_empty() {
        assert!(LlmShortlister::parse_reply("not json at all", &sources(), 5).is_empty());
    }

    #[test]
    fn test_user_prompt_contains_listings() {
        let listings = vec![RawListing {
            title: "55\" TV for $178".into(),
            summary: "HDR10, 3x HDMI".into(),
            url: "https://deals.example.com/tv".into(),
            source: DealSource::Electronics,
        }];
        let prompt = LlmShortlister::build_user_prompt(&listings);
        assert!(prompt.contains("55\" TV for $178"));
        assert!(prompt.contains("https://deals.example.com/tv"));
    }
}
