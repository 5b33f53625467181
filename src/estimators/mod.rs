//! Price estimation backends.
//!
//! Defines the `Estimator` trait and provides three implementations with
//! very different latency profiles: a retrieval-augmented LLM (frontier),
//! a remote fine-tuned model endpoint (specialist), and a local linear
//! regressor (regressor). The evaluator treats them uniformly.

pub mod frontier;
pub mod regressor;
pub mod specialist;

use anyhow::Result;
use async_trait::async_trait;

/// Abstraction over price-prediction backends.
///
/// Implementors take a free-text product description and return a predicted
/// fair-market price in USD. A successful estimate is always `>= 0`;
/// timeouts and transport failures surface as errors and are tolerated by
/// the evaluator up to its quorum rule.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Estimator: Send + Sync {
    /// Stable backend name, used as the feature key in the ensemble model.
    fn name(&self) -> &str;

    /// Predict the fair price of the described item.
    async fn estimate(&self, description: &str) -> Result<f64>;
}

/// Pull the first price-like number out of free text (e.g. "$1,299.99" or
/// "the price is 45"). Used to parse LLM replies.
pub(crate) fn parse_price(text: &str) -> Option<f64> {
    let cleaned = text.replace(['$', ','], "");
    let mut chars = cleaned.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            let mut num = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() || c == '.' {
                    num.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            if let Ok(v) = num.trim_end_matches('.').parse::<f64>() {
                return Some(v);
            }
        } else {
            chars.next();
        }
    }
    None
}
