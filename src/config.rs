//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::types::DealhawkError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub feeds: FeedsConfig,
    pub classifier: ClassifierConfig,
    pub estimators: EstimatorsConfig,
    pub evaluator: EvaluatorConfig,
    pub ensemble: EnsembleConfig,
    pub planner: PlannerConfig,
    pub memory: MemoryConfig,
    pub alerts: AlertsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub scan_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedsConfig {
    /// Deal feed endpoints, each tagged with its source category.
    #[serde(default)]
    pub endpoints: Vec<FeedEndpoint>,
    /// Cap on total raw listings taken per cycle across all feeds.
    pub max_items: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedEndpoint {
    pub url: String,
    /// Source category name, parsed into `DealSource`.
    pub source: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    /// Maximum deals the classifier may return per cycle.
    pub shortlist_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EstimatorsConfig {
    pub frontier: FrontierConfig,
    pub specialist: SpecialistConfig,
    pub regressor: RegressorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FrontierConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    /// Similarity corpus artifact (historical item descriptions + prices).
    pub corpus_path: String,
    /// How many similar items to include in the prompt.
    pub top_k: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpecialistConfig {
    pub enabled: bool,
    /// Remote model-serving endpoint. Cold starts can take tens of seconds,
    /// so this backend gets its own generous timeout.
    pub endpoint: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegressorConfig {
    pub enabled: bool,
    /// Pretrained linear regressor artifact.
    pub weights_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EvaluatorConfig {
    /// Per-adapter call timeout.
    pub adapter_timeout_ms: u64,
    /// Outer deadline for one deal's whole fan-out.
    pub deadline_ms: u64,
    /// Minimum successful component estimates required to combine.
    pub min_components: usize,
    /// How many deals may be evaluated concurrently.
    pub workers: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnsembleConfig {
    /// Versioned meta-model artifact. Missing at startup is fatal.
    pub model_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlannerConfig {
    /// Discount (estimate minus listed price, USD) the best opportunity
    /// must exceed to raise an alert.
    pub discount_threshold: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    pub enabled: bool,
    pub pushover_token_env: Option<String>,
    pub pushover_user_env: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Basic sanity checks that are cheaper to catch at startup than
    /// mid-cycle.
    fn validate(&self) -> Result<()> {
        let invalid =
            |message: String| -> Result<()> { Err(DealhawkError::Config(message).into()) };

        if self.feeds.endpoints.is_empty() {
            return invalid("at least one feed endpoint is required".to_string());
        }
        if self.classifier.shortlist_size == 0 {
            return invalid("shortlist_size must be >= 1".to_string());
        }
        if self.evaluator.min_components == 0 {
            return invalid("min_components must be >= 1".to_string());
        }
        if self.evaluator.workers == 0 {
            return invalid("workers must be >= 1".to_string());
        }
        if self.evaluator.deadline_ms < self.evaluator.adapter_timeout_ms {
            return invalid(format!(
                "deadline_ms ({}) must cover adapter_timeout_ms ({})",
                self.evaluator.deadline_ms, self.evaluator.adapter_timeout_ms
            ));
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> String {
        r#"
            [agent]
            name = "DEALHAWK-001"
            scan_interval_secs = 600

            [feeds]
            max_items = 50
            timeout_secs = 20
            [[feeds.endpoints]]
            url = "https://deals.example.com/electronics.json"
            source = "electronics"

            [classifier]
            endpoint = "https://api.openai.com/v1/chat/completions"
            model = "gpt-4o-mini"
            api_key_env = "OPENAI_API_KEY"
            shortlist_size = 5

            [estimators.frontier]
            enabled = true
            endpoint = "https://api.openai.com/v1/chat/completions"
            model = "gpt-4o-mini"
            api_key_env = "OPENAI_API_KEY"
            corpus_path = "artifacts/similars_v1.json"
            top_k = 5

            [estimators.specialist]
            enabled = true
            endpoint = "https://pricer.example.com/price"
            timeout_secs = 45

            [estimators.regressor]
            enabled = true
            weights_path = "artifacts/regressor_v1.json"

            [evaluator]
            adapter_timeout_ms = 20000
            deadline_ms = 30000
            min_components = 2
            workers = 5

            [ensemble]
            model_path = "artifacts/ensemble_v1.json"

            [planner]
            discount_threshold = 50.0

            [memory]
            path = "dealhawk_memory.json"

            [alerts]
            enabled = false
        "#
        .to_string()
    }

    #[test]
    fn test_parse_minimal_config() {
        let cfg: AppConfig = toml::from_str(&minimal_toml()).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.agent.name, "DEALHAWK-001");
        assert_eq!(cfg.classifier.shortlist_size, 5);
        assert_eq!(cfg.evaluator.min_components, 2);
        assert!((cfg.planner.discount_threshold - 50.0).abs() < 1e-10);
        assert!(cfg.alerts.pushover_token_env.is_none());
    }

    #[test]
    fn test_validate_rejects_empty_feeds() {
        let toml_src = minimal_toml().replace(
            "[[feeds.endpoints]]\n            url = \"https://deals.example.com/electronics.json\"\n            source = \"electronics\"",
            "",
        );
        let cfg: AppConfig = toml::from_str(&toml_src).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_quorum() {
        let toml_src = minimal_toml().replace("min_components = 2", "min_components = 0");
        let cfg: AppConfig = toml::from_str(&toml_src).unwrap();

        let err = cfg.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DealhawkError>(),
            Some(DealhawkError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_deadline_below_adapter_timeout() {
        let toml_src = minimal_toml().replace("deadline_ms = 30000", "deadline_ms = 1000");
        let cfg: AppConfig = toml::from_str(&toml_src).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_resolve_env_missing() {
        assert!(AppConfig::resolve_env("DEALHAWK_DEFINITELY_UNSET_VAR").is_err());
    }
}
