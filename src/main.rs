//! DEALHAWK binary entry point.
//!
//! Loads configuration, wires the pipeline together, and runs the cycle
//! loop until interrupted. Pass `--once` to run a single cycle and exit.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dealhawk::collector::shortlist::LlmShortlister;
use dealhawk::collector::Collector;
use dealhawk::config::AppConfig;
use dealhawk::ensemble::EnsembleModel;
use dealhawk::estimators::{
    frontier::FrontierEstimator, regressor::RegressorEstimator, specialist::SpecialistEstimator,
    Estimator,
};
use dealhawk::evaluator::Evaluator;
use dealhawk::feeds::rest::{FeedSource, RestFeedClient};
use dealhawk::index::SimilarityIndex;
use dealhawk::memory::DealMemory;
use dealhawk::notifier::{Notifier, PushoverClient};
use dealhawk::planner::Planner;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_estimators(config: &AppConfig) -> Result<Vec<Arc<dyn Estimator>>> {
    let mut estimators: Vec<Arc<dyn Estimator>> = Vec::new();

    if config.estimators.frontier.enabled {
        let frontier = &config.estimators.frontier;
        let index = Arc::new(SimilarityIndex::load(&frontier.corpus_path)?);
        let api_key = AppConfig::resolve_env(&frontier.api_key_env)?;
        estimators.push(Arc::new(FrontierEstimator::new(
            frontier.endpoint.clone(),
            frontier.model.clone(),
            api_key,
            index,
            frontier.top_k,
        )?));
    }

    if config.estimators.specialist.enabled {
        let specialist = &config.estimators.specialist;
        estimators.push(Arc::new(SpecialistEstimator::new(
            specialist.endpoint.clone(),
            Duration::from_secs(specialist.timeout_secs),
        )?));
    }

    if config.estimators.regressor.enabled {
        estimators.push(Arc::new(RegressorEstimator::load(
            &config.estimators.regressor.weights_path,
        )?));
    }

    if estimators.is_empty() {
        anyhow::bail!("No estimators enabled, nothing can be priced");
    }
    Ok(estimators)
}

fn build_planner(config: &AppConfig) -> Result<Planner> {
    let sources = config
        .feeds
        .endpoints
        .iter()
        .map(|endpoint| {
            Ok(FeedSource {
                url: endpoint.url.clone(),
                source: endpoint.source.parse()?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let feed = Arc::new(RestFeedClient::new(
        sources,
        config.feeds.max_items,
        Duration::from_secs(config.feeds.timeout_secs),
    )?);

    let classifier_key = AppConfig::resolve_env(&config.classifier.api_key_env)?;
    let shortlister = Arc::new(LlmShortlister::new(
        config.classifier.endpoint.clone(),
        config.classifier.model.clone(),
        classifier_key,
    )?);
    let collector = Collector::new(feed, shortlister, config.classifier.shortlist_size);

    let estimators = build_estimators(config)?;
    let model = Arc::new(EnsembleModel::load(
        &config.ensemble.model_path,
        config.evaluator.min_components,
    )?);
    let evaluator = Evaluator::new(
        estimators,
        model,
        Duration::from_millis(config.evaluator.adapter_timeout_ms),
        Duration::from_millis(config.evaluator.deadline_ms),
    );

    let memory = DealMemory::load(&config.memory.path)?;

    let notifier = if config.alerts.enabled {
        let token_env = config
            .alerts
            .pushover_token_env
            .as_deref()
            .context("alerts.pushover_token_env is required when alerts are enabled")?;
        let user_env = config
            .alerts
            .pushover_user_env
            .as_deref()
            .context("alerts.pushover_user_env is required when alerts are enabled")?;
        let token = AppConfig::resolve_env(token_env)?;
        let user = AppConfig::resolve_env(user_env)?;
        Some(Notifier::new(Arc::new(PushoverClient::new(token, user)?)))
    } else {
        None
    };

    Ok(Planner::new(
        collector,
        evaluator,
        memory,
        notifier,
        config.planner.discount_threshold,
        config.evaluator.workers,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_logging();

    let config = AppConfig::load("config.toml")?;
    info!(agent = %config.agent.name, "Starting up");

    let mut planner = build_planner(&config)?;

    let once = std::env::args().any(|arg| arg == "--once");
    if once {
        let report = planner.run_cycle().await?;
        info!("{report}");
        return Ok(());
    }

    let mut interval =
        tokio::time::interval(Duration::from_secs(config.agent.scan_interval_secs));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match planner.run_cycle().await {
                    Ok(report) => info!("{report}"),
                    Err(e) => error!(error = %e, "Cycle failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, stopping");
                break;
            }
        }
    }

    Ok(())
}
