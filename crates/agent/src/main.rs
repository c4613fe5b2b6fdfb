//! opsbot - automated remediation agent
//!
//! Samples host utilization on a fixed interval, correlates anomalies with
//! recent error logs, restarts the application container on known failure
//! signatures and reports every incident to the operator chat.

use anyhow::{Context, Result};
use opsbot_lib::{
    analyzer::Analyzer,
    backends::{LokiClient, PrometheusClient},
    health::HealthRegistry,
    history::HistoryStore,
    notifier::Notifier,
    observability::{AgentMetrics, StructuredLogger},
    remediator::{ContainerRestart, Remediator},
    sampler::Sampler,
    summarizer::OllamaSummarizer,
    Orchestrator,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = config::AgentConfig::load().context("Failed to load agent configuration")?;
    info!(
        agent = %config.agent_name,
        metrics_url = %config.metrics_url,
        logs_url = %config.logs_url,
        notifications = config.chat_webhook_url.is_some(),
        summarizer = config.summarizer_url.is_some(),
        "Agent configured"
    );

    // Register process-wide metrics before anything records into them
    let _metrics = AgentMetrics::new();
    let logger = StructuredLogger::new(&config.agent_name);
    let health_registry = HealthRegistry::with_pipeline_components().await;

    let orchestrator = Arc::new(build_orchestrator(&config, &logger, &health_registry)?);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let app_state = Arc::new(api::AppState::new(health_registry.clone()));
    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));
    let mut loop_handle = tokio::spawn(orchestrator.run(shutdown_tx.subscribe()));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl-c")?;
            info!("Interrupt received, stopping agent");
        }
        joined = &mut loop_handle => {
            if let Err(e) = joined {
                error!(error = %e, "Agent loop exited unexpectedly");
            }
        }
    }

    let _ = shutdown_tx.send(());
    if !loop_handle.is_finished() {
        let _ = loop_handle.await;
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task panicked"),
        Ok(Ok(())) => {}
    }

    Ok(())
}

fn build_orchestrator(
    config: &config::AgentConfig,
    logger: &StructuredLogger,
    health: &HealthRegistry,
) -> Result<Orchestrator> {
    let timeout = config.request_timeout();

    let prometheus = Arc::new(
        PrometheusClient::new(&config.metrics_url, timeout)
            .context("Invalid metrics backend URL")?,
    );
    let loki = Arc::new(
        LokiClient::new(&config.logs_url, timeout)
            .context("Invalid log backend URL")?
            .with_selector(config.log_selector.clone())
            .with_limit(config.log_limit),
    );

    let sampler = Sampler::new(prometheus.clone(), config.sampler_config(), logger.clone());
    let analyzer = Analyzer::new(prometheus, loki, config.analyzer_config(), logger.clone());

    let restart = Arc::new(ContainerRestart::new(
        config.container_runtime.clone(),
        config.restart_container.clone(),
    ));
    let remediator = Remediator::new(restart, logger.clone());

    let history = HistoryStore::new(&config.history_path);
    let notifier = Notifier::new(config.notifier_config(), history, logger.clone())?;

    let mut orchestrator = Orchestrator::new(
        sampler,
        analyzer,
        remediator,
        notifier,
        config.orchestrator_config(),
        health.clone(),
        logger.clone(),
    );

    if let Some(url) = &config.summarizer_url {
        let summarizer = OllamaSummarizer::with_timeout(url, config.summarizer_model.clone(), timeout)
            .context("Invalid summarizer URL")?;
        orchestrator = orchestrator.with_summarizer(Arc::new(summarizer));
    }

    Ok(orchestrator)
}
