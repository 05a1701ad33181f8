//! Diabetes Risk Service - Main Entry Point
//!
//! Answers predict, health, metrics and retrain requests over NATS
//! request/reply. Predictions run concurrently on a bounded set of workers;
//! retrains queue separately and train on the blocking pool so serving
//! continues while a new model trains.

use anyhow::{Context, Result};
use diabetes_risk_service::{
    config::{AppConfig, LoggingConfig},
    consumer::{RequestConsumer, RequestKind},
    metrics::{MetricsReporter, ServiceMetrics},
    producer::ReplyProducer,
    serving::ServingFacade,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    info!("Starting Diabetes Risk Service");
    info!(
        threshold = config.detection.threshold,
        medium = config.detection.risk_levels.medium,
        high = config.detection.risk_levels.high,
        "Decision rule loaded"
    );

    let metrics = Arc::new(ServiceMetrics::new());
    let facade = Arc::new(ServingFacade::from_config(&config, metrics.clone()));
    let health = facade.health();
    info!(
        backend = ?health.backend,
        model_loaded = health.model_loaded,
        "Serving facade ready"
    );

    let client = async_nats::connect(&config.nats.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(
        client.clone(),
        vec![
            (RequestKind::Predict, config.nats.predict_subject.clone()),
            (RequestKind::Health, config.nats.health_subject.clone()),
            (RequestKind::Metrics, config.nats.metrics_subject.clone()),
            (RequestKind::Retrain, config.nats.retrain_subject.clone()),
        ],
    );
    let producer = ReplyProducer::new(client.clone());

    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.report_interval_secs);
    tokio::spawn(reporter.start());

    // Limits concurrently processed requests
    let semaphore = Arc::new(Semaphore::new(config.pipeline.workers.max(1)));
    info!(workers = config.pipeline.workers, "Waiting for requests");

    let mut requests = consumer.subscribe().await?;

    while let Some((kind, message)) = requests.next().await {
        let facade = facade.clone();
        let producer = producer.clone();
        let inbox = message.reply.clone();

        let permit = if kind.uses_worker_pool() {
            Some(semaphore.clone().acquire_owned().await?)
        } else {
            None
        };

        tokio::spawn(async move {
            let sent = match kind {
                RequestKind::Predict => {
                    let result = facade.predict_json(&message.payload);
                    producer.reply(inbox, &result).await
                }
                RequestKind::Health => producer.reply_ok(inbox, &facade.health()).await,
                RequestKind::Metrics => producer.reply_ok(inbox, &facade.metrics()).await,
                RequestKind::Retrain => {
                    let result = facade.retrain_upload(message.payload.to_vec()).await;
                    producer.reply(inbox, &result).await
                }
            };

            if let Err(e) = sent {
                warn!(error = %e, kind = ?kind, "Failed to publish reply");
            }

            drop(permit);
        });
    }

    info!("Request stream closed, shutting down...");
    metrics.print_summary();

    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
    Ok(())
}
