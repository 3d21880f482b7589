//! Command-line interface for orderflow
//!
//! # Usage Examples
//!
//! ```bash
//! # Create topics (run once, before anything else)
//! orderflow provision --partitions 5 --replication-factor 3
//!
//! # HTTP API only
//! orderflow api --listen-addr 0.0.0.0:8080
//!
//! # Consumer only, with a custom retry policy
//! orderflow --retry-attempts 3 --retry-backoff-ms 500 consume
//!
//! # API and consumer in one process
//! orderflow serve
//! ```
//!
//! Every flag can also be set through its environment variable, e.g.
//! `KAFKA_BROKERS`, `ORDERS_TOPIC` or `CONSUMER_CONCURRENCY`.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use orderflow::{consumer_runtime, order_gateway, AppConfig, OrderHandler, PipelineOpts};
use orderflow_api::AppState;
use orderflow_kafka::{provision_topics, KafkaBroker};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "orderflow")]
#[command(about = "Order pipeline with retries and a dead-letter topic on Kafka")]
#[command(long_about = None)]
struct Cli {
    #[command(flatten)]
    opts: PipelineOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the orders and dead-letter topics if they do not exist
    Provision,

    /// Serve the order API
    Api,

    /// Run the consumer runtime
    Consume,

    /// Serve the order API and run the consumer runtime in one process
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_opts(cli.opts)?;

    match cli.command {
        Commands::Provision => {
            provision_topics(&config.kafka, &config.topics)
                .await
                .context("Failed to provision topics")?;
        }
        Commands::Api => {
            let broker = connect(&config)?;
            run_api(&config, broker, shutdown_on_ctrl_c()).await?;
        }
        Commands::Consume => {
            let broker = connect(&config)?;
            run_consumer(&config, broker, shutdown_on_ctrl_c()).await?;
        }
        Commands::Serve => {
            let broker = connect(&config)?;
            let shutdown = shutdown_on_ctrl_c();
            let (api, consumer) = tokio::join!(
                run_api(&config, Arc::clone(&broker), shutdown.clone()),
                async {
                    let result = run_consumer(&config, Arc::clone(&broker), shutdown.clone()).await;
                    // The API has nothing to feed once the consumer is gone
                    shutdown.cancel();
                    result
                }
            );
            api?;
            consumer?;
        }
    }

    Ok(())
}

fn connect(config: &AppConfig) -> anyhow::Result<Arc<KafkaBroker>> {
    let broker = KafkaBroker::new(config.kafka.clone()).context("Failed to create Kafka client")?;
    Ok(Arc::new(broker))
}

/// Token cancelled on the first Ctrl-C.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => warn!("Failed to listen for Ctrl-C, shutting down: {e}"),
        }
        cancel.cancel();
    });
    token
}

async fn run_api(
    config: &AppConfig,
    broker: Arc<KafkaBroker>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    let state = AppState::new(order_gateway(config, broker));
    orderflow_api::serve(listener, state, shutdown)
        .await
        .context("Order API failed")
}

async fn run_consumer(
    config: &AppConfig,
    broker: Arc<KafkaBroker>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    info!(
        "Starting consumer: {} retries, {}ms backoff, {} workers",
        config.retry.max_attempts,
        config.retry.backoff_interval.as_millis(),
        config.retry.worker_concurrency
    );
    let stats = consumer_runtime(config, broker, Arc::new(OrderHandler))
        .run(shutdown)
        .await
        .context("Consumer failed")?;
    info!(
        "Consumer finished: {} committed, {} dead-lettered",
        stats.committed, stats.dead_lettered
    );
    Ok(())
}
