//! Shutdown, restart and broker failure.

use std::time::Duration;

use orderflow_core::testing::ScriptedFaults;
use orderflow_core::{PipelineError, ProcessingError};

use crate::harness::{config, eventually, publish_order, try_config, Pipeline, ORDERS};

#[tokio::test(start_paused = true)]
async fn test_shutdown_mid_retry_leaves_order_for_redelivery() {
    let config = config(&["--retry-backoff-ms", "3000"]);
    let broker = crate::harness::broker();
    let faults = ScriptedFaults::new().fail_always("O1", ProcessingError::retryable("db down"));
    let pipeline = Pipeline::start(&config, broker.clone(), faults);

    let delivery = publish_order(&config, &broker, "O1", "Widget", 9.99).await;
    eventually("first attempt", || !pipeline.handler.attempts_for("O1").is_empty()).await;

    let stats = pipeline.stop().await.unwrap();
    assert_eq!(stats.committed, 0);
    assert_eq!(broker.committed_offset(ORDERS, delivery.partition), None);
    assert!(broker.records(crate::harness::ORDERS_DLQ).is_empty());

    // A new consumer picks the order up again, attempt counter reset.
    let restarted = Pipeline::start(&config, broker.clone(), ScriptedFaults::new());
    eventually("O1 committed after restart", || {
        broker.committed_offset(ORDERS, delivery.partition) == Some(delivery.offset)
    })
    .await;
    let attempts = restarted.handler.attempts_for("O1");
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].attempt, 0);
    restarted.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_abandons_workers_after_grace_period() {
    let config = config(&["--retry-backoff-ms", "60000", "--shutdown-grace", "1s"]);
    let broker = crate::harness::broker();
    let faults = ScriptedFaults::new().fail_always("O1", ProcessingError::retryable("db down"));
    let pipeline = Pipeline::start(&config, broker.clone(), faults);

    publish_order(&config, &broker, "O1", "Widget", 9.99).await;
    eventually("first attempt", || !pipeline.handler.attempts_for("O1").is_empty()).await;

    let started = tokio::time::Instant::now();
    pipeline.stop().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(60));
    assert!(broker.commits().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_broker_failure_ends_the_run() {
    let config = config(&[]);
    let broker = crate::harness::broker();
    let pipeline = Pipeline::start(&config, broker.clone(), ScriptedFaults::new());

    let delivery = publish_order(&config, &broker, "O1", "Widget", 9.99).await;
    eventually("O1 committed", || {
        broker.committed_offset(ORDERS, delivery.partition) == Some(delivery.offset)
    })
    .await;

    broker.set_unavailable(true);
    let result = pipeline.join().await;
    assert!(matches!(result, Err(PipelineError::Broker(_))), "{result:?}");
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_to_missing_topic_fails() {
    let config = config(&["--orders-topic", "missing"]);
    let broker = crate::harness::broker();
    let pipeline = Pipeline::start(&config, broker, ScriptedFaults::new());

    assert!(matches!(
        pipeline.join().await,
        Err(PipelineError::Broker(_))
    ));
}

#[test]
fn test_config_defaults() {
    let config = config(&[]);
    assert_eq!(config.topics.topic, "orders");
    assert_eq!(config.topics.dlq_topic, "orders-dlq");
    assert_eq!(config.topics.partitions, 5);
    assert_eq!(config.topics.replication_factor, 3);
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.backoff_interval, Duration::from_millis(3000));
    assert_eq!(config.retry.worker_concurrency, 3);
    assert_eq!(config.runtime.group_id, "order-consumers");
    assert_eq!(config.runtime.shutdown_grace, Duration::from_secs(30));
    assert_eq!(config.kafka.client_id, "order-producer");
    assert_eq!(config.listen_addr.port(), 8080);
}

#[test]
fn test_invalid_config_is_rejected() {
    assert!(try_config(&["--concurrency", "0"]).is_err());
    assert!(try_config(&["--terminal-error-kinds", "input_malformed,flaky"]).is_err());
    assert!(try_config(&["--shutdown-grace", "soon"]).is_err());
    assert!(try_config(&["--dlq-topic", "orders"]).is_err());
}
