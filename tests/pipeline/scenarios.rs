//! Retry, terminal and exhaustion paths for a single order.

use std::time::Duration;

use orderflow_core::testing::ScriptedFaults;
use orderflow_core::ProcessingError;

use crate::harness::{config, eventually, publish_order, Pipeline, ORDERS};

#[tokio::test(start_paused = true)]
async fn test_retryable_failures_then_success_commits_once() {
    let config = config(&[]);
    let broker = crate::harness::broker();
    let faults = ScriptedFaults::new().fail_times(
        "O1",
        2,
        ProcessingError::retryable("inventory service unavailable"),
    );
    let pipeline = Pipeline::start(&config, broker.clone(), faults);

    let delivery = publish_order(&config, &broker, "O1", "Widget", 9.99).await;
    eventually("O1 committed", || {
        broker.committed_offset(ORDERS, delivery.partition) == Some(delivery.offset)
    })
    .await;

    let attempts = pipeline.handler.attempts_for("O1");
    assert_eq!(attempts.len(), 3);
    assert_eq!(
        attempts.iter().map(|a| a.attempt).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    for pair in attempts.windows(2) {
        assert!(pair[1].started_at - pair[0].started_at >= Duration::from_millis(3000));
    }
    assert_eq!(pipeline.commits_of(&delivery), 1);
    assert!(pipeline.dead_letters().is_empty());

    let stats = pipeline.stop().await.unwrap();
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.committed, 1);
    assert_eq!(stats.dead_lettered, 0);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_failure_is_dead_lettered_without_retry() {
    let config = config(&[]);
    let broker = crate::harness::broker();
    let faults =
        ScriptedFaults::new().fail_times("O2", 1, ProcessingError::terminal("product discontinued"));
    let pipeline = Pipeline::start(&config, broker.clone(), faults);

    let delivery = publish_order(&config, &broker, "O2", "Gadget", 19.5).await;
    eventually("O2 committed", || {
        broker.committed_offset(ORDERS, delivery.partition) == Some(delivery.offset)
    })
    .await;

    let dead_letters = pipeline.dead_letters();
    assert_eq!(dead_letters.len(), 1);
    let (key, record) = &dead_letters[0];
    assert_eq!(key, "O2");
    assert_eq!(record.original_key, "O2");
    assert_eq!(record.attempts_made, 1);
    assert_eq!(record.original_topic, ORDERS);
    assert_eq!(record.original_partition, delivery.partition);
    assert_eq!(record.original_offset, delivery.offset);
    assert_eq!(record.error_kind, "permanent");
    assert!(record.failure_reason.contains("product discontinued"));

    assert_eq!(pipeline.handler.attempts_for("O2").len(), 1);
    assert_eq!(pipeline.commits_of(&delivery), 1);
    pipeline.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_are_dead_lettered_after_last_attempt() {
    let config = config(&["--retry-attempts", "5", "--retry-backoff-ms", "3000"]);
    let broker = crate::harness::broker();
    let faults =
        ScriptedFaults::new().fail_always("O3", ProcessingError::retryable("payment gateway timeout"));
    let pipeline = Pipeline::start(&config, broker.clone(), faults);

    let delivery = publish_order(&config, &broker, "O3", "Gizmo", 5.0).await;
    eventually("O3 dead-lettered", || !pipeline.dead_letters().is_empty()).await;

    let attempts = pipeline.handler.attempts_for("O3");
    assert_eq!(attempts.len(), 6);
    let elapsed = attempts[5].started_at - attempts[0].started_at;
    assert!(elapsed >= Duration::from_millis(5 * 3000), "{elapsed:?}");

    let (_, record) = &pipeline.dead_letters()[0];
    assert_eq!(record.attempts_made, 6);
    assert!(record
        .failure_reason
        .starts_with("retries exhausted after 6 attempts"));

    eventually("O3 committed", || {
        broker.committed_offset(ORDERS, delivery.partition) == Some(delivery.offset)
    })
    .await;

    // Nothing more happens to a dead-lettered order.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(pipeline.handler.attempts_for("O3").len(), 6);
    assert_eq!(pipeline.dead_letters().len(), 1);

    let stats = pipeline.stop().await.unwrap();
    assert_eq!(stats.retries, 5);
    assert_eq!(stats.dead_lettered, 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_retries_dead_letters_first_retryable_failure() {
    let config = config(&["--retry-attempts", "0"]);
    let broker = crate::harness::broker();
    let faults = ScriptedFaults::new().fail_always("O4", ProcessingError::retryable("flaky"));
    let pipeline = Pipeline::start(&config, broker.clone(), faults);

    publish_order(&config, &broker, "O4", "Widget", 1.0).await;
    eventually("O4 dead-lettered", || !pipeline.dead_letters().is_empty()).await;

    assert_eq!(pipeline.handler.attempts_for("O4").len(), 1);
    assert_eq!(pipeline.dead_letters()[0].1.attempts_made, 1);
    pipeline.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_panicking_handler_is_retried() {
    let config = config(&["--retry-backoff-ms", "100"]);
    let broker = crate::harness::broker();
    let faults = ScriptedFaults::new().panic_once("O5", "index out of bounds");
    let pipeline = Pipeline::start(&config, broker.clone(), faults);

    let delivery = publish_order(&config, &broker, "O5", "Widget", 2.0).await;
    eventually("O5 committed", || {
        broker.committed_offset(ORDERS, delivery.partition) == Some(delivery.offset)
    })
    .await;

    assert_eq!(pipeline.handler.attempts_for("O5").len(), 2);
    assert!(pipeline.dead_letters().is_empty());
    pipeline.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_payload_goes_straight_to_dead_letter() {
    let config = config(&[]);
    let broker = crate::harness::broker();
    let pipeline = Pipeline::start(&config, broker.clone(), ScriptedFaults::new());

    let delivery = orderflow::order_gateway(&config, broker.clone())
        .publish("O6", vec![0x0a, 0xff])
        .await
        .unwrap();
    eventually("O6 dead-lettered", || !pipeline.dead_letters().is_empty()).await;

    let (_, record) = &pipeline.dead_letters()[0];
    assert_eq!(record.error_kind, "deserialization");
    assert_eq!(record.attempts_made, 1);
    assert_eq!(record.original_payload_bytes().unwrap(), vec![0x0a, 0xff]);
    eventually("O6 committed", || {
        broker.committed_offset(ORDERS, delivery.partition) == Some(delivery.offset)
    })
    .await;
    pipeline.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_configured_terminal_kinds_override_defaults() {
    let config = config(&["--terminal-error-kinds", "unavailable"]);
    let broker = crate::harness::broker();
    let faults = ScriptedFaults::new().fail_always("O7", ProcessingError::retryable("down"));
    let pipeline = Pipeline::start(&config, broker.clone(), faults);

    publish_order(&config, &broker, "O7", "Widget", 3.0).await;
    eventually("O7 dead-lettered", || !pipeline.dead_letters().is_empty()).await;

    assert_eq!(pipeline.handler.attempts_for("O7").len(), 1);
    assert_eq!(pipeline.dead_letters()[0].1.error_kind, "unavailable");
    pipeline.stop().await.unwrap();
}
