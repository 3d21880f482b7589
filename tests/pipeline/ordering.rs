//! Per-key ordering, bounded concurrency and redelivery after a failed
//! dead-letter publish.

use orderflow_core::testing::ScriptedFaults;
use orderflow_core::ProcessingError;

use crate::harness::{config, eventually, publish_order, Pipeline, ORDERS, ORDERS_DLQ};

#[tokio::test(start_paused = true)]
async fn test_same_key_is_processed_in_publish_order_and_never_concurrently() {
    let config = config(&["--retry-backoff-ms", "200", "--concurrency", "3"]);
    let broker = crate::harness::broker();
    let faults = ScriptedFaults::new()
        .fail_times("A", 1, ProcessingError::retryable("lock contention"))
        .fail_times("O3", 2, ProcessingError::retryable("lock contention"));
    let pipeline = Pipeline::start(&config, broker.clone(), faults);

    let keys = ["O1", "O2", "O3", "A", "B"];
    let mut deliveries = Vec::new();
    for round in 0..4 {
        for key in keys {
            let delivery =
                publish_order(&config, &broker, key, &format!("item-{round}"), 1.0 + round as f64)
                    .await;
            deliveries.push((key, delivery));
        }
    }

    eventually("every order committed", || {
        deliveries
            .iter()
            .all(|(_, delivery)| pipeline.commits_of(delivery) >= 1)
    })
    .await;

    for key in keys {
        let offsets: Vec<i64> = pipeline
            .handler
            .attempts_for(key)
            .iter()
            .map(|attempt| attempt.offset)
            .collect();
        assert!(
            offsets.windows(2).all(|pair| pair[0] <= pair[1]),
            "{key} processed out of order: {offsets:?}"
        );
        let published: Vec<i64> = deliveries
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, delivery)| delivery.offset)
            .collect();
        let mut processed = offsets.clone();
        processed.dedup();
        assert_eq!(processed, published, "{key}");
    }

    for (key, delivery) in &deliveries {
        assert_eq!(pipeline.commits_of(delivery), 1, "{key} at {delivery:?}");
    }
    assert_eq!(pipeline.handler.overlaps(), 0);
    assert!(pipeline.handler.max_concurrency() <= 3);
    assert!(pipeline.dead_letters().is_empty());

    let stats = pipeline.stop().await.unwrap();
    assert_eq!(stats.retries, 3);
    assert_eq!(stats.committed, 20);
}

#[tokio::test(start_paused = true)]
async fn test_failed_dead_letter_publish_leaves_partition_uncommitted() {
    let config = config(&["--retry-backoff-ms", "500"]);
    let broker = crate::harness::broker();
    let faults = ScriptedFaults::new().fail_always("O2", ProcessingError::terminal("rejected"));
    let pipeline = Pipeline::start(&config, broker.clone(), faults);

    broker.fail_publishes_to(ORDERS_DLQ, true);
    let o2 = publish_order(&config, &broker, "O2", "Widget", 4.0).await;
    let a = publish_order(&config, &broker, "A", "Widget", 4.0).await;
    // Same partition, A behind O2.
    assert_eq!(o2.partition, a.partition);

    eventually("O2 redelivered", || pipeline.handler.attempts_for("O2").len() >= 2).await;
    assert_eq!(broker.committed_offset(ORDERS, o2.partition), None);
    assert!(pipeline.handler.attempts_for("A").is_empty());
    // Each redelivery starts over.
    assert!(pipeline
        .handler
        .attempts_for("O2")
        .iter()
        .all(|attempt| attempt.attempt == 0));

    broker.fail_publishes_to(ORDERS_DLQ, false);
    eventually("A committed", || {
        broker.committed_offset(ORDERS, a.partition) == Some(a.offset)
    })
    .await;

    let dead_letters = pipeline.dead_letters();
    assert_eq!(dead_letters.len(), 1);
    assert_eq!(dead_letters[0].0, "O2");
    assert_eq!(pipeline.commits_of(&o2), 1);
    assert_eq!(pipeline.handler.attempts_for("A").len(), 1);

    let stats = pipeline.stop().await.unwrap();
    assert!(stats.rewound >= 1);
    assert_eq!(stats.dead_lettered, 1);
}
