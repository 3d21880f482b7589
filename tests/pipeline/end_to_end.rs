//! From `POST /orders` to a committed offset.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use orderflow::order_gateway;
use orderflow_api::{router, AppState};
use orderflow_core::testing::ScriptedFaults;
use tower::ServiceExt;

use crate::harness::{config, eventually, Pipeline, ORDERS};

async fn post(app: axum::Router, body: &'static str) -> StatusCode {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri("/orders")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
    .status()
}

#[tokio::test(start_paused = true)]
async fn test_accepted_order_is_processed_and_committed() {
    let config = config(&[]);
    let broker = crate::harness::broker();
    let pipeline = Pipeline::start(&config, broker.clone(), ScriptedFaults::new());
    let app = router(AppState::new(order_gateway(&config, broker.clone())));

    let status = post(app, r#"{"orderId":"O1","product":"Widget","price":9.99}"#).await;
    assert_eq!(status, StatusCode::OK);

    let record = broker.records(ORDERS).remove(0);
    eventually("O1 committed", || {
        broker.committed_offset(ORDERS, record.partition) == Some(record.offset)
    })
    .await;
    assert_eq!(pipeline.handler.attempts_for("O1").len(), 1);
    pipeline.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_rejected_order_never_reaches_the_consumer() {
    let config = config(&[]);
    let broker = crate::harness::broker();
    let pipeline = Pipeline::start(&config, broker.clone(), ScriptedFaults::new());
    let app = router(AppState::new(order_gateway(&config, broker.clone())));

    let status = post(app, r#"{"orderId":"O9","product":"Widget","price":-1}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    assert!(broker.records(ORDERS).is_empty());
    assert!(pipeline.handler.attempts().is_empty());
    pipeline.stop().await.unwrap();
}
