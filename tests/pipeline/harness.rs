//! Shared setup: an in-memory broker, a recording handler with scripted
//! faults, and a consumer runtime wired the way the binary wires it.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use orderflow::{consumer_runtime, order_gateway, AppConfig, OrderHandler, PipelineOpts};
use orderflow_core::testing::{FaultInjectingHandler, RecordingHandler, ScriptedFaults};
use orderflow_core::{Delivery, MemoryBroker, PipelineError, StatsSnapshot};
use orderflow_types::{DeadLetterRecord, OrderEvent};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const ORDERS: &str = "orders";
pub const ORDERS_DLQ: &str = "orders-dlq";

pub type TestHandler = RecordingHandler<FaultInjectingHandler<OrderHandler>>;

#[derive(Parser)]
struct TestCli {
    #[command(flatten)]
    opts: PipelineOpts,
}

/// Config as the binary would build it from `args`.
pub fn try_config(args: &[&str]) -> anyhow::Result<AppConfig> {
    let cli = TestCli::try_parse_from(std::iter::once("orderflow").chain(args.iter().copied()))?;
    AppConfig::from_opts(cli.opts)
}

pub fn config(args: &[&str]) -> AppConfig {
    try_config(args).expect("test config should be valid")
}

pub fn broker() -> Arc<MemoryBroker> {
    let broker = Arc::new(MemoryBroker::new());
    broker.create_topic(ORDERS, 5);
    broker.create_topic(ORDERS_DLQ, 1);
    broker
}

pub fn handler(faults: ScriptedFaults) -> Arc<TestHandler> {
    Arc::new(
        RecordingHandler::new(FaultInjectingHandler::new(OrderHandler, faults))
            .with_work_time(Duration::from_millis(5)),
    )
}

pub struct Pipeline {
    pub broker: Arc<MemoryBroker>,
    pub handler: Arc<TestHandler>,
    pub shutdown: CancellationToken,
    task: JoinHandle<Result<StatsSnapshot, PipelineError>>,
}

impl Pipeline {
    pub fn start(config: &AppConfig, broker: Arc<MemoryBroker>, faults: ScriptedFaults) -> Self {
        let handler = handler(faults);
        let shutdown = CancellationToken::new();
        let runtime = consumer_runtime(config, broker.clone(), handler.clone());
        let task = tokio::spawn(runtime.run(shutdown.clone()));
        Self {
            broker,
            handler,
            shutdown,
            task,
        }
    }

    pub async fn stop(self) -> Result<StatsSnapshot, PipelineError> {
        self.shutdown.cancel();
        self.task.await.expect("runtime task panicked")
    }

    /// Wait for the runtime to end on its own.
    pub async fn join(self) -> Result<StatsSnapshot, PipelineError> {
        self.task.await.expect("runtime task panicked")
    }

    pub fn dead_letters(&self) -> Vec<(String, DeadLetterRecord)> {
        self.broker
            .records(ORDERS_DLQ)
            .into_iter()
            .map(|record| {
                let parsed = DeadLetterRecord::from_json_bytes(&record.payload)
                    .expect("dead-letter payload should be JSON");
                (record.key, parsed)
            })
            .collect()
    }

    /// Commits recorded for one main-topic offset.
    pub fn commits_of(&self, delivery: &Delivery) -> usize {
        self.broker
            .commits()
            .iter()
            .filter(|(topic, partition, offset)| {
                topic == &delivery.topic
                    && *partition == delivery.partition
                    && *offset == delivery.offset
            })
            .count()
    }
}

pub async fn publish_order(
    config: &AppConfig,
    broker: &Arc<MemoryBroker>,
    order_id: &str,
    product: &str,
    price: f64,
) -> Delivery {
    let event = OrderEvent::new(order_id, product, price);
    order_gateway(config, broker.clone())
        .publish(event.key(), event.encode().expect("order should encode"))
        .await
        .expect("publish to the memory broker should succeed")
}

/// Poll `check` on a short tick until it holds.
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..20_000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}
