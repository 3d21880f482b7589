//! Inbound HTTP API.
//!
//! `POST /orders` validates an order and publishes it through the
//! producer gateway. Invalid requests are answered with 400 and never
//! reach the broker.

use std::io;

use orderflow_core::ProducerGateway;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod dto;
pub mod error;
pub mod response;
pub mod routes;

pub use dto::CreateOrderRequest;
pub use error::ApiError;
pub use response::ApiResponse;
pub use routes::router;

/// Shared state of the request handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: ProducerGateway,
}

impl AppState {
    pub fn new(gateway: ProducerGateway) -> Self {
        Self { gateway }
    }
}

/// Serve the API on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> io::Result<()> {
    info!("Order API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
