use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{info, warn};

use crate::dto::CreateOrderRequest;
use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/health", get(health))
        .with_state(state)
}

/// Validate the order, then publish it keyed by its id.
///
/// Responds only after the broker acknowledged the record, so a 200 means
/// the order is on the log.
pub async fn create_order(
    State(state): State<AppState>,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>, ApiError> {
    let Json(request) = body.map_err(|rejection| {
        warn!("Rejected order body: {}", rejection.body_text());
        ApiError::Validation(rejection.body_text())
    })?;

    let event = request.validate().inspect_err(|e| warn!("Rejected order: {e}"))?;
    let payload = event
        .encode()
        .map_err(|e| ApiError::Encode(e.to_string()))?;

    let delivery = state.gateway.publish(event.key(), payload).await?;
    info!(
        "Order {} accepted at {}/{}@{}",
        event.order_id, delivery.topic, delivery.partition, delivery.offset
    );

    Ok(Json(ApiResponse::success("Order created successfully")))
}

pub async fn health() -> &'static str {
    "OK"
}
