//! Production order handler.

use async_trait::async_trait;
use orderflow_core::{MessageHandler, ProcessingError};
use orderflow_types::{Envelope, OrderEvent};
use tracing::info;

/// Decodes and checks each order event.
///
/// Deterministic: the same envelope always gives the same result, so every
/// failure here is terminal under the default classification.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderHandler;

impl OrderHandler {
    fn check(envelope: &Envelope, event: &OrderEvent) -> Result<(), ProcessingError> {
        if event.order_id.trim().is_empty() {
            return Err(ProcessingError::malformed("order id is blank"));
        }
        if event.key() != envelope.key {
            return Err(ProcessingError::malformed(format!(
                "record key {} does not match order id {}",
                envelope.key, event.order_id
            )));
        }
        if event.product.trim().is_empty() {
            return Err(ProcessingError::malformed("product is blank"));
        }
        if !event.price.is_finite() || event.price <= 0.0 {
            return Err(ProcessingError::malformed(format!(
                "price must be positive, got {}",
                event.price
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for OrderHandler {
    async fn process(&self, envelope: &Envelope) -> Result<(), ProcessingError> {
        let event = OrderEvent::decode(&envelope.payload)
            .map_err(|e| ProcessingError::deserialization(e.to_string()))?;
        Self::check(envelope, &event)?;

        info!(
            "Processed order {} ({} at {:.2}) from {}",
            event.order_id,
            event.product,
            event.price,
            envelope.position()
        );
        Ok(())
    }
}
