use orderflow_types::OrderEvent;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Body of `POST /orders`.
///
/// Every field is optional at the JSON level so that a missing field is
/// reported by [`CreateOrderRequest::validate`] with its own message
/// instead of a generic parse failure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub order_id: Option<String>,
    pub product: Option<String>,
    pub price: Option<f64>,
}

impl CreateOrderRequest {
    /// Check the request and turn it into the event to publish.
    pub fn validate(self) -> Result<OrderEvent, ApiError> {
        let order_id = match self.order_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => return Err(ApiError::Validation("orderId is mandatory".to_string())),
        };
        let product = match self.product {
            Some(product) if !product.trim().is_empty() => product,
            _ => return Err(ApiError::Validation("product is mandatory".to_string())),
        };
        let price = self
            .price
            .ok_or_else(|| ApiError::Validation("price is mandatory".to_string()))?;
        if !price.is_finite() || price <= 0.0 {
            return Err(ApiError::Validation("price must be positive".to_string()));
        }
        Ok(OrderEvent::new(order_id, product, price))
    }
}
