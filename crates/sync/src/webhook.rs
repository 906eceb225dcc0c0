//! Single-record push events.
//!
//! Shopify delivers REST-shaped payloads per topic. Signature checking happens
//! before anything reaches this module. Events go through the same normalizer
//! and upsert engine as a full sync, as a batch of one.

use core::fmt;
use std::str::FromStr;

use serde_json::Value;
use storepulse_core::normalize::{normalize_customer, normalize_order, normalize_product};
use storepulse_core::{CustomerRecord, EntityKind, OrderRecord, ProductRecord, TenantId};
use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur while applying a webhook event.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("unsupported webhook topic: {0}")]
    UnknownTopic(String),

    /// The payload had no usable id, so it cannot be keyed.
    #[error("{0} payload has no usable id")]
    MissingId(WebhookTopic),

    #[error("tenant {0} not found")]
    TenantNotFound(TenantId),

    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),
}

/// Webhook topics that carry a syncable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookTopic {
    CustomersCreate,
    CustomersUpdate,
    OrdersCreate,
    OrdersUpdated,
    OrdersPaid,
    ProductsCreate,
    ProductsUpdate,
}

impl WebhookTopic {
    /// Topic string as sent in `X-Shopify-Topic`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CustomersCreate => "customers/create",
            Self::CustomersUpdate => "customers/update",
            Self::OrdersCreate => "orders/create",
            Self::OrdersUpdated => "orders/updated",
            Self::OrdersPaid => "orders/paid",
            Self::ProductsCreate => "products/create",
            Self::ProductsUpdate => "products/update",
        }
    }

    /// Entity kind the payload describes.
    #[must_use]
    pub const fn entity(self) -> EntityKind {
        match self {
            Self::CustomersCreate | Self::CustomersUpdate => EntityKind::Customers,
            Self::OrdersCreate | Self::OrdersUpdated | Self::OrdersPaid => EntityKind::Orders,
            Self::ProductsCreate | Self::ProductsUpdate => EntityKind::Products,
        }
    }
}

impl fmt::Display for WebhookTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookTopic {
    type Err = WebhookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "customers/create" => Ok(Self::CustomersCreate),
            "customers/update" => Ok(Self::CustomersUpdate),
            "orders/create" => Ok(Self::OrdersCreate),
            "orders/updated" => Ok(Self::OrdersUpdated),
            "orders/paid" => Ok(Self::OrdersPaid),
            "products/create" => Ok(Self::ProductsCreate),
            "products/update" => Ok(Self::ProductsUpdate),
            other => Err(WebhookError::UnknownTopic(other.to_string())),
        }
    }
}

/// A normalized webhook record, ready for the upsert engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookRecord {
    Customer(CustomerRecord),
    Product(ProductRecord),
    Order(OrderRecord),
}

impl WebhookRecord {
    /// Normalize the payload of `topic`.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::MissingId` if the payload cannot be keyed.
    pub fn from_payload(topic: WebhookTopic, payload: &Value) -> Result<Self, WebhookError> {
        let record = match topic.entity() {
            EntityKind::Customers => normalize_customer(payload).record.map(Self::Customer),
            EntityKind::Products => normalize_product(payload).record.map(Self::Product),
            EntityKind::Orders => normalize_order(payload).record.map(Self::Order),
        };
        record.ok_or(WebhookError::MissingId(topic))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_topics() {
        assert_eq!(
            "orders/paid".parse::<WebhookTopic>().unwrap(),
            WebhookTopic::OrdersPaid
        );
        assert_eq!(
            "customers/update".parse::<WebhookTopic>().unwrap().entity(),
            EntityKind::Customers
        );
        assert!(matches!(
            "app/uninstalled".parse::<WebhookTopic>(),
            Err(WebhookError::UnknownTopic(t)) if t == "app/uninstalled"
        ));
    }

    #[test]
    fn test_topic_round_trips_display() {
        for topic in [
            WebhookTopic::CustomersCreate,
            WebhookTopic::OrdersUpdated,
            WebhookTopic::ProductsUpdate,
        ] {
            assert_eq!(topic.to_string().parse::<WebhookTopic>().unwrap(), topic);
        }
    }

    #[test]
    fn test_order_payload() {
        let payload = json!({
            "id": 820_982_911_946_154_508_u64,
            "name": "#9999",
            "total_price": "403.00",
            "customer": {"id": 115_310_627_314_723_954_u64},
            "line_items": [{"id": 1, "title": "IPod Nano", "quantity": 1, "price": "199.00"}],
        });

        let record = WebhookRecord::from_payload(WebhookTopic::OrdersCreate, &payload).unwrap();

        let WebhookRecord::Order(order) = record else {
            panic!("expected an order");
        };
        assert_eq!(order.external_id.as_str(), "820982911946154508");
        assert_eq!(order.line_items.unwrap().len(), 1);
    }

    #[test]
    fn test_payload_without_id() {
        let err = WebhookRecord::from_payload(WebhookTopic::ProductsCreate, &json!({"title": "x"}))
            .unwrap_err();
        assert!(matches!(err, WebhookError::MissingId(WebhookTopic::ProductsCreate)));
    }
}
