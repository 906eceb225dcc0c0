//! Canonical records.
//!
//! The normalized internal representation of remote entities, independent of
//! which transport protocol produced them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ExternalId;

/// A customer of the connected store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub external_id: ExternalId,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Lifetime spend, `0` when the source omits it.
    pub total_spent: Decimal,
}

/// A product of the connected store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub external_id: ExternalId,
    pub title: Option<String>,
    pub vendor: Option<String>,
    pub product_type: Option<String>,
    /// Price of the first variant, `0` when the source omits it.
    pub price: Decimal,
}

/// An order of the connected store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub external_id: ExternalId,
    pub order_number: Option<String>,
    pub total_price: Decimal,
    pub order_date: Option<DateTime<Utc>>,
    /// Remote id of the ordering customer. Guest orders carry `None`.
    pub customer_external_id: Option<ExternalId>,
    /// Line items as supplied by the source.
    ///
    /// `None` means the source did not include line items at all, which leaves
    /// stored line items untouched. `Some` (even when empty) replaces them.
    pub line_items: Option<Vec<LineItemRecord>>,
}

/// A line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemRecord {
    pub external_id: ExternalId,
    pub title: Option<String>,
    pub quantity: i32,
    pub price: Decimal,
}

/// Anything keyed by `(tenant_id, external_id)`.
pub trait Keyed {
    fn external_id(&self) -> &ExternalId;
}

impl Keyed for CustomerRecord {
    fn external_id(&self) -> &ExternalId {
        &self.external_id
    }
}

impl Keyed for ProductRecord {
    fn external_id(&self) -> &ExternalId {
        &self.external_id
    }
}

impl Keyed for OrderRecord {
    fn external_id(&self) -> &ExternalId {
        &self.external_id
    }
}

impl Keyed for LineItemRecord {
    fn external_id(&self) -> &ExternalId {
        &self.external_id
    }
}
