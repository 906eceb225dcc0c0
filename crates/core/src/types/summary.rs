//! Entity kinds and sync results.

use core::fmt;

use serde::{Deserialize, Serialize};

/// The remote collections a tenant sync pulls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Customers,
    Products,
    Orders,
}

impl EntityKind {
    /// Collection name as used in REST paths and log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customers => "customers",
            Self::Products => "products",
            Self::Orders => "orders",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a completed tenant sync.
///
/// Counts are records processed, not necessarily records changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub customers_upserted: usize,
    pub products_upserted: usize,
    pub orders_upserted: usize,
}

impl SyncSummary {
    /// Total records processed across all entity kinds.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.customers_upserted + self.products_upserted + self.orders_upserted
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} customers, {} products, {} orders",
            self.customers_upserted, self.products_upserted, self.orders_upserted
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_serializes_snake_case() {
        let summary = SyncSummary {
            customers_upserted: 2,
            products_upserted: 0,
            orders_upserted: 1,
        };
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["customers_upserted"], 2);
        assert_eq!(json["orders_upserted"], 1);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.to_string(), "2 customers, 0 products, 1 orders");
    }

    #[test]
    fn test_entity_kind_display() {
        assert_eq!(EntityKind::Orders.to_string(), "orders");
    }
}
