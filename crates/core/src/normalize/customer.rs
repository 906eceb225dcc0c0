//! Customer normalization.

use serde_json::Value;

use crate::types::{CustomerRecord, ExternalId};

use super::fields::{lookup, text_of};
use super::name::{NameSource, derive_name};
use super::{Diagnostic, Normalized, decimal_or_zero};

const EMAIL: &[&[&str]] = &[
    &["email"],
    &["defaultEmailAddress", "emailAddress"],
    &["default_email_address", "email_address"],
];

const TOTAL_SPENT: &[&[&str]] = &[
    &["amountSpent", "amount"],
    &["totalSpent"],
    &["total_spent"],
    &["amount_spent"],
];

/// Normalize a raw customer from either protocol.
///
/// ```
/// use serde_json::json;
/// use storepulse_core::normalize::normalize_customer;
///
/// let raw = json!({"id": "gid://shopify/Customer/1", "displayName": "John Q Public"});
/// let customer = normalize_customer(&raw).record.unwrap();
/// assert_eq!(customer.external_id.as_str(), "1");
/// assert_eq!(customer.first_name.as_deref(), Some("John Q"));
/// assert_eq!(customer.last_name.as_deref(), Some("Public"));
/// ```
pub fn normalize_customer(raw: &Value) -> Normalized<CustomerRecord> {
    let mut diagnostics = Vec::new();

    let Some(external_id) = lookup(raw, &["id"]).and_then(ExternalId::from_json) else {
        diagnostics.push(Diagnostic::MissingId);
        return Normalized::skipped(diagnostics);
    };

    let (first_name, last_name, source) = derive_name(raw);
    if source != NameSource::Explicit {
        diagnostics.push(Diagnostic::NameDerived { source });
    }

    let total_spent = decimal_or_zero(raw, "total_spent", TOTAL_SPENT, &mut diagnostics);

    Normalized {
        record: Some(CustomerRecord {
            external_id,
            email: text_of(raw, EMAIL),
            first_name,
            last_name,
            total_spent,
        }),
        diagnostics,
    }
}
