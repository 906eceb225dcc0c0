//! Product normalization.

use rust_decimal::Decimal;
use serde_json::Value;

use crate::types::{ExternalId, ProductRecord};

use super::fields::{decimal, first_of, list_items, lookup, text_of};
use super::{Diagnostic, Normalized};

const PRODUCT_TYPE: &[&[&str]] = &[&["productType"], &["product_type"]];
const PRICE_RANGE: &[&[&str]] = &[
    &["priceRangeV2", "minVariantPrice", "amount"],
    &["priceRange", "minVariantPrice", "amount"],
    &["price"],
];

/// Normalize a raw product from either protocol.
///
/// The price is the first variant's price, falling back to the minimum
/// variant price of the price range, then to `0`.
pub fn normalize_product(raw: &Value) -> Normalized<ProductRecord> {
    let mut diagnostics = Vec::new();

    let Some(external_id) = lookup(raw, &["id"]).and_then(ExternalId::from_json) else {
        diagnostics.push(Diagnostic::MissingId);
        return Normalized::skipped(diagnostics);
    };

    let first_variant_price = lookup(raw, &["variants"])
        .and_then(list_items)
        .and_then(|variants| variants.first().copied())
        .and_then(|variant| lookup(variant, &["price"]));

    let price_value = first_variant_price.or_else(|| first_of(raw, PRICE_RANGE));
    let price = price_value.and_then(decimal).unwrap_or_else(|| {
        diagnostics.push(Diagnostic::DefaultedNumber {
            field: "price",
            raw: price_value.map(ToString::to_string),
        });
        Decimal::ZERO
    });

    Normalized {
        record: Some(ProductRecord {
            external_id,
            title: text_of(raw, &[&["title"]]),
            vendor: text_of(raw, &[&["vendor"]]),
            product_type: text_of(raw, PRODUCT_TYPE),
            price,
        }),
        diagnostics,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_graphql_product_variant_nodes() {
        let raw = json!({
            "id": "gid://shopify/Product/10",
            "title": "Cedar Tee",
            "vendor": "Acme",
            "productType": "Shirts",
            "variants": {"nodes": [{"price": "25.00"}, {"price": "30.00"}]},
        });

        let product = normalize_product(&raw).record.unwrap();

        assert_eq!(product.external_id.as_str(), "10");
        assert_eq!(product.product_type.as_deref(), Some("Shirts"));
        assert_eq!(product.price, dec("25.00"));
    }

    #[test]
    fn test_rest_product() {
        let raw = json!({
            "id": 10,
            "title": "Cedar Tee",
            "vendor": "",
            "product_type": "Shirts",
            "variants": [{"id": 1, "price": "19.99"}],
        });

        let product = normalize_product(&raw).record.unwrap();

        assert_eq!(product.vendor, None);
        assert_eq!(product.price, dec("19.99"));
    }

    #[test]
    fn test_price_range_fallback() {
        let raw = json!({
            "id": 1,
            "variants": {"nodes": []},
            "priceRangeV2": {"minVariantPrice": {"amount": "5.5"}},
        });
        assert_eq!(normalize_product(&raw).record.unwrap().price, dec("5.5"));
    }

    #[test]
    fn test_missing_price_defaults_to_zero() {
        let normalized = normalize_product(&json!({"id": 1, "title": "Free"}));
        assert_eq!(normalized.record.unwrap().price, Decimal::ZERO);
        assert_eq!(
            normalized.diagnostics,
            vec![Diagnostic::DefaultedNumber {
                field: "price",
                raw: None
            }]
        );
    }
}
