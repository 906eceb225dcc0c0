//! Order and line item normalization.

use serde_json::Value;

use crate::types::{ExternalId, LineItemRecord, OrderRecord};

use super::fields::{first_of, integer, list_items, lookup, text_of, timestamp};
use super::{Diagnostic, Normalized, decimal_or_zero};

const ORDER_NUMBER: &[&[&str]] = &[&["orderNumber"], &["order_number"]];
const ORDER_NAME: &[&[&str]] = &[&["name"]];
const TOTAL_PRICE: &[&[&str]] = &[
    &["totalPriceSet", "shopMoney", "amount"],
    &["total_price_set", "shop_money", "amount"],
    &["totalPrice"],
    &["total_price"],
];
const ORDER_DATE: &[&[&str]] = &[
    &["processedAt"],
    &["processed_at"],
    &["createdAt"],
    &["created_at"],
];
const CUSTOMER_ID: &[&[&str]] = &[&["customer", "id"], &["customerId"], &["customer_id"]];
const LINE_ITEMS: &[&[&str]] = &[&["lineItems"], &["line_items"]];

const LINE_TITLE: &[&[&str]] = &[&["title"], &["name"]];
const LINE_PRICE: &[&[&str]] = &[
    &["originalUnitPriceSet", "shopMoney", "amount"],
    &["originalUnitPrice"],
    &["price"],
];

/// Normalize a raw order from either protocol.
///
/// Line items are read from `lineItems` (GraphQL connection) or `line_items`
/// (REST array). When neither key is present the record carries
/// `line_items: None` so stored line items are left alone.
pub fn normalize_order(raw: &Value) -> Normalized<OrderRecord> {
    let mut diagnostics = Vec::new();

    let Some(external_id) = lookup(raw, &["id"]).and_then(ExternalId::from_json) else {
        diagnostics.push(Diagnostic::MissingId);
        return Normalized::skipped(diagnostics);
    };

    let order_number = text_of(raw, ORDER_NUMBER).or_else(|| {
        text_of(raw, ORDER_NAME).map(|name| name.trim_start_matches('#').to_owned())
    });

    let total_price = decimal_or_zero(raw, "total_price", TOTAL_PRICE, &mut diagnostics);

    let order_date = first_of(raw, ORDER_DATE).and_then(|value| {
        let parsed = timestamp(value);
        if parsed.is_none() {
            diagnostics.push(Diagnostic::UnparseableDate {
                field: "order_date",
                raw: value.to_string(),
            });
        }
        parsed
    });

    let customer_external_id = first_of(raw, CUSTOMER_ID).and_then(ExternalId::from_json);

    let line_items = first_of(raw, LINE_ITEMS).and_then(list_items).map(|items| {
        items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| {
                let line = normalize_line_item(item, index);
                diagnostics.extend(line.diagnostics);
                line.record
            })
            .collect()
    });

    Normalized {
        record: Some(OrderRecord {
            external_id,
            order_number,
            total_price,
            order_date,
            customer_external_id,
            line_items,
        }),
        diagnostics,
    }
}

/// Normalize one raw line item at `index` within its order.
///
/// Always yields a record: items without an id are keyed by position.
pub fn normalize_line_item(raw: &Value, index: usize) -> Normalized<LineItemRecord> {
    let mut diagnostics = Vec::new();

    let external_id = lookup(raw, &["id"])
        .and_then(ExternalId::from_json)
        .unwrap_or_else(|| {
            diagnostics.push(Diagnostic::PositionalLineItemId { index });
            ExternalId::positional(index)
        });

    let quantity = lookup(raw, &["quantity"]).and_then(integer).unwrap_or_else(|| {
        diagnostics.push(Diagnostic::DefaultedNumber {
            field: "quantity",
            raw: lookup(raw, &["quantity"]).map(ToString::to_string),
        });
        0
    });

    let price = decimal_or_zero(raw, "line_item_price", LINE_PRICE, &mut diagnostics);

    Normalized {
        record: Some(LineItemRecord {
            external_id,
            title: text_of(raw, LINE_TITLE),
            quantity,
            price,
        }),
        diagnostics,
    }
}
