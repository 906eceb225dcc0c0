//! Record normalization.
//!
//! Pure functions mapping raw remote records (GraphQL or REST JSON) into the
//! canonical records in [`crate::types`]. Nothing here fails: missing or
//! malformed optional data degrades to `None`/`0` and is reported as a
//! [`Diagnostic`] next to the record. A record without a usable id cannot be
//! keyed and is dropped, also with a diagnostic.

mod customer;
pub mod fields;
mod name;
mod order;
mod product;

use serde::Serialize;
use serde_json::Value;

pub use customer::normalize_customer;
pub use name::{NameSource, derive_name};
pub use order::{normalize_line_item, normalize_order};
pub use product::normalize_product;

/// Structured note about a fallback taken while normalizing one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The record had no id and was skipped.
    MissingId,
    /// A numeric field was absent or unparseable and defaulted to zero.
    DefaultedNumber {
        field: &'static str,
        raw: Option<String>,
    },
    /// A timestamp was present but not RFC 3339.
    UnparseableDate { field: &'static str, raw: String },
    /// Customer name came from somewhere other than explicit name fields.
    NameDerived { source: NameSource },
    /// A line item had no id and was keyed by its position.
    PositionalLineItemId { index: usize },
}

/// A normalized record with the diagnostics produced along the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized<T> {
    /// `None` when the raw record could not be keyed.
    pub record: Option<T>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Normalized<T> {
    pub(crate) const fn skipped(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            record: None,
            diagnostics,
        }
    }
}

/// Normalized records of a whole page or collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedBatch<T> {
    pub records: Vec<T>,
    /// Number of raw records dropped for lack of an id.
    pub skipped: usize,
    /// Diagnostics paired with the index of the raw record that produced them.
    pub diagnostics: Vec<(usize, Diagnostic)>,
}

impl<T> Default for NormalizedBatch<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: 0,
            diagnostics: Vec::new(),
        }
    }
}

/// Normalize every raw record with `f`, collecting records and diagnostics.
pub fn normalize_all<'a, T, I, F>(raws: I, f: F) -> NormalizedBatch<T>
where
    I: IntoIterator<Item = &'a Value>,
    F: Fn(&Value) -> Normalized<T>,
{
    raws.into_iter()
        .enumerate()
        .fold(NormalizedBatch::default(), |mut batch, (index, raw)| {
            let normalized = f(raw);
            match normalized.record {
                Some(record) => batch.records.push(record),
                None => batch.skipped += 1,
            }
            batch
                .diagnostics
                .extend(normalized.diagnostics.into_iter().map(|d| (index, d)));
            batch
        })
}

/// Decimal field with the zero fallback, recording a diagnostic when taken.
pub(crate) fn decimal_or_zero(
    raw: &Value,
    field: &'static str,
    paths: &[&[&str]],
    diagnostics: &mut Vec<Diagnostic>,
) -> rust_decimal::Decimal {
    let value = fields::first_of(raw, paths);
    value.and_then(fields::decimal).unwrap_or_else(|| {
        diagnostics.push(Diagnostic::DefaultedNumber {
            field,
            raw: value.map(ToString::to_string),
        });
        rust_decimal::Decimal::ZERO
    })
}
