//! Customer name derivation.

use serde::Serialize;
use serde_json::Value;

use super::fields::{lookup, text_of};

/// Where a derived name came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameSource {
    /// Top-level first/last name fields.
    Explicit,
    /// First/last name of the default address.
    DefaultAddress,
    /// Split of a combined display name.
    DisplayName,
    /// Nothing usable was present.
    Absent,
}

const FIRST_NAME: &[&[&str]] = &[&["firstName"], &["first_name"]];
const LAST_NAME: &[&[&str]] = &[&["lastName"], &["last_name"]];
const DISPLAY_NAME: &[&[&str]] = &[&["displayName"], &["display_name"]];
const DEFAULT_ADDRESS: &[&str] = &["defaultAddress", "default_address"];

/// Derive `(first_name, last_name)` for a raw customer.
///
/// First match wins:
/// 1. explicit first/last-name fields,
/// 2. first/last from the default address,
/// 3. the display name, where a single token is the first name and otherwise
///    the last token is the last name and the rest is the first name.
pub fn derive_name(raw: &Value) -> (Option<String>, Option<String>, NameSource) {
    if let Some((first, last)) = name_pair(raw) {
        return (first, last, NameSource::Explicit);
    }

    let address = DEFAULT_ADDRESS.iter().find_map(|key| lookup(raw, &[*key]));
    if let Some((first, last)) = address.and_then(name_pair) {
        return (first, last, NameSource::DefaultAddress);
    }

    if let Some(display) = text_of(raw, DISPLAY_NAME) {
        let (first, last) = split_display_name(&display);
        return (first, last, NameSource::DisplayName);
    }

    (None, None, NameSource::Absent)
}

fn name_pair(raw: &Value) -> Option<(Option<String>, Option<String>)> {
    let first = text_of(raw, FIRST_NAME);
    let last = text_of(raw, LAST_NAME);
    (first.is_some() || last.is_some()).then_some((first, last))
}

fn split_display_name(display: &str) -> (Option<String>, Option<String>) {
    let mut tokens: Vec<&str> = display.split_whitespace().collect();
    match tokens.len() {
        0 => (None, None),
        1 => (tokens.pop().map(str::to_owned), None),
        _ => {
            let last = tokens.pop().map(str::to_owned);
            (Some(tokens.join(" ")), last)
        }
    }
}
