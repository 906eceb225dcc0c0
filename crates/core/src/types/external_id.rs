//! Remote platform identifiers.

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier assigned by the remote platform.
///
/// Stable across syncs and independent of which protocol returned it. GraphQL
/// global ids (`gid://shopify/Customer/123`) and REST numeric ids (`123`) for
/// the same entity canonicalize to the same value, so an upsert keyed on
/// `(tenant_id, external_id)` stays idempotent when the sync falls back from
/// one protocol to the other.
///
/// ```
/// use storepulse_core::ExternalId;
///
/// let from_gid = ExternalId::parse("gid://shopify/Order/100").unwrap();
/// let from_rest = ExternalId::parse("100").unwrap();
/// assert_eq!(from_gid, from_rest);
/// assert!(ExternalId::parse("   ").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    const GID_SCHEME: &'static str = "gid://";

    /// Canonicalize a raw identifier string.
    ///
    /// Returns `None` for blank input.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let canonical = raw.strip_prefix(Self::GID_SCHEME).map_or(raw, |rest| {
            let rest = rest.split('?').next().unwrap_or(rest);
            rest.rsplit('/').next().unwrap_or(rest)
        });

        if canonical.is_empty() {
            None
        } else {
            Some(Self(canonical.to_owned()))
        }
    }

    /// Synthetic id for an unidentified child record, keyed by its position.
    #[must_use]
    pub fn positional(index: usize) -> Self {
        Self(format!("line-{index}"))
    }

    /// Canonicalize an identifier from a JSON value (string or integer).
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Self::parse(s),
            Value::Number(n) => Self::parse(&n.to_string()),
            _ => None,
        }
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `ExternalId` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ExternalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_gid() {
        let id = ExternalId::parse("gid://shopify/Customer/123").unwrap();
        assert_eq!(id.as_str(), "123");
    }

    #[test]
    fn test_parse_gid_with_query() {
        let id = ExternalId::parse("gid://shopify/LineItem/55?variant=1").unwrap();
        assert_eq!(id.as_str(), "55");
    }

    #[test]
    fn test_parse_plain() {
        assert_eq!(ExternalId::parse(" 9 ").unwrap().as_str(), "9");
        assert!(ExternalId::parse("").is_none());
        assert!(ExternalId::parse("gid://").is_none());
    }

    #[test]
    fn test_from_json() {
        assert_eq!(ExternalId::from_json(&json!(100)).unwrap().as_str(), "100");
        assert_eq!(
            ExternalId::from_json(&json!("gid://shopify/Product/7")).unwrap().as_str(),
            "7"
        );
        assert!(ExternalId::from_json(&json!(null)).is_none());
        assert!(ExternalId::from_json(&json!({"id": 1})).is_none());
    }
}
