//! Shopify Admin API access for tenant sync.
//!
//! # Architecture
//!
//! - [`GraphqlClient`] is the primary source: one round trip returns orders
//!   with their line items.
//! - [`RestClient`] is the fallback source, walking `Link` header pagination.
//! - Both page through collections with [`paginate`] and wrap every page
//!   request in a [`Retrier`], so throttling and transient failures are
//!   absorbed the same way regardless of protocol.
//! - [`fetch_with_fallback`] tries the primary source and falls back to the
//!   secondary one exactly once per entity kind.
//!
//! Both clients return canonical records; raw payloads never leave this module.

mod graphql;
mod http;
mod pagination;
mod rest;
mod retry;
mod source;

use core::fmt;
use std::time::Duration;

use storepulse_core::EntityKind;
use thiserror::Error;

pub use graphql::GraphqlClient;
pub use pagination::{Page, paginate};
pub use rest::RestClient;
pub use retry::{RecordingSleeper, Retrier, RetryPolicy, Sleeper, TokioSleeper};
pub use source::{Resource, StoreDataSource, fetch_with_fallback};

/// Transport protocol a source speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Graphql,
    Rest,
}

impl Protocol {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Graphql => "graphql",
            Self::Rest => "rest",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur when talking to the Shopify Admin API.
#[derive(Debug, Error)]
pub enum ShopifyError {
    /// HTTP request failed before a response arrived (connect, timeout, body).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// GraphQL query returned errors.
    #[error("GraphQL errors: {}", format_graphql_errors(.0))]
    GraphQL(Vec<GraphQLError>),

    /// Response body was not the JSON we expected.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Response parsed but lacked a required part.
    #[error("Malformed response: {0}")]
    MissingData(String),

    /// Rate limited by Shopify.
    #[error("Throttled{}", format_retry_after(.retry_after))]
    Throttled { retry_after: Option<Duration> },

    /// Access token rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Token is valid but lacks a scope for this resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Shopify returned a 5xx response.
    #[error("Server error: HTTP {status}")]
    Server { status: u16 },

    /// Any other non-success response.
    #[error("Unexpected response: HTTP {status}: {body}")]
    Unexpected { status: u16, body: String },
}

impl ShopifyError {
    /// Whether the retry wrapper may try the request again.
    ///
    /// Auth failures and malformed payloads are final; throttling, server
    /// errors, and transport failures are transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Throttled { .. } | Self::Server { .. } => true,
            Self::Http(e) => !(e.is_decode() || e.is_builder()),
            Self::GraphQL(errors) => errors
                .iter()
                .any(|e| e.code.as_deref() == Some("INTERNAL_SERVER_ERROR")),
            Self::Parse(_)
            | Self::MissingData(_)
            | Self::Unauthorized(_)
            | Self::Forbidden(_)
            | Self::Unexpected { .. } => false,
        }
    }

    /// Server-suggested wait before retrying, if any.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// A GraphQL error returned by the Shopify Admin API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphQLError {
    /// Error message.
    pub message: String,
    /// `extensions.code`, e.g. `THROTTLED` or `ACCESS_DENIED`.
    pub code: Option<String>,
}

fn format_graphql_errors(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(|e| e.message.clone())
        .collect::<Vec<_>>()
        .join("; ")
}

#[allow(clippy::ref_option)]
fn format_retry_after(retry_after: &Option<Duration>) -> String {
    retry_after.map_or_else(String::new, |d| {
        format!(", retry after {:.1} seconds", d.as_secs_f64())
    })
}

/// A collection fetch that failed for good.
#[derive(Debug, Error)]
#[error("Failed to fetch {resource} via {protocol}: {source}")]
pub struct FetchError {
    pub resource: EntityKind,
    pub protocol: Protocol,
    #[source]
    pub source: ShopifyError,
}

/// Both sources failed for the same entity kind.
#[derive(Debug, Error)]
#[error(
    "Failed to fetch {resource}: {} failed ({}); {} failed ({})",
    .primary.protocol, .primary.source, .fallback.protocol, .fallback.source
)]
pub struct FallbackError {
    pub resource: EntityKind,
    pub primary: FetchError,
    #[source]
    pub fallback: FetchError,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_graphql_error_formatting() {
        let err = ShopifyError::GraphQL(vec![
            GraphQLError {
                message: "Field not found".to_string(),
                code: None,
            },
            GraphQLError {
                message: "Throttled".to_string(),
                code: Some("THROTTLED".to_string()),
            },
        ]);
        assert_eq!(err.to_string(), "GraphQL errors: Field not found; Throttled");
    }

    #[test]
    fn test_throttled_display() {
        let err = ShopifyError::Throttled {
            retry_after: Some(Duration::from_millis(1500)),
        };
        assert_eq!(err.to_string(), "Throttled, retry after 1.5 seconds");
        assert_eq!(
            ShopifyError::Throttled { retry_after: None }.to_string(),
            "Throttled"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ShopifyError::Throttled { retry_after: None }.is_retryable());
        assert!(ShopifyError::Server { status: 502 }.is_retryable());
        assert!(!ShopifyError::Unauthorized("bad token".to_string()).is_retryable());
        assert!(!ShopifyError::Forbidden("read_orders".to_string()).is_retryable());
        assert!(!ShopifyError::MissingData("data".to_string()).is_retryable());
    }

    #[test]
    fn test_fallback_error_names_both_protocols() {
        let err = FallbackError {
            resource: EntityKind::Orders,
            primary: FetchError {
                resource: EntityKind::Orders,
                protocol: Protocol::Graphql,
                source: ShopifyError::Server { status: 503 },
            },
            fallback: FetchError {
                resource: EntityKind::Orders,
                protocol: Protocol::Rest,
                source: ShopifyError::Forbidden("read_orders".to_string()),
            },
        };
        let message = err.to_string();
        assert!(message.contains("graphql failed (Server error: HTTP 503)"));
        assert!(message.contains("rest failed (Forbidden: read_orders)"));
    }
}
