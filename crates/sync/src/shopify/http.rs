//! Response status handling shared by both protocol clients.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Response, StatusCode};

use super::ShopifyError;

/// Header Shopify reads the per-tenant access token from.
pub const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

/// Pass a successful response through, or map its status to an error.
pub async fn check_status(response: Response) -> Result<Response, ShopifyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(ShopifyError::Throttled {
            retry_after: retry_after(response.headers()),
        }),
        StatusCode::UNAUTHORIZED => Err(ShopifyError::Unauthorized(
            "Invalid or expired access token".to_string(),
        )),
        StatusCode::FORBIDDEN => {
            let body = response.text().await.unwrap_or_default();
            Err(ShopifyError::Forbidden(forbidden_detail(&body)))
        }
        s if s.is_server_error() => Err(ShopifyError::Server { status: s.as_u16() }),
        s => Err(ShopifyError::Unexpected {
            status: s.as_u16(),
            body: response.text().await.unwrap_or_default(),
        }),
    }
}

/// `Retry-After` in seconds. Shopify sends fractional values (`2.0`).
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// Shopify 403 bodies look like `{"errors": "[API] This action requires merchant approval for read_orders scope."}`.
fn forbidden_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("errors").map(ToString::to_string))
        .map(|s| s.trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Access denied for this resource".to_string())
}
