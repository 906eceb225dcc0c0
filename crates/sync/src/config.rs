//! Sync configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string (not needed for dry runs)
//!
//! ## Optional
//! - `SHOPIFY_API_VERSION` - Admin API version (default: 2025-01)
//! - `SHOPIFY_BASE_URL` - Override `https://{shop}` for every tenant (testing only)
//! - `SYNC_PAGE_SIZE` - Records per page request, 1-250 (default: 250)
//! - `SYNC_BATCH_SIZE` - Records per upsert batch (default: 100)
//! - `SYNC_MAX_RETRIES` - Retries per page request after the first attempt (default: 3)
//! - `SYNC_DEFAULT_RETRY_SECS` - Wait when the server suggests none (default: 2)
//! - `SYNC_MAX_RETRY_WAIT_SECS` - Ceiling on a server-suggested wait (default: 60)
//! - `SYNC_RETRY_BUFFER_MS` - Added to every wait (default: 500)
//! - `SYNC_HTTP_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `SYNC_LOCK_TTL_SECS` - Age after which a sync lease counts as stale (default: 3600)
//! - `SYNC_STAGGER_MS` - Delay between tenant starts in `sync-all` (default: 2000)

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use crate::shopify::RetryPolicy;

/// Highest page size the Admin API accepts.
pub const MAX_PAGE_SIZE: u32 = 250;
const DEFAULT_API_VERSION: &str = "2025-01";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Sync pipeline configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: Option<SecretString>,
    /// Shopify API settings shared by both protocol clients
    pub shopify: ShopifyApiConfig,
    /// Retry behavior for every page request
    pub retry: RetryPolicy,
    /// Records per upsert batch
    pub batch_size: usize,
    /// Age after which another run's sync lease may be taken over
    pub lock_ttl: Duration,
    /// Delay between tenant starts when syncing every tenant
    pub stagger: Duration,
}

/// Shopify Admin API settings.
#[derive(Debug, Clone)]
pub struct ShopifyApiConfig {
    /// Admin API version (e.g., 2025-01)
    pub api_version: String,
    /// Records per page request
    pub page_size: u32,
    /// Per-request timeout
    pub http_timeout: Duration,
    /// Replaces `https://{shop}` when set
    pub base_url: Option<String>,
}

impl Default for ShopifyApiConfig {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            page_size: MAX_PAGE_SIZE,
            http_timeout: Duration::from_secs(30),
            base_url: None,
        }
    }
}

impl ShopifyApiConfig {
    /// Origin for a shop's Admin API, honoring the base URL override.
    #[must_use]
    pub fn origin(&self, shop_domain: &str) -> String {
        self.base_url.as_ref().map_or_else(
            || format!("https://{shop_domain}"),
            |base| base.trim_end_matches('/').to_string(),
        )
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            shopify: ShopifyApiConfig::default(),
            retry: RetryPolicy::default(),
            batch_size: 100,
            lock_ttl: Duration::from_secs(3600),
            stagger: Duration::from_millis(2000),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if a variable is set but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if a variable is set but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let page_size: u32 = parse_or(&lookup, "SYNC_PAGE_SIZE", defaults.shopify.page_size)?;
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(ConfigError::InvalidEnvVar(
                "SYNC_PAGE_SIZE".to_string(),
                format!("must be between 1 and {MAX_PAGE_SIZE}"),
            ));
        }

        let batch_size: usize = parse_or(&lookup, "SYNC_BATCH_SIZE", defaults.batch_size)?;
        if batch_size == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "SYNC_BATCH_SIZE".to_string(),
                "must be greater than 0".to_string(),
            ));
        }

        let shopify = ShopifyApiConfig {
            api_version: lookup("SHOPIFY_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            page_size,
            http_timeout: Duration::from_secs(parse_or(&lookup, "SYNC_HTTP_TIMEOUT_SECS", 30)?),
            base_url: lookup("SHOPIFY_BASE_URL").filter(|s| !s.trim().is_empty()),
        };

        let retry = RetryPolicy {
            max_retries: parse_or(&lookup, "SYNC_MAX_RETRIES", defaults.retry.max_retries)?,
            default_wait: Duration::from_secs(parse_or(&lookup, "SYNC_DEFAULT_RETRY_SECS", 2)?),
            max_wait: Duration::from_secs(parse_or(&lookup, "SYNC_MAX_RETRY_WAIT_SECS", 60)?),
            buffer: Duration::from_millis(parse_or(&lookup, "SYNC_RETRY_BUFFER_MS", 500)?),
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").map(SecretString::from),
            shopify,
            retry,
            batch_size,
            lock_ttl: Duration::from_secs(parse_or(&lookup, "SYNC_LOCK_TTL_SECS", 3600)?),
            stagger: Duration::from_millis(parse_or(&lookup, "SYNC_STAGGER_MS", 2000)?),
        })
    }

    /// The database URL, required for anything but a dry run.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `DATABASE_URL` was not set.
    pub fn require_database_url(&self) -> Result<&SecretString, ConfigError> {
        self.database_url
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))
    }
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}
