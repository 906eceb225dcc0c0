//! Tenant-scoped storage for synced data.
//!
//! ## Tables
//!
//! - `tenants` - Connected stores, their access tokens, and sync bookkeeping
//! - `customers`, `products`, `orders` - Keyed by `(tenant_id, external_id)`
//! - `order_line_items` - Keyed by `(order_id, external_id)`
//!
//! # Migrations
//!
//! Migrations are stored in `crates/sync/migrations/` and run via:
//! ```bash
//! cargo run -p storepulse-cli -- migrate
//! ```
//!
//! # Backends
//!
//! [`PgSyncStore`] is the production backend. [`MemoryStore`] keeps the same
//! semantics in process for tests and dry runs.

pub mod memory;
mod postgres;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use storepulse_core::{
    CustomerId, CustomerRecord, ExternalId, OrderRecord, ProductRecord, TenantId,
};
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PgSyncStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// The backend refused the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// A connected store.
///
/// Implements `Debug` manually to redact the access token.
#[derive(Clone)]
pub struct Tenant {
    pub id: TenantId,
    /// Shop domain (e.g., acme.myshopify.com).
    pub shop_domain: String,
    /// Admin API access token (redacted in debug output).
    pub access_token: SecretString,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tenant")
            .field("id", &self.id)
            .field("shop_domain", &self.shop_domain)
            .field("access_token", &"[REDACTED]")
            .field("last_synced_at", &self.last_synced_at)
            .finish()
    }
}

/// An order ready to write, with its customer reference already resolved.
#[derive(Debug, Clone, Copy)]
pub struct OrderWrite<'a> {
    pub record: &'a OrderRecord,
    /// `None` for guest orders and unresolved references.
    pub customer_id: Option<CustomerId>,
}

/// Storage operations the sync pipeline needs.
///
/// Every upsert is one atomic round trip keyed on `(tenant_id, external_id)`.
/// Callers pass batches without duplicate external ids.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Load a tenant.
    async fn get_tenant(&self, id: TenantId) -> Result<Option<Tenant>, RepositoryError>;

    /// Ids of every tenant, ascending.
    async fn list_tenant_ids(&self) -> Result<Vec<TenantId>, RepositoryError>;

    /// Take the tenant's sync lease unless another run holds a fresh one.
    ///
    /// Returns the claim time, which identifies this lease, or `None` if a
    /// lease younger than `ttl` exists.
    async fn claim_sync(
        &self,
        id: TenantId,
        ttl: Duration,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError>;

    /// Drop the tenant's sync lease if it is still the one claimed at
    /// `claimed_at`.
    ///
    /// Returns `false` if another run has taken the lease over since.
    async fn release_sync(
        &self,
        id: TenantId,
        claimed_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Stamp the end of a successful sync.
    async fn record_sync_completed(
        &self,
        id: TenantId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn upsert_customers(
        &self,
        tenant_id: TenantId,
        customers: &[CustomerRecord],
    ) -> Result<(), RepositoryError>;

    async fn upsert_products(
        &self,
        tenant_id: TenantId,
        products: &[ProductRecord],
    ) -> Result<(), RepositoryError>;

    /// Map remote customer ids to stored customers of the same tenant.
    ///
    /// Ids with no stored customer are absent from the result.
    async fn resolve_customer_ids(
        &self,
        tenant_id: TenantId,
        external_ids: &[ExternalId],
    ) -> Result<HashMap<ExternalId, CustomerId>, RepositoryError>;

    /// Upsert orders and, in the same transaction, replace the line items of
    /// every order whose record carries a line item list.
    async fn upsert_orders(
        &self,
        tenant_id: TenantId,
        orders: &[OrderWrite<'_>],
    ) -> Result<(), RepositoryError>;
}
