//! Protocol-independent store data access and the fallback strategy.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use storepulse_core::normalize::{Normalized, normalize_all};
use storepulse_core::{CustomerRecord, EntityKind, OrderRecord, ProductRecord};
use tracing::{debug, warn};

use super::{FallbackError, FetchError, Protocol};

/// Fetches a tenant's collections as canonical records.
#[async_trait]
pub trait StoreDataSource: Send + Sync {
    fn protocol(&self) -> Protocol;

    async fn fetch_customers(&self) -> Result<Vec<CustomerRecord>, FetchError>;

    async fn fetch_products(&self) -> Result<Vec<ProductRecord>, FetchError>;

    async fn fetch_orders(&self) -> Result<Vec<OrderRecord>, FetchError>;
}

/// A record type fetched as a whole collection from a [`StoreDataSource`].
pub trait Resource: Sized + Send {
    const KIND: EntityKind;

    fn fetch(source: &dyn StoreDataSource) -> BoxFuture<'_, Result<Vec<Self>, FetchError>>;
}

impl Resource for CustomerRecord {
    const KIND: EntityKind = EntityKind::Customers;

    fn fetch(source: &dyn StoreDataSource) -> BoxFuture<'_, Result<Vec<Self>, FetchError>> {
        source.fetch_customers()
    }
}

impl Resource for ProductRecord {
    const KIND: EntityKind = EntityKind::Products;

    fn fetch(source: &dyn StoreDataSource) -> BoxFuture<'_, Result<Vec<Self>, FetchError>> {
        source.fetch_products()
    }
}

impl Resource for OrderRecord {
    const KIND: EntityKind = EntityKind::Orders;

    fn fetch(source: &dyn StoreDataSource) -> BoxFuture<'_, Result<Vec<Self>, FetchError>> {
        source.fetch_orders()
    }
}

/// Fetch one collection from `primary`, falling back to `fallback` once.
///
/// # Errors
///
/// Returns a `FallbackError` carrying both causes when both sources fail.
pub async fn fetch_with_fallback<R: Resource>(
    primary: &dyn StoreDataSource,
    fallback: &dyn StoreDataSource,
) -> Result<Vec<R>, FallbackError> {
    let primary_error = match R::fetch(primary).await {
        Ok(records) => return Ok(records),
        Err(e) => e,
    };

    warn!(
        resource = %R::KIND,
        primary = %primary.protocol(),
        fallback = %fallback.protocol(),
        error = %primary_error,
        "Primary source failed, falling back"
    );

    R::fetch(fallback).await.map_err(|fallback_error| FallbackError {
        resource: R::KIND,
        primary: primary_error,
        fallback: fallback_error,
    })
}

/// Normalize a fetched collection, logging what the normalizer absorbed.
pub(super) fn normalize_collection<T>(
    resource: EntityKind,
    protocol: Protocol,
    raws: &[Value],
    normalize: fn(&Value) -> Normalized<T>,
) -> Vec<T> {
    let batch = normalize_all(raws, normalize);

    for (index, diagnostic) in &batch.diagnostics {
        debug!(%resource, %protocol, index, ?diagnostic, "Normalizer fallback");
    }
    if batch.skipped > 0 {
        warn!(
            %resource,
            %protocol,
            skipped = batch.skipped,
            "Skipped records without a usable id"
        );
    }

    batch.records
}
