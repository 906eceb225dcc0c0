//! One tenant's sync run.
//!
//! ```text
//! Fetching ──▶ UpsertingCustomers ──▶ UpsertingProducts ──▶ UpsertingOrders ──▶ Complete
//!     │                │                      │                     │
//!     └────────────────┴──────────────────────┴─────────────────────┴──▶ Failed
//! ```
//!
//! The three collections are fetched concurrently, each from the primary
//! source with a single fallback. Upserts then run in dependency order so
//! orders can resolve the customers written before them.

use core::fmt;

use storepulse_core::{CustomerRecord, OrderRecord, ProductRecord, SyncSummary, TenantId};
use tracing::{error, info};

use crate::db::RepositoryError;
use crate::error::SyncError;
use crate::shopify::{StoreDataSource, fetch_with_fallback};
use crate::upsert::UpsertEngine;

/// Where a sync run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    Fetching,
    UpsertingCustomers,
    UpsertingProducts,
    UpsertingOrders,
    Complete,
    Failed,
}

impl SyncState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::UpsertingCustomers => "upserting_customers",
            Self::UpsertingProducts => "upserting_products",
            Self::UpsertingOrders => "upserting_orders",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs fetch-then-upsert for one tenant.
#[derive(Debug, Clone)]
pub struct SyncOrchestrator {
    engine: UpsertEngine,
}

impl SyncOrchestrator {
    #[must_use]
    pub const fn new(engine: UpsertEngine) -> Self {
        Self { engine }
    }

    /// Sync `tenant_id` from `primary`, falling back to `fallback` per entity kind.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Fetch` if both sources fail for any collection, or
    /// `SyncError::Storage` naming the upsert step that failed.
    pub async fn run(
        &self,
        tenant_id: TenantId,
        primary: &dyn StoreDataSource,
        fallback: &dyn StoreDataSource,
    ) -> Result<SyncSummary, SyncError> {
        enter(SyncState::Fetching);
        let fetched = tokio::try_join!(
            fetch_with_fallback::<CustomerRecord>(primary, fallback),
            fetch_with_fallback::<ProductRecord>(primary, fallback),
            fetch_with_fallback::<OrderRecord>(primary, fallback),
        );
        let (customers, products, orders) = fetched.map_err(|e| {
            fail(SyncState::Fetching, &e);
            SyncError::Fetch(e)
        })?;
        info!(
            customers = customers.len(),
            products = products.len(),
            orders = orders.len(),
            "Fetched collections"
        );

        enter(SyncState::UpsertingCustomers);
        let customers_upserted = self
            .engine
            .upsert_customers(tenant_id, &customers)
            .await
            .map_err(|e| storage_failure(SyncState::UpsertingCustomers, e))?;

        enter(SyncState::UpsertingProducts);
        let products_upserted = self
            .engine
            .upsert_products(tenant_id, &products)
            .await
            .map_err(|e| storage_failure(SyncState::UpsertingProducts, e))?;

        enter(SyncState::UpsertingOrders);
        let orders_upserted = self
            .engine
            .upsert_orders(tenant_id, &orders)
            .await
            .map_err(|e| storage_failure(SyncState::UpsertingOrders, e))?;

        let summary = SyncSummary {
            customers_upserted,
            products_upserted,
            orders_upserted,
        };
        info!(state = %SyncState::Complete, summary = %summary, "Sync complete");
        Ok(summary)
    }
}

fn enter(state: SyncState) {
    info!(state = %state, "Sync state");
}

fn fail(during: SyncState, error: &dyn std::error::Error) {
    error!(state = %SyncState::Failed, during = %during, error = %error, "Sync failed");
}

fn storage_failure(state: SyncState, source: RepositoryError) -> SyncError {
    fail(state, &source);
    SyncError::Storage { state, source }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use secrecy::SecretString;
    use storepulse_core::{EntityKind, ExternalId};

    use super::*;
    use crate::db::MemoryStore;
    use crate::shopify::{FetchError, Protocol, ShopifyError};

    fn id(s: &str) -> ExternalId {
        ExternalId::parse(s).unwrap()
    }

    /// Source with fixed collections; `None` makes that collection fail.
    #[derive(Default)]
    struct FakeSource {
        customers: Option<Vec<CustomerRecord>>,
        products: Option<Vec<ProductRecord>>,
        orders: Option<Vec<OrderRecord>>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn healthy() -> Self {
            Self {
                customers: Some(vec![customer("1"), customer("2")]),
                products: Some(vec![]),
                orders: Some(vec![OrderRecord {
                    external_id: id("100"),
                    order_number: Some("1001".to_string()),
                    total_price: Decimal::new(5000, 2),
                    order_date: None,
                    customer_external_id: Some(id("1")),
                    line_items: Some(vec![]),
                }]),
                calls: AtomicUsize::new(0),
            }
        }

        fn respond<T: Clone>(
            &self,
            kind: EntityKind,
            records: Option<&Vec<T>>,
        ) -> Result<Vec<T>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            records.cloned().ok_or(FetchError {
                resource: kind,
                protocol: Protocol::Graphql,
                source: ShopifyError::Server { status: 503 },
            })
        }
    }

    #[async_trait]
    impl StoreDataSource for FakeSource {
        fn protocol(&self) -> Protocol {
            Protocol::Graphql
        }

        async fn fetch_customers(&self) -> Result<Vec<CustomerRecord>, FetchError> {
            self.respond(EntityKind::Customers, self.customers.as_ref())
        }

        async fn fetch_products(&self) -> Result<Vec<ProductRecord>, FetchError> {
            self.respond(EntityKind::Products, self.products.as_ref())
        }

        async fn fetch_orders(&self) -> Result<Vec<OrderRecord>, FetchError> {
            self.respond(EntityKind::Orders, self.orders.as_ref())
        }
    }

    fn customer(external: &str) -> CustomerRecord {
        CustomerRecord {
            external_id: id(external),
            email: None,
            first_name: None,
            last_name: None,
            total_spent: Decimal::ZERO,
        }
    }

    async fn setup() -> (Arc<MemoryStore>, SyncOrchestrator, TenantId) {
        let store = Arc::new(MemoryStore::new());
        let tenant = store
            .add_tenant("acme.myshopify.com", SecretString::from("shpat_test"))
            .await;
        let orchestrator = SyncOrchestrator::new(UpsertEngine::new(store.clone(), 100));
        (store, orchestrator, tenant)
    }

    #[tokio::test]
    async fn test_summary_and_customer_link() {
        let (store, orchestrator, tenant) = setup().await;
        let source = FakeSource::healthy();
        let unused = FakeSource::default();

        let summary = orchestrator.run(tenant, &source, &unused).await.unwrap();

        assert_eq!(summary.customers_upserted, 2);
        assert_eq!(summary.products_upserted, 0);
        assert_eq!(summary.orders_upserted, 1);
        assert_eq!(unused.calls.load(Ordering::SeqCst), 0);

        let order = &store.orders(tenant).await[0];
        assert_eq!(order.customer_id, store.customer_id(tenant, &id("1")).await);
    }

    #[tokio::test]
    async fn test_rerun_is_stable() {
        let (store, orchestrator, tenant) = setup().await;
        let source = FakeSource::healthy();
        let unused = FakeSource::default();

        let first = orchestrator.run(tenant, &source, &unused).await.unwrap();
        let second = orchestrator.run(tenant, &source, &unused).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.customers(tenant).await.len(), 2);
        assert_eq!(store.orders(tenant).await.len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_per_entity_kind() {
        let (_store, orchestrator, tenant) = setup().await;
        let primary = FakeSource {
            orders: None,
            ..FakeSource::healthy()
        };
        let fallback = FakeSource::healthy();

        let summary = orchestrator.run(tenant, &primary, &fallback).await.unwrap();

        assert_eq!(summary.orders_upserted, 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_writes_nothing() {
        let (store, orchestrator, tenant) = setup().await;
        let primary = FakeSource {
            orders: None,
            ..FakeSource::healthy()
        };
        let fallback = FakeSource::default();

        let err = orchestrator.run(tenant, &primary, &fallback).await.unwrap_err();

        assert!(matches!(err, SyncError::Fetch(ref e) if e.resource == EntityKind::Orders));
        assert_eq!(err.state(), Some(SyncState::Fetching));
        assert_eq!(store.upsert_calls(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_names_state() {
        let (store, orchestrator, tenant) = setup().await;
        store.fail_upserts_of(Some(EntityKind::Orders));

        let err = orchestrator
            .run(tenant, &FakeSource::healthy(), &FakeSource::default())
            .await
            .unwrap_err();

        assert_eq!(err.state(), Some(SyncState::UpsertingOrders));
        // Customers committed before the failure stay committed.
        assert_eq!(store.customers(tenant).await.len(), 2);
    }
}
