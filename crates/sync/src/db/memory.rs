//! In-process [`SyncStore`] for tests and dry runs.
//!
//! Mirrors the `PostgreSQL` backend: rows keyed by `(tenant_id, external_id)`,
//! last write wins per field, line items replaced per order.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use secrecy::SecretString;
use storepulse_core::{
    CustomerId, CustomerRecord, EntityKind, ExternalId, LineItemRecord, OrderId, ProductId,
    ProductRecord, TenantId,
};
use tokio::sync::RwLock;

use super::{OrderWrite, RepositoryError, SyncStore, Tenant};

/// A stored order as the pipeline last wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOrder {
    pub id: OrderId,
    pub external_id: ExternalId,
    pub order_number: Option<String>,
    pub total_price: rust_decimal::Decimal,
    pub order_date: Option<DateTime<Utc>>,
    pub customer_id: Option<CustomerId>,
}

#[derive(Debug)]
struct TenantEntry {
    tenant: Tenant,
    sync_claimed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    tenants: BTreeMap<TenantId, TenantEntry>,
    customers: HashMap<(TenantId, ExternalId), (CustomerId, CustomerRecord)>,
    products: HashMap<(TenantId, ExternalId), (ProductId, ProductRecord)>,
    orders: HashMap<(TenantId, ExternalId), StoredOrder>,
    line_items: HashMap<OrderId, Vec<LineItemRecord>>,
}

impl State {
    const fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory [`SyncStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    upsert_calls: AtomicUsize,
    fail_upserts_of: std::sync::Mutex<Option<EntityKind>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tenant and return its id.
    pub async fn add_tenant(&self, shop_domain: &str, access_token: SecretString) -> TenantId {
        let mut state = self.state.write().await;
        let id = TenantId::new(state.next_id());
        state.tenants.insert(
            id,
            TenantEntry {
                tenant: Tenant {
                    id,
                    shop_domain: shop_domain.to_string(),
                    access_token,
                    last_synced_at: None,
                },
                sync_claimed_at: None,
            },
        );
        id
    }

    /// Make every later upsert of `kind` fail.
    pub fn fail_upserts_of(&self, kind: Option<EntityKind>) {
        if let Ok(mut fail) = self.fail_upserts_of.lock() {
            *fail = kind;
        }
    }

    /// Number of upsert round trips so far.
    #[must_use]
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Customers of `tenant_id`, ordered by external id.
    pub async fn customers(&self, tenant_id: TenantId) -> Vec<CustomerRecord> {
        let state = self.state.read().await;
        let mut customers: Vec<CustomerRecord> = state
            .customers
            .iter()
            .filter(|((tenant, _), _)| *tenant == tenant_id)
            .map(|(_, (_, record))| record.clone())
            .collect();
        customers.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        customers
    }

    /// Products of `tenant_id`, ordered by external id.
    pub async fn products(&self, tenant_id: TenantId) -> Vec<ProductRecord> {
        let state = self.state.read().await;
        let mut products: Vec<ProductRecord> = state
            .products
            .iter()
            .filter(|((tenant, _), _)| *tenant == tenant_id)
            .map(|(_, (_, record))| record.clone())
            .collect();
        products.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        products
    }

    /// Orders of `tenant_id`, ordered by external id.
    pub async fn orders(&self, tenant_id: TenantId) -> Vec<StoredOrder> {
        let state = self.state.read().await;
        let mut orders: Vec<StoredOrder> = state
            .orders
            .iter()
            .filter(|((tenant, _), _)| *tenant == tenant_id)
            .map(|(_, order)| order.clone())
            .collect();
        orders.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        orders
    }

    /// Internal id of a stored customer.
    pub async fn customer_id(
        &self,
        tenant_id: TenantId,
        external_id: &ExternalId,
    ) -> Option<CustomerId> {
        let state = self.state.read().await;
        state
            .customers
            .get(&(tenant_id, external_id.clone()))
            .map(|(id, _)| *id)
    }

    /// Line items of a stored order.
    pub async fn line_items(&self, order_id: OrderId) -> Vec<LineItemRecord> {
        let state = self.state.read().await;
        state.line_items.get(&order_id).cloned().unwrap_or_default()
    }

    /// Whether the tenant's sync lease is currently held.
    pub async fn is_claimed(&self, tenant_id: TenantId) -> bool {
        let state = self.state.read().await;
        state
            .tenants
            .get(&tenant_id)
            .is_some_and(|entry| entry.sync_claimed_at.is_some())
    }

    fn begin_upsert(&self, kind: EntityKind) -> Result<(), RepositoryError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.fail_upserts_of.lock().map(|f| *f).unwrap_or(None);
        if failing == Some(kind) {
            return Err(RepositoryError::Unavailable(format!(
                "{kind} writes disabled"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn get_tenant(&self, id: TenantId) -> Result<Option<Tenant>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.tenants.get(&id).map(|entry| entry.tenant.clone()))
    }

    async fn list_tenant_ids(&self) -> Result<Vec<TenantId>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.tenants.keys().copied().collect())
    }

    async fn claim_sync(
        &self,
        id: TenantId,
        ttl: Duration,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let mut state = self.state.write().await;
        let Some(entry) = state.tenants.get_mut(&id) else {
            return Ok(None);
        };

        let now = Utc::now();
        // A ttl reaching past the earliest representable time never goes stale.
        let stale_before = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl));
        let fresh = entry
            .sync_claimed_at
            .is_some_and(|claimed| stale_before.is_none_or(|cutoff| claimed >= cutoff));
        if fresh {
            return Ok(None);
        }

        entry.sync_claimed_at = Some(now);
        Ok(Some(now))
    }

    async fn release_sync(
        &self,
        id: TenantId,
        claimed_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        let Some(entry) = state.tenants.get_mut(&id) else {
            return Ok(false);
        };
        if entry.sync_claimed_at != Some(claimed_at) {
            return Ok(false);
        }
        entry.sync_claimed_at = None;
        Ok(true)
    }

    async fn record_sync_completed(
        &self,
        id: TenantId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(entry) = state.tenants.get_mut(&id) {
            entry.tenant.last_synced_at = Some(at);
        }
        Ok(())
    }

    async fn upsert_customers(
        &self,
        tenant_id: TenantId,
        customers: &[CustomerRecord],
    ) -> Result<(), RepositoryError> {
        self.begin_upsert(EntityKind::Customers)?;
        let mut state = self.state.write().await;
        for customer in customers {
            let key = (tenant_id, customer.external_id.clone());
            let existing = state.customers.get(&key).map(|(id, _)| *id);
            let id = match existing {
                Some(id) => id,
                None => CustomerId::new(state.next_id()),
            };
            state.customers.insert(key, (id, customer.clone()));
        }
        Ok(())
    }

    async fn upsert_products(
        &self,
        tenant_id: TenantId,
        products: &[ProductRecord],
    ) -> Result<(), RepositoryError> {
        self.begin_upsert(EntityKind::Products)?;
        let mut state = self.state.write().await;
        for product in products {
            let key = (tenant_id, product.external_id.clone());
            let existing = state.products.get(&key).map(|(id, _)| *id);
            let id = match existing {
                Some(id) => id,
                None => ProductId::new(state.next_id()),
            };
            state.products.insert(key, (id, product.clone()));
        }
        Ok(())
    }

    async fn resolve_customer_ids(
        &self,
        tenant_id: TenantId,
        external_ids: &[ExternalId],
    ) -> Result<HashMap<ExternalId, CustomerId>, RepositoryError> {
        let state = self.state.read().await;
        Ok(external_ids
            .iter()
            .filter_map(|external_id| {
                state
                    .customers
                    .get(&(tenant_id, external_id.clone()))
                    .map(|(id, _)| (external_id.clone(), *id))
            })
            .collect())
    }

    async fn upsert_orders(
        &self,
        tenant_id: TenantId,
        orders: &[OrderWrite<'_>],
    ) -> Result<(), RepositoryError> {
        self.begin_upsert(EntityKind::Orders)?;
        let mut state = self.state.write().await;
        for order in orders {
            let record = order.record;
            let key = (tenant_id, record.external_id.clone());
            let existing = state.orders.get(&key).map(|stored| stored.id);
            let id = match existing {
                Some(id) => id,
                None => OrderId::new(state.next_id()),
            };

            state.orders.insert(
                key,
                StoredOrder {
                    id,
                    external_id: record.external_id.clone(),
                    order_number: record.order_number.clone(),
                    total_price: record.total_price,
                    order_date: record.order_date,
                    customer_id: order.customer_id,
                },
            );

            if let Some(items) = &record.line_items {
                state.line_items.insert(id, items.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn store_with_tenant() -> (MemoryStore, TenantId) {
        let store = MemoryStore::new();
        let tenant = store
            .add_tenant("acme.myshopify.com", SecretString::from("shpat_test"))
            .await;
        (store, tenant)
    }

    #[tokio::test]
    async fn test_ttl_beyond_time_range_keeps_lease_fresh() {
        let (store, tenant) = store_with_tenant().await;
        let claimed = store.claim_sync(tenant, Duration::MAX).await.unwrap();
        assert!(claimed.is_some());

        // Converts to a TimeDelta but reaches before the earliest DateTime.
        let ages = Duration::from_secs(10_000_000_000_000);
        assert!(store.claim_sync(tenant, ages).await.unwrap().is_none());
        assert!(store.claim_sync(tenant, Duration::MAX).await.unwrap().is_none());
        assert!(store.is_claimed(tenant).await);
    }

    #[tokio::test]
    async fn test_unknown_tenant_cannot_be_claimed() {
        let store = MemoryStore::new();
        let missing = TenantId::new(99);
        assert!(store.claim_sync(missing, Duration::ZERO).await.unwrap().is_none());
        assert!(!store.release_sync(missing, Utc::now()).await.unwrap());
    }
}
