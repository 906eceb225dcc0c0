//! Sync entry points.
//!
//! [`SyncService`] wires storage, configuration, and both protocol clients
//! together for callers: the CLI, a scheduler, or a host HTTP handler.
//!
//! # Example
//!
//! ```rust,ignore
//! let store = Arc::new(PgSyncStore::new(create_pool(url).await?));
//! let service = SyncService::new(store, SyncConfig::from_env()?)?;
//!
//! let summary = service.sync_tenant(TenantId::new(1)).await?;
//! println!("{summary}");
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use storepulse_core::{ExternalId, SyncSummary, TenantId};
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, info_span, instrument, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::db::{SyncStore, Tenant};
use crate::error::SyncError;
use crate::orchestrator::SyncOrchestrator;
use crate::shopify::{GraphqlClient, RestClient, Retrier, Sleeper, TokioSleeper};
use crate::upsert::UpsertEngine;
use crate::webhook::{WebhookError, WebhookRecord, WebhookTopic};

/// Tenant sync service.
///
/// Cheap to clone; clones share the HTTP client and store.
#[derive(Clone)]
pub struct SyncService {
    inner: Arc<SyncServiceInner>,
}

struct SyncServiceInner {
    store: Arc<dyn SyncStore>,
    config: SyncConfig,
    http: reqwest::Client,
    sleeper: Arc<dyn Sleeper>,
    engine: UpsertEngine,
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Result of one tenant in a [`SyncService::sync_all`] run.
#[derive(Debug)]
pub struct TenantOutcome {
    pub tenant_id: TenantId,
    pub result: Result<SyncSummary, SyncError>,
}

impl SyncService {
    /// Create a service that waits on the tokio timer.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::HttpClient` if the HTTP client cannot be built.
    pub fn new(store: Arc<dyn SyncStore>, config: SyncConfig) -> Result<Self, SyncError> {
        Self::with_sleeper(store, config, Arc::new(TokioSleeper))
    }

    /// Create a service with a custom [`Sleeper`] for retry waits and staggering.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::HttpClient` if the HTTP client cannot be built.
    pub fn with_sleeper(
        store: Arc<dyn SyncStore>,
        config: SyncConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(config.shopify.http_timeout)
            .build()?;
        let engine = UpsertEngine::new(store.clone(), config.batch_size);

        Ok(Self {
            inner: Arc::new(SyncServiceInner {
                store,
                config,
                http,
                sleeper,
                engine,
            }),
        })
    }

    /// Sync one tenant end to end.
    ///
    /// Holds the tenant's sync lease for the duration of the run and records
    /// `last_synced_at` on success.
    ///
    /// # Errors
    ///
    /// - `SyncError::TenantNotFound` if the tenant does not exist
    /// - `SyncError::AlreadyRunning` if another run holds a fresh lease
    /// - any pipeline error from the run itself
    pub async fn sync_tenant(&self, tenant_id: TenantId) -> Result<SyncSummary, SyncError> {
        let span = info_span!(
            "sync_tenant",
            tenant_id = %tenant_id,
            sync_run_id = %Uuid::new_v4()
        );
        self.sync_tenant_inner(tenant_id).instrument(span).await
    }

    async fn sync_tenant_inner(&self, tenant_id: TenantId) -> Result<SyncSummary, SyncError> {
        let store = &self.inner.store;

        let tenant = store
            .get_tenant(tenant_id)
            .await?
            .ok_or(SyncError::TenantNotFound(tenant_id))?;

        let Some(claimed_at) = store.claim_sync(tenant_id, self.inner.config.lock_ttl).await?
        else {
            warn!("Sync lease held by another run");
            return Err(SyncError::AlreadyRunning(tenant_id));
        };
        info!(shop = %tenant.shop_domain, "Sync started");

        let result = self.run_claimed(&tenant).await;

        match store.release_sync(tenant_id, claimed_at).await {
            Ok(true) => {}
            Ok(false) => warn!("Sync lease was taken over before release"),
            Err(e) => error!(error = %e, "Failed to release sync lease"),
        }
        result
    }

    async fn run_claimed(&self, tenant: &Tenant) -> Result<SyncSummary, SyncError> {
        let config = &self.inner.config;
        let retrier = Retrier::new(config.retry, self.inner.sleeper.clone());

        let primary = GraphqlClient::new(
            self.inner.http.clone(),
            &tenant.shop_domain,
            tenant.access_token.clone(),
            &config.shopify,
            retrier.clone(),
        );
        let fallback = RestClient::new(
            self.inner.http.clone(),
            &tenant.shop_domain,
            tenant.access_token.clone(),
            &config.shopify,
            retrier,
        );

        let summary = SyncOrchestrator::new(self.inner.engine.clone())
            .run(tenant.id, &primary, &fallback)
            .await?;

        self.inner
            .store
            .record_sync_completed(tenant.id, Utc::now())
            .await?;
        Ok(summary)
    }

    /// Sync every tenant, starting one every `stagger`.
    ///
    /// Runs overlap once started. One tenant's failure does not stop the
    /// others; every outcome is returned, ordered by tenant id.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Repository` if the tenant list cannot be loaded.
    pub async fn sync_all(&self, stagger: Duration) -> Result<Vec<TenantOutcome>, SyncError> {
        let tenant_ids = self.inner.store.list_tenant_ids().await?;
        info!(tenants = tenant_ids.len(), "Syncing all tenants");

        let mut runs = JoinSet::new();
        for (index, tenant_id) in tenant_ids.into_iter().enumerate() {
            if index > 0 && !stagger.is_zero() {
                self.inner.sleeper.sleep(stagger).await;
            }
            let service = self.clone();
            runs.spawn(async move {
                TenantOutcome {
                    tenant_id,
                    result: service.sync_tenant(tenant_id).await,
                }
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = runs.join_next().await {
            match joined {
                Ok(outcome) => {
                    if let Err(e) = &outcome.result {
                        warn!(tenant_id = %outcome.tenant_id, error = %e, "Tenant sync failed");
                    }
                    outcomes.push(outcome);
                }
                Err(e) => error!(error = %e, "Tenant sync task aborted"),
            }
        }
        outcomes.sort_by_key(|outcome| outcome.tenant_id);
        Ok(outcomes)
    }

    /// Apply one webhook event for `tenant_id` through the upsert engine.
    ///
    /// Returns the external id of the written record.
    ///
    /// # Errors
    ///
    /// - `WebhookError::TenantNotFound` if the tenant does not exist
    /// - `WebhookError::MissingId` if the payload cannot be keyed
    /// - `WebhookError::Storage` if the write fails
    #[instrument(skip(self, payload), fields(tenant_id = %tenant_id, topic = %topic))]
    pub async fn apply_webhook(
        &self,
        tenant_id: TenantId,
        topic: WebhookTopic,
        payload: &Value,
    ) -> Result<ExternalId, WebhookError> {
        if self.inner.store.get_tenant(tenant_id).await?.is_none() {
            return Err(WebhookError::TenantNotFound(tenant_id));
        }

        let engine = &self.inner.engine;
        let external_id = match WebhookRecord::from_payload(topic, payload)? {
            WebhookRecord::Customer(customer) => {
                engine
                    .upsert_customers(tenant_id, std::slice::from_ref(&customer))
                    .await?;
                customer.external_id
            }
            WebhookRecord::Product(product) => {
                engine
                    .upsert_products(tenant_id, std::slice::from_ref(&product))
                    .await?;
                product.external_id
            }
            WebhookRecord::Order(order) => {
                engine
                    .upsert_orders(tenant_id, std::slice::from_ref(&order))
                    .await?;
                order.external_id
            }
        };

        info!(external_id = %external_id, "Applied webhook");
        Ok(external_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;

    use super::*;
    use crate::db::MemoryStore;
    use crate::shopify::RecordingSleeper;

    async fn setup() -> (Arc<MemoryStore>, SyncService, TenantId) {
        let store = Arc::new(MemoryStore::new());
        let tenant = store
            .add_tenant("acme.myshopify.com", SecretString::from("shpat_test"))
            .await;
        let service = SyncService::with_sleeper(
            store.clone(),
            SyncConfig::default(),
            Arc::new(RecordingSleeper::new()),
        )
        .unwrap();
        (store, service, tenant)
    }

    #[tokio::test]
    async fn test_unknown_tenant() {
        let (_store, service, _tenant) = setup().await;
        let err = service.sync_tenant(TenantId::new(404)).await.unwrap_err();
        assert!(matches!(err, SyncError::TenantNotFound(id) if id == TenantId::new(404)));
    }

    #[tokio::test]
    async fn test_held_lease_rejects_second_run() {
        let (store, service, tenant) = setup().await;
        assert!(store.claim_sync(tenant, Duration::from_secs(3600)).await.unwrap().is_some());

        let err = service.sync_tenant(tenant).await.unwrap_err();

        assert!(matches!(err, SyncError::AlreadyRunning(id) if id == tenant));
        // The rejected run must not drop the other run's lease.
        assert!(store.is_claimed(tenant).await);
    }

    #[tokio::test]
    async fn test_stale_lease_is_taken_over() {
        let (store, _service, tenant) = setup().await;
        assert!(store.claim_sync(tenant, Duration::from_secs(3600)).await.unwrap().is_some());
        assert!(store.claim_sync(tenant, Duration::ZERO).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_superseded_holder_keeps_new_lease() {
        let (store, _service, tenant) = setup().await;
        let first = store
            .claim_sync(tenant, Duration::from_secs(3600))
            .await
            .unwrap()
            .unwrap();
        let second = store
            .claim_sync(tenant, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();

        assert!(!store.release_sync(tenant, first).await.unwrap());
        assert!(store.is_claimed(tenant).await);
        assert!(
            store
                .claim_sync(tenant, Duration::from_secs(3600))
                .await
                .unwrap()
                .is_none()
        );

        assert!(store.release_sync(tenant, second).await.unwrap());
        assert!(!store.is_claimed(tenant).await);
    }

    #[tokio::test]
    async fn test_webhook_customer_then_order_links() {
        let (store, service, tenant) = setup().await;

        service
            .apply_webhook(
                tenant,
                WebhookTopic::CustomersCreate,
                &json!({"id": 1, "email": "ada@example.com", "first_name": "Ada"}),
            )
            .await
            .unwrap();
        let external_id = service
            .apply_webhook(
                tenant,
                WebhookTopic::OrdersPaid,
                &json!({"id": 100, "total_price": "50.00", "customer": {"id": 1}}),
            )
            .await
            .unwrap();

        assert_eq!(external_id.as_str(), "100");
        let orders = store.orders(tenant).await;
        assert_eq!(orders.len(), 1);
        assert!(orders[0].customer_id.is_some());
    }

    #[tokio::test]
    async fn test_webhook_unknown_tenant() {
        let (_store, service, _tenant) = setup().await;
        let err = service
            .apply_webhook(
                TenantId::new(404),
                WebhookTopic::ProductsUpdate,
                &json!({"id": 1}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::TenantNotFound(_)));
    }
}
