//! Integration tests for StorePulse tenant sync.
//!
//! # Running Tests
//!
//! ```bash
//! # Mock-server tests (no external services)
//! cargo test -p storepulse-integration-tests
//!
//! # PostgreSQL store tests
//! DATABASE_URL=postgres://localhost/storepulse_test \
//!     cargo test -p storepulse-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `sync_pipeline` - Full syncs against a mock Admin API with the in-memory store
//! - `postgres_store` - `PgSyncStore` against a real database

use std::sync::Arc;

use secrecy::SecretString;
use serde_json::{Value, json};
use storepulse_core::TenantId;
use storepulse_sync::db::MemoryStore;
use storepulse_sync::shopify::RecordingSleeper;
use storepulse_sync::{SyncConfig, SyncService};
use wiremock::MockServer;

/// Token seeded for the default tenant.
pub const ACCESS_TOKEN: &str = "shpat_test";
/// Admin API path prefix for the default API version.
pub const API_PREFIX: &str = "/admin/api/2025-01";
/// Page size used against the mock server, small enough to force paging.
pub const PAGE_SIZE: u32 = 2;

/// A mock Admin API, an in-memory store with one tenant, and a service
/// wired to both.
pub struct TestContext {
    pub server: MockServer,
    pub store: Arc<MemoryStore>,
    pub sleeper: Arc<RecordingSleeper>,
    pub service: SyncService,
    pub tenant_id: TenantId,
}

impl TestContext {
    /// Start a mock server and seed one tenant.
    ///
    /// # Panics
    ///
    /// Panics if the service cannot be built.
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());
        let tenant_id = store
            .add_tenant("acme.myshopify.com", SecretString::from(ACCESS_TOKEN))
            .await;
        let sleeper = Arc::new(RecordingSleeper::new());

        let service =
            SyncService::with_sleeper(store.clone(), config(&server.uri()), sleeper.clone())
                .expect("Failed to build sync service");

        Self {
            server,
            store,
            sleeper,
            service,
            tenant_id,
        }
    }

    /// Requests the mock server received on `path`.
    pub async fn requests_to(&self, path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == path)
            .count()
    }
}

/// Sync configuration pointing every tenant at `base_url`.
#[must_use]
pub fn config(base_url: &str) -> SyncConfig {
    let mut config = SyncConfig::default();
    config.shopify.base_url = Some(base_url.to_string());
    config.shopify.page_size = PAGE_SIZE;
    config
}

/// GraphQL endpoint path.
#[must_use]
pub fn graphql_path() -> String {
    format!("{API_PREFIX}/graphql.json")
}

/// REST collection path for `resource` (`customers`, `products`, `orders`).
#[must_use]
pub fn rest_path(resource: &str) -> String {
    format!("{API_PREFIX}/{resource}.json")
}

/// A GraphQL response holding one page of the `root` connection.
#[must_use]
pub fn graphql_page(root: &str, nodes: &Value, end_cursor: Option<&str>) -> Value {
    json!({
        "data": {
            root: {
                "nodes": nodes,
                "pageInfo": {
                    "hasNextPage": end_cursor.is_some(),
                    "endCursor": end_cursor,
                },
            },
        },
    })
}

/// A `Link` header pointing at the next REST page.
#[must_use]
pub fn next_link(server: &MockServer, resource: &str, page_info: &str) -> String {
    format!(
        "<{}{}?limit={PAGE_SIZE}&page_info={page_info}>; rel=\"next\"",
        server.uri(),
        rest_path(resource)
    )
}
