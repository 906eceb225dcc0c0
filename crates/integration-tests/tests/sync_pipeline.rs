//! End-to-end syncs against a mock Shopify Admin API.
//!
//! Each test runs the real GraphQL and REST clients over HTTP into the
//! in-memory store. Retry waits are recorded instead of slept.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{Value, json};
use storepulse_core::{EntityKind, ExternalId, SyncSummary};
use storepulse_integration_tests::{
    ACCESS_TOKEN, TestContext, graphql_page, graphql_path, next_link, rest_path,
};
use storepulse_sync::SyncError;
use storepulse_sync::db::SyncStore;
use wiremock::matchers::{
    body_string_contains, header, method, path, query_param, query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Mock helpers
// =============================================================================

async fn mount_graphql(server: &MockServer, operation: &str, response: Value) {
    Mock::given(method("POST"))
        .and(path(graphql_path()))
        .and(header("X-Shopify-Access-Token", ACCESS_TOKEN))
        .and(body_string_contains(operation))
        .respond_with(ResponseTemplate::new(200).set_body_json(response))
        .mount(server)
        .await;
}

async fn mount_graphql_failure(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path(graphql_path()))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

fn graphql_customer(id: u64, email: &str) -> Value {
    json!({
        "id": format!("gid://shopify/Customer/{id}"),
        "email": email,
        "firstName": "Test",
        "lastName": "Customer",
        "amountSpent": {"amount": "10.00"},
    })
}

fn graphql_order(id: u64, customer: Option<u64>) -> Value {
    json!({
        "id": format!("gid://shopify/Order/{id}"),
        "name": format!("#{id}"),
        "processedAt": "2026-01-15T10:00:00Z",
        "totalPriceSet": {"shopMoney": {"amount": "50.00"}},
        "customer": customer.map(|c| json!({"id": format!("gid://shopify/Customer/{c}")})),
        "lineItems": {
            "nodes": [
                {
                    "id": format!("gid://shopify/LineItem/{id}1"),
                    "title": "Cedar Candle",
                    "quantity": 2,
                    "originalUnitPriceSet": {"shopMoney": {"amount": "20.00"}},
                },
                {
                    "id": format!("gid://shopify/LineItem/{id}2"),
                    "title": "Gift Wrap",
                    "quantity": 1,
                    "originalUnitPriceSet": {"shopMoney": {"amount": "10.00"}},
                },
            ],
            "pageInfo": {"hasNextPage": false, "endCursor": null},
        },
    })
}

/// Two customers on two pages, no products, one order for customer 1.
async fn mount_healthy_graphql(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(graphql_path()))
        .and(body_string_contains("SyncCustomers"))
        .and(body_string_contains("\"after\":null"))
        .respond_with(ResponseTemplate::new(200).set_body_json(graphql_page(
            "customers",
            &json!([graphql_customer(1, "ada@example.com")]),
            Some("customers-1"),
        )))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(graphql_path()))
        .and(body_string_contains("SyncCustomers"))
        .and(body_string_contains("\"after\":\"customers-1\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(graphql_page(
            "customers",
            &json!([graphql_customer(2, "grace@example.com")]),
            None,
        )))
        .mount(server)
        .await;

    mount_graphql(server, "SyncProducts", graphql_page("products", &json!([]), None)).await;
    mount_graphql(
        server,
        "SyncOrders",
        graphql_page("orders", &json!([graphql_order(100, Some(1))]), None),
    )
    .await;
}

fn rest_customer(id: u64) -> Value {
    json!({"id": id, "email": format!("c{id}@example.com"), "total_spent": "5.00"})
}

/// REST customers over two `Link` pages, one product, one guest order.
async fn mount_healthy_rest(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(rest_path("customers")))
        .and(query_param_is_missing("page_info"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", next_link(server, "customers", "page-2").as_str())
                .set_body_json(json!({"customers": [rest_customer(1), rest_customer(2)]})),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(rest_path("customers")))
        .and(query_param("page_info", "page-2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"customers": [rest_customer(3)]})),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(rest_path("products")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "products": [{"id": 10, "title": "Candle", "variants": [{"price": "19.99"}]}],
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(rest_path("orders")))
        .and(query_param("status", "any"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "orders": [{
                "id": 500,
                "name": "#1500",
                "total_price": "19.99",
                "created_at": "2026-02-01T09:30:00-05:00",
                "customer": null,
                "line_items": [{"id": 1, "title": "Candle", "quantity": 1, "price": "19.99"}],
            }],
        })))
        .mount(server)
        .await;
}

// =============================================================================
// GraphQL (primary)
// =============================================================================

#[tokio::test]
async fn test_graphql_sync_links_orders_to_customers() {
    let ctx = TestContext::new().await;
    mount_healthy_graphql(&ctx.server).await;

    let summary = ctx.service.sync_tenant(ctx.tenant_id).await.unwrap();

    assert_eq!(
        summary,
        SyncSummary {
            customers_upserted: 2,
            products_upserted: 0,
            orders_upserted: 1,
        }
    );

    let orders = ctx.store.orders(ctx.tenant_id).await;
    assert_eq!(orders.len(), 1);
    let ada = ctx
        .store
        .customer_id(ctx.tenant_id, &ExternalId::parse("1").unwrap())
        .await;
    assert!(ada.is_some());
    assert_eq!(orders[0].customer_id, ada);
    assert_eq!(orders[0].external_id.as_str(), "100");
    assert_eq!(orders[0].total_price, Decimal::new(5000, 2));
    assert_eq!(ctx.store.line_items(orders[0].id).await.len(), 2);

    let tenant = ctx.store.get_tenant(ctx.tenant_id).await.unwrap().unwrap();
    assert!(tenant.last_synced_at.is_some());
    assert!(!ctx.store.is_claimed(ctx.tenant_id).await);
    assert!(ctx.sleeper.waits().is_empty());
}

#[tokio::test]
async fn test_rerun_does_not_duplicate() {
    let ctx = TestContext::new().await;
    mount_healthy_graphql(&ctx.server).await;

    let first = ctx.service.sync_tenant(ctx.tenant_id).await.unwrap();
    let order_id = ctx.store.orders(ctx.tenant_id).await[0].id;
    let second = ctx.service.sync_tenant(ctx.tenant_id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(ctx.store.customers(ctx.tenant_id).await.len(), 2);
    let orders = ctx.store.orders(ctx.tenant_id).await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].id, order_id, "order keeps its internal id");
    assert_eq!(ctx.store.line_items(order_id).await.len(), 2);
}

#[tokio::test]
async fn test_throttled_page_is_retried_after_suggested_wait() {
    let ctx = TestContext::new().await;
    Mock::given(method("POST"))
        .and(path(graphql_path()))
        .and(body_string_contains("SyncProducts"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1.0"))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&ctx.server)
        .await;
    mount_healthy_graphql(&ctx.server).await;

    let summary = ctx.service.sync_tenant(ctx.tenant_id).await.unwrap();

    assert_eq!(summary.customers_upserted, 2);
    assert_eq!(
        ctx.sleeper.waits(),
        vec![Duration::from_millis(1500), Duration::from_millis(1500)]
    );
    assert_eq!(ctx.requests_to(&rest_path("products")).await, 0);
}

#[tokio::test]
async fn test_graphql_throttle_error_waits_for_restore() {
    let ctx = TestContext::new().await;
    Mock::given(method("POST"))
        .and(path(graphql_path()))
        .and(body_string_contains("SyncOrders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{"message": "Throttled", "extensions": {"code": "THROTTLED"}}],
            "extensions": {"cost": {
                "requestedQueryCost": 202,
                "throttleStatus": {
                    "maximumAvailable": 2000.0,
                    "currentlyAvailable": 102,
                    "restoreRate": 100.0,
                },
            }},
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&ctx.server)
        .await;
    mount_healthy_graphql(&ctx.server).await;

    let summary = ctx.service.sync_tenant(ctx.tenant_id).await.unwrap();

    assert_eq!(summary.orders_upserted, 1);
    // 100 points short at 100 points/s, plus the retry buffer.
    assert_eq!(ctx.sleeper.waits(), vec![Duration::from_millis(1500)]);
}

// =============================================================================
// REST fallback
// =============================================================================

#[tokio::test]
async fn test_server_errors_fall_back_to_rest() {
    let ctx = TestContext::new().await;
    mount_graphql_failure(&ctx.server, 500).await;
    mount_healthy_rest(&ctx.server).await;

    let summary = ctx.service.sync_tenant(ctx.tenant_id).await.unwrap();

    assert_eq!(
        summary,
        SyncSummary {
            customers_upserted: 3,
            products_upserted: 1,
            orders_upserted: 1,
        }
    );
    // Three retries per collection before falling back.
    assert_eq!(ctx.requests_to(&graphql_path()).await, 12);
    assert_eq!(ctx.sleeper.waits().len(), 9);
    assert_eq!(ctx.requests_to(&rest_path("customers")).await, 2);

    let orders = ctx.store.orders(ctx.tenant_id).await;
    assert_eq!(orders[0].customer_id, None, "guest order");
    assert_eq!(ctx.store.line_items(orders[0].id).await.len(), 1);
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let ctx = TestContext::new().await;
    mount_graphql_failure(&ctx.server, 401).await;
    mount_healthy_rest(&ctx.server).await;

    let summary = ctx.service.sync_tenant(ctx.tenant_id).await.unwrap();

    assert_eq!(summary.customers_upserted, 3);
    assert_eq!(ctx.requests_to(&graphql_path()).await, 3);
    assert!(ctx.sleeper.waits().is_empty());
}

#[tokio::test]
async fn test_both_protocols_failing_writes_nothing() {
    let ctx = TestContext::new().await;
    mount_graphql_failure(&ctx.server, 503).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "errors": "This action requires merchant approval for read_orders scope.",
        })))
        .mount(&ctx.server)
        .await;

    let err = ctx.service.sync_tenant(ctx.tenant_id).await.unwrap_err();

    let SyncError::Fetch(fetch) = &err else {
        panic!("expected a fetch error, got {err:?}");
    };
    assert!(matches!(
        fetch.resource,
        EntityKind::Customers | EntityKind::Products | EntityKind::Orders
    ));
    let message = err.to_string();
    assert!(message.contains("graphql") && message.contains("rest"), "{message}");

    assert!(ctx.store.customers(ctx.tenant_id).await.is_empty());
    assert!(ctx.store.orders(ctx.tenant_id).await.is_empty());
    assert!(!ctx.store.is_claimed(ctx.tenant_id).await, "lease released on failure");
    let tenant = ctx.store.get_tenant(ctx.tenant_id).await.unwrap().unwrap();
    assert!(tenant.last_synced_at.is_none());
}

// =============================================================================
// All tenants
// =============================================================================

#[tokio::test]
async fn test_sync_all_isolates_tenant_failures() {
    let ctx = TestContext::new().await;
    let revoked = ctx
        .store
        .add_tenant("revoked.myshopify.com", SecretString::from("shpat_revoked"))
        .await;

    // Only the seeded token is accepted; everything else is unauthorized.
    mount_healthy_graphql(&ctx.server).await;
    Mock::given(method("POST"))
        .and(path(graphql_path()))
        .and(header("X-Shopify-Access-Token", "shpat_revoked"))
        .respond_with(ResponseTemplate::new(401))
        .with_priority(1)
        .mount(&ctx.server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&ctx.server)
        .await;

    let outcomes = ctx
        .service
        .sync_all(Duration::from_millis(250))
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].tenant_id, ctx.tenant_id);
    assert_eq!(outcomes[0].result.as_ref().unwrap().orders_upserted, 1);
    assert_eq!(outcomes[1].tenant_id, revoked);
    assert!(matches!(outcomes[1].result, Err(SyncError::Fetch(_))));

    assert!(ctx.store.customers(revoked).await.is_empty());
    assert_eq!(ctx.sleeper.waits(), vec![Duration::from_millis(250)]);
}

// =============================================================================
// Webhooks
// =============================================================================

#[tokio::test]
async fn test_webhook_update_after_full_sync() {
    let ctx = TestContext::new().await;
    mount_healthy_graphql(&ctx.server).await;
    ctx.service.sync_tenant(ctx.tenant_id).await.unwrap();

    // REST-shaped numeric id lands on the same row as the GraphQL gid.
    ctx.service
        .apply_webhook(
            ctx.tenant_id,
            "customers/update".parse().unwrap(),
            &json!({"id": 2, "email": "grace.hopper@example.com"}),
        )
        .await
        .unwrap();

    let customers = ctx.store.customers(ctx.tenant_id).await;
    assert_eq!(customers.len(), 2);
    assert!(
        customers
            .iter()
            .any(|c| c.email.as_deref() == Some("grace.hopper@example.com"))
    );
}
