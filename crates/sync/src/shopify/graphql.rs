//! Shopify Admin GraphQL client (primary source).
//!
//! Pages through `customers`, `products`, and `orders` connections with
//! cursor pagination. Orders carry their first line items inline; orders with
//! more line items than fit are completed with follow-up `order(id:)` queries.
//!
//! Queries are plain strings sent as a [`QueryBody`] rather than
//! `#[derive(GraphQLQuery)]` types. Nodes go to the normalizer as raw JSON,
//! which is shared with the REST client, and no Admin schema file ships with
//! the crate to generate from.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use graphql_client::{QueryBody, Response};
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use storepulse_core::normalize::{normalize_customer, normalize_order, normalize_product};
use storepulse_core::{CustomerRecord, EntityKind, OrderRecord, ProductRecord};
use tracing::{debug, instrument};

use crate::config::ShopifyApiConfig;

use super::http::{ACCESS_TOKEN_HEADER, check_status};
use super::pagination::{Page, paginate};
use super::source::{StoreDataSource, normalize_collection};
use super::{FetchError, GraphQLError, Protocol, Retrier, ShopifyError};

/// Orders per page. Nested line items multiply query cost, so order pages
/// stay well under the 1000-point single query limit.
const MAX_ORDER_PAGE_SIZE: u32 = 50;
/// Line items fetched inline with each order.
const INLINE_LINE_ITEMS: u32 = 15;

const CUSTOMERS_QUERY: &str = r"
query SyncCustomers($first: Int!, $after: String) {
  customers(first: $first, after: $after) {
    nodes {
      id
      email
      firstName
      lastName
      displayName
      amountSpent { amount }
      defaultAddress { firstName lastName }
    }
    pageInfo { hasNextPage endCursor }
  }
}";

const PRODUCTS_QUERY: &str = r"
query SyncProducts($first: Int!, $after: String) {
  products(first: $first, after: $after) {
    nodes {
      id
      title
      vendor
      productType
      variants(first: 1) { nodes { price } }
      priceRangeV2 { minVariantPrice { amount } }
    }
    pageInfo { hasNextPage endCursor }
  }
}";

const ORDERS_QUERY: &str = r"
query SyncOrders($first: Int!, $after: String, $lineItemsFirst: Int!) {
  orders(first: $first, after: $after) {
    nodes {
      id
      name
      processedAt
      createdAt
      totalPriceSet { shopMoney { amount } }
      customer { id }
      lineItems(first: $lineItemsFirst) {
        nodes {
          id
          title
          quantity
          originalUnitPriceSet { shopMoney { amount } }
        }
        pageInfo { hasNextPage endCursor }
      }
    }
    pageInfo { hasNextPage endCursor }
  }
}";

const ORDER_LINE_ITEMS_QUERY: &str = r"
query SyncOrderLineItems($id: ID!, $first: Int!, $after: String) {
  order(id: $id) {
    lineItems(first: $first, after: $after) {
      nodes {
        id
        title
        quantity
        originalUnitPriceSet { shopMoney { amount } }
      }
      pageInfo { hasNextPage endCursor }
    }
  }
}";

/// GraphQL Admin API client for one tenant.
#[derive(Clone)]
pub struct GraphqlClient {
    inner: Arc<GraphqlClientInner>,
}

struct GraphqlClientInner {
    client: reqwest::Client,
    shop_domain: String,
    endpoint: String,
    access_token: SecretString,
    page_size: u32,
    retrier: Retrier,
}

impl std::fmt::Debug for GraphqlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphqlClient")
            .field("shop_domain", &self.inner.shop_domain)
            .field("endpoint", &self.inner.endpoint)
            .field("access_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl GraphqlClient {
    /// Create a client for `shop_domain`.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        shop_domain: &str,
        access_token: SecretString,
        config: &ShopifyApiConfig,
        retrier: Retrier,
    ) -> Self {
        let endpoint = format!(
            "{}/admin/api/{}/graphql.json",
            config.origin(shop_domain),
            config.api_version
        );

        Self {
            inner: Arc::new(GraphqlClientInner {
                client,
                shop_domain: shop_domain.to_string(),
                endpoint,
                access_token,
                page_size: config.page_size,
                retrier,
            }),
        }
    }

    /// Execute a GraphQL query and return its `data`.
    async fn execute(
        &self,
        query: &'static str,
        operation_name: &'static str,
        variables: Value,
    ) -> Result<Value, ShopifyError> {
        let body = QueryBody {
            variables,
            query,
            operation_name,
        };

        let response = self
            .inner
            .client
            .post(&self.inner.endpoint)
            .header(ACCESS_TOKEN_HEADER, self.inner.access_token.expose_secret())
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;

        let text = check_status(response).await?.text().await?;
        let response: Response<Value> = serde_json::from_str(&text)?;

        if let Some(errors) = response.errors
            && !errors.is_empty()
        {
            return Err(classify_errors(errors, response.extensions.as_ref()));
        }

        response
            .data
            .ok_or_else(|| ShopifyError::MissingData("no data in GraphQL response".to_string()))
    }

    /// Fetch one page of a top-level connection.
    async fn connection_page(
        &self,
        query: &'static str,
        operation_name: &'static str,
        root: &'static str,
        variables: Value,
    ) -> Result<Page<Value>, ShopifyError> {
        let data = self.execute(query, operation_name, variables).await?;
        let connection = data
            .get(root)
            .ok_or_else(|| ShopifyError::MissingData(format!("missing `{root}` connection")))?;
        parse_connection(connection)
    }

    async fn fetch_all(
        &self,
        resource: EntityKind,
        query: &'static str,
        operation_name: &'static str,
        page_size: u32,
        extra: &Value,
    ) -> Result<Vec<Value>, FetchError> {
        paginate(&self.inner.retrier, resource, Protocol::Graphql, |cursor| {
            let mut variables = json!({ "first": page_size, "after": cursor });
            merge(&mut variables, extra);
            self.connection_page(query, operation_name, resource.as_str(), variables)
        })
        .await
    }

    /// Append the line items an order page could not hold inline.
    async fn complete_line_items(&self, order: &mut Value) -> Result<(), FetchError> {
        let Some(start) = next_cursor(&order["lineItems"]["pageInfo"]) else {
            return Ok(());
        };
        let Some(order_id) = order["id"].as_str().map(ToString::to_string) else {
            return Ok(());
        };

        debug!(order_id = %order_id, "Fetching remaining line items");
        let remaining = paginate(
            &self.inner.retrier,
            EntityKind::Orders,
            Protocol::Graphql,
            |cursor| {
                let variables = json!({
                    "id": order_id,
                    "first": self.inner.page_size,
                    "after": cursor.or_else(|| Some(start.clone())),
                });
                async move {
                    let data = self
                        .execute(ORDER_LINE_ITEMS_QUERY, "SyncOrderLineItems", variables)
                        .await?;
                    parse_connection(&data["order"]["lineItems"])
                }
            },
        )
        .await?;

        if let Some(nodes) = order["lineItems"]["nodes"].as_array_mut() {
            nodes.extend(remaining);
        }
        Ok(())
    }
}

#[async_trait]
impl StoreDataSource for GraphqlClient {
    fn protocol(&self) -> Protocol {
        Protocol::Graphql
    }

    #[instrument(skip(self), fields(shop = %self.inner.shop_domain, protocol = "graphql"))]
    async fn fetch_customers(&self) -> Result<Vec<CustomerRecord>, FetchError> {
        let raws = self
            .fetch_all(
                EntityKind::Customers,
                CUSTOMERS_QUERY,
                "SyncCustomers",
                self.inner.page_size,
                &Value::Null,
            )
            .await?;
        Ok(normalize_collection(
            EntityKind::Customers,
            Protocol::Graphql,
            &raws,
            normalize_customer,
        ))
    }

    #[instrument(skip(self), fields(shop = %self.inner.shop_domain, protocol = "graphql"))]
    async fn fetch_products(&self) -> Result<Vec<ProductRecord>, FetchError> {
        let raws = self
            .fetch_all(
                EntityKind::Products,
                PRODUCTS_QUERY,
                "SyncProducts",
                self.inner.page_size,
                &Value::Null,
            )
            .await?;
        Ok(normalize_collection(
            EntityKind::Products,
            Protocol::Graphql,
            &raws,
            normalize_product,
        ))
    }

    #[instrument(skip(self), fields(shop = %self.inner.shop_domain, protocol = "graphql"))]
    async fn fetch_orders(&self) -> Result<Vec<OrderRecord>, FetchError> {
        let mut raws = self
            .fetch_all(
                EntityKind::Orders,
                ORDERS_QUERY,
                "SyncOrders",
                self.inner.page_size.min(MAX_ORDER_PAGE_SIZE),
                &json!({ "lineItemsFirst": INLINE_LINE_ITEMS }),
            )
            .await?;

        for order in &mut raws {
            self.complete_line_items(order).await?;
        }

        Ok(normalize_collection(
            EntityKind::Orders,
            Protocol::Graphql,
            &raws,
            normalize_order,
        ))
    }
}

/// Copy the keys of `extra` (if an object) into `variables`.
fn merge(variables: &mut Value, extra: &Value) {
    if let (Some(target), Some(source)) = (variables.as_object_mut(), extra.as_object()) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// Split a `{ nodes, pageInfo }` connection into a page.
fn parse_connection(connection: &Value) -> Result<Page<Value>, ShopifyError> {
    let items = connection
        .get("nodes")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| ShopifyError::MissingData("connection without `nodes`".to_string()))?;

    Ok(Page {
        items,
        next: next_cursor(&connection["pageInfo"]),
    })
}

/// `endCursor` when `hasNextPage` is true.
fn next_cursor(page_info: &Value) -> Option<String> {
    if page_info["hasNextPage"].as_bool() == Some(true) {
        page_info["endCursor"].as_str().map(ToString::to_string)
    } else {
        None
    }
}

/// Map top-level GraphQL errors to the error taxonomy.
fn classify_errors(
    errors: Vec<graphql_client::Error>,
    extensions: Option<&std::collections::HashMap<String, Value>>,
) -> ShopifyError {
    let errors: Vec<GraphQLError> = errors
        .into_iter()
        .map(|e| GraphQLError {
            code: e
                .extensions
                .as_ref()
                .and_then(|ext| ext.get("code"))
                .and_then(Value::as_str)
                .map(ToString::to_string),
            message: e.message,
        })
        .collect();

    let has_code = |code: &str| errors.iter().any(|e| e.code.as_deref() == Some(code));

    if has_code("THROTTLED") {
        return ShopifyError::Throttled {
            retry_after: extensions.and_then(|ext| ext.get("cost")).and_then(throttle_wait),
        };
    }
    if has_code("ACCESS_DENIED") {
        let message = errors
            .iter()
            .find(|e| e.code.as_deref() == Some("ACCESS_DENIED"))
            .map(|e| e.message.clone())
            .unwrap_or_default();
        return ShopifyError::Forbidden(message);
    }

    ShopifyError::GraphQL(errors)
}

/// Time until enough query cost has been restored to rerun the query.
///
/// Reads `extensions.cost`:
/// `{ requestedQueryCost, throttleStatus: { currentlyAvailable, restoreRate } }`.
fn throttle_wait(cost: &Value) -> Option<Duration> {
    let requested = cost["requestedQueryCost"].as_f64()?;
    let status = &cost["throttleStatus"];
    let available = status["currentlyAvailable"].as_f64()?;
    let restore_rate = status["restoreRate"].as_f64().filter(|r| *r > 0.0)?;

    let seconds = ((requested - available) / restore_rate).max(0.0);
    Duration::try_from_secs_f64(seconds).ok()
}
