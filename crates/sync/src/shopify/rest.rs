//! Shopify Admin REST client (fallback source).
//!
//! `GET /admin/api/{version}/{resource}.json?limit=N`, following cursor
//! pagination through the `Link` response header. A continuation request may
//! only carry `limit` and `page_info`; every other filter belongs to the first
//! request.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, LINK};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use storepulse_core::normalize::{normalize_customer, normalize_order, normalize_product};
use storepulse_core::{CustomerRecord, EntityKind, OrderRecord, ProductRecord};
use tracing::instrument;
use url::Url;

use crate::config::ShopifyApiConfig;

use super::http::{ACCESS_TOKEN_HEADER, check_status};
use super::pagination::{Page, paginate};
use super::source::{StoreDataSource, normalize_collection};
use super::{FetchError, Protocol, Retrier, ShopifyError};

/// REST Admin API client for one tenant.
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<RestClientInner>,
}

struct RestClientInner {
    client: reqwest::Client,
    shop_domain: String,
    base: String,
    access_token: SecretString,
    page_size: u32,
    retrier: Retrier,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("shop_domain", &self.inner.shop_domain)
            .field("base", &self.inner.base)
            .field("access_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl RestClient {
    /// Create a client for `shop_domain`.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        shop_domain: &str,
        access_token: SecretString,
        config: &ShopifyApiConfig,
        retrier: Retrier,
    ) -> Self {
        let base = format!(
            "{}/admin/api/{}",
            config.origin(shop_domain),
            config.api_version
        );

        Self {
            inner: Arc::new(RestClientInner {
                client,
                shop_domain: shop_domain.to_string(),
                base,
                access_token,
                page_size: config.page_size,
                retrier,
            }),
        }
    }

    /// URL of one page of `resource`.
    fn page_url(&self, resource: EntityKind, page_info: Option<&str>) -> Result<Url, ShopifyError> {
        let mut url = Url::parse(&format!("{}/{}.json", self.inner.base, resource.as_str()))
            .map_err(|e| ShopifyError::MissingData(format!("invalid REST URL: {e}")))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &self.inner.page_size.to_string());
            match page_info {
                Some(page_info) => {
                    query.append_pair("page_info", page_info);
                }
                None if resource == EntityKind::Orders => {
                    query.append_pair("status", "any");
                }
                None => {}
            }
        }

        Ok(url)
    }

    /// Fetch one page: the array under `resource` plus the next `page_info`.
    async fn page(
        &self,
        resource: EntityKind,
        page_info: Option<String>,
    ) -> Result<Page<Value>, ShopifyError> {
        let url = self.page_url(resource, page_info.as_deref())?;

        let response = self
            .inner
            .client
            .get(url)
            .header(ACCESS_TOKEN_HEADER, self.inner.access_token.expose_secret())
            .send()
            .await?;

        let response = check_status(response).await?;
        let next = next_page_info(response.headers());
        let body: Value = serde_json::from_str(&response.text().await?)?;

        let items = body
            .get(resource.as_str())
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| {
                ShopifyError::MissingData(format!("response without `{resource}` array"))
            })?;

        Ok(Page { items, next })
    }

    async fn fetch_all(&self, resource: EntityKind) -> Result<Vec<Value>, FetchError> {
        paginate(&self.inner.retrier, resource, Protocol::Rest, |page_info| {
            self.page(resource, page_info)
        })
        .await
    }
}

#[async_trait]
impl StoreDataSource for RestClient {
    fn protocol(&self) -> Protocol {
        Protocol::Rest
    }

    #[instrument(skip(self), fields(shop = %self.inner.shop_domain, protocol = "rest"))]
    async fn fetch_customers(&self) -> Result<Vec<CustomerRecord>, FetchError> {
        let raws = self.fetch_all(EntityKind::Customers).await?;
        Ok(normalize_collection(
            EntityKind::Customers,
            Protocol::Rest,
            &raws,
            normalize_customer,
        ))
    }

    #[instrument(skip(self), fields(shop = %self.inner.shop_domain, protocol = "rest"))]
    async fn fetch_products(&self) -> Result<Vec<ProductRecord>, FetchError> {
        let raws = self.fetch_all(EntityKind::Products).await?;
        Ok(normalize_collection(
            EntityKind::Products,
            Protocol::Rest,
            &raws,
            normalize_product,
        ))
    }

    #[instrument(skip(self), fields(shop = %self.inner.shop_domain, protocol = "rest"))]
    async fn fetch_orders(&self) -> Result<Vec<OrderRecord>, FetchError> {
        let raws = self.fetch_all(EntityKind::Orders).await?;
        Ok(normalize_collection(
            EntityKind::Orders,
            Protocol::Rest,
            &raws,
            normalize_order,
        ))
    }
}

/// `page_info` of the `rel="next"` entry of a `Link` header.
///
/// `<https://shop/admin/api/2025-01/orders.json?limit=250&page_info=abc>; rel="next"`
fn next_page_info(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;

    link.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim().replace(' ', "");
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            return None;
        }

        let url = Url::parse(target.trim_start_matches('<').trim_end_matches('>')).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "page_info")
            .map(|(_, value)| value.into_owned())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use reqwest::header::HeaderValue;

    use super::*;
    use crate::shopify::{RecordingSleeper, RetryPolicy};

    fn client() -> RestClient {
        RestClient::new(
            reqwest::Client::new(),
            "acme.myshopify.com",
            SecretString::from("shpat_test"),
            &ShopifyApiConfig::default(),
            Retrier::new(RetryPolicy::default(), Arc::new(RecordingSleeper::new())),
        )
    }

    fn link(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(LINK, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_next_page_info() {
        let headers = link(
            "<https://acme.myshopify.com/admin/api/2025-01/orders.json?limit=250&page_info=prev1>; rel=\"previous\", \
             <https://acme.myshopify.com/admin/api/2025-01/orders.json?limit=250&page_info=next2>; rel=\"next\"",
        );
        assert_eq!(next_page_info(&headers), Some("next2".to_string()));
    }

    #[test]
    fn test_no_next_link() {
        let headers = link(
            "<https://acme.myshopify.com/admin/api/2025-01/orders.json?limit=250&page_info=prev1>; rel=\"previous\"",
        );
        assert_eq!(next_page_info(&headers), None);
        assert_eq!(next_page_info(&HeaderMap::new()), None);
    }

    #[test]
    fn test_first_orders_page_url() {
        let url = client().page_url(EntityKind::Orders, None).unwrap();
        assert_eq!(
            url.as_str(),
            "https://acme.myshopify.com/admin/api/2025-01/orders.json?limit=250&status=any"
        );
    }

    #[test]
    fn test_continuation_url_drops_filters() {
        let url = client()
            .page_url(EntityKind::Orders, Some("abc"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://acme.myshopify.com/admin/api/2025-01/orders.json?limit=250&page_info=abc"
        );
    }

    #[tokio::test]
    async fn test_follows_link_pages() {
        use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let config = ShopifyApiConfig {
            base_url: Some(server.uri()),
            page_size: 1,
            ..ShopifyApiConfig::default()
        };
        let client = RestClient::new(
            reqwest::Client::new(),
            "acme.myshopify.com",
            SecretString::from("shpat_test"),
            &config,
            Retrier::new(RetryPolicy::default(), Arc::new(RecordingSleeper::new())),
        );
        let next = format!(
            "<{}/admin/api/2025-01/products.json?limit=1&page_info=p2>; rel=\"next\"",
            server.uri()
        );

        Mock::given(method("GET"))
            .and(path("/admin/api/2025-01/products.json"))
            .and(header(ACCESS_TOKEN_HEADER, "shpat_test"))
            .and(query_param_is_missing("page_info"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Link", next.as_str())
                    .set_body_json(serde_json::json!({"products": [{"id": 1, "title": "A"}]})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/api/2025-01/products.json"))
            .and(query_param("page_info", "p2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"products": [{"id": 2, "title": "B"}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let products = client.fetch_products().await.unwrap();

        let ids: Vec<&str> = products.iter().map(|p| p.external_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }
}
