//! `PostgreSQL` backend.
//!
//! Upserts bind one array per column and expand them with `UNNEST`, so a
//! batch of any size is a single statement.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use sqlx::PgPool;
use storepulse_core::{
    CustomerId, CustomerRecord, ExternalId, OrderId, ProductRecord, TenantId,
};
use tracing::{debug, instrument};

use super::{OrderWrite, RepositoryError, SyncStore, Tenant};

/// Internal row type for `PostgreSQL` queries.
#[derive(Debug, sqlx::FromRow)]
struct TenantRow {
    id: TenantId,
    shop_domain: String,
    access_token: String,
    last_synced_at: Option<DateTime<Utc>>,
}

impl From<TenantRow> for Tenant {
    fn from(row: TenantRow) -> Self {
        Self {
            id: row.id,
            shop_domain: row.shop_domain,
            access_token: SecretString::from(row.access_token),
            last_synced_at: row.last_synced_at,
        }
    }
}

/// [`SyncStore`] over a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PgSyncStore {
    pool: PgPool,
}

impl PgSyncStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn external_ids<'a, I>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a ExternalId>,
{
    ids.into_iter().map(|id| id.as_str().to_owned()).collect()
}

#[async_trait]
impl SyncStore for PgSyncStore {
    async fn get_tenant(&self, id: TenantId) -> Result<Option<Tenant>, RepositoryError> {
        let row = sqlx::query_as::<_, TenantRow>(
            r"
            SELECT id, shop_domain, access_token, last_synced_at
            FROM tenants
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Tenant::from))
    }

    async fn list_tenant_ids(&self) -> Result<Vec<TenantId>, RepositoryError> {
        let ids = sqlx::query_scalar::<_, TenantId>("SELECT id FROM tenants ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn claim_sync(
        &self,
        id: TenantId,
        ttl: Duration,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let claimed_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            r"
            UPDATE tenants
            SET sync_claimed_at = now()
            WHERE id = $1
              AND (sync_claimed_at IS NULL
                   OR sync_claimed_at < now() - make_interval(secs => $2))
            RETURNING sync_claimed_at
            ",
        )
        .bind(id)
        .bind(ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(claimed_at)
    }

    async fn release_sync(
        &self,
        id: TenantId,
        claimed_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE tenants SET sync_claimed_at = NULL WHERE id = $1 AND sync_claimed_at = $2",
        )
        .bind(id)
        .bind(claimed_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_sync_completed(
        &self,
        id: TenantId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE tenants SET last_synced_at = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, customers), fields(batch = customers.len()))]
    async fn upsert_customers(
        &self,
        tenant_id: TenantId,
        customers: &[CustomerRecord],
    ) -> Result<(), RepositoryError> {
        let ids = external_ids(customers.iter().map(|c| &c.external_id));
        let emails: Vec<Option<String>> = customers.iter().map(|c| c.email.clone()).collect();
        let first_names: Vec<Option<String>> =
            customers.iter().map(|c| c.first_name.clone()).collect();
        let last_names: Vec<Option<String>> =
            customers.iter().map(|c| c.last_name.clone()).collect();
        let totals: Vec<Decimal> = customers.iter().map(|c| c.total_spent).collect();

        sqlx::query(
            r"
            INSERT INTO customers (tenant_id, external_id, email, first_name, last_name, total_spent)
            SELECT $1, * FROM UNNEST($2::text[], $3::text[], $4::text[], $5::text[], $6::numeric[])
            ON CONFLICT (tenant_id, external_id) DO UPDATE SET
                email = EXCLUDED.email,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                total_spent = EXCLUDED.total_spent,
                updated_at = now()
            ",
        )
        .bind(tenant_id)
        .bind(ids)
        .bind(emails)
        .bind(first_names)
        .bind(last_names)
        .bind(totals)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, products), fields(batch = products.len()))]
    async fn upsert_products(
        &self,
        tenant_id: TenantId,
        products: &[ProductRecord],
    ) -> Result<(), RepositoryError> {
        let ids = external_ids(products.iter().map(|p| &p.external_id));
        let titles: Vec<Option<String>> = products.iter().map(|p| p.title.clone()).collect();
        let vendors: Vec<Option<String>> = products.iter().map(|p| p.vendor.clone()).collect();
        let types: Vec<Option<String>> =
            products.iter().map(|p| p.product_type.clone()).collect();
        let prices: Vec<Decimal> = products.iter().map(|p| p.price).collect();

        sqlx::query(
            r"
            INSERT INTO products (tenant_id, external_id, title, vendor, product_type, price)
            SELECT $1, * FROM UNNEST($2::text[], $3::text[], $4::text[], $5::text[], $6::numeric[])
            ON CONFLICT (tenant_id, external_id) DO UPDATE SET
                title = EXCLUDED.title,
                vendor = EXCLUDED.vendor,
                product_type = EXCLUDED.product_type,
                price = EXCLUDED.price,
                updated_at = now()
            ",
        )
        .bind(tenant_id)
        .bind(ids)
        .bind(titles)
        .bind(vendors)
        .bind(types)
        .bind(prices)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn resolve_customer_ids(
        &self,
        tenant_id: TenantId,
        external_ids_to_find: &[ExternalId],
    ) -> Result<HashMap<ExternalId, CustomerId>, RepositoryError> {
        if external_ids_to_find.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, (String, CustomerId)>(
            r"
            SELECT external_id, id
            FROM customers
            WHERE tenant_id = $1 AND external_id = ANY($2::text[])
            ",
        )
        .bind(tenant_id)
        .bind(external_ids(external_ids_to_find))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(external_id, id)| {
                ExternalId::parse(&external_id)
                    .map(|external_id| (external_id, id))
                    .ok_or_else(|| {
                        RepositoryError::DataCorruption(format!("customer {id} has a blank external id"))
                    })
            })
            .collect()
    }

    #[instrument(skip(self, orders), fields(batch = orders.len()))]
    async fn upsert_orders(
        &self,
        tenant_id: TenantId,
        orders: &[OrderWrite<'_>],
    ) -> Result<(), RepositoryError> {
        let ids = external_ids(orders.iter().map(|o| &o.record.external_id));
        let numbers: Vec<Option<String>> = orders
            .iter()
            .map(|o| o.record.order_number.clone())
            .collect();
        let totals: Vec<Decimal> = orders.iter().map(|o| o.record.total_price).collect();
        let dates: Vec<Option<DateTime<Utc>>> =
            orders.iter().map(|o| o.record.order_date).collect();
        let customer_ids: Vec<Option<i64>> = orders
            .iter()
            .map(|o| o.customer_id.map(|id| id.as_i64()))
            .collect();

        let mut tx = self.pool.begin().await?;

        let stored: Vec<(OrderId, String)> = sqlx::query_as(
            r"
            INSERT INTO orders (tenant_id, external_id, order_number, total_price, order_date, customer_id)
            SELECT $1, * FROM UNNEST($2::text[], $3::text[], $4::numeric[], $5::timestamptz[], $6::int8[])
            ON CONFLICT (tenant_id, external_id) DO UPDATE SET
                order_number = EXCLUDED.order_number,
                total_price = EXCLUDED.total_price,
                order_date = EXCLUDED.order_date,
                customer_id = EXCLUDED.customer_id,
                updated_at = now()
            RETURNING id, external_id
            ",
        )
        .bind(tenant_id)
        .bind(ids)
        .bind(numbers)
        .bind(totals)
        .bind(dates)
        .bind(customer_ids)
        .fetch_all(&mut *tx)
        .await?;

        let order_ids: HashMap<&str, OrderId> = stored
            .iter()
            .map(|(id, external_id)| (external_id.as_str(), *id))
            .collect();

        let mut replaced: Vec<i64> = Vec::new();
        let mut line_order_ids: Vec<i64> = Vec::new();
        let mut line_ids: Vec<String> = Vec::new();
        let mut line_titles: Vec<Option<String>> = Vec::new();
        let mut line_quantities: Vec<i32> = Vec::new();
        let mut line_prices: Vec<Decimal> = Vec::new();

        for order in orders {
            let Some(items) = &order.record.line_items else {
                continue;
            };
            let order_id = order_ids
                .get(order.record.external_id.as_str())
                .ok_or_else(|| {
                    RepositoryError::DataCorruption(format!(
                        "order {} missing from upsert result",
                        order.record.external_id
                    ))
                })?
                .as_i64();

            replaced.push(order_id);
            for item in items {
                line_order_ids.push(order_id);
                line_ids.push(item.external_id.as_str().to_owned());
                line_titles.push(item.title.clone());
                line_quantities.push(item.quantity);
                line_prices.push(item.price);
            }
        }

        if !replaced.is_empty() {
            sqlx::query("DELETE FROM order_line_items WHERE order_id = ANY($1::int8[])")
                .bind(&replaced)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                r"
                INSERT INTO order_line_items (order_id, external_id, title, quantity, price)
                SELECT * FROM UNNEST($1::int8[], $2::text[], $3::text[], $4::int4[], $5::numeric[])
                ",
            )
            .bind(&line_order_ids)
            .bind(&line_ids)
            .bind(&line_titles)
            .bind(&line_quantities)
            .bind(&line_prices)
            .execute(&mut *tx)
            .await?;

            debug!(
                orders = replaced.len(),
                line_items = line_ids.len(),
                "Replaced line items"
            );
        }

        tx.commit().await?;
        Ok(())
    }
}
