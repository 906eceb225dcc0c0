//! Idempotent batched writes of canonical records.
//!
//! Records are written in batches of `batch_size`, one storage round trip per
//! batch. Within a batch, repeated external ids collapse to their last
//! occurrence. Orders resolve their customer reference with one lookup per
//! batch; a reference with no stored customer is written as a guest order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use storepulse_core::{CustomerRecord, ExternalId, Keyed, OrderRecord, ProductRecord, TenantId};
use tracing::{debug, instrument};

use crate::db::{OrderWrite, RepositoryError, SyncStore};

/// Writes normalized records into tenant-scoped storage.
#[derive(Clone)]
pub struct UpsertEngine {
    store: Arc<dyn SyncStore>,
    batch_size: usize,
}

impl std::fmt::Debug for UpsertEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpsertEngine")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl UpsertEngine {
    /// Create an engine. A `batch_size` of zero is treated as one.
    #[must_use]
    pub fn new(store: Arc<dyn SyncStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Upsert customers. Returns the number of records processed.
    ///
    /// # Errors
    ///
    /// Returns the storage error of the first failing batch. Earlier batches
    /// stay committed.
    #[instrument(skip(self, customers), fields(tenant_id = %tenant_id, records = customers.len()))]
    pub async fn upsert_customers(
        &self,
        tenant_id: TenantId,
        customers: &[CustomerRecord],
    ) -> Result<usize, RepositoryError> {
        for batch in customers.chunks(self.batch_size) {
            let batch = dedupe_last(batch);
            self.store.upsert_customers(tenant_id, &batch).await?;
            debug!(batch = batch.len(), "Upserted customer batch");
        }
        Ok(customers.len())
    }

    /// Upsert products. Returns the number of records processed.
    ///
    /// # Errors
    ///
    /// Returns the storage error of the first failing batch.
    #[instrument(skip(self, products), fields(tenant_id = %tenant_id, records = products.len()))]
    pub async fn upsert_products(
        &self,
        tenant_id: TenantId,
        products: &[ProductRecord],
    ) -> Result<usize, RepositoryError> {
        for batch in products.chunks(self.batch_size) {
            let batch = dedupe_last(batch);
            self.store.upsert_products(tenant_id, &batch).await?;
            debug!(batch = batch.len(), "Upserted product batch");
        }
        Ok(products.len())
    }

    /// Upsert orders with their customer references and line items.
    ///
    /// Customers must already be written for references to resolve.
    ///
    /// # Errors
    ///
    /// Returns the storage error of the first failing batch.
    #[instrument(skip(self, orders), fields(tenant_id = %tenant_id, records = orders.len()))]
    pub async fn upsert_orders(
        &self,
        tenant_id: TenantId,
        orders: &[OrderRecord],
    ) -> Result<usize, RepositoryError> {
        for batch in orders.chunks(self.batch_size) {
            let batch: Vec<OrderRecord> = dedupe_last(batch)
                .into_iter()
                .map(|mut order| {
                    order.line_items = order.line_items.map(|items| dedupe_last(&items));
                    order
                })
                .collect();

            let referenced: Vec<ExternalId> = batch
                .iter()
                .filter_map(|order| order.customer_external_id.clone())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();

            let resolved = if referenced.is_empty() {
                HashMap::new()
            } else {
                self.store
                    .resolve_customer_ids(tenant_id, &referenced)
                    .await?
            };

            let writes: Vec<OrderWrite<'_>> = batch
                .iter()
                .map(|order| {
                    let customer_id = order.customer_external_id.as_ref().and_then(|customer| {
                        let id = resolved.get(customer).copied();
                        if id.is_none() {
                            debug!(
                                order = %order.external_id,
                                customer = %customer,
                                "Customer not stored, writing guest order"
                            );
                        }
                        id
                    });
                    OrderWrite {
                        record: order,
                        customer_id,
                    }
                })
                .collect();

            self.store.upsert_orders(tenant_id, &writes).await?;
            debug!(
                batch = writes.len(),
                resolved = resolved.len(),
                "Upserted order batch"
            );
        }
        Ok(orders.len())
    }
}

/// Collapse repeated external ids, keeping the last occurrence's values at the
/// first occurrence's position.
fn dedupe_last<T: Keyed + Clone>(records: &[T]) -> Vec<T> {
    let mut positions: HashMap<&ExternalId, usize> = HashMap::with_capacity(records.len());
    let mut out: Vec<T> = Vec::with_capacity(records.len());

    for record in records {
        match positions.get(record.external_id()) {
            Some(&index) => {
                if let Some(slot) = out.get_mut(index) {
                    *slot = record.clone();
                }
            }
            None => {
                positions.insert(record.external_id(), out.len());
                out.push(record.clone());
            }
        }
    }

    out
}
