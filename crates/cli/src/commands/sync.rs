//! Tenant sync commands.
//!
//! # Usage
//!
//! ```bash
//! sp-cli sync 42
//! sp-cli sync --dry-run --shop acme.myshopify.com
//! sp-cli sync-all --stagger-ms 5000
//! ```
//!
//! A dry run fetches through the same pipeline into an in-memory store, so it
//! needs no database. The shop's token comes from `SHOPIFY_ACCESS_TOKEN`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::Serialize;
use storepulse_core::{SyncSummary, TenantId};
use storepulse_sync::db::MemoryStore;
use storepulse_sync::{SyncConfig, SyncService, TenantOutcome};
use tracing::info;

use super::{CommandError, Output, connect};

const ACCESS_TOKEN_VAR: &str = "SHOPIFY_ACCESS_TOKEN";

/// Sync one tenant from the database.
pub async fn tenant(tenant_id: TenantId, output: Output) -> Result<(), CommandError> {
    let service = connect(SyncConfig::from_env()?).await?;
    let summary = service.sync_tenant(tenant_id).await?;
    output.print(&summary)?;
    Ok(())
}

/// Sync `shop` into memory and report what would have been written.
pub async fn dry_run(shop: &str, output: Output) -> Result<(), CommandError> {
    let config = SyncConfig::from_env()?;
    let token = std::env::var(ACCESS_TOKEN_VAR)
        .map_err(|_| CommandError::MissingEnvVar(ACCESS_TOKEN_VAR))?;

    let store = Arc::new(MemoryStore::new());
    let tenant_id = store.add_tenant(shop, SecretString::from(token)).await;
    let service = SyncService::new(store.clone(), config)?;

    let summary = service.sync_tenant(tenant_id).await?;
    let guest_orders = store
        .orders(tenant_id)
        .await
        .iter()
        .filter(|order| order.customer_id.is_none())
        .count();
    info!(shop, guest_orders, "Dry run complete, nothing was written");

    output.print(&summary)?;
    Ok(())
}

/// Sync every tenant, starting one every `stagger` (default: `SYNC_STAGGER_MS`).
///
/// Fails after reporting every outcome if any tenant failed.
pub async fn all(stagger: Option<Duration>, output: Output) -> Result<(), CommandError> {
    let config = SyncConfig::from_env()?;
    let stagger = stagger.unwrap_or(config.stagger);
    let service = connect(config).await?;

    let outcomes = service.sync_all(stagger).await?;
    let total = outcomes.len();
    let mut failed = 0;
    for outcome in outcomes {
        let report = TenantReport::from(outcome);
        if report.error.is_some() {
            failed += 1;
        }
        output.print(&report)?;
    }

    if failed > 0 {
        return Err(CommandError::Incomplete { failed, total });
    }
    info!(tenants = total, "All tenants synced");
    Ok(())
}

/// One tenant's line in `sync-all` output.
#[derive(Debug, Serialize)]
struct TenantReport {
    tenant_id: TenantId,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<SyncSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<TenantOutcome> for TenantReport {
    fn from(outcome: TenantOutcome) -> Self {
        let (summary, error) = match outcome.result {
            Ok(summary) => (Some(summary), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            tenant_id: outcome.tenant_id,
            summary,
            error,
        }
    }
}

impl fmt::Display for TenantReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.summary, &self.error) {
            (Some(summary), _) => write!(f, "tenant {}: {summary}", self.tenant_id),
            (None, Some(error)) => write!(f, "tenant {}: failed: {error}", self.tenant_id),
            (None, None) => write!(f, "tenant {}", self.tenant_id),
        }
    }
}
