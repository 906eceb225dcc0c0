//! Sync error types.

use storepulse_core::TenantId;
use thiserror::Error;

use crate::config::ConfigError;
use crate::db::RepositoryError;
use crate::orchestrator::SyncState;
use crate::shopify::FallbackError;

/// Errors surfaced by a tenant sync.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Both protocols failed for one entity kind.
    #[error(transparent)]
    Fetch(#[from] FallbackError),

    /// A write failed. Batches committed before it stay committed.
    #[error("storage failed while {state}: {source}")]
    Storage {
        state: SyncState,
        #[source]
        source: RepositoryError,
    },

    /// Sync bookkeeping (tenant lookup, lease) failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("tenant {0} not found")]
    TenantNotFound(TenantId),

    /// Another run holds the tenant's sync lease.
    #[error("a sync for tenant {0} is already running")]
    AlreadyRunning(TenantId),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SyncError {
    /// The state a pipeline failure happened in, if it came from the pipeline.
    #[must_use]
    pub const fn state(&self) -> Option<SyncState> {
        match self {
            Self::Fetch(_) => Some(SyncState::Fetching),
            Self::Storage { state, .. } => Some(*state),
            _ => None,
        }
    }
}
