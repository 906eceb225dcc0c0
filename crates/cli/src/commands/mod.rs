//! CLI command implementations.

pub mod migrate;
pub mod sync;
pub mod webhook;

use std::fmt::Display;
use std::sync::Arc;

use serde::Serialize;
use storepulse_sync::config::ConfigError;
use storepulse_sync::db::{PgSyncStore, create_pool};
use storepulse_sync::webhook::WebhookError;
use storepulse_sync::{SyncConfig, SyncError, SyncService};
use thiserror::Error;

/// Errors shared by the sync and webhook commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("{failed} of {total} tenant syncs failed")]
    Incomplete { failed: usize, total: usize },

    #[error("Failed to read payload: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How results are written to stdout.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    /// Print `value` as one line of JSON or as its `Display` form.
    pub fn print<T: Serialize + Display>(self, value: &T) -> Result<(), serde_json::Error> {
        let line = if self.json {
            serde_json::to_string(value)?
        } else {
            value.to_string()
        };

        #[allow(clippy::print_stdout)]
        {
            println!("{line}");
        }
        Ok(())
    }
}

/// Build a service backed by `DATABASE_URL`.
async fn connect(config: SyncConfig) -> Result<SyncService, CommandError> {
    tracing::info!("Connecting to database...");
    let pool = create_pool(config.require_database_url()?).await?;
    Ok(SyncService::new(Arc::new(PgSyncStore::new(pool)), config)?)
}
