//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! sp-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` - `PostgreSQL` connection string
//!
//! # Migration Files
//!
//! Sync migrations live in `crates/sync/migrations/` and are embedded in the
//! binary at build time.

use storepulse_sync::SyncConfig;
use storepulse_sync::config::ConfigError;
use storepulse_sync::db::create_pool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run the sync table migrations.
pub async fn run() -> Result<(), MigrationError> {
    let config = SyncConfig::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = create_pool(config.require_database_url()?).await?;

    tracing::info!("Running sync migrations...");
    storepulse_sync::MIGRATOR.run(&pool).await?;

    tracing::info!("Sync migrations complete");
    Ok(())
}
