//! StorePulse tenant sync library.
//!
//! Pulls customers, products, and orders from a tenant's Shopify store and
//! writes them idempotently into tenant-scoped `PostgreSQL` tables.
//!
//! # Security
//!
//! Tenants' Admin API access tokens pass through this crate. They are held as
//! `SecretString` and redacted from every `Debug` implementation; never log
//! them directly.
//!
//! # Pipeline
//!
//! - [`shopify`] - GraphQL (primary) and REST (fallback) sources with
//!   pagination and bounded retry
//! - [`upsert`] - Batched idempotent writes, customer reference resolution,
//!   line item replacement
//! - [`orchestrator`] - One tenant's fetch-then-upsert run
//! - [`service`] - Entry points: `sync_tenant`, `sync_all`, `apply_webhook`
//! - [`db`] - Storage trait with `PostgreSQL` and in-memory backends

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod orchestrator;
pub mod service;
pub mod shopify;
pub mod upsert;
pub mod webhook;

pub use config::SyncConfig;
pub use error::SyncError;
pub use service::{SyncService, TenantOutcome};

/// Embedded migrations for the sync tables.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
