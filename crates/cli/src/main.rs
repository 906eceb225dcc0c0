//! StorePulse CLI - Database migrations, tenant syncs, and webhook replay.
//!
//! # Usage
//!
//! ```bash
//! # Create or update the sync tables
//! sp-cli migrate
//!
//! # Sync one tenant
//! sp-cli sync 42
//!
//! # Fetch a store without touching the database
//! SHOPIFY_ACCESS_TOKEN=shpat_... sp-cli sync --dry-run --shop acme.myshopify.com
//!
//! # Sync every tenant, one start every 5 seconds
//! sp-cli sync-all --stagger-ms 5000
//!
//! # Re-apply a captured webhook payload
//! sp-cli webhook 42 orders/paid ./payload.json
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Log filter (default: `storepulse_sync=info,sp_cli=info`)
//! - `LOG_FORMAT` - `json` for structured output, anything else for text
//! - `SENTRY_DSN` - Report errors to Sentry when set
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag (default: `development`)
//!
//! Sync settings are documented in `storepulse_sync::config`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use storepulse_core::TenantId;
use storepulse_sync::webhook::WebhookTopic;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "sp-cli")]
#[command(author, version, about = "StorePulse CLI tools")]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Sync one tenant's customers, products, and orders
    Sync {
        /// Tenant to sync
        #[arg(required_unless_present = "dry_run")]
        tenant_id: Option<TenantId>,

        /// Fetch into memory instead of the database
        #[arg(long, requires = "shop", conflicts_with = "tenant_id")]
        dry_run: bool,

        /// Shop domain for a dry run (token from `SHOPIFY_ACCESS_TOKEN`)
        #[arg(long)]
        shop: Option<String>,
    },
    /// Sync every tenant
    SyncAll {
        /// Delay between tenant starts (default: `SYNC_STAGGER_MS`)
        #[arg(long)]
        stagger_ms: Option<u64>,
    },
    /// Apply a webhook payload from a file
    Webhook {
        /// Tenant the event belongs to
        tenant_id: TenantId,

        /// Topic, e.g. `orders/paid`
        topic: WebhookTopic,

        /// Path to the JSON payload
        payload: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let _sentry_guard = init_sentry();
    init_tracing();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let output = commands::Output { json: cli.json };

    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Sync {
            tenant_id,
            dry_run,
            shop,
        } => match (tenant_id, shop) {
            (_, Some(shop)) if dry_run => commands::sync::dry_run(&shop, output).await?,
            (Some(tenant_id), _) => commands::sync::tenant(tenant_id, output).await?,
            (None, _) => return Err("a tenant id is required unless --dry-run is set".into()),
        },
        Commands::SyncAll { stagger_ms } => {
            commands::sync::all(stagger_ms.map(Duration::from_millis), output).await?;
        }
        Commands::Webhook {
            tenant_id,
            topic,
            payload,
        } => commands::webhook::apply(tenant_id, topic, &payload, output).await?,
    }
    Ok(())
}

/// Initialize Sentry when `SENTRY_DSN` is set.
fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok().filter(|dsn| !dsn.is_empty())?;
    let environment =
        std::env::var("SENTRY_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(environment.into()),
            attach_stacktrace: true,
            ..Default::default()
        },
    )))
}

/// Errors and warnings become Sentry events; info and debug become breadcrumbs.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        Level::ERROR | Level::WARN => sentry_tracing::EventFilter::Event,
        Level::INFO | Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "storepulse_sync=info,sp_cli=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");

    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}
