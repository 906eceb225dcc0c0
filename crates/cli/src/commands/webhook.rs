//! Webhook replay command.
//!
//! ```bash
//! sp-cli webhook 42 orders/paid ./payload.json
//! ```
//!
//! Applies a captured payload exactly as a live delivery would be applied.
//! The payload's signature is not checked.

use std::path::Path;

use serde_json::Value;
use storepulse_core::TenantId;
use storepulse_sync::SyncConfig;
use storepulse_sync::webhook::WebhookTopic;

use super::{CommandError, Output, connect};

/// Apply the payload at `path` for `tenant_id`.
pub async fn apply(
    tenant_id: TenantId,
    topic: WebhookTopic,
    path: &Path,
    output: Output,
) -> Result<(), CommandError> {
    let payload: Value = serde_json::from_str(&tokio::fs::read_to_string(path).await?)?;

    let service = connect(SyncConfig::from_env()?).await?;
    let external_id = service.apply_webhook(tenant_id, topic, &payload).await?;

    output.print(&external_id)?;
    Ok(())
}
