use contentdeck::lock::{DeployLock, EditLock};
use contentdeck::publish::SITE_DEPLOY_LOCK;
use serde::Serialize;
use tabled::Tabled;

use crate::commands::shared::{Context, OutputFormat, format_epoch_ms, print_rows};

/// A live lock, edit or deploy.
#[derive(Debug, Serialize, Tabled)]
pub(crate) struct LockRow {
    #[tabled(rename = "Kind")]
    pub kind: &'static str,
    #[tabled(rename = "Resource")]
    pub resource: String,
    #[tabled(rename = "Holder")]
    pub holder: String,
    #[tabled(rename = "Since")]
    pub since: String,
    #[tabled(rename = "Last Seen")]
    pub last_seen: String,
}

impl From<&EditLock> for LockRow {
    fn from(lock: &EditLock) -> Self {
        Self {
            kind: "edit",
            resource: lock.resource_id.clone(),
            holder: lock.metadata.holder().to_string(),
            since: format_epoch_ms(lock.acquired_at_ms),
            last_seen: "-".to_string(),
        }
    }
}

impl From<&DeployLock> for LockRow {
    fn from(lock: &DeployLock) -> Self {
        Self {
            kind: "deploy",
            resource: lock.id.clone(),
            holder: lock.metadata.holder().to_string(),
            since: format_epoch_ms(lock.acquired_at_ms),
            last_seen: format_epoch_ms(lock.last_heartbeat_ms),
        }
    }
}

/// Handle `contentdeck locks`.
pub(crate) fn handle_locks(output: OutputFormat, ctx: &Context) {
    let mut rows: Vec<LockRow> = ctx.edit_locks.active().iter().map(LockRow::from).collect();
    if let Some(lock) = ctx.deploy_locks.current(SITE_DEPLOY_LOCK) {
        rows.push(LockRow::from(&lock));
    }

    if rows.is_empty() && matches!(output, OutputFormat::Table) {
        println!("No active locks");
        return;
    }
    print_rows(&rows, output);
}
