use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use console::style;
use contentdeck::deploy::{
    DeployStatusSource, HttpDeployStatus, HttpSiteVersion, SiteVersionSource,
};
use contentdeck::lock::{DeployLockConfig, EditLockConfig};
use contentdeck::{
    ArticleStore, ContentClient, DeployCompletionMonitor, DeployLockCoordinator,
    EditLockCoordinator, FileStorage, HttpTransport, ItemStore, LockMetadata, MediaLibrary,
    Publisher, QueueConfig, RequestQueue, ReqwestTransport, SharedStorage, StaticToken,
    StoredToken, SystemClock, TokenProvider,
};
use serde::Serialize;
use tabled::Tabled;

use crate::config::Config;

/// Per-request timeout for API and site calls.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Output format for listings.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

/// Everything a command needs, wired once per invocation.
pub(crate) struct Context {
    pub storage: Arc<dyn SharedStorage>,
    pub client: ContentClient,
    pub edit_locks: Arc<EditLockCoordinator>,
    pub deploy_locks: Arc<DeployLockCoordinator>,
    pub monitor: Arc<DeployCompletionMonitor>,
    pub publisher: Publisher,
    pub items: ItemStore,
    pub articles: ArticleStore,
    pub media: MediaLibrary,
    pub editor: String,
}

impl Context {
    pub(crate) fn build(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let dir = config
            .storage_dir()
            .ok_or("Could not determine a storage directory; set [storage] dir")?;
        tracing::debug!(dir = %dir.display(), "Opening shared storage");
        let storage: Arc<dyn SharedStorage> = Arc::new(FileStorage::open(dir)?);

        let transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::with_timeout(HTTP_TIMEOUT)?);
        let clock = Arc::new(SystemClock);

        let tokens: Arc<dyn TokenProvider> = match config.github_token() {
            Some(token) => Arc::new(StaticToken::new(token)),
            None => Arc::new(StoredToken::new(storage.clone())),
        };

        let queue = RequestQueue::spawn(
            transport.clone(),
            tokens,
            clock.clone(),
            QueueConfig::default(),
        );
        let client = ContentClient::new(queue, config.repo());

        let edit_locks = Arc::new(EditLockCoordinator::new(
            storage.clone(),
            clock.clone(),
            Arc::new(client.clone()),
            EditLockConfig::default(),
        ));
        let deploy_locks = Arc::new(DeployLockCoordinator::new(
            storage.clone(),
            clock.clone(),
            DeployLockConfig::default(),
        ));

        let status: Arc<dyn DeployStatusSource> =
            Arc::new(HttpDeployStatus::new(transport.clone(), config.status_url()));
        let site: Arc<dyn SiteVersionSource> =
            Arc::new(HttpSiteVersion::new(transport, config.site_url()));
        let monitor = Arc::new(DeployCompletionMonitor::new(status, site, config.monitor()));

        Ok(Self {
            items: ItemStore::new(client.clone(), edit_locks.clone()),
            articles: ArticleStore::new(client.clone(), edit_locks.clone()),
            media: MediaLibrary::new(client.clone(), storage.clone(), clock),
            publisher: Publisher::new(deploy_locks.clone(), monitor.clone()),
            storage,
            client,
            edit_locks,
            deploy_locks,
            monitor,
            editor: config.editor_name(),
        })
    }

    /// Lock metadata identifying this CLI session.
    pub(crate) fn lock_metadata(&self) -> LockMetadata {
        LockMetadata::for_user(&self.editor).with("client", "contentdeck-cli")
    }
}

/// Print rows as a rounded table or pretty JSON.
pub(crate) fn print_rows<T: Tabled + Serialize>(rows: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let mut table = tabled::Table::new(rows);
            table.with(tabled::settings::Style::rounded());
            println!("{}", table);
        }
        OutputFormat::Json => print_json(&rows),
    }
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!(error = %e, "Failed to serialize output"),
    }
}

pub(crate) fn success(message: impl std::fmt::Display) {
    println!("{} {}", style("✓").green().bold(), message);
}

pub(crate) fn warning(message: impl std::fmt::Display) {
    eprintln!("{} {}", style("!").yellow().bold(), message);
}

/// Shorten text for a table cell.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Render an epoch-millisecond timestamp for display.
pub(crate) fn format_epoch_ms(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// Format a duration as a human-readable string.
pub(crate) fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;

    if minutes >= 60 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate("deck", 10), "deck");
        assert_eq!(truncate("a long title here", 7), "a long…");
    }

    #[test]
    fn format_duration_picks_largest_unit() {
        assert_eq!(format_duration(chrono::Duration::seconds(42)), "42s");
        assert_eq!(format_duration(chrono::Duration::seconds(125)), "2m 5s");
        assert_eq!(format_duration(chrono::Duration::seconds(3_725)), "1h 2m");
        assert_eq!(format_duration(chrono::Duration::seconds(-5)), "0s");
    }

    #[test]
    fn format_epoch_ms_is_utc() {
        assert_eq!(format_epoch_ms(0), "1970-01-01 00:00:00 UTC");
    }
}
