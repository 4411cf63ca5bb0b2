//! Configuration file support for contentdeck.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `CONTENTDECK_`, e.g., `CONTENTDECK_GITHUB_TOKEN`)
//! 3. Config file (./contentdeck.toml or ~/.config/contentdeck/config.toml)
//! 4. Built-in defaults
//!
//! Lock records and the cached token live in a storage directory that defaults
//! to `~/.local/state/contentdeck/storage` on Linux.
//!
//! Example config file:
//! ```toml
//! [github]
//! token = "ghp_..."  # or use CONTENTDECK_GITHUB_TOKEN env var
//! owner = "eventhorizon-mtg"
//! repo = "eventhorizon-mtg.github.io"
//! branch = "main"
//!
//! [site]
//! url = "https://eventhorizon-mtg.github.io"
//! status = "https://eventhorizon-mtg.github.io/api/deploy-status"  # optional
//!
//! [auth]
//! worker = "https://auth.eventhorizon-mtg.workers.dev"
//! scope = "repo"
//!
//! [storage]
//! dir = "/shared/contentdeck"  # share with other clients to see their locks
//!
//! [deploy]
//! attempts = 30
//! timeout = 180  # seconds
//!
//! [editor]
//! name = "ada"
//! ```

use std::path::PathBuf;
use std::time::Duration;
use std::{fs, io};

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use contentdeck::RepoConfig;
use contentdeck::deploy::{DEFAULT_MAX_ATTEMPTS, DEFAULT_MONITOR_TIMEOUT, MonitorConfig};
use directories::ProjectDirs;
use serde::Deserialize;

const APP_NAME: &str = "contentdeck";

/// Live site used when none is configured.
pub const DEFAULT_SITE_URL: &str = "https://eventhorizon-mtg.github.io";

/// OAuth worker used when none is configured.
pub const DEFAULT_AUTH_WORKER: &str = "https://auth.eventhorizon-mtg.workers.dev";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub site: SiteConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub deploy: DeployConfig,
    pub editor: EditorConfig,
}

/// GitHub repository and credentials.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token.
    /// Can also be set via CONTENTDECK_GITHUB_TOKEN environment variable.
    pub token: Option<String>,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub branch: Option<String>,
}

/// The deployed site.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Site root carrying the `version="..."` marker.
    pub url: Option<String>,
    /// Deploy status endpoint. Defaults to `{url}/api/deploy-status`.
    pub status: Option<String>,
}

/// OAuth worker settings for `contentdeck login --browser`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub worker: String,
    pub scope: String,
    pub client: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            worker: DEFAULT_AUTH_WORKER.to_string(),
            scope: "repo".to_string(),
            client: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding lock records and the cached token.
    pub dir: Option<PathBuf>,
}

/// Deploy monitoring limits.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub attempts: u32,
    /// Seconds before monitoring gives up.
    pub timeout: u64,
    /// Stop after this many complete polls without a version change.
    pub unchanged: Option<u32>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_MAX_ATTEMPTS,
            timeout: DEFAULT_MONITOR_TIMEOUT.as_secs(),
            unchanged: None,
        }
    }
}

/// Who shows up as the holder of locks taken by this CLI.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub name: Option<String>,
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/contentdeck/config.toml)
    /// 3. Local config file (./contentdeck.toml)
    /// 4. Environment variables with CONTENTDECK_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("contentdeck.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./contentdeck.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // e.g., CONTENTDECK_GITHUB_TOKEN -> github.token
        builder = builder.add_source(
            Environment::with_prefix("CONTENTDECK")
                .separator("_")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    pub fn github_token(&self) -> Option<String> {
        self.github.token.clone().filter(|t| !t.is_empty())
    }

    /// Target repository, filling gaps from the built-in defaults.
    pub fn repo(&self) -> RepoConfig {
        let defaults = RepoConfig::default();
        RepoConfig::new(
            self.github.owner.clone().unwrap_or(defaults.owner),
            self.github.repo.clone().unwrap_or(defaults.name),
            self.github.branch.clone().unwrap_or(defaults.branch),
        )
    }

    pub fn site_url(&self) -> String {
        let url = self.site.url.as_deref().unwrap_or(DEFAULT_SITE_URL);
        format!("{}/", url.trim_end_matches('/'))
    }

    pub fn status_url(&self) -> String {
        self.site
            .status
            .clone()
            .unwrap_or_else(|| format!("{}api/deploy-status", self.site_url()))
    }

    pub fn monitor(&self) -> MonitorConfig {
        MonitorConfig {
            max_attempts: self.deploy.attempts,
            timeout: Duration::from_secs(self.deploy.timeout),
            max_unchanged_polls: self.deploy.unchanged,
            ..MonitorConfig::default()
        }
    }

    /// Configured editor name, then `$USER`, then the app name.
    pub fn editor_name(&self) -> String {
        self.editor
            .name
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| APP_NAME.to_string())
    }

    pub fn storage_dir(&self) -> Option<PathBuf> {
        self.storage
            .dir
            .clone()
            .or_else(|| Self::default_state_dir().map(|dir| dir.join("storage")))
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/contentdeck` or `~/.local/state/contentdeck`.
    /// On macOS/Windows, falls back to the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| {
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }

    /// Save a GitHub token to the config file.
    ///
    /// Creates the config file and parent directories if they don't exist.
    /// If a config file already exists, it updates only the `[github]` section,
    /// preserving formatting, comments, and other settings.
    pub fn save_github_token(token: &str) -> io::Result<PathBuf> {
        let config_path = Self::default_config_path().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine config directory",
            )
        })?;
        write_token(&config_path, token)?;
        Ok(config_path)
    }
}

fn write_token(config_path: &std::path::Path, token: &str) -> io::Result<()> {
    use toml_edit::{DocumentMut, value};

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = if config_path.exists() {
        fs::read_to_string(config_path)?
    } else {
        String::new()
    };

    let mut doc: DocumentMut = content.parse().map_err(|e| {
        io::Error::new(io::ErrorKind::InvalidData, format!("Invalid TOML: {}", e))
    })?;

    if !doc.contains_key("github") {
        doc["github"] = toml_edit::table();
    }
    doc["github"]["token"] = value(token);

    fs::write(config_path, doc.to_string())
}
