//! Contentdeck CLI - command-line admin for a GitHub-hosted static site.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

use crate::commands::shared::{Context, OutputFormat};

#[derive(Parser)]
#[command(name = "contentdeck")]
#[command(version)]
#[command(about = "Content admin for a GitHub-hosted static site")]
#[command(
    long_about = "Contentdeck edits the archive items and articles of a static site stored \
in a GitHub repository, uploads media, and follows the rebuild until the new \
version is live. Edits take advisory locks in a shared storage directory so \
several editors can see each other."
)]
#[command(after_long_help = r#"EXAMPLES
    Save a token and list archive items:
        $ contentdeck login --token ghp_...
        $ contentdeck items list

    Update an item and wait for the site to rebuild:
        $ contentdeck items save ./new-deck.yml --deploy

    Publish an article from a Markdown file with frontmatter:
        $ contentdeck articles save ./report.md --deploy

    See who is editing what:
        $ contentdeck locks

    Generate shell completions:
        $ contentdeck completions bash > ~/.local/share/bash-completion/completions/contentdeck

CONFIGURATION
    Contentdeck reads configuration from:
      1. ~/.config/contentdeck/config.toml (or $XDG_CONFIG_HOME/contentdeck/config.toml)
      2. ./contentdeck.toml
      3. Environment variables (CONTENTDECK_* prefix, e.g., CONTENTDECK_GITHUB_TOKEN)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    CONTENTDECK_GITHUB_TOKEN    GitHub token
    CONTENTDECK_GITHUB_OWNER    Repository owner
    CONTENTDECK_GITHUB_REPO     Repository name
    CONTENTDECK_GITHUB_BRANCH   Branch to edit (default: main)
    CONTENTDECK_SITE_URL        Live site root
    CONTENTDECK_STORAGE_DIR     Shared lock storage (default: ~/.local/state/contentdeck/storage)
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a GitHub token for future use
    ///
    /// With --token the token is written to the config file. With --browser
    /// the OAuth worker URL is printed and the callback message is read from
    /// stdin.
    Login {
        /// Personal access token
        #[arg(short, long, conflicts_with = "browser")]
        token: Option<String>,

        /// Log in through the OAuth worker
        #[arg(short, long)]
        browser: bool,
    },
    /// Forget the token cached in shared storage
    Logout,
    /// Archive items (YAML)
    Items {
        #[command(subcommand)]
        action: ItemsAction,
    },
    /// Articles (Markdown with frontmatter)
    Articles {
        #[command(subcommand)]
        action: ArticlesAction,
    },
    /// Uploaded media
    Media {
        #[command(subcommand)]
        action: MediaAction,
    },
    /// Follow site deploys
    Deploy {
        #[command(subcommand)]
        action: DeployAction,
    },
    /// Show active edit and deploy locks
    Locks {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Show the GitHub API rate limit budget
    Limits {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
        /// Write the script into this directory instead of stdout
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Options for commands that commit content.
#[derive(Debug, Clone, clap::Args)]
struct CommitOptions {
    /// Wait for the site to rebuild and report when the change is live
    #[arg(short, long)]
    deploy: bool,
}

#[derive(Subcommand)]
enum ItemsAction {
    /// List all items
    List {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Print one item as YAML
    Show {
        /// Item id (file name without .yml)
        id: String,
    },
    /// Search string fields (case-insensitive)
    Search {
        query: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Check a YAML file against the item schema without saving
    Validate {
        file: PathBuf,
    },
    /// Create or update an item from a YAML file
    Save {
        file: PathBuf,

        #[command(flatten)]
        commit: CommitOptions,
    },
    /// Delete an item
    Delete {
        id: String,

        #[command(flatten)]
        commit: CommitOptions,
    },
}

#[derive(Subcommand)]
enum ArticlesAction {
    /// List all articles
    List {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Print one article
    Show {
        filename: String,
    },
    /// Search title, frontmatter and body (case-insensitive)
    Search {
        query: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Create or update an article from a Markdown file
    Save {
        file: PathBuf,

        /// Name in the repository (defaults to the file's name)
        #[arg(short, long)]
        name: Option<String>,

        #[command(flatten)]
        commit: CommitOptions,
    },
    /// Delete an article
    Delete {
        filename: String,

        #[command(flatten)]
        commit: CommitOptions,
    },
}

#[derive(Subcommand)]
enum MediaAction {
    /// List uploaded images
    List {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Upload images (jpeg, png, webp, gif; 5 MB max each)
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
}

#[derive(Subcommand)]
enum DeployAction {
    /// Print the version marker of the live site
    Version,
    /// Watch a deploy until the live version changes from --since
    Watch {
        /// Version live before the change was committed
        #[arg(short, long)]
        since: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Structured logging only when not attached to a TTY
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("contentdeck=info,contentdeck_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config = config::Config::load();

    let cli = Cli::parse();

    // Commands that need no storage or network
    match &cli.command {
        Commands::Completions { shell, dir } => {
            commands::meta::handle_completions(*shell, dir.as_deref())?;
            return Ok(());
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output.as_deref())?;
            return Ok(());
        }
        Commands::Login { token, browser } => {
            commands::login::handle_login(token.clone(), *browser, &config)?;
            return Ok(());
        }
        _ => {}
    }

    let ctx = Context::build(&config)?;

    let monitor = ctx.monitor.clone();
    shutdown::setup_shutdown_handler(move || monitor.stop_monitoring());

    match cli.command {
        Commands::Logout => commands::login::handle_logout(&ctx)?,
        Commands::Items { action } => commands::items::handle_items(action, &ctx).await?,
        Commands::Articles { action } => {
            commands::articles::handle_articles(action, &ctx).await?
        }
        Commands::Media { action } => commands::media::handle_media(action, &ctx).await?,
        Commands::Deploy { action } => commands::deploy::handle_deploy(action, &ctx).await?,
        Commands::Locks { output } => commands::locks::handle_locks(output, &ctx),
        Commands::Limits { output } => commands::limits::handle_limits(output, &ctx).await?,
        Commands::Completions { .. } | Commands::Man { .. } | Commands::Login { .. } => {}
    }

    Ok(())
}
