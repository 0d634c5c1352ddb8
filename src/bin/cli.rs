//! Board backup CLI
//!
//! Local execution entry point.

use std::path::PathBuf;

use board_backup::{
    error::{AppError, Result},
    models::{Config, DiscoveryMode},
    pipeline, remote,
    storage::{self, Destination},
};
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

/// Incremental discussion board backup
#[derive(Parser, Debug)]
#[command(
    name = "board-backup",
    version,
    about = "Incremental discussion board topic mirror"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override storage.destination (file://dir, sqlite://file.db, sqlite::memory:)
    #[arg(short, long)]
    destination: Option<String>,

    /// Override group_id
    #[arg(short, long)]
    group: Option<i64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover topics and mirror them with a worker pool
    Backup {
        /// Discovery mode: all or recent
        #[arg(long)]
        mode: Option<DiscoveryMode>,

        /// Keep polling recently updated topics until interrupted
        #[arg(long)]
        continuous: bool,
    },

    /// Discover topics and print their ids, one per line
    Enqueue {
        /// Discovery mode: all or recent
        #[arg(long)]
        mode: Option<DiscoveryMode>,

        /// Keep polling recently updated topics until interrupted
        #[arg(long)]
        continuous: bool,
    },

    /// Mirror topics whose ids are read from stdin
    Work,

    /// Validate the configuration file
    Validate,

    /// Show the stored marker of a topic
    Show {
        topic_id: i64,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, stopping discovery and draining workers...");
            token.cancel();
        }
    });
}

fn apply_discovery_overrides(config: &mut Config, mode: Option<DiscoveryMode>, continuous: bool) {
    if let Some(mode) = mode {
        config.discovery.mode = mode;
    }
    if continuous {
        config.discovery.continuous = true;
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load_or_default(&cli.config);
    if let Some(destination) = cli.destination {
        config.storage.destination = destination;
    }
    if let Some(group) = cli.group {
        config.group_id = group;
    }
    log::info!("Loaded configuration from {}", cli.config.display());

    let cancel = CancellationToken::new();

    match cli.command {
        Command::Backup { mode, continuous } => {
            apply_discovery_overrides(&mut config, mode, continuous);
            config.validate()?;

            let sessions = remote::open_sessions(&config)?;
            let storage = storage::open(&config.storage.destination, config.group_id).await?;
            cancel_on_ctrl_c(cancel.clone());

            pipeline::run_backup(&config, sessions, storage, cancel).await?;
            log::info!("Backup complete!");
        }

        Command::Enqueue { mode, continuous } => {
            apply_discovery_overrides(&mut config, mode, continuous);
            config.validate()?;

            let mut sessions = remote::open_sessions(&config)?.into_iter();
            let Some(session) = sessions.next() else {
                return Err(AppError::config("No accounts defined"));
            };
            cancel_on_ctrl_c(cancel.clone());

            let mut stdout = tokio::io::stdout();
            pipeline::run_enqueue(&config, session, &mut stdout, cancel).await?;
        }

        Command::Work => {
            config.validate()?;

            let sessions = remote::open_sessions(&config)?;
            let storage = storage::open(&config.storage.destination, config.group_id).await?;
            cancel_on_ctrl_c(cancel.clone());

            let input = BufReader::new(tokio::io::stdin());
            pipeline::run_work(&config, sessions, storage, input, cancel).await?;
            log::info!("Work queue drained!");
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            let destination = Destination::parse(&config.storage.destination)?;
            log::info!("✓ Config OK ({} accounts)", config.accounts.len());
            log::info!("✓ Destination: {:?}", destination);

            if config.accounts.len() < pipeline::MIN_BACKUP_SESSIONS {
                log::warn!(
                    "backup needs at least {} accounts; only enqueue and work will run",
                    pipeline::MIN_BACKUP_SESSIONS
                );
            }

            log::info!("All validations passed!");
        }

        Command::Show { topic_id } => {
            let storage = storage::open(&config.storage.destination, config.group_id).await?;
            match storage.find(topic_id).await? {
                Some(topic) => {
                    log::info!("Topic {}: {}", topic.id, topic.title);
                    log::info!("Updated at: {}", topic.updated_at);
                    log::info!("Comments stored: {}", topic.comments.len());
                }
                None => log::info!("Topic {} is not stored yet.", topic_id),
            }
        }
    }

    Ok(())
}
