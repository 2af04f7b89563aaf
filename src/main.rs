use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

use wikiscroll::config::Config;
use wikiscroll::content::WikipediaClient;
use wikiscroll::feed::{Feed, Mode, RenderInstruction, Tile};
use wikiscroll::storage::{Database, DatabaseError};
use wikiscroll::util::{strip_control_chars, truncate_to_width};

/// Column budget for titles and summaries in the printed stream.
const LINE_WIDTH: usize = 72;

/// Get the config directory path (~/.config/wikiscroll/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("wikiscroll"))
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StartMode {
    Discover,
    ForYou,
}

impl From<StartMode> for Mode {
    fn from(mode: StartMode) -> Self {
        match mode {
            StartMode::Discover => Mode::Discover,
            StartMode::ForYou => Mode::ForYou,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "wikiscroll",
    about = "Headless driver for the wikiscroll feed engine"
)]
struct Args {
    /// Config file (defaults to ~/.config/wikiscroll/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Reset database (delete and recreate)
    #[arg(long)]
    reset_db: bool,

    /// Stream to start in
    #[arg(long, value_enum, default_value = "discover")]
    mode: StartMode,

    /// How many times to swipe to the next item (or batch, in for-you)
    #[arg(long, default_value_t = 5)]
    count: usize,
}

/// Print render instructions as they arrive.
fn describe(instruction: &RenderInstruction) -> String {
    match instruction {
        RenderInstruction::Materialize { mode, entry, tile } => {
            let body = match tile {
                Tile::Article(item) => {
                    let title = strip_control_chars(&item.title);
                    let badge = item
                        .match_percent()
                        .map(|p| format!(" ({}% Match)", p))
                        .unwrap_or_default();
                    let summary = strip_control_chars(&item.summary_text);
                    format!(
                        "{}{}\n        {}",
                        truncate_to_width(&title, LINE_WIDTH),
                        badge,
                        truncate_to_width(&summary, LINE_WIDTH)
                    )
                }
                Tile::Error { message } => format!("[could not load: {}]", message),
                Tile::Onboarding { topics_known } => format!(
                    "[keep scrolling Discover to personalize: {} topics learned so far]",
                    topics_known
                ),
                Tile::NoRecommendations => "[no recommendations yet, try again]".to_string(),
                Tile::LoadMore { retry: false } => "[load more]".to_string(),
                Tile::LoadMore { retry: true } => "[try again]".to_string(),
            };
            format!("+ {:<8} #{:<4} {}", mode, entry, body)
        }
        RenderInstruction::Evict { mode, entry } => format!("- {:<8} #{}", mode, entry),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        println!("Created config directory: {}", config_dir.display());
    }

    // Set directory permissions on Unix (user-only access)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = config_dir.join("wikiscroll.db");
    if args.reset_db && db_path.exists() {
        std::fs::remove_file(&db_path).context("Failed to delete database")?;
        println!("Database reset.");
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of wikiscroll appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    let client = WikipediaClient::new(&config.base_url, config.request_timeout())
        .context("Failed to create content client")?;

    let (mut feed, mut rx) = Feed::new(Arc::new(client), db, config.feed_settings());

    let printer = tokio::spawn(async move {
        while let Some(instruction) = rx.recv().await {
            println!("{}", describe(&instruction));
        }
    });

    feed.start(args.mode.into()).await;
    for _ in 1..args.count {
        feed.on_advance().await;
    }
    feed.on_visibility_changed(true).await;

    let top = feed.top_topics(5);
    if !top.is_empty() {
        println!();
        println!("Top topics:");
        for (topic, weight) in top {
            println!("  {:<24} {:.3}", topic, weight);
        }
    }

    // Closing the channel lets the printer drain and exit
    drop(feed);
    printer.await.context("Printer task failed")?;

    Ok(())
}
