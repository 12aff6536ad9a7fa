use anyhow::{Context, Result};
use clap::Parser;
use std::io::{Read, Write};
use std::path::PathBuf;

use markfeed::config::Config;
use markfeed::links::extract_links;
use markfeed::report;
use markfeed::store::LinkStore;

/// Get the config directory path (~/.config/markfeed/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let config_dir = PathBuf::from(home).join(".config").join("markfeed");
    Ok(config_dir)
}

#[derive(Parser, Debug)]
#[command(
    name = "markfeed",
    version,
    about = "Report new articles from the feeds behind your bookmarks"
)]
struct Args {
    /// Bookmark HTML file to read (default: stdin)
    #[arg(long, value_name = "FILE")]
    bookmarks: Option<PathBuf>,

    /// Link store JSON file
    #[arg(long, value_name = "FILE")]
    store: Option<PathBuf>,

    /// Config file (default: ~/.config/markfeed/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of links checked concurrently
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Show unread articles without marking them read
    #[arg(long)]
    keep_unread: bool,

    /// Do not write the link store back
    #[arg(long)]
    dry_run: bool,
}

fn read_bookmarks(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read bookmarks from {}", path.display())),
        None => {
            let mut html = String::new();
            std::io::stdin()
                .read_to_string(&mut html)
                .context("Failed to read bookmarks from stdin")?;
            Ok(html)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the report, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let mut settings = config.update_settings();
    if let Some(workers) = args.workers {
        settings.workers = workers.max(1);
    }

    let store_path = args
        .store
        .clone()
        .or_else(|| config.store_path.clone())
        .unwrap_or_else(|| config_dir.join("links.json"));
    let mut store = LinkStore::load(&store_path)
        .with_context(|| format!("Could not load {}", store_path.display()))?;

    let html = read_bookmarks(args.bookmarks.as_ref())?;
    let bookmarks = extract_links(&html);
    if bookmarks.is_empty() {
        tracing::warn!("No links found in bookmark input");
    }
    for link in &bookmarks {
        store.interested_in(&link.url, &link.title);
    }

    // No request timeout: a slow site only delays its own worker
    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .build()
        .context("Failed to build HTTP client")?;

    store.check_for_updates(&client, &settings).await;

    let output = report::render(&mut store, args.keep_unread);
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(output.as_bytes())
        .and_then(|()| stdout.flush())
        .context("Failed to write report")?;

    if args.dry_run {
        tracing::info!("Dry run, link store not saved");
    } else {
        store
            .save(&store_path)
            .with_context(|| format!("Failed to save {}", store_path.display()))?;
    }

    Ok(())
}
