//! Filecache - command-line access to a persistent file cache
//!
//! Reads and writes entries of one cache namespace. Values are given and
//! printed as JSON; logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use filecache::cache::{AsyncFileCache, CacheValue, FileCacheBuilder, Ttl};
use filecache::fs::{FileSystem, FsError, LocalFileSystem, DEFAULT_DIR_MODE};
use filecache::Config;

/// Filecache - inspect and edit a persistent file cache
#[derive(Parser, Debug)]
#[command(name = "filecache")]
#[command(about = "Persistent filesystem-backed key/value cache")]
#[command(version)]
struct Cli {
    /// Storage root, created if missing, holding the cache namespaces (overrides CACHE_STORAGE_PATH)
    #[arg(long, global = true, value_name = "DIR")]
    storage: Option<PathBuf>,

    /// Cache namespace (overrides CACHE_NAME)
    #[arg(long, global = true, value_name = "NAMESPACE")]
    name: Option<String>,

    /// Shard directory depth (overrides CACHE_SHARD_LEVELS)
    #[arg(long, global = true, value_name = "N")]
    shard_levels: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the value stored under KEY as JSON
    Get {
        key: String,
        /// JSON printed on a miss (default: null)
        #[arg(long, value_name = "JSON")]
        default: Option<String>,
    },
    /// Store a JSON value under KEY
    Set {
        key: String,
        #[arg(value_name = "JSON")]
        value: String,
        /// Seconds until the entry expires; omit to never expire
        #[arg(long, value_name = "SECS", allow_hyphen_values = true)]
        ttl: Option<i64>,
        /// Store the value as an opaque object instead of structurally
        #[arg(long)]
        object: bool,
    },
    /// Remove the entry stored under KEY
    Delete { key: String },
    /// Remove every entry of the namespace
    Clear,
    /// Print an entry with its metadata, without removing expired entries
    Inspect { key: String },
    /// Remove expired and invalid entries
    Prune,
}

fn parse_json(input: &str) -> Result<Value> {
    serde_json::from_str(input).with_context(|| format!("Value is not valid JSON: {input}"))
}

/// Creates the storage root if it is missing. Any failure is left for the
/// cache builder to report as unavailable storage.
fn ensure_storage_root(fs: &dyn FileSystem, root: &Path) {
    match fs.create_dir(root, DEFAULT_DIR_MODE, true) {
        Ok(()) => info!(path = %root.display(), "Created storage root"),
        Err(FsError::AlreadyExists(_)) => {}
        Err(err) => debug!(path = %root.display(), error = %err, "Could not create storage root"),
    }
}

fn load_config(cli: &Cli) -> Config {
    let mut config = Config::from_env();
    if let Some(storage) = &cli.storage {
        config.storage_path = storage.clone();
    }
    if let Some(name) = &cli.name {
        config.cache_name = name.clone();
    }
    if let Some(levels) = cli.shard_levels {
        config.shard_levels = levels;
    }
    config
}

/// Runs one cache command and prints its result to stdout.
async fn run(cache: &AsyncFileCache, command: Command) -> Result<()> {
    match command {
        Command::Get { key, default } => {
            let default = match default {
                Some(raw) => CacheValue::try_from_json(parse_json(&raw)?)?,
                None => CacheValue::Null,
            };
            let value = cache.get_or(&key, default).await?;
            println!("{}", value.to_json());
        }
        Command::Set {
            key,
            value,
            ttl,
            object,
        } => {
            let json = parse_json(&value)?;
            let value = if object {
                CacheValue::Object(json)
            } else {
                CacheValue::try_from_json(json)?
            };
            cache.set(&key, value, Ttl::from(ttl)).await?;
            info!(key = %key, "Stored entry");
        }
        Command::Delete { key } => {
            cache.delete(&key).await?;
            info!(key = %key, "Deleted entry");
        }
        Command::Clear => cache.clear().await?,
        Command::Inspect { key } => {
            let info = cache.inspect(&key).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Prune => {
            let report = cache.prune_expired().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine readable
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "filecache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli);
    debug!(?config, "Configuration loaded");

    let fs = Arc::new(LocalFileSystem::new());
    ensure_storage_root(fs.as_ref(), &config.storage_path);

    let cache = FileCacheBuilder::from_config(&config)
        .filesystem(fs)
        .build()
        .context("Failed to open cache")?;

    run(&AsyncFileCache::new(cache), cli.command).await
}
