//! # upfs CLI
//!
//! Serve a flat upload store as a read-only virtual filesystem.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use upfs_config::logging::{init_logging, LogLevel};
use upfs_config::Config;
use upfs_daemon::run_daemon;
use upfs_store::{resolve, Index, StoreLayout};

/// upfs - Hot-reloading virtual filesystem over a flat upload store
#[derive(Parser)]
#[command(name = "upfs")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the refresh daemon, optionally mounting the filesystem
    Serve {
        /// Flat store directory
        #[arg(long, value_name = "DIR")]
        store: Option<PathBuf>,

        /// Mount the virtual filesystem here (FUSE)
        #[arg(long, value_name = "DIR")]
        mountpoint: Option<PathBuf>,

        /// Write the HTML listing page here on every refresh
        #[arg(long, value_name = "FILE")]
        listing: Option<PathBuf>,
    },

    /// Index the store once and print the virtual names
    Ls {
        /// Flat store directory
        #[arg(long, value_name = "DIR")]
        store: Option<PathBuf>,

        /// Also print size, date and URL
        #[arg(short, long)]
        long: bool,
    },

    /// Print the default configuration
    Config,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            let mut config = Config::from_file(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            config.apply_env_overrides();
            Ok(config)
        }
        None => Config::load().context("Failed to load config"),
    }
}

fn cmd_ls(config: &Config, long: bool) -> Result<()> {
    let layout = StoreLayout::from_config(&config.store);
    let index = layout
        .build(&Index::new())
        .with_context(|| format!("Failed to index {}", layout.dir().display()))?;

    for (name, item) in resolve(&index).iter() {
        if long {
            println!(
                "{:>8}  {}  {}  {}",
                item.size_string(),
                item.date_string(),
                name,
                item.url
            );
        } else {
            println!("{name}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LogLevel::from_verbosity(cli.verbose));

    match cli.command {
        Commands::Serve {
            store,
            mountpoint,
            listing,
        } => {
            let mut config = load_config(cli.config.as_ref())?;
            if let Some(store) = store {
                config.store.dir = store;
            }
            if mountpoint.is_some() {
                config.mount.mountpoint = mountpoint;
            }
            if listing.is_some() {
                config.mount.listing_page = listing;
            }

            if !config.store.dir.is_dir() {
                anyhow::bail!("Store directory does not exist: {}", config.store.dir.display());
            }
            run_daemon(config).await
        }
        Commands::Ls { store, long } => {
            let mut config = load_config(cli.config.as_ref())?;
            if let Some(store) = store {
                config.store.dir = store;
            }
            cmd_ls(&config, long)
        }
        Commands::Config => {
            print!("{}", Config::default_toml());
            Ok(())
        }
    }
}
