//! # upfs-daemon
//!
//! Keeps the virtual filesystem in step with the flat store.
//!
//! ## Architecture
//!
//! One process owns:
//! - A [`VirtualFs`] serving the current snapshot
//! - A [`RefreshScheduler`] that rebuilds the index when it goes stale
//! - An [`HtmlListing`] re-rendered on every publish
//! - Optionally a read-only FUSE mount of the virtual filesystem
//!
//! A tokio interval task drives the scheduler; rebuilds run on the blocking
//! pool so they never stall the runtime.

pub mod listing;
pub mod scheduler;

pub use listing::{HtmlListing, ListingSink};
pub use scheduler::{RefreshOutcome, RefreshScheduler};

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use upfs_config::{log_daemon_error, log_daemon_info, log_refresh_debug, Config};
use upfs_fuse::UpFs;
use upfs_store::StoreLayout;
use upfs_vfs::VirtualFs;

/// The services of one daemon instance, wired from a [`Config`]
pub struct Service {
    pub vfs: VirtualFs,
    pub scheduler: Arc<RefreshScheduler>,
    pub listing: Arc<HtmlListing>,
}

impl Service {
    pub fn from_config(config: &Config) -> Self {
        let vfs = VirtualFs::new(&config.store.dir).with_prefix(config.mount.prefix.clone());
        let listing = Arc::new(HtmlListing::new(config.mount.listing_page.clone()));
        let scheduler = RefreshScheduler::new(StoreLayout::from_config(&config.store), vfs.clone())
            .with_staleness(config.refresh.staleness())
            .with_change_detection(config.refresh.change_detection)
            .with_sink(listing.clone());

        Self {
            vfs,
            scheduler: Arc::new(scheduler),
            listing,
        }
    }
}

/// Call [`RefreshScheduler::maybe_refresh`] every `period` until aborted
pub fn spawn_refresh_task(scheduler: Arc<RefreshScheduler>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let sched = Arc::clone(&scheduler);
            match tokio::task::spawn_blocking(move || sched.maybe_refresh()).await {
                Ok(outcome) => log_refresh_debug!("Refresh tick", outcome = format!("{outcome:?}")),
                Err(e) => {
                    log_daemon_error!("Refresh task failed", error = e.to_string());
                    break;
                }
            }
        }
    })
}

/// Main daemon entry point
pub async fn run_daemon(config: Config) -> Result<()> {
    log_daemon_info!(
        "Starting upfs",
        store = config.store.dir.display().to_string(),
        staleness_secs = config.refresh.staleness_secs,
        prefix = config.mount.prefix.as_str()
    );

    let service = Service::from_config(&config);

    // Serve a populated snapshot before the first tick
    let sched = Arc::clone(&service.scheduler);
    let initial = tokio::task::spawn_blocking(move || sched.force_refresh()).await?;
    if let RefreshOutcome::Failed(e) = initial {
        // Keep going; the next tick retries
        log_daemon_error!("Initial refresh failed", error = e.to_string());
    }

    // FUSE sees plain `/name` paths, so it gets an unprefixed view of the same snapshot
    let _mount = match &config.mount.mountpoint {
        Some(mountpoint) => {
            let fs = UpFs::new(service.vfs.clone().with_prefix(""));
            let handle = fs.spawn_mount(mountpoint)?;
            log_daemon_info!("Mounted", mountpoint = mountpoint.display().to_string());
            Some(handle)
        }
        None => None,
    };

    let refresh_handle =
        spawn_refresh_task(Arc::clone(&service.scheduler), config.refresh.interval());
    log_daemon_info!(
        "Refresh task started",
        interval_secs = config.refresh.interval().as_secs()
    );

    tokio::select! {
        _ = refresh_handle => {
            log_daemon_info!("Refresh task exited");
        }
        _ = tokio::signal::ctrl_c() => {
            log_daemon_info!("Received SIGINT, shutting down");
        }
    }

    Ok(())
}
