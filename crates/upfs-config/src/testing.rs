//! Throwaway upload stores for tests.
//!
//! Provides `StoreFixture` to manage:
//! - An isolated flat store directory
//! - Uploads with explicit modification times
//! - A matching `Config`
//!
//! # Usage
//!
//! ```ignore
//! use upfs_config::testing::StoreFixture;
//!
//! let store = StoreFixture::new().unwrap();
//! store.upload("a", "x.txt", b"hello", 100).unwrap();
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use tempfile::TempDir;

use crate::Config;

/// Atomic counter for unique fixture IDs
static FIXTURE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated flat store on disk
pub struct StoreFixture {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// The flat store directory
    pub store_dir: PathBuf,
    /// Unique fixture ID
    pub fixture_id: u32,
}

impl StoreFixture {
    /// Create a new empty store
    pub fn new() -> anyhow::Result<Self> {
        let fixture_id = FIXTURE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let store_dir = temp_dir.path().join("files");
        std::fs::create_dir_all(&store_dir)?;

        Ok(Self {
            _temp_dir: temp_dir,
            store_dir,
            fixture_id,
        })
    }

    /// Config pointing at this store
    pub fn config(&self) -> Config {
        let mut cfg = Config::default();
        cfg.store.dir = self.store_dir.clone();
        cfg.store.url_format = "https://files.test/{id}/{name}".to_string();
        cfg
    }

    /// Write an upload: primary file, sidecar name, and an mtime of
    /// `mtime_secs` after the Unix epoch on the primary file
    pub fn upload(
        &self,
        id: &str,
        name: &str,
        content: &[u8],
        mtime_secs: u64,
    ) -> anyhow::Result<PathBuf> {
        let path = self.store_dir.join(id);
        std::fs::write(&path, content)?;
        std::fs::write(self.store_dir.join(format!("{id}-fname")), format!("{name}\n"))?;
        self.set_mtime(id, mtime_secs)?;
        Ok(path)
    }

    /// Write only the primary file, leaving the sidecar missing
    pub fn orphan(&self, id: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.store_dir.join(id);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Write the bootstrap marker file
    pub fn bootstrap_marker(&self) -> anyhow::Result<PathBuf> {
        let path = self.store_dir.join("startid");
        std::fs::write(&path, "1000")?;
        Ok(path)
    }

    /// Remove the primary file of an upload (the sidecar stays behind)
    pub fn remove(&self, id: &str) -> anyhow::Result<()> {
        std::fs::remove_file(self.store_dir.join(id))?;
        Ok(())
    }

    /// Set the modification time of a primary file
    pub fn set_mtime(&self, id: &str, mtime_secs: u64) -> anyhow::Result<()> {
        let mtime = FileTime::from_system_time(Self::time(mtime_secs));
        filetime::set_file_mtime(self.store_dir.join(id), mtime)?;
        Ok(())
    }

    /// `SystemTime` for an mtime given in seconds, as stored by `upload`
    pub fn time(mtime_secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(mtime_secs)
    }
}
