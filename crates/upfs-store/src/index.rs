//! Index builder for the flat store.
//!
//! Scans the store directory and merges the result with the previous
//! generation: known IDs keep their existing [`Item`], new IDs have their
//! sidecar read, and IDs that disappeared from disk are dropped.

use std::collections::HashMap;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, instrument};
use upfs_config::{log_store_debug, StoreConfig};

use crate::item::{Item, UrlTemplate};
use crate::{Result, StoreError};

/// One generation of ID → Item for everything currently on disk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    items: HashMap<String, Arc<Item>>,
}

impl Index {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Item>> {
        self.items.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate over the items in no particular order
    pub fn items(&self) -> impl Iterator<Item = &Arc<Item>> {
        self.items.values()
    }

    /// True when both generations hold exactly the same IDs
    pub fn same_ids(&self, other: &Index) -> bool {
        self.len() == other.len() && self.items.keys().all(|id| other.contains(id))
    }

    fn insert(&mut self, item: Arc<Item>) {
        self.items.insert(item.id.clone(), item);
    }
}

impl FromIterator<Item> for Index {
    fn from_iter<I: IntoIterator<Item = Item>>(iter: I) -> Self {
        let mut index = Index::new();
        for item in iter {
            index.insert(Arc::new(item));
        }
        index
    }
}

/// Where and how uploads are laid out on disk
#[derive(Debug, Clone)]
pub struct StoreLayout {
    dir: PathBuf,
    sidecar_suffix: String,
    bootstrap_marker: String,
    url: UrlTemplate,
}

impl StoreLayout {
    /// Layout with the default sidecar suffix and bootstrap marker
    pub fn new(dir: impl Into<PathBuf>, url: UrlTemplate) -> Self {
        let defaults = StoreConfig::default();
        Self {
            dir: dir.into(),
            sidecar_suffix: defaults.sidecar_suffix,
            bootstrap_marker: defaults.bootstrap_marker,
            url,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            sidecar_suffix: config.sidecar_suffix.clone(),
            bootstrap_marker: config.bootstrap_marker.clone(),
            url: UrlTemplate::new(config.url_format.clone()),
        }
    }

    /// The store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the primary file for an ID
    pub fn primary_path(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    /// Path of the sidecar name file for an ID
    pub fn sidecar_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}{}", self.sidecar_suffix))
    }

    /// Sidecars and the bootstrap marker are never items
    fn is_item_name(&self, name: &str) -> bool {
        !name.ends_with(&self.sidecar_suffix) && name != self.bootstrap_marker
    }

    /// Build a new index, reusing items from `previous` for known IDs.
    ///
    /// Fails without producing a partial index if the directory cannot be
    /// listed or a new ID has no readable sidecar. Uploads deleted while the
    /// build runs are left out.
    #[instrument(skip(self, previous), fields(dir = %self.dir.display()), level = "debug")]
    pub fn build(&self, previous: &Index) -> Result<Index> {
        let scanned = self.scan()?;
        self.assemble(scanned, previous)
    }

    /// List candidate primaries with the metadata seen while listing,
    /// sorted by ID
    fn scan(&self) -> Result<Vec<(String, Metadata)>> {
        let entries =
            fs::read_dir(&self.dir).map_err(|e| StoreError::unreadable(&self.dir, e))?;

        let mut scanned = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::unreadable(&self.dir, e))?;
            let name = match entry.file_name().into_string() {
                Ok(name) if self.is_item_name(&name) => name,
                Ok(_) => continue,
                Err(raw) => {
                    log_store_debug!(
                        "Skipping non UTF-8 entry",
                        name = raw.to_string_lossy().as_ref()
                    );
                    continue;
                }
            };

            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    log_store_debug!("Upload vanished during scan", id = name.as_str());
                    continue;
                }
                Err(e) => return Err(StoreError::unreadable(entry.path(), e)),
            };
            if meta.is_dir() {
                log_store_debug!(
                    "Skipping directory in flat store",
                    path = entry.path().display().to_string()
                );
                continue;
            }
            scanned.push((name, meta));
        }
        // Directory order is filesystem dependent
        scanned.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        Ok(scanned)
    }

    fn assemble(&self, scanned: Vec<(String, Metadata)>, previous: &Index) -> Result<Index> {
        let mut index = Index::new();
        let mut reused = 0usize;
        for (id, meta) in scanned {
            if let Some(known) = previous.get(&id) {
                index.insert(Arc::clone(known));
                reused += 1;
                continue;
            }
            match self.read_item(&id, &meta) {
                Ok(item) => index.insert(Arc::new(item)),
                // Primary and sidecar both gone: deleted since the scan
                Err(StoreError::SidecarMissing { .. }) if !self.primary_path(&id).exists() => {
                    log_store_debug!("Upload deleted during build", id = id.as_str());
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            entries = index.len(),
            reused,
            dropped = previous.len().saturating_sub(reused),
            "Index built"
        );
        Ok(index)
    }

    fn read_item(&self, id: &str, meta: &Metadata) -> Result<Item> {
        let sidecar = self.sidecar_path(id);
        let raw = fs::read(&sidecar).map_err(|source| StoreError::SidecarMissing {
            id: id.to_string(),
            path: sidecar.clone(),
            source,
        })?;
        let name = String::from_utf8_lossy(&raw).trim().to_string();

        let modified = meta
            .modified()
            .map_err(|e| StoreError::unreadable(self.primary_path(id), e))?;

        Ok(Item {
            url: self.url.render(id, &name),
            id: id.to_string(),
            name,
            size: meta.len(),
            modified,
        })
    }
}
