//! Stable inode numbers for virtual names.

use std::collections::{HashMap, HashSet};

use upfs_config::log_fuse_warn;

/// Inode of the root directory
pub const ROOT_INO: u64 = 1;

/// True when the kernel accepts `name` as a directory entry
pub fn is_component(name: &str) -> bool {
    !matches!(name, "" | "." | "..") && !name.contains(['/', '\0'])
}

/// Maps virtual names to inode numbers and back.
///
/// Inodes are derived from a BLAKE3 hash of the name, so the same name gets
/// the same inode across snapshots and daemon restarts. Hash collisions are
/// resolved by probing upwards. Only names of the latest root listing are
/// kept, see [`InodeTable::listing`].
#[derive(Debug, Default)]
pub struct InodeTable {
    by_ino: HashMap<u64, String>,
    by_name: HashMap<String, u64>,
}

impl InodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inode for `name`, assigning one on first use
    pub fn assign(&mut self, name: &str) -> u64 {
        if let Some(&ino) = self.by_name.get(name) {
            return ino;
        }

        let mut ino = Self::hash(name);
        while self.by_ino.contains_key(&ino) {
            ino = Self::clamp(ino.wrapping_add(1));
        }

        self.by_ino.insert(ino, name.to_string());
        self.by_name.insert(name.to_string(), ino);
        ino
    }

    /// Inode entries for a fresh root listing.
    ///
    /// Names that are not valid directory entries are skipped, and names no
    /// longer listed are forgotten.
    pub fn listing<I>(&mut self, names: I) -> Vec<(u64, String)>
    where
        I: IntoIterator<Item = String>,
    {
        let names: Vec<String> = names
            .into_iter()
            .filter(|name| {
                let ok = is_component(name);
                if !ok {
                    log_fuse_warn!("Skipping unlistable name", name = name.as_str());
                }
                ok
            })
            .collect();

        let live: HashSet<&str> = names.iter().map(String::as_str).collect();
        self.by_name.retain(|name, _| live.contains(name.as_str()));
        self.by_ino.retain(|_, name| live.contains(name.as_str()));

        names
            .into_iter()
            .map(|name| (self.assign(&name), name))
            .collect()
    }

    /// Name previously assigned to `ino`
    pub fn name(&self, ino: u64) -> Option<&str> {
        self.by_ino.get(&ino).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_ino.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ino.is_empty()
    }

    fn hash(name: &str) -> u64 {
        let digest = blake3::hash(name.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest.as_bytes()[..8]);
        Self::clamp(u64::from_le_bytes(prefix))
    }

    // 0 is invalid and 1 is the root
    fn clamp(ino: u64) -> u64 {
        if ino <= ROOT_INO {
            ino + 2
        } else {
            ino
        }
    }
}
