//! Core VFS types.

use std::sync::Arc;
use std::time::SystemTime;

use upfs_store::Item;

/// Permission bits reported for uploads.
pub const FILE_PERM: u32 = 0o444;
/// Permission bits reported for the root directory.
pub const DIR_PERM: u32 = 0o555;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// An upload.
    File,
    /// The synthetic root.
    Directory,
}

/// Result of `stat`: one virtual entry.
///
/// File entries carry the item they were resolved to, so a caller holding a
/// `FileStat` keeps seeing the same upload after the snapshot is replaced.
#[derive(Debug, Clone)]
pub struct FileStat {
    /// Virtual name (`/` for the root).
    pub name: String,
    pub kind: FileType,
    pub size: u64,
    pub modified: SystemTime,
    pub perm: u32,
    /// Backing upload, `None` for the root.
    pub item: Option<Arc<Item>>,
}

impl FileStat {
    /// Synthetic root directory entry.
    pub fn root(modified: SystemTime) -> Self {
        Self {
            name: "/".to_string(),
            kind: FileType::Directory,
            size: 0,
            modified,
            perm: DIR_PERM,
            item: None,
        }
    }

    /// Entry for an upload under its virtual name.
    pub fn file(name: impl Into<String>, item: Arc<Item>) -> Self {
        Self {
            name: name.into(),
            kind: FileType::File,
            size: item.size,
            modified: item.modified,
            perm: FILE_PERM,
            item: Some(item),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileType::File
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_constructors() {
        let root = FileStat::root(SystemTime::UNIX_EPOCH);
        assert!(root.is_dir());
        assert_eq!(root.name, "/");
        assert!(root.item.is_none());

        let item = Arc::new(Item {
            id: "9".into(),
            name: "nine.txt".into(),
            size: 9,
            modified: SystemTime::UNIX_EPOCH,
            url: String::new(),
        });
        let file = FileStat::file("nine (1).txt", item);
        assert!(file.is_file());
        assert_eq!(file.size, 9);
        assert_eq!(file.perm, FILE_PERM);
        assert_eq!(file.item.unwrap().id, "9");
    }
}
