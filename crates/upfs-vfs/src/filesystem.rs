//! The virtual filesystem: a read-only projection of the current snapshot.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::debug;
use upfs_config::log_vfs_debug;
use upfs_store::{Index, Item};

use crate::error::{VfsError, VfsResult};
use crate::handle::{DirHandle, FileHandle, Handle};
use crate::ops::FileSystem;
use crate::snapshot::{Snapshot, SnapshotCell};
use crate::types::FileStat;

/// Where a protocol path points to.
enum Target {
    Root,
    Entry(String),
}

/// Read-only virtual filesystem over the flat store.
///
/// Starts out empty; call [`VirtualFs::refresh`] with a built index to
/// publish the first snapshot.
#[derive(Debug, Clone)]
pub struct VirtualFs {
    store_dir: PathBuf,
    prefix: String,
    cell: Arc<SnapshotCell>,
}

impl VirtualFs {
    /// Filesystem serving primary files out of `store_dir`
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
            prefix: String::new(),
            cell: Arc::new(SnapshotCell::new()),
        }
    }

    /// Serve the namespace under `prefix` (e.g. `/webdav`); other paths are not found
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Resolve names for `index` and atomically replace the current snapshot.
    ///
    /// Safe to call while other threads stat, open and list; they see either
    /// the previous or the new mapping in full.
    pub fn refresh(&self, index: Index) -> Arc<Snapshot> {
        let snapshot = self.cell.publish(index);
        debug!(
            generation = snapshot.generation,
            entries = snapshot.mapping.len(),
            "Snapshot published"
        );
        snapshot
    }

    /// The current snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.cell.load()
    }

    /// Find the item behind a virtual name in the current snapshot
    pub fn lookup(&self, name: &str) -> Option<Arc<Item>> {
        self.cell.load().mapping.get(name).cloned()
    }

    /// Map a protocol path onto the flat namespace.
    ///
    /// With a prefix configured, only the prefix itself and paths below it
    /// are inside the filesystem.
    fn target(&self, path: &str) -> VfsResult<Target> {
        let mut rest = path;
        if !self.prefix.is_empty() {
            rest = match rest.strip_prefix(self.prefix.as_str()) {
                Some(stripped) if stripped.is_empty() || stripped.starts_with('/') => stripped,
                _ => return Err(VfsError::not_found(path)),
            };
        }

        let rest = rest.strip_prefix('/').unwrap_or(rest);
        if rest.is_empty() {
            Ok(Target::Root)
        } else {
            Ok(Target::Entry(rest.to_string()))
        }
    }

    fn root_stat(&self) -> FileStat {
        let published = self.cell.load().published_at;
        FileStat::root(published.unwrap_or(SystemTime::UNIX_EPOCH))
    }

    fn file_stat(&self, name: String) -> VfsResult<FileStat> {
        match self.lookup(&name) {
            Some(item) => Ok(FileStat::file(name, item)),
            None => {
                log_vfs_debug!("Lookup miss", name = name.as_str());
                Err(VfsError::not_found(name))
            }
        }
    }
}

impl FileSystem for VirtualFs {
    fn stat(&self, path: &str) -> VfsResult<FileStat> {
        match self.target(path)? {
            Target::Root => Ok(self.root_stat()),
            Target::Entry(name) => self.file_stat(name),
        }
    }

    fn open(&self, path: &str) -> VfsResult<Handle> {
        match self.target(path)? {
            Target::Root => Ok(Handle::Directory(DirHandle::new(
                self.root_stat(),
                Arc::clone(&self.cell),
            ))),
            Target::Entry(name) => {
                // The snapshot is no longer consulted once the stat is copied out
                let stat = self.file_stat(name)?;
                let id = match &stat.item {
                    Some(item) => item.id.clone(),
                    None => return Err(VfsError::is_a_directory(stat.name)),
                };
                // Deleted from disk since the last refresh
                let file = File::open(self.store_dir.join(id)).map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => VfsError::not_found(&stat.name),
                    _ => VfsError::Io(e),
                })?;
                Ok(Handle::File(FileHandle::new(stat, file)))
            }
        }
    }

    fn list(&self, path: &str, max: Option<usize>) -> VfsResult<Vec<FileStat>> {
        self.open(path)?.readdir(max)
    }

    fn mkdir(&self, _path: &str) -> VfsResult<()> {
        Err(VfsError::Unsupported("mkdir"))
    }

    fn remove(&self, _path: &str) -> VfsResult<()> {
        Err(VfsError::Unsupported("remove"))
    }

    fn rename(&self, _from: &str, _to: &str) -> VfsResult<()> {
        Err(VfsError::Unsupported("rename"))
    }

    fn write(&self, _path: &str, _offset: u64, _data: &[u8]) -> VfsResult<usize> {
        Err(VfsError::Unsupported("write"))
    }

    fn read_only(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, SeekFrom};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        fs: VirtualFs,
    }

    /// Store with `a` ("x.txt", older) and `b` ("x.txt", newer)
    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a"), b"first upload").unwrap();
        std::fs::write(dir.path().join("b"), b"second").unwrap();

        let index: Index = [("a", 12, 100), ("b", 6, 200)]
            .into_iter()
            .map(|(id, size, mtime)| Item {
                id: id.to_string(),
                name: "x.txt".to_string(),
                size,
                modified: SystemTime::UNIX_EPOCH + Duration::from_secs(mtime),
                url: format!("https://files.test/{id}/x.txt"),
            })
            .collect();

        let fs = VirtualFs::new(dir.path());
        fs.refresh(index);
        Fixture { _dir: dir, fs }
    }

    fn prefixed(f: &Fixture) -> VirtualFs {
        f.fs.clone().with_prefix("/webdav/")
    }

    #[test]
    fn test_stat_root() {
        let f = fixture();
        let stat = f.fs.stat("/").unwrap();
        assert!(stat.is_dir());
        assert!(f.fs.stat("").unwrap().is_dir());

        let fs = prefixed(&f);
        assert!(fs.stat("/webdav").unwrap().is_dir());
        assert!(fs.stat("/webdav/").unwrap().is_dir());
    }

    #[test]
    fn test_stat_files() {
        let f = fixture();
        let first = f.fs.stat("/x.txt").unwrap();
        assert_eq!(first.item.as_ref().unwrap().id, "a");
        assert_eq!(first.size, 12);

        let second = prefixed(&f).stat("/webdav/x (1).txt").unwrap();
        assert_eq!(second.item.as_ref().unwrap().id, "b");
        assert_eq!(second.name, "x (1).txt");
    }

    #[test]
    fn test_prefix_only_strips_whole_segment() {
        let fs = prefixed(&fixture());
        assert!(matches!(fs.stat("/webdavx.txt"), Err(VfsError::NotFound(_))));
    }

    #[test]
    fn test_paths_outside_prefix_are_not_found() {
        let f = fixture();
        let fs = prefixed(&f);
        assert!(matches!(fs.stat("/"), Err(VfsError::NotFound(_))));
        assert!(matches!(fs.stat("/x.txt"), Err(VfsError::NotFound(_))));
        assert!(matches!(fs.open("/x.txt"), Err(VfsError::NotFound(_))));
        assert!(matches!(fs.list("/", None), Err(VfsError::NotFound(_))));
        assert_eq!(fs.list("/webdav", None).unwrap().len(), 2);
    }

    #[test]
    fn test_upload_named_like_prefix() {
        let f = fixture();
        std::fs::write(f.fs.store_dir().join("c"), b"dav").unwrap();
        let mut items: Vec<Item> = f.fs.snapshot().index.items().map(|i| (**i).clone()).collect();
        items.push(Item {
            id: "c".to_string(),
            name: "webdav".to_string(),
            size: 3,
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(300),
            url: String::new(),
        });
        f.fs.refresh(items.into_iter().collect());

        let fs = prefixed(&f);
        // The bare prefix is the root, the upload lives below it
        assert!(fs.stat("/webdav").unwrap().is_dir());
        let stat = fs.stat("/webdav/webdav").unwrap();
        assert_eq!(stat.item.as_ref().unwrap().id, "c");

        // Without a prefix the upload is reachable directly
        assert_eq!(f.fs.stat("/webdav").unwrap().item.unwrap().id, "c");
    }

    #[test]
    fn test_open_missing_is_not_found() {
        let f = fixture();
        let err = f.fs.open("/missing").unwrap_err();
        assert!(matches!(err, VfsError::NotFound(_)));
        assert!(!f.fs.exists("/missing"));
    }

    #[test]
    fn test_open_and_read() {
        let f = fixture();
        let mut handle = f.fs.open("/x (1).txt").unwrap();
        assert_eq!(handle.stat().size, 6);

        let mut buf = [0u8; 3];
        assert_eq!(handle.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"sec");

        assert_eq!(handle.read_at(3, 100).unwrap(), b"ond");
        assert!(handle.read_at(10, 4).unwrap().is_empty());

        handle.seek(SeekFrom::Start(1)).unwrap();
        let mut file = handle.into_file().unwrap();
        let mut rest = String::new();
        file.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "econd");
    }

    #[test]
    fn test_root_handle_lists_only() {
        let f = fixture();
        let mut root = f.fs.open("/").unwrap();
        assert!(matches!(
            root.read(&mut [0u8; 4]),
            Err(VfsError::IsADirectory(_))
        ));
        assert_eq!(root.readdir_names(None).unwrap(), vec!["x.txt", "x (1).txt"]);
    }

    #[test]
    fn test_file_handle_cannot_list() {
        let f = fixture();
        let file = f.fs.open("/x.txt").unwrap();
        assert!(matches!(file.readdir(None), Err(VfsError::NotADirectory(_))));
    }

    #[test]
    fn test_list_with_max() {
        let f = fixture();
        assert_eq!(f.fs.list("/", None).unwrap().len(), 2);
        assert_eq!(f.fs.list("/", Some(0)).unwrap().len(), 2);
        assert_eq!(f.fs.list("/", Some(1)).unwrap().len(), 1);
        assert!(matches!(f.fs.list("/nope", None), Err(VfsError::NotFound(_))));
    }

    #[test]
    fn test_write_class_operations_rejected() {
        let f = fixture();
        assert!(matches!(f.fs.mkdir("/new"), Err(VfsError::Unsupported(_))));
        assert!(matches!(f.fs.remove("/x.txt"), Err(VfsError::Unsupported(_))));
        assert!(matches!(
            f.fs.rename("/x.txt", "/y.txt"),
            Err(VfsError::Unsupported(_))
        ));
        assert!(matches!(
            f.fs.write("/x.txt", 0, b"overwrite"),
            Err(VfsError::Unsupported(_))
        ));
        let mut handle = f.fs.open("/x.txt").unwrap();
        assert!(matches!(handle.write(b"x"), Err(VfsError::Unsupported(_))));

        // Nothing changed on disk or in the mapping
        assert!(f.fs.read_only());
        assert!(!f.fs.store_dir().join("new").exists());
        assert_eq!(std::fs::read(f.fs.store_dir().join("a")).unwrap(), b"first upload");
        assert_eq!(f.fs.list("/", None).unwrap().len(), 2);
    }

    #[test]
    fn test_dir_handle_sees_live_snapshot() {
        let f = fixture();
        let root = f.fs.open("/").unwrap();
        assert_eq!(root.readdir(None).unwrap().len(), 2);

        f.fs.refresh(Index::new());
        assert!(root.readdir(None).unwrap().is_empty());
    }

    #[test]
    fn test_open_file_survives_refresh() {
        let f = fixture();
        let mut handle = f.fs.open("/x.txt").unwrap();

        f.fs.refresh(Index::new());
        assert!(f.fs.stat("/x.txt").is_err());

        // Already open: stat and bytes are unaffected by the swap
        assert_eq!(handle.stat().item.as_ref().unwrap().id, "a");
        assert_eq!(handle.read_at(0, 5).unwrap(), b"first");
    }

    #[test]
    fn test_open_deleted_primary_is_not_found() {
        let f = fixture();
        std::fs::remove_file(f.fs.store_dir().join("b")).unwrap();

        // Still in the snapshot until the next refresh
        assert!(f.fs.stat("/x (1).txt").is_ok());
        assert!(matches!(
            f.fs.open("/x (1).txt"),
            Err(VfsError::NotFound(_))
        ));
    }
}
