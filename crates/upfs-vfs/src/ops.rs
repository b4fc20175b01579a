//! Filesystem capability trait.
//!
//! This is the surface a protocol server (FUSE, WebDAV, ...) is handed.
//! All operations are path-based; paths are protocol paths such as
//! `/webdav/report.pdf` or `/report.pdf`.

use crate::error::VfsResult;
use crate::handle::Handle;
use crate::types::FileStat;

/// Core VFS operations trait.
pub trait FileSystem: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Get the attributes of an entry.
    fn stat(&self, path: &str) -> VfsResult<FileStat>;

    /// Open an entry for reading (files) or listing (the root).
    fn open(&self, path: &str) -> VfsResult<Handle>;

    /// List a directory, returning at most `max` entries when given.
    fn list(&self, path: &str, max: Option<usize>) -> VfsResult<Vec<FileStat>>;

    // ========================================================================
    // Writing
    // ========================================================================

    fn mkdir(&self, path: &str) -> VfsResult<()>;

    fn remove(&self, path: &str) -> VfsResult<()>;

    fn rename(&self, from: &str, to: &str) -> VfsResult<()>;

    fn write(&self, path: &str, offset: u64, data: &[u8]) -> VfsResult<usize>;

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Returns true if this filesystem is read-only.
    fn read_only(&self) -> bool;

    /// Check if a path exists.
    fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok()
    }
}
