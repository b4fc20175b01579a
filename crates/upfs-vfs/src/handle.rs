//! Open handles returned by [`FileSystem::open`](crate::FileSystem::open).

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use crate::error::{VfsError, VfsResult};
use crate::snapshot::SnapshotCell;
use crate::types::FileStat;

/// An open virtual entry.
#[derive(Debug)]
pub enum Handle {
    /// The root directory; supports listing only.
    Directory(DirHandle),
    /// An upload; supports reading and seeking.
    File(FileHandle),
}

impl Handle {
    pub fn stat(&self) -> &FileStat {
        match self {
            Handle::Directory(dir) => &dir.stat,
            Handle::File(file) => &file.stat,
        }
    }

    /// List directory entries, at most `max` when given.
    pub fn readdir(&self, max: Option<usize>) -> VfsResult<Vec<FileStat>> {
        match self {
            Handle::Directory(dir) => Ok(dir.readdir(max)),
            Handle::File(file) => Err(VfsError::not_a_directory(&file.stat.name)),
        }
    }

    /// Names of the directory entries, at most `max` when given.
    pub fn readdir_names(&self, max: Option<usize>) -> VfsResult<Vec<String>> {
        Ok(self.readdir(max)?.into_iter().map(|s| s.name).collect())
    }

    /// Read at the current position.
    pub fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        Ok(self.as_file()?.read(buf)?)
    }

    /// Read up to `size` bytes at `offset`; short at end of file.
    pub fn read_at(&mut self, offset: u64, size: usize) -> VfsResult<Vec<u8>> {
        self.as_file()?.read_at(offset, size)
    }

    pub fn seek(&mut self, pos: SeekFrom) -> VfsResult<u64> {
        Ok(self.as_file()?.seek(pos)?)
    }

    /// Handles are read-only.
    pub fn write(&mut self, _buf: &[u8]) -> VfsResult<usize> {
        Err(VfsError::Unsupported("write"))
    }

    pub fn into_file(self) -> VfsResult<FileHandle> {
        match self {
            Handle::File(file) => Ok(file),
            Handle::Directory(dir) => Err(VfsError::is_a_directory(dir.stat.name)),
        }
    }

    fn as_file(&mut self) -> VfsResult<&mut FileHandle> {
        match self {
            Handle::File(file) => Ok(file),
            Handle::Directory(dir) => Err(VfsError::is_a_directory(&dir.stat.name)),
        }
    }
}

/// Handle on the root directory.
///
/// Keeps a shared reference to the filesystem's snapshot cell, so listing
/// always reflects the live snapshot, not the one current at open time.
#[derive(Debug)]
pub struct DirHandle {
    stat: FileStat,
    cell: Arc<SnapshotCell>,
}

impl DirHandle {
    pub(crate) fn new(stat: FileStat, cell: Arc<SnapshotCell>) -> Self {
        Self { stat, cell }
    }

    pub fn readdir(&self, max: Option<usize>) -> Vec<FileStat> {
        let snapshot = self.cell.load();
        let limit = match max {
            Some(n) if n > 0 => n,
            _ => usize::MAX,
        };
        snapshot
            .mapping
            .iter()
            .take(limit)
            .map(|(name, item)| FileStat::file(name, Arc::clone(item)))
            .collect()
    }
}

/// Handle on an upload, reading straight from its primary file.
#[derive(Debug)]
pub struct FileHandle {
    stat: FileStat,
    file: File,
}

impl FileHandle {
    pub(crate) fn new(stat: FileStat, file: File) -> Self {
        Self { stat, file }
    }

    pub fn stat(&self) -> &FileStat {
        &self.stat
    }

    /// Read up to `size` bytes at `offset`; short at end of file.
    pub fn read_at(&mut self, offset: u64, size: usize) -> VfsResult<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(size.min(self.stat.size as usize));
        (&mut self.file).take(size as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for FileHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}
