//! # upfs-fuse
//!
//! FUSE frontend for the upfs virtual filesystem.
//!
//! Exposes a [`VirtualFs`](upfs_vfs::VirtualFs) as a read-only mount.
//! - Inodes are derived from virtual names (see [`InodeTable`]); names that
//!   are not valid directory entries are left out of listings.
//! - Every lookup goes to the current snapshot, so refreshes show up
//!   without remounting.
//! - Mutating calls reply `EROFS`.

mod inode;

pub use inode::{is_component, InodeTable, ROOT_INO};

/// Path handed to the virtual filesystem for a name in the root directory
pub fn entry_path(name: &str) -> String {
    format!("/{name}")
}

#[cfg(all(feature = "fuse", target_os = "linux"))]
mod imp {
    use std::collections::HashMap;
    use std::ffi::OsStr;
    use std::path::Path;
    use std::time::Duration;

    use fuser::{
        FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
        ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request,
    };
    use libc::{c_int, EINVAL, ENOENT, EROFS};
    use upfs_config::{log_fuse_debug, log_fuse_warn};
    use upfs_vfs::{FileHandle, FileStat, FileSystem, VirtualFs};

    use crate::entry_path;
    use crate::inode::{InodeTable, ROOT_INO};

    // Short, so a refresh is visible to the kernel quickly
    const TTL: Duration = Duration::from_secs(1);
    const BLOCK_SIZE: u64 = 4096;

    /// A live mount
    pub struct MountHandle {
        _session: fuser::BackgroundSession,
    }

    pub struct UpFs {
        vfs: VirtualFs,
        inodes: InodeTable,
        files: HashMap<u64, FileHandle>,
        // Directory listings captured at opendir, so offsets stay valid
        dirs: HashMap<u64, Vec<(u64, String)>>,
        next_fh: u64,
    }

    impl UpFs {
        pub fn new(vfs: VirtualFs) -> Self {
            Self {
                vfs,
                inodes: InodeTable::new(),
                files: HashMap::new(),
                dirs: HashMap::new(),
                next_fh: 1,
            }
        }

        /// Mount the filesystem at the given path on a background thread
        /// (Ref: <https://docs.rs/fuser>). Unmounted when the handle drops.
        pub fn spawn_mount(self, mountpoint: &Path) -> anyhow::Result<MountHandle> {
            let opts = vec![
                fuser::MountOption::RO,
                fuser::MountOption::FSName("upfs".to_string()),
                fuser::MountOption::DefaultPermissions,
            ];

            let session = fuser::spawn_mount2(self, mountpoint, &opts)?;
            Ok(MountHandle { _session: session })
        }

        fn stat_ino(&self, ino: u64) -> Result<FileStat, c_int> {
            let path = if ino == ROOT_INO {
                "/".to_string()
            } else {
                match self.inodes.name(ino) {
                    Some(name) => entry_path(name),
                    None => return Err(ENOENT),
                }
            };
            self.vfs.stat(&path).map_err(|e| e.errno())
        }

        fn next_fh(&mut self) -> u64 {
            let fh = self.next_fh;
            self.next_fh += 1;
            fh
        }

        fn to_attr(ino: u64, stat: &FileStat) -> FileAttr {
            let (kind, nlink) = if stat.is_dir() {
                (FileType::Directory, 2)
            } else {
                (FileType::RegularFile, 1)
            };
            FileAttr {
                ino,
                size: stat.size,
                blocks: stat.size.div_ceil(BLOCK_SIZE),
                atime: stat.modified,
                mtime: stat.modified,
                ctime: stat.modified,
                crtime: stat.modified,
                kind,
                perm: stat.perm as u16,
                nlink,
                uid: 0,
                gid: 0,
                rdev: 0,
                flags: 0,
                blksize: BLOCK_SIZE as u32,
            }
        }
    }

    fn name_str(name: &OsStr) -> Option<&str> {
        name.to_str().filter(|s| !s.is_empty())
    }

    impl Filesystem for UpFs {
        fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
            let name = match name_str(name) {
                Some(s) if parent == ROOT_INO => s,
                _ => {
                    reply.error(ENOENT);
                    return;
                }
            };

            match self.vfs.stat(&entry_path(name)) {
                Ok(stat) => {
                    let ino = self.inodes.assign(&stat.name);
                    reply.entry(&TTL, &Self::to_attr(ino, &stat), 0);
                }
                Err(e) => reply.error(e.errno()),
            }
        }

        fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
            match self.stat_ino(ino) {
                Ok(stat) => reply.attr(&TTL, &Self::to_attr(ino, &stat)),
                Err(errno) => reply.error(errno),
            }
        }

        fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
            if flags & libc::O_ACCMODE != libc::O_RDONLY {
                reply.error(EROFS);
                return;
            }
            let path = match self.inodes.name(ino) {
                Some(name) => entry_path(name),
                None => {
                    reply.error(ENOENT);
                    return;
                }
            };

            match self.vfs.open(&path).and_then(|h| h.into_file()) {
                Ok(file) => {
                    let fh = self.next_fh();
                    self.files.insert(fh, file);
                    reply.opened(fh, 0);
                }
                Err(e) => {
                    log_fuse_debug!("Open failed", path = path.as_str(), error = e.to_string());
                    reply.error(e.errno());
                }
            }
        }

        fn read(
            &mut self,
            _req: &Request,
            ino: u64,
            fh: u64,
            offset: i64,
            size: u32,
            _flags: c_int,
            _lock_owner: Option<u64>,
            reply: ReplyData,
        ) {
            let file = match self.files.get_mut(&fh) {
                Some(f) => f,
                None => {
                    reply.error(libc::EBADF);
                    return;
                }
            };
            if offset < 0 {
                reply.error(EINVAL);
                return;
            }

            match file.read_at(offset as u64, size as usize) {
                Ok(data) => reply.data(&data),
                Err(e) => {
                    log_fuse_warn!("Read failed", ino = ino, error = e.to_string());
                    reply.error(e.errno());
                }
            }
        }

        fn release(
            &mut self,
            _req: &Request,
            _ino: u64,
            fh: u64,
            _flags: i32,
            _lock_owner: Option<u64>,
            _flush: bool,
            reply: ReplyEmpty,
        ) {
            self.files.remove(&fh);
            reply.ok();
        }

        fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
            if ino != ROOT_INO {
                let errno = match self.stat_ino(ino) {
                    Ok(_) => libc::ENOTDIR,
                    Err(errno) => errno,
                };
                reply.error(errno);
                return;
            }

            match self.vfs.list("/", None) {
                Ok(stats) => {
                    let entries = self.inodes.listing(stats.into_iter().map(|s| s.name));
                    let fh = self.next_fh();
                    self.dirs.insert(fh, entries);
                    reply.opened(fh, 0);
                }
                Err(e) => reply.error(e.errno()),
            }
        }

        fn readdir(
            &mut self,
            _req: &Request,
            ino: u64,
            fh: u64,
            offset: i64,
            mut reply: ReplyDirectory,
        ) {
            let entries = match self.dirs.get(&fh) {
                Some(e) => e,
                None => {
                    reply.error(libc::EBADF);
                    return;
                }
            };

            // Offsets are 1-based positions in [".", "..", children...]
            let dots = [(ino, "."), (ROOT_INO, "..")]
                .into_iter()
                .map(|(i, n)| (i, FileType::Directory, n));
            let children = entries
                .iter()
                .map(|(i, n)| (*i, FileType::RegularFile, n.as_str()));
            let skip = offset.max(0) as usize;
            for (i, (child_ino, kind, name)) in dots.chain(children).enumerate().skip(skip) {
                if reply.add(child_ino, (i + 1) as i64, kind, name) {
                    break;
                }
            }
            reply.ok();
        }

        fn releasedir(
            &mut self,
            _req: &Request,
            _ino: u64,
            fh: u64,
            _flags: i32,
            reply: ReplyEmpty,
        ) {
            self.dirs.remove(&fh);
            reply.ok();
        }

        // === Mutations: the mount is read-only ===

        fn mkdir(
            &mut self,
            _req: &Request,
            _parent: u64,
            name: &OsStr,
            _mode: u32,
            _umask: u32,
            reply: ReplyEntry,
        ) {
            let err = self.vfs.mkdir(&entry_path(&name.to_string_lossy()));
            reply.error(err.map_or_else(|e| e.errno(), |_| EROFS));
        }

        fn unlink(&mut self, _req: &Request, _parent: u64, name: &OsStr, reply: ReplyEmpty) {
            let err = self.vfs.remove(&entry_path(&name.to_string_lossy()));
            reply.error(err.map_or_else(|e| e.errno(), |_| EROFS));
        }

        fn rmdir(&mut self, _req: &Request, _parent: u64, name: &OsStr, reply: ReplyEmpty) {
            let err = self.vfs.remove(&entry_path(&name.to_string_lossy()));
            reply.error(err.map_or_else(|e| e.errno(), |_| EROFS));
        }

        fn rename(
            &mut self,
            _req: &Request,
            _parent: u64,
            name: &OsStr,
            _newparent: u64,
            newname: &OsStr,
            _flags: u32,
            reply: ReplyEmpty,
        ) {
            let err = self.vfs.rename(
                &entry_path(&name.to_string_lossy()),
                &entry_path(&newname.to_string_lossy()),
            );
            reply.error(err.map_or_else(|e| e.errno(), |_| EROFS));
        }

        fn write(
            &mut self,
            _req: &Request,
            ino: u64,
            _fh: u64,
            offset: i64,
            data: &[u8],
            _write_flags: u32,
            _flags: i32,
            _lock_owner: Option<u64>,
            reply: ReplyWrite,
        ) {
            let path = self.inodes.name(ino).map(entry_path).unwrap_or_default();
            let err = self.vfs.write(&path, offset.max(0) as u64, data);
            reply.error(err.map_or_else(|e| e.errno(), |_| EROFS));
        }

        fn create(
            &mut self,
            _req: &Request,
            _parent: u64,
            name: &OsStr,
            _mode: u32,
            _umask: u32,
            _flags: i32,
            reply: ReplyCreate,
        ) {
            let err = self.vfs.write(&entry_path(&name.to_string_lossy()), 0, &[]);
            reply.error(err.map_or_else(|e| e.errno(), |_| EROFS));
        }
    }
}

#[cfg(not(all(feature = "fuse", target_os = "linux")))]
mod imp {
    use upfs_config::log_fuse_warn;
    use upfs_vfs::VirtualFs;

    /// Dummy FUSE filesystem for non-Linux or non-feature builds
    pub struct UpFs;

    /// Never constructed without FUSE support
    pub struct MountHandle;

    impl UpFs {
        pub fn new(_vfs: VirtualFs) -> Self {
            #[cfg(not(target_os = "linux"))]
            log_fuse_warn!(
                "FUSE support is only available on Linux",
                os = std::env::consts::OS
            );
            #[cfg(all(target_os = "linux", not(feature = "fuse")))]
            log_fuse_warn!("UpFs is disabled. Compile with --features fuse to enable.");
            Self
        }

        pub fn spawn_mount(self, _mountpoint: &std::path::Path) -> anyhow::Result<MountHandle> {
            anyhow::bail!("FUSE not supported on this platform");
        }
    }
}

pub use imp::{MountHandle, UpFs};
