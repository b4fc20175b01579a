//! # upfs-vfs
//!
//! Read-only virtual filesystem over the flat upload store.
//!
//! - [`FileSystem`] - Capability trait handed to protocol servers
//! - [`VirtualFs`] - Implementation backed by a hot-swappable [`Snapshot`]
//! - [`Handle`] - Open root directory or upload
//!
//! ## Design Decisions
//!
//! - **Flat namespace**: `/` is the only directory; every upload appears
//!   directly under it with its resolved display name.
//! - **Snapshot swap**: refreshes publish a new immutable snapshot; readers
//!   copy what they need out of it and never hold the lock during I/O.
//! - **Read-only**: `mkdir`, `remove`, `rename` and `write` always fail
//!   with [`VfsError::Unsupported`].

mod error;
mod filesystem;
mod handle;
mod ops;
mod snapshot;
mod types;

pub use error::{VfsError, VfsResult};
pub use filesystem::VirtualFs;
pub use handle::{DirHandle, FileHandle, Handle};
pub use ops::FileSystem;
pub use snapshot::{Snapshot, SnapshotCell};
pub use types::{FileStat, FileType, DIR_PERM, FILE_PERM};
