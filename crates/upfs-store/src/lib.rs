//! # upfs-store
//!
//! Indexing of the flat upload store and projection of its items onto a
//! unique virtual namespace.
//!
//! ## Store Layout
//!
//! ```text
//! /files/
//! ├── 1001          # primary file (the upload bytes)
//! ├── 1001-fname    # sidecar: display name, UTF-8, trimmed
//! ├── 1002
//! ├── 1002-fname
//! └── startid       # bootstrap marker, never indexed
//! ```
//!
//! An [`Index`] maps ID → [`Item`] for everything on disk; [`resolve`] turns
//! it into a [`NameMapping`] of unique display names.

pub mod index;
pub mod item;
pub mod names;

pub use index::{Index, StoreLayout};
pub use item::{Item, UrlTemplate};
pub use names::{resolve, NameMapping};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort an index build
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unreadable: {}: {source}", path.display())]
    StoreUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("sidecar missing for {id}: {}: {source}", path.display())]
    SidecarMissing {
        id: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub(crate) fn unreadable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::StoreUnreadable {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
