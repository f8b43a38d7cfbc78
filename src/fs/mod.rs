//! Filesystem Access Port
//!
//! The narrow capability interface between cache logic and raw file I/O.
//! The engine never touches `std::fs` directly; it goes through a
//! [`FileSystem`] implementation so storage can be swapped out in tests.

mod local;
mod memory;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use local::LocalFileSystem;
pub use memory::{FsOp, MemoryFileSystem};

// == Public Constants ==
/// Permission mode used for directories created by the cache
pub const DEFAULT_DIR_MODE: u32 = 0o755;

// == Filesystem Error ==
/// Failure reported by a [`FileSystem`] implementation.
#[derive(Error, Debug)]
pub enum FsError {
    /// Target already exists
    #[error("Already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Target is not an existing writable file
    #[error("Not writable: {}", .0.display())]
    NotWritable(PathBuf),

    /// Target does not exist
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The underlying read call failed
    #[error("Failed to read {}: {source}", path.display())]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Any other operating system failure
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        FsError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for filesystem port operations.
pub type FsResult<T> = std::result::Result<T, FsError>;

// == Directory Entry ==
/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Full path of the child
    pub path: PathBuf,
    /// True for directories
    pub is_dir: bool,
}

// == File System Port ==
/// Synchronous, blocking filesystem capability used by the cache engine.
///
/// Success is reported through `Ok(())`; every failure carries the path it
/// happened on.
pub trait FileSystem: Send + Sync + std::fmt::Debug {
    /// True if `path` is an existing directory.
    fn dir_exists(&self, path: &Path) -> bool;

    /// Creates a directory. Fails with [`FsError::AlreadyExists`] when
    /// `path` already is a directory.
    fn create_dir(&self, path: &Path, mode: u32, recursive: bool) -> FsResult<()>;

    /// False if `path` is missing, not a directory, or lacks write permission.
    fn is_writable_dir(&self, path: &Path) -> bool;

    /// True only for regular files.
    fn file_exists(&self, path: &Path) -> bool;

    /// False if the file is absent or not writable.
    fn is_writable_file(&self, path: &Path) -> bool;

    /// False if the file is absent or not readable.
    fn is_readable_file(&self, path: &Path) -> bool;

    /// Creates an empty file. Fails with [`FsError::AlreadyExists`] if present.
    fn create_file(&self, path: &Path) -> FsResult<()>;

    /// Replaces the contents of an existing writable file.
    fn write_file(&self, path: &Path, data: &[u8]) -> FsResult<()>;

    /// Reads a whole file.
    fn read_file(&self, path: &Path) -> FsResult<Vec<u8>>;

    /// Removes a file. Fails with [`FsError::NotFound`] if absent.
    fn delete_file(&self, path: &Path) -> FsResult<()>;

    /// Removes `path` and everything below it. A missing path is a
    /// successful no-op.
    fn remove_dir_recursive(&self, path: &Path) -> FsResult<()>;

    /// Lists the direct children of a directory.
    fn list_dir(&self, path: &Path) -> FsResult<Vec<DirEntry>>;

    /// Moves a file over `to`, replacing it if present.
    fn rename_file(&self, from: &Path, to: &Path) -> FsResult<()>;
}
