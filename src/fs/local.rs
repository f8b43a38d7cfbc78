//! Local File System
//!
//! Default [`FileSystem`] implementation backed by `std::fs`.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;

use super::{DirEntry, FileSystem, FsError, FsResult};

/// Filesystem port implementation over the real operating system filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    /// Creates a new local filesystem handle.
    pub fn new() -> Self {
        Self
    }
}

/// Whether the calling process may write `path`, asked of the kernel so
/// ownership and group membership count.
#[cfg(unix)]
fn has_write_permission(path: &Path) -> bool {
    use nix::unistd::{access, AccessFlags};

    access(path, AccessFlags::W_OK).is_ok()
}

#[cfg(not(unix))]
fn has_write_permission(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| !meta.permissions().readonly())
        .unwrap_or(false)
}

impl FileSystem for LocalFileSystem {
    fn dir_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir(&self, path: &Path, mode: u32, recursive: bool) -> FsResult<()> {
        if self.dir_exists(path) {
            return Err(FsError::AlreadyExists(path.to_path_buf()));
        }

        let mut builder = DirBuilder::new();
        builder.recursive(recursive);

        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        builder.create(path).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => FsError::AlreadyExists(path.to_path_buf()),
            _ => FsError::io(path, e),
        })
    }

    fn is_writable_dir(&self, path: &Path) -> bool {
        self.dir_exists(path) && has_write_permission(path)
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_writable_file(&self, path: &Path) -> bool {
        self.file_exists(path) && has_write_permission(path)
    }

    fn is_readable_file(&self, path: &Path) -> bool {
        self.file_exists(path) && File::open(path).is_ok()
    }

    fn create_file(&self, path: &Path) -> FsResult<()> {
        if self.file_exists(path) {
            return Err(FsError::AlreadyExists(path.to_path_buf()));
        }

        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map(|_| ())
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => FsError::AlreadyExists(path.to_path_buf()),
                _ => FsError::io(path, e),
            })
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> FsResult<()> {
        if !self.is_writable_file(path) {
            return Err(FsError::NotWritable(path.to_path_buf()));
        }

        fs::write(path, data).map_err(|e| FsError::io(path, e))
    }

    fn read_file(&self, path: &Path) -> FsResult<Vec<u8>> {
        if !self.file_exists(path) {
            return Err(FsError::NotFound(path.to_path_buf()));
        }

        fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FsError::NotFound(path.to_path_buf()),
            _ => FsError::ReadFailure {
                path: path.to_path_buf(),
                source: e,
            },
        })
    }

    fn delete_file(&self, path: &Path) -> FsResult<()> {
        if !self.file_exists(path) {
            return Err(FsError::NotFound(path.to_path_buf()));
        }

        fs::remove_file(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FsError::NotFound(path.to_path_buf()),
            _ => FsError::io(path, e),
        })
    }

    fn remove_dir_recursive(&self, path: &Path) -> FsResult<()> {
        match fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FsError::io(path, e)),
        }
    }

    fn list_dir(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        let reader = fs::read_dir(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FsError::NotFound(path.to_path_buf()),
            _ => FsError::io(path, e),
        })?;

        let mut entries = Vec::new();
        for entry in reader {
            let entry = entry.map_err(|e| FsError::io(path, e))?;
            let file_type = entry.file_type().map_err(|e| FsError::io(&entry.path(), e))?;
            entries.push(DirEntry {
                path: entry.path(),
                is_dir: file_type.is_dir(),
            });
        }

        Ok(entries)
    }

    fn rename_file(&self, from: &Path, to: &Path) -> FsResult<()> {
        fs::rename(from, to).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FsError::NotFound(from.to_path_buf()),
            _ => FsError::io(from, e),
        })
    }
}
