//! In-Memory File System
//!
//! A [`FileSystem`] kept entirely in memory. Used by tests to exercise the
//! engine without touching disk and to inject failures the real filesystem
//! cannot produce on demand.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{DirEntry, FileSystem, FsError, FsResult};

// == Failure Injection ==
/// Port operations that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsOp {
    CreateDir,
    CreateFile,
    Write,
    Read,
    Delete,
    RemoveDir,
    Rename,
}

#[derive(Debug)]
struct MemFile {
    data: Vec<u8>,
    readable: bool,
    writable: bool,
}

#[derive(Debug, Default)]
struct MemState {
    dirs: BTreeSet<PathBuf>,
    files: BTreeMap<PathBuf, MemFile>,
    read_only_dirs: HashSet<PathBuf>,
    failing: HashSet<FsOp>,
}

impl MemState {
    fn injected(&self, op: FsOp, path: &Path) -> FsResult<()> {
        if !self.failing.contains(&op) {
            return Ok(());
        }
        let source = io::Error::other(format!("injected {:?} failure", op));
        Err(match op {
            FsOp::Read => FsError::ReadFailure {
                path: path.to_path_buf(),
                source,
            },
            _ => FsError::io(path, source),
        })
    }

    fn parent_writable(&self, path: &Path) -> FsResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new(""));
        if !self.dirs.contains(parent) {
            return Err(FsError::io(
                path,
                io::Error::new(io::ErrorKind::NotFound, "parent directory missing"),
            ));
        }
        if self.read_only_dirs.contains(parent) {
            return Err(FsError::io(
                path,
                io::Error::new(io::ErrorKind::PermissionDenied, "parent directory read-only"),
            ));
        }
        Ok(())
    }
}

// == Memory File System ==
/// Thread-safe in-memory filesystem.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    state: Mutex<MemState>,
}

impl MemoryFileSystem {
    /// Creates an empty filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filesystem where `root` and its ancestors already exist.
    pub fn with_dir(root: impl AsRef<Path>) -> Self {
        let fs = Self::new();
        fs.lock().dirs.extend(ancestors(root.as_ref()));
        fs
    }

    fn lock(&self) -> MutexGuard<'_, MemState> {
        // A poisoned lock only means another test thread panicked mid-operation.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Writes a file directly, creating parent directories.
    pub fn put_file(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        let mut state = self.lock();
        if let Some(parent) = path.parent() {
            state.dirs.extend(ancestors(parent));
        }
        state.files.insert(
            path.to_path_buf(),
            MemFile {
                data: data.into(),
                readable: true,
                writable: true,
            },
        );
    }

    /// Returns the contents of a file, if present.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.lock().files.get(path.as_ref()).map(|f| f.data.clone())
    }

    /// Returns every file path at or below `dir`.
    pub fn files_under(&self, dir: impl AsRef<Path>) -> Vec<PathBuf> {
        let dir = dir.as_ref();
        self.lock()
            .files
            .keys()
            .filter(|p| p.starts_with(dir))
            .cloned()
            .collect()
    }

    /// Marks a directory as not writable.
    pub fn set_dir_read_only(&self, path: impl AsRef<Path>, read_only: bool) {
        let mut state = self.lock();
        if read_only {
            state.read_only_dirs.insert(path.as_ref().to_path_buf());
        } else {
            state.read_only_dirs.remove(path.as_ref());
        }
    }

    /// Changes the permission flags of an existing file.
    pub fn set_file_permissions(&self, path: impl AsRef<Path>, readable: bool, writable: bool) {
        if let Some(file) = self.lock().files.get_mut(path.as_ref()) {
            file.readable = readable;
            file.writable = writable;
        }
    }

    /// Makes every future call of `op` fail until [`clear_failures`](Self::clear_failures).
    pub fn fail(&self, op: FsOp) {
        self.lock().failing.insert(op);
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }
}

fn ancestors(path: &Path) -> Vec<PathBuf> {
    path.ancestors()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .collect()
}

impl FileSystem for MemoryFileSystem {
    fn dir_exists(&self, path: &Path) -> bool {
        self.lock().dirs.contains(path)
    }

    fn create_dir(&self, path: &Path, _mode: u32, recursive: bool) -> FsResult<()> {
        let mut state = self.lock();
        state.injected(FsOp::CreateDir, path)?;

        if state.dirs.contains(path) {
            return Err(FsError::AlreadyExists(path.to_path_buf()));
        }
        if state.files.contains_key(path) {
            return Err(FsError::io(
                path,
                io::Error::new(io::ErrorKind::AlreadyExists, "a file occupies this path"),
            ));
        }

        if recursive {
            let missing: Vec<PathBuf> = ancestors(path)
                .into_iter()
                .filter(|p| !state.dirs.contains(p))
                .collect();
            if let Some(parent) = missing.last().and_then(|p| p.parent()) {
                if state.read_only_dirs.contains(parent) {
                    return Err(FsError::io(
                        path,
                        io::Error::new(io::ErrorKind::PermissionDenied, "read-only directory"),
                    ));
                }
            }
            state.dirs.extend(missing);
        } else {
            state.parent_writable(path)?;
            state.dirs.insert(path.to_path_buf());
        }
        Ok(())
    }

    fn is_writable_dir(&self, path: &Path) -> bool {
        let state = self.lock();
        state.dirs.contains(path) && !state.read_only_dirs.contains(path)
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.lock().files.contains_key(path)
    }

    fn is_writable_file(&self, path: &Path) -> bool {
        self.lock().files.get(path).is_some_and(|f| f.writable)
    }

    fn is_readable_file(&self, path: &Path) -> bool {
        self.lock().files.get(path).is_some_and(|f| f.readable)
    }

    fn create_file(&self, path: &Path) -> FsResult<()> {
        let mut state = self.lock();
        state.injected(FsOp::CreateFile, path)?;

        if state.files.contains_key(path) {
            return Err(FsError::AlreadyExists(path.to_path_buf()));
        }
        state.parent_writable(path)?;
        state.files.insert(
            path.to_path_buf(),
            MemFile {
                data: Vec::new(),
                readable: true,
                writable: true,
            },
        );
        Ok(())
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> FsResult<()> {
        let mut state = self.lock();
        state.injected(FsOp::Write, path)?;

        match state.files.get_mut(path) {
            Some(file) if file.writable => {
                file.data = data.to_vec();
                Ok(())
            }
            _ => Err(FsError::NotWritable(path.to_path_buf())),
        }
    }

    fn read_file(&self, path: &Path) -> FsResult<Vec<u8>> {
        let state = self.lock();
        let file = state
            .files
            .get(path)
            .ok_or_else(|| FsError::NotFound(path.to_path_buf()))?;
        state.injected(FsOp::Read, path)?;

        if !file.readable {
            return Err(FsError::ReadFailure {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "file not readable"),
            });
        }
        Ok(file.data.clone())
    }

    fn delete_file(&self, path: &Path) -> FsResult<()> {
        let mut state = self.lock();
        if !state.files.contains_key(path) {
            return Err(FsError::NotFound(path.to_path_buf()));
        }
        state.injected(FsOp::Delete, path)?;
        state.parent_writable(path)?;
        state.files.remove(path);
        Ok(())
    }

    fn remove_dir_recursive(&self, path: &Path) -> FsResult<()> {
        let mut state = self.lock();
        state.injected(FsOp::RemoveDir, path)?;

        state.files.retain(|p, _| !p.starts_with(path));
        state.dirs.retain(|p| !p.starts_with(path));
        Ok(())
    }

    fn list_dir(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        let state = self.lock();
        if !state.dirs.contains(path) {
            return Err(FsError::NotFound(path.to_path_buf()));
        }

        let dirs = state
            .dirs
            .iter()
            .filter(|p| p.parent() == Some(path))
            .map(|p| DirEntry {
                path: p.clone(),
                is_dir: true,
            });
        let files = state
            .files
            .keys()
            .filter(|p| p.parent() == Some(path))
            .map(|p| DirEntry {
                path: p.clone(),
                is_dir: false,
            });

        Ok(dirs.chain(files).collect())
    }

    fn rename_file(&self, from: &Path, to: &Path) -> FsResult<()> {
        let mut state = self.lock();
        state.injected(FsOp::Rename, from)?;

        if !state.files.contains_key(from) {
            return Err(FsError::NotFound(from.to_path_buf()));
        }
        state.parent_writable(to)?;
        if let Some(file) = state.files.remove(from) {
            state.files.insert(to.to_path_buf(), file);
        }
        Ok(())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_dir_creates_ancestors() {
        let fs = MemoryFileSystem::with_dir("/var/cache/app");
        assert!(fs.dir_exists(Path::new("/var/cache/app")));
        assert!(fs.dir_exists(Path::new("/var/cache")));
        assert!(fs.dir_exists(Path::new("/")));
    }

    #[test]
    fn test_create_dir_semantics() {
        let fs = MemoryFileSystem::with_dir("/root");

        fs.create_dir(Path::new("/root/a/b"), 0o755, true).unwrap();
        assert!(fs.dir_exists(Path::new("/root/a")));
        assert!(matches!(
            fs.create_dir(Path::new("/root/a"), 0o755, true),
            Err(FsError::AlreadyExists(_))
        ));
        assert!(fs
            .create_dir(Path::new("/root/x/y"), 0o755, false)
            .is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let fs = MemoryFileSystem::with_dir("/root");
        let path = Path::new("/root/f.json");

        fs.create_file(path).unwrap();
        fs.write_file(path, b"data").unwrap();

        assert_eq!(fs.read_file(path).unwrap(), b"data");
        assert!(matches!(fs.create_file(path), Err(FsError::AlreadyExists(_))));
    }

    #[test]
    fn test_permission_flags() {
        let fs = MemoryFileSystem::with_dir("/root");
        let path = Path::new("/root/f.json");
        fs.put_file(path, "x");

        fs.set_file_permissions(path, false, false);

        assert!(fs.file_exists(path));
        assert!(!fs.is_readable_file(path));
        assert!(!fs.is_writable_file(path));
        assert!(matches!(fs.write_file(path, b"y"), Err(FsError::NotWritable(_))));
        assert!(matches!(fs.read_file(path), Err(FsError::ReadFailure { .. })));
    }

    #[test]
    fn test_injected_failures() {
        let fs = MemoryFileSystem::with_dir("/root");
        let path = Path::new("/root/f.json");
        fs.put_file(path, "x");

        fs.fail(FsOp::Read);
        assert!(matches!(fs.read_file(path), Err(FsError::ReadFailure { .. })));

        fs.clear_failures();
        assert!(fs.read_file(path).is_ok());
    }

    #[test]
    fn test_read_only_dir_blocks_creation() {
        let fs = MemoryFileSystem::with_dir("/root");
        fs.set_dir_read_only("/root", true);

        assert!(!fs.is_writable_dir(Path::new("/root")));
        assert!(fs.create_file(Path::new("/root/f.json")).is_err());
    }

    #[test]
    fn test_remove_dir_recursive_and_list() {
        let fs = MemoryFileSystem::with_dir("/root");
        fs.put_file("/root/ns/a/one.json", "1");
        fs.put_file("/root/ns/two.json", "2");

        let listed = fs.list_dir(Path::new("/root/ns")).unwrap();
        assert_eq!(listed.len(), 2);

        fs.remove_dir_recursive(Path::new("/root/ns")).unwrap();
        assert!(!fs.dir_exists(Path::new("/root/ns")));
        assert!(fs.files_under("/root").is_empty());
        assert!(fs.dir_exists(Path::new("/root")));

        // Missing directory is a successful no-op
        assert!(fs.remove_dir_recursive(Path::new("/root/ns")).is_ok());
    }
}
