//! Filesystem access used by template resolution and the compile cache
//!
//! Everything the renderer does on disk goes through [`ThemeFs`], so the same
//! code runs against the real filesystem ([`NativeFs`]) or an in-memory tree
//! with a logical clock ([`MemoryFs`]).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

/// Low-level filesystem operations needed by the renderer
pub trait ThemeFs: Debug + Send + Sync {
    /// Whether `path` exists and is a regular file
    fn is_file(&self, path: &Path) -> bool;

    /// Whether `path` exists and is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Last modification time
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Write `contents` to `path`, replacing any previous contents
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Create `path` and any missing parents with the given permission mode
    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Whether new files can be created inside the directory `path`
    fn is_writable(&self, path: &Path) -> bool;

    /// Change the permission mode of `path`
    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()>;
}

/// [`ThemeFs`] backed by `std::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeFs;

impl ThemeFs for NativeFs {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;
        builder.create(path)
    }

    fn is_writable(&self, path: &Path) -> bool {
        // Permission bits alone don't tell whether *this* process may write
        // (ownership, ACLs, read-only mounts), so probe with a real file.
        path.is_dir() && tempfile::tempfile_in(path).is_ok()
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        }
        #[cfg(not(unix))]
        {
            let mut perms = std::fs::metadata(path)?.permissions();
            perms.set_readonly(mode & 0o200 == 0);
            std::fs::set_permissions(path, perms)
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    contents: String,
    modified: u64,
}

#[derive(Debug, Clone)]
struct MemoryDir {
    mode: u32,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<PathBuf, MemoryFile>,
    dirs: BTreeMap<PathBuf, MemoryDir>,
    /// Directories that can neither be created nor have their mode changed
    locked: BTreeSet<PathBuf>,
    /// Bits cleared from the mode of directories made by `create_dir_all`
    umask: u32,
    /// Logical clock in seconds; every write advances it
    clock: u64,
}

impl MemoryState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn is_locked(&self, path: &Path) -> bool {
        self.locked.iter().any(|locked| path.starts_with(locked))
    }

    fn insert_dirs(&mut self, path: &Path, mode: u32) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            self.dirs
                .entry(ancestor.to_path_buf())
                .or_insert(MemoryDir { mode });
        }
    }

    /// Closest directory at or above `path` that already exists
    fn nearest_dir<'p>(&self, path: &'p Path) -> Option<&'p Path> {
        path.ancestors()
            .filter(|ancestor| !ancestor.as_os_str().is_empty())
            .find(|ancestor| self.dirs.contains_key(*ancestor))
    }

    fn dir_writable(&self, path: &Path) -> bool {
        !self.is_locked(path)
            && self
                .dirs
                .get(path)
                .map(|dir| dir.mode & 0o200 != 0)
                .unwrap_or(false)
    }
}

/// In-memory [`ThemeFs`] with a deterministic clock
///
/// Each write advances the clock by one second, so modification times are
/// strictly ordered by write order. Directories carry a permission mode; a
/// directory is writable when its owner-write bit is set.
#[derive(Debug, Default)]
pub struct MemoryFs {
    state: Mutex<MemoryState>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a file, creating its parent directories (mode `0o755`)
    pub fn add_file(&self, path: impl AsRef<Path>, contents: &str) {
        let path = path.as_ref();
        let mut state = self.state();
        if let Some(parent) = path.parent() {
            state.insert_dirs(parent, 0o755);
        }
        let modified = state.tick();
        state.files.insert(
            path.to_path_buf(),
            MemoryFile {
                contents: contents.to_string(),
                modified,
            },
        );
    }

    /// Add a directory (and its parents) with the given mode
    pub fn add_dir(&self, path: impl AsRef<Path>, mode: u32) {
        let path = path.as_ref();
        let mut state = self.state();
        state.insert_dirs(path, 0o755);
        state.dirs.insert(path.to_path_buf(), MemoryDir { mode });
    }

    /// Mark a file as modified now without changing its contents
    pub fn touch(&self, path: impl AsRef<Path>) {
        let mut state = self.state();
        let now = state.tick();
        if let Some(file) = state.files.get_mut(path.as_ref()) {
            file.modified = now;
        }
    }

    /// Set a file's modification time to an explicit clock value (seconds)
    pub fn set_modified(&self, path: impl AsRef<Path>, secs: u64) {
        if let Some(file) = self.state().files.get_mut(path.as_ref()) {
            file.modified = secs;
        }
    }

    /// Clear `mask` from the mode of directories created from now on.
    ///
    /// Like a process umask, it applies to `create_dir_all` but not to
    /// `set_mode`.
    pub fn set_umask(&self, mask: u32) {
        self.state().umask = mask;
    }

    /// Forbid creating `path` (or anything below it) and changing its mode
    pub fn lock_dir(&self, path: impl AsRef<Path>) {
        self.state().locked.insert(path.as_ref().to_path_buf());
    }

    /// Current mode of a directory, if it exists
    pub fn dir_mode(&self, path: impl AsRef<Path>) -> Option<u32> {
        self.state().dirs.get(path.as_ref()).map(|dir| dir.mode)
    }

    /// Contents of a file, if it exists
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        self.state()
            .files
            .get(path.as_ref())
            .map(|file| file.contents.clone())
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{}: no such file or directory", path.display()),
    )
}

fn permission_denied(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("{}: permission denied", path.display()),
    )
}

impl ThemeFs for MemoryFs {
    fn is_file(&self, path: &Path) -> bool {
        self.state().files.contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.state().dirs.contains_key(path)
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        let state = self.state();
        let file = state.files.get(path).ok_or_else(|| not_found(path))?;
        Ok(SystemTime::UNIX_EPOCH + Duration::from_secs(file.modified))
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.contents(path).ok_or_else(|| not_found(path))
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        let mut state = self.state();
        let parent = path.parent().ok_or_else(|| not_found(path))?;
        if !state.dirs.contains_key(parent) {
            return Err(not_found(parent));
        }
        if !state.dir_writable(parent) {
            return Err(permission_denied(parent));
        }
        let modified = state.tick();
        state.files.insert(
            path.to_path_buf(),
            MemoryFile {
                contents: contents.to_string(),
                modified,
            },
        );
        Ok(())
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut state = self.state();
        if state.is_locked(path) {
            return Err(permission_denied(path));
        }
        match state.nearest_dir(path) {
            Some(existing) if existing == path => return Ok(()),
            Some(existing) if !state.dir_writable(existing) => {
                return Err(permission_denied(existing));
            }
            _ => {}
        }
        let mode = mode & !state.umask;
        state.insert_dirs(path, mode);
        Ok(())
    }

    fn is_writable(&self, path: &Path) -> bool {
        self.state().dir_writable(path)
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut state = self.state();
        if state.is_locked(path) {
            return Err(permission_denied(path));
        }
        let dir = state.dirs.get_mut(path).ok_or_else(|| not_found(path))?;
        dir.mode = mode;
        Ok(())
    }
}
