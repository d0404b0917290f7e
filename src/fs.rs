//! Filesystem capability consumed by the snapshot pipeline
//!
//! The walker and the digester never touch `std::fs` directly. They go through
//! the [`FileSystem`] trait, and every call takes the subject root and the
//! relative path as separate arguments. Nothing depends on the process working
//! directory, so reads for different files can run on different threads.
//!
//! Two implementations ship with the crate:
//!
//! - [`LocalFileSystem`]: the real filesystem via `std::fs`
//! - [`MemoryFileSystem`]: an in-memory tree, handy for tests that need names or
//!   failures the host filesystem cannot produce
//!
//! ```rust
//! use treeseal::fs::{FileSystem, MemoryFileSystem};
//! use std::path::Path;
//!
//! let fs = MemoryFileSystem::new()
//!     .with_dir("/subject", 0o755)
//!     .with_file("/subject/a.txt", b"hi", 0o644);
//!
//! let names = fs.read_dir(Path::new("/subject"), Path::new("")).unwrap();
//! assert_eq!(names, vec![std::ffi::OsString::from("a.txt")]);
//! ```

use crate::types::{NodeKind, NodeMetadata, OtherKind};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

/// Read-only view of a directory tree
///
/// Implementations must not follow symbolic links in [`FileSystem::metadata`].
pub trait FileSystem: Send + Sync {
    /// Resolve `path` to an absolute, symlink-free path
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    /// Type, mode and size of `root/rel` (symlinks are not followed)
    fn metadata(&self, root: &Path, rel: &Path) -> io::Result<NodeMetadata>;

    /// Names of the entries directly inside `root/rel`, in no particular order
    fn read_dir(&self, root: &Path, rel: &Path) -> io::Result<Vec<OsString>>;

    /// Target of the symbolic link at `root/rel`
    fn read_link(&self, root: &Path, rel: &Path) -> io::Result<PathBuf>;

    /// Open `root/rel` for streaming reads
    fn open(&self, root: &Path, rel: &Path) -> io::Result<Box<dyn Read + Send + '_>>;
}

/// Join a relative path onto the root without adding a trailing separator
pub(crate) fn resolve(root: &Path, rel: &Path) -> PathBuf {
    if rel.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(rel)
    }
}

/// The host filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    /// Create a handle to the host filesystem
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for LocalFileSystem {
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }

    fn metadata(&self, root: &Path, rel: &Path) -> io::Result<NodeMetadata> {
        let metadata = fs::symlink_metadata(resolve(root, rel))?;
        Ok(NodeMetadata {
            kind: kind_of(&metadata.file_type()),
            mode: mode_of(&metadata),
            size: metadata.len(),
        })
    }

    fn read_dir(&self, root: &Path, rel: &Path) -> io::Result<Vec<OsString>> {
        fs::read_dir(resolve(root, rel))?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect()
    }

    fn read_link(&self, root: &Path, rel: &Path) -> io::Result<PathBuf> {
        fs::read_link(resolve(root, rel))
    }

    fn open(&self, root: &Path, rel: &Path) -> io::Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(fs::File::open(resolve(root, rel))?))
    }
}

#[cfg(unix)]
fn kind_of(file_type: &fs::FileType) -> NodeKind {
    use std::os::unix::fs::FileTypeExt;

    if file_type.is_symlink() {
        NodeKind::Symlink
    } else if file_type.is_dir() {
        NodeKind::Directory
    } else if file_type.is_file() {
        NodeKind::File
    } else if file_type.is_char_device() {
        NodeKind::Other(OtherKind::CharDevice)
    } else if file_type.is_block_device() {
        NodeKind::Other(OtherKind::BlockDevice)
    } else if file_type.is_fifo() {
        NodeKind::Other(OtherKind::Fifo)
    } else if file_type.is_socket() {
        NodeKind::Other(OtherKind::Socket)
    } else {
        NodeKind::Other(OtherKind::Unknown)
    }
}

#[cfg(not(unix))]
fn kind_of(file_type: &fs::FileType) -> NodeKind {
    if file_type.is_symlink() {
        NodeKind::Symlink
    } else if file_type.is_dir() {
        NodeKind::Directory
    } else if file_type.is_file() {
        NodeKind::File
    } else {
        NodeKind::Other(OtherKind::Unknown)
    }
}

#[cfg(unix)]
fn mode_of(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

/// Map attributes to Unix-like permissions on platforms without mode bits
#[cfg(not(unix))]
fn mode_of(metadata: &fs::Metadata) -> u32 {
    let mut mode = if metadata.permissions().readonly() { 0o444 } else { 0o644 };
    if metadata.is_dir() {
        mode |= 0o111;
    }
    mode
}

#[derive(Debug, Clone)]
enum MemoryEntry {
    Directory { mode: u32 },
    File {
        mode: u32,
        content: Vec<u8>,
        readable: bool,
    },
    Symlink { target: PathBuf },
    Special { kind: OtherKind, mode: u32 },
}

/// In-memory directory tree
///
/// Paths are absolute and stored verbatim. Missing ancestors are created as
/// `0o755` directories when an entry is inserted.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    entries: BTreeMap<PathBuf, MemoryEntry>,
}

impl MemoryFileSystem {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory
    pub fn with_dir(mut self, path: impl Into<PathBuf>, mode: u32) -> Self {
        self.insert(path.into(), MemoryEntry::Directory { mode });
        self
    }

    /// Add a regular file
    pub fn with_file(mut self, path: impl Into<PathBuf>, content: &[u8], mode: u32) -> Self {
        self.write_file(path, content, mode);
        self
    }

    /// Add a regular file whose reads always fail with `PermissionDenied`
    pub fn with_unreadable_file(
        mut self,
        path: impl Into<PathBuf>,
        content: &[u8],
        mode: u32,
    ) -> Self {
        self.insert(
            path.into(),
            MemoryEntry::File {
                mode,
                content: content.to_vec(),
                readable: false,
            },
        );
        self
    }

    /// Add a symbolic link
    pub fn with_symlink(mut self, path: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        self.insert(
            path.into(),
            MemoryEntry::Symlink {
                target: target.into(),
            },
        );
        self
    }

    /// Add a special file such as a FIFO or device node
    pub fn with_special(mut self, path: impl Into<PathBuf>, kind: OtherKind, mode: u32) -> Self {
        self.insert(path.into(), MemoryEntry::Special { kind, mode });
        self
    }

    /// Create or replace a regular file
    pub fn write_file(&mut self, path: impl Into<PathBuf>, content: &[u8], mode: u32) {
        self.insert(
            path.into(),
            MemoryEntry::File {
                mode,
                content: content.to_vec(),
                readable: true,
            },
        );
    }

    /// Change the permission bits of an existing entry
    pub fn set_mode(&mut self, path: impl AsRef<Path>, new_mode: u32) -> io::Result<()> {
        match self.entries.get_mut(path.as_ref()) {
            Some(MemoryEntry::Directory { mode })
            | Some(MemoryEntry::File { mode, .. })
            | Some(MemoryEntry::Special { mode, .. }) => {
                *mode = new_mode;
                Ok(())
            }
            Some(MemoryEntry::Symlink { .. }) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "symlink permissions are fixed",
            )),
            None => Err(not_found(path.as_ref())),
        }
    }

    /// Remove an entry and everything below it
    pub fn remove(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.entries.retain(|p, _| !p.starts_with(path));
    }

    fn insert(&mut self, path: PathBuf, entry: MemoryEntry) {
        let mut ancestor = path.parent();
        while let Some(dir) = ancestor {
            if dir.as_os_str().is_empty() {
                break;
            }
            self.entries
                .entry(dir.to_path_buf())
                .or_insert(MemoryEntry::Directory { mode: 0o755 });
            ancestor = dir.parent();
        }
        self.entries.insert(path, entry);
    }

    fn lookup(&self, path: &Path) -> io::Result<&MemoryEntry> {
        self.entries.get(path).ok_or_else(|| not_found(path))
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{:?} does not exist", path))
}

impl FileSystem for MemoryFileSystem {
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        self.lookup(path)?;
        Ok(path.to_path_buf())
    }

    fn metadata(&self, root: &Path, rel: &Path) -> io::Result<NodeMetadata> {
        let metadata = match self.lookup(&resolve(root, rel))? {
            MemoryEntry::Directory { mode } => NodeMetadata {
                kind: NodeKind::Directory,
                mode: *mode,
                size: 0,
            },
            MemoryEntry::File { mode, content, .. } => NodeMetadata {
                kind: NodeKind::File,
                mode: *mode,
                size: content.len() as u64,
            },
            MemoryEntry::Symlink { target } => NodeMetadata {
                kind: NodeKind::Symlink,
                mode: 0o777,
                size: target.as_os_str().len() as u64,
            },
            MemoryEntry::Special { kind, mode } => NodeMetadata {
                kind: NodeKind::Other(*kind),
                mode: *mode,
                size: 0,
            },
        };
        Ok(metadata)
    }

    fn read_dir(&self, root: &Path, rel: &Path) -> io::Result<Vec<OsString>> {
        let dir = resolve(root, rel);
        match self.lookup(&dir)? {
            MemoryEntry::Directory { .. } => Ok(self
                .entries
                .keys()
                .filter(|p| p.parent() == Some(dir.as_path()))
                .filter_map(|p| p.file_name().map(|n| n.to_os_string()))
                .collect()),
            _ => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{:?} is not a directory", dir),
            )),
        }
    }

    fn read_link(&self, root: &Path, rel: &Path) -> io::Result<PathBuf> {
        let path = resolve(root, rel);
        match self.lookup(&path)? {
            MemoryEntry::Symlink { target } => Ok(target.clone()),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{:?} is not a symlink", path),
            )),
        }
    }

    fn open(&self, root: &Path, rel: &Path) -> io::Result<Box<dyn Read + Send + '_>> {
        let path = resolve(root, rel);
        match self.lookup(&path)? {
            MemoryEntry::File { content, readable: true, .. } => {
                Ok(Box::new(Cursor::new(content.as_slice())))
            }
            MemoryEntry::File { readable: false, .. } => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{:?} is not readable", path),
            )),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{:?} is not a regular file", path),
            )),
        }
    }
}
