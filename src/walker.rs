//! Deterministic directory traversal
//!
//! [`DirectoryWalker`] enumerates every entry below a subject root in
//! *canonical traversal order*: depth-first, pre-order, with the entries of
//! each directory sorted by the bytes of their names before descending. Raw
//! OS enumeration order is never observable in the output.
//!
//! Symbolic links are recorded with their target but never followed, so
//! cycles cannot occur and the link itself is what gets captured.
//!
//! ```rust
//! use treeseal::fs::MemoryFileSystem;
//! use treeseal::walker::DirectoryWalker;
//! use std::path::{Path, PathBuf};
//!
//! let fs = MemoryFileSystem::new()
//!     .with_file("/s/b/c.txt", b"bye", 0o644)
//!     .with_file("/s/a.txt", b"hi", 0o644);
//!
//! let nodes = DirectoryWalker::new(&fs, Path::new("/s")).walk().unwrap();
//! let paths: Vec<_> = nodes.iter().map(|n| n.path.clone()).collect();
//! assert_eq!(paths, vec![
//!     PathBuf::from("a.txt"),
//!     PathBuf::from("b"),
//!     PathBuf::from("b/c.txt"),
//! ]);
//! ```

use crate::error::{Result, SnapshotError};
use crate::fs::{resolve, FileSystem};
use crate::types::{Node, NodeKind};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Walks a subject tree through a [`FileSystem`]
#[derive(Debug)]
pub struct DirectoryWalker<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
    root: &'a Path,
}

impl<'a, F: FileSystem + ?Sized> DirectoryWalker<'a, F> {
    /// Create a walker for `root`
    ///
    /// `root` should already be canonical; relative paths in the output are
    /// taken against it verbatim.
    pub fn new(fs: &'a F, root: &'a Path) -> Self {
        Self { fs, root }
    }

    /// Produce the node records of every entry below the root
    ///
    /// The root itself is not included.
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::NotADirectory`] if the root is missing or not a directory
    /// - [`SnapshotError::Io`] if any directory listing, stat or readlink fails
    pub fn walk(&self) -> Result<Vec<Node>> {
        self.ensure_root()?;

        let mut nodes = Vec::new();
        // LIFO stack; children are pushed in reverse so the smallest name pops first.
        let mut pending = self.sorted_children(Path::new(""))?;
        pending.reverse();

        while let Some(rel) = pending.pop() {
            let node = self.read_node(rel)?;
            if node.kind == NodeKind::Directory {
                let mut children = self.sorted_children(&node.path)?;
                children.reverse();
                pending.extend(children);
            }
            trace!("walked {:?} ({})", node.path, node.kind);
            nodes.push(node);
        }

        debug!("Walked {} nodes under {:?}", nodes.len(), self.root);
        Ok(nodes)
    }

    fn ensure_root(&self) -> Result<()> {
        match self.fs.metadata(self.root, Path::new("")) {
            Ok(metadata) if metadata.kind == NodeKind::Directory => Ok(()),
            _ => Err(SnapshotError::NotADirectory {
                path: self.root.to_path_buf(),
            }),
        }
    }

    fn sorted_children(&self, rel: &Path) -> Result<Vec<PathBuf>> {
        let mut names = self
            .fs
            .read_dir(self.root, rel)
            .map_err(|e| SnapshotError::io(resolve(self.root, rel), e))?;
        names.sort();
        Ok(names.into_iter().map(|name| rel.join(name)).collect())
    }

    fn read_node(&self, rel: PathBuf) -> Result<Node> {
        let metadata = self
            .fs
            .metadata(self.root, &rel)
            .map_err(|e| SnapshotError::io(resolve(self.root, &rel), e))?;

        let link_target = if metadata.kind == NodeKind::Symlink {
            Some(
                self.fs
                    .read_link(self.root, &rel)
                    .map_err(|e| SnapshotError::io(resolve(self.root, &rel), e))?,
            )
        } else {
            None
        };

        Ok(Node::from_metadata(rel, metadata, link_target))
    }
}
