//! Main snapshot interface
//!
//! [`Snapshotter`] wires the pipeline together:
//!
//! ```text
//! FileSystem -> DirectoryWalker -> { NodeEncoder, FileDigester } -> DigestAggregator -> SnapshotWriter
//! ```
//!
//! Runs are all-or-nothing. Argument problems are reported before any
//! traversal starts, and every later failure leaves the output location
//! untouched.

use crate::digester::FileDigester;
use crate::error::{Result, SnapshotError};
use crate::fs::{FileSystem, LocalFileSystem};
use crate::snapshot::Snapshot;
use crate::types::{NodeKind, NodeMetadata, SnapshotConfig, SnapshotSummary};
use crate::walker::DirectoryWalker;
use crate::writer::SnapshotWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Captures and persists snapshots
///
/// # Examples
///
/// ```rust,no_run
/// use treeseal::SnapshotterBuilder;
/// use std::path::Path;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let snapshotter = SnapshotterBuilder::new().parallel_workers(4).build();
/// let summary = snapshotter.take(Path::new("./project"), Path::new("./project.snap"))?;
/// println!("{} files, fingerprint {}", summary.file_count, summary.fingerprint);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Snapshotter<F: FileSystem = LocalFileSystem> {
    fs: F,
    config: SnapshotConfig,
}

impl Snapshotter<LocalFileSystem> {
    /// Snapshotter for the host filesystem with default settings
    pub fn new() -> Self {
        SnapshotterBuilder::new().build()
    }
}

impl Default for Snapshotter<LocalFileSystem> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FileSystem> Snapshotter<F> {
    /// Effective configuration
    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Resolve the subject to its canonical absolute form
    ///
    /// # Errors
    ///
    /// [`SnapshotError::NotADirectory`] if it cannot be resolved.
    pub fn resolve_subject(&self, subject: &Path) -> Result<PathBuf> {
        self.fs
            .canonicalize(subject)
            .map_err(|_| SnapshotError::NotADirectory {
                path: subject.to_path_buf(),
            })
    }

    /// Capture `subject` in memory without writing anything
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::NotADirectory`] if the subject is missing or not a directory
    /// - [`SnapshotError::Io`] on any traversal or read failure
    /// - [`SnapshotError::Encoding`] if a path or link target contains NUL
    #[instrument(skip(self))]
    pub fn capture(&self, subject: &Path) -> Result<Snapshot> {
        let root = self.resolve_subject(subject)?;
        self.capture_resolved(root)
    }

    fn capture_resolved(&self, root: PathBuf) -> Result<Snapshot> {
        let nodes = DirectoryWalker::new(&self.fs, &root).walk()?;
        let digests = FileDigester::new(&self.fs, &root)
            .with_parallel_workers(self.config.parallel_workers)
            .with_read_buffer_size(self.config.read_buffer_size)
            .digest(&nodes)?;
        let snapshot = Snapshot::assemble(root, nodes, digests)?;
        debug!(
            "Captured {} nodes, {} files, fingerprint {}",
            snapshot.nodes().len(),
            snapshot.file_count(),
            snapshot.fingerprint().short()
        );
        Ok(snapshot)
    }

    /// Capture `subject` and persist it to `output`
    ///
    /// `output` must not exist. On failure nothing is left at `output`.
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::NotADirectory`] if the subject is missing or not a directory
    /// - [`SnapshotError::AlreadyExists`] if `output` exists (checked before traversal)
    /// - [`SnapshotError::OutputInsideSubject`] if `output` would sit inside the subject
    /// - [`SnapshotError::Encoding`] / [`SnapshotError::Io`] as for [`Snapshotter::capture`]
    #[instrument(skip(self))]
    pub fn take(&self, subject: &Path, output: &Path) -> Result<SnapshotSummary> {
        let start = Instant::now();
        info!("Taking snapshot of {:?} into {:?}", subject, output);

        let root = self.resolve_subject(subject)?;
        let is_dir = matches!(
            self.fs.metadata(&root, Path::new("")),
            Ok(NodeMetadata { kind: NodeKind::Directory, .. })
        );
        if !is_dir {
            return Err(SnapshotError::NotADirectory {
                path: subject.to_path_buf(),
            });
        }
        let writer = SnapshotWriter::new(output);
        writer.ensure_available()?;
        writer.ensure_outside(&root)?;

        let snapshot = self.capture_resolved(root)?;
        writer.write(&snapshot)?;

        let summary = SnapshotSummary {
            output: output.to_path_buf(),
            subject: snapshot.subject().to_path_buf(),
            node_count: snapshot.nodes().len(),
            file_count: snapshot.file_count(),
            total_file_bytes: snapshot.total_file_bytes(),
            fingerprint: snapshot.fingerprint(),
            duration: start.elapsed(),
        };
        info!(
            "Snapshot {} complete: {} nodes, {} files in {:?}",
            summary.fingerprint.short(),
            summary.node_count,
            summary.file_count,
            summary.duration
        );
        Ok(summary)
    }
}

/// Builder for [`Snapshotter`]
///
/// # Default Values
///
/// - `parallel_workers`: number of CPU cores
/// - `read_buffer_size`: 64 KiB
#[derive(Debug, Clone, Default)]
pub struct SnapshotterBuilder {
    config: SnapshotConfig,
}

impl SnapshotterBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads used to hash file contents (minimum 1)
    ///
    /// The output is byte-identical for every value.
    pub fn parallel_workers(mut self, count: usize) -> Self {
        self.config.parallel_workers = count.max(1);
        self
    }

    /// Read buffer size used while hashing (minimum 1 byte)
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size.max(1);
        self
    }

    /// Build a snapshotter for the host filesystem
    pub fn build(self) -> Snapshotter<LocalFileSystem> {
        self.build_with(LocalFileSystem::new())
    }

    /// Build a snapshotter reading through `fs`
    pub fn build_with<F: FileSystem>(self, fs: F) -> Snapshotter<F> {
        Snapshotter {
            fs,
            config: self.config,
        }
    }
}

/// Snapshot `subject` into `output` with default settings
///
/// ```rust,no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let summary = treeseal::snapshot("./data", "./data.snap")?;
/// println!("{}", summary.fingerprint);
/// # Ok(())
/// # }
/// ```
pub fn snapshot(subject: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<SnapshotSummary> {
    Snapshotter::new().take(subject.as_ref(), output.as_ref())
}
