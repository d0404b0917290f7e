//! Atomic persistence of snapshot artifacts
//!
//! The output location must not exist. Artifacts are written into a staging
//! directory next to it, flushed, made read-only and then moved into place with
//! a single rename. A failed run never leaves a partially-populated output
//! location behind: the staging directory is removed when it goes out of scope.
//!
//! ## Layout
//!
//! ```text
//! <output>/
//!   subject      canonical subject path, NUL-terminated
//!   nodes        node stream
//!   files        File-kind paths, NUL-terminated
//!   digests      digest stream
//!   fingerprint  sha256(nodes ‖ digests) in hex, newline-terminated
//! ```

use crate::error::{Result, SnapshotError};
use crate::encoding::DELIM;
use crate::snapshot::Snapshot;
use crate::utils::path_to_bytes;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Artifact holding the canonical subject path
pub const SUBJECT_ARTIFACT: &str = "subject";
/// Artifact holding the node stream
pub const NODES_ARTIFACT: &str = "nodes";
/// Artifact holding the File-kind path manifest
pub const FILES_ARTIFACT: &str = "files";
/// Artifact holding the digest stream
pub const DIGESTS_ARTIFACT: &str = "digests";
/// Artifact holding the hex fingerprint
pub const FINGERPRINT_ARTIFACT: &str = "fingerprint";

/// Every artifact, in the order they are written
pub const ARTIFACTS: [&str; 5] = [
    SUBJECT_ARTIFACT,
    NODES_ARTIFACT,
    FILES_ARTIFACT,
    DIGESTS_ARTIFACT,
    FINGERPRINT_ARTIFACT,
];

/// Writes a [`Snapshot`] to a fresh output location
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    output: PathBuf,
}

impl SnapshotWriter {
    /// Create a writer targeting `output`
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
        }
    }

    /// Target location
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Fail with [`SnapshotError::AlreadyExists`] if anything occupies the output path
    ///
    /// Dangling symlinks count as occupying it.
    pub fn ensure_available(&self) -> Result<()> {
        match fs::symlink_metadata(&self.output) {
            Ok(_) => Err(SnapshotError::AlreadyExists {
                path: self.output.clone(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SnapshotError::io(&self.output, e)),
        }
    }

    /// Fail with [`SnapshotError::OutputInsideSubject`] if the output would land under `subject`
    ///
    /// `subject` must be canonical. An unresolvable parent is left for
    /// [`SnapshotWriter::write`] to report.
    pub fn ensure_outside(&self, subject: &Path) -> Result<()> {
        let parent = match fs::canonicalize(self.parent()) {
            Ok(parent) => parent,
            Err(_) => return Ok(()),
        };
        if parent.starts_with(subject) {
            return Err(SnapshotError::OutputInsideSubject {
                output: self.output.clone(),
                subject: subject.to_path_buf(),
            });
        }
        Ok(())
    }

    fn parent(&self) -> PathBuf {
        match self.output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Persist every artifact of `snapshot`
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::AlreadyExists`] if the output path exists
    /// - [`SnapshotError::Io`] if staging, writing or the final rename fails
    #[instrument(skip(self, snapshot), fields(output = ?self.output))]
    pub fn write(&self, snapshot: &Snapshot) -> Result<()> {
        self.ensure_available()?;

        let parent = self.parent();
        let staging = tempfile::Builder::new()
            .prefix(".treeseal-staging-")
            .tempdir_in(&parent)
            .map_err(|e| SnapshotError::io(&parent, e))?;
        debug!("Staging snapshot in {:?}", staging.path());

        let mut subject = path_to_bytes(snapshot.subject()).into_owned();
        subject.push(DELIM);
        let fingerprint = format!("{}\n", snapshot.fingerprint());

        let contents: [(&str, &[u8]); 5] = [
            (SUBJECT_ARTIFACT, &subject),
            (NODES_ARTIFACT, snapshot.nodes_stream()),
            (FILES_ARTIFACT, snapshot.files_stream()),
            (DIGESTS_ARTIFACT, snapshot.digests_stream()),
            (FINGERPRINT_ARTIFACT, fingerprint.as_bytes()),
        ];
        for (name, bytes) in contents {
            write_artifact(&staging.path().join(name), bytes)?;
        }
        seal_directory(staging.path())?;

        // Re-check right before the rename: rename(2) would replace an empty
        // directory that appeared at the target in the meantime.
        self.ensure_available()?;
        fs::rename(staging.path(), &self.output)
            .map_err(|e| SnapshotError::io(&self.output, e))?;
        // The staging path no longer exists, so dropping `staging` removes nothing.
        sync_directory(&parent)?;

        info!(
            "Wrote snapshot {} to {:?}",
            snapshot.fingerprint().short(),
            self.output
        );
        Ok(())
    }
}

fn write_artifact(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| SnapshotError::io(path, e))?;
    file.write_all(bytes).map_err(|e| SnapshotError::io(path, e))?;
    file.sync_all().map_err(|e| SnapshotError::io(path, e))?;
    make_read_only(path)
}

#[cfg(unix)]
fn make_read_only(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o444))
        .map_err(|e| SnapshotError::io(path, e))
}

#[cfg(not(unix))]
fn make_read_only(path: &Path) -> Result<()> {
    let mut permissions = fs::metadata(path).map_err(|e| SnapshotError::io(path, e))?.permissions();
    permissions.set_readonly(true);
    fs::set_permissions(path, permissions).map_err(|e| SnapshotError::io(path, e))
}

/// Staging directories are created `0700`; the published snapshot is world-readable
#[cfg(unix)]
fn seal_directory(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|e| SnapshotError::io(path, e))
}

#[cfg(not(unix))]
fn seal_directory(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn sync_directory(path: &Path) -> Result<()> {
    File::open(path)
        .and_then(|dir| dir.sync_all())
        .map_err(|e| SnapshotError::io(path, e))
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> Result<()> {
    Ok(())
}
