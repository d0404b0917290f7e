//! Loading persisted snapshots
//!
//! [`SnapshotReader`] opens a snapshot directory written by
//! [`crate::writer::SnapshotWriter`] and parses every artifact back into a
//! [`Snapshot`]. The stored fingerprint is kept separately so callers can tell
//! whether it still matches the streams it claims to cover.

use crate::error::{Result, SnapshotError};
use crate::encoding::DELIM;
use crate::snapshot::{Snapshot, SnapshotEntry};
use crate::types::ContentDigest;
use crate::utils::bytes_to_path;
use crate::writer::{
    DIGESTS_ARTIFACT, FILES_ARTIFACT, FINGERPRINT_ARTIFACT, NODES_ARTIFACT, SUBJECT_ARTIFACT,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// A snapshot loaded from disk
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    location: PathBuf,
    snapshot: Snapshot,
    stored_fingerprint: Option<ContentDigest>,
}

impl SnapshotReader {
    /// Open and parse the snapshot at `location`
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::SnapshotNotFound`] if `location` is not a directory
    /// - [`SnapshotError::MalformedSnapshot`] naming the first artifact that
    ///   is missing or cannot be parsed
    /// - [`SnapshotError::Io`] if an artifact exists but cannot be read
    #[instrument]
    pub fn open(location: &Path) -> Result<Self> {
        if !location.is_dir() {
            return Err(SnapshotError::SnapshotNotFound(location.to_path_buf()));
        }

        let subject = parse_subject(&read_artifact(location, SUBJECT_ARTIFACT)?)?;
        let nodes = read_artifact(location, NODES_ARTIFACT)?;
        let digests = read_artifact(location, DIGESTS_ARTIFACT)?;
        let files = read_artifact(location, FILES_ARTIFACT)?;
        let stored_fingerprint = read_optional(location, FINGERPRINT_ARTIFACT)?
            .map(|bytes| parse_fingerprint(&bytes))
            .transpose()?;

        let snapshot = Snapshot::from_streams(subject, nodes, digests, files)?;
        debug!(
            "Loaded snapshot of {:?}: {} nodes, {} digests",
            snapshot.subject(),
            snapshot.nodes().len(),
            snapshot.digests().len()
        );

        Ok(Self {
            location: location.to_path_buf(),
            snapshot,
            stored_fingerprint,
        })
    }

    /// Directory the snapshot was read from
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Parsed snapshot with a freshly computed fingerprint
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Consume the reader and keep the snapshot
    pub fn into_snapshot(self) -> Snapshot {
        self.snapshot
    }

    /// Fingerprint recorded in the `fingerprint` artifact, if present
    pub fn stored_fingerprint(&self) -> Option<ContentDigest> {
        self.stored_fingerprint
    }

    /// Nodes joined with their digests, in traversal order
    pub fn entries(&self) -> Vec<SnapshotEntry> {
        self.snapshot.entries()
    }
}

fn read_artifact(location: &Path, name: &'static str) -> Result<Vec<u8>> {
    read_optional(location, name)?
        .ok_or_else(|| SnapshotError::malformed(name, "artifact is missing"))
}

fn read_optional(location: &Path, name: &'static str) -> Result<Option<Vec<u8>>> {
    let path = location.join(name);
    match fs::read(&path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SnapshotError::io(path, e)),
    }
}

fn parse_subject(bytes: &[u8]) -> Result<PathBuf> {
    let path = match bytes.split_last() {
        Some((&DELIM, path)) if !path.is_empty() && !path.contains(&DELIM) => path,
        _ => {
            return Err(SnapshotError::malformed(
                SUBJECT_ARTIFACT,
                "expected one NUL-terminated path",
            ))
        }
    };
    bytes_to_path(path).ok_or_else(|| {
        SnapshotError::malformed(SUBJECT_ARTIFACT, "path is not representable on this platform")
    })
}

fn parse_fingerprint(bytes: &[u8]) -> Result<ContentDigest> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.strip_suffix('\n'))
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            SnapshotError::malformed(
                FINGERPRINT_ARTIFACT,
                "expected 64 lowercase hex digits and a newline",
            )
        })
}
