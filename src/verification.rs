//! Snapshot verification
//!
//! Two levels of checking are offered:
//!
//! 1. **Integrity** ([`verify_integrity`]): the stored artifacts agree with
//!    each other. The fingerprint is recomputed from `nodes` and `digests`,
//!    the `files` manifest must list exactly the File-kind nodes, and the
//!    digest records must follow those nodes one for one.
//! 2. **Subject** ([`verify_subject`]): integrity plus a fresh in-memory
//!    capture of the subject, compared path by path with the stored one.
//!
//! Mismatches never surface as errors. They are collected in a
//! [`VerificationReport`]; an `Err` means the snapshot could not be read at all.
//!
//! ```rust,no_run
//! use treeseal::verification::verify_subject;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let report = verify_subject(Path::new("./data.snap"), None)?;
//! if !report.is_valid() {
//!     println!("{}", report.summary());
//! }
//! # Ok(())
//! # }
//! ```

use crate::compare::{compare, Change};
use crate::encoding;
use crate::error::Result;
use crate::fs::FileSystem;
use crate::reader::SnapshotReader;
use crate::snapshotter::Snapshotter;
use crate::types::ContentDigest;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Outcome of a verification run
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    /// Snapshot directory that was checked
    pub snapshot: PathBuf,
    /// Subject recorded in the snapshot
    pub subject: PathBuf,
    /// Record layout the artifacts were parsed with
    pub schema_version: u32,
    /// Fingerprint read from the `fingerprint` artifact
    pub stored_fingerprint: Option<ContentDigest>,
    /// Fingerprint recomputed from `nodes` and `digests`
    pub computed_fingerprint: ContentDigest,
    /// Whether stored and computed fingerprints agree
    pub fingerprint_valid: bool,
    /// Whether `files` lists exactly the File-kind nodes
    pub files_manifest_valid: bool,
    /// Whether digest records follow the File-kind nodes one for one
    pub digests_aligned: bool,
    /// Directory that was re-captured, if any
    pub checked_subject: Option<PathBuf>,
    /// Fingerprint of the fresh capture
    pub subject_fingerprint: Option<ContentDigest>,
    /// Differences between the stored and the fresh capture
    pub changes: Vec<Change>,
    /// Time taken in milliseconds
    pub verification_time_ms: u64,
    /// Problems that prevented a check from running
    pub errors: Vec<String>,
}

impl VerificationReport {
    /// Whether every check that ran passed
    pub fn is_valid(&self) -> bool {
        self.fingerprint_valid
            && self.files_manifest_valid
            && self.digests_aligned
            && self.subject_matches()
            && self.errors.is_empty()
    }

    fn subject_matches(&self) -> bool {
        match self.subject_fingerprint {
            Some(fresh) => fresh == self.computed_fingerprint && self.changes.is_empty(),
            None => self.checked_subject.is_none(),
        }
    }

    /// One-line description of the result
    pub fn summary(&self) -> String {
        if self.is_valid() {
            let scope = if self.checked_subject.is_some() {
                "matches its subject"
            } else {
                "is intact"
            };
            return format!("Snapshot {} {}", self.computed_fingerprint.short(), scope);
        }

        let mut issues = vec![
            (!self.fingerprint_valid).then_some("fingerprint mismatch"),
            (!self.files_manifest_valid).then_some("files manifest mismatch"),
            (!self.digests_aligned).then_some("digests out of step with nodes"),
            (self.subject_fingerprint.is_some() && !self.subject_matches())
                .then_some("subject changed"),
        ]
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect::<Vec<_>>();
        issues.extend(self.errors.iter().cloned());

        format!(
            "Snapshot {} is invalid: {} ({} changed paths)",
            self.computed_fingerprint.short(),
            issues.join(", "),
            self.changes.len()
        )
    }
}

/// Check that the stored artifacts are mutually consistent
///
/// # Errors
///
/// Only if the snapshot cannot be opened; see [`SnapshotReader::open`].
#[instrument]
pub fn verify_integrity(snapshot_dir: &Path) -> Result<VerificationReport> {
    let start = Instant::now();
    let reader = SnapshotReader::open(snapshot_dir)?;
    let mut report = integrity_report(&reader);
    report.verification_time_ms = start.elapsed().as_millis() as u64;
    info!("{}", report.summary());
    Ok(report)
}

/// Check integrity, then re-capture the subject and compare
///
/// `subject_override` replaces the recorded subject path, e.g. when the tree
/// has been moved since the snapshot was taken.
pub fn verify_subject(
    snapshot_dir: &Path,
    subject_override: Option<&Path>,
) -> Result<VerificationReport> {
    verify_subject_with(&Snapshotter::new(), snapshot_dir, subject_override)
}

/// [`verify_subject`] using a caller-provided [`Snapshotter`]
#[instrument(skip(snapshotter))]
pub fn verify_subject_with<F: FileSystem>(
    snapshotter: &Snapshotter<F>,
    snapshot_dir: &Path,
    subject_override: Option<&Path>,
) -> Result<VerificationReport> {
    let start = Instant::now();
    let reader = SnapshotReader::open(snapshot_dir)?;
    let mut report = integrity_report(&reader);

    let subject = subject_override.unwrap_or_else(|| reader.snapshot().subject());
    report.checked_subject = Some(subject.to_path_buf());
    debug!("Re-capturing {:?}", subject);

    match snapshotter.capture(subject) {
        Ok(fresh) => {
            report.subject_fingerprint = Some(fresh.fingerprint());
            report.changes = compare(reader.snapshot(), &fresh).changes;
        }
        Err(e) => {
            warn!("Could not re-capture {:?}: {}", subject, e);
            report.errors.push(format!("could not re-capture subject: {}", e));
        }
    }

    report.verification_time_ms = start.elapsed().as_millis() as u64;
    info!("{}", report.summary());
    Ok(report)
}

fn integrity_report(reader: &SnapshotReader) -> VerificationReport {
    let snapshot = reader.snapshot();
    let computed = snapshot.fingerprint();
    let mut errors = Vec::new();

    let fingerprint_valid = match reader.stored_fingerprint() {
        Some(stored) => stored == computed,
        None => {
            errors.push("fingerprint artifact is missing".to_string());
            false
        }
    };

    let file_paths: Vec<&Path> = snapshot
        .nodes()
        .iter()
        .filter(|n| n.kind.is_file())
        .map(|n| n.path.as_path())
        .collect();

    // `from_streams` already decoded the manifest successfully.
    let files_manifest_valid = encoding::decode_files(snapshot.files_stream())
        .map(|listed| listed.iter().map(PathBuf::as_path).eq(file_paths.iter().copied()))
        .unwrap_or(false);
    let digests_aligned = snapshot
        .digests()
        .iter()
        .map(|d| d.path.as_path())
        .eq(file_paths.iter().copied());

    VerificationReport {
        snapshot: reader.location().to_path_buf(),
        subject: snapshot.subject().to_path_buf(),
        schema_version: encoding::SCHEMA_VERSION,
        stored_fingerprint: reader.stored_fingerprint(),
        computed_fingerprint: computed,
        fingerprint_valid,
        files_manifest_valid,
        digests_aligned,
        checked_subject: None,
        subject_fingerprint: None,
        changes: Vec::new(),
        verification_time_ms: 0,
        errors,
    }
}
