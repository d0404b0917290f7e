//! Error types for the treeseal library
//!
//! Every failure during a snapshot run is fatal to that run. There is no
//! local recovery, retry, or partial-success mode, so the variants here
//! describe *why* a run was abandoned and *which path* caused it.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the treeseal library
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Main error type for all treeseal operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Subject path does not exist or is not a directory
    #[error("Not a directory: {path:?}")]
    NotADirectory {
        /// The offending subject path
        path: PathBuf,
    },

    /// Output location already exists
    #[error("Output already exists: {path:?}")]
    AlreadyExists {
        /// The conflicting output path
        path: PathBuf,
    },

    /// Output location lies inside the subject tree
    #[error("Output {output:?} is inside the subject {subject:?}")]
    OutputInsideSubject {
        /// The requested output path
        output: PathBuf,
        /// Canonical subject path
        subject: PathBuf,
    },

    /// A path or link target contains the reserved delimiter byte
    #[error("Cannot encode {field} of {path:?}: contains the reserved NUL delimiter")]
    Encoding {
        /// Relative path of the node that failed to encode
        path: PathBuf,
        /// Which field carried the delimiter (`path` or `link target`)
        field: &'static str,
    },

    /// Read failure during traversal, digesting, or writing
    #[error("IO error at {path:?}: {source}")]
    Io {
        /// Path that was being accessed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A persisted snapshot artifact could not be parsed
    #[error("Malformed snapshot artifact '{artifact}': {reason}")]
    MalformedSnapshot {
        /// Artifact name (`nodes`, `digests`, ...)
        artifact: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// No snapshot directory at the given location
    #[error("Snapshot not found: {0:?}")]
    SnapshotNotFound(PathBuf),

    /// Worker pool could not be created
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// JSON rendering of reports
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SnapshotError {
    /// Create an I/O error tagged with the path being accessed
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnapshotError::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a malformed-artifact error
    pub fn malformed(artifact: &'static str, reason: impl Into<String>) -> Self {
        SnapshotError::MalformedSnapshot {
            artifact,
            reason: reason.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        SnapshotError::Internal(msg.into())
    }

    /// Check if this error was caused by invalid invocation arguments
    ///
    /// These are reported before any traversal begins.
    pub fn is_fatal_input(&self) -> bool {
        matches!(
            self,
            SnapshotError::NotADirectory { .. }
                | SnapshotError::AlreadyExists { .. }
                | SnapshotError::OutputInsideSubject { .. }
        )
    }

    /// The path this error is about, if any
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            SnapshotError::NotADirectory { path }
            | SnapshotError::AlreadyExists { path }
            | SnapshotError::OutputInsideSubject { output: path, .. }
            | SnapshotError::Encoding { path, .. }
            | SnapshotError::Io { path, .. } => Some(path),
            SnapshotError::SnapshotNotFound(path) => Some(path),
            _ => None,
        }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            SnapshotError::NotADirectory { path } => {
                format!(
                    "{:?} is not a directory. The subject of a snapshot must be an existing directory.",
                    path
                )
            }
            SnapshotError::AlreadyExists { path } => {
                format!(
                    "{:?} already exists. Snapshots are never overwritten; choose a fresh output location.",
                    path
                )
            }
            SnapshotError::OutputInsideSubject { output, subject } => {
                format!(
                    "{:?} is inside the subject {:?}. Store snapshots outside the tree they describe.",
                    output, subject
                )
            }
            SnapshotError::Encoding { path, field } => {
                format!(
                    "The {} of {:?} contains a NUL byte, which the snapshot format does not support.",
                    field, path
                )
            }
            _ => self.to_string(),
        }
    }
}
