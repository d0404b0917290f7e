//! # Treeseal - Tamper-evident directory snapshots
//!
//! Captures a directory tree (file contents, directory structure, symlink
//! targets and permission bits) into a small set of canonical, deterministic
//! artifacts. The artifacts can be compared byte-for-byte between runs or
//! machines to detect any change.
//!
//! ## Overview
//!
//! A snapshot run walks the subject in canonical order (entry names sorted by
//! raw bytes, pre-order), encodes one record per node, hashes every regular
//! file with SHA-256, and combines the encoded streams into a single
//! fingerprint. Identical trees always produce identical bytes, whatever the
//! directory enumeration order, the host, or the number of hashing threads.
//!
//! ```text
//! FileSystem -> DirectoryWalker -> { NodeEncoder, FileDigester } -> DigestAggregator -> SnapshotWriter
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let summary = treeseal::snapshot("./my_project", "./my_project.snap")?;
//! println!("{} files, fingerprint {}", summary.file_count, summary.fingerprint);
//! # Ok(())
//! # }
//! ```
//!
//! ### Custom Configuration
//!
//! ```rust,no_run
//! use treeseal::SnapshotterBuilder;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let snapshotter = SnapshotterBuilder::new()
//!     .parallel_workers(8)
//!     .read_buffer_size(256 * 1024)
//!     .build();
//!
//! // In-memory capture, nothing is written
//! let snapshot = snapshotter.capture(Path::new("./my_project"))?;
//! println!("{}", snapshot.fingerprint());
//! # Ok(())
//! # }
//! ```
//!
//! ### Checking a Snapshot Later
//!
//! ```rust,no_run
//! use treeseal::{compare, verify_subject, SnapshotReader};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let report = verify_subject(Path::new("./my_project.snap"), None)?;
//! println!("{}", report.summary());
//!
//! let old = SnapshotReader::open(Path::new("./monday.snap"))?;
//! let new = SnapshotReader::open(Path::new("./tuesday.snap"))?;
//! print!("{}", compare(old.snapshot(), new.snapshot()));
//! # Ok(())
//! # }
//! ```
//!
//! ## Output Layout
//!
//! The output location must not exist beforehand. It is created atomically
//! and holds five read-only artifacts: `subject`, `nodes`, `files`, `digests`
//! and `fingerprint`. See [`encoding`] for the record layout.
//!
//! ## Guarantees
//!
//! - Symbolic links are recorded with their target and never followed
//! - Any unreadable entry aborts the run; nothing is skipped silently
//! - A failed run leaves nothing at the output location
//! - Existing output is never overwritten
//!
//! ## Error Handling
//!
//! All operations return `Result<T, SnapshotError>`. Every error names the
//! path involved where there is one.
//!
//! ## Module Organization
//!
//! - [`walker`]: canonical traversal
//! - [`encoding`]: record layout and stream codecs
//! - [`digester`]: parallel content hashing
//! - [`aggregator`]: top-level fingerprint
//! - [`writer`]: atomic persistence
//! - [`snapshotter`]: the pipeline and its builder
//! - [`reader`], [`verification`], [`compare`]: working with stored snapshots
//! - [`fs`]: filesystem abstraction
//! - [`types`], [`error`]: shared types

// Pipeline
pub mod aggregator;
pub mod digester;
pub mod encoding;
pub mod snapshot;
pub mod snapshotter;
pub mod walker;
pub mod writer;

// Stored snapshots
pub mod compare;
pub mod reader;
pub mod verification;

// Shared
pub mod error;
pub mod fs;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use compare::{compare, Change, ChangeKind, ChangeStats, SnapshotDiff};
pub use error::{Result, SnapshotError};
pub use fs::{FileSystem, LocalFileSystem, MemoryFileSystem};
pub use reader::SnapshotReader;
pub use snapshot::{EntryValue, Snapshot, SnapshotEntry};
pub use snapshotter::{snapshot, Snapshotter, SnapshotterBuilder};
pub use types::*;
pub use verification::{verify_integrity, verify_subject, VerificationReport};
