//! Core data types used throughout the treeseal library
//!
//! ## Overview
//!
//! - **Node records**: [`Node`], [`NodeKind`], [`OtherKind`] - one per entry under the subject
//! - **Digest records**: [`DigestRecord`], [`ContentDigest`] - one per regular file
//! - **Filesystem metadata**: [`NodeMetadata`] - what a [`crate::fs::FileSystem`] reports
//! - **Run results**: [`SnapshotSummary`], [`SnapshotConfig`]
//!
//! ## Examples
//!
//! ```rust
//! use treeseal::types::{ContentDigest, NodeKind};
//!
//! let digest = ContentDigest::of(b"hi");
//! assert_eq!(
//!     digest.to_string(),
//!     "8f434346648f6b96df89dda901c5176b10a6d83961dd3c1ac88b59b2dc327aa4"
//! );
//! assert_eq!(NodeKind::Directory.tag(), b'd');
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Kind of a special (non file/directory/symlink) filesystem node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OtherKind {
    /// Character device
    CharDevice,
    /// Block device
    BlockDevice,
    /// Named pipe
    Fifo,
    /// Unix domain socket
    Socket,
    /// Anything the platform reports that we cannot classify
    Unknown,
}

/// Type of a filesystem node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link (recorded, never followed)
    Symlink,
    /// Any other special file
    Other(OtherKind),
}

impl NodeKind {
    /// Single-byte tag used in the `nodes` stream
    pub fn tag(self) -> u8 {
        match self {
            NodeKind::File => b'f',
            NodeKind::Directory => b'd',
            NodeKind::Symlink => b'l',
            NodeKind::Other(OtherKind::CharDevice) => b'c',
            NodeKind::Other(OtherKind::BlockDevice) => b'b',
            NodeKind::Other(OtherKind::Fifo) => b'p',
            NodeKind::Other(OtherKind::Socket) => b's',
            NodeKind::Other(OtherKind::Unknown) => b'u',
        }
    }

    /// Inverse of [`NodeKind::tag`]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            b'f' => NodeKind::File,
            b'd' => NodeKind::Directory,
            b'l' => NodeKind::Symlink,
            b'c' => NodeKind::Other(OtherKind::CharDevice),
            b'b' => NodeKind::Other(OtherKind::BlockDevice),
            b'p' => NodeKind::Other(OtherKind::Fifo),
            b's' => NodeKind::Other(OtherKind::Socket),
            b'u' => NodeKind::Other(OtherKind::Unknown),
            _ => return None,
        })
    }

    /// Whether this is a regular file
    pub fn is_file(self) -> bool {
        matches!(self, NodeKind::File)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::File => "file",
            NodeKind::Directory => "directory",
            NodeKind::Symlink => "symlink",
            NodeKind::Other(OtherKind::CharDevice) => "char device",
            NodeKind::Other(OtherKind::BlockDevice) => "block device",
            NodeKind::Other(OtherKind::Fifo) => "fifo",
            NodeKind::Other(OtherKind::Socket) => "socket",
            NodeKind::Other(OtherKind::Unknown) => "unknown",
        };
        f.write_str(name)
    }
}

/// Metadata a [`crate::fs::FileSystem`] reports for a single entry
///
/// Obtained without following symbolic links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeMetadata {
    /// Node type
    pub kind: NodeKind,
    /// Raw mode bits as reported by the platform
    pub mode: u32,
    /// Length in bytes as reported by the platform
    pub size: u64,
}

/// Canonical metadata for one filesystem entry under the subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Node type
    pub kind: NodeKind,
    /// Permission bits (`mode & 0o7777`)
    pub mode: u32,
    /// Byte length; always 0 unless `kind` is `File`
    pub size: u64,
    /// Path relative to the subject root
    pub path: PathBuf,
    /// Link target, present only for symlinks
    pub link_target: Option<PathBuf>,
}

impl Node {
    /// Build a node from filesystem metadata, applying the size and mode conventions
    pub fn from_metadata(
        path: PathBuf,
        metadata: NodeMetadata,
        link_target: Option<PathBuf>,
    ) -> Self {
        let size = if metadata.kind.is_file() { metadata.size } else { 0 };
        let link_target = match metadata.kind {
            NodeKind::Symlink => link_target,
            _ => None,
        };
        Self {
            kind: metadata.kind,
            mode: metadata.mode & 0o7777,
            size,
            path,
            link_target,
        }
    }

    /// Whether the owner execute bit is set
    pub fn is_executable(&self) -> bool {
        self.mode & 0o100 != 0
    }
}

/// SHA-256 digest of a byte stream
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    /// Length of the hexadecimal rendering
    pub const HEX_LEN: usize = 64;

    /// Hash an in-memory buffer
    pub fn of(data: &[u8]) -> Self {
        Self::from_hasher(Sha256::new_with_prefix(data))
    }

    /// Finalize an incremental hasher
    pub fn from_hasher(hasher: Sha256) -> Self {
        Self(hasher.finalize().into())
    }

    /// Lowercase hexadecimal rendering
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First eight hex characters, for display
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

impl FromStr for ContentDigest {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // Uppercase is rejected so every digest has exactly one rendering.
        if let Some((index, c)) = s.char_indices().find(|(_, c)| c.is_ascii_uppercase()) {
            return Err(hex::FromHexError::InvalidHexCharacter { c, index });
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Content hash of one regular file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestRecord {
    /// Path relative to the subject root
    pub path: PathBuf,
    /// SHA-256 of the file content
    pub digest: ContentDigest,
}

/// Effective settings of a [`crate::Snapshotter`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Number of worker threads used to digest file contents
    pub parallel_workers: usize,
    /// Size of the read buffer used while hashing a file
    pub read_buffer_size: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            parallel_workers: num_cpus::get().max(1),
            read_buffer_size: 64 * 1024,
        }
    }
}

/// Outcome of a successful snapshot run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSummary {
    /// Where the snapshot was written
    pub output: PathBuf,
    /// Canonical subject path that was captured
    pub subject: PathBuf,
    /// Number of node records
    pub node_count: usize,
    /// Number of regular files (and digest records)
    pub file_count: usize,
    /// Sum of all regular file sizes
    pub total_file_bytes: u64,
    /// Top-level fingerprint
    pub fingerprint: ContentDigest,
    /// Wall-clock time of the run
    pub duration: Duration,
}
