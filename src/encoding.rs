//! Canonical byte encoding of the snapshot streams
//!
//! ## Schema (version 1)
//!
//! All records end in the reserved delimiter byte [`DELIM`] (NUL). There is no
//! escaping: a path or link target that contains NUL is rejected with
//! [`SnapshotError::Encoding`] instead of being silently corrupted.
//!
//! | stream    | record layout                                      |
//! |-----------|----------------------------------------------------|
//! | `nodes`   | `<tag> 0<mode> <size> <path>\0<link_target>\0`     |
//! | `digests` | `<sha256 hex> <path>\0`                            |
//! | `files`   | `<path>\0`                                         |
//!
//! - `<tag>` is one of `f d l c b p s u` (see [`NodeKind::tag`])
//! - `<mode>` is `mode & 0o7777` in octal, at least three digits, after a literal `0`
//! - `<size>` is decimal, and always `0` for anything that is not a regular file
//! - `<link_target>` is empty for anything that is not a symlink
//! - paths are relative to the subject root, components joined by the platform separator
//!
//! ```rust
//! use treeseal::encoding::NodeEncoder;
//! use treeseal::types::{Node, NodeKind};
//! use std::path::PathBuf;
//!
//! let mut encoder = NodeEncoder::new();
//! encoder.encode(&Node {
//!     kind: NodeKind::Symlink,
//!     mode: 0o777,
//!     size: 0,
//!     path: PathBuf::from("d"),
//!     link_target: Some(PathBuf::from("a.txt")),
//! }).unwrap();
//! assert_eq!(encoder.finish(), b"l 0777 0 d\0a.txt\0");
//! ```

use crate::error::{Result, SnapshotError};
use crate::types::{ContentDigest, DigestRecord, Node, NodeKind};
use crate::utils::{bytes_to_path, path_to_bytes};
use std::path::{Path, PathBuf};

/// Version of the record layout described in the module docs
pub const SCHEMA_VERSION: u32 = 1;

/// Reserved record delimiter
pub const DELIM: u8 = 0;

fn checked_bytes<'p>(
    path: &'p Path,
    owner: &Path,
    field: &'static str,
) -> Result<std::borrow::Cow<'p, [u8]>> {
    let bytes = path_to_bytes(path);
    if bytes.contains(&DELIM) {
        return Err(SnapshotError::Encoding {
            path: owner.to_path_buf(),
            field,
        });
    }
    Ok(bytes)
}

/// Serializes node records, in walker order, into the `nodes` stream
#[derive(Debug, Default)]
pub struct NodeEncoder {
    buf: Vec<u8>,
}

impl NodeEncoder {
    /// Create an empty encoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one node record
    ///
    /// # Errors
    ///
    /// [`SnapshotError::Encoding`] if the path or link target contains [`DELIM`].
    /// Nothing is appended in that case.
    pub fn encode(&mut self, node: &Node) -> Result<()> {
        let path = checked_bytes(&node.path, &node.path, "path")?;
        let target = match (&node.link_target, node.kind) {
            (Some(target), NodeKind::Symlink) => checked_bytes(target, &node.path, "link target")?,
            _ => std::borrow::Cow::Borrowed(&[][..]),
        };
        let size = if node.kind.is_file() { node.size } else { 0 };

        self.buf.extend_from_slice(
            format!("{} 0{:03o} {} ", node.kind.tag() as char, node.mode & 0o7777, size).as_bytes(),
        );
        self.buf.extend_from_slice(&path);
        self.buf.push(DELIM);
        self.buf.extend_from_slice(&target);
        self.buf.push(DELIM);
        Ok(())
    }

    /// Bytes encoded so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the encoder and return the stream
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Encode a full node sequence
pub fn encode_nodes(nodes: &[Node]) -> Result<Vec<u8>> {
    let mut encoder = NodeEncoder::new();
    for node in nodes {
        encoder.encode(node)?;
    }
    Ok(encoder.finish())
}

/// Encode digest records into the `digests` stream
pub fn encode_digests(records: &[DigestRecord]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(records.len() * (ContentDigest::HEX_LEN + 16));
    for record in records {
        let path = checked_bytes(&record.path, &record.path, "path")?;
        buf.extend_from_slice(record.digest.to_hex().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(&path);
        buf.push(DELIM);
    }
    Ok(buf)
}

/// Encode the `files` manifest: every File-kind path, in walker order
pub fn encode_files(nodes: &[Node]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for node in nodes.iter().filter(|n| n.kind.is_file()) {
        buf.extend_from_slice(&checked_bytes(&node.path, &node.path, "path")?);
        buf.push(DELIM);
    }
    Ok(buf)
}

/// Splits a stream into NUL-terminated fields
struct Fields<'a> {
    artifact: &'static str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Fields<'a> {
    fn new(artifact: &'static str, bytes: &'a [u8]) -> Self {
        Self {
            artifact,
            bytes,
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos == self.bytes.len()
    }

    fn next_field(&mut self) -> Result<&'a [u8]> {
        let rest = &self.bytes[self.pos..];
        let end = rest.iter().position(|b| *b == DELIM).ok_or_else(|| {
            SnapshotError::malformed(
                self.artifact,
                format!("unterminated record at byte {}", self.pos),
            )
        })?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }

    fn path(&self, bytes: &[u8]) -> Result<PathBuf> {
        if bytes.is_empty() {
            return Err(SnapshotError::malformed(self.artifact, "empty path"));
        }
        bytes_to_path(bytes).ok_or_else(|| {
            SnapshotError::malformed(self.artifact, "path is not representable on this platform")
        })
    }
}

fn split_token<'a>(
    bytes: &'a [u8],
    artifact: &'static str,
    what: &str,
) -> Result<(&'a [u8], &'a [u8])> {
    let space = bytes
        .iter()
        .position(|b| *b == b' ')
        .ok_or_else(|| SnapshotError::malformed(artifact, format!("missing {}", what)))?;
    Ok((&bytes[..space], &bytes[space + 1..]))
}

fn ascii_token<'a>(bytes: &'a [u8], artifact: &'static str, what: &str) -> Result<&'a str> {
    std::str::from_utf8(bytes)
        .ok()
        .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric()))
        .ok_or_else(|| SnapshotError::malformed(artifact, format!("invalid {}", what)))
}

/// Parse a `nodes` stream back into node records
pub fn decode_nodes(bytes: &[u8]) -> Result<Vec<Node>> {
    const ARTIFACT: &str = "nodes";
    let mut fields = Fields::new(ARTIFACT, bytes);
    let mut nodes = Vec::new();

    while !fields.at_end() {
        let header = fields.next_field()?;
        let target = fields.next_field()?;

        let (tag, rest) = split_token(header, ARTIFACT, "kind tag")?;
        let kind = match tag {
            [tag] => NodeKind::from_tag(*tag),
            _ => None,
        }
        .ok_or_else(|| SnapshotError::malformed(ARTIFACT, "unknown kind tag"))?;

        let (mode, rest) = split_token(rest, ARTIFACT, "mode")?;
        let mode = ascii_token(mode, ARTIFACT, "mode")?;
        let mode = mode
            .strip_prefix('0')
            .filter(|digits| digits.len() >= 3)
            .and_then(|digits| u32::from_str_radix(digits, 8).ok())
            .filter(|mode| mode & !0o7777 == 0)
            .ok_or_else(|| SnapshotError::malformed(ARTIFACT, format!("invalid mode '{}'", mode)))?;

        let (size, path) = split_token(rest, ARTIFACT, "size")?;
        let size: u64 = ascii_token(size, ARTIFACT, "size")?
            .parse()
            .map_err(|_| SnapshotError::malformed(ARTIFACT, "invalid size"))?;
        let path = fields.path(path)?;

        if !kind.is_file() && size != 0 {
            return Err(SnapshotError::malformed(
                ARTIFACT,
                format!("non-file {:?} has non-zero size", path),
            ));
        }
        let link_target = match kind {
            NodeKind::Symlink => Some(fields.path(target)?),
            _ if !target.is_empty() => {
                return Err(SnapshotError::malformed(
                    ARTIFACT,
                    format!("non-symlink {:?} has a link target", path),
                ))
            }
            _ => None,
        };

        nodes.push(Node {
            kind,
            mode,
            size,
            path,
            link_target,
        });
    }

    Ok(nodes)
}

/// Parse a `digests` stream back into digest records
pub fn decode_digests(bytes: &[u8]) -> Result<Vec<DigestRecord>> {
    const ARTIFACT: &str = "digests";
    let mut fields = Fields::new(ARTIFACT, bytes);
    let mut records = Vec::new();

    while !fields.at_end() {
        let record = fields.next_field()?;
        let (digest, path) = split_token(record, ARTIFACT, "digest")?;
        let digest: ContentDigest = std::str::from_utf8(digest)
            .ok()
            .filter(|s| s.len() == ContentDigest::HEX_LEN)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| SnapshotError::malformed(ARTIFACT, "invalid sha256 digest"))?;
        records.push(DigestRecord {
            path: fields.path(path)?,
            digest,
        });
    }

    Ok(records)
}

/// Parse a `files` manifest back into paths
pub fn decode_files(bytes: &[u8]) -> Result<Vec<PathBuf>> {
    let mut fields = Fields::new("files", bytes);
    let mut paths = Vec::new();
    while !fields.at_end() {
        let field = fields.next_field()?;
        paths.push(fields.path(field)?);
    }
    Ok(paths)
}
