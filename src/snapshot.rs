//! The snapshot aggregate
//!
//! A [`Snapshot`] holds the decoded records together with the canonical
//! streams they encode to and the fingerprint over those streams. It is built
//! once, either from a fresh traversal ([`Snapshot::assemble`]) or from
//! persisted artifacts ([`Snapshot::from_streams`]), and never mutated.

use crate::aggregator;
use crate::encoding;
use crate::error::{Result, SnapshotError};
use crate::types::{ContentDigest, DigestRecord, Node, NodeKind};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Immutable snapshot of a subject tree
#[derive(Debug, Clone)]
pub struct Snapshot {
    subject: PathBuf,
    nodes: Vec<Node>,
    digests: Vec<DigestRecord>,
    nodes_stream: Vec<u8>,
    digests_stream: Vec<u8>,
    files_stream: Vec<u8>,
    fingerprint: ContentDigest,
}

impl Snapshot {
    /// Encode walker and digester output into a snapshot
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::Encoding`] if any path or link target contains the delimiter
    /// - [`SnapshotError::Internal`] if the digest records do not line up with the
    ///   File-kind nodes
    pub fn assemble(
        subject: PathBuf,
        nodes: Vec<Node>,
        digests: Vec<DigestRecord>,
    ) -> Result<Self> {
        let file_paths = nodes.iter().filter(|n| n.kind.is_file()).map(|n| &n.path);
        if !file_paths.eq(digests.iter().map(|d| &d.path)) {
            return Err(SnapshotError::internal(
                "digest records do not match the file nodes",
            ));
        }

        let nodes_stream = encoding::encode_nodes(&nodes)?;
        let digests_stream = encoding::encode_digests(&digests)?;
        let files_stream = encoding::encode_files(&nodes)?;
        let fingerprint = aggregator::fingerprint(&nodes_stream, &digests_stream);

        Ok(Self {
            subject,
            nodes,
            digests,
            nodes_stream,
            digests_stream,
            files_stream,
            fingerprint,
        })
    }

    /// Rebuild a snapshot from persisted streams
    ///
    /// The streams are kept verbatim and the fingerprint is recomputed from
    /// them. Consistency between the streams is not checked here; see
    /// [`crate::verification`].
    pub fn from_streams(
        subject: PathBuf,
        nodes_stream: Vec<u8>,
        digests_stream: Vec<u8>,
        files_stream: Vec<u8>,
    ) -> Result<Self> {
        let nodes = encoding::decode_nodes(&nodes_stream)?;
        let digests = encoding::decode_digests(&digests_stream)?;
        encoding::decode_files(&files_stream)?;
        let fingerprint = aggregator::fingerprint(&nodes_stream, &digests_stream);

        Ok(Self {
            subject,
            nodes,
            digests,
            nodes_stream,
            digests_stream,
            files_stream,
            fingerprint,
        })
    }

    /// Canonical absolute path of the captured subject
    pub fn subject(&self) -> &Path {
        &self.subject
    }

    /// Node records in canonical traversal order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Digest records in the order of their File nodes
    pub fn digests(&self) -> &[DigestRecord] {
        &self.digests
    }

    /// Encoded `nodes` stream
    pub fn nodes_stream(&self) -> &[u8] {
        &self.nodes_stream
    }

    /// Encoded `digests` stream
    pub fn digests_stream(&self) -> &[u8] {
        &self.digests_stream
    }

    /// Encoded `files` manifest
    pub fn files_stream(&self) -> &[u8] {
        &self.files_stream
    }

    /// `SHA-256(nodes ‖ digests)`
    pub fn fingerprint(&self) -> ContentDigest {
        self.fingerprint
    }

    /// Number of regular files
    pub fn file_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.kind.is_file()).count()
    }

    /// Sum of regular file sizes
    pub fn total_file_bytes(&self) -> u64 {
        self.nodes.iter().filter(|n| n.kind.is_file()).map(|n| n.size).sum()
    }

    /// Join nodes with their digests
    ///
    /// Digests are matched by path, so a tampered `digests` stream shows up as
    /// `File { digest: None, .. }` rather than being silently misattributed.
    pub fn entries(&self) -> Vec<SnapshotEntry> {
        let by_path: HashMap<&Path, ContentDigest> = self
            .digests
            .iter()
            .map(|d| (d.path.as_path(), d.digest))
            .collect();

        self.nodes
            .iter()
            .map(|node| {
                let value = match node.kind {
                    NodeKind::File => EntryValue::File {
                        digest: by_path.get(node.path.as_path()).copied(),
                        size: node.size,
                        executable: node.is_executable(),
                    },
                    NodeKind::Directory => EntryValue::Directory,
                    NodeKind::Symlink => EntryValue::Symlink {
                        target: node.link_target.clone().unwrap_or_default(),
                    },
                    NodeKind::Other(_) => EntryValue::Other,
                };
                SnapshotEntry {
                    path: node.path.clone(),
                    kind: node.kind,
                    mode: node.mode,
                    value,
                }
            })
            .collect()
    }
}

/// One node joined with its content digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotEntry {
    /// Path relative to the subject root
    pub path: PathBuf,
    /// Node type
    pub kind: NodeKind,
    /// Permission bits
    pub mode: u32,
    /// Kind-specific payload
    pub value: EntryValue,
}

/// Kind-specific part of a [`SnapshotEntry`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryValue {
    /// Regular file
    File {
        /// Content digest, `None` if the digest stream lacks this path
        digest: Option<ContentDigest>,
        /// Size in bytes
        size: u64,
        /// Owner execute bit
        executable: bool,
    },
    /// Directory
    Directory,
    /// Symbolic link
    Symlink {
        /// Link target, unresolved
        target: PathBuf,
    },
    /// Special file
    Other,
}
