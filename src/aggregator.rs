//! Top-level snapshot fingerprint
//!
//! The fingerprint is `SHA-256(nodes ‖ digests)`: one hash over the encoded
//! node stream followed by the encoded digest stream. Because both streams are
//! canonical and deterministically ordered, two snapshots have the same
//! fingerprint exactly when every node's metadata and every file's content
//! agree.
//!
//! The fingerprint is a derived convenience. Both input streams are persisted
//! next to it, and only they allow per-file comparison.

use crate::types::ContentDigest;
use sha2::{Digest, Sha256};

/// Incrementally builds the fingerprint from the two encoded streams
///
/// The node stream is fed first. [`DigestAggregator::digests`] then moves the
/// aggregator into its second phase, so the streams cannot be interleaved.
///
/// ```rust
/// use treeseal::aggregator::DigestAggregator;
///
/// let mut nodes = DigestAggregator::new();
/// nodes.absorb_nodes(b"f 0644 2 a.txt\0\0");
/// let mut digests = nodes.digests();
/// digests.absorb_digests(b"");
/// let fingerprint = digests.finish();
/// assert_eq!(fingerprint, treeseal::aggregator::fingerprint(b"f 0644 2 a.txt\0\0", b""));
/// ```
#[derive(Debug, Clone, Default)]
pub struct DigestAggregator {
    hasher: Sha256,
}

impl DigestAggregator {
    /// Start an empty fingerprint
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of the `nodes` stream
    pub fn absorb_nodes(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Finish the node stream and start on the `digests` stream
    pub fn digests(self) -> DigestsPhase {
        DigestsPhase {
            hasher: self.hasher,
        }
    }
}

/// Second phase of a [`DigestAggregator`]: only digest chunks are accepted
#[derive(Debug, Clone)]
pub struct DigestsPhase {
    hasher: Sha256,
}

impl DigestsPhase {
    /// Feed the next chunk of the `digests` stream
    pub fn absorb_digests(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Produce the fingerprint
    pub fn finish(self) -> ContentDigest {
        ContentDigest::from_hasher(self.hasher)
    }
}

/// Fingerprint of complete `nodes` and `digests` streams
pub fn fingerprint(nodes: &[u8], digests: &[u8]) -> ContentDigest {
    let mut aggregator = DigestAggregator::new();
    aggregator.absorb_nodes(nodes);
    let mut aggregator = aggregator.digests();
    aggregator.absorb_digests(digests);
    aggregator.finish()
}
