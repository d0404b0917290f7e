//! Per-file content digesting
//!
//! [`FileDigester`] hashes every File-kind node and returns one
//! [`DigestRecord`] per file, in the same relative order as the nodes. Hashing
//! runs on a bounded rayon pool. The indexed parallel collect keeps the output
//! in traversal order, so the resulting `digests` stream is byte-identical for
//! any worker count.
//!
//! Any read failure aborts the whole run. A file whose length no longer matches
//! the size recorded by the walker also aborts it, because the node and digest
//! streams would otherwise describe two different versions of that file.

use crate::error::{Result, SnapshotError};
use crate::fs::{resolve, FileSystem};
use crate::types::{DigestRecord, Node};
use crate::utils;
use rayon::prelude::*;
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, trace};

/// Computes content digests through a [`FileSystem`]
#[derive(Debug)]
pub struct FileDigester<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
    root: &'a Path,
    parallel_workers: usize,
    read_buffer_size: usize,
}

impl<'a, F: FileSystem + ?Sized> FileDigester<'a, F> {
    /// Create a single-threaded digester with a 64 KiB read buffer
    pub fn new(fs: &'a F, root: &'a Path) -> Self {
        Self {
            fs,
            root,
            parallel_workers: 1,
            read_buffer_size: 64 * 1024,
        }
    }

    /// Number of worker threads (minimum 1)
    pub fn with_parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers.max(1);
        self
    }

    /// Read buffer size in bytes (minimum 1)
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Digest every File-kind node in `nodes`
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::Io`] carrying the full path of the first file that
    ///   could not be read or that changed size while being read
    /// - [`SnapshotError::ThreadPool`] if the worker pool cannot be started
    pub fn digest(&self, nodes: &[Node]) -> Result<Vec<DigestRecord>> {
        let files: Vec<&Node> = nodes.iter().filter(|n| n.kind.is_file()).collect();
        debug!(
            "Digesting {} files with {} worker(s)",
            files.len(),
            self.parallel_workers
        );

        if self.parallel_workers == 1 || files.len() < 2 {
            return files.into_iter().map(|node| self.digest_one(node)).collect();
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallel_workers)
            .thread_name(|i| format!("treeseal-digest-{}", i))
            .build()
            .map_err(|e| SnapshotError::ThreadPool(e.to_string()))?;

        pool.install(|| {
            files
                .par_iter()
                .map(|node| self.digest_one(node))
                .collect::<Result<Vec<_>>>()
        })
    }

    fn digest_one(&self, node: &Node) -> Result<DigestRecord> {
        let full_path = resolve(self.root, &node.path);
        let reader = self
            .fs
            .open(self.root, &node.path)
            .map_err(|e| SnapshotError::io(&full_path, e))?;

        // One byte past the recorded size is enough to detect growth
        let mut limited = reader.take(node.size.saturating_add(1));
        let (digest, len) = utils::hash_reader(&mut limited, self.read_buffer_size)
            .map_err(|e| SnapshotError::io(&full_path, e))?;

        if len != node.size {
            let reason = if len > node.size {
                format!("expected {} bytes, file grew", node.size)
            } else {
                format!("expected {} bytes, read {}", node.size, len)
            };
            return Err(SnapshotError::io(
                &full_path,
                io::Error::new(
                    io::ErrorKind::Other,
                    format!("file changed during snapshot: {}", reason),
                ),
            ));
        }

        trace!("{} {:?}", digest.short(), node.path);
        Ok(DigestRecord {
            path: node.path.clone(),
            digest,
        })
    }
}
