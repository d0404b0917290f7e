//! Path-level comparison of two complete snapshots
//!
//! Entries are matched by relative path. Paths are compared component-wise,
//! which for byte-sorted names is exactly the canonical traversal order, so
//! the resulting change list reads top-down like a `nodes` stream.

use crate::snapshot::{EntryValue, Snapshot, SnapshotEntry};
use crate::types::ContentDigest;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// How a path differs between two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Only present in the newer snapshot
    Added,
    /// Only present in the older snapshot
    Removed,
    /// Present in both with a different node type
    KindChanged,
    /// Same type, different mode, size or link target
    MetadataChanged,
    /// Regular file whose content digest differs
    ContentChanged,
}

/// One differing path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    /// Path relative to the subject root
    pub path: PathBuf,
    /// Most significant difference
    pub kind: ChangeKind,
    /// Every individual difference, e.g. `mode 0644 -> 0600`
    pub details: Vec<String>,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.path.display();
        match self.kind {
            ChangeKind::Added => write!(f, "+ {}", path),
            ChangeKind::Removed => write!(f, "- {}", path),
            _ => write!(f, "~ {} ({})", path, self.details.join(", ")),
        }
    }
}

/// Counters over a [`SnapshotDiff`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeStats {
    /// Paths only in the newer snapshot
    pub added: usize,
    /// Paths only in the older snapshot
    pub removed: usize,
    /// Paths whose node type changed
    pub kind_changed: usize,
    /// Paths with metadata-only changes
    pub metadata_changed: usize,
    /// Files whose content changed
    pub content_changed: usize,
    /// Bytes in added regular files
    pub bytes_added: u64,
    /// Bytes in removed regular files
    pub bytes_removed: u64,
}

impl ChangeStats {
    /// Whether anything differs
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }

    /// Number of differing paths
    pub fn total(&self) -> usize {
        self.added + self.removed + self.kind_changed + self.metadata_changed + self.content_changed
    }

    fn record(
        &mut self,
        change: &Change,
        old: Option<&SnapshotEntry>,
        new: Option<&SnapshotEntry>,
    ) {
        match change.kind {
            ChangeKind::Added => {
                self.added += 1;
                self.bytes_added += new.map_or(0, file_size);
            }
            ChangeKind::Removed => {
                self.removed += 1;
                self.bytes_removed += old.map_or(0, file_size);
            }
            ChangeKind::KindChanged => self.kind_changed += 1,
            ChangeKind::MetadataChanged => self.metadata_changed += 1,
            ChangeKind::ContentChanged => self.content_changed += 1,
        }
    }
}

fn file_size(entry: &SnapshotEntry) -> u64 {
    match entry.value {
        EntryValue::File { size, .. } => size,
        _ => 0,
    }
}

/// Result of [`compare`]
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotDiff {
    /// Fingerprint of the older snapshot
    pub old_fingerprint: ContentDigest,
    /// Fingerprint of the newer snapshot
    pub new_fingerprint: ContentDigest,
    /// Whether the two fingerprints agree
    pub fingerprints_equal: bool,
    /// Differing paths in canonical order
    pub changes: Vec<Change>,
    /// Counters over `changes`
    pub stats: ChangeStats,
}

impl SnapshotDiff {
    /// Whether the snapshots differ at all
    pub fn has_differences(&self) -> bool {
        !self.fingerprints_equal || !self.changes.is_empty()
    }
}

impl fmt::Display for SnapshotDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for change in &self.changes {
            writeln!(f, "{}", change)?;
        }
        Ok(())
    }
}

/// Compare `old` against `new`
///
/// ```rust
/// use treeseal::{compare, SnapshotterBuilder};
/// use treeseal::fs::MemoryFileSystem;
/// use std::path::Path;
///
/// let before = MemoryFileSystem::new().with_file("/s/a.txt", b"hi", 0o644);
/// let after = before.clone().with_file("/s/new.txt", b"", 0o644);
///
/// let old = SnapshotterBuilder::new().build_with(before).capture(Path::new("/s")).unwrap();
/// let new = SnapshotterBuilder::new().build_with(after).capture(Path::new("/s")).unwrap();
///
/// let diff = compare(&old, &new);
/// assert_eq!(diff.to_string(), "+ new.txt\n");
/// ```
pub fn compare(old: &Snapshot, new: &Snapshot) -> SnapshotDiff {
    let mut paired: BTreeMap<PathBuf, (Option<SnapshotEntry>, Option<SnapshotEntry>)> =
        BTreeMap::new();
    for entry in old.entries() {
        let path = entry.path.clone();
        paired.entry(path).or_default().0 = Some(entry);
    }
    for entry in new.entries() {
        let path = entry.path.clone();
        paired.entry(path).or_default().1 = Some(entry);
    }

    let mut stats = ChangeStats::default();
    let mut changes = Vec::new();
    for (path, (before, after)) in paired {
        let change = match (&before, &after) {
            (Some(_), None) => Some(Change {
                path,
                kind: ChangeKind::Removed,
                details: Vec::new(),
            }),
            (None, Some(_)) => Some(Change {
                path,
                kind: ChangeKind::Added,
                details: Vec::new(),
            }),
            (Some(a), Some(b)) => diff_entry(&path, a, b),
            (None, None) => None,
        };
        if let Some(change) = change {
            stats.record(&change, before.as_ref(), after.as_ref());
            changes.push(change);
        }
    }

    SnapshotDiff {
        old_fingerprint: old.fingerprint(),
        new_fingerprint: new.fingerprint(),
        fingerprints_equal: old.fingerprint() == new.fingerprint(),
        changes,
        stats,
    }
}

fn diff_entry(path: &Path, old: &SnapshotEntry, new: &SnapshotEntry) -> Option<Change> {
    if old.kind != new.kind {
        return Some(Change {
            path: path.to_path_buf(),
            kind: ChangeKind::KindChanged,
            details: vec![format!("{} -> {}", old.kind, new.kind)],
        });
    }

    let mut details = Vec::new();
    let mut content_changed = false;
    if old.mode != new.mode {
        details.push(format!("mode {:04o} -> {:04o}", old.mode, new.mode));
    }
    match (&old.value, &new.value) {
        (
            EntryValue::File { digest: d1, size: s1, .. },
            EntryValue::File { digest: d2, size: s2, .. },
        ) => {
            if s1 != s2 {
                details.push(format!("size {} -> {}", s1, s2));
            }
            if d1 != d2 {
                content_changed = true;
                details.push("content".to_string());
            }
        }
        (EntryValue::Symlink { target: t1 }, EntryValue::Symlink { target: t2 }) if t1 != t2 => {
            details.push(format!("target {} -> {}", t1.display(), t2.display()));
        }
        _ => {}
    }

    if details.is_empty() {
        return None;
    }
    let kind = if content_changed {
        ChangeKind::ContentChanged
    } else {
        ChangeKind::MetadataChanged
    };
    Some(Change {
        path: path.to_path_buf(),
        kind,
        details,
    })
}
