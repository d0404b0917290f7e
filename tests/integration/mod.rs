//! Integration tests for treeseal
//!
//! End-to-end scenarios on the real filesystem: determinism, sensitivity to
//! content and metadata, completeness of traversal, symlink handling and
//! failure atomicity.

use ::treeseal::*;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

/// A subject tree plus a scratch area for snapshot outputs
pub struct SnapshotTestHarness {
    pub subject: TempDir,
    pub outputs: TempDir,
    taken: usize,
}

impl SnapshotTestHarness {
    /// Create an empty subject
    pub fn new() -> Self {
        Self {
            subject: TempDir::new().unwrap(),
            outputs: TempDir::new().unwrap(),
            taken: 0,
        }
    }

    pub fn root(&self) -> &Path {
        self.subject.path()
    }

    /// Write `content` at `rel`, creating parent directories
    pub fn write(&self, rel: &str, content: &[u8]) {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    /// Populate a small project-like tree
    pub fn generate_project(&self, dirs: usize, files_per_dir: usize) {
        for d in 0..dirs {
            for f in 0..files_per_dir {
                let content = format!("dir {} file {}\n", d, f).repeat(f + 1);
                self.write(&format!("pkg{}/src/mod{}.rs", d, f), content.as_bytes());
            }
        }
        self.write("README.md", b"# project\n");
        fs::create_dir_all(self.root().join("empty/nested")).unwrap();
    }

    /// Take a snapshot into a fresh output location
    pub fn take(&mut self) -> PathBuf {
        self.taken += 1;
        let output = self.outputs.path().join(format!("snap-{}", self.taken));
        let summary = snapshot(self.root(), &output).unwrap();
        info!("took {} with {} nodes", summary.fingerprint.short(), summary.node_count);
        output
    }
}

impl Default for SnapshotTestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn artifact(output: &Path, name: &str) -> Vec<u8> {
    fs::read(output.join(name)).unwrap()
}

/// Rewrite a stored artifact in place, lifting its read-only mode first
#[cfg(unix)]
pub fn tamper_artifact(
    output: &Path,
    name: &str,
    edit: impl FnOnce(&mut Vec<u8>),
) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let path = output.join(name);
    let mut bytes = fs::read(&path)?;
    edit(&mut bytes);
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644))?;
    fs::write(&path, bytes)?;
    Ok(())
}

/// Tree from the reference scenario, served from memory
pub fn reference_tree() -> MemoryFileSystem {
    MemoryFileSystem::new()
        .with_dir("/s", 0o755)
        .with_file("/s/a.txt", b"hi", 0o644)
        .with_dir("/s/b", 0o755)
        .with_file("/s/b/c.txt", b"bye", 0o644)
        .with_symlink("/s/d", "a.txt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_repeated_snapshots_are_byte_identical() {
        let mut harness = SnapshotTestHarness::new();
        harness.generate_project(4, 6);

        let first = harness.take();
        let second = harness.take();
        for name in writer::ARTIFACTS {
            assert_eq!(artifact(&first, name), artifact(&second, name), "artifact {}", name);
        }
    }

    #[test]
    fn test_identical_trees_in_different_locations() {
        let a = SnapshotTestHarness::new();
        let b = SnapshotTestHarness::new();
        a.generate_project(3, 3);
        b.generate_project(3, 3);

        let sa = Snapshotter::new().capture(a.root()).unwrap();
        let sb = Snapshotter::new().capture(b.root()).unwrap();
        assert_ne!(sa.subject(), sb.subject());
        assert_eq!(sa.nodes_stream(), sb.nodes_stream());
        assert_eq!(sa.digests_stream(), sb.digests_stream());
        assert_eq!(sa.fingerprint(), sb.fingerprint());
    }

    #[test]
    fn test_worker_count_does_not_change_output() {
        let harness = SnapshotTestHarness::new();
        harness.generate_project(5, 10);

        let baseline = SnapshotterBuilder::new()
            .parallel_workers(1)
            .build()
            .capture(harness.root())
            .unwrap();
        for workers in [2, 4, 16] {
            let parallel = SnapshotterBuilder::new()
                .parallel_workers(workers)
                .read_buffer_size(7)
                .build()
                .capture(harness.root())
                .unwrap();
            assert_eq!(parallel.digests_stream(), baseline.digests_stream());
            assert_eq!(parallel.fingerprint(), baseline.fingerprint());
        }
    }

    #[test]
    fn test_single_byte_change_changes_one_digest() {
        let mut harness = SnapshotTestHarness::new();
        harness.generate_project(2, 3);
        let before = harness.take();

        harness.write("pkg1/src/mod2.rs", b"dir 1 file 2\nDIR 1 file 2\ndir 1 file 2\n");
        let after = harness.take();

        assert_ne!(artifact(&before, "fingerprint"), artifact(&after, "fingerprint"));
        assert_eq!(artifact(&before, "nodes"), artifact(&after, "nodes"));

        let old = SnapshotReader::open(&before).unwrap();
        let new = SnapshotReader::open(&after).unwrap();
        let differing: Vec<_> = old
            .snapshot()
            .digests()
            .iter()
            .zip(new.snapshot().digests())
            .filter(|(a, b)| a.digest != b.digest)
            .map(|(a, _)| a.path.clone())
            .collect();
        assert_eq!(differing, vec![PathBuf::from("pkg1/src/mod2.rs")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_permission_change_changes_nodes_only() {
        use std::os::unix::fs::PermissionsExt;

        let mut harness = SnapshotTestHarness::new();
        harness.write("a.txt", b"hi");
        let a_txt = harness.root().join("a.txt");
        fs::set_permissions(&a_txt, fs::Permissions::from_mode(0o644)).unwrap();
        let before = harness.take();

        fs::set_permissions(&a_txt, fs::Permissions::from_mode(0o600)).unwrap();
        let after = harness.take();

        assert_eq!(artifact(&before, "digests"), artifact(&after, "digests"));
        assert_eq!(artifact(&before, "nodes"), b"f 0644 2 a.txt\0\0");
        assert_eq!(artifact(&after, "nodes"), b"f 0600 2 a.txt\0\0");
        assert_ne!(artifact(&before, "fingerprint"), artifact(&after, "fingerprint"));
    }

    #[cfg(unix)]
    #[test]
    fn test_every_entry_recorded_once() {
        let harness = SnapshotTestHarness::new();
        harness.generate_project(3, 4);
        std::os::unix::fs::symlink("README.md", harness.root().join("link")).unwrap();

        let captured = Snapshotter::new().capture(harness.root()).unwrap();
        let root = captured.subject().to_path_buf();

        let expected: BTreeSet<PathBuf> = walkdir::WalkDir::new(&root)
            .min_depth(1)
            .into_iter()
            .map(|e| e.unwrap().path().strip_prefix(&root).unwrap().to_path_buf())
            .collect();
        let recorded: Vec<PathBuf> = captured.nodes().iter().map(|n| n.path.clone()).collect();
        let unique: BTreeSet<PathBuf> = recorded.iter().cloned().collect();
        assert_eq!(unique.len(), recorded.len(), "duplicate node records");
        assert_eq!(unique, expected);

        let files: BTreeSet<PathBuf> = walkdir::WalkDir::new(&root)
            .into_iter()
            .map(|e| e.unwrap())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().strip_prefix(&root).unwrap().to_path_buf())
            .collect();
        let digested: BTreeSet<PathBuf> =
            captured.digests().iter().map(|d| d.path.clone()).collect();
        assert_eq!(digested, files);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_recorded_not_followed() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), b"outside").unwrap();

        let harness = SnapshotTestHarness::new();
        harness.write("a.txt", b"hi");
        std::os::unix::fs::symlink(outside.path(), harness.root().join("escape")).unwrap();
        std::os::unix::fs::symlink("missing", harness.root().join("dangling")).unwrap();
        std::os::unix::fs::symlink(".", harness.root().join("loop")).unwrap();

        let captured = Snapshotter::new().capture(harness.root()).unwrap();
        let paths: Vec<String> = captured
            .nodes()
            .iter()
            .map(|n| n.path.to_string_lossy().into_owned())
            .collect();
        assert_eq!(paths, vec!["a.txt", "dangling", "escape", "loop"]);
        assert_eq!(captured.file_count(), 1);

        let dangling = &captured.nodes()[1];
        assert_eq!(dangling.kind, NodeKind::Symlink);
        assert_eq!(dangling.size, 0);
        assert_eq!(dangling.link_target.as_deref(), Some(Path::new("missing")));
    }

    #[test]
    fn test_existing_output_left_untouched() {
        let mut harness = SnapshotTestHarness::new();
        harness.write("a.txt", b"hi");
        let output = harness.take();
        let before: Vec<Vec<u8>> = writer::ARTIFACTS
            .iter()
            .map(|name| artifact(&output, name))
            .collect();

        harness.write("a.txt", b"changed");
        let err = snapshot(harness.root(), &output).unwrap_err();
        assert!(matches!(err, SnapshotError::AlreadyExists { .. }));

        for (name, bytes) in writer::ARTIFACTS.iter().zip(&before) {
            assert_eq!(&artifact(&output, name), bytes, "artifact {}", name);
        }
        assert_eq!(fs::read_dir(&output).unwrap().count(), writer::ARTIFACTS.len());
    }

    #[test]
    fn test_reference_scenario_bytes() {
        let out_dir = TempDir::new().unwrap();
        let output = out_dir.path().join("snap");
        let summary = SnapshotterBuilder::new()
            .build_with(reference_tree())
            .take(Path::new("/s"), &output)
            .unwrap();

        assert_eq!(summary.node_count, 4);
        assert_eq!(summary.file_count, 2);
        assert_eq!(artifact(&output, "subject"), b"/s\0");
        assert_eq!(
            artifact(&output, "nodes"),
            b"f 0644 2 a.txt\0\0d 0755 0 b\0\0f 0644 3 b/c.txt\0\0l 0777 0 d\0a.txt\0"
        );
        assert_eq!(artifact(&output, "files"), b"a.txt\0b/c.txt\0");
        assert_eq!(
            artifact(&output, "digests"),
            b"8f434346648f6b96df89dda901c5176b10a6d83961dd3c1ac88b59b2dc327aa4 a.txt\0\
              b49f425a7e1f9cff3856329ada223f2f9d368f15a00cf48df16ca95986137fe8 b/c.txt\0"
        );
        assert_eq!(
            artifact(&output, "fingerprint"),
            b"6405a331d6952da4329167211a36e2de0a3391d3fa7454fb5dd726d5778b5b78\n"
        );
    }

    #[test]
    fn test_reference_scenario_mode_change() {
        let mut tree = reference_tree();
        tree.set_mode("/s/a.txt", 0o600).unwrap();

        let changed = SnapshotterBuilder::new().build_with(tree).capture(Path::new("/s")).unwrap();
        let original = SnapshotterBuilder::new()
            .build_with(reference_tree())
            .capture(Path::new("/s"))
            .unwrap();

        assert_eq!(changed.digests_stream(), original.digests_stream());
        assert_eq!(
            changed.fingerprint().to_hex(),
            "9a983f92c54dc31b1adfb70a5f652afa8e2d42799454c4b7758c834f48e3436b"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unencodable_name_leaves_no_output() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let bad = Path::new("/s").join(OsStr::from_bytes(b"bad\0name"));
        let tree = reference_tree().with_file(bad, b"x", 0o644);

        let out_dir = TempDir::new().unwrap();
        let output = out_dir.path().join("snap");
        let err = SnapshotterBuilder::new()
            .build_with(tree)
            .take(Path::new("/s"), &output)
            .unwrap_err();

        assert!(matches!(err, SnapshotError::Encoding { field: "path", .. }));
        assert!(!output.exists());
        assert_eq!(fs::read_dir(out_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unreadable_file_leaves_no_output() {
        let tree = reference_tree().with_unreadable_file("/s/b/locked", b"secret", 0o000);

        let out_dir = TempDir::new().unwrap();
        let output = out_dir.path().join("snap");
        let err = SnapshotterBuilder::new()
            .parallel_workers(4)
            .build_with(tree)
            .take(Path::new("/s"), &output)
            .unwrap_err();

        assert_eq!(err.path(), Some(Path::new("/s/b/locked")));
        assert!(!output.exists());
        assert_eq!(fs::read_dir(out_dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_tampered_digest_is_detected() -> anyhow::Result<()> {
        let mut harness = SnapshotTestHarness::new();
        harness.generate_project(2, 3);
        let output = harness.take();
        assert!(verify_integrity(&output)?.is_valid());

        tamper_artifact(&output, "digests", |bytes| {
            bytes[0] = if bytes[0] == b'0' { b'1' } else { b'0' };
        })?;

        let report = verify_integrity(&output)?;
        assert!(!report.fingerprint_valid);
        assert!(report.digests_aligned);
        assert!(!report.is_valid());
        assert!(report.summary().contains("fingerprint mismatch"));
        Ok(())
    }
}
