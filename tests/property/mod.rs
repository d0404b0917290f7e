//! Property-based testing for treeseal
//!
//! Uses proptest to check snapshot invariants across randomly generated trees.

use ::treeseal::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Relative file path -> content
///
/// Directory components start with `d` and file names with `f`, so a path is
/// never both a file and a directory.
pub type TreeLayout = BTreeMap<PathBuf, Vec<u8>>;

fn path_strategy() -> impl Strategy<Value = PathBuf> {
    let dirs = prop::collection::vec("d[a-c0-2]{0,2}", 0..=3);
    let name = "f[a-z0-9_.-]{0,6}";
    (dirs, name).prop_map(|(dirs, name)| {
        let mut path = PathBuf::new();
        for dir in dirs {
            path.push(dir);
        }
        path.push(name);
        path
    })
}

fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

fn tree_strategy() -> impl Strategy<Value = TreeLayout> {
    prop::collection::btree_map(path_strategy(), content_strategy(), 1..24)
}

fn memory_tree(layout: &TreeLayout) -> MemoryFileSystem {
    layout.iter().fold(MemoryFileSystem::new().with_dir("/s", 0o755), |fs, (path, content)| {
        fs.with_file(Path::new("/s").join(path), content, 0o644)
    })
}

fn capture(fs: MemoryFileSystem, workers: usize) -> Snapshot {
    SnapshotterBuilder::new()
        .parallel_workers(workers)
        .build_with(fs)
        .capture(Path::new("/s"))
        .unwrap()
}

fn materialize<'a>(root: &Path, files: impl Iterator<Item = (&'a PathBuf, &'a Vec<u8>)>) {
    for (path, content) in files {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_worker_count_is_invisible(layout in tree_strategy(), workers in 2usize..8) {
        let sequential = capture(memory_tree(&layout), 1);
        let parallel = capture(memory_tree(&layout), workers);
        prop_assert_eq!(sequential.nodes_stream(), parallel.nodes_stream());
        prop_assert_eq!(sequential.digests_stream(), parallel.digests_stream());
        prop_assert_eq!(sequential.fingerprint(), parallel.fingerprint());
    }

    #[test]
    fn prop_traversal_order_is_canonical(layout in tree_strategy()) {
        let snapshot = capture(memory_tree(&layout), 1);
        let paths: Vec<&PathBuf> = snapshot.nodes().iter().map(|n| &n.path).collect();

        // Component-wise ordering of byte-sorted names is pre-order
        let mut sorted = paths.clone();
        sorted.sort();
        prop_assert_eq!(&paths, &sorted);

        for node in snapshot.nodes() {
            if let Some(parent) = node.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                prop_assert!(
                    paths.contains(&&parent.to_path_buf()),
                    "parent of {:?} missing",
                    node.path
                );
            }
        }
    }

    #[test]
    fn prop_file_digests_follow_contents(layout in tree_strategy()) {
        let snapshot = capture(memory_tree(&layout), 3);
        prop_assert_eq!(snapshot.digests().len(), layout.len());
        for record in snapshot.digests() {
            prop_assert_eq!(record.digest, ContentDigest::of(&layout[&record.path]));
        }
    }

    #[test]
    fn prop_any_content_change_changes_fingerprint(
        layout in tree_strategy(),
        pick in any::<prop::sample::Index>(),
        extra in any::<u8>(),
    ) {
        let original = capture(memory_tree(&layout), 1);

        let mut edited = layout.clone();
        let victim = pick.get(&layout.keys().cloned().collect::<Vec<_>>()).clone();
        edited.get_mut(&victim).unwrap().push(extra);
        let changed = capture(memory_tree(&edited), 1);

        prop_assert_ne!(original.fingerprint(), changed.fingerprint());
        let diff = compare(&original, &changed);
        prop_assert_eq!(diff.changes.len(), 1);
        prop_assert_eq!(&diff.changes[0].path, &victim);
        prop_assert_eq!(diff.changes[0].kind, ChangeKind::ContentChanged);
    }

    #[test]
    fn prop_streams_survive_disk_round_trip(layout in tree_strategy()) {
        let snapshot = capture(memory_tree(&layout), 2);
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("snap");
        writer::SnapshotWriter::new(&output).write(&snapshot).unwrap();

        let reader = SnapshotReader::open(&output).unwrap();
        prop_assert_eq!(reader.snapshot().nodes(), snapshot.nodes());
        prop_assert_eq!(reader.snapshot().digests(), snapshot.digests());
        prop_assert_eq!(reader.stored_fingerprint(), Some(snapshot.fingerprint()));
        prop_assert!(verify_integrity(&output).unwrap().is_valid());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_creation_order_is_invisible_on_disk(layout in tree_strategy()) {
        let forward = TempDir::new().unwrap();
        let backward = TempDir::new().unwrap();
        materialize(forward.path(), layout.iter());
        materialize(backward.path(), layout.iter().rev());

        let a = Snapshotter::new().capture(forward.path()).unwrap();
        let b = Snapshotter::new().capture(backward.path()).unwrap();
        prop_assert_eq!(a.nodes_stream(), b.nodes_stream());
        prop_assert_eq!(a.digests_stream(), b.digests_stream());
        prop_assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
