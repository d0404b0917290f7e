//! Main test module for treeseal
//!
//! This module includes all test suites:
//! - Integration tests for end-to-end scenarios
//! - Property-based tests for invariants

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::treeseal::*;
    use std::fs;
    use tempfile::TempDir;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let output = out_dir.path().join("snap");

        let summary = snapshot(temp_dir.path(), &output).unwrap();
        assert_eq!(summary.node_count, 0);
        assert_eq!(summary.file_count, 0);
        assert_eq!(summary.fingerprint.to_hex(), EMPTY_SHA256);

        assert!(fs::read(output.join("nodes")).unwrap().is_empty());
        assert!(fs::read(output.join("files")).unwrap().is_empty());
        assert!(fs::read(output.join("digests")).unwrap().is_empty());
        assert_eq!(
            fs::read_to_string(output.join("fingerprint")).unwrap(),
            format!("{}\n", EMPTY_SHA256)
        );
    }

    #[test]
    fn test_empty_file_is_digested() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("empty"), b"").unwrap();

        let captured = Snapshotter::new().capture(temp_dir.path()).unwrap();
        assert_eq!(captured.digests().len(), 1);
        assert_eq!(captured.digests()[0].digest.to_hex(), EMPTY_SHA256);
        assert_eq!(captured.nodes()[0].size, 0);
    }

    #[test]
    fn test_special_filenames() {
        let temp_dir = TempDir::new().unwrap();

        let special_names = vec![
            "file with spaces.txt",
            "file-with-dashes.txt",
            "file.with.dots.txt",
            "file@with#special$chars.txt",
            "file[with]brackets.txt",
            "line\nbreak.txt",
            "ünïcödé.txt",
        ];

        let mut written = Vec::new();
        for name in &special_names {
            // Skip if the OS doesn't support this filename
            if fs::write(temp_dir.path().join(name), name.as_bytes()).is_ok() {
                written.push(*name);
            }
        }

        let captured = Snapshotter::new().capture(temp_dir.path()).unwrap();
        let mut recorded: Vec<String> = captured
            .nodes()
            .iter()
            .map(|n| n.path.to_string_lossy().into_owned())
            .collect();
        recorded.sort();
        written.sort();
        assert_eq!(recorded, written);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_filename_recorded_verbatim() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = TempDir::new().unwrap();
        let name = OsStr::from_bytes(b"caf\xe9.txt");
        if fs::write(temp_dir.path().join(name), b"x").is_err() {
            // Filesystem enforces UTF-8 names
            return;
        }

        let out_dir = TempDir::new().unwrap();
        let output = out_dir.path().join("snap");
        snapshot(temp_dir.path(), &output).unwrap();

        assert_eq!(fs::read(output.join("files")).unwrap(), b"caf\xe9.txt\0");
        let reader = SnapshotReader::open(&output).unwrap();
        assert_eq!(reader.entries()[0].path.as_os_str(), name);
    }

    #[test]
    fn test_subject_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, "content").unwrap();
        let output = temp_dir.path().join("snap");

        let err = snapshot(&file, &output).unwrap_err();
        assert!(matches!(err, SnapshotError::NotADirectory { .. }));
        assert!(err.is_fatal_input());
        assert!(!output.exists());
    }

    #[test]
    fn test_output_is_an_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let output = out_dir.path().join("taken");
        fs::write(&output, "do not touch").unwrap();

        let err = snapshot(temp_dir.path(), &output).unwrap_err();
        assert!(matches!(err, SnapshotError::AlreadyExists { .. }));
        assert_eq!(fs::read_to_string(&output).unwrap(), "do not touch");
    }

    #[cfg(unix)]
    #[test]
    fn test_subject_given_through_symlink() {
        let temp_dir = TempDir::new().unwrap();
        let real = temp_dir.path().join("real");
        fs::create_dir(&real).unwrap();
        fs::write(real.join("a.txt"), "hi").unwrap();
        let alias = temp_dir.path().join("alias");
        std::os::unix::fs::symlink(&real, &alias).unwrap();

        let via_alias = Snapshotter::new().capture(&alias).unwrap();
        let direct = Snapshotter::new().capture(&real).unwrap();
        assert_eq!(via_alias.subject(), direct.subject());
        assert_eq!(via_alias.fingerprint(), direct.fingerprint());
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_bit_is_recorded() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let script = temp_dir.path().join("run.sh");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let captured = Snapshotter::new().capture(temp_dir.path()).unwrap();
        assert_eq!(captured.nodes()[0].mode, 0o755);
        assert!(captured.nodes_stream().starts_with(b"f 0755 10 run.sh\0\0"));
        match &captured.entries()[0].value {
            EntryValue::File { executable, .. } => assert!(*executable),
            other => panic!("unexpected entry: {:?}", other),
        }
    }
}
