//! # Treeseal CLI - Tamper-evident directory snapshots
//!
//! ## Usage
//! ```bash
//! # Take a snapshot
//! treeseal take ./project ./project.snap
//!
//! # Inspect it
//! treeseal show ./project.snap
//!
//! # Check it is intact and the directory still matches
//! treeseal verify ./project.snap
//!
//! # Compare two snapshots
//! treeseal compare ./monday.snap ./tuesday.snap
//! ```
//!
//! Exit status is 0 on success, 1 when `verify` or `compare` find a
//! difference, and 2 on any error.

use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use treeseal::encoding::SCHEMA_VERSION;
use treeseal::utils::{display_path, format_bytes};
use treeseal::{
    compare, verify_integrity, verify_subject, ContentDigest, EntryValue, Result, SnapshotEntry,
    SnapshotReader, SnapshotterBuilder, VerificationReport,
};

/// Treeseal CLI - capture and check tamper-evident directory snapshots
#[derive(Parser)]
#[command(name = "treeseal")]
#[command(version)]
#[command(about = "Tamper-evident snapshots of directory trees")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot a directory into a new output location
    Take {
        /// Directory to capture
        subject: PathBuf,

        /// Output location (must not exist)
        output: PathBuf,

        /// Hashing threads (defaults to CPU count)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Show progress
        #[arg(long)]
        progress: bool,
    },

    /// Show the contents of a snapshot
    Show {
        /// Snapshot directory
        snapshot: PathBuf,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Verify a snapshot against itself and its subject
    Verify {
        /// Snapshot directory
        snapshot: PathBuf,

        /// Compare against this directory instead of the recorded subject
        #[arg(long, conflicts_with = "integrity_only")]
        subject: Option<PathBuf>,

        /// Only check that the stored artifacts are consistent
        #[arg(long)]
        integrity_only: bool,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare two snapshots path by path
    #[command(alias = "diff")]
    Compare {
        /// Older snapshot
        old: PathBuf,

        /// Newer snapshot
        new: PathBuf,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // TREESEAL_LOG overrides the verbosity flag
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("TREESEAL_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if std::env::var_os("NO_COLOR").is_some() {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e.user_message());
            ExitCode::from(2)
        }
    }
}

/// Returns `Ok(false)` when a check ran but found a difference
fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::Take { subject, output, jobs, progress } => {
            cmd_take(&subject, &output, jobs, progress).map(|_| true)
        }
        Commands::Show { snapshot, json } => cmd_show(&snapshot, json).map(|_| true),
        Commands::Verify { snapshot, subject, integrity_only, json } => {
            cmd_verify(&snapshot, subject.as_deref(), integrity_only, json)
        }
        Commands::Compare { old, new, json } => cmd_compare(&old, &new, json),
    }
}

fn cmd_take(
    subject: &Path,
    output: &Path,
    jobs: Option<usize>,
    show_progress: bool,
) -> Result<()> {
    let mut builder = SnapshotterBuilder::new();
    if let Some(jobs) = jobs {
        builder = builder.parallel_workers(jobs);
    }
    let snapshotter = builder.build();

    let progress = show_progress.then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Snapshotting {}...", display_path(subject)));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let result = snapshotter.take(subject, output);
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    let summary = result?;

    println!(
        "{} Snapshot {} written to {}",
        "✓".green().bold(),
        summary.fingerprint.short().yellow().bold(),
        display_path(&summary.output)
    );
    println!("  Subject: {}", display_path(&summary.subject).cyan());
    println!("  Nodes: {}", summary.node_count.to_string().cyan());
    println!(
        "  Files: {} ({})",
        summary.file_count.to_string().cyan(),
        format_bytes(summary.total_file_bytes).cyan()
    );
    println!("  Fingerprint: {}", summary.fingerprint);
    let elapsed = format_duration(truncate_to_millis(summary.duration)).to_string();
    println!("  Time: {}", elapsed.cyan());
    Ok(())
}

#[derive(Serialize)]
struct ShowOutput<'a> {
    schema_version: u32,
    subject: &'a Path,
    fingerprint: ContentDigest,
    stored_fingerprint: Option<ContentDigest>,
    entries: Vec<SnapshotEntry>,
}

fn cmd_show(location: &Path, json: bool) -> Result<()> {
    let reader = SnapshotReader::open(location)?;
    let snapshot = reader.snapshot();

    if json {
        let output = ShowOutput {
            schema_version: SCHEMA_VERSION,
            subject: snapshot.subject(),
            fingerprint: snapshot.fingerprint(),
            stored_fingerprint: reader.stored_fingerprint(),
            entries: reader.entries(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{} {}", "Subject:".bold(), display_path(snapshot.subject()));
    println!("{} v{}", "Schema:".bold(), SCHEMA_VERSION);
    println!("{} {}", "Fingerprint:".bold(), snapshot.fingerprint());
    if reader.stored_fingerprint() != Some(snapshot.fingerprint()) {
        println!("{} stored fingerprint does not match the streams", "⚠".yellow().bold());
    }
    println!(
        "{} {} nodes, {} files, {}\n",
        "Contents:".bold(),
        snapshot.nodes().len(),
        snapshot.file_count(),
        format_bytes(snapshot.total_file_bytes())
    );

    for entry in reader.entries() {
        println!("{}", render_entry(&entry));
    }
    Ok(())
}

fn render_entry(entry: &SnapshotEntry) -> String {
    let path = display_path(&entry.path);
    let prefix = format!("{} {:04o}", char::from(entry.kind.tag()), entry.mode);
    match &entry.value {
        EntryValue::File { digest, size, .. } => {
            let digest = digest.map_or_else(|| "--------".red().to_string(), |d| d.short());
            format!("{} {} {:>10} {}", prefix, digest.dimmed(), size, path)
        }
        EntryValue::Directory => format!("{} {:>19} {}", prefix, "", format!("{}/", path).blue()),
        EntryValue::Symlink { target } => {
            format!("{} {:>19} {} -> {}", prefix, "", path.cyan(), display_path(target))
        }
        EntryValue::Other => format!("{} {:>19} {} ({})", prefix, "", path.magenta(), entry.kind),
    }
}

fn cmd_verify(
    location: &Path,
    subject: Option<&Path>,
    integrity_only: bool,
    json: bool,
) -> Result<bool> {
    let report = if integrity_only {
        verify_integrity(location)?
    } else {
        verify_subject(location, subject)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report.is_valid());
    }

    print_verification(&report);
    Ok(report.is_valid())
}

fn print_verification(report: &VerificationReport) {
    let mark = |ok: bool| if ok { "✓ Valid".green() } else { "✗ Invalid".red() };

    println!("{}", "Verification Report:".bold());
    println!("  Fingerprint: {}", mark(report.fingerprint_valid));
    println!("  Files manifest: {}", mark(report.files_manifest_valid));
    println!("  Digests: {}", mark(report.digests_aligned));

    if let Some(subject) = &report.checked_subject {
        let matches = report.subject_fingerprint == Some(report.computed_fingerprint);
        println!(
            "  Subject {}: {}",
            display_path(subject),
            if matches { "✓ Unchanged".green() } else { "✗ Changed".red() }
        );
        for change in &report.changes {
            println!("    {}", change);
        }
    }
    for error in &report.errors {
        println!("  {} {}", "⚠".yellow().bold(), error);
    }

    println!("\n{}", report.summary());
}

fn cmd_compare(old: &Path, new: &Path, json: bool) -> Result<bool> {
    let old = SnapshotReader::open(old)?;
    let new = SnapshotReader::open(new)?;
    let diff = compare(old.snapshot(), new.snapshot());

    if json {
        println!("{}", serde_json::to_string_pretty(&diff)?);
        return Ok(!diff.has_differences());
    }

    if !diff.has_differences() {
        println!(
            "{} Snapshots are identical ({})",
            "✓".green().bold(),
            diff.old_fingerprint.short()
        );
        return Ok(true);
    }

    for change in &diff.changes {
        let line = change.to_string();
        let colored = match line.as_bytes().first() {
            Some(b'+') => line.green(),
            Some(b'-') => line.red(),
            _ => line.yellow(),
        };
        println!("{}", colored);
    }

    let stats = &diff.stats;
    println!("\n{}", "Summary:".bold());
    println!(
        "  Added: {} ({})",
        stats.added.to_string().green(),
        format_bytes(stats.bytes_added).green()
    );
    println!(
        "  Removed: {} ({})",
        stats.removed.to_string().red(),
        format_bytes(stats.bytes_removed).red()
    );
    println!(
        "  Changed: {} content, {} metadata, {} kind",
        stats.content_changed.to_string().yellow(),
        stats.metadata_changed.to_string().yellow(),
        stats.kind_changed.to_string().yellow()
    );
    Ok(false)
}

fn truncate_to_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}
