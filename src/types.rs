//! Domain types for photoroll.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

// ============================================================================
// CACHE
// ============================================================================

/// Durable record that one source file has already been archived.
///
/// Keyed in the cache by the source path relative to the source
/// directory. Entries are written once on successful ingestion and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Destination path relative to the archive root.
    pub dest: String,
    /// Size of the file in bytes at copy time.
    pub size: u64,
    /// Source file mtime at copy time, truncated to whole seconds (UTC).
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// Terminal state of one file in an ingestion run.
///
/// The engine never aborts a run on a single file: every file resolves
/// to exactly one of these, and the orchestrating loop logs and
/// continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Bytes were copied to a fresh destination.
    Copied { dest: PathBuf, size: u64 },
    /// Byte-identical twin already archived; no copy performed, but the
    /// source is still recorded as mapping to that destination.
    Duplicate { dest: PathBuf },
    /// Cache hit: already archived and verified on disk.
    Cached,
    /// Extension is on the explicit ignore list (sidecar/metadata file).
    Ignored,
    /// Extension is neither recognized media nor explicitly ignored.
    Unrecognized,
    /// Processing failed; the rest of the run continues.
    Failed { reason: String },
}

/// Aggregate counts for one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub copied: u64,
    pub duplicates: u64,
    pub cached: u64,
    pub ignored: u64,
    pub unrecognized: u64,
    pub bytes_copied: u64,
    /// Files that failed, with the underlying cause.
    pub failed: Vec<(PathBuf, String)>,
}

impl IngestReport {
    /// Fold one file's outcome into the run totals.
    pub fn record(&mut self, path: &std::path::Path, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Copied { size, .. } => {
                self.copied += 1;
                self.bytes_copied += size;
            }
            FileOutcome::Duplicate { .. } => self.duplicates += 1,
            FileOutcome::Cached => self.cached += 1,
            FileOutcome::Ignored => self.ignored += 1,
            FileOutcome::Unrecognized => self.unrecognized += 1,
            FileOutcome::Failed { reason } => {
                self.failed.push((path.to_path_buf(), reason.clone()));
            }
        }
    }

    /// Number of files that reached a terminal state.
    pub fn total(&self) -> u64 {
        self.copied
            + self.duplicates
            + self.cached
            + self.ignored
            + self.unrecognized
            + self.failed.len() as u64
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Output format for the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable pretty output.
    #[default]
    Human,
    /// Machine-readable JSON.
    Json,
}

/// Configuration for an ingestion run.
///
/// All knobs are explicit here; nothing reads process-global state.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Directory being scanned for media (e.g. a card mount point).
    pub source_dir: PathBuf,
    /// Root of the date-organized archive.
    pub archive_root: PathBuf,
    /// Flush the cache to disk after this many additions (0 = only at
    /// the end of the run).
    pub autosave_interval: u32,
    /// Permission bits applied to archived files on unix (read-only,
    /// owner and group).
    pub file_mode: u32,
}

impl IngestConfig {
    /// Config with the default autosave interval and file mode.
    pub fn new(source_dir: PathBuf, archive_root: PathBuf) -> Self {
        Self {
            source_dir,
            archive_root,
            autosave_interval: 25,
            file_mode: 0o440,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_report_records_outcomes() {
        let mut report = IngestReport::default();
        report.record(
            Path::new("a.jpg"),
            &FileOutcome::Copied {
                dest: PathBuf::from("x"),
                size: 100,
            },
        );
        report.record(
            Path::new("b.jpg"),
            &FileOutcome::Duplicate {
                dest: PathBuf::from("x"),
            },
        );
        report.record(Path::new("c.jpg"), &FileOutcome::Cached);
        report.record(
            Path::new("d.jpg"),
            &FileOutcome::Failed {
                reason: "boom".to_string(),
            },
        );

        assert_eq!(report.copied, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.cached, 1);
        assert_eq!(report.bytes_copied, 100);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.total(), 4);
    }

    #[test]
    fn test_default_config_knobs() {
        let config = IngestConfig::new(PathBuf::from("/src"), PathBuf::from("/archive"));
        assert_eq!(config.autosave_interval, 25);
        assert_eq!(config.file_mode, 0o440);
    }
}
