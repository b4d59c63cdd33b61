//! The ingestion engine.
//!
//! Sequential, per-file pipeline: cache check → capture time → date
//! bucket → normalized name → collision search → copy → record. A
//! failure on one file becomes a `Failed` outcome and the run moves on;
//! only setup problems (missing source directory, unusable cache file)
//! abort.

use std::fs;
use std::path::Path;

use filetime::FileTime;

use crate::cache::IngestCache;
use crate::error::{Error, Result};
use crate::metadata::MetadataProvider;
use crate::pattern::normalize_name;
use crate::placement;
use crate::scanner::{self, MediaKind};
use crate::types::{FileOutcome, IngestConfig, IngestReport};

/// Owns one ingestion run: the config, the cache, and the metadata
/// provider. Exactly one engine per source/archive pair at a time.
pub struct IngestEngine {
    config: IngestConfig,
    cache: IngestCache,
    provider: MetadataProvider,
}

impl IngestEngine {
    /// Set up an engine: verify the source directory and load its
    /// cache.
    ///
    /// # Errors
    /// Fails if the source directory does not exist or the cache file
    /// is unusable.
    pub fn new(config: IngestConfig) -> Result<Self> {
        if !config.source_dir.is_dir() {
            return Err(Error::SourceMissing(config.source_dir.clone()));
        }
        let cache = IngestCache::open(
            &config.source_dir,
            &config.archive_root,
            config.autosave_interval,
        )?;
        Ok(Self {
            config,
            cache,
            provider: MetadataProvider::new(),
        })
    }

    pub fn cache(&self) -> &IngestCache {
        &self.cache
    }

    /// Run ingestion over the whole source tree.
    pub fn ingest(&mut self) -> Result<IngestReport> {
        self.ingest_with(|_, _| {})
    }

    /// Run ingestion, invoking `on_file` after each file resolves.
    ///
    /// # Errors
    /// Only setup errors surface here; per-file failures are folded
    /// into the report. The cache is saved unconditionally at the end.
    pub fn ingest_with<F>(&mut self, mut on_file: F) -> Result<IngestReport>
    where
        F: FnMut(&Path, &FileOutcome),
    {
        let files = scanner::scan_source(&self.config.source_dir)
            .map_err(|e| Error::io(&self.config.source_dir, e))?;

        let mut report = IngestReport::default();
        for file in files {
            let outcome = match file.kind {
                MediaKind::Recognized => self
                    .ingest_file(&file.path)
                    .unwrap_or_else(|e| FileOutcome::Failed {
                        reason: e.to_string(),
                    }),
                MediaKind::Ignored => FileOutcome::Ignored,
                MediaKind::Unrecognized => FileOutcome::Unrecognized,
            };

            self.log_outcome(&file.path, &outcome);
            report.record(&file.path, &outcome);
            on_file(&file.path, &outcome);

            if let Err(e) = self.cache.maybe_autosave() {
                log::error!("cache autosave failed: {}", e);
            }
        }

        if let Err(e) = self.cache.save() {
            log::error!("cache save failed: {}", e);
        }
        Ok(report)
    }

    /// Pipeline for a single recognized media file.
    fn ingest_file(&mut self, source: &Path) -> Result<FileOutcome> {
        if self.cache.check(source) {
            return Ok(FileOutcome::Cached);
        }

        let capture = self.provider.capture_time(source)?;
        let bucket = placement::date_dir(&self.config.archive_root, capture.time.date_naive());

        let filename = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidPath(source.display().to_string()))?;
        let normalized = normalize_name(filename);

        let placement =
            placement::resolve(source, &capture, &bucket, &normalized, &self.provider)?;

        if !placement.duplicate {
            self.copy_into_archive(source, &placement.dest, capture.time.timestamp())?;
        }

        // Duplicates are recorded too: this source now maps to the
        // archived twin, even though no bytes moved.
        self.cache.add(source, &placement.dest)?;

        if placement.duplicate {
            Ok(FileOutcome::Duplicate {
                dest: placement.dest,
            })
        } else {
            let size = fs::metadata(source).map_err(|e| Error::io(source, e))?.len();
            Ok(FileOutcome::Copied {
                dest: placement.dest,
                size,
            })
        }
    }

    /// Copy bytes to a fresh destination, then normalize its mtime to
    /// the capture time and restrict permissions.
    fn copy_into_archive(&self, source: &Path, dest: &Path, capture_secs: i64) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::copy(source, dest).map_err(|e| Error::io(dest, e))?;

        filetime::set_file_mtime(dest, FileTime::from_unix_time(capture_secs, 0))
            .map_err(|e| Error::io(dest, e))?;
        self.restrict_permissions(dest)?;
        Ok(())
    }

    #[cfg(unix)]
    fn restrict_permissions(&self, dest: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dest, fs::Permissions::from_mode(self.config.file_mode))
            .map_err(|e| Error::io(dest, e))
    }

    #[cfg(not(unix))]
    fn restrict_permissions(&self, dest: &Path) -> Result<()> {
        let mut perms = fs::metadata(dest).map_err(|e| Error::io(dest, e))?.permissions();
        perms.set_readonly(true);
        fs::set_permissions(dest, perms).map_err(|e| Error::io(dest, e))
    }

    fn log_outcome(&self, path: &Path, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Copied { dest, .. } => {
                log::info!("{} ==> {}", path.display(), dest.display());
            }
            FileOutcome::Duplicate { dest } => {
                log::info!("skipping duplicate {} =/=> {}", path.display(), dest.display());
            }
            FileOutcome::Cached => {
                log::debug!("already archived: {}", path.display());
            }
            FileOutcome::Ignored => {
                log::debug!("ignoring sidecar file {}", path.display());
            }
            FileOutcome::Unrecognized => {
                log::warn!("skipping non-media file {}", path.display());
            }
            FileOutcome::Failed { reason } => {
                log::error!("skipping {}: {}", path.display(), reason);
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
