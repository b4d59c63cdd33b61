//! The ingestion cache.
//!
//! One JSON file per source directory, co-located with it, mapping each
//! relative source path to `[relative dest path, size, timestamp]`.
//! The cache is what makes re-runs idempotent: `check` is the gate that
//! says "already fully and correctly archived, skip".
//!
//! Persistence discipline: the previous cache file is renamed to a
//! numbered backup, the new file is written fresh, then re-loaded and
//! compared against the in-memory map. Only on a match is the backup
//! deleted. A corrupt cache is never fatal — malformed entries are
//! dropped at load time and the worst case is a redundant
//! compare-and-skip on the next run.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::types::CacheEntry;

/// Cache filename inside the source directory. The `json` extension is
/// on the scanner's ignore list, so the cache never shows up as an
/// unrecognized file.
pub const CACHE_FILE_NAME: &str = "ingest_cache.json";

/// Timestamp format used on disk.
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Allowed drift between a destination file's mtime and the recorded
/// timestamp before `check` considers the entry stale.
const MTIME_TOLERANCE_SECS: i64 = 10;

/// Persistent map of already-ingested files for one source directory.
#[derive(Debug)]
pub struct IngestCache {
    source_dir: PathBuf,
    archive_root: PathBuf,
    autosave_interval: u32,
    adds_since_save: u32,
    entries: BTreeMap<String, CacheEntry>,
}

impl IngestCache {
    /// Load (or initialize empty) the cache for a source directory.
    ///
    /// # Errors
    /// Fails only if the cache file exists but is a symlink — a
    /// tampered cache is refused rather than followed. Unreadable or
    /// malformed content degrades to an empty map.
    pub fn open(source_dir: &Path, archive_root: &Path, autosave_interval: u32) -> Result<Self> {
        let path = source_dir.join(CACHE_FILE_NAME);
        if let Ok(meta) = fs::symlink_metadata(&path) {
            if meta.file_type().is_symlink() {
                return Err(Error::CacheFile(format!(
                    "{} is a symlink",
                    path.display()
                )));
            }
        }

        Ok(Self {
            source_dir: source_dir.to_path_buf(),
            archive_root: archive_root.to_path_buf(),
            autosave_interval,
            adds_since_save: 0,
            entries: load_entries(&path),
        })
    }

    /// Path of the on-disk cache file.
    pub fn path(&self) -> PathBuf {
        self.source_dir.join(CACHE_FILE_NAME)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CacheEntry)> {
        self.entries.iter()
    }

    /// The idempotency gate: true only if this source file was recorded
    /// before AND the recorded state still matches reality — both files
    /// exist, all three sizes agree, and the destination mtime is
    /// within tolerance of the recorded timestamp. Never errors; any
    /// doubt means false.
    pub fn check(&self, source: &Path) -> bool {
        self.verify(source).unwrap_or(false)
    }

    fn verify(&self, source: &Path) -> Option<bool> {
        let rel = source.strip_prefix(&self.source_dir).ok()?.to_str()?;
        let entry = self.entries.get(rel)?;
        let dest = self.archive_root.join(&entry.dest);

        let source_meta = fs::metadata(source).ok()?;
        let dest_meta = fs::metadata(&dest).ok()?;
        if source_meta.len() != entry.size || dest_meta.len() != entry.size {
            return Some(false);
        }

        let dest_mtime = DateTime::<Utc>::from(dest_meta.modified().ok()?).timestamp();
        let drift = dest_mtime - entry.timestamp.timestamp();
        Some(drift.abs() <= MTIME_TOLERANCE_SECS)
    }

    /// Record that `source` was archived at `dest`. In-memory only; the
    /// timestamp recorded is the source file's own mtime truncated to
    /// whole seconds.
    ///
    /// # Errors
    /// Fails if either file is missing, their sizes differ, or either
    /// path falls outside its root.
    pub fn add(&mut self, source: &Path, dest: &Path) -> Result<()> {
        let rel_source = relative_key(&self.source_dir, source)?;
        let rel_dest = relative_key(&self.archive_root, dest)?;

        let source_meta = fs::metadata(source).map_err(|e| Error::io(source, e))?;
        let dest_meta = fs::metadata(dest).map_err(|e| Error::io(dest, e))?;
        if source_meta.len() != dest_meta.len() {
            return Err(Error::SizeMismatch {
                src: source.to_path_buf(),
                dest: dest.to_path_buf(),
            });
        }

        let mtime = source_meta.modified().map_err(|e| Error::io(source, e))?;
        let secs = DateTime::<Utc>::from(mtime).timestamp();

        self.entries.insert(
            rel_source,
            CacheEntry {
                dest: rel_dest,
                size: source_meta.len(),
                timestamp: DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH),
            },
        );
        self.adds_since_save += 1;
        Ok(())
    }

    /// Save if the configured autosave batch has filled up.
    pub fn maybe_autosave(&mut self) -> Result<()> {
        if self.autosave_interval > 0 && self.adds_since_save >= self.autosave_interval {
            self.save()
        } else {
            Ok(())
        }
    }

    /// Persist the cache. No-op when nothing was added since the last
    /// save.
    ///
    /// Steps: re-validate every entry, rotate the existing file to the
    /// first free `.bakN` name, write fresh, re-load and compare to the
    /// in-memory map. On match the backup is removed; on mismatch it is
    /// kept for manual recovery and an error is returned.
    pub fn save(&mut self) -> Result<()> {
        if self.adds_since_save == 0 {
            return Ok(());
        }

        // Never persist a corrupt in-memory state.
        for (source, entry) in &self.entries {
            if !is_direct_rel_path(source) {
                return Err(Error::InvalidPath(source.clone()));
            }
            if !is_direct_rel_path(&entry.dest) {
                return Err(Error::InvalidPath(entry.dest.clone()));
            }
        }

        let mut on_disk = serde_json::Map::new();
        for (source, entry) in &self.entries {
            on_disk.insert(
                source.clone(),
                json!([entry.dest, entry.size, format_time(entry.timestamp)]),
            );
        }

        let path = self.path();
        let backup = backup_existing(&path)?;

        let serialized = serde_json::to_string(&Value::Object(on_disk))
            .map_err(|e| Error::CacheFile(e.to_string()))?;
        fs::write(&path, serialized).map_err(|e| Error::io(&path, e))?;
        self.adds_since_save = 0;

        if load_entries(&path) == self.entries {
            if let Some(backup) = backup {
                if let Err(e) = fs::remove_file(&backup) {
                    log::warn!("could not remove cache backup {}: {}", backup.display(), e);
                }
            }
            Ok(())
        } else {
            Err(Error::CacheVerify { path, backup })
        }
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

/// A path is direct-relative if it is non-empty, not absolute, and
/// contains only normal components (no `.` or `..`).
pub fn is_direct_rel_path(path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    let p = Path::new(path);
    !p.is_absolute() && p.components().all(|c| matches!(c, Component::Normal(_)))
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format(TIME_FORMAT).to_string()
}

fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, TIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Relative-path key for the cache map: `path` must live under `root`
/// and be valid UTF-8.
fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| Error::InvalidPath(path.display().to_string()))?;
    let rel = rel
        .to_str()
        .ok_or_else(|| Error::InvalidPath(path.display().to_string()))?;
    if !is_direct_rel_path(rel) {
        return Err(Error::InvalidPath(rel.to_string()));
    }
    Ok(rel.to_string())
}

// ============================================================================
// ON-DISK FORM
// ============================================================================

/// Read and validate the cache file. Never fails: unreadable or
/// unparsable content yields an empty map, individually malformed
/// entries are dropped, both with a logged error.
fn load_entries(path: &Path) -> BTreeMap<String, CacheEntry> {
    let mut entries = BTreeMap::new();

    if !path.exists() {
        return entries;
    }
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            log::error!("could not read cache file {}: {}", path.display(), e);
            return entries;
        }
    };
    let parsed: serde_json::Map<String, Value> = match serde_json::from_str(&raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::error!("could not parse cache file {}: {}", path.display(), e);
            return entries;
        }
    };

    for (source, value) in parsed {
        match decode_entry(&source, &value) {
            Some(entry) => {
                entries.insert(source, entry);
            }
            None => {
                log::error!("could not decode cache entry {:?}: {}", source, value);
            }
        }
    }
    entries
}

/// One entry is `"<rel src>": ["<rel dest>", <size>, "<timestamp>"]`.
/// Anything that deviates — bad path shape, negative or non-integer
/// size, unparsable timestamp — is rejected.
fn decode_entry(source: &str, value: &Value) -> Option<CacheEntry> {
    if !is_direct_rel_path(source) {
        return None;
    }
    let parts = value.as_array()?;
    if parts.len() != 3 {
        return None;
    }

    let dest = parts[0].as_str()?;
    if !is_direct_rel_path(dest) {
        return None;
    }
    let size = parts[1].as_u64()?;
    let timestamp = parse_time(parts[2].as_str()?)?;

    Some(CacheEntry {
        dest: dest.to_string(),
        size,
        timestamp,
    })
}

/// Rename an existing cache file to the first free `.bakN` name.
/// Returns the backup path, or `None` if there was nothing to back up.
fn backup_existing(path: &Path) -> Result<Option<PathBuf>> {
    if fs::symlink_metadata(path).is_err() {
        return Ok(None);
    }
    for i in 1u32.. {
        let mut name = OsString::from(path.as_os_str());
        name.push(format!(".bak{}", i));
        let backup = PathBuf::from(name);
        if fs::symlink_metadata(&backup).is_err() {
            fs::rename(path, &backup).map_err(|e| Error::io(path, e))?;
            return Ok(Some(backup));
        }
    }
    unreachable!("backup numbering is unbounded")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use tempfile::TempDir;

    struct Fixture {
        source: TempDir,
        archive: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                source: TempDir::new().unwrap(),
                archive: TempDir::new().unwrap(),
            }
        }

        fn cache(&self, autosave: u32) -> IngestCache {
            IngestCache::open(self.source.path(), self.archive.path(), autosave).unwrap()
        }

        fn source_file(&self, name: &str, content: &[u8], mtime: i64) -> PathBuf {
            write_with_mtime(&self.source.path().join(name), content, mtime)
        }

        fn archive_file(&self, rel: &str, content: &[u8], mtime: i64) -> PathBuf {
            write_with_mtime(&self.archive.path().join(rel), content, mtime)
        }
    }

    fn write_with_mtime(path: &Path, content: &[u8], mtime: i64) -> PathBuf {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
        filetime::set_file_mtime(path, FileTime::from_unix_time(mtime, 0)).unwrap();
        path.to_path_buf()
    }

    // --- path validation ---

    #[test]
    fn test_direct_rel_path_accepts_plain_paths() {
        assert!(is_direct_rel_path("IMG_0001.JPG"));
        assert!(is_direct_rel_path("sub/dir/IMG_0001.JPG"));
        assert!(is_direct_rel_path("2021/06/01/A/IMG_0001.JPG"));
    }

    #[test]
    fn test_direct_rel_path_rejects_escapes() {
        assert!(!is_direct_rel_path(""));
        assert!(!is_direct_rel_path("/etc/passwd"));
        assert!(!is_direct_rel_path("../outside.jpg"));
        assert!(!is_direct_rel_path("a/../../outside.jpg"));
        assert!(!is_direct_rel_path("./a.jpg"));
    }

    // --- add / check ---

    #[test]
    fn test_check_unknown_path_is_false() {
        let fx = Fixture::new();
        let cache = fx.cache(0);
        assert!(!cache.check(&fx.source.path().join("IMG_0001.JPG")));
    }

    #[test]
    fn test_add_then_check() {
        let fx = Fixture::new();
        let src = fx.source_file("IMG_0001.JPG", b"bytes", 1000);
        let dst = fx.archive_file("2021/06/01/A/IMG_0001.JPG", b"bytes", 1000);

        let mut cache = fx.cache(0);
        cache.add(&src, &dst).unwrap();
        assert!(cache.check(&src));
    }

    #[test]
    fn test_check_false_when_dest_deleted() {
        let fx = Fixture::new();
        let src = fx.source_file("IMG_0001.JPG", b"bytes", 1000);
        let dst = fx.archive_file("2021/06/01/A/IMG_0001.JPG", b"bytes", 1000);

        let mut cache = fx.cache(0);
        cache.add(&src, &dst).unwrap();
        fs::remove_file(&dst).unwrap();
        assert!(!cache.check(&src));
    }

    #[test]
    fn test_check_false_on_size_change() {
        let fx = Fixture::new();
        let src = fx.source_file("IMG_0001.JPG", b"bytes", 1000);
        let dst = fx.archive_file("2021/06/01/A/IMG_0001.JPG", b"bytes", 1000);

        let mut cache = fx.cache(0);
        cache.add(&src, &dst).unwrap();

        write_with_mtime(&dst, b"other length!", 1000);
        assert!(!cache.check(&src));
    }

    #[test]
    fn test_check_mtime_tolerance() {
        let fx = Fixture::new();
        let src = fx.source_file("IMG_0001.JPG", b"bytes", 1000);
        let dst = fx.archive_file("2021/06/01/A/IMG_0001.JPG", b"bytes", 1000);

        let mut cache = fx.cache(0);
        cache.add(&src, &dst).unwrap();

        // Within tolerance passes; past it fails.
        filetime::set_file_mtime(&dst, FileTime::from_unix_time(1009, 0)).unwrap();
        assert!(cache.check(&src));
        filetime::set_file_mtime(&dst, FileTime::from_unix_time(1011, 0)).unwrap();
        assert!(!cache.check(&src));
    }

    #[test]
    fn test_add_rejects_size_mismatch() {
        let fx = Fixture::new();
        let src = fx.source_file("IMG_0001.JPG", b"five!", 1000);
        let dst = fx.archive_file("A/IMG_0001.JPG", b"other length", 1000);

        let mut cache = fx.cache(0);
        assert!(matches!(
            cache.add(&src, &dst),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_add_rejects_path_outside_source() {
        let fx = Fixture::new();
        let other = TempDir::new().unwrap();
        let src = write_with_mtime(&other.path().join("IMG_0001.JPG"), b"x", 1000);
        let dst = fx.archive_file("A/IMG_0001.JPG", b"x", 1000);

        let mut cache = fx.cache(0);
        assert!(matches!(
            cache.add(&src, &dst),
            Err(Error::InvalidPath(_))
        ));
    }

    // --- save / load round trip ---

    #[test]
    fn test_save_load_round_trip() {
        let fx = Fixture::new();
        let src_a = fx.source_file("IMG_0001.JPG", b"aaa", 1000);
        let dst_a = fx.archive_file("2021/06/01/A/IMG_0001.JPG", b"aaa", 1000);
        let src_b = fx.source_file("card/IMG_0002.JPG", b"bbbb", 2000);
        let dst_b = fx.archive_file("2021/06/02/A/IMG_0002.JPG", b"bbbb", 2000);

        let mut cache = fx.cache(0);
        cache.add(&src_a, &dst_a).unwrap();
        cache.add(&src_b, &dst_b).unwrap();
        cache.save().unwrap();

        let reloaded = fx.cache(0);
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.check(&src_a));
        assert!(reloaded.check(&src_b));

        // Successful save leaves no backup behind.
        assert!(!fx.source.path().join("ingest_cache.json.bak1").exists());
    }

    #[test]
    fn test_save_without_adds_is_a_noop() {
        let fx = Fixture::new();
        let mut cache = fx.cache(0);
        cache.save().unwrap();
        assert!(!cache.path().exists());
    }

    #[test]
    fn test_save_skips_occupied_backup_names() {
        let fx = Fixture::new();
        let src = fx.source_file("IMG_0001.JPG", b"x", 1000);
        let dst = fx.archive_file("A/IMG_0001.JPG", b"x", 1000);

        let mut cache = fx.cache(0);
        cache.add(&src, &dst).unwrap();
        cache.save().unwrap();

        // Someone's old backup occupies .bak1; the next save must rotate
        // to .bak2 and, on success, delete only its own backup.
        let foreign = fx.source.path().join("ingest_cache.json.bak1");
        fs::write(&foreign, b"do not touch").unwrap();

        let src2 = fx.source_file("IMG_0002.JPG", b"y", 1000);
        let dst2 = fx.archive_file("A/IMG_0002.JPG", b"y", 1000);
        cache.add(&src2, &dst2).unwrap();
        cache.save().unwrap();

        assert_eq!(fs::read(&foreign).unwrap(), b"do not touch");
        assert!(!fx.source.path().join("ingest_cache.json.bak2").exists());
        assert_eq!(fx.cache(0).len(), 2);
    }

    #[test]
    fn test_backup_rotation_preserves_previous_contents() {
        let fx = Fixture::new();
        let src = fx.source_file("IMG_0001.JPG", b"x", 1000);
        let dst = fx.archive_file("A/IMG_0001.JPG", b"x", 1000);

        let mut cache = fx.cache(0);
        cache.add(&src, &dst).unwrap();
        cache.save().unwrap();
        let before = fs::read(cache.path()).unwrap();

        // The rotated backup is the previous file, byte for byte; until
        // the fresh write verifies, it is the recovery point.
        let backup = backup_existing(&cache.path()).unwrap().unwrap();
        assert_eq!(backup, fx.source.path().join("ingest_cache.json.bak1"));
        assert_eq!(fs::read(&backup).unwrap(), before);
        assert!(!cache.path().exists());
    }

    #[test]
    fn test_failed_save_keeps_pending_entries_for_retry() {
        let fx = Fixture::new();
        let src = fx.source_file("IMG_0001.JPG", b"x", 1000);
        let dst = fx.archive_file("A/IMG_0001.JPG", b"x", 1000);

        let mut cache = fx.cache(0);
        cache.add(&src, &dst).unwrap();

        // Source directory vanishes out from under us: the save must
        // fail cleanly, without marking the pending entry as flushed.
        fs::remove_dir_all(fx.source.path()).unwrap();
        assert!(matches!(cache.save(), Err(Error::Io { .. })));

        // Directory restored: a retry persists what the failed attempt
        // could not.
        fs::create_dir_all(fx.source.path()).unwrap();
        cache.save().unwrap();
        assert_eq!(fx.cache(0).len(), 1);
    }

    // --- load-time validation ---

    #[test]
    fn test_malformed_entries_dropped_at_load() {
        let fx = Fixture::new();
        let good_src = fx.source_file("IMG_0001.JPG", b"ok", 1000);
        fx.archive_file("2021/06/01/A/IMG_0001.JPG", b"ok", 1000);

        let raw = serde_json::json!({
            "IMG_0001.JPG": ["2021/06/01/A/IMG_0001.JPG", 2, "1970-01-01 00:16:40 UTC"],
            "/etc/absolute.jpg": ["A/x.jpg", 1, "1970-01-01 00:16:40 UTC"],
            "escape.jpg": ["../../x.jpg", 1, "1970-01-01 00:16:40 UTC"],
            "negative.jpg": ["A/x.jpg", -5, "1970-01-01 00:16:40 UTC"],
            "float.jpg": ["A/x.jpg", 1.5, "1970-01-01 00:16:40 UTC"],
            "badtime.jpg": ["A/x.jpg", 1, "June 1st 2021"],
            "arity.jpg": ["A/x.jpg", 1],
            "shape.jpg": "not an array"
        });
        fs::write(
            fx.source.path().join(CACHE_FILE_NAME),
            serde_json::to_string(&raw).unwrap(),
        )
        .unwrap();

        let cache = fx.cache(0);
        assert_eq!(cache.len(), 1);
        assert!(cache.check(&good_src));
    }

    #[test]
    fn test_unparsable_cache_degrades_to_empty() {
        let fx = Fixture::new();
        fs::write(fx.source.path().join(CACHE_FILE_NAME), b"{not json").unwrap();
        assert!(fx.cache(0).is_empty());
    }

    #[test]
    fn test_symlinked_cache_file_refused() {
        let fx = Fixture::new();
        let target = fx.source.path().join("elsewhere.json");
        fs::write(&target, b"{}").unwrap();
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(&target, fx.source.path().join(CACHE_FILE_NAME)).unwrap();
            let result = IngestCache::open(fx.source.path(), fx.archive.path(), 0);
            assert!(matches!(result, Err(Error::CacheFile(_))));
        }
    }

    // --- autosave ---

    #[test]
    fn test_autosave_flushes_after_batch() {
        let fx = Fixture::new();
        let mut cache = fx.cache(2);

        let src1 = fx.source_file("IMG_0001.JPG", b"a", 1000);
        let dst1 = fx.archive_file("A/IMG_0001.JPG", b"a", 1000);
        cache.add(&src1, &dst1).unwrap();
        cache.maybe_autosave().unwrap();
        assert!(!cache.path().exists());

        let src2 = fx.source_file("IMG_0002.JPG", b"b", 1000);
        let dst2 = fx.archive_file("A/IMG_0002.JPG", b"b", 1000);
        cache.add(&src2, &dst2).unwrap();
        cache.maybe_autosave().unwrap();
        assert!(cache.path().exists());
        assert_eq!(fx.cache(0).len(), 2);
    }

    #[test]
    fn test_exact_on_disk_schema() {
        let fx = Fixture::new();
        let src = fx.source_file("IMG_0001.JPG", b"abc", 1000);
        let dst = fx.archive_file("2021/06/01/A/IMG_0001.JPG", b"abc", 1000);

        let mut cache = fx.cache(0);
        cache.add(&src, &dst).unwrap();
        cache.save().unwrap();

        let raw: Value =
            serde_json::from_str(&fs::read_to_string(cache.path()).unwrap()).unwrap();
        assert_eq!(
            raw["IMG_0001.JPG"],
            serde_json::json!(["2021/06/01/A/IMG_0001.JPG", 3, "1970-01-01 00:16:40 UTC"])
        );
    }
}
