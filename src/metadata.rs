//! Capture-time extraction.
//!
//! Cameras and phones disagree about where the "when was this taken"
//! timestamp lives, so the provider walks an ordered list of strategies
//! and takes the first one that yields a value:
//!
//! 1. EXIF `DateTimeOriginal`
//! 2. EXIF `DateTime`
//! 3. Upload-tool filename prefix ("2021-06-01 10.30.00.jpg")
//! 4. Filesystem min(created, modified) — least trustworthy, logged as
//!    a warning
//!
//! All capture times are second-resolution and treated as UTC.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{Error, Result};
use crate::pattern::filename_timestamp;

/// Which strategy produced a capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    ExifDateTimeOriginal,
    ExifDateTime,
    FilenameTimestamp,
    Filesystem,
}

impl CaptureSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExifDateTimeOriginal => "exif_datetime_original",
            Self::ExifDateTime => "exif_datetime",
            Self::FilenameTimestamp => "filename_timestamp",
            Self::Filesystem => "filesystem",
        }
    }
}

/// A resolved capture time with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    pub time: DateTime<Utc>,
    pub source: CaptureSource,
}

/// Resolves capture times through the strategy chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataProvider;

impl MetadataProvider {
    pub fn new() -> Self {
        Self
    }

    /// Best-effort capture time for a media file. Landing on the
    /// filesystem fallback is logged as a warning, since it usually
    /// means the file's real capture date is lost.
    ///
    /// # Errors
    /// Fails only if every metadata strategy comes up empty AND the
    /// file's own timestamps cannot be read.
    pub fn capture_time(&self, path: &Path) -> Result<Capture> {
        let capture = self.capture_time_quiet(path)?;
        if capture.source == CaptureSource::Filesystem {
            log::warn!("using filesystem date for {}", path.display());
        }
        Ok(capture)
    }

    /// The same strategy chain, without the fallback warning. Collision
    /// searches consult archived candidates constantly and most of
    /// those (all videos) have no EXIF block; their fallback is
    /// routine, not a data-quality signal.
    ///
    /// # Errors
    /// Same conditions as [`capture_time`](Self::capture_time).
    pub fn capture_time_quiet(&self, path: &Path) -> Result<Capture> {
        type Strategy = fn(&Path) -> Option<DateTime<Utc>>;
        const STRATEGIES: &[(CaptureSource, Strategy)] = &[
            (CaptureSource::ExifDateTimeOriginal, exif_date_time_original),
            (CaptureSource::ExifDateTime, exif_date_time),
            (CaptureSource::FilenameTimestamp, name_timestamp),
        ];

        for &(source, strategy) in STRATEGIES {
            if let Some(time) = strategy(path) {
                return Ok(Capture { time, source });
            }
        }

        let time = filesystem_time(path).map_err(|e| Error::io(path, e))?;
        Ok(Capture {
            time,
            source: CaptureSource::Filesystem,
        })
    }
}

// ============================================================================
// STRATEGIES
// ============================================================================

fn exif_date_time_original(path: &Path) -> Option<DateTime<Utc>> {
    exif_field_time(path, exif::Tag::DateTimeOriginal)
}

fn exif_date_time(path: &Path) -> Option<DateTime<Utc>> {
    exif_field_time(path, exif::Tag::DateTime)
}

fn name_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let name = path.file_name()?.to_str()?;
    filename_timestamp(name).map(|naive| naive.and_utc())
}

/// Read one ASCII datetime field ("YYYY:MM:DD HH:MM:SS") out of the
/// file's EXIF block. Any parse failure means "not available".
fn exif_field_time(path: &Path, tag: exif::Tag) -> Option<DateTime<Utc>> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(&file);
    let data = exif::Reader::new().read_from_container(&mut reader).ok()?;
    let field = data.get_field(tag, exif::In::PRIMARY)?;

    let ascii = match field.value {
        exif::Value::Ascii(ref values) if !values.is_empty() => &values[0],
        _ => return None,
    };
    let dt = exif::DateTime::from_ascii(ascii).ok()?;

    let date = NaiveDate::from_ymd_opt(dt.year.into(), dt.month.into(), dt.day.into())?;
    let time = date.and_hms_opt(dt.hour.into(), dt.minute.into(), dt.second.into())?;
    Some(time.and_utc())
}

/// min(created, modified), truncated to whole seconds.
///
/// Creation time is unsupported on some filesystems; fall back to
/// modification time alone in that case.
fn filesystem_time(path: &Path) -> io::Result<DateTime<Utc>> {
    let meta = std::fs::metadata(path)?;
    let modified = meta.modified()?;
    let earliest = match meta.created() {
        Ok(created) => created.min(modified),
        Err(_) => modified,
    };
    let secs = DateTime::<Utc>::from(earliest).timestamp();
    Ok(DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH))
}

// ============================================================================
// TESTS
// ============================================================================
