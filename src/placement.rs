//! Collision-safe placement inside the archive.
//!
//! Archive layout: `root/YYYY/MM/DD/<roll>/<filename>`, where the roll
//! is a base-26 letter code (`A, B, .., Z, AA, AB, ..`). Rolls only
//! multiply when two different files with the same normalized name land
//! on the same date; the first empty or duplicate-matching roll wins,
//! and rolls are never reused or compacted.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::compare;
use crate::error::{Error, Result};
use crate::metadata::{Capture, MetadataProvider};

/// Ceiling on the roll search. Two same-named, same-day, distinct files
/// per roll code is already unusual; hitting this means something is
/// badly wrong with the source.
pub const MAX_ROLLS: u32 = 999;

/// Where a file should go, and whether it is already there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Destination path (free slot, or the duplicate's existing path).
    pub dest: PathBuf,
    /// True if an archived file with identical content was found; no
    /// copy should be performed.
    pub duplicate: bool,
}

/// Base-26 alphabetic roll code for an index.
///
/// `0 → A`, `25 → Z`, `26 → AA`, `702 → AAA`.
pub fn roll_code(index: u32) -> String {
    let mut n = i64::from(index);
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (n % 26) as u8);
        n = n / 26 - 1;
        if n < 0 {
            break;
        }
    }
    letters.into_iter().rev().map(char::from).collect()
}

/// Date-bucket directory for a capture date: `root/YYYY/MM/DD`.
/// Year unpadded, month and day zero-padded.
pub fn date_dir(root: &Path, date: NaiveDate) -> PathBuf {
    use chrono::Datelike;
    root.join(format!("{}", date.year()))
        .join(format!("{:02}", date.month()))
        .join(format!("{:02}", date.day()))
}

/// Search the date bucket's rolls for a home for `source`.
///
/// For each roll index in order: a missing candidate path is a free
/// slot (stop, not a duplicate); an existing candidate that is
/// byte-identical is a true duplicate (stop, no copy); anything else is
/// a name collision (next roll).
///
/// # Errors
/// Returns `RollsExhausted` past [`MAX_ROLLS`] attempts, or an I/O
/// error naming the file that could not be read during comparison.
pub fn resolve(
    source: &Path,
    source_capture: &Capture,
    bucket: &Path,
    filename: &str,
    provider: &MetadataProvider,
) -> Result<Placement> {
    for index in 0..MAX_ROLLS {
        let candidate = bucket.join(roll_code(index)).join(filename);
        if !candidate.exists() {
            return Ok(Placement {
                dest: candidate,
                duplicate: false,
            });
        }
        if compare::is_duplicate(source, source_capture, &candidate, provider)? {
            return Ok(Placement {
                dest: candidate,
                duplicate: true,
            });
        }
    }
    Err(Error::RollsExhausted {
        bucket: bucket.to_path_buf(),
        limit: MAX_ROLLS,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::CaptureSource;
    use chrono::DateTime;
    use filetime::FileTime;
    use std::fs;
    use tempfile::TempDir;

    fn capture_at(secs: i64) -> Capture {
        Capture {
            time: DateTime::from_timestamp(secs, 0).unwrap(),
            source: CaptureSource::Filesystem,
        }
    }

    fn plant(bucket: &Path, roll: &str, name: &str, content: &[u8], mtime: i64) {
        let dir = bucket.join(roll);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
    }

    // --- roll_code ---

    #[test]
    fn test_roll_code_single_letters() {
        assert_eq!(roll_code(0), "A");
        assert_eq!(roll_code(1), "B");
        assert_eq!(roll_code(25), "Z");
    }

    #[test]
    fn test_roll_code_double_letters() {
        assert_eq!(roll_code(26), "AA");
        assert_eq!(roll_code(27), "AB");
        assert_eq!(roll_code(51), "AZ");
        assert_eq!(roll_code(52), "BA");
        assert_eq!(roll_code(701), "ZZ");
    }

    #[test]
    fn test_roll_code_triple_letters() {
        assert_eq!(roll_code(702), "AAA");
    }

    // --- date_dir ---

    #[test]
    fn test_date_dir_zero_padded() {
        let date = NaiveDate::from_ymd_opt(2021, 6, 1).unwrap();
        assert_eq!(
            date_dir(Path::new("/archive"), date),
            PathBuf::from("/archive/2021/06/01")
        );
    }

    #[test]
    fn test_date_dir_year_unpadded() {
        let date = NaiveDate::from_ymd_opt(800, 12, 31).unwrap();
        assert_eq!(
            date_dir(Path::new("/archive"), date),
            PathBuf::from("/archive/800/12/31")
        );
    }

    // --- resolve ---

    #[test]
    fn test_empty_bucket_resolves_to_roll_a() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("IMG_0001.JPG");
        fs::write(&source, b"fresh").unwrap();
        let bucket = dir.path().join("bucket");

        let placement = resolve(
            &source,
            &capture_at(1000),
            &bucket,
            "IMG_0001.JPG",
            &MetadataProvider::new(),
        )
        .unwrap();

        assert_eq!(placement.dest, bucket.join("A").join("IMG_0001.JPG"));
        assert!(!placement.duplicate);
    }

    #[test]
    fn test_collision_advances_to_next_roll() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("IMG_0001.JPG");
        fs::write(&source, b"00000").unwrap();
        filetime::set_file_mtime(&source, FileTime::from_unix_time(1000, 0)).unwrap();

        let bucket = dir.path().join("bucket");
        // Same name, same size, same timestamp, different bytes.
        plant(&bucket, "A", "IMG_0001.JPG", b"11111", 1000);

        let placement = resolve(
            &source,
            &capture_at(1000),
            &bucket,
            "IMG_0001.JPG",
            &MetadataProvider::new(),
        )
        .unwrap();

        assert_eq!(placement.dest, bucket.join("B").join("IMG_0001.JPG"));
        assert!(!placement.duplicate);
    }

    #[test]
    fn test_duplicate_stops_the_search() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("IMG_0001.JPG");
        fs::write(&source, b"same").unwrap();
        filetime::set_file_mtime(&source, FileTime::from_unix_time(1000, 0)).unwrap();

        let bucket = dir.path().join("bucket");
        plant(&bucket, "A", "IMG_0001.JPG", b"same", 1000);

        let placement = resolve(
            &source,
            &capture_at(1000),
            &bucket,
            "IMG_0001.JPG",
            &MetadataProvider::new(),
        )
        .unwrap();

        assert_eq!(placement.dest, bucket.join("A").join("IMG_0001.JPG"));
        assert!(placement.duplicate);
    }

    #[test]
    fn test_duplicate_in_later_roll_found() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("IMG_0001.JPG");
        fs::write(&source, b"wanted").unwrap();
        filetime::set_file_mtime(&source, FileTime::from_unix_time(1000, 0)).unwrap();

        let bucket = dir.path().join("bucket");
        plant(&bucket, "A", "IMG_0001.JPG", b"other1", 1000);
        plant(&bucket, "B", "IMG_0001.JPG", b"wanted", 1000);

        let placement = resolve(
            &source,
            &capture_at(1000),
            &bucket,
            "IMG_0001.JPG",
            &MetadataProvider::new(),
        )
        .unwrap();

        assert_eq!(placement.dest, bucket.join("B").join("IMG_0001.JPG"));
        assert!(placement.duplicate);
    }
}
