//! Filename pattern handling.
//!
//! Pure functions — no I/O, easily testable.

use chrono::NaiveDateTime;

/// Format of the timestamp prefix some upload tools (Dropbox Camera
/// Uploads) put in filenames: "2021-06-01 10.30.00.jpg".
const UPLOAD_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H.%M.%S";

/// Length of that prefix in bytes (always ASCII).
const UPLOAD_TIMESTAMP_LEN: usize = 19;

/// Normalize a media filename for collision purposes.
///
/// Camera names look like `IMG_1234.JPG`; photo-library software
/// appends secondary numeric suffixes (`IMG_1234_2.JPG`) when exporting
/// edited versions. Those refer to the same logical shot, so the
/// suffixes are stripped: only the first digit group after the letter
/// prefix survives.
///
/// Filenames that don't match `<letters><digits/underscores>.<letters>`
/// are returned unchanged.
///
/// # Examples
/// - `IMG_1234.JPG` → `IMG_1234.JPG`
/// - `IMG_1234_2.JPG` → `IMG_1234.JPG`
/// - `DSC01234.JPG` → `DSC01234.JPG`
/// - `holiday snap.jpg` → `holiday snap.jpg`
pub fn normalize_name(filename: &str) -> String {
    let (stem, ext) = split_filename(filename);

    if ext.is_empty() || !ext.bytes().all(|b| b.is_ascii_alphabetic()) {
        return filename.to_string();
    }
    if !is_camera_stem(stem) {
        return filename.to_string();
    }

    format!("{}.{}", strip_secondary_suffixes(stem), ext)
}

/// Parse a leading upload-tool timestamp out of a filename.
///
/// Returns `None` unless the filename starts with exactly
/// "YYYY-MM-DD HH.MM.SS".
pub fn filename_timestamp(filename: &str) -> Option<NaiveDateTime> {
    if filename.len() < UPLOAD_TIMESTAMP_LEN || !filename.is_char_boundary(UPLOAD_TIMESTAMP_LEN) {
        return None;
    }
    NaiveDateTime::parse_from_str(&filename[..UPLOAD_TIMESTAMP_LEN], UPLOAD_TIMESTAMP_FORMAT).ok()
}

// ============================================================================
// INTERNAL
// ============================================================================

/// Split filename into stem and extension.
/// "foo.txt" → ("foo", "txt"), "foo" → ("foo", "")
fn split_filename(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos + 1..]),
        _ => (filename, ""),
    }
}

/// True if the stem is ASCII letters followed by at least one digit or
/// underscore, with nothing else.
fn is_camera_stem(stem: &str) -> bool {
    let letters = stem
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(stem.len());
    if letters == 0 || letters == stem.len() {
        return false;
    }
    stem[letters..]
        .bytes()
        .all(|b| b == b'_' || b.is_ascii_digit())
}

/// Strip trailing `_<digits>` groups while the remainder still looks
/// like a camera stem. `IMG_1234_2_3` → `IMG_1234`; `IMG_1234` stays,
/// because stripping its only digit group would leave a bare prefix.
fn strip_secondary_suffixes(stem: &str) -> &str {
    let mut current = stem;
    loop {
        match current.rfind('_') {
            Some(pos)
                if pos + 1 < current.len()
                    && current[pos + 1..].bytes().all(|b| b.is_ascii_digit())
                    && is_camera_stem(&current[..pos]) =>
            {
                current = &current[..pos];
            }
            _ => return current,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
