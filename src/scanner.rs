//! Source directory scanning.
//!
//! Walks the source tree and classifies each file by extension:
//! recognized media goes to the engine, known sidecar/metadata files
//! are silently ignored, everything else is reported as unrecognized
//! and skipped.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Media extensions the archive accepts (compared case-insensitively).
pub const RECOGNIZED_EXTENSIONS: &[&str] = &[
    "AAE", "AVI", "GIF", "HEIC", "JPEG", "JPG", "MOV", "MP4", "PNG", "TIF", "TIFF", "WEBP",
];

/// Extensions that are expected on a camera card but are not media:
/// catalog files, thumbnails, sidecar metadata, and our own cache.
/// Not errors, not reported.
pub const IGNORED_EXTENSIONS: &[&str] = &["CTG", "DS_STORE", "JSON", "THM"];

/// Classification of one file found in the source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// On the media allow-list; will be ingested.
    Recognized,
    /// On the explicit ignore list; skipped silently.
    Ignored,
    /// Neither; reported as skipped.
    Unrecognized,
}

/// A file discovered in the source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub kind: MediaKind,
}

/// Classify a filename by its extension (text after the last dot).
pub fn classify(filename: &str) -> MediaKind {
    let extension = match filename.rfind('.') {
        Some(pos) => filename[pos + 1..].to_ascii_uppercase(),
        None => return MediaKind::Unrecognized,
    };

    if RECOGNIZED_EXTENSIONS.contains(&extension.as_str()) {
        MediaKind::Recognized
    } else if IGNORED_EXTENSIONS.contains(&extension.as_str()) {
        MediaKind::Ignored
    } else {
        MediaKind::Unrecognized
    }
}

/// Walk the source tree and classify every file, in a stable order.
///
/// # Errors
/// Returns an error if the root directory cannot be read. Unreadable
/// entries deeper in the tree are skipped.
pub fn scan_source(root: &Path) -> io::Result<Vec<SourceFile>> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("not a directory: {}", root.display()),
        ));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let filename = match entry.file_name().to_str() {
            Some(name) => name,
            None => continue,
        };
        files.push(SourceFile {
            path: entry.path().to_path_buf(),
            kind: classify(filename),
        });
    }
    Ok(files)
}

// ============================================================================
// TESTS
// ============================================================================
