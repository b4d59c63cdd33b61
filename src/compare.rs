//! Byte-exact duplicate detection.
//!
//! Two files are duplicates iff their sizes match, their capture
//! timestamps don't contradict, and their full contents are identical.
//! The content check is a direct buffered comparison rather than a
//! hash: archive files get read in their entirety anyway, and exact
//! equality leaves no room for false positives.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::error::{Error, Result};
use crate::metadata::{Capture, MetadataProvider};

const BUF_SIZE: usize = 64 * 1024;

/// Decide whether `candidate` (already in the archive) is a true
/// duplicate of `source`.
///
/// Cheap rejections first: differing sizes, then a differing capture
/// timestamp on the candidate (when one is available). Only then are
/// the bytes compared.
///
/// # Errors
/// Returns an error naming whichever file could not be read.
pub fn is_duplicate(
    source: &Path,
    source_capture: &Capture,
    candidate: &Path,
    provider: &MetadataProvider,
) -> Result<bool> {
    let source_len = fs::metadata(source).map_err(|e| Error::io(source, e))?.len();
    let candidate_len = fs::metadata(candidate)
        .map_err(|e| Error::io(candidate, e))?
        .len();
    if source_len != candidate_len {
        return Ok(false);
    }

    if let Ok(candidate_capture) = provider.capture_time_quiet(candidate) {
        if candidate_capture.time != source_capture.time {
            return Ok(false);
        }
    }

    same_contents(source, candidate)
}

/// Full byte-for-byte comparison of two files.
///
/// # Errors
/// Returns an error naming whichever file could not be read.
pub fn same_contents(a: &Path, b: &Path) -> Result<bool> {
    let mut reader_a = BufReader::new(File::open(a).map_err(|e| Error::io(a, e))?);
    let mut reader_b = BufReader::new(File::open(b).map_err(|e| Error::io(b, e))?);

    let mut buf_a = vec![0u8; BUF_SIZE];
    let mut buf_b = vec![0u8; BUF_SIZE];

    loop {
        let n_a = read_full(&mut reader_a, &mut buf_a).map_err(|e| Error::io(a, e))?;
        let n_b = read_full(&mut reader_b, &mut buf_b).map_err(|e| Error::io(b, e))?;
        if n_a != n_b || buf_a[..n_a] != buf_b[..n_b] {
            return Ok(false);
        }
        if n_a == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buf` as far as possible, short only at end of file.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

// ============================================================================
// TESTS
// ============================================================================
