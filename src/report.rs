//! Run-summary formatting.
//!
//! Pure functions — (IngestReport, OutputFormat) → String.

use humansize::{BINARY, format_size};

use crate::types::{IngestReport, OutputFormat};

/// Format an ingestion summary for output.
pub fn format_report(report: &IngestReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Human => format_human(report),
        OutputFormat::Json => format_json(report),
    }
}

// ============================================================================
// HUMAN FORMAT
// ============================================================================

fn format_human(report: &IngestReport) -> String {
    let mut out = String::new();

    if !report.failed.is_empty() {
        out.push_str("=== Failed ===\n");
        for (path, reason) in &report.failed {
            out.push_str(&format!("  {} - {}\n", path.display(), reason));
        }
        out.push('\n');
    }

    out.push_str("=== Summary ===\n");
    out.push_str(&format!("Copied:         {}\n", report.copied));
    out.push_str(&format!("Duplicates:     {}\n", report.duplicates));
    out.push_str(&format!("Already cached: {}\n", report.cached));
    out.push_str(&format!("Ignored:        {}\n", report.ignored));
    out.push_str(&format!("Unrecognized:   {}\n", report.unrecognized));
    if !report.failed.is_empty() {
        out.push_str(&format!("Failed:         {}\n", report.failed.len()));
    }
    out.push_str(&format!(
        "Bytes copied:   {}\n",
        format_size(report.bytes_copied, BINARY)
    ));

    out
}

// ============================================================================
// JSON FORMAT
// ============================================================================

fn format_json(report: &IngestReport) -> String {
    serde_json::to_string_pretty(report)
        .unwrap_or_else(|e| panic!("failed to serialize report to JSON: {}", e))
}

// ============================================================================
// TESTS
// ============================================================================
