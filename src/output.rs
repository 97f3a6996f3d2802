//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Every entity leads with its identity (image UUID, thread id) on a header
//! line; paths and per-variant details follow as indented context lines, so
//! the output reads as an inventory while still pointing at files on disk.
//!
//! # Output Format
//!
//! ## Recover
//!
//! ```text
//! Recovered 2 originals, 7 variants
//!     Originals: data/img/original (2 of 3 files)
//!     Variants: data/img/variant (7 of 7 files)
//! Skipped
//!     notes.txt: malformed name
//! ```
//!
//! ## Ingest
//!
//! ```text
//! 001 photo.jpg → thread 1 (created)
//!     Image: 0b9c1f4e-6a43-4a7e-9f57-1c2d3e4f5a6b
//!     Upload: succeeded
//!     Original: jpeg 1000x800, 183402 bytes
//!     600px: 600x480
//!     800px: 800x640
//! ```
//!
//! ## Lookup
//!
//! ```text
//! 0b9c1f4e-6a43-4a7e-9f57-1c2d3e4f5a6b → 800px
//!     Source: data/img/variant/0b9c…_800.jpeg
//!     Content-Type: image/jpeg
//!     Cache-Control: public, max-age=31536000, immutable
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::config::StorageConfig;
use crate::index::ImageMetadata;
use crate::ingest::Outcome;
use crate::lookup::{Rendition, ServedImage};
use crate::recovery::RecoveryReport;
use crate::upload_state::UploadEntry;
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// Lines describing the original and each variant of one image, at `depth`.
fn image_detail_lines(metadata: &ImageMetadata, depth: usize) -> Vec<String> {
    let pad = indent(depth);
    let mut lines = vec![format!(
        "{}Original: {} {}x{}, {} bytes",
        pad,
        metadata.format,
        metadata.dimensions.width,
        metadata.dimensions.height,
        metadata.size_bytes
    )];
    for variant in metadata.variants.values() {
        lines.push(format!(
            "{}{}px: {}x{}",
            pad, variant.width, variant.dimensions.width, variant.dimensions.height
        ));
    }
    lines
}

// ============================================================================
// Recover
// ============================================================================

pub fn format_recovery_report(report: &RecoveryReport, storage: &StorageConfig) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Recovered {}, {}",
            plural(report.originals_recovered, "original"),
            plural(report.variants_recovered, "variant")
        ),
        format!(
            "    Originals: {} ({} of {} files)",
            storage.original_dir.display(),
            report.originals_recovered,
            report.originals_seen
        ),
        format!(
            "    Variants: {} ({} of {} files)",
            storage.variant_dir.display(),
            report.variants_recovered,
            report.variants_seen
        ),
    ];
    if report.extension_mismatches > 0 {
        lines.push(format!(
            "    Extension mismatches: {} (format taken from content)",
            report.extension_mismatches
        ));
    }
    if !report.skipped.is_empty() {
        lines.push("Skipped".to_string());
        for skipped in &report.skipped {
            lines.push(format!(
                "    {}: {}",
                file_label(&skipped.path),
                skipped.reason
            ));
        }
    }
    lines
}

pub fn print_recovery_report(report: &RecoveryReport, storage: &StorageConfig) {
    for line in format_recovery_report(report, storage) {
        println!("{}", line);
    }
}

// ============================================================================
// Ingest
// ============================================================================

/// Format the result of one ingested file.
///
/// `metadata` is the index record once the upload has been processed; it is
/// absent when the submission was redirected to an existing thread.
pub fn format_ingest(
    position: usize,
    file_name: &str,
    outcome: &Outcome,
    entry: Option<&UploadEntry>,
    metadata: Option<&ImageMetadata>,
) -> Vec<String> {
    let kind = match outcome {
        Outcome::Created { .. } => "created",
        Outcome::Existing { .. } => "existing",
    };
    let mut lines = vec![format!(
        "{} {} \u{2192} thread {} ({})",
        format_index(position),
        file_name,
        outcome.thread_id(),
        kind
    )];
    if let Outcome::Created { image_id, .. } = outcome {
        lines.push(format!("    Image: {}", image_id));
    }
    if let Some(entry) = entry {
        lines.push(format!("    Upload: {}", entry.state));
    }
    if let Some(metadata) = metadata {
        lines.extend(image_detail_lines(metadata, 1));
    }
    lines
}

/// Format a failed file: header plus the error as context.
pub fn format_ingest_error(position: usize, file_name: &str, error: &str) -> Vec<String> {
    vec![
        format!("{} {} \u{2192} rejected", format_index(position), file_name),
        format!("    Error: {}", error),
    ]
}

// ============================================================================
// Lookup
// ============================================================================

pub fn format_served(served: &ServedImage, metadata: Option<&ImageMetadata>) -> Vec<String> {
    let rendition = match served.rendition {
        Rendition::Original => "original".to_string(),
        Rendition::Variant(w) => format!("{}px", w),
    };
    let mut lines = vec![
        format!("{} \u{2192} {}", served.id, rendition),
        format!("    Source: {}", served.path.display()),
        format!("    Content-Type: {}", served.content_type()),
        format!("    Cache-Control: {}", served.cache_control()),
    ];
    if let Some(metadata) = metadata {
        lines.push("    Available:".to_string());
        lines.extend(image_detail_lines(metadata, 2));
    }
    lines
}

pub fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}
