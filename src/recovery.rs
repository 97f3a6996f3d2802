//! Startup recovery: rebuild the [`VariantIndex`] from the storage directories.
//!
//! The filesystem is the source of truth. Recovery makes two passes, originals
//! first and variants second, so directory listing order never matters:
//!
//! ```text
//! data/img/original/{uuid}_original.{ext}   → one ImageMetadata per file
//! data/img/variant/{uuid}_{width}.{ext}     → attached to the matching original
//! ```
//!
//! A single bad file never aborts recovery. Malformed names, undecodable
//! files, non-whitelisted formats and variants without an original are logged,
//! counted, and skipped. Only a missing storage directory is fatal.
//!
//! Running recovery twice over the same directories yields the same index.

use crate::config::StorageConfig;
use crate::imaging::{BackendError, ImageBackend, ImageFormat};
use crate::index::{ImageMetadata, Variant, VariantIndex};
use crate::naming::{self, StoredKind};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("storage directory missing: {0}")]
    MissingDirectory(PathBuf),
}

/// Why a file was left out of the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum SkipReason {
    /// Name does not follow the storage naming convention.
    MalformedName,
    /// A name describing the wrong kind for its directory, like a variant
    /// filename sitting among originals.
    Misplaced,
    Unreadable(String),
    UnsupportedFormat(String),
    /// Variant whose UUID has no recovered original.
    OrphanVariant,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MalformedName => f.write_str("malformed name"),
            SkipReason::Misplaced => f.write_str("wrong directory"),
            SkipReason::Unreadable(e) => write!(f, "unreadable: {e}"),
            SkipReason::UnsupportedFormat(e) => write!(f, "{e}"),
            SkipReason::OrphanVariant => f.write_str("no matching original"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Diagnostics from one recovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub originals_seen: usize,
    pub originals_recovered: usize,
    pub variants_seen: usize,
    pub variants_recovered: usize,
    /// Recovered files whose extension names a different format than their
    /// content. The content wins.
    pub extension_mismatches: usize,
    pub skipped: Vec<SkippedFile>,
}

impl RecoveryReport {
    pub fn files_seen(&self) -> usize {
        self.originals_seen + self.variants_seen
    }

    pub fn files_recovered(&self) -> usize {
        self.originals_recovered + self.variants_recovered
    }

    fn skip(&mut self, path: PathBuf, reason: SkipReason) {
        warn!(path = %path.display(), %reason, "skipping stored file");
        self.skipped.push(SkippedFile { path, reason });
    }

    fn check_extension(&mut self, path: &Path, extension: &str, sniffed: ImageFormat) {
        if ImageFormat::from_extension(extension) != Some(sniffed) {
            warn!(path = %path.display(), extension, %sniffed, "extension does not match content");
            self.extension_mismatches += 1;
        }
    }
}

fn skip_reason(err: BackendError) -> SkipReason {
    match err {
        BackendError::UnsupportedFormat(e) => SkipReason::UnsupportedFormat(e.to_string()),
        other => SkipReason::Unreadable(other.to_string()),
    }
}

/// List regular files directly inside `dir`, sorted by name.
///
/// Entries that cannot be read are reported through `on_error` rather than
/// ending the listing.
fn list_files(
    dir: &Path,
    mut on_error: impl FnMut(PathBuf, String),
) -> Result<Vec<PathBuf>, RecoveryError> {
    if !dir.is_dir() {
        return Err(RecoveryError::MissingDirectory(dir.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(entry) => debug!(path = %entry.path().display(), "ignoring non-file entry"),
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                on_error(path, e.to_string());
            }
        }
    }
    Ok(files)
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

impl VariantIndex {
    /// Rebuild index entries from the storage directories.
    ///
    /// Records found on disk replace any in-memory record with the same UUID.
    pub fn recover<B: ImageBackend + ?Sized>(
        &self,
        storage: &StorageConfig,
        backend: &B,
    ) -> Result<RecoveryReport, RecoveryError> {
        let mut report = RecoveryReport::default();
        let mut listing_errors = Vec::new();

        let originals = list_files(&storage.original_dir, |p, e| listing_errors.push((p, e)))?;
        let variants = list_files(&storage.variant_dir, |p, e| listing_errors.push((p, e)))?;
        for (path, err) in listing_errors {
            report.skip(path, SkipReason::Unreadable(err));
        }

        report.originals_seen = originals.len();
        for path in originals {
            let Some(name) = naming::parse_stored_name(file_name(&path)) else {
                report.skip(path, SkipReason::MalformedName);
                continue;
            };
            if name.kind != StoredKind::Original {
                report.skip(path, SkipReason::Misplaced);
                continue;
            }
            let identified = match backend.identify(&path) {
                Ok(identified) => identified,
                Err(e) => {
                    report.skip(path, skip_reason(e));
                    continue;
                }
            };
            report.check_extension(&path, &name.extension, identified.format);
            match ImageMetadata::for_stored_original(
                name.id,
                path.clone(),
                identified.format,
                identified.dimensions,
            ) {
                Ok(metadata) => {
                    self.put(metadata);
                    report.originals_recovered += 1;
                }
                Err(e) => report.skip(path, SkipReason::Unreadable(e.to_string())),
            }
        }

        report.variants_seen = variants.len();
        for path in variants {
            let Some(name) = naming::parse_stored_name(file_name(&path)) else {
                report.skip(path, SkipReason::MalformedName);
                continue;
            };
            let StoredKind::Variant(width) = name.kind else {
                report.skip(path, SkipReason::Misplaced);
                continue;
            };
            if !self.contains(&name.id) {
                report.skip(path, SkipReason::OrphanVariant);
                continue;
            }
            let identified = match backend.identify(&path) {
                Ok(identified) => identified,
                Err(e) => {
                    report.skip(path, skip_reason(e));
                    continue;
                }
            };
            report.check_extension(&path, &name.extension, identified.format);
            let variant = Variant {
                width,
                dimensions: identified.dimensions,
                path,
                format: identified.format,
            };
            if self.put_variant(name.id, variant) {
                report.variants_recovered += 1;
            }
        }

        info!(
            originals = report.originals_recovered,
            variants = report.variants_recovered,
            seen = report.files_seen(),
            skipped = report.skipped.len(),
            "recovered image index"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{Dimensions, ImageFormat, RustBackend};
    use crate::test_helpers::*;
    use uuid::Uuid;

    fn stored_original(storage: &StorageConfig, w: u32, h: u32) -> Uuid {
        let id = Uuid::new_v4();
        write_test_jpeg(&storage.original_path(id, ImageFormat::Jpeg), w, h);
        id
    }

    #[test]
    fn recovers_originals_and_variants() {
        let (_tmp, storage) = temp_storage();
        let id = stored_original(&storage, 1000, 800);
        write_test_jpeg(&storage.variant_path(id, 600, ImageFormat::Jpeg), 600, 480);
        write_test_jpeg(&storage.variant_path(id, 800, ImageFormat::Jpeg), 800, 640);

        let index = VariantIndex::new();
        let report = index.recover(&storage, &RustBackend::new()).unwrap();

        assert_eq!(report.originals_recovered, 1);
        assert_eq!(report.variants_recovered, 2);
        assert!(report.skipped.is_empty());

        let metadata = index.get(&id).unwrap();
        assert_eq!(metadata.format, ImageFormat::Jpeg);
        assert_eq!(metadata.dimensions, Dimensions::from((1000, 800)));
        assert!(metadata.size_bytes > 0);
        assert_eq!(metadata.variant_widths(), vec![600, 800]);
        assert_eq!(metadata.variants[&800].dimensions, Dimensions::from((800, 640)));
    }

    #[test]
    fn skips_bad_files_without_aborting() {
        let (_tmp, storage) = temp_storage();
        let good = stored_original(&storage, 300, 200);

        std::fs::write(storage.original_dir.join("notes.txt"), b"hi").unwrap();
        let broken = Uuid::new_v4();
        std::fs::write(storage.original_path(broken, ImageFormat::Png), b"garbage").unwrap();
        let orphan = Uuid::new_v4();
        write_test_jpeg(&storage.variant_path(orphan, 600, ImageFormat::Jpeg), 60, 40);
        write_test_jpeg(&storage.variant_dir.join(format!("{good}_original.jpeg")), 10, 10);

        let index = VariantIndex::new();
        let report = index.recover(&storage, &RustBackend::new()).unwrap();

        assert_eq!(report.originals_seen, 3);
        assert_eq!(report.originals_recovered, 1);
        assert_eq!(report.variants_seen, 2);
        assert_eq!(report.variants_recovered, 0);
        assert_eq!(report.files_seen() - report.files_recovered(), 4);

        let reasons: Vec<&SkipReason> = report.skipped.iter().map(|s| &s.reason).collect();
        assert!(reasons.contains(&&SkipReason::MalformedName));
        assert!(reasons.contains(&&SkipReason::OrphanVariant));
        assert!(reasons.contains(&&SkipReason::Misplaced));
        assert!(reasons.iter().any(|r| matches!(r, SkipReason::Unreadable(_))));
        assert!(index.get(&good).is_some());
        assert!(index.get(&broken).is_none());
    }

    #[test]
    fn unsupported_format_is_reported() {
        let (_tmp, storage) = temp_storage();
        let id = Uuid::new_v4();
        write_bmp_magic(&storage.original_dir.join(format!("{id}_original.png")));

        let report = VariantIndex::new()
            .recover(&storage, &RustBackend::new())
            .unwrap();
        assert!(matches!(
            report.skipped[0].reason,
            SkipReason::UnsupportedFormat(_)
        ));
    }

    #[test]
    fn sniffed_format_wins_over_extension() {
        let (_tmp, storage) = temp_storage();
        let id = Uuid::new_v4();
        write_test_png(&storage.original_dir.join(format!("{id}_original.jpeg")), 20, 10);

        let jpg = Uuid::new_v4();
        write_test_jpeg(&storage.original_dir.join(format!("{jpg}_original.jpg")), 20, 10);

        let index = VariantIndex::new();
        let report = index.recover(&storage, &RustBackend::new()).unwrap();
        assert_eq!(index.get(&id).unwrap().format, ImageFormat::Png);
        assert_eq!(index.get(&jpg).unwrap().format, ImageFormat::Jpeg);
        assert_eq!(report.originals_recovered, 2);
        // `.jpg` is a JPEG alias; only the PNG named `.jpeg` is flagged.
        assert_eq!(report.extension_mismatches, 1);
    }

    #[test]
    fn missing_directory_is_fatal() {
        let (tmp, mut storage) = temp_storage();
        storage.variant_dir = tmp.path().join("nope");

        let result = VariantIndex::new().recover(&storage, &RustBackend::new());
        assert!(matches!(result, Err(RecoveryError::MissingDirectory(_))));
    }

    #[test]
    fn recovery_is_idempotent() {
        let (_tmp, storage) = temp_storage();
        let id = stored_original(&storage, 1000, 800);
        write_test_jpeg(&storage.variant_path(id, 600, ImageFormat::Jpeg), 600, 480);

        let index = VariantIndex::new();
        let first = index.recover(&storage, &RustBackend::new()).unwrap();
        let snapshot = index.get(&id).unwrap();
        let second = index.recover(&storage, &RustBackend::new()).unwrap();

        assert_eq!(first, second);
        assert_eq!(index.get(&id).unwrap(), snapshot);
        assert_eq!(index.len(), 1);
    }
}
