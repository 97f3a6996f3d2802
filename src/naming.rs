//! Centralized filename conventions for stored images.
//!
//! Identity and width are encoded directly in the filename so the storage
//! directories are the only source needed to rebuild the index at startup:
//!
//! - originals: `{uuid}_original.{ext}` → `0b9c…5a6b_original.jpeg`
//! - variants:  `{uuid}_{width}.{ext}`  → `0b9c…5a6b_800.jpeg`
//!
//! Image references handed out to readers follow the same shape without the
//! extension: `{uuid}_{width}` for a sized rendition, or a bare `{uuid}`.

use crate::imaging::ImageFormat;
use uuid::Uuid;

/// Marker used in place of a width for original files.
pub const ORIGINAL_MARKER: &str = "original";

/// What a stored file represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredKind {
    Original,
    /// Resized rendition at the given target width.
    Variant(u32),
}

/// Result of parsing a stored filename like `{uuid}_800.png`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredName {
    pub id: Uuid,
    pub kind: StoredKind,
    /// Extension as found on disk (not validated against the file content).
    pub extension: String,
}

pub fn original_file_name(id: Uuid, format: ImageFormat) -> String {
    format!("{}_{}.{}", id, ORIGINAL_MARKER, format.extension())
}

pub fn variant_file_name(id: Uuid, width: u32, format: ImageFormat) -> String {
    format!("{}_{}.{}", id, width, format.extension())
}

/// Parse a stored filename.
///
/// Handles these patterns:
/// - `"{uuid}_original.jpeg"` → kind=Original, extension="jpeg"
/// - `"{uuid}_800.png"` → kind=Variant(800), extension="png"
///
/// Returns `None` for anything else: missing extension, more than one `_`,
/// a non-UUID prefix, or a width that is not a positive integer.
pub fn parse_stored_name(name: &str) -> Option<StoredName> {
    let (stem, extension) = name.rsplit_once('.')?;
    if extension.is_empty() {
        return None;
    }
    let (id, suffix) = split_reference(stem)?;
    let kind = if suffix == ORIGINAL_MARKER {
        StoredKind::Original
    } else {
        StoredKind::Variant(parse_width(suffix)?)
    };
    Some(StoredName {
        id,
        kind,
        extension: extension.to_string(),
    })
}

/// A reader-facing image reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRef {
    pub id: Uuid,
    /// Requested width; `None` asks for the original.
    pub width: Option<u32>,
}

/// Parse `"{uuid}_{width}"` or a bare `"{uuid}"`.
pub fn parse_image_ref(reference: &str) -> Option<ImageRef> {
    if !reference.contains('_') {
        let id = Uuid::parse_str(reference).ok()?;
        return Some(ImageRef { id, width: None });
    }
    let (id, suffix) = split_reference(reference)?;
    Some(ImageRef {
        id,
        width: Some(parse_width(suffix)?),
    })
}

/// Split `{uuid}_{suffix}`, requiring exactly one separator.
fn split_reference(stem: &str) -> Option<(Uuid, &str)> {
    let (id, suffix) = stem.split_once('_')?;
    if suffix.is_empty() || suffix.contains('_') {
        return None;
    }
    let id = Uuid::parse_str(id).ok()?;
    Some((id, suffix))
}

fn parse_width(s: &str) -> Option<u32> {
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u32>().ok().filter(|&w| w > 0)
}
