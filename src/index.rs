//! In-memory variant index.
//!
//! Maps an image UUID to its original and the set of resized variants. The
//! index is a cache of what is on disk: it is rebuilt at startup by
//! [`VariantIndex::recover`](crate::recovery) and updated by the processor as
//! files are written. Pixel work never happens under the lock.

use crate::imaging::{Dimensions, ImageFormat};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use uuid::Uuid;

/// A resized rendition of an original.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variant {
    /// The target width this variant was generated for. This is the lookup key,
    /// even when the rendition was capped to a narrower source.
    pub width: u32,
    /// Pixel size actually written.
    pub dimensions: Dimensions,
    pub path: PathBuf,
    pub format: ImageFormat,
}

/// Everything known about one stored image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMetadata {
    pub id: Uuid,
    pub format: ImageFormat,
    pub original_path: PathBuf,
    pub dimensions: Dimensions,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
    /// Keyed by target width; at most one variant per width.
    pub variants: BTreeMap<u32, Variant>,
}

impl ImageMetadata {
    /// Build a record with no variants for an original already on disk,
    /// reading size and mtime from the file.
    pub fn for_stored_original(
        id: Uuid,
        path: PathBuf,
        format: ImageFormat,
        dimensions: Dimensions,
    ) -> std::io::Result<Self> {
        let meta = std::fs::metadata(&path)?;
        let modified = meta.modified().map(DateTime::<Utc>::from)?;
        Ok(Self {
            id,
            format,
            original_path: path,
            dimensions,
            size_bytes: meta.len(),
            modified,
            variants: BTreeMap::new(),
        })
    }

    pub fn variant_widths(&self) -> Vec<u32> {
        self.variants.keys().copied().collect()
    }

    /// Exact match for `requested`, otherwise the nearest width.
    pub fn closest_variant(&self, requested: u32) -> Option<&Variant> {
        let width = closest_width(self.variants.keys().copied(), requested)?;
        self.variants.get(&width)
    }
}

/// Pick the width with the smallest distance to `requested`.
///
/// Ties go to the smaller width. Widths must be supplied in ascending order for
/// that to hold, which a `BTreeMap` key iterator guarantees.
pub fn closest_width(widths: impl IntoIterator<Item = u32>, requested: u32) -> Option<u32> {
    widths.into_iter().min_by_key(|w| w.abs_diff(requested))
}

/// Thread-safe map from image UUID to [`ImageMetadata`].
#[derive(Debug, Default)]
pub struct VariantIndex {
    images: RwLock<HashMap<Uuid, ImageMetadata>>,
}

impl VariantIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `metadata.id`.
    pub fn put(&self, metadata: ImageMetadata) {
        self.images.write().insert(metadata.id, metadata);
    }

    /// Attach a variant to an existing record, overwriting any previous
    /// variant at the same width. Returns `false` (and does nothing) when the
    /// UUID is unknown.
    pub fn put_variant(&self, id: Uuid, variant: Variant) -> bool {
        match self.images.write().get_mut(&id) {
            Some(metadata) => {
                metadata.variants.insert(variant.width, variant);
                true
            }
            None => false,
        }
    }

    /// Snapshot of one record.
    pub fn get(&self, id: &Uuid) -> Option<ImageMetadata> {
        self.images.read().get(id).cloned()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.images.read().contains_key(id)
    }

    pub fn closest_variant(&self, id: &Uuid, requested: u32) -> Option<Variant> {
        self.images
            .read()
            .get(id)?
            .closest_variant(requested)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.images.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.read().is_empty()
    }

    pub fn variant_count(&self) -> usize {
        self.images.read().values().map(|m| m.variants.len()).sum()
    }

    /// All ids, sorted, for stable output.
    pub fn ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.images.read().keys().copied().collect();
        ids.sort();
        ids
    }
}
