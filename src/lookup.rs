//! Resolve reader-facing image references to files on disk.
//!
//! A reference is `{uuid}_{width}` or a bare `{uuid}`. A width request is
//! answered with the exact variant when it exists, otherwise the variant
//! whose width is nearest. While no variant exists yet the original is
//! served, so a freshly created thread still renders.

use crate::imaging::{Dimensions, ImageFormat};
use crate::index::VariantIndex;
use crate::naming;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Stored files never change once written.
pub const CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LookupError {
    #[error("invalid image reference: {0}")]
    InvalidReference(String),
    #[error("image not found: {0}")]
    NotFound(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Rendition {
    Original,
    /// Variant keyed by this target width.
    Variant(u32),
}

/// A file ready to be streamed to a reader.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServedImage {
    pub id: Uuid,
    pub rendition: Rendition,
    pub path: PathBuf,
    pub format: ImageFormat,
    pub dimensions: Dimensions,
}

impl ServedImage {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    pub fn cache_control(&self) -> &'static str {
        CACHE_CONTROL
    }
}

impl VariantIndex {
    pub fn resolve(&self, reference: &str) -> Result<ServedImage, LookupError> {
        let parsed = naming::parse_image_ref(reference)
            .ok_or_else(|| LookupError::InvalidReference(reference.to_string()))?;
        let metadata = self
            .get(&parsed.id)
            .ok_or(LookupError::NotFound(parsed.id))?;

        let variant = parsed.width.and_then(|w| metadata.closest_variant(w));
        Ok(match variant {
            Some(v) => ServedImage {
                id: metadata.id,
                rendition: Rendition::Variant(v.width),
                path: v.path.clone(),
                format: v.format,
                dimensions: v.dimensions,
            },
            None => ServedImage {
                id: metadata.id,
                rendition: Rendition::Original,
                path: metadata.original_path.clone(),
                format: metadata.format,
                dimensions: metadata.dimensions,
            },
        })
    }
}
