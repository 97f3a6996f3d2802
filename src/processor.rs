//! Original and variant persistence.
//!
//! The processor decides *what* gets written (UUID-based names, target widths,
//! the format of each rendition) and delegates pixel work to an
//! [`ImageBackend`]. Every successful write is registered in the shared
//! [`VariantIndex`].
//!
//! ## Output layout
//!
//! ```text
//! {original_dir}/{uuid}_original.{ext}
//! {variant_dir}/{uuid}_600.{ext}
//! {variant_dir}/{uuid}_800.{ext}
//! {variant_dir}/{uuid}_1200.{ext}
//! {variant_dir}/{uuid}_1600.{ext}
//! ```
//!
//! Variants keep the original's format. Widths are independent: a failure at
//! one width is logged and reported, and the others are still written.
//!
//! ## Parallel Processing
//!
//! The widths of one image are resized in parallel using
//! [rayon](https://docs.rs/rayon). Callers on an async runtime should run these
//! methods inside `spawn_blocking`.

use crate::config::{AppConfig, StorageConfig};
use crate::imaging::{
    BackendError, Decoded, EncodeParams, ImageBackend, ImageFormat, Quality, ResizeParams,
    RustBackend, calculate_variant_dimensions,
};
use crate::index::{ImageMetadata, Variant, VariantIndex};
use image::DynamicImage;
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image processing failed: {0}")]
    Imaging(#[from] BackendError),
    #[error("Invalid variant width: {0}")]
    InvalidWidth(u32),
}

impl ProcessError {
    /// True when the input image itself is at fault (undecodable or not on
    /// the whitelist) rather than the server.
    pub fn is_bad_image(&self) -> bool {
        matches!(
            self,
            ProcessError::Imaging(BackendError::Decode(_) | BackendError::UnsupportedFormat(_))
        )
    }
}

/// One width that could not be produced.
#[derive(Debug, Clone, Serialize)]
pub struct VariantFailure {
    pub width: u32,
    pub error: String,
}

/// Outcome of generating all configured widths for one image.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VariantReport {
    pub generated: Vec<Variant>,
    pub failed: Vec<VariantFailure>,
}

impl VariantReport {
    pub fn generated_widths(&self) -> Vec<u32> {
        let mut widths: Vec<u32> = self.generated.iter().map(|v| v.width).collect();
        widths.sort_unstable();
        widths
    }
}

pub struct ImageProcessor<B: ImageBackend = RustBackend> {
    backend: B,
    storage: StorageConfig,
    index: Arc<VariantIndex>,
    widths: Vec<u32>,
    quality: Quality,
}

impl ImageProcessor<RustBackend> {
    pub fn from_config(config: &AppConfig, index: Arc<VariantIndex>) -> Self {
        Self::new(RustBackend::new(), config, index)
    }
}

impl<B: ImageBackend> ImageProcessor<B> {
    pub fn new(backend: B, config: &AppConfig, index: Arc<VariantIndex>) -> Self {
        Self {
            backend,
            storage: config.storage.clone(),
            index,
            widths: config.images.widths.clone(),
            quality: Quality::new(config.images.quality),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    pub fn index(&self) -> &Arc<VariantIndex> {
        &self.index
    }

    pub fn widths(&self) -> &[u32] {
        &self.widths
    }

    /// Sniff and decode `source`, rejecting anything off the whitelist.
    ///
    /// The header is checked first so non-images fail before a full decode.
    pub fn decode(&self, source: &Path) -> Result<Decoded, ProcessError> {
        self.backend.identify(source)?;
        Ok(self.backend.decode(source)?)
    }

    /// Persist a decoded image as the original for `id` and register it.
    ///
    /// Any stale record for `id` is replaced, variants included.
    pub fn save_original(
        &self,
        image: &DynamicImage,
        id: Uuid,
        format: ImageFormat,
    ) -> Result<ImageMetadata, ProcessError> {
        let path = self.storage.original_path(id, format);
        self.backend.encode(
            image,
            &EncodeParams {
                output: path.clone(),
                format,
                quality: self.quality,
            },
        )?;
        let metadata =
            ImageMetadata::for_stored_original(id, path, format, (image.width(), image.height()).into())?;
        self.index.put(metadata.clone());
        info!(%id, %format, width = image.width(), height = image.height(), "saved original");
        Ok(metadata)
    }

    /// Decode `source` and store it as a new original under a fresh UUID.
    pub fn store_original(&self, source: &Path) -> Result<ImageMetadata, ProcessError> {
        let decoded = self.decode(source)?;
        self.save_original(&decoded.image, Uuid::new_v4(), decoded.format)
    }

    /// Resize to `width` (never upscaling), write, and register one variant.
    pub fn save_variant(
        &self,
        id: Uuid,
        image: &DynamicImage,
        width: u32,
        format: ImageFormat,
    ) -> Result<Variant, ProcessError> {
        if width == 0 {
            return Err(ProcessError::InvalidWidth(width));
        }
        let (w, h) = calculate_variant_dimensions((image.width(), image.height()), width);
        let path = self.storage.variant_path(id, width, format);
        self.backend.resize(
            image,
            &ResizeParams {
                output: path.clone(),
                width: w,
                height: h,
                format,
                quality: self.quality,
            },
        )?;
        let variant = Variant {
            width,
            dimensions: (w, h).into(),
            path,
            format,
        };
        if !self.index.put_variant(id, variant.clone()) {
            debug!(%id, width, "variant written for an image missing from the index");
        }
        Ok(variant)
    }

    /// Generate every configured width from `source`.
    ///
    /// Only a failure to read the source is fatal. Per-width failures are
    /// logged and collected in the report.
    pub fn generate_variants(&self, id: Uuid, source: &Path) -> Result<VariantReport, ProcessError> {
        let decoded = self.backend.decode(source)?;

        let results: Vec<(u32, Result<Variant, ProcessError>)> = self
            .widths
            .par_iter()
            .map(|&width| {
                (
                    width,
                    self.save_variant(id, &decoded.image, width, decoded.format),
                )
            })
            .collect();

        let mut report = VariantReport::default();
        for (width, result) in results {
            match result {
                Ok(variant) => report.generated.push(variant),
                Err(e) => {
                    warn!(%id, width, error = %e, "variant generation failed");
                    report.failed.push(VariantFailure {
                        width,
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            %id,
            generated = report.generated.len(),
            failed = report.failed.len(),
            "variants generated"
        );
        Ok(report)
    }
}
