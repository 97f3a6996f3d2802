//! Shared test utilities for the imgboard test suite.
//!
//! Provides synthetic image writers and an isolated on-disk storage layout so
//! unit tests can exercise real encode/decode paths without fixture files.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let (_tmp, storage) = temp_storage();
//! write_test_jpeg(&storage.original_dir.join("x.jpeg"), 1000, 800);
//! ```

use image::{DynamicImage, ImageEncoder, RgbImage};
use std::path::Path;
use tempfile::TempDir;

use crate::config::StorageConfig;

// =========================================================================
// Fixture setup
// =========================================================================

/// Create a temp directory with the three storage directories inside it.
///
/// The `TempDir` must be kept alive for as long as the layout is used.
pub fn temp_storage() -> (TempDir, StorageConfig) {
    let tmp = TempDir::new().unwrap();
    let storage = StorageConfig::under(tmp.path());
    storage.ensure_dirs().unwrap();
    (tmp, storage)
}

// =========================================================================
// Synthetic images
// =========================================================================

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

/// Write a small valid JPEG with the given dimensions.
pub fn write_test_jpeg(path: &Path, width: u32, height: u32) {
    let img = gradient(width, height);
    let file = std::fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    image::codecs::jpeg::JpegEncoder::new(writer)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

pub fn write_test_png(path: &Path, width: u32, height: u32) {
    DynamicImage::ImageRgb8(gradient(width, height))
        .save_with_format(path, image::ImageFormat::Png)
        .unwrap();
}

pub fn write_test_gif(path: &Path, width: u32, height: u32) {
    DynamicImage::ImageRgb8(gradient(width, height))
        .to_rgba8()
        .save_with_format(path, image::ImageFormat::Gif)
        .unwrap();
}

/// Write an animated GIF with `frames` solid-color frames.
pub fn write_animated_gif(path: &Path, width: u32, height: u32, frames: u8) {
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Frame, Rgba, RgbaImage};

    let file = std::fs::File::create(path).unwrap();
    let mut encoder = GifEncoder::new(file);
    let frames = (0..frames).map(|i| {
        let shade = i.wrapping_mul(80);
        Frame::from_parts(
            RgbaImage::from_pixel(width, height, Rgba([shade, 0, 255 - shade, 255])),
            0,
            0,
            Delay::from_numer_denom_ms(100, 1),
        )
    });
    encoder.encode_frames(frames).unwrap();
}

/// Number of frames in a GIF on disk.
pub fn gif_frame_count(path: &Path) -> usize {
    use image::AnimationDecoder;
    use image::codecs::gif::GifDecoder;

    let file = std::io::BufReader::new(std::fs::File::open(path).unwrap());
    GifDecoder::new(file).unwrap().into_frames().count()
}

/// JPEG bytes in memory, for feeding upload readers.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = gradient(width, height);
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    out
}

/// A file that sniffs as BMP. Only the magic bytes matter: the whitelist
/// check runs before any decoding.
pub fn write_bmp_magic(path: &Path) {
    let mut bytes = b"BM".to_vec();
    bytes.extend_from_slice(&[0u8; 62]);
    std::fs::write(path, bytes).unwrap();
}
