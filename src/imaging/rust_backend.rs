//! Pure Rust image processing backend built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Sniff format | `ImageReader::with_guessed_format` (magic bytes, never the filename) |
//! | Identify | `ImageReader::into_dimensions` (header only) |
//! | Decode (JPEG, PNG, GIF) | `image` crate pure Rust decoders |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → JPEG | `JpegEncoder::new_with_quality` on an RGB8 copy |
//! | Encode → PNG, GIF | `DynamicImage::write_to` |
//!
//! Decoding yields a single [`DynamicImage`], so an animated GIF keeps only
//! its first frame in both the stored original and every variant.

use super::backend::{BackendError, Decoded, Dimensions, Identified, ImageBackend};
use super::format::{ImageFormat, validate_format};
use super::params::{EncodeParams, ResizeParams};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Open a reader whose format comes from content sniffing only.
fn open_sniffed(path: &Path) -> Result<(ImageReader<BufReader<File>>, ImageFormat), BackendError> {
    let file = File::open(path)?;
    let reader = ImageReader::new(BufReader::new(file)).with_guessed_format()?;
    let detected = reader.format().ok_or_else(|| {
        BackendError::Decode(format!("{}: unrecognized image data", path.display()))
    })?;
    let format = validate_format(detected)?;
    Ok((reader, format))
}

fn write_encoded(
    img: &DynamicImage,
    path: &Path,
    format: ImageFormat,
    quality: u32,
) -> Result<(), BackendError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let encoded = match format {
        ImageFormat::Jpeg => {
            // The JPEG encoder has no alpha channel support.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, quality as u8);
            rgb.write_with_encoder(encoder)
        }
        ImageFormat::Png => img.write_to(&mut writer, format.codec()),
        ImageFormat::Gif => {
            DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut writer, format.codec())
        }
    };
    encoded.map_err(|e| {
        BackendError::ProcessingFailed(format!("{} encode failed: {}", format, e))
    })?;
    writer.flush()?;
    Ok(())
}

/// Encode to `path`, removing whatever was written if encoding fails.
fn save_image(
    img: &DynamicImage,
    path: &Path,
    format: ImageFormat,
    quality: u32,
) -> Result<(), BackendError> {
    let result = write_encoded(img, path, format, quality);
    if result.is_err() {
        let _ = std::fs::remove_file(path);
    }
    result
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Identified, BackendError> {
        let (reader, format) = open_sniffed(path)?;
        let (width, height) = reader.into_dimensions().map_err(|e| {
            BackendError::Decode(format!("Failed to read dimensions: {}", e))
        })?;
        Ok(Identified {
            format,
            dimensions: Dimensions { width, height },
        })
    }

    fn decode(&self, path: &Path) -> Result<Decoded, BackendError> {
        let (reader, format) = open_sniffed(path)?;
        let image = reader.decode().map_err(|e| {
            BackendError::Decode(format!("Failed to decode {}: {}", path.display(), e))
        })?;
        Ok(Decoded { format, image })
    }

    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<(), BackendError> {
        save_image(image, &params.output, params.format, params.quality.value())
    }

    fn resize(&self, image: &DynamicImage, params: &ResizeParams) -> Result<(), BackendError> {
        if params.width == 0 || params.height == 0 {
            return Err(BackendError::ProcessingFailed(format!(
                "invalid resize to {}x{}",
                params.width, params.height
            )));
        }
        if (params.width, params.height) == (image.width(), image.height()) {
            return self.encode(image, &params.encode_params());
        }
        let resized = image.resize_exact(params.width, params.height, FilterType::Lanczos3);
        self.encode(&resized, &params.encode_params())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::params::Quality;
    use crate::test_helpers::{
        gif_frame_count, write_animated_gif, write_bmp_magic, write_test_gif, write_test_jpeg,
        write_test_png,
    };

    #[test]
    fn identify_synthetic_jpeg() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.jpg");
        write_test_jpeg(&path, 200, 150);

        let backend = RustBackend::new();
        let identified = backend.identify(&path).unwrap();
        assert_eq!(identified.format, ImageFormat::Jpeg);
        assert_eq!(identified.dimensions, Dimensions::from((200, 150)));
    }

    #[test]
    fn format_comes_from_content_not_extension() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("actually_png.jpg");
        write_test_png(&path, 40, 30);

        let decoded = RustBackend::new().decode(&path).unwrap();
        assert_eq!(decoded.format, ImageFormat::Png);
        assert_eq!(decoded.dimensions(), Dimensions::from((40, 30)));
    }

    #[test]
    fn identify_nonexistent_file_errors() {
        let backend = RustBackend::new();
        let result = backend.identify(Path::new("/nonexistent/image.jpg"));
        assert!(matches!(result, Err(BackendError::Io(_))));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("garbage.png");
        std::fs::write(&path, b"definitely not an image").unwrap();

        let result = RustBackend::new().decode(&path);
        assert!(matches!(result, Err(BackendError::Decode(_))));
    }

    #[test]
    fn bmp_is_rejected_as_unsupported() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("image.bmp");
        write_bmp_magic(&path);

        let result = RustBackend::new().decode(&path);
        assert!(matches!(result, Err(BackendError::UnsupportedFormat(_))));
    }

    #[test]
    fn animated_gif_keeps_first_frame() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("anim.gif");
        write_animated_gif(&source, 40, 20, 3);
        assert_eq!(gif_frame_count(&source), 3);

        let backend = RustBackend::new();
        let decoded = backend.decode(&source).unwrap();
        assert_eq!(decoded.format, ImageFormat::Gif);
        assert_eq!(decoded.dimensions(), Dimensions::from((40, 20)));

        let output = tmp.path().join("anim_20.gif");
        backend
            .resize(
                &decoded.image,
                &ResizeParams {
                    output: output.clone(),
                    width: 20,
                    height: 10,
                    format: ImageFormat::Gif,
                    quality: Quality::default(),
                },
            )
            .unwrap();
        assert_eq!(gif_frame_count(&output), 1);
    }

    #[test]
    fn resize_each_format_keeps_format() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = RustBackend::new();

        for format in ImageFormat::ALL {
            let source = tmp.path().join(format!("source.{}", format.extension()));
            match format {
                ImageFormat::Jpeg => write_test_jpeg(&source, 400, 300),
                ImageFormat::Png => write_test_png(&source, 400, 300),
                ImageFormat::Gif => write_test_gif(&source, 400, 300),
            }
            let decoded = backend.decode(&source).unwrap();
            let output = tmp.path().join(format!("resized.{}", format.extension()));
            backend
                .resize(
                    &decoded.image,
                    &ResizeParams {
                        output: output.clone(),
                        width: 200,
                        height: 150,
                        format,
                        quality: Quality::new(85),
                    },
                )
                .unwrap();

            let identified = backend.identify(&output).unwrap();
            assert_eq!(identified.format, format);
            assert_eq!(identified.dimensions, Dimensions::from((200, 150)));
        }
    }

    #[test]
    fn resize_to_zero_width_fails_without_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let output = tmp.path().join("zero.png");

        let result = RustBackend::new().resize(
            &DynamicImage::new_rgb8(10, 10),
            &ResizeParams {
                output: output.clone(),
                width: 0,
                height: 0,
                format: ImageFormat::Png,
                quality: Quality::default(),
            },
        );
        assert!(result.is_err());
        assert!(!output.exists());
    }

    #[test]
    fn encode_into_missing_directory_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let output = tmp.path().join("missing").join("out.png");

        let result = RustBackend::new().encode(
            &DynamicImage::new_rgb8(4, 4),
            &EncodeParams {
                output,
                format: ImageFormat::Png,
                quality: Quality::default(),
            },
        );
        assert!(matches!(result, Err(BackendError::Io(_))));
    }
}
