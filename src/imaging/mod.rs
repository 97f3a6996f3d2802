//! Image processing on top of the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `ImageReader::with_guessed_format` + `into_dimensions` |
//! | **Decode** | `ImageReader::decode` (JPEG, PNG, GIF only) |
//! | **Resize** | Lanczos3 `resize_exact` |
//! | **Encode** | same format as the source; JPEG at the configured quality |
//!
//! The module is split into:
//! - **Format**: The [`ImageFormat`] whitelist and content-type mapping
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
mod format;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Decoded, Dimensions, Identified, ImageBackend};
pub use calculations::calculate_variant_dimensions;
pub use format::{ImageFormat, UnsupportedFormat, validate_format};
pub use params::{EncodeParams, Quality, ResizeParams};
pub use rust_backend::RustBackend;
