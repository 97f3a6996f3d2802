//! Service configuration module.
//!
//! Handles loading, validating, and merging the `imgboard.toml` file. A user
//! file only needs the keys it wants to change; everything else falls back to
//! the stock defaults.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [storage]
//! original_dir = "data/img/original"  # {uuid}_original.{ext}
//! variant_dir = "data/img/variant"    # {uuid}_{width}.{ext}
//! temp_dir = "data/img/tmp"           # spooled uploads
//!
//! [images]
//! widths = [600, 800, 1200, 1600]     # Variant target widths
//! quality = 90                        # JPEG quality (1-100)
//!
//! [uploads]
//! max_upload_bytes = 15728640         # 15 MiB
//! max_subject_chars = 100
//! max_body_chars = 2000
//! token_ttl_secs = 3600               # Upload-state entries older than this are swept
//! sweep_interval_secs = 60
//!
//! [processing]
//! max_processes = 4                   # CPU threads for resizing (omit for auto = CPU cores)
//! variant_workers = 2                 # Uploads processed concurrently
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::ImageFormat;
use crate::naming;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Service configuration loaded from `imgboard.toml`.
///
/// All fields have sensible defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Directories for originals, variants and spooled uploads.
    pub storage: StorageConfig,
    /// Variant generation settings (widths, quality).
    pub images: ImagesConfig,
    /// Upload limits and upload-state retention.
    pub uploads: UploadsConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl AppConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.images.widths.is_empty() {
            return Err(ConfigError::Validation(
                "images.widths must not be empty".into(),
            ));
        }
        if self.images.widths.contains(&0) {
            return Err(ConfigError::Validation(
                "images.widths values must be non-zero".into(),
            ));
        }
        if !(1..=100).contains(&self.images.quality) {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        if self.uploads.max_upload_bytes == 0 {
            return Err(ConfigError::Validation(
                "uploads.max_upload_bytes must be non-zero".into(),
            ));
        }
        if self.uploads.token_ttl_secs == 0 || self.uploads.sweep_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "uploads.token_ttl_secs and uploads.sweep_interval_secs must be non-zero".into(),
            ));
        }
        if self.processing.variant_workers == 0 {
            return Err(ConfigError::Validation(
                "processing.variant_workers must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// On-disk layout. Filenames inside each directory are content-addressed by
/// image UUID (and width for variants), see [`naming`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub original_dir: PathBuf,
    pub variant_dir: PathBuf,
    pub temp_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            original_dir: PathBuf::from("data/img/original"),
            variant_dir: PathBuf::from("data/img/variant"),
            temp_dir: PathBuf::from("data/img/tmp"),
        }
    }
}

impl StorageConfig {
    /// All three directories rooted under `root`, using the default names.
    pub fn under(root: &Path) -> Self {
        Self {
            original_dir: root.join("original"),
            variant_dir: root.join("variant"),
            temp_dir: root.join("tmp"),
        }
    }

    /// Create any missing storage directory.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.original_dir, &self.variant_dir, &self.temp_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn original_path(&self, id: Uuid, format: ImageFormat) -> PathBuf {
        self.original_dir
            .join(naming::original_file_name(id, format))
    }

    pub fn variant_path(&self, id: Uuid, width: u32, format: ImageFormat) -> PathBuf {
        self.variant_dir
            .join(naming::variant_file_name(id, width, format))
    }
}

/// Variant generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Target widths for resized variants. Order is not significant.
    pub widths: Vec<u32>,
    /// JPEG encoding quality (1 = worst, 100 = best). PNG and GIF are lossless.
    pub quality: u32,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            widths: vec![600, 800, 1200, 1600],
            quality: 90,
        }
    }
}

/// Upload limits and upload-state retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadsConfig {
    /// Byte ceiling for a single uploaded image.
    pub max_upload_bytes: u64,
    /// Maximum thread subject length, in characters.
    pub max_subject_chars: usize,
    /// Maximum thread body length, in characters.
    pub max_body_chars: usize,
    /// Age after which an upload-state entry is swept, regardless of state.
    pub token_ttl_secs: u64,
    /// How often the sweep runs.
    pub sweep_interval_secs: u64,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 15 << 20,
            max_subject_chars: 100,
            max_body_chars: 2000,
            token_ttl_secs: 3600,
            sweep_interval_secs: 60,
        }
    }
}

impl UploadsConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of CPU threads used for resizing.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
    /// Number of variant workers, i.e. uploads whose variants are generated
    /// at the same time. Further uploads queue up.
    pub variant_workers: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_processes: None,
            variant_workers: 2,
        }
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(AppConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<AppConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: AppConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the given file.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `imgboard.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# imgboard configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Storage layout
# ---------------------------------------------------------------------------
[storage]
# Originals are stored as {uuid}_original.{ext}.
original_dir = "data/img/original"

# Resized variants are stored as {uuid}_{width}.{ext}.
variant_dir = "data/img/variant"

# Uploads are spooled here before decoding. Files are removed after processing.
temp_dir = "data/img/tmp"

# ---------------------------------------------------------------------------
# Variant generation
# ---------------------------------------------------------------------------
[images]
# Target widths for resized variants. Sources narrower than a target are
# not upscaled; the variant keeps the source dimensions.
widths = [600, 800, 1200, 1600]

# JPEG encoding quality (1 = worst, 100 = best).
quality = 90

# ---------------------------------------------------------------------------
# Uploads
# ---------------------------------------------------------------------------
[uploads]
# Byte ceiling for one uploaded image (15 MiB).
max_upload_bytes = 15728640

# Thread subject and body limits, in characters.
max_subject_chars = 100
max_body_chars = 2000

# Upload tokens older than this many seconds are forgotten, whatever their state.
token_ttl_secs = 3600

# How often expired upload tokens are swept, in seconds.
sweep_interval_secs = 60

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum CPU threads used for resizing.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# Uploads whose variants are generated concurrently. Others wait in a queue.
variant_workers = 2
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_has_expected_widths() {
        let config = AppConfig::default();
        assert_eq!(config.images.widths, vec![600, 800, 1200, 1600]);
        assert_eq!(config.images.quality, 90);
        assert_eq!(config.uploads.max_upload_bytes, 15 * 1024 * 1024);
    }

    #[test]
    fn default_storage_layout() {
        let storage = StorageConfig::default();
        assert_eq!(storage.original_dir, PathBuf::from("data/img/original"));
        assert_eq!(storage.variant_dir, PathBuf::from("data/img/variant"));
        assert_eq!(storage.temp_dir, PathBuf::from("data/img/tmp"));
    }

    #[test]
    fn storage_paths_follow_naming_convention() {
        let storage = StorageConfig::under(Path::new("/srv/img"));
        let id = Uuid::parse_str("0b9c1f4e-6a43-4a7e-9f57-1c2d3e4f5a6b").unwrap();

        assert_eq!(
            storage.original_path(id, ImageFormat::Jpeg),
            PathBuf::from("/srv/img/original/0b9c1f4e-6a43-4a7e-9f57-1c2d3e4f5a6b_original.jpeg")
        );
        assert_eq!(
            storage.variant_path(id, 800, ImageFormat::Png),
            PathBuf::from("/srv/img/variant/0b9c1f4e-6a43-4a7e-9f57-1c2d3e4f5a6b_800.png")
        );
    }

    #[test]
    fn ensure_dirs_creates_layout() {
        let tmp = TempDir::new().unwrap();
        let storage = StorageConfig::under(&tmp.path().join("img"));
        storage.ensure_dirs().unwrap();
        assert!(storage.original_dir.is_dir());
        assert!(storage.variant_dir.is_dir());
        assert!(storage.temp_dir.is_dir());
    }

    #[test]
    fn effective_threads_auto() {
        let config = ProcessingConfig {
            max_processes: None,
            variant_workers: 2,
        };
        let threads = effective_threads(&config);
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(threads, cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
            variant_workers: 2,
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn parse_partial_config_keeps_other_defaults() {
        let toml = r#"
[uploads]
max_subject_chars = 40
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.uploads.max_subject_chars, 40);
        assert_eq!(config.uploads.max_body_chars, 2000);
        assert_eq!(config.images.widths, vec![600, 800, 1200, 1600]);
    }

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str(
            r#"
[images]
widths = [600, 800]
quality = 90
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[images]
quality = 70
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let images = merged.get("images").unwrap();
        assert_eq!(images.get("quality").unwrap().as_integer(), Some(70));
        assert_eq!(images.get("widths").unwrap().as_array().unwrap().len(), 2);
    }

    #[test]
    fn merge_toml_array_replaces_wholesale() {
        let base: toml::Value = toml::from_str(r#"widths = [600, 800, 1200]"#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"widths = [320]"#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("widths").unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn unknown_key_rejected() {
        let toml_str = r#"
[images]
qualty = 90
"#;
        let result: Result<AppConfig, _> = toml::from_str(toml_str);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown field"));
    }

    #[test]
    fn unknown_section_rejected() {
        let toml_str = r#"
[imagez]
quality = 90
"#;
        let result: Result<AppConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn validate_default_config_passes() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_width() {
        let mut config = AppConfig::default();
        config.images.widths = vec![600, 0];
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_rejects_empty_widths() {
        let mut config = AppConfig::default();
        config.images.widths.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_rejects_quality_out_of_range() {
        let mut config = AppConfig::default();
        config.images.quality = 0;
        assert!(config.validate().is_err());
        config.images.quality = 101;
        assert!(config.validate().is_err());
        config.images.quality = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = AppConfig::default();
        config.processing.variant_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_config_missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("imgboard.toml")).unwrap();
        assert_eq!(config.images.widths, vec![600, 800, 1200, 1600]);
    }

    #[test]
    fn load_config_merges_and_validates() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("imgboard.toml");
        fs::write(
            &path,
            r#"
[storage]
original_dir = "/var/lib/imgboard/original"

[images]
widths = [320, 640]
"#,
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(
            config.storage.original_dir,
            PathBuf::from("/var/lib/imgboard/original")
        );
        assert_eq!(config.storage.variant_dir, PathBuf::from("data/img/variant"));
        assert_eq!(config.images.widths, vec![320, 640]);

        fs::write(&path, "[images]\nquality = 0\n").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let content = stock_config_toml();
        let config: AppConfig = toml::from_str(content).unwrap();
        let defaults = AppConfig::default();
        assert_eq!(config.storage, defaults.storage);
        assert_eq!(config.images.widths, defaults.images.widths);
        assert_eq!(config.uploads.max_upload_bytes, defaults.uploads.max_upload_bytes);
        assert_eq!(config.uploads.token_ttl_secs, 3600);
        assert_eq!(config.processing.max_processes, None);
        assert_eq!(config.processing.variant_workers, 2);
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value();
        assert!(val.get("storage").is_some());
        assert!(val.get("images").is_some());
        assert!(val.get("uploads").is_some());
        assert!(val.get("processing").is_some());
    }
}
