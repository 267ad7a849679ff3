//! Pipeline configuration module.
//!
//! Handles loading, validating, and merging `faso-media.toml`. Stock defaults
//! are serialized to a TOML table and the user's file is deep-merged on top,
//! so a config file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [upload]
//! max_file_bytes = 15728640  # 15 MiB ceiling per source file
//! bucket = "listings"        # Object-store bucket
//! folder = ""                # Prefix inside the bucket
//!
//! [variants]
//! format = "webp"            # "webp" or "jpeg"
//! keep_original = true       # Also store a capped full-resolution copy
//! fallback_quality = 0.8     # Last-resort medium when every variant failed
//! enhance = false            # Subtle contrast/brightness lift
//!
//! [variants.thumbnail]
//! max_width = 200
//! max_height = 200
//! quality = 0.85
//!
//! [variants.medium]
//! max_width = 800
//! max_height = 600
//! quality = 0.92
//!
//! [variants.large]
//! max_width = 1600
//! max_height = 1200
//! quality = 0.95
//!
//! [variants.original]
//! max_width = 2400
//! max_height = 2400
//! quality = 0.95
//!
//! [classifier]
//! sample_size = 100          # Downsampled square edge
//! threshold = 30.0           # Mean channel deviation above which an image is "complex"
//! quality_bump = 0.03        # Added to medium/large quality for complex images
//! quality_cap = 0.95
//!
//! [storage]
//! root = "storage"           # Local object-store directory
//! records_dir = "records"    # Local record-store directory
//! public_base_url = "http://localhost:8080/storage/v1/object/public"
//!
//! [display]
//! placeholder = "/placeholder.svg"
//! max_retries = 3
//! lazy_margin_px = 100
//!
//! [processing]
//! max_processes = 4          # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{OutputFormat, Quality};
use crate::variant::VariantLabel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Pipeline configuration loaded from `faso-media.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediaConfig {
    /// Upload validation and destination.
    pub upload: UploadConfig,
    /// Variant ladder and encoding settings.
    pub variants: VariantsConfig,
    /// Complexity classifier tuning.
    pub classifier: ClassifierConfig,
    /// Local storage collaborators.
    pub storage: StorageConfig,
    /// Display resolver settings.
    pub display: DisplayConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl MediaConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upload.max_file_bytes == 0 {
            return Err(ConfigError::Validation(
                "upload.max_file_bytes must be non-zero".into(),
            ));
        }
        if self.upload.bucket.trim().is_empty() {
            return Err(ConfigError::Validation(
                "upload.bucket must not be empty".into(),
            ));
        }
        for label in VariantLabel::ALL {
            let spec = self.variants.spec(label);
            if spec.max_width == 0 || spec.max_height == 0 {
                return Err(ConfigError::Validation(format!(
                    "variants.{label} bounding box values must be non-zero"
                )));
            }
            if !valid_quality(spec.quality) {
                return Err(ConfigError::Validation(format!(
                    "variants.{label}.quality must be in (0, 1]"
                )));
            }
        }
        if !valid_quality(self.variants.fallback_quality) {
            return Err(ConfigError::Validation(
                "variants.fallback_quality must be in (0, 1]".into(),
            ));
        }
        if self.classifier.sample_size == 0 {
            return Err(ConfigError::Validation(
                "classifier.sample_size must be non-zero".into(),
            ));
        }
        if !(0.0..=255.0).contains(&self.classifier.threshold) {
            return Err(ConfigError::Validation(
                "classifier.threshold must be 0-255".into(),
            ));
        }
        if !valid_quality(self.classifier.quality_cap) || self.classifier.quality_bump < 0.0 {
            return Err(ConfigError::Validation(
                "classifier.quality_cap must be in (0, 1] and quality_bump non-negative".into(),
            ));
        }
        if self.display.max_retries == 0 {
            return Err(ConfigError::Validation(
                "display.max_retries must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn valid_quality(q: f32) -> bool {
    q > 0.0 && q <= 1.0
}

/// Upload validation and destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// Largest accepted source file in bytes.
    pub max_file_bytes: u64,
    /// Object-store bucket receiving the variants.
    pub bucket: String,
    /// Prefix inside the bucket (no leading or trailing slash needed).
    pub folder: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 15 * 1024 * 1024,
            bucket: "listings".to_string(),
            folder: String::new(),
        }
    }
}

/// Bounding box and base quality for one rung of the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantSizeConfig {
    pub max_width: u32,
    pub max_height: u32,
    /// Base quality factor in (0, 1].
    pub quality: f32,
}

/// Variant ladder and encoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VariantsConfig {
    pub format: OutputFormat,
    /// Whether to store a capped full-resolution copy.
    pub keep_original: bool,
    /// Quality of the last-resort medium blob.
    pub fallback_quality: f32,
    /// Apply the subtle contrast/brightness lift.
    pub enhance: bool,
    pub thumbnail: VariantSizeConfig,
    pub medium: VariantSizeConfig,
    pub large: VariantSizeConfig,
    pub original: VariantSizeConfig,
}

impl VariantsConfig {
    pub fn spec(&self, label: VariantLabel) -> VariantSizeConfig {
        match label {
            VariantLabel::Thumbnail => self.thumbnail,
            VariantLabel::Medium => self.medium,
            VariantLabel::Large => self.large,
            VariantLabel::Original => self.original,
        }
    }

    pub fn fallback_quality(&self) -> Quality {
        Quality::new(self.fallback_quality)
    }
}

impl Default for VariantsConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::WebP,
            keep_original: true,
            fallback_quality: 0.8,
            enhance: false,
            thumbnail: VariantSizeConfig {
                max_width: 200,
                max_height: 200,
                quality: 0.85,
            },
            medium: VariantSizeConfig {
                max_width: 800,
                max_height: 600,
                quality: 0.92,
            },
            large: VariantSizeConfig {
                max_width: 1600,
                max_height: 1200,
                quality: 0.95,
            },
            original: VariantSizeConfig {
                max_width: 2400,
                max_height: 2400,
                quality: 0.95,
            },
        }
    }
}

/// Complexity classifier tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierConfig {
    /// Edge of the downsampled square inspected by the classifier.
    pub sample_size: u32,
    /// Mean channel deviation (0–255) above which an image is complex.
    pub threshold: f64,
    /// Quality added to medium and large variants of complex images.
    pub quality_bump: f32,
    /// Upper bound for bumped quality.
    pub quality_cap: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            sample_size: 100,
            threshold: 30.0,
            quality_bump: 0.03,
            quality_cap: 0.95,
        }
    }
}

/// Local storage collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory backing the local object store.
    pub root: String,
    /// Directory backing the local record store.
    pub records_dir: String,
    /// URL prefix under which stored objects are publicly served.
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: "storage".to_string(),
            records_dir: "records".to_string(),
            public_base_url: "http://localhost:8080/storage/v1/object/public".to_string(),
        }
    }
}

/// Display resolver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    /// Static path rendered when no image is available.
    pub placeholder: String,
    /// Load failures tolerated before showing the placeholder.
    pub max_retries: u32,
    /// Distance from the viewport at which lazy images start loading.
    pub lazy_margin_px: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            placeholder: "/placeholder.svg".to_string(),
            max_retries: 3,
            lazy_margin_px: 100,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel encoding workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(MediaConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
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
) -> Result<MediaConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: MediaConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the given file, falling back to stock defaults if it is absent.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(path: &Path) -> Result<MediaConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# faso-media configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Upload validation and destination
# ---------------------------------------------------------------------------
[upload]
# Largest accepted source file, in bytes (15 MiB).
max_file_bytes = 15728640

# Object-store bucket receiving the variants.
bucket = "listings"

# Prefix inside the bucket, e.g. "avatars".
folder = ""

# ---------------------------------------------------------------------------
# Variant ladder
# ---------------------------------------------------------------------------
[variants]
# Output format: "webp" (preferred) or "jpeg".
format = "webp"

# Also store a full-resolution copy, still capped by [variants.original].
keep_original = true

# Quality of the single last-resort medium blob produced when every
# requested variant failed to encode.
fallback_quality = 0.8

# Subtle contrast/brightness lift after resampling.
enhance = false

# Each rung: bounding box (never upscaled, never cropped) and base quality.
# Medium and large quality is nudged up for visually complex photos.
[variants.thumbnail]
max_width = 200
max_height = 200
quality = 0.85

[variants.medium]
max_width = 800
max_height = 600
quality = 0.92

[variants.large]
max_width = 1600
max_height = 1200
quality = 0.95

[variants.original]
max_width = 2400
max_height = 2400
quality = 0.95

# ---------------------------------------------------------------------------
# Complexity classifier
# ---------------------------------------------------------------------------
[classifier]
# The source is downsampled to sample_size x sample_size before measuring.
sample_size = 100

# Mean channel deviation (0-255) above which a photo counts as complex.
threshold = 30.0

# Quality added to medium/large variants of complex photos, capped.
quality_bump = 0.03
quality_cap = 0.95

# ---------------------------------------------------------------------------
# Local storage
# ---------------------------------------------------------------------------
[storage]
root = "storage"
records_dir = "records"
public_base_url = "http://localhost:8080/storage/v1/object/public"

# ---------------------------------------------------------------------------
# Display resolver
# ---------------------------------------------------------------------------
[display]
# Static path rendered when no image is available.
placeholder = "/placeholder.svg"

# Load failures tolerated before the "image unavailable" state.
max_retries = 3

# Lazy images start loading this many pixels before entering the viewport.
lazy_margin_px = 100

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel encoding workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
