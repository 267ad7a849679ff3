//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which decides what renditions to create) and the [`backend`](super::backend)
//! (which does the actual pixel work). This separation allows swapping backends
//! (e.g. for testing with a mock) without changing operation logic.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality factor in (0, 1]. Clamped on construction.
//! - [`OutputFormat`]: WebP (preferred) or JPEG (fallback).
//! - [`Enhancement`]: Cosmetic contrast/brightness nudge applied after resampling.
//! - [`CompressParams`]: Everything one compress needs: target dimensions, quality, format.

use serde::{Deserialize, Serialize};

/// Smallest quality factor a caller can ask for.
const MIN_QUALITY: f32 = 0.01;

/// Quality factor for lossy image encoding, in (0, 1].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(f32);

impl Quality {
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self::default();
        }
        Self(value.clamp(MIN_QUALITY, 1.0))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// Quality on the 1–100 scale used by most encoders.
    pub fn percent(self) -> u8 {
        (self.0 * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(0.92)
    }
}

/// Encoded output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    WebP,
    Jpeg,
}

impl OutputFormat {
    /// File extension used in stored object names.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::WebP => "webp",
            OutputFormat::Jpeg => "jpg",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::WebP => "image/webp",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Contrast/brightness nudge applied after resampling. Purely cosmetic.
///
/// - `contrast`: passed to `adjust_contrast` (positive = more contrast)
/// - `brightness`: added to every channel (positive = brighter)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Enhancement {
    pub contrast: f32,
    pub brightness: i32,
}

impl Enhancement {
    /// Barely visible lift used for listing photos.
    pub fn subtle() -> Self {
        Self {
            contrast: 2.0,
            brightness: 1,
        }
    }
}

/// Parameters for a single resize + encode.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressParams {
    /// Final output dimensions (already fitted to the bounding box).
    pub width: u32,
    pub height: u32,
    pub quality: Quality,
    pub format: OutputFormat,
    pub enhancement: Option<Enhancement>,
}
