//! Shared test utilities for the faso-media test suite.
//!
//! Provides in-memory image fixtures, upload-file builders, and variant-set
//! lookups used across the unit test modules.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let file = upload_file("stall.jpg", "image/jpeg", test_jpeg(64, 48));
//! let set = set_of(&[(VariantLabel::Medium, "m"), (VariantLabel::Large, "l")]);
//! assert_eq!(url_of(&set, VariantLabel::Medium), "m");
//! ```

use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

use crate::upload::UploadFile;
use crate::variant::{VariantLabel, VariantSet};

// =========================================================================
// Image fixtures
// =========================================================================

/// Gradient image so resizes and classifier samples have real content.
fn gradient(width: u32, height: u32) -> RgbImage {
    ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    })
}

fn encode(img: RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

/// A small JPEG with a gradient fill.
pub fn test_jpeg(width: u32, height: u32) -> Vec<u8> {
    encode(gradient(width, height), ImageFormat::Jpeg)
}

/// A small PNG with a gradient fill.
pub fn test_png(width: u32, height: u32) -> Vec<u8> {
    encode(gradient(width, height), ImageFormat::Png)
}

// =========================================================================
// Upload files
// =========================================================================

pub fn upload_file(name: &str, content_type: &str, bytes: Vec<u8>) -> UploadFile {
    UploadFile {
        name: name.to_string(),
        content_type: content_type.to_string(),
        bytes,
    }
}

// =========================================================================
// Variant sets
// =========================================================================

pub fn set_of(pairs: &[(VariantLabel, &str)]) -> VariantSet {
    let mut set = VariantSet::default();
    for (label, url) in pairs {
        set.set(*label, *url);
    }
    set
}

/// URL stored under `label`. Panics if the label is missing.
pub fn url_of(set: &VariantSet, label: VariantLabel) -> &str {
    set.get(label).unwrap_or_else(|| {
        let present: Vec<VariantLabel> = set.populated().map(|(l, _)| l).collect();
        panic!("variant '{label}' missing. Present: {present:?}")
    })
}

/// A fully populated set whose URLs follow the naming convention.
pub fn full_set(base_url: &str) -> VariantSet {
    let mut set = VariantSet::default();
    for label in VariantLabel::ALL {
        set.set(label, format!("{base_url}-{label}.webp"));
    }
    set
}
