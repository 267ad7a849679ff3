//! Complexity classifier.
//!
//! A photo of a textured fabric compresses worse than a product shot on a
//! white background. The classifier looks at a small downsampled copy of the
//! source and labels it [`Complexity::Simple`] or [`Complexity::Complex`];
//! complex images get a small quality bump so fine detail survives encoding.
//!
//! The metric is the mean absolute deviation of each pixel's channels from
//! that pixel's own channel average, a cheap colorfulness measure, not a
//! statistical variance. Everything here is pure so the threshold and bump
//! can be tuned and tested without decoding anything.

use super::params::Quality;
use serde::{Deserialize, Serialize};

/// Downsampled RGB pixels used for classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbSample {
    pub width: u32,
    pub height: u32,
    /// Interleaved RGB8, `width * height * 3` bytes.
    pub data: Vec<u8>,
}

impl RgbSample {
    /// A sample where every pixel has the same color.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.data.len() / 3
    }
}

/// Coarse complexity label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Complex,
}

/// Mean absolute deviation of each channel from its pixel's channel average.
///
/// Returns 0.0 for an empty sample.
pub fn mean_channel_deviation(sample: &RgbSample) -> f64 {
    let pixels = sample.pixel_count();
    if pixels == 0 {
        return 0.0;
    }

    let total: f64 = sample
        .data
        .chunks_exact(3)
        .map(|px| {
            let (r, g, b) = (px[0] as f64, px[1] as f64, px[2] as f64);
            let avg = (r + g + b) / 3.0;
            (r - avg).abs() + (g - avg).abs() + (b - avg).abs()
        })
        .sum();

    total / pixels as f64
}

/// Label a sample: complex iff its mean deviation exceeds `threshold`.
pub fn classify(sample: &RgbSample, threshold: f64) -> Complexity {
    if mean_channel_deviation(sample) > threshold {
        Complexity::Complex
    } else {
        Complexity::Simple
    }
}

/// Nudge a base quality for complex images, capped at `cap`.
///
/// The cap never lowers a base that is already above it.
pub fn adjust_quality(base: Quality, complexity: Complexity, bump: f32, cap: f32) -> Quality {
    match complexity {
        Complexity::Simple => base,
        Complexity::Complex => {
            let bumped = (base.value() + bump).min(cap.max(base.value()));
            Quality::new(bumped)
        }
    }
}
