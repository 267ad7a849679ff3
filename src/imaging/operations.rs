//! High-level image operations.
//!
//! These functions combine calculations with backend execution.
//! They take configuration, compute parameters, and call the backend.

use super::backend::{BackendError, ImageBackend};
use super::calculations::fit_within;
use super::classify::{Complexity, classify};
use super::params::{CompressParams, Enhancement, OutputFormat, Quality};

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Get image dimensions using the backend.
pub fn get_dimensions(backend: &impl ImageBackend, source: &[u8]) -> Result<(u32, u32)> {
    let dims = backend.identify(source)?;
    Ok(dims.as_tuple())
}

/// Sample the source at `sample_size`² and classify it.
pub fn assess_complexity(
    backend: &impl ImageBackend,
    source: &[u8],
    sample_size: u32,
    threshold: f64,
) -> Result<Complexity> {
    let sample = backend.sample(source, sample_size)?;
    Ok(classify(&sample, threshold))
}

/// One encoded rendition.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub quality: Quality,
    pub format: OutputFormat,
}

/// Plan a compress operation without executing it.
///
/// Useful for testing parameter generation.
pub fn plan_compress(
    original_dims: (u32, u32),
    bounds: (u32, u32),
    quality: Quality,
    format: OutputFormat,
    enhancement: Option<Enhancement>,
) -> CompressParams {
    let (width, height) = fit_within(original_dims, bounds);
    CompressParams {
        width,
        height,
        quality,
        format,
        enhancement,
    }
}

/// Resize the source to fit `bounds` (never upscaling) and encode it.
pub fn compress_to_fit(
    backend: &impl ImageBackend,
    source: &[u8],
    original_dims: (u32, u32),
    bounds: (u32, u32),
    quality: Quality,
    format: OutputFormat,
    enhancement: Option<Enhancement>,
) -> Result<CompressedImage> {
    let params = plan_compress(original_dims, bounds, quality, format, enhancement);
    let bytes = backend.compress(source, &params)?;

    Ok(CompressedImage {
        bytes,
        width: params.width,
        height: params.height,
        quality: params.quality,
        format: params.format,
    })
}
