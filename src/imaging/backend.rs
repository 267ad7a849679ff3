//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations every backend must
//! support: identify, sample, and compress. Each call receives the raw source
//! bytes and owns every buffer it allocates, so no decoder or drawing surface
//! is shared between calls.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend): pure Rust, built on the
//! `image` crate.

use super::classify::RgbSample;
use super::params::CompressParams;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Trait for image processing backends.
///
/// `Sync` so variant generation can fan out across the rayon pool with a
/// shared reference.
pub trait ImageBackend: Sync {
    /// Get image dimensions without a full decode where possible.
    fn identify(&self, source: &[u8]) -> Result<Dimensions, BackendError>;

    /// Decode and downsample to a `size`×`size` RGB sample for classification.
    fn sample(&self, source: &[u8], size: u32) -> Result<RgbSample, BackendError>;

    /// Decode, resize to exactly `params.width`×`params.height`, and encode.
    fn compress(&self, source: &[u8], params: &CompressParams) -> Result<Vec<u8>, BackendError>;
}
