//! Image processing in pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `ImageReader::into_dimensions` |
//! | **Classify** | downsample + mean channel deviation |
//! | **Resize → WebP/JPEG** | Lanczos3 + `image` encoders |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Classify**: Pure complexity metric and quality nudge
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod classify;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::fit_within;
pub use classify::{Complexity, RgbSample, adjust_quality, classify, mean_channel_deviation};
pub use operations::{
    CompressedImage, assess_complexity, compress_to_fit, get_dimensions, plan_compress,
};
pub use params::{CompressParams, Enhancement, OutputFormat, Quality};
pub use rust_backend::RustBackend;
