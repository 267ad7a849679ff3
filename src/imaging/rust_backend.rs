//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, GIF) | `image::ImageReader` with dimension limits |
//! | Identify | `ImageReader::into_dimensions` (header only) |
//! | Sample | `DynamicImage::resize_exact` with `Triangle` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Enhance | `adjust_contrast` + `brighten` |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder` (lossless) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` at `quality.percent()` |

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::classify::RgbSample;
use super::params::{CompressParams, OutputFormat};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, Limits};
use std::io::Cursor;

/// Largest width or height we agree to decode. A small compressed file can
/// expand into an enormous pixel buffer; 16384² RGBA is about 1 GB.
const MAX_IMAGE_DIMENSION: u32 = 16384;

/// Input formats whose decoders are compiled in, with the MIME type browsers
/// report for them.
const PHOTO_CANDIDATES: &[(&str, &str, ImageFormat)] = &[
    ("jpg", "image/jpeg", ImageFormat::Jpeg),
    ("jpeg", "image/jpeg", ImageFormat::Jpeg),
    ("png", "image/png", ImageFormat::Png),
    ("tif", "image/tiff", ImageFormat::Tiff),
    ("tiff", "image/tiff", ImageFormat::Tiff),
    ("webp", "image/webp", ImageFormat::WebP),
    ("gif", "image/gif", ImageFormat::Gif),
];

/// MIME type for a file extension, if a decoder for it is compiled in.
pub fn content_type_for_extension(ext: &str) -> Option<&'static str> {
    PHOTO_CANDIDATES
        .iter()
        .find(|(e, _, fmt)| e.eq_ignore_ascii_case(ext) && fmt.reading_enabled())
        .map(|(_, mime, _)| *mime)
}

/// Returns the image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> Vec<&'static str> {
    PHOTO_CANDIDATES
        .iter()
        .filter(|(_, _, fmt)| fmt.reading_enabled())
        .map(|(ext, _, _)| *ext)
        .collect()
}

/// Pure Rust backend using the `image` crate.
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

fn reader(source: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, BackendError> {
    let mut reader = ImageReader::new(Cursor::new(source))
        .with_guessed_format()
        .map_err(BackendError::Io)?;
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_DIMENSION);
    limits.max_image_height = Some(MAX_IMAGE_DIMENSION);
    reader.limits(limits);
    Ok(reader)
}

/// Decode source bytes into a fresh image.
fn load_image(source: &[u8]) -> Result<DynamicImage, BackendError> {
    reader(source)?
        .decode()
        .map_err(|e| BackendError::Decode(e.to_string()))
}

/// Encode an image in the requested format.
fn encode_image(img: &DynamicImage, params: &CompressParams) -> Result<Vec<u8>, BackendError> {
    let mut buf = Cursor::new(Vec::new());
    match params.format {
        OutputFormat::WebP => {
            // The WebP encoder only takes 8-bit RGB(A)
            let normalized = if img.color().has_alpha() {
                DynamicImage::ImageRgba8(img.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8())
            };
            let encoder = image::codecs::webp::WebPEncoder::new_lossless(&mut buf);
            normalized
                .write_with_encoder(encoder)
                .map_err(|e| BackendError::Encode(format!("WebP encode failed: {}", e)))?;
        }
        OutputFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                &mut buf,
                params.quality.percent(),
            );
            rgb.write_with_encoder(encoder)
                .map_err(|e| BackendError::Encode(format!("JPEG encode failed: {}", e)))?;
        }
    }

    let bytes = buf.into_inner();
    if bytes.is_empty() {
        return Err(BackendError::Encode("encoder produced no data".into()));
    }
    Ok(bytes)
}

impl ImageBackend for RustBackend {
    fn identify(&self, source: &[u8]) -> Result<Dimensions, BackendError> {
        let (width, height) = reader(source)?
            .into_dimensions()
            .map_err(|e| BackendError::Decode(format!("Failed to read dimensions: {}", e)))?;
        Ok(Dimensions { width, height })
    }

    fn sample(&self, source: &[u8], size: u32) -> Result<RgbSample, BackendError> {
        let img = load_image(source)?;
        let small = img.resize_exact(size, size, FilterType::Triangle).to_rgb8();
        Ok(RgbSample {
            width: small.width(),
            height: small.height(),
            data: small.into_raw(),
        })
    }

    fn compress(&self, source: &[u8], params: &CompressParams) -> Result<Vec<u8>, BackendError> {
        let img = load_image(source)?;

        let resized = if img.width() == params.width && img.height() == params.height {
            img
        } else {
            img.resize_exact(params.width, params.height, FilterType::Lanczos3)
        };

        let final_img = match params.enhancement {
            Some(e) => resized.adjust_contrast(e.contrast).brighten(e.brightness),
            None => resized,
        };

        encode_image(&final_img, params)
    }
}
