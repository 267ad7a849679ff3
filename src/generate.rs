//! Variant generation stage.
//!
//! Turns one uploaded source into a set of encoded renditions, one per rung
//! of the [`VariantLadder`]:
//!
//! ```text
//! source bytes
//!     │ identify            (decode failure → GenerateError::Decode)
//!     │ classify            (failure → Simple, logged)
//!     ├── thumbnail 200×200   @0.85
//!     ├── medium    800×600   @0.92 (+bump if complex)
//!     ├── large     1600×1200 @0.95 (+bump if complex, capped)
//!     └── original  2400×2400 @0.95 (only with keep_original)
//! ```
//!
//! Rungs are encoded in parallel on the rayon pool. Each call to the backend
//! owns its buffers, so one rung failing never affects another: failures are
//! collected in [`GeneratedVariants::failures`] and the rest go on. Only when
//! every rung fails does the generator try a single conservative `medium`
//! rendition; if that fails too the whole file is reported as unprocessable.
//!
//! Bounding boxes are fit, never cropped and never upscaled: a 640×480 source
//! comes out as 640×480 in the medium, large, and original rungs.

use crate::config::{ClassifierConfig, VariantsConfig};
use crate::imaging::{
    BackendError, Complexity, CompressedImage, Enhancement, ImageBackend, OutputFormat, Quality,
    adjust_quality, assess_complexity, compress_to_fit, get_dimensions,
};
use crate::variant::VariantLabel;
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("Source could not be decoded: {0}")]
    Decode(#[source] BackendError),
    #[error("All {attempted} variants failed and the fallback rendition failed too")]
    AllVariantsFailed { attempted: usize },
    #[error("No variants requested")]
    NoVariantsRequested,
    #[error("Cancelled")]
    Cancelled,
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Target box and base quality for one label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariantSpec {
    pub label: VariantLabel,
    pub max_width: u32,
    pub max_height: u32,
    pub quality: Quality,
}

impl VariantSpec {
    pub fn bounds(&self) -> (u32, u32) {
        (self.max_width, self.max_height)
    }
}

/// The full set of rungs, smallest first.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantLadder {
    specs: Vec<VariantSpec>,
    fallback_quality: Quality,
}

impl VariantLadder {
    pub fn from_config(config: &VariantsConfig) -> Self {
        let specs = VariantLabel::ALL
            .into_iter()
            .map(|label| {
                let size = config.spec(label);
                VariantSpec {
                    label,
                    max_width: size.max_width,
                    max_height: size.max_height,
                    quality: Quality::new(size.quality),
                }
            })
            .collect();
        Self {
            specs,
            fallback_quality: config.fallback_quality(),
        }
    }

    pub fn spec(&self, label: VariantLabel) -> Option<&VariantSpec> {
        self.specs.iter().find(|s| s.label == label)
    }

    pub fn specs(&self) -> &[VariantSpec] {
        &self.specs
    }

    pub fn fallback_quality(&self) -> Quality {
        self.fallback_quality
    }
}

impl Default for VariantLadder {
    fn default() -> Self {
        Self::from_config(&VariantsConfig::default())
    }
}

/// What to produce for one source.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Labels to produce. `Original` is skipped unless `keep_original` is set.
    pub variants: Vec<VariantLabel>,
    pub keep_original: bool,
    pub format: OutputFormat,
    pub enhance: bool,
}

impl GenerateOptions {
    pub fn from_config(config: &VariantsConfig) -> Self {
        Self {
            variants: VariantLabel::ALL.to_vec(),
            keep_original: config.keep_original,
            format: config.format,
            enhance: config.enhance,
        }
    }

    /// Requested labels in ladder order, without duplicates.
    pub fn requested(&self) -> Vec<VariantLabel> {
        VariantLabel::ALL
            .into_iter()
            .filter(|label| self.variants.contains(label))
            .filter(|label| *label != VariantLabel::Original || self.keep_original)
            .collect()
    }

    fn enhancement(&self) -> Option<Enhancement> {
        self.enhance.then(Enhancement::subtle)
    }
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self::from_config(&VariantsConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedVariant {
    pub label: VariantLabel,
    pub image: CompressedImage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantFailure {
    pub label: VariantLabel,
    pub error: String,
}

/// Everything produced for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedVariants {
    /// Source dimensions as identified.
    pub dimensions: (u32, u32),
    pub complexity: Complexity,
    /// Successful renditions in ladder order.
    pub variants: Vec<GeneratedVariant>,
    pub failures: Vec<VariantFailure>,
    /// True when `variants` holds only the last-resort medium rendition.
    pub fallback_used: bool,
}

impl GeneratedVariants {
    pub fn get(&self, label: VariantLabel) -> Option<&GeneratedVariant> {
        self.variants.iter().find(|v| v.label == label)
    }
}

/// Effective quality for a rung after the complexity nudge.
///
/// Only medium and large are nudged; thumbnails are too small for the
/// difference to show and originals already sit at the cap.
pub fn effective_quality(
    spec: &VariantSpec,
    complexity: Complexity,
    classifier: &ClassifierConfig,
) -> Quality {
    match spec.label {
        VariantLabel::Medium | VariantLabel::Large => adjust_quality(
            spec.quality,
            complexity,
            classifier.quality_bump,
            classifier.quality_cap,
        ),
        VariantLabel::Thumbnail | VariantLabel::Original => spec.quality,
    }
}

/// Generate the requested variants for one source.
///
/// `on_variant` is called once per attempted rung with its label and whether
/// it succeeded. It runs on rayon worker threads, in completion order.
///
/// `cancel` is checked after decoding and before each rung is encoded; rungs
/// not yet started are skipped and the call returns [`GenerateError::Cancelled`].
pub fn generate_variants<F>(
    backend: &impl ImageBackend,
    source: &[u8],
    ladder: &VariantLadder,
    classifier: &ClassifierConfig,
    options: &GenerateOptions,
    cancel: &CancelToken,
    on_variant: F,
) -> Result<GeneratedVariants, GenerateError>
where
    F: Fn(VariantLabel, bool) + Sync,
{
    let specs: Vec<VariantSpec> = options
        .requested()
        .into_iter()
        .filter_map(|label| ladder.spec(label).copied())
        .collect();
    if specs.is_empty() {
        return Err(GenerateError::NoVariantsRequested);
    }

    let dimensions = get_dimensions(backend, source).map_err(GenerateError::Decode)?;
    if cancel.is_cancelled() {
        return Err(GenerateError::Cancelled);
    }

    let complexity = match assess_complexity(
        backend,
        source,
        classifier.sample_size,
        classifier.threshold,
    ) {
        Ok(c) => c,
        Err(e) => {
            warn!("complexity sampling failed, treating as simple: {e}");
            Complexity::Simple
        }
    };
    debug!(
        width = dimensions.0,
        height = dimensions.1,
        ?complexity,
        "generating {} variants",
        specs.len()
    );

    let enhancement = options.enhancement();
    let results: Vec<(VariantLabel, Result<CompressedImage, BackendError>)> = specs
        .par_iter()
        .filter_map(|spec| {
            if cancel.is_cancelled() {
                return None;
            }
            let quality = effective_quality(spec, complexity, classifier);
            let result = compress_to_fit(
                backend,
                source,
                dimensions,
                spec.bounds(),
                quality,
                options.format,
                enhancement,
            );
            on_variant(spec.label, result.is_ok());
            Some((spec.label, result))
        })
        .collect();
    if cancel.is_cancelled() {
        debug!("generation cancelled after {} of {} rungs", results.len(), specs.len());
        return Err(GenerateError::Cancelled);
    }

    let mut variants = Vec::new();
    let mut failures = Vec::new();
    for (label, result) in results {
        match result {
            Ok(image) => variants.push(GeneratedVariant { label, image }),
            Err(e) => {
                warn!(%label, "variant generation failed: {e}");
                failures.push(VariantFailure {
                    label,
                    error: e.to_string(),
                });
            }
        }
    }

    let mut fallback_used = false;
    if variants.is_empty() {
        let attempted = failures.len();
        let bounds = ladder
            .spec(VariantLabel::Medium)
            .map(VariantSpec::bounds)
            .unwrap_or((800, 600));
        let image = compress_to_fit(
            backend,
            source,
            dimensions,
            bounds,
            ladder.fallback_quality(),
            options.format,
            None,
        )
        .map_err(|e| {
            warn!("fallback rendition failed: {e}");
            GenerateError::AllVariantsFailed { attempted }
        })?;
        on_variant(VariantLabel::Medium, true);
        variants.push(GeneratedVariant {
            label: VariantLabel::Medium,
            image,
        });
        fallback_used = true;
    }

    Ok(GeneratedVariants {
        dimensions,
        complexity,
        variants,
        failures,
        fallback_used,
    })
}
