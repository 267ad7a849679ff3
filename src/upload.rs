//! Upload orchestration.
//!
//! Takes a batch of user-selected files and turns each one into a stored
//! [`VariantSet`]:
//!
//! 1. **Validate**: MIME type must be `image/*`, size within the ceiling,
//!    not empty. A rejected file is skipped; the rest of the batch goes on.
//! 2. **Generate**: [`generate_variants`] produces the renditions.
//! 3. **Store**: every rendition is written as `<folder>/<base>-<label>.<ext>`
//!    under one shared, never-reused base name, and its public URL collected.
//!    A failed write is logged and that label left out.
//! 4. **Backfill**: missing labels alias their nearest neighbour
//!    (`medium ← large`, `thumbnail ← medium`).
//!
//! Files are handled one at a time in input order so at most one decoded
//! source is held in memory; parallelism lives inside generation only.
//!
//! Progress is reported as [`UploadEvent`]s on an optional channel. Events
//! are for display only; the [`UploadReport`] is the result.
//!
//! A [`CancelToken`] is checked before each file, before each rung is
//! encoded, before storing, and between writes. Objects already stored for
//! the file in flight are removed when cancellation is observed, so a
//! cancelled upload leaves no blobs that no record will ever point at.

use crate::config::{ClassifierConfig, MediaConfig};
use crate::generate::{
    GenerateError, GenerateOptions, GeneratedVariants, VariantFailure, VariantLadder,
    generate_variants,
};
pub use crate::generate::CancelToken;
use crate::imaging::ImageBackend;
use crate::imaging::rust_backend::content_type_for_extension;
use crate::naming;
use crate::storage::{ObjectStore, StorageError};
use crate::variant::{ImageRef, VariantLabel, VariantSet, VariantSetError};
use std::path::Path;
use std::sync::Mutex;
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported file type: {content_type}")]
    UnsupportedType { content_type: String },
    #[error("File is {size} bytes, limit is {max}")]
    TooLarge { size: u64, max: u64 },
    #[error("File is empty")]
    Empty,
    #[error(transparent)]
    Generate(#[from] GenerateError),
    #[error("None of the {attempted} renditions could be stored")]
    NothingUploaded { attempted: usize },
    #[error("Stored renditions do not form a usable set: {0}")]
    IncompleteSet(#[from] VariantSetError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Batch aborted after a storage authorization failure")]
    Aborted,
}

/// One user-selected file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    /// MIME type as reported by the picker.
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// Read a file from disk, guessing its MIME type from the extension.
    pub fn from_path(path: &Path) -> Result<Self, UploadError> {
        let bytes = std::fs::read(path)?;
        let content_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(content_type_for_extension)
            .unwrap_or("application/octet-stream");
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            name,
            content_type: content_type.to_string(),
            bytes,
        })
    }

    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Batch-wide settings.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub bucket: String,
    pub folder: String,
    pub max_file_bytes: u64,
    pub ladder: VariantLadder,
    pub classifier: ClassifierConfig,
    pub generate: GenerateOptions,
}

impl UploadOptions {
    pub fn from_config(config: &MediaConfig) -> Self {
        Self {
            bucket: config.upload.bucket.clone(),
            folder: config.upload.folder.clone(),
            max_file_bytes: config.upload.max_file_bytes,
            ladder: VariantLadder::from_config(&config.variants),
            classifier: config.classifier.clone(),
            generate: GenerateOptions::from_config(&config.variants),
        }
    }
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self::from_config(&MediaConfig::default())
    }
}

/// Progress notifications. `index` is the file's position in the batch.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    FileStarted {
        index: usize,
        total: usize,
        name: String,
    },
    /// Coarse batch progress, 0–100.
    Progress { percent: u8 },
    VariantUploaded {
        index: usize,
        label: VariantLabel,
        url: String,
    },
    VariantFailed {
        index: usize,
        label: VariantLabel,
        error: String,
    },
    FileSkipped {
        index: usize,
        name: String,
        reason: String,
    },
    FileCompleted {
        index: usize,
        name: String,
        variants: VariantSet,
    },
    Cancelled,
}

/// A file whose renditions were stored.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedImage {
    pub index: usize,
    pub name: String,
    /// Shared base of every object name written for this file.
    pub base_name: String,
    /// Public URLs after backfill.
    pub variants: VariantSet,
    /// Labels that failed to generate or store.
    pub failures: Vec<VariantFailure>,
    /// Only the last-resort medium rendition could be produced.
    pub fallback_used: bool,
}

impl UploadedImage {
    pub fn image_ref(&self) -> ImageRef {
        ImageRef::Variants(self.variants.clone())
    }
}

/// A file that produced no usable set.
#[derive(Debug)]
pub struct SkippedFile {
    pub index: usize,
    pub name: String,
    pub reason: UploadError,
}

#[derive(Debug, Default)]
pub struct UploadReport {
    /// Stored files in input order.
    pub uploaded: Vec<UploadedImage>,
    pub skipped: Vec<SkippedFile>,
    pub cancelled: bool,
}

impl UploadReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn image_refs(&self) -> Vec<ImageRef> {
        self.uploaded.iter().map(UploadedImage::image_ref).collect()
    }
}

/// Check a file against the batch limits before any decoding.
pub fn validate_file(file: &UploadFile, max_file_bytes: u64) -> Result<(), UploadError> {
    if !file.content_type.starts_with("image/") {
        return Err(UploadError::UnsupportedType {
            content_type: file.content_type.clone(),
        });
    }
    if file.bytes.is_empty() {
        return Err(UploadError::Empty);
    }
    if file.size() > max_file_bytes {
        return Err(UploadError::TooLarge {
            size: file.size(),
            max: max_file_bytes,
        });
    }
    Ok(())
}

/// Coarse 0–100 progress across the batch.
///
/// Each file owns an equal slice; inside it, generation and storage of each
/// variant are equal steps.
pub fn batch_percent(file_index: usize, total_files: usize, step: usize, steps: usize) -> u8 {
    if total_files == 0 {
        return 100;
    }
    let within = if steps == 0 {
        0.0
    } else {
        step.min(steps) as f64 / steps as f64
    };
    let fraction = (file_index as f64 + within) / total_files as f64;
    (fraction * 100.0).floor().clamp(0.0, 100.0) as u8
}

struct Emitter<'a> {
    events: Option<&'a Sender<UploadEvent>>,
}

impl Emitter<'_> {
    fn send(&self, event: UploadEvent) {
        if let Some(tx) = self.events {
            // The receiver going away only means nobody is watching.
            let _ = tx.send(event);
        }
    }

    fn progress(&self, percent: u8) {
        self.send(UploadEvent::Progress { percent });
    }
}

/// Outcome of storing one file's renditions.
enum StoreOutcome {
    Stored(UploadedImage),
    Skipped(UploadError),
    Cancelled,
    Unauthorized(StorageError),
}

/// Upload a batch of files.
pub fn upload_images(
    backend: &impl ImageBackend,
    store: &impl ObjectStore,
    files: &[UploadFile],
    options: &UploadOptions,
    events: Option<&Sender<UploadEvent>>,
    cancel: &CancelToken,
) -> UploadReport {
    let emit = Emitter { events };
    let total = files.len();
    let mut report = UploadReport::default();

    for (index, file) in files.iter().enumerate() {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        emit.send(UploadEvent::FileStarted {
            index,
            total,
            name: file.name.clone(),
        });
        emit.progress(batch_percent(index, total, 0, 1));

        let outcome = process_file(backend, store, file, index, total, options, &emit, cancel);
        match outcome {
            StoreOutcome::Stored(image) => {
                info!(file = %file.name, base = %image.base_name, "stored variants");
                emit.send(UploadEvent::FileCompleted {
                    index,
                    name: file.name.clone(),
                    variants: image.variants.clone(),
                });
                report.uploaded.push(image);
            }
            StoreOutcome::Skipped(reason) => {
                warn!(file = %file.name, "skipping file: {reason}");
                emit.send(UploadEvent::FileSkipped {
                    index,
                    name: file.name.clone(),
                    reason: reason.to_string(),
                });
                report.skipped.push(SkippedFile {
                    index,
                    name: file.name.clone(),
                    reason,
                });
            }
            StoreOutcome::Cancelled => {
                report.cancelled = true;
                break;
            }
            StoreOutcome::Unauthorized(e) => {
                error!("object store rejected credentials: {e}");
                emit.send(UploadEvent::FileSkipped {
                    index,
                    name: file.name.clone(),
                    reason: e.to_string(),
                });
                report.skipped.push(SkippedFile {
                    index,
                    name: file.name.clone(),
                    reason: UploadError::Storage(e),
                });
                for (rest_index, rest) in files.iter().enumerate().skip(index + 1) {
                    report.skipped.push(SkippedFile {
                        index: rest_index,
                        name: rest.name.clone(),
                        reason: UploadError::Aborted,
                    });
                }
                break;
            }
        }
    }

    if report.cancelled {
        emit.send(UploadEvent::Cancelled);
    } else {
        emit.progress(100);
    }
    report
}

#[allow(clippy::too_many_arguments)]
fn process_file(
    backend: &impl ImageBackend,
    store: &impl ObjectStore,
    file: &UploadFile,
    index: usize,
    total: usize,
    options: &UploadOptions,
    emit: &Emitter<'_>,
    cancel: &CancelToken,
) -> StoreOutcome {
    if let Err(e) = validate_file(file, options.max_file_bytes) {
        return StoreOutcome::Skipped(e);
    }

    let steps = options.generate.requested().len() * 2;
    let generated_count = Mutex::new(0usize);
    let generated = generate_variants(
        backend,
        &file.bytes,
        &options.ladder,
        &options.classifier,
        &options.generate,
        cancel,
        |_, _| {
            // Held while sending so percentages leave in increasing order.
            if let Ok(mut done) = generated_count.lock() {
                *done += 1;
                emit.progress(batch_percent(index, total, *done, steps));
            }
        },
    );
    let generated = match generated {
        Ok(g) => g,
        Err(GenerateError::Cancelled) => return StoreOutcome::Cancelled,
        Err(e) => return StoreOutcome::Skipped(e.into()),
    };

    if cancel.is_cancelled() {
        return StoreOutcome::Cancelled;
    }

    store_variants(store, file, index, total, steps, generated, options, emit, cancel)
}

#[allow(clippy::too_many_arguments)]
fn store_variants(
    store: &impl ObjectStore,
    file: &UploadFile,
    index: usize,
    total: usize,
    steps: usize,
    generated: GeneratedVariants,
    options: &UploadOptions,
    emit: &Emitter<'_>,
    cancel: &CancelToken,
) -> StoreOutcome {
    let base_name = naming::generate_base_name(&file.bytes);
    let mut stored_names: Vec<String> = Vec::new();
    let mut set = VariantSet::default();
    let mut failures = generated.failures;
    let attempted = generated.variants.len();
    let half = steps / 2;

    for (i, variant) in generated.variants.into_iter().enumerate() {
        if cancel.is_cancelled() {
            discard(store, &options.bucket, &stored_names);
            return StoreOutcome::Cancelled;
        }

        let image = variant.image;
        let name = naming::variant_object_name(
            &options.folder,
            &base_name,
            variant.label,
            image.format.extension(),
        );
        match store.put(
            &options.bucket,
            &name,
            &image.bytes,
            image.format.content_type(),
        ) {
            Ok(stored) => {
                let url = store.public_url(&options.bucket, &stored.path);
                emit.send(UploadEvent::VariantUploaded {
                    index,
                    label: variant.label,
                    url: url.clone(),
                });
                set.set(variant.label, url);
                stored_names.push(stored.path);
            }
            Err(StorageError::Unauthorized(msg)) => {
                discard(store, &options.bucket, &stored_names);
                return StoreOutcome::Unauthorized(StorageError::Unauthorized(msg));
            }
            Err(e) => {
                warn!(file = %file.name, label = %variant.label, "upload failed: {e}");
                emit.send(UploadEvent::VariantFailed {
                    index,
                    label: variant.label,
                    error: e.to_string(),
                });
                failures.push(VariantFailure {
                    label: variant.label,
                    error: e.to_string(),
                });
            }
        }
        emit.progress(batch_percent(index, total, half + i + 1, steps));
    }

    if set.is_empty() {
        return StoreOutcome::Skipped(UploadError::NothingUploaded { attempted });
    }
    set.backfill();
    if let Err(e) = set.validate() {
        discard(store, &options.bucket, &stored_names);
        return StoreOutcome::Skipped(e.into());
    }

    StoreOutcome::Stored(UploadedImage {
        index,
        name: file.name.clone(),
        base_name,
        variants: set,
        failures,
        fallback_used: generated.fallback_used,
    })
}

/// Best-effort removal of objects that will never be referenced.
fn discard(store: &impl ObjectStore, bucket: &str, names: &[String]) {
    if names.is_empty() {
        return;
    }
    if let Err(e) = store.remove(bucket, names) {
        warn!("could not remove {} stored objects: {e}", names.len());
    }
}
