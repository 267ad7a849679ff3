//! # faso-media
//!
//! Image ingestion for a classifieds marketplace. Sellers upload phone
//! photos of what they sell; buyers browse them on slow, metered mobile
//! connections. Every upload is therefore stored as a small ladder of
//! renditions, and every display surface asks for the smallest one that
//! looks right.
//!
//! # Architecture: Upload Pipeline, Display Resolver
//!
//! ```text
//! upload files ─▶ validate ─▶ generate variants ─▶ store objects ─▶ VariantSet
//!                             (classify, resize,   (<base>-<label>.<ext>,
//!                              encode, parallel)    backfill)
//!                                                         │
//!                                          attach to record (two-phase swap)
//!                                                         │
//! record field ─▶ ImageRef ─▶ resolve(context) ─▶ URL ─▶ degrade on load error
//! ```
//!
//! The write side is a synchronous batch: files in order, variants of one
//! file in parallel. The read side is pure functions over the stored
//! [`variant::ImageRef`], so any rendering layer can call it.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Decode, classify, resize, and encode behind the [`imaging::ImageBackend`] trait |
//! | [`generate`] | Variant ladder and per-source generation with per-variant isolation |
//! | [`upload`] | Batch orchestration: validation, naming, storage, backfill, progress, cancellation |
//! | [`variant`] | `VariantLabel`, `VariantSet`, `ImageRef`: the stored data model |
//! | [`naming`] | The `<base>-<variant>.<ext>` object-name contract |
//! | [`storage`] | `ObjectStore` and `RecordStore` traits with local and in-memory stores |
//! | [`record`] | Attaching images to records, removal, and the orphan sweep |
//! | [`display`] | Context resolution, load-failure degradation, lazy loading |
//! | [`config`] | `faso-media.toml` loading, validation, and merging |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Fit, Never Crop
//!
//! Product photos are evidence: a buyer needs to see the whole item. Every
//! rung is fit inside its bounding box with the aspect ratio preserved, and
//! sources smaller than a box are left at their own size.
//!
//! ## Quality Follows Content
//!
//! A patterned fabric loses detail at a quality that is fine for a phone on a
//! white table. The [`imaging::classify`] module measures colour variation on
//! a 100×100 sample and bumps medium and large quality for complex photos.
//! It only ever nudges: a failed classification means the base quality.
//!
//! ## Partial Sets Are Normal
//!
//! A rung can fail to encode or to store without losing the upload. Missing
//! labels alias their nearest neighbour, so a record always has something to
//! show in every context, and the display side still degrades further when
//! a URL fails to load.
//!
//! ## Names Are Never Reused
//!
//! Base names combine a millisecond timestamp with a digest of the content
//! and a process-wide sequence number. No two uploads write the same object,
//! and replacing an image is a record update followed by deletion of the old
//! generation.

pub mod config;
pub mod display;
pub mod generate;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod record;
pub mod storage;
pub mod upload;
pub mod variant;

#[cfg(test)]
pub(crate) mod test_helpers;
