//! CLI output formatting for every command.
//!
//! # Information-First Display
//!
//! Output leads with the file's positional index and name; URLs, labels,
//! and failure reasons follow as indented context lines. Formatting is pure
//! (`format_*` functions return lines) so it is tested without capturing
//! stdout; `print_*` wrappers do the printing.
//!
//! # Output Format
//!
//! ## Upload (streamed events)
//!
//! ```text
//! 001 stall.jpg
//!     thumbnail: https://cdn/listings/1718-ab12-thumbnail.webp
//!     medium: https://cdn/listings/1718-ab12-medium.webp
//!     large: failed (Store failure: put refused)
//!     original: https://cdn/listings/1718-ab12-original.webp
//! 002 notes.txt
//!     skipped: Unsupported file type: text/plain
//! ```
//!
//! ## Upload (summary)
//!
//! ```text
//! Uploaded 1 of 2 files (1 skipped)
//! 001 stall.jpg
//!     Base: 1718-ab12
//!     medium ← large
//! 002 notes.txt
//!     skipped: Unsupported file type: text/plain
//! Supported formats: jpg, jpeg, png, tif, tiff, webp, gif
//! ```
//!
//! ## Sweep
//!
//! ```text
//! Scanned 8 objects, 4 referenced
//! Removed 4 orphans
//!     listings/1718-0000000000-large.webp
//! ```

use crate::display::{DisplayContext, Resolved, ResolvedSource};
use crate::imaging::rust_backend::supported_input_extensions;
use crate::record::{AttachOutcome, SweepReport};
use crate::upload::{UploadError, UploadEvent, UploadReport};
use crate::variant::{VariantLabel, VariantSet};

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 0-based batch index as 1-based, 3-digit zero-padded.
fn format_index(index: usize) -> String {
    format!("{:0>3}", index + 1)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn file_header(index: usize, name: &str) -> String {
    if name.is_empty() {
        format!("{} (unnamed)", format_index(index))
    } else {
        format!("{} {}", format_index(index), name)
    }
}

/// Lines describing which labels share a URL after backfill.
///
/// ```text
/// medium ← large
/// thumbnail ← large
/// ```
fn alias_lines(set: &VariantSet) -> Vec<String> {
    let mut lines = Vec::new();
    for label in VariantLabel::ALL {
        let Some(url) = set.get(label) else { continue };
        let source = VariantLabel::BY_FIDELITY
            .into_iter()
            .find(|other| *other != label && set.get(*other) == Some(url));
        if let Some(source) = source
            && source > label
        {
            lines.push(format!("{} ← {}", label, source));
        }
    }
    lines
}

// ============================================================================
// Upload
// ============================================================================

/// Format a single upload event as display lines.
///
/// Progress events produce no lines; see [`format_progress`].
pub fn format_upload_event(event: &UploadEvent) -> Vec<String> {
    match event {
        UploadEvent::FileStarted { index, name, .. } => vec![file_header(*index, name)],
        UploadEvent::Progress { .. } => Vec::new(),
        UploadEvent::VariantUploaded { label, url, .. } => {
            vec![format!("{}{}: {}", indent(1), label, url)]
        }
        UploadEvent::VariantFailed { label, error, .. } => {
            vec![format!("{}{}: failed ({})", indent(1), label, error)]
        }
        UploadEvent::FileSkipped { reason, .. } => {
            vec![format!("{}skipped: {}", indent(1), reason)]
        }
        UploadEvent::FileCompleted { variants, .. } => alias_lines(variants)
            .into_iter()
            .map(|l| format!("{}{}", indent(1), l))
            .collect(),
        UploadEvent::Cancelled => vec!["Cancelled".to_string()],
    }
}

pub fn format_progress(percent: u8) -> String {
    format!("[{:>3}%]", percent)
}

/// Format the final upload report.
pub fn format_upload_report(report: &UploadReport) -> Vec<String> {
    let total = report.uploaded.len() + report.skipped.len();
    let mut header = format!("Uploaded {} of {} files", report.uploaded.len(), total);
    if report.skipped_count() > 0 {
        header.push_str(&format!(" ({} skipped)", report.skipped_count()));
    }
    if report.cancelled {
        header.push_str(" (cancelled)");
    }
    let mut lines = vec![header];

    for image in &report.uploaded {
        lines.push(file_header(image.index, &image.name));
        lines.push(format!("{}Base: {}", indent(1), image.base_name));
        if image.fallback_used {
            lines.push(format!("{}fallback medium only", indent(1)));
        }
        for alias in alias_lines(&image.variants) {
            lines.push(format!("{}{}", indent(1), alias));
        }
        for failure in &image.failures {
            lines.push(format!(
                "{}{}: failed ({})",
                indent(1),
                failure.label,
                failure.error
            ));
        }
    }

    for skipped in &report.skipped {
        lines.push(file_header(skipped.index, &skipped.name));
        lines.push(format!("{}skipped: {}", indent(1), skipped.reason));
    }
    if report
        .skipped
        .iter()
        .any(|s| matches!(s.reason, UploadError::UnsupportedType { .. }))
    {
        lines.push(format!(
            "Supported formats: {}",
            supported_input_extensions().join(", ")
        ));
    }
    lines
}

pub fn print_upload_report(report: &UploadReport) {
    for line in format_upload_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Resolve / attach / sweep
// ============================================================================

/// ```text
/// card → https://cdn/listings/1718-ab12-medium.webp (medium)
/// hero → /placeholder.svg (placeholder)
/// ```
pub fn format_resolved(context: DisplayContext, resolved: &Resolved) -> String {
    let how = match resolved.source {
        ResolvedSource::Preferred(l) => l.to_string(),
        ResolvedSource::Fallback(l) => format!("{l}, fallback"),
        ResolvedSource::Nearest(l) => format!("{l}, nearest"),
        ResolvedSource::Legacy => "legacy".to_string(),
        ResolvedSource::Placeholder => "placeholder".to_string(),
    };
    format!("{} → {} ({})", context, resolved.url, how)
}

pub fn format_attach_outcome(outcome: &AttachOutcome, table: &str, id: &str) -> Vec<String> {
    let mut lines = vec![format!("Updated {}/{}", table, id)];
    if !outcome.removed.is_empty() {
        lines.push(format!(
            "{}Removed {} previous objects",
            indent(1),
            outcome.removed.len()
        ));
        for path in &outcome.removed {
            lines.push(format!("{}{}", indent(2), path));
        }
    }
    lines
}

pub fn print_attach_outcome(outcome: &AttachOutcome, table: &str, id: &str) {
    for line in format_attach_outcome(outcome, table, id) {
        println!("{}", line);
    }
}

pub fn format_removed(paths: &[String]) -> Vec<String> {
    let mut lines = vec![format!("Removed {} objects", paths.len())];
    lines.extend(paths.iter().map(|p| format!("{}{}", indent(1), p)));
    lines
}

pub fn format_sweep_report(report: &SweepReport, dry_run: bool) -> Vec<String> {
    let mut lines = vec![format!(
        "Scanned {} objects, {} referenced",
        report.scanned, report.referenced
    )];
    let verb = if dry_run { "Would remove" } else { "Removed" };
    let noun = if report.removed.len() == 1 {
        "orphan"
    } else {
        "orphans"
    };
    lines.push(format!("{} {} {}", verb, report.removed.len(), noun));
    for path in &report.removed {
        lines.push(format!("{}{}", indent(1), path));
    }
    lines
}

pub fn print_sweep_report(report: &SweepReport, dry_run: bool) {
    for line in format_sweep_report(report, dry_run) {
        println!("{}", line);
    }
}
