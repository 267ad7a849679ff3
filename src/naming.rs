//! Centralized object-name handling for the `<base>-<variant>.<ext>` convention.
//!
//! Every stored rendition of an uploaded photo follows the same pattern: a
//! shared base name, a dash, the variant label, and the format extension:
//!
//! ```text
//! listings/1718035200123-9f2c4e1ab0-thumbnail.webp
//! listings/1718035200123-9f2c4e1ab0-medium.webp
//! listings/1718035200123-9f2c4e1ab0-large.webp
//! listings/1718035200123-9f2c4e1ab0-original.webp
//! ```
//!
//! Other code paths detect and rewrite variants by matching exactly this
//! suffix, so the format here is a contract: this module is the only place
//! that builds or parses it.
//!
//! ## Base names
//!
//! A base name is `<unix millis>-<10 hex digits>`. The digest covers the
//! source bytes, the timestamp, and a process-wide sequence number, so two
//! uploads of the same photo in the same millisecond still get distinct
//! names and no two uploads ever write the same object.

use crate::variant::VariantLabel;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Result of parsing a name or URL like `.../1718-ab12-medium.webp?v=2`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedVariantName {
    /// Everything before `-<variant>`, including any URL or folder prefix.
    pub stem: String,
    pub label: VariantLabel,
    /// Extension without the dot.
    pub extension: String,
    /// Query string and/or fragment, including the leading `?` or `#`. Empty if absent.
    pub suffix: String,
}

impl ParsedVariantName {
    /// Rebuild the name with a different variant label.
    pub fn with_label(&self, label: VariantLabel) -> String {
        format!(
            "{}-{}.{}{}",
            self.stem,
            label.as_str(),
            self.extension,
            self.suffix
        )
    }
}

/// Build the object name for one variant.
///
/// - `("listings", "1718-ab12", Medium, "webp")` → `"listings/1718-ab12-medium.webp"`
/// - `("", "1718-ab12", Thumbnail, "webp")` → `"1718-ab12-thumbnail.webp"`
pub fn variant_object_name(folder: &str, base: &str, label: VariantLabel, ext: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        format!("{}-{}.{}", base, label.as_str(), ext)
    } else {
        format!("{}/{}-{}.{}", folder, base, label.as_str(), ext)
    }
}

/// Parse a variant object name or URL.
///
/// Returns `None` when the last path segment does not end in
/// `-<variant>.<ext>` with a known variant label.
pub fn parse_variant_name(name: &str) -> Option<ParsedVariantName> {
    let cut = name.find(['?', '#']).unwrap_or(name.len());
    let (path, suffix) = name.split_at(cut);

    let (before_ext, extension) = path.rsplit_once('.')?;
    if extension.is_empty() || extension.contains('/') {
        return None;
    }
    let (stem, label) = before_ext.rsplit_once('-')?;
    let label: VariantLabel = label.parse().ok()?;
    if stem.is_empty() || stem.ends_with('/') {
        return None;
    }

    Some(ParsedVariantName {
        stem: stem.to_string(),
        label,
        extension: extension.to_string(),
        suffix: suffix.to_string(),
    })
}

/// The variant label a name or URL carries, if it follows the convention.
pub fn detect_label(name: &str) -> Option<VariantLabel> {
    parse_variant_name(name).map(|p| p.label)
}

/// Substitute the variant suffix of a name or URL.
///
/// `https://cdn/x/1718-ab12-medium.webp` + `Large` → `https://cdn/x/1718-ab12-large.webp`.
/// This is a string transformation only; it says nothing about whether the
/// sibling object exists.
pub fn sibling_url(url: &str, label: VariantLabel) -> Option<String> {
    parse_variant_name(url).map(|p| p.with_label(label))
}

/// Deterministic base name from its inputs.
pub fn base_name_for(source: &[u8], millis: i64, sequence: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source);
    hasher.update(millis.to_le_bytes());
    hasher.update(sequence.to_le_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}-{}", millis, &digest[..10])
}

/// Fresh base name for a new upload.
pub fn generate_base_name(source: &[u8]) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    base_name_for(source, millis, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_name_with_folder() {
        assert_eq!(
            variant_object_name("listings", "1718-ab12", VariantLabel::Medium, "webp"),
            "listings/1718-ab12-medium.webp"
        );
    }

    #[test]
    fn object_name_trims_folder_slashes() {
        assert_eq!(
            variant_object_name("/avatars/", "b", VariantLabel::Large, "jpg"),
            "avatars/b-large.jpg"
        );
    }

    #[test]
    fn object_name_without_folder() {
        assert_eq!(
            variant_object_name("", "1718-ab12", VariantLabel::Thumbnail, "webp"),
            "1718-ab12-thumbnail.webp"
        );
    }

    #[test]
    fn parse_plain_name() {
        let p = parse_variant_name("1718-ab12-thumbnail.webp").unwrap();
        assert_eq!(p.stem, "1718-ab12");
        assert_eq!(p.label, VariantLabel::Thumbnail);
        assert_eq!(p.extension, "webp");
        assert_eq!(p.suffix, "");
    }

    #[test]
    fn parse_full_url() {
        let p = parse_variant_name("https://cdn.example/storage/listings/1718-ab12-original.webp")
            .unwrap();
        assert_eq!(p.stem, "https://cdn.example/storage/listings/1718-ab12");
        assert_eq!(p.label, VariantLabel::Original);
    }

    #[test]
    fn parse_keeps_query_string() {
        let p = parse_variant_name("https://cdn/x/b-medium.webp?v=3#top").unwrap();
        assert_eq!(p.label, VariantLabel::Medium);
        assert_eq!(p.suffix, "?v=3#top");
        assert_eq!(p.with_label(VariantLabel::Large), "https://cdn/x/b-large.webp?v=3#top");
    }

    #[test]
    fn parse_rejects_unknown_label() {
        assert_eq!(parse_variant_name("1718-ab12-huge.webp"), None);
    }

    #[test]
    fn parse_rejects_name_without_extension() {
        assert_eq!(parse_variant_name("https://cdn/x/b-medium"), None);
    }

    #[test]
    fn parse_rejects_dot_in_directory_only() {
        assert_eq!(parse_variant_name("https://cdn.example/photo"), None);
    }

    #[test]
    fn parse_rejects_bare_label() {
        assert_eq!(parse_variant_name("-medium.webp"), None);
        assert_eq!(parse_variant_name("listings/-medium.webp"), None);
    }

    #[test]
    fn detect_label_on_legacy_urls() {
        assert_eq!(
            detect_label("https://cdn/a/photo-large.webp"),
            Some(VariantLabel::Large)
        );
        assert_eq!(detect_label("https://cdn/a/photo.jpg"), None);
    }

    #[test]
    fn sibling_medium_to_large() {
        assert_eq!(
            sibling_url("https://cdn/l/1718-ab12-medium.webp", VariantLabel::Large).as_deref(),
            Some("https://cdn/l/1718-ab12-large.webp")
        );
    }

    #[test]
    fn sibling_roundtrips_to_original_name() {
        let url = "https://cdn/l/1718-ab12-medium.webp";
        let large = sibling_url(url, VariantLabel::Large).unwrap();
        assert_eq!(sibling_url(&large, VariantLabel::Medium).as_deref(), Some(url));
    }

    #[test]
    fn sibling_of_non_variant_is_none() {
        assert_eq!(sibling_url("https://cdn/l/photo.png", VariantLabel::Large), None);
    }

    #[test]
    fn base_name_shape() {
        let name = base_name_for(b"bytes", 1718035200123, 0);
        let (millis, digest) = name.split_once('-').unwrap();
        assert_eq!(millis, "1718035200123");
        assert_eq!(digest.len(), 10);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn base_name_varies_with_sequence() {
        assert_ne!(base_name_for(b"x", 1, 0), base_name_for(b"x", 1, 1));
        assert_eq!(base_name_for(b"x", 1, 7), base_name_for(b"x", 1, 7));
    }

    #[test]
    fn generated_base_names_are_unique() {
        let a = generate_base_name(b"same photo");
        let b = generate_base_name(b"same photo");
        assert_ne!(a, b);
    }

    #[test]
    fn generated_name_parses_back() {
        let base = generate_base_name(b"photo");
        let name = variant_object_name("listings", &base, VariantLabel::Large, "webp");
        let parsed = parse_variant_name(&name).unwrap();
        assert_eq!(parsed.stem, format!("listings/{}", base));
        assert_eq!(parsed.label, VariantLabel::Large);
    }
}
