//! Variant labels, variant sets, and image references.
//!
//! These types are what gets stored on a listing or profile record and read
//! back by every display surface. They serialize to the same JSON shapes the
//! records have always held:
//!
//! ```json
//! "https://cdn.example/listings/old-photo.jpg"
//! ```
//!
//! ```json
//! {
//!   "thumbnail": "https://cdn.example/listings/1718-ab12-thumbnail.webp",
//!   "medium": "https://cdn.example/listings/1718-ab12-medium.webp",
//!   "large": "https://cdn.example/listings/1718-ab12-large.webp"
//! }
//! ```
//!
//! The first is a legacy single URL, the second a variant set. [`ImageRef`]
//! is the tagged union of the two, so consumers match on the shape instead
//! of inspecting JSON at runtime.

use crate::naming;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Size class of one rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantLabel {
    Thumbnail,
    Medium,
    Large,
    Original,
}

impl VariantLabel {
    /// All labels from highest to lowest fidelity.
    pub const BY_FIDELITY: [VariantLabel; 4] = [
        VariantLabel::Original,
        VariantLabel::Large,
        VariantLabel::Medium,
        VariantLabel::Thumbnail,
    ];

    /// All labels in generation order (smallest first).
    pub const ALL: [VariantLabel; 4] = [
        VariantLabel::Thumbnail,
        VariantLabel::Medium,
        VariantLabel::Large,
        VariantLabel::Original,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VariantLabel::Thumbnail => "thumbnail",
            VariantLabel::Medium => "medium",
            VariantLabel::Large => "large",
            VariantLabel::Original => "original",
        }
    }
}

impl fmt::Display for VariantLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown variant label: {0}")]
pub struct UnknownVariantLabel(pub String);

impl FromStr for VariantLabel {
    type Err = UnknownVariantLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thumbnail" => Ok(VariantLabel::Thumbnail),
            "medium" => Ok(VariantLabel::Medium),
            "large" => Ok(VariantLabel::Large),
            "original" => Ok(VariantLabel::Original),
            other => Err(UnknownVariantLabel(other.to_string())),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VariantSetError {
    #[error("variant set is empty")]
    Empty,
    #[error("variant set has no thumbnail, medium, or large entry")]
    MissingDisplayVariant,
    #[error("legacy image URL is empty")]
    EmptyLegacyUrl,
}

/// Stored URLs for the renditions of one photo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
}

impl VariantSet {
    pub fn get(&self, label: VariantLabel) -> Option<&str> {
        let slot = match label {
            VariantLabel::Thumbnail => &self.thumbnail,
            VariantLabel::Medium => &self.medium,
            VariantLabel::Large => &self.large,
            VariantLabel::Original => &self.original,
        };
        slot.as_deref().filter(|url| !url.is_empty())
    }

    pub fn set(&mut self, label: VariantLabel, url: impl Into<String>) {
        let slot = match label {
            VariantLabel::Thumbnail => &mut self.thumbnail,
            VariantLabel::Medium => &mut self.medium,
            VariantLabel::Large => &mut self.large,
            VariantLabel::Original => &mut self.original,
        };
        *slot = Some(url.into());
    }

    pub fn contains(&self, label: VariantLabel) -> bool {
        self.get(label).is_some()
    }

    pub fn is_empty(&self) -> bool {
        VariantLabel::ALL.iter().all(|l| !self.contains(*l))
    }

    /// Populated labels with their URLs, highest fidelity first.
    pub fn populated(&self) -> impl Iterator<Item = (VariantLabel, &str)> + '_ {
        VariantLabel::BY_FIDELITY
            .into_iter()
            .filter_map(|label| self.get(label).map(|url| (label, url)))
    }

    /// Distinct URLs in the set (aliased labels share one URL).
    pub fn urls(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = Vec::new();
        for (_, url) in self.populated() {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        urls
    }

    /// Alias missing labels to the best available neighbour:
    /// `medium ← large`, then `thumbnail ← medium`.
    pub fn backfill(&mut self) {
        if !self.contains(VariantLabel::Medium)
            && let Some(large) = self.large.clone()
        {
            self.medium = Some(large);
        }
        if !self.contains(VariantLabel::Thumbnail)
            && let Some(medium) = self.medium.clone()
        {
            self.thumbnail = Some(medium);
        }
    }

    /// Check the persistence invariant: at least one of thumbnail, medium,
    /// or large must be populated.
    pub fn validate(&self) -> Result<(), VariantSetError> {
        if self.is_empty() {
            return Err(VariantSetError::Empty);
        }
        let displayable = [
            VariantLabel::Medium,
            VariantLabel::Large,
            VariantLabel::Thumbnail,
        ]
        .iter()
        .any(|l| self.contains(*l));
        if !displayable {
            return Err(VariantSetError::MissingDisplayVariant);
        }
        Ok(())
    }

    /// Expand a URL that follows the naming convention into a full set of
    /// sibling URLs. Returns `None` for URLs without a variant suffix.
    pub fn from_variant_url(url: &str) -> Option<Self> {
        let parsed = naming::parse_variant_name(url)?;
        let mut set = VariantSet::default();
        for label in VariantLabel::ALL {
            set.set(label, parsed.with_label(label));
        }
        Some(set)
    }
}

/// A stored image reference: a legacy bare URL or a variant set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageRef {
    Legacy(String),
    Variants(VariantSet),
}

impl ImageRef {
    /// Every distinct URL this reference points at.
    pub fn urls(&self) -> Vec<&str> {
        match self {
            ImageRef::Legacy(url) if url.is_empty() => Vec::new(),
            ImageRef::Legacy(url) => vec![url.as_str()],
            ImageRef::Variants(set) => set.urls(),
        }
    }

    /// Variant label carried by a legacy URL's suffix, if any.
    pub fn detected_label(&self) -> Option<VariantLabel> {
        match self {
            ImageRef::Legacy(url) => naming::detect_label(url),
            ImageRef::Variants(_) => None,
        }
    }

    /// Turn a legacy URL that follows the naming convention into a variant
    /// set of its siblings. Anything else is returned unchanged.
    pub fn upgrade_legacy(self) -> ImageRef {
        match self {
            ImageRef::Legacy(url) => match VariantSet::from_variant_url(&url) {
                Some(set) => ImageRef::Variants(set),
                None => ImageRef::Legacy(url),
            },
            other => other,
        }
    }

    pub fn validate(&self) -> Result<(), VariantSetError> {
        match self {
            ImageRef::Legacy(url) if url.trim().is_empty() => Err(VariantSetError::EmptyLegacyUrl),
            ImageRef::Legacy(_) => Ok(()),
            ImageRef::Variants(set) => set.validate(),
        }
    }
}

impl From<VariantSet> for ImageRef {
    fn from(set: VariantSet) -> Self {
        ImageRef::Variants(set)
    }
}
