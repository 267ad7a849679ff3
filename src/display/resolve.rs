//! Context → URL resolution.
//!
//! | Context | Preferred | Fallback |
//! |---|---|---|
//! | thumbnail | thumbnail | medium |
//! | card | medium | thumbnail |
//! | detail | large | medium |
//! | hero | original | large |
//!
//! After the fallback, any populated label is taken in fidelity order
//! (original, large, medium, thumbnail). Only when nothing is populated does
//! the placeholder appear. On a constrained network the thumbnail comes
//! first for every context.

use crate::variant::{ImageRef, VariantLabel, VariantSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayContext {
    Thumbnail,
    Card,
    Detail,
    Hero,
}

impl DisplayContext {
    pub const ALL: [DisplayContext; 4] = [
        DisplayContext::Thumbnail,
        DisplayContext::Card,
        DisplayContext::Detail,
        DisplayContext::Hero,
    ];

    /// `(preferred, fallback)` labels.
    pub fn preference(self) -> (VariantLabel, VariantLabel) {
        match self {
            DisplayContext::Thumbnail => (VariantLabel::Thumbnail, VariantLabel::Medium),
            DisplayContext::Card => (VariantLabel::Medium, VariantLabel::Thumbnail),
            DisplayContext::Detail => (VariantLabel::Large, VariantLabel::Medium),
            DisplayContext::Hero => (VariantLabel::Original, VariantLabel::Large),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DisplayContext::Thumbnail => "thumbnail",
            DisplayContext::Card => "card",
            DisplayContext::Detail => "detail",
            DisplayContext::Hero => "hero",
        }
    }
}

impl fmt::Display for DisplayContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown display context: {0}")]
pub struct UnknownDisplayContext(pub String);

impl FromStr for DisplayContext {
    type Err = UnknownDisplayContext;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DisplayContext::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownDisplayContext(s.to_string()))
    }
}

/// Connection quality hint from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkClass {
    #[default]
    Normal,
    /// Slow or metered connection.
    Constrained,
}

/// Why a URL was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedSource {
    Preferred(VariantLabel),
    Fallback(VariantLabel),
    /// First populated label in fidelity order.
    Nearest(VariantLabel),
    Legacy,
    Placeholder,
}

impl ResolvedSource {
    pub fn label(self) -> Option<VariantLabel> {
        match self {
            ResolvedSource::Preferred(l)
            | ResolvedSource::Fallback(l)
            | ResolvedSource::Nearest(l) => Some(l),
            ResolvedSource::Legacy | ResolvedSource::Placeholder => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub url: String,
    pub source: ResolvedSource,
}

impl Resolved {
    pub fn placeholder(path: &str) -> Self {
        Self {
            url: path.to_string(),
            source: ResolvedSource::Placeholder,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.source == ResolvedSource::Placeholder
    }
}

fn resolve_set(
    set: &VariantSet,
    context: DisplayContext,
    network: NetworkClass,
) -> Option<(VariantLabel, ResolvedSource)> {
    let (preferred, fallback) = context.preference();
    let preferred = match network {
        NetworkClass::Constrained => VariantLabel::Thumbnail,
        NetworkClass::Normal => preferred,
    };
    if set.contains(preferred) {
        return Some((preferred, ResolvedSource::Preferred(preferred)));
    }
    if set.contains(fallback) {
        return Some((fallback, ResolvedSource::Fallback(fallback)));
    }
    set.populated()
        .next()
        .map(|(label, _)| (label, ResolvedSource::Nearest(label)))
}

/// Pick the URL to render for a stored image reference.
///
/// Pure and deterministic: the same inputs always give the same answer.
pub fn resolve(
    image_ref: Option<&ImageRef>,
    context: DisplayContext,
    network: NetworkClass,
    placeholder: &str,
) -> Resolved {
    match image_ref {
        Some(ImageRef::Legacy(url)) if !url.trim().is_empty() => Resolved {
            url: url.clone(),
            source: ResolvedSource::Legacy,
        },
        Some(ImageRef::Variants(set)) => match resolve_set(set, context, network) {
            Some((label, source)) => Resolved {
                url: set.get(label).unwrap_or(placeholder).to_string(),
                source,
            },
            None => Resolved::placeholder(placeholder),
        },
        _ => Resolved::placeholder(placeholder),
    }
}
