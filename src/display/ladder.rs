//! Load-failure degradation.
//!
//! A rendered image starts at whatever [`resolve`] picked. Each load error
//! moves one step down the ladder
//!
//! ```text
//! Original → Large → Medium → Thumbnail → Placeholder
//! ```
//!
//! skipping rungs the set does not populate and rungs that alias the URL
//! that just failed. After `max_retries` errors the loader gives up and
//! shows the placeholder ("image unavailable"), so a dead CDN never loops.

use super::resolve::{DisplayContext, NetworkClass, ResolvedSource, resolve};
use crate::config::DisplayConfig;
use crate::variant::{ImageRef, VariantLabel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderState {
    Original,
    Large,
    Medium,
    Thumbnail,
    Placeholder,
}

impl LadderState {
    pub fn from_label(label: VariantLabel) -> Self {
        match label {
            VariantLabel::Original => LadderState::Original,
            VariantLabel::Large => LadderState::Large,
            VariantLabel::Medium => LadderState::Medium,
            VariantLabel::Thumbnail => LadderState::Thumbnail,
        }
    }

    pub fn label(self) -> Option<VariantLabel> {
        match self {
            LadderState::Original => Some(VariantLabel::Original),
            LadderState::Large => Some(VariantLabel::Large),
            LadderState::Medium => Some(VariantLabel::Medium),
            LadderState::Thumbnail => Some(VariantLabel::Thumbnail),
            LadderState::Placeholder => None,
        }
    }

    /// The next lower-fidelity state. `Placeholder` is terminal.
    pub fn degrade(self) -> Self {
        match self {
            LadderState::Original => LadderState::Large,
            LadderState::Large => LadderState::Medium,
            LadderState::Medium => LadderState::Thumbnail,
            LadderState::Thumbnail | LadderState::Placeholder => LadderState::Placeholder,
        }
    }
}

/// Tracks what one rendered image currently shows.
#[derive(Debug, Clone)]
pub struct ImageLoader {
    image: Option<ImageRef>,
    state: LadderState,
    url: String,
    failures: u32,
    max_retries: u32,
    placeholder: String,
    loaded: bool,
}

impl ImageLoader {
    pub fn new(
        image: Option<ImageRef>,
        context: DisplayContext,
        network: NetworkClass,
        placeholder: &str,
        max_retries: u32,
    ) -> Self {
        let resolved = resolve(image.as_ref(), context, network, placeholder);
        let state = match resolved.source {
            ResolvedSource::Placeholder => LadderState::Placeholder,
            // A bare URL has no siblings; it is the only rung.
            ResolvedSource::Legacy => LadderState::Thumbnail,
            other => other
                .label()
                .map(LadderState::from_label)
                .unwrap_or(LadderState::Placeholder),
        };
        Self {
            image,
            state,
            url: resolved.url,
            failures: 0,
            max_retries: max_retries.max(1),
            placeholder: placeholder.to_string(),
            loaded: false,
        }
    }

    pub fn from_config(
        image: Option<ImageRef>,
        context: DisplayContext,
        network: NetworkClass,
        config: &DisplayConfig,
    ) -> Self {
        Self::new(
            image,
            context,
            network,
            &config.placeholder,
            config.max_retries,
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> LadderState {
        self.state
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// The "image unavailable" state.
    pub fn is_unavailable(&self) -> bool {
        self.state == LadderState::Placeholder
    }

    pub fn on_load(&mut self) {
        self.loaded = true;
    }

    /// Record a load error and move to the next rung. Returns the URL to try
    /// next.
    pub fn on_error(&mut self) -> &str {
        if self.state == LadderState::Placeholder {
            return &self.url;
        }
        self.loaded = false;
        self.failures += 1;

        let next = if self.failures >= self.max_retries {
            None
        } else {
            self.next_rung()
        };
        match next {
            Some((state, url)) => {
                self.state = state;
                self.url = url;
            }
            None => {
                self.state = LadderState::Placeholder;
                self.url = self.placeholder.clone();
            }
        }
        &self.url
    }

    fn next_rung(&self) -> Option<(LadderState, String)> {
        let Some(ImageRef::Variants(set)) = &self.image else {
            return None;
        };
        let mut state = self.state.degrade();
        while let Some(label) = state.label() {
            if let Some(url) = set.get(label)
                && url != self.url
            {
                return Some((state, url.to_string()));
            }
            state = state.degrade();
        }
        None
    }
}
