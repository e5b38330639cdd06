//! Gallery session: which card is open, its slider, and its preload hints.
//!
//! At most one hint set is installed at any time. Opening a card clears the
//! previous set before installing the new one; closing and dropping the
//! session clear it as well.

use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;

#[allow(unused_imports)]
use log::{debug, info, warn, error};

use crate::card::{CardCatalog, CardSummary, GridPreview};
use crate::config::Config;
use crate::navigation::{DecodeCompletion, DecodeRequest, SlideEffect, SlideKey, Slider, Thumbnail};
use crate::preload::{HintSet, PreloadLinks, ResourceHintQueue};

/// User intents consumed by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    OpenCard(String),
    Navigate(usize),
    Prev,
    Next,
    Close,
    OpenEdge(String),
    Key(SlideKey),
}

/// Side effects the host performs on behalf of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    Decode(DecodeRequest),
    Warm { reference: String, delay: Duration },
    WarmHero { reference: String, max_wait: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SliderView {
    pub card_id: String,
    pub title: String,
    pub current_image: Option<String>,
    pub current_index: usize,
    pub total: usize,
    pub is_clarifying: bool,
    pub alt_text: String,
    pub thumbnails: Vec<Thumbnail>,
    pub left_edge: Option<CardSummary>,
    pub right_edge: Option<CardSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "lowercase")]
pub enum View {
    Grid { cards: Vec<GridPreview> },
    Slider(SliderView),
}

pub struct GallerySession<Q: ResourceHintQueue> {
    catalog: Arc<CardCatalog>,
    hints: Q,
    links: PreloadLinks,
    installed: HintSet,
    selected: Option<String>,
    slider: Option<Slider>,
    start_index: usize,
    mounts: u64,
    prefetch_delay: Duration,
    hero_wait: Duration,
}

impl<Q: ResourceHintQueue> GallerySession<Q> {
    pub fn new(catalog: Arc<CardCatalog>, hints: Q, config: &Config) -> Self {
        Self {
            catalog,
            hints,
            links: PreloadLinks::new(config.preload_lookahead),
            installed: HintSet::default(),
            selected: None,
            slider: None,
            start_index: 0,
            mounts: 0,
            prefetch_delay: config.neighbor_prefetch_delay,
            hero_wait: config.hero_warm_timeout,
        }
    }

    /// Opens `card_id` at its first image. Unknown ids are ignored.
    pub fn open(&mut self, card_id: &str) -> Vec<SessionEffect> {
        let Some(card) = self.catalog.get(card_id) else {
            debug!("No card '{}', ignoring open", card_id);
            return Vec::new();
        };
        let images = card.images.clone();

        self.links.clear(&mut self.hints, &mut self.installed);
        self.installed = self.links.install(&mut self.hints, &images, 0);

        let mut effects = Vec::new();
        if let Some(hero) = images.first() {
            effects.push(SessionEffect::WarmHero {
                reference: hero.clone(),
                max_wait: self.hero_wait,
            });
        }

        self.start_index = 0;
        self.selected = Some(card_id.to_string());

        // A fresh mount id makes completions for the previous card stale
        self.mounts += 1;
        let (slider, slide_effects) = Slider::new(images, self.start_index, self.mounts, self.prefetch_delay);
        self.slider = Some(slider);
        info!("Opened card '{}'", card_id);

        effects.extend(self.absorb(slide_effects));
        effects
    }

    /// Jump straight from the open slider to a sibling card.
    pub fn open_other(&mut self, card_id: &str) -> Vec<SessionEffect> {
        debug!("Edge jump to '{}'", card_id);
        self.open(card_id)
    }

    pub fn close(&mut self) {
        self.links.clear(&mut self.hints, &mut self.installed);
        if let Some(card_id) = self.selected.take() {
            info!("Closed card '{}'", card_id);
        }
        self.slider = None;
        self.start_index = 0;
    }

    pub fn update(&mut self, intent: Intent) -> Vec<SessionEffect> {
        match intent {
            Intent::OpenCard(id) => self.open(&id),
            Intent::OpenEdge(id) => {
                if self.slider.is_some() {
                    self.open_other(&id)
                } else {
                    self.open(&id)
                }
            }
            Intent::Close => {
                self.close();
                Vec::new()
            }
            Intent::Navigate(index) => {
                let index = isize::try_from(index).unwrap_or(isize::MAX);
                self.with_slider(|slider| slider.go_to(index))
            }
            Intent::Prev => self.with_slider(Slider::prev),
            Intent::Next => self.with_slider(Slider::next),
            Intent::Key(key) => self.with_slider(|slider| slider.handle_key(key)),
        }
    }

    pub fn on_decode_finished(&mut self, completion: &DecodeCompletion) -> Vec<SessionEffect> {
        self.with_slider(|slider| slider.on_decode_finished(completion))
    }

    // Slider intents are dropped while no slider is mounted
    fn with_slider<F>(&mut self, f: F) -> Vec<SessionEffect>
    where
        F: FnOnce(&mut Slider) -> Vec<SlideEffect>,
    {
        match self.slider.as_mut() {
            Some(slider) => {
                let effects = f(slider);
                self.absorb(effects)
            }
            None => Vec::new(),
        }
    }

    fn absorb(&mut self, effects: Vec<SlideEffect>) -> Vec<SessionEffect> {
        let mut out = Vec::with_capacity(effects.len());
        for effect in effects {
            match effect {
                SlideEffect::Decode(request) => out.push(SessionEffect::Decode(request)),
                SlideEffect::Warm { reference, delay } => out.push(SessionEffect::Warm { reference, delay }),
                SlideEffect::Exit => {
                    self.close();
                    // Nothing queued before the exit may outlive the slider
                    out.clear();
                    break;
                }
            }
        }
        out
    }

    /// Edge jump targets: the first two other cards, left then right
    pub fn edge_cards(&self) -> (Option<CardSummary>, Option<CardSummary>) {
        let Some(selected) = self.selected.as_deref() else {
            return (None, None);
        };
        let others = self.catalog.others(selected);
        (
            others.first().map(|card| card.summary()),
            others.get(1).map(|card| card.summary()),
        )
    }

    pub fn view(&self) -> View {
        match (&self.slider, self.selected.as_deref().and_then(|id| self.catalog.get(id))) {
            (Some(slider), Some(card)) => {
                let (left_edge, right_edge) = self.edge_cards();
                View::Slider(SliderView {
                    card_id: card.id.clone(),
                    title: card.title.clone(),
                    current_image: slider.current_image().map(str::to_string),
                    current_index: slider.current_index(),
                    total: slider.len(),
                    is_clarifying: slider.is_clarifying(),
                    alt_text: slider.alt_text(),
                    thumbnails: slider.thumbnails(),
                    left_edge,
                    right_edge,
                })
            }
            _ => View::Grid { cards: self.catalog.grid_previews() },
        }
    }

    pub fn selected_card(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn slider(&self) -> Option<&Slider> {
        self.slider.as_ref()
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn installed_hints(&self) -> &HintSet {
        &self.installed
    }

    pub fn catalog(&self) -> &CardCatalog {
        &self.catalog
    }
}

impl<Q: ResourceHintQueue> Drop for GallerySession<Q> {
    fn drop(&mut self) {
        self.links.clear(&mut self.hints, &mut self.installed);
    }
}
