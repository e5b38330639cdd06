use std::collections::HashSet;
use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};

#[allow(unused_imports)]
use log::{debug, info, warn, error};

use crate::error::CatalogError;

/// One gallery category: a named, ordered list of image references.
///
/// Image order defines slide order and the first/last grid previews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub images: Vec<String>,
}

impl Card {
    pub fn new(id: &str, title: &str, images: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            images: images.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn first_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    pub fn summary(&self) -> CardSummary {
        CardSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            first_image: self.first_image().map(str::to_string),
        }
    }

    /// Grid tile preview: the first image, plus the last one when there is more than one
    pub fn grid_preview(&self) -> GridPreview {
        let preview_b = if self.images.len() > 1 {
            self.images.last().cloned()
        } else {
            None
        };
        GridPreview {
            id: self.id.clone(),
            title: self.title.clone(),
            preview_a: self.first_image().map(str::to_string),
            preview_b,
        }
    }
}

/// What an edge-card jump target exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardSummary {
    pub id: String,
    pub title: String,
    pub first_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridPreview {
    pub id: String,
    pub title: String,
    pub preview_a: Option<String>,
    pub preview_b: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CardFile {
    cards: Vec<Card>,
}

/// Immutable, ordered set of cards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardCatalog {
    cards: Vec<Card>,
}

impl CardCatalog {
    pub fn new(cards: Vec<Card>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for (i, card) in cards.iter().enumerate() {
            if card.id.trim().is_empty() {
                return Err(CatalogError::EmptyId(i));
            }
            if !seen.insert(card.id.as_str()) {
                return Err(CatalogError::DuplicateId(card.id.clone()));
            }
            if card.images.is_empty() {
                warn!("Card '{}' has no images", card.id);
            }
        }
        Ok(Self { cards })
    }

    /// The three cards shipped with the site
    pub fn builtin() -> Self {
        Self {
            cards: vec![
                Card::new(
                    "cardAakriti",
                    "TECHNICAL AAKRITI",
                    &[
                        "/TECHAAKRITI/p20.jpg",
                        "/TECHAAKRITI/p2.jpg",
                        "/TECHAAKRITI/p23.jpg",
                        "/TECHAAKRITI/p13.jpg",
                        "/TECHAAKRITI/p1.jpg",
                        "/TECHAAKRITI/p19.jpg",
                        "/TECHAAKRITI/p14.jpg",
                    ],
                ),
                Card::new(
                    "cardSolutions",
                    "SOLUTION",
                    &[
                        "/SOLUTIONS/x1.jpg",
                        "/SOLUTIONS/x2.jpg",
                        "/SOLUTIONS/x13.jpg",
                        "/SOLUTIONS/x4.jpg",
                        "/SOLUTIONS/x8.jpg",
                        "/SOLUTIONS/x7.jpg",
                    ],
                ),
                Card::new(
                    "cardElevate",
                    "Fun & Games",
                    &[
                        "/gallery-images/fun3.jpg",
                        "/gallery-images/fun4.jpg",
                        "/gallery-images/fun5.jpg",
                        "/gallery-images/fun11.jpg",
                        "/gallery-images/fun8.jpg",
                        "/gallery-images/fun10.jpg",
                        "/gallery-images/fun9.jpg",
                    ],
                ),
            ],
        }
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, CatalogError> {
        let file: CardFile = serde_yaml::from_str(contents)?;
        Self::new(file.cards)
    }

    /// Load cards from a YAML file of the form `cards: [{id, title, images}]`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_yaml_str(&contents)?;
        info!("Loaded {} cards from {:?}", catalog.len(), path);
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&Card> {
        self.cards.iter().find(|card| card.id == id)
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Every card except `id`, in catalog order
    pub fn others(&self, id: &str) -> Vec<&Card> {
        self.cards.iter().filter(|card| card.id != id).collect()
    }

    pub fn grid_previews(&self) -> Vec<GridPreview> {
        self.cards.iter().map(Card::grid_preview).collect()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}
