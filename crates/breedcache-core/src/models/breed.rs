use serde::{Deserialize, Serialize};

/// Base URL for breed reference images on the Cat API CDN
const IMAGE_CDN_BASE_URL: &str = "https://cdn2.thecatapi.com/images";

/// Lowest and highest value a trait score can take
const MIN_TRAIT_SCORE: u8 = 1;
const MAX_TRAIT_SCORE: u8 = 5;

// ============================================================================
// Domain type
// ============================================================================

/// A single catalog entry (one cat breed).
///
/// `id` never changes once created. `is_favorite` is the only field that is
/// mutated outside of a full refetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    /// Ordered image URLs, the first one is the primary image
    pub images: Vec<String>,
    pub description: String,
    pub temperament: String,
    pub origin: String,
    pub life_span: String,
    pub weight: String,
    pub traits: TraitScores,
    /// 0 or 1, as the API encodes it
    pub hypoallergenic: u8,
    pub wikipedia_url: Option<String>,
    pub is_favorite: bool,
}

/// Trait scores on a 1-5 scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitScores {
    pub affection: u8,
    pub child_friendly: u8,
    pub stranger_friendly: u8,
}

impl TraitScores {
    pub fn new(affection: u8, child_friendly: u8, stranger_friendly: u8) -> Self {
        Self {
            affection: clamp_score(affection),
            child_friendly: clamp_score(child_friendly),
            stranger_friendly: clamp_score(stranger_friendly),
        }
    }
}

impl Default for TraitScores {
    fn default() -> Self {
        Self::new(MIN_TRAIT_SCORE, MIN_TRAIT_SCORE, MIN_TRAIT_SCORE)
    }
}

fn clamp_score(score: u8) -> u8 {
    score.clamp(MIN_TRAIT_SCORE, MAX_TRAIT_SCORE)
}

impl CatalogItem {
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    pub fn is_hypoallergenic(&self) -> bool {
        self.hypoallergenic == 1
    }
}

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeightResponse {
    pub imperial: Option<String>,
    pub metric: Option<String>,
}

impl WeightResponse {
    fn display(&self) -> String {
        match (&self.metric, &self.imperial) {
            (Some(metric), _) => format!("{} kg", metric),
            (None, Some(imperial)) => format!("{} lbs", imperial),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRef {
    pub id: Option<String>,
    pub url: Option<String>,
}

/// Breed as returned by `v1/breeds`, `v1/breeds/{id}` and `v1/breeds/search`.
/// Only the fields the catalog keeps are declared; the rest are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreedResponse {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub temperament: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub life_span: Option<String>,
    #[serde(default)]
    pub weight: Option<WeightResponse>,
    #[serde(default)]
    pub affection_level: Option<u8>,
    #[serde(default)]
    pub child_friendly: Option<u8>,
    #[serde(default)]
    pub stranger_friendly: Option<u8>,
    #[serde(default)]
    pub hypoallergenic: Option<u8>,
    #[serde(default)]
    pub wikipedia_url: Option<String>,
    #[serde(default)]
    pub reference_image_id: Option<String>,
    #[serde(default)]
    pub image: Option<ImageRef>,
}

impl BreedResponse {
    /// Primary image URL, falling back to the CDN URL built from the reference id
    fn primary_image_url(&self) -> Option<String> {
        self.image
            .as_ref()
            .and_then(|img| img.url.clone())
            .or_else(|| {
                self.reference_image_id
                    .as_ref()
                    .map(|id| format!("{}/{}.jpg", IMAGE_CDN_BASE_URL, id))
            })
    }

    /// Convert to the domain type. Freshly fetched items are never favorites;
    /// favorite status is local state and gets reconciled on merge.
    pub fn to_item(&self) -> CatalogItem {
        CatalogItem {
            id: self.id.clone(),
            name: self.name.clone(),
            images: self.primary_image_url().into_iter().collect(),
            description: self.description.clone().unwrap_or_default(),
            temperament: self.temperament.clone().unwrap_or_default(),
            origin: self.origin.clone().unwrap_or_default(),
            life_span: self.life_span.clone().unwrap_or_default(),
            weight: self.weight.as_ref().map(|w| w.display()).unwrap_or_default(),
            traits: TraitScores::new(
                self.affection_level.unwrap_or(MIN_TRAIT_SCORE),
                self.child_friendly.unwrap_or(MIN_TRAIT_SCORE),
                self.stranger_friendly.unwrap_or(MIN_TRAIT_SCORE),
            ),
            hypoallergenic: self.hypoallergenic.unwrap_or(0).min(1),
            wikipedia_url: self.wikipedia_url.clone().filter(|url| !url.is_empty()),
            is_favorite: false,
        }
    }
}

/// Image as returned by `v1/images/search`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResponse {
    pub id: String,
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}
