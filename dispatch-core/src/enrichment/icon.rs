use super::key::CacheKey;
use crate::visual::{ColorToken, Glyph, tokens_for};

use dispatch_model::Entity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrichmentState {
    Pending,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerIcon {
    pub color: ColorToken,
    pub glyph: Glyph,
    pub initials: String,
    /// PNG thumbnail as a `data:` URI, once enrichment succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
}

impl MarkerIcon {
    /// Deterministic icon built from the entity alone.
    pub fn fallback(entity: &Entity, key: &CacheKey) -> Self {
        let (color, glyph) = tokens_for(entity);
        Self {
            color,
            glyph,
            initials: key.initials.clone(),
            photo: None,
        }
    }

    pub fn with_photo(mut self, data_uri: String) -> Self {
        self.photo = Some(data_uri);
        self
    }
}

/// Immutable cache entry. Resolution replaces the entry, it never edits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: CacheKey,
    pub icon: MarkerIcon,
    pub state: EnrichmentState,
}

impl CacheEntry {
    pub fn is_ready(&self) -> bool {
        self.state == EnrichmentState::Ready
    }
}
