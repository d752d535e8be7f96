//! PokeAPI request/response types

use serde::{Deserialize, Serialize};
use sightline_core::EntityId;
use std::collections::BTreeMap;

/// `{name, url}` reference used throughout PokeAPI.
#[derive(Debug, Clone, Deserialize)]
pub struct NamedResource {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypeSlot {
    pub slot: u32,
    #[serde(rename = "type")]
    pub kind: NamedResource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbilitySlot {
    pub slot: u32,
    #[serde(default)]
    pub is_hidden: bool,
    pub ability: NamedResource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatEntry {
    pub base_stat: i64,
    pub stat: NamedResource,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sprites {
    pub front_default: Option<String>,
}

/// Subset of `GET /pokemon/{id}` that the summary needs.
#[derive(Debug, Clone, Deserialize)]
pub struct PokemonResponse {
    pub id: EntityId,
    pub name: String,
    pub height: i64,
    pub weight: i64,
    #[serde(default)]
    pub types: Vec<TypeSlot>,
    #[serde(default)]
    pub abilities: Vec<AbilitySlot>,
    #[serde(default)]
    pub stats: Vec<StatEntry>,
    #[serde(default)]
    pub sprites: Sprites,
}

/// Compact entity record stored as the enrichment payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub id: EntityId,
    pub name: String,
    /// Type names in slot order
    pub types: Vec<String>,
    /// Non-hidden abilities first, each group in slot order
    pub abilities: Vec<String>,
    pub base_stats: BTreeMap<String, i64>,
    /// Decimetres
    pub height: i64,
    /// Hectograms
    pub weight: i64,
    pub sprite_url: Option<String>,
}

impl From<PokemonResponse> for EntitySummary {
    fn from(mut response: PokemonResponse) -> Self {
        response.types.sort_by_key(|t| t.slot);
        response
            .abilities
            .sort_by_key(|a| (a.is_hidden, a.slot));

        Self {
            id: response.id,
            name: response.name.trim().to_lowercase(),
            types: response.types.into_iter().map(|t| t.kind.name).collect(),
            abilities: response
                .abilities
                .into_iter()
                .map(|a| a.ability.name)
                .collect(),
            base_stats: response
                .stats
                .into_iter()
                .map(|s| (s.stat.name, s.base_stat))
                .collect(),
            height: response.height,
            weight: response.weight,
            sprite_url: response.sprites.front_default,
        }
    }
}
