//! Player / faction data consumed by the force AI
//!
//! Diplomacy, production capability and resource pressure. The AI reads
//! these and writes only one thing back: escalating a stance to war.

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};

use crate::core::types::{PlayerId, UnitTypeId};

/// Resources unit types may cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Gold,
    Wood,
    Stone,
    Oil,
    Food,
}

/// Diplomatic stance of one player towards another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Stance {
    Allied,
    #[default]
    Neutral,
    Enemy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Passive neutrals (critters, nature) are never attacked
    pub passive: bool,
    /// Whether a worker exists that could rebuild a town hall
    pub can_build_town_hall: bool,
    diplomacy: AHashMap<PlayerId, Stance>,
    /// Types the player currently has a producer for
    pub producible: AHashSet<UnitTypeId>,
    /// Resources the economy is short on
    pub scarce: AHashSet<ResourceKind>,
    /// Units already queued in production, by type
    pub queued: AHashMap<UnitTypeId, u32>,
}

impl Player {
    pub fn new(id: PlayerId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            passive: false,
            can_build_town_hall: true,
            diplomacy: AHashMap::new(),
            producible: AHashSet::new(),
            scarce: AHashSet::new(),
            queued: AHashMap::new(),
        }
    }

    /// Stance towards `other`; unset stances are neutral
    pub fn stance_towards(&self, other: PlayerId) -> Stance {
        if other == self.id {
            return Stance::Allied;
        }
        self.diplomacy.get(&other).copied().unwrap_or_default()
    }

    pub fn set_stance(&mut self, other: PlayerId, stance: Stance) {
        if other != self.id {
            self.diplomacy.insert(other, stance);
        }
    }

    pub fn is_enemy_of(&self, other: PlayerId) -> bool {
        self.stance_towards(other) == Stance::Enemy
    }

    pub fn can_produce(&self, unit_type: UnitTypeId) -> bool {
        self.producible.contains(&unit_type)
    }

    pub fn is_scarce(&self, resource: ResourceKind) -> bool {
        self.scarce.contains(&resource)
    }

    pub fn queued_count(&self, unit_type: UnitTypeId) -> u32 {
        self.queued.get(&unit_type).copied().unwrap_or(0)
    }
}
