//! The simulation state the force AI reads from
//!
//! Bundles the map, the unit store, the unit-type catalog and the players.
//! The AI treats the map and catalog as read-only; it mutates units only
//! through force membership and players only through stance escalation.

use crate::core::types::{MapLayer, PlayerId, Tick, TilePos, UnitId};
use crate::map::GameMap;
use crate::player::{Player, Stance};
use crate::units::{UnitStore, UnitType, UnitTypeCatalog};

#[derive(Debug, Clone)]
pub struct World {
    pub map: GameMap,
    pub units: UnitStore,
    pub catalog: UnitTypeCatalog,
    pub players: Vec<Player>,
    pub tick: Tick,
}

impl World {
    pub fn new(map: GameMap, catalog: UnitTypeCatalog) -> Self {
        Self {
            map,
            units: UnitStore::new(),
            catalog,
            players: Vec::new(),
            tick: 0,
        }
    }

    /// Register a player, returning its id
    pub fn add_player(&mut self, name: &str) -> PlayerId {
        let id = PlayerId(self.players.len() as u8);
        self.players.push(Player::new(id, name));
        id
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id.index())
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id.index())
    }

    /// Set a stance in both directions
    pub fn set_mutual_stance(&mut self, a: PlayerId, b: PlayerId, stance: Stance) {
        if let Some(player) = self.player_mut(a) {
            player.set_stance(b, stance);
        }
        if let Some(player) = self.player_mut(b) {
            player.set_stance(a, stance);
        }
    }

    pub fn stance(&self, from: PlayerId, towards: PlayerId) -> Stance {
        self.player(from)
            .map_or(Stance::Neutral, |p| p.stance_towards(towards))
    }

    pub fn spawn(&mut self, type_name: &str, owner: PlayerId, pos: TilePos, layer: MapLayer) -> Option<UnitId> {
        let unit_type = self.catalog.by_name(type_name)?;
        Some(self.units.spawn(unit_type, owner, pos, layer))
    }

    /// Type of a unit
    pub fn unit_type_of(&self, unit: UnitId) -> Option<&UnitType> {
        self.units
            .get(unit)
            .and_then(|u| self.catalog.get(u.unit_type))
    }

    /// Alive town halls owned by a player
    pub fn town_hall_count(&self, player: PlayerId) -> usize {
        self.units
            .owned_by(player)
            .filter(|u| self.catalog.get(u.unit_type).is_some_and(|t| t.town_hall))
            .count()
    }

    /// Advance the world clock by one tick
    pub fn tick(&mut self) {
        self.tick += 1;
    }
}
