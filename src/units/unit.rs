//! Unit records and the slot-indexed store that owns them
//!
//! The AI reads unit state (alive, idle, position) and writes exactly one
//! field: `group_id`, the weak back-reference to the owning force.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::types::{footprint_distance, ForceId, MapLayer, PlayerId, TilePos, UnitId, UnitTypeId};
use crate::units::unit_type::UnitTypeCatalog;

/// A live (or recently dead) unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub unit_type: UnitTypeId,
    pub owner: PlayerId,
    /// Top-left tile of the footprint
    pub pos: TilePos,
    pub layer: MapLayer,
    pub hp: u32,
    /// No order in progress
    pub idle: bool,
    pub invulnerable: bool,
    /// Bitmask of players that can currently see this unit
    pub visible_to: u32,
    /// Owning force, written only by force insert/remove
    pub group_id: Option<ForceId>,
    /// Transporter this unit is embarked in
    pub transported_by: Option<UnitId>,
    /// Units embarked in this one
    pub passengers: Vec<UnitId>,
}

impl Unit {
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    pub fn is_visible_to(&self, player: PlayerId) -> bool {
        player.index() < 32 && self.visible_to & (1 << player.index()) != 0
    }

    pub fn is_embarked(&self) -> bool {
        self.transported_by.is_some()
    }
}

/// All units of a session, indexed by `UnitId`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitStore {
    units: Vec<Unit>,
}

impl UnitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a unit; it starts idle, at full health, visible to everyone
    pub fn spawn(&mut self, unit_type: UnitTypeId, owner: PlayerId, pos: TilePos, layer: MapLayer) -> UnitId {
        let id = UnitId(self.units.len() as u32);
        self.units.push(Unit {
            id,
            unit_type,
            owner,
            pos,
            layer,
            hp: 100,
            idle: true,
            invulnerable: false,
            visible_to: u32::MAX,
            group_id: None,
            transported_by: None,
            passengers: Vec::new(),
        });
        id
    }

    pub fn get(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Unit> {
        self.units.iter_mut()
    }

    pub fn is_alive(&self, id: UnitId) -> bool {
        self.get(id).is_some_and(|u| u.is_alive())
    }

    /// Alive units of one player
    pub fn owned_by(&self, player: PlayerId) -> impl Iterator<Item = &Unit> {
        self.units
            .iter()
            .filter(move |u| u.owner == player && u.is_alive())
    }

    /// Kill a unit; passengers die with their transporter
    pub fn kill(&mut self, id: UnitId) {
        let passengers = match self.get_mut(id) {
            Some(unit) => {
                unit.hp = 0;
                std::mem::take(&mut unit.passengers)
            }
            None => return,
        };
        for passenger in passengers {
            self.kill(passenger);
        }
    }

    /// Put `passenger` inside `transporter`
    pub fn embark(&mut self, passenger: UnitId, transporter: UnitId) -> bool {
        if passenger == transporter || !self.is_alive(passenger) || !self.is_alive(transporter) {
            return false;
        }
        if let Some(unit) = self.get_mut(passenger) {
            unit.transported_by = Some(transporter);
            unit.idle = true;
        }
        if let Some(carrier) = self.get_mut(transporter) {
            carrier.passengers.push(passenger);
        }
        true
    }

    /// Take `passenger` out of its transporter and place it at `pos`
    pub fn disembark(&mut self, passenger: UnitId, pos: TilePos) {
        let Some(carrier) = self.get(passenger).and_then(|u| u.transported_by) else {
            return;
        };
        if let Some(transporter) = self.get_mut(carrier) {
            transporter.passengers.retain(|p| *p != passenger);
        }
        if let Some(unit) = self.get_mut(passenger) {
            unit.transported_by = None;
            unit.pos = pos;
            unit.idle = true;
        }
    }

    /// Distance from a unit's footprint to a tile
    pub fn distance_to(&self, id: UnitId, catalog: &UnitTypeCatalog, target: TilePos) -> Option<u32> {
        let unit = self.get(id)?;
        let unit_type = catalog.get(unit.unit_type)?;
        Some(footprint_distance(unit.pos, unit_type.tile_width, unit_type.tile_height, target))
    }

    /// Build a tile -> units lookup for the current positions
    ///
    /// Only alive, non-embarked units are indexed.
    pub fn occupancy(&self, catalog: &UnitTypeCatalog) -> OccupancyIndex {
        let mut cells: AHashMap<(MapLayer, TilePos), Vec<UnitId>> = AHashMap::new();
        for unit in self.units.iter().filter(|u| u.is_alive() && !u.is_embarked()) {
            let (w, h) = catalog
                .get(unit.unit_type)
                .map_or((1, 1), |t| (t.tile_width.max(1), t.tile_height.max(1)));
            for dy in 0..h as i32 {
                for dx in 0..w as i32 {
                    let cell = TilePos::new(unit.pos.x + dx, unit.pos.y + dy);
                    cells.entry((unit.layer, cell)).or_default().push(unit.id);
                }
            }
        }
        OccupancyIndex { cells }
    }
}

/// Snapshot of which units stand on which tile
#[derive(Debug, Clone, Default)]
pub struct OccupancyIndex {
    cells: AHashMap<(MapLayer, TilePos), Vec<UnitId>>,
}

impl OccupancyIndex {
    pub fn units_at(&self, layer: MapLayer, pos: TilePos) -> &[UnitId] {
        self.cells.get(&(layer, pos)).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Units touching the square of `radius` around `center`, each once,
    /// ordered by distance from `center`
    pub fn units_in_square(&self, layer: MapLayer, center: TilePos, radius: u32) -> Vec<UnitId> {
        let r = radius as i32;
        let mut nearest: AHashMap<UnitId, u32> = AHashMap::new();
        for y in (center.y - r)..=(center.y + r) {
            for x in (center.x - r)..=(center.x + r) {
                let cell = TilePos::new(x, y);
                let d = cell.distance(&center);
                for id in self.units_at(layer, cell) {
                    let entry = nearest.entry(*id).or_insert(d);
                    *entry = (*entry).min(d);
                }
            }
        }
        let mut found: Vec<(u32, UnitId)> = nearest.into_iter().map(|(id, d)| (d, id)).collect();
        found.sort();
        found.into_iter().map(|(_, id)| id).collect()
    }
}
