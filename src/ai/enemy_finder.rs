//! Target acquisition
//!
//! Two strategies: a cheap square scan around one unit ("is anything in
//! weapon range?") and a flood fill outward from a unit, parameterized by a
//! [`FindType`]. Both return `None` when nothing qualifies; callers back off
//! through the player's scouting flag instead of failing.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::ai::force::Force;
use crate::core::types::{footprint_gap, MapLayer, PlayerId, TilePos, UnitId};
use crate::map::{TerrainTraversal, VisitResult};
use crate::player::Stance;
use crate::units::{OccupancyIndex, Unit, UnitType};
use crate::world::World;

/// What a flood-fill search is looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FindType {
    /// Nearest enemy within weapon range
    InRange,
    /// Nearest enemy building
    Building,
    /// Nearest armed, mobile enemy
    AggressiveUnit,
    /// Nearest enemy of any kind, anywhere reachable
    AnywhereOnMap,
}

impl FindType {
    fn matches(self, unit_type: &UnitType) -> bool {
        match self {
            FindType::Building => unit_type.building,
            FindType::AggressiveUnit => unit_type.is_aggressive(),
            FindType::InRange | FindType::AnywhereOnMap => true,
        }
    }
}

/// Flood-fill tuning
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOptions {
    /// Keep expanding across water (the force can ship units over)
    pub through_water: bool,
    /// Non-passive neutral players count as hostile
    pub include_neutral: bool,
}

/// Something a force can be sent against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    Unit(UnitId),
    /// An enemy-owned wall tile, used as a siege target
    Wall { pos: TilePos, layer: MapLayer },
}

impl Target {
    pub fn position(&self, world: &World) -> Option<(TilePos, MapLayer)> {
        match self {
            Target::Unit(id) => world.units.get(*id).map(|u| (u.pos, u.layer)),
            Target::Wall { pos, layer } => Some((*pos, *layer)),
        }
    }

    /// Owner of the target
    pub fn owner(&self, world: &World) -> Option<PlayerId> {
        match self {
            Target::Unit(id) => world.units.get(*id).map(|u| u.owner),
            Target::Wall { pos, layer } => world.map.wall_owner(*pos, *layer),
        }
    }
}

/// Is `owner` someone `searcher` may attack?
pub fn is_hostile(world: &World, searcher: PlayerId, owner: PlayerId, include_neutral: bool) -> bool {
    if owner == searcher {
        return false;
    }
    match world.stance(searcher, owner) {
        Stance::Enemy => true,
        Stance::Neutral => include_neutral && world.player(owner).is_some_and(|p| !p.passive),
        Stance::Allied => false,
    }
}

/// Alive, visible, targetable, not invulnerable and hostile
pub fn is_valid_target(world: &World, searcher: PlayerId, unit: &Unit, include_neutral: bool) -> bool {
    unit.is_alive()
        && !unit.is_embarked()
        && !unit.invulnerable
        && unit.is_visible_to(searcher)
        && world
            .catalog
            .get(unit.unit_type)
            .is_some_and(|t| !t.untargetable)
        && is_hostile(world, searcher, unit.owner, include_neutral)
}

/// Nearest valid enemy within weapon range of one unit, without flood fill
pub fn find_enemy_in_range(world: &World, occupancy: &OccupancyIndex, unit: UnitId) -> Option<UnitId> {
    let searcher = world.units.get(unit)?;
    let unit_type = world.catalog.get(searcher.unit_type)?;
    if !unit_type.can_attack {
        return None;
    }
    let (w, h) = (unit_type.tile_width.max(1), unit_type.tile_height.max(1));
    let center = TilePos::new(searcher.pos.x + (w as i32 - 1) / 2, searcher.pos.y + (h as i32 - 1) / 2);
    let radius = unit_type.attack_range + w.max(h) / 2;

    occupancy
        .units_in_square(searcher.layer, center, radius)
        .into_iter()
        .filter(|id| *id != unit)
        .filter_map(|id| world.units.get(id))
        .filter(|candidate| is_valid_target(world, searcher.owner, candidate, false))
        .map(|candidate| {
            let (cw, ch) = world
                .catalog
                .get(candidate.unit_type)
                .map_or((1, 1), |t| (t.tile_width, t.tile_height));
            let d = footprint_gap(searcher.pos, w, h, candidate.pos, cw, ch);
            (d, candidate.id)
        })
        .filter(|(d, _)| *d <= unit_type.attack_range)
        .min()
        .map(|(_, id)| id)
}

/// Flood fill outward from one unit looking for an enemy
///
/// Cells the unit cannot stand on are dead ends, unless `through_water` is
/// set and the cell is water: those stay expandable but are never used as
/// target locations. At every accepted cell the units within weapon range
/// are scanned. The first match for `find_type` ends the search; the first
/// attackable non-match is kept as a fallback, and the first hostile wall
/// seen is the last resort.
pub fn find_enemy_from_unit(
    world: &World,
    occupancy: &OccupancyIndex,
    unit: UnitId,
    find_type: FindType,
    options: SearchOptions,
) -> Option<Target> {
    let searcher = world.units.get(unit)?;
    let unit_type = world.catalog.get(searcher.unit_type)?;
    let player = searcher.owner;
    let layer = searcher.layer;
    let range = unit_type.attack_range.max(1);

    let mut traversal = TerrainTraversal::for_layer(&world.map, layer);
    traversal.push_unit_pos_and_neighbors(searcher.pos, unit_type.tile_width, unit_type.tile_height);

    let mut found: Option<UnitId> = None;
    let mut fallback: Option<UnitId> = None;
    let mut wall: Option<TilePos> = None;

    traversal.run(|traversal: &TerrainTraversal, pos: TilePos, _from: TilePos| {
        if wall.is_none() {
            if let Some(owner) = world.map.wall_owner(pos, layer) {
                if is_hostile(world, player, owner, options.include_neutral) {
                    wall = Some(pos);
                }
            }
        }

        if find_type == FindType::InRange && traversal.distance(pos).unwrap_or(0) > 0 {
            return VisitResult::DeadEnd;
        }

        if !world.map.is_passable_for(unit_type.domain, pos, layer) {
            if options.through_water && world.map.is_water(pos, layer) {
                return VisitResult::Ok;
            }
            return VisitResult::DeadEnd;
        }

        for candidate in occupancy.units_in_square(layer, pos, range) {
            if candidate == unit {
                continue;
            }
            let Some(enemy) = world.units.get(candidate) else {
                continue;
            };
            if !is_valid_target(world, player, enemy, options.include_neutral) {
                continue;
            }
            let Some(enemy_type) = world.catalog.get(enemy.unit_type) else {
                continue;
            };
            if find_type.matches(enemy_type) {
                found = Some(candidate);
                return VisitResult::Finished;
            }
            if fallback.is_none() {
                fallback = Some(candidate);
            }
        }
        VisitResult::Ok
    });

    let result = found
        .or(fallback)
        .map(Target::Unit)
        .or(wall.map(|pos| Target::Wall { pos, layer }));
    tracing::trace!("Unit {:?} {:?} search -> {:?}", unit, find_type, result);
    result
}

/// Search from each member of a force until one finds something
///
/// Embarked members are skipped, and so is every unit whose type has
/// already been searched from. Transporters only search when the force has
/// nothing else; their presence lets the others look across water.
pub fn find_enemy_for_force(
    world: &World,
    force: &Force,
    find_type: FindType,
    options: SearchOptions,
) -> Option<Target> {
    let occupancy = world.units.occupancy(&world.catalog);
    let transporters = force.transporters(&world.units, &world.catalog);
    let options = SearchOptions {
        through_water: options.through_water || !transporters.is_empty(),
        ..options
    };
    let only_transporters = force.units.iter().all(|id| transporters.contains(id));

    let mut checked = AHashSet::new();
    for id in &force.units {
        let Some(unit) = world.units.get(*id) else {
            continue;
        };
        if !unit.is_alive() || unit.is_embarked() {
            continue;
        }
        if !only_transporters && transporters.contains(id) {
            continue;
        }
        if !checked.insert(unit.unit_type) {
            continue;
        }
        if let Some(target) = find_enemy_from_unit(world, &occupancy, *id, find_type, options) {
            tracing::debug!("Force {:?} found {:?} via {:?}", force.slot, target, find_type);
            return Some(target);
        }
    }
    tracing::debug!("Force {:?} found nothing via {:?}", force.slot, find_type);
    None
}

/// Any armed hostile unit within `range` of `pos`?
pub fn enemy_units_in_distance(
    world: &World,
    occupancy: &OccupancyIndex,
    player: PlayerId,
    pos: TilePos,
    layer: MapLayer,
    range: u32,
) -> bool {
    occupancy
        .units_in_square(layer, pos, range)
        .into_iter()
        .filter_map(|id| world.units.get(id))
        .any(|unit| {
            is_valid_target(world, player, unit, false)
                && world.catalog.get(unit.unit_type).is_some_and(|t| t.can_attack)
        })
}
