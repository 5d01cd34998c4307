//! Rally-point search
//!
//! A rally point is a staging tile on the way to a goal: reachable from the
//! force's leader, clear of armed enemies, and about `rally_safety_radius`
//! short of the goal.

use crate::ai::enemy_finder::enemy_units_in_distance;
use crate::ai::force::Force;
use crate::core::config::ForceConfig;
use crate::core::types::{MapLayer, TilePos, UnitId};
use crate::map::{TerrainTraversal, VisitResult};
use crate::world::World;

/// Member whose position the rally search starts from
///
/// The first grounded, non-transport member on the goal's layer, falling
/// back to any member on that layer.
pub fn rally_leader(world: &World, force: &Force, layer: MapLayer) -> Option<UnitId> {
    let candidates: Vec<UnitId> = force
        .units
        .iter()
        .copied()
        .filter(|id| {
            world
                .units
                .get(*id)
                .is_some_and(|u| u.is_alive() && !u.is_embarked() && u.layer == layer)
        })
        .collect();
    candidates
        .iter()
        .copied()
        .find(|id| world.unit_type_of(*id).is_some_and(|t| !t.is_transporter()))
        .or_else(|| candidates.first().copied())
}

/// Find a safe staging point towards `goal`
///
/// Walks outward from the leader and accepts the first standable tile with
/// no armed enemy within the safety radius whose distance to the goal is at
/// most `|leader distance - safety radius|`.
pub fn find_rally_point(
    world: &World,
    force: &Force,
    goal: TilePos,
    layer: MapLayer,
    config: &ForceConfig,
) -> Option<TilePos> {
    assert!(
        world.map.in_bounds(goal, layer),
        "rally goal {:?} is off the map",
        goal
    );
    let leader = rally_leader(world, force, layer)?;
    let unit = world.units.get(leader)?;
    let unit_type = world.catalog.get(unit.unit_type)?;
    let player = unit.owner;
    let safety = config.rally_safety_radius;
    let distance = world.units.distance_to(leader, &world.catalog, goal)?;
    let limit = distance.abs_diff(safety);
    let occupancy = world.units.occupancy(&world.catalog);

    let mut traversal = TerrainTraversal::for_layer(&world.map, layer);
    traversal.push_unit_pos_and_neighbors(unit.pos, unit_type.tile_width, unit_type.tile_height);

    let mut result = None;
    traversal.run(|_: &TerrainTraversal, pos: TilePos, _: TilePos| {
        if !world.map.is_passable_for(unit_type.domain, pos, layer) {
            return VisitResult::DeadEnd;
        }
        if pos.distance(&goal) <= limit
            && !enemy_units_in_distance(world, &occupancy, player, pos, layer, safety)
        {
            result = Some(pos);
            return VisitResult::Finished;
        }
        VisitResult::Ok
    });

    match result {
        Some(pos) => tracing::debug!("Force {:?} rallies at {:?} before {:?}", force.slot, pos, goal),
        None => tracing::debug!("Force {:?} found no rally point towards {:?}", force.slot, goal),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ForceId, PlayerId};
    use crate::map::{GameMap, Terrain};
    use crate::player::Stance;
    use crate::units::{UnitDomain, UnitType, UnitTypeCatalog};

    const RED: PlayerId = PlayerId(0);
    const BLUE: PlayerId = PlayerId(1);

    fn world() -> World {
        let mut catalog = UnitTypeCatalog::new();
        catalog.add(UnitType::new("footman", UnitDomain::Land).with_attack(1));
        catalog.add(UnitType::new("tower", UnitDomain::Land).with_attack(6).as_building());
        catalog.add(UnitType::new("transport", UnitDomain::Naval).with_transport(4));
        let mut world = World::new(GameMap::new(60, 20), catalog);
        world.add_player("red");
        world.add_player("blue");
        world.set_mutual_stance(RED, BLUE, Stance::Enemy);
        world
    }

    fn force_at(world: &mut World, x: i32, y: i32) -> Force {
        let mut force = Force::new(ForceId(0));
        let unit = world.spawn("footman", RED, TilePos::new(x, y), 0).expect("footman");
        force.insert(unit, &mut world.units);
        force
    }

    #[test]
    fn test_rally_point_stops_short_of_defended_goal() {
        let mut world = world();
        let goal = TilePos::new(50, 10);
        world.spawn("tower", BLUE, goal, 0);
        let force = force_at(&mut world, 2, 10);
        let config = ForceConfig::default();

        let rally = find_rally_point(&world, &force, goal, 0, &config).expect("rally point");
        // leader is 48 away, so the point is within 33 of the goal
        assert!(rally.distance(&goal) <= 48 - config.rally_safety_radius);
        assert!(rally.distance(&goal) > config.rally_safety_radius);
        assert!(rally.x < goal.x);
    }

    #[test]
    fn test_no_rally_point_when_goal_area_is_guarded() {
        let mut world = world();
        let goal = TilePos::new(20, 10);
        // Towers everywhere near the goal leave no safe cell close enough
        for x in [10, 20, 30] {
            world.spawn("tower", BLUE, TilePos::new(x, 10), 0);
        }
        let force = force_at(&mut world, 14, 10);
        let config = ForceConfig::default();

        assert_eq!(find_rally_point(&world, &force, goal, 0, &config), None);
    }

    #[test]
    fn test_rally_point_is_standable() {
        let mut world = world();
        world
            .map
            .fill_terrain(TilePos::new(20, 0), TilePos::new(40, 19), 0, Terrain::Water);
        world
            .map
            .fill_terrain(TilePos::new(20, 8), TilePos::new(40, 12), 0, Terrain::Land);
        let goal = TilePos::new(55, 10);
        let force = force_at(&mut world, 2, 10);
        let config = ForceConfig::default();

        let rally = find_rally_point(&world, &force, goal, 0, &config).expect("rally point");
        assert_eq!(world.map.terrain(rally, 0), Some(Terrain::Land));
    }

    #[test]
    fn test_leader_skips_transporters() {
        let mut world = world();
        let mut force = Force::new(ForceId(0));
        let boat = world.spawn("transport", RED, TilePos::new(1, 1), 0).expect("boat");
        let soldier = world.spawn("footman", RED, TilePos::new(3, 3), 0).expect("soldier");
        force.insert(boat, &mut world.units);
        force.insert(soldier, &mut world.units);
        assert_eq!(rally_leader(&world, &force, 0), Some(soldier));
        assert_eq!(rally_leader(&world, &force, 1), None);
    }
}
