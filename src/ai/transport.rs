//! Seaborne attack logistics
//!
//! A land force whose goal lies on another landmass needs transporters. The
//! [`TransportPlanner`] picks where to land; the force then boards, sails,
//! unloads and continues as a normal land attack from the landing site.

use crate::ai::force::{Force, ForceState};
use crate::ai::ForceContext;
use crate::core::types::{MapLayer, PlayerId, TilePos, UnitId};
use crate::map::{GameMap, Terrain, TerrainTraversal, VisitResult};
use crate::units::{OrderKind, UnitDomain};
use crate::world::World;

/// Plans the sea leg of an attack
pub trait TransportPlanner {
    /// Prepare a transported attack on `goal`
    ///
    /// On success the force's goal is the landing tile and its state is
    /// Boarding. Returns false if the attack cannot be shipped.
    fn plan_attack(&mut self, force: &mut Force, world: &World, goal: TilePos, layer: MapLayer) -> bool;
}

/// Lands on the coast tile of the goal's landmass closest to the goal
#[derive(Debug, Clone, Copy, Default)]
pub struct CoastalTransportPlanner;

impl TransportPlanner for CoastalTransportPlanner {
    fn plan_attack(&mut self, force: &mut Force, world: &World, goal: TilePos, layer: MapLayer) -> bool {
        if !world.map.in_bounds(goal, layer) {
            return false;
        }
        let capacity = transport_capacity(world, force);
        let passengers = passengers(world, force).len() as u32;
        if passengers == 0 || capacity < passengers {
            tracing::debug!(
                "Force {:?} cannot ship {} passengers with capacity {}",
                force.slot,
                passengers,
                capacity
            );
            return false;
        }
        let Some(landing) = find_landing_site(&world.map, goal, layer) else {
            tracing::debug!("Force {:?} found no landing site near {:?}", force.slot, goal);
            return false;
        };
        tracing::info!(
            "Force {:?} boarding {} passengers to land at {:?}",
            force.slot,
            passengers,
            landing
        );
        force.goal = landing;
        force.goal_layer = layer;
        force.state = ForceState::Boarding;
        true
    }
}

/// Landmass of a goal tile; walls and rock take the first neighbouring land
pub fn goal_landmass(map: &GameMap, goal: TilePos, layer: MapLayer) -> u32 {
    let own = map.landmass(goal, layer);
    if own != 0 {
        return own;
    }
    goal.neighbors()
        .iter()
        .filter(|n| map.terrain(**n, layer) == Some(Terrain::Land))
        .map(|n| map.landmass(*n, layer))
        .find(|id| *id != 0)
        .unwrap_or(0)
}

/// Coast tile of the goal's landmass nearest to the goal
pub fn find_landing_site(map: &GameMap, goal: TilePos, layer: MapLayer) -> Option<TilePos> {
    let landmass = goal_landmass(map, goal, layer);
    if landmass == 0 || map.is_water(goal, layer) {
        return None;
    }
    let mut traversal = TerrainTraversal::for_layer(map, layer);
    traversal.push_pos(goal);
    let mut site = None;
    traversal.run(|_: &TerrainTraversal, pos: TilePos, _: TilePos| {
        if map.is_water(pos, layer) {
            return VisitResult::DeadEnd;
        }
        if map.landmass(pos, layer) == landmass && map.is_coast(pos, layer) {
            site = Some(pos);
            return VisitResult::Finished;
        }
        VisitResult::Ok
    });
    site
}

/// Does the player have, or can it build, any transporter?
pub fn transport_obtainable(world: &World, player: PlayerId) -> bool {
    let owns = world
        .units
        .owned_by(player)
        .any(|u| world.catalog.get(u.unit_type).is_some_and(|t| t.is_transporter()));
    owns || world.player(player).is_some_and(|p| {
        world
            .catalog
            .iter()
            .any(|t| t.is_transporter() && p.can_produce(t.id))
    })
}

/// Total capacity of the force's alive transporters
pub fn transport_capacity(world: &World, force: &Force) -> u32 {
    force
        .transporters(&world.units, &world.catalog)
        .iter()
        .filter_map(|id| world.unit_type_of(*id))
        .map(|t| t.transport_capacity)
        .sum()
}

/// Members that walk and therefore have to be shipped
pub fn passengers(world: &World, force: &Force) -> Vec<UnitId> {
    force
        .units
        .iter()
        .copied()
        .filter(|id| {
            world.units.get(*id).is_some_and(|u| u.is_alive())
                && world
                    .unit_type_of(*id)
                    .is_some_and(|t| t.domain == UnitDomain::Land && !t.is_transporter())
        })
        .collect()
}

impl Force {
    /// Grounded members standing on another landmass than the goal
    pub fn members_needing_crossing(&self, world: &World, goal: TilePos, layer: MapLayer) -> usize {
        let target = goal_landmass(&world.map, goal, layer);
        if target == 0 || world.map.is_water(goal, layer) {
            return 0;
        }
        passengers(world, self)
            .into_iter()
            .filter_map(|id| world.units.get(id))
            .filter(|u| !u.is_embarked() && u.layer == layer)
            .filter(|u| world.map.landmass(u.pos, layer) != target)
            .count()
    }

    /// Make sure enough transport capacity is in the force
    ///
    /// When some member must cross, idle transporters of the player that
    /// belong to no force are pulled in until every passenger fits, since
    /// the whole force boards together. Returns true when ready.
    pub fn check_transporters(&mut self, ctx: &mut ForceContext<'_>, goal: TilePos, layer: MapLayer) -> bool {
        if self.members_needing_crossing(ctx.world, goal, layer) == 0 {
            return true;
        }
        let needed = passengers(ctx.world, self).len() as u32;
        let mut capacity = transport_capacity(ctx.world, self);
        if capacity >= needed {
            return true;
        }

        let spare: Vec<(UnitId, u32)> = ctx
            .world
            .units
            .owned_by(ctx.ai.player)
            .filter(|u| u.group_id.is_none() && u.idle && !u.is_embarked())
            .filter_map(|u| {
                ctx.world
                    .catalog
                    .get(u.unit_type)
                    .filter(|t| t.is_transporter())
                    .map(|t| (u.id, t.transport_capacity))
            })
            .collect();
        for (transporter, room) in spare {
            if capacity >= needed {
                break;
            }
            self.insert(transporter, &mut ctx.world.units);
            capacity += room;
            tracing::debug!("Force {:?} requisitioned transporter {:?}", self.slot, transporter);
        }

        if capacity < needed {
            tracing::debug!(
                "Force {:?} waits for transport: {} to ship, capacity {}",
                self.slot,
                needed,
                capacity
            );
        }
        capacity >= needed
    }

    /// Boarding: send passengers aboard, sail once everyone is in
    pub(crate) fn update_boarding(&mut self, ctx: &mut ForceContext<'_>) {
        let transporters = self.transporters(&ctx.world.units, &ctx.world.catalog);
        if transporters.is_empty() {
            tracing::debug!("Force {:?} lost its transporters while boarding", self.slot);
            self.return_to_home(ctx);
            return;
        }

        let waiting: Vec<UnitId> = passengers(ctx.world, self)
            .into_iter()
            .filter(|id| ctx.world.units.get(*id).is_some_and(|u| !u.is_embarked()))
            .collect();

        if waiting.is_empty() {
            for (index, transporter) in transporters.iter().enumerate() {
                ctx.directives.order(
                    *transporter,
                    OrderKind::Unload {
                        pos: self.goal,
                        layer: self.goal_layer,
                    },
                    index as u32,
                );
            }
            tracing::info!("Force {:?} sailing to {:?}", self.slot, self.goal);
            self.state = ForceState::AttackingWithTransporter;
            return;
        }

        let mut free_room: Vec<(UnitId, u32)> = transporters
            .iter()
            .filter_map(|id| {
                let unit = ctx.world.units.get(*id)?;
                let capacity = ctx.world.catalog.get(unit.unit_type)?.transport_capacity;
                Some((*id, capacity.saturating_sub(unit.passengers.len() as u32)))
            })
            .collect();

        let mut stranded = Vec::new();
        for (index, passenger) in waiting.iter().enumerate() {
            let Some(slot) = free_room.iter_mut().find(|(_, room)| *room > 0) else {
                stranded.push(*passenger);
                continue;
            };
            slot.1 -= 1;
            let idle = ctx.world.units.get(*passenger).is_some_and(|u| u.idle);
            if idle {
                ctx.directives
                    .order(*passenger, OrderKind::Board(slot.0), index as u32);
            }
        }

        // Whoever does not fit stays behind
        for passenger in stranded {
            tracing::debug!("Force {:?} leaves {:?} ashore", self.slot, passenger);
            self.remove(passenger, &mut ctx.world.units);
        }
    }

    /// Ferried: keep unloading until everybody is ashore
    pub(crate) fn update_transported(&mut self, ctx: &mut ForceContext<'_>) {
        let transporters = self.transporters(&ctx.world.units, &ctx.world.catalog);
        if transporters.is_empty() {
            tracing::info!("Force {:?} lost every transporter, disbanding", self.slot);
            self.reset(true, &mut ctx.world.units);
            return;
        }

        let aboard = self
            .units
            .iter()
            .any(|id| ctx.world.units.get(*id).is_some_and(|u| u.is_alive() && u.is_embarked()));
        if !aboard {
            tracing::debug!("Force {:?} landed, heading for {:?}", self.slot, self.goal);
            self.state = ForceState::GoingToRallyPoint;
            self.wait_on_rally_point = ctx.config.rally_wait_ticks;
            return;
        }

        for (index, transporter) in transporters.iter().enumerate() {
            let carrying = ctx
                .world
                .units
                .get(*transporter)
                .is_some_and(|u| u.idle && !u.passengers.is_empty());
            if carrying {
                ctx.directives.order(
                    *transporter,
                    OrderKind::Unload {
                        pos: self.goal,
                        layer: self.goal_layer,
                    },
                    index as u32,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ForceId;
    use crate::units::{UnitType, UnitTypeCatalog};

    const RED: PlayerId = PlayerId(0);

    /// Two islands split by a channel at x in 10..=19
    fn world() -> World {
        let mut catalog = UnitTypeCatalog::new();
        catalog.add(UnitType::new("footman", UnitDomain::Land).with_attack(1));
        catalog.add(UnitType::new("transport", UnitDomain::Naval).with_transport(2));
        let mut map = GameMap::new(30, 10);
        map.fill_terrain(TilePos::new(10, 0), TilePos::new(19, 9), 0, Terrain::Water);
        map.compute_landmasses();
        let mut world = World::new(map, catalog);
        world.add_player("red");
        world
    }

    fn spawn(world: &mut World, force: &mut Force, name: &str, x: i32, y: i32) -> UnitId {
        let id = world.spawn(name, RED, TilePos::new(x, y), 0).expect("unit");
        force.insert(id, &mut world.units);
        id
    }

    #[test]
    fn test_landing_site_is_coast_of_goal_island() {
        let world = world();
        let site = find_landing_site(&world.map, TilePos::new(26, 5), 0).expect("landing site");
        assert_eq!(site.x, 20);
        assert!(world.map.is_coast(site, 0));
        assert_eq!(find_landing_site(&world.map, TilePos::new(15, 5), 0), None);
    }

    #[test]
    fn test_crossing_detection() {
        let mut world = world();
        let mut force = Force::new(ForceId(0));
        spawn(&mut world, &mut force, "footman", 2, 2);
        assert_eq!(force.members_needing_crossing(&world, TilePos::new(25, 5), 0), 1);
        assert_eq!(force.members_needing_crossing(&world, TilePos::new(5, 5), 0), 0);
        assert_eq!(force.members_needing_crossing(&world, TilePos::new(15, 5), 0), 0);

        spawn(&mut world, &mut force, "transport", 10, 2);
        assert_eq!(force.members_needing_crossing(&world, TilePos::new(25, 5), 0), 1);
    }

    #[test]
    fn test_planner_sets_boarding() {
        let mut world = world();
        let mut force = Force::new(ForceId(0));
        spawn(&mut world, &mut force, "footman", 2, 2);
        spawn(&mut world, &mut force, "transport", 10, 2);
        let mut planner = CoastalTransportPlanner;

        assert!(planner.plan_attack(&mut force, &world, TilePos::new(26, 5), 0));
        assert_eq!(force.state, ForceState::Boarding);
        assert_eq!(force.goal.x, 20);
    }

    #[test]
    fn test_planner_rejects_more_passengers_than_seats() {
        let mut world = world();
        let mut force = Force::new(ForceId(0));
        for y in 1..4 {
            spawn(&mut world, &mut force, "footman", 2, y);
        }
        spawn(&mut world, &mut force, "transport", 10, 2);
        let mut planner = CoastalTransportPlanner;

        assert!(!planner.plan_attack(&mut force, &world, TilePos::new(26, 5), 0));
        assert_eq!(force.state, ForceState::Free);
        assert_eq!(force.size(), 4);
    }

    #[test]
    fn test_planner_needs_capacity() {
        let mut world = world();
        let mut force = Force::new(ForceId(0));
        spawn(&mut world, &mut force, "footman", 2, 2);
        let mut planner = CoastalTransportPlanner;

        assert!(!planner.plan_attack(&mut force, &world, TilePos::new(26, 5), 0));
        assert_eq!(force.state, ForceState::Free);
    }
}
