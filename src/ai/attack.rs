//! Attack orchestration
//!
//! Turns "attack position P" into unit orders and advances an attacking
//! force one tick at a time. Search failures never raise: the player's
//! scouting flag is set and the force waits. Losing the means to fight ends
//! in [`Force::reset`].

use crate::ai::enemy_finder::{
    enemy_units_in_distance, find_enemy_for_force, find_enemy_in_range, FindType, SearchOptions, Target,
};
use crate::ai::force::{Force, ForceState, ForceType};
use crate::ai::rally_point::find_rally_point;
use crate::ai::transport::transport_obtainable;
use crate::ai::ForceContext;
use crate::core::types::{MapLayer, TilePos, UnitId};
use crate::player::Stance;
use crate::units::{OrderKind, StanceChange};
use crate::world::World;

/// Non-fighting members further than this from the leader escort it
const LEADER_FOLLOW_DISTANCE: u32 = 5;

impl Force {
    /// Attack `pos`, or whatever a whole-map search turns up when `pos` is
    /// off the map
    pub fn attack(&mut self, ctx: &mut ForceContext<'_>, pos: TilePos, layer: MapLayer) {
        self.remove_dead_units(&mut ctx.world.units);
        if self.units.is_empty() {
            self.attacking = false;
            ctx.ai.scouting = false;
            if self.state != ForceState::Free {
                self.state = ForceState::Waiting;
            }
            return;
        }
        if ctx.ai.scouting {
            tracing::trace!("Force {:?} holds while player {:?} scouts", self.slot, ctx.ai.player);
            return;
        }

        let was_attacking = self.attacking;
        if !self.attacking {
            if let Some(last) = self.units.last().and_then(|id| ctx.world.units.get(*id)) {
                self.home = last.pos;
                self.home_layer = last.layer;
            }
            self.attacking = true;
        }

        let (goal, goal_layer) = if ctx.world.map.in_bounds(pos, layer) {
            (pos, layer)
        } else {
            match self.acquire_first_target(ctx) {
                Some(found) => found,
                None => {
                    tracing::info!(
                        "Force {:?} found nothing to attack, player {:?} starts scouting",
                        self.slot,
                        ctx.ai.player
                    );
                    ctx.ai.scouting = true;
                    self.attacking = was_attacking;
                    return;
                }
            }
        };

        let members = &self.units;
        ctx.ai.scouts.retain(|scout| !members.contains(scout));

        if self.members_needing_crossing(ctx.world, goal, goal_layer) > 0 {
            self.goal = goal;
            self.goal_layer = goal_layer;
            if self.check_transporters(ctx, goal, goal_layer) {
                if self.state == ForceState::Waiting
                    && !ctx.planner.plan_attack(self, ctx.world, goal, goal_layer)
                {
                    tracing::debug!("Force {:?} cannot be shipped to {:?}", self.slot, goal);
                    self.attacking = false;
                }
            } else if !transport_obtainable(ctx.world, ctx.ai.player) {
                tracing::info!("Force {:?} has no way across the water, standing down", self.slot);
                self.return_to_home(ctx);
            }
            return;
        }

        self.goal_layer = goal_layer;
        if self.state == ForceState::Waiting && !self.defending {
            match find_rally_point(ctx.world, self, goal, goal_layer, ctx.config) {
                Some(rally) => {
                    self.goal = rally;
                    self.wait_on_rally_point = ctx.config.rally_wait_ticks;
                    self.state = ForceState::GoingToRallyPoint;
                }
                None => {
                    self.goal = goal;
                    self.state = ForceState::Attacking;
                }
            }
        } else {
            self.goal = goal;
            self.state = ForceState::Attacking;
        }
        tracing::info!(
            "Force {:?} {:?} towards {:?} (target {:?})",
            self.slot,
            self.state,
            self.goal,
            goal
        );

        self.issue_attack_orders(ctx, false);
    }

    /// Advance an attacking force by one tick
    pub fn update(&mut self, ctx: &mut ForceContext<'_>) {
        if !self.is_attacking() {
            return;
        }
        self.remove_dead_units(&mut ctx.world.units);
        if self.units.is_empty() {
            tracing::debug!("Force {:?} was wiped out", self.slot);
            self.reset(false, &mut ctx.world.units);
            return;
        }
        if !self.goal.is_valid() {
            self.attack(ctx, TilePos::INVALID, self.goal_layer);
            return;
        }
        if !self.can_attack(&ctx.world.units, &ctx.world.catalog) {
            tracing::info!("Force {:?} can no longer fight, disbanding", self.slot);
            self.reset(true, &mut ctx.world.units);
            return;
        }

        match self.state {
            ForceState::Boarding => {
                self.update_boarding(ctx);
                return;
            }
            ForceState::AttackingWithTransporter => {
                self.update_transported(ctx);
                return;
            }
            _ => {}
        }

        if self.force_type(&ctx.world.units, &ctx.world.catalog) == ForceType::Land
            && self.members_needing_crossing(ctx.world, self.goal, self.goal_layer) > 0
        {
            let (goal, layer) = (self.goal, self.goal_layer);
            if !self.check_transporters(ctx, goal, layer) {
                if !transport_obtainable(ctx.world, ctx.ai.player) {
                    tracing::info!("Force {:?} has no way across the water, standing down", self.slot);
                    self.return_to_home(ctx);
                }
                return;
            }
            self.state = ForceState::Waiting;
            self.attack(ctx, goal, layer);
            return;
        }

        match self.state {
            ForceState::Waiting => {
                let (goal, layer) = (self.goal, self.goal_layer);
                self.attack(ctx, goal, layer);
            }
            ForceState::GoingToRallyPoint => self.update_rally(ctx),
            ForceState::Attacking => self.update_engagement(ctx),
            _ => {}
        }
    }

    /// Send the force to defend `pos`
    ///
    /// Skips the rally point and the scouting backoff: the goal is known.
    pub fn defend(&mut self, ctx: &mut ForceContext<'_>, pos: TilePos, layer: MapLayer) {
        assert!(
            ctx.world.map.in_bounds(pos, layer),
            "defence position {:?} is off the map",
            pos
        );
        self.remove_dead_units(&mut ctx.world.units);
        if self.units.is_empty() {
            return;
        }
        if !self.attacking && !self.defending {
            if let Some(last) = self.units.last().and_then(|id| ctx.world.units.get(*id)) {
                self.home = last.pos;
                self.home_layer = last.layer;
            }
        }
        self.defending = true;
        self.attacking = true;
        self.goal = pos;
        self.goal_layer = layer;
        self.state = ForceState::Attacking;
        tracing::info!("Force {:?} defending {:?}", self.slot, pos);
        self.issue_attack_orders(ctx, false);
    }

    /// One tick of the defence loop
    ///
    /// Once a member is near the defended position, either fight whatever
    /// is there or go home if the threat is gone.
    pub fn update_defence(&mut self, ctx: &mut ForceContext<'_>) {
        if !self.defending {
            return;
        }
        self.remove_dead_units(&mut ctx.world.units);
        if self.units.is_empty() {
            self.reset(false, &mut ctx.world.units);
            return;
        }

        let radius = ctx.config.defend_radius;
        let on_site = self.units.iter().any(|id| {
            ctx.world
                .units
                .distance_to(*id, &ctx.world.catalog, self.goal)
                .is_some_and(|d| d <= radius)
        });
        if !on_site {
            return;
        }

        let occupancy = ctx.world.units.occupancy(&ctx.world.catalog);
        let threatened = self
            .units
            .iter()
            .any(|id| find_enemy_in_range(ctx.world, &occupancy, *id).is_some())
            || enemy_units_in_distance(
                ctx.world,
                &occupancy,
                ctx.ai.player,
                self.goal,
                self.goal_layer,
                radius,
            );
        if !threatened {
            tracing::debug!("Force {:?} sees no more threat at {:?}", self.slot, self.goal);
            self.return_to_home(ctx);
            return;
        }
        self.issue_attack_orders(ctx, true);
    }

    fn update_rally(&mut self, ctx: &mut ForceContext<'_>) {
        let (nearest, farthest) = self.goal_distance_bounds(ctx.world);
        let arrival = ctx.config.rally_arrival_distance;
        if self.wait_on_rally_point > 0 && nearest <= arrival {
            self.wait_on_rally_point -= 1;
        }
        if farthest > arrival && (nearest > arrival || self.wait_on_rally_point > 0) {
            return;
        }

        let include_neutral = ctx.config.escalate_against_neutrals;
        let target = self
            .acquire(ctx, FindType::Building, false, false)
            .or_else(|| self.acquire(ctx, FindType::AnywhereOnMap, include_neutral, true));
        let Some((pos, layer)) = target.and_then(|t| self.commit_to_target(ctx, t)) else {
            tracing::info!("Force {:?} lost its target at the rally point", self.slot);
            ctx.ai.scouting = true;
            self.return_to_home(ctx);
            return;
        };
        self.goal = pos;
        self.goal_layer = layer;
        self.state = ForceState::Attacking;
        tracing::info!("Force {:?} leaves the rally point for {:?}", self.slot, pos);
        self.issue_attack_orders(ctx, false);
    }

    fn update_engagement(&mut self, ctx: &mut ForceContext<'_>) {
        let fighters = self.fighters(ctx.world);
        let idle: Vec<UnitId> = fighters
            .iter()
            .copied()
            .filter(|id| ctx.world.units.get(*id).is_some_and(|u| u.idle))
            .collect();
        if idle.is_empty() {
            return;
        }

        if idle.len() == fighters.len() {
            let include_neutral = ctx.config.escalate_against_neutrals;
            let target = if self.force_type(&ctx.world.units, &ctx.world.catalog) == ForceType::Naval {
                self.acquire(ctx, FindType::AnywhereOnMap, include_neutral, false)
            } else {
                self.acquire(ctx, FindType::Building, false, false)
                    .or_else(|| self.acquire(ctx, FindType::AnywhereOnMap, include_neutral, true))
            };
            let Some((pos, layer)) = target.and_then(|t| self.commit_to_target(ctx, t)) else {
                tracing::info!("Force {:?} has nothing left to attack", self.slot);
                ctx.ai.scouting = true;
                self.return_to_home(ctx);
                return;
            };
            self.goal_layer = layer;
            match find_rally_point(ctx.world, self, pos, layer, ctx.config) {
                Some(rally) => {
                    self.goal = rally;
                    self.wait_on_rally_point = ctx.config.rally_wait_ticks;
                    self.state = ForceState::GoingToRallyPoint;
                }
                None => self.goal = pos,
            }
            tracing::debug!("Force {:?} retargets to {:?}", self.slot, self.goal);
            self.issue_attack_orders(ctx, false);
            return;
        }

        self.issue_attack_orders(ctx, true);
    }

    /// Whole-map target for a force that was given no position
    fn acquire_first_target(&self, ctx: &mut ForceContext<'_>) -> Option<(TilePos, MapLayer)> {
        let include_neutral = ctx.config.escalate_against_neutrals;
        let target = if self.has_transporters(&ctx.world.units, &ctx.world.catalog) {
            self.acquire(ctx, FindType::AggressiveUnit, false, true)
        } else if self.force_type(&ctx.world.units, &ctx.world.catalog) == ForceType::Naval {
            self.acquire(ctx, FindType::AnywhereOnMap, include_neutral, false)
        } else {
            self.acquire(ctx, FindType::Building, false, false)
                .or_else(|| self.acquire(ctx, FindType::AnywhereOnMap, include_neutral, true))
        };
        target.and_then(|t| self.commit_to_target(ctx, t))
    }

    fn acquire(
        &self,
        ctx: &ForceContext<'_>,
        find_type: FindType,
        include_neutral: bool,
        through_water: bool,
    ) -> Option<Target> {
        find_enemy_for_force(
            &*ctx.world,
            self,
            find_type,
            SearchOptions {
                through_water,
                include_neutral,
            },
        )
    }

    /// Resolve a target's position, going to war with its owner if needed
    fn commit_to_target(&self, ctx: &mut ForceContext<'_>, target: Target) -> Option<(TilePos, MapLayer)> {
        let position = target.position(ctx.world)?;
        let player = ctx.ai.player;
        if let Some(owner) = target.owner(ctx.world) {
            if owner != player && ctx.world.stance(player, owner) != Stance::Enemy {
                if let Some(us) = ctx.world.player_mut(player) {
                    us.set_stance(owner, Stance::Enemy);
                }
                ctx.directives.stance_changes.push(StanceChange {
                    player,
                    towards: owner,
                    stance: Stance::Enemy,
                });
                tracing::info!("Player {:?} goes to war with {:?}", player, owner);
            }
        }
        Some(position)
    }

    /// Alive, disembarked members that are not transporters
    fn fighters(&self, world: &World) -> Vec<UnitId> {
        self.units
            .iter()
            .copied()
            .filter(|id| {
                world.units.get(*id).is_some_and(|u| u.is_alive() && !u.is_embarked())
                    && world.unit_type_of(*id).is_some_and(|t| !t.is_transporter())
            })
            .collect()
    }

    /// Nearest and farthest member distance to the goal
    ///
    /// Transporters are ignored unless they are all that is left.
    pub fn goal_distance_bounds(&self, world: &World) -> (u32, u32) {
        assert!(!self.units.is_empty(), "force {:?} has no units to measure", self.slot);
        let mut measured = self.fighters(world);
        if measured.is_empty() {
            measured = self.units.clone();
        }
        let distances: Vec<u32> = measured
            .iter()
            .filter_map(|id| world.units.distance_to(*id, &world.catalog, self.goal))
            .collect();
        match (distances.iter().min(), distances.iter().max()) {
            (Some(nearest), Some(farthest)) => (*nearest, *farthest),
            _ => (u32::MAX, u32::MAX),
        }
    }

    /// Orders towards the goal, staggered by member index
    ///
    /// Aggressive units attack-move; the rest escort the first aggressive
    /// member, or simply move when there is none.
    pub fn issue_attack_orders(&self, ctx: &mut ForceContext<'_>, only_idle: bool) {
        let leader = self.units.iter().copied().find(|id| {
            ctx.world.units.get(*id).is_some_and(|u| u.is_alive() && !u.is_embarked())
                && ctx.world.unit_type_of(*id).is_some_and(|t| t.is_aggressive())
        });
        let leader_pos = leader.and_then(|id| ctx.world.units.get(id)).map(|u| u.pos);

        for (index, id) in self.units.iter().enumerate() {
            let Some(unit) = ctx.world.units.get(*id) else {
                continue;
            };
            if !unit.is_alive() || unit.is_embarked() || (only_idle && !unit.idle) {
                continue;
            }
            let Some(unit_type) = ctx.world.catalog.get(unit.unit_type) else {
                continue;
            };
            if unit_type.is_transporter() {
                continue;
            }

            let kind = if unit_type.is_aggressive() {
                OrderKind::AttackMove {
                    pos: self.goal,
                    layer: self.goal_layer,
                }
            } else if let (Some(leader), Some(leader_pos)) = (leader, leader_pos) {
                if unit.pos.distance(&leader_pos) <= LEADER_FOLLOW_DISTANCE {
                    continue;
                }
                OrderKind::Defend(leader)
            } else {
                OrderKind::Move {
                    pos: self.goal,
                    layer: self.goal_layer,
                }
            };
            ctx.directives.order(*id, kind, index as u32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AiPlayerState, CoastalTransportPlanner};
    use crate::core::config::ForceConfig;
    use crate::core::types::{ForceId, PlayerId};
    use crate::map::GameMap;
    use crate::units::{Directives, UnitDomain, UnitType, UnitTypeCatalog, UnitTypeEquivalence};

    const RED: PlayerId = PlayerId(0);
    const BLUE: PlayerId = PlayerId(1);

    struct Harness {
        world: World,
        equivalence: UnitTypeEquivalence,
        config: ForceConfig,
        ai: AiPlayerState,
        planner: CoastalTransportPlanner,
        directives: Directives,
    }

    impl Harness {
        fn new() -> Self {
            let mut catalog = UnitTypeCatalog::new();
            catalog.add(UnitType::new("footman", UnitDomain::Land).with_attack(1));
            catalog.add(UnitType::new("peasant", UnitDomain::Land));
            catalog.add(UnitType::new("farm", UnitDomain::Land).as_building().with_size(2, 2));
            catalog.add(UnitType::new("tower", UnitDomain::Land).with_attack(6).as_building());
            let equivalence = UnitTypeEquivalence::new(catalog.len());
            let mut world = World::new(GameMap::new(64, 24), catalog);
            world.add_player("red");
            world.add_player("blue");
            world.set_mutual_stance(RED, BLUE, Stance::Enemy);
            Self {
                world,
                equivalence,
                config: ForceConfig::default(),
                ai: AiPlayerState::new(RED),
                planner: CoastalTransportPlanner,
                directives: Directives::new(),
            }
        }

        fn ctx(&mut self) -> ForceContext<'_> {
            ForceContext {
                world: &mut self.world,
                equivalence: &self.equivalence,
                config: &self.config,
                ai: &mut self.ai,
                planner: &mut self.planner,
                directives: &mut self.directives,
            }
        }

        fn force_with(&mut self, names: &[&str], x: i32, y: i32) -> Force {
            let mut force = Force::new(ForceId(0));
            force.state = ForceState::Waiting;
            for (i, name) in names.iter().enumerate() {
                let id = self
                    .world
                    .spawn(name, RED, TilePos::new(x, y + i as i32), 0)
                    .expect("unit");
                force.insert(id, &mut self.world.units);
            }
            force
        }
    }

    #[test]
    fn test_attack_without_targets_starts_scouting() {
        let mut h = Harness::new();
        let mut force = h.force_with(&["footman", "footman"], 2, 2);

        force.attack(&mut h.ctx(), TilePos::INVALID, 0);

        assert!(h.ai.scouting);
        assert_eq!(force.state, ForceState::Waiting);
        assert!(!force.attacking);
        assert!(h.directives.orders.is_empty());
    }

    #[test]
    fn test_scouting_blocks_new_searches() {
        let mut h = Harness::new();
        h.world.spawn("farm", BLUE, TilePos::new(50, 10), 0);
        let mut force = h.force_with(&["footman"], 2, 2);
        h.ai.scouting = true;

        force.attack(&mut h.ctx(), TilePos::INVALID, 0);
        assert_eq!(force.state, ForceState::Waiting);
        assert!(h.directives.orders.is_empty());
    }

    #[test]
    fn test_attack_goes_through_rally_point() {
        let mut h = Harness::new();
        let target = TilePos::new(55, 10);
        h.world.spawn("tower", BLUE, target, 0);
        let mut force = h.force_with(&["footman", "footman"], 2, 10);

        force.attack(&mut h.ctx(), target, 0);

        assert_eq!(force.state, ForceState::GoingToRallyPoint);
        assert_ne!(force.goal, target);
        assert!(force.attacking);
        assert_eq!(force.wait_on_rally_point, h.config.rally_wait_ticks);
        assert_eq!(force.home, TilePos::new(2, 11));
        assert_eq!(h.directives.orders.len(), 2);
        assert_eq!(h.directives.orders[1].delay, 1);
    }

    #[test]
    fn test_whole_map_attack_finds_building() {
        let mut h = Harness::new();
        let farm = h.world.spawn("farm", BLUE, TilePos::new(8, 2), 0).expect("farm");
        h.world.spawn("tower", BLUE, TilePos::new(9, 5), 0);
        let mut force = h.force_with(&["footman"], 2, 2);

        force.attack(&mut h.ctx(), TilePos::INVALID, 0);

        // The tower covers every staging tile: straight to the attack
        assert_eq!(force.state, ForceState::Attacking);
        assert_eq!(Some(force.goal), h.world.units.get(farm).map(|u| u.pos));
    }

    #[test]
    fn test_non_fighters_escort_leader() {
        let mut h = Harness::new();
        let mut force = h.force_with(&["footman"], 2, 2);
        let far = h.world.spawn("peasant", RED, TilePos::new(20, 20), 0).expect("peasant");
        let near = h.world.spawn("peasant", RED, TilePos::new(3, 3), 0).expect("peasant");
        force.insert(far, &mut h.world.units);
        force.insert(near, &mut h.world.units);
        let leader = force.units[0];
        force.goal = TilePos::new(30, 5);

        force.issue_attack_orders(&mut h.ctx(), false);

        let far_orders: Vec<_> = h.directives.orders_for(far).collect();
        assert_eq!(far_orders.len(), 1);
        assert_eq!(far_orders[0].kind, OrderKind::Defend(leader));
        assert_eq!(h.directives.orders_for(near).count(), 0);
    }

    #[test]
    fn test_neutral_target_escalates() {
        let mut h = Harness::new();
        let green = h.world.add_player("green");
        h.world.spawn("farm", green, TilePos::new(10, 2), 0);
        let mut force = h.force_with(&["footman"], 2, 2);

        force.attack(&mut h.ctx(), TilePos::INVALID, 0);

        assert_eq!(h.world.stance(RED, green), Stance::Enemy);
        assert_eq!(h.directives.stance_changes.len(), 1);
        assert!(force.attacking);
    }

    #[test]
    fn test_rally_arrival_moves_on_to_target() {
        let mut h = Harness::new();
        let farm = h.world.spawn("farm", BLUE, TilePos::new(40, 10), 0).expect("farm");
        let mut force = h.force_with(&["footman", "footman"], 20, 10);
        force.attacking = true;
        force.state = ForceState::GoingToRallyPoint;
        force.goal = TilePos::new(21, 10);
        force.wait_on_rally_point = 3;

        force.update(&mut h.ctx());

        assert_eq!(force.state, ForceState::Attacking);
        assert_eq!(Some(force.goal), h.world.units.get(farm).map(|u| u.pos));
    }

    #[test]
    fn test_rally_waits_for_stragglers() {
        let mut h = Harness::new();
        h.world.spawn("farm", BLUE, TilePos::new(60, 10), 0);
        let mut force = h.force_with(&["footman"], 20, 10);
        let straggler = h.world.spawn("footman", RED, TilePos::new(2, 2), 0).expect("straggler");
        force.insert(straggler, &mut h.world.units);
        force.attacking = true;
        force.state = ForceState::GoingToRallyPoint;
        force.goal = TilePos::new(21, 10);
        force.wait_on_rally_point = 2;

        force.update(&mut h.ctx());
        assert_eq!(force.state, ForceState::GoingToRallyPoint);
        assert_eq!(force.wait_on_rally_point, 1);

        force.update(&mut h.ctx());
        assert_eq!(force.state, ForceState::Attacking);
    }

    #[test]
    fn test_unarmed_force_disbands() {
        let mut h = Harness::new();
        let mut force = h.force_with(&["peasant"], 2, 2);
        force.attacking = true;
        force.state = ForceState::Attacking;
        force.goal = TilePos::new(10, 10);

        force.update(&mut h.ctx());
        assert_eq!(force.state, ForceState::Free);
        assert!(force.is_empty());
    }

    #[test]
    fn test_wiped_out_force_returns_to_waiting() {
        let mut h = Harness::new();
        let mut force = h.force_with(&["footman"], 2, 2);
        force.attacking = true;
        force.state = ForceState::Attacking;
        force.goal = TilePos::new(10, 10);
        let unit = force.units[0];
        h.world.units.kill(unit);

        force.update(&mut h.ctx());
        assert_eq!(force.state, ForceState::Waiting);
        assert!(!force.attacking);
    }

    #[test]
    fn test_defence_goes_home_without_threat() {
        let mut h = Harness::new();
        let mut force = h.force_with(&["footman"], 10, 10);
        force.defend(&mut h.ctx(), TilePos::new(12, 10), 0);
        assert!(force.defending);
        assert!(!force.is_attacking());
        assert_eq!(force.state, ForceState::Attacking);

        force.update_defence(&mut h.ctx());
        assert!(!force.defending);
        assert_eq!(force.state, ForceState::Waiting);
    }

    #[test]
    fn test_defence_fights_while_threatened() {
        let mut h = Harness::new();
        h.world.spawn("footman", BLUE, TilePos::new(14, 10), 0);
        let mut force = h.force_with(&["footman"], 10, 10);
        force.defend(&mut h.ctx(), TilePos::new(12, 10), 0);
        h.directives.drain();

        force.update_defence(&mut h.ctx());
        assert!(force.defending);
        assert_eq!(h.directives.orders.len(), 1);
    }
}
