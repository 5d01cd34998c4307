//! Force pool of one player
//!
//! The first `script_forces` slots are addressed by script number through
//! the `script` table. Recruitment and attack folds claim slots at or above
//! that boundary, so a launched attack never collides with a script that is
//! already refilling its slot.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::ai::force::{counted_representatives, Force, ForceRequirement, ForceRole, ForceState};
use crate::ai::ForceContext;
use crate::core::error::Result;
use crate::core::types::{ForceId, MapLayer, PlayerId, TilePos, UnitId, UnitTypeId};
use crate::units::{OrderKind, UnitStore, UnitTypeCatalog, UnitTypeEquivalence};
use crate::world::World;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForceManager {
    forces: Vec<Force>,
    /// Script force number -> internal slot
    script: Vec<usize>,
}

impl ForceManager {
    pub fn new(script_forces: usize) -> Self {
        Self {
            forces: (0..script_forces).map(|i| Force::new(ForceId(i))).collect(),
            script: (0..script_forces).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.forces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forces.is_empty()
    }

    /// Number of slots reserved for scripts
    pub fn script_forces(&self) -> usize {
        self.script.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Force> {
        self.forces.iter()
    }

    pub fn force(&self, id: ForceId) -> Option<&Force> {
        self.forces.get(id.0)
    }

    pub fn force_mut(&mut self, id: ForceId) -> Option<&mut Force> {
        self.forces.get_mut(id.0)
    }

    /// Internal slot currently answering to a script force number
    pub fn script_force(&self, script: usize) -> ForceId {
        ForceId(self.script.get(script).copied().unwrap_or(script))
    }

    fn ensure_slot(&mut self, slot: usize) {
        while self.forces.len() <= slot {
            let id = ForceId(self.forces.len());
            self.forces.push(Force::new(id));
        }
    }

    /// Claim a Free slot at or after `start`, growing the pool if needed
    ///
    /// With `allow_hero_only` a slot holding a lone, idle hero may be taken
    /// over; the hero is released.
    pub fn find_free_force(
        &mut self,
        role: ForceRole,
        start: usize,
        allow_hero_only: bool,
        units: &mut UnitStore,
        catalog: &UnitTypeCatalog,
    ) -> ForceId {
        let mut slot = start;
        while slot < self.forces.len() {
            let force = &mut self.forces[slot];
            if force.state == ForceState::Free {
                break;
            }
            if allow_hero_only
                && force.size() == 1
                && !force.attacking
                && !force.defending
                && force.is_hero_only(units, catalog)
            {
                tracing::debug!("Displacing hero-only force {:?}", force.slot);
                force.reset(true, units);
                break;
            }
            slot += 1;
        }
        self.ensure_slot(slot);

        let force = &mut self.forces[slot];
        force.state = ForceState::Waiting;
        force.role = role;
        force.slot = ForceId(slot);
        force.slot
    }

    /// Give a script force a composition and claim its slot
    pub fn set_script_force(&mut self, script: usize, role: ForceRole, requirements: &[ForceRequirement]) -> ForceId {
        let id = self.script_force(script);
        self.ensure_slot(id.0);
        let force = &mut self.forces[id.0];
        if force.state == ForceState::Free {
            force.state = ForceState::Waiting;
        }
        force.role = role;
        force.unit_types = requirements.to_vec();
        force.completed = false;
        id
    }

    /// Owning force of a unit, if any
    pub fn get_force(&self, unit: UnitId, units: &UnitStore) -> Option<ForceId> {
        let slot = units.get(unit)?.group_id?;
        self.forces
            .get(slot.0)
            .filter(|f| f.contains(unit))
            .map(|f| f.slot)
    }

    /// Take a unit out of whatever force holds it
    pub fn remove(&mut self, unit: UnitId, units: &mut UnitStore) -> bool {
        match self.get_force(unit, units) {
            Some(slot) => self.forces[slot.0].remove(unit, units),
            None => false,
        }
    }

    pub fn remove_dead_units(&mut self, units: &mut UnitStore) {
        for force in &mut self.forces {
            force.remove_dead_units(units);
        }
    }

    /// Place a unit in a force
    ///
    /// With a script number only that force is considered; heroes skip the
    /// composition check there and are walked over to the force. Without
    /// one, the first non-attacking force with room takes the unit. A hero
    /// nobody wants gets a force of its own.
    pub fn assign(&mut self, ctx: &mut ForceContext<'_>, unit: UnitId, script: Option<usize>, is_hero: bool) -> bool {
        let Some(record) = ctx.world.units.get(unit) else {
            return false;
        };
        if !record.is_alive() || record.group_id.is_some() {
            return false;
        }
        let unit_type = record.unit_type;

        if let Some(script) = script {
            let slot = self.script_force(script).0;
            self.ensure_slot(slot);
            let force = &mut self.forces[slot];
            if !is_hero
                && !force.can_be_assigned_to(unit_type, &ctx.world.units, &ctx.world.catalog, ctx.equivalence)
            {
                return false;
            }
            if is_hero {
                let anchor = force
                    .units
                    .first()
                    .and_then(|id| ctx.world.units.get(*id))
                    .map(|u| (u.pos, u.layer));
                if let Some((pos, layer)) = anchor {
                    ctx.directives.order(unit, OrderKind::Move { pos, layer }, 0);
                }
            }
            if force.state == ForceState::Free {
                force.state = ForceState::Waiting;
            }
            force.insert(unit, &mut ctx.world.units);
            tracing::debug!("Unit {:?} assigned to script force {} (slot {})", unit, script, slot);
            return true;
        }

        for force in &mut self.forces {
            if force.state == ForceState::Free || force.is_attacking() {
                continue;
            }
            if force.can_be_assigned_to(unit_type, &ctx.world.units, &ctx.world.catalog, ctx.equivalence) {
                force.insert(unit, &mut ctx.world.units);
                tracing::debug!("Unit {:?} assigned to force {:?}", unit, force.slot);
                return true;
            }
        }

        if is_hero {
            let start = self.script_forces();
            let slot = self.find_free_force(
                ForceRole::Default,
                start,
                true,
                &mut ctx.world.units,
                &ctx.world.catalog,
            );
            let force = &mut self.forces[slot.0];
            force.want(unit_type, 1);
            force.insert(unit, &mut ctx.world.units);
            force.completed = true;
            tracing::debug!("Hero {:?} leads new force {:?}", unit, slot);
            return true;
        }
        false
    }

    /// Offer every idle, unassigned unit of the player to a force
    ///
    /// With `target` only that force is filled; otherwise units go wherever
    /// they fit. Buildings, scouts and heroes are left alone.
    pub fn assign_free_units(&mut self, ctx: &mut ForceContext<'_>, target: Option<ForceId>) -> usize {
        let player = ctx.ai.player;
        let free: Vec<(UnitId, UnitTypeId)> = ctx
            .world
            .units
            .owned_by(player)
            .filter(|u| u.group_id.is_none() && u.idle && !u.is_embarked())
            .filter(|u| !ctx.ai.scouts.contains(&u.id))
            .filter(|u| {
                ctx.world
                    .catalog
                    .get(u.unit_type)
                    .is_some_and(|t| !t.building && !t.hero)
            })
            .map(|u| (u.id, u.unit_type))
            .collect();

        let mut assigned = 0;
        for (unit, unit_type) in free {
            let placed = match target {
                Some(slot) => match self.forces.get_mut(slot.0) {
                    Some(force) => {
                        let fits = force.can_be_assigned_to(
                            unit_type,
                            &ctx.world.units,
                            &ctx.world.catalog,
                            ctx.equivalence,
                        );
                        if fits {
                            force.insert(unit, &mut ctx.world.units);
                        }
                        fits
                    }
                    None => false,
                },
                None => self.assign(ctx, unit, None, false),
            };
            if placed {
                assigned += 1;
            }
        }
        if assigned > 0 {
            tracing::debug!("Assigned {} idle units to forces", assigned);
        }
        assigned
    }

    /// Composition check for every waiting force
    ///
    /// `counter` holds, per equivalence representative, units already on
    /// their way (queued production). Each force claims its wanted counts
    /// from the pool of existing plus incoming units, minus those tied up in
    /// attacks; whatever is missing is requested and the force is marked
    /// incomplete.
    pub fn check_units(&mut self, ctx: &mut ForceContext<'_>, counter: &mut AHashMap<UnitTypeId, i64>) {
        let player = ctx.ai.player;
        let equivalence = ctx.equivalence;

        let mut existing: AHashMap<UnitTypeId, i64> = AHashMap::new();
        for unit in ctx.world.units.owned_by(player) {
            for rep in counted_representatives(unit.unit_type, &ctx.world.catalog, equivalence) {
                *existing.entry(rep).or_insert(0) += 1;
            }
        }

        let mut attacking: AHashMap<UnitTypeId, i64> = AHashMap::new();
        for force in self.forces.iter().filter(|f| f.is_attacking()) {
            for (rep, count) in force.count_types(&ctx.world.units, &ctx.world.catalog, equivalence) {
                *attacking.entry(rep).or_insert(0) += count as i64;
            }
        }

        let mut requests: Vec<(UnitTypeId, u32)> = Vec::new();
        for force in &mut self.forces {
            if force.state == ForceState::Free || force.is_attacking() {
                continue;
            }
            let mut requested_any = false;
            for req in &force.unit_types {
                let rep = equivalence.representative(req.unit_type);
                let have = existing.get(&rep).copied().unwrap_or(0) + counter.get(&rep).copied().unwrap_or(0)
                    - attacking.get(&rep).copied().unwrap_or(0);
                let missing = req.want as i64 - have;
                if missing > 0 {
                    match producible_variant(ctx.world, player, req.unit_type, equivalence) {
                        Some(unit_type) => requests.push((unit_type, missing as u32)),
                        None => tracing::debug!(
                            "Force {:?} needs {} of {:?} but nothing can build them",
                            force.slot,
                            missing,
                            req.unit_type
                        ),
                    }
                    *counter.entry(rep).or_insert(0) += missing;
                    requested_any = true;
                }
                *counter.entry(rep).or_insert(0) -= req.want as i64;
            }
            force.refresh_completed(&ctx.world.units, &ctx.world.catalog, equivalence);
            if requested_any {
                force.completed = false;
            }
        }

        for (unit_type, count) in requests {
            tracing::debug!("Player {:?} requests {} x {:?}", player, count, unit_type);
            ctx.directives.request_production(player, unit_type, count);
        }
    }

    /// Launch a script force
    ///
    /// The script slot is folded into a fresh internal force which then
    /// attacks; the script number follows the attack until it is over.
    pub fn attack_with_force(&mut self, ctx: &mut ForceContext<'_>, script: usize) -> Option<ForceId> {
        let slot = self.fold_script_forces(ctx, &[script])?;
        let force = &mut self.forces[slot.0];
        force.former_force = Some(script);
        if let Some(entry) = self.script.get_mut(script) {
            *entry = slot.0;
        }
        self.launch(ctx, slot);
        Some(slot)
    }

    /// Launch several script forces together as one internal force
    pub fn attack_with_forces(&mut self, ctx: &mut ForceContext<'_>, scripts: &[usize]) -> Option<ForceId> {
        let slot = self.fold_script_forces(ctx, scripts)?;
        self.launch(ctx, slot);
        Some(slot)
    }

    pub(crate) fn launch(&mut self, ctx: &mut ForceContext<'_>, slot: ForceId) {
        let force = &mut self.forces[slot.0];
        let layer = force
            .units
            .first()
            .and_then(|id| ctx.world.units.get(*id))
            .map_or(0, |u| u.layer);
        tracing::info!("Launching force {:?} with {} units", slot, force.size());
        force.attack(ctx, TilePos::INVALID, layer);
    }

    /// Move the units and compositions of script forces into one new
    /// internal force
    ///
    /// Forces that are already attacking or defending are left alone. Each
    /// folded script slot is reset. Returns `None` when nothing could be
    /// folded.
    pub fn fold_script_forces(&mut self, ctx: &mut ForceContext<'_>, scripts: &[usize]) -> Option<ForceId> {
        let mut sources: Vec<usize> = Vec::new();
        for script in scripts {
            let slot = self.script_force(*script).0;
            let usable = self
                .forces
                .get(slot)
                .is_some_and(|f| !f.is_empty() && !f.attacking && !f.defending);
            if usable && !sources.contains(&slot) {
                sources.push(slot);
            }
        }
        if sources.is_empty() {
            tracing::debug!("No script force of {:?} can attack", scripts);
            return None;
        }

        let role = self.forces[sources[0]].role;
        let start = self.script_forces();
        let target = self.find_free_force(role, start, false, &mut ctx.world.units, &ctx.world.catalog);

        for source in sources {
            let (moved, types) = drain_force(&mut self.forces[source], &mut ctx.world.units);
            let fold = &mut self.forces[target.0];
            for unit in moved {
                fold.insert(unit, &mut ctx.world.units);
            }
            for req in types {
                fold.want(req.unit_type, req.want);
            }
            tracing::debug!("Folded force slot {} into {:?}", source, target);
        }

        self.forces[target.0].refresh_completed(&ctx.world.units, &ctx.world.catalog, ctx.equivalence);
        Some(target)
    }

    /// Hand folded forces whose attack is over back to their script slot
    pub fn release_finished_folds(&mut self, ctx: &mut ForceContext<'_>) {
        for slot in self.script_forces()..self.forces.len() {
            let force = &self.forces[slot];
            let Some(script) = force.former_force else {
                continue;
            };
            if force.attacking || force.defending || force.state != ForceState::Waiting {
                continue;
            }

            let (moved, types) = drain_force(&mut self.forces[slot], &mut ctx.world.units);
            self.forces[slot].reset(true, &mut ctx.world.units);
            self.ensure_slot(script);

            let home = &mut self.forces[script];
            if home.state == ForceState::Free {
                home.state = ForceState::Waiting;
            }
            if home.unit_types.is_empty() {
                home.unit_types = types;
            }
            for unit in moved {
                home.insert(unit, &mut ctx.world.units);
            }
            home.refresh_completed(&ctx.world.units, &ctx.world.catalog, ctx.equivalence);
            if let Some(entry) = self.script.get_mut(script) {
                *entry = script;
            }
            tracing::debug!("Force slot {} returned to script force {}", slot, script);
        }
    }

    /// Send idle defence forces to `pos`; falls back to any idle force
    pub fn defend_at(&mut self, ctx: &mut ForceContext<'_>, pos: TilePos, layer: MapLayer) -> usize {
        let ready = |f: &Force| f.state == ForceState::Waiting && !f.is_empty() && !f.attacking && !f.defending;
        let mut chosen: Vec<usize> = (0..self.forces.len())
            .filter(|i| self.forces[*i].role == ForceRole::Defend && ready(&self.forces[*i]))
            .collect();
        if chosen.is_empty() {
            chosen = (0..self.forces.len())
                .filter(|i| self.forces[*i].role != ForceRole::Attack && ready(&self.forces[*i]))
                .collect();
        }
        for slot in &chosen {
            self.forces[*slot].defend(ctx, pos, layer);
        }
        chosen.len()
    }

    /// Per-tick advance of every force, in slot order
    pub fn update(&mut self, ctx: &mut ForceContext<'_>) {
        for force in &mut self.forces {
            if force.defending {
                force.update_defence(ctx);
            } else if force.attacking {
                force.update(ctx);
            }
        }
    }

    /// Re-point unit back-references at the forces that list them, e.g.
    /// after loading a saved pool
    pub fn relink(&self, units: &mut UnitStore) {
        for unit in units.iter_mut() {
            unit.group_id = None;
        }
        for force in &self.forces {
            for id in &force.units {
                if let Some(unit) = units.get_mut(*id) {
                    unit.group_id = Some(force.slot);
                }
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Take every unit and the composition out of a force, keeping order
fn drain_force(force: &mut Force, units: &mut UnitStore) -> (Vec<UnitId>, Vec<ForceRequirement>) {
    let mut moved = Vec::with_capacity(force.size());
    while let Some(unit) = force.take_last(units) {
        moved.push(unit);
    }
    moved.reverse();
    let types = std::mem::take(&mut force.unit_types);
    force.reset(true, units);
    (moved, types)
}

/// A type the player can build that satisfies a requirement for `unit_type`
fn producible_variant(
    world: &World,
    player: PlayerId,
    unit_type: UnitTypeId,
    equivalence: &UnitTypeEquivalence,
) -> Option<UnitTypeId> {
    let owner = world.player(player)?;
    if owner.can_produce(unit_type) {
        return Some(unit_type);
    }
    let mut candidates = equivalence.equivalents(unit_type);
    if let Some(class) = world.catalog.get(unit_type).and_then(|t| t.class.as_deref()) {
        candidates.extend(world.catalog.class_members(class).map(|t| t.id));
    }
    candidates.into_iter().find(|t| owner.can_produce(*t))
}
