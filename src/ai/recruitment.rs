//! Recruitment pass
//!
//! Runs on the coarse recruitment timer. Every completed idle force is sent
//! to attack; once every force is complete and the caps allow it, a new
//! force is started from a template.

use ahash::AHashMap;
use rand_chacha::ChaCha8Rng;

use crate::ai::force::{ForceRole, ForceState, ForceType};
use crate::ai::manager::ForceManager;
use crate::ai::templates::ForceTemplateSet;
use crate::ai::ForceContext;
use crate::core::types::ForceId;

impl ForceManager {
    pub fn check_force_recruitment(
        &mut self,
        ctx: &mut ForceContext<'_>,
        templates: &ForceTemplateSet,
        rng: &mut ChaCha8Rng,
    ) {
        let player_id = ctx.ai.player;
        let Some(player) = ctx.world.player(player_id) else {
            return;
        };
        if ctx.world.town_hall_count(player_id) == 0 && player.can_build_town_hall {
            tracing::debug!("Player {:?} has no town hall yet, holding recruitment", player_id);
            return;
        }

        let script_forces = self.script_forces();
        let mut completed_forces = 0usize;
        let mut completed_population = 0u32;
        let mut per_type: AHashMap<ForceType, u32> = AHashMap::new();
        let mut all_completed = true;
        let mut ready: Vec<ForceId> = Vec::new();

        for force in self.iter() {
            if force.state == ForceState::Free || force.unit_types.is_empty() || force.attacking {
                continue;
            }
            if !force.completed {
                all_completed = false;
                continue;
            }
            if force.is_empty() || force.is_hero_only(&ctx.world.units, &ctx.world.catalog) {
                continue;
            }
            completed_forces += 1;
            completed_population += force
                .units
                .iter()
                .filter_map(|id| ctx.world.unit_type_of(*id))
                .map(|t| t.supply)
                .sum::<u32>();
            *per_type
                .entry(force.force_type(&ctx.world.units, &ctx.world.catalog))
                .or_insert(0) += 1;

            // a fold waiting to be handed back is released first
            if force.former_force.is_none() && !force.defending && force.state == ForceState::Waiting {
                ready.push(force.slot);
            }
        }

        for slot in ready {
            self.launch(ctx, slot);
        }

        if !all_completed {
            return;
        }
        if completed_forces >= ctx.config.max_completed_forces
            || completed_population >= ctx.config.max_completed_force_population
        {
            tracing::debug!(
                "Player {:?} at force cap ({} forces, {} supply)",
                player_id,
                completed_forces,
                completed_population
            );
            return;
        }

        let Some(force_type) = templates.pick_force_type(&per_type, rng) else {
            return;
        };
        let Some(player) = ctx.world.player(player_id) else {
            return;
        };
        let Some(template) = templates.pick_template(force_type, player, &ctx.world.catalog, rng) else {
            tracing::debug!("Player {:?} has no usable {:?} template", player_id, force_type);
            return;
        };

        let slot = self.find_free_force(
            ForceRole::Default,
            script_forces,
            false,
            &mut ctx.world.units,
            &ctx.world.catalog,
        );
        if let Some(force) = self.force_mut(slot) {
            for req in &template.units {
                force.want(req.unit_type, req.want);
            }
        }
        let staffed = self.assign_free_units(ctx, Some(slot));
        if let Some(force) = self.force_mut(slot) {
            force.refresh_completed(&ctx.world.units, &ctx.world.catalog, ctx.equivalence);
        }
        tracing::info!(
            "Player {:?} recruits '{}' into force {:?} ({} idle units joined)",
            player_id,
            template.name,
            slot,
            staffed
        );
    }
}
