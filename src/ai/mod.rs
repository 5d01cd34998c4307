//! Force AI: groups units into forces and drives their attacks
//!
//! `PlayerAi` is the per-player driver. It owns the force pool and runs the
//! per-tick update plus the coarse periodic composition and recruitment
//! passes. Everything the AI wants from the outside world is written into a
//! [`Directives`] buffer.

pub mod attack;
pub mod enemy_finder;
pub mod force;
pub mod manager;
pub mod rally_point;
pub mod recruitment;
pub mod templates;
pub mod transport;

pub use enemy_finder::{FindType, SearchOptions, Target};
pub use force::{Force, ForceRequirement, ForceRole, ForceState, ForceType};
pub use manager::ForceManager;
pub use templates::{ForceTemplate, ForceTemplateSet};
pub use transport::{CoastalTransportPlanner, TransportPlanner};

use ahash::AHashMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::core::config::ForceConfig;
use crate::core::error::{ForceError, Result};
use crate::core::types::{ForceId, MapLayer, PlayerId, TilePos, UnitId, UnitTypeId};
use crate::units::{Directives, UnitTypeCatalog, UnitTypeEquivalence};
use crate::world::World;

/// State shared by every player AI of one game session
#[derive(Debug, Clone)]
pub struct AiSession {
    pub equivalence: UnitTypeEquivalence,
}

impl AiSession {
    /// Build the equivalence table from the catalog's declared groups
    pub fn new(catalog: &UnitTypeCatalog) -> Self {
        let mut equivalence = UnitTypeEquivalence::new(catalog.len());
        equivalence.rebuild(catalog.len(), catalog.equivalence_groups());
        Self { equivalence }
    }

    /// Forget every merge, e.g. when a new game is loaded
    pub fn reset(&mut self, catalog: &UnitTypeCatalog) {
        self.equivalence.rebuild(catalog.len(), catalog.equivalence_groups());
    }
}

/// Player-wide AI bookkeeping that individual forces read and write
#[derive(Debug, Clone)]
pub struct AiPlayerState {
    pub player: PlayerId,
    /// The last whole-map target search failed; do not retry yet
    pub scouting: bool,
    /// Units currently out scouting
    pub scouts: Vec<UnitId>,
}

impl AiPlayerState {
    pub fn new(player: PlayerId) -> Self {
        Self {
            player,
            scouting: false,
            scouts: Vec::new(),
        }
    }
}

/// Everything a force decision may read or write
pub struct ForceContext<'a> {
    pub world: &'a mut World,
    pub equivalence: &'a UnitTypeEquivalence,
    pub config: &'a ForceConfig,
    pub ai: &'a mut AiPlayerState,
    pub planner: &'a mut dyn TransportPlanner,
    pub directives: &'a mut Directives,
}

/// The outside world handed to [`PlayerAi`] each call
pub struct AiEnv<'a> {
    pub world: &'a mut World,
    pub session: &'a AiSession,
    pub planner: &'a mut dyn TransportPlanner,
    pub directives: &'a mut Directives,
}

/// Force AI of one player
#[derive(Debug)]
pub struct PlayerAi {
    pub state: AiPlayerState,
    pub forces: ForceManager,
    pub templates: ForceTemplateSet,
    pub config: ForceConfig,
    rng: ChaCha8Rng,
}

/// Borrow the parts of a `PlayerAi` and an `AiEnv` as one `ForceContext`
macro_rules! force_context {
    ($ai:expr, $env:expr) => {
        ForceContext {
            world: &mut *$env.world,
            equivalence: &$env.session.equivalence,
            config: &$ai.config,
            ai: &mut $ai.state,
            planner: &mut *$env.planner,
            directives: &mut *$env.directives,
        }
    };
}

impl PlayerAi {
    /// Create an AI using the global configuration
    pub fn new(player: PlayerId, templates: ForceTemplateSet) -> Result<Self> {
        Self::with_config(player, templates, crate::core::config::config().clone())
    }

    /// Create an AI with its own tuning; rejects configs that fail
    /// [`ForceConfig::validate`]
    pub fn with_config(player: PlayerId, templates: ForceTemplateSet, config: ForceConfig) -> Result<Self> {
        config.validate()?;
        let seed = config.seed.wrapping_add(player.0 as u64);
        Ok(Self {
            state: AiPlayerState::new(player),
            forces: ForceManager::new(config.script_forces),
            templates,
            rng: ChaCha8Rng::seed_from_u64(seed),
            config,
        })
    }

    pub fn player(&self) -> PlayerId {
        self.state.player
    }

    /// Look up a force by slot
    pub fn force(&self, id: ForceId) -> Result<&Force> {
        self.forces.force(id).ok_or(ForceError::ForceNotFound(id.0))
    }

    /// Advance the AI by one tick
    pub fn tick(&mut self, env: &mut AiEnv<'_>) {
        let now = env.world.tick;

        if self.state.scouting && now % self.config.scouting_retry_interval == 0 {
            tracing::debug!("Player {:?} may search for targets again", self.state.player);
            self.state.scouting = false;
        }

        if now % self.config.recruitment_interval == 0 {
            self.check_units(env);
            let mut ctx = force_context!(self, env);
            self.forces.assign_free_units(&mut ctx, None);
            self.forces
                .check_force_recruitment(&mut ctx, &self.templates, &mut self.rng);
        }

        let mut ctx = force_context!(self, env);
        self.forces.update(&mut ctx);
        self.forces.release_finished_folds(&mut ctx);
    }

    /// Composition check: request production for every shortfall
    ///
    /// The counter starts at what the player already has queued.
    pub fn check_units(&mut self, env: &mut AiEnv<'_>) {
        let mut counter: AHashMap<UnitTypeId, i64> = AHashMap::new();
        if let Some(player) = env.world.player(self.state.player) {
            for (unit_type, count) in &player.queued {
                let rep = env.session.equivalence.representative(*unit_type);
                *counter.entry(rep).or_insert(0) += *count as i64;
            }
        }
        let mut ctx = force_context!(self, env);
        self.forces.check_units(&mut ctx, &mut counter);
    }

    /// A unit finished training: place it in the first force that wants it
    pub fn on_unit_created(&mut self, env: &mut AiEnv<'_>, unit: UnitId) -> bool {
        let is_hero = env
            .world
            .unit_type_of(unit)
            .is_some_and(|t| t.hero);
        let mut ctx = force_context!(self, env);
        self.forces.assign(&mut ctx, unit, None, is_hero)
    }

    /// Script entry: add a unit to a script force
    pub fn assign(&mut self, env: &mut AiEnv<'_>, unit: UnitId, script: usize) -> bool {
        let is_hero = env
            .world
            .unit_type_of(unit)
            .is_some_and(|t| t.hero);
        let mut ctx = force_context!(self, env);
        self.forces.assign(&mut ctx, unit, Some(script), is_hero)
    }

    /// Script entry: launch one script force
    pub fn attack_with_force(&mut self, env: &mut AiEnv<'_>, script: usize) -> Option<ForceId> {
        let mut ctx = force_context!(self, env);
        self.forces.attack_with_force(&mut ctx, script)
    }

    /// Script entry: launch several script forces as one
    pub fn attack_with_forces(&mut self, env: &mut AiEnv<'_>, scripts: &[usize]) -> Option<ForceId> {
        let mut ctx = force_context!(self, env);
        self.forces.attack_with_forces(&mut ctx, scripts)
    }

    /// Our units near `pos` are under attack: send defence forces
    pub fn defend_at(&mut self, env: &mut AiEnv<'_>, pos: TilePos, layer: MapLayer) -> usize {
        let mut ctx = force_context!(self, env);
        self.forces.defend_at(&mut ctx, pos, layer)
    }

    /// Register a unit as a scout
    pub fn add_scout(&mut self, unit: UnitId) {
        if !self.state.scouts.contains(&unit) {
            self.state.scouts.push(unit);
        }
    }
}
