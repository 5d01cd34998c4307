//! Headless Force Skirmish
//!
//! Two AI players on an open map recruit forces from templates and send
//! them at each other. A toy executor trains requested units at the town
//! hall, walks units one tile per tick towards their orders and resolves
//! melee by proximity. Prints a JSON summary at the end.

use arc_forces::ai::{AiEnv, AiSession, CoastalTransportPlanner, ForceState, ForceTemplateSet, PlayerAi};
use arc_forces::core::config::ForceConfig;
use arc_forces::core::error::Result;
use arc_forces::core::types::{PlayerId, TilePos, UnitId};
use arc_forces::map::GameMap;
use arc_forces::player::Stance;
use arc_forces::units::{Directives, OrderKind, UnitTypeCatalog};
use arc_forces::world::World;

use ahash::AHashMap;
use clap::Parser;
use serde::Serialize;

/// Force Skirmish - two force AIs fight on an open map
#[derive(Parser, Debug)]
#[command(name = "force_sim")]
#[command(about = "Run two force AIs against each other and print a JSON summary")]
struct Args {
    /// Force AI tuning file
    #[arg(long, default_value = "data/force_ai.toml")]
    config: String,

    /// Unit type catalog
    #[arg(long, default_value = "data/unit_types.toml")]
    units: String,

    /// Force composition templates
    #[arg(long, default_value = "data/force_templates.toml")]
    templates: String,

    /// Overrides the seed from the config file
    #[arg(long)]
    seed: Option<u64>,

    /// Ticks to simulate
    #[arg(long, default_value_t = 2000)]
    ticks: u64,

    /// Map width in tiles
    #[arg(long, default_value_t = 64)]
    map_width: u32,

    /// Map height in tiles
    #[arg(long, default_value_t = 32)]
    map_height: u32,

    /// Units one town hall trains per tick
    #[arg(long, default_value_t = 1)]
    train_rate: u32,
}

/// Unit types the demo factions can train
const TRAINABLE: [&str; 4] = ["footman", "archer", "knight", "catapult"];

/// Damage dealt per tick by a unit standing next to its target
const MELEE_DAMAGE: u32 = 8;

#[derive(Debug, Serialize)]
struct PlayerSummary {
    name: String,
    alive_units: usize,
    forces: usize,
    attacking_forces: usize,
    scouting: bool,
}

#[derive(Debug, Serialize)]
struct Summary {
    ticks: u64,
    seed: u64,
    players: Vec<PlayerSummary>,
}

struct Skirmish {
    world: World,
    session: AiSession,
    ais: Vec<PlayerAi>,
    planner: CoastalTransportPlanner,
    directives: Directives,
    orders: AHashMap<UnitId, OrderKind>,
    pending: Vec<(u32, UnitId, OrderKind)>,
    training: AHashMap<PlayerId, Vec<String>>,
    train_rate: u32,
}

impl Skirmish {
    fn step(&mut self) {
        for ai in &mut self.ais {
            let mut env = AiEnv {
                world: &mut self.world,
                session: &self.session,
                planner: &mut self.planner,
                directives: &mut self.directives,
            };
            ai.tick(&mut env);
        }

        self.apply_directives();
        self.train_units();
        self.move_units();
        self.resolve_melee();
        self.world.tick();
    }

    fn apply_directives(&mut self) {
        let issued = self.directives.drain();

        for change in issued.stance_changes {
            tracing::info!("Player {:?} now {:?} towards {:?}", change.player, change.stance, change.towards);
            if let Some(player) = self.world.player_mut(change.player) {
                player.set_stance(change.towards, change.stance);
            }
        }

        for request in issued.production {
            let Some(name) = self.world.catalog.get(request.unit_type).map(|t| t.name.clone()) else {
                continue;
            };
            let queue = self.training.entry(request.player).or_default();
            let queued = queue.iter().filter(|n| **n == name).count() as u32;
            // the AI re-requests its full shortfall every check
            for _ in queued..request.count {
                queue.push(name.clone());
            }
            if let Some(player) = self.world.player_mut(request.player) {
                let entry = player.queued.entry(request.unit_type).or_insert(0);
                *entry = (*entry).max(request.count);
            }
        }

        for order in issued.orders {
            self.pending.push((order.delay, order.unit, order.kind));
        }
        let mut ready = Vec::new();
        self.pending.retain_mut(|(delay, unit, kind)| {
            if *delay == 0 {
                ready.push((*unit, kind.clone()));
                false
            } else {
                *delay -= 1;
                true
            }
        });
        for (unit, kind) in ready {
            if let Some(record) = self.world.units.get_mut(unit) {
                record.idle = matches!(kind, OrderKind::Stop);
            }
            self.orders.insert(unit, kind);
        }
    }

    fn train_units(&mut self) {
        for index in 0..self.ais.len() {
            let player = self.ais[index].player();
            let Some(hall) = self
                .world
                .units
                .owned_by(player)
                .find(|u| self.world.catalog.get(u.unit_type).is_some_and(|t| t.town_hall))
                .map(|u| u.pos)
            else {
                continue;
            };

            for _ in 0..self.train_rate {
                let Some(queue) = self.training.get_mut(&player) else {
                    break;
                };
                if queue.is_empty() {
                    break;
                }
                let name = queue.remove(0);
                let offset = (self.world.units.len() % 5) as i32;
                let pos = TilePos::new(hall.x + 4, hall.y + offset - 2);
                let Some(unit) = self.world.spawn(&name, player, pos, 0) else {
                    continue;
                };
                let unit_type = self.world.units.get(unit).map(|u| u.unit_type);
                if let (Some(owner), Some(unit_type)) = (self.world.player_mut(player), unit_type) {
                    if let Some(count) = owner.queued.get_mut(&unit_type) {
                        *count = count.saturating_sub(1);
                    }
                }

                let mut env = AiEnv {
                    world: &mut self.world,
                    session: &self.session,
                    planner: &mut self.planner,
                    directives: &mut self.directives,
                };
                let joined = self.ais[index].on_unit_created(&mut env, unit);
                tracing::debug!("Player {:?} trained {} ({:?}), joined force: {}", player, name, unit, joined);
            }
        }
    }

    fn move_units(&mut self) {
        let mut arrived = Vec::new();
        for (unit, kind) in &self.orders {
            let pos = match kind {
                OrderKind::Move { pos, .. } | OrderKind::AttackMove { pos, .. } | OrderKind::Unload { pos, .. } => *pos,
                // escorts trail their leader and never "arrive"
                OrderKind::Defend(leader) | OrderKind::Follow(leader) => {
                    let Some(target) = self.world.units.get(*leader).filter(|u| u.is_alive()) else {
                        continue;
                    };
                    let beside = self
                        .world
                        .units
                        .get(*unit)
                        .is_some_and(|u| u.pos.distance(&target.pos) <= 1);
                    if beside {
                        continue;
                    }
                    target.pos
                }
                OrderKind::Board(_) | OrderKind::Stop => continue,
            };
            let Some(record) = self.world.units.get(*unit) else {
                continue;
            };
            if !record.is_alive() {
                continue;
            }
            let from = record.pos;
            if from == pos {
                arrived.push(*unit);
                continue;
            }
            let next = TilePos::new(from.x + (pos.x - from.x).signum(), from.y + (pos.y - from.y).signum());
            if self.world.map.in_bounds(next, record.layer) {
                if let Some(record) = self.world.units.get_mut(*unit) {
                    record.pos = next;
                }
            }
        }
        for unit in arrived {
            self.orders.remove(&unit);
            if let Some(record) = self.world.units.get_mut(unit) {
                record.idle = true;
            }
        }
    }

    fn resolve_melee(&mut self) {
        let occupancy = self.world.units.occupancy(&self.world.catalog);
        let mut hits: Vec<UnitId> = Vec::new();
        for unit in self.world.units.iter().filter(|u| u.is_alive()) {
            let Some(unit_type) = self.world.catalog.get(unit.unit_type) else {
                continue;
            };
            if !unit_type.can_attack {
                continue;
            }
            let target = occupancy
                .units_in_square(unit.layer, unit.pos, unit_type.attack_range.max(1))
                .into_iter()
                .filter_map(|id| self.world.units.get(id))
                .find(|other| other.is_alive() && self.world.stance(unit.owner, other.owner) == Stance::Enemy)
                .map(|other| other.id);
            hits.extend(target);
        }
        for target in hits {
            let dead = match self.world.units.get_mut(target) {
                Some(unit) if unit.is_alive() => {
                    unit.hp = unit.hp.saturating_sub(MELEE_DAMAGE);
                    unit.hp == 0
                }
                _ => false,
            };
            if dead {
                self.world.units.kill(target);
                self.orders.remove(&target);
            }
        }
    }

    fn summary(&self, ticks: u64, seed: u64) -> Summary {
        let players = self
            .ais
            .iter()
            .map(|ai| PlayerSummary {
                name: self
                    .world
                    .player(ai.player())
                    .map(|p| p.name.clone())
                    .unwrap_or_default(),
                alive_units: self.world.units.owned_by(ai.player()).count(),
                forces: ai.forces.iter().filter(|f| f.state != ForceState::Free).count(),
                attacking_forces: ai.forces.iter().filter(|f| f.is_attacking()).count(),
                scouting: ai.state.scouting,
            })
            .collect();
        Summary { ticks, seed, players }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("arc_forces=info")
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = ForceConfig::load(&args.config)?;
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    let catalog = UnitTypeCatalog::load(&args.units)?;
    let templates = ForceTemplateSet::load(&args.templates, &catalog)?;

    let mut world = World::new(GameMap::new(args.map_width, args.map_height), catalog);
    let red = world.add_player("red");
    let blue = world.add_player("blue");
    world.set_mutual_stance(red, blue, Stance::Enemy);

    let mid = args.map_height as i32 / 2;
    let halls = [(red, TilePos::new(2, mid - 1)), (blue, TilePos::new(args.map_width as i32 - 5, mid - 1))];
    for (player, pos) in halls {
        world.spawn("town_hall", player, pos, 0);
        let trainable: Vec<_> = TRAINABLE.iter().filter_map(|name| world.catalog.by_name(name)).collect();
        if let Some(owner) = world.player_mut(player) {
            owner.producible.extend(trainable);
        }
    }

    let session = AiSession::new(&world.catalog);
    let ais = vec![
        PlayerAi::with_config(red, templates.clone(), config.clone())?,
        PlayerAi::with_config(blue, templates, config.clone())?,
    ];

    tracing::info!(
        "Starting skirmish on {}x{} for {} ticks (seed {})",
        args.map_width,
        args.map_height,
        args.ticks,
        config.seed
    );

    let mut skirmish = Skirmish {
        world,
        session,
        ais,
        planner: CoastalTransportPlanner,
        directives: Directives::new(),
        orders: AHashMap::new(),
        pending: Vec::new(),
        training: AHashMap::new(),
        train_rate: args.train_rate,
    };

    for tick in 0..args.ticks {
        skirmish.step();
        if tick % 250 == 0 {
            for ai in &skirmish.ais {
                tracing::info!(
                    "tick {}: player {:?} has {} units, {} forces attacking",
                    tick,
                    ai.player(),
                    skirmish.world.units.owned_by(ai.player()).count(),
                    ai.forces.iter().filter(|f| f.is_attacking()).count()
                );
            }
        }
        if skirmish.world.town_hall_count(red) == 0 || skirmish.world.town_hall_count(blue) == 0 {
            tracing::info!("A town hall fell at tick {}", tick);
            break;
        }
    }

    let summary = skirmish.summary(skirmish.world.tick, config.seed);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
