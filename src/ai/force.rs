//! Force entity: one group of units with a role, a lifecycle state and a
//! composition target
//!
//! The force is the sole owner of its member list. Each member unit holds a
//! weak back-reference (`group_id`) to the force slot, written only by
//! [`Force::insert`], [`Force::remove`], [`Force::take_last`] and
//! [`Force::reset`].

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::ai::ForceContext;
use crate::core::types::{ForceId, MapLayer, TilePos, UnitId, UnitTypeId};
use crate::units::{OrderKind, UnitDomain, UnitStore, UnitTypeCatalog, UnitTypeEquivalence};

/// What the force is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ForceRole {
    #[default]
    Default,
    Attack,
    Defend,
}

/// Lifecycle of a force slot
///
/// Free → Waiting → Boarding → AttackingWithTransporter → GoingToRallyPoint
/// → Attacking. Waiting is also the disengaged state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum ForceState {
    /// Unused slot
    #[default]
    Free,
    /// Composed (or composing), idle
    Waiting,
    /// Passengers embarking into transporters
    Boarding,
    /// Being ferried to the landing site
    AttackingWithTransporter,
    /// Marching to a staging point
    GoingToRallyPoint,
    /// Engaging the goal
    Attacking,
}

/// Classification used to pick an enemy-search strategy and to balance
/// recruitment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForceType {
    Land,
    Naval,
    Air,
    Space,
}

/// One (unit type, wanted count) pair of a composition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceRequirement {
    pub unit_type: UnitTypeId,
    pub want: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Force {
    pub slot: ForceId,
    pub role: ForceRole,
    pub state: ForceState,
    pub units: Vec<UnitId>,
    pub unit_types: Vec<ForceRequirement>,
    pub home: TilePos,
    pub home_layer: MapLayer,
    pub goal: TilePos,
    pub goal_layer: MapLayer,
    /// Ticks left to wait for stragglers at the rally point
    pub wait_on_rally_point: u32,
    pub completed: bool,
    pub defending: bool,
    pub attacking: bool,
    /// Script force number this force was folded from
    pub former_force: Option<usize>,
}

/// Representatives one unit of `unit_type` counts towards
///
/// Its own equivalence representative, plus the representative of every
/// other type sharing its unit class. Each representative appears once.
pub fn counted_representatives(
    unit_type: UnitTypeId,
    catalog: &UnitTypeCatalog,
    equivalence: &UnitTypeEquivalence,
) -> Vec<UnitTypeId> {
    let mut reps = vec![equivalence.representative(unit_type)];
    if let Some(class) = catalog.get(unit_type).and_then(|t| t.class.as_deref()) {
        for other in catalog.class_members(class) {
            let rep = equivalence.representative(other.id);
            if !reps.contains(&rep) {
                reps.push(rep);
            }
        }
    }
    reps
}

impl Force {
    pub fn new(slot: ForceId) -> Self {
        Self {
            slot,
            role: ForceRole::Default,
            state: ForceState::Free,
            units: Vec::new(),
            unit_types: Vec::new(),
            home: TilePos::INVALID,
            home_layer: 0,
            goal: TilePos::INVALID,
            goal_layer: 0,
            wait_on_rally_point: 0,
            completed: false,
            defending: false,
            attacking: false,
            former_force: None,
        }
    }

    pub fn size(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Attacking and not merely defending
    pub fn is_attacking(&self) -> bool {
        !self.defending && self.attacking
    }

    pub fn contains(&self, unit: UnitId) -> bool {
        self.units.contains(&unit)
    }

    /// Add a wanted count for a type, merging with an existing entry
    pub fn want(&mut self, unit_type: UnitTypeId, count: u32) {
        if let Some(req) = self.unit_types.iter_mut().find(|r| r.unit_type == unit_type) {
            req.want += count;
        } else {
            self.unit_types.push(ForceRequirement { unit_type, want: count });
        }
    }

    /// Class-aware member count per equivalence representative
    pub fn count_types(
        &self,
        units: &UnitStore,
        catalog: &UnitTypeCatalog,
        equivalence: &UnitTypeEquivalence,
    ) -> AHashMap<UnitTypeId, u32> {
        let mut counter = AHashMap::new();
        for unit in self.units.iter().filter_map(|id| units.get(*id)) {
            for rep in counted_representatives(unit.unit_type, catalog, equivalence) {
                *counter.entry(rep).or_insert(0) += 1;
            }
        }
        counter
    }

    /// Would a unit of `unit_type` fill a missing slot of the composition?
    ///
    /// Also recomputes `completed`. When the answer is true the caller is
    /// expected to insert the unit, so the new unit is already counted.
    pub fn can_be_assigned_to(
        &mut self,
        unit_type: UnitTypeId,
        units: &UnitStore,
        catalog: &UnitTypeCatalog,
        equivalence: &UnitTypeEquivalence,
    ) -> bool {
        let counter = self.count_types(units, catalog, equivalence);
        let contributes = counted_representatives(unit_type, catalog, equivalence);

        let has_room = self.unit_types.iter().any(|req| {
            let rep = equivalence.representative(req.unit_type);
            req.want > counter.get(&rep).copied().unwrap_or(0) && contributes.contains(&rep)
        });

        self.completed = self.unit_types.iter().all(|req| {
            let rep = equivalence.representative(req.unit_type);
            let mut have = counter.get(&rep).copied().unwrap_or(0);
            if has_room && contributes.contains(&rep) {
                have += 1;
            }
            have >= req.want
        });

        has_room
    }

    /// Recompute `completed` from the current members only
    pub fn refresh_completed(
        &mut self,
        units: &UnitStore,
        catalog: &UnitTypeCatalog,
        equivalence: &UnitTypeEquivalence,
    ) {
        let counter = self.count_types(units, catalog, equivalence);
        self.completed = self.unit_types.iter().all(|req| {
            let rep = equivalence.representative(req.unit_type);
            counter.get(&rep).copied().unwrap_or(0) >= req.want
        });
    }

    /// Take ownership of a unit
    pub fn insert(&mut self, unit: UnitId, units: &mut UnitStore) {
        let Some(record) = units.get_mut(unit) else {
            return;
        };
        assert!(
            record.group_id.is_none() || record.group_id == Some(self.slot),
            "unit {:?} already belongs to force {:?}",
            unit,
            record.group_id
        );
        record.group_id = Some(self.slot);
        if !self.units.contains(&unit) {
            self.units.push(unit);
        }
    }

    /// Release a unit; returns false if it was not a member
    pub fn remove(&mut self, unit: UnitId, units: &mut UnitStore) -> bool {
        let Some(index) = self.units.iter().position(|u| *u == unit) else {
            return false;
        };
        self.units.remove(index);
        if let Some(record) = units.get_mut(unit) {
            record.group_id = None;
        }
        self.completed = false;
        true
    }

    /// Release the most recently added unit
    pub fn take_last(&mut self, units: &mut UnitStore) -> Option<UnitId> {
        let unit = self.units.pop()?;
        if let Some(record) = units.get_mut(unit) {
            record.group_id = None;
        }
        self.completed = false;
        Some(unit)
    }

    /// Drop members that are no longer alive
    pub fn remove_dead_units(&mut self, units: &mut UnitStore) {
        let dead: Vec<UnitId> = self
            .units
            .iter()
            .copied()
            .filter(|id| !units.is_alive(*id))
            .collect();
        for unit in dead {
            self.remove(unit, units);
        }
    }

    /// Classify the current composition
    ///
    /// Naval if any armed, non-transport ship is present; air if every
    /// member flies; space if every member is in space; land otherwise.
    pub fn force_type(&self, units: &UnitStore, catalog: &UnitTypeCatalog) -> ForceType {
        let types: Vec<_> = self
            .units
            .iter()
            .filter_map(|id| units.get(*id))
            .filter_map(|u| catalog.get(u.unit_type))
            .collect();

        if types
            .iter()
            .any(|t| t.domain == UnitDomain::Naval && t.can_attack && !t.is_transporter())
        {
            ForceType::Naval
        } else if !types.is_empty() && types.iter().all(|t| t.domain == UnitDomain::Space) {
            ForceType::Space
        } else if !types.is_empty() && types.iter().all(|t| t.domain.is_airborne()) {
            ForceType::Air
        } else {
            ForceType::Land
        }
    }

    /// Only heroes in the force (and in its template, if any)
    pub fn is_hero_only(&self, units: &UnitStore, catalog: &UnitTypeCatalog) -> bool {
        let members_are_heroes = !self.units.is_empty()
            && self
                .units
                .iter()
                .filter_map(|id| units.get(*id))
                .all(|u| catalog.get(u.unit_type).is_some_and(|t| t.hero));
        let template_is_heroes = self
            .unit_types
            .iter()
            .all(|req| catalog.get(req.unit_type).is_some_and(|t| t.hero));
        members_are_heroes && template_is_heroes
    }

    /// Alive transporter members
    pub fn transporters(&self, units: &UnitStore, catalog: &UnitTypeCatalog) -> Vec<UnitId> {
        self.units
            .iter()
            .copied()
            .filter(|id| {
                units.get(*id).is_some_and(|u| {
                    u.is_alive() && catalog.get(u.unit_type).is_some_and(|t| t.is_transporter())
                })
            })
            .collect()
    }

    pub fn has_transporters(&self, units: &UnitStore, catalog: &UnitTypeCatalog) -> bool {
        !self.transporters(units, catalog).is_empty()
    }

    /// Can at least one member fight?
    pub fn can_attack(&self, units: &UnitStore, catalog: &UnitTypeCatalog) -> bool {
        self.units.iter().filter_map(|id| units.get(*id)).any(|u| {
            u.is_alive() && catalog.get(u.unit_type).is_some_and(|t| t.can_attack)
        })
    }

    /// Cancel whatever the force is doing
    ///
    /// Releases every member. With `clear_types` the composition template
    /// is dropped too and the slot becomes Free; otherwise an active slot
    /// goes back to Waiting. Calling it twice is the same as calling it once.
    pub fn reset(&mut self, clear_types: bool, units: &mut UnitStore) {
        self.attacking = false;
        self.defending = false;
        self.completed = false;
        self.wait_on_rally_point = 0;
        self.goal = TilePos::INVALID;
        self.goal_layer = 0;
        for unit in self.units.drain(..) {
            if let Some(record) = units.get_mut(unit) {
                if record.group_id == Some(self.slot) {
                    record.group_id = None;
                }
            }
        }
        if clear_types {
            self.unit_types.clear();
            self.role = ForceRole::Default;
            self.state = ForceState::Free;
            self.home = TilePos::INVALID;
            self.home_layer = 0;
            self.former_force = None;
        } else if self.state != ForceState::Free {
            self.state = ForceState::Waiting;
        }
    }

    /// Abort the attack and march the survivors back home
    pub fn return_to_home(&mut self, ctx: &mut ForceContext<'_>) {
        if self.home.is_valid() {
            for (index, unit) in self.units.iter().enumerate() {
                if ctx.world.units.get(*unit).is_some_and(|u| u.is_alive() && !u.is_embarked()) {
                    ctx.directives.order(
                        *unit,
                        OrderKind::Move {
                            pos: self.home,
                            layer: self.home_layer,
                        },
                        index as u32,
                    );
                }
            }
        }
        tracing::debug!("Force {:?} returning home to {:?}", self.slot, self.home);
        self.home = TilePos::INVALID;
        self.goal = TilePos::INVALID;
        self.defending = false;
        self.attacking = false;
        self.wait_on_rally_point = 0;
        self.state = ForceState::Waiting;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PlayerId;
    use crate::units::{UnitType, UnitTypeCatalog};

    struct Fixture {
        catalog: UnitTypeCatalog,
        equivalence: UnitTypeEquivalence,
        units: UnitStore,
        footman: UnitTypeId,
        knight: UnitTypeId,
        paladin: UnitTypeId,
        axeman: UnitTypeId,
        gryphon: UnitTypeId,
        destroyer: UnitTypeId,
        transport: UnitTypeId,
    }

    fn fixture() -> Fixture {
        let mut catalog = UnitTypeCatalog::new();
        let footman = catalog.add(
            UnitType::new("footman", UnitDomain::Land)
                .with_attack(1)
                .with_class("infantry"),
        );
        let knight = catalog.add(UnitType::new("knight", UnitDomain::Land).with_attack(1));
        let paladin = catalog.add(UnitType::new("paladin", UnitDomain::Land).with_attack(1));
        let axeman = catalog.add(
            UnitType::new("axeman", UnitDomain::Land)
                .with_attack(1)
                .with_class("infantry"),
        );
        let gryphon = catalog.add(UnitType::new("gryphon", UnitDomain::Air).with_attack(3));
        let destroyer = catalog.add(UnitType::new("destroyer", UnitDomain::Naval).with_attack(4));
        let transport = catalog.add(UnitType::new("transport", UnitDomain::Naval).with_transport(6));
        let mut equivalence = UnitTypeEquivalence::new(catalog.len());
        equivalence.merge(knight, paladin);
        Fixture {
            catalog,
            equivalence,
            units: UnitStore::new(),
            footman,
            knight,
            paladin,
            axeman,
            gryphon,
            destroyer,
            transport,
        }
    }

    fn spawn(units: &mut UnitStore, unit_type: UnitTypeId) -> UnitId {
        units.spawn(unit_type, PlayerId(0), TilePos::new(1, 1), 0)
    }

    #[test]
    fn test_insert_remove_round_trip() {
        let mut f = fixture();
        let unit = spawn(&mut f.units, f.footman);
        let mut force = Force::new(ForceId(3));

        force.insert(unit, &mut f.units);
        assert_eq!(f.units.get(unit).and_then(|u| u.group_id), Some(ForceId(3)));
        assert_eq!(force.size(), 1);

        assert!(force.remove(unit, &mut f.units));
        assert!(f.units.get(unit).is_some_and(|u| u.group_id.is_none()));
        assert!(force.is_empty());
        assert!(!force.remove(unit, &mut f.units));
    }

    #[test]
    fn test_count_types_uses_equivalence() {
        let mut f = fixture();
        let mut force = Force::new(ForceId(0));
        let a = spawn(&mut f.units, f.knight);
        let b = spawn(&mut f.units, f.paladin);
        force.insert(a, &mut f.units);
        force.insert(b, &mut f.units);

        let counter = force.count_types(&f.units, &f.catalog, &f.equivalence);
        assert_eq!(counter.get(&f.knight), Some(&2));
        assert_eq!(counter.get(&f.paladin), None);
    }

    #[test]
    fn test_count_types_counts_class_siblings() {
        let mut f = fixture();
        let mut force = Force::new(ForceId(0));
        let unit = spawn(&mut f.units, f.footman);
        force.insert(unit, &mut f.units);

        let counter = force.count_types(&f.units, &f.catalog, &f.equivalence);
        assert_eq!(counter.get(&f.footman), Some(&1));
        assert_eq!(counter.get(&f.axeman), Some(&1));
    }

    #[test]
    fn test_can_be_assigned_to_tracks_completion() {
        let mut f = fixture();
        let mut force = Force::new(ForceId(0));
        force.want(f.knight, 2);

        let first = spawn(&mut f.units, f.paladin);
        assert!(force.can_be_assigned_to(f.paladin, &f.units, &f.catalog, &f.equivalence));
        assert!(!force.completed);
        force.insert(first, &mut f.units);

        let second = spawn(&mut f.units, f.knight);
        assert!(force.can_be_assigned_to(f.knight, &f.units, &f.catalog, &f.equivalence));
        assert!(force.completed);
        force.insert(second, &mut f.units);

        assert!(!force.can_be_assigned_to(f.knight, &f.units, &f.catalog, &f.equivalence));
        assert!(force.completed);
        assert!(!force.can_be_assigned_to(f.gryphon, &f.units, &f.catalog, &f.equivalence));
    }

    #[test]
    fn test_class_member_fills_class_requirement() {
        let mut f = fixture();
        let mut force = Force::new(ForceId(0));
        force.want(f.axeman, 1);
        assert!(force.can_be_assigned_to(f.footman, &f.units, &f.catalog, &f.equivalence));
        assert!(!force.can_be_assigned_to(f.knight, &f.units, &f.catalog, &f.equivalence));
    }

    #[test]
    fn test_remove_dead_units_clears_group_id() {
        let mut f = fixture();
        let mut force = Force::new(ForceId(1));
        let alive = spawn(&mut f.units, f.footman);
        let dead = spawn(&mut f.units, f.footman);
        force.insert(alive, &mut f.units);
        force.insert(dead, &mut f.units);
        f.units.kill(dead);

        force.remove_dead_units(&mut f.units);
        assert_eq!(force.units, vec![alive]);
        assert!(f.units.get(dead).is_some_and(|u| u.group_id.is_none()));
    }

    #[test]
    fn test_force_type_classification() {
        let mut f = fixture();

        let mut naval = Force::new(ForceId(0));
        let ship = spawn(&mut f.units, f.destroyer);
        let soldier = spawn(&mut f.units, f.footman);
        naval.insert(ship, &mut f.units);
        naval.insert(soldier, &mut f.units);
        assert_eq!(naval.force_type(&f.units, &f.catalog), ForceType::Naval);

        let mut ferry = Force::new(ForceId(1));
        let boat = spawn(&mut f.units, f.transport);
        let rider = spawn(&mut f.units, f.footman);
        ferry.insert(boat, &mut f.units);
        ferry.insert(rider, &mut f.units);
        assert_eq!(ferry.force_type(&f.units, &f.catalog), ForceType::Land);

        let mut air = Force::new(ForceId(2));
        let flyer = spawn(&mut f.units, f.gryphon);
        air.insert(flyer, &mut f.units);
        assert_eq!(air.force_type(&f.units, &f.catalog), ForceType::Air);

        assert_eq!(Force::new(ForceId(3)).force_type(&f.units, &f.catalog), ForceType::Land);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut f = fixture();
        let mut force = Force::new(ForceId(0));
        force.state = ForceState::Attacking;
        force.attacking = true;
        force.want(f.footman, 2);
        let unit = spawn(&mut f.units, f.footman);
        force.insert(unit, &mut f.units);

        force.reset(true, &mut f.units);
        let once = serde_json::to_string(&force).expect("serialize");
        force.reset(true, &mut f.units);
        let twice = serde_json::to_string(&force).expect("serialize");

        assert_eq!(once, twice);
        assert_eq!(force.state, ForceState::Free);
        assert!(force.unit_types.is_empty());
        assert!(f.units.get(unit).is_some_and(|u| u.group_id.is_none()));
    }

    #[test]
    fn test_reset_keeping_types_returns_to_waiting() {
        let mut f = fixture();
        let mut force = Force::new(ForceId(0));
        force.state = ForceState::GoingToRallyPoint;
        force.attacking = true;
        force.want(f.footman, 2);

        force.reset(false, &mut f.units);
        assert_eq!(force.state, ForceState::Waiting);
        assert!(!force.attacking);
        assert_eq!(force.unit_types.len(), 1);

        let mut free = Force::new(ForceId(1));
        free.reset(false, &mut f.units);
        assert_eq!(free.state, ForceState::Free);
    }

    #[test]
    fn test_transporter_queries() {
        let mut f = fixture();
        let mut force = Force::new(ForceId(0));
        let boat = spawn(&mut f.units, f.transport);
        force.insert(boat, &mut f.units);
        assert!(force.has_transporters(&f.units, &f.catalog));
        assert!(!force.can_attack(&f.units, &f.catalog));

        let soldier = spawn(&mut f.units, f.footman);
        force.insert(soldier, &mut f.units);
        assert!(force.can_attack(&f.units, &f.catalog));
    }
}
