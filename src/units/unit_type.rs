//! Unit type definitions and the catalog they are looked up in
//!
//! Types are plain data loaded from TOML. The AI only needs the properties
//! that drive grouping and target selection: movement domain, footprint,
//! attack capability, transport capacity and production cost.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::Index;
use std::path::Path;

use crate::core::error::{ForceError, Result};
use crate::core::types::UnitTypeId;
use crate::player::ResourceKind;

/// Where a unit moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitDomain {
    #[default]
    Land,
    Naval,
    Air,
    Space,
}

impl UnitDomain {
    /// Air and space units ignore terrain
    pub fn is_airborne(&self) -> bool {
        matches!(self, UnitDomain::Air | UnitDomain::Space)
    }
}

fn default_tile_size() -> u32 {
    1
}

/// Static properties of a unit type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitType {
    /// Assigned by the catalog on insertion
    #[serde(skip)]
    pub id: UnitTypeId,
    pub name: String,
    #[serde(default)]
    pub domain: UnitDomain,
    #[serde(default = "default_tile_size")]
    pub tile_width: u32,
    #[serde(default = "default_tile_size")]
    pub tile_height: u32,
    #[serde(default)]
    pub can_attack: bool,
    /// Weapon range in tiles (melee = 1)
    #[serde(default)]
    pub attack_range: u32,
    #[serde(default)]
    pub building: bool,
    #[serde(default)]
    pub town_hall: bool,
    /// Number of passengers this type can carry (0 = not a transporter)
    #[serde(default)]
    pub transport_capacity: u32,
    #[serde(default)]
    pub hero: bool,
    /// Units sharing a class can stand in for each other in compositions
    #[serde(default)]
    pub class: Option<String>,
    /// Population cost
    #[serde(default)]
    pub supply: u32,
    #[serde(default)]
    pub costs: AHashMap<ResourceKind, u32>,
    /// Decorations, critters and the like
    #[serde(default)]
    pub untargetable: bool,
}

impl UnitType {
    pub fn new(name: &str, domain: UnitDomain) -> Self {
        Self {
            id: UnitTypeId::default(),
            name: name.to_string(),
            domain,
            tile_width: 1,
            tile_height: 1,
            can_attack: false,
            attack_range: 0,
            building: false,
            town_hall: false,
            transport_capacity: 0,
            hero: false,
            class: None,
            supply: 0,
            costs: AHashMap::new(),
            untargetable: false,
        }
    }

    /// Builder: armed with the given range
    pub fn with_attack(mut self, range: u32) -> Self {
        self.can_attack = true;
        self.attack_range = range.max(1);
        self
    }

    pub fn with_transport(mut self, capacity: u32) -> Self {
        self.transport_capacity = capacity;
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.class = Some(class.to_string());
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.tile_width = width;
        self.tile_height = height;
        self
    }

    pub fn with_supply(mut self, supply: u32) -> Self {
        self.supply = supply;
        self
    }

    pub fn with_cost(mut self, resource: ResourceKind, amount: u32) -> Self {
        self.costs.insert(resource, amount);
        self
    }

    pub fn as_building(mut self) -> Self {
        self.building = true;
        self
    }

    pub fn as_town_hall(mut self) -> Self {
        self.building = true;
        self.town_hall = true;
        self
    }

    pub fn as_hero(mut self) -> Self {
        self.hero = true;
        self
    }

    pub fn is_transporter(&self) -> bool {
        self.transport_capacity > 0
    }

    /// Units that lead an assault; everything else escorts or follows
    pub fn is_aggressive(&self) -> bool {
        self.can_attack && !self.building
    }

    /// Does this type cost anything of `resource`?
    pub fn uses_resource(&self, resource: ResourceKind) -> bool {
        self.costs.get(&resource).is_some_and(|amount| *amount > 0)
    }
}

/// On-disk catalog layout
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    unit_type: Vec<UnitType>,
    /// Groups of type names that count as the same type in compositions
    #[serde(default)]
    equivalences: Vec<Vec<String>>,
}

/// All unit types of a game session
#[derive(Debug, Clone, Default)]
pub struct UnitTypeCatalog {
    types: Vec<UnitType>,
    by_name: AHashMap<String, UnitTypeId>,
    equivalence_groups: Vec<Vec<UnitTypeId>>,
}

impl UnitTypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type, assigning the next id
    pub fn add(&mut self, mut unit_type: UnitType) -> UnitTypeId {
        let id = UnitTypeId(self.types.len() as u16);
        unit_type.id = id;
        self.by_name.insert(unit_type.name.clone(), id);
        self.types.push(unit_type);
        id
    }

    pub fn get(&self, id: UnitTypeId) -> Option<&UnitType> {
        self.types.get(id.index())
    }

    pub fn by_name(&self, name: &str) -> Option<UnitTypeId> {
        self.by_name.get(name).copied()
    }

    /// Resolve a name or fail with [`ForceError::UnknownUnitType`]
    pub fn require(&self, name: &str) -> Result<UnitTypeId> {
        self.by_name(name)
            .ok_or_else(|| ForceError::UnknownUnitType(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnitType> {
        self.types.iter()
    }

    /// Every type of the given class, in id order
    pub fn class_members<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a UnitType> + 'a {
        self.types
            .iter()
            .filter(move |t| t.class.as_deref() == Some(class))
    }

    /// Equivalence groups declared in the catalog file
    pub fn equivalence_groups(&self) -> &[Vec<UnitTypeId>] {
        &self.equivalence_groups
    }

    /// Parse a catalog from TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)?;
        let mut catalog = Self::new();
        for unit_type in file.unit_type {
            if catalog.by_name(&unit_type.name).is_some() {
                return Err(ForceError::InvalidConfig(format!(
                    "duplicate unit type '{}'",
                    unit_type.name
                )));
            }
            catalog.add(unit_type);
        }
        for group in &file.equivalences {
            let ids = group
                .iter()
                .map(|name| catalog.require(name))
                .collect::<Result<Vec<_>>>()?;
            catalog.equivalence_groups.push(ids);
        }
        Ok(catalog)
    }

    /// Load a catalog file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

impl Index<UnitTypeId> for UnitTypeCatalog {
    type Output = UnitType;

    fn index(&self, id: UnitTypeId) -> &UnitType {
        &self.types[id.index()]
    }
}
