//! Force composition templates
//!
//! Loaded from TOML, with unit type names resolved against a catalog at
//! load time so recruitment never deals in strings.

use std::path::Path;

use ahash::AHashMap;
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use serde::Deserialize;

use crate::ai::force::{ForceRequirement, ForceType};
use crate::core::error::{ForceError, Result};
use crate::player::Player;
use crate::units::UnitTypeCatalog;

/// A named composition recruitment can instantiate
#[derive(Debug, Clone)]
pub struct ForceTemplate {
    pub name: String,
    pub force_type: ForceType,
    /// Only the highest-priority usable templates are considered
    pub priority: i32,
    /// Relative chance among templates of equal priority
    pub weight: u32,
    pub units: Vec<ForceRequirement>,
}

impl ForceTemplate {
    /// Every unit type is producible right now and none costs a scarce
    /// resource
    pub fn is_usable_by(&self, player: &Player, catalog: &UnitTypeCatalog) -> bool {
        self.units.iter().all(|req| {
            player.can_produce(req.unit_type)
                && catalog
                    .get(req.unit_type)
                    .is_some_and(|t| !t.costs.keys().any(|resource| player.is_scarce(*resource)))
        })
    }
}

#[derive(Debug, Deserialize)]
struct TemplateFile {
    #[serde(default)]
    force_type_weights: AHashMap<String, u32>,
    #[serde(default)]
    template: Vec<RawTemplate>,
}

#[derive(Debug, Deserialize)]
struct RawTemplate {
    name: String,
    force_type: String,
    #[serde(default)]
    priority: i32,
    #[serde(default = "default_weight")]
    weight: u32,
    units: Vec<RawRequirement>,
}

#[derive(Debug, Deserialize)]
struct RawRequirement {
    unit_type: String,
    count: u32,
}

fn default_weight() -> u32 {
    1
}

fn parse_force_type(name: &str) -> Result<ForceType> {
    match name {
        "land" => Ok(ForceType::Land),
        "naval" => Ok(ForceType::Naval),
        "air" => Ok(ForceType::Air),
        "space" => Ok(ForceType::Space),
        other => Err(ForceError::InvalidConfig(format!("unknown force type '{}'", other))),
    }
}

/// All templates of a faction plus the per-type recruitment weights
#[derive(Debug, Clone, Default)]
pub struct ForceTemplateSet {
    templates: Vec<ForceTemplate>,
    type_weights: AHashMap<ForceType, u32>,
}

impl ForceTemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(content: &str, catalog: &UnitTypeCatalog) -> Result<Self> {
        let file: TemplateFile = toml::from_str(content)?;
        let mut set = Self::new();

        for (name, weight) in &file.force_type_weights {
            set.set_type_weight(parse_force_type(name)?, *weight);
        }

        for raw in file.template {
            let force_type = parse_force_type(&raw.force_type)?;
            if raw.units.is_empty() {
                return Err(ForceError::InvalidConfig(format!("template '{}' has no units", raw.name)));
            }
            let mut units: Vec<ForceRequirement> = Vec::with_capacity(raw.units.len());
            for req in raw.units {
                let unit_type = catalog.require(&req.unit_type)?;
                if req.count == 0 {
                    return Err(ForceError::InvalidConfig(format!(
                        "template '{}' wants zero of '{}'",
                        raw.name, req.unit_type
                    )));
                }
                match units.iter_mut().find(|r| r.unit_type == unit_type) {
                    Some(existing) => existing.want += req.count,
                    None => units.push(ForceRequirement {
                        unit_type,
                        want: req.count,
                    }),
                }
            }
            set.add(ForceTemplate {
                name: raw.name,
                force_type,
                priority: raw.priority,
                weight: raw.weight,
                units,
            });
        }

        tracing::info!("Loaded {} force templates", set.templates.len());
        Ok(set)
    }

    pub fn load(path: impl AsRef<Path>, catalog: &UnitTypeCatalog) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content, catalog)
    }

    pub fn add(&mut self, template: ForceTemplate) {
        self.templates.push(template);
    }

    pub fn set_type_weight(&mut self, force_type: ForceType, weight: u32) {
        self.type_weights.insert(force_type, weight);
    }

    /// Recruitment weight of a force type; 1 unless configured
    pub fn type_weight(&self, force_type: ForceType) -> u32 {
        self.type_weights.get(&force_type).copied().unwrap_or(1)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ForceTemplate> {
        self.templates.iter()
    }

    pub fn templates_for(&self, force_type: ForceType) -> impl Iterator<Item = &ForceTemplate> {
        self.templates.iter().filter(move |t| t.force_type == force_type)
    }

    /// Draw a force type, favouring types with few completed forces
    ///
    /// Each type with at least one template weighs
    /// `type weight / (1 + completed forces of that type)`.
    pub fn pick_force_type(&self, completed: &AHashMap<ForceType, u32>, rng: &mut impl Rng) -> Option<ForceType> {
        let mut types: Vec<ForceType> = Vec::new();
        for template in &self.templates {
            if !types.contains(&template.force_type) {
                types.push(template.force_type);
            }
        }
        types.sort();

        let weights: Vec<f64> = types
            .iter()
            .map(|t| self.type_weight(*t) as f64 / (1 + completed.get(t).copied().unwrap_or(0)) as f64)
            .collect();
        let dist = WeightedIndex::new(&weights).ok()?;
        Some(types[dist.sample(rng)])
    }

    /// Draw a usable template of `force_type` among those of the highest
    /// priority
    pub fn pick_template(
        &self,
        force_type: ForceType,
        player: &Player,
        catalog: &UnitTypeCatalog,
        rng: &mut impl Rng,
    ) -> Option<&ForceTemplate> {
        let usable: Vec<&ForceTemplate> = self
            .templates_for(force_type)
            .filter(|t| t.is_usable_by(player, catalog))
            .collect();
        let top = usable.iter().map(|t| t.priority).max()?;
        let best: Vec<&ForceTemplate> = usable.into_iter().filter(|t| t.priority == top).collect();

        match WeightedIndex::new(best.iter().map(|t| t.weight)) {
            Ok(dist) => Some(best[dist.sample(rng)]),
            // every weight is zero
            Err(_) => best.choose(rng).copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PlayerId;
    use crate::player::ResourceKind;
    use rand_chacha::ChaCha8Rng;

    fn catalog() -> UnitTypeCatalog {
        UnitTypeCatalog::load("data/unit_types.toml").expect("unit types")
    }

    fn player_producing(catalog: &UnitTypeCatalog, names: &[&str]) -> Player {
        let mut player = Player::new(PlayerId(0), "red");
        for name in names {
            player.producible.insert(catalog.by_name(name).expect("known type"));
        }
        player
    }

    #[test]
    fn test_load_bundled_templates() {
        let catalog = catalog();
        let set = ForceTemplateSet::load("data/force_templates.toml", &catalog).expect("templates");
        assert_eq!(set.len(), 5);
        assert_eq!(set.templates_for(ForceType::Land).count(), 3);
        assert_eq!(set.type_weight(ForceType::Land), 4);
        assert_eq!(set.type_weight(ForceType::Space), 1);

        let rush = set.iter().find(|t| t.name == "infantry_rush").expect("infantry_rush");
        assert_eq!(rush.weight, 2);
        assert_eq!(rush.units.len(), 2);
        let militia = set.iter().find(|t| t.name == "militia").expect("militia");
        assert_eq!(militia.weight, 1);
    }

    #[test]
    fn test_unknown_unit_type_is_rejected() {
        let catalog = catalog();
        let err = ForceTemplateSet::from_toml_str(
            r#"
            [[template]]
            name = "ghosts"
            force_type = "land"
            units = [{ unit_type = "ghost", count = 1 }]
            "#,
            &catalog,
        )
        .unwrap_err();
        assert!(matches!(err, ForceError::UnknownUnitType(name) if name == "ghost"));
    }

    #[test]
    fn test_unknown_force_type_is_rejected() {
        let catalog = catalog();
        let result = ForceTemplateSet::from_toml_str(
            r#"
            [[template]]
            name = "moles"
            force_type = "underground"
            units = [{ unit_type = "footman", count = 1 }]
            "#,
            &catalog,
        );
        assert!(matches!(result, Err(ForceError::InvalidConfig(_))));
    }

    #[test]
    fn test_pick_template_prefers_highest_usable_priority() {
        let catalog = catalog();
        let set = ForceTemplateSet::load("data/force_templates.toml", &catalog).expect("templates");
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        // Knights and catapults unavailable: heavy_assault is out
        let player = player_producing(&catalog, &["footman", "archer"]);
        for _ in 0..10 {
            let picked = set
                .pick_template(ForceType::Land, &player, &catalog, &mut rng)
                .expect("template");
            assert_eq!(picked.name, "infantry_rush");
        }

        let everything = player_producing(&catalog, &["footman", "archer", "knight", "catapult"]);
        let picked = set
            .pick_template(ForceType::Land, &everything, &catalog, &mut rng)
            .expect("template");
        assert_eq!(picked.name, "heavy_assault");
    }

    #[test]
    fn test_scarce_resource_excludes_template() {
        let catalog = catalog();
        let set = ForceTemplateSet::load("data/force_templates.toml", &catalog).expect("templates");
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut player = player_producing(&catalog, &["destroyer", "battleship"]);
        assert!(set.pick_template(ForceType::Naval, &player, &catalog, &mut rng).is_some());

        player.scarce.insert(ResourceKind::Oil);
        assert!(set.pick_template(ForceType::Naval, &player, &catalog, &mut rng).is_none());
    }

    #[test]
    fn test_pick_force_type_only_offers_templated_types() {
        let catalog = catalog();
        let set = ForceTemplateSet::load("data/force_templates.toml", &catalog).expect("templates");
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let completed = AHashMap::new();
        for _ in 0..50 {
            let picked = set.pick_force_type(&completed, &mut rng).expect("force type");
            assert_ne!(picked, ForceType::Space);
        }
        assert_eq!(ForceTemplateSet::new().pick_force_type(&completed, &mut rng), None);
    }

    #[test]
    fn test_pick_force_type_favours_underrepresented() {
        let mut set = ForceTemplateSet::new();
        for force_type in [ForceType::Land, ForceType::Air] {
            set.add(ForceTemplate {
                name: format!("{:?}", force_type),
                force_type,
                priority: 0,
                weight: 1,
                units: Vec::new(),
            });
        }
        let mut completed = AHashMap::new();
        completed.insert(ForceType::Land, 99);

        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let air = (0..200)
            .filter(|_| set.pick_force_type(&completed, &mut rng) == Some(ForceType::Air))
            .count();
        assert!(air > 180, "air picked {} times", air);
    }
}
