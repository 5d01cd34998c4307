//! Force AI configuration with documented constants
//!
//! All tuning numbers for the force AI are collected here with explanations of
//! their purpose and how they interact with each other.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::error::{ForceError, Result};
use crate::core::types::Tick;

/// Configuration for the force AI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceConfig {
    // === FORCE POOL ===
    /// Number of force slots addressable by scripts
    ///
    /// Slots below this index are "script forces". Forces created by
    /// recruitment and by folding script forces are claimed at or above it,
    /// so script numbers stay stable while attacks are in flight.
    pub script_forces: usize,

    /// Completed forces allowed before recruitment stops creating new ones
    pub max_completed_forces: usize,

    /// Summed supply of all completed forces allowed before recruitment stops
    pub max_completed_force_population: u32,

    // === RALLY POINTS ===
    /// Distance to the rally point at which a member counts as "arrived"
    ///
    /// Once every member is this close, the force re-acquires a target.
    pub rally_arrival_distance: u32,

    /// Ticks to wait at the rally point for stragglers
    ///
    /// Counts down only while at least one member has arrived. When it
    /// reaches zero the force moves on without the stragglers.
    pub rally_wait_ticks: u32,

    /// A rally point must have no enemy unit within this radius
    pub rally_safety_radius: u32,

    // === DEFENCE ===
    /// A defending force is "on site" once a member is within this distance
    /// of the defended position
    pub defend_radius: u32,

    // === SCHEDULING ===
    /// Ticks between composition checks and recruitment passes
    ///
    /// Flood-fill searches are proportional to the explored region, so this
    /// is deliberately coarse.
    pub recruitment_interval: Tick,

    /// Ticks after which a failed target search may be retried
    pub scouting_retry_interval: Tick,

    // === DIPLOMACY ===
    /// Whole-map searches may pick units of non-passive neutral players,
    /// escalating the stance to war when the force commits
    pub escalate_against_neutrals: bool,

    /// Seed for the recruitment RNG
    pub seed: u64,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            script_forces: 10,
            max_completed_forces: 6,
            max_completed_force_population: 60,

            rally_arrival_distance: 5,
            rally_wait_ticks: 60,
            rally_safety_radius: 15,

            defend_radius: 10,

            recruitment_interval: 50,
            scouting_retry_interval: 200,

            escalate_against_neutrals: true,
            seed: 42,
        }
    }
}

impl ForceConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from TOML; missing keys fall back to defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ForceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.recruitment_interval == 0 {
            return Err(ForceError::InvalidConfig(
                "recruitment_interval must be positive".into(),
            ));
        }

        if self.scouting_retry_interval == 0 {
            return Err(ForceError::InvalidConfig(
                "scouting_retry_interval must be positive".into(),
            ));
        }

        // A rally point closer than the arrival distance is never "left"
        if self.rally_safety_radius <= self.rally_arrival_distance {
            return Err(ForceError::InvalidConfig(format!(
                "rally_safety_radius ({}) should be > rally_arrival_distance ({})",
                self.rally_safety_radius, self.rally_arrival_distance
            )));
        }

        Ok(())
    }
}

// === GLOBAL CONFIG ACCESS ===

use std::sync::OnceLock;

static CONFIG: OnceLock<ForceConfig> = OnceLock::new();

/// Get the global force config (initializes with defaults if not set)
pub fn config() -> &'static ForceConfig {
    CONFIG.get_or_init(ForceConfig::default)
}

/// Set the global force config (can only be called once)
///
/// Returns Err if config was already set.
pub fn set_config(config: ForceConfig) -> std::result::Result<(), ForceConfig> {
    CONFIG.set(config)
}
