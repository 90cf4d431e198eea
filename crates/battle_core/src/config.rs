//! Rule constants for a match, loaded from RON.
//!
//! Every number the tick pipeline consults lives in [`RulesConfig`]. The
//! [`Default`] values are the standard ruleset; `assets/rules/default.ron`
//! spells the same values out for operators to copy and tweak.
//!
//! # Example RON
//!
//! ```ron
//! RulesConfig(
//!     stack_cap: 10,
//!     max_combat_rounds: 3,
//!     defense_constant: 25,
//!     time_limit_ticks: 500,
//! )
//! ```
//!
//! Omitted fields take their default value.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::economy::Resources;
use crate::error::{GameError, Result};

/// All tunable rule constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Maximum units on one hex at every phase boundary.
    pub stack_cap: usize,
    /// Combat rounds per engagement per tick.
    pub max_combat_rounds: u32,
    /// Constant `K` in the mitigation formula `DEF / (DEF + K)`.
    pub defense_constant: i32,
    /// Orders accepted per player per tick.
    pub max_orders_per_tick: usize,
    /// Serialized size ceiling for one submission, in bytes.
    pub max_payload_bytes: usize,
    /// How many ticks ahead of the tick being locked an order may target.
    pub max_order_lead: u64,
    /// Per-resource pool ceiling. Gains beyond it are discarded.
    pub resource_cap: i64,
    /// Consecutive uncontested ticks before a facility or node hex flips.
    pub capture_ticks: u32,
    /// Ticks between repair pulses.
    pub repair_interval: u32,
    /// HP restored per repair pulse.
    pub repair_amount: i32,
    /// Ticks between fuel upkeep charges.
    pub upkeep_interval: u64,
    /// Hard time limit; the match is scored when this tick completes.
    pub time_limit_ticks: u64,
    /// Iteration cap for chain-dependency resolution in movement.
    pub movement_iteration_cap: u32,
    /// Hex radius of the Chief's defensive aura.
    pub chief_aura_radius: u32,
    /// Chief aura DEF bonus, in percent, added to the terrain modifier.
    pub chief_aura_percent: i32,
    /// Controlled neighbours needed for the flank bonus.
    pub flank_threshold: usize,
    /// Flank ATK bonus in percent.
    pub flank_bonus_percent: i32,
    /// ATK penalty in percent for units out of supply.
    pub out_of_supply_attack_penalty_percent: i32,
    /// MP multiplier in percent while Starved.
    pub starved_mp_percent: i32,
    /// Resources each player starts with.
    pub starting_resources: Resources,
    /// Per-tick income of one owned facility.
    pub facility_income: Resources,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            stack_cap: 10,
            max_combat_rounds: 3,
            defense_constant: 25,
            max_orders_per_tick: 50,
            max_payload_bytes: 64 * 1024,
            max_order_lead: 10,
            resource_cap: 5_000,
            capture_ticks: 2,
            repair_interval: 5,
            repair_amount: 5,
            upkeep_interval: 10,
            time_limit_ticks: 500,
            movement_iteration_cap: 64,
            chief_aura_radius: 2,
            chief_aura_percent: 10,
            flank_threshold: 3,
            flank_bonus_percent: 10,
            out_of_supply_attack_penalty_percent: 20,
            starved_mp_percent: 75,
            starting_resources: Resources::new(200, 100, 50),
            facility_income: Resources::new(10, 5, 0),
        }
    }
}

impl RulesConfig {
    /// Parse a ruleset from RON text and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::ConfigError`] if the text does not parse or a
    /// value is out of range.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        Self::parse(text, "<inline>")
    }

    /// Load a ruleset from a RON file and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::ConfigError`] if the file cannot be read, does
    /// not parse, or holds out-of-range values.
    pub fn load(path: &Path) -> Result<Self> {
        let path_str = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|e| GameError::ConfigError {
            path: path_str.clone(),
            message: e.to_string(),
        })?;
        let rules = Self::parse(&contents, &path_str)?;
        tracing::info!(path = %path_str, "Loaded rules");
        Ok(rules)
    }

    fn parse(text: &str, path: &str) -> Result<Self> {
        let rules: Self = ron::from_str(text).map_err(|e| GameError::ConfigError {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        let errors = rules.validate();
        if !errors.is_empty() {
            return Err(GameError::ConfigError {
                path: path.to_string(),
                message: errors.join("; "),
            });
        }
        Ok(rules)
    }

    /// Check value ranges. Returns one message per problem found.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.stack_cap == 0 {
            errors.push("stack_cap must be at least 1".to_string());
        }
        if self.max_combat_rounds == 0 {
            errors.push("max_combat_rounds must be at least 1".to_string());
        }
        if self.defense_constant <= 0 {
            errors.push("defense_constant must be positive".to_string());
        }
        if self.max_orders_per_tick == 0 {
            errors.push("max_orders_per_tick must be at least 1".to_string());
        }
        if self.max_order_lead == 0 {
            errors.push("max_order_lead must be at least 1".to_string());
        }
        if self.resource_cap < 0 {
            errors.push("resource_cap must not be negative".to_string());
        }
        if self.capture_ticks == 0 {
            errors.push("capture_ticks must be at least 1".to_string());
        }
        if self.repair_interval == 0 {
            errors.push("repair_interval must be at least 1".to_string());
        }
        if self.upkeep_interval == 0 {
            errors.push("upkeep_interval must be at least 1".to_string());
        }
        if self.movement_iteration_cap == 0 {
            errors.push("movement_iteration_cap must be at least 1".to_string());
        }
        if !(0..=100).contains(&self.out_of_supply_attack_penalty_percent) {
            errors.push("out_of_supply_attack_penalty_percent must be within 0..=100".to_string());
        }
        if !(1..=100).contains(&self.starved_mp_percent) {
            errors.push("starved_mp_percent must be within 1..=100".to_string());
        }
        if !self.starting_resources.is_non_negative() || !self.facility_income.is_non_negative() {
            errors.push("resource amounts must not be negative".to_string());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_are_valid() {
        let rules = RulesConfig::default();
        assert!(rules.validate().is_empty());
        assert_eq!(rules.stack_cap, 10);
        assert_eq!(rules.defense_constant, 25);
        assert_eq!(rules.max_payload_bytes, 65_536);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let rules =
            RulesConfig::from_ron_str("RulesConfig(stack_cap: 6, time_limit_ticks: 40)").unwrap();
        assert_eq!(rules.stack_cap, 6);
        assert_eq!(rules.time_limit_ticks, 40);
        assert_eq!(rules.max_combat_rounds, 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = RulesConfig::from_ron_str("RulesConfig(stack_cap: 0, defense_constant: -1)")
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("stack_cap"));
        assert!(message.contains("defense_constant"));
    }

    #[test]
    fn test_unparseable_ron_is_config_error() {
        let err = RulesConfig::from_ron_str("RulesConfig(stack_cap: \"ten\")").unwrap_err();
        assert!(matches!(err, GameError::ConfigError { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.ron");
        std::fs::write(&path, "RulesConfig(max_orders_per_tick: 20)").unwrap();
        let rules = RulesConfig::load(&path).unwrap();
        assert_eq!(rules.max_orders_per_tick, 20);
    }
}
