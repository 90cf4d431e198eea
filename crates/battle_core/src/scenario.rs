//! Match setup.
//!
//! [`MatchSetup`] describes the opening position: the map, the rules, the
//! seed and where each player starts. [`MatchSetup::build`] checks the
//! description and produces a ready-to-tick [`Match`] with supply and
//! visibility already computed.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::RulesConfig;
use crate::economy::{PlayerEconomy, ResourceKind};
use crate::error::{GameError, Result};
use crate::grid::{HexGrid, ResourceNode, Terrain};
use crate::hex::Hex;
use crate::ids::{FacilityId, PlayerId};
use crate::simulation::Match;
use crate::state::{ControlRecord, Facility, MatchState, PlayerRecord};
use crate::units::UnitKind;

/// Where one player begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStart {
    /// Player id.
    pub player: PlayerId,
    /// Home facility hex. Becomes City terrain.
    pub facility: Hex,
    /// Chief's starting hex.
    pub chief: Hex,
    /// Other starting units.
    pub units: Vec<(UnitKind, Hex)>,
}

/// Opening position for a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSetup {
    /// Map.
    pub grid: HexGrid,
    /// Rules.
    pub rules: RulesConfig,
    /// Match seed.
    pub seed: u64,
    /// Players, in id order once built.
    pub players: Vec<PlayerStart>,
    /// Facilities that start unowned.
    pub neutral_facilities: Vec<Hex>,
}

impl MatchSetup {
    /// An empty setup on `grid`.
    #[must_use]
    pub fn new(grid: HexGrid, rules: RulesConfig, seed: u64) -> Self {
        Self {
            grid,
            rules,
            seed,
            players: Vec::new(),
            neutral_facilities: Vec::new(),
        }
    }

    /// Add a player.
    #[must_use]
    pub fn with_player(mut self, start: PlayerStart) -> Self {
        self.players.push(start);
        self
    }

    /// Add an unowned facility.
    #[must_use]
    pub fn with_neutral_facility(mut self, hex: Hex) -> Self {
        self.neutral_facilities.push(hex);
        self
    }

    /// The standard two-player map: a radius-6 hexagon with a wooded
    /// centre line, a hill, two resource nodes and a neutral town.
    #[must_use]
    pub fn duel(seed: u64) -> Self {
        let mut grid = HexGrid::centered(6);
        for hex in [Hex::new(0, -1), Hex::new(0, 1), Hex::new(1, -3)] {
            grid.set_terrain(hex, Terrain::Forest);
        }
        grid.set_terrain(Hex::ORIGIN, Terrain::Hills);
        grid.set_terrain(Hex::new(-1, 4), Terrain::Impassable);
        grid.set_terrain(Hex::new(1, -4), Terrain::Impassable);
        grid.add_node(
            Hex::new(-2, 3),
            ResourceNode {
                kind: ResourceKind::Fuel,
                yield_per_tick: 3,
            },
        );
        grid.add_node(
            Hex::new(2, -3),
            ResourceNode {
                kind: ResourceKind::Intel,
                yield_per_tick: 2,
            },
        );

        Self::new(grid, RulesConfig::default(), seed)
            .with_player(PlayerStart {
                player: PlayerId(0),
                facility: Hex::new(-4, 0),
                chief: Hex::new(-5, 0),
                units: vec![
                    (UnitKind::LightInfantry, Hex::new(-4, 0)),
                    (UnitKind::LightInfantry, Hex::new(-4, 0)),
                    (UnitKind::Scout, Hex::new(-3, 0)),
                ],
            })
            .with_player(PlayerStart {
                player: PlayerId(1),
                facility: Hex::new(4, 0),
                chief: Hex::new(5, 0),
                units: vec![
                    (UnitKind::LightInfantry, Hex::new(4, 0)),
                    (UnitKind::LightInfantry, Hex::new(4, 0)),
                    (UnitKind::Scout, Hex::new(3, 0)),
                ],
            })
            .with_neutral_facility(Hex::new(0, 3))
    }

    /// Check the setup and create the match.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::ConfigError`] if the rules are invalid and
    /// [`GameError::InvalidState`] if a player is listed twice, a starting
    /// hex is off the map or impassable, or a starting stack is too tall.
    pub fn build(mut self) -> Result<Match> {
        let problems = self.rules.validate();
        if !problems.is_empty() {
            return Err(GameError::ConfigError {
                path: "<setup>".to_string(),
                message: problems.join("; "),
            });
        }

        self.players.sort_by_key(|p| p.player);
        let mut seen = BTreeSet::new();
        for start in &self.players {
            if !seen.insert(start.player) {
                return Err(GameError::InvalidState(format!(
                    "Player {} listed twice",
                    start.player
                )));
            }
            let hexes = [start.facility, start.chief]
                .into_iter()
                .chain(start.units.iter().map(|(_, h)| *h));
            for hex in hexes {
                if !self.grid.is_passable(hex) {
                    return Err(GameError::InvalidState(format!(
                        "Start hex {hex} for {} is off the map or impassable",
                        start.player
                    )));
                }
            }
        }

        let mut state = MatchState::new(self.seed);
        let mut next_facility = 1;
        for start in &self.players {
            let player = start.player;
            state.players.insert(
                player,
                PlayerRecord {
                    id: player,
                    eliminated: false,
                    eliminated_at: None,
                },
            );
            state.economies.insert(
                player,
                PlayerEconomy::new(self.rules.starting_resources, self.rules.resource_cap),
            );

            let mut facility = Facility::new(FacilityId(next_facility), start.facility);
            next_facility += 1;
            facility.owner = Some(player);
            state.facilities.insert(facility.id, facility);
            self.grid.set_terrain(start.facility, Terrain::City);
            state.control.insert(
                start.facility,
                ControlRecord {
                    owner: Some(player),
                    occupant: None,
                    streak: 0,
                },
            );

            state.spawn_unit(Some(player), UnitKind::Chief, start.chief);
            for (kind, hex) in &start.units {
                state.spawn_unit(Some(player), *kind, *hex);
            }
        }
        for hex in &self.neutral_facilities {
            if !self.grid.is_passable(*hex) {
                return Err(GameError::InvalidState(format!(
                    "Facility hex {hex} is off the map or impassable"
                )));
            }
            state
                .facilities
                .insert(FacilityId(next_facility), Facility::new(FacilityId(next_facility), *hex));
            next_facility += 1;
            self.grid.set_terrain(*hex, Terrain::City);
        }
        state.refresh_slot_counts();

        for (hex, ids) in state.occupancy() {
            if ids.len() > self.rules.stack_cap {
                return Err(GameError::InvalidState(format!(
                    "{} units start on {hex}, cap is {}",
                    ids.len(),
                    self.rules.stack_cap
                )));
            }
        }

        info!(
            seed = self.seed,
            players = state.players.len(),
            hexes = self.grid.len(),
            "Match created"
        );
        Ok(Match::new(self.grid, self.rules, state))
    }
}
