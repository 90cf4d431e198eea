//! The single owned mutable object of a match.
//!
//! [`MatchState`] is owned by [`crate::simulation::Match`] and is only
//! mutated inside its phase sequence. Every collection is a `BTreeMap` or
//! `BTreeSet` so iteration order is part of the data, not of the hasher.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::economy::PlayerEconomy;
use crate::error::{GameError, Result};
use crate::hex::Hex;
use crate::ids::{FacilityId, PlayerId, UnitId};
use crate::units::{Unit, UnitKind};

/// Whether the match is still running.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    /// Ticks are being processed.
    #[default]
    Active,
    /// A result has been decided; further ticks are no-ops.
    Finished,
}

/// How a finished match ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchResult {
    /// One player won.
    Winner(PlayerId),
    /// Nobody won.
    Draw,
}

/// Per-hex ownership and capture progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ControlRecord {
    /// Current owner; `None` is neutral.
    pub owner: Option<PlayerId>,
    /// Player whose uncontested presence is being counted.
    pub occupant: Option<PlayerId>,
    /// Consecutive uncontested ticks by `occupant`.
    pub streak: u32,
}

/// One in-progress build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildSlot {
    /// What is being built.
    pub kind: UnitKind,
    /// Ticks left; a build at zero is stalled waiting for room.
    pub ticks_remaining: u32,
}

/// A production facility.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Facility {
    /// Identifier.
    pub id: FacilityId,
    /// Owner; `None` is neutral.
    pub owner: Option<PlayerId>,
    /// Location. Facilities never move.
    pub position: Hex,
    /// Number of parallel build slots.
    pub slot_count: usize,
    /// Builds in order of acceptance.
    pub slots: Vec<BuildSlot>,
    /// Where freshly built units head.
    pub rally_point: Option<Hex>,
}

impl Facility {
    /// Base slots for a facility whose owner holds exactly one.
    pub const BASE_SLOTS: usize = 2;

    /// A neutral, idle facility.
    #[must_use]
    pub fn new(id: FacilityId, position: Hex) -> Self {
        Self {
            id,
            owner: None,
            position,
            slot_count: Self::BASE_SLOTS,
            slots: Vec::new(),
            rally_point: None,
        }
    }

    /// Slot count for an owner holding `owned` facilities.
    #[must_use]
    pub const fn slots_for(owned: usize) -> usize {
        if owned == 0 {
            Self::BASE_SLOTS
        } else {
            Self::BASE_SLOTS + owned - 1
        }
    }

    /// Whether another build can be queued.
    #[must_use]
    pub fn has_free_slot(&self) -> bool {
        self.slots.len() < self.slot_count
    }
}

/// Per-player bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Player.
    pub id: PlayerId,
    /// Whether the player's Chief has been lost.
    pub eliminated: bool,
    /// Tick at which elimination happened.
    pub eliminated_at: Option<u64>,
}

/// Complete state of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchState {
    /// Ticks completed so far. The next tick processed is `tick + 1`.
    pub tick: u64,
    /// Match seed for keyed randomness.
    pub seed: u64,
    /// Running or finished.
    pub status: GameStatus,
    /// Result once finished.
    pub result: Option<MatchResult>,
    /// Control records for every hex that has ever been touched.
    pub control: BTreeMap<Hex, ControlRecord>,
    /// Living units.
    pub units: BTreeMap<UnitId, Unit>,
    /// All facilities.
    pub facilities: BTreeMap<FacilityId, Facility>,
    /// Resource pools.
    pub economies: BTreeMap<PlayerId, PlayerEconomy>,
    /// Player records.
    pub players: BTreeMap<PlayerId, PlayerRecord>,
    /// Next unit id to assign.
    pub next_unit_id: u32,
    /// Hexes in supply per player, as of the end of the last tick.
    pub supply: BTreeMap<PlayerId, BTreeSet<Hex>>,
    /// Hexes visible per player, as of the end of the last tick.
    pub visibility: BTreeMap<PlayerId, BTreeSet<Hex>>,
    /// Units each player could see at the end of the last tick.
    pub seen_units: BTreeMap<PlayerId, BTreeSet<UnitId>>,
}

impl MatchState {
    /// An empty state at tick 0.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            tick: 0,
            seed,
            status: GameStatus::Active,
            result: None,
            control: BTreeMap::new(),
            units: BTreeMap::new(),
            facilities: BTreeMap::new(),
            economies: BTreeMap::new(),
            players: BTreeMap::new(),
            next_unit_id: 1,
            supply: BTreeMap::new(),
            visibility: BTreeMap::new(),
            seen_units: BTreeMap::new(),
        }
    }

    /// Register a unit with the next id and return that id.
    pub fn spawn_unit(&mut self, owner: Option<PlayerId>, kind: UnitKind, position: Hex) -> UnitId {
        let id = UnitId(self.next_unit_id);
        self.next_unit_id += 1;
        self.units.insert(id, Unit::new(id, owner, kind, position));
        id
    }

    /// Get a unit by id.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidUnitId`] if no such unit is alive.
    pub fn unit(&self, id: UnitId) -> Result<&Unit> {
        self.units.get(&id).ok_or(GameError::InvalidUnitId(id.0))
    }

    /// Get a facility by id.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidFacilityId`] if no such facility exists.
    pub fn facility(&self, id: FacilityId) -> Result<&Facility> {
        self.facilities
            .get(&id)
            .ok_or(GameError::InvalidFacilityId(id.0))
    }

    /// Owner of `hex`, `None` if neutral or never controlled.
    #[must_use]
    pub fn controller(&self, hex: Hex) -> Option<PlayerId> {
        self.control.get(&hex).and_then(|c| c.owner)
    }

    /// Facility standing on `hex`.
    #[must_use]
    pub fn facility_at(&self, hex: Hex) -> Option<&Facility> {
        self.facilities.values().find(|f| f.position == hex)
    }

    /// Unit ids on each occupied hex, ids ascending.
    #[must_use]
    pub fn occupancy(&self) -> BTreeMap<Hex, Vec<UnitId>> {
        let mut map: BTreeMap<Hex, Vec<UnitId>> = BTreeMap::new();
        for unit in self.units.values() {
            map.entry(unit.position).or_default().push(unit.id);
        }
        map
    }

    /// Units on `hex`, ids ascending.
    pub fn units_at(&self, hex: Hex) -> impl Iterator<Item = &Unit> {
        self.units.values().filter(move |u| u.position == hex)
    }

    /// Whether `player` is known and not eliminated.
    #[must_use]
    pub fn is_live_player(&self, player: PlayerId) -> bool {
        self.players.get(&player).is_some_and(|p| !p.eliminated)
    }

    /// Players still in the match, ascending.
    #[must_use]
    pub fn live_players(&self) -> Vec<PlayerId> {
        self.players
            .values()
            .filter(|p| !p.eliminated)
            .map(|p| p.id)
            .collect()
    }

    /// Number of facilities owned by `player`.
    #[must_use]
    pub fn owned_facility_count(&self, player: PlayerId) -> usize {
        self.facilities
            .values()
            .filter(|f| f.owner == Some(player))
            .count()
    }

    /// Recompute every facility's slot count from current ownership.
    pub fn refresh_slot_counts(&mut self) {
        let mut owned: BTreeMap<PlayerId, usize> = BTreeMap::new();
        for facility in self.facilities.values() {
            if let Some(owner) = facility.owner {
                *owned.entry(owner).or_default() += 1;
            }
        }
        for facility in self.facilities.values_mut() {
            let count = facility.owner.and_then(|o| owned.get(&o)).copied().unwrap_or(0);
            facility.slot_count = Facility::slots_for(count);
        }
    }

    /// The living Chief of `player`, if any.
    #[must_use]
    pub fn chief_of(&self, player: PlayerId) -> Option<&Unit> {
        self.units
            .values()
            .find(|u| u.is_chief() && u.owner == Some(player))
    }

    /// Whether `hex` is in `player`'s supply network.
    #[must_use]
    pub fn in_supply(&self, player: PlayerId, hex: Hex) -> bool {
        self.supply.get(&player).is_some_and(|s| s.contains(&hex))
    }

    /// Calculate a hash of the complete state.
    ///
    /// Used for desync detection and replay verification. Two states that
    /// compare equal always hash equal.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);
        self.seed.hash(&mut hasher);
        self.status.hash(&mut hasher);
        self.result.hash(&mut hasher);
        self.next_unit_id.hash(&mut hasher);

        self.control.len().hash(&mut hasher);
        for (hex, record) in &self.control {
            hex.hash(&mut hasher);
            record.hash(&mut hasher);
        }

        self.units.len().hash(&mut hasher);
        for unit in self.units.values() {
            unit.id.hash(&mut hasher);
            unit.owner.hash(&mut hasher);
            unit.kind.hash(&mut hasher);
            unit.position.hash(&mut hasher);
            unit.hp.to_bits().hash(&mut hasher);
            unit.max_hp.to_bits().hash(&mut hasher);
            unit.mp.hash(&mut hasher);
            unit.status.hash(&mut hasher);
            unit.repair_counter.hash(&mut hasher);
            unit.rally_target.hash(&mut hasher);
        }

        for facility in self.facilities.values() {
            facility.hash(&mut hasher);
        }
        for (player, economy) in &self.economies {
            player.hash(&mut hasher);
            economy.hash(&mut hasher);
        }
        for record in self.players.values() {
            record.hash(&mut hasher);
        }
        for (player, hexes) in &self.supply {
            player.hash(&mut hasher);
            hexes.hash(&mut hasher);
        }

        hasher.finish()
    }

    /// Serialize the state for snapshots or network sync.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize match state: {e}")))
    }

    /// Deserialize state from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| {
            GameError::InvalidState(format!("Failed to deserialize match state: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_player_state() -> MatchState {
        let mut state = MatchState::new(7);
        for id in [PlayerId(0), PlayerId(1)] {
            state.players.insert(
                id,
                PlayerRecord {
                    id,
                    eliminated: false,
                    eliminated_at: None,
                },
            );
        }
        state
    }

    #[test]
    fn test_spawn_ids_monotonic() {
        let mut state = two_player_state();
        let a = state.spawn_unit(Some(PlayerId(0)), UnitKind::Scout, Hex::ORIGIN);
        let b = state.spawn_unit(Some(PlayerId(1)), UnitKind::Scout, Hex::ORIGIN);
        state.units.remove(&a);
        let c = state.spawn_unit(Some(PlayerId(0)), UnitKind::Scout, Hex::ORIGIN);
        assert!(a < b && b < c);
    }

    #[test]
    fn test_slot_counts_follow_ownership() {
        let mut state = two_player_state();
        for (i, q) in [0, 1, 2].into_iter().enumerate() {
            let mut facility = Facility::new(FacilityId(i as u32), Hex::new(q, 0));
            facility.owner = Some(PlayerId(0));
            state.facilities.insert(facility.id, facility);
        }
        state.refresh_slot_counts();
        assert!(state.facilities.values().all(|f| f.slot_count == 4));

        if let Some(f) = state.facilities.get_mut(&FacilityId(2)) {
            f.owner = None;
        }
        state.refresh_slot_counts();
        assert_eq!(state.facilities[&FacilityId(0)].slot_count, 3);
        assert_eq!(state.facilities[&FacilityId(2)].slot_count, 2);
    }

    #[test]
    fn test_hash_tracks_changes() {
        let mut a = two_player_state();
        a.spawn_unit(Some(PlayerId(0)), UnitKind::LightInfantry, Hex::ORIGIN);
        let b = a.clone();
        assert_eq!(a.state_hash(), b.state_hash());

        if let Some(unit) = a.units.values_mut().next() {
            unit.position = Hex::new(1, 0);
        }
        assert_ne!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut state = two_player_state();
        state.spawn_unit(Some(PlayerId(1)), UnitKind::Chief, Hex::new(2, -1));
        let bytes = state.serialize().unwrap();
        let restored = MatchState::deserialize(&bytes).unwrap();
        assert_eq!(state, restored);
        assert_eq!(state.state_hash(), restored.state_hash());
    }
}
