//! Supply network.
//!
//! A hex is in supply for a player if it can be reached from one of that
//! player's facilities by stepping only through hexes the player controls.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::debug;

use crate::grid::HexGrid;
use crate::hex::Hex;
use crate::ids::PlayerId;
use crate::state::MatchState;
use crate::units::UnitStatus;

/// Supplied hexes for one player.
#[must_use]
pub fn supplied_hexes(state: &MatchState, grid: &HexGrid, player: PlayerId) -> BTreeSet<Hex> {
    let mut reached = BTreeSet::new();
    let mut queue = VecDeque::new();

    for facility in state.facilities.values() {
        if facility.owner == Some(player)
            && state.controller(facility.position) == Some(player)
            && reached.insert(facility.position)
        {
            queue.push_back(facility.position);
        }
    }

    while let Some(hex) = queue.pop_front() {
        for next in grid.neighbors(hex) {
            if state.controller(next) == Some(player) && reached.insert(next) {
                queue.push_back(next);
            }
        }
    }

    reached
}

/// Recompute every live player's supply network and refresh the
/// `OUT_OF_SUPPLY` flag on their units.
pub fn refresh_supply(state: &mut MatchState, grid: &HexGrid) {
    let supply: BTreeMap<PlayerId, BTreeSet<Hex>> = state
        .live_players()
        .into_iter()
        .map(|p| (p, supplied_hexes(state, grid, p)))
        .collect();

    let mut cut_off = 0usize;
    for unit in state.units.values_mut() {
        let out = match unit.owner {
            Some(owner) => !supply.get(&owner).is_some_and(|s| s.contains(&unit.position)),
            None => false,
        };
        unit.status.set(UnitStatus::OUT_OF_SUPPLY, out);
        cut_off += usize::from(out);
    }

    debug!(players = supply.len(), cut_off, "Refreshed supply");
    state.supply = supply;
}
