//! Fog of war.
//!
//! A player sees every hex they control, their facilities, and every hex
//! within each unit's vision radius that has a clear line of sight. Forest
//! and impassable hexes block sight to what lies behind them but are seen
//! themselves. Standing on hills adds one to the radius.
//!
//! Players are independent, so their sets are computed in parallel.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::economy::Resources;
use crate::events::GameEvent;
use crate::grid::HexGrid;
use crate::hex::Hex;
use crate::ids::{PlayerId, UnitId};
use crate::state::{Facility, GameStatus, MatchState};
use crate::units::Unit;

/// Whether nothing between `from` and `to` blocks sight.
#[must_use]
pub fn has_line_of_sight(grid: &HexGrid, from: Hex, to: Hex) -> bool {
    let line = from.line_to(to);
    let inner = line.len().saturating_sub(1);
    line.iter()
        .take(inner)
        .skip(1)
        .all(|h| grid.terrain(*h).is_some_and(|t| !t.blocks_sight()))
}

/// Every hex `player` can see.
#[must_use]
pub fn visible_hexes(state: &MatchState, grid: &HexGrid, player: PlayerId) -> BTreeSet<Hex> {
    let mut visible: BTreeSet<Hex> = state
        .control
        .iter()
        .filter(|(_, c)| c.owner == Some(player))
        .map(|(h, _)| *h)
        .collect();
    visible.extend(
        state
            .facilities
            .values()
            .filter(|f| f.owner == Some(player))
            .map(|f| f.position),
    );

    for unit in state.units.values().filter(|u| u.owner == Some(player)) {
        let bonus = grid.terrain(unit.position).map_or(0, |t| t.vision_bonus());
        for hex in unit.position.spiral(unit.vision + bonus) {
            if grid.in_bounds(hex) && has_line_of_sight(grid, unit.position, hex) {
                visible.insert(hex);
            }
        }
    }
    visible
}

/// Recompute visibility for every live player.
///
/// Returns, per player, the foreign units that came into view this tick.
pub fn refresh_visibility(state: &mut MatchState, grid: &HexGrid) -> BTreeMap<PlayerId, Vec<UnitId>> {
    let players = state.live_players();
    let view: &MatchState = state;
    let computed: Vec<(PlayerId, BTreeSet<Hex>)> = players
        .par_iter()
        .map(|p| (*p, visible_hexes(view, grid, *p)))
        .collect();

    let mut newly_visible = BTreeMap::new();
    let mut seen_units = BTreeMap::new();
    for (player, hexes) in &computed {
        let seen: BTreeSet<UnitId> = state
            .units
            .values()
            .filter(|u| u.owner != Some(*player) && hexes.contains(&u.position))
            .map(|u| u.id)
            .collect();
        let before = state.seen_units.get(player);
        let fresh: Vec<UnitId> = seen
            .iter()
            .filter(|id| !before.is_some_and(|b| b.contains(id)))
            .copied()
            .collect();
        newly_visible.insert(*player, fresh);
        seen_units.insert(*player, seen);
    }

    debug!(players = computed.len(), "Refreshed visibility");
    state.visibility = computed.into_iter().collect();
    state.seen_units = seen_units;
    newly_visible
}

/// Whose eyes a snapshot is taken through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Perspective {
    /// Exactly what this player sees.
    Player(PlayerId),
    /// Everything, for tooling granted full vision.
    Full,
}

/// A fog-filtered, read-only picture of the match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Tick the snapshot was taken after.
    pub tick: u64,
    /// Match status.
    pub status: GameStatus,
    /// Hexes in view.
    pub visible: BTreeSet<Hex>,
    /// The viewer's stock, when the viewer is a player.
    pub resources: Option<Resources>,
    /// Units in view, own units first then others by id.
    pub units: Vec<Unit>,
    /// Facilities owned by the viewer or in view.
    pub facilities: Vec<Facility>,
    /// Controller of every visible hex that has one.
    pub control: BTreeMap<Hex, Option<PlayerId>>,
    /// Events the viewer is entitled to.
    pub events: Vec<GameEvent>,
}

/// Take a snapshot of `state` through `perspective`.
#[must_use]
pub fn snapshot(
    state: &MatchState,
    grid: &HexGrid,
    perspective: Perspective,
    events: &[GameEvent],
) -> Snapshot {
    let (visible, viewer) = match perspective {
        Perspective::Full => (grid.iter().map(|(h, _)| h).collect(), None),
        Perspective::Player(p) => (
            state
                .visibility
                .get(&p)
                .cloned()
                .unwrap_or_else(|| visible_hexes(state, grid, p)),
            Some(p),
        ),
    };
    let mine = |owner: Option<PlayerId>| viewer.is_some() && owner == viewer;

    let (mut units, others): (Vec<Unit>, Vec<Unit>) = state
        .units
        .values()
        .filter(|u| mine(u.owner) || visible.contains(&u.position))
        .cloned()
        .partition(|u| mine(u.owner));
    units.extend(others);

    let facilities = state
        .facilities
        .values()
        .filter(|f| mine(f.owner) || visible.contains(&f.position))
        .cloned()
        .collect();

    let control = state
        .control
        .iter()
        .filter(|(h, c)| c.owner.is_some() && visible.contains(*h))
        .map(|(h, c)| (*h, c.owner))
        .collect();

    let events = events
        .iter()
        .filter(|e| match viewer {
            None => !matches!(e, GameEvent::OrderRejected { .. }),
            Some(p) => e.is_visible_to(p, |h| visible.contains(&h)),
        })
        .cloned()
        .collect();

    Snapshot {
        tick: state.tick,
        status: state.status,
        resources: viewer.and_then(|p| state.economies.get(&p)).map(|e| e.stock),
        visible,
        units,
        facilities,
        control,
        events,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Terrain;
    use crate::state::PlayerRecord;
    use crate::units::UnitKind;

    const P0: PlayerId = PlayerId(0);
    const P1: PlayerId = PlayerId(1);

    fn state() -> MatchState {
        let mut state = MatchState::new(5);
        for id in [P0, P1] {
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
    fn test_radius_on_open_ground() {
        let mut state = state();
        let grid = HexGrid::centered(6);
        state.spawn_unit(Some(P0), UnitKind::LightInfantry, Hex::ORIGIN);
        let visible = visible_hexes(&state, &grid, P0);
        // vision 2 on plains: 1 + 6 + 12 hexes
        assert_eq!(visible.len(), 19);
        assert!(!visible.contains(&Hex::new(3, 0)));
    }

    #[test]
    fn test_hills_extend_sight() {
        let mut state = state();
        let mut grid = HexGrid::centered(6);
        grid.set_terrain(Hex::ORIGIN, Terrain::Hills);
        state.spawn_unit(Some(P0), UnitKind::LightInfantry, Hex::ORIGIN);
        assert!(visible_hexes(&state, &grid, P0).contains(&Hex::new(3, 0)));
    }

    #[test]
    fn test_forest_blocks_what_is_behind_it() {
        let mut grid = HexGrid::centered(6);
        grid.set_terrain(Hex::new(1, 0), Terrain::Forest);
        assert!(has_line_of_sight(&grid, Hex::ORIGIN, Hex::new(1, 0)));
        assert!(!has_line_of_sight(&grid, Hex::ORIGIN, Hex::new(2, 0)));
        assert!(has_line_of_sight(&grid, Hex::ORIGIN, Hex::new(0, 2)));
    }

    #[test]
    fn test_newly_visible_reported_once() {
        let mut state = state();
        let grid = HexGrid::centered(6);
        state.spawn_unit(Some(P0), UnitKind::Scout, Hex::ORIGIN);
        let enemy = state.spawn_unit(Some(P1), UnitKind::LightInfantry, Hex::new(2, 0));

        let fresh = refresh_visibility(&mut state, &grid);
        assert_eq!(fresh[&P0], vec![enemy]);
        let fresh = refresh_visibility(&mut state, &grid);
        assert!(fresh[&P0].is_empty());
    }

    #[test]
    fn test_snapshot_hides_fogged_units() {
        let mut state = state();
        let grid = HexGrid::centered(8);
        state.spawn_unit(Some(P0), UnitKind::LightInfantry, Hex::ORIGIN);
        state.spawn_unit(Some(P1), UnitKind::LightInfantry, Hex::new(6, 0));
        refresh_visibility(&mut state, &grid);

        let view = snapshot(&state, &grid, Perspective::Player(P0), &[]);
        assert_eq!(view.units.len(), 1);
        assert_eq!(view.units[0].owner, Some(P0));

        let full = snapshot(&state, &grid, Perspective::Full, &[]);
        assert_eq!(full.units.len(), 2);
        assert!(full.resources.is_none());
    }
}
