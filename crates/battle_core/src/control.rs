//! Territory control, Chief capture, elimination and victory.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::combat::Fallen;
use crate::config::RulesConfig;
use crate::events::GameEvent;
use crate::grid::HexGrid;
use crate::hex::Hex;
use crate::ids::PlayerId;
use crate::math::Fixed;
use crate::state::{GameStatus, MatchResult, MatchState};
use crate::units::{Unit, UnitKind};

/// Advance every hex's control streak and flip ownership where earned.
///
/// A hex held by units of exactly one player builds a streak; plain hexes
/// flip at once, facility and resource-node hexes after
/// `rules.capture_ticks` consecutive ticks. Contested, neutral-held and
/// empty hexes reset their streak and keep their owner.
pub fn update_control(state: &mut MatchState, grid: &HexGrid, rules: &RulesConfig) -> Vec<GameEvent> {
    let mut events = Vec::new();
    let occupancy = state.occupancy();
    let hexes: BTreeSet<Hex> = occupancy
        .keys()
        .chain(state.control.keys())
        .copied()
        .collect();

    let mut facility_flipped = false;
    for hex in hexes {
        let owners: BTreeSet<Option<PlayerId>> = occupancy
            .get(&hex)
            .map(|ids| ids.iter().map(|id| state.units[id].owner).collect())
            .unwrap_or_default();
        let holder = match owners.iter().next() {
            Some(Some(player)) if owners.len() == 1 => Some(*player),
            _ => None,
        };

        let facility = state.facility_at(hex).map(|f| f.id);
        let required = if facility.is_some() || grid.node(hex).is_some() {
            rules.capture_ticks
        } else {
            1
        };

        let record = state.control.entry(hex).or_default();
        let Some(player) = holder else {
            record.occupant = None;
            record.streak = 0;
            if record.owner.is_none() {
                state.control.remove(&hex);
            }
            continue;
        };

        if record.occupant == Some(player) {
            record.streak = record.streak.saturating_add(1);
        } else {
            record.occupant = Some(player);
            record.streak = 1;
        }
        if record.owner == Some(player) || record.streak < required {
            continue;
        }

        let previous_owner = record.owner.replace(player);
        if let Some(id) = facility {
            if let Some(f) = state.facilities.get_mut(&id) {
                f.owner = Some(player);
                f.slots.clear();
                f.rally_point = None;
            }
            facility_flipped = true;
            info!(hex = %hex, facility = %id, player = %player, "Facility captured");
        }
        events.push(GameEvent::Capture {
            hex,
            facility,
            previous_owner,
            new_owner: Some(player),
        });
    }

    if facility_flipped {
        state.refresh_slot_counts();
    }
    debug!(captures = events.len(), "Updated control");
    events
}

/// Whether `hex` is a way out for a unit of `owner`.
fn is_exit(state: &MatchState, grid: &HexGrid, owner: Option<PlayerId>, hex: Hex) -> bool {
    grid.is_passable(hex)
        && state.units_at(hex).all(|u| u.owner == owner)
        && state.controller(hex).map_or(true, |c| Some(c) == owner)
}

/// A Chief is captured when no adjacent hex offers an exit and at least one
/// enemy unit stands next to it.
#[must_use]
pub fn is_chief_captured(state: &MatchState, grid: &HexGrid, chief: &Unit) -> bool {
    let neighbors = chief.position.neighbors();
    let trapped = neighbors
        .iter()
        .all(|n| !is_exit(state, grid, chief.owner, *n));
    let pressed = neighbors.iter().any(|n| {
        state
            .units_at(*n)
            .any(|u| u.owner.is_some() && u.owner != chief.owner)
    });
    trapped && pressed
}

/// Eliminate every player whose Chief died in combat or is captured.
///
/// Captures are judged on the board as it stands before anyone is
/// eliminated, so two Chiefs lost in the same tick go out together.
pub fn resolve_chiefs(
    state: &mut MatchState,
    grid: &HexGrid,
    fallen: &[Fallen],
    tick: u64,
) -> Vec<GameEvent> {
    let mut losses: Vec<(PlayerId, Hex, bool)> = fallen
        .iter()
        .filter(|f| f.kind == UnitKind::Chief)
        .filter_map(|f| f.owner.map(|p| (p, f.hex, false)))
        .collect();

    let captured: Vec<(PlayerId, Hex, bool)> = state
        .units
        .values()
        .filter(|u| u.is_chief())
        .filter(|c| is_chief_captured(state, grid, c))
        .filter_map(|c| c.owner.map(|p| (p, c.position, true)))
        .collect();
    for (player, hex, _) in &captured {
        if let Some(id) = state.chief_of(*player).map(|c| c.id) {
            state.units.remove(&id);
        }
        debug!(player = %player, hex = %hex, "Chief captured");
    }
    losses.extend(captured);

    let mut events = Vec::new();
    for (player, hex, captured) in losses {
        if !state.is_live_player(player) {
            continue;
        }
        let neutralized = eliminate(state, player, tick);
        events.push(GameEvent::ChiefEliminated {
            hex,
            player,
            captured,
        });
        events.extend(neutralized);
    }
    events
}

/// Remove `player` from play: their units, facilities and territory turn
/// neutral and their derived state is dropped.
///
/// Returns a [`GameEvent::Capture`] to neutral for every hex they owned.
pub fn eliminate(state: &mut MatchState, player: PlayerId, tick: u64) -> Vec<GameEvent> {
    if let Some(record) = state.players.get_mut(&player) {
        record.eliminated = true;
        record.eliminated_at = Some(tick);
    }
    for unit in state.units.values_mut().filter(|u| u.owner == Some(player)) {
        unit.owner = None;
        unit.rally_target = None;
    }
    for facility in state
        .facilities
        .values_mut()
        .filter(|f| f.owner == Some(player))
    {
        facility.owner = None;
        facility.slots.clear();
        facility.rally_point = None;
    }
    let mut neutralized = Vec::new();
    for (hex, record) in &mut state.control {
        if record.owner == Some(player) {
            record.owner = None;
            neutralized.push(*hex);
        }
        if record.occupant == Some(player) {
            record.occupant = None;
            record.streak = 0;
        }
    }
    if let Some(economy) = state.economies.get_mut(&player) {
        economy.clear();
    }
    state.supply.remove(&player);
    state.visibility.remove(&player);
    state.refresh_slot_counts();
    info!(player = %player, tick, hexes = neutralized.len(), "Player eliminated");

    neutralized
        .into_iter()
        .map(|hex| GameEvent::Capture {
            hex,
            facility: state.facility_at(hex).map(|f| f.id),
            previous_owner: Some(player),
            new_owner: None,
        })
        .collect()
}

/// Time-limit score: `1000 x chief + 50 x facilities + units + resources / 10`.
#[must_use]
pub fn score(state: &MatchState, player: PlayerId) -> Fixed {
    let chief = i64::from(state.chief_of(player).is_some());
    let facilities = state.owned_facility_count(player) as i64;
    let units = state
        .units
        .values()
        .filter(|u| u.owner == Some(player))
        .count() as i64;
    let resources = state
        .economies
        .get(&player)
        .map_or(0, |e| e.stock.total());

    Fixed::from_num(1000 * chief + 50 * facilities + units) + Fixed::from_num(resources) / 10
}

/// Decide whether the match is over at the end of `tick`.
///
/// Finishes the match and returns the `MatchEnded` event when it is.
pub fn check_victory(state: &mut MatchState, rules: &RulesConfig, tick: u64) -> Option<GameEvent> {
    if state.status == GameStatus::Finished {
        return None;
    }
    let live = state.live_players();

    let result = if state.players.len() >= 2 && live.len() <= 1 {
        Some(live.first().map_or(MatchResult::Draw, |p| MatchResult::Winner(*p)))
    } else if tick >= rules.time_limit_ticks {
        Some(time_limit_result(state, &live))
    } else {
        None
    }?;

    state.status = GameStatus::Finished;
    state.result = Some(result);
    let hex = match result {
        MatchResult::Winner(p) => state.chief_of(p).map(|c| c.position),
        MatchResult::Draw => None,
    };
    info!(tick, ?result, "Match ended");
    Some(GameEvent::MatchEnded { hex, result })
}

fn time_limit_result(state: &MatchState, live: &[PlayerId]) -> MatchResult {
    let mut scores: Vec<(Fixed, PlayerId)> = live.iter().map(|p| (score(state, *p), *p)).collect();
    scores.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    match scores.as_slice() {
        [(best, p), (second, _), ..] if best > second => MatchResult::Winner(*p),
        [(_, p)] => MatchResult::Winner(*p),
        _ => MatchResult::Draw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::{PlayerEconomy, Resources};
    use crate::grid::{ResourceNode, Terrain};
    use crate::economy::ResourceKind;
    use crate::ids::FacilityId;
    use crate::state::{ControlRecord, Facility, PlayerRecord};

    const P0: PlayerId = PlayerId(0);
    const P1: PlayerId = PlayerId(1);

    fn two_players() -> MatchState {
        let mut state = MatchState::new(3);
        for id in [P0, P1] {
            state.players.insert(
                id,
                PlayerRecord {
                    id,
                    eliminated: false,
                    eliminated_at: None,
                },
            );
            state
                .economies
                .insert(id, PlayerEconomy::new(Resources::new(100, 0, 0), 5000));
        }
        state
    }

    fn own(state: &mut MatchState, hex: Hex, player: PlayerId) {
        state.control.insert(
            hex,
            ControlRecord {
                owner: Some(player),
                occupant: None,
                streak: 0,
            },
        );
    }

    #[test]
    fn test_plain_hex_flips_immediately() {
        let mut state = two_players();
        let grid = HexGrid::centered(3);
        state.spawn_unit(Some(P0), UnitKind::Scout, Hex::new(1, 1));
        let events = update_control(&mut state, &grid, &RulesConfig::default());
        assert_eq!(state.controller(Hex::new(1, 1)), Some(P0));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_facility_needs_two_ticks() {
        let mut state = two_players();
        let grid = HexGrid::centered(3);
        let rules = RulesConfig::default();
        let hex = Hex::new(2, 0);
        state
            .facilities
            .insert(FacilityId(1), Facility::new(FacilityId(1), hex));
        state.spawn_unit(Some(P1), UnitKind::LightInfantry, hex);

        assert!(update_control(&mut state, &grid, &rules).is_empty());
        assert_eq!(state.controller(hex), None);

        let events = update_control(&mut state, &grid, &rules);
        assert_eq!(state.controller(hex), Some(P1));
        assert_eq!(state.facilities[&FacilityId(1)].owner, Some(P1));
        assert!(matches!(
            events[0],
            GameEvent::Capture {
                facility: Some(FacilityId(1)),
                previous_owner: None,
                ..
            }
        ));
    }

    #[test]
    fn test_node_streak_resets_when_contested() {
        let mut state = two_players();
        let mut grid = HexGrid::centered(3);
        let rules = RulesConfig::default();
        let hex = Hex::new(0, 1);
        grid.add_node(
            hex,
            ResourceNode {
                kind: ResourceKind::Fuel,
                yield_per_tick: 3,
            },
        );
        state.spawn_unit(Some(P0), UnitKind::Scout, hex);
        update_control(&mut state, &grid, &rules);
        let enemy = state.spawn_unit(Some(P1), UnitKind::Scout, hex);
        update_control(&mut state, &grid, &rules);
        assert_eq!(state.control[&hex].streak, 0);

        state.units.remove(&enemy);
        update_control(&mut state, &grid, &rules);
        assert_eq!(state.controller(hex), None);
        update_control(&mut state, &grid, &rules);
        assert_eq!(state.controller(hex), Some(P0));
    }

    #[test]
    fn test_surrounded_chief_is_captured() {
        let mut state = two_players();
        let grid = HexGrid::centered(3);
        let chief = state.spawn_unit(Some(P0), UnitKind::Chief, Hex::ORIGIN);
        let guard = state.spawn_unit(Some(P0), UnitKind::Armored, Hex::new(-2, 0));
        state.facilities.insert(FacilityId(1), {
            let mut f = Facility::new(FacilityId(1), Hex::new(-2, 0));
            f.owner = Some(P0);
            f
        });
        for n in Hex::ORIGIN.neighbors() {
            own(&mut state, n, P1);
        }
        state.spawn_unit(Some(P1), UnitKind::LightInfantry, Hex::new(1, 0));

        assert!(is_chief_captured(&state, &grid, &state.units[&chief]));
        let events = resolve_chiefs(&mut state, &grid, &[], 9);
        assert_eq!(events.len(), 1);
        assert!(!state.is_live_player(P0));
        assert_eq!(state.units[&guard].owner, None);
        assert_eq!(state.facilities[&FacilityId(1)].owner, None);
        assert!(!state.units.contains_key(&chief));
    }

    #[test]
    fn test_chief_with_exit_survives() {
        let mut state = two_players();
        let grid = HexGrid::centered(3);
        let chief = state.spawn_unit(Some(P0), UnitKind::Chief, Hex::ORIGIN);
        for n in Hex::ORIGIN.neighbors().into_iter().skip(1) {
            own(&mut state, n, P1);
        }
        state.spawn_unit(Some(P1), UnitKind::LightInfantry, Hex::new(0, 1));
        assert!(!is_chief_captured(&state, &grid, &state.units[&chief]));
    }

    #[test]
    fn test_impassable_ring_without_enemy_is_safe() {
        let mut state = two_players();
        let mut grid = HexGrid::centered(3);
        for n in Hex::ORIGIN.neighbors() {
            grid.set_terrain(n, Terrain::Impassable);
        }
        let chief = state.spawn_unit(Some(P0), UnitKind::Chief, Hex::ORIGIN);
        assert!(!is_chief_captured(&state, &grid, &state.units[&chief]));
    }

    #[test]
    fn test_last_chief_standing_wins() {
        let mut state = two_players();
        let rules = RulesConfig::default();
        state.spawn_unit(Some(P1), UnitKind::Chief, Hex::new(2, 0));
        eliminate(&mut state, P0, 4);
        let event = check_victory(&mut state, &rules, 4);
        assert_eq!(state.status, GameStatus::Finished);
        assert_eq!(state.result, Some(MatchResult::Winner(P1)));
        assert_eq!(
            event,
            Some(GameEvent::MatchEnded {
                hex: Some(Hex::new(2, 0)),
                result: MatchResult::Winner(P1)
            })
        );
    }

    #[test]
    fn test_mutual_elimination_is_draw() {
        let mut state = two_players();
        let grid = HexGrid::centered(3);
        let fallen: Vec<Fallen> = [P0, P1]
            .into_iter()
            .enumerate()
            .map(|(i, p)| Fallen {
                id: crate::ids::UnitId(i as u32 + 1),
                owner: Some(p),
                kind: UnitKind::Chief,
                hex: Hex::ORIGIN,
            })
            .collect();
        resolve_chiefs(&mut state, &grid, &fallen, 2);
        check_victory(&mut state, &RulesConfig::default(), 2);
        assert_eq!(state.result, Some(MatchResult::Draw));
    }

    #[test]
    fn test_time_limit_scores() {
        let mut state = two_players();
        let rules = RulesConfig::default();
        state.spawn_unit(Some(P0), UnitKind::Chief, Hex::ORIGIN);
        state.spawn_unit(Some(P1), UnitKind::Chief, Hex::new(2, 0));
        state.spawn_unit(Some(P1), UnitKind::Scout, Hex::new(2, 0));
        assert_eq!(score(&state, P0), Fixed::from_num(1011));
        assert_eq!(score(&state, P1), Fixed::from_num(1012));

        assert!(check_victory(&mut state, &rules, rules.time_limit_ticks - 1).is_none());
        check_victory(&mut state, &rules, rules.time_limit_ticks);
        assert_eq!(state.result, Some(MatchResult::Winner(P1)));
    }

    #[test]
    fn test_time_limit_tie_is_draw() {
        let mut state = two_players();
        let rules = RulesConfig::default();
        check_victory(&mut state, &rules, rules.time_limit_ticks);
        assert_eq!(state.result, Some(MatchResult::Draw));
    }

    #[test]
    fn test_elimination_reports_neutralized_hexes() {
        let mut state = two_players();
        let mut facility = Facility::new(FacilityId(0), Hex::new(1, 0));
        facility.owner = Some(P0);
        state.facilities.insert(facility.id, facility);
        for (hex, owner) in [(Hex::new(1, 0), P0), (Hex::new(2, 0), P0), (Hex::new(-1, 0), P1)] {
            state.control.insert(
                hex,
                ControlRecord {
                    owner: Some(owner),
                    occupant: None,
                    streak: 0,
                },
            );
        }

        let events = eliminate(&mut state, P0, 3);
        assert_eq!(
            events,
            vec![
                GameEvent::Capture {
                    hex: Hex::new(1, 0),
                    facility: Some(FacilityId(0)),
                    previous_owner: Some(P0),
                    new_owner: None,
                },
                GameEvent::Capture {
                    hex: Hex::new(2, 0),
                    facility: None,
                    previous_owner: Some(P0),
                    new_owner: None,
                },
            ]
        );
        assert_eq!(state.controller(Hex::new(-1, 0)), Some(P1));
    }
}
