//! Simultaneous movement resolution ("lock and bounce").
//!
//! Every mover first commits to the hex it can reach this tick along its
//! cheapest path. Then, against start-of-tick positions:
//!
//! 1. Enemy movers swapping hexes collide and both stay put.
//! 2. Movers converging on an empty hex: highest initiative enters, the
//!    rest bounce.
//! 3. Movers into occupied hexes resolve to a fixed point. A mover waits
//!    until every mover leaving its destination is settled, bounces behind a
//!    friendly mover that stayed, and otherwise enters if the stack cap
//!    allows. Whatever is still unsettled at the iteration cap bounces.
//!
//! Entering a hex held by another owner is provisional until combat.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RulesConfig;
use crate::grid::HexGrid;
use crate::hex::Hex;
use crate::ids::{PlayerId, UnitId};
use crate::pathfinding::{advance_along, find_path, StepCosts};
use crate::state::MatchState;
use crate::units::UnitStatus;

/// What happened to a mover.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveOutcome {
    /// Reached its hex for this tick.
    Moved,
    /// Stayed at its origin.
    Bounced,
    /// Stayed at its origin after a head-to-head enemy swap.
    Collided,
    /// Entered, then was pushed back out by combat.
    Disrupted,
}

/// A head-to-head enemy swap. Fought across the shared edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Collision {
    /// First unit (lower id).
    pub a: UnitId,
    /// Second unit.
    pub b: UnitId,
}

/// Result of the movement phase.
#[derive(Debug, Clone, Default)]
pub struct MovementReport {
    /// Outcome per mover.
    pub outcomes: BTreeMap<UnitId, MoveOutcome>,
    /// Units that entered a hex held by another owner, with their origin.
    pub provisional: BTreeMap<UnitId, Hex>,
    /// Enemy swaps.
    pub collisions: Vec<Collision>,
}

#[derive(Debug, Clone, Copy)]
struct Mover {
    id: UnitId,
    owner: Option<PlayerId>,
    origin: Hex,
    dest: Hex,
    cost: u32,
    initiative: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    Pending,
    Done(MoveOutcome),
}

/// Resolve `moves` (final destination per unit) and apply the results:
/// positions, MP debit and the Disrupted flag for units that did not move.
pub fn resolve_movement(
    state: &mut MatchState,
    grid: &HexGrid,
    rules: &RulesConfig,
    moves: &BTreeMap<UnitId, Hex>,
) -> MovementReport {
    let mut report = MovementReport::default();
    let occupancy = state.occupancy();
    let mut start_owners: BTreeMap<Hex, BTreeSet<Option<PlayerId>>> = BTreeMap::new();
    for unit in state.units.values() {
        start_owners.entry(unit.position).or_default().insert(unit.owner);
    }

    let mut movers: BTreeMap<UnitId, Mover> = BTreeMap::new();
    let mut unreachable = Vec::new();
    for (&id, &goal) in moves {
        let Some(unit) = state.units.get(&id) else {
            continue;
        };
        match plan_step(state, grid, id, goal) {
            Step::Toward(dest, cost) if dest != unit.position => {
                movers.insert(
                    id,
                    Mover {
                        id,
                        owner: unit.owner,
                        origin: unit.position,
                        dest,
                        cost,
                        initiative: u64::from(unit.mp) * 1000 + u64::from(id.0),
                    },
                );
            }
            Step::Unreachable => {
                unreachable.push(id);
                report.outcomes.insert(id, MoveOutcome::Bounced);
            }
            Step::Toward(..) | Step::Stay => {
                report.outcomes.insert(id, MoveOutcome::Bounced);
            }
        }
    }
    // A rally point with no path would bounce the unit every tick.
    for id in unreachable {
        if let Some(unit) = state.units.get_mut(&id) {
            if unit.rally_target.take().is_some() {
                debug!(unit = %id, "Rally target unreachable; cleared");
            }
        }
    }

    let mut status: BTreeMap<UnitId, Status> =
        movers.keys().map(|id| (*id, Status::Pending)).collect();

    // 1. Collisions
    for a in movers.values() {
        for b in movers.values() {
            if a.id < b.id && a.dest == b.origin && b.dest == a.origin && a.owner != b.owner {
                status.insert(a.id, Status::Done(MoveOutcome::Collided));
                status.insert(b.id, Status::Done(MoveOutcome::Collided));
                report.collisions.push(Collision { a: a.id, b: b.id });
            }
        }
    }

    // 2. Conflicts on empty hexes
    let mut by_dest: BTreeMap<Hex, Vec<UnitId>> = BTreeMap::new();
    for m in movers.values() {
        if status[&m.id] == Status::Pending {
            by_dest.entry(m.dest).or_default().push(m.id);
        }
    }
    for (dest, contenders) in &by_dest {
        if occupancy.contains_key(dest) {
            continue;
        }
        let winner = contenders
            .iter()
            .max_by_key(|id| movers[id].initiative)
            .copied();
        for id in contenders {
            let outcome = if Some(*id) == winner {
                MoveOutcome::Moved
            } else {
                MoveOutcome::Bounced
            };
            status.insert(*id, Status::Done(outcome));
        }
    }

    // 3. Occupied destinations, to a fixed point
    let mut order: Vec<&Mover> = movers.values().collect();
    order.sort_by(|x, y| y.initiative.cmp(&x.initiative));
    let mut iterations = 0;
    loop {
        iterations += 1;
        let mut changed = false;
        for m in &order {
            if status[&m.id] != Status::Pending {
                continue;
            }
            let occupants = occupancy.get(&m.dest).map_or(&[][..], Vec::as_slice);
            let settled = occupants.iter().all(|id| {
                !matches!(status.get(id), Some(Status::Pending))
            });
            if !settled {
                continue;
            }
            let blocked_by_friend = occupants.iter().any(|id| {
                matches!(
                    status.get(id),
                    Some(Status::Done(MoveOutcome::Bounced | MoveOutcome::Collided))
                ) && movers.get(id).is_some_and(|o| o.owner == m.owner)
            });
            let outcome = if blocked_by_friend {
                MoveOutcome::Bounced
            } else {
                let stayers = occupants
                    .iter()
                    .filter(|id| status.get(id) != Some(&Status::Done(MoveOutcome::Moved)))
                    .count();
                let arrivals = movers
                    .values()
                    .filter(|o| {
                        o.dest == m.dest && status[&o.id] == Status::Done(MoveOutcome::Moved)
                    })
                    .count();
                if stayers + arrivals < rules.stack_cap {
                    MoveOutcome::Moved
                } else {
                    MoveOutcome::Bounced
                }
            };
            status.insert(m.id, Status::Done(outcome));
            changed = true;
        }
        if !changed || iterations >= rules.movement_iteration_cap {
            break;
        }
    }
    for s in status.values_mut() {
        if *s == Status::Pending {
            *s = Status::Done(MoveOutcome::Bounced);
        }
    }
    if iterations >= rules.movement_iteration_cap {
        warn!(iterations, "Movement hit the iteration cap; remaining movers bounced");
    }

    // Apply
    for (id, s) in &status {
        let Status::Done(outcome) = *s else { continue };
        let m = movers[id];
        report.outcomes.insert(*id, outcome);
        let Some(unit) = state.units.get_mut(id) else {
            continue;
        };
        if outcome == MoveOutcome::Moved {
            let held_by_other = start_owners
                .get(&m.dest)
                .is_some_and(|owners| owners.iter().any(|o| *o != m.owner));
            if held_by_other {
                report.provisional.insert(*id, m.origin);
            }
            unit.position = m.dest;
            unit.mp = unit.mp.saturating_sub(m.cost);
        }
    }
    for (id, outcome) in &report.outcomes {
        if matches!(outcome, MoveOutcome::Bounced | MoveOutcome::Collided) {
            if let Some(unit) = state.units.get_mut(id) {
                unit.status.set(UnitStatus::DISRUPTED, true);
            }
        }
    }

    debug!(
        movers = movers.len(),
        collisions = report.collisions.len(),
        provisional = report.provisional.len(),
        "Resolved movement"
    );

    report
}

/// Where a mover heads this tick.
enum Step {
    /// Hex reachable toward the goal and the MP it costs.
    Toward(Hex, u32),
    /// No MP left, or the unit is gone.
    Stay,
    /// No path to the goal exists.
    Unreachable,
}

fn plan_step(state: &MatchState, grid: &HexGrid, id: UnitId, goal: Hex) -> Step {
    let Some(unit) = state.units.get(&id) else {
        return Step::Stay;
    };
    let hostile = |other: Option<PlayerId>| other != unit.owner;

    let mut enemy_occupied = BTreeSet::new();
    let mut zone_of_control = BTreeSet::new();
    for other in state.units.values() {
        if hostile(other.owner) && other.is_alive() {
            enemy_occupied.insert(other.position);
            zone_of_control.extend(other.position.neighbors());
        }
    }

    let costs = StepCosts {
        grid,
        enemy_occupied: &enemy_occupied,
        zone_of_control: &zone_of_control,
        out_of_supply: unit.status.contains(UnitStatus::OUT_OF_SUPPLY),
    };
    let Ok(path) = find_path(&costs, unit.position, goal) else {
        return Step::Unreachable;
    };
    if unit.mp == 0 {
        return Step::Stay;
    }
    let (dest, cost) = advance_along(&costs, &path, unit.mp);
    Step::Toward(dest, cost)
}

/// Move `unit` back to `origin` after a failed provisional entry and mark
/// it Disrupted.
pub fn revert(state: &mut MatchState, report: &mut MovementReport, unit: UnitId, to: Hex) {
    if let Some(u) = state.units.get_mut(&unit) {
        u.position = to;
        u.status.set(UnitStatus::DISRUPTED, true);
    }
    report.outcomes.insert(unit, MoveOutcome::Disrupted);
}
