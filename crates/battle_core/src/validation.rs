//! Order validation.
//!
//! Runs against the state as it stood before the tick's phases. Each order
//! is checked in a fixed sequence that stops at the first failure:
//!
//! 1. target tick (future orders within the lead window are deferred; past
//!    ones, and ones beyond the window, are late)
//! 2. per-player order count and payload ceiling for the target tick
//! 3. at most one accepted order per unit
//! 4. entity exists and belongs to the submitter
//! 5. destination is on the map and passable
//! 6. facility has a free slot, player can pay
//! 7. static stack-cap pre-check
//!
//! Accepting a Produce order pays for it and queues the build immediately.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::config::RulesConfig;
use crate::grid::HexGrid;
use crate::hex::Hex;
use crate::ids::{PlayerId, UnitId};
use crate::order::{Order, OrderEnvelope, RejectCode};
use crate::state::{BuildSlot, MatchState};

/// Outcome of validating one tick's batch.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Orders that passed, in `(player, seq)` order.
    pub accepted: Vec<OrderEnvelope>,
    /// Orders refused, with their code.
    pub rejected: Vec<(OrderEnvelope, RejectCode)>,
    /// Orders aimed at a later tick, to be offered again then.
    pub deferred: Vec<OrderEnvelope>,
}

/// Partition `batch` for `tick`, applying the side effects of accepted
/// Produce orders to `state`.
pub fn validate_batch(
    state: &mut MatchState,
    grid: &HexGrid,
    rules: &RulesConfig,
    tick: u64,
    mut batch: Vec<OrderEnvelope>,
) -> ValidationReport {
    let mut report = ValidationReport::default();
    batch.sort_by_key(|e| (e.player, e.seq));

    // Caps count per player and target tick, so deferred orders use up the
    // allowance of the tick they are meant for.
    let horizon = tick.saturating_add(rules.max_order_lead);
    let mut current = Vec::with_capacity(batch.len());
    let mut counts: BTreeMap<(PlayerId, u64), (usize, usize)> = BTreeMap::new();
    for envelope in batch {
        if envelope.target_tick < tick || envelope.target_tick > horizon {
            report.rejected.push((envelope, RejectCode::LateSubmission));
            continue;
        }
        let (count, bytes) = counts
            .entry((envelope.player, envelope.target_tick))
            .or_default();
        *count += 1;
        let size = serde_json::to_vec(&envelope.order).map_or(usize::MAX, |b| b.len());
        *bytes = bytes.saturating_add(size);
        if *count > rules.max_orders_per_tick || *bytes > rules.max_payload_bytes {
            report.rejected.push((envelope, RejectCode::StackCapExceeded));
            continue;
        }
        if envelope.target_tick > tick {
            report.deferred.push(envelope);
            continue;
        }
        current.push(envelope);
    }

    // Units whose owner asked them to move somewhere reachable; their hex may
    // free up, so the stack pre-check can't count them as staying.
    let leaving: BTreeSet<UnitId> = current
        .iter()
        .filter_map(|e| match e.order {
            Order::Move { unit, dest } => state
                .units
                .get(&unit)
                .filter(|u| u.owner == Some(e.player))
                .filter(|u| u.position != dest && grid.is_passable(dest))
                .map(|u| u.id),
            _ => None,
        })
        .collect();
    let occupancy = state.occupancy();
    let mut ordered: BTreeSet<UnitId> = BTreeSet::new();

    for envelope in current {
        if envelope.order.unit().is_some_and(|u| ordered.contains(&u)) {
            report.rejected.push((envelope, RejectCode::StackCapExceeded));
            continue;
        }
        match check_order(state, grid, rules, &envelope, &occupancy, &leaving) {
            Ok(()) => {
                if let Some(unit) = envelope.order.unit() {
                    ordered.insert(unit);
                }
                apply_order_effects(state, &envelope);
                report.accepted.push(envelope);
            }
            Err(code) => report.rejected.push((envelope, code)),
        }
    }

    debug!(
        tick,
        accepted = report.accepted.len(),
        rejected = report.rejected.len(),
        deferred = report.deferred.len(),
        "Validated order batch"
    );

    report
}

fn check_order(
    state: &MatchState,
    grid: &HexGrid,
    rules: &RulesConfig,
    envelope: &OrderEnvelope,
    occupancy: &BTreeMap<Hex, Vec<UnitId>>,
    leaving: &BTreeSet<UnitId>,
) -> Result<(), RejectCode> {
    let player = envelope.player;
    if !state.is_live_player(player) {
        return Err(RejectCode::NotVisibleOrOwned);
    }

    match envelope.order {
        Order::Move { unit, dest } => {
            let unit = state
                .units
                .get(&unit)
                .filter(|u| u.owner == Some(player))
                .ok_or(RejectCode::NotVisibleOrOwned)?;
            if !grid.is_passable(dest) || dest == unit.position {
                return Err(RejectCode::InvalidDestination);
            }
            let occupants = occupancy.get(&dest).map_or(&[][..], Vec::as_slice);
            let staying = occupants.iter().filter(|id| !leaving.contains(id)).count();
            if staying >= rules.stack_cap && occupants.len() == staying {
                return Err(RejectCode::StackCapExceeded);
            }
            Ok(())
        }
        Order::Produce { facility, kind } => {
            let facility = state
                .facilities
                .get(&facility)
                .filter(|f| f.owner == Some(player))
                .ok_or(RejectCode::NotVisibleOrOwned)?;
            if !kind.is_producible() {
                return Err(RejectCode::NotVisibleOrOwned);
            }
            if !facility.has_free_slot() {
                return Err(RejectCode::StackCapExceeded);
            }
            let can_pay = state
                .economies
                .get(&player)
                .is_some_and(|e| e.can_afford(&kind.stats().cost));
            if !can_pay {
                return Err(RejectCode::InsufficientResources);
            }
            Ok(())
        }
        Order::Disband { unit } => {
            let unit = state
                .units
                .get(&unit)
                .filter(|u| u.owner == Some(player))
                .ok_or(RejectCode::NotVisibleOrOwned)?;
            if unit.is_chief() {
                return Err(RejectCode::NotVisibleOrOwned);
            }
            Ok(())
        }
        Order::SetRally { facility, hex } => {
            state
                .facilities
                .get(&facility)
                .filter(|f| f.owner == Some(player))
                .ok_or(RejectCode::NotVisibleOrOwned)?;
            if !grid.is_passable(hex) {
                return Err(RejectCode::InvalidDestination);
            }
            Ok(())
        }
    }
}

/// Apply the validation-time side effects of an accepted order.
///
/// Produce pays its cost and occupies a slot; SetRally updates the
/// facility. Move and Disband act later in the tick. Used both for live
/// validation and for replaying recorded orders.
pub fn apply_order_effects(state: &mut MatchState, envelope: &OrderEnvelope) {
    match envelope.order {
        Order::Produce { facility, kind } => {
            let stats = kind.stats();
            let paid = state
                .economies
                .get_mut(&envelope.player)
                .is_some_and(|e| e.spend(&stats.cost));
            if !paid {
                tracing::warn!(player = %envelope.player, ?kind, "Accepted build could not be paid; skipped");
                return;
            }
            if let Some(f) = state.facilities.get_mut(&facility) {
                f.slots.push(BuildSlot {
                    kind,
                    ticks_remaining: stats.build_ticks,
                });
            }
        }
        Order::SetRally { facility, hex } => {
            if let Some(f) = state.facilities.get_mut(&facility) {
                f.rally_point = Some(hex);
            }
        }
        Order::Move { .. } | Order::Disband { .. } => {}
    }
}

/// The hex an order refers to, for event locations.
#[must_use]
pub fn order_hex(state: &MatchState, order: &Order) -> Option<Hex> {
    match *order {
        Order::Move { dest, .. } => Some(dest),
        Order::SetRally { hex, .. } => Some(hex),
        Order::Disband { unit } => state.units.get(&unit).map(|u| u.position),
        Order::Produce { facility, .. } => state.facilities.get(&facility).map(|f| f.position),
    }
}
