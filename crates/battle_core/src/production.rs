//! Economy phase: income, build queues, repairs and upkeep.
//!
//! Build costs are paid when a Produce order is accepted, so this phase only
//! counts slots down and places finished units. A finished unit that cannot
//! fit on its facility's hex stays in its slot at zero and is retried every
//! tick until there is room.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::config::RulesConfig;
use crate::economy::{ResourceKind, Resources};
use crate::events::GameEvent;
use crate::grid::HexGrid;
use crate::ids::{PlayerId, UnitId};
use crate::math::Fixed;
use crate::state::MatchState;
use crate::units::UnitStatus;

/// Run every economy step for `tick`.
pub fn run_production(
    state: &mut MatchState,
    grid: &HexGrid,
    rules: &RulesConfig,
    tick: u64,
    fought: &BTreeSet<UnitId>,
) -> Vec<GameEvent> {
    collect_income(state, grid, rules);
    let events = advance_builds(state, rules);
    apply_repairs(state, rules, fought);
    if rules.upkeep_interval > 0 && tick % rules.upkeep_interval == 0 {
        charge_upkeep(state);
    }
    events
}

/// Pay facility and resource-node income into each owner's pool.
///
/// Only facilities and nodes inside their owner's supply network pay out.
pub fn collect_income(state: &mut MatchState, grid: &HexGrid, rules: &RulesConfig) {
    let mut income: Vec<(PlayerId, Resources)> = Vec::new();

    for facility in state.facilities.values() {
        if let Some(owner) = facility.owner {
            if state.is_live_player(owner) && state.in_supply(owner, facility.position) {
                income.push((owner, rules.facility_income));
            }
        }
    }
    for (hex, node) in grid.nodes() {
        if let Some(owner) = state.controller(hex) {
            if state.is_live_player(owner) && state.in_supply(owner, hex) {
                income.push((owner, Resources::single(node.kind, node.yield_per_tick)));
            }
        }
    }

    for (owner, amount) in income {
        if let Some(economy) = state.economies.get_mut(&owner) {
            let stored = economy.deposit(amount);
            if stored != amount {
                debug!(player = %owner, "Income above cap discarded");
            }
        }
    }
}

/// Count every build slot down and place finished units.
pub fn advance_builds(state: &mut MatchState, rules: &RulesConfig) -> Vec<GameEvent> {
    let mut events = Vec::new();
    let facility_ids: Vec<_> = state.facilities.keys().copied().collect();

    for id in facility_ids {
        let Some(facility) = state.facilities.get_mut(&id) else {
            continue;
        };
        let Some(owner) = facility.owner else {
            continue;
        };
        for slot in &mut facility.slots {
            slot.ticks_remaining = slot.ticks_remaining.saturating_sub(1);
        }
        let position = facility.position;
        let rally = facility.rally_point;
        let finished: Vec<usize> = facility
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.ticks_remaining == 0)
            .map(|(i, _)| i)
            .collect();

        let mut placed = Vec::new();
        for index in finished {
            let occupants: Vec<_> = state.units_at(position).map(|u| u.owner).collect();
            let blocked = occupants.len() >= rules.stack_cap
                || occupants.iter().any(|o| *o != Some(owner));
            let kind = state.facilities[&id].slots[index].kind;
            if blocked {
                warn!(facility = %id, ?kind, hex = %position, "Build stalled: no room on facility hex");
                continue;
            }
            let unit = state.spawn_unit(Some(owner), kind, position);
            if let Some(u) = state.units.get_mut(&unit) {
                u.rally_target = rally.filter(|r| *r != position);
            }
            placed.push(index);
            events.push(GameEvent::UnitBuilt {
                hex: position,
                facility: id,
                unit,
                kind,
                owner,
            });
        }

        if let Some(facility) = state.facilities.get_mut(&id) {
            for index in placed.into_iter().rev() {
                facility.slots.remove(index);
            }
        }
    }

    debug!(built = events.len(), "Advanced builds");
    events
}

/// Tick repair counters and heal units that waited long enough.
///
/// Fighting or being out of supply resets the counter.
pub fn apply_repairs(state: &mut MatchState, rules: &RulesConfig, fought: &BTreeSet<UnitId>) {
    let amount = Fixed::from_num(rules.repair_amount);
    for unit in state.units.values_mut() {
        let eligible = unit.owner.is_some()
            && !fought.contains(&unit.id)
            && !unit.status.contains(UnitStatus::OUT_OF_SUPPLY);
        if !eligible {
            unit.repair_counter = 0;
            continue;
        }
        unit.repair_counter += 1;
        if unit.repair_counter >= rules.repair_interval {
            unit.repair_counter = 0;
            unit.hp = (unit.hp + amount).min(unit.max_hp);
        }
    }
}

/// Charge fuel upkeep, in unit id order, and set or clear `STARVED`.
pub fn charge_upkeep(state: &mut MatchState) {
    let mut starved = 0usize;
    for unit in state.units.values_mut() {
        let Some(owner) = unit.owner else {
            continue;
        };
        if !unit.kind.has_upkeep() {
            continue;
        }
        let cost = Resources::single(ResourceKind::Fuel, unit.kind.stats().fuel_upkeep);
        let paid = state
            .economies
            .get_mut(&owner)
            .is_some_and(|e| e.spend(&cost));
        unit.status.set(UnitStatus::STARVED, !paid);
        starved += usize::from(!paid);
    }
    debug!(starved, "Charged upkeep");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::PlayerEconomy;
    use crate::grid::ResourceNode;
    use crate::hex::Hex;
    use crate::ids::FacilityId;
    use crate::state::{BuildSlot, ControlRecord, Facility, PlayerRecord};
    use crate::units::UnitKind;

    const P0: PlayerId = PlayerId(0);

    fn setup() -> (MatchState, HexGrid, RulesConfig) {
        let mut state = MatchState::new(2);
        state.players.insert(
            P0,
            PlayerRecord {
                id: P0,
                eliminated: false,
                eliminated_at: None,
            },
        );
        state
            .economies
            .insert(P0, PlayerEconomy::new(Resources::new(0, 20, 0), 5000));
        let mut facility = Facility::new(FacilityId(1), Hex::ORIGIN);
        facility.owner = Some(P0);
        state.facilities.insert(facility.id, facility);
        state.control.insert(
            Hex::ORIGIN,
            ControlRecord {
                owner: Some(P0),
                occupant: Some(P0),
                streak: 3,
            },
        );
        state.supply.insert(P0, [Hex::ORIGIN].into_iter().collect());
        (state, HexGrid::centered(3), RulesConfig::default())
    }

    fn queue(state: &mut MatchState, kind: UnitKind, ticks: u32) {
        if let Some(f) = state.facilities.get_mut(&FacilityId(1)) {
            f.slots.push(BuildSlot {
                kind,
                ticks_remaining: ticks,
            });
        }
    }

    #[test]
    fn test_income_needs_supply() {
        let (mut state, mut grid, rules) = setup();
        let node_hex = Hex::new(1, 0);
        grid.add_node(
            node_hex,
            ResourceNode {
                kind: ResourceKind::Intel,
                yield_per_tick: 4,
            },
        );
        state.control.insert(
            node_hex,
            ControlRecord {
                owner: Some(P0),
                occupant: None,
                streak: 0,
            },
        );

        collect_income(&mut state, &grid, &rules);
        assert_eq!(state.economies[&P0].stock, Resources::new(10, 25, 0));

        if let Some(supplied) = state.supply.get_mut(&P0) {
            supplied.insert(node_hex);
        }
        collect_income(&mut state, &grid, &rules);
        assert_eq!(state.economies[&P0].stock, Resources::new(20, 30, 4));
    }

    #[test]
    fn test_build_completes_after_countdown() {
        let (mut state, _, rules) = setup();
        queue(&mut state, UnitKind::Scout, 2);

        assert!(advance_builds(&mut state, &rules).is_empty());
        let events = advance_builds(&mut state, &rules);
        assert_eq!(events.len(), 1);
        assert_eq!(state.units.len(), 1);
        assert!(state.facilities[&FacilityId(1)].slots.is_empty());
    }

    #[test]
    fn test_build_stalls_at_stack_cap() {
        let (mut state, _, rules) = setup();
        for _ in 0..rules.stack_cap {
            state.spawn_unit(Some(P0), UnitKind::LightInfantry, Hex::ORIGIN);
        }
        queue(&mut state, UnitKind::Scout, 1);

        assert!(advance_builds(&mut state, &rules).is_empty());
        assert!(advance_builds(&mut state, &rules).is_empty());
        let slot = state.facilities[&FacilityId(1)].slots[0];
        assert_eq!(slot.ticks_remaining, 0);

        let first = *state.units.keys().next().unwrap();
        state.units.remove(&first);
        assert_eq!(advance_builds(&mut state, &rules).len(), 1);
        assert_eq!(state.units_at(Hex::ORIGIN).count(), rules.stack_cap);
    }

    #[test]
    fn test_new_unit_gets_rally_target() {
        let (mut state, _, rules) = setup();
        if let Some(f) = state.facilities.get_mut(&FacilityId(1)) {
            f.rally_point = Some(Hex::new(2, -1));
        }
        queue(&mut state, UnitKind::LightInfantry, 1);
        advance_builds(&mut state, &rules);
        let unit = state.units.values().next().unwrap();
        assert_eq!(unit.rally_target, Some(Hex::new(2, -1)));
    }

    #[test]
    fn test_repair_every_interval() {
        let (mut state, _, rules) = setup();
        let id = state.spawn_unit(Some(P0), UnitKind::LightInfantry, Hex::ORIGIN);
        state.units.get_mut(&id).unwrap().hp = Fixed::from_num(50);
        let none = BTreeSet::new();

        for _ in 0..4 {
            apply_repairs(&mut state, &rules, &none);
        }
        assert_eq!(state.units[&id].hp, Fixed::from_num(50));
        apply_repairs(&mut state, &rules, &none);
        assert_eq!(state.units[&id].hp, Fixed::from_num(55));

        let fought: BTreeSet<UnitId> = [id].into_iter().collect();
        for _ in 0..4 {
            apply_repairs(&mut state, &rules, &none);
        }
        apply_repairs(&mut state, &rules, &fought);
        assert_eq!(state.units[&id].repair_counter, 0);
        assert_eq!(state.units[&id].hp, Fixed::from_num(55));

        state.units.get_mut(&id).unwrap().hp = Fixed::from_num(58);
        for _ in 0..5 {
            apply_repairs(&mut state, &rules, &none);
        }
        assert_eq!(state.units[&id].hp, Fixed::from_num(60));
    }

    #[test]
    fn test_upkeep_starves_in_id_order() {
        let (mut state, _, _) = setup();
        let first = state.spawn_unit(Some(P0), UnitKind::Armored, Hex::ORIGIN);
        let second = state.spawn_unit(Some(P0), UnitKind::Mechanized, Hex::ORIGIN);
        let third = state.spawn_unit(Some(P0), UnitKind::Armored, Hex::ORIGIN);
        if let Some(e) = state.economies.get_mut(&P0) {
            e.stock.fuel = 9;
        }
        charge_upkeep(&mut state);
        assert!(!state.units[&first].status.contains(UnitStatus::STARVED));
        assert!(!state.units[&second].status.contains(UnitStatus::STARVED));
        assert!(state.units[&third].status.contains(UnitStatus::STARVED));
        assert_eq!(state.economies[&P0].stock.fuel, 1);

        if let Some(e) = state.economies.get_mut(&P0) {
            e.stock.fuel = 100;
        }
        charge_upkeep(&mut state);
        assert!(!state.units[&third].status.contains(UnitStatus::STARVED));
    }
}
