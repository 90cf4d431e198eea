//! Effective-HP combat with focus fire.
//!
//! Every hex holding units of two or more owners after movement is an
//! engagement, and so is every head-to-head collision edge. Engagements
//! read only the post-movement state and key their randomness by
//! coordinates, so they resolve in parallel and commit afterwards in hex
//! order.
//!
//! Per round, each side's output is
//! `O = sum(ATK x HP/maxHP x terrain attack) x R x flank`, and it is spent
//! on enemies in ascending HP order. A target with mitigation
//! `M = DEF / (DEF + K)` needs `E = HP / (1 - M)` output to kill; partial
//! output deals `O x (1 - M)`. Both sides fire on the state as it stood at
//! the start of the round.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::RulesConfig;
use crate::events::GameEvent;
use crate::grid::HexGrid;
use crate::hex::Hex;
use crate::ids::{PlayerId, UnitId};
use crate::math::{percent, Fixed};
use crate::movement::{revert, MovementReport};
use crate::rng;
use crate::state::MatchState;
use crate::units::{UnitKind, UnitStatus};

/// Engagement index offset for collision edges, keeping their draws apart
/// from a hex engagement keyed on the same hex.
const EDGE_ENGAGEMENT_BASE: u32 = 1 << 16;

/// Mitigation `DEF / (DEF + K)`.
#[must_use]
pub fn mitigation(defense: Fixed, k: Fixed) -> Fixed {
    defense / (defense + k)
}

/// Effective HP `HP / (1 - M)`, computed as `HP x (DEF + K) / K`.
#[must_use]
pub fn effective_hp(hp: Fixed, defense: Fixed, k: Fixed) -> Fixed {
    hp * (defense + k) / k
}

/// A unit as it enters an engagement.
#[derive(Debug, Clone, Copy)]
pub struct Combatant {
    /// Unit.
    pub id: UnitId,
    /// Side.
    pub owner: Option<PlayerId>,
    /// HP at engagement start.
    pub hp: Fixed,
    /// Max HP.
    pub max_hp: Fixed,
    /// ATK with terrain and supply modifiers applied.
    pub attack: Fixed,
    /// DEF_total: base DEF times terrain modifier plus aura.
    pub defense: Fixed,
}

/// One independent fight.
#[derive(Debug, Clone)]
pub struct Engagement {
    /// Hex the random stream is keyed on.
    pub key: Hex,
    /// First engagement index used for draws.
    pub base_index: u32,
    /// Participants.
    pub members: Vec<Combatant>,
    /// Sides that get the flank bonus.
    pub flanking: BTreeSet<Option<PlayerId>>,
}

/// What an engagement did.
#[derive(Debug, Clone)]
pub struct EngagementResult {
    /// Key hex.
    pub key: Hex,
    /// Sides that took part, ascending.
    pub sides: Vec<Option<PlayerId>>,
    /// Rounds fought.
    pub rounds: u32,
    /// Damage taken per unit.
    pub damage: BTreeMap<UnitId, Fixed>,
}

/// Spend `output` on `targets` (already in focus-fire order).
///
/// Returns the damage dealt per target and the output left over.
#[must_use]
pub fn distribute(
    mut output: Fixed,
    targets: &[(UnitId, Fixed, Fixed)],
    k: Fixed,
) -> (Vec<(UnitId, Fixed)>, Fixed) {
    let mut dealt = Vec::new();
    for &(id, hp, defense) in targets {
        if output <= Fixed::ZERO {
            break;
        }
        let ehp = effective_hp(hp, defense, k);
        if output >= ehp {
            dealt.push((id, hp));
            output -= ehp;
        } else {
            dealt.push((id, output * k / (defense + k)));
            output = Fixed::ZERO;
        }
    }
    (dealt, output)
}

/// Fight one engagement to completion or the round cap.
#[must_use]
pub fn resolve_engagement(
    engagement: &Engagement,
    seed: u64,
    tick: u64,
    rules: &RulesConfig,
) -> EngagementResult {
    let k = Fixed::from_num(rules.defense_constant);
    let sides: Vec<Option<PlayerId>> = engagement
        .members
        .iter()
        .map(|m| m.owner)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let mut hp: BTreeMap<UnitId, Fixed> =
        engagement.members.iter().map(|m| (m.id, m.hp)).collect();

    let mut rounds = 0;
    while rounds < rules.max_combat_rounds {
        let alive = |id: &UnitId, hp: &BTreeMap<UnitId, Fixed>| hp[id] > Fixed::ZERO;
        let living_sides = sides
            .iter()
            .filter(|s| {
                engagement
                    .members
                    .iter()
                    .any(|m| m.owner == **s && alive(&m.id, &hp))
            })
            .count();
        if living_sides < 2 {
            break;
        }

        let mut pending: BTreeMap<UnitId, Fixed> = BTreeMap::new();
        for (side_index, side) in sides.iter().enumerate() {
            let mut output = Fixed::ZERO;
            for m in engagement.members.iter().filter(|m| m.owner == *side) {
                if alive(&m.id, &hp) {
                    output += m.attack * (hp[&m.id] / m.max_hp);
                }
            }
            if output == Fixed::ZERO {
                continue;
            }
            let index = engagement.base_index + rounds * 8 + side_index as u32;
            output *= rng::variance(seed, tick, engagement.key, index);
            if engagement.flanking.contains(side) {
                output *= percent(100 + rules.flank_bonus_percent);
            }

            let mut targets: Vec<(UnitId, Fixed, Fixed)> = engagement
                .members
                .iter()
                .filter(|m| m.owner != *side && alive(&m.id, &hp))
                .map(|m| (m.id, hp[&m.id], m.defense))
                .collect();
            targets.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));

            let (dealt, _) = distribute(output, &targets, k);
            for (id, dmg) in dealt {
                *pending.entry(id).or_insert(Fixed::ZERO) += dmg;
            }
        }

        for (id, dmg) in pending {
            if let Some(h) = hp.get_mut(&id) {
                *h = (*h - dmg).max(Fixed::ZERO);
            }
        }
        rounds += 1;
    }

    let damage = engagement
        .members
        .iter()
        .map(|m| (m.id, m.hp - hp[&m.id]))
        .collect();

    EngagementResult {
        key: engagement.key,
        sides,
        rounds,
        damage,
    }
}

/// A unit killed this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fallen {
    /// Unit.
    pub id: UnitId,
    /// Owner at death.
    pub owner: Option<PlayerId>,
    /// Kind.
    pub kind: UnitKind,
    /// Where it died.
    pub hex: Hex,
}

/// Result of the combat phase.
#[derive(Debug, Clone, Default)]
pub struct CombatReport {
    /// Combat events, in engagement order.
    pub events: Vec<GameEvent>,
    /// Units killed.
    pub fallen: Vec<Fallen>,
    /// Every unit that took part in an engagement.
    pub fought: BTreeSet<UnitId>,
}

/// Build engagements from the post-movement state, fight them, commit
/// casualties, then settle provisional entrants.
pub fn resolve_combat(
    state: &mut MatchState,
    grid: &HexGrid,
    rules: &RulesConfig,
    tick: u64,
    movement: &mut MovementReport,
) -> CombatReport {
    let engagements = build_engagements(state, grid, rules, movement);
    let seed = state.seed;
    let results: Vec<EngagementResult> = engagements
        .par_iter()
        .map(|e| resolve_engagement(e, seed, tick, rules))
        .collect();

    let mut report = CombatReport::default();
    let mut total: BTreeMap<UnitId, Fixed> = BTreeMap::new();
    for result in &results {
        for (id, dmg) in &result.damage {
            report.fought.insert(*id);
            *total.entry(*id).or_insert(Fixed::ZERO) += *dmg;
        }
    }

    for (id, dmg) in &total {
        let Some(unit) = state.units.get_mut(id) else {
            continue;
        };
        unit.hp -= *dmg;
        if !unit.is_alive() {
            report.fallen.push(Fallen {
                id: unit.id,
                owner: unit.owner,
                kind: unit.kind,
                hex: unit.position,
            });
        }
    }
    for fallen in &report.fallen {
        state.units.remove(&fallen.id);
    }

    let casualties = attribute_casualties(&results, &report.fallen);
    for (result, casualties) in results.iter().zip(casualties) {
        report.events.push(GameEvent::Combat {
            hex: result.key,
            sides: result.sides.clone(),
            rounds: result.rounds,
            casualties,
        });
    }

    settle_entrants(state, grid, rules, movement);

    debug!(
        tick,
        engagements = results.len(),
        fallen = report.fallen.len(),
        "Resolved combat"
    );

    report
}

/// Casualty list per engagement. A unit that fought in more than one
/// engagement is listed once, under the one that dealt it the most damage
/// (the earliest on a tie).
fn attribute_casualties(results: &[EngagementResult], fallen: &[Fallen]) -> Vec<Vec<UnitId>> {
    let mut lists = vec![Vec::new(); results.len()];
    for dead in fallen {
        let mut best: Option<(usize, Fixed)> = None;
        for (index, result) in results.iter().enumerate() {
            let Some(dmg) = result.damage.get(&dead.id) else {
                continue;
            };
            if best.map_or(true, |(_, top)| *dmg > top) {
                best = Some((index, *dmg));
            }
        }
        if let Some((index, _)) = best {
            lists[index].push(dead.id);
        }
    }
    lists
}

fn build_engagements(
    state: &MatchState,
    grid: &HexGrid,
    rules: &RulesConfig,
    movement: &MovementReport,
) -> Vec<Engagement> {
    let mut engagements = Vec::new();

    for (hex, ids) in state.occupancy() {
        let owners: BTreeSet<_> = ids.iter().map(|id| state.units[id].owner).collect();
        if owners.len() < 2 {
            continue;
        }
        let members = ids
            .iter()
            .map(|id| combatant(state, grid, rules, *id))
            .collect();
        let flanking = owners
            .iter()
            .filter(|o| flanks(state, grid, rules, **o, hex))
            .copied()
            .collect();
        engagements.push(Engagement {
            key: hex,
            base_index: 0,
            members,
            flanking,
        });
    }

    let mut edges: BTreeMap<(Hex, Hex), BTreeSet<UnitId>> = BTreeMap::new();
    for collision in &movement.collisions {
        let (Some(a), Some(b)) = (state.units.get(&collision.a), state.units.get(&collision.b))
        else {
            continue;
        };
        let edge = (a.position.min(b.position), a.position.max(b.position));
        edges.entry(edge).or_default().extend([a.id, b.id]);
    }
    for ((low, high), ids) in edges {
        let members: Vec<Combatant> = ids
            .iter()
            .map(|id| combatant(state, grid, rules, *id))
            .collect();
        let flanking = members
            .iter()
            .filter(|m| {
                let own_hex = state.units[&m.id].position;
                let defended = if own_hex == low { high } else { low };
                flanks(state, grid, rules, m.owner, defended)
            })
            .map(|m| m.owner)
            .collect();
        engagements.push(Engagement {
            key: low,
            base_index: EDGE_ENGAGEMENT_BASE,
            members,
            flanking,
        });
    }

    engagements
}

fn combatant(state: &MatchState, grid: &HexGrid, rules: &RulesConfig, id: UnitId) -> Combatant {
    let unit = &state.units[&id];
    let stats = unit.kind.stats();
    let terrain = grid.terrain(unit.position).unwrap_or_default();

    let mut attack = Fixed::from_num(stats.attack) * terrain.attack_modifier();
    if unit.status.contains(UnitStatus::OUT_OF_SUPPLY) {
        attack *= percent(100 - rules.out_of_supply_attack_penalty_percent);
    }

    let mut defense_modifier = terrain.defense_modifier();
    let aura = !unit.is_chief()
        && unit.owner.is_some()
        && state.units.values().any(|c| {
            c.is_chief()
                && c.owner == unit.owner
                && c.position.distance(unit.position) <= rules.chief_aura_radius
        });
    if aura {
        defense_modifier += percent(rules.chief_aura_percent);
    }

    Combatant {
        id,
        owner: unit.owner,
        hp: unit.hp,
        max_hp: unit.max_hp,
        attack,
        defense: Fixed::from_num(stats.defense) * defense_modifier,
    }
}

/// Whether `side` gets the flank bonus attacking `defended`.
fn flanks(
    state: &MatchState,
    grid: &HexGrid,
    rules: &RulesConfig,
    side: Option<PlayerId>,
    defended: Hex,
) -> bool {
    let Some(player) = side else {
        return false;
    };
    grid.neighbors(defended)
        .filter(|n| state.controller(*n) == Some(player))
        .count()
        >= rules.flank_threshold
}

/// Revert provisional entrants whose hex is still contested.
fn settle_entrants(
    state: &mut MatchState,
    grid: &HexGrid,
    rules: &RulesConfig,
    movement: &mut MovementReport,
) {
    let entrants: Vec<(UnitId, Hex)> = movement
        .provisional
        .iter()
        .map(|(id, origin)| (*id, *origin))
        .collect();

    for (id, origin) in entrants {
        let Some(unit) = state.units.get(&id) else {
            continue;
        };
        let (owner, here) = (unit.owner, unit.position);
        let contested = state.units_at(here).any(|u| u.owner != owner);
        if !contested || unit.is_chief() {
            continue;
        }

        let origin_room = state.units_at(origin).count() < rules.stack_cap
            && state.units_at(origin).all(|u| u.owner == owner);
        if origin_room {
            revert(state, movement, id, origin);
            continue;
        }
        if state.units_at(here).count() <= rules.stack_cap {
            continue;
        }
        match nearest_free_hex(state, grid, rules, here, owner) {
            Some(hex) => revert(state, movement, id, hex),
            None => warn!(unit = %id, hex = %here, "No hex to displace unit into; left in place"),
        }
    }
}

/// Closest passable hex with room and no other owner's units.
fn nearest_free_hex(
    state: &MatchState,
    grid: &HexGrid,
    rules: &RulesConfig,
    from: Hex,
    owner: Option<PlayerId>,
) -> Option<Hex> {
    let mut seen = BTreeSet::from([from]);
    let mut queue = VecDeque::from([from]);
    while let Some(hex) = queue.pop_front() {
        for next in grid.neighbors(hex) {
            if !grid.is_passable(next) || !seen.insert(next) {
                continue;
            }
            let occupants: Vec<_> = state.units_at(next).collect();
            if occupants.len() < rules.stack_cap && occupants.iter().all(|u| u.owner == owner) {
                return Some(next);
            }
            queue.push_back(next);
        }
    }
    None
}
