//! Tick orchestration.
//!
//! [`Match`] owns the whole game: the map, the rules and the single mutable
//! [`MatchState`]. Every tick runs the same phase sequence:
//!
//! 1. refresh movement points, clear last tick's Disrupted flags
//! 2. validate orders (or, in replay, re-apply recorded ones)
//! 3. disband
//! 4. movement
//! 5. combat
//! 6. control update, Chief capture and elimination, victory check
//! 7. income, production, repair and upkeep
//! 8. supply and visibility recomputation
//!
//! # Determinism
//!
//! - No floating-point math (uses fixed-point via [`Fixed`](crate::math::Fixed))
//! - No system randomness: combat draws are keyed by (seed, tick, hex, engagement)
//! - Ordered maps everywhere, so iteration order never depends on hashing
//! - Parallel phases read an immutable view and commit in a fixed order
//!
//! # Example
//!
//! ```
//! use battle_core::prelude::*;
//!
//! let mut game = MatchSetup::duel(7).build()?;
//! let scout = game
//!     .state()
//!     .units
//!     .values()
//!     .find(|u| u.kind == UnitKind::Scout && u.owner == Some(PlayerId(0)))
//!     .map(|u| u.id)
//!     .unwrap();
//!
//! let outcome = game.tick(vec![OrderEnvelope {
//!     player: PlayerId(0),
//!     target_tick: 1,
//!     seq: 0,
//!     order: Order::Move { unit: scout, dest: Hex::new(-1, 0) },
//! }]);
//! assert_eq!(outcome.tick, 1);
//! assert_eq!(outcome.accepted.len(), 1);
//! # Ok::<(), battle_core::GameError>(())
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::combat::resolve_combat;
use crate::config::RulesConfig;
use crate::control::{check_victory, resolve_chiefs, update_control};
use crate::error::{GameError, Result};
use crate::events::GameEvent;
use crate::grid::HexGrid;
use crate::hex::Hex;
use crate::ids::{PlayerId, UnitId};
use crate::movement::resolve_movement;
use crate::order::{Order, OrderEnvelope};
use crate::production::run_production;
use crate::state::{GameStatus, MatchState};
use crate::supply::refresh_supply;
use crate::units::UnitStatus;
use crate::validation::{apply_order_effects, order_hex, validate_batch};
use crate::visibility::{refresh_visibility, snapshot, Perspective, Snapshot};

/// Everything one tick produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickOutcome {
    /// Tick that was executed.
    pub tick: u64,
    /// Events in phase order.
    pub events: Vec<GameEvent>,
    /// Orders accepted this tick, in `(player, seq)` order. This is what a
    /// replay log records.
    pub accepted: Vec<OrderEnvelope>,
    /// Foreign units each player saw for the first time this tick.
    pub newly_visible: BTreeMap<PlayerId, Vec<UnitId>>,
    /// State hash after the tick.
    pub hash: u64,
}

/// A running match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    grid: HexGrid,
    rules: RulesConfig,
    state: MatchState,
    /// Orders submitted for a later tick.
    buffered: Vec<OrderEnvelope>,
}

impl Match {
    /// Wrap an initial state and compute its supply and visibility.
    #[must_use]
    pub fn new(grid: HexGrid, rules: RulesConfig, mut state: MatchState) -> Self {
        refresh_supply(&mut state, &grid);
        refresh_visibility(&mut state, &grid);
        Self {
            grid,
            rules,
            state,
            buffered: Vec::new(),
        }
    }

    /// The map.
    #[must_use]
    pub fn grid(&self) -> &HexGrid {
        &self.grid
    }

    /// The rules in force.
    #[must_use]
    pub fn rules(&self) -> &RulesConfig {
        &self.rules
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Mutable access to the state, for scenario scripting and tests.
    pub fn state_mut(&mut self) -> &mut MatchState {
        &mut self.state
    }

    /// Last completed tick.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.state.tick
    }

    /// Whether the match has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.status == GameStatus::Finished
    }

    /// Orders waiting for a later tick.
    #[must_use]
    pub fn buffered(&self) -> &[OrderEnvelope] {
        &self.buffered
    }

    /// Calculate a hash of the complete state.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        self.state.state_hash()
    }

    /// Run the next tick with a batch of submitted orders.
    ///
    /// Orders for later ticks, up to `max_order_lead` ahead, are buffered
    /// and offered again when their tick comes. A finished match does not
    /// advance.
    pub fn tick(&mut self, batch: Vec<OrderEnvelope>) -> TickOutcome {
        if self.is_finished() {
            return self.idle_outcome();
        }
        let tick = self.state.tick + 1;
        self.begin_tick();

        let mut orders = std::mem::take(&mut self.buffered);
        orders.extend(batch);
        let report = validate_batch(&mut self.state, &self.grid, &self.rules, tick, orders);
        self.buffered = report.deferred;

        let mut events: Vec<GameEvent> = report
            .rejected
            .iter()
            .map(|(envelope, code)| GameEvent::OrderRejected {
                hex: order_hex(&self.state, &envelope.order),
                player: envelope.player,
                seq: envelope.seq,
                code: *code,
            })
            .collect();

        self.run_phases(tick, report.accepted, &mut events)
    }

    /// Run the next tick from orders that were accepted when the match was
    /// recorded, skipping validation.
    pub fn replay_tick(&mut self, accepted: &[OrderEnvelope]) -> TickOutcome {
        if self.is_finished() {
            return self.idle_outcome();
        }
        let tick = self.state.tick + 1;
        self.begin_tick();
        for envelope in accepted {
            apply_order_effects(&mut self.state, envelope);
        }
        let mut events = Vec::new();
        self.run_phases(tick, accepted.to_vec(), &mut events)
    }

    fn idle_outcome(&self) -> TickOutcome {
        TickOutcome {
            tick: self.state.tick,
            hash: self.state_hash(),
            ..TickOutcome::default()
        }
    }

    fn begin_tick(&mut self) {
        let starved_percent = self.rules.starved_mp_percent;
        for unit in self.state.units.values_mut() {
            unit.mp = unit.refreshed_mp(starved_percent);
            unit.status.set(UnitStatus::DISRUPTED, false);
        }
    }

    fn run_phases(
        &mut self,
        tick: u64,
        accepted: Vec<OrderEnvelope>,
        events: &mut Vec<GameEvent>,
    ) -> TickOutcome {
        let moves = self.collect_moves(&accepted);

        let mut movement = resolve_movement(&mut self.state, &self.grid, &self.rules, &moves);
        for unit in self.state.units.values_mut() {
            if unit.rally_target == Some(unit.position) {
                unit.rally_target = None;
            }
        }

        let combat = resolve_combat(&mut self.state, &self.grid, &self.rules, tick, &mut movement);
        events.extend(combat.events);

        events.extend(update_control(&mut self.state, &self.grid, &self.rules));
        events.extend(resolve_chiefs(&mut self.state, &self.grid, &combat.fallen, tick));
        events.extend(check_victory(&mut self.state, &self.rules, tick));

        if self.state.status == GameStatus::Active {
            events.extend(run_production(
                &mut self.state,
                &self.grid,
                &self.rules,
                tick,
                &combat.fought,
            ));
        }

        refresh_supply(&mut self.state, &self.grid);
        let newly_visible = refresh_visibility(&mut self.state, &self.grid);
        self.state.tick = tick;

        let hash = self.state_hash();
        #[cfg(debug_assertions)]
        {
            debug!(tick, state_hash = hash, "Match state hash");
        }
        debug!(
            tick,
            orders = accepted.len(),
            events = events.len(),
            units = self.state.units.len(),
            "Tick complete"
        );

        TickOutcome {
            tick,
            events: std::mem::take(events),
            accepted,
            newly_visible,
            hash,
        }
    }

    /// Apply disbands and build this tick's move set.
    ///
    /// Validation admits one order per unit. Explicit orders cancel a
    /// standing rally move; units with a rally target and no order keep
    /// heading there.
    fn collect_moves(&mut self, accepted: &[OrderEnvelope]) -> BTreeMap<UnitId, Hex> {
        let mut moves = BTreeMap::new();
        for envelope in accepted {
            match envelope.order {
                Order::Disband { unit } => {
                    if self.state.units.remove(&unit).is_some() {
                        debug!(unit = %unit, player = %envelope.player, "Unit disbanded");
                    }
                    moves.remove(&unit);
                }
                Order::Move { unit, dest } => {
                    if let Some(u) = self.state.units.get_mut(&unit) {
                        u.rally_target = None;
                        moves.insert(unit, dest);
                    }
                }
                Order::Produce { .. } | Order::SetRally { .. } => {}
            }
        }

        for unit in self.state.units.values_mut() {
            match unit.rally_target {
                Some(target) if target == unit.position => unit.rally_target = None,
                Some(target) => {
                    moves.entry(unit.id).or_insert(target);
                }
                None => {}
            }
        }
        moves
    }

    /// What `player` is allowed to see after a tick.
    #[must_use]
    pub fn player_view(&self, player: PlayerId, outcome: &TickOutcome) -> Snapshot {
        snapshot(&self.state, &self.grid, Perspective::Player(player), &outcome.events)
    }

    /// Read-only view for spectator tooling. Uses the fog of `perspective`
    /// unless it is [`Perspective::Full`].
    #[must_use]
    pub fn spectator_view(&self, perspective: Perspective, outcome: &TickOutcome) -> Snapshot {
        snapshot(&self.state, &self.grid, perspective, &outcome.events)
    }

    /// Serialize the whole match to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if bincode encoding fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| GameError::InvalidState(format!("Serialization failed: {e}")))
    }

    /// Restore a match from bytes produced by [`Match::serialize`].
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes do not decode.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| GameError::InvalidState(format!("Deserialization failed: {e}")))
    }
}
