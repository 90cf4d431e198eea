//! Test fixtures and helpers.
//!
//! Pre-built matches and order envelopes for consistent testing.

use battle_core::prelude::*;
use fixed::types::I32F32;
use tracing::debug;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// The standard two-player match.
///
/// # Panics
///
/// Panics if the built-in duel setup no longer validates.
#[must_use]
pub fn duel_match(seed: u64) -> Match {
    match MatchSetup::duel(seed).build() {
        Ok(game) => game,
        Err(e) => panic!("duel setup must build: {e}"),
    }
}

/// An empty board of the given radius with default rules.
#[must_use]
pub fn open_setup(radius: u32, seed: u64) -> MatchSetup {
    MatchSetup::new(HexGrid::centered(radius), RulesConfig::default(), seed)
}

/// The first unit of `kind` owned by `player`, in id order.
#[must_use]
pub fn unit_of(game: &Match, player: PlayerId, kind: UnitKind) -> Option<UnitId> {
    game.state()
        .units
        .values()
        .find(|u| u.owner == Some(player) && u.kind == kind)
        .map(|u| u.id)
}

/// The facility standing on `hex`.
#[must_use]
pub fn facility_on(game: &Match, hex: Hex) -> Option<FacilityId> {
    game.state().facility_at(hex).map(|f| f.id)
}

/// Wrap an order for the tick that runs next.
#[must_use]
pub fn envelope(game: &Match, player: PlayerId, seq: u64, order: Order) -> OrderEnvelope {
    OrderEnvelope {
        player,
        target_tick: game.current_tick() + 1,
        seq,
        order,
    }
}

/// A move order for the next tick.
#[must_use]
pub fn move_order(game: &Match, player: PlayerId, unit: UnitId, dest: Hex) -> OrderEnvelope {
    envelope(game, player, 0, Order::Move { unit, dest })
}

/// A produce order for the next tick.
#[must_use]
pub fn produce_order(
    game: &Match,
    player: PlayerId,
    facility: FacilityId,
    kind: UnitKind,
) -> OrderEnvelope {
    envelope(game, player, 0, Order::Produce { facility, kind })
}

/// Run `ticks` empty ticks and return every event they produced.
pub fn idle(game: &mut Match, ticks: u64) -> Vec<GameEvent> {
    let mut events = Vec::new();
    for _ in 0..ticks {
        events.extend(game.tick(Vec::new()).events);
    }
    debug!(tick = game.current_tick(), events = events.len(), "Idled match");
    events
}
