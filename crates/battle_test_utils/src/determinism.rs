//! Determinism testing utilities.
//!
//! Provides a harness for verifying that a match produces identical
//! results given identical inputs.
//!
//! # Testing Strategy
//!
//! The server is authoritative and replays must rebuild any prior state,
//! so every tick has to be a pure function of state and accepted orders.
//! Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`battle_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   State lives in ordered maps and phases walk ids in order.
//!
//! - **Thread scheduling**: Combat and visibility run on rayon. Results
//!   are committed in a fixed order no matter which worker finished first.
//!
//! - **System randomness**: Combat variance is keyed by seed, tick and
//!   engagement, never drawn from host entropy.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual phase determinism (movement, combat, etc.)
//! 2. **Property tests**: Random order batches must still produce deterministic outputs
//! 3. **Integration tests**: Full matches are reproducible and replayable
//! 4. **Parallel tests**: Running N matches in parallel all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use battle_core::order::OrderEnvelope;
use battle_core::simulation::Match;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic match).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the runs were deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Match is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Result of parallel match runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each match.
    pub hashes: Vec<u64>,
    /// Number of ticks each match ran.
    pub ticks: u64,
    /// Number of matches run.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all matches produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all matches agreed.
    ///
    /// # Panics
    ///
    /// Panics if matches produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel matches diverged!\n\
                 Matches: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_sims,
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a state machine multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `ticks` - Number of ticks per run
/// * `setup` - Function to create initial state
/// * `step` - Function to advance by one tick
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```ignore
/// use battle_test_utils::determinism::verify_determinism;
/// use battle_test_utils::fixtures::duel_match;
///
/// let result = verify_determinism(
///     5,   // Run 5 times
///     100, // 100 ticks each
///     || duel_match(7),
///     |game| { game.tick(Vec::new()); },
///     |game| game.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Feed the same scripted order batches to a fresh match and return the
/// final hash.
///
/// `script[i]` is the batch for tick `i + 1`; envelopes are retargeted at
/// that tick so scripts can be written without tick bookkeeping. Ticks
/// past the end of the script run with no orders.
pub fn run_scripted(game: &mut Match, script: &[Vec<OrderEnvelope>], ticks: u64) -> u64 {
    for i in 0..ticks {
        let tick = game.current_tick() + 1;
        let batch = script
            .get(i as usize)
            .map(|b| {
                b.iter()
                    .map(|env| OrderEnvelope {
                        target_tick: tick,
                        ..*env
                    })
                    .collect()
            })
            .unwrap_or_default();
        game.tick(batch);
    }
    game.state_hash()
}

/// Simplified determinism verification for [`Match`].
///
/// Runs the match twice with identical setup and no orders and verifies
/// the final state hashes match exactly.
///
/// # Returns
///
/// `true` if both runs produced identical state hashes.
pub fn verify_match_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Match,
{
    let result = verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |game| {
            game.tick(Vec::new());
        },
        |game| game.state_hash(),
    );
    result.is_deterministic
}

/// Run N matches on scoped threads and collect final hashes.
///
/// This is useful for catching non-determinism that only manifests
/// under thread scheduling variations, memory layout differences, etc.
/// Every match runs the same order script.
///
/// # Example
///
/// ```ignore
/// use battle_test_utils::determinism::run_parallel_matches;
/// use battle_test_utils::fixtures::duel_match;
///
/// let result = run_parallel_matches(|| duel_match(3), &[], 8, 200);
/// result.assert_deterministic();
/// ```
pub fn run_parallel_matches<F>(
    setup_fn: F,
    script: &[Vec<OrderEnvelope>],
    num_sims: usize,
    num_ticks: u64,
) -> ParallelSimResult
where
    F: Fn() -> Match + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut game = setup_fn();
                    run_scripted(&mut game, script, num_ticks)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(hash) => hash,
                Err(_) => panic!("match thread panicked"),
            })
            .collect()
    });

    ParallelSimResult {
        hashes,
        ticks: num_ticks,
        num_sims,
    }
}

/// Compare two match runs tick-by-tick, finding first divergence.
///
/// Useful for debugging non-determinism by finding exactly when
/// matches start to differ.
///
/// # Returns
///
/// `None` if the runs agree, `Some(tick)` if they diverge at that tick.
pub fn find_first_divergence<F>(
    setup_fn: F,
    script: &[Vec<OrderEnvelope>],
    num_ticks: u64,
) -> Option<u64>
where
    F: Fn() -> Match,
{
    let mut first = setup_fn();
    let mut second = setup_fn();

    if first.state_hash() != second.state_hash() {
        return Some(0);
    }

    for i in 0..num_ticks {
        let step = script.get(i as usize).map_or(&[][..], Vec::as_slice);
        let a = run_scripted(&mut first, &[step.to_vec()], 1);
        let b = run_scripted(&mut second, &[step.to_vec()], 1);

        if a != b {
            return Some(first.current_tick());
        }
    }

    None
}

/// Verify that a serialization round-trip preserves the match exactly,
/// and that the restored match keeps evolving identically.
///
/// This is what replay logs and match persistence rely on.
pub fn verify_serialization_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Match,
{
    let mut game = setup_fn();

    for _ in 0..num_ticks {
        game.tick(Vec::new());
    }

    let hash_before = game.state_hash();

    let bytes = match game.serialize() {
        Ok(b) => b,
        Err(_) => return false,
    };

    let mut restored = match Match::deserialize(&bytes) {
        Ok(s) => s,
        Err(_) => return false,
    };

    if restored.state_hash() != hash_before {
        return false;
    }

    let continued = game.tick(Vec::new()).hash;
    restored.tick(Vec::new()).hash == continued
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for determinism testing.
///
/// These strategies generate random but reproducible orders for
/// property-based testing. Ids and hexes are drawn from ranges that cover
/// the duel map plus a margin, so a share of every batch is deliberately
/// invalid and exercises rejection paths.
pub mod strategies {
    use battle_core::hex::Hex;
    use battle_core::ids::{FacilityId, PlayerId, UnitId};
    use battle_core::order::{Order, OrderEnvelope};
    use battle_core::units::UnitKind;
    use proptest::prelude::*;

    /// Generate a hex within `radius` of the origin (axial bounding box).
    pub fn arb_hex(radius: i32) -> impl Strategy<Value = Hex> {
        (-radius..=radius, -radius..=radius).prop_map(|(q, r)| Hex::new(q, r))
    }

    /// Generate a unit id, including ids that do not exist yet.
    pub fn arb_unit_id() -> impl Strategy<Value = UnitId> {
        (0u32..24).prop_map(UnitId)
    }

    /// Generate a facility id.
    pub fn arb_facility_id() -> impl Strategy<Value = FacilityId> {
        (0u32..4).prop_map(FacilityId)
    }

    /// Generate any unit kind, including ones that cannot be built.
    pub fn arb_unit_kind() -> impl Strategy<Value = UnitKind> {
        proptest::sample::select(UnitKind::ALL.to_vec())
    }

    /// Generate a player in a two-player match.
    pub fn arb_player() -> impl Strategy<Value = PlayerId> {
        (0u8..2).prop_map(PlayerId)
    }

    /// Generate a Move order.
    pub fn arb_move_order() -> impl Strategy<Value = Order> {
        (arb_unit_id(), arb_hex(7)).prop_map(|(unit, dest)| Order::Move { unit, dest })
    }

    /// Generate any order, weighted toward movement.
    pub fn arb_order() -> impl Strategy<Value = Order> {
        prop_oneof![
            4 => arb_move_order(),
            2 => (arb_facility_id(), arb_unit_kind())
                .prop_map(|(facility, kind)| Order::Produce { facility, kind }),
            1 => arb_unit_id().prop_map(|unit| Order::Disband { unit }),
            1 => (arb_facility_id(), arb_hex(7))
                .prop_map(|(facility, hex)| Order::SetRally { facility, hex }),
        ]
    }

    /// Generate one tick's batch. Targets are left at 0; the scripted
    /// runner retargets them.
    pub fn arb_order_batch(max_len: usize) -> impl Strategy<Value = Vec<OrderEnvelope>> {
        proptest::collection::vec((arb_player(), arb_order()), 0..max_len).prop_map(|orders| {
            orders
                .into_iter()
                .enumerate()
                .map(|(seq, (player, order))| OrderEnvelope {
                    player,
                    target_tick: 0,
                    seq: seq as u64,
                    order,
                })
                .collect()
        })
    }

    /// Generate a script of per-tick batches.
    pub fn arb_order_script(
        max_ticks: usize,
        max_batch: usize,
    ) -> impl Strategy<Value = Vec<Vec<OrderEnvelope>>> {
        proptest::collection::vec(arb_order_batch(max_batch), 1..max_ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{duel_match, move_order, unit_of};
    use battle_core::hex::Hex;
    use battle_core::ids::PlayerId;
    use battle_core::units::UnitKind;
    use proptest::prelude::*;

    /// Both sides march their forces into the middle of the map.
    fn clash_script() -> Vec<Vec<OrderEnvelope>> {
        let game = duel_match(11);
        let mut batch = Vec::new();
        for (player, dest) in [(PlayerId(0), Hex::new(-1, 0)), (PlayerId(1), Hex::new(1, 0))] {
            for (seq, unit) in game
                .state()
                .units
                .values()
                .filter(|u| u.owner == Some(player) && u.kind != UnitKind::Chief)
                .enumerate()
            {
                let mut env = move_order(&game, player, unit.id, dest);
                env.seq = seq as u64;
                batch.push(env);
            }
        }
        vec![batch]
    }

    // =========================================================================
    // Basic determinism tests
    // =========================================================================

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);

        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
    }

    #[test]
    fn test_detects_nondeterminism() {
        use std::cell::Cell;
        let counter = Cell::new(0u64);
        let result = verify_determinism(
            2,
            1,
            || {
                counter.set(counter.get() + 1);
                counter.get()
            },
            |_| {},
            |n| *n,
        );
        assert!(!result.is_deterministic);
        assert_eq!(result.unique_hashes().len(), 2);
    }

    #[test]
    fn test_idle_duel_determinism() {
        assert!(verify_match_determinism(|| duel_match(5), 60));
    }

    #[test]
    fn test_scripted_clash_determinism() {
        let script = clash_script();
        let result = verify_determinism(
            3,
            1,
            || duel_match(11),
            |game| {
                run_scripted(game, &script, 40);
            },
            |game| game.state_hash(),
        );
        result.assert_deterministic();
    }

    #[test]
    fn test_scripted_orders_change_outcome() {
        let mut idle = duel_match(11);
        let mut busy = duel_match(11);
        let idle_hash = run_scripted(&mut idle, &[], 10);
        let busy_hash = run_scripted(&mut busy, &clash_script(), 10);
        assert_ne!(idle_hash, busy_hash);
    }

    #[test]
    fn test_no_divergence_between_identical_runs() {
        assert_eq!(find_first_divergence(|| duel_match(2), &clash_script(), 30), None);
    }

    #[test]
    fn test_divergence_found_at_tick_zero_for_different_seeds() {
        use std::cell::Cell;
        let seed = Cell::new(0u64);
        let setup = || {
            seed.set(seed.get() + 1);
            duel_match(seed.get())
        };
        assert_eq!(find_first_divergence(setup, &[], 5), Some(0));
    }

    #[test]
    fn test_serialization_preserves_match() {
        assert!(verify_serialization_determinism(|| duel_match(9), 25));
    }

    #[test]
    fn test_move_script_reaches_destination() {
        let mut game = duel_match(4);
        let scout = unit_of(&game, PlayerId(0), UnitKind::Scout).unwrap();
        let script = vec![vec![move_order(&game, PlayerId(0), scout, Hex::new(-1, 0))]];
        run_scripted(&mut game, &script, 6);
        assert_eq!(game.state().units[&scout].position, Hex::new(-1, 0));
    }

    // =========================================================================
    // Parallel tests
    // =========================================================================

    #[test]
    fn test_parallel_idle_matches() {
        let result = run_parallel_matches(|| duel_match(8), &[], 4, 50);
        result.assert_deterministic();
        assert_eq!(result.hashes.len(), 4);
    }

    #[test]
    fn test_parallel_clash_matches() {
        let script = clash_script();
        let result = run_parallel_matches(|| duel_match(11), &script, 4, 40);
        result.assert_deterministic();
    }

    #[test]
    fn test_compute_hash_stable() {
        assert_eq!(compute_hash(&(1u32, "a")), compute_hash(&(1u32, "a")));
        assert_ne!(compute_hash(&1u32), compute_hash(&2u32));
    }

    // =========================================================================
    // Property-based tests using proptest
    // =========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// Any random order script replays to the same hash.
        ///
        /// This catches iteration-order leaks in validation and arbitration.
        #[test]
        fn prop_random_scripts_are_deterministic(
            seed in 0u64..1000,
            script in strategies::arb_order_script(12, 10),
        ) {
            let result = verify_determinism(
                2,
                1,
                || duel_match(seed),
                |game| { run_scripted(game, &script, 20); },
                |game| game.state_hash(),
            );
            prop_assert!(result.is_deterministic);
        }

        /// Replaying only the accepted orders rebuilds the live match.
        #[test]
        fn prop_accepted_orders_replay(
            seed in 0u64..1000,
            script in strategies::arb_order_script(10, 8),
        ) {
            let mut live = duel_match(seed);
            let mut replayed = duel_match(seed);
            for i in 0..12usize {
                let tick = live.current_tick() + 1;
                let batch: Vec<OrderEnvelope> = script
                    .get(i)
                    .map(|b| b.iter().map(|e| OrderEnvelope { target_tick: tick, ..*e }).collect())
                    .unwrap_or_default();
                let outcome = live.tick(batch);
                let again = replayed.replay_tick(&outcome.accepted);
                prop_assert_eq!(again.hash, outcome.hash);
            }
            prop_assert_eq!(live.state(), replayed.state());
        }

        /// No hex ever holds more units than the stack cap.
        #[test]
        fn prop_stack_cap_holds(
            seed in 0u64..1000,
            script in strategies::arb_order_script(10, 12),
        ) {
            let mut game = duel_match(seed);
            let cap = game.rules().stack_cap;
            for i in 0..15usize {
                let step: Vec<Vec<OrderEnvelope>> = script.get(i).cloned().into_iter().collect();
                run_scripted(&mut game, &step, 1);
                for (hex, units) in game.state().occupancy() {
                    prop_assert!(units.len() <= cap, "hex {:?} holds {}", hex, units.len());
                }
            }
        }
    }
}
