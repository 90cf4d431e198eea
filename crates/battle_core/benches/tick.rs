//! Tick benchmarks for battle_core.
//!
//! Run with: `cargo bench -p battle_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use battle_core::prelude::*;
use battle_test_utils::fixtures::{duel_match, move_order, unit_of};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

/// Both sides send everything but their Chief toward the centre.
fn clash_batch(game: &Match) -> Vec<OrderEnvelope> {
    let mut batch = Vec::new();
    for (player, dest) in [(PlayerId(0), Hex::new(-1, 0)), (PlayerId(1), Hex::new(1, 0))] {
        for (seq, unit) in game
            .state()
            .units
            .values()
            .filter(|u| u.owner == Some(player) && !u.is_chief())
            .enumerate()
        {
            let mut env = move_order(game, player, unit.id, dest);
            env.seq = seq as u64;
            batch.push(env);
        }
    }
    batch
}

pub fn tick_benchmark(c: &mut Criterion) {
    c.bench_function("idle_duel_tick", |b| {
        b.iter_batched(
            || duel_match(1),
            |mut game| black_box(game.tick(Vec::new()).hash),
            BatchSize::SmallInput,
        );
    });

    c.bench_function("clash_duel_20_ticks", |b| {
        b.iter_batched(
            || {
                let game = duel_match(1);
                let batch = clash_batch(&game);
                (game, batch)
            },
            |(mut game, batch)| {
                game.tick(batch);
                for _ in 0..19 {
                    game.tick(Vec::new());
                }
                black_box(game.state_hash())
            },
            BatchSize::SmallInput,
        );
    });

    c.bench_function("scout_pathing_order", |b| {
        b.iter_batched(
            || {
                let game = duel_match(2);
                let scout = unit_of(&game, PlayerId(0), UnitKind::Scout);
                (game, scout)
            },
            |(mut game, scout)| {
                let batch = scout
                    .map(|unit| vec![move_order(&game, PlayerId(0), unit, Hex::new(5, -2))])
                    .unwrap_or_default();
                black_box(game.tick(batch).hash)
            },
            BatchSize::SmallInput,
        );
    });

    c.bench_function("state_hash", |b| {
        let game = duel_match(3);
        b.iter(|| black_box(game.state_hash()));
    });
}

criterion_group!(benches, tick_benchmark);
criterion_main!(benches);
