//! Keyed deterministic randomness.
//!
//! There is no RNG state anywhere in a match. Every draw is a pure function
//! of `(seed, tick, hex, engagement)`, so engagements may resolve in any
//! order or on any thread and still produce the same numbers.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::hex::Hex;
use crate::math::{ratio, Fixed};

/// Lower bound of the combat variance factor, in per-ten-thousand.
const VARIANCE_MIN: i64 = 9_500;
/// Width of the combat variance range, in per-ten-thousand.
const VARIANCE_SPAN: u32 = 1_000;

/// SplitMix64 finalizer.
const fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Fold the draw coordinates into one 64-bit key.
#[must_use]
pub fn stream_key(seed: u64, tick: u64, hex: Hex, engagement: u32) -> u64 {
    let mut key = mix(seed);
    key = mix(key ^ tick);
    key = mix(key ^ u64::from(hex.q as u32));
    key = mix(key ^ u64::from(hex.r as u32));
    mix(key ^ u64::from(engagement))
}

/// A generator positioned at the start of the stream for these coordinates.
#[must_use]
pub fn stream(seed: u64, tick: u64, hex: Hex, engagement: u32) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(stream_key(seed, tick, hex, engagement))
}

/// Combat variance factor `R` in `[0.95, 1.05]`.
///
/// ```
/// use battle_core::hex::Hex;
/// use battle_core::rng::variance;
///
/// let a = variance(7, 3, Hex::new(1, -1), 0);
/// let b = variance(7, 3, Hex::new(1, -1), 0);
/// assert_eq!(a, b);
/// ```
#[must_use]
pub fn variance(seed: u64, tick: u64, hex: Hex, engagement: u32) -> Fixed {
    let roll = stream(seed, tick, hex, engagement).gen_range(0..=VARIANCE_SPAN);
    ratio(VARIANCE_MIN + i64::from(roll), 10_000)
}
