//! Axial hex coordinates.
//!
//! Hexes are addressed by `(q, r)` with the implicit cube coordinate
//! `s = -q - r`. [`Hex`] is `Ord` so it can key `BTreeMap`s and give every
//! per-hex loop a stable iteration order.

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

use crate::math::Fixed;

/// A hex position in axial coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Hex {
    /// Column.
    pub q: i32,
    /// Row.
    pub r: i32,
}

/// The six neighbour offsets, starting East and turning counter-clockwise.
pub const HEX_DIRECTIONS: [Hex; 6] = [
    Hex::new(1, 0),
    Hex::new(1, -1),
    Hex::new(0, -1),
    Hex::new(-1, 0),
    Hex::new(-1, 1),
    Hex::new(0, 1),
];

impl Hex {
    /// The origin hex.
    pub const ORIGIN: Self = Self::new(0, 0);

    /// Create a hex from axial coordinates.
    #[must_use]
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// Implicit third cube coordinate.
    #[must_use]
    pub const fn s(self) -> i32 {
        -self.q - self.r
    }

    /// Distance from the origin in hex steps.
    #[must_use]
    pub const fn length(self) -> u32 {
        (self.q.unsigned_abs() + self.r.unsigned_abs() + self.s().unsigned_abs()) / 2
    }

    /// Distance to `other` in hex steps.
    ///
    /// ```
    /// use battle_core::hex::Hex;
    ///
    /// assert_eq!(Hex::new(0, 0).distance(Hex::new(2, -1)), 2);
    /// ```
    #[must_use]
    pub fn distance(self, other: Self) -> u32 {
        (self - other).length()
    }

    /// Scale by an integer factor.
    #[must_use]
    pub const fn scale(self, k: i32) -> Self {
        Self::new(self.q * k, self.r * k)
    }

    /// The six adjacent hexes in [`HEX_DIRECTIONS`] order.
    #[must_use]
    pub fn neighbors(self) -> [Self; 6] {
        HEX_DIRECTIONS.map(|d| self + d)
    }

    /// Whether `other` is one step away.
    #[must_use]
    pub fn is_adjacent(self, other: Self) -> bool {
        self.distance(other) == 1
    }

    /// All hexes within `radius` of `self`, including `self`.
    ///
    /// Iteration is column-major and therefore deterministic.
    pub fn spiral(self, radius: u32) -> impl Iterator<Item = Self> {
        let radius = radius as i32;
        (-radius..=radius).flat_map(move |dq| {
            let r1 = (-radius).max(-dq - radius);
            let r2 = radius.min(-dq + radius);
            (r1..=r2).map(move |dr| self + Self::new(dq, dr))
        })
    }

    /// Hexes at exactly `radius` from `self`.
    #[must_use]
    pub fn ring(self, radius: u32) -> Vec<Self> {
        if radius == 0 {
            return vec![self];
        }
        let mut result = Vec::with_capacity(6 * radius as usize);
        let mut current = self + HEX_DIRECTIONS[4].scale(radius as i32);
        for direction in HEX_DIRECTIONS {
            for _ in 0..radius {
                result.push(current);
                current = current + direction;
            }
        }
        result
    }

    /// Hexes on the straight line from `self` to `end`, both ends included.
    ///
    /// Interpolates in cube space with fixed-point math. The sample points
    /// are nudged off hex edges so results never depend on tie rounding.
    #[must_use]
    pub fn line_to(self, end: Self) -> Vec<Self> {
        let n = self.distance(end);
        if n == 0 {
            return vec![self];
        }

        // 1e-6 in cube space, split so the nudge still sums to zero.
        let eps = Fixed::from_bits(4295);
        let (aq, ar, as_) = (
            Fixed::from_num(self.q) + eps,
            Fixed::from_num(self.r) + eps,
            Fixed::from_num(self.s()) - eps - eps,
        );
        let (bq, br, bs) = (
            Fixed::from_num(end.q) + eps,
            Fixed::from_num(end.r) + eps,
            Fixed::from_num(end.s()) - eps - eps,
        );

        (0..=n)
            .map(|i| {
                let t = Fixed::from_num(i) / Fixed::from_num(n);
                cube_round(
                    aq + (bq - aq) * t,
                    ar + (br - ar) * t,
                    as_ + (bs - as_) * t,
                )
            })
            .collect()
    }
}

/// Round fractional cube coordinates to the containing hex.
fn cube_round(fq: Fixed, fr: Fixed, fs: Fixed) -> Hex {
    let mut q = fq.round();
    let mut r = fr.round();
    let s = fs.round();

    let q_diff = (q - fq).abs();
    let r_diff = (r - fr).abs();
    let s_diff = (s - fs).abs();

    if q_diff > r_diff && q_diff > s_diff {
        q = -r - s;
    } else if r_diff > s_diff {
        r = -q - s;
    }

    Hex::new(q.to_num(), r.to_num())
}

impl Add for Hex {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.q + rhs.q, self.r + rhs.r)
    }
}

impl Sub for Hex {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.q - rhs.q, self.r - rhs.r)
    }
}

impl fmt::Display for Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.q, self.r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_formula() {
        let a = Hex::new(0, 0);
        assert_eq!(a.distance(Hex::new(3, -3)), 3);
        assert_eq!(a.distance(Hex::new(-2, 5)), 5);
        assert_eq!(Hex::new(1, 1).distance(Hex::new(1, 1)), 0);
    }

    #[test]
    fn test_neighbors_are_adjacent() {
        let center = Hex::new(2, -1);
        for n in center.neighbors() {
            assert!(center.is_adjacent(n));
        }
    }

    #[test]
    fn test_spiral_counts() {
        assert_eq!(Hex::ORIGIN.spiral(0).count(), 1);
        assert_eq!(Hex::ORIGIN.spiral(1).count(), 7);
        assert_eq!(Hex::ORIGIN.spiral(2).count(), 19);
        assert!(Hex::ORIGIN.spiral(2).all(|h| h.length() <= 2));
    }

    #[test]
    fn test_ring_is_exact_distance() {
        let ring = Hex::new(1, 1).ring(2);
        assert_eq!(ring.len(), 12);
        assert!(ring.iter().all(|h| h.distance(Hex::new(1, 1)) == 2));
    }

    #[test]
    fn test_line_is_contiguous() {
        let start = Hex::new(-2, 0);
        let end = Hex::new(3, -1);
        let line = start.line_to(end);
        assert_eq!(line.len(), start.distance(end) as usize + 1);
        assert_eq!(line.first(), Some(&start));
        assert_eq!(line.last(), Some(&end));
        for pair in line.windows(2) {
            assert!(pair[0].is_adjacent(pair[1]));
        }
    }

    #[test]
    fn test_line_along_axis() {
        let line = Hex::ORIGIN.line_to(Hex::new(3, 0));
        assert_eq!(
            line,
            vec![Hex::new(0, 0), Hex::new(1, 0), Hex::new(2, 0), Hex::new(3, 0)]
        );
    }
}
