//! Fixed-point math utilities for deterministic simulation.
//!
//! HP, damage, modifiers and scores are all fixed-point so that every
//! host computes bit-identical ticks. Floating-point operations can
//! produce different results on different CPUs.

use fixed::types::I32F32;

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// `n / d` as a fixed-point ratio.
///
/// # Panics
///
/// Panics if `d` is zero.
#[must_use]
pub fn ratio(n: i64, d: i64) -> Fixed {
    assert!(d != 0, "ratio denominator must be non-zero");
    Fixed::from_num(n) / Fixed::from_num(d)
}

/// A whole percentage as a multiplier (`percent(110)` is `1.10`).
#[must_use]
pub fn percent(p: i32) -> Fixed {
    Fixed::from_num(p) / Fixed::from_num(100)
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for fixed-point values on the wire.
///
/// Bots read HP and damage as plain decimal numbers, so the protocol
/// layer writes an `f64` rendering. Never used for state that feeds
/// back into the simulation.
pub mod fixed_wire {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize as a decimal number.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_num::<f64>().serialize(serializer)
    }

    /// Deserialize from a decimal number.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Ok(Fixed::saturating_from_num(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_determinism() {
        // Same operations must produce identical results
        let a = Fixed::from_num(1) / Fixed::from_num(3);
        let b = Fixed::from_num(1) / Fixed::from_num(3);
        assert_eq!(a, b);

        let result1 = a * Fixed::from_num(7);
        let result2 = b * Fixed::from_num(7);
        assert_eq!(result1, result2);
    }

    #[test]
    fn test_ratio_and_percent() {
        assert_eq!(ratio(1, 2), Fixed::from_num(0.5));
        assert_eq!(percent(125), ratio(5, 4));
        assert_eq!(percent(100), Fixed::ONE);
    }

    #[test]
    fn test_fixed_serde_preserves_bits() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Wrapper(#[serde(with = "fixed_serde")] Fixed);

        let value = ratio(20, 45);
        let bytes = bincode::serialize(&Wrapper(value)).unwrap();
        let back: Wrapper = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.0.to_bits(), value.to_bits());
    }
}
