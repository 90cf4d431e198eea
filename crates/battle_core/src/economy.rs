//! Player resource pools.
//!
//! Three resources: Materials, Fuel and Intel. Pools are integer,
//! never negative, and capped; gains above the cap are discarded rather
//! than banked.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three resource kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Used by every unit.
    Materials,
    /// Used by vehicles, and for their upkeep.
    Fuel,
    /// Used by special forces.
    Intel,
}

/// A bundle of resource amounts, used for costs, income and pools alike.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Resources {
    /// Materials amount.
    pub materials: i64,
    /// Fuel amount.
    pub fuel: i64,
    /// Intel amount.
    pub intel: i64,
}

impl Resources {
    /// Nothing.
    pub const ZERO: Self = Self::new(0, 0, 0);

    /// Create a bundle.
    #[must_use]
    pub const fn new(materials: i64, fuel: i64, intel: i64) -> Self {
        Self {
            materials,
            fuel,
            intel,
        }
    }

    /// A bundle holding `amount` of a single kind.
    #[must_use]
    pub const fn single(kind: ResourceKind, amount: i64) -> Self {
        match kind {
            ResourceKind::Materials => Self::new(amount, 0, 0),
            ResourceKind::Fuel => Self::new(0, amount, 0),
            ResourceKind::Intel => Self::new(0, 0, amount),
        }
    }

    /// Amount of one kind.
    #[must_use]
    pub const fn get(&self, kind: ResourceKind) -> i64 {
        match kind {
            ResourceKind::Materials => self.materials,
            ResourceKind::Fuel => self.fuel,
            ResourceKind::Intel => self.intel,
        }
    }

    /// Sum over all kinds.
    #[must_use]
    pub const fn total(&self) -> i64 {
        self.materials + self.fuel + self.intel
    }

    /// Whether every component is `>= 0`.
    #[must_use]
    pub const fn is_non_negative(&self) -> bool {
        self.materials >= 0 && self.fuel >= 0 && self.intel >= 0
    }

    /// Whether every component of `self` covers the matching one in `cost`.
    #[must_use]
    pub const fn covers(&self, cost: &Self) -> bool {
        self.materials >= cost.materials && self.fuel >= cost.fuel && self.intel >= cost.intel
    }
}

impl std::ops::Add for Resources {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(
            self.materials + rhs.materials,
            self.fuel + rhs.fuel,
            self.intel + rhs.intel,
        )
    }
}

impl std::ops::AddAssign for Resources {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}M/{}F/{}I", self.materials, self.fuel, self.intel)
    }
}

/// A player's resource pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerEconomy {
    /// Current stockpile.
    pub stock: Resources,
    /// Per-kind storage ceiling.
    pub cap: i64,
}

impl PlayerEconomy {
    /// Create a pool. The starting stock is clamped to the cap.
    #[must_use]
    pub fn new(stock: Resources, cap: i64) -> Self {
        let mut economy = Self {
            stock: Resources::ZERO,
            cap,
        };
        economy.deposit(stock);
        economy
    }

    /// Deposit resources, discarding overflow above the cap.
    ///
    /// Returns the amount actually stored.
    pub fn deposit(&mut self, amount: Resources) -> Resources {
        let room = |current: i64, gain: i64| gain.max(0).min((self.cap - current).max(0));
        let stored = Resources::new(
            room(self.stock.materials, amount.materials),
            room(self.stock.fuel, amount.fuel),
            room(self.stock.intel, amount.intel),
        );
        self.stock += stored;
        stored
    }

    /// Spend `cost` if the whole bundle is affordable.
    ///
    /// Returns true if the transaction succeeded. Nothing is deducted on
    /// failure.
    pub fn spend(&mut self, cost: &Resources) -> bool {
        if self.can_afford(cost) {
            self.stock.materials -= cost.materials;
            self.stock.fuel -= cost.fuel;
            self.stock.intel -= cost.intel;
            true
        } else {
            false
        }
    }

    /// Check if the pool covers a cost.
    #[must_use]
    pub const fn can_afford(&self, cost: &Resources) -> bool {
        self.stock.covers(cost)
    }

    /// Drop everything. Used when a player is eliminated.
    pub fn clear(&mut self) {
        self.stock = Resources::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deposit_respects_cap() {
        let mut economy = PlayerEconomy::new(Resources::new(90, 0, 0), 100);
        let stored = economy.deposit(Resources::new(25, 10, 0));
        assert_eq!(stored, Resources::new(10, 10, 0));
        assert_eq!(economy.stock, Resources::new(100, 10, 0));
    }

    #[test]
    fn test_starting_stock_clamped() {
        let economy = PlayerEconomy::new(Resources::new(500, 5, 0), 100);
        assert_eq!(economy.stock.materials, 100);
    }

    #[test]
    fn test_spend_is_all_or_nothing() {
        let mut economy = PlayerEconomy::new(Resources::new(100, 10, 0), 1000);
        assert!(!economy.spend(&Resources::new(50, 20, 0)));
        assert_eq!(economy.stock, Resources::new(100, 10, 0));
        assert!(economy.spend(&Resources::new(50, 10, 0)));
        assert_eq!(economy.stock, Resources::new(50, 0, 0));
    }

    #[test]
    fn test_single_and_get() {
        let fuel = Resources::single(ResourceKind::Fuel, 7);
        assert_eq!(fuel.get(ResourceKind::Fuel), 7);
        assert_eq!(fuel.total(), 7);
    }
}
