//! Unit kinds, stats and per-unit state.
//!
//! Stats are a closed table keyed by [`UnitKind`]; the kind set is fixed by
//! the wire protocol.

use serde::{Deserialize, Serialize};

use crate::economy::Resources;
use crate::hex::Hex;
use crate::ids::{PlayerId, UnitId};
use crate::math::{fixed_serde, percent, Fixed};

/// The six unit kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitKind {
    /// Cheap line infantry.
    LightInfantry,
    /// Fast, fragile, long sight.
    Scout,
    /// Heavy tanks. Burns fuel.
    Armored,
    /// Motorized infantry. Burns fuel.
    Mechanized,
    /// Hard-hitting elite infantry, paid in intel.
    SpecialForces,
    /// The player's commander. Losing it loses the match.
    Chief,
}

impl UnitKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::LightInfantry,
        Self::Scout,
        Self::Armored,
        Self::Mechanized,
        Self::SpecialForces,
        Self::Chief,
    ];

    /// Static stats for this kind.
    #[must_use]
    pub const fn stats(self) -> UnitStats {
        match self {
            Self::LightInfantry => UnitStats {
                max_hp: 60,
                attack: 10,
                defense: 6,
                movement: 2,
                vision: 2,
                cost: Resources::new(50, 0, 0),
                build_ticks: 3,
                fuel_upkeep: 0,
            },
            Self::Scout => UnitStats {
                max_hp: 40,
                attack: 6,
                defense: 4,
                movement: 3,
                vision: 4,
                cost: Resources::new(30, 10, 0),
                build_ticks: 2,
                fuel_upkeep: 0,
            },
            Self::Armored => UnitStats {
                max_hp: 120,
                attack: 20,
                defense: 16,
                movement: 2,
                vision: 2,
                cost: Resources::new(150, 50, 0),
                build_ticks: 6,
                fuel_upkeep: 5,
            },
            Self::Mechanized => UnitStats {
                max_hp: 90,
                attack: 14,
                defense: 10,
                movement: 3,
                vision: 2,
                cost: Resources::new(100, 40, 0),
                build_ticks: 4,
                fuel_upkeep: 3,
            },
            Self::SpecialForces => UnitStats {
                max_hp: 50,
                attack: 14,
                defense: 6,
                movement: 2,
                vision: 3,
                cost: Resources::new(80, 0, 40),
                build_ticks: 5,
                fuel_upkeep: 0,
            },
            Self::Chief => UnitStats {
                max_hp: 150,
                attack: 12,
                defense: 12,
                movement: 2,
                vision: 2,
                cost: Resources::ZERO,
                build_ticks: 0,
                fuel_upkeep: 0,
            },
        }
    }

    /// Whether facilities can build this kind.
    #[must_use]
    pub const fn is_producible(self) -> bool {
        !matches!(self, Self::Chief)
    }

    /// Whether this kind pays fuel upkeep.
    #[must_use]
    pub const fn has_upkeep(self) -> bool {
        self.stats().fuel_upkeep > 0
    }
}

/// Static stats of a unit kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnitStats {
    /// Maximum HP.
    pub max_hp: i32,
    /// Base attack.
    pub attack: i32,
    /// Base defence.
    pub defense: i32,
    /// Movement points per tick.
    pub movement: u32,
    /// Vision radius in hexes.
    pub vision: u32,
    /// Upfront build cost.
    pub cost: Resources,
    /// Ticks a build occupies its slot.
    pub build_ticks: u32,
    /// Fuel charged per upkeep cycle.
    pub fuel_upkeep: i64,
}

/// Status flags carried by a unit.
///
/// ```
/// use battle_core::units::UnitStatus;
///
/// let status = UnitStatus::STARVED.union(UnitStatus::DISRUPTED);
/// assert!(status.contains(UnitStatus::STARVED));
/// assert!(!status.contains(UnitStatus::OUT_OF_SUPPLY));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UnitStatus(u8);

impl UnitStatus {
    /// Missed fuel upkeep: MP scaled down until upkeep is next paid.
    pub const STARVED: Self = Self(1 << 0);
    /// Bounced or collided last tick: -1 MP this tick.
    pub const DISRUPTED: Self = Self(1 << 1);
    /// Standing outside the owner's supply network.
    pub const OUT_OF_SUPPLY: Self = Self(1 << 2);

    /// No flags.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Check if all flags in `other` are set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Union of flags.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Set or clear `flag`.
    pub fn set(&mut self, flag: Self, on: bool) {
        if on {
            self.0 |= flag.0;
        } else {
            self.0 &= !flag.0;
        }
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// A living unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Identifier.
    pub id: UnitId,
    /// Owning player; `None` once neutralized.
    pub owner: Option<PlayerId>,
    /// Kind.
    pub kind: UnitKind,
    /// Current position.
    pub position: Hex,
    /// Current HP.
    #[serde(with = "fixed_serde")]
    pub hp: Fixed,
    /// Maximum HP.
    #[serde(with = "fixed_serde")]
    pub max_hp: Fixed,
    /// Movement points left this tick.
    pub mp: u32,
    /// Vision radius.
    pub vision: u32,
    /// Status flags.
    pub status: UnitStatus,
    /// Ticks accumulated toward the next repair pulse.
    pub repair_counter: u32,
    /// Standing move target inherited from a facility rally point.
    pub rally_target: Option<Hex>,
}

impl Unit {
    /// A fresh unit at full HP and MP.
    #[must_use]
    pub fn new(id: UnitId, owner: Option<PlayerId>, kind: UnitKind, position: Hex) -> Self {
        let stats = kind.stats();
        Self {
            id,
            owner,
            kind,
            position,
            hp: Fixed::from_num(stats.max_hp),
            max_hp: Fixed::from_num(stats.max_hp),
            mp: stats.movement,
            vision: stats.vision,
            status: UnitStatus::empty(),
            repair_counter: 0,
            rally_target: None,
        }
    }

    /// Alive while HP is above zero.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.hp > Fixed::ZERO
    }

    /// Whether this unit is a Chief.
    #[must_use]
    pub fn is_chief(&self) -> bool {
        self.kind == UnitKind::Chief
    }

    /// Movement points for the coming tick.
    ///
    /// Starved scales base MP by `starved_percent` (rounded down), then
    /// Disrupted takes one more. Never below 1.
    #[must_use]
    pub fn refreshed_mp(&self, starved_percent: i32) -> u32 {
        let mut mp = Fixed::from_num(self.kind.stats().movement);
        if self.status.contains(UnitStatus::STARVED) {
            mp *= percent(starved_percent);
        }
        let mut mp = mp.to_num::<u32>();
        if self.status.contains(UnitStatus::DISRUPTED) {
            mp = mp.saturating_sub(1);
        }
        mp.max(1)
    }
}
