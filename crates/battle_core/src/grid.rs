//! Static map data: terrain, bounds and resource nodes.
//!
//! Built once at match start and never mutated afterwards. Ownership lives
//! in [`crate::state::ControlRecord`], not here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::economy::ResourceKind;
use crate::hex::Hex;
use crate::math::{percent, Fixed};

/// Terrain kind of a hex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Terrain {
    /// Open ground.
    #[default]
    Plains,
    /// High ground: slower, better defence, better attack, longer sight.
    Hills,
    /// Woods: slower, best defence, blocks line of sight.
    Forest,
    /// Facility terrain.
    City,
    /// Mountains, water. Never entered.
    Impassable,
}

impl Terrain {
    /// MP cost to enter, or `None` if impassable.
    #[must_use]
    pub const fn move_cost(self) -> Option<u32> {
        match self {
            Self::Plains | Self::City => Some(1),
            Self::Hills | Self::Forest => Some(2),
            Self::Impassable => None,
        }
    }

    /// Whether units may enter.
    #[must_use]
    pub const fn is_passable(self) -> bool {
        !matches!(self, Self::Impassable)
    }

    /// Multiplier applied to DEF of units standing here.
    #[must_use]
    pub fn defense_modifier(self) -> Fixed {
        match self {
            Self::Plains | Self::Impassable => Fixed::ONE,
            Self::Hills => percent(115),
            Self::Forest => percent(125),
            Self::City => percent(120),
        }
    }

    /// Multiplier applied to ATK of units attacking from here.
    #[must_use]
    pub fn attack_modifier(self) -> Fixed {
        match self {
            Self::Hills => percent(110),
            Self::Forest => percent(90),
            _ => Fixed::ONE,
        }
    }

    /// Whether this terrain blocks sight to hexes behind it.
    #[must_use]
    pub const fn blocks_sight(self) -> bool {
        matches!(self, Self::Forest | Self::Impassable)
    }

    /// Extra vision radius for a unit standing here.
    #[must_use]
    pub const fn vision_bonus(self) -> u32 {
        match self {
            Self::Hills => 1,
            _ => 0,
        }
    }
}

/// A hex that yields one resource kind to whoever controls it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Resource produced.
    pub kind: ResourceKind,
    /// Amount produced per tick while controlled and in supply.
    pub yield_per_tick: i64,
}

/// The match map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexGrid {
    /// Terrain for every in-bounds hex. A hex is in bounds iff present.
    terrain: BTreeMap<Hex, Terrain>,
    /// Resource nodes by position.
    nodes: BTreeMap<Hex, ResourceNode>,
}

impl HexGrid {
    /// A hexagon-shaped map of `radius` around the origin, all Plains.
    #[must_use]
    pub fn centered(radius: u32) -> Self {
        Self {
            terrain: Hex::ORIGIN.spiral(radius).map(|h| (h, Terrain::Plains)).collect(),
            nodes: BTreeMap::new(),
        }
    }

    /// A `width` x `height` rectangle in offset layout, all Plains.
    ///
    /// Rows are shifted so the map renders as a rectangle; axial `q` of
    /// row `r` starts at `-(r / 2)`.
    #[must_use]
    pub fn rectangle(width: u32, height: u32) -> Self {
        let mut terrain = BTreeMap::new();
        for r in 0..height as i32 {
            let offset = r / 2;
            for col in 0..width as i32 {
                terrain.insert(Hex::new(col - offset, r), Terrain::Plains);
            }
        }
        Self {
            terrain,
            nodes: BTreeMap::new(),
        }
    }

    /// Build from explicit terrain.
    #[must_use]
    pub fn from_terrain(terrain: BTreeMap<Hex, Terrain>) -> Self {
        Self {
            terrain,
            nodes: BTreeMap::new(),
        }
    }

    /// Set terrain of an in-bounds hex. Returns `false` if out of bounds.
    pub fn set_terrain(&mut self, hex: Hex, terrain: Terrain) -> bool {
        match self.terrain.get_mut(&hex) {
            Some(slot) => {
                *slot = terrain;
                true
            }
            None => false,
        }
    }

    /// Place a resource node. Returns `false` if the hex is out of bounds
    /// or impassable.
    pub fn add_node(&mut self, hex: Hex, node: ResourceNode) -> bool {
        if !self.is_passable(hex) {
            return false;
        }
        self.nodes.insert(hex, node);
        true
    }

    /// Whether the hex is on the map.
    #[must_use]
    pub fn in_bounds(&self, hex: Hex) -> bool {
        self.terrain.contains_key(&hex)
    }

    /// Terrain at `hex`, `None` when out of bounds.
    #[must_use]
    pub fn terrain(&self, hex: Hex) -> Option<Terrain> {
        self.terrain.get(&hex).copied()
    }

    /// In bounds and not impassable.
    #[must_use]
    pub fn is_passable(&self, hex: Hex) -> bool {
        self.terrain(hex).is_some_and(Terrain::is_passable)
    }

    /// Resource node at `hex`, if any.
    #[must_use]
    pub fn node(&self, hex: Hex) -> Option<&ResourceNode> {
        self.nodes.get(&hex)
    }

    /// All resource nodes in hex order.
    pub fn nodes(&self) -> impl Iterator<Item = (Hex, &ResourceNode)> {
        self.nodes.iter().map(|(h, n)| (*h, n))
    }

    /// In-bounds neighbours of `hex`, in direction order.
    pub fn neighbors(&self, hex: Hex) -> impl Iterator<Item = Hex> + '_ {
        hex.neighbors().into_iter().filter(|n| self.in_bounds(*n))
    }

    /// Every in-bounds hex with its terrain, in hex order.
    pub fn iter(&self) -> impl Iterator<Item = (Hex, Terrain)> + '_ {
        self.terrain.iter().map(|(h, t)| (*h, *t))
    }

    /// Number of in-bounds hexes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.terrain.len()
    }

    /// Whether the map has no hexes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terrain.is_empty()
    }

    /// Bounding box `(min_q, min_r, max_q, max_r)`, used as map dimensions
    /// on the wire.
    #[must_use]
    pub fn bounds(&self) -> (i32, i32, i32, i32) {
        let mut bounds = (i32::MAX, i32::MAX, i32::MIN, i32::MIN);
        for hex in self.terrain.keys() {
            bounds.0 = bounds.0.min(hex.q);
            bounds.1 = bounds.1.min(hex.r);
            bounds.2 = bounds.2.max(hex.q);
            bounds.3 = bounds.3.max(hex.r);
        }
        bounds
    }
}
