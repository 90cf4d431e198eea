//! Player orders and rejection codes.
//!
//! The order set is closed: every phase matches exhaustively on [`Order`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hex::Hex;
use crate::ids::{FacilityId, PlayerId, UnitId};
use crate::units::UnitKind;

/// One player intent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Order {
    /// Move a unit toward `dest`.
    Move {
        /// Unit to move.
        unit: UnitId,
        /// Destination hex.
        dest: Hex,
    },
    /// Queue a build at a facility.
    Produce {
        /// Facility to build at.
        facility: FacilityId,
        /// Kind to build.
        kind: UnitKind,
    },
    /// Remove one of your own units.
    Disband {
        /// Unit to remove.
        unit: UnitId,
    },
    /// Set where a facility's new units head.
    SetRally {
        /// Facility to configure.
        facility: FacilityId,
        /// Rally hex.
        hex: Hex,
    },
}

impl Order {
    /// The unit an order refers to, if it refers to one.
    #[must_use]
    pub const fn unit(&self) -> Option<UnitId> {
        match self {
            Self::Move { unit, .. } | Self::Disband { unit } => Some(*unit),
            Self::Produce { .. } | Self::SetRally { .. } => None,
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Move { .. } => "Move",
            Self::Produce { .. } => "Produce",
            Self::Disband { .. } => "Disband",
            Self::SetRally { .. } => "SetRally",
        }
    }
}

/// An order as delivered by the transport layer.
///
/// `player` is attributed by the transport from the authenticated
/// connection, never read from the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderEnvelope {
    /// Submitting player.
    pub player: PlayerId,
    /// Tick the order is meant for.
    pub target_tick: u64,
    /// Submission sequence number; lower was submitted earlier.
    pub seq: u64,
    /// The order.
    pub order: Order,
}

/// Why an order was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectCode {
    /// Destination off the map or impassable.
    InvalidDestination,
    /// Stack cap, slot availability, per-tick order cap, or a second order
    /// for the same unit.
    StackCapExceeded,
    /// Not enough resources.
    InsufficientResources,
    /// Target tick already locked, or too far ahead.
    LateSubmission,
    /// Entity missing or not owned by the submitter.
    NotVisibleOrOwned,
}

impl RejectCode {
    /// Wire code, e.g. `ORD-001`.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidDestination => "ORD-001",
            Self::StackCapExceeded => "ORD-002",
            Self::InsufficientResources => "ORD-003",
            Self::LateSubmission => "ORD-004",
            Self::NotVisibleOrOwned => "ORD-005",
        }
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidDestination => "InvalidDestination",
            Self::StackCapExceeded => "StackCapExceeded",
            Self::InsufficientResources => "InsufficientResources",
            Self::LateSubmission => "LateSubmission",
            Self::NotVisibleOrOwned => "NotVisibleOrOwned",
        };
        write!(f, "{} {name}", self.code())
    }
}
