//! Events emitted by a tick.
//!
//! Every event carries the hex it happened at. Snapshots filter the log per
//! player: rejections go only to the submitter, everything else to players
//! who can see the hex or took part.

use serde::{Deserialize, Serialize};

use crate::hex::Hex;
use crate::ids::{FacilityId, PlayerId, UnitId};
use crate::order::RejectCode;
use crate::state::MatchResult;
use crate::units::UnitKind;

/// A noteworthy outcome of a tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameEvent {
    /// An engagement was fought.
    Combat {
        /// Engagement hex. For a head-to-head collision, the lower of the
        /// two hexes.
        hex: Hex,
        /// Owners that took part.
        sides: Vec<Option<PlayerId>>,
        /// Rounds actually fought.
        rounds: u32,
        /// Units killed.
        casualties: Vec<UnitId>,
    },
    /// A hex changed owner.
    Capture {
        /// Captured hex.
        hex: Hex,
        /// Facility on the hex, if any.
        facility: Option<FacilityId>,
        /// Owner before.
        previous_owner: Option<PlayerId>,
        /// Owner after.
        new_owner: Option<PlayerId>,
    },
    /// A build completed.
    UnitBuilt {
        /// Spawn hex.
        hex: Hex,
        /// Producing facility.
        facility: FacilityId,
        /// New unit.
        unit: UnitId,
        /// Its kind.
        kind: UnitKind,
        /// Owner.
        owner: PlayerId,
    },
    /// A player lost their Chief.
    ChiefEliminated {
        /// Where the Chief was.
        hex: Hex,
        /// Eliminated player.
        player: PlayerId,
        /// `true` for capture by encirclement, `false` for death in combat.
        captured: bool,
    },
    /// An order was refused.
    OrderRejected {
        /// Hex the order referred to, when it referred to one.
        hex: Option<Hex>,
        /// Submitter.
        player: PlayerId,
        /// Submission sequence number of the refused order.
        seq: u64,
        /// Reason code.
        code: RejectCode,
    },
    /// The match finished.
    MatchEnded {
        /// Winner's Chief position, if the winner still has one.
        hex: Option<Hex>,
        /// Outcome.
        result: MatchResult,
    },
}

impl GameEvent {
    /// Location of the event.
    #[must_use]
    pub fn hex(&self) -> Option<Hex> {
        match self {
            Self::Combat { hex, .. }
            | Self::Capture { hex, .. }
            | Self::UnitBuilt { hex, .. }
            | Self::ChiefEliminated { hex, .. } => Some(*hex),
            Self::OrderRejected { hex, .. } | Self::MatchEnded { hex, .. } => *hex,
        }
    }

    /// Whether `player` should receive this event, given the hexes they see.
    #[must_use]
    pub fn is_visible_to(&self, player: PlayerId, sees: impl Fn(Hex) -> bool) -> bool {
        match self {
            Self::OrderRejected { player: p, .. } => *p == player,
            Self::ChiefEliminated { .. } | Self::MatchEnded { .. } => true,
            Self::UnitBuilt { owner, hex, .. } => *owner == player || sees(*hex),
            Self::Capture {
                previous_owner,
                new_owner,
                hex,
                ..
            } => {
                *previous_owner == Some(player) || *new_owner == Some(player) || sees(*hex)
            }
            Self::Combat { sides, hex, .. } => sides.contains(&Some(player)) || sees(*hex),
        }
    }
}
