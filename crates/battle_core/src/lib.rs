//! # Battle Core
//!
//! Deterministic tick engine for a server-driven hex-grid strategy game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No network IO
//! - No system randomness
//! - No floating-point math in the simulation (uses fixed-point)
//!
//! This separation enables:
//! - An authoritative server that never desyncs from its replays
//! - Headless match hosts and tooling
//! - Bit-for-bit determinism testing
//!
//! ## Crate Structure
//!
//! - [`simulation`] - The [`Match`](simulation::Match) and its tick phase sequence
//! - [`validation`] - Order validation and rejection codes
//! - [`movement`] - Simultaneous movement with conflict arbitration
//! - [`combat`] - Effective-HP focus-fire combat
//! - [`control`] - Territory control, Chief capture and victory
//! - [`production`] - Income, build queues, repair and upkeep
//! - [`supply`] / [`visibility`] - Per-tick derived networks
//! - [`hex`] / [`grid`] / [`pathfinding`] - Map geometry
//! - [`protocol`] / [`inbox`] / [`replay`] - Collaborator contracts
//! - [`math`] / [`rng`] - Fixed-point math and keyed randomness

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod combat;
pub mod config;
pub mod control;
pub mod economy;
pub mod error;
pub mod events;
pub mod grid;
pub mod hex;
pub mod ids;
pub mod inbox;
pub mod math;
pub mod movement;
pub mod order;
pub mod pathfinding;
pub mod production;
pub mod protocol;
pub mod replay;
pub mod rng;
pub mod scenario;
pub mod simulation;
pub mod state;
pub mod supply;
pub mod units;
pub mod validation;
pub mod visibility;

pub use error::{GameError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::RulesConfig;
    pub use crate::economy::{PlayerEconomy, ResourceKind, Resources};
    pub use crate::error::{GameError, Result};
    pub use crate::events::GameEvent;
    pub use crate::grid::{HexGrid, ResourceNode, Terrain};
    pub use crate::hex::Hex;
    pub use crate::ids::{FacilityId, PlayerId, UnitId};
    pub use crate::math::Fixed;
    pub use crate::order::{Order, OrderEnvelope, RejectCode};
    pub use crate::scenario::{MatchSetup, PlayerStart};
    pub use crate::simulation::{Match, TickOutcome};
    pub use crate::state::{GameStatus, MatchResult, MatchState};
    pub use crate::units::{Unit, UnitKind, UnitStatus};
    pub use crate::visibility::{Perspective, Snapshot};
}
