//! # Battle Server
//!
//! Headless authoritative match host.
//!
//! Runs one [`Match`](battle_core::simulation::Match) on a fixed cadence,
//! fanning player submissions in through per-player order channels and
//! fanning per-player state ticks and spectator snapshots out. Sockets and
//! authentication live in the transport in front of this crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod config;
pub mod error;
pub mod host;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use host::{MatchHost, MatchSummary, OrderSender, PlayerConnection};
