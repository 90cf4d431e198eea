//! JSON wire messages exchanged with bots.
//!
//! Server to bot: `match_start` once, then `state_tick` after every tick.
//! Bot to server: `submit_orders`. Messages are tagged with a `type` field.
//! Transports own framing and authentication and hand the engine already
//! attributed submissions.

use serde::{Deserialize, Serialize};

use crate::economy::Resources;
use crate::error::{GameError, Result};
use crate::events::GameEvent;
use crate::grid::{ResourceNode, Terrain};
use crate::hex::Hex;
use crate::ids::{FacilityId, PlayerId, UnitId};
use crate::math::{fixed_wire, Fixed};
use crate::order::Order;
use crate::simulation::{Match, TickOutcome};
use crate::state::{BuildSlot, Facility, GameStatus};
use crate::units::{Unit, UnitKind, UnitStatus};

/// Messages the server sends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once when the match begins.
    MatchStart(MatchStart),
    /// Sent after every tick.
    StateTick(StateTick),
}

/// Messages bots send.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Orders for one tick.
    SubmitOrders(SubmitOrders),
}

/// Static match information.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchStart {
    /// The receiving player's id.
    pub player_id: PlayerId,
    /// Axial bounds `(min_q, min_r, max_q, max_r)`.
    pub bounds: (i32, i32, i32, i32),
    /// Every hex and its terrain.
    pub hexes: Vec<HexInfo>,
    /// Rule constants bots need to plan.
    pub rules: RuleConstants,
}

/// One map hex.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexInfo {
    /// Axial q.
    pub q: i32,
    /// Axial r.
    pub r: i32,
    /// Terrain.
    pub terrain: Terrain,
    /// Resource node, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<ResourceNode>,
}

/// Rule constants published at match start.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConstants {
    /// K in `M = DEF / (DEF + K)`.
    pub defense_constant: i32,
    /// Rounds per engagement.
    pub max_combat_rounds: u32,
    /// Units per hex.
    pub stack_cap: usize,
    /// Orders per player per tick.
    pub max_orders_per_tick: usize,
    /// Ticks to take a facility or node.
    pub capture_ticks: u32,
    /// Tick at which the score decides the match.
    pub time_limit_ticks: u64,
}

/// A unit as a bot sees it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitInfo {
    /// Id.
    pub id: UnitId,
    /// Owner, `null` for neutral.
    pub owner: Option<PlayerId>,
    /// Kind.
    pub kind: UnitKind,
    /// Axial q.
    pub q: i32,
    /// Axial r.
    pub r: i32,
    /// Current HP.
    #[serde(with = "fixed_wire")]
    pub hp: Fixed,
    /// Max HP.
    #[serde(with = "fixed_wire")]
    pub max_hp: Fixed,
    /// Movement points left from the last tick.
    pub mp: u32,
    /// Fuel upkeep unpaid.
    pub starved: bool,
    /// Bounced or reverted last tick.
    pub disrupted: bool,
    /// Cut off from supply.
    pub out_of_supply: bool,
}

impl From<&Unit> for UnitInfo {
    fn from(unit: &Unit) -> Self {
        Self {
            id: unit.id,
            owner: unit.owner,
            kind: unit.kind,
            q: unit.position.q,
            r: unit.position.r,
            hp: unit.hp,
            max_hp: unit.max_hp,
            mp: unit.mp,
            starved: unit.status.contains(UnitStatus::STARVED),
            disrupted: unit.status.contains(UnitStatus::DISRUPTED),
            out_of_supply: unit.status.contains(UnitStatus::OUT_OF_SUPPLY),
        }
    }
}

/// A facility as its owner sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityInfo {
    /// Id.
    pub id: FacilityId,
    /// Axial q.
    pub q: i32,
    /// Axial r.
    pub r: i32,
    /// Total build slots.
    pub slot_count: usize,
    /// Builds in progress.
    pub slots: Vec<BuildSlot>,
    /// Rally point.
    pub rally_point: Option<Hex>,
}

impl From<&Facility> for FacilityInfo {
    fn from(facility: &Facility) -> Self {
        Self {
            id: facility.id,
            q: facility.position.q,
            r: facility.position.r,
            slot_count: facility.slot_count,
            slots: facility.slots.clone(),
            rally_point: facility.rally_point,
        }
    }
}

/// The receiving player's own holdings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Stock.
    pub resources: Resources,
    /// Own units.
    pub units: Vec<UnitInfo>,
    /// Own facilities.
    pub facilities: Vec<FacilityInfo>,
}

/// A hex whose controller changed within the player's view, including hexes
/// turned neutral when their owner was eliminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlUpdate {
    /// Axial q.
    pub q: i32,
    /// Axial r.
    pub r: i32,
    /// New controller.
    pub owner: Option<PlayerId>,
}

/// What came into view this tick.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VisibleChanges {
    /// Foreign units seen for the first time.
    pub units: Vec<UnitInfo>,
    /// Control flips the player saw or took part in.
    pub control_updates: Vec<ControlUpdate>,
}

/// Per-tick update for one player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateTick {
    /// Tick just completed.
    pub tick: u64,
    /// `ACTIVE` or `FINISHED`.
    pub game_status: GameStatus,
    /// The player's own state.
    pub you: PlayerState,
    /// Newly visible units and control changes.
    pub visible_changes: VisibleChanges,
    /// Events the player is entitled to see.
    pub events: Vec<GameEvent>,
}

/// A bot's orders for one tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOrders {
    /// Tick the orders are for.
    pub tick: u64,
    /// Orders in priority order.
    pub orders: Vec<WireOrder>,
}

/// An order as written by a bot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireOrder {
    /// Move a unit.
    Move {
        /// Unit.
        unit_id: UnitId,
        /// Destination q.
        dest_q: i32,
        /// Destination r.
        dest_r: i32,
    },
    /// Queue a build.
    Produce {
        /// Facility.
        facility_id: FacilityId,
        /// Kind to build.
        unit_type: UnitKind,
    },
    /// Remove a unit.
    Disband {
        /// Unit.
        unit_id: UnitId,
    },
    /// Set a facility's rally point.
    SetRally {
        /// Facility.
        facility_id: FacilityId,
        /// Rally q.
        q: i32,
        /// Rally r.
        r: i32,
    },
}

impl From<WireOrder> for Order {
    fn from(order: WireOrder) -> Self {
        match order {
            WireOrder::Move {
                unit_id,
                dest_q,
                dest_r,
            } => Self::Move {
                unit: unit_id,
                dest: Hex::new(dest_q, dest_r),
            },
            WireOrder::Produce {
                facility_id,
                unit_type,
            } => Self::Produce {
                facility: facility_id,
                kind: unit_type,
            },
            WireOrder::Disband { unit_id } => Self::Disband { unit: unit_id },
            WireOrder::SetRally { facility_id, q, r } => Self::SetRally {
                facility: facility_id,
                hex: Hex::new(q, r),
            },
        }
    }
}

impl SubmitOrders {
    /// Orders in engine form, list order preserved.
    pub fn orders(&self) -> impl Iterator<Item = Order> + '_ {
        self.orders.iter().map(|o| Order::from(*o))
    }
}

/// Decode a bot submission.
///
/// # Errors
///
/// Returns [`GameError::MalformedSubmission`] if the payload is larger than
/// `max_bytes` or is not a valid `submit_orders` message.
pub fn decode_submit(bytes: &[u8], max_bytes: usize) -> Result<SubmitOrders> {
    if bytes.len() > max_bytes {
        return Err(GameError::MalformedSubmission(format!(
            "Payload of {} bytes exceeds {max_bytes}",
            bytes.len()
        )));
    }
    let message: ClientMessage = serde_json::from_slice(bytes)
        .map_err(|e| GameError::MalformedSubmission(e.to_string()))?;
    let ClientMessage::SubmitOrders(submit) = message;
    Ok(submit)
}

/// Encode a server message as JSON.
///
/// # Errors
///
/// Returns an error if JSON encoding fails.
pub fn encode(message: &ServerMessage) -> Result<String> {
    serde_json::to_string(message)
        .map_err(|e| GameError::InvalidState(format!("Failed to encode message: {e}")))
}

impl MatchStart {
    /// The `match_start` message for `player`.
    #[must_use]
    pub fn build(game: &Match, player: PlayerId) -> Self {
        let grid = game.grid();
        let rules = game.rules();
        Self {
            player_id: player,
            bounds: grid.bounds(),
            hexes: grid
                .iter()
                .map(|(hex, terrain)| HexInfo {
                    q: hex.q,
                    r: hex.r,
                    terrain,
                    node: grid.node(hex).copied(),
                })
                .collect(),
            rules: RuleConstants {
                defense_constant: rules.defense_constant,
                max_combat_rounds: rules.max_combat_rounds,
                stack_cap: rules.stack_cap,
                max_orders_per_tick: rules.max_orders_per_tick,
                capture_ticks: rules.capture_ticks,
                time_limit_ticks: rules.time_limit_ticks,
            },
        }
    }
}

impl StateTick {
    /// The `state_tick` message for `player` after `outcome`.
    #[must_use]
    pub fn build(game: &Match, player: PlayerId, outcome: &TickOutcome) -> Self {
        let state = game.state();
        let view = game.player_view(player, outcome);

        let you = PlayerState {
            resources: view.resources.unwrap_or(Resources::ZERO),
            units: view
                .units
                .iter()
                .filter(|u| u.owner == Some(player))
                .map(UnitInfo::from)
                .collect(),
            facilities: view
                .facilities
                .iter()
                .filter(|f| f.owner == Some(player))
                .map(FacilityInfo::from)
                .collect(),
        };

        let units = outcome
            .newly_visible
            .get(&player)
            .into_iter()
            .flatten()
            .filter_map(|id| state.units.get(id))
            .map(UnitInfo::from)
            .collect();
        let control_updates = view
            .events
            .iter()
            .filter_map(|e| match e {
                GameEvent::Capture { hex, new_owner, .. } => Some(ControlUpdate {
                    q: hex.q,
                    r: hex.r,
                    owner: *new_owner,
                }),
                _ => None,
            })
            .collect();

        Self {
            tick: outcome.tick,
            game_status: state.status,
            you,
            visible_changes: VisibleChanges {
                units,
                control_updates,
            },
            events: view.events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::MatchSetup;

    #[test]
    fn test_decode_submit() {
        let json = br#"{
            "type": "submit_orders",
            "tick": 4,
            "orders": [
                {"type": "Move", "unit_id": 3, "dest_q": 1, "dest_r": -1},
                {"type": "Produce", "facility_id": 1, "unit_type": "Scout"},
                {"type": "SetRally", "facility_id": 1, "q": 0, "r": 2}
            ]
        }"#;
        let submit = decode_submit(json, 65536).unwrap();
        assert_eq!(submit.tick, 4);
        let orders: Vec<Order> = submit.orders().collect();
        assert_eq!(
            orders[0],
            Order::Move {
                unit: UnitId(3),
                dest: Hex::new(1, -1)
            }
        );
        assert_eq!(
            orders[2],
            Order::SetRally {
                facility: FacilityId(1),
                hex: Hex::new(0, 2)
            }
        );
    }

    #[test]
    fn test_oversized_payload_is_malformed() {
        let json = br#"{"type": "submit_orders", "tick": 1, "orders": []}"#;
        assert!(decode_submit(json, 1024).is_ok());
        assert!(matches!(
            decode_submit(json, 10),
            Err(GameError::MalformedSubmission(_))
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            decode_submit(b"{\"type\": \"launch_missiles\"}", 1024),
            Err(GameError::MalformedSubmission(_))
        ));
    }

    #[test]
    fn test_state_tick_shape() {
        let mut game = MatchSetup::duel(2).build().unwrap();
        let outcome = game.tick(vec![]);
        let message = ServerMessage::StateTick(StateTick::build(&game, PlayerId(0), &outcome));
        let json: serde_json::Value = serde_json::from_str(&encode(&message).unwrap()).unwrap();
        assert_eq!(json["type"], "state_tick");
        assert_eq!(json["game_status"], "ACTIVE");
        assert_eq!(json["tick"], 1);
        assert_eq!(json["you"]["units"].as_array().map(Vec::len), Some(4));
        assert_eq!(json["you"]["units"][0]["hp"], 150.0);
    }

    #[test]
    fn test_match_start_lists_every_hex() {
        let game = MatchSetup::duel(2).build().unwrap();
        let start = MatchStart::build(&game, PlayerId(1));
        assert_eq!(start.hexes.len(), game.grid().len());
        assert_eq!(start.rules.defense_constant, 25);
        let json = encode(&ServerMessage::MatchStart(start)).unwrap();
        assert!(json.contains("\"type\":\"match_start\""));
    }

    #[test]
    fn test_elimination_reaches_control_updates() {
        let mut game = MatchSetup::duel(2).build().unwrap();
        let near = Hex::new(-3, 1);
        game.state_mut().control.insert(
            near,
            crate::state::ControlRecord {
                owner: Some(PlayerId(1)),
                occupant: None,
                streak: 0,
            },
        );
        let events = crate::control::eliminate(game.state_mut(), PlayerId(1), 1);
        let outcome = TickOutcome {
            tick: 1,
            events,
            ..TickOutcome::default()
        };

        let tick = StateTick::build(&game, PlayerId(0), &outcome);
        assert!(tick.visible_changes.control_updates.contains(&ControlUpdate {
            q: -3,
            r: 1,
            owner: None,
        }));
    }
}
