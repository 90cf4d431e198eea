//! The match host: one task, one match, one tick at a time.
//!
//! Each tick interval the host
//! 1. drains every player's inbox in player order,
//! 2. runs the tick,
//! 3. records the accepted orders in the replay log,
//! 4. sends each player a `state_tick` and spectators a full snapshot.
//!
//! Submissions are decoded and queued the moment they arrive, so the
//! submission deadline is judged against arrival time rather than against
//! when the tick happens to lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use battle_core::ids::PlayerId;
use battle_core::inbox::OrderInbox;
use battle_core::order::OrderEnvelope;
use battle_core::protocol::{decode_submit, encode, MatchStart, ServerMessage, StateTick};
use battle_core::replay::ReplayLog;
use battle_core::simulation::Match;
use battle_core::state::MatchResult;
use battle_core::visibility::{Perspective, Snapshot};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};

/// A raw submission, attributed to the connection it came from.
#[derive(Debug)]
struct Submission {
    player: PlayerId,
    payload: Vec<u8>,
}

/// A player's way into the host.
///
/// The player id is fixed when the connection is created, so a payload
/// can never speak for someone else.
#[derive(Debug, Clone)]
pub struct OrderSender {
    player: PlayerId,
    tx: mpsc::Sender<Submission>,
}

impl OrderSender {
    /// Player this sender speaks for.
    #[must_use]
    pub const fn player(&self) -> PlayerId {
        self.player
    }

    /// Hand a raw `submit_orders` payload to the host.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::HostClosed`] once the host has stopped.
    pub async fn submit(&self, payload: Vec<u8>) -> Result<()> {
        self.tx
            .send(Submission {
                player: self.player,
                payload,
            })
            .await
            .map_err(|_| ServerError::HostClosed)
    }
}

/// Both ends a transport needs for one player.
#[derive(Debug)]
pub struct PlayerConnection {
    /// Player id.
    pub player: PlayerId,
    /// Inbound orders.
    pub orders: OrderSender,
    /// Outbound JSON messages: `match_start` then one `state_tick` per tick.
    pub updates: mpsc::Receiver<String>,
}

/// How a hosted match ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSummary {
    /// Last tick run.
    pub final_tick: u64,
    /// Result, if the match was decided rather than shut down.
    pub result: Option<MatchResult>,
    /// State hash after the last tick.
    pub final_hash: u64,
    /// Orders accepted over the whole match.
    pub orders_accepted: usize,
}

/// Hosts one match.
#[derive(Debug)]
pub struct MatchHost {
    game: Match,
    config: ServerConfig,
    inboxes: BTreeMap<PlayerId, OrderInbox>,
    outbound: BTreeMap<PlayerId, mpsc::Sender<String>>,
    submissions: mpsc::Receiver<Submission>,
    spectators: broadcast::Sender<Arc<Snapshot>>,
    replay: ReplayLog,
}

impl MatchHost {
    /// Wrap a freshly built match and open one connection per player.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial match cannot be recorded.
    pub fn new(game: Match, config: ServerConfig) -> Result<(Self, Vec<PlayerConnection>)> {
        let window = config.window();
        let capacity = config.snapshot_capacity.max(1);
        let (order_tx, submissions) = mpsc::channel(config.order_capacity.max(1));
        let (spectators, _) = broadcast::channel(capacity);
        let replay = ReplayLog::new(&game)?;

        let mut inboxes = BTreeMap::new();
        let mut outbound = BTreeMap::new();
        let mut connections = Vec::new();
        for player in game.state().players.keys().copied() {
            let (update_tx, updates) = mpsc::channel(capacity);
            inboxes.insert(player, OrderInbox::new(player, window));
            outbound.insert(player, update_tx);
            connections.push(PlayerConnection {
                player,
                orders: OrderSender {
                    player,
                    tx: order_tx.clone(),
                },
                updates,
            });
        }

        let host = Self {
            game,
            config,
            inboxes,
            outbound,
            submissions,
            spectators,
            replay,
        };
        Ok((host, connections))
    }

    /// Subscribe to full-vision snapshots, one per tick.
    #[must_use]
    pub fn spectate(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.spectators.subscribe()
    }

    /// The hosted match.
    #[must_use]
    pub const fn game(&self) -> &Match {
        &self.game
    }

    /// Run until the match is decided or `shutdown` flips to `true`.
    /// Dropping the shutdown sender also stops the host.
    ///
    /// # Errors
    ///
    /// Returns an error if a message cannot be encoded or the replay
    /// cannot be written.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<MatchSummary> {
        let period = Duration::from_millis(self.config.tick_interval_ms.max(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut boundary = Instant::now();

        self.publish_start()?;
        info!(
            players = self.inboxes.len(),
            tick_interval_ms = self.config.tick_interval_ms,
            "Match host started"
        );

        while !self.game.is_finished() {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(tick = self.game.current_tick(), "Shutdown requested");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.lock_tick()?;
                    boundary = Instant::now();
                }
                Some(submission) = self.submissions.recv() => {
                    self.accept(submission, boundary.elapsed());
                }
            }
        }

        self.finish()
    }

    fn publish_start(&self) -> Result<()> {
        for (player, tx) in &self.outbound {
            let message = ServerMessage::MatchStart(MatchStart::build(&self.game, *player));
            deliver(*player, tx, encode(&message)?);
        }
        Ok(())
    }

    fn accept(&mut self, submission: Submission, elapsed: Duration) {
        let next_tick = self.game.current_tick() + 1;
        let max_bytes = self.game.rules().max_payload_bytes;
        let Some(inbox) = self.inboxes.get_mut(&submission.player) else {
            warn!(player = %submission.player, "Submission from unknown player");
            return;
        };
        match decode_submit(&submission.payload, max_bytes) {
            Ok(submit) => {
                let target = inbox.submit(submit.tick, submit.orders(), next_tick, elapsed);
                debug!(
                    player = %submission.player,
                    target_tick = target,
                    orders = submit.orders.len(),
                    "Submission queued"
                );
            }
            Err(e) => {
                warn!(player = %submission.player, error = %e, "Dropped malformed submission");
            }
        }
    }

    fn lock_tick(&mut self) -> Result<()> {
        let batch: Vec<OrderEnvelope> = self
            .inboxes
            .values_mut()
            .flat_map(|inbox| inbox.drain())
            .collect();
        let outcome = self.game.tick(batch);
        self.replay.record(&outcome);

        for (player, tx) in &self.outbound {
            let message =
                ServerMessage::StateTick(StateTick::build(&self.game, *player, &outcome));
            deliver(*player, tx, encode(&message)?);
        }
        if self.spectators.receiver_count() > 0 {
            let view = self.game.spectator_view(Perspective::Full, &outcome);
            if self.spectators.send(Arc::new(view)).is_err() {
                debug!(tick = outcome.tick, "Spectators left before snapshot");
            }
        }

        debug!(
            tick = outcome.tick,
            accepted = outcome.accepted.len(),
            events = outcome.events.len(),
            "Tick published"
        );
        Ok(())
    }

    fn finish(self) -> Result<MatchSummary> {
        if let Some(path) = &self.config.replay_path {
            self.replay.save(path)?;
        }
        let summary = MatchSummary {
            final_tick: self.game.current_tick(),
            result: self.game.state().result,
            final_hash: self.game.state_hash(),
            orders_accepted: self.replay.order_count(),
        };
        info!(
            tick = summary.final_tick,
            result = ?summary.result,
            orders = summary.orders_accepted,
            "Match host stopped"
        );
        Ok(summary)
    }
}

/// Queue a message without waiting on a slow reader.
fn deliver(player: PlayerId, tx: &mpsc::Sender<String>, message: String) {
    match tx.try_send(message) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            warn!(player = %player, "Update channel full, dropping message");
        }
        Err(TrySendError::Closed(_)) => {
            debug!(player = %player, "Player disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use battle_core::prelude::*;
    use battle_test_utils::fixtures::unit_of;

    fn quick_config() -> ServerConfig {
        ServerConfig {
            tick_interval_ms: 20,
            submission_deadline_ms: 5,
            snapshot_capacity: 32,
            ..ServerConfig::default()
        }
    }

    fn short_duel(limit: u64) -> Match {
        let mut setup = MatchSetup::duel(4);
        setup.rules.time_limit_ticks = limit;
        setup.build().unwrap()
    }

    fn drain(updates: &mut mpsc::Receiver<String>) -> Vec<serde_json::Value> {
        let mut messages = Vec::new();
        while let Ok(text) = updates.try_recv() {
            messages.push(serde_json::from_str(&text).unwrap());
        }
        messages
    }

    #[tokio::test]
    async fn test_runs_to_time_limit() {
        let (host, mut connections) = MatchHost::new(short_duel(5), quick_config()).unwrap();
        let (_stop, shutdown) = watch::channel(false);
        let summary = host.run(shutdown).await.unwrap();

        assert_eq!(summary.final_tick, 5);
        assert!(summary.result.is_some());
        for connection in &mut connections {
            let messages = drain(&mut connection.updates);
            assert_eq!(messages.len(), 6);
            assert_eq!(messages[0]["type"], "match_start");
            assert_eq!(messages[5]["type"], "state_tick");
            assert_eq!(messages[5]["tick"], 5);
        }
    }

    #[tokio::test]
    async fn test_submitted_orders_are_played_and_recorded() {
        let game = short_duel(4);
        let scout = unit_of(&game, PlayerId(0), UnitKind::Scout).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let replay_path = dir.path().join("hosted.replay");
        let config = ServerConfig {
            replay_path: Some(replay_path.clone()),
            ..quick_config()
        };
        let (host, connections) = MatchHost::new(game, config).unwrap();
        let payload = format!(
            r#"{{"type":"submit_orders","tick":1,"orders":[{{"type":"Move","unit_id":{},"dest_q":-2,"dest_r":1}}]}}"#,
            scout.0
        );
        connections[0].orders.submit(payload.into_bytes()).await.unwrap();

        let (_stop, shutdown) = watch::channel(false);
        let summary = host.run(shutdown).await.unwrap();
        assert_eq!(summary.orders_accepted, 1);

        let log = ReplayLog::load(&replay_path).unwrap();
        assert_eq!(log.order_count(), 1);
        assert_eq!(log.final_hash, summary.final_hash);
    }

    #[tokio::test]
    async fn test_malformed_submission_is_dropped() {
        let (host, connections) = MatchHost::new(short_duel(3), quick_config()).unwrap();
        connections[1]
            .orders
            .submit(b"{\"type\":\"fire_everything\"}".to_vec())
            .await
            .unwrap();
        let (_stop, shutdown) = watch::channel(false);
        let summary = host.run(shutdown).await.unwrap();
        assert_eq!(summary.final_tick, 3);
        assert_eq!(summary.orders_accepted, 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_early() {
        let config = ServerConfig {
            tick_interval_ms: 1000,
            submission_deadline_ms: 100,
            ..ServerConfig::default()
        };
        let (host, _connections) = MatchHost::new(short_duel(50), config).unwrap();
        let (stop, shutdown) = watch::channel(false);
        let task = tokio::spawn(host.run(shutdown));
        stop.send(true).unwrap();
        let summary = task.await.unwrap().unwrap();
        assert_eq!(summary.final_tick, 0);
        assert_eq!(summary.result, None);
    }

    #[tokio::test]
    async fn test_spectators_get_full_view() {
        let (host, _connections) = MatchHost::new(short_duel(2), quick_config()).unwrap();
        let mut feed = host.spectate();
        let units = host.game().state().units.len();
        let (_stop, shutdown) = watch::channel(false);
        host.run(shutdown).await.unwrap();

        let first = feed.recv().await.unwrap();
        assert_eq!(first.tick, 1);
        assert_eq!(first.units.len(), units);
    }
}
