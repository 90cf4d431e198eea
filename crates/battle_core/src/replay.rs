//! Replay log for recording and playing back matches.
//!
//! A replay stores the initial match and, per tick, the orders that were
//! accepted. Because ticks are deterministic that is enough to rebuild
//! any prior state. Each tick also carries the state hash it produced, so
//! playback can point at the first tick that diverged.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GameError, Result};
use crate::order::OrderEnvelope;
use crate::simulation::{Match, TickOutcome};

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// One recorded tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickRecord {
    /// Tick number.
    pub tick: u64,
    /// Orders accepted for this tick.
    pub accepted: Vec<OrderEnvelope>,
    /// State hash after the tick.
    pub hash: u64,
}

/// Append-only record of a match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayLog {
    /// Replay format version.
    pub version: u32,
    /// Match seed.
    pub seed: u64,
    /// Serialized initial match.
    pub initial: Vec<u8>,
    /// Ticks in order.
    pub ticks: Vec<TickRecord>,
    /// Final tick when the log was finalized.
    pub final_tick: u64,
    /// Final state hash for verification.
    pub final_hash: u64,
}

impl ReplayLog {
    /// Start a log from the match as it stands before its first tick.
    ///
    /// # Errors
    /// Returns an error if the match cannot be serialized.
    pub fn new(initial: &Match) -> Result<Self> {
        Ok(Self {
            version: REPLAY_VERSION,
            seed: initial.state().seed,
            initial: initial.serialize()?,
            ticks: Vec::new(),
            final_tick: initial.current_tick(),
            final_hash: initial.state_hash(),
        })
    }

    /// Append a tick. Idle outcomes from a finished match are skipped.
    pub fn record(&mut self, outcome: &TickOutcome) {
        if self.ticks.last().is_some_and(|t| t.tick >= outcome.tick) {
            return;
        }
        self.ticks.push(TickRecord {
            tick: outcome.tick,
            accepted: outcome.accepted.clone(),
            hash: outcome.hash,
        });
        self.final_tick = outcome.tick;
        self.final_hash = outcome.hash;
    }

    /// Save the replay to a file.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| GameError::ReplayError(format!("Failed to serialize replay: {e}")))?;
        std::fs::write(path.as_ref(), bytes)
            .map_err(|e| GameError::ReplayError(format!("Failed to write replay file: {e}")))?;
        info!(path = %path.as_ref().display(), ticks = self.ticks.len(), "Replay saved");
        Ok(())
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    /// Returns an error if file reading or deserialization fails, or the
    /// file was written by another format version.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|e| GameError::ReplayError(format!("Failed to read replay file: {e}")))?;
        let replay: Self = bincode::deserialize(&bytes)
            .map_err(|e| GameError::ReplayError(format!("Failed to deserialize replay: {e}")))?;

        if replay.version != REPLAY_VERSION {
            return Err(GameError::ReplayError(format!(
                "Replay version mismatch: expected {REPLAY_VERSION}, got {}",
                replay.version
            )));
        }

        Ok(replay)
    }

    /// Rebuild the initial match.
    ///
    /// # Errors
    /// Returns an error if the stored bytes do not decode.
    pub fn restore_initial(&self) -> Result<Match> {
        Match::deserialize(&self.initial)
    }

    /// Number of recorded ticks.
    #[must_use]
    pub fn duration(&self) -> usize {
        self.ticks.len()
    }

    /// Total number of recorded orders.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.ticks.iter().map(|t| t.accepted.len()).sum()
    }
}

/// Replay playback controller.
#[derive(Debug)]
pub struct ReplayPlayer {
    log: ReplayLog,
    game: Match,
    /// Index of the next tick record to play.
    cursor: usize,
}

impl ReplayPlayer {
    /// Create a player positioned before the first tick.
    ///
    /// # Errors
    /// Returns an error if the initial match cannot be restored.
    pub fn new(log: ReplayLog) -> Result<Self> {
        let game = log.restore_initial()?;
        Ok(Self {
            log,
            game,
            cursor: 0,
        })
    }

    /// Play the next recorded tick.
    ///
    /// Returns `Ok(None)` at the end of the log.
    ///
    /// # Errors
    /// Returns [`GameError::DesyncDetected`] if the tick's hash differs
    /// from the recorded one.
    pub fn advance(&mut self) -> Result<Option<TickOutcome>> {
        let Some(record) = self.log.ticks.get(self.cursor) else {
            return Ok(None);
        };
        let outcome = self.game.replay_tick(&record.accepted);
        if outcome.tick != record.tick || outcome.hash != record.hash {
            return Err(GameError::DesyncDetected {
                tick: record.tick,
                local_hash: outcome.hash,
                recorded_hash: record.hash,
            });
        }
        self.cursor += 1;
        Ok(Some(outcome))
    }

    /// Move to the state right after `target_tick`.
    ///
    /// Seeking backwards restarts from the initial match.
    ///
    /// # Errors
    /// Returns an error if restoration fails or playback desyncs.
    pub fn seek(&mut self, target_tick: u64) -> Result<()> {
        if target_tick < self.game.current_tick() {
            self.game = self.log.restore_initial()?;
            self.cursor = 0;
        }
        while self.game.current_tick() < target_tick {
            if self.advance()?.is_none() {
                break;
            }
        }
        debug!(tick = self.game.current_tick(), "Replay seek");
        Ok(())
    }

    /// Play every tick and compare the final hash.
    ///
    /// # Errors
    /// Returns [`GameError::DesyncDetected`] on any mismatch.
    pub fn verify(&mut self) -> Result<()> {
        self.seek(self.log.final_tick)?;
        let local_hash = self.game.state_hash();
        if local_hash != self.log.final_hash {
            return Err(GameError::DesyncDetected {
                tick: self.game.current_tick(),
                local_hash,
                recorded_hash: self.log.final_hash,
            });
        }
        Ok(())
    }

    /// Last replayed tick.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.game.current_tick()
    }

    /// The match as replayed so far.
    #[must_use]
    pub const fn game(&self) -> &Match {
        &self.game
    }

    /// The log being played.
    #[must_use]
    pub const fn log(&self) -> &ReplayLog {
        &self.log
    }

    /// Whether every recorded tick has been played.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.log.ticks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex::Hex;
    use crate::ids::PlayerId;
    use crate::order::Order;
    use crate::scenario::MatchSetup;
    use crate::units::UnitKind;

    fn recorded(ticks: u64) -> (ReplayLog, Match) {
        let mut game = MatchSetup::duel(31).build().unwrap();
        let mut log = ReplayLog::new(&game).unwrap();
        let scout = game
            .state()
            .units
            .values()
            .find(|u| u.kind == UnitKind::Scout && u.owner == Some(PlayerId(1)))
            .map(|u| u.id)
            .unwrap();
        for t in 1..=ticks {
            let orders = if t == 2 {
                vec![OrderEnvelope {
                    player: PlayerId(1),
                    target_tick: 2,
                    seq: 0,
                    order: Order::Move {
                        unit: scout,
                        dest: Hex::new(0, 2),
                    },
                }]
            } else {
                vec![]
            };
            let outcome = game.tick(orders);
            log.record(&outcome);
        }
        (log, game)
    }

    #[test]
    fn test_replay_verifies() {
        let (log, game) = recorded(12);
        assert_eq!(log.duration(), 12);
        assert_eq!(log.order_count(), 1);
        assert_eq!(log.final_hash, game.state_hash());

        let mut player = ReplayPlayer::new(log).unwrap();
        player.verify().unwrap();
        assert!(player.is_finished());
        assert_eq!(player.game().state(), game.state());
    }

    #[test]
    fn test_seek_backwards_restarts() {
        let (log, _) = recorded(6);
        let hash_at_3 = log.ticks[2].hash;
        let mut player = ReplayPlayer::new(log).unwrap();
        player.seek(5).unwrap();
        assert_eq!(player.current_tick(), 5);
        player.seek(3).unwrap();
        assert_eq!(player.current_tick(), 3);
        assert_eq!(player.game().state_hash(), hash_at_3);
    }

    #[test]
    fn test_tampered_log_desyncs() {
        let (mut log, _) = recorded(4);
        log.ticks[1].accepted.clear();
        let mut player = ReplayPlayer::new(log).unwrap();
        assert!(player.advance().unwrap().is_some());
        assert!(matches!(
            player.advance(),
            Err(GameError::DesyncDetected { tick: 2, .. })
        ));
    }

    #[test]
    fn test_save_and_load() {
        let (log, _) = recorded(3);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("match.replay");
        log.save(&path).unwrap();
        let loaded = ReplayLog::load(&path).unwrap();
        assert_eq!(loaded.ticks, log.ticks);
        assert_eq!(loaded.final_hash, log.final_hash);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let (mut log, _) = recorded(1);
        log.version = REPLAY_VERSION + 1;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.replay");
        log.save(&path).unwrap();
        assert!(matches!(
            ReplayLog::load(&path),
            Err(GameError::ReplayError(_))
        ));
    }
}
