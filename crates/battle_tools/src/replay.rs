//! Replay recording and verification.

use std::path::Path;

use battle_core::error::Result;
use battle_core::replay::{ReplayLog, ReplayPlayer};
use battle_core::scenario::MatchSetup;
use battle_core::state::MatchResult;
use tracing::info;

/// What a verified replay contained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    /// Match seed.
    pub seed: u64,
    /// Ticks played back.
    pub ticks: usize,
    /// Orders played back.
    pub orders: usize,
    /// Final state hash, matching the recorded one.
    pub final_hash: u64,
    /// Result at the end of the log.
    pub result: Option<MatchResult>,
}

/// Play a replay file back and check every tick hash along the way.
///
/// # Errors
///
/// Returns an error if the file cannot be loaded or playback desyncs.
pub fn verify_replay(path: &Path) -> Result<ReplayReport> {
    let log = ReplayLog::load(path)?;
    let seed = log.seed;
    let ticks = log.duration();
    let orders = log.order_count();

    let mut player = ReplayPlayer::new(log)?;
    player.verify()?;
    let report = ReplayReport {
        seed,
        ticks,
        orders,
        final_hash: player.game().state_hash(),
        result: player.game().state().result,
    };
    info!(ticks, orders, hash = report.final_hash, "Replay verified");
    Ok(report)
}

/// Record `ticks` idle ticks of the duel map, for smoke-testing playback.
///
/// # Errors
///
/// Returns an error if the match cannot be built or the file written.
pub fn record_duel(seed: u64, ticks: u64, output: &Path) -> Result<ReplayLog> {
    let mut game = MatchSetup::duel(seed).build()?;
    let mut log = ReplayLog::new(&game)?;
    for _ in 0..ticks {
        if game.is_finished() {
            break;
        }
        let outcome = game.tick(Vec::new());
        log.record(&outcome);
    }
    log.save(output)?;
    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use battle_core::error::GameError;

    #[test]
    fn test_record_then_verify() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("duel.replay");
        let log = record_duel(12, 15, &path).unwrap();

        let report = verify_replay(&path).unwrap();
        assert_eq!(report.seed, 12);
        assert_eq!(report.ticks, 15);
        assert_eq!(report.orders, 0);
        assert_eq!(report.final_hash, log.final_hash);
    }

    #[test]
    fn test_tampered_final_hash_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("duel.replay");
        let mut log = record_duel(12, 5, &path).unwrap();
        log.final_hash ^= 1;
        log.save(&path).unwrap();
        assert!(matches!(
            verify_replay(&path),
            Err(GameError::DesyncDetected { .. })
        ));
    }
}
