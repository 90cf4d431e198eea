//! Per-player order inbox.
//!
//! Transports push decoded orders in as they arrive; the orchestrator
//! drains every inbox once when it locks a tick. Orders aimed at the tick
//! about to lock that arrive after the submission deadline are not dropped:
//! they are retargeted at the following tick.

use std::time::Duration;

use tracing::debug;

use crate::ids::PlayerId;
use crate::order::{Order, OrderEnvelope};

/// Tick cadence as seen by submitters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionWindow {
    /// Time between tick boundaries.
    pub tick_interval: Duration,
    /// How long before a boundary submissions for that tick close.
    pub deadline: Duration,
}

impl Default for SubmissionWindow {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1000),
            deadline: Duration::from_millis(100),
        }
    }
}

impl SubmissionWindow {
    /// The tick an order actually targets.
    ///
    /// `next_tick` is the tick that locks at the coming boundary and
    /// `elapsed` is the time since the previous boundary.
    #[must_use]
    pub fn effective_target(&self, requested: u64, next_tick: u64, elapsed: Duration) -> u64 {
        let closes_at = self.tick_interval.saturating_sub(self.deadline);
        if requested == next_tick && elapsed > closes_at {
            next_tick + 1
        } else {
            requested
        }
    }
}

/// Orders from one player waiting for the next tick lock.
#[derive(Debug, Clone)]
pub struct OrderInbox {
    player: PlayerId,
    window: SubmissionWindow,
    next_seq: u64,
    pending: Vec<OrderEnvelope>,
}

impl OrderInbox {
    /// An empty inbox.
    #[must_use]
    pub fn new(player: PlayerId, window: SubmissionWindow) -> Self {
        Self {
            player,
            window,
            next_seq: 0,
            pending: Vec::new(),
        }
    }

    /// Owner of this inbox.
    #[must_use]
    pub const fn player(&self) -> PlayerId {
        self.player
    }

    /// Queue a submission. Orders keep their list order through
    /// monotonically increasing sequence numbers.
    ///
    /// Returns the tick the orders were queued for.
    pub fn submit(
        &mut self,
        requested_tick: u64,
        orders: impl IntoIterator<Item = Order>,
        next_tick: u64,
        elapsed: Duration,
    ) -> u64 {
        let target_tick = self
            .window
            .effective_target(requested_tick, next_tick, elapsed);
        if target_tick != requested_tick {
            debug!(player = %self.player, requested_tick, target_tick, "Late submission deferred");
        }
        for order in orders {
            self.pending.push(OrderEnvelope {
                player: self.player,
                target_tick,
                seq: self.next_seq,
                order,
            });
            self.next_seq += 1;
        }
        target_tick
    }

    /// Take everything queued so far.
    pub fn drain(&mut self) -> Vec<OrderEnvelope> {
        std::mem::take(&mut self.pending)
    }

    /// Number of queued orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UnitId;

    fn disband(id: u32) -> Order {
        Order::Disband { unit: UnitId(id) }
    }

    #[test]
    fn test_on_time_keeps_target() {
        let mut inbox = OrderInbox::new(PlayerId(0), SubmissionWindow::default());
        let target = inbox.submit(5, [disband(1)], 5, Duration::from_millis(400));
        assert_eq!(target, 5);
        assert_eq!(inbox.drain()[0].target_tick, 5);
        assert!(inbox.is_empty());
    }

    #[test]
    fn test_after_deadline_deferred() {
        let mut inbox = OrderInbox::new(PlayerId(0), SubmissionWindow::default());
        let target = inbox.submit(5, [disband(1)], 5, Duration::from_millis(950));
        assert_eq!(target, 6);
        // Exactly at the deadline is still on time.
        assert_eq!(inbox.submit(5, [disband(2)], 5, Duration::from_millis(900)), 5);
    }

    #[test]
    fn test_stale_target_left_for_validator() {
        let mut inbox = OrderInbox::new(PlayerId(0), SubmissionWindow::default());
        assert_eq!(inbox.submit(3, [disband(1)], 5, Duration::from_millis(999)), 3);
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let mut inbox = OrderInbox::new(PlayerId(2), SubmissionWindow::default());
        inbox.submit(1, [disband(1), disband(2)], 1, Duration::ZERO);
        inbox.submit(1, [disband(3)], 1, Duration::ZERO);
        let seqs: Vec<u64> = inbox.drain().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }
}
