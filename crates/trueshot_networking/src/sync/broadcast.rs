//! Rate limiter for the clock-sync broadcast.
//!
//! The server ticks slower than the target broadcast rate on most setups,
//! so in practice this sends once per tick. On faster tick rates it keeps
//! the channel at roughly [`SYNC_BROADCAST_HZ`] samples per second.

use trueshot_shared::constants::SYNC_BROADCAST_HZ;

use super::ClockOffsetState;
use crate::error::ChannelError;
use crate::protocol::ClockSyncUpdate;
use crate::transport::UnreliableSender;

/// Accumulator-driven broadcaster for one connection.
#[derive(Clone, Debug)]
pub struct SyncBroadcaster {
    interval: f64,
    accumulator: f64,
    sent: u64,
}

impl SyncBroadcaster {
    /// Creates a broadcaster targeting `rate_hz` samples per second.
    #[must_use]
    pub fn new(rate_hz: u32) -> Self {
        Self {
            interval: 1.0 / f64::from(rate_hz.max(1)),
            // Fire on the very first tick so new clients sync immediately.
            accumulator: f64::INFINITY,
            sent: 0,
        }
    }

    /// Advances by `frame_delta` seconds. True if a sample is due.
    pub fn due(&mut self, frame_delta: f64) -> bool {
        self.accumulator += frame_delta.max(0.0);
        if self.accumulator >= self.interval {
            self.accumulator = if self.accumulator.is_finite() {
                (self.accumulator - self.interval) % self.interval
            } else {
                0.0
            };
            true
        } else {
            false
        }
    }

    /// Sends the connection's clock state if a sample is due.
    ///
    /// Returns whether a sample was handed to the channel. On a full channel
    /// the oldest queued sample makes room for this one.
    ///
    /// # Errors
    ///
    /// Propagates channel errors (receiver gone, encode failure).
    pub fn tick(
        &mut self,
        frame_delta: f64,
        state: &ClockOffsetState,
        channel: &UnreliableSender<ClockSyncUpdate>,
    ) -> Result<bool, ChannelError> {
        if !self.due(frame_delta) {
            return Ok(false);
        }
        channel.send(&state.to_update())?;
        self.sent += 1;
        Ok(true)
    }

    /// Samples sent so far.
    #[must_use]
    pub const fn sent(&self) -> u64 {
        self.sent
    }
}

impl Default for SyncBroadcaster {
    fn default() -> Self {
        Self::new(SYNC_BROADCAST_HZ)
    }
}
