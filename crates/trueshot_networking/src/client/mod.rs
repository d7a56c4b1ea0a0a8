//! # Compensation Client
//!
//! Client-side half of the compensation core for one local player.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  COMPENSATION CLIENT                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  unreliable rx ──latest──► ClockSync (client role)          │
//! │                                 │ offset                    │
//! │  fire press ──────────────► FireRequestBuilder ──► reliable │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod fire;

pub use fire::{
    alt_ready_to_fire, estimate_offset, FireAttempt, FireRequestBuilder, OffsetEstimate,
    OffsetSource,
};

use crate::error::ChannelError;
use crate::integration::{AimSource, PingSource, PreFireEffect, WeaponTimers};
use crate::protocol::{ClockSyncUpdate, FireMode, FireRequest};
use crate::sync::{ClockSync, NetRole, SyncStep};
use crate::transport::{ReliableSender, UnreliableReceiver};

/// Clock mirror plus fire-request path for one pure client.
pub struct CompensationClient {
    clock: ClockSync,
    sync_rx: UnreliableReceiver<ClockSyncUpdate>,
    fire: FireRequestBuilder,
    last_step: SyncStep,
}

impl CompensationClient {
    /// Creates a client reading clock samples from `sync_rx` and sending fire
    /// requests into `fire_tx`.
    #[must_use]
    pub fn new(sync_rx: UnreliableReceiver<ClockSyncUpdate>, fire_tx: ReliableSender<FireRequest>) -> Self {
        Self {
            clock: ClockSync::new(NetRole::Client),
            sync_rx,
            fire: FireRequestBuilder::for_client(fire_tx),
            last_step: SyncStep::AwaitingReference,
        }
    }

    /// Runs one client tick at local time `now`.
    ///
    /// Takes the newest clock sample that arrived since the last tick (if any)
    /// and moves the offset estimate toward it.
    pub fn tick(&mut self, now: f64, frame_delta: f64) -> SyncStep {
        if let Some(update) = self.sync_rx.latest() {
            self.clock.receive(&update);
        }
        let step = self.clock.tick(now, frame_delta).unwrap_or(SyncStep::AwaitingReference);
        if step == SyncStep::Initialized {
            tracing::info!(
                "Clock synced: offset {:.4}s",
                self.clock.state().offset_server_minus_client()
            );
        }
        self.last_step = step;
        step
    }

    /// Attempts to fire `mode` at local time `now`.
    ///
    /// # Errors
    ///
    /// Propagates channel errors from the fire channel.
    pub fn try_fire<S, P, E>(
        &mut self,
        mode: FireMode,
        now: f64,
        shooter: &S,
        ping: &P,
        effects: &mut E,
    ) -> Result<FireAttempt, ChannelError>
    where
        S: WeaponTimers + AimSource + ?Sized,
        P: PingSource + ?Sized,
        E: PreFireEffect + ?Sized,
    {
        self.fire.try_fire(mode, now, shooter, Some(self.clock.state()), ping, effects)
    }

    /// The clock service.
    #[must_use]
    pub const fn clock(&self) -> &ClockSync {
        &self.clock
    }

    /// What the most recent tick did.
    #[must_use]
    pub const fn last_step(&self) -> SyncStep {
        self.last_step
    }

    /// Fire requests sent so far.
    #[must_use]
    pub const fn requests_sent(&self) -> u64 {
        self.fire.requests_sent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::{MockPingSource, MockPreFireEffect, MockShooter};
    use crate::transport::{reliable_channel, unreliable_channel};
    use crate::SYNC_CHANNEL_CAPACITY;

    #[test]
    fn test_tick_consumes_latest_sample() {
        let (sync_tx, sync_rx) = unreliable_channel(8);
        let (fire_tx, _fire_rx) = reliable_channel();
        let mut client = CompensationClient::new(sync_rx, fire_tx);

        assert_eq!(client.tick(5.0, 0.016), SyncStep::AwaitingReference);

        sync_tx.send(&ClockSyncUpdate { server_now: 5.0, ..Default::default() }).unwrap();
        sync_tx.send(&ClockSyncUpdate { server_now: 5.25, ..Default::default() }).unwrap();
        assert_eq!(client.tick(5.0, 0.016), SyncStep::Initialized);
        assert!((client.clock().state().offset_server_minus_client() - 0.25).abs() < 1e-6);
        assert!(client.clock().is_synced());

        // No new sample: still smooths against the last one held.
        assert_eq!(client.tick(5.0, 0.016), SyncStep::Smoothed);
    }

    #[test]
    fn test_fire_uses_synced_offset() {
        let (sync_tx, sync_rx) = unreliable_channel(8);
        let (fire_tx, fire_rx) = reliable_channel();
        let mut client = CompensationClient::new(sync_rx, fire_tx);

        sync_tx.send(&ClockSyncUpdate { server_now: 2.5, ..Default::default() }).unwrap();
        client.tick(2.0, 0.016);

        let shooter = MockShooter::default();
        let attempt = client
            .try_fire(FireMode::Primary, 2.0, &shooter, &MockPingSource(Some(60.0)), &mut MockPreFireEffect::default())
            .unwrap();

        assert!(matches!(attempt, FireAttempt::Sent { offset_source: OffsetSource::Synced, .. }));
        let request = fire_rx.try_recv().unwrap().unwrap();
        assert!((request.offset_server_minus_client - 0.5).abs() < 1e-6);
        assert_eq!(client.requests_sent(), 1);
    }

    #[test]
    fn test_resumes_from_newest_sample_after_stall() {
        let (sync_tx, sync_rx) = unreliable_channel(SYNC_CHANNEL_CAPACITY);
        let (fire_tx, _fire_rx) = reliable_channel();
        let mut client = CompensationClient::new(sync_rx, fire_tx);

        // Server and client clocks agree; the client stops reading for 200 samples.
        let mut server_now = 0.0;
        for i in 1..=200u16 {
            server_now = f64::from(i) / 60.0;
            #[allow(clippy::cast_possible_truncation)]
            sync_tx.send(&ClockSyncUpdate { server_now: server_now as f32, ..Default::default() }).unwrap();
        }

        assert_eq!(client.tick(server_now, 1.0 / 60.0), SyncStep::Initialized);
        assert!(client.clock().state().offset_server_minus_client().abs() < 1e-4);
    }
}
