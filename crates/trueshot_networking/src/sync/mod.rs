//! # Clock Synchronization
//!
//! Keeps each client's estimate of `server clock - client clock` converging.
//!
//! ## Design
//!
//! ```text
//! SERVER (authority)                       CLIENT
//!   tick: server_now = sim time              tick: hard = server_now_rx - local
//!         avg frame delta                          first sample  -> snap
//!   |                                              |hard - est| > 0.20 -> snap
//!   |--- ClockSyncUpdate (~200 Hz, lossy) -->      otherwise -> smooth by alpha
//! ```
//!
//! Alpha is 0.30 for the first two seconds after activation, then 0.20 for
//! good. Loss is harmless: every sample stands alone and the client always
//! works from the newest one it has.

mod broadcast;

pub use broadcast::SyncBroadcaster;

use trueshot_shared::constants::{
    ALPHA_STEADY, ALPHA_WARMUP, ALPHA_WARMUP_SECS, SNAP_THRESHOLD_SECS,
};

use crate::protocol::ClockSyncUpdate;

/// Which side of the connection this process plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetRole {
    /// Owns the simulation (server, or listen-server host).
    Authority,
    /// Pure client; sees the server through replication.
    Client,
}

/// What a client tick did to the estimate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStep {
    /// No authoritative sample received yet; nothing to estimate from.
    AwaitingReference,
    /// First sample: estimate set to the raw gap.
    Initialized,
    /// Discontinuity: estimate replaced by the raw gap.
    Snapped,
    /// Estimate moved toward the raw gap by alpha.
    Smoothed,
}

/// Per-connection clock state.
///
/// Owned by the server-side connection; the client holds a mirror fed by
/// [`ClockSyncUpdate`]s. Never shared between connections.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClockOffsetState {
    server_now: f64,
    offset_server_minus_client: f64,
    average_frame_delta: f64,
    smoothing_alpha: f64,
    initialized: bool,
    client_timestamp: f64,
    time_since_start: f64,
    has_reference: bool,
}

impl ClockOffsetState {
    /// Creates the state for a freshly spawned connection.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            server_now: 0.0,
            offset_server_minus_client: 0.0,
            average_frame_delta: 0.0,
            smoothing_alpha: ALPHA_WARMUP,
            initialized: false,
            client_timestamp: 0.0,
            time_since_start: 0.0,
            has_reference: false,
        }
    }

    /// Latest authoritative simulation time known on this side.
    #[inline]
    #[must_use]
    pub const fn server_now(&self) -> f64 {
        self.server_now
    }

    /// Current estimate of server minus client clock.
    #[inline]
    #[must_use]
    pub const fn offset_server_minus_client(&self) -> f64 {
        self.offset_server_minus_client
    }

    /// Rolling average of the server tick delta (0 until measured).
    #[inline]
    #[must_use]
    pub const fn average_frame_delta(&self) -> f64 {
        self.average_frame_delta
    }

    /// The average frame delta, if one has been measured.
    #[inline]
    #[must_use]
    pub fn frame_delta_sample(&self) -> Option<f64> {
        (self.average_frame_delta > 0.0).then_some(self.average_frame_delta)
    }

    /// Current smoothing factor.
    #[inline]
    #[must_use]
    pub const fn smoothing_alpha(&self) -> f64 {
        self.smoothing_alpha
    }

    /// True once the client has taken its first sample.
    #[inline]
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Latest client timestamp the server echoed.
    #[inline]
    #[must_use]
    pub const fn client_timestamp(&self) -> f64 {
        self.client_timestamp
    }

    /// Seconds since the state was activated.
    #[inline]
    #[must_use]
    pub const fn time_since_start(&self) -> f64 {
        self.time_since_start
    }

    fn advance(&mut self, frame_delta: f64) {
        self.time_since_start += frame_delta.max(0.0);
        if self.time_since_start > ALPHA_WARMUP_SECS {
            self.smoothing_alpha = ALPHA_STEADY;
        }
    }

    // ------------------------------------------------------------------
    // Authority side
    // ------------------------------------------------------------------

    /// Server tick: publish the current simulation time.
    ///
    /// Also folds `frame_delta` into the rolling average the compensator
    /// uses for its base bias.
    pub fn authority_tick(&mut self, current_time: f64, frame_delta: f64) {
        self.advance(frame_delta);
        self.server_now = current_time;
        self.has_reference = true;

        if frame_delta > 0.0 {
            self.average_frame_delta = if self.average_frame_delta > 0.0 {
                (self.average_frame_delta * 15.0 + frame_delta) / 16.0
            } else {
                frame_delta
            };
        }
    }

    /// Remembers the newest client timestamp seen from this client.
    pub fn record_client_timestamp(&mut self, client_now: f64) {
        if client_now > self.client_timestamp {
            self.client_timestamp = client_now;
        }
    }

    /// The replicated fields, ready for the unreliable channel.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_update(&self) -> ClockSyncUpdate {
        ClockSyncUpdate {
            server_now: self.server_now as f32,
            average_frame_delta: self.average_frame_delta as f32,
            client_timestamp: self.client_timestamp as f32,
        }
    }

    // ------------------------------------------------------------------
    // Client side
    // ------------------------------------------------------------------

    /// Takes in the newest authoritative sample.
    ///
    /// Non-finite samples are ignored.
    pub fn apply_update(&mut self, update: &ClockSyncUpdate) {
        if !(update.server_now.is_finite()
            && update.average_frame_delta.is_finite()
            && update.client_timestamp.is_finite())
        {
            return;
        }
        self.server_now = f64::from(update.server_now);
        self.average_frame_delta = f64::from(update.average_frame_delta);
        self.client_timestamp = f64::from(update.client_timestamp);
        self.has_reference = true;
    }

    /// Client tick: move the estimate toward `server_now - local_time`.
    pub fn client_tick(&mut self, local_time: f64, frame_delta: f64) -> SyncStep {
        self.advance(frame_delta);

        if !self.has_reference {
            return SyncStep::AwaitingReference;
        }

        let hard = self.server_now - local_time;

        if !self.initialized {
            self.offset_server_minus_client = hard;
            self.initialized = true;
            return SyncStep::Initialized;
        }

        if (hard - self.offset_server_minus_client).abs() > SNAP_THRESHOLD_SECS {
            tracing::debug!(
                "Clock snap: estimate {:.4}s -> {:.4}s",
                self.offset_server_minus_client,
                hard
            );
            self.offset_server_minus_client = hard;
            return SyncStep::Snapped;
        }

        let alpha = self.smoothing_alpha;
        self.offset_server_minus_client = (1.0 - alpha) * self.offset_server_minus_client + alpha * hard;
        SyncStep::Smoothed
    }
}

impl Default for ClockOffsetState {
    fn default() -> Self {
        Self::new()
    }
}

/// The clock-sync service for one connection on one side.
#[derive(Clone, Debug)]
pub struct ClockSync {
    role: NetRole,
    state: ClockOffsetState,
}

impl ClockSync {
    /// Creates the service for a connection.
    #[must_use]
    pub const fn new(role: NetRole) -> Self {
        Self { role, state: ClockOffsetState::new() }
    }

    /// This side's role.
    #[inline]
    #[must_use]
    pub const fn role(&self) -> NetRole {
        self.role
    }

    /// Read access to the clock state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> &ClockOffsetState {
        &self.state
    }

    /// Mutable access to the clock state.
    #[inline]
    pub fn state_mut(&mut self) -> &mut ClockOffsetState {
        &mut self.state
    }

    /// True when the estimate can be trusted for a fire request.
    #[inline]
    #[must_use]
    pub const fn is_synced(&self) -> bool {
        self.state.initialized
    }

    /// Client only: takes in a received sample. Ignored on the authority.
    pub fn receive(&mut self, update: &ClockSyncUpdate) {
        if self.role == NetRole::Client {
            self.state.apply_update(update);
        }
    }

    /// Runs one simulation tick at local time `now`.
    ///
    /// Returns the client step, or `None` on the authority.
    pub fn tick(&mut self, now: f64, frame_delta: f64) -> Option<SyncStep> {
        match self.role {
            NetRole::Authority => {
                self.state.authority_tick(now, frame_delta);
                None
            }
            NetRole::Client => Some(self.state.client_tick(now, frame_delta)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 1.0 / 60.0;

    fn feed(state: &mut ClockOffsetState, server_now: f64) {
        #[allow(clippy::cast_possible_truncation)]
        state.apply_update(&ClockSyncUpdate {
            server_now: server_now as f32,
            ..Default::default()
        });
    }

    #[test]
    fn test_waits_for_reference() {
        let mut state = ClockOffsetState::new();
        assert_eq!(state.client_tick(1.0, DT), SyncStep::AwaitingReference);
        assert!(!state.is_initialized());
    }

    #[test]
    fn test_first_sample_snaps() {
        let mut state = ClockOffsetState::new();
        feed(&mut state, 10.5);
        assert_eq!(state.client_tick(10.0, DT), SyncStep::Initialized);
        assert!((state.offset_server_minus_client() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_large_discontinuity_snaps_exactly() {
        let mut state = ClockOffsetState::new();
        feed(&mut state, 10.1);
        state.client_tick(10.0, DT);
        let before = state.offset_server_minus_client();

        feed(&mut state, 10.35);
        let hard = state.server_now() - 10.0;
        assert!(hard - before > SNAP_THRESHOLD_SECS);
        assert_eq!(state.client_tick(10.0, DT), SyncStep::Snapped);
        assert_eq!(state.offset_server_minus_client(), hard);
    }

    #[test]
    fn test_small_gap_smooths() {
        let mut state = ClockOffsetState::new();
        feed(&mut state, 10.0);
        state.client_tick(10.0, DT);

        feed(&mut state, 10.1);
        assert_eq!(state.client_tick(10.0, DT), SyncStep::Smoothed);
        let expected = ALPHA_WARMUP * (state.server_now() - 10.0);
        assert!((state.offset_server_minus_client() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_alpha_schedule() {
        let mut state = ClockOffsetState::new();
        let mut t = 0.0;
        while t + 0.25 <= ALPHA_WARMUP_SECS {
            state.client_tick(t, 0.25);
            t += 0.25;
            assert_eq!(state.smoothing_alpha(), ALPHA_WARMUP);
        }
        assert_eq!(state.time_since_start(), 2.0);
        assert_eq!(state.smoothing_alpha(), ALPHA_WARMUP);

        for _ in 0..100 {
            state.client_tick(t, 0.25);
            t += 0.25;
            assert_eq!(state.smoothing_alpha(), ALPHA_STEADY);
        }
    }

    #[test]
    fn test_authority_tick_averages_frame_delta() {
        let mut state = ClockOffsetState::new();
        assert_eq!(state.frame_delta_sample(), None);

        state.authority_tick(1.0, 0.016);
        assert_eq!(state.frame_delta_sample(), Some(0.016));

        state.authority_tick(1.032, 0.032);
        assert!((state.average_frame_delta() - 0.017).abs() < 1e-9);
        assert_eq!(state.server_now(), 1.032);
    }

    #[test]
    fn test_client_timestamp_only_advances() {
        let mut state = ClockOffsetState::new();
        state.record_client_timestamp(5.0);
        state.record_client_timestamp(4.0);
        assert_eq!(state.client_timestamp(), 5.0);
        assert_eq!(state.to_update().client_timestamp, 5.0);
    }

    #[test]
    fn test_authority_ignores_received_samples() {
        let mut sync = ClockSync::new(NetRole::Authority);
        sync.receive(&ClockSyncUpdate { server_now: 99.0, ..Default::default() });
        assert_eq!(sync.tick(1.0, DT), None);
        assert_eq!(sync.state().server_now(), 1.0);
    }
}
