//! # Client Connection
//!
//! Server-side state for one connected client.
//!
//! ## Design
//!
//! - Owns exactly one [`ClockOffsetState`]; nothing else touches it
//! - Holds both channel endpoints for the connection
//! - One deferred-fire slot per fire mode
//! - Carries the player's buffer mode; the compensator reads it per request

use super::ping::PingTracker;
use crate::error::ChannelError;
use crate::integration::{PingSource, ValidatedShot};
use crate::protocol::{ClockSyncUpdate, FireMode, FireRequest};
use crate::sync::{ClockOffsetState, SyncBroadcaster};
use crate::transport::{ReliableReceiver, UnreliableSender};
use trueshot_shared::BufferMode;

/// Unique identifier for a client connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Server-side endpoint of one client.
pub struct ClientConnection {
    id: ConnectionId,
    clock: ClockOffsetState,
    ping: PingTracker,
    broadcaster: SyncBroadcaster,
    sync_tx: UnreliableSender<ClockSyncUpdate>,
    fire_rx: ReliableReceiver<FireRequest>,
    deferred: [Option<ValidatedShot>; 2],
    match_active: bool,
    buffer_mode: BufferMode,
    requests_received: u64,
    requests_rejected: u64,
}

impl ClientConnection {
    /// Creates the connection with fresh clock state and the default
    /// buffer mode.
    #[must_use]
    pub fn new(
        id: ConnectionId,
        sync_tx: UnreliableSender<ClockSyncUpdate>,
        fire_rx: ReliableReceiver<FireRequest>,
    ) -> Self {
        Self {
            id,
            clock: ClockOffsetState::new(),
            ping: PingTracker::new(),
            broadcaster: SyncBroadcaster::default(),
            sync_tx,
            fire_rx,
            deferred: [None; 2],
            match_active: true,
            buffer_mode: BufferMode::default(),
            requests_received: 0,
            requests_rejected: 0,
        }
    }

    /// Connection ID.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// This connection's clock state.
    #[inline]
    #[must_use]
    pub const fn clock(&self) -> &ClockOffsetState {
        &self.clock
    }

    /// Ping tracker.
    #[inline]
    #[must_use]
    pub const fn ping(&self) -> &PingTracker {
        &self.ping
    }

    /// Folds in a round-trip measurement from the transport.
    pub fn record_ping(&mut self, rtt_ms: f32) {
        self.ping.record_sample(rtt_ms);
    }

    /// Server tick: advance the clock state and broadcast it when due.
    ///
    /// Returns whether a sample went out.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Disconnected`] once the client end is gone.
    pub fn tick(&mut self, now: f64, frame_delta: f64) -> Result<bool, ChannelError> {
        self.clock.authority_tick(now, frame_delta);
        self.broadcaster.tick(frame_delta, &self.clock, &self.sync_tx)
    }

    /// Takes the next fire request, in the order the client sent them.
    ///
    /// Undecodable frames are logged and skipped.
    pub fn poll_fire_request(&mut self) -> Option<FireRequest> {
        while let Some(result) = self.fire_rx.try_recv() {
            match result {
                Ok(request) => {
                    self.requests_received += 1;
                    self.clock.record_client_timestamp(request.client_now);
                    return Some(request);
                }
                Err(e) => {
                    self.requests_rejected += 1;
                    tracing::warn!("Connection {}: dropping malformed fire request: {e}", self.id);
                }
            }
        }
        None
    }

    /// False once the owner's match or round has ended.
    #[inline]
    #[must_use]
    pub const fn match_active(&self) -> bool {
        self.match_active
    }

    /// Marks the owner's match or round as running or over.
    pub fn set_match_active(&mut self, active: bool) {
        if self.match_active != active {
            tracing::info!("Connection {}: match active = {active}", self.id);
        }
        self.match_active = active;
    }

    /// Buffer formula selected for this player.
    #[inline]
    #[must_use]
    pub const fn buffer_mode(&self) -> BufferMode {
        self.buffer_mode
    }

    /// Selects the player's buffer formula. Applies from the next request.
    pub fn set_buffer_mode(&mut self, mode: BufferMode) {
        if self.buffer_mode != mode {
            tracing::info!("Connection {}: buffer mode {} -> {mode}", self.id, self.buffer_mode);
        }
        self.buffer_mode = mode;
    }

    /// Parks a shot until the weapon is ready. Replaces any shot already
    /// parked for the same mode.
    pub fn defer(&mut self, shot: ValidatedShot) {
        self.deferred[shot.mode.index()] = Some(shot);
    }

    /// Removes and returns the shot parked for `mode`.
    pub fn take_deferred(&mut self, mode: FireMode) -> Option<ValidatedShot> {
        self.deferred[mode.index()].take()
    }

    /// True if a shot is parked for `mode`.
    #[must_use]
    pub const fn has_deferred(&self, mode: FireMode) -> bool {
        self.deferred[mode.index()].is_some()
    }

    /// Fire requests decoded so far.
    #[must_use]
    pub const fn requests_received(&self) -> u64 {
        self.requests_received
    }

    /// Fire frames that failed to decode.
    #[must_use]
    pub const fn requests_rejected(&self) -> u64 {
        self.requests_rejected
    }

    /// Clock samples broadcast so far.
    #[must_use]
    pub const fn samples_sent(&self) -> u64 {
        self.broadcaster.sent()
    }
}

impl PingSource for ClientConnection {
    fn reported_ping_ms(&self) -> Option<f32> {
        self.ping.reported_ping_ms()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("clock", &self.clock)
            .field("ping", &self.ping)
            .field("match_active", &self.match_active)
            .field("buffer_mode", &self.buffer_mode)
            .finish_non_exhaustive()
    }
}
