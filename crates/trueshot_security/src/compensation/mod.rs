//! # Latency Compensation
//!
//! Turns a fire request into a bounded rewind the hit logic can trust.
//!
//! ## Pipeline
//!
//! ```text
//! FireRequest ─► shot server time = client_now + offset
//!             ─► upload lag       = max(0, server_now - shot server time)
//!             ─► base bias        = min(6 ms, 0.75 × avg frame delta) | 3 ms
//!             ─► mode buffer      = BufferPolicy(mode, ping)
//!             ─► rewind           = clamp(sum, 0, max rewind)
//!             ─► reasonableness   = |reported - eye|² < 1250
//!             ─► FireAuthority    : start | defer | ammo resync
//! ```
//!
//! The rewind ceiling is `clamp(ping × 0.5 + 4 ms, 0, 45 ms)`. However large
//! the client's claimed delay, the server never reaches further back than
//! half the round trip plus a little slack.

mod buffer;
mod deferred;

pub use buffer::{strategy, BufferFn, BufferPolicy};
pub use deferred::retry_deferred;

use thiserror::Error;
use trueshot_networking::integration::{
    CompensationResult, FireAuthority, FireModeKind, PingSource, PositionSource, ValidatedShot,
};
use trueshot_networking::protocol::{FireMode, FireRequest};
use trueshot_networking::server::ClientConnection;
use trueshot_networking::sync::ClockOffsetState;
use trueshot_networking::ChannelError;
use trueshot_shared::constants::{
    BASE_BIAS_CAP_SECS, BASE_BIAS_DEFAULT_SECS, BASE_BIAS_FRAME_SHARE, DEFAULT_PING_SECS,
    MAX_REWIND_CEILING_SECS, MAX_REWIND_PING_SHARE, MAX_REWIND_SLACK_SECS,
};
use trueshot_shared::{BufferMode, CompensationConfig};

use crate::validation::ReasonablenessValidator;

/// Compensation errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompensationError {
    /// The targeted fire-mode slot is not an instant-hit mode.
    #[error("fire mode {mode:?} holds {kind:?}, expected an instant-hit mode")]
    MisconfiguredSlot {
        /// Requested mode.
        mode: FireMode,
        /// What the slot actually holds.
        kind: FireModeKind,
    },

    /// A channel endpoint went away.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Every intermediate quantity of one compensation, in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CompensationBreakdown {
    /// Reconstructed server time of the shot.
    pub shot_server_time: f64,
    /// Server time elapsed since the shot, floored at 0.
    pub upload_lag: f64,
    /// Round trip used, seconds.
    pub ping_seconds: f64,
    /// Per-step bias from the server frame rate.
    pub base_bias: f64,
    /// Buffer from the policy.
    pub mode_buffer: f64,
    /// Sum before clamping.
    pub raw_lag: f64,
    /// Ceiling for this ping.
    pub max_rewind: f64,
    /// Final bounded rewind.
    pub ping_lag: f64,
}

/// Rewind ceiling for a ping in seconds.
#[inline]
#[must_use]
pub fn max_rewind(ping_seconds: f64) -> f64 {
    (ping_seconds * MAX_REWIND_PING_SHARE + MAX_REWIND_SLACK_SECS).clamp(0.0, MAX_REWIND_CEILING_SECS)
}

/// Base bias from the server's average frame delta, if measured.
#[inline]
#[must_use]
pub fn base_bias(frame_delta_sample: Option<f64>) -> f64 {
    frame_delta_sample.map_or(BASE_BIAS_DEFAULT_SECS, |dt| {
        (dt * BASE_BIAS_FRAME_SHARE).min(BASE_BIAS_CAP_SECS)
    })
}

/// Why a request went nowhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// The owner's match or round is over.
    MatchOver,
    /// Reported position failed the check and rejection is enabled.
    Unreasonable,
}

/// What happened to one fire request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FireOutcome {
    /// Weapon started firing with the compensated shot.
    Started(ValidatedShot),
    /// Weapon not ready yet; parked on the connection for a later tick.
    Deferred(ValidatedShot),
    /// Weapon may not fire; the client was told its ammo count.
    AmmoResync {
        /// Mode that was refused.
        mode: FireMode,
        /// Server's ammo count for it.
        amount: u32,
    },
    /// Silently discarded.
    Dropped(DropReason),
}

/// Running counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompensatorStats {
    /// Requests taken in.
    pub processed: u64,
    /// Shots started (including retried deferred ones).
    pub started: u64,
    /// Shots parked.
    pub deferred: u64,
    /// Ammo resyncs issued.
    pub ammo_resyncs: u64,
    /// Requests dropped.
    pub dropped: u64,
    /// Requests aborted on a misconfigured slot.
    pub aborted: u64,
    /// Requests whose position failed the check.
    pub unreasonable: u64,
    /// Rewinds cut down by the ceiling.
    pub clamped: u64,
}

/// Server-side latency compensator.
///
/// One per server. Per-connection state, including each player's buffer
/// mode, lives on [`ClientConnection`].
#[derive(Clone, Debug)]
pub struct LatencyCompensator {
    policy: BufferPolicy,
    validator: ReasonablenessValidator,
    stats: CompensatorStats,
}

impl LatencyCompensator {
    /// Creates a compensator with the given tuning.
    #[must_use]
    pub fn new(config: CompensationConfig) -> Self {
        Self {
            policy: BufferPolicy::new(config),
            validator: ReasonablenessValidator::new(),
            stats: CompensatorStats::default(),
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &CompensationConfig {
        self.policy.config()
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> &CompensatorStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut CompensatorStats {
        &mut self.stats
    }

    /// Computes the rewind for `request` against one connection's clock,
    /// using that player's buffer `mode`.
    ///
    /// Pure: touches nothing but its inputs.
    #[must_use]
    pub fn compute<P: PingSource + ?Sized>(
        &self,
        request: &FireRequest,
        clock: &ClockOffsetState,
        ping: &P,
        mode: BufferMode,
    ) -> CompensationBreakdown {
        let shot_server_time = request.client_now + request.offset_server_minus_client;
        let upload_lag = (clock.server_now() - shot_server_time).max(0.0);

        let ping_seconds = ping
            .reported_ping_ms()
            .filter(|ms| ms.is_finite() && *ms >= 0.0)
            .map_or(DEFAULT_PING_SECS, |ms| f64::from(ms) / 1000.0);

        let base_bias = base_bias(clock.frame_delta_sample());
        let mode_buffer = self.policy.buffer_seconds(mode, ping_seconds * 1000.0);

        let raw_lag = upload_lag + base_bias + mode_buffer;
        let max_rewind = max_rewind(ping_seconds);
        let ping_lag = raw_lag.clamp(0.0, max_rewind);

        CompensationBreakdown {
            shot_server_time,
            upload_lag,
            ping_seconds,
            base_bias,
            mode_buffer,
            raw_lag,
            max_rewind,
            ping_lag,
        }
    }

    /// Compensates one request and hands it to the fire authority.
    ///
    /// # Errors
    ///
    /// [`CompensationError::MisconfiguredSlot`] if the targeted mode is not
    /// an instant-hit mode. The connection and weapon are left untouched.
    pub fn handle_request<A, P>(
        &mut self,
        request: &FireRequest,
        connection: &mut ClientConnection,
        authority: &mut A,
        pawn: &P,
    ) -> Result<FireOutcome, CompensationError>
    where
        A: FireAuthority + ?Sized,
        P: PositionSource + ?Sized,
    {
        if !connection.match_active() || !authority.match_in_progress() {
            self.stats.processed += 1;
            self.stats.dropped += 1;
            tracing::trace!("Connection {}: fire request after match end dropped", connection.id());
            return Ok(FireOutcome::Dropped(DropReason::MatchOver));
        }

        let kind = authority.fire_mode_kind(request.mode);
        if kind != FireModeKind::InstantHit {
            self.stats.aborted += 1;
            tracing::error!(
                "Connection {}: fire mode {:?} holds {:?}, not an instant-hit mode; request aborted",
                connection.id(),
                request.mode,
                kind
            );
            return Err(CompensationError::MisconfiguredSlot { mode: request.mode, kind });
        }

        self.stats.processed += 1;

        let mode = connection.buffer_mode();
        let breakdown = self.compute(request, connection.clock(), &*connection, mode);
        if breakdown.raw_lag > breakdown.max_rewind {
            self.stats.clamped += 1;
        }

        let position = self.policy.reported_position(mode, request.position);
        let reasonable = self.validator.is_reasonable(position, pawn.current_eye_position());

        if self.config().debug_logging {
            tracing::debug!(
                "Connection {} {:?}: shot_t={:.4} upload={:.4} ping={:.4} bias={:.4} \
                 buffer={:.4} ({}) raw={:.4} max={:.4} lag={:.4} reasonable={}",
                connection.id(),
                request.mode,
                breakdown.shot_server_time,
                breakdown.upload_lag,
                breakdown.ping_seconds,
                breakdown.base_bias,
                breakdown.mode_buffer,
                mode,
                breakdown.raw_lag,
                breakdown.max_rewind,
                breakdown.ping_lag,
                reasonable
            );
        }

        if !reasonable {
            self.stats.unreasonable += 1;
            tracing::warn!(
                "Connection {}: reported eye position {:?} fails reasonableness check",
                connection.id(),
                position
            );
            if self.config().reject_unreasonable {
                self.stats.dropped += 1;
                return Ok(FireOutcome::Dropped(DropReason::Unreasonable));
            }
        }

        let shot = ValidatedShot {
            mode: request.mode,
            result: CompensationResult { ping_lag_seconds: breakdown.ping_lag, reasonable },
            rotation: request.rotation,
            position,
            shot_server_time: breakdown.shot_server_time,
        };

        Ok(self.dispatch(shot, connection, authority))
    }

    /// Start, defer or resync, depending on the weapon.
    fn dispatch<A: FireAuthority + ?Sized>(
        &mut self,
        shot: ValidatedShot,
        connection: &mut ClientConnection,
        authority: &mut A,
    ) -> FireOutcome {
        let mode = shot.mode;
        if !authority.allow_fire(mode) {
            let amount = authority.ammo_amount(mode);
            authority.request_ammo_resync(mode, amount);
            self.stats.ammo_resyncs += 1;
            return FireOutcome::AmmoResync { mode, amount };
        }

        if authority.is_ready(mode) {
            authority.start_fire(mode, &shot);
            self.stats.started += 1;
            FireOutcome::Started(shot)
        } else {
            connection.defer(shot);
            self.stats.deferred += 1;
            FireOutcome::Deferred(shot)
        }
    }

    /// Drains every queued fire request on `connection` and retries its
    /// deferred shots. Call once per server tick.
    pub fn service<A, P>(
        &mut self,
        connection: &mut ClientConnection,
        authority: &mut A,
        pawn: &P,
    ) -> TickSummary
    where
        A: FireAuthority + ?Sized,
        P: PositionSource + ?Sized,
    {
        let mut summary = TickSummary::default();

        for outcome in retry_deferred(self, connection, authority).into_iter().flatten() {
            summary.record(&outcome);
        }

        while let Some(request) = connection.poll_fire_request() {
            match self.handle_request(&request, connection, authority, pawn) {
                Ok(outcome) => summary.record(&outcome),
                Err(_) => summary.aborted += 1,
            }
        }

        summary
    }
}

impl Default for LatencyCompensator {
    fn default() -> Self {
        Self::new(CompensationConfig::default())
    }
}

/// Outcome counts for one connection over one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Shots started.
    pub started: u32,
    /// Shots parked.
    pub deferred: u32,
    /// Ammo resyncs.
    pub ammo_resyncs: u32,
    /// Requests dropped.
    pub dropped: u32,
    /// Requests aborted.
    pub aborted: u32,
}

impl TickSummary {
    fn record(&mut self, outcome: &FireOutcome) {
        match outcome {
            FireOutcome::Started(_) => self.started += 1,
            FireOutcome::Deferred(_) => self.deferred += 1,
            FireOutcome::AmmoResync { .. } => self.ammo_resyncs += 1,
            FireOutcome::Dropped(_) => self.dropped += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trueshot_networking::integration::{MockFireAuthority, MockPingSource, MockPositionSource};
    use trueshot_networking::protocol::ClockSyncUpdate;
    use trueshot_networking::server::ConnectionId;
    use trueshot_networking::transport::{
        reliable_channel, unreliable_channel, ReliableSender, UnreliableReceiver,
    };
    use trueshot_shared::constants::CLAMP_MAX_SECS;
    use trueshot_shared::{BufferMode, Rotator, Vec3};

    fn request(client_now: f64, offset: f64) -> FireRequest {
        FireRequest {
            mode: FireMode::Primary,
            client_now,
            offset_server_minus_client: offset,
            rotation: Rotator::new(10, 20),
            position: Vec3::new(1.0, 1.0, 1.0),
        }
    }

    fn connection_at(server_now: f64) -> (
        ClientConnection,
        UnreliableReceiver<ClockSyncUpdate>,
        ReliableSender<FireRequest>,
    ) {
        let (sync_tx, sync_rx) = unreliable_channel(4);
        let (fire_tx, fire_rx) = reliable_channel();
        let mut conn = ClientConnection::new(ConnectionId(1), sync_tx, fire_rx);
        conn.set_buffer_mode(BufferMode::Legacy);
        conn.tick(server_now, 0.0).unwrap();
        (conn, sync_rx, fire_tx)
    }

    fn legacy() -> LatencyCompensator {
        LatencyCompensator::new(CompensationConfig::default().with_buffer_mode(BufferMode::Legacy))
    }


    #[test]
    fn test_upload_lag_reconstruction() {
        let mut clock = ClockOffsetState::new();
        clock.authority_tick(100.070, 0.0);

        let breakdown = legacy().compute(
            &request(100.000, 0.050),
            &clock,
            &MockPingSource(Some(200.0)),
            BufferMode::Legacy,
        );

        assert!((breakdown.shot_server_time - 100.050).abs() < 1e-9);
        assert!((breakdown.upload_lag - 0.020).abs() < 1e-9);
    }

    #[test]
    fn test_shot_from_future_has_no_upload_lag() {
        let mut clock = ClockOffsetState::new();
        clock.authority_tick(10.0, 0.0);

        let breakdown = legacy().compute(&request(10.5, 0.0), &clock, &MockPingSource(None), BufferMode::Legacy);
        assert_eq!(breakdown.upload_lag, 0.0);
        assert_eq!(breakdown.ping_seconds, DEFAULT_PING_SECS);
        assert_eq!(breakdown.base_bias, BASE_BIAS_DEFAULT_SECS);
        assert!((breakdown.ping_lag - 0.003).abs() < 1e-12);
    }

    #[test]
    fn test_base_bias() {
        assert_eq!(base_bias(None), BASE_BIAS_DEFAULT_SECS);
        assert!((base_bias(Some(0.004)) - 0.003).abs() < 1e-12);
        assert_eq!(base_bias(Some(1.0 / 30.0)), BASE_BIAS_CAP_SECS);
    }

    #[test]
    fn test_max_rewind_ceiling() {
        assert!((max_rewind(0.020) - 0.014).abs() < 1e-12);
        assert_eq!(max_rewind(0.5), MAX_REWIND_CEILING_SECS);
        assert_eq!(max_rewind(-1.0), 0.0);
    }

    #[test]
    fn test_huge_claimed_delay_is_clamped() {
        let mut clock = ClockOffsetState::new();
        clock.authority_tick(50.0, 1.0 / 60.0);

        let compensator = LatencyCompensator::default();
        let breakdown = compensator.compute(&request(40.0, 0.0), &clock, &MockPingSource(Some(60.0)), BufferMode::Softmax);

        assert!(breakdown.raw_lag > 9.0);
        assert!((breakdown.ping_lag - 0.034).abs() < 1e-9);
    }

    #[test]
    fn test_started_when_ready() {
        let (mut conn, _rx, _tx) = connection_at(100.070);
        let mut authority = MockFireAuthority::new();
        let mut compensator = legacy();

        let outcome = compensator
            .handle_request(&request(100.0, 0.05), &mut conn, &mut authority, &MockPositionSource(None))
            .unwrap();

        let FireOutcome::Started(shot) = outcome else {
            panic!("expected Started, got {outcome:?}");
        };
        assert!(shot.result.reasonable);
        assert_eq!(shot.rotation, Rotator::new(10, 20));
        assert_eq!(authority.started.len(), 1);
        assert_eq!(compensator.stats().started, 1);
    }

    #[test]
    fn test_not_ready_defers() {
        let (mut conn, _rx, _tx) = connection_at(5.0);
        let mut authority = MockFireAuthority { ready: false, ..MockFireAuthority::new() };

        let outcome = legacy()
            .handle_request(&request(5.0, 0.0), &mut conn, &mut authority, &MockPositionSource(None))
            .unwrap();

        assert!(matches!(outcome, FireOutcome::Deferred(_)));
        assert!(conn.has_deferred(FireMode::Primary));
        assert!(authority.started.is_empty());
    }

    #[test]
    fn test_disallowed_resyncs_ammo() {
        let (mut conn, _rx, _tx) = connection_at(5.0);
        let mut authority = MockFireAuthority { allowed: false, ammo: 0, ..MockFireAuthority::new() };

        let outcome = legacy()
            .handle_request(&request(5.0, 0.0), &mut conn, &mut authority, &MockPositionSource(None))
            .unwrap();

        assert_eq!(outcome, FireOutcome::AmmoResync { mode: FireMode::Primary, amount: 0 });
        assert_eq!(authority.resyncs, vec![(FireMode::Primary, 0)]);
    }

    #[test]
    fn test_misconfigured_slot_aborts_cleanly() {
        let (mut conn, _rx, _tx) = connection_at(5.0);
        let mut authority = MockFireAuthority { kind: FireModeKind::Projectile, ..MockFireAuthority::new() };
        let mut compensator = legacy();

        let err = compensator
            .handle_request(&request(5.0, 0.0), &mut conn, &mut authority, &MockPositionSource(None))
            .unwrap_err();

        assert_eq!(
            err,
            CompensationError::MisconfiguredSlot { mode: FireMode::Primary, kind: FireModeKind::Projectile }
        );
        assert!(authority.started.is_empty());
        assert!(authority.resyncs.is_empty());
        assert_eq!(authority.ammo, 10);
        assert!(!conn.has_deferred(FireMode::Primary));
        assert_eq!(compensator.stats().processed, 0);
    }

    #[test]
    fn test_match_over_drops_silently() {
        let (mut conn, _rx, _tx) = connection_at(5.0);
        conn.set_match_active(false);
        let mut authority = MockFireAuthority::new();

        let outcome = legacy()
            .handle_request(&request(5.0, 0.0), &mut conn, &mut authority, &MockPositionSource(None))
            .unwrap();

        assert_eq!(outcome, FireOutcome::Dropped(DropReason::MatchOver));
        assert!(authority.started.is_empty());
    }

    #[test]
    fn test_unreasonable_position_flagged_not_rejected() {
        let (mut conn, _rx, _tx) = connection_at(5.0);
        let mut authority = MockFireAuthority::new();
        let pawn = MockPositionSource(Some(Vec3::new(100.0, 0.0, 0.0)));

        let outcome = legacy()
            .handle_request(&request(5.0, 0.0), &mut conn, &mut authority, &pawn)
            .unwrap();

        let FireOutcome::Started(shot) = outcome else {
            panic!("expected Started, got {outcome:?}");
        };
        assert!(!shot.result.reasonable);
    }

    #[test]
    fn test_unreasonable_position_rejected_when_configured() {
        let (mut conn, _rx, _tx) = connection_at(5.0);
        let mut authority = MockFireAuthority::new();
        let pawn = MockPositionSource(Some(Vec3::new(100.0, 0.0, 0.0)));
        let config = CompensationConfig { reject_unreasonable: true, ..CompensationConfig::default() };

        let outcome = LatencyCompensator::new(config)
            .handle_request(&request(5.0, 0.0), &mut conn, &mut authority, &pawn)
            .unwrap();

        assert_eq!(outcome, FireOutcome::Dropped(DropReason::Unreasonable));
        assert!(authority.started.is_empty());
    }

    #[test]
    fn test_service_drains_in_order() {
        let (mut conn, _rx, fire_tx) = connection_at(5.0);
        let mut authority = MockFireAuthority::new();
        let mut compensator = legacy();

        fire_tx.send(&request(4.9, 0.0)).unwrap();
        fire_tx.send(&request(4.95, 0.0)).unwrap();

        let summary = compensator.service(&mut conn, &mut authority, &MockPositionSource(None));

        assert_eq!(summary.started, 2);
        let times: Vec<f64> = authority.started.iter().map(|(_, s)| s.shot_server_time).collect();
        assert!(times[0] < times[1]);
    }

    #[test]
    fn test_buffer_mode_read_per_connection() {
        let (mut plain, _rx_a, _tx_a) = connection_at(5.0);
        let (mut clamped, _rx_b, _tx_b) = connection_at(5.0);
        plain.record_ping(200.0);
        clamped.record_ping(200.0);
        clamped.set_buffer_mode(BufferMode::Clamp);

        let mut compensator = LatencyCompensator::default();
        let shot = request(4.99, 0.0);

        let a = compensator.compute(&shot, plain.clock(), &plain, plain.buffer_mode());
        let b = compensator.compute(&shot, clamped.clock(), &clamped, clamped.buffer_mode());
        assert_eq!(a.mode_buffer, 0.0);
        assert_eq!(b.mode_buffer, CLAMP_MAX_SECS);

        let mut authority = MockFireAuthority::new();
        let pawn = MockPositionSource(None);
        let FireOutcome::Started(first) = compensator.handle_request(&shot, &mut plain, &mut authority, &pawn).unwrap()
        else {
            panic!("expected Started");
        };
        let FireOutcome::Started(second) =
            compensator.handle_request(&shot, &mut clamped, &mut authority, &pawn).unwrap()
        else {
            panic!("expected Started");
        };
        assert!(first.result.ping_lag_seconds < second.result.ping_lag_seconds);
        assert_eq!(second.result.ping_lag_seconds, MAX_REWIND_CEILING_SECS);
    }

    #[test]
    fn test_debug_logging_does_not_change_outcomes() {
        fn run(debug_logging: bool) -> (Vec<FireOutcome>, CompensatorStats) {
            let config = CompensationConfig { debug_logging, ..CompensationConfig::default() };
            let mut compensator = LatencyCompensator::new(config);
            let (mut conn, _rx, _tx) = connection_at(5.0);
            conn.record_ping(90.0);

            let near = MockPositionSource(Some(Vec3::new(1.0, 1.0, 1.0)));
            let far = MockPositionSource(Some(Vec3::new(100.0, 0.0, 0.0)));
            let mut ready = MockFireAuthority::new();
            let mut busy = MockFireAuthority { ready: false, ..MockFireAuthority::new() };
            let mut empty = MockFireAuthority { allowed: false, ..MockFireAuthority::new() };

            let outcomes = vec![
                compensator.handle_request(&request(4.95, 0.02), &mut conn, &mut ready, &near).unwrap(),
                compensator.handle_request(&request(4.90, 0.0), &mut conn, &mut ready, &far).unwrap(),
                compensator.handle_request(&request(4.98, 0.01), &mut conn, &mut busy, &near).unwrap(),
                compensator.handle_request(&request(4.99, 0.0), &mut conn, &mut empty, &near).unwrap(),
            ];
            (outcomes, *compensator.stats())
        }

        assert_eq!(run(true), run(false));
    }
}
