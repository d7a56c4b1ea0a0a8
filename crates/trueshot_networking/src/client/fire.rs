//! # Fire Request Builder
//!
//! Decides whether a fire press is legal and, if so, packages it with the
//! best clock-offset estimate available at that instant.
//!
//! Offset estimate, first available wins:
//!
//! 1. the synced `offset_server_minus_client`
//! 2. half the round-trip ping
//! 3. a fixed 10 ms
//!
//! So a request can always be sent, even before the first clock sample.

use trueshot_shared::constants::{FALLBACK_OFFSET_SECS, PRE_FIRE_MARGIN_SECS};

use crate::error::ChannelError;
use crate::integration::{AimSource, PingSource, PreFireEffect, WeaponTimers};
use crate::protocol::{FireMode, FireRequest};
use crate::sync::{ClockOffsetState, NetRole};
use crate::transport::ReliableSender;

/// Which link of the fallback chain produced an offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OffsetSource {
    /// Smoothed clock-sync estimate.
    Synced,
    /// Half the reported round trip.
    HalfPing,
    /// Fixed fallback.
    Fallback,
}

/// A clock-offset estimate and where it came from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OffsetEstimate {
    /// Estimated server minus client clock, seconds.
    pub seconds: f64,
    /// Provenance.
    pub source: OffsetSource,
}

/// Picks the best offset estimate available.
#[must_use]
pub fn estimate_offset<P: PingSource + ?Sized>(clock: Option<&ClockOffsetState>, ping: &P) -> OffsetEstimate {
    if let Some(state) = clock.filter(|s| s.is_initialized()) {
        return OffsetEstimate {
            seconds: state.offset_server_minus_client(),
            source: OffsetSource::Synced,
        };
    }

    match ping.reported_ping_ms() {
        Some(ms) if ms.is_finite() && ms > 0.0 => OffsetEstimate {
            seconds: 0.5 * f64::from(ms) / 1000.0,
            source: OffsetSource::HalfPing,
        },
        _ => OffsetEstimate {
            seconds: FALLBACK_OFFSET_SECS,
            source: OffsetSource::Fallback,
        },
    }
}

/// Readiness rule for one mode at local time `now`.
///
/// Allowed when the other mode is not an exclusive mode that is firing, the
/// mode's cooldown allows it, and the next fire time is within the pre-fire
/// window minus a small quantization margin.
#[must_use]
pub fn alt_ready_to_fire<W: WeaponTimers + ?Sized>(weapon: &W, mode: FireMode, now: f64) -> bool {
    let other = mode.other();
    if weapon.is_mode_exclusive(other) && weapon.is_firing(other) {
        return false;
    }
    if !weapon.cooldown_allows(mode) {
        return false;
    }
    weapon.next_fire_time(mode) <= now + weapon.pre_fire_time(mode) - PRE_FIRE_MARGIN_SECS
}

/// Result of a fire attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FireAttempt {
    /// Request built and queued for the server.
    Sent {
        /// The request as sent.
        request: FireRequest,
        /// Which offset estimate it carries.
        offset_source: OffsetSource,
    },
    /// Authority side: the caller fires directly, no request needed.
    FireLocally,
    /// Readiness rule said no.
    NotReady,
}

/// Builds and sends fire requests for one local player.
pub struct FireRequestBuilder {
    role: NetRole,
    channel: Option<ReliableSender<FireRequest>>,
    requests_sent: u64,
}

impl FireRequestBuilder {
    /// A pure client that sends requests over `channel`.
    #[must_use]
    pub const fn for_client(channel: ReliableSender<FireRequest>) -> Self {
        Self {
            role: NetRole::Client,
            channel: Some(channel),
            requests_sent: 0,
        }
    }

    /// The authoritative side: never builds requests.
    #[must_use]
    pub const fn for_authority() -> Self {
        Self {
            role: NetRole::Authority,
            channel: None,
            requests_sent: 0,
        }
    }

    /// This builder's role.
    #[must_use]
    pub const fn role(&self) -> NetRole {
        self.role
    }

    /// Requests sent so far.
    #[must_use]
    pub const fn requests_sent(&self) -> u64 {
        self.requests_sent
    }

    /// Attempts to fire `mode` at local time `now`.
    ///
    /// Aim and eye position are sampled here, not at render time.
    ///
    /// # Errors
    ///
    /// Propagates channel errors when the request cannot be queued.
    pub fn try_fire<S, P, E>(
        &mut self,
        mode: FireMode,
        now: f64,
        shooter: &S,
        clock: Option<&ClockOffsetState>,
        ping: &P,
        effects: &mut E,
    ) -> Result<FireAttempt, ChannelError>
    where
        S: WeaponTimers + AimSource + ?Sized,
        P: PingSource + ?Sized,
        E: PreFireEffect + ?Sized,
    {
        if !alt_ready_to_fire(shooter, mode, now) {
            return Ok(FireAttempt::NotReady);
        }

        let rotation = shooter.view_rotation();
        let position = shooter.eye_position();

        effects.play_pre_fire(mode);

        let Some(channel) = self.channel.as_ref().filter(|_| self.role == NetRole::Client) else {
            return Ok(FireAttempt::FireLocally);
        };

        let estimate = estimate_offset(clock, ping);
        let request = FireRequest {
            mode,
            client_now: now,
            offset_server_minus_client: estimate.seconds,
            rotation,
            position,
        };

        channel.send(&request)?;
        self.requests_sent += 1;

        tracing::trace!(
            "Fire request {:?}: client_now={:.4} offset={:.4} ({:?})",
            mode,
            now,
            estimate.seconds,
            estimate.source
        );

        Ok(FireAttempt::Sent {
            request,
            offset_source: estimate.source,
        })
    }
}
