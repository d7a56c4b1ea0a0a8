//! Deferred-fire retry.
//!
//! A shot that arrives while the weapon is between fire windows is parked on
//! the connection, one slot per mode. Each tick the slot is offered to the
//! weapon again with the shot exactly as it was compensated.

use trueshot_networking::integration::FireAuthority;
use trueshot_networking::protocol::FireMode;
use trueshot_networking::server::ClientConnection;

use super::{DropReason, FireOutcome, LatencyCompensator};

/// Retries the parked shots of `connection`, indexed by [`FireMode::index`].
///
/// `None` where nothing was parked. A shot still not ready is parked again
/// and reported as [`FireOutcome::Deferred`].
pub fn retry_deferred<A: FireAuthority + ?Sized>(
    compensator: &mut LatencyCompensator,
    connection: &mut ClientConnection,
    authority: &mut A,
) -> [Option<FireOutcome>; 2] {
    let mut outcomes = [None; 2];

    for mode in FireMode::ALL {
        let Some(shot) = connection.take_deferred(mode) else {
            continue;
        };
        let stats = compensator.stats_mut();

        let outcome = if !connection.match_active() || !authority.match_in_progress() {
            stats.dropped += 1;
            FireOutcome::Dropped(DropReason::MatchOver)
        } else if !authority.allow_fire(mode) {
            let amount = authority.ammo_amount(mode);
            authority.request_ammo_resync(mode, amount);
            stats.ammo_resyncs += 1;
            FireOutcome::AmmoResync { mode, amount }
        } else if authority.is_ready(mode) {
            authority.start_fire(mode, &shot);
            stats.started += 1;
            tracing::trace!("Connection {}: deferred {:?} shot started", connection.id(), mode);
            FireOutcome::Started(shot)
        } else {
            connection.defer(shot);
            FireOutcome::Deferred(shot)
        };

        outcomes[mode.index()] = Some(outcome);
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use trueshot_networking::integration::{CompensationResult, MockFireAuthority, ValidatedShot};
    use trueshot_networking::server::ConnectionId;
    use trueshot_networking::transport::{reliable_channel, unreliable_channel};
    use trueshot_shared::{Rotator, Vec3};

    fn parked(mode: FireMode) -> (ClientConnection, ValidatedShot) {
        let (sync_tx, _sync_rx) = unreliable_channel(4);
        let (_fire_tx, fire_rx) = reliable_channel();
        let mut conn = ClientConnection::new(ConnectionId(3), sync_tx, fire_rx);
        let shot = ValidatedShot {
            mode,
            result: CompensationResult { ping_lag_seconds: 0.02, reasonable: true },
            rotation: Rotator::new(1, 2),
            position: Vec3::ZERO,
            shot_server_time: 9.5,
        };
        conn.defer(shot);
        (conn, shot)
    }

    #[test]
    fn test_retry_until_ready() {
        let (mut conn, shot) = parked(FireMode::Secondary);
        let mut compensator = LatencyCompensator::default();
        let mut authority = MockFireAuthority { ready: false, ..MockFireAuthority::new() };

        let outcomes = retry_deferred(&mut compensator, &mut conn, &mut authority);
        assert_eq!(outcomes, [None, Some(FireOutcome::Deferred(shot))]);
        assert!(conn.has_deferred(FireMode::Secondary));

        authority.ready = true;
        let outcomes = retry_deferred(&mut compensator, &mut conn, &mut authority);
        assert_eq!(outcomes[1], Some(FireOutcome::Started(shot)));
        assert!(!conn.has_deferred(FireMode::Secondary));
        assert_eq!(authority.started, vec![(FireMode::Secondary, shot)]);
        assert_eq!(compensator.stats().started, 1);
    }

    #[test]
    fn test_retry_out_of_ammo_resyncs() {
        let (mut conn, _shot) = parked(FireMode::Primary);
        let mut compensator = LatencyCompensator::default();
        let mut authority = MockFireAuthority { allowed: false, ammo: 0, ..MockFireAuthority::new() };

        let outcomes = retry_deferred(&mut compensator, &mut conn, &mut authority);
        assert_eq!(outcomes[0], Some(FireOutcome::AmmoResync { mode: FireMode::Primary, amount: 0 }));
        assert!(!conn.has_deferred(FireMode::Primary));
    }

    #[test]
    fn test_retry_after_match_end_drops() {
        let (mut conn, _shot) = parked(FireMode::Primary);
        conn.set_match_active(false);
        let mut compensator = LatencyCompensator::default();
        let mut authority = MockFireAuthority::new();

        let outcomes = retry_deferred(&mut compensator, &mut conn, &mut authority);
        assert_eq!(outcomes[0], Some(FireOutcome::Dropped(DropReason::MatchOver)));
        assert!(authority.started.is_empty());
    }
}
