//! # Worked Scenarios
//!
//! Hand-computed examples, end to end through the public API.
//!
//! Run with: cargo test --package trueshot_security --test scenarios

use trueshot_networking::integration::{MockFireAuthority, MockPingSource, MockPositionSource};
use trueshot_networking::protocol::{ClockSyncUpdate, FireMode, FireRequest};
use trueshot_networking::server::{ClientConnection, ConnectionId};
use trueshot_networking::sync::{ClockOffsetState, SyncStep};
use trueshot_networking::transport::{reliable_channel, unreliable_channel};
use trueshot_security::compensation::BufferPolicy;
use trueshot_security::{FireOutcome, LatencyCompensator};
use trueshot_shared::{BufferMode, CompensationConfig, Rotator, Vec3};

#[test]
fn scenario_low_ping_softmax_buffer() {
    let config = CompensationConfig {
        low_ping_threshold_ms: 30.0,
        min_puffer_s: 0.004,
        low_ping_boost_s: 0.002,
        ..CompensationConfig::default()
    };
    let buffer = BufferPolicy::new(config).buffer_seconds(BufferMode::Softmax, 20.0);
    assert!((buffer - 0.006).abs() < 1e-12, "buffer {buffer}");
}

#[test]
fn scenario_upload_lag_from_client_time() {
    let (sync_tx, _sync_rx) = unreliable_channel(4);
    let (fire_tx, fire_rx) = reliable_channel();
    let mut connection = ClientConnection::new(ConnectionId(0), sync_tx, fire_rx);
    connection.tick(100.070, 0.0).unwrap();

    let request = FireRequest {
        mode: FireMode::Primary,
        client_now: 100.000,
        offset_server_minus_client: 0.050,
        rotation: Rotator::new(0, 0),
        position: Vec3::new(0.0, 0.0, 64.0),
    };

    let compensator = LatencyCompensator::new(CompensationConfig::default());
    let breakdown = compensator.compute(&request, connection.clock(), &MockPingSource(Some(100.0)), connection.buffer_mode());
    assert!((breakdown.shot_server_time - 100.050).abs() < 1e-9);
    assert!((breakdown.upload_lag - 0.020).abs() < 1e-9);

    // Same request through the wire: f32 on the wire costs precision at t=100.
    fire_tx.send(&request).unwrap();
    let received = connection.poll_fire_request().unwrap();
    let wire = compensator.compute(&received, connection.clock(), &MockPingSource(Some(100.0)), connection.buffer_mode());
    assert!((wire.upload_lag - 0.020).abs() < 1e-4);

    let mut authority = MockFireAuthority::new();
    let mut compensator = compensator;
    let outcome = compensator
        .handle_request(&received, &mut connection, &mut authority, &MockPositionSource(Some(Vec3::new(0.0, 0.0, 64.0))))
        .unwrap();
    let FireOutcome::Started(shot) = outcome else {
        panic!("expected Started, got {outcome:?}");
    };
    assert!(shot.result.reasonable);
    assert!(shot.result.ping_lag_seconds <= 0.054);
}

#[test]
fn scenario_discontinuity_snaps_offset() {
    let mut state = ClockOffsetState::new();
    state.apply_update(&ClockSyncUpdate { server_now: 20.100, ..Default::default() });
    state.client_tick(20.0, 1.0 / 60.0);

    state.apply_update(&ClockSyncUpdate { server_now: 20.350, ..Default::default() });
    assert_eq!(state.client_tick(20.0, 1.0 / 60.0), SyncStep::Snapped);
    assert!((state.offset_server_minus_client() - 0.350).abs() < 1e-5);
}
