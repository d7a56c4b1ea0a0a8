//! # Tuning Constants
//!
//! Fixed numbers of the compensation model.
//!
//! **CRITICAL:** Client and server must agree on these.
//! The rewind ceiling in particular is a fairness guarantee: changing it
//! changes how far back any player can reach.

// =============================================================================
// CLOCK SYNC
// =============================================================================

/// Smoothing factor used right after activation (fast convergence).
pub const ALPHA_WARMUP: f64 = 0.30;

/// Smoothing factor once warm-up is over (jitter rejection).
pub const ALPHA_STEADY: f64 = 0.20;

/// Seconds since activation after which the steady alpha applies.
pub const ALPHA_WARMUP_SECS: f64 = 2.0;

/// A raw gap further than this from the estimate replaces it outright.
pub const SNAP_THRESHOLD_SECS: f64 = 0.20;

/// Target rate of clock-sync broadcasts per connection.
pub const SYNC_BROADCAST_HZ: u32 = 200;

// =============================================================================
// FIRE REQUEST (CLIENT)
// =============================================================================

/// Offset used when neither a synced reference nor a ping is known.
pub const FALLBACK_OFFSET_SECS: f64 = 0.010;

/// Early-input allowance against per-tick quantization.
pub const PRE_FIRE_MARGIN_SECS: f64 = 0.015;

// =============================================================================
// LATENCY COMPENSATION (SERVER)
// =============================================================================

/// Ping assumed when the connection reports none.
pub const DEFAULT_PING_SECS: f64 = 0.030;

/// Upper bound of the per-step base bias.
pub const BASE_BIAS_CAP_SECS: f64 = 0.006;

/// Share of the average frame delta used as base bias.
pub const BASE_BIAS_FRAME_SHARE: f64 = 0.75;

/// Base bias when no frame-delta sample exists.
pub const BASE_BIAS_DEFAULT_SECS: f64 = 0.003;

/// Share of the ping allowed as rewind.
pub const MAX_REWIND_PING_SHARE: f64 = 0.5;

/// Slack added on top of the ping share.
pub const MAX_REWIND_SLACK_SECS: f64 = 0.004;

/// Absolute rewind ceiling, whatever the ping.
pub const MAX_REWIND_CEILING_SECS: f64 = 0.045;

// =============================================================================
// BUFFER POLICY
// =============================================================================

/// Lower clamp of the `Clamp` mode.
pub const CLAMP_MIN_SECS: f64 = 0.005;

/// Upper clamp of the `Clamp` mode.
pub const CLAMP_MAX_SECS: f64 = 0.035;

/// Lower clamp of the `ClampUltra` mode.
pub const CLAMP_ULTRA_MIN_SECS: f64 = 0.001;

/// Upper clamp of the `ClampUltra` mode.
pub const CLAMP_ULTRA_MAX_SECS: f64 = 0.015;

/// Ping scale (ms) of the softmax weighting curve.
pub const SOFTMAX_PING_SCALE_MS: f64 = 50.0;

/// Buffer produced by the broken `Faulty` mode.
#[cfg(feature = "faulty-buffer")]
pub const FAULTY_BUFFER_SECS: f64 = 1000.5;

/// Offset the broken `Faulty` mode adds to every reported coordinate.
#[cfg(feature = "faulty-buffer")]
pub const FAULTY_POSITION_SKEW: f32 = 1000.5;

// =============================================================================
// REASONABLENESS
// =============================================================================

/// Squared distance (engine units) at which a reported eye position stops
/// being plausible.
pub const REASONABLE_DISTANCE_SQUARED: f32 = 1250.0;
