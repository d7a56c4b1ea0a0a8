//! # Buffer Policy
//!
//! Extra compensation time granted on top of measured transit, per mode.
//!
//! | mode        | buffer                                           |
//! |-------------|--------------------------------------------------|
//! | legacy      | 0                                                |
//! | softmax     | flat under the low-ping threshold, sigmoid above |
//! | clamp       | ping seconds clamped to 5..35 ms                 |
//! | clamp_ultra | ping seconds clamped to 1..15 ms                 |
//!
//! Each mode is a plain function in a table keyed by [`BufferMode`].

use trueshot_shared::constants::{
    CLAMP_MAX_SECS, CLAMP_MIN_SECS, CLAMP_ULTRA_MAX_SECS, CLAMP_ULTRA_MIN_SECS,
    SOFTMAX_PING_SCALE_MS,
};
#[cfg(feature = "faulty-buffer")]
use trueshot_shared::constants::{FAULTY_BUFFER_SECS, FAULTY_POSITION_SKEW};
use trueshot_shared::{BufferMode, CompensationConfig, Vec3};

/// Buffer formula: `(ping_ms, config) -> seconds`.
pub type BufferFn = fn(f64, &CompensationConfig) -> f64;

fn legacy(_ping_ms: f64, _config: &CompensationConfig) -> f64 {
    0.0
}

fn softmax(ping_ms: f64, config: &CompensationConfig) -> f64 {
    if ping_ms < config.low_ping_threshold_ms {
        return config.min_puffer_s + config.low_ping_boost_s;
    }
    let weighted = (1.0 - (-ping_ms / SOFTMAX_PING_SCALE_MS).exp()) * ping_ms;
    let sigmoid = 1.0 / (1.0 + (-weighted * config.softmax_alpha).exp());
    config.min_puffer_s + (config.max_puffer_s - config.min_puffer_s) * sigmoid
}

fn clamp(ping_ms: f64, _config: &CompensationConfig) -> f64 {
    (ping_ms / 1000.0).clamp(CLAMP_MIN_SECS, CLAMP_MAX_SECS)
}

fn clamp_ultra(ping_ms: f64, _config: &CompensationConfig) -> f64 {
    (ping_ms / 1000.0).clamp(CLAMP_ULTRA_MIN_SECS, CLAMP_ULTRA_MAX_SECS)
}

#[cfg(feature = "faulty-buffer")]
fn faulty(_ping_ms: f64, _config: &CompensationConfig) -> f64 {
    FAULTY_BUFFER_SECS
}

/// The formula for a mode.
#[must_use]
pub const fn strategy(mode: BufferMode) -> BufferFn {
    match mode {
        BufferMode::Legacy => legacy,
        BufferMode::Softmax => softmax,
        BufferMode::Clamp => clamp,
        BufferMode::ClampUltra => clamp_ultra,
        #[cfg(feature = "faulty-buffer")]
        BufferMode::Faulty => faulty,
    }
}

/// Maps (mode, ping) to buffer seconds under one configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct BufferPolicy {
    config: CompensationConfig,
}

impl BufferPolicy {
    /// Creates the policy.
    #[must_use]
    pub const fn new(config: CompensationConfig) -> Self {
        Self { config }
    }

    /// Buffer in seconds for `mode` at `ping_ms`.
    #[must_use]
    pub fn buffer_seconds(&self, mode: BufferMode, ping_ms: f64) -> f64 {
        strategy(mode)(ping_ms, &self.config)
    }

    /// The reported position as the policy passes it on.
    ///
    /// Only the broken test mode touches it.
    #[must_use]
    pub fn reported_position(&self, mode: BufferMode, position: Vec3) -> Vec3 {
        #[cfg(feature = "faulty-buffer")]
        if mode == BufferMode::Faulty {
            return Vec3::new(
                position.x + FAULTY_POSITION_SKEW,
                position.y + FAULTY_POSITION_SKEW,
                position.z + FAULTY_POSITION_SKEW,
            );
        }
        let _ = mode;
        position
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &CompensationConfig {
        &self.config
    }
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self::new(CompensationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BufferPolicy {
        BufferPolicy::default()
    }

    #[test]
    fn test_legacy_is_zero() {
        for ping in [0.0, 30.0, 250.0] {
            assert_eq!(policy().buffer_seconds(BufferMode::Legacy, ping), 0.0);
        }
    }

    #[test]
    fn test_softmax_low_ping_flat() {
        let config = CompensationConfig {
            low_ping_threshold_ms: 30.0,
            min_puffer_s: 0.004,
            low_ping_boost_s: 0.002,
            ..CompensationConfig::default()
        };
        let buffer = BufferPolicy::new(config).buffer_seconds(BufferMode::Softmax, 20.0);
        assert!((buffer - 0.006).abs() < 1e-12);
    }

    #[test]
    fn test_softmax_bounded_and_monotonic() {
        let p = policy();
        let config = p.config().clone();
        let mut previous = 0.0;
        let mut ping = config.low_ping_threshold_ms;
        while ping < 500.0 {
            let buffer = p.buffer_seconds(BufferMode::Softmax, ping);
            assert!(buffer >= previous, "dropped at {ping} ms");
            assert!(buffer >= config.min_puffer_s && buffer <= config.max_puffer_s);
            previous = buffer;
            ping += 0.5;
        }
        // Saturates near the max.
        assert!(config.max_puffer_s - previous < 1e-6);
    }

    #[test]
    fn test_softmax_at_threshold() {
        // w = (1 - e^-0.6) * 30 ≈ 13.54, s = 1/(1+e^-1.354) ≈ 0.7948
        let buffer = policy().buffer_seconds(BufferMode::Softmax, 30.0);
        assert!((buffer - (0.004 + 0.008 * 0.7948)).abs() < 1e-5, "{buffer}");
    }

    #[test]
    fn test_clamp_modes() {
        let p = policy();
        assert_eq!(p.buffer_seconds(BufferMode::Clamp, 1.0), CLAMP_MIN_SECS);
        assert!((p.buffer_seconds(BufferMode::Clamp, 20.0) - 0.020).abs() < 1e-12);
        assert_eq!(p.buffer_seconds(BufferMode::Clamp, 90.0), CLAMP_MAX_SECS);

        assert_eq!(p.buffer_seconds(BufferMode::ClampUltra, 0.0), CLAMP_ULTRA_MIN_SECS);
        assert!((p.buffer_seconds(BufferMode::ClampUltra, 10.0) - 0.010).abs() < 1e-12);
        assert_eq!(p.buffer_seconds(BufferMode::ClampUltra, 40.0), CLAMP_ULTRA_MAX_SECS);
    }

    #[test]
    fn test_position_untouched_by_sane_modes() {
        let position = Vec3::new(1.0, 2.0, 3.0);
        for &mode in BufferMode::ALL {
            #[cfg(feature = "faulty-buffer")]
            if mode == BufferMode::Faulty {
                continue;
            }
            assert_eq!(policy().reported_position(mode, position), position);
        }
    }

    #[cfg(feature = "faulty-buffer")]
    #[test]
    fn test_faulty_mode() {
        let p = policy();
        assert_eq!(p.buffer_seconds(BufferMode::Faulty, 50.0), FAULTY_BUFFER_SECS);
        let skewed = p.reported_position(BufferMode::Faulty, Vec3::ZERO);
        assert_eq!(skewed, Vec3::splat(FAULTY_POSITION_SKEW));
    }
}
