//! # Compensation Configuration
//!
//! The read-only tuning values injected into the buffer policy and the
//! latency compensator. Built in code or parsed once at startup from TOML:
//!
//! ```toml
//! low_ping_threshold_ms = 30.0
//! min_puffer_s = 0.004
//! low_ping_boost_s = 0.002
//! softmax_alpha = 0.1
//! max_puffer_s = 0.012
//! buffer_mode = "softmax"
//! debug_logging = false
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Selects the formula the buffer policy applies on top of transit time.
///
/// Stored per player. The compensation core reads it, never changes it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferMode {
    /// No extra buffer.
    Legacy,
    /// Sigmoid of weighted ping between the configured min and max.
    #[default]
    Softmax,
    /// Ping in seconds, clamped to 5..35 ms.
    Clamp,
    /// Ping in seconds, clamped to 1..15 ms.
    ClampUltra,
    /// Intentionally broken: huge buffer and corrupted position.
    #[cfg(feature = "faulty-buffer")]
    Faulty,
}

impl BufferMode {
    /// Every selectable mode, in declaration order.
    #[cfg(not(feature = "faulty-buffer"))]
    pub const ALL: &'static [Self] = &[Self::Legacy, Self::Softmax, Self::Clamp, Self::ClampUltra];

    /// Every selectable mode, in declaration order.
    #[cfg(feature = "faulty-buffer")]
    pub const ALL: &'static [Self] = &[
        Self::Legacy,
        Self::Softmax,
        Self::Clamp,
        Self::ClampUltra,
        Self::Faulty,
    ];

    /// Human readable name, used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Softmax => "softmax",
            Self::Clamp => "clamp",
            Self::ClampUltra => "clamp_ultra",
            #[cfg(feature = "faulty-buffer")]
            Self::Faulty => "faulty",
        }
    }
}

impl std::fmt::Display for BufferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Compensation tuning, injected at construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompensationConfig {
    /// Below this ping (ms) softmax returns the flat low-ping buffer.
    pub low_ping_threshold_ms: f64,
    /// Smallest buffer (seconds).
    pub min_puffer_s: f64,
    /// Extra buffer (seconds) granted under the low-ping threshold.
    pub low_ping_boost_s: f64,
    /// Steepness of the softmax sigmoid.
    pub softmax_alpha: f64,
    /// Largest buffer (seconds) softmax saturates to.
    pub max_puffer_s: f64,
    /// Buffer formula a new player starts with. Each connection carries its
    /// own copy and may be switched individually.
    pub buffer_mode: BufferMode,
    /// Emit every intermediate compensation quantity at debug level.
    pub debug_logging: bool,
    /// Drop shots whose reported position fails the reasonableness check
    /// instead of forwarding them flagged.
    pub reject_unreasonable: bool,
}

impl Default for CompensationConfig {
    fn default() -> Self {
        Self {
            low_ping_threshold_ms: 30.0,
            min_puffer_s: 0.004,
            low_ping_boost_s: 0.002,
            softmax_alpha: 0.1,
            max_puffer_s: 0.012,
            buffer_mode: BufferMode::Softmax,
            debug_logging: false,
            reject_unreasonable: false,
        }
    }
}

impl CompensationConfig {
    /// Parses and validates a TOML document. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
    /// [`ConfigError::InvalidValue`] when validation fails.
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Returns a copy with a different buffer mode.
    #[must_use]
    pub fn with_buffer_mode(mut self, buffer_mode: BufferMode) -> Self {
        self.buffer_mode = buffer_mode;
        self
    }

    /// Checks every numeric field is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad field.
    pub fn validate(&self) -> ConfigResult<()> {
        let fields = [
            ("low_ping_threshold_ms", self.low_ping_threshold_ms),
            ("min_puffer_s", self.min_puffer_s),
            ("low_ping_boost_s", self.low_ping_boost_s),
            ("softmax_alpha", self.softmax_alpha),
            ("max_puffer_s", self.max_puffer_s),
        ];

        for (field, value) in fields {
            if !value.is_finite() {
                return Err(ConfigError::InvalidValue { field, reason: "must be finite" });
            }
            if value < 0.0 {
                return Err(ConfigError::InvalidValue { field, reason: "must not be negative" });
            }
        }

        if self.min_puffer_s > self.max_puffer_s {
            return Err(ConfigError::InvalidValue {
                field: "min_puffer_s",
                reason: "must not exceed max_puffer_s",
            });
        }

        Ok(())
    }
}
