//! # Integration Events
//!
//! Values handed across the boundary to the engine-side collaborators.

use trueshot_shared::{Rotator, Vec3};

use crate::protocol::FireMode;

/// What the latency compensator concluded about one fire request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompensationResult {
    /// Bounded rewind in seconds, `0 <= ping_lag_seconds <= max rewind`.
    pub ping_lag_seconds: f64,
    /// Whether the reported eye position passed the sanity check.
    pub reasonable: bool,
}

/// A compensated shot, ready for hit resolution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValidatedShot {
    /// Which trigger.
    pub mode: FireMode,
    /// Rewind and reasonableness flag.
    pub result: CompensationResult,
    /// Aim reported by the client.
    pub rotation: Rotator,
    /// Eye position reported by the client.
    pub position: Vec3,
    /// Reconstructed server time at which the shot happened.
    pub shot_server_time: f64,
}

/// Kind of implementation sitting in a weapon's fire-mode slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FireModeKind {
    /// Instant-hit trace. The only kind the compensator handles.
    InstantHit,
    /// Spawns a travelling projectile.
    Projectile,
    /// Nothing configured.
    Empty,
}
