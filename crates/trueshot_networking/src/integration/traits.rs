//! # Integration Traits
//!
//! Narrow capabilities the compensation core needs from the engine.
//!
//! ## Architecture
//!
//! The core never touches engine actors directly. Adapters around whatever
//! weapon, pawn and connection types exist implement these traits.
//!
//! ```text
//! Core defines:          Engine adapter implements:
//! ┌───────────────┐      ┌──────────────────────┐
//! │ trait Foo     │ ←─── │ impl Foo for Weapon  │
//! └───────────────┘      └──────────────────────┘
//! ```

use trueshot_shared::{Rotator, Vec3};

use super::events::{FireModeKind, ValidatedShot};
use crate::protocol::FireMode;

// ============================================================================
// SERVER SIDE
// ============================================================================

/// The weapon authority that resolves validated shots.
pub trait FireAuthority {
    /// What sits in the given fire-mode slot.
    fn fire_mode_kind(&self, mode: FireMode) -> FireModeKind;

    /// True if the weapon is inside its fire window for `mode` right now.
    fn is_ready(&self, mode: FireMode) -> bool;

    /// True if `mode` may fire at all (ammo, equip state).
    fn allow_fire(&self, mode: FireMode) -> bool;

    /// Ammo the server believes is left for `mode`.
    fn ammo_amount(&self, mode: FireMode) -> u32;

    /// Starts firing `mode` with the compensated shot.
    fn start_fire(&mut self, mode: FireMode, shot: &ValidatedShot);

    /// Tells the owning client its ammo count for `mode`.
    fn request_ammo_resync(&mut self, mode: FireMode, amount: u32);

    /// False once the owner's match or round is over.
    fn match_in_progress(&self) -> bool {
        true
    }
}

/// The pawn whose eye position anchors the reasonableness check.
pub trait PositionSource {
    /// Authoritative eye position, if the pawn exists.
    fn current_eye_position(&self) -> Option<Vec3>;
}

/// Connection metadata.
pub trait PingSource {
    /// Round-trip ping in milliseconds, if measured.
    fn reported_ping_ms(&self) -> Option<f32>;
}

// ============================================================================
// CLIENT SIDE
// ============================================================================

/// Local weapon timing state, read at fire time.
pub trait WeaponTimers {
    /// True while `mode` is firing.
    fn is_firing(&self, mode: FireMode) -> bool;

    /// True if `mode` blocks the other mode while it fires.
    fn is_mode_exclusive(&self, mode: FireMode) -> bool;

    /// The mode's own cooldown gate.
    fn cooldown_allows(&self, mode: FireMode) -> bool;

    /// Earliest local time `mode` may fire again.
    fn next_fire_time(&self, mode: FireMode) -> f64;

    /// Wind-up time of `mode` before the shot leaves.
    fn pre_fire_time(&self, mode: FireMode) -> f64;
}

/// Local view state, sampled at fire time.
pub trait AimSource {
    /// Current view rotation.
    fn view_rotation(&self) -> Rotator;

    /// Current eye position.
    fn eye_position(&self) -> Vec3;
}

/// Cosmetic feedback played before the server confirms a shot.
pub trait PreFireEffect {
    /// Fire-and-forget; must not influence the request.
    fn play_pre_fire(&mut self, mode: FireMode);
}

// ============================================================================
// MOCK IMPLEMENTATIONS (For Testing)
// ============================================================================

/// Mock weapon authority that records every call.
#[derive(Clone, Debug)]
pub struct MockFireAuthority {
    /// Kind reported for both slots.
    pub kind: FireModeKind,
    /// Answer to `is_ready`.
    pub ready: bool,
    /// Answer to `allow_fire`.
    pub allowed: bool,
    /// Answer to `ammo_amount`.
    pub ammo: u32,
    /// Answer to `match_in_progress`.
    pub in_match: bool,
    /// Shots started, in order.
    pub started: Vec<(FireMode, ValidatedShot)>,
    /// Ammo resyncs requested, in order.
    pub resyncs: Vec<(FireMode, u32)>,
}

impl MockFireAuthority {
    /// A ready, loaded instant-hit weapon.
    #[must_use]
    pub fn new() -> Self {
        Self {
            kind: FireModeKind::InstantHit,
            ready: true,
            allowed: true,
            ammo: 10,
            in_match: true,
            started: Vec::new(),
            resyncs: Vec::new(),
        }
    }
}

impl Default for MockFireAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl FireAuthority for MockFireAuthority {
    fn fire_mode_kind(&self, _mode: FireMode) -> FireModeKind {
        self.kind
    }

    fn is_ready(&self, _mode: FireMode) -> bool {
        self.ready
    }

    fn allow_fire(&self, _mode: FireMode) -> bool {
        self.allowed
    }

    fn ammo_amount(&self, _mode: FireMode) -> u32 {
        self.ammo
    }

    fn start_fire(&mut self, mode: FireMode, shot: &ValidatedShot) {
        self.ammo = self.ammo.saturating_sub(1);
        self.started.push((mode, *shot));
    }

    fn request_ammo_resync(&mut self, mode: FireMode, amount: u32) {
        self.resyncs.push((mode, amount));
    }

    fn match_in_progress(&self) -> bool {
        self.in_match
    }
}

/// Mock pawn with an optional fixed eye position.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockPositionSource(pub Option<Vec3>);

impl PositionSource for MockPositionSource {
    fn current_eye_position(&self) -> Option<Vec3> {
        self.0
    }
}

/// Mock connection with an optional fixed ping.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockPingSource(pub Option<f32>);

impl PingSource for MockPingSource {
    fn reported_ping_ms(&self) -> Option<f32> {
        self.0
    }
}

/// Mock weapon timers, per-mode arrays indexed by [`FireMode::index`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MockWeaponTimers {
    /// Firing flags.
    pub firing: [bool; 2],
    /// Exclusive flags.
    pub exclusive: [bool; 2],
    /// Cooldown blocks (true = blocked).
    pub cooling_down: [bool; 2],
    /// Next fire times.
    pub next_fire_time: [f64; 2],
    /// Pre-fire times.
    pub pre_fire_time: [f64; 2],
}

impl WeaponTimers for MockWeaponTimers {
    fn is_firing(&self, mode: FireMode) -> bool {
        self.firing[mode.index()]
    }

    fn is_mode_exclusive(&self, mode: FireMode) -> bool {
        self.exclusive[mode.index()]
    }

    fn cooldown_allows(&self, mode: FireMode) -> bool {
        !self.cooling_down[mode.index()]
    }

    fn next_fire_time(&self, mode: FireMode) -> f64 {
        self.next_fire_time[mode.index()]
    }

    fn pre_fire_time(&self, mode: FireMode) -> f64 {
        self.pre_fire_time[mode.index()]
    }
}

/// Mock view state.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockAim {
    /// View rotation.
    pub rotation: Rotator,
    /// Eye position.
    pub eye: Vec3,
}

impl AimSource for MockAim {
    fn view_rotation(&self) -> Rotator {
        self.rotation
    }

    fn eye_position(&self) -> Vec3 {
        self.eye
    }
}

/// Mock client-side shooter: weapon timers plus view state.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockShooter {
    /// Weapon timers.
    pub timers: MockWeaponTimers,
    /// View state.
    pub aim: MockAim,
}

impl WeaponTimers for MockShooter {
    fn is_firing(&self, mode: FireMode) -> bool {
        self.timers.is_firing(mode)
    }

    fn is_mode_exclusive(&self, mode: FireMode) -> bool {
        self.timers.is_mode_exclusive(mode)
    }

    fn cooldown_allows(&self, mode: FireMode) -> bool {
        self.timers.cooldown_allows(mode)
    }

    fn next_fire_time(&self, mode: FireMode) -> f64 {
        self.timers.next_fire_time(mode)
    }

    fn pre_fire_time(&self, mode: FireMode) -> f64 {
        self.timers.pre_fire_time(mode)
    }
}

impl AimSource for MockShooter {
    fn view_rotation(&self) -> Rotator {
        self.aim.view_rotation()
    }

    fn eye_position(&self) -> Vec3 {
        self.aim.eye_position()
    }
}

/// Mock effect sink counting plays per mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockPreFireEffect {
    /// Plays per mode.
    pub plays: [u32; 2],
}

impl PreFireEffect for MockPreFireEffect {
    fn play_pre_fire(&mut self, mode: FireMode) {
        self.plays[mode.index()] += 1;
    }
}
