//! # Engine Integration Layer
//!
//! Interfaces and hand-off types between the compensation core and the
//! engine's weapon, pawn and connection objects.
//!
//! ## Data Flow
//!
//! ```text
//! WeaponTimers + AimSource → FireRequestBuilder (client)
//!                                   ↓ reliable channel
//!                 PingSource → LatencyCompensator (server) ← PositionSource
//!                                   ↓
//!                             FireAuthority (ValidatedShot)
//! ```

pub mod events;
pub mod traits;

pub use events::*;
pub use traits::*;
