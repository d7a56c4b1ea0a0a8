//! # Authoritative Server Side
//!
//! Per-connection clock state, ping tracking and the fixed-rate tick.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  CONNECTION REGISTRY                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TickLoop ──(now, dt)──► ClientConnection × N               │
//! │                            ├─ ClockOffsetState (owned)      │
//! │                            ├─ SyncBroadcaster ──► unreliable│
//! │                            ├─ PingTracker                   │
//! │                            └─ fire rx ◄── reliable          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Fire requests drained here are handed to the latency compensator, which
//! lives in the security crate.

mod connection;
mod ping;
mod state;
mod tick;

pub use connection::{ClientConnection, ConnectionId};
pub use ping::PingTracker;
pub use state::ConnectionRegistry;
pub use tick::{TickLoop, TickStats, TickTiming};
