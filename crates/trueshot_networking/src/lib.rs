//! # Trueshot Networking
//!
//! Clock synchronization, wire protocol and per-connection plumbing for
//! server-validated instant-hit weapons.
//!
//! ## Architecture
//!
//! - **Protocol**: fixed-size binary packets (clock sync, fire request)
//! - **Transport**: unreliable latest-wins channel and reliable ordered channel
//! - **Sync**: per-connection smoothed estimate of server minus client clock
//! - **Client**: readiness rule and fire-request builder
//! - **Server**: connection registry, ping tracking, fixed-rate tick
//! - **Integration**: capability traits the engine implements
//!
//! ## Trust Model
//!
//! ```text
//! CLIENT                                   SERVER
//!   |<-- ClockSync (~200 Hz, lossy) ---------|
//!   |                                        |
//!   |--- FireRequest (reliable) ------------>|
//!   |    client time + offset + aim          | <- rewind is bounded
//!   |                                        |    by the server's view
//! ```
//!
//! The client reports when and where it fired. The server decides how much
//! of that it believes.
//!
//! ## Example
//!
//! ```rust,ignore
//! use trueshot_networking::client::CompensationClient;
//! use trueshot_networking::server::ConnectionRegistry;
//! use trueshot_networking::transport::{reliable_channel, unreliable_channel};
//!
//! let (sync_tx, sync_rx) = unreliable_channel(64);
//! let (fire_tx, fire_rx) = reliable_channel();
//!
//! let mut registry = ConnectionRegistry::new();
//! let id = registry.accept(sync_tx, fire_rx);
//! let mut client = CompensationClient::new(sync_rx, fire_tx);
//!
//! registry.tick_all(server_now, dt);
//! client.tick(client_now, dt);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod client;
pub mod error;
pub mod integration;
pub mod protocol;
pub mod server;
pub mod simulation;
pub mod sync;
pub mod transport;

// Re-exports for convenience
pub use client::{CompensationClient, FireAttempt, FireRequestBuilder, OffsetEstimate, OffsetSource};
pub use error::{ChannelError, ProtocolError, ProtocolResult};
pub use integration::{
    CompensationResult, FireAuthority, FireModeKind, PingSource, PositionSource, ValidatedShot,
};
pub use protocol::{ClockSyncUpdate, FireMode, FireRequest, Packet, PacketType};
pub use server::{ClientConnection, ConnectionId, ConnectionRegistry, PingTracker, TickLoop};
pub use simulation::{DelayLine, Delivery, NetworkConditions};
pub use sync::{ClockOffsetState, ClockSync, NetRole, SyncBroadcaster, SyncStep};

/// Default server tick rate (updates per second).
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Capacity of the unreliable clock-sync channel, in frames.
///
/// A client that falls this far behind only ever needs the newest one.
pub const SYNC_CHANNEL_CAPACITY: usize = 64;
