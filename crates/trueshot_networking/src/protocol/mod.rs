//! # Network Protocol
//!
//! Binary packet definitions for the two compensation channels.
//!
//! ## Packet Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Type (1 byte) │ Body (fixed size, little-endian Pod)         │
//! ├──────────────────────────────────────────────────────────────┤
//! │ 0 ClockSync   │ server_now, average_frame_delta,             │
//! │               │ client_timestamp              (12 bytes)     │
//! │ 1 FireRequest │ mode, pad, client_now, offset, yaw, pitch,   │
//! │               │ x, y, z                       (32 bytes)     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod packets;
mod serialization;

pub use packets::{
    ClockSyncUpdate, FireMode, FireRequest, FireRequestPacket, Packet, PacketType,
};
pub use serialization::{PacketDeserializer, PacketSerializer, MAX_BUFFER_SIZE};
