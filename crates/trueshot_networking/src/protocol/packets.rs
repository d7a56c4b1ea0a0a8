//! # Packet Definitions
//!
//! The two messages of the compensation protocol.
//!
//! ## Zero-Allocation Design
//!
//! Both bodies are `Copy`, fixed-size and `Pod`, so they go on and off the
//! wire as plain little-endian bytes.

use bytemuck::{Pod, Zeroable};
use trueshot_shared::{Rotator, Vec3};

use crate::error::ProtocolError;

/// Types of packets in the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Server -> Client: authoritative clock sample (unreliable).
    ClockSync = 0,
    /// Client -> Server: fire request (reliable, ordered).
    FireRequest = 1,
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::ClockSync),
            1 => Ok(Self::FireRequest),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }
}

/// Which trigger the player pulled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FireMode {
    /// Primary fire.
    #[default]
    Primary = 0,
    /// Secondary (alt) fire.
    Secondary = 1,
}

impl FireMode {
    /// Both modes, indexable by `mode as usize`.
    pub const ALL: [Self; 2] = [Self::Primary, Self::Secondary];

    /// The opposite trigger.
    #[inline]
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Primary,
        }
    }

    /// Slot index of this mode.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for FireMode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Primary),
            1 => Ok(Self::Secondary),
            other => Err(ProtocolError::UnknownFireMode(other)),
        }
    }
}

/// Clock-sync broadcast - Server -> Client.
///
/// The three authoritative fields of a connection's clock state.
/// Each sample stands alone; a newer one supersedes any older one.
///
/// Size: 12 bytes
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ClockSyncUpdate {
    /// Server simulation time when the sample was taken.
    pub server_now: f32,
    /// Server's rolling average tick delta (0 until measured).
    pub average_frame_delta: f32,
    /// Latest client timestamp the server has seen from this client.
    pub client_timestamp: f32,
}

impl ClockSyncUpdate {
    /// Size in bytes.
    pub const SIZE: usize = 12;
}

/// Fire request - Client -> Server.
///
/// One per successful fire attempt. Sent reliably and consumed exactly once.
///
/// Size: 32 bytes
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct FireRequestPacket {
    /// Fire mode (see [`FireMode`]).
    pub mode: u8,
    /// Padding for alignment.
    pub _padding: [u8; 3],
    /// Client simulation time when fire was pressed.
    pub client_now: f32,
    /// Client's estimate of server minus client clock.
    pub offset_server_minus_client: f32,
    /// View yaw at fire time.
    pub yaw: i32,
    /// View pitch at fire time.
    pub pitch: i32,
    /// Eye position X at fire time.
    pub pos_x: f32,
    /// Eye position Y.
    pub pos_y: f32,
    /// Eye position Z.
    pub pos_z: f32,
}

impl FireRequestPacket {
    /// Size in bytes.
    pub const SIZE: usize = 32;
}

/// A decoded fire request.
///
/// Times are widened to `f64` for the arithmetic; the wire carries `f32`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FireRequest {
    /// Which trigger.
    pub mode: FireMode,
    /// Client simulation time when fire was pressed.
    pub client_now: f64,
    /// Client's offset estimate at that moment.
    pub offset_server_minus_client: f64,
    /// View rotation at that moment.
    pub rotation: Rotator,
    /// Eye position at that moment.
    pub position: Vec3,
}

impl FireRequest {
    /// Packs into the wire body.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_packet(&self) -> FireRequestPacket {
        FireRequestPacket {
            mode: self.mode as u8,
            _padding: [0; 3],
            client_now: self.client_now as f32,
            offset_server_minus_client: self.offset_server_minus_client as f32,
            yaw: self.rotation.yaw,
            pitch: self.rotation.pitch,
            pos_x: self.position.x,
            pos_y: self.position.y,
            pos_z: self.position.z,
        }
    }
}

impl TryFrom<FireRequestPacket> for FireRequest {
    type Error = ProtocolError;

    fn try_from(packet: FireRequestPacket) -> Result<Self, Self::Error> {
        let mode = FireMode::try_from(packet.mode)?;
        if !packet.client_now.is_finite() || !packet.offset_server_minus_client.is_finite() {
            return Err(ProtocolError::NonFinite("fire request time"));
        }
        let position = Vec3::new(packet.pos_x, packet.pos_y, packet.pos_z);
        if !position.is_finite() {
            return Err(ProtocolError::NonFinite("fire request position"));
        }

        Ok(Self {
            mode,
            client_now: f64::from(packet.client_now),
            offset_server_minus_client: f64::from(packet.offset_server_minus_client),
            rotation: Rotator::new(packet.yaw, packet.pitch),
            position,
        })
    }
}

/// Parsed packet variants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Packet {
    /// Clock sample.
    ClockSync(ClockSyncUpdate),
    /// Fire request.
    FireRequest(FireRequest),
}
