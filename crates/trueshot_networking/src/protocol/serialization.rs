//! # Packet Serialization
//!
//! Zero-allocation serialization for network packets.
//!
//! ## Design
//!
//! - Uses pre-allocated buffers (no heap allocations in hot path)
//! - One type byte, then a fixed-size `Pod` body
//! - Direct memory copies, little-endian on every supported target

use bytemuck::{bytes_of, Pod};

use super::packets::{ClockSyncUpdate, FireRequest, FireRequestPacket, Packet, PacketType};
use crate::error::{ProtocolError, ProtocolResult};

/// Maximum packet buffer size.
///
/// Large enough for the biggest frame (type byte + fire request body).
pub const MAX_BUFFER_SIZE: usize = 1 + FireRequestPacket::SIZE;

/// Packet serializer - writes packets to a pre-allocated buffer.
///
/// Reuse one across serializations to avoid allocations.
pub struct PacketSerializer {
    buffer: [u8; MAX_BUFFER_SIZE],
    position: usize,
}

impl PacketSerializer {
    /// Creates a new serializer with a fresh buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: [0u8; MAX_BUFFER_SIZE],
            position: 0,
        }
    }

    /// Resets the serializer for reuse.
    #[inline]
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.position
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.position == 0
    }

    /// Returns a slice of the written data.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer[..self.position]
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) -> bool {
        if self.position >= MAX_BUFFER_SIZE {
            return false;
        }
        self.buffer[self.position] = value;
        self.position += 1;
        true
    }

    /// Writes a Pod type directly.
    #[inline]
    pub fn write_pod<T: Pod>(&mut self, value: &T) -> bool {
        let bytes = bytes_of(value);
        if self.position + bytes.len() > MAX_BUFFER_SIZE {
            return false;
        }
        self.buffer[self.position..self.position + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len();
        true
    }

    /// Serializes a clock-sync broadcast.
    pub fn serialize_clock_sync(&mut self, update: &ClockSyncUpdate) -> bool {
        self.reset();
        self.write_u8(PacketType::ClockSync as u8) && self.write_pod(update)
    }

    /// Serializes a fire request.
    pub fn serialize_fire_request(&mut self, request: &FireRequest) -> bool {
        self.reset();
        self.write_u8(PacketType::FireRequest as u8) && self.write_pod(&request.to_packet())
    }
}

impl Default for PacketSerializer {
    fn default() -> Self {
        Self::new()
    }
}

/// Packet deserializer - reads packets from a buffer.
pub struct PacketDeserializer<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> PacketDeserializer<'a> {
    /// Creates a new deserializer from a buffer.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Option<u8> {
        let value = *self.buffer.get(self.position)?;
        self.position += 1;
        Some(value)
    }

    /// Reads a Pod type directly.
    #[inline]
    pub fn read_pod<T: Pod + Copy>(&mut self) -> Option<T> {
        let size = std::mem::size_of::<T>();
        if self.position + size > self.buffer.len() {
            return None;
        }
        let slice = &self.buffer[self.position..self.position + size];
        self.position += size;
        bytemuck::try_pod_read_unaligned(slice).ok()
    }

    /// Deserializes a packet from the buffer.
    ///
    /// # Errors
    ///
    /// Fails on an empty or short buffer, an unknown type byte, trailing
    /// bytes, or a fire request with an unknown mode or non-finite values.
    pub fn deserialize(&mut self) -> ProtocolResult<Packet> {
        let type_byte = self.read_u8().ok_or(ProtocolError::Truncated {
            expected: 1,
            actual: 0,
        })?;

        let packet = match PacketType::try_from(type_byte)? {
            PacketType::ClockSync => Packet::ClockSync(self.read_body::<ClockSyncUpdate>()?),
            PacketType::FireRequest => {
                let body = self.read_body::<FireRequestPacket>()?;
                Packet::FireRequest(FireRequest::try_from(body)?)
            }
        };

        if self.remaining() != 0 {
            return Err(ProtocolError::TrailingBytes(self.remaining()));
        }

        Ok(packet)
    }

    fn read_body<T: Pod + Copy>(&mut self) -> ProtocolResult<T> {
        let actual = self.remaining();
        self.read_pod::<T>().ok_or(ProtocolError::Truncated {
            expected: std::mem::size_of::<T>(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FireMode;
    use trueshot_shared::{Rotator, Vec3};

    fn sample_request() -> FireRequest {
        FireRequest {
            mode: FireMode::Secondary,
            client_now: 100.0,
            offset_server_minus_client: 0.05,
            rotation: Rotator::new(16384, -2048),
            position: Vec3::new(10.0, -20.0, 64.0),
        }
    }

    #[test]
    fn test_fire_request_wire_layout() {
        let mut serializer = PacketSerializer::new();
        assert!(serializer.serialize_fire_request(&sample_request()));
        assert_eq!(serializer.len(), 1 + FireRequestPacket::SIZE);

        let bytes = serializer.as_slice();
        assert_eq!(bytes[0], PacketType::FireRequest as u8);
        assert_eq!(bytes[1], FireMode::Secondary as u8);
        assert_eq!(&bytes[5..9], &100.0f32.to_le_bytes());
        assert_eq!(&bytes[13..17], &16384i32.to_le_bytes());
    }

    #[test]
    fn test_serialize_deserialize_fire_request() {
        let mut serializer = PacketSerializer::new();
        assert!(serializer.serialize_fire_request(&sample_request()));

        let packet = PacketDeserializer::new(serializer.as_slice()).deserialize().unwrap();
        let Packet::FireRequest(request) = packet else {
            panic!("Expected FireRequest packet");
        };

        assert_eq!(request.mode, FireMode::Secondary);
        assert_eq!(request.rotation, Rotator::new(16384, -2048));
        assert_eq!(request.position, Vec3::new(10.0, -20.0, 64.0));
        assert!((request.offset_server_minus_client - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_serialize_deserialize_clock_sync() {
        let update = ClockSyncUpdate {
            server_now: 42.5,
            average_frame_delta: 0.011,
            client_timestamp: 41.0,
        };

        let mut serializer = PacketSerializer::new();
        assert!(serializer.serialize_clock_sync(&update));
        assert_eq!(serializer.len(), 1 + ClockSyncUpdate::SIZE);

        let packet = PacketDeserializer::new(serializer.as_slice()).deserialize().unwrap();
        assert_eq!(packet, Packet::ClockSync(update));
    }

    #[test]
    fn test_malformed_frames() {
        assert_eq!(
            PacketDeserializer::new(&[]).deserialize(),
            Err(ProtocolError::Truncated { expected: 1, actual: 0 })
        );
        assert_eq!(
            PacketDeserializer::new(&[9, 0, 0]).deserialize(),
            Err(ProtocolError::UnknownPacketType(9))
        );
        assert_eq!(
            PacketDeserializer::new(&[0, 1, 2]).deserialize(),
            Err(ProtocolError::Truncated { expected: 12, actual: 2 })
        );

        let mut long = [0u8; 14];
        long[0] = PacketType::ClockSync as u8;
        assert_eq!(
            PacketDeserializer::new(&long).deserialize(),
            Err(ProtocolError::TrailingBytes(1))
        );
    }
}
