//! # Transport Layer
//!
//! The two channel primitives the compensation core talks through.
//!
//! ## Design
//!
//! - **Unreliable**: bounded, a full channel evicts its oldest frame so the
//!   newest always gets in; the receiver reads the newest frame and discards
//!   the rest. Used for the ~200 Hz clock sync.
//! - **Reliable**: unbounded FIFO, every frame delivered once, in send
//!   order. Used for fire requests.
//!
//! Both carry encoded frames, so every message crosses the wire codec even
//! in-process. The actual socket layer sits behind these endpoints.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError, TrySendError};

use crate::error::{ChannelError, ProtocolError, ProtocolResult};
use crate::protocol::{
    ClockSyncUpdate, FireRequest, Packet, PacketDeserializer, PacketSerializer, PacketType,
    MAX_BUFFER_SIZE,
};

/// An encoded packet.
#[derive(Clone, Copy, Debug)]
pub struct Frame {
    data: [u8; MAX_BUFFER_SIZE],
    len: usize,
}

impl Frame {
    /// Copies the serializer's output into a frame.
    #[must_use]
    pub fn from_serializer(serializer: &PacketSerializer) -> Self {
        let mut data = [0u8; MAX_BUFFER_SIZE];
        data[..serializer.len()].copy_from_slice(serializer.as_slice());
        Self { data, len: serializer.len() }
    }

    /// The encoded bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

/// A message that travels on one of the channels.
pub trait WireMessage: Sized {
    /// Writes the message into the serializer. False if it did not fit.
    fn encode(&self, serializer: &mut PacketSerializer) -> bool;

    /// Extracts the message from a decoded packet.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::WrongChannel`] if the packet is another message.
    fn from_packet(packet: Packet) -> ProtocolResult<Self>;
}

impl WireMessage for ClockSyncUpdate {
    fn encode(&self, serializer: &mut PacketSerializer) -> bool {
        serializer.serialize_clock_sync(self)
    }

    fn from_packet(packet: Packet) -> ProtocolResult<Self> {
        match packet {
            Packet::ClockSync(update) => Ok(update),
            Packet::FireRequest(_) => Err(ProtocolError::WrongChannel(PacketType::FireRequest as u8)),
        }
    }
}

impl WireMessage for FireRequest {
    fn encode(&self, serializer: &mut PacketSerializer) -> bool {
        serializer.serialize_fire_request(self)
    }

    fn from_packet(packet: Packet) -> ProtocolResult<Self> {
        match packet {
            Packet::FireRequest(request) => Ok(request),
            Packet::ClockSync(_) => Err(ProtocolError::WrongChannel(PacketType::ClockSync as u8)),
        }
    }
}

fn decode<M: WireMessage>(frame: &Frame) -> ProtocolResult<M> {
    M::from_packet(PacketDeserializer::new(frame.as_slice()).deserialize()?)
}

/// Channel statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Frames handed to the channel.
    pub frames_sent: u64,
    /// Stale frames evicted from a full unreliable channel.
    pub frames_dropped: u64,
    /// Frames decoded successfully on receive.
    pub frames_received: u64,
    /// Frames that failed to decode.
    pub decode_errors: u64,
}

#[derive(Debug, Default)]
struct SharedStats {
    sent: AtomicU64,
    dropped: AtomicU64,
    received: AtomicU64,
    decode_errors: AtomicU64,
    receiver_closed: AtomicBool,
}

impl SharedStats {
    fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            frames_sent: self.sent.load(Ordering::Relaxed),
            frames_dropped: self.dropped.load(Ordering::Relaxed),
            frames_received: self.received.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// UNRELIABLE
// ============================================================================

/// Sending end of an unreliable channel.
///
/// Keeps a handle on the queue so it can evict stale frames itself.
pub struct UnreliableSender<M> {
    tx: Sender<Frame>,
    evict: Receiver<Frame>,
    stats: Arc<SharedStats>,
    _message: PhantomData<M>,
}

/// Receiving end of an unreliable channel.
pub struct UnreliableReceiver<M> {
    rx: Receiver<Frame>,
    stats: Arc<SharedStats>,
    _message: PhantomData<M>,
}

/// Creates an unreliable channel holding at most `capacity` frames in flight.
#[must_use]
pub fn unreliable_channel<M: WireMessage>(capacity: usize) -> (UnreliableSender<M>, UnreliableReceiver<M>) {
    let (tx, rx) = bounded(capacity.max(1));
    let stats = Arc::new(SharedStats::default());
    (
        UnreliableSender { tx, evict: rx.clone(), stats: Arc::clone(&stats), _message: PhantomData },
        UnreliableReceiver { rx, stats, _message: PhantomData },
    )
}

impl<M: WireMessage> UnreliableSender<M> {
    /// Sends a message. Returns `Ok(false)` if a stale frame had to be
    /// evicted to make room; the new message is queued either way.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Disconnected`] once the receiver is gone,
    /// [`ChannelError::Encode`] if the message did not encode.
    pub fn send(&self, message: &M) -> Result<bool, ChannelError> {
        if self.stats.receiver_closed.load(Ordering::Acquire) {
            return Err(ChannelError::Disconnected);
        }
        let mut serializer = PacketSerializer::new();
        if !message.encode(&mut serializer) {
            return Err(ChannelError::Encode);
        }
        self.stats.sent.fetch_add(1, Ordering::Relaxed);

        let mut frame = Frame::from_serializer(&serializer);
        let mut evicted = false;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return Ok(!evicted),
                Err(TrySendError::Full(returned)) => {
                    frame = returned;
                    if self.evict.try_recv().is_ok() {
                        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                        evicted = true;
                    }
                }
                Err(TrySendError::Disconnected(_)) => return Err(ChannelError::Disconnected),
            }
        }
    }

    /// Returns channel statistics.
    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        self.stats.snapshot()
    }
}

impl<M: WireMessage> UnreliableReceiver<M> {
    /// Drains everything that arrived and returns the newest valid message.
    ///
    /// Older frames are superseded; undecodable frames are skipped.
    pub fn latest(&self) -> Option<M> {
        let mut newest = None;
        while let Ok(frame) = self.rx.try_recv() {
            match decode::<M>(&frame) {
                Ok(message) => {
                    self.stats.received.fetch_add(1, Ordering::Relaxed);
                    newest = Some(message);
                }
                Err(e) => {
                    self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("Dropping undecodable unreliable frame: {e}");
                }
            }
        }
        newest
    }

    /// Returns channel statistics.
    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        self.stats.snapshot()
    }
}

impl<M> Drop for UnreliableReceiver<M> {
    fn drop(&mut self) {
        self.stats.receiver_closed.store(true, Ordering::Release);
    }
}

// ============================================================================
// RELIABLE
// ============================================================================

/// Sending end of a reliable, ordered channel.
pub struct ReliableSender<M> {
    tx: Sender<Frame>,
    stats: Arc<SharedStats>,
    _message: PhantomData<M>,
}

/// Receiving end of a reliable, ordered channel.
pub struct ReliableReceiver<M> {
    rx: Receiver<Frame>,
    stats: Arc<SharedStats>,
    _message: PhantomData<M>,
}

/// Creates a reliable channel.
#[must_use]
pub fn reliable_channel<M: WireMessage>() -> (ReliableSender<M>, ReliableReceiver<M>) {
    let (tx, rx) = unbounded();
    let stats = Arc::new(SharedStats::default());
    (
        ReliableSender { tx, stats: Arc::clone(&stats), _message: PhantomData },
        ReliableReceiver { rx, stats, _message: PhantomData },
    )
}

impl<M: WireMessage> ReliableSender<M> {
    /// Queues a message for delivery.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Disconnected`] once the receiver is gone,
    /// [`ChannelError::Encode`] if the message did not encode.
    pub fn send(&self, message: &M) -> Result<(), ChannelError> {
        let mut serializer = PacketSerializer::new();
        if !message.encode(&mut serializer) {
            return Err(ChannelError::Encode);
        }
        self.tx
            .send(Frame::from_serializer(&serializer))
            .map_err(|_| ChannelError::Disconnected)?;
        self.stats.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Returns channel statistics.
    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        self.stats.snapshot()
    }
}

impl<M: WireMessage> ReliableReceiver<M> {
    /// Takes the next message in send order.
    ///
    /// Returns `None` when nothing is queued (or the sender is gone and the
    /// queue is drained).
    pub fn try_recv(&self) -> Option<ProtocolResult<M>> {
        match self.rx.try_recv() {
            Ok(frame) => {
                let result = decode::<M>(&frame);
                if result.is_ok() {
                    self.stats.received.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                }
                Some(result)
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Returns channel statistics.
    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        self.stats.snapshot()
    }
}
