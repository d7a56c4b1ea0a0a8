//! # Connection Registry
//!
//! All client connections the server currently owns.

use super::connection::{ClientConnection, ConnectionId};
use crate::error::ChannelError;
use crate::protocol::{ClockSyncUpdate, FireRequest};
use crate::transport::{ReliableReceiver, UnreliableSender};
use trueshot_shared::BufferMode;

/// Connection table.
///
/// IDs are handed out monotonically and never reused.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Vec<ClientConnection>,
    next_id: u32,
    default_mode: BufferMode,
}

impl ConnectionRegistry {
    /// Creates an empty registry. New connections start in softmax mode.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_buffer_mode(BufferMode::Softmax)
    }

    /// Creates an empty registry whose new connections start in `mode`.
    #[must_use]
    pub const fn with_buffer_mode(mode: BufferMode) -> Self {
        Self { connections: Vec::new(), next_id: 0, default_mode: mode }
    }

    /// Registers a new connection over the given channel endpoints.
    pub fn accept(
        &mut self,
        sync_tx: UnreliableSender<ClockSyncUpdate>,
        fire_rx: ReliableReceiver<FireRequest>,
    ) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        let mut connection = ClientConnection::new(id, sync_tx, fire_rx);
        connection.set_buffer_mode(self.default_mode);
        self.connections.push(connection);
        tracing::info!("Client connected: {id}");
        id
    }

    /// Drops a connection and its clock state.
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c.id() != id);
        let removed = self.connections.len() != before;
        if removed {
            tracing::info!("Client disconnected: {id}");
        }
        removed
    }

    /// Looks up a connection.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<&ClientConnection> {
        self.connections.iter().find(|c| c.id() == id)
    }

    /// Looks up a connection mutably.
    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut ClientConnection> {
        self.connections.iter_mut().find(|c| c.id() == id)
    }

    /// Iterates all connections.
    pub fn iter(&self) -> impl Iterator<Item = &ClientConnection> {
        self.connections.iter()
    }

    /// Iterates all connections mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClientConnection> {
        self.connections.iter_mut()
    }

    /// Number of connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// True with no connections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Ticks every connection's clock and broadcaster.
    ///
    /// Connections whose client end is gone are removed.
    pub fn tick_all(&mut self, now: f64, frame_delta: f64) {
        self.connections.retain_mut(|conn| match conn.tick(now, frame_delta) {
            Ok(_) => true,
            Err(ChannelError::Disconnected) => {
                tracing::info!("Client disconnected: {}", conn.id());
                false
            }
            Err(e) => {
                tracing::warn!("Connection {}: clock broadcast failed: {e}", conn.id());
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{reliable_channel, unreliable_channel};

    #[test]
    fn test_accept_and_remove() {
        let mut registry = ConnectionRegistry::new();
        let (sync_tx, _sync_rx) = unreliable_channel(4);
        let (_fire_tx, fire_rx) = reliable_channel();

        let id = registry.accept(sync_tx, fire_rx);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(id).is_some());

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_accept_applies_default_mode() {
        let mut registry = ConnectionRegistry::with_buffer_mode(BufferMode::Clamp);
        let (a_tx, _a_rx) = unreliable_channel(4);
        let (_fa, fa_rx) = reliable_channel();
        let a = registry.accept(a_tx, fa_rx);
        let (b_tx, _b_rx) = unreliable_channel(4);
        let (_fb, fb_rx) = reliable_channel();
        let b = registry.accept(b_tx, fb_rx);

        registry.get_mut(b).unwrap().set_buffer_mode(BufferMode::Legacy);

        assert_eq!(registry.get(a).unwrap().buffer_mode(), BufferMode::Clamp);
        assert_eq!(registry.get(b).unwrap().buffer_mode(), BufferMode::Legacy);
    }

    #[test]
    fn test_ids_not_reused() {
        let mut registry = ConnectionRegistry::new();
        let (a_tx, _a_rx) = unreliable_channel(4);
        let (_fa, fa_rx) = reliable_channel();
        let a = registry.accept(a_tx, fa_rx);
        registry.remove(a);

        let (b_tx, _b_rx) = unreliable_channel(4);
        let (_fb, fb_rx) = reliable_channel();
        let b = registry.accept(b_tx, fb_rx);
        assert_ne!(a, b);
    }

    #[test]
    fn test_tick_all_drops_disconnected() {
        let mut registry = ConnectionRegistry::new();
        let (live_tx, live_rx) = unreliable_channel(4);
        let (_f1, f1_rx) = reliable_channel();
        let live = registry.accept(live_tx, f1_rx);

        let (dead_tx, dead_rx) = unreliable_channel(4);
        let (_f2, f2_rx) = reliable_channel();
        let dead = registry.accept(dead_tx, f2_rx);
        drop(dead_rx);

        registry.tick_all(1.0, 0.016);

        assert!(registry.get(live).is_some());
        assert!(registry.get(dead).is_none());
        assert_eq!(live_rx.latest().unwrap().server_now, 1.0);
    }
}
