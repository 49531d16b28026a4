use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::models::ConnectionId;
use crate::presence::registry::ConnectionRegistry;
use crate::utils::sync::{read, write};

/// Room fan-out primitive. Presence and collaboration code only talks to
/// rooms through this trait, never to sockets.
pub trait RoomTransport: Send + Sync {
    /// Attach the outbound queue of a freshly accepted socket.
    fn attach(&self, connection_id: ConnectionId, sender: UnboundedSender<String>);

    fn detach(&self, connection_id: ConnectionId);

    fn attached_count(&self) -> usize;

    fn join_room(&self, connection_id: ConnectionId, room: &str) -> bool;

    fn leave_room(&self, connection_id: ConnectionId, room: &str);

    /// Returns the number of connections the frame was queued for.
    fn emit_to_room(&self, room: &str, frame: &str, except: Option<ConnectionId>) -> usize;

    fn emit_to_connection(&self, connection_id: ConnectionId, frame: &str) -> bool;
}

/// In-process transport: one outbound queue per attached socket, room
/// membership kept by the connection registry.
pub struct LocalTransport {
    registry: Arc<ConnectionRegistry>,
    senders: RwLock<HashMap<ConnectionId, UnboundedSender<String>>>,
}

impl LocalTransport {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            senders: RwLock::new(HashMap::new()),
        }
    }
}

impl RoomTransport for LocalTransport {
    fn attach(&self, connection_id: ConnectionId, sender: UnboundedSender<String>) {
        write(&self.senders).insert(connection_id, sender);
    }

    fn detach(&self, connection_id: ConnectionId) {
        write(&self.senders).remove(&connection_id);
    }

    fn attached_count(&self) -> usize {
        read(&self.senders).len()
    }

    fn join_room(&self, connection_id: ConnectionId, room: &str) -> bool {
        self.registry.join_room(connection_id, room)
    }

    fn leave_room(&self, connection_id: ConnectionId, room: &str) {
        self.registry.leave_room(connection_id, room)
    }

    fn emit_to_room(&self, room: &str, frame: &str, except: Option<ConnectionId>) -> usize {
        let members = self.registry.room_members(room);
        let senders = read(&self.senders);
        let mut delivered = 0;
        for member in members.into_iter().filter(|m| Some(*m) != except) {
            match senders.get(&member) {
                Some(sender) if sender.send(frame.to_string()).is_ok() => delivered += 1,
                _ => warn!("Dropped frame for connection {} in room {}", member, room),
            }
        }
        delivered
    }

    fn emit_to_connection(&self, connection_id: ConnectionId, frame: &str) -> bool {
        match read(&self.senders).get(&connection_id) {
            Some(sender) => sender.send(frame.to_string()).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    #[tokio::test]
    async fn emits_to_room_members_except_sender() {
        let registry = Arc::new(ConnectionRegistry::new());
        let transport = LocalTransport::new(registry.clone());

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let (tx_c, mut rx_c) = mpsc::unbounded_channel();
        for (id, user, tx) in [(a, "alice", tx_a), (b, "bob", tx_b), (c, "carol", tx_c)] {
            registry.register_connection(user, id);
            transport.attach(id, tx);
        }
        transport.join_room(a, "doc:1");
        transport.join_room(b, "doc:1");
        transport.join_room(c, "doc:2");

        assert_eq!(transport.emit_to_room("doc:1", "hello", Some(a)), 1);
        assert_eq!(rx_b.recv().await.unwrap(), "hello");
        assert!(rx_a.try_recv().is_err());
        assert!(rx_c.try_recv().is_err());

        assert!(transport.emit_to_connection(c, "direct"));
        assert_eq!(rx_c.recv().await.unwrap(), "direct");

        transport.detach(c);
        assert!(!transport.emit_to_connection(c, "gone"));
    }
}
