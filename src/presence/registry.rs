use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::debug;

use crate::models::ConnectionId;
use crate::utils::sync::{read, write};

#[derive(Debug, Clone)]
pub struct Connection {
    pub connection_id: ConnectionId,
    pub user_id: String,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub connections: usize,
    pub users: usize,
    pub rooms: usize,
    pub doc_rooms: usize,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, Connection>,
    by_user: HashMap<String, HashSet<ConnectionId>>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
    rooms_by_conn: HashMap<ConnectionId, HashSet<String>>,
}

/// Live connections of this instance, who owns them and which rooms they
/// joined.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the user's connection count after the insert.
    pub fn register_connection(&self, user_id: &str, connection_id: ConnectionId) -> usize {
        let mut inner = write(&self.inner);
        inner
            .connections
            .entry(connection_id)
            .or_insert_with(|| Connection {
                connection_id,
                user_id: user_id.to_string(),
                connected_at: Utc::now(),
            });
        let set = inner.by_user.entry(user_id.to_string()).or_default();
        set.insert(connection_id);
        let count = set.len();
        debug!("Registered connection {} for user {} ({} total)", connection_id, user_id, count);
        count
    }

    /// Removes the connection and its room memberships. Unknown ids are a
    /// no-op.
    pub fn remove_connection(&self, connection_id: ConnectionId) -> Option<(String, usize)> {
        let mut inner = write(&self.inner);
        let connection = inner.connections.remove(&connection_id)?;

        if let Some(rooms) = inner.rooms_by_conn.remove(&connection_id) {
            for room in rooms {
                if let Some(members) = inner.rooms.get_mut(&room) {
                    members.remove(&connection_id);
                    if members.is_empty() {
                        inner.rooms.remove(&room);
                    }
                }
            }
        }

        let remaining = match inner.by_user.get_mut(&connection.user_id) {
            Some(set) => {
                set.remove(&connection_id);
                set.len()
            }
            None => 0,
        };
        if remaining == 0 {
            inner.by_user.remove(&connection.user_id);
        }
        debug!(
            "Removed connection {} of user {} ({} remaining)",
            connection_id, connection.user_id, remaining
        );
        Some((connection.user_id, remaining))
    }

    pub fn get_connections_for_user(&self, user_id: &str) -> HashSet<ConnectionId> {
        read(&self.inner).by_user.get(user_id).cloned().unwrap_or_default()
    }

    pub fn connection_count(&self, user_id: &str) -> usize {
        read(&self.inner).by_user.get(user_id).map_or(0, |set| set.len())
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.connection_count(user_id) > 0
    }

    pub fn user_for_connection(&self, connection_id: ConnectionId) -> Option<String> {
        read(&self.inner)
            .connections
            .get(&connection_id)
            .map(|c| c.user_id.clone())
    }

    pub fn online_users(&self) -> Vec<String> {
        read(&self.inner).by_user.keys().cloned().collect()
    }

    /// Joins a registered connection to a room. Returns false for unknown
    /// connections.
    pub fn join_room(&self, connection_id: ConnectionId, room: &str) -> bool {
        let mut inner = write(&self.inner);
        if !inner.connections.contains_key(&connection_id) {
            return false;
        }
        inner.rooms.entry(room.to_string()).or_default().insert(connection_id);
        inner
            .rooms_by_conn
            .entry(connection_id)
            .or_default()
            .insert(room.to_string());
        true
    }

    pub fn leave_room(&self, connection_id: ConnectionId, room: &str) {
        let mut inner = write(&self.inner);
        if let Some(members) = inner.rooms.get_mut(room) {
            members.remove(&connection_id);
            if members.is_empty() {
                inner.rooms.remove(room);
            }
        }
        if let Some(rooms) = inner.rooms_by_conn.get_mut(&connection_id) {
            rooms.remove(room);
        }
    }

    pub fn room_members(&self, room: &str) -> Vec<ConnectionId> {
        read(&self.inner)
            .rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn rooms_of(&self, connection_id: ConnectionId) -> Vec<String> {
        read(&self.inner)
            .rooms_by_conn
            .get(&connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether any connection of the user, other than `except`, is in the room.
    pub fn user_in_room(&self, user_id: &str, room: &str, except: Option<ConnectionId>) -> bool {
        let inner = read(&self.inner);
        let (Some(conns), Some(members)) = (inner.by_user.get(user_id), inner.rooms.get(room)) else {
            return false;
        };
        conns
            .iter()
            .filter(|c| Some(**c) != except)
            .any(|c| members.contains(c))
    }

    pub fn stats(&self) -> RegistryStats {
        let inner = read(&self.inner);
        RegistryStats {
            connections: inner.connections.len(),
            users: inner.by_user.len(),
            rooms: inner.rooms.len(),
            doc_rooms: inner.rooms.keys().filter(|r| r.starts_with(DOC_ROOM_PREFIX)).count(),
        }
    }
}

pub const DOC_ROOM_PREFIX: &str = "doc:";

pub fn doc_room(document_id: &str) -> String {
    format!("{}{}", DOC_ROOM_PREFIX, document_id)
}

pub fn org_room(org_id: &str) -> String {
    format!("org:{}", org_id)
}

pub fn user_room(user_id: &str) -> String {
    format!("user:{}", user_id)
}
