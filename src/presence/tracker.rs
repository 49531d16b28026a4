use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::broadcast::BroadcastBridge;
use crate::error::RealtimeError;
use crate::models::{
    ActivityType, ConnectionId, ConnectionMeta, PresenceRecord, PresenceStatus, SendMessage,
};
use crate::presence::registry::ConnectionRegistry;
use crate::presence::store::PresenceStore;
use crate::utils::sync::{read, write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectOutcome {
    pub user_id: String,
    pub remaining: usize,
    pub went_offline: bool,
}

/// Online status and activity of users, cached in memory and written
/// through to the presence store.
///
/// Store failures are logged and swallowed; the in-memory record and the
/// broadcast always go ahead. The next update or sweep reconciles the store.
pub struct PresenceTracker {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn PresenceStore>,
    bridge: Arc<BroadcastBridge>,
    records: RwLock<HashMap<String, PresenceRecord>>,
    connection_meta: RwLock<HashMap<ConnectionId, ConnectionMeta>>,
}

impl PresenceTracker {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn PresenceStore>,
        bridge: Arc<BroadcastBridge>,
    ) -> Self {
        Self {
            registry,
            store,
            bridge,
            records: RwLock::new(HashMap::new()),
            connection_meta: RwLock::new(HashMap::new()),
        }
    }

    /// Registers the connection. The first connection of a user brings them
    /// online. Returns the user's connection count.
    pub async fn on_connect(
        &self,
        user_id: &str,
        connection_id: ConnectionId,
        meta: ConnectionMeta,
    ) -> usize {
        let count = self.registry.register_connection(user_id, connection_id);
        write(&self.connection_meta).insert(connection_id, meta.clone());

        if count > 1 {
            self.touch(user_id);
            return count;
        }

        let loaded = self.load(user_id).await;
        let record = {
            let mut records = write(&self.records);
            let record = records.entry(user_id.to_string()).or_insert(loaded);
            record.status = PresenceStatus::Online;
            record.last_seen = Utc::now();
            if let Some(address) = &meta.address {
                record.metadata.insert("address".to_string(), address.clone().into());
            }
            if let Some(agent) = &meta.user_agent {
                record.metadata.insert("userAgent".to_string(), agent.clone().into());
            }
            record.clone()
        };

        info!("User {} is online (connection {})", user_id, connection_id);
        self.persist(&record).await;
        self.broadcast_presence(&record).await;
        count
    }

    /// Removes the connection. When it was the user's last one the user goes
    /// offline and loses their activity context.
    pub async fn on_disconnect(&self, connection_id: ConnectionId) -> Option<DisconnectOutcome> {
        write(&self.connection_meta).remove(&connection_id);
        let (user_id, remaining) = self.registry.remove_connection(connection_id)?;

        let stays_online = DisconnectOutcome {
            user_id: user_id.clone(),
            remaining,
            went_offline: false,
        };
        if remaining > 0 {
            return Some(stays_online);
        }

        // The count above may already be stale: re-check right before
        // writing offline.
        if self.registry.is_online(&user_id) {
            debug!("User {} reconnected before going offline", user_id);
            return Some(stays_online);
        }

        let record = {
            let mut records = write(&self.records);
            let record = records
                .entry(user_id.clone())
                .or_insert_with(|| PresenceRecord::new(&user_id, Utc::now()));
            record.status = PresenceStatus::Offline;
            record.activity_context = None;
            record.last_seen = Utc::now();
            record.clone()
        };
        self.persist(&record).await;

        // A reconnect that raced the write above already broadcast online;
        // restore its record in the store and stay quiet.
        if self.registry.is_online(&user_id) {
            if let Some(current) = self.cached(&user_id) {
                self.persist(&current).await;
            }
            return Some(stays_online);
        }

        info!("User {} is offline", user_id);
        self.broadcast_presence(&record).await;
        Some(DisconnectOutcome {
            user_id,
            remaining: 0,
            went_offline: true,
        })
    }

    pub async fn update_activity(
        &self,
        user_id: &str,
        activity: ActivityType,
        context: Option<String>,
    ) -> PresenceRecord {
        let loaded = self.load(user_id).await;
        let record = {
            let mut records = write(&self.records);
            let record = records.entry(user_id.to_string()).or_insert(loaded);
            record.current_activity = activity;
            record.activity_context = context.clone();
            record.last_seen = Utc::now();
            record.clone()
        };
        self.persist(&record).await;

        if record.status != PresenceStatus::Invisible {
            self.bridge
                .send_to_all(SendMessage::ActivityChanged {
                    user_id: user_id.to_string(),
                    activity,
                    context,
                })
                .await;
        }
        record
    }

    /// Explicit status chosen by the user. Offline is reserved for
    /// disconnects and sweeps.
    pub async fn update_status(
        &self,
        user_id: &str,
        status: PresenceStatus,
    ) -> Result<PresenceRecord, RealtimeError> {
        if status == PresenceStatus::Offline {
            return Err(RealtimeError::Validation(
                "Status 'offline' cannot be set explicitly".to_string(),
            ));
        }
        let loaded = self.load(user_id).await;
        let record = {
            let mut records = write(&self.records);
            let record = records.entry(user_id.to_string()).or_insert(loaded);
            record.status = status;
            record.last_seen = Utc::now();
            record.clone()
        };
        self.persist(&record).await;
        self.broadcast_presence(&record).await;
        Ok(record)
    }

    /// Heartbeat: refreshes last seen without any broadcast.
    pub fn touch(&self, user_id: &str) {
        if let Some(record) = write(&self.records).get_mut(user_id) {
            record.last_seen = Utc::now();
        }
    }

    /// Users visible as online on this instance.
    pub fn get_online_users(&self) -> Vec<PresenceRecord> {
        let records = read(&self.records);
        let mut online: Vec<PresenceRecord> = records
            .values()
            .filter(|r| r.status != PresenceStatus::Invisible && r.status != PresenceStatus::Offline)
            .filter(|r| self.registry.is_online(&r.user_id))
            .map(PresenceRecord::public_view)
            .collect();
        online.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        online
    }

    pub async fn get_user_presence(&self, user_id: &str) -> Option<PresenceRecord> {
        if let Some(record) = self.cached(user_id) {
            return Some(record);
        }
        match self.store.find(user_id).await {
            Ok(record) => record,
            Err(e) => {
                error!("Failed to load presence of {}: {}", user_id, e);
                None
            }
        }
    }

    /// Users currently viewing or editing the given context.
    pub fn get_viewers_of_context(&self, context_id: &str) -> Vec<String> {
        let records = read(&self.records);
        let mut viewers: Vec<String> = records
            .values()
            .filter(|r| r.current_activity.is_viewing())
            .filter(|r| r.activity_context.as_deref() == Some(context_id))
            .filter(|r| !matches!(r.status, PresenceStatus::Offline | PresenceStatus::Invisible))
            .map(|r| r.user_id.clone())
            .collect();
        viewers.sort();
        viewers
    }

    pub fn connection_meta(&self, connection_id: ConnectionId) -> Option<ConnectionMeta> {
        read(&self.connection_meta).get(&connection_id).cloned()
    }

    /// Marks users offline whose connections vanished without a disconnect
    /// and who were not seen for longer than `threshold`.
    pub async fn cleanup_inactive_presences(&self, threshold: Duration) -> Vec<String> {
        self.cleanup_inactive_presences_at(threshold, Utc::now()).await
    }

    pub async fn cleanup_inactive_presences_at(
        &self,
        threshold: Duration,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let Ok(threshold) = chrono::Duration::from_std(threshold) else {
            warn!("Presence threshold out of range, skipping sweep");
            return Vec::new();
        };

        let swept: Vec<PresenceRecord> = {
            let mut records = write(&self.records);
            records
                .values_mut()
                .filter(|r| r.status != PresenceStatus::Offline)
                .filter(|r| now - r.last_seen > threshold)
                .filter(|r| !self.registry.is_online(&r.user_id))
                .map(|r| {
                    r.status = PresenceStatus::Offline;
                    r.activity_context = None;
                    r.clone()
                })
                .collect()
        };

        for record in &swept {
            self.persist(record).await;
            self.broadcast_presence(record).await;
        }
        if !swept.is_empty() {
            info!("Presence sweep marked {} users offline", swept.len());
        }
        swept.into_iter().map(|r| r.user_id).collect()
    }

    pub fn cached_count(&self) -> usize {
        read(&self.records).len()
    }

    fn cached(&self, user_id: &str) -> Option<PresenceRecord> {
        read(&self.records).get(user_id).cloned()
    }

    async fn load(&self, user_id: &str) -> PresenceRecord {
        if let Some(record) = self.cached(user_id) {
            return record;
        }
        match self.store.find(user_id).await {
            Ok(Some(record)) => record,
            Ok(None) => PresenceRecord::new(user_id, Utc::now()),
            Err(e) => {
                error!("Failed to load presence of {}, starting fresh: {}", user_id, e);
                PresenceRecord::new(user_id, Utc::now())
            }
        }
    }

    async fn persist(&self, record: &PresenceRecord) {
        match self.store.update(record).await {
            Ok(true) => {}
            Ok(false) => {
                if let Err(e) = self.store.create(record).await {
                    error!("Failed to create presence of {}: {}", record.user_id, e);
                }
            }
            Err(e) => error!("Failed to update presence of {}: {}", record.user_id, e),
        }
    }

    async fn broadcast_presence(&self, record: &PresenceRecord) {
        self.bridge
            .send_to_all(SendMessage::PresenceChanged {
                user_id: record.user_id.clone(),
                status: record.status.visible(),
                last_seen: record.last_seen,
            })
            .await;
    }
}
