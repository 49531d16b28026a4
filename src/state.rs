use std::sync::Arc;
use tracing::info;

use crate::broadcast::{BroadcastBridge, LocalTransport, PubSubTransport, RoomTransport};
use crate::collab::SessionManager;
use crate::config::Config;
use crate::models::SendMessage;
use crate::presence::{ConnectionRegistry, PresenceStore, PresenceTracker};
use crate::ratelimit::RateLimiter;
use crate::services::IdentityResolver;

/// Everything one instance of the service owns. Handlers reach every
/// component through here.
pub struct AppState {
    pub config: Config,
    pub registry: Arc<ConnectionRegistry>,
    pub transport: Arc<dyn RoomTransport>,
    pub bridge: Arc<BroadcastBridge>,
    pub presence: PresenceTracker,
    pub sessions: SessionManager,
    pub rate_limiter: RateLimiter,
    pub identities: IdentityResolver,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn PresenceStore>,
        pubsub: Arc<dyn PubSubTransport>,
    ) -> Arc<Self> {
        let registry = Arc::new(ConnectionRegistry::new());
        let transport = Arc::new(LocalTransport::new(registry.clone()));
        Self::with_transport(config, registry, transport, store, pubsub)
    }

    /// Builds the state around a room transport of the caller's choice. The
    /// transport must resolve room membership through `registry`.
    pub fn with_transport(
        config: Config,
        registry: Arc<ConnectionRegistry>,
        transport: Arc<dyn RoomTransport>,
        store: Arc<dyn PresenceStore>,
        pubsub: Arc<dyn PubSubTransport>,
    ) -> Arc<Self> {
        let instance_id = config.instance_id();
        let bridge = Arc::new(BroadcastBridge::new(
            instance_id.clone(),
            config.pubsub_channel_prefix.clone(),
            transport.clone(),
            pubsub,
        ));
        let presence = PresenceTracker::new(registry.clone(), store, bridge.clone());
        let notices = bridge.clone();
        let rate_limiter = RateLimiter::new(config.rate_limit_rules()).with_limit_handler(Box::new(
            move |connection_id, _class, event: &str, retry_after_secs| {
                notices.send_to_connection(
                    connection_id,
                    &SendMessage::RateLimited {
                        event: event.to_string(),
                        retry_after_secs,
                    },
                );
            },
        ));
        let identities = IdentityResolver::new(config.cloud_auth_jwt_secret.clone());

        info!("Instance {} initialized", instance_id);
        Arc::new(Self {
            config,
            registry,
            transport,
            bridge,
            presence,
            sessions: SessionManager::new(),
            rate_limiter,
            identities,
        })
    }
}
