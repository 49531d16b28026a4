use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::broadcast::pubsub::PubSubTransport;
use crate::broadcast::transport::RoomTransport;
use crate::error::RealtimeError;
use crate::models::{ConnectionId, DomainEventKind, EventTarget, SendMessage};
use crate::presence::registry::{doc_room, org_room, user_room};

/// Room every connection joins, used for system-wide events.
pub const GLOBAL_ROOM: &str = "global";

/// What travels over the shared channel. Self-contained so a consumer on
/// any instance can deliver it without further lookups.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastEnvelope {
    pub origin: String,
    pub event: String,
    pub room: String,
    #[serde(default)]
    pub exclude: Option<ConnectionId>,
    pub message: SendMessage,
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    pub delivered_locally: usize,
    pub published: bool,
}

/// Relays events to local connections and to the other instances.
///
/// Both paths are best effort and unordered relative to each other. A failed
/// publish is logged and never reported back to the action that caused it.
pub struct BroadcastBridge {
    instance_id: String,
    channel_prefix: String,
    transport: Arc<dyn RoomTransport>,
    pubsub: Arc<dyn PubSubTransport>,
}

impl BroadcastBridge {
    pub fn new(
        instance_id: String,
        channel_prefix: String,
        transport: Arc<dyn RoomTransport>,
        pubsub: Arc<dyn PubSubTransport>,
    ) -> Self {
        Self {
            instance_id,
            channel_prefix,
            transport,
            pubsub,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn channel_for(&self, event: &str) -> String {
        format!("{}{}", self.channel_prefix, event)
    }

    /// Acknowledgements and denials for a single caller. Never published.
    pub fn send_to_connection(&self, connection_id: ConnectionId, message: &SendMessage) -> bool {
        match serde_json::to_string(message) {
            Ok(frame) => self.transport.emit_to_connection(connection_id, &frame),
            Err(e) => {
                error!("Failed to encode {} for {}: {}", message.event_name(), connection_id, e);
                false
            }
        }
    }

    pub async fn send_to_room(
        &self,
        room: &str,
        message: SendMessage,
        except: Option<ConnectionId>,
    ) -> FanOut {
        let event = message.event_name().to_string();
        self.fan_out(event, room.to_string(), except, message).await
    }

    pub async fn send_to_document(
        &self,
        document_id: &str,
        message: SendMessage,
        except: Option<ConnectionId>,
    ) -> FanOut {
        self.send_to_room(&doc_room(document_id), message, except).await
    }

    pub async fn send_to_all(&self, message: SendMessage) -> FanOut {
        self.send_to_room(GLOBAL_ROOM, message, None).await
    }

    /// Republish a domain event raised by the request/response services.
    /// The most specific target wins: document, then organization, then user.
    pub async fn publish_domain_event(
        &self,
        kind: DomainEventKind,
        target: EventTarget,
        payload: serde_json::Value,
    ) -> FanOut {
        let room = if let Some(document_id) = &target.document_id {
            doc_room(document_id)
        } else if let Some(org_id) = &target.organization_id {
            org_room(org_id)
        } else if let Some(user_id) = &target.user_id {
            user_room(user_id)
        } else {
            GLOBAL_ROOM.to_string()
        };
        let message = SendMessage::DomainEvent {
            event: kind.event_name().to_string(),
            target,
            payload,
        };
        self.fan_out(kind.event_name().to_string(), room, None, message).await
    }

    async fn fan_out(
        &self,
        event: String,
        room: String,
        except: Option<ConnectionId>,
        message: SendMessage,
    ) -> FanOut {
        let envelope = BroadcastEnvelope {
            origin: self.instance_id.clone(),
            event,
            room,
            exclude: except,
            message,
        };

        let delivered_locally = self.deliver_local(&envelope);

        let published = match serde_json::to_string(&envelope) {
            Ok(payload) => {
                let channel = self.channel_for(&envelope.event);
                match self.pubsub.publish(&channel, payload).await {
                    Ok(()) => true,
                    Err(e) => {
                        error!("Failed to publish {} on {}: {}", envelope.event, channel, e);
                        false
                    }
                }
            }
            Err(e) => {
                error!("Failed to encode envelope for {}: {}", envelope.event, e);
                false
            }
        };

        debug!(
            "Fanned out {} to {} ({} local, published: {})",
            envelope.event, envelope.room, delivered_locally, published
        );
        FanOut {
            delivered_locally,
            published,
        }
    }

    /// Deliver an envelope to the connections of this instance.
    pub fn deliver_local(&self, envelope: &BroadcastEnvelope) -> usize {
        match serde_json::to_string(&envelope.message) {
            Ok(frame) => self.transport.emit_to_room(&envelope.room, &frame, envelope.exclude),
            Err(e) => {
                error!("Failed to encode {} for local delivery: {}", envelope.event, e);
                0
            }
        }
    }

    /// Subscribe to every bridged channel and deliver what other instances
    /// publish. Envelopes from this instance were already delivered locally.
    pub async fn start(self: &Arc<Self>) -> Result<Vec<JoinHandle<()>>, RealtimeError> {
        let events = SendMessage::BRIDGED_EVENTS
            .iter()
            .copied()
            .chain(DomainEventKind::ALL.iter().map(|k| k.event_name()));

        let mut handles = Vec::new();
        for event in events {
            let channel = self.channel_for(event);
            let mut stream = self.pubsub.subscribe(&channel).await?;
            let bridge = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                while let Some(payload) = stream.next().await {
                    match serde_json::from_str::<BroadcastEnvelope>(&payload) {
                        Ok(envelope) if envelope.origin == bridge.instance_id => {}
                        Ok(envelope) => {
                            bridge.deliver_local(&envelope);
                        }
                        Err(e) => warn!("Ignoring malformed envelope on {}: {}", channel, e),
                    }
                }
                info!("Subscription to {} ended", channel);
            }));
        }
        info!("Broadcast bridge {} subscribed to {} channels", self.instance_id, handles.len());
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::pubsub::InProcessPubSub;
    use crate::broadcast::transport::LocalTransport;
    use crate::presence::registry::ConnectionRegistry;
    use futures_util::future::BoxFuture;
    use futures_util::stream::BoxStream;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    struct FailingPubSub;

    impl PubSubTransport for FailingPubSub {
        fn publish<'a>(
            &'a self,
            _channel: &'a str,
            _payload: String,
        ) -> BoxFuture<'a, Result<(), RealtimeError>> {
            Box::pin(async { Err(RealtimeError::Transport("broker down".to_string())) })
        }

        fn subscribe<'a>(
            &'a self,
            _channel: &'a str,
        ) -> BoxFuture<'a, Result<BoxStream<'static, String>, RealtimeError>> {
            Box::pin(async { Err(RealtimeError::Transport("broker down".to_string())) })
        }
    }

    fn instance(
        name: &str,
        pubsub: Arc<dyn PubSubTransport>,
    ) -> (Arc<ConnectionRegistry>, Arc<LocalTransport>, Arc<BroadcastBridge>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let transport = Arc::new(LocalTransport::new(registry.clone()));
        let bridge = Arc::new(BroadcastBridge::new(
            name.to_string(),
            "test:".to_string(),
            transport.clone(),
            pubsub,
        ));
        (registry, transport, bridge)
    }

    fn connect(
        registry: &ConnectionRegistry,
        transport: &LocalTransport,
        user: &str,
        rooms: &[&str],
    ) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register_connection(user, id);
        transport.attach(id, tx);
        for room in rooms {
            registry.join_room(id, room);
        }
        (id, rx)
    }

    #[tokio::test]
    async fn publish_failure_does_not_block_local_delivery() {
        let (registry, transport, bridge) = instance("a", Arc::new(FailingPubSub));
        let (_id, mut rx) = connect(&registry, &transport, "alice", &[GLOBAL_ROOM]);

        let fan_out = bridge
            .send_to_all(SendMessage::Pong { date: "now".to_string() })
            .await;
        assert_eq!(fan_out, FanOut { delivered_locally: 1, published: false });
        assert!(rx.recv().await.unwrap().contains("pong"));
    }

    #[tokio::test]
    async fn envelopes_reach_other_instances_once() {
        let pubsub: Arc<dyn PubSubTransport> = Arc::new(InProcessPubSub::new(16));
        let (reg_a, tr_a, bridge_a) = instance("a", pubsub.clone());
        let (reg_b, tr_b, bridge_b) = instance("b", pubsub.clone());
        let _subs_a = bridge_a.start().await.unwrap();
        let _subs_b = bridge_b.start().await.unwrap();

        let (_a1, mut rx_a) = connect(&reg_a, &tr_a, "alice", &["doc:42"]);
        let (_b1, mut rx_b) = connect(&reg_b, &tr_b, "bob", &["doc:42"]);

        let message = SendMessage::TypingChanged {
            document_id: "42".to_string(),
            user_id: "alice".to_string(),
            field: None,
            is_typing: true,
        };
        let fan_out = bridge_a.send_to_document("42", message.clone(), None).await;
        assert!(fan_out.published);

        let remote = tokio::time::timeout(std::time::Duration::from_secs(1), rx_b.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(serde_json::from_str::<SendMessage>(&remote).unwrap(), message);

        assert!(rx_a.recv().await.is_some());
        tokio::task::yield_now().await;
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn domain_events_route_to_most_specific_room() {
        let (registry, transport, bridge) =
            instance("a", Arc::new(InProcessPubSub::new(4)));
        let (_org_member, mut org_rx) = connect(&registry, &transport, "alice", &["org:acme"]);
        let (_viewer, mut doc_rx) = connect(&registry, &transport, "bob", &["doc:okr-1"]);

        let fan_out = bridge
            .publish_domain_event(
                DomainEventKind::EntityUpdated,
                EventTarget {
                    organization_id: Some("acme".to_string()),
                    document_id: Some("okr-1".to_string()),
                    user_id: None,
                },
                serde_json::json!({ "title": "Grow ARR" }),
            )
            .await;
        assert_eq!(fan_out.delivered_locally, 1);
        assert!(doc_rx.recv().await.unwrap().contains("entity-updated"));
        assert!(org_rx.try_recv().is_err());

        bridge
            .publish_domain_event(
                DomainEventKind::CommentCreated,
                EventTarget { organization_id: Some("acme".to_string()), ..Default::default() },
                serde_json::Value::Null,
            )
            .await;
        assert!(org_rx.recv().await.unwrap().contains("comment-created"));
    }
}
