use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::RealtimeError;
use crate::utils::sync::write;

/// Shared publish/subscribe channel reaching every instance of the service.
pub trait PubSubTransport: Send + Sync {
    fn publish<'a>(&'a self, channel: &'a str, payload: String)
        -> BoxFuture<'a, Result<(), RealtimeError>>;

    fn subscribe<'a>(
        &'a self,
        channel: &'a str,
    ) -> BoxFuture<'a, Result<BoxStream<'static, String>, RealtimeError>>;
}

/// Pub/sub backed by tokio broadcast channels. Instances sharing one
/// `InProcessPubSub` see each other's messages.
pub struct InProcessPubSub {
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
    capacity: usize,
}

impl InProcessPubSub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        write(&self.channels)
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl PubSubTransport for InProcessPubSub {
    fn publish<'a>(
        &'a self,
        channel: &'a str,
        payload: String,
    ) -> BoxFuture<'a, Result<(), RealtimeError>> {
        Box::pin(async move {
            // No subscriber is not an error: nobody else is listening yet.
            let _ = self.sender(channel).send(payload);
            Ok(())
        })
    }

    fn subscribe<'a>(
        &'a self,
        channel: &'a str,
    ) -> BoxFuture<'a, Result<BoxStream<'static, String>, RealtimeError>> {
        Box::pin(async move {
            let rx = self.sender(channel).subscribe();
            let channel = channel.to_string();
            let stream = stream::unfold((rx, channel), |(mut rx, channel)| async move {
                loop {
                    match rx.recv().await {
                        Ok(payload) => return Some((payload, (rx, channel))),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Subscriber on {} lagged, skipped {} messages", channel, skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            });
            Ok(Box::pin(stream) as BoxStream<'static, String>)
        })
    }
}
