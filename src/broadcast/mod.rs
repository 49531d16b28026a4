pub mod bridge;
pub mod pubsub;
pub mod transport;

pub use bridge::{BroadcastBridge, BroadcastEnvelope, FanOut, GLOBAL_ROOM};
pub use pubsub::{InProcessPubSub, PubSubTransport};
pub use transport::{LocalTransport, RoomTransport};
