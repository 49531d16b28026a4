pub mod registry;
pub mod store;
pub mod tracker;

pub use registry::{doc_room, org_room, user_room, Connection, ConnectionRegistry, RegistryStats};
pub use store::{MemoryPresenceStore, PresenceStore};
pub use tracker::{DisconnectOutcome, PresenceTracker};
