pub mod collab;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod health;
pub mod messages;
pub mod presence;
pub mod ready;

pub use collab::*;
pub use diagnostics::*;
pub use error::*;
pub use events::*;
pub use health::*;
pub use messages::*;
pub use presence::*;
pub use ready::*;

/// Identifier of one live socket.
pub type ConnectionId = uuid::Uuid;
