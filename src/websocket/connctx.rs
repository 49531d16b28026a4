use crate::models::ConnectionId;
use crate::services::Identity;

/// Context of one live socket.
#[derive(Clone, Debug)]
pub struct ConnCtx {
    pub connection_id: ConnectionId,
    pub identity: Identity,
}

impl ConnCtx {
    pub fn new(connection_id: ConnectionId, identity: Identity) -> Self {
        Self {
            connection_id,
            identity,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }
}
