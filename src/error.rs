use thiserror::Error;

/// Errors raised while handling a realtime event.
///
/// Every variant maps to a reason code that is sent back to the caller in an
/// `error` frame. None of them close the connection.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("Invalid payload: {0}")]
    Validation(String),

    #[error("Not allowed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Presence store unavailable: {0}")]
    TransientStore(#[from] StoreError),

    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Pub/sub transport failed: {0}")]
    Transport(String),
}

impl RealtimeError {
    /// Stable reason code for client-visible rejections.
    pub fn code(&self) -> &'static str {
        match self {
            RealtimeError::Validation(_) => "validation_error",
            RealtimeError::Authorization(_) => "unauthorized",
            RealtimeError::NotFound(_) => "not_found",
            RealtimeError::TransientStore(_) => "store_unavailable",
            RealtimeError::RateLimited { .. } => "rate_limited",
            RealtimeError::Serialization(_) => "serialization_error",
            RealtimeError::Transport(_) => "transport_error",
        }
    }
}

/// Failure of the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt presence row for {user_id}: {reason}")]
    CorruptRow { user_id: String, reason: String },

    #[error("{0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(RealtimeError::Validation("x".into()).code(), "validation_error");
        assert_eq!(RealtimeError::Authorization("x".into()).code(), "unauthorized");
        assert_eq!(RealtimeError::RateLimited { retry_after_secs: 3 }.code(), "rate_limited");
        let store: RealtimeError = StoreError::Unavailable("down".into()).into();
        assert_eq!(store.code(), "store_unavailable");
        assert_eq!(store.to_string(), "Presence store unavailable: down");
    }
}
