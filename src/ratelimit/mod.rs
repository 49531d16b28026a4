//! Fixed-window rate limiting per connection and event class.
//!
//! Each `(connection, class)` pair owns a counter. The first event after the
//! window elapsed starts a fresh window; events beyond the class budget are
//! rejected until then. The limiter fails open: a class without a rule, or a
//! window that cannot be represented, lets the event through.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::RealtimeError;
use crate::models::ConnectionId;
use crate::utils::sync::lock;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EventClass {
    /// Ordinary interaction (status, activity, session membership).
    General,
    /// Ephemeral updates such as cursors and typing.
    HighFrequency,
    /// Mutating collaboration actions (edits, locks, conflict resolution).
    Critical,
    /// Administrative broadcasts, budgeted per connection.
    Broadcast,
}

impl EventClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventClass::General => "general",
            EventClass::HighFrequency => "high-frequency",
            EventClass::Critical => "critical",
            EventClass::Broadcast => "broadcast",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub max_events: u32,
    pub window: Duration,
}

impl RateLimitRule {
    pub fn new(max_events: u32, window_ms: u64) -> Self {
        Self {
            max_events,
            window: Duration::from_millis(window_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitCounter {
    pub count: u32,
    pub window_start: DateTime<Utc>,
    pub reset_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after_secs: u64 },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed)
    }

    pub fn into_result(self) -> Result<(), RealtimeError> {
        match self {
            RateLimitDecision::Allowed => Ok(()),
            RateLimitDecision::Limited { retry_after_secs } => {
                Err(RealtimeError::RateLimited { retry_after_secs })
            }
        }
    }
}

/// Called whenever an event is rejected, with the event name and the
/// retry-after hint in seconds.
pub type LimitHandler = Box<dyn Fn(ConnectionId, EventClass, &str, u64) + Send + Sync>;

pub struct RateLimiter {
    rules: HashMap<EventClass, RateLimitRule>,
    counters: Mutex<HashMap<(ConnectionId, EventClass), RateLimitCounter>>,
    on_limit: Option<LimitHandler>,
}

impl RateLimiter {
    pub fn new(rules: impl IntoIterator<Item = (EventClass, RateLimitRule)>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
            counters: Mutex::new(HashMap::new()),
            on_limit: None,
        }
    }

    pub fn with_limit_handler(mut self, handler: LimitHandler) -> Self {
        self.on_limit = Some(handler);
        self
    }

    pub fn rule(&self, class: EventClass) -> Option<RateLimitRule> {
        self.rules.get(&class).copied()
    }

    pub fn is_allowed(&self, connection_id: ConnectionId, class: EventClass) -> bool {
        self.check(connection_id, class).is_allowed()
    }

    pub fn is_allowed_at(
        &self,
        connection_id: ConnectionId,
        class: EventClass,
        now: DateTime<Utc>,
    ) -> bool {
        self.check_at(connection_id, class, now).is_allowed()
    }

    pub fn check(&self, connection_id: ConnectionId, class: EventClass) -> RateLimitDecision {
        self.check_at(connection_id, class, Utc::now())
    }

    pub fn check_at(
        &self,
        connection_id: ConnectionId,
        class: EventClass,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        self.check_event_at(connection_id, class, class.as_str(), now)
    }

    /// Like `check`, naming the inbound event for the limit handler.
    pub fn check_event(
        &self,
        connection_id: ConnectionId,
        class: EventClass,
        event: &str,
    ) -> RateLimitDecision {
        self.check_event_at(connection_id, class, event, Utc::now())
    }

    pub fn check_event_at(
        &self,
        connection_id: ConnectionId,
        class: EventClass,
        event: &str,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let Some(rule) = self.rules.get(&class) else {
            return RateLimitDecision::Allowed;
        };
        let window = match chrono::Duration::from_std(rule.window) {
            Ok(window) => window,
            Err(e) => {
                warn!("Unusable rate limit window for {:?}: {}", class, e);
                return RateLimitDecision::Allowed;
            }
        };

        let retry_after_secs = {
            let mut counters = lock(&self.counters);
            let counter = counters
                .entry((connection_id, class))
                .or_insert_with(|| fresh_counter(now, window));

            if now - counter.window_start >= window {
                *counter = fresh_counter(now, window);
            }

            if counter.count < rule.max_events {
                counter.count += 1;
                return RateLimitDecision::Allowed;
            }

            let remaining_ms = (counter.reset_time - now).num_milliseconds().max(0) as u64;
            remaining_ms.div_ceil(1000).max(1)
        };

        debug!(
            "Rate limit hit for connection {} on {} ({:?}), retry in {}s",
            connection_id, event, class, retry_after_secs
        );
        if let Some(handler) = &self.on_limit {
            handler(connection_id, class, event, retry_after_secs);
        }
        RateLimitDecision::Limited { retry_after_secs }
    }

    /// Drop counters whose window has elapsed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut counters = lock(&self.counters);
        let before = counters.len();
        counters.retain(|_, counter| counter.reset_time > now);
        before - counters.len()
    }

    pub fn forget_connection(&self, connection_id: ConnectionId) {
        lock(&self.counters).retain(|(conn, _), _| *conn != connection_id);
    }

    pub fn counter_count(&self) -> usize {
        lock(&self.counters).len()
    }
}

fn fresh_counter(now: DateTime<Utc>, window: chrono::Duration) -> RateLimitCounter {
    RateLimitCounter {
        count: 0,
        window_start: now,
        reset_time: now + window,
    }
}
