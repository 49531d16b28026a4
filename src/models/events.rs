use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Domain events raised by the request/response services.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum DomainEventKind {
    EntityCreated,
    EntityUpdated,
    EntityDeleted,
    CommentCreated,
    NotificationCreated,
}

impl DomainEventKind {
    pub const ALL: [DomainEventKind; 5] = [
        DomainEventKind::EntityCreated,
        DomainEventKind::EntityUpdated,
        DomainEventKind::EntityDeleted,
        DomainEventKind::CommentCreated,
        DomainEventKind::NotificationCreated,
    ];

    pub fn event_name(&self) -> &'static str {
        match self {
            DomainEventKind::EntityCreated => "entity-created",
            DomainEventKind::EntityUpdated => "entity-updated",
            DomainEventKind::EntityDeleted => "entity-deleted",
            DomainEventKind::CommentCreated => "comment-created",
            DomainEventKind::NotificationCreated => "notification-created",
        }
    }
}

/// Routing metadata attached to a domain event.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventTarget {
    pub organization_id: Option<String>,
    pub document_id: Option<String>,
    pub user_id: Option<String>,
}

/// Request body for domain event ingestion
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DomainEventRequest {
    pub event: DomainEventKind,
    #[serde(flatten)]
    pub target: EventTarget,
    #[schema(value_type = Object)]
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Response for domain event ingestion
#[derive(Serialize, Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DomainEventResponse {
    pub delivered_locally: usize,
    pub published: bool,
}
