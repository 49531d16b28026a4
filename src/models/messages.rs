use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    ActivityType, CursorState, DocumentChange, EventTarget, PresenceRecord, PresenceStatus,
    Selection, SessionSnapshot,
};

/// Frames sent by clients.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ReceivedMessage {
    UpdateStatus {
        status: PresenceStatus,
    },
    UpdateActivity {
        activity: ActivityType,
        #[serde(default)]
        context: Option<String>,
    },
    CreateSession {
        document_id: String,
    },
    JoinSession {
        document_id: String,
        #[serde(default)]
        session_id: Option<Uuid>,
    },
    LeaveSession {
        document_id: String,
        session_id: Uuid,
    },
    DocumentChange {
        document_id: String,
        change: DocumentChange,
    },
    CursorUpdate {
        document_id: String,
        position: u64,
        #[serde(default)]
        selection: Option<Selection>,
        #[serde(default)]
        field: Option<String>,
    },
    SelectionUpdate {
        document_id: String,
        #[serde(default)]
        selection: Option<Selection>,
        #[serde(default)]
        field: Option<String>,
    },
    RequestLock {
        document_id: String,
        section: String,
    },
    ReleaseLock {
        document_id: String,
        section: String,
    },
    TypingStart {
        document_id: String,
        #[serde(default)]
        field: Option<String>,
    },
    TypingStop {
        document_id: String,
        #[serde(default)]
        field: Option<String>,
    },
    ResolveConflict {
        document_id: String,
        resolution: serde_json::Value,
    },
    Announce {
        message: String,
    },
    Ping,
}

impl ReceivedMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            ReceivedMessage::UpdateStatus { .. } => "update-status",
            ReceivedMessage::UpdateActivity { .. } => "update-activity",
            ReceivedMessage::CreateSession { .. } => "create-session",
            ReceivedMessage::JoinSession { .. } => "join-session",
            ReceivedMessage::LeaveSession { .. } => "leave-session",
            ReceivedMessage::DocumentChange { .. } => "document-change",
            ReceivedMessage::CursorUpdate { .. } => "cursor-update",
            ReceivedMessage::SelectionUpdate { .. } => "selection-update",
            ReceivedMessage::RequestLock { .. } => "request-lock",
            ReceivedMessage::ReleaseLock { .. } => "release-lock",
            ReceivedMessage::TypingStart { .. } => "typing-start",
            ReceivedMessage::TypingStop { .. } => "typing-stop",
            ReceivedMessage::ResolveConflict { .. } => "resolve-conflict",
            ReceivedMessage::Announce { .. } => "announce",
            ReceivedMessage::Ping => "ping",
        }
    }
}

/// Frames sent to clients.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum SendMessage {
    Welcome {
        connection_id: Uuid,
        user_id: String,
        online_users: Vec<PresenceRecord>,
    },
    PresenceChanged {
        user_id: String,
        status: PresenceStatus,
        last_seen: DateTime<Utc>,
    },
    ActivityChanged {
        user_id: String,
        activity: ActivityType,
        #[serde(default)]
        context: Option<String>,
    },
    SessionCreated {
        document_id: String,
        session_id: Uuid,
    },
    SessionJoined {
        document_id: String,
        session_id: Uuid,
        snapshot: SessionSnapshot,
        viewers: Vec<String>,
    },
    UserJoined {
        document_id: String,
        session_id: Uuid,
        user_id: String,
        participant_count: usize,
    },
    UserLeft {
        document_id: String,
        #[serde(default)]
        session_id: Option<Uuid>,
        user_id: String,
    },
    SessionExpired {
        document_id: String,
        session_id: Uuid,
    },
    DocumentChangeBroadcast {
        document_id: String,
        user_id: String,
        change: DocumentChange,
    },
    CursorChanged {
        document_id: String,
        cursor: CursorState,
    },
    SelectionChanged {
        document_id: String,
        user_id: String,
        #[serde(default)]
        selection: Option<Selection>,
        #[serde(default)]
        field: Option<String>,
    },
    LockGranted {
        document_id: String,
        section: String,
        user_id: String,
    },
    LockDenied {
        document_id: String,
        section: String,
        holder: String,
    },
    LockReleased {
        document_id: String,
        section: String,
        user_id: String,
    },
    TypingChanged {
        document_id: String,
        user_id: String,
        #[serde(default)]
        field: Option<String>,
        is_typing: bool,
    },
    ConflictResolutionBroadcast {
        document_id: String,
        user_id: String,
        resolution: serde_json::Value,
    },
    AnnouncementBroadcast {
        #[serde(default)]
        organization_id: Option<String>,
        user_id: String,
        display_name: String,
        message: String,
    },
    DomainEvent {
        event: String,
        target: EventTarget,
        payload: serde_json::Value,
    },
    RateLimited {
        event: String,
        retry_after_secs: u64,
    },
    Error {
        code: String,
        message: String,
        #[serde(default)]
        event: Option<String>,
    },
    Pong {
        date: String,
    },
}

impl SendMessage {
    /// Outbound events that travel over the shared channel. Domain events
    /// travel under their own names, see `DomainEventKind`.
    pub const BRIDGED_EVENTS: [&'static str; 13] = [
        "presence-changed",
        "activity-changed",
        "user-joined",
        "user-left",
        "session-expired",
        "document-change-broadcast",
        "cursor-changed",
        "selection-changed",
        "lock-granted",
        "lock-released",
        "typing-changed",
        "conflict-resolution-broadcast",
        "announcement-broadcast",
    ];

    pub fn event_name(&self) -> &'static str {
        match self {
            SendMessage::Welcome { .. } => "welcome",
            SendMessage::PresenceChanged { .. } => "presence-changed",
            SendMessage::ActivityChanged { .. } => "activity-changed",
            SendMessage::SessionCreated { .. } => "session-created",
            SendMessage::SessionJoined { .. } => "session-joined",
            SendMessage::UserJoined { .. } => "user-joined",
            SendMessage::UserLeft { .. } => "user-left",
            SendMessage::SessionExpired { .. } => "session-expired",
            SendMessage::DocumentChangeBroadcast { .. } => "document-change-broadcast",
            SendMessage::CursorChanged { .. } => "cursor-changed",
            SendMessage::SelectionChanged { .. } => "selection-changed",
            SendMessage::LockGranted { .. } => "lock-granted",
            SendMessage::LockDenied { .. } => "lock-denied",
            SendMessage::LockReleased { .. } => "lock-released",
            SendMessage::TypingChanged { .. } => "typing-changed",
            SendMessage::ConflictResolutionBroadcast { .. } => "conflict-resolution-broadcast",
            SendMessage::AnnouncementBroadcast { .. } => "announcement-broadcast",
            SendMessage::DomainEvent { .. } => "domain-event",
            SendMessage::RateLimited { .. } => "rate-limited",
            SendMessage::Error { .. } => "error",
            SendMessage::Pong { .. } => "pong",
        }
    }

    pub fn error(code: &str, message: impl Into<String>, event: Option<&str>) -> Self {
        SendMessage::Error {
            code: code.to_string(),
            message: message.into(),
            event: event.map(str::to_string),
        }
    }
}
