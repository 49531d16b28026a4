use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::RealtimeError;

/// Ephemeral group of users working on one document.
#[derive(Debug, Clone)]
pub struct CollaborationSession {
    pub id: Uuid,
    pub document_id: String,
    pub participants: HashSet<String>,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl CollaborationSession {
    pub fn new(document_id: &str, owner: &str, now: DateTime<Utc>) -> Self {
        let mut participants = HashSet::new();
        participants.insert(owner.to_string());
        Self {
            id: Uuid::new_v4(),
            document_id: document_id.to_string(),
            participants,
            owner: owner.to_string(),
            created_at: now,
            last_activity: now,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub start: u64,
    pub end: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CursorState {
    pub user_id: String,
    pub position: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    pub section: String,
    pub user_id: String,
    pub acquired_at: DateTime<Utc>,
}

/// State handed to a late joiner so it can render the room.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub participant_count: usize,
    pub cursors: Vec<CursorState>,
    pub locks: Vec<LockInfo>,
    pub typing_users: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LockOutcome {
    Granted,
    Denied { holder: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Insert,
    Delete,
    Replace,
}

/// A single edit relayed verbatim to the other participants.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChange {
    pub op: ChangeOp,
    pub position: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl DocumentChange {
    pub fn validate(&self) -> Result<(), RealtimeError> {
        let has_content = self.content.as_deref().is_some_and(|c| !c.is_empty());
        let has_length = self.length.is_some_and(|l| l > 0);
        match self.op {
            ChangeOp::Insert if !has_content => Err(RealtimeError::Validation(
                "insert requires non-empty content".to_string(),
            )),
            ChangeOp::Delete if !has_length => Err(RealtimeError::Validation(
                "delete requires a positive length".to_string(),
            )),
            ChangeOp::Replace if !has_length || self.content.is_none() => Err(
                RealtimeError::Validation("replace requires length and content".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(op: ChangeOp, length: Option<u64>, content: Option<&str>) -> DocumentChange {
        DocumentChange {
            op,
            position: 4,
            length,
            content: content.map(str::to_string),
            field: None,
            version: None,
        }
    }

    #[test]
    fn validates_change_shapes() {
        assert!(change(ChangeOp::Insert, None, Some("abc")).validate().is_ok());
        assert!(change(ChangeOp::Insert, None, None).validate().is_err());
        assert!(change(ChangeOp::Delete, Some(2), None).validate().is_ok());
        assert!(change(ChangeOp::Delete, Some(0), None).validate().is_err());
        assert!(change(ChangeOp::Replace, Some(2), Some("")).validate().is_ok());
        assert!(change(ChangeOp::Replace, None, Some("x")).validate().is_err());
    }

    #[test]
    fn change_parses_from_wire_json() {
        let json = r#"{"op":"replace","position":10,"length":3,"content":"Q3 goal","field":"title"}"#;
        let parsed: DocumentChange = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.op, ChangeOp::Replace);
        assert_eq!(parsed.field.as_deref(), Some("title"));
        assert!(parsed.validate().is_ok());
    }
}
