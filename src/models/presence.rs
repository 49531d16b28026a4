use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Busy,
    Offline,
    Invisible,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Away => "away",
            PresenceStatus::Busy => "busy",
            PresenceStatus::Offline => "offline",
            PresenceStatus::Invisible => "invisible",
        }
    }

    /// Status as seen by other users. Invisible users appear offline.
    pub fn visible(&self) -> PresenceStatus {
        match self {
            PresenceStatus::Invisible => PresenceStatus::Offline,
            other => *other,
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(PresenceStatus::Online),
            "away" => Ok(PresenceStatus::Away),
            "busy" => Ok(PresenceStatus::Busy),
            "offline" => Ok(PresenceStatus::Offline),
            "invisible" => Ok(PresenceStatus::Invisible),
            other => Err(format!("Unknown presence status '{}'", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Viewing,
    Editing,
    Commenting,
    Browsing,
    Idle,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Viewing => "viewing",
            ActivityType::Editing => "editing",
            ActivityType::Commenting => "commenting",
            ActivityType::Browsing => "browsing",
            ActivityType::Idle => "idle",
        }
    }

    /// Whether this activity counts as "looking at" its context.
    pub fn is_viewing(&self) -> bool {
        matches!(self, ActivityType::Viewing | ActivityType::Editing)
    }
}

impl FromStr for ActivityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewing" => Ok(ActivityType::Viewing),
            "editing" => Ok(ActivityType::Editing),
            "commenting" => Ok(ActivityType::Commenting),
            "browsing" => Ok(ActivityType::Browsing),
            "idle" => Ok(ActivityType::Idle),
            other => Err(format!("Unknown activity type '{}'", other)),
        }
    }
}

/// Last known presence of a user. Never deleted, only updated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub user_id: String,
    pub status: PresenceStatus,
    pub current_activity: ActivityType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_context: Option<String>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl PresenceRecord {
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            status: PresenceStatus::Offline,
            current_activity: ActivityType::Idle,
            activity_context: None,
            last_seen: now,
            metadata: HashMap::new(),
        }
    }

    /// Copy of the record safe to show to other users.
    pub fn public_view(&self) -> PresenceRecord {
        let mut view = self.clone();
        view.status = self.status.visible();
        view.metadata.clear();
        if view.status == PresenceStatus::Offline {
            view.activity_context = None;
        }
        view
    }
}

/// Diagnostic details captured at handshake time.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMeta {
    pub address: Option<String>,
    pub user_agent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            PresenceStatus::Online,
            PresenceStatus::Away,
            PresenceStatus::Busy,
            PresenceStatus::Offline,
            PresenceStatus::Invisible,
        ] {
            assert_eq!(status.as_str().parse::<PresenceStatus>().unwrap(), status);
        }
        assert!("sleeping".parse::<PresenceStatus>().is_err());
    }

    #[test]
    fn public_view_hides_invisible_users() {
        let mut record = PresenceRecord::new("u1", Utc::now());
        record.status = PresenceStatus::Invisible;
        record.activity_context = Some("doc-1".into());
        record.metadata.insert("address".into(), "10.0.0.1".into());

        let view = record.public_view();
        assert_eq!(view.status, PresenceStatus::Offline);
        assert!(view.activity_context.is_none());
        assert!(view.metadata.is_empty());
    }
}
