use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RealtimeError;
use crate::models::{
    CollaborationSession, CursorState, DocumentChange, LockInfo, LockOutcome, Selection,
    SessionSnapshot,
};
use crate::utils::sync::lock;

#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    pub session_id: Uuid,
    pub created: bool,
    pub snapshot: SessionSnapshot,
}

/// Ephemeral state dropped for one user in one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentCleanup {
    pub left_sessions: Vec<Uuid>,
    pub deleted_sessions: Vec<Uuid>,
    pub released_locks: Vec<String>,
    pub cursor_cleared: bool,
    pub was_typing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaveOutcome {
    pub session_found: bool,
    pub session_deleted: bool,
    pub remaining: usize,
    pub released_locks: Vec<String>,
    pub cursor_cleared: bool,
    pub was_typing: bool,
}

/// Locks and typing flag a user lost when their last session of a document
/// was swept.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleasedState {
    pub user_id: String,
    pub released_locks: Vec<String>,
    pub was_typing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpiredSession {
    pub session_id: Uuid,
    pub document_id: String,
    pub participants: Vec<String>,
    pub released: Vec<ReleasedState>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub sessions: usize,
    pub participants: usize,
    pub cursors: usize,
    pub locks: usize,
    pub typing: usize,
}

#[derive(Default)]
struct SessionState {
    sessions: HashMap<Uuid, CollaborationSession>,
    // (document, user)
    cursors: HashMap<(String, String), CursorState>,
    // (document, section)
    locks: HashMap<(String, String), LockInfo>,
    typing: HashMap<String, HashSet<String>>,
}

impl SessionState {
    fn session_ids_for(&self, document_id: &str) -> Vec<Uuid> {
        self.sessions
            .values()
            .filter(|s| s.document_id == document_id)
            .map(|s| s.id)
            .collect()
    }

    fn is_participant(&self, document_id: &str, user_id: &str) -> bool {
        self.sessions
            .values()
            .any(|s| s.document_id == document_id && s.participants.contains(user_id))
    }

    fn touch(&mut self, document_id: &str, user_id: &str, now: DateTime<Utc>) {
        for session in self.sessions.values_mut() {
            if session.document_id == document_id && session.participants.contains(user_id) {
                session.last_activity = now;
            }
        }
    }

    fn snapshot(&self, session_id: Uuid, document_id: &str) -> SessionSnapshot {
        let participant_count = self
            .sessions
            .get(&session_id)
            .map_or(0, |s| s.participants.len());
        let mut cursors: Vec<CursorState> = self
            .cursors
            .iter()
            .filter(|((doc, _), _)| doc == document_id)
            .map(|(_, cursor)| cursor.clone())
            .collect();
        cursors.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        let mut locks: Vec<LockInfo> = self
            .locks
            .iter()
            .filter(|((doc, _), _)| doc == document_id)
            .map(|(_, held)| held.clone())
            .collect();
        locks.sort_by(|a, b| a.section.cmp(&b.section));
        let mut typing_users: Vec<String> = self
            .typing
            .get(document_id)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default();
        typing_users.sort();
        SessionSnapshot {
            participant_count,
            cursors,
            locks,
            typing_users,
        }
    }

    /// Drops cursor, locks and typing flag of a user in a document.
    fn clear_user_state(&mut self, document_id: &str, user_id: &str) -> (Vec<String>, bool, bool) {
        let cursor_cleared = self
            .cursors
            .remove(&(document_id.to_string(), user_id.to_string()))
            .is_some();

        let mut released_locks = Vec::new();
        self.locks.retain(|(doc, section), held| {
            let release = doc == document_id && held.user_id == user_id;
            if release {
                released_locks.push(section.clone());
            }
            !release
        });
        released_locks.sort();

        let was_typing = match self.typing.get_mut(document_id) {
            Some(users) => {
                let removed = users.remove(user_id);
                if users.is_empty() {
                    self.typing.remove(document_id);
                }
                removed
            }
            None => false,
        };

        (released_locks, cursor_cleared, was_typing)
    }

    /// Drops every cursor, lock and typing flag of a document.
    fn clear_document(&mut self, document_id: &str) {
        self.cursors.retain(|(doc, _), _| doc != document_id);
        self.locks.retain(|(doc, _), _| doc != document_id);
        self.typing.remove(document_id);
    }
}

/// Per-document collaboration sessions with their cursors, advisory locks
/// and typing indicators.
///
/// Edits are relayed, never merged. Locks are hints for the UI and are not
/// enforced against the document store.
#[derive(Default)]
pub struct SessionManager {
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_session(&self, document_id: &str, owner_id: &str) -> Uuid {
        self.create_session_at(document_id, owner_id, Utc::now())
    }

    pub fn create_session_at(&self, document_id: &str, owner_id: &str, now: DateTime<Utc>) -> Uuid {
        let session = CollaborationSession::new(document_id, owner_id, now);
        let session_id = session.id;
        lock(&self.state).sessions.insert(session_id, session);
        info!("Created session {} for document {} (owner {})", session_id, document_id, owner_id);
        session_id
    }

    /// Joins the named session if it is live for this document, otherwise
    /// starts a new one.
    pub fn join_session(
        &self,
        document_id: &str,
        session_id: Option<Uuid>,
        user_id: &str,
    ) -> JoinOutcome {
        self.join_session_at(document_id, session_id, user_id, Utc::now())
    }

    pub fn join_session_at(
        &self,
        document_id: &str,
        session_id: Option<Uuid>,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> JoinOutcome {
        let mut state = lock(&self.state);

        let live = session_id.filter(|id| {
            state
                .sessions
                .get(id)
                .is_some_and(|s| s.document_id == document_id)
        });

        let (session_id, created) = match live {
            Some(id) => {
                if let Some(session) = state.sessions.get_mut(&id) {
                    session.participants.insert(user_id.to_string());
                    session.last_activity = now;
                }
                (id, false)
            }
            None => {
                if let Some(stale) = session_id {
                    debug!("Session {} is not live for document {}, starting a new one", stale, document_id);
                }
                let session = CollaborationSession::new(document_id, user_id, now);
                let id = session.id;
                state.sessions.insert(id, session);
                (id, true)
            }
        };

        let snapshot = state.snapshot(session_id, document_id);
        info!(
            "User {} joined session {} of document {} ({} participants)",
            user_id, session_id, document_id, snapshot.participant_count
        );
        JoinOutcome {
            session_id,
            created,
            snapshot,
        }
    }

    pub fn leave_session(&self, document_id: &str, session_id: Uuid, user_id: &str) -> LeaveOutcome {
        let mut state = lock(&self.state);

        let (session_found, remaining) = match state.sessions.get_mut(&session_id) {
            Some(session) if session.document_id == document_id => {
                session.participants.remove(user_id);
                (true, session.participants.len())
            }
            _ => (false, 0),
        };

        let session_deleted = session_found && remaining == 0;
        if session_deleted {
            state.sessions.remove(&session_id);
            info!("Session {} of document {} is empty, deleted", session_id, document_id);
        }

        let (released_locks, cursor_cleared, was_typing) = state.clear_user_state(document_id, user_id);

        LeaveOutcome {
            session_found,
            session_deleted,
            remaining,
            released_locks,
            cursor_cleared,
            was_typing,
        }
    }

    /// Removes a user from every session of a document and drops their
    /// cursor, locks and typing flag. Used when their connection went away.
    pub fn release_user_in_document(&self, document_id: &str, user_id: &str) -> DocumentCleanup {
        let mut state = lock(&self.state);
        let mut cleanup = DocumentCleanup::default();

        for session_id in state.session_ids_for(document_id) {
            let Some(session) = state.sessions.get_mut(&session_id) else {
                continue;
            };
            if !session.participants.remove(user_id) {
                continue;
            }
            cleanup.left_sessions.push(session_id);
            if session.participants.is_empty() {
                state.sessions.remove(&session_id);
                cleanup.deleted_sessions.push(session_id);
            }
        }

        let (released_locks, cursor_cleared, was_typing) = state.clear_user_state(document_id, user_id);
        cleanup.released_locks = released_locks;
        cleanup.cursor_cleared = cursor_cleared;
        cleanup.was_typing = was_typing;
        cleanup
    }

    /// Accepts an edit for relay. Nothing is merged or reconciled here.
    pub fn apply_document_change(
        &self,
        document_id: &str,
        user_id: &str,
        change: &DocumentChange,
    ) -> Result<(), RealtimeError> {
        change.validate()?;
        let mut state = lock(&self.state);
        state.touch(document_id, user_id, Utc::now());
        Ok(())
    }

    pub fn update_cursor(
        &self,
        document_id: &str,
        user_id: &str,
        position: u64,
        selection: Option<Selection>,
        field: Option<String>,
    ) -> CursorState {
        self.update_cursor_at(document_id, user_id, position, selection, field, Utc::now())
    }

    pub fn update_cursor_at(
        &self,
        document_id: &str,
        user_id: &str,
        position: u64,
        selection: Option<Selection>,
        field: Option<String>,
        now: DateTime<Utc>,
    ) -> CursorState {
        let cursor = CursorState {
            user_id: user_id.to_string(),
            position,
            selection,
            field,
            timestamp: now,
        };
        let mut state = lock(&self.state);
        state
            .cursors
            .insert((document_id.to_string(), user_id.to_string()), cursor.clone());
        state.touch(document_id, user_id, now);
        cursor
    }

    /// Updates only the selection part of the user's cursor.
    pub fn update_selection(
        &self,
        document_id: &str,
        user_id: &str,
        selection: Option<Selection>,
        field: Option<String>,
    ) -> CursorState {
        let now = Utc::now();
        let mut state = lock(&self.state);
        let cursor = state
            .cursors
            .entry((document_id.to_string(), user_id.to_string()))
            .or_insert_with(|| CursorState {
                user_id: user_id.to_string(),
                position: selection.map_or(0, |s| s.start),
                selection: None,
                field: None,
                timestamp: now,
            });
        cursor.selection = selection;
        if field.is_some() {
            cursor.field = field;
        }
        cursor.timestamp = now;
        let cursor = cursor.clone();
        state.touch(document_id, user_id, now);
        cursor
    }

    /// Grants the lock when it is free or already held by the same user.
    pub fn request_lock(&self, document_id: &str, section: &str, user_id: &str) -> LockOutcome {
        let mut state = lock(&self.state);
        let key = (document_id.to_string(), section.to_string());
        let holder = state.locks.get(&key).map(|held| held.user_id.clone());
        match holder {
            Some(holder) if holder != user_id => {
                debug!("Lock {}/{} denied to {}, held by {}", document_id, section, user_id, holder);
                LockOutcome::Denied { holder }
            }
            Some(_) => LockOutcome::Granted,
            None => {
                let now = Utc::now();
                state.locks.insert(
                    key,
                    LockInfo {
                        section: section.to_string(),
                        user_id: user_id.to_string(),
                        acquired_at: now,
                    },
                );
                state.touch(document_id, user_id, now);
                LockOutcome::Granted
            }
        }
    }

    /// Returns Ok(false) when nothing was locked.
    pub fn release_lock(
        &self,
        document_id: &str,
        section: &str,
        user_id: &str,
    ) -> Result<bool, RealtimeError> {
        let mut state = lock(&self.state);
        let key = (document_id.to_string(), section.to_string());
        let holder = state.locks.get(&key).map(|held| held.user_id.clone());
        match holder {
            None => Ok(false),
            Some(holder) if holder != user_id => {
                warn!(
                    "User {} tried to release lock {}/{} held by {}",
                    user_id, document_id, section, holder
                );
                Err(RealtimeError::Authorization(format!(
                    "Section '{}' is locked by another user",
                    section
                )))
            }
            Some(_) => {
                state.locks.remove(&key);
                Ok(true)
            }
        }
    }

    /// Returns true when the user was not typing before.
    pub fn typing_start(&self, document_id: &str, user_id: &str) -> bool {
        let mut state = lock(&self.state);
        let inserted = state
            .typing
            .entry(document_id.to_string())
            .or_default()
            .insert(user_id.to_string());
        state.touch(document_id, user_id, Utc::now());
        inserted
    }

    /// Returns true when the user was typing before.
    pub fn typing_stop(&self, document_id: &str, user_id: &str) -> bool {
        let mut state = lock(&self.state);
        let Some(users) = state.typing.get_mut(document_id) else {
            return false;
        };
        let removed = users.remove(user_id);
        if users.is_empty() {
            state.typing.remove(document_id);
        }
        removed
    }

    /// Deletes sessions idle for longer than `threshold`, whatever their
    /// participant count. Participants left without a session of the document
    /// lose their cursor, locks and typing flag, and documents left without
    /// sessions are cleared entirely.
    pub fn sweep_inactive_sessions(&self, threshold: Duration) -> Vec<ExpiredSession> {
        self.sweep_inactive_sessions_at(threshold, Utc::now())
    }

    pub fn sweep_inactive_sessions_at(
        &self,
        threshold: Duration,
        now: DateTime<Utc>,
    ) -> Vec<ExpiredSession> {
        let Ok(threshold) = chrono::Duration::from_std(threshold) else {
            warn!("Session inactivity threshold out of range, skipping sweep");
            return Vec::new();
        };
        let mut state = lock(&self.state);

        let expired_ids: Vec<Uuid> = state
            .sessions
            .values()
            .filter(|s| now - s.last_activity > threshold)
            .map(|s| s.id)
            .collect();

        let mut expired = Vec::with_capacity(expired_ids.len());
        for id in expired_ids {
            if let Some(session) = state.sessions.remove(&id) {
                let mut participants: Vec<String> = session.participants.into_iter().collect();
                participants.sort();
                expired.push(ExpiredSession {
                    session_id: id,
                    document_id: session.document_id,
                    participants,
                    released: Vec::new(),
                });
            }
        }

        for session in expired.iter_mut() {
            for user_id in &session.participants {
                if state.is_participant(&session.document_id, user_id) {
                    continue;
                }
                let (released_locks, _, was_typing) =
                    state.clear_user_state(&session.document_id, user_id);
                if released_locks.is_empty() && !was_typing {
                    continue;
                }
                session.released.push(ReleasedState {
                    user_id: user_id.clone(),
                    released_locks,
                    was_typing,
                });
            }
        }

        let orphaned: HashSet<String> = expired
            .iter()
            .map(|e| e.document_id.clone())
            .filter(|doc| state.session_ids_for(doc).is_empty())
            .collect();
        for document_id in &orphaned {
            state.clear_document(document_id);
        }

        if !expired.is_empty() {
            info!(
                "Swept {} inactive sessions ({} documents cleared)",
                expired.len(),
                orphaned.len()
            );
        }
        expired
    }

    pub fn session(&self, session_id: Uuid) -> Option<CollaborationSession> {
        lock(&self.state).sessions.get(&session_id).cloned()
    }

    pub fn sessions_for_document(&self, document_id: &str) -> Vec<CollaborationSession> {
        let state = lock(&self.state);
        state
            .sessions
            .values()
            .filter(|s| s.document_id == document_id)
            .cloned()
            .collect()
    }

    pub fn is_participant(&self, document_id: &str, user_id: &str) -> bool {
        lock(&self.state).is_participant(document_id, user_id)
    }

    pub fn stats(&self) -> SessionStats {
        let state = lock(&self.state);
        SessionStats {
            sessions: state.sessions.len(),
            participants: state.sessions.values().map(|s| s.participants.len()).sum(),
            cursors: state.cursors.len(),
            locks: state.locks.len(),
            typing: state.typing.values().map(|u| u.len()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChangeOp;

    fn ago(minutes: i64) -> DateTime<Utc> {
        Utc::now() - chrono::Duration::minutes(minutes)
    }

    #[test]
    fn join_then_leave_deletes_empty_session() {
        let manager = SessionManager::new();

        let first = manager.join_session("doc", None, "alice");
        assert!(first.created);
        assert_eq!(first.snapshot.participant_count, 1);

        let second = manager.join_session("doc", Some(first.session_id), "bob");
        assert!(!second.created);
        assert_eq!(second.session_id, first.session_id);
        let session = manager.session(first.session_id).unwrap();
        assert_eq!(
            session.participants,
            HashSet::from(["alice".to_string(), "bob".to_string()])
        );

        let out = manager.leave_session("doc", first.session_id, "alice");
        assert!(!out.session_deleted);
        assert_eq!(out.remaining, 1);
        let out = manager.leave_session("doc", first.session_id, "bob");
        assert!(out.session_deleted);
        assert!(manager.session(first.session_id).is_none());
    }

    #[test]
    fn join_with_unknown_or_foreign_session_creates_new() {
        let manager = SessionManager::new();
        let other_doc = manager.create_session("other", "carol");

        let joined = manager.join_session("doc", Some(other_doc), "alice");
        assert!(joined.created);
        assert_ne!(joined.session_id, other_doc);

        let joined = manager.join_session("doc", Some(Uuid::new_v4()), "bob");
        assert!(joined.created);
        assert_eq!(manager.sessions_for_document("doc").len(), 2);
    }

    #[test]
    fn late_joiner_sees_cursors_locks_and_typing() {
        let manager = SessionManager::new();
        let session = manager.create_session("doc", "alice");
        manager.update_cursor("doc", "alice", 12, None, Some("title".into()));
        manager.request_lock("doc", "title", "alice");
        manager.typing_start("doc", "alice");

        let joined = manager.join_session("doc", Some(session), "bob");
        assert_eq!(joined.snapshot.participant_count, 2);
        assert_eq!(joined.snapshot.cursors.len(), 1);
        assert_eq!(joined.snapshot.cursors[0].position, 12);
        assert_eq!(joined.snapshot.locks[0].user_id, "alice");
        assert_eq!(joined.snapshot.typing_users, vec!["alice".to_string()]);
    }

    #[test]
    fn lock_is_exclusive_until_released() {
        let manager = SessionManager::new();
        assert_eq!(manager.request_lock("doc", "title", "alice"), LockOutcome::Granted);
        assert_eq!(manager.request_lock("doc", "title", "alice"), LockOutcome::Granted);
        assert_eq!(
            manager.request_lock("doc", "title", "bob"),
            LockOutcome::Denied { holder: "alice".into() }
        );
        assert_eq!(manager.request_lock("doc", "body", "bob"), LockOutcome::Granted);

        assert!(matches!(
            manager.release_lock("doc", "title", "bob"),
            Err(RealtimeError::Authorization(_))
        ));
        assert!(manager.release_lock("doc", "title", "alice").unwrap());
        assert!(!manager.release_lock("doc", "title", "alice").unwrap());
        assert_eq!(manager.request_lock("doc", "title", "bob"), LockOutcome::Granted);
    }

    #[test]
    fn leaving_releases_locks_and_cursor() {
        let manager = SessionManager::new();
        let joined = manager.join_session("doc", None, "alice");
        manager.join_session("doc", Some(joined.session_id), "bob");
        manager.update_cursor("doc", "alice", 3, None, None);
        manager.request_lock("doc", "title", "alice");
        manager.request_lock("doc", "owner", "alice");
        manager.typing_start("doc", "alice");

        let out = manager.leave_session("doc", joined.session_id, "alice");
        assert_eq!(out.released_locks, vec!["owner".to_string(), "title".to_string()]);
        assert!(out.cursor_cleared);
        assert!(out.was_typing);
        assert_eq!(manager.request_lock("doc", "title", "bob"), LockOutcome::Granted);
    }

    #[test]
    fn leaving_one_of_two_sessions_still_releases_locks() {
        let manager = SessionManager::new();
        let s1 = manager.create_session("doc", "alice");
        let s2 = manager.create_session("doc", "bob");
        manager.join_session("doc", Some(s2), "alice");
        manager.request_lock("doc", "title", "alice");

        let out = manager.leave_session("doc", s1, "alice");
        assert_eq!(out.released_locks, vec!["title".to_string()]);
        assert!(manager.is_participant("doc", "alice"));
        assert_eq!(manager.request_lock("doc", "title", "bob"), LockOutcome::Granted);
    }

    #[test]
    fn release_user_in_document_cleans_every_session() {
        let manager = SessionManager::new();
        let s1 = manager.create_session("doc", "alice");
        let s2 = manager.create_session("doc", "bob");
        manager.join_session("doc", Some(s2), "alice");
        manager.request_lock("doc", "kr-1", "alice");

        let cleanup = manager.release_user_in_document("doc", "alice");
        assert_eq!(cleanup.left_sessions.len(), 2);
        assert_eq!(cleanup.deleted_sessions, vec![s1]);
        assert_eq!(cleanup.released_locks, vec!["kr-1".to_string()]);
        assert!(manager.session(s2).is_some());
        assert!(!manager.is_participant("doc", "alice"));
    }

    #[test]
    fn cursor_updates_overwrite() {
        let manager = SessionManager::new();
        manager.update_cursor("doc", "alice", 1, None, None);
        manager.update_cursor("doc", "alice", 2, Some(Selection { start: 2, end: 5 }), None);
        assert_eq!(manager.stats().cursors, 1);

        let cursor = manager.update_selection("doc", "alice", None, Some("title".into()));
        assert_eq!(cursor.position, 2);
        assert_eq!(cursor.selection, None);
        assert_eq!(cursor.field.as_deref(), Some("title"));
        assert_eq!(manager.stats().cursors, 1);
    }

    #[test]
    fn typing_toggles_membership() {
        let manager = SessionManager::new();
        assert!(manager.typing_start("doc", "alice"));
        assert!(!manager.typing_start("doc", "alice"));
        assert_eq!(manager.stats().typing, 1);
        assert!(manager.typing_stop("doc", "alice"));
        assert!(!manager.typing_stop("doc", "alice"));
        assert_eq!(manager.stats().typing, 0);
    }

    #[test]
    fn invalid_changes_are_rejected() {
        let manager = SessionManager::new();
        let change = DocumentChange {
            op: ChangeOp::Delete,
            position: 0,
            length: None,
            content: None,
            field: None,
            version: None,
        };
        assert!(matches!(
            manager.apply_document_change("doc", "alice", &change),
            Err(RealtimeError::Validation(_))
        ));
    }

    #[test]
    fn sweep_removes_idle_sessions_regardless_of_participants() {
        let manager = SessionManager::new();
        manager.request_lock("old-doc", "title", "alice");
        let idle = manager.create_session_at("old-doc", "alice", ago(45));
        manager.join_session_at("old-doc", Some(idle), "bob", ago(40));
        let fresh = manager.create_session_at("new-doc", "carol", ago(5));
        manager.request_lock("new-doc", "title", "carol");

        let expired = manager.sweep_inactive_sessions(Duration::from_secs(30 * 60));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].session_id, idle);
        assert_eq!(expired[0].participants, vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(expired[0].released.len(), 1);
        assert_eq!(expired[0].released[0].user_id, "alice");
        assert!(manager.session(fresh).is_some());

        // Locks of the swept document are gone, the active one stays.
        assert_eq!(manager.request_lock("old-doc", "title", "dave"), LockOutcome::Granted);
        assert_eq!(
            manager.request_lock("new-doc", "title", "dave"),
            LockOutcome::Denied { holder: "carol".into() }
        );
    }

    #[test]
    fn sweep_releases_locks_of_users_whose_last_session_expired() {
        let manager = SessionManager::new();
        let now = Utc::now();
        let idle = manager.create_session_at("doc-9", "alice", now);
        manager.request_lock("doc-9", "title", "alice");
        manager.typing_start("doc-9", "alice");
        let active = manager.create_session_at("doc-9", "bob", now + chrono::Duration::minutes(40));
        assert_eq!(
            manager.request_lock("doc-9", "title", "bob"),
            LockOutcome::Denied { holder: "alice".into() }
        );

        let expired = manager.sweep_inactive_sessions_at(
            Duration::from_secs(30 * 60),
            now + chrono::Duration::minutes(45),
        );
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].session_id, idle);
        assert_eq!(
            expired[0].released,
            vec![ReleasedState {
                user_id: "alice".to_string(),
                released_locks: vec!["title".to_string()],
                was_typing: true,
            }]
        );
        assert!(manager.session(active).is_some());
        assert!(!manager.is_participant("doc-9", "alice"));
        assert_eq!(manager.request_lock("doc-9", "title", "bob"), LockOutcome::Granted);
        assert_eq!(manager.stats().typing, 0);
    }
}
