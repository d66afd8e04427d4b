use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::document::EditSession;
use crate::error::DomainError;
use crate::util::uuid_v7_without_dashes;

pub const DEFAULT_SESSION_TIMEOUT_MS: i64 = 1_800_000;

/// Tracks the live sessions of one document. Staleness is checked on
/// demand by whichever operation observes the session next; there is no
/// dedicated timer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionRegistry {
    sessions: HashMap<String, EditSession>,
    timeout_ms: i64,
}

impl SessionRegistry {
    pub fn new(timeout_ms: i64) -> Self {
        Self {
            sessions: HashMap::new(),
            timeout_ms,
        }
    }

    pub fn open(
        &mut self,
        document_id: &str,
        user_id: &str,
        user_name: &str,
        now_ms: i64,
    ) -> EditSession {
        let session = EditSession {
            id: uuid_v7_without_dashes(),
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            started_at_ms: now_ms,
            last_heartbeat_at_ms: now_ms,
            held_locks: Vec::new(),
        };
        self.sessions.insert(session.id.clone(), session.clone());
        session
    }

    pub fn heartbeat(&mut self, session_id: &str, now_ms: i64) -> DomainResult<()> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| DomainError::UnknownSession {
                session_id: session_id.to_string(),
            })?;
        session.last_heartbeat_at_ms = now_ms;
        Ok(())
    }

    pub fn get(&self, session_id: &str) -> Option<&EditSession> {
        self.sessions.get(session_id)
    }

    /// Resolves a session that must be present and fresh; a stale session is
    /// indistinguishable from a closed one to callers.
    pub fn get_live(&self, session_id: &str, now_ms: i64) -> DomainResult<&EditSession> {
        self.sessions
            .get(session_id)
            .filter(|session| !self.is_stale(session, now_ms))
            .ok_or_else(|| DomainError::UnknownSession {
                session_id: session_id.to_string(),
            })
    }

    /// Idempotent: closing an unknown session returns `None`.
    pub fn close(&mut self, session_id: &str) -> Option<EditSession> {
        self.sessions.remove(session_id)
    }

    pub fn is_stale(&self, session: &EditSession, now_ms: i64) -> bool {
        now_ms - session.last_heartbeat_at_ms > self.timeout_ms
    }

    pub fn stale_session_ids(&self, now_ms: i64) -> Vec<String> {
        self.sessions
            .values()
            .filter(|session| self.is_stale(session, now_ms))
            .map(|session| session.id.clone())
            .collect()
    }

    pub fn track_lock(&mut self, session_id: &str, entry_id: &str) {
        if let Some(session) = self.sessions.get_mut(session_id) {
            if !session.held_locks.iter().any(|id| id == entry_id) {
                session.held_locks.push(entry_id.to_string());
            }
        }
    }

    pub fn untrack_lock(&mut self, session_id: &str, entry_id: &str) {
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.held_locks.retain(|id| id != entry_id);
        }
    }

    pub fn session_ids_for_user(&self, user_id: &str, now_ms: i64) -> Vec<String> {
        self.sessions
            .values()
            .filter(|session| session.user_id == user_id && !self.is_stale(session, now_ms))
            .map(|session| session.id.clone())
            .collect()
    }

    pub fn live_count(&self, now_ms: i64) -> usize {
        self.sessions
            .values()
            .filter(|session| !self.is_stale(session, now_ms))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: i64 = 10_000;

    #[test]
    fn open_registers_a_fresh_session() {
        let mut registry = SessionRegistry::new(TIMEOUT);
        let session = registry.open("doc1", "u1", "Ana", 100);
        assert_eq!(session.document_id, "doc1");
        assert!(session.held_locks.is_empty());
        assert!(registry.get_live(&session.id, 100).is_ok());
    }

    #[test]
    fn heartbeat_refreshes_and_unknown_session_fails() {
        let mut registry = SessionRegistry::new(TIMEOUT);
        let session = registry.open("doc1", "u1", "Ana", 0);

        registry.heartbeat(&session.id, TIMEOUT).unwrap();
        // Fresh again relative to the new heartbeat.
        assert!(registry.get_live(&session.id, TIMEOUT + 500).is_ok());

        let err = registry.heartbeat("nope", 0).unwrap_err();
        assert_eq!(
            err,
            DomainError::UnknownSession {
                session_id: "nope".to_string()
            }
        );
    }

    #[test]
    fn stale_session_is_unknown_to_get_live() {
        let mut registry = SessionRegistry::new(TIMEOUT);
        let session = registry.open("doc1", "u1", "Ana", 0);
        let err = registry.get_live(&session.id, TIMEOUT + 1).unwrap_err();
        assert!(matches!(err, DomainError::UnknownSession { .. }));
        assert_eq!(registry.stale_session_ids(TIMEOUT + 1), vec![session.id]);
    }

    #[test]
    fn close_is_idempotent() {
        let mut registry = SessionRegistry::new(TIMEOUT);
        let session = registry.open("doc1", "u1", "Ana", 0);
        assert!(registry.close(&session.id).is_some());
        assert!(registry.close(&session.id).is_none());
    }

    #[test]
    fn track_lock_deduplicates() {
        let mut registry = SessionRegistry::new(TIMEOUT);
        let session = registry.open("doc1", "u1", "Ana", 0);
        registry.track_lock(&session.id, "e1");
        registry.track_lock(&session.id, "e1");
        registry.track_lock(&session.id, "e2");
        assert_eq!(
            registry.get(&session.id).unwrap().held_locks,
            vec!["e1".to_string(), "e2".to_string()]
        );

        registry.untrack_lock(&session.id, "e1");
        assert_eq!(
            registry.get(&session.id).unwrap().held_locks,
            vec!["e2".to_string()]
        );
    }

    #[test]
    fn session_ids_for_user_skips_stale_sessions() {
        let mut registry = SessionRegistry::new(TIMEOUT);
        let stale = registry.open("doc1", "u1", "Ana", 0);
        let live = registry.open("doc1", "u1", "Ana", TIMEOUT);
        let ids = registry.session_ids_for_user("u1", TIMEOUT + 1);
        assert_eq!(ids, vec![live.id]);
        assert_ne!(ids[0], stale.id);
    }
}
