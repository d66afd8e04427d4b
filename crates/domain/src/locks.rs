use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::document::LockHandle;
use crate::error::DomainError;

pub const DEFAULT_LOCK_TTL_MS: i64 = 300_000;

/// Per-document lock table. Expired handles are treated as absent and
/// lazily reclaimed; there is no background sweep.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockTable {
    locks: HashMap<String, LockHandle>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with `AlreadyLocked` when a live handle is held by a different
    /// session. Re-acquiring by the current holder extends the TTL.
    pub fn acquire(
        &mut self,
        entry_id: &str,
        session_id: &str,
        ttl_ms: i64,
        now_ms: i64,
    ) -> DomainResult<LockHandle> {
        if let Some(existing) = self.locks.get(entry_id) {
            if !existing.is_expired(now_ms) && existing.holder_session_id != session_id {
                return Err(DomainError::AlreadyLocked {
                    entry_id: entry_id.to_string(),
                    holder_session_id: existing.holder_session_id.clone(),
                });
            }
        }
        let acquired_at_ms = match self.locks.get(entry_id) {
            Some(existing)
                if existing.holder_session_id == session_id && !existing.is_expired(now_ms) =>
            {
                existing.acquired_at_ms
            }
            _ => now_ms,
        };
        let handle = LockHandle {
            entry_id: entry_id.to_string(),
            holder_session_id: session_id.to_string(),
            acquired_at_ms,
            expires_at_ms: now_ms + ttl_ms,
        };
        self.locks.insert(entry_id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Release by the rightful holder always succeeds, including at or past
    /// expiry. Anything else fails with `NotHolder`.
    pub fn release(&mut self, entry_id: &str, session_id: &str) -> DomainResult<()> {
        match self.locks.get(entry_id) {
            Some(handle) if handle.holder_session_id == session_id => {
                self.locks.remove(entry_id);
                Ok(())
            }
            _ => Err(DomainError::NotHolder {
                entry_id: entry_id.to_string(),
                session_id: session_id.to_string(),
            }),
        }
    }

    pub fn is_locked(&self, entry_id: &str, now_ms: i64) -> Option<&LockHandle> {
        self.locks
            .get(entry_id)
            .filter(|handle| !handle.is_expired(now_ms))
    }

    pub fn holds(&self, entry_id: &str, session_id: &str, now_ms: i64) -> bool {
        self.is_locked(entry_id, now_ms)
            .is_some_and(|handle| handle.holder_session_id == session_id)
    }

    /// Drops every handle held by `session_id` and returns the released
    /// entry ids. Used on session close and stale-session reaping.
    pub fn release_all(&mut self, session_id: &str) -> Vec<String> {
        let released: Vec<String> = self
            .locks
            .values()
            .filter(|handle| handle.holder_session_id == session_id)
            .map(|handle| handle.entry_id.clone())
            .collect();
        for entry_id in &released {
            self.locks.remove(entry_id);
        }
        released
    }

    /// Live handles held by sessions other than those in `session_ids`.
    pub fn live_locks_not_held_by(&self, session_ids: &[String], now_ms: i64) -> Vec<&LockHandle> {
        self.locks
            .values()
            .filter(|handle| !handle.is_expired(now_ms))
            .filter(|handle| !session_ids.contains(&handle.holder_session_id))
            .collect()
    }
}
