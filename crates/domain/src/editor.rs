use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};

use crate::DomainResult;
use crate::document::{
    DocumentStatus, DocumentVersion, EditChange, EditDocument, EditSession, Entry, EntryField,
    LockHandle, ReviewComment,
};
use crate::error::DomainError;
use crate::events::{CollaborationEvent, EventPayload};
use crate::export::{self, ExportFormat};
use crate::locks::{DEFAULT_LOCK_TTL_MS, LockTable};
use crate::ports::store::DocumentRepository;
use crate::review::{self, NewComment};
use crate::sessions::{DEFAULT_SESSION_TIMEOUT_MS, SessionRegistry};
use crate::util::{now_ms, uuid_v7_without_dashes};
use crate::versions;

pub const DEFAULT_EVENT_LOG_CAP: usize = 1_000;
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;
pub const ROOT_VERSION_LABEL: &str = "initial";

#[derive(Clone, Debug)]
pub struct EditorConfig {
    pub lock_ttl_ms: i64,
    pub session_timeout_ms: i64,
    pub event_log_cap: usize,
    pub event_channel_capacity: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            lock_ttl_ms: DEFAULT_LOCK_TTL_MS,
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            event_log_cap: DEFAULT_EVENT_LOG_CAP,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct EntryDraft {
    pub sequence: u32,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub original_text: String,
    #[serde(default)]
    pub translated_text: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub confidence_score: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub project_id: String,
    pub source_language: String,
    pub target_language: String,
    pub created_by: String,
    pub entries: Vec<EntryDraft>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub project_id: String,
    pub status: DocumentStatus,
    pub entry_count: usize,
    pub active_sessions: usize,
    pub unresolved_comments: usize,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct EditorStatistics {
    pub total_documents: usize,
    pub active_sessions: usize,
    pub status_counts: HashMap<String, usize>,
    pub total_comments: usize,
    pub unresolved_comments: usize,
}

/// All live coordination state of one document. Guarded by a single
/// `RwLock` in the manager: every mutating operation takes the write half,
/// which is what serializes the per-document event order.
struct DocumentState {
    document: EditDocument,
    locks: LockTable,
    sessions: SessionRegistry,
    events: VecDeque<CollaborationEvent>,
    next_seq: u64,
    event_log_cap: usize,
    broadcast: broadcast::Sender<CollaborationEvent>,
}

impl DocumentState {
    fn new(document: EditDocument, config: &EditorConfig) -> Self {
        let (broadcast, _) = broadcast::channel(config.event_channel_capacity);
        Self {
            document,
            locks: LockTable::new(),
            sessions: SessionRegistry::new(config.session_timeout_ms),
            events: VecDeque::new(),
            next_seq: 1,
            event_log_cap: config.event_log_cap,
            broadcast,
        }
    }

    fn record_event(&mut self, session_id: Option<String>, payload: EventPayload, at_ms: i64) {
        let event = CollaborationEvent {
            id: uuid_v7_without_dashes(),
            document_id: self.document.id.clone(),
            session_id,
            seq: self.next_seq,
            payload,
            at_ms,
        };
        self.next_seq += 1;
        self.events.push_back(event.clone());
        while self.events.len() > self.event_log_cap {
            self.events.pop_front();
        }
        // No subscribers is fine; the log above is the durable view.
        let _ = self.broadcast.send(event);
    }

    /// On-demand staleness sweep: any session whose heartbeat lapsed is
    /// closed here, before the operation that observed it proceeds, so no
    /// lock ever outlives its session. Returns the reaped session ids.
    fn reap_stale(&mut self, at_ms: i64) -> Vec<String> {
        let stale = self.sessions.stale_session_ids(at_ms);
        for session_id in &stale {
            let Some(session) = self.sessions.close(session_id) else {
                continue;
            };
            self.release_session_locks(session_id, at_ms);
            self.document.active_sessions.retain(|id| id != session_id);
            self.record_event(
                Some(session_id.clone()),
                EventPayload::Left {
                    user_id: session.user_id,
                    user_name: session.user_name,
                },
                at_ms,
            );
            debug!(session_id, document_id = %self.document.id, "reaped stale session");
        }
        stale
    }

    fn release_session_locks(&mut self, session_id: &str, at_ms: i64) {
        for entry_id in self.locks.release_all(session_id) {
            if let Some(entry) = self.document.entry_mut(&entry_id) {
                entry.lock = None;
            }
            self.record_event(
                Some(session_id.to_string()),
                EventPayload::Unlocked { entry_id },
                at_ms,
            );
        }
    }
}

/// Orchestrates model, locks, sessions, review and versions into atomic
/// operations and is the only producer of `CollaborationEvent`s.
pub struct EditorManager {
    config: EditorConfig,
    store: Arc<dyn DocumentRepository>,
    documents: RwLock<HashMap<String, Arc<RwLock<DocumentState>>>>,
    session_index: RwLock<HashMap<String, String>>,
}

impl EditorManager {
    pub fn new(store: Arc<dyn DocumentRepository>, config: EditorConfig) -> Self {
        Self {
            config,
            store,
            documents: RwLock::new(HashMap::new()),
            session_index: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create_document(&self, input: NewDocument) -> DomainResult<EditDocument> {
        if input.title.trim().is_empty() {
            return Err(DomainError::Validation(
                "document title must not be empty".into(),
            ));
        }
        let now = now_ms();
        let document_id = uuid_v7_without_dashes();
        let entries: Vec<Entry> = input
            .entries
            .into_iter()
            .map(|draft| Entry {
                id: uuid_v7_without_dashes(),
                sequence: draft.sequence,
                start_time_ms: draft.start_time_ms,
                end_time_ms: draft.end_time_ms,
                original_text: draft.original_text,
                translated_text: draft.translated_text,
                notes: draft.notes,
                confidence_score: draft.confidence_score,
                lock: None,
                updated_by: String::new(),
                updated_at_ms: 0,
            })
            .collect();

        let root = DocumentVersion {
            id: uuid_v7_without_dashes(),
            document_id: document_id.clone(),
            label: ROOT_VERSION_LABEL.to_string(),
            parent_version_id: None,
            created_by: input.created_by.clone(),
            created_at_ms: now,
            snapshot: versions::snapshot_entries(&entries),
            change_summary: Vec::new(),
        };
        let document = EditDocument {
            id: document_id.clone(),
            title: input.title,
            project_id: input.project_id,
            source_language: input.source_language,
            target_language: input.target_language,
            status: DocumentStatus::Draft,
            entries,
            current_version_id: root.id.clone(),
            versions: vec![root],
            comments: Vec::new(),
            change_log: Vec::new(),
            active_sessions: Vec::new(),
            created_by: input.created_by,
            created_at_ms: now,
            updated_at_ms: now,
        };
        document.validate()?;
        self.store.save(&document).await?;

        let state = DocumentState::new(document.clone(), &self.config);
        self.documents
            .write()
            .await
            .insert(document_id.clone(), Arc::new(RwLock::new(state)));
        info!(
            document_id,
            title = %document.title,
            entries = document.entries.len(),
            "created document"
        );
        Ok(document)
    }

    pub async fn document(&self, document_id: &str) -> DomainResult<EditDocument> {
        let state = self.state(document_id).await?;
        let guard = state.read().await;
        Ok(guard.document.clone())
    }

    pub async fn list_documents(
        &self,
        project_id: Option<&str>,
        status: Option<DocumentStatus>,
    ) -> Vec<DocumentSummary> {
        let now = now_ms();
        let states: Vec<Arc<RwLock<DocumentState>>> =
            self.documents.read().await.values().cloned().collect();
        let mut summaries = Vec::new();
        for state in states {
            let guard = state.read().await;
            let document = &guard.document;
            if project_id.is_some_and(|id| id != document.project_id) {
                continue;
            }
            if status.is_some_and(|wanted| wanted != document.status) {
                continue;
            }
            summaries.push(DocumentSummary {
                id: document.id.clone(),
                title: document.title.clone(),
                project_id: document.project_id.clone(),
                status: document.status,
                entry_count: document.entries.len(),
                active_sessions: guard.sessions.live_count(now),
                unresolved_comments: review::unresolved_comment_count(document),
                updated_at_ms: document.updated_at_ms,
            });
        }
        summaries.sort_by(|left, right| left.id.cmp(&right.id));
        summaries
    }

    pub async fn open_session(
        &self,
        document_id: &str,
        user_id: &str,
        user_name: &str,
    ) -> DomainResult<EditSession> {
        let state = self.state(document_id).await?;
        let now = now_ms();
        let session = {
            let mut guard = state.write().await;
            self.drop_from_index(guard.reap_stale(now)).await;
            let session = guard.sessions.open(document_id, user_id, user_name, now);
            guard.document.active_sessions.push(session.id.clone());
            guard.record_event(
                Some(session.id.clone()),
                EventPayload::Joined {
                    user_id: user_id.to_string(),
                    user_name: user_name.to_string(),
                },
                now,
            );
            session
        };
        self.session_index
            .write()
            .await
            .insert(session.id.clone(), document_id.to_string());
        info!(session_id = %session.id, document_id, user_id, "opened session");
        Ok(session)
    }

    /// Idempotent: closing an unknown or already-closed session succeeds.
    pub async fn close_session(&self, session_id: &str) -> DomainResult<()> {
        let Some((_, state)) = self.state_for_session(session_id).await else {
            return Ok(());
        };
        let now = now_ms();
        {
            let mut guard = state.write().await;
            self.drop_from_index(guard.reap_stale(now)).await;
            if let Some(session) = guard.sessions.close(session_id) {
                guard.release_session_locks(session_id, now);
                guard.document.active_sessions.retain(|id| id != session_id);
                guard.record_event(
                    Some(session_id.to_string()),
                    EventPayload::Left {
                        user_id: session.user_id,
                        user_name: session.user_name,
                    },
                    now,
                );
            }
        }
        self.session_index.write().await.remove(session_id);
        info!(session_id, "closed session");
        Ok(())
    }

    pub async fn heartbeat(&self, session_id: &str) -> DomainResult<()> {
        let (_, state) = self.require_session(session_id).await?;
        let now = now_ms();
        let mut guard = state.write().await;
        self.drop_from_index(guard.reap_stale(now)).await;
        guard.sessions.heartbeat(session_id, now)
    }

    pub async fn lock_entry(
        &self,
        session_id: &str,
        entry_id: &str,
    ) -> DomainResult<LockHandle> {
        let (_, state) = self.require_session(session_id).await?;
        let now = now_ms();
        let mut guard = state.write().await;
        self.drop_from_index(guard.reap_stale(now)).await;
        guard.sessions.get_live(session_id, now)?;
        if guard.document.entry(entry_id).is_none() {
            return Err(DomainError::EntryNotFound {
                entry_id: entry_id.to_string(),
            });
        }

        let handle = guard
            .locks
            .acquire(entry_id, session_id, self.config.lock_ttl_ms, now)?;
        guard.sessions.track_lock(session_id, entry_id);
        if let Some(entry) = guard.document.entry_mut(entry_id) {
            entry.lock = Some(handle.clone());
        }
        guard.record_event(
            Some(session_id.to_string()),
            EventPayload::Locked {
                entry_id: entry_id.to_string(),
                expires_at_ms: handle.expires_at_ms,
            },
            now,
        );
        debug!(session_id, entry_id, "locked entry");
        Ok(handle)
    }

    pub async fn unlock_entry(&self, session_id: &str, entry_id: &str) -> DomainResult<()> {
        let (_, state) = self.require_session(session_id).await?;
        let now = now_ms();
        let mut guard = state.write().await;
        self.drop_from_index(guard.reap_stale(now)).await;
        guard.sessions.get_live(session_id, now)?;
        guard.locks.release(entry_id, session_id)?;
        guard.sessions.untrack_lock(session_id, entry_id);
        if let Some(entry) = guard.document.entry_mut(entry_id) {
            entry.lock = None;
        }
        guard.record_event(
            Some(session_id.to_string()),
            EventPayload::Unlocked {
                entry_id: entry_id.to_string(),
            },
            now,
        );
        debug!(session_id, entry_id, "unlocked entry");
        Ok(())
    }

    /// Read-only lock probe for UI refresh; never blocks on writers longer
    /// than the current critical section.
    pub async fn entry_lock(
        &self,
        document_id: &str,
        entry_id: &str,
    ) -> DomainResult<Option<LockHandle>> {
        let state = self.state(document_id).await?;
        let guard = state.read().await;
        Ok(guard.locks.is_locked(entry_id, now_ms()).cloned())
    }

    /// Requires the session to currently hold the entry's lock; the lock is
    /// not auto-released afterwards.
    pub async fn edit_entry(
        &self,
        session_id: &str,
        entry_id: &str,
        field: EntryField,
        new_value: &str,
        comment: Option<String>,
    ) -> DomainResult<EditChange> {
        let (_, state) = self.require_session(session_id).await?;
        let now = now_ms();
        let mut guard = state.write().await;
        self.drop_from_index(guard.reap_stale(now)).await;
        let session = guard.sessions.get_live(session_id, now)?;
        let user_id = session.user_id.clone();
        if guard.document.entry(entry_id).is_none() {
            return Err(DomainError::EntryNotFound {
                entry_id: entry_id.to_string(),
            });
        }
        if !guard.locks.holds(entry_id, session_id, now) {
            return Err(DomainError::NotHolder {
                entry_id: entry_id.to_string(),
                session_id: session_id.to_string(),
            });
        }

        let entry = guard
            .document
            .entry_mut(entry_id)
            .ok_or_else(|| DomainError::EntryNotFound {
                entry_id: entry_id.to_string(),
            })?;
        let old_value = field.apply(entry, new_value)?;
        entry.updated_by = user_id.clone();
        entry.updated_at_ms = now;

        let change = EditChange {
            id: uuid_v7_without_dashes(),
            entry_id: entry_id.to_string(),
            field_name: field.to_string(),
            old_value,
            new_value: new_value.to_string(),
            changed_by: user_id,
            changed_at_ms: now,
            comment,
        };
        guard.document.change_log.push(change.clone());
        guard.document.updated_at_ms = now;
        guard.record_event(
            Some(session_id.to_string()),
            EventPayload::Edited {
                entry_id: entry_id.to_string(),
                field_name: field.to_string(),
            },
            now,
        );
        // Editing counts as activity.
        guard.sessions.heartbeat(session_id, now)?;
        debug!(session_id, entry_id, field = %field, "edited entry");
        Ok(change)
    }

    pub async fn add_comment(
        &self,
        document_id: &str,
        input: NewComment,
    ) -> DomainResult<ReviewComment> {
        let state = self.state(document_id).await?;
        let now = now_ms();
        let mut guard = state.write().await;
        self.drop_from_index(guard.reap_stale(now)).await;
        let comment = review::add_comment(&mut guard.document, input, now)?;
        guard.record_event(
            None,
            EventPayload::Commented {
                comment_id: comment.id.clone(),
                entry_id: comment.entry_id.clone(),
                severity: comment.severity.to_string(),
            },
            now,
        );
        info!(document_id, comment_id = %comment.id, severity = %comment.severity, "added review comment");
        Ok(comment)
    }

    pub async fn resolve_comment(
        &self,
        document_id: &str,
        comment_id: &str,
        resolved_by: &str,
    ) -> DomainResult<ReviewComment> {
        let state = self.state(document_id).await?;
        let now = now_ms();
        let mut guard = state.write().await;
        self.drop_from_index(guard.reap_stale(now)).await;
        let comment = review::resolve_comment(&mut guard.document, comment_id, resolved_by, now)?;
        guard.record_event(
            None,
            EventPayload::Resolved {
                comment_id: comment.id.clone(),
                resolved_by: resolved_by.to_string(),
            },
            now,
        );
        Ok(comment)
    }

    pub async fn set_status(
        &self,
        document_id: &str,
        new_status: DocumentStatus,
        actor: &str,
    ) -> DomainResult<DocumentStatus> {
        let state = self.state(document_id).await?;
        let now = now_ms();
        let snapshot = {
            let mut guard = state.write().await;
            self.drop_from_index(guard.reap_stale(now)).await;
            let (from, to) = review::set_status(&mut guard.document, new_status, now)?;
            guard.record_event(
                None,
                EventPayload::StatusChanged {
                    from,
                    to,
                    actor: actor.to_string(),
                },
                now,
            );
            info!(document_id, from = %from, to = %to, actor, "changed document status");
            guard.document.clone()
        };
        self.store.save(&snapshot).await?;
        Ok(new_status)
    }

    /// Versions require a quiescent document: a live lock held by a session
    /// of a different user fails with `DocumentLocked`. The author's own
    /// locks cannot race this call, so they do not block it.
    pub async fn create_version(
        &self,
        document_id: &str,
        label: &str,
        created_by: &str,
    ) -> DomainResult<DocumentVersion> {
        let state = self.state(document_id).await?;
        let now = now_ms();
        let (version, snapshot) = {
            let mut guard = state.write().await;
            self.drop_from_index(guard.reap_stale(now)).await;
            self.ensure_quiescent(&guard, created_by, now)?;
            let version = versions::create_version(&mut guard.document, label, created_by, now)?;
            guard.record_event(
                None,
                EventPayload::Versioned {
                    version_id: version.id.clone(),
                    label: version.label.clone(),
                },
                now,
            );
            info!(document_id, version_id = %version.id, label, "created version");
            (version, guard.document.clone())
        };
        self.store.save(&snapshot).await?;
        Ok(version)
    }

    pub async fn revert_version(
        &self,
        document_id: &str,
        version_id: &str,
        actor: &str,
    ) -> DomainResult<DocumentVersion> {
        let state = self.state(document_id).await?;
        let now = now_ms();
        let (version, snapshot) = {
            let mut guard = state.write().await;
            self.drop_from_index(guard.reap_stale(now)).await;
            self.ensure_quiescent(&guard, actor, now)?;
            let version = versions::revert(&mut guard.document, version_id, actor, now)?;
            // Entries were replaced by the snapshot; re-mirror surviving
            // live locks onto them.
            let live: Vec<LockHandle> = guard
                .locks
                .live_locks_not_held_by(&[], now)
                .into_iter()
                .cloned()
                .collect();
            for handle in live {
                if let Some(entry) = guard.document.entry_mut(&handle.entry_id) {
                    entry.lock = Some(handle);
                }
            }
            guard.record_event(
                None,
                EventPayload::Versioned {
                    version_id: version.id.clone(),
                    label: version.label.clone(),
                },
                now,
            );
            info!(document_id, version_id, new_version_id = %version.id, "reverted document");
            (version, guard.document.clone())
        };
        self.store.save(&snapshot).await?;
        Ok(version)
    }

    pub async fn diff_versions(
        &self,
        document_id: &str,
        version_a_id: &str,
        version_b_id: &str,
    ) -> DomainResult<Vec<EditChange>> {
        let state = self.state(document_id).await?;
        let guard = state.read().await;
        versions::diff(&guard.document, version_a_id, version_b_id)
    }

    /// Never blocks on entry locks: viewers may always read.
    pub async fn export_document(
        &self,
        document_id: &str,
        format: ExportFormat,
    ) -> DomainResult<String> {
        let state = self.state(document_id).await?;
        let guard = state.read().await;
        export::render(&guard.document, format)
    }

    /// The tail of the per-document event log, ascending by `seq`.
    pub async fn events(
        &self,
        document_id: &str,
        limit: usize,
    ) -> DomainResult<Vec<CollaborationEvent>> {
        let state = self.state(document_id).await?;
        let guard = state.read().await;
        let skip = guard.events.len().saturating_sub(limit);
        Ok(guard.events.iter().skip(skip).cloned().collect())
    }

    /// Live feed for the external broadcast collaborator.
    pub async fn subscribe(
        &self,
        document_id: &str,
    ) -> DomainResult<broadcast::Receiver<CollaborationEvent>> {
        let state = self.state(document_id).await?;
        let guard = state.read().await;
        Ok(guard.broadcast.subscribe())
    }

    pub async fn checkpoint(&self, document_id: &str) -> DomainResult<()> {
        let snapshot = self.document(document_id).await?;
        self.store.save(&snapshot).await
    }

    pub async fn statistics(&self) -> EditorStatistics {
        let now = now_ms();
        let states: Vec<Arc<RwLock<DocumentState>>> =
            self.documents.read().await.values().cloned().collect();
        let mut stats = EditorStatistics {
            total_documents: states.len(),
            ..EditorStatistics::default()
        };
        for state in states {
            let guard = state.read().await;
            stats.active_sessions += guard.sessions.live_count(now);
            *stats
                .status_counts
                .entry(guard.document.status.to_string())
                .or_insert(0) += 1;
            stats.total_comments += guard.document.comments.len();
            stats.unresolved_comments += review::unresolved_comment_count(&guard.document);
        }
        stats
    }

    fn ensure_quiescent(
        &self,
        state: &DocumentState,
        actor: &str,
        now: i64,
    ) -> DomainResult<()> {
        let own_sessions = state.sessions.session_ids_for_user(actor, now);
        let foreign = state.locks.live_locks_not_held_by(&own_sessions, now);
        if foreign.is_empty() {
            Ok(())
        } else {
            Err(DomainError::DocumentLocked {
                document_id: state.document.id.clone(),
                locked_entries: foreign.len(),
            })
        }
    }

    /// Fetches the in-memory state for a document, falling back to the
    /// store for documents persisted by an earlier process. Restored
    /// documents come back with no sessions or locks.
    async fn state(&self, document_id: &str) -> DomainResult<Arc<RwLock<DocumentState>>> {
        if let Some(state) = self.documents.read().await.get(document_id) {
            return Ok(state.clone());
        }
        let Some(mut document) = self.store.load(document_id).await? else {
            return Err(DomainError::DocumentNotFound {
                document_id: document_id.to_string(),
            });
        };
        document.active_sessions.clear();
        for entry in &mut document.entries {
            entry.lock = None;
        }
        document.validate()?;

        let mut documents = self.documents.write().await;
        let state = documents
            .entry(document_id.to_string())
            .or_insert_with(|| {
                Arc::new(RwLock::new(DocumentState::new(document, &self.config)))
            })
            .clone();
        info!(document_id, "restored document from store");
        Ok(state)
    }

    async fn state_for_session(
        &self,
        session_id: &str,
    ) -> Option<(String, Arc<RwLock<DocumentState>>)> {
        let document_id = self.session_index.read().await.get(session_id).cloned()?;
        let state = self.state(&document_id).await.ok()?;
        Some((document_id, state))
    }

    async fn require_session(
        &self,
        session_id: &str,
    ) -> DomainResult<(String, Arc<RwLock<DocumentState>>)> {
        self.state_for_session(session_id)
            .await
            .ok_or_else(|| DomainError::UnknownSession {
                session_id: session_id.to_string(),
            })
    }

    async fn drop_from_index(&self, session_ids: Vec<String>) {
        if session_ids.is_empty() {
            return;
        }
        let mut index = self.session_index.write().await;
        for session_id in &session_ids {
            index.remove(session_id);
        }
    }
}
