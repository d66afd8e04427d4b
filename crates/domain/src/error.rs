use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("document {document_id} not found")]
    DocumentNotFound { document_id: String },
    #[error("entry {entry_id} not found")]
    EntryNotFound { entry_id: String },
    #[error("comment {comment_id} not found")]
    CommentNotFound { comment_id: String },
    #[error("version {version_id} not found")]
    VersionNotFound { version_id: String },
    #[error("entry {entry_id} is locked by session {holder_session_id}")]
    AlreadyLocked {
        entry_id: String,
        holder_session_id: String,
    },
    #[error("session {session_id} does not hold the lock on entry {entry_id}")]
    NotHolder {
        entry_id: String,
        session_id: String,
    },
    #[error("document {document_id} has {locked_entries} entries locked by other users")]
    DocumentLocked {
        document_id: String,
        locked_entries: usize,
    },
    #[error("illegal status transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },
    #[error("comment {comment_id} is already resolved")]
    AlreadyResolved { comment_id: String },
    #[error("unknown session {session_id}")]
    UnknownSession { session_id: String },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("storage failed: {0}")]
    Storage(String),
}
