use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::DocumentStatus;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Joined,
    Left,
    Locked,
    Unlocked,
    Edited,
    Commented,
    Resolved,
    Versioned,
    StatusChanged,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Joined => write!(f, "joined"),
            Self::Left => write!(f, "left"),
            Self::Locked => write!(f, "locked"),
            Self::Unlocked => write!(f, "unlocked"),
            Self::Edited => write!(f, "edited"),
            Self::Commented => write!(f, "commented"),
            Self::Resolved => write!(f, "resolved"),
            Self::Versioned => write!(f, "versioned"),
            Self::StatusChanged => write!(f, "status_changed"),
        }
    }
}

/// One closed variant per event kind, carrying only the fields relevant to
/// that kind.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Joined {
        user_id: String,
        user_name: String,
    },
    Left {
        user_id: String,
        user_name: String,
    },
    Locked {
        entry_id: String,
        expires_at_ms: i64,
    },
    Unlocked {
        entry_id: String,
    },
    Edited {
        entry_id: String,
        field_name: String,
    },
    Commented {
        comment_id: String,
        entry_id: String,
        severity: String,
    },
    Resolved {
        comment_id: String,
        resolved_by: String,
    },
    Versioned {
        version_id: String,
        label: String,
    },
    StatusChanged {
        from: DocumentStatus,
        to: DocumentStatus,
        actor: String,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Joined { .. } => EventKind::Joined,
            Self::Left { .. } => EventKind::Left,
            Self::Locked { .. } => EventKind::Locked,
            Self::Unlocked { .. } => EventKind::Unlocked,
            Self::Edited { .. } => EventKind::Edited,
            Self::Commented { .. } => EventKind::Commented,
            Self::Resolved { .. } => EventKind::Resolved,
            Self::Versioned { .. } => EventKind::Versioned,
            Self::StatusChanged { .. } => EventKind::StatusChanged,
        }
    }
}

/// Ordered by the per-document `seq` counter, not wall clock, so the stream
/// stays totally ordered under clock skew.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CollaborationEvent {
    pub id: String,
    pub document_id: String,
    pub session_id: Option<String>,
    pub seq: u64,
    #[serde(flatten)]
    pub payload: EventPayload,
    pub at_ms: i64,
}

impl CollaborationEvent {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}
