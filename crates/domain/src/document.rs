use std::cmp::Ordering;
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;

pub const CONFIDENCE_MIN: f64 = 0.0;
pub const CONFIDENCE_MAX: f64 = 1.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    InReview,
    ChangesRequested,
    Approved,
    Published,
}

impl DocumentStatus {
    /// `published` is reachable only from `approved`; any state may reopen
    /// to `draft`; every other operator-driven transition is allowed.
    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        match next {
            DocumentStatus::Draft => true,
            DocumentStatus::Published => self == DocumentStatus::Approved,
            _ => true,
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::InReview => write!(f, "in_review"),
            Self::ChangesRequested => write!(f, "changes_requested"),
            Self::Approved => write!(f, "approved"),
            Self::Published => write!(f, "published"),
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "draft" => Ok(Self::Draft),
            "in_review" => Ok(Self::InReview),
            "changes_requested" => Ok(Self::ChangesRequested),
            "approved" => Ok(Self::Approved),
            "published" => Ok(Self::Published),
            other => Err(DomainError::Validation(format!(
                "unknown document status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl FromStr for Severity {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(DomainError::Validation(format!(
                "unknown comment severity: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockHandle {
    pub entry_id: String,
    pub holder_session_id: String,
    pub acquired_at_ms: i64,
    pub expires_at_ms: i64,
}

impl LockHandle {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms <= now_ms
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    pub id: String,
    pub sequence: u32,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub original_text: String,
    pub translated_text: String,
    pub notes: String,
    pub confidence_score: f64,
    pub lock: Option<LockHandle>,
    pub updated_by: String,
    pub updated_at_ms: i64,
}

impl Entry {
    pub fn validate(&self) -> DomainResult<()> {
        if self.id.is_empty() {
            return Err(DomainError::Validation("entry id must not be empty".into()));
        }
        if self.start_time_ms >= self.end_time_ms {
            return Err(DomainError::Validation(format!(
                "entry {}: start_time_ms {} must be before end_time_ms {}",
                self.id, self.start_time_ms, self.end_time_ms
            )));
        }
        if !(CONFIDENCE_MIN..=CONFIDENCE_MAX).contains(&self.confidence_score) {
            return Err(DomainError::Validation(format!(
                "entry {}: confidence_score {} outside [{CONFIDENCE_MIN}, {CONFIDENCE_MAX}]",
                self.id, self.confidence_score
            )));
        }
        Ok(())
    }
}

/// Deterministic display order: sequence ascending, ties broken by id.
pub fn display_order(left: &Entry, right: &Entry) -> Ordering {
    left.sequence
        .cmp(&right.sequence)
        .then_with(|| left.id.cmp(&right.id))
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryField {
    OriginalText,
    TranslatedText,
    Notes,
    ConfidenceScore,
    StartTime,
    EndTime,
}

impl EntryField {
    pub const ALL: [EntryField; 6] = [
        EntryField::OriginalText,
        EntryField::TranslatedText,
        EntryField::Notes,
        EntryField::ConfidenceScore,
        EntryField::StartTime,
        EntryField::EndTime,
    ];

    /// Applies `new_value` to the field and returns the previous value in
    /// its string form. The entry is untouched when validation fails.
    pub fn apply(self, entry: &mut Entry, new_value: &str) -> DomainResult<String> {
        let mut updated = entry.clone();
        self.write(&mut updated, new_value)?;
        updated.validate()?;
        let old_value = self.read(entry);
        *entry = updated;
        Ok(old_value)
    }

    /// Sets the field without validating the resulting entry; parse errors
    /// still fail. Callers validate once all writes are in.
    pub fn write(self, entry: &mut Entry, new_value: &str) -> DomainResult<()> {
        match self {
            Self::OriginalText => entry.original_text = new_value.to_string(),
            Self::TranslatedText => entry.translated_text = new_value.to_string(),
            Self::Notes => entry.notes = new_value.to_string(),
            Self::ConfidenceScore => {
                entry.confidence_score = new_value.parse::<f64>().map_err(|_| {
                    DomainError::Validation(format!(
                        "confidence_score must be a number, got {new_value:?}"
                    ))
                })?;
            }
            Self::StartTime => entry.start_time_ms = parse_time_ms(self, new_value)?,
            Self::EndTime => entry.end_time_ms = parse_time_ms(self, new_value)?,
        }
        Ok(())
    }

    pub fn read(self, entry: &Entry) -> String {
        match self {
            Self::OriginalText => entry.original_text.clone(),
            Self::TranslatedText => entry.translated_text.clone(),
            Self::Notes => entry.notes.clone(),
            Self::ConfidenceScore => entry.confidence_score.to_string(),
            Self::StartTime => entry.start_time_ms.to_string(),
            Self::EndTime => entry.end_time_ms.to_string(),
        }
    }
}

fn parse_time_ms(field: EntryField, value: &str) -> DomainResult<i64> {
    value.parse::<i64>().map_err(|_| {
        DomainError::Validation(format!(
            "{field} must be a millisecond offset, got {value:?}"
        ))
    })
}

impl fmt::Display for EntryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OriginalText => write!(f, "original_text"),
            Self::TranslatedText => write!(f, "translated_text"),
            Self::Notes => write!(f, "notes"),
            Self::ConfidenceScore => write!(f, "confidence_score"),
            Self::StartTime => write!(f, "start_time"),
            Self::EndTime => write!(f, "end_time"),
        }
    }
}

impl FromStr for EntryField {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "original_text" => Ok(Self::OriginalText),
            "translated_text" => Ok(Self::TranslatedText),
            "notes" => Ok(Self::Notes),
            "confidence_score" => Ok(Self::ConfidenceScore),
            "start_time" => Ok(Self::StartTime),
            "end_time" => Ok(Self::EndTime),
            other => Err(DomainError::Validation(format!(
                "field {other} is not editable"
            ))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EditChange {
    pub id: String,
    pub entry_id: String,
    pub field_name: String,
    pub old_value: String,
    pub new_value: String,
    pub changed_by: String,
    pub changed_at_ms: i64,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DocumentVersion {
    pub id: String,
    pub document_id: String,
    pub label: String,
    pub parent_version_id: Option<String>,
    pub created_by: String,
    pub created_at_ms: i64,
    pub snapshot: Vec<Entry>,
    pub change_summary: Vec<EditChange>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReviewComment {
    pub id: String,
    pub entry_id: String,
    pub reviewer_id: String,
    pub reviewer_name: String,
    pub comment: String,
    pub suggestion: Option<String>,
    pub severity: Severity,
    pub is_resolved: bool,
    pub resolved_by: Option<String>,
    pub created_at_ms: i64,
    pub resolved_at_ms: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EditSession {
    pub id: String,
    pub document_id: String,
    pub user_id: String,
    pub user_name: String,
    pub started_at_ms: i64,
    pub last_heartbeat_at_ms: i64,
    pub held_locks: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EditDocument {
    pub id: String,
    pub title: String,
    pub project_id: String,
    pub source_language: String,
    pub target_language: String,
    pub status: DocumentStatus,
    pub entries: Vec<Entry>,
    pub current_version_id: String,
    pub versions: Vec<DocumentVersion>,
    pub comments: Vec<ReviewComment>,
    pub change_log: Vec<EditChange>,
    pub active_sessions: Vec<String>,
    pub created_by: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl EditDocument {
    pub fn entry(&self, entry_id: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.id == entry_id)
    }

    pub fn entry_mut(&mut self, entry_id: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|entry| entry.id == entry_id)
    }

    pub fn version(&self, version_id: &str) -> Option<&DocumentVersion> {
        self.versions.iter().find(|version| version.id == version_id)
    }

    pub fn comment_mut(&mut self, comment_id: &str) -> Option<&mut ReviewComment> {
        self.comments
            .iter_mut()
            .find(|comment| comment.id == comment_id)
    }

    pub fn sorted_entries(&self) -> Vec<Entry> {
        let mut entries = self.entries.clone();
        entries.sort_by(display_order);
        entries
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.id.is_empty() {
            return Err(DomainError::Validation(
                "document id must not be empty".into(),
            ));
        }
        let mut sequences = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            entry.validate()?;
            if sequences.contains(&entry.sequence) {
                return Err(DomainError::Validation(format!(
                    "duplicate entry sequence {}",
                    entry.sequence
                )));
            }
            sequences.push(entry.sequence);
        }
        if self.version(&self.current_version_id).is_none() {
            return Err(DomainError::Validation(format!(
                "current_version_id {} does not name a stored version",
                self.current_version_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, sequence: u32) -> Entry {
        Entry {
            id: id.to_string(),
            sequence,
            start_time_ms: 0,
            end_time_ms: 1_000,
            original_text: "hello".to_string(),
            translated_text: String::new(),
            notes: String::new(),
            confidence_score: 0.9,
            lock: None,
            updated_by: String::new(),
            updated_at_ms: 0,
        }
    }

    #[test]
    fn entry_rejects_inverted_time_range() {
        let mut e = entry("e1", 1);
        e.end_time_ms = e.start_time_ms;
        assert!(matches!(e.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn entry_rejects_out_of_range_confidence() {
        let mut e = entry("e1", 1);
        e.confidence_score = 1.5;
        assert!(matches!(e.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn display_order_sorts_by_sequence_then_id() {
        let a = entry("b", 1);
        let b = entry("a", 1);
        let c = entry("c", 0);
        assert_eq!(display_order(&c, &a), Ordering::Less);
        assert_eq!(display_order(&b, &a), Ordering::Less);
        assert_eq!(display_order(&a, &a), Ordering::Equal);
    }

    #[test]
    fn published_only_reachable_from_approved() {
        assert!(!DocumentStatus::Draft.can_transition_to(DocumentStatus::Published));
        assert!(!DocumentStatus::InReview.can_transition_to(DocumentStatus::Published));
        assert!(DocumentStatus::Approved.can_transition_to(DocumentStatus::Published));
    }

    #[test]
    fn any_status_may_reopen_to_draft() {
        for status in [
            DocumentStatus::Draft,
            DocumentStatus::InReview,
            DocumentStatus::ChangesRequested,
            DocumentStatus::Approved,
            DocumentStatus::Published,
        ] {
            assert!(status.can_transition_to(DocumentStatus::Draft));
        }
    }

    #[test]
    fn entry_field_round_trips_through_strings() {
        for (field, name) in [
            (EntryField::OriginalText, "original_text"),
            (EntryField::TranslatedText, "translated_text"),
            (EntryField::Notes, "notes"),
            (EntryField::ConfidenceScore, "confidence_score"),
            (EntryField::StartTime, "start_time"),
            (EntryField::EndTime, "end_time"),
        ] {
            assert_eq!(field.to_string(), name);
            assert_eq!(name.parse::<EntryField>().unwrap(), field);
        }
        assert!("is_locked".parse::<EntryField>().is_err());
    }

    #[test]
    fn apply_returns_old_value_and_mutates() {
        let mut e = entry("e1", 1);
        let old = EntryField::TranslatedText.apply(&mut e, "Hallo").unwrap();
        assert_eq!(old, "");
        assert_eq!(e.translated_text, "Hallo");
    }

    #[test]
    fn apply_rejects_start_time_past_end_time() {
        let mut e = entry("e1", 1);
        let err = EntryField::StartTime.apply(&mut e, "2000").unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(e.start_time_ms, 0);
    }

    #[test]
    fn apply_rejects_non_numeric_confidence() {
        let mut e = entry("e1", 1);
        assert!(EntryField::ConfidenceScore.apply(&mut e, "high").is_err());
    }
}
