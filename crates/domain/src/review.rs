use crate::DomainResult;
use crate::document::{DocumentStatus, EditDocument, ReviewComment, Severity};
use crate::error::DomainError;
use crate::util::uuid_v7_without_dashes;

pub const MAX_COMMENT_LENGTH: usize = 4_000;

pub struct NewComment {
    pub entry_id: String,
    pub reviewer_id: String,
    pub reviewer_name: String,
    pub comment: String,
    pub suggestion: Option<String>,
    pub severity: Severity,
}

pub fn add_comment(
    document: &mut EditDocument,
    input: NewComment,
    now_ms: i64,
) -> DomainResult<ReviewComment> {
    if input.comment.trim().is_empty() {
        return Err(DomainError::Validation(
            "comment text must not be empty".into(),
        ));
    }
    if input.comment.len() > MAX_COMMENT_LENGTH {
        return Err(DomainError::Validation(format!(
            "comment text exceeds {MAX_COMMENT_LENGTH} characters"
        )));
    }
    if document.entry(&input.entry_id).is_none() {
        return Err(DomainError::EntryNotFound {
            entry_id: input.entry_id,
        });
    }

    let comment = ReviewComment {
        id: uuid_v7_without_dashes(),
        entry_id: input.entry_id,
        reviewer_id: input.reviewer_id,
        reviewer_name: input.reviewer_name,
        comment: input.comment,
        suggestion: input.suggestion,
        severity: input.severity,
        is_resolved: false,
        resolved_by: None,
        created_at_ms: now_ms,
        resolved_at_ms: None,
    };
    document.comments.push(comment.clone());
    document.updated_at_ms = now_ms;
    Ok(comment)
}

/// Resolution is monotonic: a resolved comment cannot be reopened here.
pub fn resolve_comment(
    document: &mut EditDocument,
    comment_id: &str,
    resolved_by: &str,
    now_ms: i64,
) -> DomainResult<ReviewComment> {
    let comment =
        document
            .comment_mut(comment_id)
            .ok_or_else(|| DomainError::CommentNotFound {
                comment_id: comment_id.to_string(),
            })?;
    if comment.is_resolved {
        return Err(DomainError::AlreadyResolved {
            comment_id: comment_id.to_string(),
        });
    }
    comment.is_resolved = true;
    comment.resolved_by = Some(resolved_by.to_string());
    comment.resolved_at_ms = Some(now_ms);
    let resolved = comment.clone();
    document.updated_at_ms = now_ms;
    Ok(resolved)
}

pub fn set_status(
    document: &mut EditDocument,
    new_status: DocumentStatus,
    now_ms: i64,
) -> DomainResult<(DocumentStatus, DocumentStatus)> {
    let old_status = document.status;
    if !old_status.can_transition_to(new_status) {
        return Err(DomainError::IllegalTransition {
            from: old_status.to_string(),
            to: new_status.to_string(),
        });
    }
    document.status = new_status;
    document.updated_at_ms = now_ms;
    Ok((old_status, new_status))
}

pub fn unresolved_comment_count(document: &EditDocument) -> usize {
    document
        .comments
        .iter()
        .filter(|comment| !comment.is_resolved)
        .count()
}
