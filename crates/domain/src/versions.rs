use crate::DomainResult;
use crate::document::{DocumentVersion, EditChange, EditDocument, Entry, EntryField};
use crate::error::DomainError;
use crate::util::uuid_v7_without_dashes;

/// A point-in-time copy of the entries in display order, lock state
/// stripped. Snapshots never carry transient coordination state.
pub fn snapshot_entries(entries: &[Entry]) -> Vec<Entry> {
    let mut snapshot = entries.to_vec();
    snapshot.sort_by(crate::document::display_order);
    for entry in &mut snapshot {
        entry.lock = None;
    }
    snapshot
}

/// Per-field diff between two snapshots of the same document. Entries are
/// matched by id; entries are never deleted, so both sides always cover the
/// same id set once a document exists.
pub fn diff_snapshots(
    parent: &[Entry],
    current: &[Entry],
    changed_by: &str,
    changed_at_ms: i64,
) -> Vec<EditChange> {
    let mut changes = Vec::new();
    for entry in current {
        let Some(before) = parent.iter().find(|candidate| candidate.id == entry.id) else {
            continue;
        };
        // Attribute the change to whoever last touched the entry; fall back
        // to the snapshot author for entries without edit metadata.
        let entry_changed_by = if entry.updated_by.is_empty() {
            changed_by
        } else {
            entry.updated_by.as_str()
        };
        let entry_changed_at_ms = if entry.updated_at_ms > 0 {
            entry.updated_at_ms
        } else {
            changed_at_ms
        };
        for field in EntryField::ALL {
            let old_value = field.read(before);
            let new_value = field.read(entry);
            if old_value != new_value {
                changes.push(EditChange {
                    id: uuid_v7_without_dashes(),
                    entry_id: entry.id.clone(),
                    field_name: field.to_string(),
                    old_value,
                    new_value,
                    changed_by: entry_changed_by.to_string(),
                    changed_at_ms: entry_changed_at_ms,
                    comment: None,
                });
            }
        }
    }
    changes
}

/// Replays a change list onto a snapshot. Inverse check for
/// `diff_snapshots`: applying `diff(a, b)` to `a` must reproduce `b`.
pub fn apply_changes(parent: &[Entry], changes: &[EditChange]) -> DomainResult<Vec<Entry>> {
    let mut entries = parent.to_vec();
    for change in changes {
        let entry = entries
            .iter_mut()
            .find(|entry| entry.id == change.entry_id)
            .ok_or_else(|| DomainError::EntryNotFound {
                entry_id: change.entry_id.clone(),
            })?;
        let field: EntryField = change.field_name.parse()?;
        field.write(entry, &change.new_value)?;
        entry.updated_by = change.changed_by.clone();
        entry.updated_at_ms = change.changed_at_ms;
    }
    for entry in &entries {
        entry.validate()?;
    }
    Ok(snapshot_entries(&entries))
}

/// Snapshots the live entries as a new version chained to the current one
/// and moves the current pointer. The quiescence check (no foreign live
/// locks) is the editor manager's job; this stays pure.
pub fn create_version(
    document: &mut EditDocument,
    label: &str,
    created_by: &str,
    now_ms: i64,
) -> DomainResult<DocumentVersion> {
    if label.trim().is_empty() {
        return Err(DomainError::Validation(
            "version label must not be empty".into(),
        ));
    }
    let parent = document
        .version(&document.current_version_id)
        .ok_or_else(|| DomainError::VersionNotFound {
            version_id: document.current_version_id.clone(),
        })?;

    let snapshot = snapshot_entries(&document.entries);
    let change_summary = diff_snapshots(&parent.snapshot, &snapshot, created_by, now_ms);
    let version = DocumentVersion {
        id: uuid_v7_without_dashes(),
        document_id: document.id.clone(),
        label: label.to_string(),
        parent_version_id: Some(parent.id.clone()),
        created_by: created_by.to_string(),
        created_at_ms: now_ms,
        snapshot,
        change_summary,
    };
    document.versions.push(version.clone());
    document.current_version_id = version.id.clone();
    document.updated_at_ms = now_ms;
    Ok(version)
}

pub fn diff(
    document: &EditDocument,
    version_a_id: &str,
    version_b_id: &str,
) -> DomainResult<Vec<EditChange>> {
    let version_a =
        document
            .version(version_a_id)
            .ok_or_else(|| DomainError::VersionNotFound {
                version_id: version_a_id.to_string(),
            })?;
    let version_b =
        document
            .version(version_b_id)
            .ok_or_else(|| DomainError::VersionNotFound {
                version_id: version_b_id.to_string(),
            })?;
    Ok(diff_snapshots(
        &version_a.snapshot,
        &version_b.snapshot,
        &version_b.created_by,
        version_b.created_at_ms,
    ))
}

/// Restores `version_id`'s snapshot as a new version on top of the chain.
/// History only grows; nothing is rewritten.
pub fn revert(
    document: &mut EditDocument,
    version_id: &str,
    actor: &str,
    now_ms: i64,
) -> DomainResult<DocumentVersion> {
    let target = document
        .version(version_id)
        .ok_or_else(|| DomainError::VersionNotFound {
            version_id: version_id.to_string(),
        })?
        .clone();
    let parent = document
        .version(&document.current_version_id)
        .ok_or_else(|| DomainError::VersionNotFound {
            version_id: document.current_version_id.clone(),
        })?;

    let change_summary = diff_snapshots(&parent.snapshot, &target.snapshot, actor, now_ms);
    let version = DocumentVersion {
        id: uuid_v7_without_dashes(),
        document_id: document.id.clone(),
        label: format!("revert to {}", target.label),
        parent_version_id: Some(parent.id.clone()),
        created_by: actor.to_string(),
        created_at_ms: now_ms,
        snapshot: target.snapshot.clone(),
        change_summary,
    };
    document.entries = target.snapshot;
    document.versions.push(version.clone());
    document.current_version_id = version.id.clone();
    document.updated_at_ms = now_ms;
    Ok(version)
}
