//! Leaf entries: the content-bearing nodes at the bottom of the tree.

use super::{Outcome, check_token, rows};
use crate::core::envelope::{Change, Code, Diff};
use crate::core::error::VaultError;
use crate::core::model::{LeafFields, LeafRow, Patch, normalize_tags};
use crate::core::path::{Category, NodePath};
use crate::core::time;
use crate::core::value::merge_shallow;
use rusqlite::Connection;
use serde_json::{Value as JsonValue, json};
use ulid::Ulid;

/// Compact listing form of a leaf.
pub fn brief(row: &LeafRow) -> JsonValue {
    json!({
        "name": row.name,
        "path": row.path().to_string(),
        "summary": row.summary,
        "tags": row.tags,
    })
}

#[allow(clippy::too_many_arguments)]
pub fn create(
    conn: &Connection,
    owner: &str,
    collection: &str,
    container: &str,
    category: Category,
    name: &str,
    fields: &LeafFields,
    exists_ok: bool,
) -> Result<Outcome, VaultError> {
    rows::require_container(conn, owner, collection, container)?;
    let now = time::now_epoch();
    let row = LeafRow {
        id: Ulid::new().to_string(),
        owner: owner.to_string(),
        collection: collection.to_string(),
        container: container.to_string(),
        category,
        name: name.to_string(),
        summary: fields.summary.clone(),
        notes: fields.notes.clone(),
        tags: normalize_tags(fields.tags.iter().cloned()),
        metadata: fields.metadata.clone(),
        deleted: false,
        created_at: now,
        updated_at: now,
    };
    let parent = NodePath::category(collection, container, category).to_string();

    match rows::insert_leaf(conn, &row) {
        Ok(()) => Ok(Outcome::new(Code::Created, "Leaf created.", json!({ "leaf": row.to_json() }))
            .with_diff(Diff::applied(vec![Change::add(&parent, "leaf", name)]))),
        Err(VaultError::Conflict(msg)) if exists_ok => {
            let mut existing = rows::find_leaf(conn, owner, collection, container, category, name)?
                .ok_or(VaultError::Conflict(msg))?;
            let message = if fields.metadata.is_empty() {
                "Leaf exists; no change."
            } else {
                merge_shallow(&mut existing.metadata, &fields.metadata);
                existing.updated_at = now;
                rows::update_leaf_content(conn, &existing)?;
                "Leaf exists; metadata merged."
            };
            Ok(Outcome::new(Code::Noop, message, json!({ "leaf": existing.to_json() })).with_diff(Diff::none()))
        }
        Err(e) => Err(e),
    }
}

pub fn list(
    conn: &Connection,
    owner: &str,
    collection: &str,
    container: &str,
    category: Category,
) -> Result<Outcome, VaultError> {
    rows::require_container(conn, owner, collection, container)?;
    let leaves: Vec<JsonValue> = rows::list_leaves(conn, owner, collection, container, Some(category))?
        .iter()
        .map(brief)
        .collect();
    Ok(Outcome::new(
        Code::List,
        format!("{} leaves.", leaves.len()),
        json!({ "leaves": leaves }),
    ))
}

pub fn read(
    conn: &Connection,
    owner: &str,
    collection: &str,
    container: &str,
    category: Category,
    name: &str,
) -> Result<Outcome, VaultError> {
    let row = rows::require_leaf(conn, owner, collection, container, category, name)?;
    Ok(Outcome::new(Code::Read, "Leaf read.", json!({ "leaf": row.to_json() })))
}

#[allow(clippy::too_many_arguments)]
pub fn patch(
    conn: &mut Connection,
    owner: &str,
    collection: &str,
    container: &str,
    category: Category,
    name: &str,
    patch: &Patch,
    rename_only: bool,
) -> Result<Outcome, VaultError> {
    let row = rows::require_leaf(conn, owner, collection, container, category, name)?;
    let parent = NodePath::category(collection, container, category).to_string();
    let now = time::now_epoch();

    let tx = conn.transaction()?;
    let mut changes = Vec::new();
    let mut updated = row.clone();

    if let Some(new_name) = patch.name.as_deref().filter(|n| *n != row.name) {
        if rows::find_leaf(&tx, owner, collection, container, category, new_name)?.is_some() {
            return Err(VaultError::Conflict(format!(
                "Leaf '{}' already exists at {}.",
                new_name, parent
            )));
        }
        rows::rename_leaf(&tx, &row.id, new_name, now, &parent)?;
        changes.push(Change::rename(&parent, "leaf", &row.name, new_name));
        updated.name = new_name.to_string();
        updated.updated_at = now;
    }

    if let Some(summary) = &patch.summary {
        updated.summary = summary.clone();
    }
    if let Some(notes) = &patch.notes {
        updated.notes = notes.clone();
    }
    if let Some(tags) = &patch.tags {
        updated.tags = normalize_tags(tags.iter().cloned());
    }
    if let Some(metadata) = &patch.metadata {
        merge_shallow(&mut updated.metadata, metadata);
    }
    let touched = patch.touched_fields();
    if !touched.is_empty() {
        updated.updated_at = now;
        rows::update_leaf_content(&tx, &updated)?;
        for field in touched {
            changes.push(Change::field(&parent, "leaf", &updated.name, field));
        }
    }
    tx.commit()?;

    let path = updated.path();
    if changes.is_empty() {
        return Ok(Outcome::new(Code::Noop, "Leaf unchanged.", json!({ "leaf": row.to_json() }))
            .with_diff(Diff::none())
            .retarget(&path));
    }
    let (code, message) = if rename_only {
        (Code::Renamed, "Leaf renamed.")
    } else {
        (Code::Updated, "Leaf updated.")
    };
    Ok(Outcome::new(code, message, json!({ "leaf": updated.to_json() }))
        .with_diff(Diff::applied(changes))
        .retarget(&path))
}

#[allow(clippy::too_many_arguments)]
pub fn delete(
    conn: &mut Connection,
    owner: &str,
    collection: &str,
    container: &str,
    category: Category,
    name: &str,
    token: Option<&str>,
) -> Result<Outcome, VaultError> {
    let row = rows::require_leaf(conn, owner, collection, container, category, name)?;
    check_token(&row.path(), token)?;

    let tx = conn.transaction()?;
    let removed = rows::delete_leaf(&tx, &row.id)?;
    tx.commit()?;

    Ok(Outcome::new(
        Code::DeletedHard,
        "Leaf permanently deleted.",
        json!({ "deleted": true, "hard": true, "removed": removed }),
    )
    .with_diff(Diff::applied(vec![Change::remove(
        &row.path().parent().to_string(),
        "leaf",
        name,
    )])))
}
