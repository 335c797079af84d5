//! Top-level collections.

use super::{Outcome, check_token, rows};
use crate::core::envelope::{Change, Code, Diff};
use crate::core::error::VaultError;
use crate::core::model::{CollectionRow, Patch};
use crate::core::path::NodePath;
use crate::core::time;
use rusqlite::Connection;
use serde_json::json;
use ulid::Ulid;

pub fn create(
    conn: &Connection,
    owner: &str,
    name: &str,
    summary: Option<&str>,
    exists_ok: bool,
) -> Result<Outcome, VaultError> {
    let now = time::now_epoch();
    let row = CollectionRow {
        id: Ulid::new().to_string(),
        owner: owner.to_string(),
        name: name.to_string(),
        summary: summary.map(str::to_string),
        deleted: false,
        created_at: now,
        updated_at: now,
    };

    match rows::insert_collection(conn, &row) {
        Ok(()) => Ok(Outcome::new(
            Code::Created,
            "Collection created.",
            json!({ "collection": row.to_json() }),
        )
        .with_diff(Diff::applied(vec![Change::add("/", "collection", name)]))),
        Err(VaultError::Conflict(msg)) if exists_ok => {
            let existing = rows::find_collection(conn, owner, name)?.ok_or(VaultError::Conflict(msg))?;
            Ok(Outcome::new(
                Code::Noop,
                "Collection exists; no change.",
                json!({ "collection": existing.to_json() }),
            )
            .with_diff(Diff::none()))
        }
        Err(e) => Err(e),
    }
}

pub fn list(conn: &Connection, owner: &str) -> Result<Outcome, VaultError> {
    let collections: Vec<_> = rows::list_collections(conn, owner)?
        .iter()
        .map(|c| {
            json!({
                "name": c.name,
                "path": c.path().to_string(),
                "summary": c.summary,
            })
        })
        .collect();
    Ok(Outcome::new(
        Code::List,
        format!("{} collections.", collections.len()),
        json!({ "collections": collections }),
    ))
}

pub fn read(conn: &Connection, owner: &str, name: &str) -> Result<Outcome, VaultError> {
    let row = rows::require_collection(conn, owner, name)?;
    let containers: Vec<String> = rows::list_containers(conn, owner, name)?
        .into_iter()
        .map(|c| c.name)
        .collect();
    Ok(Outcome::new(
        Code::Read,
        "Collection read.",
        json!({ "collection": row.to_json(), "containers": containers }),
    ))
}

/// Collections and containers only carry a name and a summary.
pub(crate) fn reject_leaf_fields(patch: &Patch, kind: &str) -> Result<(), VaultError> {
    let unsupported: Vec<&str> = patch
        .touched_fields()
        .into_iter()
        .filter(|f| *f != "summary")
        .collect();
    if unsupported.is_empty() {
        Ok(())
    } else {
        Err(VaultError::ValidationError(format!(
            "Field(s) {} not supported on a {}.",
            unsupported.join(", "),
            kind
        )))
    }
}

/// Apply a rename and/or summary change. `rename_only` selects the
/// `RENAMED` code used by the dedicated rename verb.
pub fn patch(
    conn: &mut Connection,
    owner: &str,
    name: &str,
    patch: &Patch,
    rename_only: bool,
) -> Result<Outcome, VaultError> {
    reject_leaf_fields(patch, "collection")?;
    let row = rows::require_collection(conn, owner, name)?;
    let now = time::now_epoch();

    let tx = conn.transaction()?;
    let mut changes = Vec::new();
    let mut cascaded = 0;
    let mut current = row.name.clone();

    if let Some(new_name) = patch.name.as_deref().filter(|n| *n != row.name) {
        if rows::find_collection(&tx, owner, new_name)?.is_some() {
            return Err(VaultError::Conflict(format!("Collection '{}' already exists.", new_name)));
        }
        cascaded = rows::rename_collection_cascade(&tx, owner, &row.name, new_name, now)?;
        changes.push(Change::rename("/", "collection", &row.name, new_name));
        current = new_name.to_string();
    }

    if let Some(summary) = &patch.summary {
        rows::set_summary(&tx, rows::SummaryTable::Collections, &row.id, summary.as_deref(), now)?;
        changes.push(Change::field("/", "collection", &current, "summary"));
    }
    tx.commit()?;

    let updated = rows::require_collection(conn, owner, &current)?;
    let path = NodePath::collection(&current);
    if changes.is_empty() {
        return Ok(Outcome::new(
            Code::Noop,
            "Collection unchanged.",
            json!({ "collection": updated.to_json() }),
        )
        .with_diff(Diff::none())
        .retarget(&path));
    }
    let (code, message) = if rename_only {
        (Code::Renamed, "Collection renamed.")
    } else {
        (Code::Updated, "Collection updated.")
    };
    Ok(Outcome::new(
        code,
        message,
        json!({ "collection": updated.to_json(), "cascaded": cascaded }),
    )
    .with_diff(Diff::applied(changes))
    .retarget(&path))
}

pub fn delete(conn: &mut Connection, owner: &str, name: &str, token: Option<&str>) -> Result<Outcome, VaultError> {
    let row = rows::require_collection(conn, owner, name)?;
    check_token(&row.path(), token)?;

    let tx = conn.transaction()?;
    let removed = rows::delete_collection_cascade(&tx, owner, name)?;
    tx.commit()?;

    Ok(Outcome::new(
        Code::DeletedHard,
        "Collection permanently deleted.",
        json!({ "deleted": true, "hard": true, "removed": removed }),
    )
    .with_diff(Diff::applied(vec![Change::remove("/", "collection", name)])))
}
