//! Containers and the fixed categories beneath them.

use super::collections::reject_leaf_fields;
use super::{Outcome, check_token, rows};
use crate::core::envelope::{Change, Code, Diff};
use crate::core::error::VaultError;
use crate::core::model::{ContainerRow, Patch};
use crate::core::path::{Category, NodePath};
use crate::core::time;
use rusqlite::Connection;
use serde_json::json;
use ulid::Ulid;

pub fn create(
    conn: &Connection,
    owner: &str,
    collection: &str,
    name: &str,
    summary: Option<&str>,
    exists_ok: bool,
) -> Result<Outcome, VaultError> {
    rows::require_collection(conn, owner, collection)?;
    let now = time::now_epoch();
    let row = ContainerRow {
        id: Ulid::new().to_string(),
        owner: owner.to_string(),
        collection: collection.to_string(),
        name: name.to_string(),
        summary: summary.map(str::to_string),
        deleted: false,
        created_at: now,
        updated_at: now,
    };
    let parent = NodePath::collection(collection).to_string();

    match rows::insert_container(conn, &row) {
        Ok(()) => Ok(Outcome::new(
            Code::Created,
            "Container created.",
            json!({ "container": row.to_json() }),
        )
        .with_diff(Diff::applied(vec![Change::add(&parent, "container", name)]))),
        Err(VaultError::Conflict(msg)) if exists_ok => {
            let existing =
                rows::find_container(conn, owner, collection, name)?.ok_or(VaultError::Conflict(msg))?;
            Ok(Outcome::new(
                Code::Noop,
                "Container exists; no change.",
                json!({ "container": existing.to_json() }),
            )
            .with_diff(Diff::none()))
        }
        Err(e) => Err(e),
    }
}

pub fn list(conn: &Connection, owner: &str, collection: &str) -> Result<Outcome, VaultError> {
    rows::require_collection(conn, owner, collection)?;
    let containers: Vec<_> = rows::list_containers(conn, owner, collection)?
        .iter()
        .map(|c| {
            json!({
                "name": c.name,
                "path": c.path().to_string(),
                "collection": c.collection,
                "summary": c.summary,
            })
        })
        .collect();
    Ok(Outcome::new(
        Code::List,
        format!("{} containers.", containers.len()),
        json!({ "containers": containers }),
    ))
}

/// The four categories of a container, with their leaf counts.
pub fn list_categories(conn: &Connection, owner: &str, collection: &str, container: &str) -> Result<Outcome, VaultError> {
    rows::require_container(conn, owner, collection, container)?;
    let leaves = rows::list_leaves(conn, owner, collection, container, None)?;
    let categories: Vec<_> = Category::ALL
        .iter()
        .map(|cat| {
            json!({
                "name": cat.as_str(),
                "path": NodePath::category(collection, container, *cat).to_string(),
                "collection": collection,
                "container": container,
                "leaves": leaves.iter().filter(|l| l.category == *cat).count(),
            })
        })
        .collect();
    Ok(Outcome::new(
        Code::List,
        "Categories listed.",
        json!({ "categories": categories }),
    ))
}

pub fn read(conn: &Connection, owner: &str, collection: &str, name: &str) -> Result<Outcome, VaultError> {
    let row = rows::require_container(conn, owner, collection, name)?;
    let leaves = rows::list_leaves(conn, owner, collection, name, None)?;
    let mut counts = serde_json::Map::new();
    for cat in Category::ALL {
        counts.insert(
            cat.to_string(),
            json!(leaves.iter().filter(|l| l.category == cat).count()),
        );
    }
    Ok(Outcome::new(
        Code::Read,
        "Container read.",
        json!({ "container": row.to_json(), "categories": counts }),
    ))
}

pub fn read_category(
    conn: &Connection,
    owner: &str,
    collection: &str,
    container: &str,
    category: Category,
) -> Result<Outcome, VaultError> {
    rows::require_container(conn, owner, collection, container)?;
    let names: Vec<String> = rows::list_leaves(conn, owner, collection, container, Some(category))?
        .into_iter()
        .map(|l| l.name)
        .collect();
    Ok(Outcome::new(
        Code::Read,
        "Category read.",
        json!({
            "category": {
                "name": category.as_str(),
                "collection": collection,
                "container": container,
            },
            "leaves": names,
        }),
    ))
}

/// Categories are not stored; ensuring one only checks its container.
pub fn ensure_category(
    conn: &Connection,
    owner: &str,
    collection: &str,
    container: &str,
    category: Category,
) -> Result<Outcome, VaultError> {
    rows::require_container(conn, owner, collection, container)?;
    Ok(Outcome::new(
        Code::Ensured,
        "Category ensured.",
        json!({
            "category": {
                "name": category.as_str(),
                "collection": collection,
                "container": container,
            }
        }),
    ))
}

pub fn patch(
    conn: &mut Connection,
    owner: &str,
    collection: &str,
    name: &str,
    patch: &Patch,
    rename_only: bool,
) -> Result<Outcome, VaultError> {
    reject_leaf_fields(patch, "container")?;
    let row = rows::require_container(conn, owner, collection, name)?;
    let parent = NodePath::collection(collection).to_string();
    let now = time::now_epoch();

    let tx = conn.transaction()?;
    let mut changes = Vec::new();
    let mut cascaded = 0;
    let mut current = row.name.clone();

    if let Some(new_name) = patch.name.as_deref().filter(|n| *n != row.name) {
        if rows::find_container(&tx, owner, collection, new_name)?.is_some() {
            return Err(VaultError::Conflict(format!(
                "Container '{}' already exists in '{}'.",
                new_name, collection
            )));
        }
        cascaded = rows::rename_container_cascade(&tx, owner, collection, &row.name, new_name, now)?;
        changes.push(Change::rename(&parent, "container", &row.name, new_name));
        current = new_name.to_string();
    }

    if let Some(summary) = &patch.summary {
        rows::set_summary(&tx, rows::SummaryTable::Containers, &row.id, summary.as_deref(), now)?;
        changes.push(Change::field(&parent, "container", &current, "summary"));
    }
    tx.commit()?;

    let updated = rows::require_container(conn, owner, collection, &current)?;
    let path = updated.path();
    if changes.is_empty() {
        return Ok(Outcome::new(
            Code::Noop,
            "Container unchanged.",
            json!({ "container": updated.to_json() }),
        )
        .with_diff(Diff::none())
        .retarget(&path));
    }
    let (code, message) = if rename_only {
        (Code::Renamed, "Container renamed.")
    } else {
        (Code::Updated, "Container updated.")
    };
    Ok(Outcome::new(
        code,
        message,
        json!({ "container": updated.to_json(), "cascaded": cascaded }),
    )
    .with_diff(Diff::applied(changes))
    .retarget(&path))
}

pub fn delete(
    conn: &mut Connection,
    owner: &str,
    collection: &str,
    name: &str,
    token: Option<&str>,
) -> Result<Outcome, VaultError> {
    let row = rows::require_container(conn, owner, collection, name)?;
    check_token(&row.path(), token)?;

    let tx = conn.transaction()?;
    let removed = rows::delete_container_cascade(&tx, owner, collection, name)?;
    tx.commit()?;

    Ok(Outcome::new(
        Code::DeletedHard,
        "Container permanently deleted.",
        json!({ "deleted": true, "hard": true, "removed": removed }),
    )
    .with_diff(Diff::applied(vec![Change::remove(
        &NodePath::collection(collection).to_string(),
        "container",
        name,
    )])))
}
