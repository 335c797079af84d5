//! Move and copy for leaves (into a category) and containers (into a
//! collection).
//!
//! Both run as copy-then-delete inside one transaction: a failure at any
//! step rolls everything back and is reported with the step's name.

use super::{OpCtx, Outcome, check_name, rows, target_of};
use crate::core::envelope::{Change, Code, CommandEcho, Diff, Envelope, OpFrame};
use crate::core::error::VaultError;
use crate::core::model::{ContainerRow, LeafRow};
use crate::core::path::NodePath;
use crate::core::time;
use rusqlite::Connection;
use serde_json::{Map, Value as JsonValue, json};
use ulid::Ulid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Move,
    Copy,
}

impl Mode {
    fn verb(self) -> &'static str {
        match self {
            Mode::Move => "move",
            Mode::Copy => "copy",
        }
    }
}

/// Move `src` under `dst_parent`. With `overwrite`, a same-named node at
/// the destination is replaced; otherwise it is a conflict and the source
/// stays where it is.
pub fn move_node(ctx: &OpCtx<'_>, src: &str, dst_parent: &str, overwrite: bool) -> Envelope {
    transfer(ctx, Mode::Move, src, dst_parent, None, overwrite)
}

/// Copy `src` under `dst_parent`, optionally as `new_name`.
pub fn copy_node(
    ctx: &OpCtx<'_>,
    src: &str,
    dst_parent: &str,
    new_name: Option<&str>,
    overwrite: bool,
) -> Envelope {
    transfer(ctx, Mode::Copy, src, dst_parent, new_name, overwrite)
}

fn transfer(
    ctx: &OpCtx<'_>,
    mode: Mode,
    src: &str,
    dst_parent: &str,
    new_name: Option<&str>,
    overwrite: bool,
) -> Envelope {
    let src_path = match ctx.parse_path(mode.verb(), "src", src) {
        Ok(p) => p,
        Err(env) => return env,
    };
    let dst_path = match ctx.parse_path(mode.verb(), "dst", dst_parent) {
        Ok(p) => p,
        Err(env) => return env,
    };
    let mut command = CommandEcho::new(ctx.raw, &format!("{}.{}", src_path.type_str(), mode.verb()))
        .arg("src", src_path.to_string())
        .arg("dst", dst_path.to_string())
        .arg("overwrite", overwrite);
    if mode == Mode::Copy {
        command = command.arg("new_name", new_name);
    }
    let frame = OpFrame::new(command, target_of(&src_path));

    match (&src_path, &dst_path) {
        (NodePath::Leaf { .. }, NodePath::Category { .. }) => ctx.run(frame, |conn, owner| {
            transfer_leaf(conn, owner, mode, &src_path, &dst_path, new_name, overwrite)
        }),
        (NodePath::Container { .. }, NodePath::Collection { .. }) => ctx.run(frame, |conn, owner| {
            transfer_container(conn, owner, mode, &src_path, &dst_path, new_name, overwrite)
        }),
        _ => frame.fail(
            Code::ErrorValidation,
            format!(
                "Cannot {} a {} into '{}': leaves go into categories, containers into collections.",
                mode.verb(),
                src_path.type_str(),
                dst_path
            ),
        ),
    }
}

/// Outcome for a source and destination that are the same node.
fn same_node(mode: Mode, overwrite: bool, dst: &NodePath) -> Result<Outcome, VaultError> {
    if mode == Mode::Copy && !overwrite {
        return Err(VaultError::Conflict(format!("Destination '{}' exists.", dst)));
    }
    Ok(Outcome::new(
        Code::Noop,
        "Source and destination are the same node.",
        json!({ "name": dst.name(), "from": dst.to_string(), "to": dst.to_string() }),
    )
    .with_diff(Diff::none())
    .retarget(dst))
}

fn finish(mode: Mode, label: &str, src: &NodePath, dst: &NodePath, changes: Vec<Change>, extra: JsonValue) -> Outcome {
    let (code, flag) = match mode {
        Mode::Move => (Code::Moved, "moved"),
        Mode::Copy => (Code::Copied, "copied"),
    };
    let mut result = Map::new();
    result.insert(flag.to_string(), JsonValue::Bool(true));
    result.insert("name".to_string(), json!(dst.name()));
    result.insert("from".to_string(), json!(src.to_string()));
    result.insert("to".to_string(), json!(dst.to_string()));
    if let JsonValue::Object(more) = extra {
        result.extend(more);
    }
    Outcome::new(code, format!("{} {}.", label, flag), JsonValue::Object(result))
        .with_diff(Diff::applied(changes))
        .retarget(dst)
}

#[allow(clippy::too_many_arguments)]
fn transfer_leaf(
    conn: &mut Connection,
    owner: &str,
    mode: Mode,
    src: &NodePath,
    dst_parent: &NodePath,
    new_name: Option<&str>,
    overwrite: bool,
) -> Result<Outcome, VaultError> {
    let (
        NodePath::Leaf {
            collection,
            container,
            category,
            leaf,
        },
        NodePath::Category {
            collection: dst_collection,
            container: dst_container,
            category: dst_category,
        },
    ) = (src, dst_parent)
    else {
        return Err(VaultError::ValidationError("Leaves can only go into categories.".to_string()));
    };
    if let Some(name) = new_name {
        check_name(name)?;
    }

    let source = rows::require_leaf(conn, owner, collection, container, *category, leaf)
        .map_err(|e| match e {
            VaultError::NotFound(_) => VaultError::NotFound(format!("Source leaf '{}' not found.", src)),
            other => other,
        })?;
    rows::require_container(conn, owner, dst_collection, dst_container)?;

    let name = new_name.unwrap_or(source.name.as_str()).to_string();
    let dst = NodePath::leaf(dst_collection, dst_container, *dst_category, &name);
    if dst == *src {
        return same_node(mode, overwrite, &dst);
    }
    let existing = rows::find_leaf(conn, owner, dst_collection, dst_container, *dst_category, &name)?;
    if existing.is_some() && !overwrite {
        return Err(VaultError::Conflict(format!("Destination leaf '{}' exists.", dst)));
    }

    let now = time::now_epoch();
    let dst_parent_str = dst_parent.to_string();
    let mut changes = Vec::new();

    let tx = conn.transaction()?;
    if let Some(existing) = existing {
        rows::delete_leaf(&tx, &existing.id).map_err(|e| e.at_stage("replace destination"))?;
        changes.push(Change::remove(&dst_parent_str, "leaf", &name));
    }
    let copy = LeafRow {
        id: Ulid::new().to_string(),
        collection: dst_collection.clone(),
        container: dst_container.clone(),
        category: *dst_category,
        name: name.clone(),
        created_at: if mode == Mode::Move { source.created_at } else { now },
        updated_at: now,
        ..source.clone()
    };
    rows::insert_leaf(&tx, &copy).map_err(|e| e.at_stage("copy"))?;
    if mode == Mode::Move {
        rows::delete_leaf(&tx, &source.id).map_err(|e| e.at_stage("delete source"))?;
        changes.push(Change::remove(&src.parent().to_string(), "leaf", leaf));
    }
    changes.push(Change::add(&dst_parent_str, "leaf", &name));
    tx.commit().map_err(|e| VaultError::from(e).at_stage("commit"))?;

    Ok(finish(mode, "Leaf", src, &dst, changes, json!({ "leaf": copy.to_json() })))
}

#[allow(clippy::too_many_arguments)]
fn transfer_container(
    conn: &mut Connection,
    owner: &str,
    mode: Mode,
    src: &NodePath,
    dst_parent: &NodePath,
    new_name: Option<&str>,
    overwrite: bool,
) -> Result<Outcome, VaultError> {
    let (
        NodePath::Container {
            collection,
            container,
        },
        NodePath::Collection {
            collection: dst_collection,
        },
    ) = (src, dst_parent)
    else {
        return Err(VaultError::ValidationError(
            "Containers can only go into collections.".to_string(),
        ));
    };
    if let Some(name) = new_name {
        check_name(name)?;
    }

    let source = rows::require_container(conn, owner, collection, container).map_err(|e| match e {
        VaultError::NotFound(_) => VaultError::NotFound(format!("Source container '{}' not found.", src)),
        other => other,
    })?;
    rows::require_collection(conn, owner, dst_collection)?;

    let name = new_name.unwrap_or(source.name.as_str()).to_string();
    let dst = NodePath::container(dst_collection, &name);
    if dst == *src {
        return same_node(mode, overwrite, &dst);
    }
    let existing = rows::find_container(conn, owner, dst_collection, &name)?;
    if existing.is_some() && !overwrite {
        return Err(VaultError::Conflict(format!("Destination container '{}' exists.", dst)));
    }
    let leaves = rows::list_leaves(conn, owner, collection, container, None)?;

    let now = time::now_epoch();
    let dst_parent_str = dst_parent.to_string();
    let mut changes = Vec::new();

    let tx = conn.transaction()?;
    if existing.is_some() {
        rows::delete_container_cascade(&tx, owner, dst_collection, &name)
            .map_err(|e| e.at_stage("replace destination"))?;
        changes.push(Change::remove(&dst_parent_str, "container", &name));
    }
    let copy = ContainerRow {
        id: Ulid::new().to_string(),
        collection: dst_collection.clone(),
        name: name.clone(),
        created_at: if mode == Mode::Move { source.created_at } else { now },
        updated_at: now,
        ..source.clone()
    };
    rows::insert_container(&tx, &copy).map_err(|e| e.at_stage("copy"))?;
    for leaf in &leaves {
        let leaf_copy = LeafRow {
            id: Ulid::new().to_string(),
            collection: dst_collection.clone(),
            container: name.clone(),
            created_at: if mode == Mode::Move { leaf.created_at } else { now },
            updated_at: now,
            ..leaf.clone()
        };
        rows::insert_leaf(&tx, &leaf_copy).map_err(|e| e.at_stage("copy"))?;
    }
    if mode == Mode::Move {
        rows::delete_container_cascade(&tx, owner, collection, container)
            .map_err(|e| e.at_stage("delete source"))?;
        changes.push(Change::remove(&src.parent().to_string(), "container", container));
    }
    changes.push(Change::add(&dst_parent_str, "container", &name));
    tx.commit().map_err(|e| VaultError::from(e).at_stage("commit"))?;

    Ok(finish(
        mode,
        "Container",
        src,
        &dst,
        changes,
        json!({ "container": copy.to_json(), "leaves": leaves.len() }),
    ))
}
