//! Hierarchical vault store.
//!
//! Every public function here takes an [`OpCtx`] and returns an [`Envelope`].
//! Expected conditions (validation, missing nodes, conflicts, unconfirmed
//! deletes) come back as error envelopes; nothing in this module panics or
//! returns `Err` to the caller. Internally each kind module works with
//! `Result<Outcome, VaultError>` and the boundary in [`OpCtx::run`] turns the
//! error variants into their `ERROR_*` codes.

pub mod archive;
pub mod collections;
pub mod containers;
pub mod leaves;
pub mod rows;
pub mod search;
pub mod transfer;

pub use archive::{ExportContainer, ExportLeaf, ExportTree, ImportStrategy, export, import};
pub use search::search;
pub use transfer::{copy_node, move_node};

use crate::core::envelope::{Code, CommandEcho, Diff, Envelope, OpFrame, Target};
use crate::core::error::VaultError;
use crate::core::model::{LeafFields, Patch};
use crate::core::path::{NodeKind, NodePath, validate_name};
use crate::core::store::Store;
use rusqlite::Connection;
use serde_json::{Map, Value as JsonValue, json};

/// Explicit per-call context: which store, on behalf of whom, and the raw
/// command text to echo back.
#[derive(Debug, Clone, Copy)]
pub struct OpCtx<'a> {
    pub store: &'a Store,
    pub owner: Option<&'a str>,
    pub raw: &'a str,
}

impl<'a> OpCtx<'a> {
    pub fn new(store: &'a Store, owner: Option<&'a str>, raw: &'a str) -> Self {
        Self { store, owner, raw }
    }

    pub(crate) fn frame(&self, name: &str, target: Target) -> OpFrame {
        OpFrame::new(CommandEcho::new(self.raw, name), target)
    }

    /// Owner check, broker connection, error mapping. The closure gets the
    /// connection and the validated owner.
    pub(crate) fn run<F>(&self, frame: OpFrame, f: F) -> Envelope
    where
        F: FnOnce(&mut Connection, &str) -> Result<Outcome, VaultError>,
    {
        let Some(owner) = self.owner.filter(|o| !o.trim().is_empty()) else {
            return frame.fail(Code::ErrorValidation, "Owner is required.");
        };
        let op = frame.command.name.clone();
        let brokered = self.store.with_conn(owner, &op, |conn| f(conn, owner));
        let mut envelope = match brokered.result {
            Ok(outcome) => outcome.into_envelope(frame),
            Err(err) => fail_from(&frame, err),
        };
        if let Some(err) = brokered.audit_error {
            envelope.push_warnings([format!("Audit log not written: {}", err)]);
        }
        envelope
    }

    /// Parse a path argument, or produce the validation envelope for it.
    pub(crate) fn parse_path(&self, op: &str, arg: &str, raw_path: &str) -> Result<NodePath, Envelope> {
        NodePath::parse(raw_path).map_err(|e| {
            let frame = OpFrame::new(
                CommandEcho::new(self.raw, op).arg(arg, raw_path),
                guess_target(raw_path),
            );
            frame.fail(Code::ErrorValidation, e)
        })
    }
}

/// Successful (or no-op) result of a store operation before it is wrapped.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub code: Code,
    pub message: String,
    pub result: JsonValue,
    pub diff: Option<Diff>,
    pub target: Option<Target>,
}

impl Outcome {
    pub fn new(code: Code, message: impl Into<String>, result: JsonValue) -> Self {
        Self {
            code,
            message: message.into(),
            result,
            diff: None,
            target: None,
        }
    }

    pub fn with_diff(mut self, diff: Diff) -> Self {
        self.diff = Some(diff);
        self
    }

    /// Report the node at `path` as the target, e.g. after a rename.
    pub fn retarget(mut self, path: &NodePath) -> Self {
        self.target = Some(target_of(path));
        self
    }

    fn into_envelope(self, mut frame: OpFrame) -> Envelope {
        if let Some(target) = self.target {
            frame.retarget(target);
        }
        frame.ok(self.code, self.message, self.result, self.diff)
    }
}

pub(crate) fn fail_from(frame: &OpFrame, err: VaultError) -> Envelope {
    match err {
        VaultError::ValidationError(msg) => frame.fail(Code::ErrorValidation, msg),
        VaultError::NotFound(msg) => frame.fail(Code::ErrorNotFound, msg),
        VaultError::Conflict(msg) => frame.fail(Code::ErrorConflict, msg),
        VaultError::UnsafeOperation { token_hint } => frame.fail_with(
            Code::ErrorUnsafe,
            "Confirmation token required.",
            json!({"confirm_required": true, "token_hint": token_hint}),
        ),
        other => frame.fail(Code::ErrorInternal, format!("Internal error: {}", other)),
    }
}

pub fn target_of(path: &NodePath) -> Target {
    Target::new(path.type_str(), &path.to_string(), &path.name())
}

/// Best-effort target for a path that failed to parse.
fn guess_target(raw_path: &str) -> Target {
    let segments: Vec<&str> = raw_path.trim().trim_matches('/').split('/').collect();
    let node_type = match segments.len() {
        0 | 1 => NodeKind::Collection,
        2 => NodeKind::Container,
        3 => NodeKind::Category,
        _ => NodeKind::Leaf,
    };
    let name = segments.last().copied().unwrap_or_default();
    Target::new(node_type.as_str(), raw_path, name)
}

fn op_name(kind: Option<NodeKind>, verb: &str) -> String {
    format!("{}.{}", kind.unwrap_or(NodeKind::Collection), verb)
}

/// Reject a node-name argument before touching the database.
pub(crate) fn check_name(name: &str) -> Result<(), VaultError> {
    validate_name(name).map_err(VaultError::ValidationError)
}

/// Deletion token check; runs after the node has been found.
pub(crate) fn check_token(path: &NodePath, token: Option<&str>) -> Result<(), VaultError> {
    let expected = path.delete_token();
    if token == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(VaultError::UnsafeOperation { token_hint: expected })
    }
}

/// Create `name` under `parent`: `/` for collections, `/c` for containers,
/// `/c/k/cat` for leaves.
pub fn create(ctx: &OpCtx<'_>, parent: &str, name: &str, fields: &LeafFields, exists_ok: bool) -> Envelope {
    let parent_path = match ctx.parse_path("create", "parent", parent) {
        Ok(p) => p,
        Err(env) => return env,
    };
    let child_kind = match &parent_path {
        NodePath::Root => Some(NodeKind::Collection),
        NodePath::Collection { .. } => Some(NodeKind::Container),
        NodePath::Container { .. } => Some(NodeKind::Category),
        NodePath::Category { .. } => Some(NodeKind::Leaf),
        NodePath::Leaf { .. } => None,
    };
    let command = CommandEcho::new(ctx.raw, &op_name(child_kind, "create"))
        .arg("parent", parent_path.to_string())
        .arg("name", name)
        .arg("fields", fields.to_json())
        .arg("exists_ok", exists_ok);
    let target = match parent_path.child(name) {
        Ok(p) => target_of(&p),
        Err(_) => Target::new(
            child_kind.map(NodeKind::as_str).unwrap_or("leaf"),
            &format!("{}/{}", parent_path.to_string().trim_end_matches('/'), name),
            name,
        ),
    };
    let frame = OpFrame::new(command, target);

    match parent_path {
        NodePath::Root => ctx.run(frame, |conn, owner| {
            check_name(name)?;
            collections::create(conn, owner, name, fields.summary.as_deref(), exists_ok)
        }),
        NodePath::Collection { collection } => ctx.run(frame, |conn, owner| {
            check_name(name)?;
            containers::create(conn, owner, &collection, name, fields.summary.as_deref(), exists_ok)
        }),
        NodePath::Container { .. } => frame.fail(
            Code::ErrorValidation,
            "Categories are fixed (puzzles, traps, treasures, enemies); use category ensure.",
        ),
        NodePath::Category {
            collection,
            container,
            category,
        } => ctx.run(frame, |conn, owner| {
            check_name(name)?;
            leaves::create(conn, owner, &collection, &container, category, name, fields, exists_ok)
        }),
        NodePath::Leaf { .. } => frame.fail(Code::ErrorValidation, "Leaf entries have no children."),
    }
}

/// Direct children of `parent`.
pub fn list(ctx: &OpCtx<'_>, parent: &str) -> Envelope {
    let path = match ctx.parse_path("list", "path", parent) {
        Ok(p) => p,
        Err(env) => return env,
    };
    let command = CommandEcho::new(ctx.raw, &op_name(path.kind(), "list")).arg("path", path.to_string());
    let frame = OpFrame::new(command, target_of(&path));
    match path {
        NodePath::Root => ctx.run(frame, |conn, owner| collections::list(conn, owner)),
        NodePath::Collection { collection } => {
            ctx.run(frame, |conn, owner| containers::list(conn, owner, &collection))
        }
        NodePath::Container {
            collection,
            container,
        } => ctx.run(frame, |conn, owner| {
            containers::list_categories(conn, owner, &collection, &container)
        }),
        NodePath::Category {
            collection,
            container,
            category,
        } => ctx.run(frame, |conn, owner| {
            leaves::list(conn, owner, &collection, &container, category)
        }),
        NodePath::Leaf { .. } => frame.fail(Code::ErrorValidation, "Leaf entries have no children."),
    }
}

/// Full record of any node below the root.
pub fn read(ctx: &OpCtx<'_>, path: &str) -> Envelope {
    let path = match ctx.parse_path("read", "path", path) {
        Ok(p) => p,
        Err(env) => return env,
    };
    let command = CommandEcho::new(ctx.raw, &op_name(path.kind(), "read")).arg("path", path.to_string());
    let frame = OpFrame::new(command, target_of(&path));
    match path {
        NodePath::Root => frame.fail(Code::ErrorValidation, "The root is not a readable node; use list."),
        NodePath::Collection { collection } => {
            ctx.run(frame, |conn, owner| collections::read(conn, owner, &collection))
        }
        NodePath::Container {
            collection,
            container,
        } => ctx.run(frame, |conn, owner| containers::read(conn, owner, &collection, &container)),
        NodePath::Category {
            collection,
            container,
            category,
        } => ctx.run(frame, |conn, owner| {
            containers::read_category(conn, owner, &collection, &container, category)
        }),
        NodePath::Leaf {
            collection,
            container,
            category,
            leaf,
        } => ctx.run(frame, |conn, owner| {
            leaves::read(conn, owner, &collection, &container, category, &leaf)
        }),
    }
}

/// Lightweight descriptor of any node: type, path, child count, timestamps.
pub fn stat(ctx: &OpCtx<'_>, path: &str) -> Envelope {
    let path = match ctx.parse_path("stat", "path", path) {
        Ok(p) => p,
        Err(env) => return env,
    };
    let frame = OpFrame::new(
        CommandEcho::new(ctx.raw, "stat").arg("path", path.to_string()),
        target_of(&path),
    );
    ctx.run(frame, |conn, owner| {
        let node = stat_node(conn, owner, &path)?;
        Ok(Outcome::new(
            Code::Read,
            format!("{} stat.", capitalize(path.type_str())),
            json!({ "node": node }),
        ))
    })
}

fn stat_node(conn: &Connection, owner: &str, path: &NodePath) -> Result<JsonValue, VaultError> {
    let (children, created_at, updated_at) = match path {
        NodePath::Root => (rows::list_collections(conn, owner)?.len(), None, None),
        NodePath::Collection { collection } => {
            let row = rows::require_collection(conn, owner, collection)?;
            let n = rows::list_containers(conn, owner, collection)?.len();
            (n, Some(row.created_at), Some(row.updated_at))
        }
        NodePath::Container {
            collection,
            container,
        } => {
            let row = rows::require_container(conn, owner, collection, container)?;
            (
                crate::core::path::Category::ALL.len(),
                Some(row.created_at),
                Some(row.updated_at),
            )
        }
        NodePath::Category {
            collection,
            container,
            category,
        } => {
            rows::require_container(conn, owner, collection, container)?;
            let n = rows::list_leaves(conn, owner, collection, container, Some(*category))?.len();
            (n, None, None)
        }
        NodePath::Leaf {
            collection,
            container,
            category,
            leaf,
        } => {
            let row = rows::require_leaf(conn, owner, collection, container, *category, leaf)?;
            (0, Some(row.created_at), Some(row.updated_at))
        }
    };
    Ok(json!({
        "type": path.type_str(),
        "path": path.to_string(),
        "name": path.name(),
        "children": children,
        "created_at": created_at,
        "updated_at": updated_at,
    }))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Rename the node at `path`; collection and container renames rewrite
/// every descendant reference in the same transaction.
pub fn rename(ctx: &OpCtx<'_>, path: &str, new_name: &str) -> Envelope {
    let path = match ctx.parse_path("rename", "path", path) {
        Ok(p) => p,
        Err(env) => return env,
    };
    let command = CommandEcho::new(ctx.raw, &op_name(path.kind(), "rename"))
        .arg("path", path.to_string())
        .arg("new_name", new_name);
    let frame = OpFrame::new(command, target_of(&path));
    if matches!(path, NodePath::Root | NodePath::Category { .. }) {
        return frame.fail(Code::ErrorValidation, "Only collections, containers and leaves can be renamed.");
    }
    ctx.run(frame, |conn, owner| {
        check_name(new_name)?;
        let patch = Patch::rename(new_name);
        match &path {
            NodePath::Collection { collection } => collections::patch(conn, owner, collection, &patch, true),
            NodePath::Container {
                collection,
                container,
            } => containers::patch(conn, owner, collection, container, &patch, true),
            NodePath::Leaf {
                collection,
                container,
                category,
                leaf,
            } => leaves::patch(conn, owner, collection, container, *category, leaf, &patch, true),
            NodePath::Root | NodePath::Category { .. } => {
                Err(VaultError::ValidationError("Not renamable.".to_string()))
            }
        }
    })
}

/// Field-level update. `name` renames, `tags` replaces, `metadata`
/// shallow-merges, `summary` and `notes` replace.
pub fn patch(ctx: &OpCtx<'_>, path: &str, fields: &Map<String, JsonValue>) -> Envelope {
    let path = match ctx.parse_path("update", "path", path) {
        Ok(p) => p,
        Err(env) => return env,
    };
    let command = CommandEcho::new(ctx.raw, &op_name(path.kind(), "update"))
        .arg("path", path.to_string())
        .arg("patch", JsonValue::Object(fields.clone()));
    let frame = OpFrame::new(command, target_of(&path));
    if matches!(path, NodePath::Root | NodePath::Category { .. }) {
        return frame.fail(Code::ErrorValidation, "Categories are fixed and have no fields to update.");
    }
    ctx.run(frame, |conn, owner| {
        let patch = Patch::from_map(fields).map_err(VaultError::ValidationError)?;
        if patch.is_empty() {
            return Err(VaultError::ValidationError("No fields to update.".to_string()));
        }
        if let Some(name) = &patch.name {
            check_name(name)?;
        }
        match &path {
            NodePath::Collection { collection } => collections::patch(conn, owner, collection, &patch, false),
            NodePath::Container {
                collection,
                container,
            } => containers::patch(conn, owner, collection, container, &patch, false),
            NodePath::Leaf {
                collection,
                container,
                category,
                leaf,
            } => leaves::patch(conn, owner, collection, container, *category, leaf, &patch, false),
            NodePath::Root | NodePath::Category { .. } => {
                Err(VaultError::ValidationError("Not updatable.".to_string()))
            }
        }
    })
}

/// Hard, cascading delete guarded by the `DELETE:<path>` token.
pub fn delete(ctx: &OpCtx<'_>, path: &str, token: Option<&str>) -> Envelope {
    let path = match ctx.parse_path("delete", "path", path) {
        Ok(p) => p,
        Err(env) => return env,
    };
    let command = CommandEcho::new(ctx.raw, &op_name(path.kind(), "delete")).arg("path", path.to_string());
    let frame = OpFrame::new(command, target_of(&path));
    if matches!(path, NodePath::Root | NodePath::Category { .. }) {
        return frame.fail(Code::ErrorValidation, "Only collections, containers and leaves can be deleted.");
    }
    ctx.run(frame, |conn, owner| match &path {
        NodePath::Collection { collection } => collections::delete(conn, owner, collection, token),
        NodePath::Container {
            collection,
            container,
        } => containers::delete(conn, owner, collection, container, token),
        NodePath::Leaf {
            collection,
            container,
            category,
            leaf,
        } => leaves::delete(conn, owner, collection, container, *category, leaf, token),
        NodePath::Root | NodePath::Category { .. } => {
            Err(VaultError::ValidationError("Not deletable.".to_string()))
        }
    })
}

/// Check that a category path is valid under an existing container.
pub fn ensure_category(ctx: &OpCtx<'_>, path: &str) -> Envelope {
    let parsed = match ctx.parse_path("category.ensure", "path", path) {
        Ok(p) => p,
        Err(env) => return env,
    };
    let command = CommandEcho::new(ctx.raw, "category.ensure").arg("path", parsed.to_string());
    let frame = OpFrame::new(command, target_of(&parsed));
    match parsed {
        NodePath::Category {
            collection,
            container,
            category,
        } => ctx.run(frame, |conn, owner| {
            containers::ensure_category(conn, owner, &collection, &container, category)
        }),
        _ => frame.fail(
            Code::ErrorValidation,
            format!("'{}' is not a category path (/collection/container/category).", path),
        ),
    }
}
