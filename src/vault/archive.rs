//! Export a collection as a nested tree and import such a tree back.
//!
//! ```json
//! {"name": "Crown Vault", "summary": null, "created_at": 1.7e9, "updated_at": 1.7e9, "deleted": false,
//!  "containers": {"Treasury": {"name": "Treasury", ..., "categories": {
//!      "puzzles": {}, "traps": {"Poison Needle": {"name": ..., "tags": [...], ...}},
//!      "treasures": {}, "enemies": {}}}}}
//! ```

use super::{OpCtx, Outcome, check_name, rows, target_of};
use crate::core::envelope::{Change, Code, CommandEcho, Diff, Envelope, OpFrame, Target};
use crate::core::error::VaultError;
use crate::core::model::{CollectionRow, ContainerRow, LeafRow, normalize_tags};
use crate::core::path::{Category, NodePath};
use crate::core::time;
use crate::core::value::MetaMap;
use rusqlite::Connection;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value as JsonValue, json};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportTree {
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "lenient_epoch")]
    pub created_at: Option<f64>,
    #[serde(default, deserialize_with = "lenient_epoch")]
    pub updated_at: Option<f64>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub containers: BTreeMap<String, ExportContainer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportContainer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "lenient_epoch")]
    pub created_at: Option<f64>,
    #[serde(default, deserialize_with = "lenient_epoch")]
    pub updated_at: Option<f64>,
    #[serde(default)]
    pub deleted: bool,
    /// Category name to leaf name to leaf.
    #[serde(default)]
    pub categories: BTreeMap<String, BTreeMap<String, ExportLeaf>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportLeaf {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, alias = "notes_md")]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: MetaMap,
    #[serde(default, deserialize_with = "lenient_epoch")]
    pub created_at: Option<f64>,
    #[serde(default, deserialize_with = "lenient_epoch")]
    pub updated_at: Option<f64>,
    #[serde(default)]
    pub deleted: bool,
}

/// Timestamps are taken only when they are numbers; anything else reads as absent.
fn lenient_epoch<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    Ok(value.as_f64())
}

impl ExportTree {
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.containers
            .values()
            .flat_map(|c| c.categories.values())
            .map(BTreeMap::len)
            .sum()
    }
}

/// What to do when the imported collection name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStrategy {
    #[default]
    Skip,
    Overwrite,
    Rename,
}

impl ImportStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportStrategy::Skip => "skip",
            ImportStrategy::Overwrite => "overwrite",
            ImportStrategy::Rename => "rename",
        }
    }
}

impl fmt::Display for ImportStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(ImportStrategy::Skip),
            "overwrite" => Ok(ImportStrategy::Overwrite),
            "rename" => Ok(ImportStrategy::Rename),
            other => Err(format!(
                "Invalid import strategy '{}'. Expected skip, overwrite or rename.",
                other
            )),
        }
    }
}

/// Serialize a collection and everything under it.
pub fn export(ctx: &OpCtx<'_>, collection_path: &str) -> Envelope {
    let path = match ctx.parse_path("export", "path", collection_path) {
        Ok(p) => p,
        Err(env) => return env,
    };
    let frame = OpFrame::new(
        CommandEcho::new(ctx.raw, "export").arg("path", path.to_string()),
        target_of(&path),
    );
    let NodePath::Collection { collection } = &path else {
        return frame.fail(
            Code::ErrorValidation,
            format!("Only collections can be exported, got '{}'.", path),
        );
    };
    ctx.run(frame, |conn, owner| {
        let tree = build_tree(conn, owner, collection)?;
        let result = json!({ "collection": serde_json::to_value(&tree)? });
        Ok(Outcome::new(Code::Read, "Collection exported.", result))
    })
}

pub fn build_tree(conn: &Connection, owner: &str, collection: &str) -> Result<ExportTree, VaultError> {
    let row = rows::require_collection(conn, owner, collection)?;
    let mut containers = BTreeMap::new();
    for container in rows::list_containers(conn, owner, collection)? {
        let mut categories: BTreeMap<String, BTreeMap<String, ExportLeaf>> = Category::ALL
            .iter()
            .map(|c| (c.to_string(), BTreeMap::new()))
            .collect();
        for leaf in rows::list_leaves(conn, owner, collection, &container.name, None)? {
            categories.entry(leaf.category.to_string()).or_default().insert(
                leaf.name.clone(),
                ExportLeaf {
                    name: leaf.name,
                    summary: leaf.summary,
                    notes: leaf.notes,
                    tags: leaf.tags,
                    metadata: leaf.metadata,
                    created_at: Some(leaf.created_at),
                    updated_at: Some(leaf.updated_at),
                    deleted: leaf.deleted,
                },
            );
        }
        containers.insert(
            container.name.clone(),
            ExportContainer {
                name: container.name,
                summary: container.summary,
                created_at: Some(container.created_at),
                updated_at: Some(container.updated_at),
                deleted: container.deleted,
                categories,
            },
        );
    }
    Ok(ExportTree {
        name: row.name,
        summary: row.summary,
        created_at: Some(row.created_at),
        updated_at: Some(row.updated_at),
        deleted: row.deleted,
        containers,
    })
}

/// Recreate a collection from an exported tree, in one transaction.
pub fn import(ctx: &OpCtx<'_>, tree: &JsonValue, strategy: ImportStrategy) -> Envelope {
    let declared = tree.get("name").and_then(JsonValue::as_str).unwrap_or_default();
    let frame = OpFrame::new(
        CommandEcho::new(ctx.raw, "import")
            .arg("name", declared)
            .arg("strategy", strategy.as_str()),
        if declared.is_empty() {
            Target::new("collection", "/", "")
        } else {
            target_of(&NodePath::collection(declared))
        },
    );
    ctx.run(frame, |conn, owner| {
        let parsed: ExportTree = serde_json::from_value(tree.clone())
            .map_err(|e| VaultError::ValidationError(format!("Malformed import tree: {}", e)))?;
        import_tree(conn, owner, parsed, strategy)
    })
}

fn import_tree(
    conn: &mut Connection,
    owner: &str,
    tree: ExportTree,
    strategy: ImportStrategy,
) -> Result<Outcome, VaultError> {
    check_name(&tree.name)?;
    let leaves = validate_tree(&tree)?;

    let tx = conn.transaction()?;
    let mut name = tree.name.clone();
    let mut changes = Vec::new();

    if rows::find_collection(&tx, owner, &name)?.is_some() {
        match strategy {
            ImportStrategy::Skip => {
                return Ok(Outcome::new(
                    Code::Noop,
                    "Collection exists; skipped.",
                    json!({ "collection": { "name": name }, "strategy": strategy.as_str() }),
                )
                .with_diff(Diff::none()));
            }
            ImportStrategy::Overwrite => {
                rows::delete_collection_cascade(&tx, owner, &name)
                    .map_err(|e| e.at_stage("overwrite"))?;
                changes.push(Change::remove("/", "collection", &name));
            }
            ImportStrategy::Rename => {
                name = free_name(&tx, owner, &tree.name)?;
            }
        }
    }

    let now = time::now_epoch();
    rows::insert_collection(
        &tx,
        &CollectionRow {
            id: Ulid::new().to_string(),
            owner: owner.to_string(),
            name: name.clone(),
            summary: tree.summary.clone(),
            deleted: false,
            created_at: time::epoch_or_now(tree.created_at),
            updated_at: now,
        },
    )?;

    for (container_name, container) in &tree.containers {
        rows::insert_container(
            &tx,
            &ContainerRow {
                id: Ulid::new().to_string(),
                owner: owner.to_string(),
                collection: name.clone(),
                name: container_name.clone(),
                summary: container.summary.clone(),
                deleted: false,
                created_at: time::epoch_or_now(container.created_at),
                updated_at: now,
            },
        )?;
    }

    for (container_name, category, leaf_name, leaf) in &leaves {
        rows::insert_leaf(
            &tx,
            &LeafRow {
                id: Ulid::new().to_string(),
                owner: owner.to_string(),
                collection: name.clone(),
                container: (*container_name).to_string(),
                category: *category,
                name: (*leaf_name).to_string(),
                summary: leaf.summary.clone(),
                notes: leaf.notes.clone(),
                tags: normalize_tags(leaf.tags.iter().cloned()),
                metadata: leaf.metadata.clone(),
                deleted: false,
                created_at: time::epoch_or_now(leaf.created_at),
                updated_at: now,
            },
        )?;
    }
    tx.commit()?;

    changes.push(Change::add("/", "collection", &name));
    Ok(Outcome::new(
        Code::Created,
        "Collection imported.",
        json!({
            "collection": {
                "name": name,
                "containers": tree.container_count(),
                "leaves": leaves.len(),
            },
            "strategy": strategy.as_str(),
            "renamed_from": (name != tree.name).then_some(tree.name.as_str()),
        }),
    )
    .with_diff(Diff::applied(changes))
    .retarget(&NodePath::collection(&name)))
}

type LeafEntry<'t> = (&'t str, Category, &'t str, &'t ExportLeaf);

/// Check every name and category key up front; returns the flattened leaves.
fn validate_tree(tree: &ExportTree) -> Result<Vec<LeafEntry<'_>>, VaultError> {
    let mut out = Vec::new();
    for (container_name, container) in &tree.containers {
        check_name(container_name)?;
        for (category_key, leaves) in &container.categories {
            let category: Category = category_key.parse().map_err(VaultError::ValidationError)?;
            for (leaf_name, leaf) in leaves {
                check_name(leaf_name)?;
                out.push((container_name.as_str(), category, leaf_name.as_str(), leaf));
            }
        }
    }
    Ok(out)
}

/// First of `name-2`, `name-3`, ... not held by a live collection.
fn free_name(conn: &Connection, owner: &str, base: &str) -> Result<String, VaultError> {
    let mut i = 2;
    loop {
        let candidate = format!("{}-{}", base, i);
        if rows::find_collection(conn, owner, &candidate)?.is_none() {
            return Ok(candidate);
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parse() {
        assert_eq!("Rename".parse::<ImportStrategy>().unwrap(), ImportStrategy::Rename);
        assert_eq!(ImportStrategy::default(), ImportStrategy::Skip);
        assert!("merge".parse::<ImportStrategy>().is_err());
    }

    #[test]
    fn test_tree_accepts_legacy_keys_and_bad_timestamps() {
        let tree: ExportTree = serde_json::from_value(json!({
            "name": "Keep",
            "created_at": "yesterday",
            "containers": {
                "Hall": {
                    "categories": {
                        "traps": {"Pit": {"notes_md": "deep", "created_at": 12.5}}
                    }
                }
            }
        }))
        .unwrap();
        assert_eq!(tree.created_at, None);
        let pit = &tree.containers["Hall"].categories["traps"]["Pit"];
        assert_eq!(pit.notes.as_deref(), Some("deep"));
        assert_eq!(pit.created_at, Some(12.5));
        assert_eq!(tree.leaf_count(), 1);
    }

    #[test]
    fn test_validate_tree_rejects_unknown_category() {
        let tree: ExportTree = serde_json::from_value(json!({
            "name": "Keep",
            "containers": {"Hall": {"categories": {"rooms": {"X": {}}}}}
        }))
        .unwrap();
        assert!(matches!(validate_tree(&tree), Err(VaultError::ValidationError(_))));
    }
}
