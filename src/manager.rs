//! Typed facade over the vault store.
//!
//! Host programs call through [`Manager`]: it runs the envelope-returning
//! store operations and turns `status = error` envelopes into
//! [`ManagerError`] and successful ones into plain structs.

use crate::core::envelope::{Code, Envelope};
use crate::core::error::VaultError;
use crate::core::model::LeafFields;
use crate::core::path::{Category, NodePath};
use crate::core::store::Store;
use crate::core::value::MetaMap;
use crate::vault::{self, ExportTree, ImportStrategy, OpCtx};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ManagerError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("{message} Expected token: {token_hint}")]
    UnsafeOperation { message: String, token_hint: String },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ManagerError {
    /// Classify an error envelope. Parse errors count as validation.
    pub fn from_envelope(env: &Envelope) -> Self {
        let message = env.message.clone();
        match env.code {
            Code::ErrorNotFound => ManagerError::NotFound(message),
            Code::ErrorConflict => ManagerError::Conflict(message),
            Code::ErrorUnsafe => ManagerError::UnsafeOperation {
                token_hint: env
                    .result_field("token_hint")
                    .and_then(JsonValue::as_str)
                    .unwrap_or_default()
                    .to_string(),
                message,
            },
            Code::ErrorValidation | Code::ErrorParse => ManagerError::Validation(message),
            _ => ManagerError::Internal(message),
        }
    }
}

impl From<VaultError> for ManagerError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::ValidationError(m) => ManagerError::Validation(m),
            VaultError::NotFound(m) => ManagerError::NotFound(m),
            VaultError::Conflict(m) => ManagerError::Conflict(m),
            VaultError::UnsafeOperation { token_hint } => ManagerError::UnsafeOperation {
                message: "Confirmation token required.".to_string(),
                token_hint,
            },
            other => ManagerError::Internal(other.to_string()),
        }
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub created_at: Option<f64>,
    #[serde(default)]
    pub updated_at: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub collection: String,
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub created_at: Option<f64>,
    #[serde(default)]
    pub updated_at: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub collection: String,
    pub container: String,
    pub name: Category,
}

/// A leaf as callers see it: content plus address, without storage ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafRecord {
    pub collection: String,
    pub container: String,
    pub category: Category,
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: MetaMap,
    pub created_at: f64,
    pub updated_at: f64,
}

impl LeafRecord {
    pub fn path(&self) -> NodePath {
        NodePath::leaf(&self.collection, &self.container, self.category, &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafSummary {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Descriptor returned by `stat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    #[serde(rename = "type")]
    pub node_type: String,
    pub path: String,
    pub name: String,
    pub children: usize,
    #[serde(default)]
    pub created_at: Option<f64>,
    #[serde(default)]
    pub updated_at: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub name: String,
    pub path: String,
    pub collection: String,
    pub container: String,
    pub category: Category,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub name: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportOutcome {
    /// Name the collection ended up under.
    pub name: String,
    pub skipped: bool,
    pub renamed_from: Option<String>,
    pub containers: usize,
    pub leaves: usize,
}

#[derive(Debug, Clone)]
pub struct Manager {
    store: Store,
    owner: String,
}

impl Manager {
    pub fn new(store: Store, owner: impl Into<String>) -> Self {
        Self {
            store,
            owner: owner.into(),
        }
    }

    /// Open (and initialize) the store under `root` for `owner`.
    pub fn open(root: &Path, owner: impl Into<String>) -> ManagerResult<Self> {
        Ok(Self::new(Store::open(root)?, owner))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn ctx(&self) -> OpCtx<'_> {
        OpCtx::new(&self.store, Some(self.owner.as_str()), "")
    }

    // --- collections ---

    pub fn create_collection(&self, name: &str, summary: Option<&str>, exists_ok: bool) -> ManagerResult<CollectionInfo> {
        let fields = LeafFields {
            summary: summary.map(str::to_string),
            ..Default::default()
        };
        let env = vault::create(&self.ctx(), "/", name, &fields, exists_ok);
        field(&extract(env)?, "collection")
    }

    pub fn list_collections(&self) -> ManagerResult<Vec<CollectionInfo>> {
        field(&extract(vault::list(&self.ctx(), "/"))?, "collections")
    }

    pub fn rename_collection(&self, name: &str, new_name: &str) -> ManagerResult<CollectionInfo> {
        let env = vault::rename(&self.ctx(), &NodePath::collection(name).to_string(), new_name);
        field(&extract(env)?, "collection")
    }

    pub fn update_collection(&self, name: &str, patch: &Map<String, JsonValue>) -> ManagerResult<CollectionInfo> {
        let env = vault::patch(&self.ctx(), &NodePath::collection(name).to_string(), patch);
        field(&extract(env)?, "collection")
    }

    pub fn delete_collection(&self, name: &str, confirm_token: Option<&str>) -> ManagerResult<()> {
        let env = vault::delete(&self.ctx(), &NodePath::collection(name).to_string(), confirm_token);
        extract(env).map(|_| ())
    }

    // --- containers ---

    pub fn create_container(
        &self,
        collection: &str,
        name: &str,
        summary: Option<&str>,
        exists_ok: bool,
    ) -> ManagerResult<ContainerInfo> {
        let fields = LeafFields {
            summary: summary.map(str::to_string),
            ..Default::default()
        };
        let parent = NodePath::collection(collection).to_string();
        let env = vault::create(&self.ctx(), &parent, name, &fields, exists_ok);
        field(&extract(env)?, "container")
    }

    pub fn list_containers(&self, collection: &str) -> ManagerResult<Vec<ContainerInfo>> {
        let env = vault::list(&self.ctx(), &NodePath::collection(collection).to_string());
        field(&extract(env)?, "containers")
    }

    pub fn rename_container(&self, collection: &str, name: &str, new_name: &str) -> ManagerResult<ContainerInfo> {
        let env = vault::rename(&self.ctx(), &NodePath::container(collection, name).to_string(), new_name);
        field(&extract(env)?, "container")
    }

    pub fn update_container(
        &self,
        collection: &str,
        name: &str,
        patch: &Map<String, JsonValue>,
    ) -> ManagerResult<ContainerInfo> {
        let env = vault::patch(&self.ctx(), &NodePath::container(collection, name).to_string(), patch);
        field(&extract(env)?, "container")
    }

    pub fn delete_container(&self, collection: &str, name: &str, confirm_token: Option<&str>) -> ManagerResult<()> {
        let path = NodePath::container(collection, name).to_string();
        extract(vault::delete(&self.ctx(), &path, confirm_token)).map(|_| ())
    }

    pub fn move_container(&self, collection: &str, name: &str, dst_collection: &str, overwrite: bool) -> ManagerResult<TransferOutcome> {
        let src = NodePath::container(collection, name).to_string();
        let dst = NodePath::collection(dst_collection).to_string();
        transfer_outcome(extract(vault::move_node(&self.ctx(), &src, &dst, overwrite))?)
    }

    pub fn copy_container(
        &self,
        collection: &str,
        name: &str,
        dst_collection: &str,
        new_name: Option<&str>,
        overwrite: bool,
    ) -> ManagerResult<TransferOutcome> {
        let src = NodePath::container(collection, name).to_string();
        let dst = NodePath::collection(dst_collection).to_string();
        transfer_outcome(extract(vault::copy_node(&self.ctx(), &src, &dst, new_name, overwrite))?)
    }

    // --- categories ---

    pub fn ensure_category(&self, collection: &str, container: &str, category: Category) -> ManagerResult<CategoryInfo> {
        let path = NodePath::category(collection, container, category).to_string();
        field(&extract(vault::ensure_category(&self.ctx(), &path))?, "category")
    }

    pub fn list_leaves(&self, collection: &str, container: &str, category: Category) -> ManagerResult<Vec<LeafSummary>> {
        let path = NodePath::category(collection, container, category).to_string();
        field(&extract(vault::list(&self.ctx(), &path))?, "leaves")
    }

    // --- leaves ---

    pub fn create_leaf(
        &self,
        collection: &str,
        container: &str,
        category: Category,
        name: &str,
        fields: &LeafFields,
        exists_ok: bool,
    ) -> ManagerResult<LeafRecord> {
        let parent = NodePath::category(collection, container, category).to_string();
        let env = vault::create(&self.ctx(), &parent, name, fields, exists_ok);
        field(&extract(env)?, "leaf")
    }

    pub fn read_leaf(&self, collection: &str, container: &str, category: Category, name: &str) -> ManagerResult<LeafRecord> {
        let path = NodePath::leaf(collection, container, category, name).to_string();
        field(&extract(vault::read(&self.ctx(), &path))?, "leaf")
    }

    pub fn update_leaf(
        &self,
        collection: &str,
        container: &str,
        category: Category,
        name: &str,
        patch: &Map<String, JsonValue>,
    ) -> ManagerResult<LeafRecord> {
        let path = NodePath::leaf(collection, container, category, name).to_string();
        field(&extract(vault::patch(&self.ctx(), &path, patch))?, "leaf")
    }

    pub fn rename_leaf(
        &self,
        collection: &str,
        container: &str,
        category: Category,
        name: &str,
        new_name: &str,
    ) -> ManagerResult<LeafRecord> {
        let path = NodePath::leaf(collection, container, category, name).to_string();
        field(&extract(vault::rename(&self.ctx(), &path, new_name))?, "leaf")
    }

    pub fn delete_leaf(
        &self,
        collection: &str,
        container: &str,
        category: Category,
        name: &str,
        confirm_token: Option<&str>,
    ) -> ManagerResult<()> {
        let path = NodePath::leaf(collection, container, category, name).to_string();
        extract(vault::delete(&self.ctx(), &path, confirm_token)).map(|_| ())
    }

    /// Move a leaf; `dst` is a category path.
    pub fn move_leaf(&self, src: &NodePath, dst: &NodePath, overwrite: bool) -> ManagerResult<TransferOutcome> {
        let env = vault::move_node(&self.ctx(), &src.to_string(), &dst.to_string(), overwrite);
        transfer_outcome(extract(env)?)
    }

    pub fn copy_leaf(
        &self,
        src: &NodePath,
        dst: &NodePath,
        new_name: Option<&str>,
        overwrite: bool,
    ) -> ManagerResult<TransferOutcome> {
        let env = vault::copy_node(&self.ctx(), &src.to_string(), &dst.to_string(), new_name, overwrite);
        transfer_outcome(extract(env)?)
    }

    // --- utilities ---

    pub fn stat(&self, path: &str) -> ManagerResult<NodeInfo> {
        field(&extract(vault::stat(&self.ctx(), path))?, "node")
    }

    /// Names of the direct children of `path`, whatever their level.
    pub fn list_children(&self, path: &str) -> ManagerResult<Vec<String>> {
        let result = extract(vault::list(&self.ctx(), path))?;
        let items = ["collections", "containers", "categories", "leaves"]
            .iter()
            .find_map(|key| result.get(*key).and_then(JsonValue::as_array))
            .cloned()
            .unwrap_or_default();
        Ok(items
            .iter()
            .filter_map(|item| item.get("name").and_then(JsonValue::as_str))
            .map(str::to_string)
            .collect())
    }

    pub fn search(&self, query: &str, collection: Option<&str>, tags_any: &[String]) -> ManagerResult<Vec<SearchHit>> {
        let env = vault::search(&self.ctx(), query, collection, tags_any);
        field(&extract(env)?, "matches")
    }

    pub fn export_collection(&self, name: &str) -> ManagerResult<ExportTree> {
        let env = vault::export(&self.ctx(), &NodePath::collection(name).to_string());
        field(&extract(env)?, "collection")
    }

    pub fn import_collection(&self, tree: &ExportTree, strategy: ImportStrategy) -> ManagerResult<ImportOutcome> {
        let data = serde_json::to_value(tree).map_err(|e| ManagerError::Internal(e.to_string()))?;
        let env = vault::import(&self.ctx(), &data, strategy);
        let skipped = env.code == Code::Noop;
        let result = extract(env)?;
        let collection = result.get("collection").cloned().unwrap_or_default();
        Ok(ImportOutcome {
            name: collection
                .get("name")
                .and_then(JsonValue::as_str)
                .unwrap_or(tree.name.as_str())
                .to_string(),
            skipped,
            renamed_from: result
                .get("renamed_from")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
            containers: count(&collection, "containers"),
            leaves: count(&collection, "leaves"),
        })
    }
}

fn count(value: &JsonValue, key: &str) -> usize {
    value
        .get(key)
        .and_then(JsonValue::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0)
}

/// `Ok(result)` for successful envelopes, the typed error otherwise.
fn extract(env: Envelope) -> ManagerResult<JsonValue> {
    if env.is_error() {
        return Err(ManagerError::from_envelope(&env));
    }
    Ok(env.result)
}

fn field<T: DeserializeOwned>(result: &JsonValue, key: &str) -> ManagerResult<T> {
    let value = result
        .get(key)
        .cloned()
        .ok_or_else(|| ManagerError::Internal(format!("result has no '{}' field", key)))?;
    serde_json::from_value(value).map_err(|e| ManagerError::Internal(format!("decoding '{}': {}", key, e)))
}

fn transfer_outcome(result: JsonValue) -> ManagerResult<TransferOutcome> {
    serde_json::from_value(result).map_err(|e| ManagerError::Internal(format!("decoding transfer result: {}", e)))
}
