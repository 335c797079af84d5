//! Row types for the three stored entity kinds plus the field bags used to
//! create and patch them.

use crate::core::path::{Category, NodePath};
use crate::core::value::{MetaMap, MetaValue, meta_from_json};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRow {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub summary: Option<String>,
    pub deleted: bool,
    pub created_at: f64,
    pub updated_at: f64,
}

impl CollectionRow {
    pub fn path(&self) -> NodePath {
        NodePath::collection(&self.name)
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "name": self.name,
            "summary": self.summary,
            "deleted": self.deleted,
            "created_at": self.created_at,
            "updated_at": self.updated_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRow {
    pub id: String,
    pub owner: String,
    pub collection: String,
    pub name: String,
    pub summary: Option<String>,
    pub deleted: bool,
    pub created_at: f64,
    pub updated_at: f64,
}

impl ContainerRow {
    pub fn path(&self) -> NodePath {
        NodePath::container(&self.collection, &self.name)
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "name": self.name,
            "collection": self.collection,
            "summary": self.summary,
            "deleted": self.deleted,
            "created_at": self.created_at,
            "updated_at": self.updated_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafRow {
    pub id: String,
    pub owner: String,
    pub collection: String,
    pub container: String,
    pub category: Category,
    pub name: String,
    pub summary: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub metadata: MetaMap,
    pub deleted: bool,
    pub created_at: f64,
    pub updated_at: f64,
}

impl LeafRow {
    pub fn path(&self) -> NodePath {
        NodePath::leaf(&self.collection, &self.container, self.category, &self.name)
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "name": self.name,
            "collection": self.collection,
            "container": self.container,
            "category": self.category,
            "summary": self.summary,
            "notes": self.notes,
            "tags": self.tags,
            "metadata": self.metadata,
            "deleted": self.deleted,
            "created_at": self.created_at,
            "updated_at": self.updated_at,
        })
    }

    pub fn fields(&self) -> LeafFields {
        LeafFields {
            summary: self.summary.clone(),
            notes: self.notes.clone(),
            tags: self.tags.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Optional content supplied when creating a node. Collections and
/// containers only use `summary`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeafFields {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: MetaMap,
}

impl LeafFields {
    pub fn summary(summary: &str) -> Self {
        Self {
            summary: Some(summary.to_string()),
            ..Default::default()
        }
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "summary": self.summary,
            "notes": self.notes,
            "tags": self.tags,
            "metadata": self.metadata,
        })
    }
}

/// Field-level update. `None` leaves the stored value alone; a
/// `Some(None)` text field clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    pub name: Option<String>,
    pub summary: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<MetaMap>,
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.summary.is_none()
            && self.notes.is_none()
            && self.tags.is_none()
            && self.metadata.is_none()
    }

    pub fn rename(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    /// Build a patch from a loose field map (`name`, `summary`, `notes`,
    /// `tags`, `metadata`). Unknown keys and ill-typed values are rejected.
    pub fn from_map(map: &Map<String, JsonValue>) -> Result<Self, String> {
        let mut patch = Patch::default();
        for (key, value) in map {
            match key.as_str() {
                "name" => match value {
                    JsonValue::String(s) => patch.name = Some(s.clone()),
                    _ => return Err("name must be a string".to_string()),
                },
                "summary" => patch.summary = Some(optional_text("summary", value)?),
                "notes" | "notes_md" => patch.notes = Some(optional_text("notes", value)?),
                "tags" => patch.tags = Some(tags_from_json(value)?),
                "metadata" | "meta" => patch.metadata = Some(meta_from_json(value.clone())?),
                other => return Err(format!("Unknown field '{}'.", other)),
            }
        }
        Ok(patch)
    }

    /// Names of the fields this patch touches, in a stable order.
    pub fn touched_fields(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.summary.is_some() {
            out.push("summary");
        }
        if self.notes.is_some() {
            out.push("notes");
        }
        if self.tags.is_some() {
            out.push("tags");
        }
        if self.metadata.is_some() {
            out.push("metadata");
        }
        out
    }
}

fn optional_text(field: &str, value: &JsonValue) -> Result<Option<String>, String> {
    match value {
        JsonValue::Null => Ok(None),
        JsonValue::String(s) => Ok(Some(s.clone())),
        JsonValue::Number(n) => Ok(Some(n.to_string())),
        JsonValue::Bool(b) => Ok(Some(b.to_string())),
        _ => Err(format!("{} must be text", field)),
    }
}

fn tags_from_json(value: &JsonValue) -> Result<Vec<String>, String> {
    match value {
        JsonValue::Null => Ok(Vec::new()),
        JsonValue::String(s) => Ok(normalize_tags(s.split(',').map(str::to_string))),
        JsonValue::Array(items) => {
            let mut tags = Vec::with_capacity(items.len());
            for item in items {
                match MetaValue::from(item.clone()) {
                    MetaValue::String(s) => tags.push(s),
                    _ => return Err("tags must be strings".to_string()),
                }
            }
            Ok(normalize_tags(tags))
        }
        _ => Err("tags must be a list".to_string()),
    }
}

/// Trim, drop blanks and de-duplicate while keeping first-seen order.
pub fn normalize_tags<I: IntoIterator<Item = String>>(tags: I) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let t = tag.trim();
        if !t.is_empty() && !out.iter().any(|existing| existing == t) {
            out.push(t.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_from_map() {
        let map = json!({"name": "B", "summary": null, "tags": ["x", " y ", "x"], "metadata": {"dc": 3}});
        let patch = Patch::from_map(map.as_object().unwrap()).unwrap();
        assert_eq!(patch.name.as_deref(), Some("B"));
        assert_eq!(patch.summary, Some(None));
        assert_eq!(patch.tags, Some(vec!["x".to_string(), "y".to_string()]));
        assert_eq!(patch.metadata.unwrap()["dc"].as_i64(), Some(3));
        assert_eq!(patch.notes, None);
    }

    #[test]
    fn test_patch_rejects_unknown_and_bad_types() {
        assert!(Patch::from_map(json!({"colour": "red"}).as_object().unwrap()).is_err());
        assert!(Patch::from_map(json!({"metadata": 4}).as_object().unwrap()).is_err());
        assert!(Patch::from_map(json!({"tags": [1]}).as_object().unwrap()).is_err());
    }

    #[test]
    fn test_touched_fields_order() {
        let patch = Patch {
            metadata: Some(MetaMap::new()),
            summary: Some(Some("s".into())),
            ..Default::default()
        };
        assert_eq!(patch.touched_fields(), vec!["summary", "metadata"]);
        assert!(Patch::default().is_empty());
    }
}
