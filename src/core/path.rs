//! Slash-delimited node addresses.
//!
//! `/collection`, `/collection/container`, `/collection/container/category`
//! and `/collection/container/category/leaf`. The root `/` is the parent of
//! every collection.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Fixed partition keys for leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Puzzles,
    Traps,
    Treasures,
    Enemies,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Puzzles,
        Category::Traps,
        Category::Treasures,
        Category::Enemies,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Puzzles => "puzzles",
            Category::Traps => "traps",
            Category::Treasures => "treasures",
            Category::Enemies => "enemies",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "puzzles" => Ok(Category::Puzzles),
            "traps" => Ok(Category::Traps),
            "treasures" => Ok(Category::Treasures),
            "enemies" => Ok(Category::Enemies),
            other => Err(format!(
                "Invalid category '{}'. Expected one of: puzzles, traps, treasures, enemies.",
                other
            )),
        }
    }
}

/// Which of the four levels a path addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Collection,
    Container,
    Category,
    Leaf,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Collection => "collection",
            NodeKind::Container => "container",
            NodeKind::Category => "category",
            NodeKind::Leaf => "leaf",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodePath {
    Root,
    Collection {
        collection: String,
    },
    Container {
        collection: String,
        container: String,
    },
    Category {
        collection: String,
        container: String,
        category: Category,
    },
    Leaf {
        collection: String,
        container: String,
        category: Category,
        leaf: String,
    },
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^/\p{Cc}]+$").expect("static regex"))
}

/// A node name must be non-blank, without `/` or control characters.
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Name must not be empty.".to_string());
    }
    if !name_re().is_match(name) {
        return Err(format!(
            "Invalid name '{}': names cannot contain '/' or control characters.",
            name
        ));
    }
    Ok(())
}

impl NodePath {
    pub fn collection(collection: &str) -> Self {
        NodePath::Collection {
            collection: collection.to_string(),
        }
    }

    pub fn container(collection: &str, container: &str) -> Self {
        NodePath::Container {
            collection: collection.to_string(),
            container: container.to_string(),
        }
    }

    pub fn category(collection: &str, container: &str, category: Category) -> Self {
        NodePath::Category {
            collection: collection.to_string(),
            container: container.to_string(),
            category,
        }
    }

    pub fn leaf(collection: &str, container: &str, category: Category, leaf: &str) -> Self {
        NodePath::Leaf {
            collection: collection.to_string(),
            container: container.to_string(),
            category,
            leaf: leaf.to_string(),
        }
    }

    /// Parse `/a/b/c/d`. A missing leading slash is tolerated, a trailing
    /// slash is ignored, empty inner segments are rejected.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        let body = trimmed.strip_prefix('/').unwrap_or(trimmed);
        let body = body.strip_suffix('/').unwrap_or(body);
        if body.is_empty() {
            return Ok(NodePath::Root);
        }
        let segments: Vec<&str> = body.split('/').collect();
        for seg in &segments {
            validate_name(seg).map_err(|e| format!("Invalid path '{}': {}", raw, e))?;
        }
        match segments.as_slice() {
            [c] => Ok(NodePath::collection(c)),
            [c, k] => Ok(NodePath::container(c, k)),
            [c, k, cat] => Ok(NodePath::category(c, k, cat.parse()?)),
            [c, k, cat, leaf] => Ok(NodePath::leaf(c, k, cat.parse()?, leaf)),
            _ => Err(format!(
                "Invalid path '{}': at most four segments (collection/container/category/leaf).",
                raw
            )),
        }
    }

    pub fn kind(&self) -> Option<NodeKind> {
        match self {
            NodePath::Root => None,
            NodePath::Collection { .. } => Some(NodeKind::Collection),
            NodePath::Container { .. } => Some(NodeKind::Container),
            NodePath::Category { .. } => Some(NodeKind::Category),
            NodePath::Leaf { .. } => Some(NodeKind::Leaf),
        }
    }

    /// `type` string used in envelope targets; the root reports as `collection`.
    pub fn type_str(&self) -> &'static str {
        self.kind().unwrap_or(NodeKind::Collection).as_str()
    }

    /// Last segment, empty for the root.
    pub fn name(&self) -> String {
        match self {
            NodePath::Root => String::new(),
            NodePath::Collection { collection } => collection.clone(),
            NodePath::Container { container, .. } => container.clone(),
            NodePath::Category { category, .. } => category.to_string(),
            NodePath::Leaf { leaf, .. } => leaf.clone(),
        }
    }

    pub fn parent(&self) -> NodePath {
        match self {
            NodePath::Root | NodePath::Collection { .. } => NodePath::Root,
            NodePath::Container { collection, .. } => NodePath::collection(collection),
            NodePath::Category {
                collection,
                container,
                ..
            } => NodePath::container(collection, container),
            NodePath::Leaf {
                collection,
                container,
                category,
                ..
            } => NodePath::category(collection, container, *category),
        }
    }

    /// Address of a child named `name` under this node.
    pub fn child(&self, name: &str) -> Result<NodePath, String> {
        match self {
            NodePath::Root => Ok(NodePath::collection(name)),
            NodePath::Collection { collection } => Ok(NodePath::container(collection, name)),
            NodePath::Container {
                collection,
                container,
            } => Ok(NodePath::category(collection, container, name.parse()?)),
            NodePath::Category {
                collection,
                container,
                category,
            } => Ok(NodePath::leaf(collection, container, *category, name)),
            NodePath::Leaf { .. } => Err("Leaf entries have no children.".to_string()),
        }
    }

    /// Same level, different last segment.
    pub fn with_name(&self, name: &str) -> Result<NodePath, String> {
        self.parent().child(name)
    }

    /// Token a caller must echo back to authorise deleting this node.
    pub fn delete_token(&self) -> String {
        format!("DELETE:{}", self)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodePath::Root => f.write_str("/"),
            NodePath::Collection { collection } => write!(f, "/{}", collection),
            NodePath::Container {
                collection,
                container,
            } => write!(f, "/{}/{}", collection, container),
            NodePath::Category {
                collection,
                container,
                category,
            } => write!(f, "/{}/{}/{}", collection, container, category),
            NodePath::Leaf {
                collection,
                container,
                category,
                leaf,
            } => write!(f, "/{}/{}/{}/{}", collection, container, category, leaf),
        }
    }
}

/// Build a path string from optional segments, stopping at the first gap.
pub fn build_path(segments: &[Option<&str>]) -> String {
    let parts: Vec<&str> = segments.iter().map_while(|s| *s).collect();
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}
