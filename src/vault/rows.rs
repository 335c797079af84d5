//! SQL access for the three entity tables.
//!
//! Every function here takes a plain `&Connection` so it works equally on a
//! bare connection and inside a `Transaction` (which derefs to one).

use crate::core::error::VaultError;
use crate::core::model::{CollectionRow, ContainerRow, LeafRow};
use crate::core::path::Category;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::de::DeserializeOwned;

impl ToSql for Category {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Category {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

const COLLECTION_COLS: &str = "id, owner, name, summary, deleted, created_at, updated_at";
const CONTAINER_COLS: &str = "id, owner, collection, name, summary, deleted, created_at, updated_at";
const LEAF_COLS: &str = "id, owner, collection, container, category, name, summary, notes, tags, metadata, deleted, created_at, updated_at";

fn collection_from_row(row: &Row<'_>) -> rusqlite::Result<CollectionRow> {
    Ok(CollectionRow {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        summary: row.get(3)?,
        deleted: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn container_from_row(row: &Row<'_>) -> rusqlite::Result<ContainerRow> {
    Ok(ContainerRow {
        id: row.get(0)?,
        owner: row.get(1)?,
        collection: row.get(2)?,
        name: row.get(3)?,
        summary: row.get(4)?,
        deleted: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// A TEXT column holding JSON. Undecodable content is a conversion error,
/// never an empty value that a later write would persist.
fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn leaf_from_row(row: &Row<'_>) -> rusqlite::Result<LeafRow> {
    Ok(LeafRow {
        id: row.get(0)?,
        owner: row.get(1)?,
        collection: row.get(2)?,
        container: row.get(3)?,
        category: row.get(4)?,
        name: row.get(5)?,
        summary: row.get(6)?,
        notes: row.get(7)?,
        tags: json_column(row, 8)?,
        metadata: json_column(row, 9)?,
        deleted: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

// --- collections ---

pub fn find_collection(conn: &Connection, owner: &str, name: &str) -> Result<Option<CollectionRow>, VaultError> {
    let sql = format!(
        "SELECT {COLLECTION_COLS} FROM collections WHERE owner = ?1 AND name = ?2 AND deleted = 0"
    );
    Ok(conn
        .query_row(&sql, params![owner, name], collection_from_row)
        .optional()?)
}

pub fn require_collection(conn: &Connection, owner: &str, name: &str) -> Result<CollectionRow, VaultError> {
    find_collection(conn, owner, name)?
        .ok_or_else(|| VaultError::NotFound(format!("No collection '{}'.", name)))
}

pub fn list_collections(conn: &Connection, owner: &str) -> Result<Vec<CollectionRow>, VaultError> {
    let sql = format!(
        "SELECT {COLLECTION_COLS} FROM collections WHERE owner = ?1 AND deleted = 0 ORDER BY name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner], collection_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn insert_collection(conn: &Connection, row: &CollectionRow) -> Result<(), VaultError> {
    conn.execute(
        "INSERT INTO collections (id, owner, name, summary, deleted, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![row.id, row.owner, row.name, row.summary, row.deleted, row.created_at, row.updated_at],
    )
    .map_err(|e| VaultError::from(e).or_conflict(|| format!("Collection '{}' already exists.", row.name)))?;
    Ok(())
}

// --- containers ---

pub fn find_container(
    conn: &Connection,
    owner: &str,
    collection: &str,
    name: &str,
) -> Result<Option<ContainerRow>, VaultError> {
    let sql = format!(
        "SELECT {CONTAINER_COLS} FROM containers
         WHERE owner = ?1 AND collection = ?2 AND name = ?3 AND deleted = 0"
    );
    Ok(conn
        .query_row(&sql, params![owner, collection, name], container_from_row)
        .optional()?)
}

/// Resolve a container, reporting a missing collection before a missing container.
pub fn require_container(
    conn: &Connection,
    owner: &str,
    collection: &str,
    name: &str,
) -> Result<ContainerRow, VaultError> {
    require_collection(conn, owner, collection)?;
    find_container(conn, owner, collection, name)?.ok_or_else(|| {
        VaultError::NotFound(format!("No container '{}' in '{}'.", name, collection))
    })
}

pub fn list_containers(conn: &Connection, owner: &str, collection: &str) -> Result<Vec<ContainerRow>, VaultError> {
    let sql = format!(
        "SELECT {CONTAINER_COLS} FROM containers
         WHERE owner = ?1 AND collection = ?2 AND deleted = 0 ORDER BY name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner, collection], container_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn insert_container(conn: &Connection, row: &ContainerRow) -> Result<(), VaultError> {
    conn.execute(
        "INSERT INTO containers (id, owner, collection, name, summary, deleted, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            row.id,
            row.owner,
            row.collection,
            row.name,
            row.summary,
            row.deleted,
            row.created_at,
            row.updated_at
        ],
    )
    .map_err(|e| {
        VaultError::from(e).or_conflict(|| {
            format!("Container '{}' already exists in '{}'.", row.name, row.collection)
        })
    })?;
    Ok(())
}

// --- leaves ---

pub fn find_leaf(
    conn: &Connection,
    owner: &str,
    collection: &str,
    container: &str,
    category: Category,
    name: &str,
) -> Result<Option<LeafRow>, VaultError> {
    let sql = format!(
        "SELECT {LEAF_COLS} FROM leaves
         WHERE owner = ?1 AND collection = ?2 AND container = ?3 AND category = ?4 AND name = ?5 AND deleted = 0"
    );
    Ok(conn
        .query_row(&sql, params![owner, collection, container, category, name], leaf_from_row)
        .optional()?)
}

pub fn require_leaf(
    conn: &Connection,
    owner: &str,
    collection: &str,
    container: &str,
    category: Category,
    name: &str,
) -> Result<LeafRow, VaultError> {
    require_container(conn, owner, collection, container)?;
    find_leaf(conn, owner, collection, container, category, name)?.ok_or_else(|| {
        VaultError::NotFound(format!(
            "No leaf '{}' in '/{}/{}/{}'.",
            name, collection, container, category
        ))
    })
}

/// Leaves under a container, optionally narrowed to one category.
pub fn list_leaves(
    conn: &Connection,
    owner: &str,
    collection: &str,
    container: &str,
    category: Option<Category>,
) -> Result<Vec<LeafRow>, VaultError> {
    let sql = format!(
        "SELECT {LEAF_COLS} FROM leaves
         WHERE owner = ?1 AND collection = ?2 AND container = ?3 AND (?4 IS NULL OR category = ?4) AND deleted = 0
         ORDER BY category, name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner, collection, container, category], leaf_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Every live leaf of an owner, optionally restricted to one collection.
pub fn scan_leaves(conn: &Connection, owner: &str, collection: Option<&str>) -> Result<Vec<LeafRow>, VaultError> {
    let sql = format!(
        "SELECT {LEAF_COLS} FROM leaves
         WHERE owner = ?1 AND (?2 IS NULL OR collection = ?2) AND deleted = 0
         ORDER BY collection, container, category, name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![owner, collection], leaf_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn insert_leaf(conn: &Connection, row: &LeafRow) -> Result<(), VaultError> {
    let tags_json = serde_json::to_string(&row.tags)?;
    let metadata_json = serde_json::to_string(&row.metadata)?;
    conn.execute(
        "INSERT INTO leaves (id, owner, collection, container, category, name, summary, notes, tags, metadata, deleted, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            row.id,
            row.owner,
            row.collection,
            row.container,
            row.category,
            row.name,
            row.summary,
            row.notes,
            tags_json,
            metadata_json,
            row.deleted,
            row.created_at,
            row.updated_at
        ],
    )
    .map_err(|e| {
        VaultError::from(e).or_conflict(|| format!("Leaf '{}' already exists at {}.", row.name, row.path().parent()))
    })?;
    Ok(())
}

/// Write back the mutable content of a leaf (everything but its address).
pub fn update_leaf_content(conn: &Connection, row: &LeafRow) -> Result<(), VaultError> {
    conn.execute(
        "UPDATE leaves SET summary = ?1, notes = ?2, tags = ?3, metadata = ?4, updated_at = ?5 WHERE id = ?6",
        params![
            row.summary,
            row.notes,
            serde_json::to_string(&row.tags)?,
            serde_json::to_string(&row.metadata)?,
            row.updated_at,
            row.id
        ],
    )?;
    Ok(())
}

// --- cascades ---

/// Rename a collection and rewrite the denormalized reference in every descendant.
pub fn rename_collection_cascade(
    conn: &Connection,
    owner: &str,
    from: &str,
    to: &str,
    now: f64,
) -> Result<usize, VaultError> {
    conn.execute(
        "UPDATE collections SET name = ?3, updated_at = ?4 WHERE owner = ?1 AND name = ?2 AND deleted = 0",
        params![owner, from, to, now],
    )
    .map_err(|e| VaultError::from(e).or_conflict(|| format!("Collection '{}' already exists.", to)))?;
    let containers = conn.execute(
        "UPDATE containers SET collection = ?3 WHERE owner = ?1 AND collection = ?2",
        params![owner, from, to],
    )?;
    let leaves = conn.execute(
        "UPDATE leaves SET collection = ?3 WHERE owner = ?1 AND collection = ?2",
        params![owner, from, to],
    )?;
    Ok(containers + leaves)
}

pub fn rename_container_cascade(
    conn: &Connection,
    owner: &str,
    collection: &str,
    from: &str,
    to: &str,
    now: f64,
) -> Result<usize, VaultError> {
    conn.execute(
        "UPDATE containers SET name = ?4, updated_at = ?5
         WHERE owner = ?1 AND collection = ?2 AND name = ?3 AND deleted = 0",
        params![owner, collection, from, to, now],
    )
    .map_err(|e| {
        VaultError::from(e).or_conflict(|| format!("Container '{}' already exists in '{}'.", to, collection))
    })?;
    let leaves = conn.execute(
        "UPDATE leaves SET container = ?4 WHERE owner = ?1 AND collection = ?2 AND container = ?3",
        params![owner, collection, from, to],
    )?;
    Ok(leaves)
}

pub fn rename_leaf(conn: &Connection, id: &str, to: &str, now: f64, at: &str) -> Result<(), VaultError> {
    conn.execute(
        "UPDATE leaves SET name = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, to, now],
    )
    .map_err(|e| VaultError::from(e).or_conflict(|| format!("Leaf '{}' already exists at {}.", to, at)))?;
    Ok(())
}

pub fn set_summary(conn: &Connection, table: SummaryTable, id: &str, summary: Option<&str>, now: f64) -> Result<(), VaultError> {
    let sql = format!("UPDATE {} SET summary = ?2, updated_at = ?3 WHERE id = ?1", table.as_str());
    conn.execute(&sql, params![id, summary, now])?;
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub enum SummaryTable {
    Collections,
    Containers,
}

impl SummaryTable {
    fn as_str(self) -> &'static str {
        match self {
            SummaryTable::Collections => "collections",
            SummaryTable::Containers => "containers",
        }
    }
}

/// Hard-delete a collection with all containers and leaves. Returns rows removed.
pub fn delete_collection_cascade(conn: &Connection, owner: &str, name: &str) -> Result<usize, VaultError> {
    let leaves = conn.execute(
        "DELETE FROM leaves WHERE owner = ?1 AND collection = ?2",
        params![owner, name],
    )?;
    let containers = conn.execute(
        "DELETE FROM containers WHERE owner = ?1 AND collection = ?2",
        params![owner, name],
    )?;
    let collections = conn.execute(
        "DELETE FROM collections WHERE owner = ?1 AND name = ?2",
        params![owner, name],
    )?;
    Ok(leaves + containers + collections)
}

pub fn delete_container_cascade(conn: &Connection, owner: &str, collection: &str, name: &str) -> Result<usize, VaultError> {
    let leaves = conn.execute(
        "DELETE FROM leaves WHERE owner = ?1 AND collection = ?2 AND container = ?3",
        params![owner, collection, name],
    )?;
    let containers = conn.execute(
        "DELETE FROM containers WHERE owner = ?1 AND collection = ?2 AND name = ?3",
        params![owner, collection, name],
    )?;
    Ok(leaves + containers)
}

pub fn delete_leaf(conn: &Connection, id: &str) -> Result<usize, VaultError> {
    Ok(conn.execute("DELETE FROM leaves WHERE id = ?1", params![id])?)
}
