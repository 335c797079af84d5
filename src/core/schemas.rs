//! Centralized database schema definitions for the vault.
//!
//! One SQLite file holds the three entity tables. Parent links are stored as
//! denormalized name strings, so uniqueness is expressed over
//! `(owner, parent names..., name)` and restricted to live rows with partial
//! unique indexes.

pub const VAULT_DB_NAME: &str = "vault.db";

pub const COLLECTIONS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS collections (
        id TEXT PRIMARY KEY,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        summary TEXT,
        deleted INTEGER NOT NULL DEFAULT 0,
        created_at REAL NOT NULL,
        updated_at REAL NOT NULL
    )
";
pub const COLLECTIONS_UNIQUE_INDEX: &str = "
    CREATE UNIQUE INDEX IF NOT EXISTS uniq_collection_name_per_owner_active
    ON collections(owner, name) WHERE deleted = 0
";
pub const COLLECTIONS_OWNER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_collections_owner ON collections(owner)";

pub const CONTAINERS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS containers (
        id TEXT PRIMARY KEY,
        owner TEXT NOT NULL,
        collection TEXT NOT NULL,
        name TEXT NOT NULL,
        summary TEXT,
        deleted INTEGER NOT NULL DEFAULT 0,
        created_at REAL NOT NULL,
        updated_at REAL NOT NULL
    )
";
pub const CONTAINERS_UNIQUE_INDEX: &str = "
    CREATE UNIQUE INDEX IF NOT EXISTS uniq_container_per_owner_collection_active
    ON containers(owner, collection, name) WHERE deleted = 0
";
pub const CONTAINERS_PARENT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_containers_parent ON containers(owner, collection)";

pub const LEAVES_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS leaves (
        id TEXT PRIMARY KEY,
        owner TEXT NOT NULL,
        collection TEXT NOT NULL,
        container TEXT NOT NULL,
        category TEXT NOT NULL CHECK (category IN ('puzzles', 'traps', 'treasures', 'enemies')),
        name TEXT NOT NULL,
        summary TEXT,
        notes TEXT,
        tags TEXT NOT NULL DEFAULT '[]',     -- JSON array of strings
        metadata TEXT NOT NULL DEFAULT '{}', -- JSON object
        deleted INTEGER NOT NULL DEFAULT 0,
        created_at REAL NOT NULL,
        updated_at REAL NOT NULL
    )
";
pub const LEAVES_UNIQUE_INDEX: &str = "
    CREATE UNIQUE INDEX IF NOT EXISTS uniq_leaf_per_owner_category_active
    ON leaves(owner, collection, container, category, name) WHERE deleted = 0
";
pub const LEAVES_PARENT_INDEX: &str = "
    CREATE INDEX IF NOT EXISTS idx_leaves_parent
    ON leaves(owner, collection, container, category)
";

/// Every statement needed for a fresh vault, in dependency order.
pub const VAULT_DB_SCHEMA: &[&str] = &[
    COLLECTIONS_SCHEMA,
    COLLECTIONS_UNIQUE_INDEX,
    COLLECTIONS_OWNER_INDEX,
    CONTAINERS_SCHEMA,
    CONTAINERS_UNIQUE_INDEX,
    CONTAINERS_PARENT_INDEX,
    LEAVES_SCHEMA,
    LEAVES_UNIQUE_INDEX,
    LEAVES_PARENT_INDEX,
];
