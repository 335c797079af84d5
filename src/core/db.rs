use crate::core::broker::DbBroker;
use crate::core::error;
use crate::core::schemas;
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub fn db_connect(db_path: &str, busy_timeout_secs: u64) -> Result<Connection, error::VaultError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(busy_timeout_secs))
        .map_err(error::VaultError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(error::VaultError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(error::VaultError::RusqliteError)?;
    Ok(conn)
}

/// Create the vault tables and indexes if they are missing.
pub fn initialize_vault_db(broker: &DbBroker, db_path: &Path) -> Result<(), error::VaultError> {
    if let Some(parent_dir) = db_path.parent() {
        fs::create_dir_all(parent_dir).map_err(error::VaultError::IoError)?;
    }

    broker.with_conn(db_path, "delve", "vault.init", |conn| {
        for stmt in schemas::VAULT_DB_SCHEMA {
            conn.execute(stmt, []).map_err(|e| {
                error::VaultError::DatabaseInitializationError(format!("{}: {}", e, stmt.trim()))
            })?;
        }
        Ok(())
    })
    .into_result()
}
