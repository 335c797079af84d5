use crate::core::db;
use crate::core::error;
use crate::core::time;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const AUDIT_LOG_NAME: &str = "vault.events.jsonl";

/// The DB Broker is the single door to the vault database.
/// It serializes in-process access and appends one audit line per operation.
#[derive(Debug, Clone)]
pub struct DbBroker {
    audit_log_path: Option<PathBuf>,
    busy_timeout_secs: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub op: String,
    pub db_id: String,
    pub status: String,
}

/// What a brokered call produced, and whether its audit line was written.
///
/// The audit append happens after the closure has committed, so a failed
/// append never turns a committed change into an error.
#[derive(Debug)]
pub struct Brokered<R> {
    pub result: Result<R, error::VaultError>,
    pub audit_error: Option<error::VaultError>,
}

impl<R> Brokered<R> {
    /// Treat an audit failure as fatal when the call itself succeeded.
    pub fn into_result(self) -> Result<R, error::VaultError> {
        match (self.result, self.audit_error) {
            (Ok(_), Some(err)) => Err(err),
            (result, _) => result,
        }
    }
}

impl DbBroker {
    pub fn new(root: &Path, audit_log: bool, busy_timeout_secs: u64) -> Self {
        Self {
            audit_log_path: audit_log.then(|| root.join(AUDIT_LOG_NAME)),
            busy_timeout_secs,
        }
    }

    pub fn audit_log_path(&self) -> Option<&Path> {
        self.audit_log_path.as_deref()
    }

    /// Execute a closure with a serialized connection to the specified DB.
    ///
    /// The closure receives `&mut Connection` so it can open a transaction.
    pub fn with_conn<F, R>(&self, db_path: &Path, actor: &str, op_name: &str, f: F) -> Brokered<R>
    where
        F: FnOnce(&mut Connection) -> Result<R, error::VaultError>,
    {
        static DB_LOCK: Mutex<()> = Mutex::new(());
        let _lock = DB_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let db_id = db_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let result = db::db_connect(&db_path.to_string_lossy(), self.busy_timeout_secs)
            .and_then(|mut conn| f(&mut conn));

        let status = if result.is_ok() { "success" } else { "error" };
        let audit_error = self.log_event(actor, op_name, &db_id, status).err();

        Brokered { result, audit_error }
    }

    fn log_event(&self, actor: &str, op: &str, db_id: &str, status: &str) -> Result<(), error::VaultError> {
        let Some(path) = &self.audit_log_path else {
            return Ok(());
        };

        let ev = BrokerEvent {
            ts: time::now_iso(),
            event_id: time::new_event_id(),
            actor: actor.to_string(),
            op: op.to_string(),
            db_id: db_id.to_string(),
            status: status.to_string(),
        };

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(error::VaultError::IoError)?;

        writeln!(f, "{}", serde_json::to_string(&ev)?).map_err(error::VaultError::IoError)?;
        Ok(())
    }
}

/// Read back the audit trail, skipping lines that fail to parse.
pub fn read_audit_log(path: &Path) -> Result<Vec<BrokerEvent>, error::VaultError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect())
}
