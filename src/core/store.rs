//! Store handle for a vault on disk.
//!
//! A `Store` is the explicit context every vault operation receives. There is
//! no process-global store; callers open one and pass it down.

use crate::core::broker::{Brokered, DbBroker};
use crate::core::config::{self, VaultConfig};
use crate::core::db;
use crate::core::error::VaultError;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory
    pub root: PathBuf,
    pub config: VaultConfig,
    broker: DbBroker,
}

impl Store {
    /// Open (and initialize if needed) the vault under `root`, reading
    /// `delve.toml` from the same directory.
    pub fn open(root: &Path) -> Result<Self, VaultError> {
        let config = config::load_config(root, None)?;
        Self::open_with_config(root, config)
    }

    pub fn open_with_config(root: &Path, config: VaultConfig) -> Result<Self, VaultError> {
        std::fs::create_dir_all(root)?;
        let broker = DbBroker::new(root, config.audit_log, config.busy_timeout_secs);
        let store = Self {
            root: root.to_path_buf(),
            config,
            broker,
        };
        db::initialize_vault_db(&store.broker, &store.db_path())?;
        Ok(store)
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join(&self.config.db_name)
    }

    pub fn broker(&self) -> &DbBroker {
        &self.broker
    }

    /// Run `f` against the vault database through the broker.
    pub fn with_conn<F, R>(&self, actor: &str, op_name: &str, f: F) -> Brokered<R>
    where
        F: FnOnce(&mut Connection) -> Result<R, VaultError>,
    {
        self.broker.with_conn(&self.db_path(), actor, op_name, f)
    }
}
