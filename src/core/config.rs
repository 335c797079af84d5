//! Vault configuration, read from `delve.toml`.
//!
//! A missing file is not an error: every key has a default.

use crate::core::error::VaultError;
use crate::core::schemas;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "delve.toml";
pub const ENV_HOME: &str = "DELVE_HOME";
pub const ENV_OWNER: &str = "DELVE_OWNER";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Owner used by CLI and DSL sessions when none is given explicitly.
    pub owner: Option<String>,
    /// Append broker events to `vault.events.jsonl`.
    pub audit_log: bool,
    pub busy_timeout_secs: u64,
    pub db_name: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            owner: None,
            audit_log: true,
            busy_timeout_secs: 5,
            db_name: schemas::VAULT_DB_NAME.to_string(),
        }
    }
}

impl VaultConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, VaultError> {
        let config: VaultConfig = toml::from_str(content)?;
        if config.db_name.trim().is_empty() || config.db_name.contains('/') {
            return Err(VaultError::ValidationError(format!(
                "db_name must be a plain file name, got '{}'",
                config.db_name
            )));
        }
        Ok(config)
    }

    /// Apply `DELVE_OWNER` on top of the file value.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(owner) = env::var(ENV_OWNER)
            && !owner.trim().is_empty()
        {
            self.owner = Some(owner);
        }
        self
    }
}

/// Load `<root>/delve.toml`, or `explicit` when given.
pub fn load_config(root: &Path, explicit: Option<&Path>) -> Result<VaultConfig, VaultError> {
    let config_path = match explicit {
        Some(p) => p.to_path_buf(),
        None => root.join(CONFIG_FILE_NAME),
    };

    if config_path.exists() {
        let content = fs::read_to_string(&config_path).map_err(VaultError::IoError)?;
        return VaultConfig::from_toml_str(&content);
    }

    if explicit.is_some() {
        return Err(VaultError::NotFound(format!(
            "config file {}",
            config_path.display()
        )));
    }

    Ok(VaultConfig::default())
}

/// Resolve the store root: explicit flag, then `DELVE_HOME`, then `./.delve`.
pub fn resolve_root(explicit: Option<&Path>) -> Result<PathBuf, VaultError> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    match env::var(ENV_HOME) {
        Ok(home) if !home.trim().is_empty() => Ok(PathBuf::from(home)),
        _ => Ok(env::current_dir()?.join(".delve")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_file_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let config = load_config(tmp.path(), None).unwrap();
        assert_eq!(config, VaultConfig::default());
        assert_eq!(config.db_name, "vault.db");
        assert!(config.audit_log);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = VaultConfig::from_toml_str("owner = \"gm\"\naudit_log = false\n").unwrap();
        assert_eq!(config.owner.as_deref(), Some("gm"));
        assert!(!config.audit_log);
        assert_eq!(config.busy_timeout_secs, 5);
    }

    #[test]
    fn test_rejects_bad_db_name_and_bad_toml() {
        assert!(VaultConfig::from_toml_str("db_name = \"a/b.db\"").is_err());
        assert!(VaultConfig::from_toml_str("owner = [").is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope.toml");
        assert!(load_config(tmp.path(), Some(&missing)).is_err());
    }
}
