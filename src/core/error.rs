use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),
    #[error("Failed to initialize database: {0}")]
    DatabaseInitializationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Confirmation token required (expected '{token_hint}')")]
    UnsafeOperation { token_hint: String },
    #[error("{stage} failed: {source}")]
    StageFailed {
        stage: &'static str,
        #[source]
        source: Box<VaultError>,
    },
}

impl VaultError {
    /// True when SQLite rejected a write because of a unique index.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            VaultError::RusqliteError(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }

    /// Caller-facing conditions, as opposed to storage failures.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            VaultError::ValidationError(_)
                | VaultError::NotFound(_)
                | VaultError::Conflict(_)
                | VaultError::UnsafeOperation { .. }
        )
    }

    /// Tag a storage failure with the step of a multi-step operation it
    /// happened in. Expected conditions pass through untouched.
    pub fn at_stage(self, stage: &'static str) -> Self {
        if self.is_expected() {
            self
        } else {
            VaultError::StageFailed {
                stage,
                source: Box::new(self),
            }
        }
    }

    /// Map a unique-index violation to `Conflict(message)`, pass anything else through.
    pub fn or_conflict(self, message: impl FnOnce() -> String) -> Self {
        if self.is_unique_violation() {
            VaultError::Conflict(message())
        } else {
            self
        }
    }
}
