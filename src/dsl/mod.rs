//! Line-oriented command language over the vault.
//!
//! A line is `<entity> <verb> <positional...> [key=value ...] [flag]`, or one
//! of the utility commands (`search`, `stat`, `list`, `export`, `import`).
//! Every non-blank, non-comment line answers with exactly one envelope;
//! failures are turned into error envelopes at the command boundary.

pub mod batch;
pub mod dispatch;
pub mod fields;
pub mod tokenizer;

pub use batch::{execute_file, execute_script};
pub use dispatch::{COMMANDS, CommandSpec, execute_line};
pub use fields::{ParsedFields, parse_field_args, parse_metadata, parse_tags, parse_value};
pub use tokenizer::tokenize;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DslError {
    /// Unknown command, wrong arity, malformed argument.
    #[error("{0}")]
    Syntax(String),

    /// Well-formed line carrying a value the command cannot accept.
    #[error("{0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
