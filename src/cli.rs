//! CLI struct definitions for the `delve` command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`.

use crate::vault::ImportStrategy;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "delve",
    version = env!("CARGO_PKG_VERSION"),
    about = "Hierarchical vault for dungeon content, driven by a line-oriented command language."
)]
pub(crate) struct Cli {
    /// Store root directory (defaults to $DELVE_HOME, then ./.delve).
    #[clap(long, global = true)]
    pub root: Option<PathBuf>,
    /// Owner to act as (defaults to $DELVE_OWNER, then the config file, then "local").
    #[clap(long, global = true)]
    pub owner: Option<String>,
    /// Config file to read instead of <root>/delve.toml.
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,
    /// Print envelopes as single-line JSON.
    #[clap(long, global = true)]
    pub compact: bool,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Run a script file, one command per line
    Run {
        /// Script to execute
        file: PathBuf,
    },
    /// Execute a single command line
    Exec {
        /// The command, quoted as one argument
        line: String,
    },
    /// Read commands from stdin until EOF or `exit`
    Shell,
    /// Export a collection as a JSON tree
    Export {
        /// Collection path, e.g. "/Crown Vault"
        path: String,
        /// Also write the bare tree to this file
        #[clap(long, short)]
        out: Option<PathBuf>,
    },
    /// Import a collection tree from a JSON file
    Import {
        /// File produced by `export --out`
        file: PathBuf,
        /// What to do when the collection exists: skip, overwrite or rename
        #[clap(long, default_value = "skip")]
        strategy: ImportStrategy,
    },
}
