//! Delve: a hierarchical vault for dungeon content.
//!
//! Content lives in a four-level namespace addressed by slash paths:
//!
//! ```text
//! /<collection>/<container>/<category>/<leaf>
//! /Crown Vault/Treasury/traps/Poison Needle
//! ```
//!
//! Categories are the fixed set `puzzles`, `traps`, `treasures`, `enemies`.
//! Names are unique among live siblings of the same owner, renames cascade
//! to every descendant, and deletes are hard, cascading and guarded by a
//! `DELETE:<path>` confirmation token.
//!
//! # Layers
//!
//! - [`vault`]: the store. Every operation takes an explicit
//!   [`vault::OpCtx`] and answers with an [`Envelope`], errors included.
//! - [`manager`]: typed facade for host programs; error envelopes become
//!   [`ManagerError`] values.
//! - [`dsl`]: the line-oriented command language and its script runner.
//! - [`core`]: envelope builder, paths, rows, config and the database
//!   broker every operation goes through.
//!
//! # Examples
//!
//! ```bash
//! delve exec 'collection create "Crown Vault"'
//! delve exec 'container create "Crown Vault" Treasury "Gold and traps"'
//! delve exec 'leaf create "Crown Vault" Treasury traps "Poison Needle" tags=trap,poison meta=dc=15'
//! delve run seed.dsl
//! delve export "/Crown Vault" --out crown.json
//! delve import crown.json --strategy rename
//! ```

mod cli;
pub mod core;
pub mod dsl;
pub mod manager;
pub mod vault;

pub use crate::core::envelope::{BatchEnvelope, Code, Envelope, Status};
pub use crate::core::error::VaultError;
pub use crate::core::store::Store;
pub use manager::{Manager, ManagerError};

use crate::core::config;
use anyhow::Context;
use clap::Parser;
use cli::{Cli, Command};
use serde_json::Value as JsonValue;
use std::fs;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use vault::OpCtx;

/// Owner used by the CLI when neither flag, environment nor config names one.
pub const DEFAULT_OWNER: &str = "local";

struct Printer {
    compact: bool,
}

impl Printer {
    fn json(&self, value: &JsonValue) -> anyhow::Result<()> {
        let text = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        let mut out = io::stdout().lock();
        writeln!(out, "{}", text)?;
        Ok(())
    }

    fn envelope(&self, envelope: &Envelope) -> anyhow::Result<()> {
        self.json(&envelope.to_json())?;
        status_line(envelope.status, envelope.code, &envelope.message);
        Ok(())
    }

    fn batch(&self, batch: &BatchEnvelope) -> anyhow::Result<()> {
        use colored::Colorize;

        self.json(&serde_json::to_value(batch)?)?;
        let s = &batch.summary;
        eprintln!(
            "{} {} lines: {} ok, {} error, {} skipped ({:.2} ms)",
            status_tag(batch.status),
            s.lines_total,
            s.ok.to_string().bright_green(),
            s.error.to_string().bright_red(),
            s.skipped,
            s.duration_ms
        );
        Ok(())
    }
}

fn status_tag(status: Status) -> colored::ColoredString {
    use colored::Colorize;

    match status {
        Status::Ok => "ok".bright_green().bold(),
        Status::Error => "error".bright_red().bold(),
        Status::Skipped => "skipped".bright_yellow().bold(),
    }
}

fn status_line(status: Status, code: Code, message: &str) {
    use colored::Colorize;

    eprintln!("{} {} {}", status_tag(status), code.as_str().bright_white(), message);
}

fn exit_for(status: Status) -> ExitCode {
    match status {
        Status::Error => ExitCode::FAILURE,
        Status::Ok | Status::Skipped => ExitCode::SUCCESS,
    }
}

fn shell(store: &Store, owner: &str, printer: &Printer) -> anyhow::Result<ExitCode> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("reading command from stdin")?;
        if matches!(line.trim(), "exit" | "quit") {
            break;
        }
        if let Some(envelope) = dsl::execute_line(store, Some(owner), &line) {
            printer.envelope(&envelope)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let root = config::resolve_root(cli.root.as_deref())?;
    let config = config::load_config(&root, cli.config.as_deref())
        .with_context(|| format!("loading configuration for {}", root.display()))?
        .with_env_overrides();
    let owner = cli
        .owner
        .clone()
        .or_else(|| config.owner.clone())
        .unwrap_or_else(|| DEFAULT_OWNER.to_string());
    let store = Store::open_with_config(&root, config)
        .with_context(|| format!("opening vault at {}", root.display()))?;
    let printer = Printer { compact: cli.compact };

    match cli.command {
        Command::Run { file } => {
            let batch = dsl::execute_file(&store, Some(&owner), &file)
                .with_context(|| format!("running {}", file.display()))?;
            printer.batch(&batch)?;
            Ok(exit_for(batch.status))
        }
        Command::Exec { line } => match dsl::execute_line(&store, Some(&owner), &line) {
            Some(envelope) => {
                printer.envelope(&envelope)?;
                Ok(exit_for(envelope.status))
            }
            None => Ok(ExitCode::SUCCESS),
        },
        Command::Shell => shell(&store, &owner, &printer),
        Command::Export { path, out } => {
            let raw = format!("export {}", path);
            let ctx = OpCtx::new(&store, Some(&owner), &raw);
            let envelope = vault::export(&ctx, &path);
            if let (Some(out), Some(tree)) = (out, envelope.result_field("collection")) {
                fs::write(&out, serde_json::to_string_pretty(tree)?)
                    .with_context(|| format!("writing {}", out.display()))?;
            }
            printer.envelope(&envelope)?;
            Ok(exit_for(envelope.status))
        }
        Command::Import { file, strategy } => {
            let content =
                fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let tree: JsonValue = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", file.display()))?;
            let raw = format!("import {} strategy={}", file.display(), strategy);
            let ctx = OpCtx::new(&store, Some(&owner), &raw);
            let envelope = vault::import(&ctx, &tree, strategy);
            printer.envelope(&envelope)?;
            Ok(exit_for(envelope.status))
        }
    }
}
