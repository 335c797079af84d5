//! Command table and per-line dispatch.

use super::DslError;
use super::fields::{Flags, parse_field_args, parse_options, parse_tags, take_flags};
use super::tokenizer::tokenize;
use crate::core::envelope::{Code, CommandEcho, Envelope, OpFrame, Target};
use crate::core::model::{LeafFields, Patch};
use crate::core::path::{NodeKind, build_path};
use crate::core::store::Store;
use crate::vault::{self, ImportStrategy, OpCtx};
use serde_json::Value as JsonValue;
use std::fs;
use std::io::ErrorKind;

/// One row of the command table. Utility commands have no verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub entity: &'static str,
    pub verb: Option<&'static str>,
    /// Positional arguments required after the verb
    pub min_args: usize,
    pub usage: &'static str,
}

const fn cmd(entity: &'static str, verb: &'static str, min_args: usize, usage: &'static str) -> CommandSpec {
    CommandSpec {
        entity,
        verb: Some(verb),
        min_args,
        usage,
    }
}

const fn util(entity: &'static str, min_args: usize, usage: &'static str) -> CommandSpec {
    CommandSpec {
        entity,
        verb: None,
        min_args,
        usage,
    }
}

pub const COMMANDS: &[CommandSpec] = &[
    cmd("collection", "create", 1, "collection create <name> [summary] [summary=..] [exists_ok]"),
    cmd("collection", "list", 0, "collection list"),
    cmd("collection", "rename", 2, "collection rename <name> <new_name>"),
    cmd("collection", "update", 1, "collection update <name> summary=.. [name=..]"),
    cmd("collection", "delete", 1, "collection delete <name> token=DELETE:/<name>"),
    cmd("container", "create", 2, "container create <collection> <name> [summary] [exists_ok]"),
    cmd("container", "list", 1, "container list <collection>"),
    cmd("container", "rename", 3, "container rename <collection> <name> <new_name>"),
    cmd("container", "update", 2, "container update <collection> <name> summary=.."),
    cmd("container", "delete", 2, "container delete <collection> <name> token=DELETE:/<collection>/<name>"),
    cmd("container", "move", 3, "container move <collection> <name> <dst_collection> [overwrite]"),
    cmd(
        "container",
        "copy",
        3,
        "container copy <collection> <name> <dst_collection> [new_name=..] [overwrite]",
    ),
    cmd("category", "list", 3, "category list <collection> <container> <category>"),
    cmd("category", "ensure", 3, "category ensure <collection> <container> <category>"),
    cmd(
        "leaf",
        "create",
        4,
        "leaf create <collection> <container> <category> <name> [summary] [notes] [tags=a,b] [meta=k=v] [exists_ok]",
    ),
    cmd("leaf", "read", 4, "leaf read <collection> <container> <category> <name>"),
    cmd(
        "leaf",
        "update",
        4,
        "leaf update <collection> <container> <category> <name> [summary=..] [notes=..] [tags=..] [meta=..] [name=..]",
    ),
    cmd("leaf", "rename", 5, "leaf rename <collection> <container> <category> <name> <new_name>"),
    cmd("leaf", "delete", 4, "leaf delete <collection> <container> <category> <name> token=DELETE:<path>"),
    cmd(
        "leaf",
        "move",
        7,
        "leaf move <collection> <container> <category> <name> <dst_collection> <dst_container> <dst_category> [overwrite]",
    ),
    cmd(
        "leaf",
        "copy",
        7,
        "leaf copy <collection> <container> <category> <name> <dst_collection> <dst_container> <dst_category> [new_name=..] [overwrite]",
    ),
    util("search", 1, "search <query> [collection=..] [tags=a,b]"),
    util("stat", 1, "stat <collection> [container] [category] [leaf]"),
    util("list", 0, "list [collection] [container] [category]"),
    util("export", 1, "export <collection>"),
    util("import", 1, "import <file.json> [strategy=skip|overwrite|rename]"),
];

fn is_entity(word: &str) -> bool {
    COMMANDS.iter().any(|c| c.verb.is_some() && c.entity == word)
}

fn verbs_of(entity: &str) -> Vec<&'static str> {
    COMMANDS
        .iter()
        .filter(|c| c.entity == entity)
        .filter_map(|c| c.verb)
        .collect()
}

/// Find the table row for a tokenized line and return it with the tokens
/// that follow the command words.
fn resolve<'t>(raw: &str, tokens: &'t [String]) -> Result<(&'static CommandSpec, &'t [String]), DslError> {
    let head = tokens[0].to_lowercase();
    if let Some(spec) = COMMANDS.iter().find(|c| c.verb.is_none() && c.entity == head) {
        return Ok((spec, &tokens[1..]));
    }
    if !is_entity(&head) {
        return Err(DslError::Syntax(format!("Unknown command: {}", raw)));
    }
    let Some(verb) = tokens.get(1).map(|v| v.to_lowercase()) else {
        return Err(DslError::Syntax(format!(
            "Missing verb for '{}'. Expected one of: {}.",
            head,
            verbs_of(&head).join(", ")
        )));
    };
    COMMANDS
        .iter()
        .find(|c| c.entity == head && c.verb == Some(verb.as_str()))
        .map(|spec| (spec, &tokens[2..]))
        .ok_or_else(|| {
            DslError::Syntax(format!(
                "Unknown verb '{}' for '{}'. Expected one of: {}.",
                verb,
                head,
                verbs_of(&head).join(", ")
            ))
        })
}

/// Execute one line. Blank and comment lines yield `None`; anything else
/// yields exactly one envelope.
pub fn execute_line(store: &Store, owner: Option<&str>, line: &str) -> Option<Envelope> {
    let raw = line.trim();
    let tokens = tokenize(raw);
    if tokens.is_empty() {
        return None;
    }
    let ctx = OpCtx::new(store, owner, raw);
    Some(dispatch(&ctx, &tokens).unwrap_or_else(|err| error_envelope(raw, &tokens, err)))
}

/// A path segment taken from a positional argument.
fn segment(arg: &str) -> Result<&str, DslError> {
    if arg.contains('/') {
        return Err(DslError::Invalid(format!("Names cannot contain '/': '{}'.", arg)));
    }
    Ok(arg)
}

fn path_of(args: &[String]) -> Result<String, DslError> {
    let mut segments = Vec::with_capacity(args.len());
    for arg in args {
        segments.push(Some(segment(arg)?));
    }
    Ok(build_path(&segments))
}

/// Creation fields for a node. Collections and containers only take a
/// summary.
fn creation_fields(fields: &serde_json::Map<String, JsonValue>, leaf: bool) -> Result<LeafFields, DslError> {
    let patch = Patch::from_map(fields).map_err(DslError::Invalid)?;
    if patch.name.is_some() {
        return Err(DslError::Invalid("The name is given positionally, not as name=.".to_string()));
    }
    if !leaf && (patch.notes.is_some() || patch.tags.is_some() || patch.metadata.is_some()) {
        return Err(DslError::Invalid(
            "Collections and containers only take a summary.".to_string(),
        ));
    }
    Ok(LeafFields {
        summary: patch.summary.flatten(),
        notes: patch.notes.flatten(),
        tags: patch.tags.unwrap_or_default(),
        metadata: patch.metadata.unwrap_or_default(),
    })
}

struct Line<'a> {
    ctx: &'a OpCtx<'a>,
    pos: &'a [String],
    rest: &'a [String],
    flags: Flags,
    warnings: Vec<String>,
}

impl Line<'_> {
    fn create(&mut self, parent: &[String], name: &str, leaf: bool) -> Result<Envelope, DslError> {
        let parsed = parse_field_args(self.rest);
        self.warnings.extend(parsed.warnings());
        let fields = creation_fields(&parsed.fields, leaf)?;
        Ok(vault::create(
            self.ctx,
            &path_of(parent)?,
            segment(name)?,
            &fields,
            self.flags.exists_ok,
        ))
    }

    fn update(&mut self, node: &[String]) -> Result<Envelope, DslError> {
        let parsed = parse_field_args(self.rest);
        self.warnings.extend(parsed.warnings());
        Ok(vault::patch(self.ctx, &path_of(node)?, &parsed.fields))
    }

    fn rename(&mut self, node: &[String], new_name: &str) -> Result<Envelope, DslError> {
        self.ignore_rest();
        Ok(vault::rename(self.ctx, &path_of(node)?, segment(new_name)?))
    }

    fn delete(&mut self, node: &[String]) -> Result<Envelope, DslError> {
        let opts = parse_options(self.rest, &["token"]);
        self.warnings.extend(opts.warnings());
        Ok(vault::delete(self.ctx, &path_of(node)?, opts.get("token")))
    }

    fn transfer(&mut self, src: &[String], dst: &[String], copy: bool) -> Result<Envelope, DslError> {
        let src = path_of(src)?;
        let dst = path_of(dst)?;
        if copy {
            let opts = parse_options(self.rest, &["new_name"]);
            self.warnings.extend(opts.warnings());
            let new_name = opts.get("new_name").map(segment).transpose()?;
            Ok(vault::copy_node(self.ctx, &src, &dst, new_name, self.flags.overwrite))
        } else {
            self.ignore_rest();
            Ok(vault::move_node(self.ctx, &src, &dst, self.flags.overwrite))
        }
    }

    /// Path-style utilities take up to `max` bare segments.
    fn segments(&mut self, max: usize) -> Vec<String> {
        let mut bare: Vec<String> = self.pos.iter().chain(self.rest).cloned().collect();
        if bare.len() > max {
            for extra in bare.split_off(max) {
                self.warnings.push(format!("Ignored argument '{}'.", extra));
            }
        }
        bare
    }

    fn ignore_rest(&mut self) {
        for extra in self.rest {
            self.warnings.push(format!("Ignored argument '{}'.", extra));
        }
    }

    fn import(&mut self, file: &str) -> Result<Envelope, DslError> {
        let opts = parse_options(self.rest, &["strategy"]);
        self.warnings.extend(opts.warnings());
        let strategy = match opts.get("strategy") {
            Some(s) => s.parse::<ImportStrategy>().map_err(DslError::Invalid)?,
            None => ImportStrategy::default(),
        };
        let content = fs::read_to_string(file)?;
        let tree: JsonValue = serde_json::from_str(&content)?;
        Ok(vault::import(self.ctx, &tree, strategy))
    }
}

fn dispatch(ctx: &OpCtx<'_>, tokens: &[String]) -> Result<Envelope, DslError> {
    let (spec, args) = resolve(ctx.raw, tokens)?;
    let (args, flags) = take_flags(args.to_vec());
    if args.len() < spec.min_args {
        return Err(DslError::Syntax(format!(
            "Not enough arguments. Usage: {}",
            spec.usage
        )));
    }
    let (pos, rest) = args.split_at(spec.min_args);
    let mut line = Line {
        ctx,
        pos,
        rest,
        flags,
        warnings: Vec::new(),
    };

    let mut envelope = match (spec.entity, spec.verb.unwrap_or_default()) {
        ("collection", "create") => line.create(&[], &pos[0], false)?,
        ("collection", "list") => {
            line.ignore_rest();
            vault::list(ctx, "/")
        }
        ("collection", "rename") => line.rename(&pos[..1], &pos[1])?,
        ("collection", "update") => line.update(&pos[..1])?,
        ("collection", "delete") => line.delete(&pos[..1])?,

        ("container", "create") => line.create(&pos[..1], &pos[1], false)?,
        ("container", "list") => {
            line.ignore_rest();
            vault::list(ctx, &path_of(&pos[..1])?)
        }
        ("container", "rename") => line.rename(&pos[..2], &pos[2])?,
        ("container", "update") => line.update(&pos[..2])?,
        ("container", "delete") => line.delete(&pos[..2])?,
        ("container", "move") => line.transfer(&pos[..2], &pos[2..3], false)?,
        ("container", "copy") => line.transfer(&pos[..2], &pos[2..3], true)?,

        ("category", "list") => {
            line.ignore_rest();
            vault::list(ctx, &path_of(&pos[..3])?)
        }
        ("category", "ensure") => {
            line.ignore_rest();
            vault::ensure_category(ctx, &path_of(&pos[..3])?)
        }

        ("leaf", "create") => line.create(&pos[..3], &pos[3], true)?,
        ("leaf", "read") => {
            line.ignore_rest();
            vault::read(ctx, &path_of(&pos[..4])?)
        }
        ("leaf", "update") => line.update(&pos[..4])?,
        ("leaf", "rename") => line.rename(&pos[..4], &pos[4])?,
        ("leaf", "delete") => line.delete(&pos[..4])?,
        ("leaf", "move") => line.transfer(&pos[..4], &pos[4..7], false)?,
        ("leaf", "copy") => line.transfer(&pos[..4], &pos[4..7], true)?,

        ("search", _) => {
            let opts = parse_options(rest, &["collection", "tags"]);
            line.warnings.extend(opts.warnings());
            let tags = opts.get("tags").map(parse_tags).unwrap_or_default();
            vault::search(ctx, &pos[0], opts.get("collection"), &tags)
        }
        ("stat", _) => {
            let segments = line.segments(4);
            vault::stat(ctx, &path_of(&segments)?)
        }
        ("list", _) => {
            let segments = line.segments(3);
            vault::list(ctx, &path_of(&segments)?)
        }
        ("export", _) => {
            line.ignore_rest();
            vault::export(ctx, &path_of(&pos[..1])?)
        }
        ("import", _) => line.import(&pos[0])?,

        (entity, verb) => {
            return Err(DslError::Syntax(format!("No handler for '{} {}'.", entity, verb)));
        }
    };
    envelope.push_warnings(line.warnings);
    Ok(envelope)
}

const SEGMENT_KEYS: [&str; 4] = ["collection", "container", "category", "leaf"];

/// Error envelope for a line that failed before reaching the vault, with
/// whatever command and target information the tokens still give.
fn error_envelope(raw: &str, tokens: &[String], err: DslError) -> Envelope {
    let code = match &err {
        DslError::Syntax(_) => Code::ErrorParse,
        DslError::Invalid(_) | DslError::Json(_) => Code::ErrorValidation,
        DslError::Io(e) if e.kind() == ErrorKind::NotFound => Code::ErrorNotFound,
        DslError::Io(_) => Code::ErrorInternal,
    };

    let head = tokens.first().map(|t| t.to_lowercase()).unwrap_or_else(|| "unknown".to_string());
    let (name, args_from) = if is_entity(&head) {
        match tokens.get(1) {
            Some(verb) => (format!("{}.{}", head, verb.to_lowercase()), 2),
            None => (head.clone(), 1),
        }
    } else {
        (head.clone(), 1)
    };

    let bare: Vec<&str> = tokens
        .iter()
        .skip(args_from)
        .map(String::as_str)
        .filter(|t| !t.contains('=') && !t.starts_with("--"))
        .collect();
    let mut command = CommandEcho::new(raw, &name);
    let target = match head.as_str() {
        "search" => {
            if let Some(q) = bare.first() {
                command = command.arg("query", *q);
            }
            Target::new(NodeKind::Leaf.as_str(), "/", "")
        }
        "import" => {
            if let Some(file) = bare.first() {
                command = command.arg("file", *file);
            }
            Target::new(NodeKind::Collection.as_str(), "/", "")
        }
        _ => {
            let depth = match head.as_str() {
                "collection" => 1,
                "container" => 2,
                "category" => 3,
                _ => 4,
            };
            let segments: Vec<&str> = bare.iter().copied().take(depth).collect();
            for (key, value) in SEGMENT_KEYS.iter().zip(&segments) {
                command = command.arg(key, *value);
            }
            let node_type = match segments.len() {
                0 | 1 => NodeKind::Collection,
                2 => NodeKind::Container,
                3 => NodeKind::Category,
                _ => NodeKind::Leaf,
            };
            let path = build_path(&segments.iter().map(|s| Some(*s)).collect::<Vec<_>>());
            Target::new(node_type.as_str(), &path, segments.last().copied().unwrap_or_default())
        }
    };
    OpFrame::new(command, target).fail(code, err.to_string())
}
