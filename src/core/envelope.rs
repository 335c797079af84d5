//! Uniform result envelope.
//!
//! Every vault operation and every DSL command answers with an [`Envelope`].
//! Construction goes through [`make_result`] (or an [`OpFrame`], which calls it)
//! so there is exactly one place where the response shape is decided.
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "status": "ok",
//!   "code": "CREATED",
//!   "message": "Collection created.",
//!   "command": {"raw": "...", "name": "collection.create", "args": {...}},
//!   "target": {"type": "collection", "path": "/Crown Vault", "name": "Crown Vault"},
//!   "result": {...},
//!   "diff": {"applied": true, "changes": [...]},
//!   "meta": {"ts": "2026-01-01T00:00:00.000Z", "duration_ms": 0.42}
//! }
//! ```

use crate::core::time;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::time::Instant;

pub const ENVELOPE_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
    Skipped,
}

/// Machine-readable outcome code. Error codes always start with `ERROR_`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Code {
    Created,
    Updated,
    Renamed,
    DeletedHard,
    List,
    Read,
    Ensured,
    Moved,
    Copied,
    Noop,
    Batch,
    ErrorValidation,
    ErrorNotFound,
    ErrorConflict,
    ErrorUnsafe,
    ErrorParse,
    ErrorInternal,
}

impl Code {
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Code::ErrorValidation
                | Code::ErrorNotFound
                | Code::ErrorConflict
                | Code::ErrorUnsafe
                | Code::ErrorParse
                | Code::ErrorInternal
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Code::Created => "CREATED",
            Code::Updated => "UPDATED",
            Code::Renamed => "RENAMED",
            Code::DeletedHard => "DELETED_HARD",
            Code::List => "LIST",
            Code::Read => "READ",
            Code::Ensured => "ENSURED",
            Code::Moved => "MOVED",
            Code::Copied => "COPIED",
            Code::Noop => "NOOP",
            Code::Batch => "BATCH",
            Code::ErrorValidation => "ERROR_VALIDATION",
            Code::ErrorNotFound => "ERROR_NOT_FOUND",
            Code::ErrorConflict => "ERROR_CONFLICT",
            Code::ErrorUnsafe => "ERROR_UNSAFE",
            Code::ErrorParse => "ERROR_PARSE",
            Code::ErrorInternal => "ERROR_INTERNAL",
        }
    }
}

/// Echo of the issued command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandEcho {
    pub raw: String,
    pub name: String,
    pub args: Map<String, JsonValue>,
}

impl CommandEcho {
    pub fn new(raw: &str, name: &str) -> Self {
        Self {
            raw: raw.to_string(),
            name: name.to_string(),
            args: Map::new(),
        }
    }

    pub fn arg(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.args.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(rename = "type")]
    pub node_type: String,
    pub path: String,
    pub name: String,
}

impl Target {
    pub fn new(node_type: &str, path: &str, name: &str) -> Self {
        Self {
            node_type: node_type.to_string(),
            path: path.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Add,
    Update,
    Remove,
}

/// One entry of a diff. `path` is the parent path of the changed node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub op: ChangeOp,
    pub path: String,
    pub node_type: String,
    pub name: String,
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Change {
    pub fn add(parent: &str, node_type: &str, name: &str) -> Self {
        Self {
            op: ChangeOp::Add,
            path: parent.to_string(),
            node_type: node_type.to_string(),
            name: name.to_string(),
            from: None,
            to: Some(name.to_string()),
            field: None,
        }
    }

    pub fn remove(parent: &str, node_type: &str, name: &str) -> Self {
        Self {
            op: ChangeOp::Remove,
            path: parent.to_string(),
            node_type: node_type.to_string(),
            name: name.to_string(),
            from: Some(name.to_string()),
            to: None,
            field: None,
        }
    }

    pub fn rename(parent: &str, node_type: &str, from: &str, to: &str) -> Self {
        Self {
            op: ChangeOp::Update,
            path: parent.to_string(),
            node_type: node_type.to_string(),
            name: to.to_string(),
            from: Some(from.to_string()),
            to: Some(to.to_string()),
            field: Some("name".to_string()),
        }
    }

    pub fn field(parent: &str, node_type: &str, name: &str, field: &str) -> Self {
        Self {
            op: ChangeOp::Update,
            path: parent.to_string(),
            node_type: node_type.to_string(),
            name: name.to_string(),
            from: None,
            to: None,
            field: Some(field.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub applied: bool,
    pub changes: Vec<Change>,
}

impl Diff {
    pub fn applied(changes: Vec<Change>) -> Self {
        Self {
            applied: true,
            changes,
        }
    }

    pub fn none() -> Self {
        Self {
            applied: false,
            changes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub warnings: Vec<String>,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub ts: String,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: String,
    pub status: Status,
    pub code: Code,
    pub message: String,
    pub command: CommandEcho,
    pub target: Target,
    pub result: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<Diff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
    pub meta: Meta,
}

impl Envelope {
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }

    /// Look up a top-level key of the result payload.
    pub fn result_field(&self, key: &str) -> Option<&JsonValue> {
        self.result.get(key)
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }

    /// Append warnings, creating the diagnostics block on demand.
    pub fn push_warnings<I: IntoIterator<Item = String>>(&mut self, warnings: I) {
        let mut incoming = warnings.into_iter().peekable();
        if incoming.peek().is_none() {
            return;
        }
        self.diagnostics
            .get_or_insert_with(Diagnostics::default)
            .warnings
            .extend(incoming);
    }
}

/// Everything an envelope is made of, minus the timing metadata.
#[derive(Debug, Clone)]
pub struct ResultParts {
    pub status: Status,
    pub code: Code,
    pub message: String,
    pub command: CommandEcho,
    pub target: Target,
    pub result: Option<JsonValue>,
    pub diff: Option<Diff>,
    pub diagnostics: Option<Diagnostics>,
}

/// Build an envelope. The only constructor of [`Envelope`] in the crate.
pub fn make_result(parts: ResultParts, started: Instant) -> Envelope {
    let result = match parts.result {
        Some(JsonValue::Null) | None => JsonValue::Object(Map::new()),
        Some(value) => value,
    };
    Envelope {
        version: ENVELOPE_VERSION.to_string(),
        status: parts.status,
        code: parts.code,
        message: parts.message,
        command: parts.command,
        target: parts.target,
        result,
        diff: parts.diff,
        diagnostics: parts.diagnostics,
        meta: Meta {
            ts: time::now_iso(),
            duration_ms: time::elapsed_ms(started),
        },
    }
}

/// Per-operation scaffolding: remembers the command echo, the target and
/// the start instant so each exit path is a single call.
#[derive(Debug, Clone)]
pub struct OpFrame {
    pub command: CommandEcho,
    pub target: Target,
    pub started: Instant,
}

impl OpFrame {
    pub fn new(command: CommandEcho, target: Target) -> Self {
        Self {
            command,
            target,
            started: Instant::now(),
        }
    }

    /// Re-point the target, e.g. after a rename changed the node's path.
    pub fn retarget(&mut self, target: Target) {
        self.target = target;
    }

    pub fn ok(
        &self,
        code: Code,
        message: impl Into<String>,
        result: JsonValue,
        diff: Option<Diff>,
    ) -> Envelope {
        make_result(
            ResultParts {
                status: Status::Ok,
                code,
                message: message.into(),
                command: self.command.clone(),
                target: self.target.clone(),
                result: Some(result),
                diff,
                diagnostics: None,
            },
            self.started,
        )
    }

    pub fn fail(&self, code: Code, message: impl Into<String>) -> Envelope {
        self.fail_with(code, message, JsonValue::Null)
    }

    pub fn fail_with(&self, code: Code, message: impl Into<String>, result: JsonValue) -> Envelope {
        let message = message.into();
        make_result(
            ResultParts {
                status: Status::Error,
                code,
                message: message.clone(),
                command: self.command.clone(),
                target: self.target.clone(),
                result: Some(result),
                diff: None,
                diagnostics: Some(Diagnostics {
                    warnings: Vec::new(),
                    logs: vec![format!("Error: {message}")],
                }),
            },
            self.started,
        )
    }
}

/// Per-run totals of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub lines_total: usize,
    pub ok: usize,
    pub error: usize,
    pub skipped: usize,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMeta {
    pub ts: String,
}

/// Envelope returned by the batch runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEnvelope {
    pub version: String,
    pub status: Status,
    pub code: Code,
    pub file: String,
    pub summary: BatchSummary,
    pub results: Vec<Envelope>,
    pub meta: BatchMeta,
}

pub fn make_batch(file: &str, mut summary: BatchSummary, results: Vec<Envelope>, started: Instant) -> BatchEnvelope {
    summary.duration_ms = time::elapsed_ms(started);
    BatchEnvelope {
        version: ENVELOPE_VERSION.to_string(),
        status: if summary.error == 0 {
            Status::Ok
        } else {
            Status::Error
        },
        code: Code::Batch,
        file: file.to_string(),
        summary,
        results,
        meta: BatchMeta { ts: time::now_iso() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame() -> OpFrame {
        OpFrame::new(
            CommandEcho::new("collection create Keep", "collection.create").arg("name", "Keep"),
            Target::new("collection", "/Keep", "Keep"),
        )
    }

    #[test]
    fn test_ok_envelope_shape() {
        let env = frame().ok(
            Code::Created,
            "Collection created.",
            json!({"collection": {"name": "Keep"}}),
            Some(Diff::applied(vec![Change::add("/", "collection", "Keep")])),
        );
        let v = env.to_json();
        assert_eq!(v["version"], "1.0");
        assert_eq!(v["status"], "ok");
        assert_eq!(v["code"], "CREATED");
        assert_eq!(v["command"]["name"], "collection.create");
        assert_eq!(v["command"]["args"]["name"], "Keep");
        assert_eq!(v["target"]["type"], "collection");
        assert_eq!(v["diff"]["changes"][0]["op"], "add");
        assert_eq!(v["diff"]["changes"][0]["from"], JsonValue::Null);
        assert!(v["meta"]["ts"].as_str().unwrap().ends_with('Z'));
        assert!(v["meta"]["duration_ms"].as_f64().unwrap() >= 0.0);
        assert!(v.get("diagnostics").is_none());
    }

    #[test]
    fn test_error_envelope_has_object_result_and_logs() {
        let env = frame().fail(Code::ErrorNotFound, "No collection 'Keep'.");
        let v = env.to_json();
        assert_eq!(v["status"], "error");
        assert_eq!(v["code"], "ERROR_NOT_FOUND");
        assert!(v["result"].is_object());
        assert!(v.get("diff").is_none());
        assert_eq!(v["diagnostics"]["logs"][0], "Error: No collection 'Keep'.");
    }

    #[test]
    fn test_error_codes_are_prefixed() {
        for code in [
            Code::ErrorValidation,
            Code::ErrorNotFound,
            Code::ErrorConflict,
            Code::ErrorUnsafe,
            Code::ErrorParse,
            Code::ErrorInternal,
        ] {
            assert!(code.is_error());
            assert!(code.as_str().starts_with("ERROR_"));
            assert_eq!(serde_json::to_value(code).unwrap(), code.as_str());
        }
        assert_eq!(serde_json::to_value(Code::DeletedHard).unwrap(), "DELETED_HARD");
        assert!(!Code::Noop.is_error());
    }

    #[test]
    fn test_push_warnings_only_when_present() {
        let mut env = frame().ok(Code::Read, "ok", json!({}), None);
        env.push_warnings(Vec::new());
        assert!(env.diagnostics.is_none());
        env.push_warnings(vec!["dropped token 'x'".to_string()]);
        assert_eq!(env.diagnostics.unwrap().warnings.len(), 1);
    }

    #[test]
    fn test_batch_status_follows_error_count() {
        let ok = make_batch("a.dsl", BatchSummary::default(), Vec::new(), Instant::now());
        assert_eq!(ok.status, Status::Ok);
        let failed = make_batch(
            "a.dsl",
            BatchSummary {
                error: 1,
                ..Default::default()
            },
            Vec::new(),
            Instant::now(),
        );
        assert_eq!(failed.status, Status::Error);
        assert_eq!(serde_json::to_value(&failed).unwrap()["code"], "BATCH");
    }
}
