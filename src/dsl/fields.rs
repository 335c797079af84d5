//! Value, tag, metadata and `key=value` argument parsing.

use crate::core::value::{MetaMap, MetaValue};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

const QUOTES: [char; 2] = ['"', '\''];

/// Interpret a loose scalar: boolean words, null words, then JSON, else the
/// trimmed text itself.
pub fn parse_value(raw: &str) -> MetaValue {
    let text = raw.trim();
    match text.to_lowercase().as_str() {
        "true" | "yes" | "on" => return MetaValue::Bool(true),
        "false" | "no" | "off" => return MetaValue::Bool(false),
        "none" | "null" => return MetaValue::Null,
        _ => {}
    }
    match serde_json::from_str::<JsonValue>(text) {
        Ok(value) => MetaValue::from(value),
        Err(_) => MetaValue::String(text.to_string()),
    }
}

/// Comma-separated tag list; blanks dropped.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Comma-separated `key=value` pairs, each value through [`parse_value`].
/// Pieces without `=` or with an empty key are skipped.
pub fn parse_metadata(raw: &str) -> MetaMap {
    let mut map = MetaMap::new();
    for pair in raw.split(',') {
        if let Some((key, value)) = pair.split_once('=') {
            let key = key.trim();
            if !key.is_empty() {
                map.insert(key.to_string(), parse_value(value));
            }
        }
    }
    map
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches(&QUOTES[..])
}

/// Field arguments of a create/update line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFields {
    /// `summary`, `notes`, `tags`, `metadata`, or any other key as given
    pub fields: Map<String, JsonValue>,
    /// Bare tokens that were not assigned to a field
    pub dropped: Vec<String>,
}

impl ParsedFields {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// One warning line per discarded token.
    pub fn warnings(&self) -> Vec<String> {
        self.dropped
            .iter()
            .map(|t| format!("Ignored argument '{}': bare values must come before key=value fields.", t))
            .collect()
    }
}

/// Resolve field tokens.
///
/// `tags=a,b` becomes a list, `meta=k=v,k2=v2` (or `metadata=`) a map merged
/// across repeats, `summary=` and `notes=` stay text. Any other key is run
/// through [`parse_value`]. Bare tokens seen before the first assignment
/// fill `summary` then `notes`; bare tokens after it are not assigned and are
/// listed in [`ParsedFields::dropped`].
pub fn parse_field_args<S: AsRef<str>>(tokens: &[S]) -> ParsedFields {
    let mut parsed = ParsedFields::default();
    let mut seen_assignment = false;
    let mut metadata = MetaMap::new();
    let mut has_metadata = false;

    for token in tokens {
        let token = token.as_ref();
        let Some((key, value)) = token.split_once('=') else {
            if seen_assignment {
                parsed.dropped.push(token.to_string());
            } else if !parsed.fields.contains_key("summary") {
                parsed.fields.insert("summary".into(), JsonValue::String(token.to_string()));
            } else if !parsed.fields.contains_key("notes") {
                parsed.fields.insert("notes".into(), JsonValue::String(token.to_string()));
            } else {
                parsed.dropped.push(token.to_string());
            }
            continue;
        };
        seen_assignment = true;
        let key = key.trim().to_lowercase();
        let value = unquote(value);
        match key.as_str() {
            "tags" => {
                let tags = parse_tags(value).into_iter().map(JsonValue::String).collect();
                parsed.fields.insert("tags".into(), JsonValue::Array(tags));
            }
            "meta" | "metadata" => {
                metadata.extend(parse_metadata(value));
                has_metadata = true;
            }
            "summary" | "name" => {
                parsed.fields.insert(key.clone(), JsonValue::String(value.to_string()));
            }
            "notes" | "notes_md" => {
                parsed.fields.insert("notes".into(), JsonValue::String(value.to_string()));
            }
            "" => parsed.dropped.push(token.to_string()),
            other => {
                parsed.fields.insert(other.to_string(), parse_value(value).into());
            }
        }
    }

    if has_metadata {
        let map: Map<String, JsonValue> = metadata.into_iter().map(|(k, v)| (k, v.into())).collect();
        parsed.fields.insert("metadata".into(), JsonValue::Object(map));
    }
    parsed
}

/// Named options of a non-field command (`token=`, `collection=`, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    pub values: BTreeMap<String, String>,
    pub ignored: Vec<String>,
}

impl Options {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn warnings(&self) -> Vec<String> {
        self.ignored
            .iter()
            .map(|t| format!("Ignored argument '{}'.", t))
            .collect()
    }
}

/// Pick `key=value` options named in `allowed`; everything else is ignored
/// and reported.
pub fn parse_options<S: AsRef<str>>(tokens: &[S], allowed: &[&str]) -> Options {
    let mut options = Options::default();
    for token in tokens {
        let token = token.as_ref();
        match token.split_once('=') {
            Some((key, value)) if allowed.contains(&key.trim().to_lowercase().as_str()) => {
                options
                    .values
                    .insert(key.trim().to_lowercase(), unquote(value).to_string());
            }
            _ => options.ignored.push(token.to_string()),
        }
    }
    options
}

/// Flags recognised on any line, with their `--` spellings.
pub const FLAGS: [(&str, &str); 2] = [("exists_ok", "--exists-ok"), ("overwrite", "--overwrite")];

/// Remove flag tokens from `tokens`, returning which flags were present.
///
/// Only the exact lowercase spellings are flags; `Overwrite` stays a name.
pub fn take_flags(tokens: Vec<String>) -> (Vec<String>, Flags) {
    let mut flags = Flags::default();
    let rest = tokens
        .into_iter()
        .filter(|t| {
            let t = t.as_str();
            if t == FLAGS[0].0 || t == FLAGS[0].1 {
                flags.exists_ok = true;
                false
            } else if t == FLAGS[1].0 || t == FLAGS[1].1 {
                flags.overwrite = true;
                false
            } else {
                true
            }
        })
        .collect();
    (rest, flags)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub exists_ok: bool,
    pub overwrite: bool,
}
