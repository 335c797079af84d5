//! Substring search over leaf names and summaries.

use super::{OpCtx, Outcome, rows};
use crate::core::envelope::{Code, CommandEcho, Envelope, OpFrame, Target};
use crate::core::model::{LeafRow, normalize_tags};
use serde_json::{Value as JsonValue, json};

/// Case-insensitive match on name or summary.
pub fn matches_query(row: &LeafRow, needle_lower: &str) -> bool {
    row.name.to_lowercase().contains(needle_lower)
        || row
            .summary
            .as_deref()
            .is_some_and(|s| s.to_lowercase().contains(needle_lower))
}

/// Non-empty intersection with `tags_any`; an empty filter accepts everything.
pub fn matches_tags(row: &LeafRow, tags_any: &[String]) -> bool {
    tags_any.is_empty() || row.tags.iter().any(|t| tags_any.contains(t))
}

fn hit(row: &LeafRow) -> JsonValue {
    json!({
        "name": row.name,
        "path": row.path().to_string(),
        "collection": row.collection,
        "container": row.container,
        "category": row.category,
        "summary": row.summary,
        "tags": row.tags,
    })
}

/// Search live leaves of the caller, optionally within one collection and
/// narrowed to leaves carrying at least one of `tags_any`. Hits are sorted
/// by path.
pub fn search(ctx: &OpCtx<'_>, query: &str, scope: Option<&str>, tags_any: &[String]) -> Envelope {
    let tags_any = normalize_tags(tags_any.iter().cloned());
    let command = CommandEcho::new(ctx.raw, "search")
        .arg("query", query)
        .arg("collection", scope)
        .arg("tags", tags_any.clone());
    let target = match scope {
        Some(c) => Target::new("collection", &format!("/{}", c), c),
        None => Target::new("leaf", "/", ""),
    };
    let frame = OpFrame::new(command, target);

    ctx.run(frame, |conn, owner| {
        let needle = query.to_lowercase();
        let mut found: Vec<LeafRow> = rows::scan_leaves(conn, owner, scope)?
            .into_iter()
            .filter(|row| matches_query(row, &needle) && matches_tags(row, &tags_any))
            .collect();
        found.sort_by_key(|row| row.path().to_string());
        let matches: Vec<JsonValue> = found.iter().map(hit).collect();
        Ok(Outcome::new(
            Code::List,
            format!("Found {} matches for '{}'.", matches.len(), query),
            json!({ "query": query, "matches": matches }),
        ))
    })
}
