//! Best-effort recovery of a JSON value embedded in model output.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Upper bound on trailing-character trims tried per candidate.
pub const MAX_TRIM_ATTEMPTS: usize = 4000;

static OPENING_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^```[a-zA-Z0-9_-]*\s*").expect("opening fence pattern is valid")
});

static CLOSING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*```$").expect("closing fence pattern is valid"));

/// A bare `null` carries nothing and counts as no JSON.
fn parse(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok().filter(|value: &Value| !value.is_null())
}

/// Extract a JSON value from text that may wrap it in fences or prose.
///
/// Tries, in order: the whole text with any enclosing code fence removed;
/// then, starting at the earliest `{` or `[`, the longest prefix that parses,
/// shrinking one trailing character at a time for at most
/// [`MAX_TRIM_ATTEMPTS`] attempts. Leading prose before the bracket is
/// skipped; trailing prose is trimmed away.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let unfenced;
    let body = if trimmed.starts_with("```") {
        let without_open = OPENING_FENCE.replace(trimmed, "");
        unfenced = CLOSING_FENCE.replace(&without_open, "").trim().to_string();
        unfenced.as_str()
    } else {
        trimmed
    };

    if let Some(value) = parse(body) {
        return Some(value);
    }

    let start = match (body.find('{'), body.find('[')) {
        (Some(obj), Some(arr)) => obj.min(arr),
        (Some(obj), None) => obj,
        (None, Some(arr)) => arr,
        (None, None) => return None,
    };
    let candidate = body[start..].trim();

    let ends = std::iter::once(candidate.len())
        .chain(candidate.char_indices().rev().map(|(idx, _)| idx))
        .take(MAX_TRIM_ATTEMPTS);

    for end in ends {
        let chunk = candidate[..end].trim();
        if chunk.is_empty() {
            break;
        }
        if let Some(value) = parse(chunk) {
            return Some(value);
        }
    }

    None
}
