//! Parsing of language-model analysis output
//!
//! The model is asked for JSON. Models do not always comply, so the legacy
//! line formats (`query:<text>` and `category:<C>, query:<text>`) are accepted
//! as a fallback.

use super::AdapterError;
use crate::pipeline::SubQuery;
use crate::routing::strip_quotes;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawItem {
    Text(String),
    Object {
        #[serde(alias = "text", alias = "sub_query", alias = "subquery")]
        query: String,
        #[serde(default, alias = "label", alias = "class")]
        category: Option<String>,
    },
}

fn category_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bcategory\s*:").unwrap())
}

fn query_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bquery\s*:").unwrap())
}

fn list_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+").unwrap())
}

/// Parse combined decomposition+classification output into sub-queries
pub fn parse_classified(output: &str) -> Result<Vec<SubQuery>, AdapterError> {
    let body = strip_code_fences(output);

    if let Some(items) = parse_json_items(body) {
        if items.is_empty() {
            return Err(AdapterError::Empty);
        }
        return Ok(items
            .into_iter()
            .map(|item| match item {
                RawItem::Text(text) => SubQuery::new(text.trim(), ""),
                RawItem::Object { query, category } => SubQuery::new(
                    query.trim(),
                    category.as_deref().map(strip_quotes).unwrap_or_default(),
                ),
            })
            .collect());
    }

    let mut sub_queries = Vec::new();
    for line in body.lines().map(strip_list_prefix) {
        let has_marker = category_marker().is_match(line) || query_marker().is_match(line);
        if !has_marker {
            continue;
        }
        // Keep malformed lines as uncategorized so they surface as per-item errors
        let sub_query =
            parse_classified_line(line).unwrap_or_else(|_| SubQuery::new(line.trim(), ""));
        sub_queries.push(sub_query);
    }

    if sub_queries.is_empty() {
        return Err(AdapterError::Unparseable(preview(output)));
    }
    Ok(sub_queries)
}

/// Parse one `category:<C>, query:<text>` line (either marker order)
pub fn parse_classified_line(line: &str) -> Result<SubQuery, String> {
    let category_at = category_marker().find(line);
    let query_at = query_marker().find(line);

    let (Some(category_at), Some(query_at)) = (category_at, query_at) else {
        return Err(format!("missing category or query marker in '{}'", line.trim()));
    };

    let (category, query) = if category_at.start() < query_at.start() {
        (
            &line[category_at.end()..query_at.start()],
            &line[query_at.end()..],
        )
    } else {
        (
            &line[category_at.end()..],
            &line[query_at.end()..category_at.start()],
        )
    };

    let category = strip_quotes(category.split(',').next().unwrap_or_default());
    let query = strip_quotes(query.trim().trim_end_matches(',').trim());
    if category.is_empty() {
        return Err(format!("empty category in '{}'", line.trim()));
    }
    Ok(SubQuery::new(query, category))
}

/// Parse decomposition-only output into sub-query texts
pub fn parse_queries(output: &str) -> Result<Vec<String>, AdapterError> {
    let body = strip_code_fences(output);

    if let Some(items) = parse_json_items(body) {
        let texts: Vec<String> = items
            .into_iter()
            .map(|item| match item {
                RawItem::Text(text) => text,
                RawItem::Object { query, .. } => query,
            })
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        return if texts.is_empty() {
            Err(AdapterError::Empty)
        } else {
            Ok(texts)
        };
    }

    let texts: Vec<String> = body
        .lines()
        .map(strip_list_prefix)
        .filter_map(|line| {
            let m = query_marker().find(line)?;
            (m.start() == 0).then(|| strip_quotes(&line[m.end()..]).to_string())
        })
        .filter(|t| !t.is_empty())
        .collect();

    if texts.is_empty() {
        return Err(AdapterError::Unparseable(preview(output)));
    }
    Ok(texts)
}

fn strip_list_prefix(line: &str) -> &str {
    match list_prefix().find(line) {
        Some(m) => &line[m.end()..],
        None => line.trim_start(),
    }
}

/// Remove a surrounding markdown code fence, if any
fn strip_code_fences(output: &str) -> &str {
    let trimmed = output.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after_open = &trimmed[start + 3..];
    // Skip the info string (e.g. "json") on the opening fence line
    let content = match after_open.find('\n') {
        Some(nl) => &after_open[nl + 1..],
        None => after_open,
    };
    match content.rfind("```") {
        Some(end) => content[..end].trim(),
        None => content.trim(),
    }
}

/// Parse a JSON array of items, also accepting `{"sub_queries": [...]}`
/// wrappers and prose around the array
fn parse_json_items(body: &str) -> Option<Vec<RawItem>> {
    let value: serde_json::Value = serde_json::from_str(body).ok().or_else(|| {
        let start = body.find('[')?;
        let end = body.rfind(']')?;
        (start < end)
            .then(|| serde_json::from_str(&body[start..=end]).ok())
            .flatten()
    })?;

    let array = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(map) => map.into_iter().find_map(|(_, v)| v.is_array().then_some(v))?,
        _ => return None,
    };
    serde_json::from_value(array).ok()
}

fn preview(output: &str) -> String {
    const MAX: usize = 200;
    let trimmed = output.trim();
    if trimmed.chars().count() > MAX {
        format!("{}...", trimmed.chars().take(MAX).collect::<String>())
    } else {
        trimmed.to_string()
    }
}
