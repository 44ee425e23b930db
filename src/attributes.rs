//! Attribute parser for partial invocation tags

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::scanner::{find_unescaped, unescape};

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\s(\w+)=(?:"([^"]*)"|'([^']*)')"#).expect("attribute pattern is valid")
});

/// The opening segment of a tag fragment, up to (not including) the first
/// unescaped `>`
pub fn opening_segment(fragment: &str) -> &str {
    match find_unescaped(fragment, '>') {
        Some(end) => &fragment[..end],
        None => fragment,
    }
}

/// Parse the `key="value"` pairs on a tag's opening segment.
///
/// Values are tried as JSON first so `count="3"` binds a number and
/// `items='["a","b"]'` binds a list; anything that is not valid JSON is kept
/// as text. Escape sequences are resolved first. Later duplicates win.
pub fn parse_attributes(fragment: &str) -> IndexMap<String, Value> {
    let segment = opening_segment(fragment);
    let mut attributes = IndexMap::new();
    for caps in ATTRIBUTE.captures_iter(segment) {
        let key = caps[1].to_string();
        let raw = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();
        attributes.insert(key, parse_value(raw));
    }
    attributes
}

fn parse_value(raw: &str) -> Value {
    let text = unescape(raw);
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}
