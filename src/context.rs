//! Variable context for expressions and partial bodies

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ContextError;

/// Ordered mapping from variable name to a JSON value.
///
/// Keys are case-sensitive. Nesting levels are built with [`Context::merged`]
/// so the innermost binding wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(IndexMap<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// A new context holding `self` overlaid with `other`; keys of `other` win
    pub fn merged(&self, other: &Context) -> Context {
        let mut merged = self.clone();
        merged.extend(other.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Order-independent digest of the bindings, used to recognise re-entry
    /// with identical bindings. Equal contexts have equal digests.
    pub(crate) fn digest(&self) -> u64 {
        self.0
            .iter()
            .fold(0, |acc, (key, value)| acc.wrapping_add(entry_digest(key, value)))
    }

    /// Digest of `self.merged(overlay)` from `digest`, the digest of `self`.
    /// Only the overlay's keys are visited.
    pub(crate) fn merged_digest(&self, digest: u64, overlay: &Context) -> u64 {
        overlay.iter().fold(digest, |acc, (key, value)| {
            let acc = match self.get(key) {
                Some(old) => acc.wrapping_sub(entry_digest(key, old)),
                None => acc,
            };
            acc.wrapping_add(entry_digest(key, value))
        })
    }
}

fn entry_digest(key: &str, value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    // JSON text goes straight into the hasher
    let _ = serde_json::to_writer(HashWriter(&mut hasher), value);
    hasher.finish()
}

struct HashWriter<'a>(&'a mut DefaultHasher);

impl io::Write for HashWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Extend<(String, Value)> for Context {
    fn extend<T: IntoIterator<Item = (String, Value)>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<IndexMap<String, Value>> for Context {
    fn from(map: IndexMap<String, Value>) -> Self {
        Self(map)
    }
}

impl From<serde_json::Map<String, Value>> for Context {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

impl TryFrom<Value> for Context {
    type Error = ContextError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(map.into()),
            other => Err(ContextError::NotAnObject {
                found: json_type_name(&other),
            }),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
