//! Partial registry for storing named partial bodies

use std::sync::{Arc, RwLock};

use indexmap::IndexMap;

use crate::error::RegistryError;

/// Named partial templates in registration order.
///
/// Names are stored without the `_` tag prefix: the body registered as
/// `card` is invoked with `<_card>...</_card>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialRegistry {
    partials: IndexMap<String, String>,
}

/// Partial names start with a letter, then letters, digits, `_` or `-`
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn validate(name: &str) -> Result<(), RegistryError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(RegistryError::InvalidName {
            name: name.to_string(),
        })
    }
}

impl PartialRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a partial body under a new name
    pub fn register(
        &mut self,
        name: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        validate(&name)?;
        if self.partials.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }
        self.partials.insert(name, body.into());
        Ok(())
    }

    /// Register or replace a partial, keeping its position when it already
    /// exists. Returns the previous body.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<Option<String>, RegistryError> {
        let name = name.into();
        validate(&name)?;
        Ok(self.partials.insert(name, body.into()))
    }

    /// Builder-style [`PartialRegistry::register`]
    pub fn with_partial(
        mut self,
        name: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<Self, RegistryError> {
        self.register(name, body)?;
        Ok(self)
    }

    /// Remove a partial, keeping the order of the rest
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.partials.shift_remove(name)
    }

    /// Get a partial body by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.partials.get(name).map(String::as_str)
    }

    /// Check if a partial exists
    pub fn contains(&self, name: &str) -> bool {
        self.partials.contains_key(name)
    }

    /// Partial names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.partials.keys().map(String::as_str)
    }

    /// `(name, body)` pairs in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.partials.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.partials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partials.is_empty()
    }
}

/// Shared, refreshable handle on a [`PartialRegistry`].
///
/// Renders work on an immutable [`snapshot`](SharedRegistry::snapshot), so
/// an [`update`](SharedRegistry::update) issued while pages are rendering
/// never changes the registry under a render in flight. Updates copy the
/// registry only when a snapshot is still alive.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry {
    inner: Arc<RwLock<Arc<PartialRegistry>>>,
}

impl SharedRegistry {
    pub fn new(registry: PartialRegistry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(registry))),
        }
    }

    /// The current registry contents
    pub fn snapshot(&self) -> Arc<PartialRegistry> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Modify the registry for all future snapshots
    pub fn update<T>(&self, f: impl FnOnce(&mut PartialRegistry) -> T) -> T {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(Arc::make_mut(&mut guard))
    }

    /// Swap in a whole new registry
    pub fn replace(&self, registry: PartialRegistry) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(registry);
    }
}

impl From<PartialRegistry> for SharedRegistry {
    fn from(registry: PartialRegistry) -> Self {
        Self::new(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let mut registry = PartialRegistry::new();
        registry.register("card", "<div>{contents}</div>").unwrap();
        assert_eq!(registry.get("card"), Some("<div>{contents}</div>"));
        assert!(registry.contains("card"));
        assert_eq!(registry.get("missing"), None);
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = PartialRegistry::new();
        registry.register("card", "a").unwrap();
        let err = registry.register("card", "b").unwrap_err();
        assert_eq!(
            err,
            RegistryError::Duplicate {
                name: "card".to_string()
            }
        );
        assert_eq!(registry.get("card"), Some("a"));
    }

    #[test]
    fn test_invalid_names() {
        assert!(is_valid_name("nav-bar_2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("_card"));
        assert!(!is_valid_name("2col"));
        assert!(!is_valid_name("a b"));
        let err = PartialRegistry::new().register("a b", "").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidName { .. }));
    }

    #[test]
    fn test_registration_order_survives_replace_and_remove() {
        let mut registry = PartialRegistry::new()
            .with_partial("a", "1")
            .and_then(|r| r.with_partial("b", "2"))
            .and_then(|r| r.with_partial("c", "3"))
            .unwrap();
        assert_eq!(registry.insert("a", "1'").unwrap(), Some("1".to_string()));
        registry.remove("b");
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(registry.get("a"), Some("1'"));
    }

    #[test]
    fn test_snapshot_is_isolated_from_updates() {
        let shared = SharedRegistry::new(PartialRegistry::new().with_partial("a", "old").unwrap());
        let before = shared.snapshot();
        shared.update(|r| r.insert("a", "new")).unwrap();
        assert_eq!(before.get("a"), Some("old"));
        assert_eq!(shared.snapshot().get("a"), Some("new"));

        shared.replace(PartialRegistry::new());
        assert!(shared.snapshot().is_empty());
        assert_eq!(before.len(), 1);
    }
}
