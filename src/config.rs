//! Configuration for the render pipeline

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// How malformed input is treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Unterminated regions and unknown partials are errors
    #[default]
    Strict,
    /// Unterminated regions stay as literal text and unknown partial tags
    /// stay in the output, each logged with a warning
    Lenient,
}

/// Configuration options for rendering
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub strictness: Strictness,

    /// Partial nesting bound, also the number of partial-pass rounds
    pub max_partial_depth: usize,

    /// Evaluator steps allowed per expression
    pub step_budget: u64,

    /// Nested function-call depth allowed inside one expression
    pub max_call_depth: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            strictness: Strictness::Strict,
            max_partial_depth: 64,
            step_budget: 1_000_000,
            max_call_depth: 256,
        }
    }
}

impl RenderConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    pub fn with_max_partial_depth(mut self, depth: usize) -> Self {
        self.max_partial_depth = depth;
        self
    }

    pub fn with_step_budget(mut self, steps: u64) -> Self {
        self.step_budget = steps;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strictness == Strictness::Strict
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string. Missing keys keep their defaults.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RenderConfig::default();
        assert_eq!(config.strictness, Strictness::Strict);
        assert_eq!(config.max_partial_depth, 64);
        assert_eq!(config.step_budget, 1_000_000);
        assert_eq!(config.max_call_depth, 256);
        assert!(config.is_strict());
    }

    #[test]
    fn test_builder() {
        let config = RenderConfig::new()
            .with_strictness(Strictness::Lenient)
            .with_max_partial_depth(8);
        assert!(!config.is_strict());
        assert_eq!(config.max_partial_depth, 8);
    }

    #[test]
    fn test_from_toml_partial_keys() {
        let config = RenderConfig::from_str(
            r#"
strictness = "lenient"
step_budget = 500
"#,
        )
        .unwrap();
        assert_eq!(config.strictness, Strictness::Lenient);
        assert_eq!(config.step_budget, 500);
        assert_eq!(config.max_call_depth, 256);
    }

    #[test]
    fn test_from_toml_rejects_unknown_strictness() {
        let err = RenderConfig::from_str(r#"strictness = "loose""#).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = RenderConfig::from_file(Path::new("/nonexistent/templater.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
