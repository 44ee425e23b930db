//! Templater - markup rendering with inline expressions and partials
//!
//! Renders a template by evaluating every `{expression}` region against a
//! variable context and then expanding every `<_name>...</_name>` partial
//! invocation from a registry of named partial bodies.
//!
//! # Example
//!
//! ```rust
//! use templater::{render, Context, PartialRegistry};
//!
//! let partials = PartialRegistry::new()
//!     .with_partial("greet", "<p>Hello {who}!</p>")
//!     .unwrap();
//! let context = Context::new().with("n", 2);
//!
//! let html = render(r#"{n + 1} <_greet who="Amy"></_greet>"#, &context, &partials).unwrap();
//! assert_eq!(html, "3 <p>Hello Amy!</p>");
//! ```

pub mod attributes;
pub mod config;
pub mod context;
pub mod error;
pub mod expr;
pub mod partial;
mod render;
pub mod scanner;

pub use config::{RenderConfig, Strictness};
pub use context::Context;
pub use error::{
    ConfigError, ContextError, ExprError, ExprErrorKind, Origin, RegionKind, RegistryError,
    RenderError,
};
pub use expr::evaluate;
pub use partial::{PartialRegistry, SharedRegistry};

use render::Renderer;

/// Render a template with default configuration
///
/// This is the main entry point for the library. The registry is only read;
/// hand each render a snapshot when partials are being reloaded concurrently
/// (see [`SharedRegistry::snapshot`]).
pub fn render(
    template: &str,
    context: &Context,
    partials: &PartialRegistry,
) -> Result<String, RenderError> {
    render_with_config(template, context, partials, &RenderConfig::default())
}

/// Render a template with custom configuration
///
/// # Example
///
/// ```rust
/// use templater::{render_with_config, Context, PartialRegistry, RenderConfig, Strictness};
///
/// let config = RenderConfig::new().with_strictness(Strictness::Lenient);
/// let html = render_with_config(
///     "<_missing></_missing>",
///     &Context::new(),
///     &PartialRegistry::new(),
///     &config,
/// )
/// .unwrap();
/// assert_eq!(html, "<_missing></_missing>");
/// ```
pub fn render_with_config(
    template: &str,
    context: &Context,
    partials: &PartialRegistry,
    config: &RenderConfig,
) -> Result<String, RenderError> {
    Renderer::new(partials, config).render(template, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_partials() -> PartialRegistry {
        PartialRegistry::new()
    }

    #[test]
    fn test_render_plain_markup() {
        let html = render("<p>hi</p>", &Context::new(), &no_partials()).unwrap();
        assert_eq!(html, "<p>hi</p>");
    }

    #[test]
    fn test_render_expression() {
        let html = render("<p>{1+1}</p>", &Context::new(), &no_partials()).unwrap();
        assert_eq!(html, "<p>2</p>");
    }

    #[test]
    fn test_render_context_variable() {
        let context = Context::new().with("name", "Amy");
        let html = render("Hello {name}", &context, &no_partials()).unwrap();
        assert_eq!(html, "Hello Amy");
    }

    #[test]
    fn test_render_escaped_braces() {
        let html = render(r"\{not code\}", &Context::new(), &no_partials()).unwrap();
        assert_eq!(html, "{not code}");
    }

    #[test]
    fn test_render_list_markup() {
        let context = Context::new().with("items", json!(["a", "b"]));
        let html = render(
            "{items.map(i => '<li>'+i+'</li>').join('')}",
            &context,
            &no_partials(),
        )
        .unwrap();
        assert_eq!(html, "<li>a</li><li>b</li>");
    }

    #[test]
    fn test_render_partial_with_contents() {
        let partials = PartialRegistry::new()
            .with_partial("card", "<div class=\"card\">{contents}</div>")
            .unwrap();
        let html = render("<_card>Hello</_card>", &Context::new(), &partials).unwrap();
        assert_eq!(html, "<div class=\"card\">Hello</div>");
    }

    #[test]
    fn test_render_unknown_partial_error() {
        let err = render("<_nope></_nope>", &Context::new(), &no_partials()).unwrap_err();
        assert_eq!(
            err,
            RenderError::unknown_partial("nope", 0, Origin::Template)
        );
    }

    #[test]
    fn test_render_unterminated_expression_error() {
        let err = render("a {b", &Context::new(), &no_partials()).unwrap_err();
        assert_eq!(
            err,
            RenderError::unterminated(RegionKind::Expression, 2, Origin::Template)
        );
    }

    #[test]
    fn test_render_expression_error() {
        let err = render("x {missing}", &Context::new(), &no_partials()).unwrap_err();
        assert!(matches!(err, RenderError::Expression { offset: 2, .. }));
        assert_eq!(
            err.to_string(),
            "template: cannot evaluate {missing} at offset 2: missing is not defined"
        );
    }
}
