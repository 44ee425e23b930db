//! Render orchestration: the expression pass followed by the partial pass
//!
//! Partial bodies are rendered through the same two passes, so partials can
//! invoke partials to any depth. Escape sequences survive every nested
//! render and are resolved once by [`Renderer::render`]; evaluated values
//! are spliced with their backslashes doubled so that resolution leaves
//! them intact.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::config::RenderConfig;
use crate::context::Context;
use crate::error::{Origin, RegionKind, RenderError};
use crate::expr::{evaluate_in, EvalLimits, Globals};
use crate::partial::expander::expand;
use crate::partial::PartialRegistry;
use crate::scanner::{escape_text, partial_invocations, scan_brackets, unescape, Span};

/// One replacement made by a pass: `output` in the rewritten text took the
/// place of `source` in the text before it
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Splice {
    pub source: Span,
    pub output: Span,
}

/// Maps offsets in rewritten markup back to the text a render started from.
///
/// Each pass that rewrites the markup adds a layer of splices, in order of
/// appearance. An offset inside replaced text maps to the start of what it
/// replaced.
#[derive(Debug, Default)]
pub(crate) struct SourceMap {
    layers: Vec<Vec<Splice>>,
}

impl SourceMap {
    pub fn push(&mut self, layer: Vec<Splice>) {
        if !layer.is_empty() {
            self.layers.push(layer);
        }
    }

    pub fn to_source(&self, offset: usize) -> usize {
        self.layers
            .iter()
            .rev()
            .fold(offset, |offset, layer| map_through(layer, offset))
    }
}

fn map_through(layer: &[Splice], offset: usize) -> usize {
    let mut mapped = offset;
    for splice in layer {
        if offset < splice.output.start {
            break;
        }
        if offset < splice.output.end {
            return splice.source.start;
        }
        mapped = offset - splice.output.end + splice.source.end;
    }
    mapped
}

/// What a text is rendered against
pub(crate) struct Scope<'a> {
    pub context: &'a Context,
    /// [`Context::digest`] of `context`
    pub digest: u64,
    pub origin: &'a Origin,
}

/// State of one top-level render call
pub(crate) struct Renderer<'r> {
    registry: &'r PartialRegistry,
    config: &'r RenderConfig,
    limits: EvalLimits,
    /// Partials being rendered, outermost first, with their context digests
    stack: Vec<(String, u64)>,
}

impl<'r> Renderer<'r> {
    pub fn new(registry: &'r PartialRegistry, config: &'r RenderConfig) -> Self {
        Self {
            registry,
            config,
            limits: EvalLimits::from(config),
            stack: Vec::new(),
        }
    }

    /// Render a root template and resolve its escape sequences
    pub fn render(&mut self, template: &str, context: &Context) -> Result<String, RenderError> {
        debug!(
            bytes = template.len(),
            variables = context.len(),
            partials = self.registry.len(),
            "rendering template"
        );
        let scope = Scope {
            context,
            digest: context.digest(),
            origin: &Origin::Template,
        };
        let rendered = self.render_in(template, &scope)?;
        Ok(unescape(&rendered))
    }

    fn render_in(&mut self, text: &str, scope: &Scope<'_>) -> Result<String, RenderError> {
        let (evaluated, splices) = self.expression_pass(text, scope)?;
        let mut map = SourceMap::default();
        map.push(splices);
        self.partial_pass(evaluated, map, scope)
    }

    /// Replace every top-level `{...}` region with its evaluated text
    fn expression_pass(
        &mut self,
        text: &str,
        scope: &Scope<'_>,
    ) -> Result<(String, Vec<Splice>), RenderError> {
        let scan = scan_brackets(text, '{', '}');
        if let Some(offset) = scan.unterminated {
            self.unterminated(RegionKind::Expression, offset, scope.origin)?;
        }
        if scan.is_empty() {
            return Ok((text.to_string(), Vec::new()));
        }

        let globals = Globals::new(scope.context);
        let mut values: HashMap<&str, String> = HashMap::new();
        let mut splices = Vec::with_capacity(scan.regions.len());
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for region in &scan.regions {
            out.push_str(&text[last..region.span.start]);
            let value = match values.get(region.text) {
                Some(value) => value.clone(),
                None => {
                    let value = evaluate_in(region.text, &globals, &self.limits).map_err(|err| {
                        RenderError::expression(
                            region.text,
                            region.span.start,
                            scope.origin.clone(),
                            err,
                        )
                    })?;
                    let value = escape_text(&value);
                    values.insert(region.text, value.clone());
                    value
                }
            };
            let start = out.len();
            out.push_str(&value);
            splices.push(Splice {
                source: region.span.clone(),
                output: start..out.len(),
            });
            last = region.span.end;
        }
        out.push_str(&text[last..]);
        Ok((out, splices))
    }

    /// Expand registered partials until a round changes nothing
    fn partial_pass(
        &mut self,
        mut markup: String,
        mut map: SourceMap,
        scope: &Scope<'_>,
    ) -> Result<String, RenderError> {
        let registry = self.registry;
        for _ in 0..self.config.max_partial_depth {
            let mut changed = false;
            for (name, body) in registry.iter() {
                if let Some((expanded, splices)) = expand(self, &markup, name, body, scope, &map)? {
                    markup = expanded;
                    map.push(splices);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        self.check_unknown(&markup, &map, scope.origin)?;
        Ok(markup)
    }

    fn check_unknown(
        &self,
        markup: &str,
        map: &SourceMap,
        origin: &Origin,
    ) -> Result<(), RenderError> {
        for invocation in partial_invocations(markup) {
            if self.registry.contains(invocation.name) {
                continue;
            }
            let offset = map.to_source(invocation.offset);
            if self.config.is_strict() {
                return Err(RenderError::unknown_partial(
                    invocation.name,
                    offset,
                    origin.clone(),
                ));
            }
            warn!(
                partial = invocation.name,
                offset,
                %origin,
                "unknown partial left in output"
            );
        }
        Ok(())
    }

    /// Render a partial body for one invocation.
    ///
    /// Entering a partial that is already being rendered with the same
    /// context can never finish, and neither can nesting past
    /// `max_partial_depth`; both are reported as a cycle.
    pub(crate) fn render_partial(
        &mut self,
        name: &str,
        body: &str,
        context: &Context,
        digest: u64,
    ) -> Result<String, RenderError> {
        let reentered = self.stack.iter().any(|(n, d)| n == name && *d == digest);
        if reentered || self.stack.len() >= self.config.max_partial_depth {
            let mut chain: Vec<String> = self.stack.iter().map(|(n, _)| n.clone()).collect();
            chain.push(name.to_string());
            return Err(RenderError::cyclic(chain));
        }

        let origin = Origin::Partial(name.to_string());
        let scope = Scope {
            context,
            digest,
            origin: &origin,
        };
        self.stack.push((name.to_string(), digest));
        let result = self.render_in(body, &scope);
        self.stack.pop();
        result
    }

    /// Handle a region that never balanced: an error when strict, otherwise
    /// the text is left as it is
    pub(crate) fn unterminated(
        &self,
        kind: RegionKind,
        offset: usize,
        origin: &Origin,
    ) -> Result<(), RenderError> {
        if self.config.is_strict() {
            return Err(RenderError::unterminated(kind, offset, origin.clone()));
        }
        warn!(%kind, offset, %origin, "unterminated region left as text");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Strictness;

    fn render(template: &str, registry: &PartialRegistry) -> Result<String, RenderError> {
        let config = RenderConfig::default();
        Renderer::new(registry, &config).render(template, &Context::new())
    }

    #[test]
    fn test_duplicate_regions_all_replaced() {
        let registry = PartialRegistry::new();
        assert_eq!(render("{1+1} and {1+1}", &registry).unwrap(), "2 and 2");
    }

    #[test]
    fn test_identical_invocations_all_expanded() {
        let registry = PartialRegistry::new().with_partial("x", "[{contents}]").unwrap();
        assert_eq!(
            render("<_x>a</_x>-<_x>a</_x>-<_x>b</_x>", &registry).unwrap(),
            "[a]-[a]-[b]"
        );
    }

    #[test]
    fn test_values_with_backslashes_render_verbatim() {
        let registry = PartialRegistry::new();
        assert_eq!(render(r"{'a\\\\b'}", &registry).unwrap(), r"a\\b");
        assert_eq!(render(r"{'\\<'}", &registry).unwrap(), r"\<");
    }

    #[test]
    fn test_partial_offsets_point_into_partial_body() {
        let registry = PartialRegistry::new().with_partial("bad", "ok {nope}").unwrap();
        let err = render("<_bad></_bad>", &registry).unwrap_err();
        match err {
            RenderError::Expression { offset, origin, .. } => {
                assert_eq!(offset, 3);
                assert_eq!(origin, Origin::Partial("bad".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_partial_offset_maps_to_source() {
        let registry = PartialRegistry::new();
        assert_eq!(
            render("{'abcdef'} <_nope></_nope>", &registry).unwrap_err(),
            RenderError::unknown_partial("nope", 11, Origin::Template)
        );
    }

    #[test]
    fn test_partial_produced_by_expression_maps_to_region() {
        let registry = PartialRegistry::new();
        assert_eq!(
            render("{'xy'}{'<_ghost>'}", &registry).unwrap_err(),
            RenderError::unknown_partial("ghost", 6, Origin::Template)
        );
    }

    #[test]
    fn test_unknown_partial_offset_after_expansion() {
        let registry = PartialRegistry::new()
            .with_partial("wide", "a much longer body")
            .unwrap();
        // `<_wide/>` (8 bytes) became 18 bytes before the leftover tag
        assert_eq!(
            render("<_wide/> <_nope/>", &registry).unwrap_err(),
            RenderError::unknown_partial("nope", 9, Origin::Template)
        );
    }

    #[test]
    fn test_unterminated_tag_offset_maps_to_source() {
        let registry = PartialRegistry::new().with_partial("card", "c").unwrap();
        assert_eq!(
            render("{1 + 1}<_card>open", &registry).unwrap_err(),
            RenderError::unterminated(RegionKind::Tag, 7, Origin::Template)
        );
    }

    #[test]
    fn test_source_map_layers() {
        let mut map = SourceMap::default();
        // "{abc}--" -> "x--"
        map.push(vec![Splice {
            source: 0..5,
            output: 0..1,
        }]);
        // "x--" -> "x-LONG-"
        map.push(vec![Splice {
            source: 2..2,
            output: 2..6,
        }]);
        assert_eq!(map.to_source(0), 0);
        assert_eq!(map.to_source(1), 5);
        assert_eq!(map.to_source(4), 6);
        assert_eq!(map.to_source(6), 6);
    }

    #[test]
    fn test_reentry_with_restored_bindings_is_a_cycle() {
        // `b` changes `x`, its call of `a` restores it
        let registry = PartialRegistry::new()
            .with_partial("a", r#"<_b x="1"></_b>"#)
            .unwrap()
            .with_partial("b", r#"<_a x="0"></_a>"#)
            .unwrap();
        assert_eq!(
            render(r#"<_a x="0"></_a>"#, &registry).unwrap_err(),
            RenderError::cyclic(vec!["a".to_string(), "b".to_string(), "a".to_string()])
        );
    }

    #[test]
    fn test_depth_limit_reports_chain() {
        // `n` changes every level, so only the depth bound stops it
        let registry = PartialRegistry::new()
            .with_partial("deep", r#"<_deep n="{n + 1}"></_deep>"#)
            .unwrap();
        let config = RenderConfig::default().with_max_partial_depth(4);
        let err = Renderer::new(&registry, &config)
            .render(r#"<_deep n="0"></_deep>"#, &Context::new())
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::cyclic(vec!["deep".to_string(); 5])
        );
    }

    #[test]
    fn test_lenient_keeps_malformed_text() {
        let registry = PartialRegistry::new();
        let config = RenderConfig::default().with_strictness(Strictness::Lenient);
        let mut renderer = Renderer::new(&registry, &config);
        assert_eq!(
            renderer.render("a {1 + <_gone>", &Context::new()).unwrap(),
            "a {1 + <_gone>"
        );
    }
}
