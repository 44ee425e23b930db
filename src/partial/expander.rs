//! Partial expansion: replace `<_name ...>...</_name>` fragments with the
//! rendered partial body

use std::collections::HashMap;

use tracing::debug;

use crate::attributes::parse_attributes;
use crate::context::Context;
use crate::error::{RegionKind, RenderError};
use crate::render::{Renderer, Scope, SourceMap, Splice};
use crate::scanner::{find_unescaped, rfind_unescaped, scan_tags, unescape};

/// Inner markup of a fragment: the text strictly between its first `>` and
/// its last `<`. Self-closing invocations have none.
pub fn contents(fragment: &str) -> &str {
    match (
        find_unescaped(fragment, '>'),
        rfind_unescaped(fragment, '<'),
    ) {
        (Some(gt), Some(lt)) if gt < lt => &fragment[gt + 1..lt],
        _ => "",
    }
}

/// Bindings an invocation adds over the outer context: its attributes, then
/// `contents`. Both are plain text, with escape sequences resolved.
fn invocation_bindings(fragment: &str) -> Context {
    Context::from(parse_attributes(fragment)).with("contents", unescape(contents(fragment)))
}

/// The context a partial body sees: the outer context, overlaid by the
/// invocation's attributes, overlaid by `contents`
pub fn invocation_context(fragment: &str, outer: &Context) -> Context {
    outer.merged(&invocation_bindings(fragment))
}

/// Expand every top-level `_name` invocation in `markup`.
///
/// Returns `None` when there is nothing to expand, otherwise the new markup
/// and where each fragment went. Fragments with identical text render once
/// and every occurrence is replaced.
pub(crate) fn expand(
    renderer: &mut Renderer<'_>,
    markup: &str,
    name: &str,
    body: &str,
    scope: &Scope<'_>,
    map: &SourceMap,
) -> Result<Option<(String, Vec<Splice>)>, RenderError> {
    let tag = format!("_{}", name);
    let scan = scan_tags(markup, Some(&tag));
    if let Some(offset) = scan.unterminated {
        renderer.unterminated(RegionKind::Tag, map.to_source(offset), scope.origin)?;
    }
    if scan.is_empty() {
        return Ok(None);
    }
    debug!(partial = name, invocations = scan.regions.len(), "expanding partial");

    let mut rendered: HashMap<&str, String> = HashMap::new();
    let mut splices = Vec::with_capacity(scan.regions.len());
    let mut out = String::with_capacity(markup.len());
    let mut last = 0;
    for region in &scan.regions {
        out.push_str(&markup[last..region.span.start]);
        if !rendered.contains_key(region.text) {
            let bindings = invocation_bindings(region.text);
            let digest = scope.context.merged_digest(scope.digest, &bindings);
            let inner = scope.context.merged(&bindings);
            let text = renderer.render_partial(name, body, &inner, digest)?;
            rendered.insert(region.text, text);
        }
        let start = out.len();
        if let Some(text) = rendered.get(region.text) {
            out.push_str(text);
        }
        splices.push(Splice {
            source: region.span.clone(),
            output: start..out.len(),
        });
        last = region.span.end;
    }
    out.push_str(&markup[last..]);
    Ok(Some((out, splices)))
}
