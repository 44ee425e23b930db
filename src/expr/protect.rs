//! Markup protection
//!
//! Expressions routinely carry markup, as in `items.map(i => <li>{i}</li>)`.
//! Before parsing, every top-level markup fragment found in code position is
//! rewritten into a template literal, with its `{...}` regions turned into
//! `${...}` interpolations that are protected in turn. Markup inside string
//! and template literals is already text and is left alone.

use crate::expr::lexer::{quoted_len, template_body_len};
use crate::scanner::scan_brackets;
use crate::scanner::tag::tag_at;

/// Rewrite the markup fragments of an expression into template literals
pub fn protect(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                i = quoted_len(&bytes[i + 1..], quote).map_or(bytes.len(), |len| i + len + 2);
            }
            b'`' => {
                i = template_body_len(&source[i + 1..]).map_or(bytes.len(), |len| i + len + 2);
            }
            b'\\' => i += 2,
            b'<' => match tag_at(source, i) {
                Some(fragment) => {
                    out.push_str(&source[copied..i]);
                    out.push_str(&markup_literal(fragment.text));
                    i = fragment.span.end;
                    copied = i;
                }
                None => i += 1,
            },
            _ => i += 1,
        }
    }
    out.push_str(&source[copied.min(source.len())..]);
    out
}

/// Quote one markup fragment as a template literal
fn markup_literal(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len() + 2);
    out.push('`');
    let mut last = 0;
    for region in scan_brackets(fragment, '{', '}').regions {
        push_text(&mut out, &fragment[last..region.span.start]);
        out.push_str("${");
        out.push_str(&protect(region.text));
        out.push('}');
        last = region.span.end;
    }
    push_text(&mut out, &fragment[last..]);
    out.push('`');
    out
}

fn push_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        if matches!(ch, '\\' | '`' | '$') {
            out.push('\\');
        }
        out.push(ch);
    }
}
