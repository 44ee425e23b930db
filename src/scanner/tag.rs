//! Tag scanner: top-level balanced markup fragments

use super::{Cursor, Region, Scan, State};

/// An opening partial tag `<_name` found in text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialInvocation<'a> {
    /// Partial name without the `_` prefix
    pub name: &'a str,
    /// Byte offset of the `<`
    pub offset: usize,
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub(crate) fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Classify the `<` at `offset`: `Some(closing)` when it starts a tag that
/// passes the name filter, `None` when it is plain text.
///
/// Without a filter any name works. With a filter the tag name must equal it
/// and be followed by whitespace, `/`, `>` or the end of input.
fn tag_start(text: &str, offset: usize, filter: Option<&str>) -> Option<bool> {
    let rest = &text[offset + 1..];
    let (closing, name) = match rest.strip_prefix('/') {
        Some(after) => (true, after),
        None => (false, rest),
    };
    match filter {
        None => name
            .chars()
            .next()
            .filter(|&c| is_name_start(c))
            .map(|_| closing),
        Some(filter) => {
            let after = name.strip_prefix(filter)?;
            match after.chars().next() {
                None => Some(closing),
                Some(c) if c.is_whitespace() || c == '/' || c == '>' => Some(closing),
                Some(_) => None,
            }
        }
    }
}

/// Find every top-level balanced tag fragment, optionally only tags named
/// `filter`.
///
/// Depth counts only tags that pass the filter: an opening tag increments it,
/// a closing tag decrements it and a self-closing tag (`/` right before `>`)
/// leaves it unchanged. The fragment is complete when depth is back at zero.
/// A closing tag met outside any fragment is plain text.
pub fn scan_tags<'a>(text: &'a str, filter: Option<&str>) -> Scan<'a> {
    let mut scan = Scan::default();
    let mut state = State::Literal;

    for step in Cursor::new(text) {
        if step.escaped {
            continue;
        }
        state = match state {
            State::Literal if step.ch == '<' => match tag_start(text, step.offset, filter) {
                Some(false) => State::InTag {
                    start: step.offset,
                    depth: 0,
                    closing: false,
                    in_tag: true,
                },
                _ => State::Literal,
            },
            State::InTag {
                start,
                depth,
                in_tag: false,
                ..
            } if step.ch == '<' => match tag_start(text, step.offset, filter) {
                Some(closing) => State::InTag {
                    start,
                    depth,
                    closing,
                    in_tag: true,
                },
                None => state,
            },
            State::InTag {
                start,
                depth,
                closing,
                in_tag: true,
            } if step.ch == '>' => {
                let depth = if closing {
                    depth.saturating_sub(1)
                } else if text[..step.offset].ends_with('/') {
                    depth
                } else {
                    depth + 1
                };
                if depth == 0 {
                    let end = step.offset + 1;
                    scan.regions.push(Region {
                        text: &text[start..end],
                        span: start..end,
                    });
                    State::Literal
                } else {
                    State::InTag {
                        start,
                        depth,
                        closing: false,
                        in_tag: false,
                    }
                }
            }
            other => other,
        };
    }

    if let State::InTag { start, .. } = state {
        scan.unterminated = Some(start);
    }
    scan
}

/// Match a tag fragment that starts exactly at `offset`.
///
/// Used by the expression protector, which walks code itself and only asks
/// the tag scanner about a `<` it has already reached.
pub(crate) fn tag_at(text: &str, offset: usize) -> Option<Region<'_>> {
    tag_start(text, offset, None).filter(|closing| !closing)?;
    let scan = scan_tags(&text[offset..], None);
    let first = scan.regions.into_iter().next()?;
    if first.span.start != 0 {
        return None;
    }
    let span = offset..offset + first.span.end;
    Some(Region {
        text: &text[span.clone()],
        span,
    })
}

/// Every unescaped opening partial tag `<_name` in `text`
pub fn partial_invocations(text: &str) -> Vec<PartialInvocation<'_>> {
    Cursor::new(text)
        .filter(|step| step.ch == '<' && !step.escaped)
        .filter_map(|step| {
            let rest = text[step.offset + 1..].strip_prefix('_')?;
            if !rest.starts_with(|c: char| c.is_ascii_alphabetic()) {
                return None;
            }
            let len = rest.find(|c: char| !is_name_char(c)).unwrap_or(rest.len());
            Some(PartialInvocation {
                name: &rest[..len],
                offset: step.offset,
            })
        })
        .collect()
}
