//! Bracket scanner: top-level balanced `{...}` regions

use super::{Cursor, Region, Scan, State};

/// Find every top-level balanced region delimited by `open` and `close`.
///
/// Region texts exclude the outermost delimiters and are returned in order of
/// appearance. Nested pairs stay inside the enclosing region. An `open` that
/// never balances yields no region; its offset is reported in
/// [`Scan::unterminated`].
pub fn scan_brackets(text: &str, open: char, close: char) -> Scan<'_> {
    let mut scan = Scan::default();
    let mut state = State::Literal;

    for step in Cursor::new(text) {
        if step.escaped {
            continue;
        }
        state = match state {
            State::Literal if step.ch == open => State::InBracket {
                start: step.offset,
                depth: 0,
            },
            State::InBracket { start, depth } if step.ch == open => State::InBracket {
                start,
                depth: depth + 1,
            },
            State::InBracket { start, depth: 0 } if step.ch == close => {
                let content_start = start + open.len_utf8();
                let end = step.offset + close.len_utf8();
                scan.regions.push(Region {
                    text: &text[content_start..step.offset],
                    span: start..end,
                });
                State::Literal
            }
            State::InBracket { start, depth } if step.ch == close => State::InBracket {
                start,
                depth: depth - 1,
            },
            other => other,
        };
    }

    if let State::InBracket { start, .. } = state {
        scan.unterminated = Some(start);
    }
    scan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(text: &str) -> Vec<&str> {
        scan_brackets(text, '{', '}').texts()
    }

    #[test]
    fn test_single_region() {
        let scan = scan_brackets("a {name} b", '{', '}');
        assert_eq!(scan.texts(), vec!["name"]);
        assert_eq!(scan.regions[0].span, 2..8);
        assert_eq!(scan.unterminated, None);
    }

    #[test]
    fn test_nested_braces_stay_in_region() {
        assert_eq!(contents("{ {a: 1}.a }"), vec![" {a: 1}.a "]);
    }

    #[test]
    fn test_regions_in_order_with_duplicates() {
        assert_eq!(contents("{a}-{b}-{a}"), vec!["a", "b", "a"]);
    }

    #[test]
    fn test_adjacent_regions() {
        assert_eq!(contents("{a}{b}"), vec!["a", "b"]);
    }

    #[test]
    fn test_escaped_braces_are_literal() {
        assert!(contents(r"\{literal\}").is_empty());
        assert_eq!(contents(r"{'\}'}"), vec![r"'\}'"]);
    }

    #[test]
    fn test_escaped_backslash_before_brace() {
        assert_eq!(contents(r"\\{x}"), vec!["x"]);
    }

    #[test]
    fn test_stray_close_is_literal() {
        assert_eq!(contents("a } {b}"), vec!["b"]);
    }

    #[test]
    fn test_unterminated_region_is_reported_not_emitted() {
        let scan = scan_brackets("ok {a} then {never", '{', '}');
        assert_eq!(scan.texts(), vec!["a"]);
        assert_eq!(scan.unterminated, Some(12));
    }

    #[test]
    fn test_other_delimiters() {
        assert_eq!(scan_brackets("f(a(b)) g(c)", '(', ')').texts(), vec!["a(b)", "c"]);
    }

    #[test]
    fn test_multibyte_content() {
        assert_eq!(contents("→{ünï}←"), vec!["ünï"]);
    }
}
