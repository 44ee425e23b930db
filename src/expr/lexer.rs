//! Lexer for the expression language using logos

use logos::Logos;

use crate::error::ExprError;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// A piece of a template literal
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateChunk {
    /// Literal text with escapes already resolved
    Text(String),
    /// Source of a `${...}` interpolation and its absolute offset
    Code { source: String, offset: usize },
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
#[logos(extras = usize)]
pub enum Token {
    // Keywords
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,
    #[token("undefined")]
    Undefined,
    #[token("typeof")]
    Typeof,

    // Operators (longer patterns first)
    #[token("=>")]
    Arrow,
    #[token("===")]
    StrictEq,
    #[token("!==")]
    StrictNe,
    #[token("==")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("&&")]
    And,
    #[token("||")]
    Or,
    #[token("??")]
    Nullish,
    #[token("?.")]
    OptionalDot,
    #[token("?")]
    Question,
    #[token("!")]
    Not,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    // Delimiters
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token("{")]
    BraceOpen,
    #[token("}")]
    BraceClose,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,

    // Literals - identifiers must come after keywords
    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r"([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        cook_escapes(&s[1..s.len()-1])
    })]
    #[regex(r"'([^'\\]|\\.)*'", |lex| {
        let s = lex.slice();
        cook_escapes(&s[1..s.len()-1])
    })]
    Str(String),

    #[token("`", lex_template)]
    Template(Vec<TemplateChunk>),
}

impl Token {
    /// Source text of an operator token
    pub fn operator(&self) -> Option<&'static str> {
        Some(match self {
            Token::StrictEq => "===",
            Token::StrictNe => "!==",
            Token::Eq => "==",
            Token::Ne => "!=",
            Token::Le => "<=",
            Token::Ge => ">=",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::And => "&&",
            Token::Or => "||",
            Token::Nullish => "??",
            Token::Not => "!",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            _ => return None,
        })
    }
}

fn lex_template(lex: &mut logos::Lexer<Token>) -> Option<Vec<TemplateChunk>> {
    let rest = lex.remainder();
    let len = template_body_len(rest)?;
    let body_offset = lex.extras + lex.span().end;
    let chunks = split_template(&rest[..len], body_offset);
    lex.bump(len + 1);
    Some(chunks)
}

/// Byte index of the closing backtick of a template literal body
pub(crate) fn template_body_len(rest: &str) -> Option<usize> {
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => return Some(i),
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                i += 2 + interpolation_len(&rest[i + 2..])? + 1;
            }
            _ => i += 1,
        }
    }
    None
}

/// Byte index of the `}` that closes a `${` interpolation
pub(crate) fn interpolation_len(rest: &str) -> Option<usize> {
    let bytes = rest.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' if depth == 0 => return Some(i),
            b'}' => depth -= 1,
            quote @ (b'\'' | b'"') => i += 1 + quoted_len(&bytes[i + 1..], quote)?,
            b'`' => i += 1 + template_body_len(&rest[i + 1..])?,
            _ => {}
        }
        i += 1;
    }
    None
}

/// Byte index of the closing `quote` of a string body
pub(crate) fn quoted_len(bytes: &[u8], quote: u8) -> Option<usize> {
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn split_template(body: &str, body_offset: usize) -> Vec<TemplateChunk> {
    let mut chunks = Vec::new();
    let mut text_start = 0;
    let mut i = 0;
    let bytes = body.as_bytes();
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                if text_start < i {
                    chunks.push(TemplateChunk::Text(cook_escapes(&body[text_start..i])));
                }
                let code_start = i + 2;
                let len = interpolation_len(&body[code_start..]).unwrap_or(body.len() - code_start);
                chunks.push(TemplateChunk::Code {
                    source: body[code_start..code_start + len].to_string(),
                    offset: body_offset + code_start,
                });
                i = code_start + len + 1;
                text_start = i;
            }
            _ => i += 1,
        }
    }
    if text_start < body.len() {
        chunks.push(TemplateChunk::Text(cook_escapes(&body[text_start..])));
    }
    chunks
}

/// Resolve backslash escapes in a string or template literal
pub(crate) fn cook_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\n') => {}
            Some('u') => {
                let hex: String = chars.clone().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(c) if hex.len() == 4 => {
                        out.push(c);
                        chars.nth(3);
                    }
                    _ => out.push('u'),
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Lex an expression. Spans are shifted by `base` so nested sources report
/// offsets relative to the outermost expression.
pub fn lex(input: &str, base: usize) -> Result<Vec<(Token, Span)>, ExprError> {
    let mut tokens = Vec::new();
    for (tok, span) in Token::lexer_with_extras(input, base).spanned() {
        let abs = span.start + base..span.end + base;
        match tok {
            Ok(tok) => tokens.push((tok, abs)),
            Err(()) => {
                let message = match input[span.start..].chars().next() {
                    Some('`') => "Unterminated template literal".to_string(),
                    Some('"') | Some('\'') => "Unterminated string literal".to_string(),
                    Some(c) => format!("Unexpected character '{}'", c),
                    None => "Unexpected end of expression".to_string(),
                };
                return Err(ExprError::syntax(abs, message));
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        lex(input, 0)
            .expect("Should lex")
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }

    #[test]
    fn test_operators_longest_first() {
        assert_eq!(
            tokens("=== !== == != <= >= => ?. ?? ?"),
            vec![
                Token::StrictEq,
                Token::StrictNe,
                Token::Eq,
                Token::Ne,
                Token::Le,
                Token::Ge,
                Token::Arrow,
                Token::OptionalDot,
                Token::Nullish,
                Token::Question
            ]
        );
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            tokens("true nullable typeof $el _x"),
            vec![
                Token::True,
                Token::Ident("nullable".to_string()),
                Token::Typeof,
                Token::Ident("$el".to_string()),
                Token::Ident("_x".to_string())
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("42 3.14 .5 1e3 -2"),
            vec![
                Token::Number(42.0),
                Token::Number(3.14),
                Token::Number(0.5),
                Token::Number(1000.0),
                Token::Minus,
                Token::Number(2.0)
            ]
        );
    }

    #[test]
    fn test_strings_with_escapes() {
        assert_eq!(
            tokens(r#"'it\'s' "a\"b" 'tab\t' 'A'"#),
            vec![
                Token::Str("it's".to_string()),
                Token::Str("a\"b".to_string()),
                Token::Str("tab\t".to_string()),
                Token::Str("A".to_string())
            ]
        );
    }

    #[test]
    fn test_markup_inside_strings_is_one_token() {
        assert_eq!(
            tokens("'<li>' + i"),
            vec![
                Token::Str("<li>".to_string()),
                Token::Plus,
                Token::Ident("i".to_string())
            ]
        );
    }

    #[test]
    fn test_template_literal_chunks() {
        let toks = lex("`a${x + 1}b`", 0).expect("Should lex");
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].1, 0..12);
        assert_eq!(
            toks[0].0,
            Token::Template(vec![
                TemplateChunk::Text("a".to_string()),
                TemplateChunk::Code {
                    source: "x + 1".to_string(),
                    offset: 4
                },
                TemplateChunk::Text("b".to_string()),
            ])
        );
    }

    #[test]
    fn test_nested_template_literal() {
        let toks = tokens("`<ul>${xs.map(x => `<li>${x}</li>`).join('')}</ul>`");
        match &toks[..] {
            [Token::Template(chunks)] => {
                assert_eq!(chunks.len(), 3);
                assert_eq!(
                    chunks[1],
                    TemplateChunk::Code {
                        source: "xs.map(x => `<li>${x}</li>`).join('')".to_string(),
                        offset: 7
                    }
                );
            }
            other => panic!("unexpected tokens {:?}", other),
        }
    }

    #[test]
    fn test_template_escapes() {
        assert_eq!(
            tokens(r"`\${x} \` \\{`"),
            vec![Token::Template(vec![TemplateChunk::Text(
                r"${x} ` \{".to_string()
            )])]
        );
    }

    #[test]
    fn test_base_offset_shifts_spans() {
        let toks = lex("a + b", 10).expect("Should lex");
        let spans: Vec<_> = toks.into_iter().map(|(_, s)| s).collect();
        assert_eq!(spans, vec![10..11, 12..13, 14..15]);
    }

    #[test]
    fn test_unterminated_template_is_an_error() {
        let err = lex("`abc", 0).unwrap_err();
        assert_eq!(err.message, "Unterminated template literal");
        assert!(err.is_syntax());
    }

    #[test]
    fn test_unexpected_character() {
        let err = lex("a # b", 0).unwrap_err();
        assert_eq!(err.message, "Unexpected character '#'");
        assert_eq!(err.span, 2..3);
    }
}
