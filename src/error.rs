//! Error types for rendering, expressions and configuration

use std::fmt;

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::expr::lexer::Token;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// The text an error offset is relative to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// The template handed to the top-level render call
    Template,
    /// The body of the named partial
    Partial(String),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Template => write!(f, "template"),
            Origin::Partial(name) => write!(f, "partial '{}'", name),
        }
    }
}

/// Which kind of region failed to balance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Expression,
    Tag,
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionKind::Expression => write!(f, "expression"),
            RegionKind::Tag => write!(f, "partial tag"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprErrorKind {
    Syntax,
    Runtime,
}

/// Failure while parsing or evaluating one expression.
///
/// `span` is relative to the expression source.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ExprError {
    pub kind: ExprErrorKind,
    pub span: Span,
    pub message: String,
    pub expected: Vec<String>,
}

impl ExprError {
    pub fn syntax(span: Span, message: impl Into<String>) -> Self {
        Self {
            kind: ExprErrorKind::Syntax,
            span,
            message: message.into(),
            expected: Vec::new(),
        }
    }

    pub fn runtime(span: Span, message: impl Into<String>) -> Self {
        Self {
            kind: ExprErrorKind::Runtime,
            span,
            message: message.into(),
            expected: Vec::new(),
        }
    }

    pub fn is_syntax(&self) -> bool {
        self.kind == ExprErrorKind::Syntax
    }
}

/// Errors returned by a render call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// An expression region failed to parse or evaluate
    #[error("{origin}: cannot evaluate {{{expression}}} at offset {offset}: {source}")]
    Expression {
        expression: String,
        /// Offset of the region's opening `{`
        offset: usize,
        origin: Origin,
        source: ExprError,
    },

    /// A `{` or partial tag that never balanced
    #[error("{origin}: unterminated {kind} opened at offset {offset}")]
    UnterminatedRegion {
        kind: RegionKind,
        offset: usize,
        origin: Origin,
    },

    /// A `<_name` tag with no registered partial
    #[error("{origin}: unknown partial '{name}' at offset {offset}")]
    UnknownPartial {
        name: String,
        offset: usize,
        origin: Origin,
    },

    /// A partial that keeps invoking itself
    #[error("cyclic partial invocation: {}", chain.join(" -> "))]
    CyclicPartial { chain: Vec<String> },
}

impl RenderError {
    pub fn expression(
        expression: impl Into<String>,
        offset: usize,
        origin: Origin,
        source: ExprError,
    ) -> Self {
        RenderError::Expression {
            expression: expression.into(),
            offset,
            origin,
            source,
        }
    }

    pub fn unterminated(kind: RegionKind, offset: usize, origin: Origin) -> Self {
        RenderError::UnterminatedRegion {
            kind,
            offset,
            origin,
        }
    }

    pub fn unknown_partial(name: impl Into<String>, offset: usize, origin: Origin) -> Self {
        RenderError::UnknownPartial {
            name: name.into(),
            offset,
            origin,
        }
    }

    pub fn cyclic(chain: Vec<String>) -> Self {
        RenderError::CyclicPartial { chain }
    }

    /// The text this error's span points into, if it has one
    pub fn origin(&self) -> Option<&Origin> {
        match self {
            RenderError::Expression { origin, .. }
            | RenderError::UnterminatedRegion { origin, .. }
            | RenderError::UnknownPartial { origin, .. } => Some(origin),
            RenderError::CyclicPartial { .. } => None,
        }
    }

    /// Byte span in the origin text
    pub fn span(&self) -> Option<Span> {
        match self {
            RenderError::Expression {
                expression,
                offset,
                source,
                ..
            } => {
                // the inner span is relative to the text after `{`
                let body = offset + 1;
                if source.span.end <= expression.len() && source.span.start < source.span.end {
                    Some(body + source.span.start..body + source.span.end)
                } else {
                    Some(*offset..body + expression.len() + 1)
                }
            }
            RenderError::UnterminatedRegion { offset, .. } => Some(*offset..offset + 1),
            RenderError::UnknownPartial { name, offset, .. } => {
                Some(*offset..offset + name.len() + 2)
            }
            RenderError::CyclicPartial { .. } => None,
        }
    }

    /// Format the error with source context using ariadne.
    ///
    /// `source` must be the text named by [`RenderError::origin`].
    pub fn format(&self, source: &str, filename: &str) -> String {
        let mut buf = Vec::new();
        let message = self.to_string();
        let span = self.span().map(|span| {
            let start = char_offset(source, span.start);
            let end = char_offset(source, span.end).max(start);
            start..end
        });

        let mut report = Report::build(
            ReportKind::Error,
            filename,
            span.as_ref().map(|s| s.start).unwrap_or(0),
        )
        .with_message(&message);

        if let Some(span) = span {
            let label = match self {
                RenderError::Expression { source, .. } if !source.expected.is_empty() => {
                    format!("{}\nExpected: {}", source.message, source.expected.join(", "))
                }
                RenderError::Expression { source, .. } => source.message.clone(),
                RenderError::UnterminatedRegion { kind, .. } => {
                    format!("this {} is never closed", kind)
                }
                RenderError::UnknownPartial { .. } => "no partial with this name".to_string(),
                RenderError::CyclicPartial { .. } => message.clone(),
            };
            report = report.with_label(
                Label::new((filename, span))
                    .with_message(label)
                    .with_color(Color::Red),
            );
        }

        if report
            .finish()
            .write((filename, Source::from(source)), &mut buf)
            .is_err()
        {
            return message;
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Character offset for a byte offset, clamped to the source
fn char_offset(source: &str, byte: usize) -> usize {
    source.char_indices().take_while(|(i, _)| *i < byte).count()
}

impl<'a> From<chumsky::error::Rich<'a, Token>> for ExprError {
    fn from(err: chumsky::error::Rich<'a, Token>) -> Self {
        use chumsky::error::{RichPattern, RichReason};

        let message = match err.reason() {
            RichReason::ExpectedFound { found, .. } => {
                let found_str = match found {
                    Some(tok) => format_token(tok),
                    None => "end of expression".to_string(),
                };
                format!("Unexpected {}", found_str)
            }
            RichReason::Custom(msg) => msg.to_string(),
            #[allow(unreachable_patterns)]
            _ => "Unexpected input".to_string(),
        };

        let expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                RichPattern::Token(tok) => Some(format_token(tok)),
                RichPattern::Label(label) => Some(label.to_string()),
                RichPattern::EndOfInput => Some("end of expression".to_string()),
                _ => None,
            })
            .collect();

        ExprError {
            kind: ExprErrorKind::Syntax,
            span: err.span().into_range(),
            message,
            expected,
        }
    }
}

/// Format a token for human-readable error messages
pub(crate) fn format_token(tok: &Token) -> String {
    match tok {
        Token::Ident(s) => format!("identifier '{}'", s),
        Token::Str(s) => format!("string \"{}\"", s),
        Token::Number(n) => format!("number {}", n),
        Token::Template(_) => "template literal".to_string(),
        Token::True => "'true'".to_string(),
        Token::False => "'false'".to_string(),
        Token::Null => "'null'".to_string(),
        Token::Undefined => "'undefined'".to_string(),
        Token::Typeof => "'typeof'".to_string(),
        Token::Arrow => "'=>'".to_string(),
        Token::OptionalDot => "'?.'".to_string(),
        Token::Question => "'?'".to_string(),
        Token::Colon => "':'".to_string(),
        Token::Comma => "','".to_string(),
        Token::Dot => "'.'".to_string(),
        Token::ParenOpen => "'('".to_string(),
        Token::ParenClose => "')'".to_string(),
        Token::BracketOpen => "'['".to_string(),
        Token::BracketClose => "']'".to_string(),
        Token::BraceOpen => "'{'".to_string(),
        Token::BraceClose => "'}'".to_string(),
        other => match other.operator() {
            Some(op) => format!("'{}'", op),
            None => format!("{:?}", other),
        },
    }
}

/// Errors building a [`crate::Context`] from JSON
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("context must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },
}

/// Errors registering partials
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Names start with a letter, then letters, digits, `_` or `-`
    #[error("invalid partial name '{name}'")]
    InvalidName { name: String },

    #[error("duplicate partial definition: {name}")]
    Duplicate { name: String },
}

/// Errors that can occur when loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expression_error(span: Span) -> RenderError {
        RenderError::expression(
            "a +",
            4,
            Origin::Template,
            ExprError::syntax(span, "Unexpected end of expression"),
        )
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            expression_error(3..3).to_string(),
            "template: cannot evaluate {a +} at offset 4: Unexpected end of expression"
        );
        assert_eq!(
            RenderError::unterminated(RegionKind::Tag, 7, Origin::Partial("box".into()))
                .to_string(),
            "partial 'box': unterminated partial tag opened at offset 7"
        );
        assert_eq!(
            RenderError::cyclic(vec!["a".into(), "b".into(), "a".into()]).to_string(),
            "cyclic partial invocation: a -> b -> a"
        );
    }

    #[test]
    fn test_expression_span_inside_region() {
        assert_eq!(expression_error(0..1).span(), Some(5..6));
    }

    #[test]
    fn test_expression_span_falls_back_to_region() {
        // empty or out-of-range inner spans cover the whole `{a +}`
        assert_eq!(expression_error(3..3).span(), Some(4..9));
        assert_eq!(expression_error(2..40).span(), Some(4..9));
    }

    #[test]
    fn test_unknown_partial_span_covers_tag_name() {
        let err = RenderError::unknown_partial("nav", 2, Origin::Template);
        assert_eq!(err.span(), Some(2..7));
        assert_eq!(err.origin(), Some(&Origin::Template));
    }

    #[test]
    fn test_format_includes_message_and_filename() {
        let source = "ab {a +} cd";
        let err = RenderError::expression(
            "a +",
            3,
            Origin::Template,
            ExprError::syntax(3..3, "Unexpected end of expression"),
        );
        let report = err.format(source, "page.html");
        assert!(report.contains("page.html"));
        assert!(report.contains("Unexpected end of expression"));
    }

    #[test]
    fn test_format_cyclic_without_span() {
        let err = RenderError::cyclic(vec!["loop".into(), "loop".into()]);
        let report = err.format("", "page.html");
        assert!(report.contains("cyclic partial invocation"));
    }

    #[test]
    fn test_char_offset_multibyte() {
        assert_eq!(char_offset("é{x}", 2), 1);
        assert_eq!(char_offset("abc", 99), 3);
    }
}
