//! Parser implementation using chumsky

use std::rc::Rc;

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::ExprError;
use crate::expr::ast::*;
use crate::expr::lexer::{lex, TemplateChunk, Token};
use crate::expr::value::format_number;

/// Parse an expression into an AST
pub fn parse(input: &str) -> Result<Spanned<Expr>, ExprError> {
    parse_at(input, 0)
}

/// Parse an expression whose first byte sits at `base` in the enclosing
/// source. Used for `${...}` interpolations so spans stay absolute.
pub fn parse_at(input: &str, base: usize) -> Result<Spanned<Expr>, ExprError> {
    let eoi = base + input.len();
    let tokens = lex(input, base)?;

    let token_iter = tokens.into_iter().map(|(tok, span)| (tok, span.into()));

    // Turn the token iterator into a stream that chumsky can use
    let token_stream = Stream::from_iter(token_iter)
        // Split (Token, SimpleSpan) into token and span parts
        .map((eoi..eoi).into(), |(t, s): (_, _)| (t, s));

    expr_parser()
        .then_ignore(end())
        .parse(token_stream)
        .into_result()
        .map_err(|errs| {
            errs.into_iter()
                .next()
                .map(ExprError::from)
                .unwrap_or_else(|| ExprError::syntax(base..eoi, "Invalid expression"))
        })
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

/// Postfix operation applied to a primary expression
#[derive(Debug, Clone)]
enum Postfix {
    Member { property: String, optional: bool },
    Index { index: Spanned<Expr>, optional: bool },
    Call(Vec<Spanned<Expr>>),
}

fn apply_postfix(object: Spanned<Expr>, (postfix, span): (Postfix, Span)) -> Spanned<Expr> {
    let full = object.span.start..span.end;
    let object = Box::new(object);
    let node = match postfix {
        Postfix::Member { property, optional } => Expr::Member {
            object,
            property,
            optional,
        },
        Postfix::Index { index, optional } => Expr::Index {
            object,
            index: Box::new(index),
            optional,
        },
        Postfix::Call(args) => Expr::Call {
            callee: object,
            args,
        },
    };
    Spanned::new(node, full)
}

fn binary(lhs: Spanned<Expr>, (op, rhs): (BinaryOp, Spanned<Expr>)) -> Spanned<Expr> {
    let span = lhs.span.start..rhs.span.end;
    Spanned::new(
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}

fn template_parts(chunks: Vec<TemplateChunk>) -> Result<Vec<TemplatePart>, ExprError> {
    chunks
        .into_iter()
        .map(|chunk| match chunk {
            TemplateChunk::Text(text) => Ok(TemplatePart::Text(text)),
            TemplateChunk::Code { source, offset } => {
                parse_at(&source, offset).map(TemplatePart::Expr)
            }
        })
        .collect()
}

fn expr_parser<'a, I>() -> impl Parser<'a, I, Spanned<Expr>, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let name = select! {
            Token::Ident(s) => s,
        };

        let literal = select! {
            Token::Number(n) => Expr::Number(n),
            Token::Str(s) => Expr::String(s),
            Token::True => Expr::Bool(true),
            Token::False => Expr::Bool(false),
            Token::Null => Expr::Null,
            Token::Undefined => Expr::Undefined,
            Token::Ident(s) => Expr::Ident(s),
        }
        .map_with(|node, e| Spanned::new(node, span_range(&e.span())));

        // Interpolations are parsed on their own, errors keep their inner span
        let template = select! {
            Token::Template(chunks) => chunks,
        }
        .try_map(|chunks, _span: SimpleSpan| {
            template_parts(chunks)
                .map(Expr::Template)
                .map_err(|err| Rich::custom(SimpleSpan::from(err.span.clone()), err.message))
        })
        .map_with(|node, e| Spanned::new(node, span_range(&e.span())));

        let items = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>();

        let array = items
            .clone()
            .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
            .map_with(|items, e| Spanned::new(Expr::Array(items), span_range(&e.span())));

        // Object keys: identifiers, strings or numbers; `{a}` is shorthand for `{a: a}`
        let key = select! {
            Token::Ident(s) => s,
            Token::Str(s) => s,
            Token::Number(n) => format_number(n),
        };
        let property = choice((
            key.then_ignore(just(Token::Colon)).then(expr.clone()),
            name.clone().map_with(|name: String, e| {
                let value = Spanned::new(Expr::Ident(name.clone()), span_range(&e.span()));
                (name, value)
            }),
        ));
        let object = property
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::BraceOpen), just(Token::BraceClose))
            .map_with(|props, e| Spanned::new(Expr::Object(props), span_range(&e.span())));

        let parenthesized = expr
            .clone()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose));

        let atom = choice((literal, template, parenthesized, array, object)).boxed();

        let args = items
            .clone()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose));
        let bracketed = expr
            .clone()
            .delimited_by(just(Token::BracketOpen), just(Token::BracketClose));

        let postfix = choice((
            just(Token::Dot)
                .ignore_then(name.clone())
                .map(|property| Postfix::Member {
                    property,
                    optional: false,
                }),
            just(Token::OptionalDot)
                .ignore_then(name.clone())
                .map(|property| Postfix::Member {
                    property,
                    optional: true,
                }),
            just(Token::OptionalDot)
                .ignore_then(bracketed.clone())
                .map(|index| Postfix::Index {
                    index,
                    optional: true,
                }),
            bracketed.map(|index| Postfix::Index {
                index,
                optional: false,
            }),
            args.map(Postfix::Call),
        ))
        .map_with(|postfix, e| (postfix, span_range(&e.span())));

        let chain = atom.foldl(postfix.repeated(), apply_postfix).boxed();

        let unary_op = select! {
            Token::Not => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Plus,
            Token::Typeof => UnaryOp::Typeof,
        }
        .map_with(|op, e| (op, span_range(&e.span())));

        let unary = unary_op
            .repeated()
            .foldr(chain, |(op, span), operand: Spanned<Expr>| {
                let full = span.start..operand.span.end;
                Spanned::new(
                    Expr::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    full,
                )
            })
            .boxed();

        let product = unary
            .clone()
            .foldl(
                select! {
                    Token::Star => BinaryOp::Mul,
                    Token::Slash => BinaryOp::Div,
                    Token::Percent => BinaryOp::Rem,
                }
                .then(unary)
                .repeated(),
                binary,
            )
            .boxed();

        let sum = product
            .clone()
            .foldl(
                select! {
                    Token::Plus => BinaryOp::Add,
                    Token::Minus => BinaryOp::Sub,
                }
                .then(product)
                .repeated(),
                binary,
            )
            .boxed();

        let comparison = sum
            .clone()
            .foldl(
                select! {
                    Token::Lt => BinaryOp::Lt,
                    Token::Le => BinaryOp::Le,
                    Token::Gt => BinaryOp::Gt,
                    Token::Ge => BinaryOp::Ge,
                }
                .then(sum)
                .repeated(),
                binary,
            )
            .boxed();

        let equality = comparison
            .clone()
            .foldl(
                select! {
                    Token::StrictEq => BinaryOp::StrictEq,
                    Token::StrictNe => BinaryOp::StrictNe,
                    Token::Eq => BinaryOp::Eq,
                    Token::Ne => BinaryOp::Ne,
                }
                .then(comparison)
                .repeated(),
                binary,
            )
            .boxed();

        let and = equality
            .clone()
            .foldl(
                just(Token::And).to(BinaryOp::And).then(equality).repeated(),
                binary,
            )
            .boxed();

        let or = and
            .clone()
            .foldl(
                select! {
                    Token::Or => BinaryOp::Or,
                    Token::Nullish => BinaryOp::Nullish,
                }
                .then(and)
                .repeated(),
                binary,
            )
            .boxed();

        let conditional = or
            .then(
                just(Token::Question)
                    .ignore_then(expr.clone())
                    .then_ignore(just(Token::Colon))
                    .then(expr.clone())
                    .or_not(),
            )
            .map(|(test, branches)| match branches {
                None => test,
                Some((consequent, alternate)) => {
                    let span = test.span.start..alternate.span.end;
                    Spanned::new(
                        Expr::Conditional {
                            test: Box::new(test),
                            consequent: Box::new(consequent),
                            alternate: Box::new(alternate),
                        },
                        span,
                    )
                }
            });

        // `x => ...`, `(a, b) => ...` and `() => ...`
        let params = choice((
            name.clone().map(|n| vec![n]),
            name.separated_by(just(Token::Comma))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        ));
        let arrow = params
            .then_ignore(just(Token::Arrow))
            .then(expr.clone())
            .map_with(|(params, body), e| {
                Spanned::new(
                    Expr::Arrow {
                        params,
                        body: Rc::new(body),
                    },
                    span_range(&e.span()),
                )
            });

        // Arrow first: its parameter list also parses as an identifier or
        // parenthesized expression
        choice((arrow, conditional)).boxed()
    })
}
