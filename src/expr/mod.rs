//! Restricted expression language
//!
//! A pure, JavaScript-flavoured subset: literals, member access, calls of
//! whitelisted helpers, arrow functions and the usual operators. There is no
//! assignment and no I/O.

pub mod ast;
pub mod builtins;
pub mod eval;
pub mod grammar;
pub mod lexer;
pub mod protect;
pub mod value;

use tracing::trace;

use crate::context::Context;

pub use crate::error::ExprError;
pub use eval::{EvalLimits, Evaluator, Globals};
pub use protect::protect;
pub use value::Value;

/// Evaluate one expression against a context and convert the result to text
pub fn evaluate(source: &str, context: &Context) -> Result<String, ExprError> {
    evaluate_in(source, &Globals::new(context), &EvalLimits::default())
}

/// Evaluate with globals built once per render
pub(crate) fn evaluate_in(
    source: &str,
    globals: &Globals,
    limits: &EvalLimits,
) -> Result<String, ExprError> {
    let code = protect(source);
    trace!(expression = source, "evaluating expression");
    let ast = grammar::parse(&code)?;
    let value = Evaluator::new(globals, *limits).eval(&ast, &None)?;
    Ok(value.render())
}
