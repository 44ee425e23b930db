//! Tree-walking evaluator
//!
//! Every node visit costs one step against [`EvalLimits::step_budget`], so a
//! template can not hang a build with a runaway `reduce`. Closure calls are
//! bounded by [`EvalLimits::max_call_depth`].

use std::cmp::Ordering;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::config::RenderConfig;
use crate::context::Context;
use crate::error::ExprError;
use crate::expr::ast::*;
use crate::expr::builtins;
use crate::expr::value::{format_number, Closure, Function, Value};

/// Lexical scope chain of arrow-function parameters
pub type Env = Option<Rc<Frame>>;

#[derive(Debug)]
pub struct Frame {
    bindings: Vec<(String, Value)>,
    parent: Env,
}

/// Names visible to every expression of one render: the built-in helpers
/// overlaid by the context, so context keys shadow globals.
#[derive(Debug, Clone)]
pub struct Globals {
    bindings: IndexMap<String, Value>,
}

impl Globals {
    pub fn new(context: &Context) -> Self {
        let mut bindings = builtins::globals();
        for (key, value) in context.iter() {
            bindings.insert(key.clone(), Value::from_json(value));
        }
        Self { bindings }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

/// Resource bounds for a single expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalLimits {
    pub step_budget: u64,
    pub max_call_depth: usize,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            step_budget: 1_000_000,
            max_call_depth: 256,
        }
    }
}

impl From<&RenderConfig> for EvalLimits {
    fn from(config: &RenderConfig) -> Self {
        Self {
            step_budget: config.step_budget,
            max_call_depth: config.max_call_depth,
        }
    }
}

pub struct Evaluator<'g> {
    globals: &'g Globals,
    limits: EvalLimits,
    steps: u64,
    depth: usize,
}

impl<'g> Evaluator<'g> {
    pub fn new(globals: &'g Globals, limits: EvalLimits) -> Self {
        Self {
            globals,
            limits,
            steps: 0,
            depth: 0,
        }
    }

    pub fn eval(&mut self, expr: &Spanned<Expr>, env: &Env) -> Result<Value, ExprError> {
        Ok(self.eval_chain(expr, env)?.unwrap_or_default())
    }

    pub(crate) fn tick(&mut self, span: &Span) -> Result<(), ExprError> {
        self.steps += 1;
        if self.steps > self.limits.step_budget {
            return Err(ExprError::runtime(
                span.clone(),
                format!("step budget of {} exhausted", self.limits.step_budget),
            ));
        }
        Ok(())
    }

    /// Evaluate, with `None` meaning an optional chain short-circuited
    fn eval_chain(&mut self, expr: &Spanned<Expr>, env: &Env) -> Result<Option<Value>, ExprError> {
        self.tick(&expr.span)?;
        let value = match &expr.node {
            Expr::Undefined => Value::Undefined,
            Expr::Null => Value::Null,
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Number(n) => Value::Number(*n),
            Expr::String(s) => Value::String(s.clone()),
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => out.push_str(text),
                        TemplatePart::Expr(inner) => out.push_str(&self.eval(inner, env)?.render()),
                    }
                }
                Value::String(out)
            }
            Expr::Ident(name) => self.lookup(name, env).ok_or_else(|| {
                ExprError::runtime(expr.span.clone(), format!("{} is not defined", name))
            })?,
            Expr::Array(items) => Value::array(
                items
                    .iter()
                    .map(|item| self.eval(item, env))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::Object(props) => {
                let mut map = IndexMap::new();
                for (key, value) in props {
                    map.insert(key.clone(), self.eval(value, env)?);
                }
                Value::object(map)
            }
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let Some(target) = self.eval_chain(object, env)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                property_of(&target, property, &expr.span)?
            }
            Expr::Index {
                object,
                index,
                optional,
            } => {
                let Some(target) = self.eval_chain(object, env)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = match self.eval(index, env)? {
                    Value::Number(n) => format_number(n),
                    other => other.to_js_string(),
                };
                property_of(&target, &key, &expr.span)?
            }
            Expr::Call { callee, args } => {
                let Some(function) = self.eval_chain(callee, env)? else {
                    return Ok(None);
                };
                if !matches!(function, Value::Function(_)) {
                    return Err(ExprError::runtime(
                        callee.span.clone(),
                        format!("{} is not a function", describe(&callee.node)),
                    ));
                }
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, env))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(&function, args, &expr.span)?
            }
            Expr::Arrow { params, body } => Value::Function(Function::Closure(Rc::new(Closure {
                params: params.clone(),
                body: Rc::clone(body),
                env: env.clone(),
            }))),
            Expr::Unary { op, operand } => {
                // `typeof missing` is "undefined", not an error
                if let (UnaryOp::Typeof, Expr::Ident(name)) = (op, &operand.node) {
                    let type_name = self
                        .lookup(name, env)
                        .map_or("undefined", |v| v.type_name());
                    return Ok(Some(Value::from(type_name)));
                }
                let value = self.eval(operand, env)?;
                match op {
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::Typeof => Value::from(value.type_name()),
                }
            }
            Expr::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, env)?,
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.is_truthy() {
                    self.eval(consequent, env)?
                } else {
                    self.eval(alternate, env)?
                }
            }
        };
        Ok(Some(value))
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        lhs: &Spanned<Expr>,
        rhs: &Spanned<Expr>,
        env: &Env,
    ) -> Result<Value, ExprError> {
        let left = self.eval(lhs, env)?;
        let right = match op {
            BinaryOp::And if !left.is_truthy() => return Ok(left),
            BinaryOp::Or if left.is_truthy() => return Ok(left),
            BinaryOp::Nullish if !left.is_nullish() => return Ok(left),
            _ => self.eval(rhs, env)?,
        };
        Ok(match op {
            BinaryOp::And | BinaryOp::Or | BinaryOp::Nullish => right,
            BinaryOp::Add => left.add(&right),
            BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
            BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
            BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
            BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
            BinaryOp::Lt => Value::Bool(left.compare(&right) == Some(Ordering::Less)),
            BinaryOp::Le => Value::Bool(matches!(
                left.compare(&right),
                Some(Ordering::Less | Ordering::Equal)
            )),
            BinaryOp::Gt => Value::Bool(left.compare(&right) == Some(Ordering::Greater)),
            BinaryOp::Ge => Value::Bool(matches!(
                left.compare(&right),
                Some(Ordering::Greater | Ordering::Equal)
            )),
            BinaryOp::StrictEq => Value::Bool(left.strict_eq(&right)),
            BinaryOp::StrictNe => Value::Bool(!left.strict_eq(&right)),
            BinaryOp::Eq => Value::Bool(left.loose_eq(&right)),
            BinaryOp::Ne => Value::Bool(!left.loose_eq(&right)),
        })
    }

    /// Call a function value with already evaluated arguments
    pub(crate) fn call(
        &mut self,
        function: &Value,
        args: Vec<Value>,
        span: &Span,
    ) -> Result<Value, ExprError> {
        match function {
            Value::Function(Function::Closure(closure)) => {
                if self.depth >= self.limits.max_call_depth {
                    return Err(ExprError::runtime(
                        span.clone(),
                        format!(
                            "maximum call depth of {} exceeded",
                            self.limits.max_call_depth
                        ),
                    ));
                }
                let mut args = args.into_iter();
                let bindings = closure
                    .params
                    .iter()
                    .map(|param| (param.clone(), args.next().unwrap_or_default()))
                    .collect();
                let frame = Rc::new(Frame {
                    bindings,
                    parent: closure.env.clone(),
                });
                self.depth += 1;
                let result = self.eval(&closure.body, &Some(frame));
                self.depth -= 1;
                result
            }
            Value::Function(Function::Native(name)) => builtins::call_native(name, &args, span),
            Value::Function(Function::Method { receiver, name }) => {
                builtins::call_method(self, receiver, name, args, span)
            }
            other => Err(ExprError::runtime(
                span.clone(),
                format!("{} is not a function", other.type_name()),
            )),
        }
    }

    fn lookup(&self, name: &str, env: &Env) -> Option<Value> {
        let mut frame = env.as_deref();
        while let Some(current) = frame {
            if let Some((_, value)) = current.bindings.iter().rev().find(|(n, _)| n == name) {
                return Some(value.clone());
            }
            frame = current.parent.as_deref();
        }
        self.globals.get(name).cloned()
    }
}

fn property_of(target: &Value, key: &str, span: &Span) -> Result<Value, ExprError> {
    if target.is_nullish() {
        return Err(ExprError::runtime(
            span.clone(),
            format!(
                "Cannot read properties of {} (reading '{}')",
                target.to_js_string(),
                key
            ),
        ));
    }
    Ok(builtins::get_property(target, key))
}

/// Short source-like description of a callee for error messages
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::Member {
            object, property, ..
        } => format!("{}.{}", describe(&object.node), property),
        Expr::Index { object, .. } => format!("{}[...]", describe(&object.node)),
        Expr::Call { callee, .. } => format!("{}(...)", describe(&callee.node)),
        _ => "expression".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::grammar::parse;
    use serde_json::json;

    fn eval_with(source: &str, context: &Context, limits: EvalLimits) -> Result<Value, ExprError> {
        let globals = Globals::new(context);
        let ast = parse(source)?;
        Evaluator::new(&globals, limits).eval(&ast, &None)
    }

    fn run(source: &str) -> String {
        let context = Context::new()
            .with("n", 3)
            .with("name", "Amy")
            .with("items", json!(["a", "b"]))
            .with("user", json!({"address": {"city": "Oslo"}, "tags": []}));
        eval_with(source, &context, EvalLimits::default())
            .expect("Should evaluate")
            .render()
    }

    fn run_err(source: &str) -> ExprError {
        eval_with(source, &Context::new(), EvalLimits::default()).unwrap_err()
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        assert_eq!(run("1 + 1"), "2");
        assert_eq!(run("2 + 3 * 4"), "14");
        assert_eq!(run("(2 + 3) * 4"), "20");
        assert_eq!(run("7 % 4 - -1"), "4");
        assert_eq!(run("1 / 0"), "Infinity");
    }

    #[test]
    fn test_context_lookup_and_concatenation() {
        assert_eq!(run("name"), "Amy");
        assert_eq!(run("'Hi ' + name + '!'"), "Hi Amy!");
        assert_eq!(run("n + '1'"), "31");
    }

    #[test]
    fn test_logical_operators_return_operands() {
        assert_eq!(run("0 || 'fallback'"), "fallback");
        assert_eq!(run("name && n"), "3");
        assert_eq!(run("null ?? 'dflt'"), "dflt");
        assert_eq!(run("0 ?? 'dflt'"), "0");
    }

    #[test]
    fn test_short_circuit_skips_errors() {
        assert_eq!(run("false && missing.deep"), "false");
        assert_eq!(run("true || missing()"), "true");
    }

    #[test]
    fn test_conditional() {
        assert_eq!(run("n > 2 ? 'big' : 'small'"), "big");
        assert_eq!(run("n === 3 ? 'three' : n"), "three");
    }

    #[test]
    fn test_member_and_index_access() {
        assert_eq!(run("user.address.city"), "Oslo");
        assert_eq!(run("user['address'].city"), "Oslo");
        assert_eq!(run("items[1]"), "b");
        assert_eq!(run("items.length"), "2");
        assert_eq!(run("user.missing"), "undefined");
    }

    #[test]
    fn test_optional_chaining_short_circuits_whole_chain() {
        assert_eq!(run("user.missing?.deep.deeper"), "undefined");
        assert_eq!(run("user?.address?.city"), "Oslo");
    }

    #[test]
    fn test_arrow_closures_capture_scope() {
        assert_eq!(run("items.map(i => i + n).join('-')"), "a3-b3");
        assert_eq!(run("((a) => (b) => a + b)(1)(2)"), "3");
    }

    #[test]
    fn test_template_literal_interpolation() {
        assert_eq!(run("`<li>${name}</li>`"), "<li>Amy</li>");
        assert_eq!(run("`${items}`"), r#"["a","b"]"#);
    }

    #[test]
    fn test_object_and_array_results_render_as_json() {
        assert_eq!(run("{a: 1, b: [true, null]}"), r#"{"a":1,"b":[true,null]}"#);
        assert_eq!(run("[n, name]"), r#"[3,"Amy"]"#);
    }

    #[test]
    fn test_typeof() {
        assert_eq!(run("typeof name"), "string");
        assert_eq!(run("typeof nothing"), "undefined");
        assert_eq!(run("typeof (x => x)"), "function");
    }

    #[test]
    fn test_context_shadows_globals() {
        let context = Context::new().with("Math", "mine");
        let value = eval_with("Math", &context, EvalLimits::default()).expect("Should evaluate");
        assert_eq!(value.render(), "mine");
    }

    #[test]
    fn test_undefined_identifier_error() {
        let err = run_err("missing + 1");
        assert!(!err.is_syntax());
        assert_eq!(err.message, "missing is not defined");
        assert_eq!(err.span, 0..7);
    }

    #[test]
    fn test_property_of_undefined_error() {
        let err = run_err("undefined.x");
        assert_eq!(err.message, "Cannot read properties of undefined (reading 'x')");
    }

    #[test]
    fn test_call_non_function_error() {
        let err = run_err("Math.nope(1)");
        assert_eq!(err.message, "Math.nope is not a function");
    }

    #[test]
    fn test_step_budget_exhaustion() {
        let limits = EvalLimits {
            step_budget: 50,
            max_call_depth: 256,
        };
        let err = eval_with(
            "[1,2,3,4,5,6,7,8,9,10].map(x => x * 2 + 1)",
            &Context::new(),
            limits,
        )
        .unwrap_err();
        assert_eq!(err.message, "step budget of 50 exhausted");
    }

    #[test]
    fn test_call_depth_limit() {
        let limits = EvalLimits {
            step_budget: 1_000_000,
            max_call_depth: 2,
        };
        let err = eval_with("(a => (b => (c => c)(b))(a))(1)", &Context::new(), limits)
            .unwrap_err();
        assert_eq!(err.message, "maximum call depth of 2 exceeded");
    }
}
