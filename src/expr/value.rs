//! Runtime values of the expression language
//!
//! Values follow JavaScript's conversion rules closely enough that templates
//! written for a JavaScript-evaluated site render the same text: numbers
//! print in shortest round-trip form, `+` concatenates as soon as one side is
//! a string, and truthiness treats `0`, `""`, `NaN`, `null` and `undefined`
//! as false.

use std::cmp::Ordering;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::expr::ast::{Expr, Spanned};
use crate::expr::eval::Env;

/// A user-written arrow function with its captured scope
#[derive(Debug)]
pub struct Closure {
    pub params: Vec<String>,
    pub body: Rc<Spanned<Expr>>,
    pub env: Env,
}

#[derive(Debug, Clone)]
pub enum Function {
    Closure(Rc<Closure>),
    /// Global helper such as `Math.max` or `parseInt`
    Native(&'static str),
    /// Method bound to its receiver, e.g. `items.map`
    Method {
        receiver: Box<Value>,
        name: &'static str,
    },
}

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Rc<Vec<Value>>),
    Object(Rc<IndexMap<String, Value>>),
    Function(Function),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }

    pub fn object(entries: IndexMap<String, Value>) -> Self {
        Value::Object(Rc::new(entries))
    }

    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// JSON form as `JSON.stringify` sees it: `undefined` and functions are
    /// dropped from objects and become `null` inside arrays, non-finite
    /// numbers become `null`.
    pub fn to_json(&self) -> Option<Json> {
        match self {
            Value::Undefined | Value::Function(_) => None,
            Value::Null => Some(Json::Null),
            Value::Bool(b) => Some(Json::Bool(*b)),
            Value::Number(n) => Some(number_to_json(*n)),
            Value::String(s) => Some(Json::String(s.clone())),
            Value::Array(items) => Some(Json::Array(
                items
                    .iter()
                    .map(|v| v.to_json().unwrap_or(Json::Null))
                    .collect(),
            )),
            Value::Object(map) => Some(Json::Object(
                map.iter()
                    .filter_map(|(k, v)| v.to_json().map(|j| (k.clone(), j)))
                    .collect(),
            )),
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
        }
    }

    /// Result of `typeof`
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Array(_) | Value::Object(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
        }
    }

    /// `String(value)`
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|v| match v {
                    Value::Undefined | Value::Null => String::new(),
                    other => other.to_js_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Function(_) => "function".to_string(),
        }
    }

    /// Text written into the template for an expression result. Containers
    /// render as compact JSON, everything else as `String(value)`.
    pub fn render(&self) -> String {
        match self {
            Value::Array(_) | Value::Object(_) => self
                .to_json()
                .map(|json| json.to_string())
                .unwrap_or_default(),
            other => other.to_js_string(),
        }
    }

    /// `Number(value)`
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Array(_) => string_to_number(&self.to_js_string()),
            Value::Object(_) | Value::Function(_) => f64::NAN,
        }
    }

    /// `===`
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(Function::Closure(a)), Value::Function(Function::Closure(b))) => {
                Rc::ptr_eq(a, b)
            }
            (Value::Function(Function::Native(a)), Value::Function(Function::Native(b))) => {
                a == b
            }
            _ => false,
        }
    }

    /// `==`
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => {
                let (a, b) = (self.to_number(), other.to_number());
                a == b
            }
            (Value::Array(_), Value::String(_)) | (Value::Array(_), Value::Number(_)) => {
                Value::String(self.to_js_string()).loose_eq(other)
            }
            (Value::String(_), Value::Array(_)) | (Value::Number(_), Value::Array(_)) => {
                self.loose_eq(&Value::String(other.to_js_string()))
            }
            _ => self.strict_eq(other),
        }
    }

    /// `SameValueZero`, used by `includes`
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_eq(other),
        }
    }

    /// `+`: concatenation when either side is a string or a container
    pub fn add(&self, other: &Value) -> Value {
        let stringy = |v: &Value| {
            matches!(
                v,
                Value::String(_) | Value::Array(_) | Value::Object(_) | Value::Function(_)
            )
        };
        if stringy(self) || stringy(other) {
            let mut s = self.to_js_string();
            s.push_str(&other.to_js_string());
            Value::String(s)
        } else {
            Value::Number(self.to_number() + other.to_number())
        }
    }

    /// Relational comparison. `None` when either side is `NaN`.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => self.to_number().partial_cmp(&other.to_number()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

fn number_to_json(n: f64) -> Json {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        Json::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Json::Number)
            .unwrap_or(Json::Null)
    }
}

/// `Number(string)`: surrounding whitespace ignored, empty is `0`, anything
/// that is not a complete numeric literal is `NaN`
pub fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    let (sign, digits) = match s.as_bytes()[0] {
        b'-' => (-1.0, &s[1..]),
        b'+' => (1.0, &s[1..]),
        _ => (1.0, s),
    };
    if digits == "Infinity" {
        return sign * f64::INFINITY;
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(rest) = s.strip_prefix(prefix) {
            return u64::from_str_radix(rest, radix)
                .map(|n| n as f64)
                .unwrap_or(f64::NAN);
        }
    }
    let numeric = digits
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !numeric {
        return f64::NAN;
    }
    digits.parse::<f64>().map(|n| sign * n).unwrap_or(f64::NAN)
}

/// Format a number the way JavaScript's `String(number)` does
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if (1e-6..1e21).contains(&abs) {
        return format!("{}", n);
    }
    // exponent form: `1e+21`, `1.5e-7`
    let formatted = format!("{:e}", n);
    match formatted.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
        _ => formatted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1.5e-7), "1.5e-7");
        assert_eq!(format_number(123456789.0), "123456789");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number(" 42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("-1.5e2"), -150.0);
        assert_eq!(string_to_number("0x1A"), 26.0);
        assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
        assert!(string_to_number("12px").is_nan());
        assert!(string_to_number("inf").is_nan());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(Value::array(vec![]).is_truthy());
        assert!(Value::from("0").is_truthy());
    }

    #[test]
    fn test_add_concatenates_with_js_rules() {
        let list = Value::array(vec![1.0.into(), 2.0.into()]);
        assert_eq!(Value::from("n=").add(&1.0.into()).to_js_string(), "n=1");
        assert_eq!(Value::from(1.0).add(&2.0.into()).to_js_string(), "3");
        assert_eq!(list.add(&Value::from("")).to_js_string(), "1,2");
        assert_eq!(Value::Bool(true).add(&1.0.into()).to_js_string(), "2");
    }

    #[test]
    fn test_render_containers_as_json() {
        let value = Value::from_json(&json!({"a": [1, 2.5, null], "b": "x"}));
        assert_eq!(value.render(), r#"{"a":[1,2.5,null],"b":"x"}"#);
        assert_eq!(Value::from("text").render(), "text");
        assert_eq!(Value::Undefined.render(), "undefined");
        assert_eq!(Value::Number(3.0).render(), "3");
    }

    #[test]
    fn test_to_json_drops_undefined_members() {
        let mut map = IndexMap::new();
        map.insert("keep".to_string(), Value::Number(1.0));
        map.insert("drop".to_string(), Value::Undefined);
        let value = Value::object(map);
        assert_eq!(value.to_json(), Some(json!({"keep": 1})));
        let list = Value::array(vec![Value::Undefined, Value::Number(f64::NAN)]);
        assert_eq!(list.to_json(), Some(json!([null, null])));
    }

    #[test]
    fn test_equality() {
        assert!(Value::Null.loose_eq(&Value::Undefined));
        assert!(!Value::Null.strict_eq(&Value::Undefined));
        assert!(Value::from("1").loose_eq(&Value::Number(1.0)));
        assert!(!Value::from("1").strict_eq(&Value::Number(1.0)));
        assert!(!Value::Number(f64::NAN).strict_eq(&Value::Number(f64::NAN)));
        assert!(Value::Number(f64::NAN).same_value_zero(&Value::Number(f64::NAN)));
        assert!(!Value::Null.loose_eq(&Value::Number(0.0)));
    }

    #[test]
    fn test_compare() {
        assert_eq!(Value::from("a").compare(&"b".into()), Some(Ordering::Less));
        assert_eq!(Value::from("10").compare(&9.0.into()), Some(Ordering::Greater));
        assert_eq!(Value::Undefined.compare(&1.0.into()), None);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Null.type_name(), "object");
        assert_eq!(Value::Function(Function::Native("parseInt")).type_name(), "function");
        assert_eq!(Value::from("s").type_name(), "string");
    }
}
