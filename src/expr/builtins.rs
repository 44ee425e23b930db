//! Whitelisted pure helpers: globals and methods on arrays, strings and numbers
//!
//! Methods never mutate their receiver; `reverse` and `sort` return copies.
//! String positions count Unicode scalar values.

use std::rc::Rc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value as Json;

use crate::error::ExprError;
use crate::expr::ast::Span;
use crate::expr::eval::Evaluator;
use crate::expr::value::{format_number, string_to_number, Function, Value};

/// Characters `encodeURIComponent` leaves alone besides ASCII alphanumerics
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

static FLOAT_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(Infinity|([0-9]+\.?[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?)")
        .expect("valid regex")
});

const MATH: [&str; 10] = [
    "Math.abs",
    "Math.ceil",
    "Math.floor",
    "Math.round",
    "Math.trunc",
    "Math.sign",
    "Math.min",
    "Math.max",
    "Math.pow",
    "Math.sqrt",
];
const JSON_FNS: [&str; 2] = ["JSON.stringify", "JSON.parse"];
const OBJECT_FNS: [&str; 4] = [
    "Object.keys",
    "Object.values",
    "Object.entries",
    "Object.fromEntries",
];
const ARRAY_FNS: [&str; 1] = ["Array.isArray"];
const FUNCTIONS: [&str; 7] = [
    "String",
    "Number",
    "Boolean",
    "parseInt",
    "parseFloat",
    "isNaN",
    "encodeURIComponent",
];

const ARRAY_METHODS: [&str; 18] = [
    "map",
    "filter",
    "find",
    "findIndex",
    "some",
    "every",
    "reduce",
    "join",
    "includes",
    "indexOf",
    "slice",
    "concat",
    "reverse",
    "sort",
    "flat",
    "flatMap",
    "at",
    "toString",
];
const STRING_METHODS: [&str; 21] = [
    "toUpperCase",
    "toLowerCase",
    "trim",
    "trimStart",
    "trimEnd",
    "split",
    "includes",
    "startsWith",
    "endsWith",
    "indexOf",
    "slice",
    "substring",
    "replace",
    "replaceAll",
    "repeat",
    "padStart",
    "padEnd",
    "charAt",
    "at",
    "concat",
    "toString",
];
/// Longest string `repeat` (in bytes) or `padStart`/`padEnd` (in characters)
/// will build
const MAX_STRING_LEN: usize = 1 << 28;

const NUMBER_METHODS: [&str; 2] = ["toFixed", "toString"];
const COMMON_METHODS: [&str; 1] = ["toString"];

fn members(functions: &[&'static str]) -> IndexMap<String, Value> {
    functions
        .iter()
        .map(|&name| {
            let member = name.split_once('.').map_or(name, |(_, member)| member);
            (member.to_string(), Value::Function(Function::Native(name)))
        })
        .collect()
}

/// Built-in global bindings
pub(crate) fn globals() -> IndexMap<String, Value> {
    let mut globals = IndexMap::new();

    let mut math = members(&MATH);
    math.insert("PI".to_string(), Value::Number(std::f64::consts::PI));
    math.insert("E".to_string(), Value::Number(std::f64::consts::E));
    globals.insert("Math".to_string(), Value::object(math));

    globals.insert("JSON".to_string(), Value::object(members(&JSON_FNS)));
    globals.insert("Object".to_string(), Value::object(members(&OBJECT_FNS)));
    globals.insert("Array".to_string(), Value::object(members(&ARRAY_FNS)));
    for name in FUNCTIONS {
        globals.insert(name.to_string(), Value::Function(Function::Native(name)));
    }
    globals.insert("NaN".to_string(), Value::Number(f64::NAN));
    globals.insert("Infinity".to_string(), Value::Number(f64::INFINITY));
    globals
}

fn bound_method(target: &Value, key: &str, names: &[&'static str]) -> Value {
    names
        .iter()
        .find(|name| **name == key)
        .map(|&name| {
            Value::Function(Function::Method {
                receiver: Box::new(target.clone()),
                name,
            })
        })
        .unwrap_or_default()
}

/// Canonical array index: digits only, no leading zeros
fn array_index(key: &str) -> Option<usize> {
    let canonical = !key.is_empty()
        && key.bytes().all(|b| b.is_ascii_digit())
        && (key == "0" || !key.starts_with('0'));
    canonical.then(|| key.parse().ok()).flatten()
}

/// Property read on a non-nullish value. Missing properties are `undefined`.
pub(crate) fn get_property(target: &Value, key: &str) -> Value {
    match target {
        Value::Array(items) => {
            if key == "length" {
                return Value::Number(items.len() as f64);
            }
            match array_index(key) {
                Some(i) => items.get(i).cloned().unwrap_or_default(),
                None => bound_method(target, key, &ARRAY_METHODS),
            }
        }
        Value::String(s) => {
            if key == "length" {
                return Value::Number(s.chars().count() as f64);
            }
            match array_index(key) {
                Some(i) => s
                    .chars()
                    .nth(i)
                    .map(|c| Value::String(c.to_string()))
                    .unwrap_or_default(),
                None => bound_method(target, key, &STRING_METHODS),
            }
        }
        Value::Object(map) => match map.get(key) {
            Some(value) => value.clone(),
            None => bound_method(target, key, &COMMON_METHODS),
        },
        Value::Number(_) => bound_method(target, key, &NUMBER_METHODS),
        Value::Bool(_) => bound_method(target, key, &COMMON_METHODS),
        Value::Function(_) | Value::Undefined | Value::Null => Value::Undefined,
    }
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

fn not_a_function(span: &Span, what: &str) -> ExprError {
    ExprError::runtime(span.clone(), format!("{} is not a function", what))
}

fn invalid_length(span: &Span) -> ExprError {
    ExprError::runtime(span.clone(), "Invalid string length")
}

fn callback(args: &[Value], span: &Span) -> Result<Value, ExprError> {
    match args.first() {
        Some(f @ Value::Function(_)) => Ok(f.clone()),
        other => Err(not_a_function(
            span,
            other.map_or("undefined", Value::type_name),
        )),
    }
}

/// Resolve a possibly negative position against `len`, clamped to `0..=len`
fn relative(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = value.to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    let len = len as f64;
    let pos = if n < 0.0 { (len + n).max(0.0) } else { n.min(len) };
    pos as usize
}

/// Index for `at`: negative counts from the end, `None` when out of range
fn at_index(value: &Value, len: usize) -> Option<usize> {
    let n = value.to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    let idx = if n < 0.0 { len as f64 + n } else { n };
    (idx >= 0.0 && idx < len as f64).then_some(idx as usize)
}

pub(crate) fn call_native(name: &str, args: &[Value], span: &Span) -> Result<Value, ExprError> {
    let num = |i: usize| arg(args, i).to_number();
    let value = match name {
        "Math.abs" => Value::Number(num(0).abs()),
        "Math.ceil" => Value::Number(num(0).ceil()),
        "Math.floor" => Value::Number(num(0).floor()),
        "Math.round" => Value::Number((num(0) + 0.5).floor()),
        "Math.trunc" => Value::Number(num(0).trunc()),
        "Math.sign" => {
            let n = num(0);
            Value::Number(if n == 0.0 || n.is_nan() { n } else { n.signum() })
        }
        "Math.min" => Value::Number(args.iter().map(Value::to_number).fold(
            f64::INFINITY,
            |acc, n| if acc.is_nan() || n.is_nan() { f64::NAN } else { acc.min(n) },
        )),
        "Math.max" => Value::Number(args.iter().map(Value::to_number).fold(
            f64::NEG_INFINITY,
            |acc, n| if acc.is_nan() || n.is_nan() { f64::NAN } else { acc.max(n) },
        )),
        "Math.pow" => Value::Number(num(0).powf(num(1))),
        "Math.sqrt" => Value::Number(num(0).sqrt()),
        "JSON.stringify" => json_stringify(&arg(args, 0), &arg(args, 2), span)?,
        "JSON.parse" => {
            let text = arg(args, 0).to_js_string();
            let json: Json = serde_json::from_str(&text).map_err(|err| {
                ExprError::runtime(span.clone(), format!("JSON.parse: {}", err))
            })?;
            Value::from_json(&json)
        }
        "Object.keys" => Value::array(
            entries(&arg(args, 0))
                .into_iter()
                .map(|(k, _)| Value::String(k))
                .collect(),
        ),
        "Object.values" => Value::array(entries(&arg(args, 0)).into_iter().map(|(_, v)| v).collect()),
        "Object.entries" => Value::array(
            entries(&arg(args, 0))
                .into_iter()
                .map(|(k, v)| Value::array(vec![Value::String(k), v]))
                .collect(),
        ),
        "Object.fromEntries" => from_entries(&arg(args, 0), span)?,
        "Array.isArray" => Value::Bool(matches!(arg(args, 0), Value::Array(_))),
        "String" => Value::String(args.first().map_or_else(String::new, Value::to_js_string)),
        "Number" => Value::Number(args.first().map_or(0.0, Value::to_number)),
        "Boolean" => Value::Bool(arg(args, 0).is_truthy()),
        "parseInt" => Value::Number(parse_int(&arg(args, 0).to_js_string(), &arg(args, 1))),
        "parseFloat" => Value::Number(parse_float(&arg(args, 0).to_js_string())),
        "isNaN" => Value::Bool(num(0).is_nan()),
        "encodeURIComponent" => Value::String(
            utf8_percent_encode(&arg(args, 0).to_js_string(), URI_COMPONENT).to_string(),
        ),
        other => return Err(not_a_function(span, other)),
    };
    Ok(value)
}

fn json_stringify(value: &Value, indent: &Value, span: &Span) -> Result<Value, ExprError> {
    let Some(json) = value.to_json() else {
        return Ok(Value::Undefined);
    };
    let indent = match indent {
        Value::Number(n) if *n >= 1.0 => " ".repeat(n.min(10.0) as usize),
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };
    if indent.is_empty() {
        return Ok(Value::String(json.to_string()));
    }
    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(indent.as_bytes()));
    json.serialize(&mut serializer)
        .map_err(|err| ExprError::runtime(span.clone(), format!("JSON.stringify: {}", err)))?;
    Ok(Value::String(String::from_utf8_lossy(&buf).into_owned()))
}

/// Own enumerable entries as `Object.entries` sees them
fn entries(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        Value::String(s) => s
            .chars()
            .enumerate()
            .map(|(i, c)| (i.to_string(), Value::String(c.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

fn from_entries(value: &Value, span: &Span) -> Result<Value, ExprError> {
    let Value::Array(pairs) = value else {
        return Err(ExprError::runtime(
            span.clone(),
            format!("{} is not iterable", value.type_name()),
        ));
    };
    let mut map = IndexMap::new();
    for pair in pairs.iter() {
        let key = get_property_or_undefined(pair, "0").to_js_string();
        map.insert(key, get_property_or_undefined(pair, "1"));
    }
    Ok(Value::object(map))
}

fn get_property_or_undefined(value: &Value, key: &str) -> Value {
    if value.is_nullish() {
        Value::Undefined
    } else {
        get_property(value, key)
    }
}

fn parse_int(text: &str, radix: &Value) -> f64 {
    let text = text.trim_start();
    let (sign, mut digits) = match text.as_bytes().first() {
        Some(b'-') => (-1.0, &text[1..]),
        Some(b'+') => (1.0, &text[1..]),
        _ => (1.0, text),
    };
    let mut radix = match radix {
        Value::Undefined => 0,
        other => other.to_number() as u32,
    };
    if (radix == 0 || radix == 16) && (digits.starts_with("0x") || digits.starts_with("0X")) {
        digits = &digits[2..];
        radix = 16;
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let valid: Vec<u32> = digits.chars().map_while(|c| c.to_digit(radix)).collect();
    if valid.is_empty() {
        return f64::NAN;
    }
    sign * valid
        .into_iter()
        .fold(0.0, |acc, d| acc * f64::from(radix) + f64::from(d))
}

fn parse_float(text: &str) -> f64 {
    FLOAT_PREFIX
        .find(text.trim_start())
        .map_or(f64::NAN, |m| string_to_number(m.as_str()))
}

/// Call a method bound by [`get_property`]
pub(crate) fn call_method(
    eval: &mut Evaluator<'_>,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    span: &Span,
) -> Result<Value, ExprError> {
    match receiver {
        Value::Array(items) => array_method(eval, items, name, &args, span),
        Value::String(s) => string_method(eval, s, name, &args, span),
        Value::Number(n) => number_method(*n, name, &args, span),
        other if name == "toString" => Ok(Value::String(other.to_js_string())),
        _ => Err(not_a_function(span, name)),
    }
}

fn array_method(
    eval: &mut Evaluator<'_>,
    items: &Rc<Vec<Value>>,
    name: &str,
    args: &[Value],
    span: &Span,
) -> Result<Value, ExprError> {
    let receiver = Value::Array(Rc::clone(items));
    let index = |i: usize| Value::Number(i as f64);
    let value = match name {
        "map" => {
            let f = callback(args, span)?;
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(eval.call(&f, vec![item.clone(), index(i), receiver.clone()], span)?);
            }
            Value::array(out)
        }
        "filter" => {
            let f = callback(args, span)?;
            let mut out = Vec::new();
            for (i, item) in items.iter().enumerate() {
                if eval
                    .call(&f, vec![item.clone(), index(i), receiver.clone()], span)?
                    .is_truthy()
                {
                    out.push(item.clone());
                }
            }
            Value::array(out)
        }
        "find" | "findIndex" | "some" | "every" => {
            let f = callback(args, span)?;
            let mut found = None;
            for (i, item) in items.iter().enumerate() {
                let hit = eval
                    .call(&f, vec![item.clone(), index(i), receiver.clone()], span)?
                    .is_truthy();
                // `every` stops at the first miss, the others at the first hit
                if hit != (name == "every") {
                    found = Some(i);
                    break;
                }
            }
            match (name, found) {
                ("find", Some(i)) => items[i].clone(),
                ("find", None) => Value::Undefined,
                ("findIndex", Some(i)) => index(i),
                ("findIndex", None) => Value::Number(-1.0),
                ("some", found) => Value::Bool(found.is_some()),
                (_, found) => Value::Bool(found.is_none()),
            }
        }
        "reduce" => {
            let f = callback(args, span)?;
            let mut iter = items.iter().enumerate();
            let mut acc = match args.get(1) {
                Some(initial) => initial.clone(),
                None => match iter.next() {
                    Some((_, first)) => first.clone(),
                    None => {
                        return Err(ExprError::runtime(
                            span.clone(),
                            "Reduce of empty array with no initial value",
                        ))
                    }
                },
            };
            for (i, item) in iter {
                acc = eval.call(
                    &f,
                    vec![acc, item.clone(), index(i), receiver.clone()],
                    span,
                )?;
            }
            acc
        }
        "join" | "toString" => {
            let separator = match args.first() {
                Some(sep) if name == "join" && !matches!(sep, Value::Undefined) => {
                    sep.to_js_string()
                }
                _ => ",".to_string(),
            };
            Value::String(join(items, &separator))
        }
        "includes" => {
            let needle = arg(args, 0);
            Value::Bool(items.iter().any(|v| v.same_value_zero(&needle)))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            items
                .iter()
                .position(|v| v.strict_eq(&needle))
                .map_or(Value::Number(-1.0), index)
        }
        "slice" => {
            let start = relative(&arg(args, 0), items.len(), 0);
            let end = relative(&arg(args, 1), items.len(), items.len());
            Value::array(items[start..end.max(start)].to_vec())
        }
        "concat" => {
            let mut out = items.to_vec();
            for extra in args {
                match extra {
                    Value::Array(more) => out.extend(more.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Value::array(out)
        }
        "reverse" => Value::array(items.iter().rev().cloned().collect()),
        "sort" => {
            let compare = args.first().filter(|f| matches!(f, Value::Function(_))).cloned();
            let sorted = merge_sort(items.to_vec(), &mut |a: &Value, b: &Value| match &compare {
                Some(f) => Ok(eval.call(f, vec![a.clone(), b.clone()], span)?.to_number() > 0.0),
                None => Ok(default_sort_greater(a, b)),
            })?;
            Value::array(sorted)
        }
        "flat" => {
            let depth = match arg(args, 0) {
                Value::Undefined => 1.0,
                other => other.to_number(),
            };
            Value::array(flatten(items, depth))
        }
        "flatMap" => {
            let f = callback(args, span)?;
            let mut mapped = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                mapped.push(eval.call(&f, vec![item.clone(), index(i), receiver.clone()], span)?);
            }
            Value::array(flatten(&mapped, 1.0))
        }
        "at" => at_index(&arg(args, 0), items.len())
            .map(|i| items[i].clone())
            .unwrap_or_default(),
        other => return Err(not_a_function(span, other)),
    };
    Ok(value)
}

fn join(items: &[Value], separator: &str) -> String {
    items
        .iter()
        .map(|v| match v {
            Value::Undefined | Value::Null => String::new(),
            other => other.to_js_string(),
        })
        .collect::<Vec<_>>()
        .join(separator)
}

fn flatten(items: &[Value], depth: f64) -> Vec<Value> {
    let mut out = Vec::new();
    for item in items {
        match item {
            Value::Array(inner) if depth >= 1.0 => out.extend(flatten(inner, depth - 1.0)),
            other => out.push(other.clone()),
        }
    }
    out
}

/// Default sort order: `undefined` last, everything else by string form
fn default_sort_greater(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) => false,
        (Value::Undefined, _) => true,
        (_, Value::Undefined) => false,
        _ => a.to_js_string() > b.to_js_string(),
    }
}

/// Stable merge sort with a fallible comparator
fn merge_sort<F>(items: Vec<Value>, greater: &mut F) -> Result<Vec<Value>, ExprError>
where
    F: FnMut(&Value, &Value) -> Result<bool, ExprError>,
{
    if items.len() <= 1 {
        return Ok(items);
    }
    let mut left = items;
    let right = left.split_off(left.len() / 2);
    let left = merge_sort(left, greater)?;
    let right = merge_sort(right, greater)?;

    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
        if greater(a, b)? {
            out.extend(right.next());
        } else {
            out.extend(left.next());
        }
    }
    out.extend(left);
    out.extend(right);
    Ok(out)
}

fn string_method(
    eval: &mut Evaluator<'_>,
    s: &str,
    name: &str,
    args: &[Value],
    span: &Span,
) -> Result<Value, ExprError> {
    let text = |i: usize| arg(args, i).to_js_string();
    let len = s.chars().count();
    let value = match name {
        "toUpperCase" => Value::String(s.to_uppercase()),
        "toLowerCase" => Value::String(s.to_lowercase()),
        "trim" => Value::from(s.trim()),
        "trimStart" => Value::from(s.trim_start()),
        "trimEnd" => Value::from(s.trim_end()),
        "toString" => Value::from(s),
        "split" => {
            let mut parts: Vec<Value> = match arg(args, 0) {
                Value::Undefined => vec![Value::from(s)],
                separator => {
                    let separator = separator.to_js_string();
                    if separator.is_empty() {
                        s.chars().map(|c| Value::String(c.to_string())).collect()
                    } else {
                        s.split(separator.as_str()).map(Value::from).collect()
                    }
                }
            };
            if let Value::Number(limit) = arg(args, 1) {
                parts.truncate(limit.max(0.0) as usize);
            }
            Value::array(parts)
        }
        "includes" => Value::Bool(s.contains(text(0).as_str())),
        "startsWith" => {
            let from = relative(&arg(args, 1), len, 0);
            let rest: String = s.chars().skip(from).collect();
            Value::Bool(rest.starts_with(text(0).as_str()))
        }
        "endsWith" => Value::Bool(s.ends_with(text(0).as_str())),
        "indexOf" => Value::Number(
            s.find(text(0).as_str())
                .map_or(-1.0, |byte| s[..byte].chars().count() as f64),
        ),
        "slice" => {
            let start = relative(&arg(args, 0), len, 0);
            let end = relative(&arg(args, 1), len, len);
            Value::String(s.chars().skip(start).take(end.saturating_sub(start)).collect())
        }
        "substring" => {
            let clamp = |v: &Value, default: usize| match v {
                Value::Undefined => default,
                other => {
                    let n = other.to_number();
                    if n.is_nan() || n < 0.0 {
                        0
                    } else {
                        (n as usize).min(len)
                    }
                }
            };
            let a = clamp(&arg(args, 0), 0);
            let b = clamp(&arg(args, 1), len);
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            Value::String(s.chars().skip(start).take(end - start).collect())
        }
        "replace" | "replaceAll" => {
            let pattern = text(0);
            let replacement = arg(args, 1);
            let mut out = String::with_capacity(s.len());
            let mut last = 0;
            let matches: Vec<(usize, &str)> = if name == "replace" {
                s.match_indices(pattern.as_str()).take(1).collect()
            } else {
                s.match_indices(pattern.as_str()).collect()
            };
            for (pos, found) in matches {
                out.push_str(&s[last..pos]);
                let piece = match &replacement {
                    f @ Value::Function(_) => eval.call(f, vec![Value::from(found)], span)?,
                    other => other.clone(),
                };
                out.push_str(&piece.to_js_string());
                last = pos + found.len();
            }
            out.push_str(&s[last..]);
            Value::String(out)
        }
        "repeat" => {
            let count = arg(args, 0).to_number();
            if count < 0.0 || count.is_infinite() {
                return Err(ExprError::runtime(
                    span.clone(),
                    format!("Invalid count value: {}", format_number(count)),
                ));
            }
            let count = if count.is_nan() { 0 } else { count as usize };
            match s.len().checked_mul(count) {
                Some(size) if size <= MAX_STRING_LEN => Value::String(s.repeat(count)),
                _ => return Err(invalid_length(span)),
            }
        }
        "padStart" | "padEnd" => {
            let target = arg(args, 0).to_number();
            let target = if target.is_nan() { 0 } else { target.max(0.0) as usize };
            let fill = match arg(args, 1) {
                Value::Undefined => " ".to_string(),
                other => other.to_js_string(),
            };
            if target > len && !fill.is_empty() && target > MAX_STRING_LEN {
                return Err(invalid_length(span));
            }
            if target <= len || fill.is_empty() {
                Value::from(s)
            } else {
                let pad: String = fill.chars().cycle().take(target - len).collect();
                if name == "padStart" {
                    Value::String(pad + s)
                } else {
                    Value::String(format!("{}{}", s, pad))
                }
            }
        }
        "charAt" => {
            let n = arg(args, 0).to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            let c = (n >= 0.0).then(|| s.chars().nth(n as usize)).flatten();
            Value::String(c.map(String::from).unwrap_or_default())
        }
        "at" => at_index(&arg(args, 0), len)
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or_default(),
        "concat" => {
            let mut out = s.to_string();
            for extra in args {
                out.push_str(&extra.to_js_string());
            }
            Value::String(out)
        }
        other => return Err(not_a_function(span, other)),
    };
    Ok(value)
}

fn number_method(n: f64, name: &str, args: &[Value], span: &Span) -> Result<Value, ExprError> {
    match name {
        "toFixed" => {
            let digits = match arg(args, 0) {
                Value::Undefined => 0.0,
                other => other.to_number(),
            };
            if !(0.0..=100.0).contains(&digits) {
                return Err(ExprError::runtime(
                    span.clone(),
                    "toFixed() digits argument must be between 0 and 100",
                ));
            }
            if !n.is_finite() || n.abs() >= 1e21 {
                return Ok(Value::String(format_number(n)));
            }
            Ok(Value::String(format!("{:.*}", digits as usize, n)))
        }
        "toString" => {
            let radix = match arg(args, 0) {
                Value::Undefined => 10,
                other => other.to_number() as u32,
            };
            if !(2..=36).contains(&radix) {
                return Err(ExprError::runtime(
                    span.clone(),
                    "toString() radix must be between 2 and 36",
                ));
            }
            if radix == 10 || !n.is_finite() || n.fract() != 0.0 {
                return Ok(Value::String(format_number(n)));
            }
            Ok(Value::String(integer_to_radix(n, radix)))
        }
        other => Err(not_a_function(span, other)),
    }
}

fn integer_to_radix(n: f64, radix: u32) -> String {
    let mut value = n.abs() as u128;
    let mut digits = Vec::new();
    loop {
        let digit = (value % u128::from(radix)) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('0'));
        value /= u128::from(radix);
        if value == 0 {
            break;
        }
    }
    if n < 0.0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use crate::context::Context;
    use crate::expr::evaluate;
    use serde_json::json;

    fn run(source: &str) -> String {
        let context = Context::new()
            .with("items", json!([3, 1, 2]))
            .with("words", json!(["pear", "apple", "fig"]))
            .with("user", json!({"name": "Amy", "age": 30}))
            .with("title", "  Hello World  ");
        evaluate(source, &context).expect("Should evaluate")
    }

    #[test]
    fn test_math() {
        assert_eq!(run("Math.max(1, 5, 3)"), "5");
        assert_eq!(run("Math.min()"), "Infinity");
        assert_eq!(run("Math.round(2.5)"), "3");
        assert_eq!(run("Math.round(-2.5)"), "-2");
        assert_eq!(run("Math.floor(Math.PI * 100) / 100"), "3.14");
        assert_eq!(run("Math.pow(2, 10)"), "1024");
        assert_eq!(run("Math.sign(-4)"), "-1");
    }

    #[test]
    fn test_json() {
        assert_eq!(run("JSON.stringify(user)"), r#"{"name":"Amy","age":30}"#);
        assert_eq!(
            run("JSON.stringify([1], null, 2)"),
            "[\n  1\n]"
        );
        assert_eq!(run("JSON.stringify('a')"), r#""a""#);
        assert_eq!(run("JSON.parse('{\"a\": [1, 2]}').a[1]"), "2");
    }

    #[test]
    fn test_object_helpers() {
        assert_eq!(run("Object.keys(user).join(',')"), "name,age");
        assert_eq!(run("Object.values(user)"), r#"["Amy",30]"#);
        assert_eq!(
            run("Object.entries(user).map(e => e[0])"),
            r#"["name","age"]"#
        );
        assert_eq!(
            run("Object.fromEntries([['a', 1], ['b', 2]])"),
            r#"{"a":1,"b":2}"#
        );
    }

    #[test]
    fn test_conversions() {
        assert_eq!(run("String(12) + Number('3')"), "123");
        assert_eq!(run("Boolean('')"), "false");
        assert_eq!(run("parseInt('42px')"), "42");
        assert_eq!(run("parseInt('ff', 16)"), "255");
        assert_eq!(run("parseInt('0x1f')"), "31");
        assert_eq!(run("parseInt('px')"), "NaN");
        assert_eq!(run("parseFloat('3.5em')"), "3.5");
        assert_eq!(run("isNaN('abc')"), "true");
        assert_eq!(run("Array.isArray(items)"), "true");
        assert_eq!(run("encodeURIComponent('a b&c/d')"), "a%20b%26c%2Fd");
    }

    #[test]
    fn test_array_iteration_methods() {
        assert_eq!(run("items.map((x, i) => x * i)"), "[0,1,4]");
        assert_eq!(run("items.filter(x => x > 1)"), "[3,2]");
        assert_eq!(run("items.find(x => x < 3)"), "1");
        assert_eq!(run("items.findIndex(x => x === 2)"), "2");
        assert_eq!(run("items.find(x => x > 10)"), "undefined");
        assert_eq!(run("items.some(x => x > 2)"), "true");
        assert_eq!(run("items.every(x => x > 2)"), "false");
        assert_eq!(run("items.reduce((a, b) => a + b)"), "6");
        assert_eq!(run("items.reduce((a, b) => a + b, 10)"), "16");
    }

    #[test]
    fn test_array_methods_do_not_mutate() {
        assert_eq!(run("items.sort().join() + '|' + items.join()"), "1,2,3|3,1,2");
        assert_eq!(run("items.reverse()"), "[2,1,3]");
        assert_eq!(run("items"), "[3,1,2]");
    }

    #[test]
    fn test_sort_with_comparator_and_default_order() {
        assert_eq!(run("items.sort((a, b) => b - a)"), "[3,2,1]");
        assert_eq!(run("[10, 9, 1].sort()"), "[1,10,9]");
        assert_eq!(run("words.sort()"), r#"["apple","fig","pear"]"#);
    }

    #[test]
    fn test_array_slicing_and_shape() {
        assert_eq!(run("items.slice(1)"), "[1,2]");
        assert_eq!(run("items.slice(-2, -1)"), "[1]");
        assert_eq!(run("items.concat([4], 5)"), "[3,1,2,4,5]");
        assert_eq!(run("[[1, [2]], 3].flat()"), "[1,[2],3]");
        assert_eq!(run("items.flatMap(x => [x, x])"), "[3,3,1,1,2,2]");
        assert_eq!(run("items.at(-1)"), "2");
        assert_eq!(run("items.includes(2) && !items.includes('2')"), "true");
        assert_eq!(run("items.indexOf(1)"), "1");
        assert_eq!(run("[1, null, 2].join('-')"), "1--2");
    }

    #[test]
    fn test_reduce_empty_without_initial_fails() {
        let err = crate::expr::evaluate("[].reduce((a, b) => a)", &Context::new()).unwrap_err();
        assert_eq!(err.message, "Reduce of empty array with no initial value");
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(run("title.trim().toUpperCase()"), "HELLO WORLD");
        assert_eq!(run("title.trim().split(' ')"), r#"["Hello","World"]"#);
        assert_eq!(run("'a,b,c'.split(',', 2)"), r#"["a","b"]"#);
        assert_eq!(run("'abc'.split('')"), r#"["a","b","c"]"#);
        assert_eq!(run("'hello'.slice(1, -1)"), "ell");
        assert_eq!(run("'hello'.substring(4, 1)"), "ell");
        assert_eq!(run("'a-b-c'.replace('-', '+')"), "a+b-c");
        assert_eq!(run("'a-b-c'.replaceAll('-', '+')"), "a+b+c");
        assert_eq!(run("'ab'.replaceAll('b', m => m.toUpperCase())"), "aB");
        assert_eq!(run("'ab'.repeat(3)"), "ababab");
        assert_eq!(run("'7'.padStart(3, '0')"), "007");
        assert_eq!(run("'7'.padEnd(3)"), "7  ");
        assert_eq!(run("'héllo'.indexOf('l')"), "2");
        assert_eq!(run("'héllo'.length"), "5");
        assert_eq!(run("'abc'.charAt(1) + 'abc'.at(-1) + 'abc'[0]"), "bca");
        assert_eq!(run("'x'.concat(1, 'y')"), "x1y");
        assert_eq!(run("'Hello'.startsWith('He') && 'Hello'.endsWith('lo')"), "true");
    }

    #[test]
    fn test_oversized_strings_fail() {
        for source in [
            "'ab'.repeat(1e19)",
            "'ab'.repeat(268435456)",
            "'x'.padStart(1e15)",
            "'x'.padEnd(1e19, 'ab')",
        ] {
            let err = crate::expr::evaluate(source, &Context::new()).unwrap_err();
            assert_eq!(err.message, "Invalid string length", "{source}");
        }
        // nothing to build
        assert_eq!(run("''.repeat(1e19)"), "");
        assert_eq!(run("'x'.padStart(1e15, '')"), "x");
    }

    #[test]
    fn test_number_methods() {
        assert_eq!(run("(3.14159).toFixed(2)"), "3.14");
        assert_eq!(run("(2).toFixed(1)"), "2.0");
        assert_eq!(run("(255).toString(16)"), "ff");
        assert_eq!(run("(-5).toString(2)"), "-101");
        assert_eq!(run("(1.5).toString()"), "1.5");
        assert_eq!(run("true.toString()"), "true");
    }
}
