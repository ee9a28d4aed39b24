//! Global objects and the methods of primitive and container values.

use super::heap::{self, SLOT};
use super::interpreter::{Flow, Interpreter};
use super::scope::Scope;
use super::value::*;
use super::ast::Name;
use serde::Serialize;
use std::cmp::Ordering;
use std::rc::Rc;

const NAMESPACES: &[&str] = &[
    "Math", "JSON", "Object", "Array", "Number", "String", "Boolean", "Promise", "console",
];

const GLOBAL_FUNCTIONS: &[&str] = &[
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "Error",
    "TypeError",
    "RangeError",
    "SyntaxError",
    "ReferenceError",
];

const ERROR_CONSTRUCTORS: &[&str] = &["Error", "TypeError", "RangeError", "SyntaxError", "ReferenceError"];

/// `(namespace, member, qualified name)` of every namespace function.
const NAMESPACE_FUNCTIONS: &[(&str, &str, &str)] = &[
    ("Math", "abs", "Math.abs"),
    ("Math", "floor", "Math.floor"),
    ("Math", "ceil", "Math.ceil"),
    ("Math", "round", "Math.round"),
    ("Math", "trunc", "Math.trunc"),
    ("Math", "sign", "Math.sign"),
    ("Math", "sqrt", "Math.sqrt"),
    ("Math", "cbrt", "Math.cbrt"),
    ("Math", "pow", "Math.pow"),
    ("Math", "min", "Math.min"),
    ("Math", "max", "Math.max"),
    ("Math", "random", "Math.random"),
    ("Math", "log", "Math.log"),
    ("Math", "log2", "Math.log2"),
    ("Math", "log10", "Math.log10"),
    ("Math", "exp", "Math.exp"),
    ("Math", "sin", "Math.sin"),
    ("Math", "cos", "Math.cos"),
    ("Math", "tan", "Math.tan"),
    ("Math", "atan", "Math.atan"),
    ("Math", "atan2", "Math.atan2"),
    ("Math", "hypot", "Math.hypot"),
    ("JSON", "stringify", "JSON.stringify"),
    ("JSON", "parse", "JSON.parse"),
    ("Object", "keys", "Object.keys"),
    ("Object", "values", "Object.values"),
    ("Object", "entries", "Object.entries"),
    ("Object", "fromEntries", "Object.fromEntries"),
    ("Object", "assign", "Object.assign"),
    ("Object", "freeze", "Object.freeze"),
    ("Object", "isFrozen", "Object.isFrozen"),
    ("Array", "isArray", "Array.isArray"),
    ("Array", "from", "Array.from"),
    ("Array", "of", "Array.of"),
    ("Number", "isInteger", "Number.isInteger"),
    ("Number", "isSafeInteger", "Number.isSafeInteger"),
    ("Number", "isFinite", "Number.isFinite"),
    ("Number", "isNaN", "Number.isNaN"),
    ("Number", "parseInt", "parseInt"),
    ("Number", "parseFloat", "parseFloat"),
    ("String", "fromCharCode", "String.fromCharCode"),
    ("Promise", "all", "Promise.all"),
    ("Promise", "allSettled", "Promise.allSettled"),
    ("Promise", "resolve", "Promise.resolve"),
    ("Promise", "reject", "Promise.reject"),
    ("console", "log", "console.log"),
    ("console", "info", "console.info"),
    ("console", "warn", "console.warn"),
    ("console", "error", "console.error"),
    ("console", "debug", "console.debug"),
];

const STRING_METHODS: &[&str] = &[
    "charAt",
    "charCodeAt",
    "codePointAt",
    "at",
    "indexOf",
    "lastIndexOf",
    "includes",
    "startsWith",
    "endsWith",
    "slice",
    "substring",
    "substr",
    "toUpperCase",
    "toLowerCase",
    "trim",
    "trimStart",
    "trimEnd",
    "padStart",
    "padEnd",
    "repeat",
    "split",
    "replace",
    "replaceAll",
    "concat",
    "localeCompare",
    "toString",
    "valueOf",
];

const ARRAY_METHODS: &[&str] = &[
    "push",
    "pop",
    "shift",
    "unshift",
    "slice",
    "splice",
    "concat",
    "join",
    "reverse",
    "sort",
    "indexOf",
    "lastIndexOf",
    "includes",
    "find",
    "findIndex",
    "findLast",
    "findLastIndex",
    "filter",
    "map",
    "forEach",
    "reduce",
    "reduceRight",
    "some",
    "every",
    "flat",
    "flatMap",
    "fill",
    "keys",
    "values",
    "entries",
    "at",
    "toString",
];

const NUMBER_METHODS: &[&str] = &["toFixed", "toString", "valueOf"];
const BOOLEAN_METHODS: &[&str] = &["toString", "valueOf"];
const OBJECT_METHODS: &[&str] = &["hasOwnProperty", "toString"];

/// Deepest nesting `flat` descends into.
const MAX_FLAT_DEPTH: usize = 256;

pub(super) fn install_globals(scope: &mut Scope) {
    for &name in NAMESPACES {
        scope.declare(
            Name::from(name),
            Value::Native(Rc::new(Native::Namespace(name))),
            false,
        );
    }
    for &name in GLOBAL_FUNCTIONS {
        scope.declare(
            Name::from(name),
            Value::Native(Rc::new(Native::Function(name))),
            false,
        );
    }
    scope.declare("NaN".into(), Value::Number(f64::NAN), false);
    scope.declare("Infinity".into(), Value::Number(f64::INFINITY), false);
    scope.declare("undefined".into(), Value::Undefined, false);
}

pub(super) fn make_error(name: &str, message: &str) -> Value {
    object_value([("name", Value::str(name)), ("message", Value::str(message))])
}

/// Bound method of a primitive or container, if it has one by that name.
pub(super) fn method(receiver: &Value, name: &str) -> Option<Value> {
    let table = match receiver {
        Value::Str(_) => STRING_METHODS,
        Value::Array(_) => ARRAY_METHODS,
        Value::Number(_) => NUMBER_METHODS,
        Value::Bool(_) => BOOLEAN_METHODS,
        Value::Object(_) => OBJECT_METHODS,
        _ => return None,
    };
    let name = *table.iter().find(|method| **method == name)?;
    Some(Value::Native(Rc::new(Native::Method(receiver.clone(), name))))
}

pub(super) fn namespace_member(namespace: &str, name: &str) -> Option<Value> {
    let constant = match (namespace, name) {
        ("Math", "PI") => Some(std::f64::consts::PI),
        ("Math", "E") => Some(std::f64::consts::E),
        ("Math", "LN2") => Some(std::f64::consts::LN_2),
        ("Math", "LN10") => Some(std::f64::consts::LN_10),
        ("Math", "LOG2E") => Some(std::f64::consts::LOG2_E),
        ("Math", "LOG10E") => Some(std::f64::consts::LOG10_E),
        ("Math", "SQRT2") => Some(std::f64::consts::SQRT_2),
        ("Math", "SQRT1_2") => Some(std::f64::consts::FRAC_1_SQRT_2),
        ("Number", "MAX_SAFE_INTEGER") => Some(9_007_199_254_740_991.0),
        ("Number", "MIN_SAFE_INTEGER") => Some(-9_007_199_254_740_991.0),
        ("Number", "EPSILON") => Some(f64::EPSILON),
        ("Number", "MAX_VALUE") => Some(f64::MAX),
        ("Number", "MIN_VALUE") => Some(5e-324),
        ("Number", "POSITIVE_INFINITY") => Some(f64::INFINITY),
        ("Number", "NEGATIVE_INFINITY") => Some(f64::NEG_INFINITY),
        ("Number", "NaN") => Some(f64::NAN),
        _ => None,
    };
    if let Some(constant) = constant {
        return Some(Value::Number(constant));
    }
    NAMESPACE_FUNCTIONS
        .iter()
        .find(|(ns, member, _)| *ns == namespace && *member == name)
        .map(|&(_, _, qualified)| Value::Native(Rc::new(Native::Function(qualified))))
}

pub(super) fn char_len(text: &str) -> usize {
    if text.is_ascii() { text.len() } else { text.chars().count() }
}

pub(super) fn char_at(text: &str, index: usize) -> Option<char> {
    if text.is_ascii() {
        text.as_bytes().get(index).map(|byte| *byte as char)
    } else {
        text.chars().nth(index)
    }
}

/// Byte offset of the character at `index`, or the end of the string.
fn byte_offset(text: &str, index: usize) -> usize {
    if text.is_ascii() {
        index.min(text.len())
    } else {
        text.char_indices()
            .nth(index)
            .map(|(offset, _)| offset)
            .unwrap_or(text.len())
    }
}

/// `text` from byte `from`, empty when out of range.
fn tail(text: &str, from: usize) -> &str {
    text.get(from..).unwrap_or_default()
}

fn char_index(text: &str, byte_offset: usize) -> usize {
    char_len(text.get(..byte_offset).unwrap_or(text))
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

fn callback(interp: &Interpreter<'_>, args: &[Value]) -> Flow<Value> {
    match args.first() {
        Some(function) if function.is_callable() => Ok(function.clone()),
        other => {
            let shown = other
                .and_then(primitive_to_string)
                .unwrap_or_else(|| other.map(type_of).unwrap_or("undefined").to_string());
            Err(interp.type_error(format!("{shown} is not a function")))
        }
    }
}

pub(super) fn call_native(interp: &mut Interpreter<'_>, native: &Native, args: Vec<Value>) -> Flow<Value> {
    match native {
        Native::Namespace("String") => match args.first() {
            Some(value) => Ok(Value::str(interp.display(value)?)),
            None => Ok(Value::str("")),
        },
        Native::Namespace("Number") => Ok(Value::Number(args.first().map(to_number).unwrap_or(0.0))),
        Native::Namespace("Boolean") => Ok(Value::Bool(args.first().is_some_and(truthy))),
        Native::Namespace("Array") => new_array(interp, args),
        Native::Namespace(name) => Err(interp.type_error(format!("{name} is not a function"))),
        Native::Function(name) => call_function(interp, *name, args),
        Native::Method(receiver, name) => match receiver {
            Value::Str(text) => string_method(interp, text, name, &args),
            Value::Array(array) => array_method(interp, array, name, args),
            Value::Number(number) => number_method(interp, *number, name, &args),
            Value::Bool(value) => Ok(match *name {
                "valueOf" => Value::Bool(*value),
                _ => Value::str(value.to_string()),
            }),
            Value::Object(object) => match *name {
                "hasOwnProperty" => {
                    let key = interp.to_key(&arg(&args, 0))?.name();
                    Ok(Value::Bool(object.contains(&key)))
                }
                _ => Ok(Value::str(interp.display(receiver)?)),
            },
            _ => Err(interp.type_error(format!("{name} is not a function"))),
        },
    }
}

/// `new` applied to a callable.
pub(super) fn construct(
    interp: &mut Interpreter<'_>,
    constructor: &Value,
    args: Vec<Value>,
    described: &str,
) -> Flow<Value> {
    match constructor {
        Value::Native(native) => match &**native {
            Native::Function(name) if ERROR_CONSTRUCTORS.contains(name) => {
                error_constructor(interp, name, &args)
            }
            Native::Namespace("Object") => Ok(Value::Object(JsObject::new_rc())),
            Native::Namespace("Array") => new_array(interp, args),
            Native::Namespace(name @ ("String" | "Number" | "Boolean")) => {
                Err(interp.type_error(format!("{name} objects are not supported; call {name}(value) instead")))
            }
            _ => Err(interp.type_error(format!("{described} is not a constructor"))),
        },
        Value::Function(closure) if !closure.def.is_arrow => {
            let this = Value::Object(JsObject::new_rc());
            let result = interp.call(constructor, this.clone(), args)?;
            Ok(match result {
                Value::Object(_) | Value::Array(_) => result,
                _ => this,
            })
        }
        _ => Err(interp.type_error(format!("{described} is not a constructor"))),
    }
}

/// `Array(...)` and `new Array(...)` behave the same.
fn new_array(interp: &mut Interpreter<'_>, args: Vec<Value>) -> Flow<Value> {
    match args.as_slice() {
        [Value::Number(length)] => {
            if *length < 0.0 || length.fract() != 0.0 || *length > 4_294_967_295.0 {
                return Err(interp.range_error("Invalid array length"));
            }
            let length = *length as usize;
            interp.reserve(length.saturating_mul(SLOT))?;
            Ok(JsArray::new_value(vec![Value::Undefined; length]))
        }
        _ => Ok(JsArray::new_value(args)),
    }
}

fn error_constructor(interp: &Interpreter<'_>, name: &str, args: &[Value]) -> Flow<Value> {
    let message = match args.first() {
        None | Some(Value::Undefined) => String::new(),
        Some(value) => interp.display(value)?,
    };
    Ok(make_error(name, &message))
}

pub(super) fn instance_of(interp: &Interpreter<'_>, value: &Value, constructor: &Value) -> Flow<bool> {
    match constructor {
        Value::Native(native) => Ok(match &**native {
            Native::Function(name) if ERROR_CONSTRUCTORS.contains(name) => match value {
                Value::Object(object) => {
                    error_parts(object).is_some_and(|(kind, _)| *name == "Error" || kind == *name)
                }
                _ => false,
            },
            Native::Namespace("Array") => matches!(value, Value::Array(_)),
            Native::Namespace("Object") => {
                matches!(value, Value::Array(_) | Value::Object(_) | Value::Function(_))
            }
            _ => false,
        }),
        Value::Function(_) => Ok(false),
        _ => Err(interp.type_error("Right-hand side of 'instanceof' is not callable")),
    }
}

// ---- free functions ---------------------------------------------------------------

fn call_function(interp: &mut Interpreter<'_>, name: &'static str, args: Vec<Value>) -> Flow<Value> {
    if ERROR_CONSTRUCTORS.contains(&name) {
        return error_constructor(interp, name, &args);
    }
    if let Some(math) = name.strip_prefix("Math.") {
        return math_function(interp, math, &args);
    }
    let number = |index: usize| args.get(index).map(to_number).unwrap_or(f64::NAN);
    match name {
        "parseInt" => {
            let text = interp.display(&arg(&args, 0))?;
            let radix = match args.get(1) {
                None | Some(Value::Undefined) => 0,
                Some(radix) => to_integer(radix) as i64,
            };
            Ok(Value::Number(parse_int(&text, radix)))
        }
        "parseFloat" => {
            let text = interp.display(&arg(&args, 0))?;
            Ok(Value::Number(parse_float(&text)))
        }
        "isNaN" => Ok(Value::Bool(number(0).is_nan())),
        "isFinite" => Ok(Value::Bool(number(0).is_finite())),
        "Number.isInteger" => Ok(Value::Bool(
            matches!(args.first(), Some(Value::Number(n)) if n.is_finite() && n.fract() == 0.0),
        )),
        "Number.isSafeInteger" => Ok(Value::Bool(matches!(
            args.first(),
            Some(Value::Number(n)) if n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_991.0
        ))),
        "Number.isFinite" => Ok(Value::Bool(
            matches!(args.first(), Some(Value::Number(n)) if n.is_finite()),
        )),
        "Number.isNaN" => Ok(Value::Bool(
            matches!(args.first(), Some(Value::Number(n)) if n.is_nan()),
        )),
        "String.fromCharCode" => {
            let text: String = args
                .iter()
                .map(|code| char::from_u32(to_integer(code) as u32 & 0xFFFF).unwrap_or('\u{FFFD}'))
                .collect();
            Ok(Value::str(text))
        }
        "JSON.stringify" => json_stringify(interp, &args),
        "JSON.parse" => {
            let text = interp.display(&arg(&args, 0))?;
            interp.reserve(text.len().saturating_mul(2))?;
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(json) => Ok(from_json(&json)),
                Err(error) => Err(interp.throw("SyntaxError", format!("Invalid JSON: {error}"))),
            }
        }
        "Object.keys" | "Object.values" | "Object.entries" => {
            let target = arg(&args, 0);
            let pairs = own_entries(interp, &target)?;
            let mut out = Vec::with_capacity(pairs.len());
            for (key, value) in pairs {
                interp.check_heap()?;
                out.push(match name {
                    "Object.keys" => Value::str(&*key),
                    "Object.values" => value,
                    _ => JsArray::new_value(vec![Value::str(&*key), value]),
                });
            }
            Ok(JsArray::new_value(out))
        }
        "Object.fromEntries" => {
            let object = JsObject::new_rc();
            let source = arg(&args, 0);
            for entry in interp.iterate(&source)? {
                interp.check_heap()?;
                let Value::Array(pair) = &entry else {
                    return Err(interp.type_error("Iterator value is not an entry object"));
                };
                let key = interp.to_key(&pair.get(0).unwrap_or(Value::Undefined))?.name();
                object.set(key, pair.get(1).unwrap_or(Value::Undefined));
            }
            Ok(Value::Object(object))
        }
        "Object.assign" => {
            let target = arg(&args, 0);
            let Value::Object(object) = &target else {
                return Err(interp.type_error("Object.assign target must be an object"));
            };
            if object.is_frozen() {
                return Err(interp.type_error("Cannot assign to read only properties of a frozen object"));
            }
            for source in args.iter().skip(1) {
                for (key, value) in own_entries(interp, source)? {
                    interp.check_heap()?;
                    object.set(key, value);
                }
            }
            Ok(target)
        }
        "Object.freeze" => {
            let target = arg(&args, 0);
            match &target {
                Value::Object(object) => object.freeze(),
                Value::Array(array) => array.freeze(),
                _ => {}
            }
            Ok(target)
        }
        "Object.isFrozen" => Ok(Value::Bool(match args.first() {
            Some(Value::Object(object)) => object.is_frozen(),
            Some(Value::Array(array)) => array.is_frozen(),
            _ => true,
        })),
        "Array.isArray" => Ok(Value::Bool(matches!(args.first(), Some(Value::Array(_))))),
        "Array.of" => Ok(JsArray::new_value(args)),
        "Array.from" => array_from(interp, &args),
        "Promise.all" | "Promise.resolve" => Ok(arg(&args, 0)),
        "Promise.allSettled" => {
            let source = arg(&args, 0);
            let items = interp.iterate(&source)?;
            let mut out = Vec::with_capacity(items.len());
            for value in items {
                interp.check_heap()?;
                out.push(object_value([("status", Value::str("fulfilled")), ("value", value)]));
            }
            Ok(JsArray::new_value(out))
        }
        "Promise.reject" => Err(interp.throw_value(arg(&args, 0))),
        _ if name.starts_with("console.") => {
            let mut parts = Vec::with_capacity(args.len());
            for value in &args {
                parts.push(interp.display(value)?);
            }
            let mut line = parts.join(" ");
            if line.len() > 2048 {
                let cut = (0..=2048).rev().find(|at| line.is_char_boundary(*at)).unwrap_or(0);
                line.truncate(cut);
                line.push_str("...");
            }
            tracing::debug!(target: "ctxkit::script", "{line}");
            Ok(Value::Undefined)
        }
        _ => Err(interp.type_error(format!("{name} is not a function"))),
    }
}

fn math_function(interp: &mut Interpreter<'_>, name: &str, args: &[Value]) -> Flow<Value> {
    let x = args.first().map(to_number).unwrap_or(f64::NAN);
    let y = args.get(1).map(to_number).unwrap_or(f64::NAN);
    let value = match name {
        "abs" => x.abs(),
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        "round" => {
            if x.is_finite() {
                (x + 0.5).floor()
            } else {
                x
            }
        }
        "trunc" => x.trunc(),
        "sign" => {
            if x.is_nan() || x == 0.0 {
                x
            } else {
                x.signum()
            }
        }
        "sqrt" => x.sqrt(),
        "cbrt" => x.cbrt(),
        "pow" => x.powf(y),
        "min" => args
            .iter()
            .map(to_number)
            .fold(f64::INFINITY, |acc, n| if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.min(n) }),
        "max" => args
            .iter()
            .map(to_number)
            .fold(f64::NEG_INFINITY, |acc, n| if n.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(n) }),
        "random" => interp.next_random(),
        "log" => x.ln(),
        "log2" => x.log2(),
        "log10" => x.log10(),
        "exp" => x.exp(),
        "sin" => x.sin(),
        "cos" => x.cos(),
        "tan" => x.tan(),
        "atan" => x.atan(),
        "atan2" => x.atan2(y),
        "hypot" => args.iter().map(to_number).map(|n| n * n).sum::<f64>().sqrt(),
        _ => return Err(interp.type_error(format!("Math.{name} is not a function"))),
    };
    Ok(Value::Number(value))
}

fn json_stringify(interp: &mut Interpreter<'_>, args: &[Value]) -> Flow<Value> {
    let Some(json) = interp.to_json(&arg(args, 0))? else {
        return Ok(Value::Undefined);
    };
    let indent = match args.get(2) {
        Some(Value::Number(width)) if *width >= 1.0 => " ".repeat(width.min(10.0) as usize),
        Some(Value::Str(text)) => text.chars().take(10).collect(),
        _ => String::new(),
    };
    let text = if indent.is_empty() {
        serde_json::to_string(&json)
    } else {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        json.serialize(&mut serializer)
            .map(|()| String::from_utf8_lossy(&out).into_owned())
    };
    match text {
        Ok(text) => {
            interp.reserve(text.len())?;
            Ok(Value::str(text))
        }
        Err(error) => Err(interp.type_error(error.to_string())),
    }
}

fn own_entries(interp: &Interpreter<'_>, target: &Value) -> Flow<Vec<(Name, Value)>> {
    Ok(match target {
        Value::Object(object) => object.entries(),
        Value::Array(array) => array
            .to_vec()
            .into_iter()
            .enumerate()
            .map(|(index, value)| (Name::from(index.to_string()), value))
            .collect(),
        Value::Str(text) => {
            interp.reserve(text.len().saturating_mul(heap::STRING_OVERHEAD * 2))?;
            text.chars()
                .enumerate()
                .map(|(index, c)| (Name::from(index.to_string()), Value::str(c.to_string())))
                .collect()
        }
        Value::Undefined | Value::Null => {
            return Err(interp.type_error("Cannot convert undefined or null to object"));
        }
        _ => Vec::new(),
    })
}

fn array_from(interp: &mut Interpreter<'_>, args: &[Value]) -> Flow<Value> {
    let source = arg(args, 0);
    let items = match &source {
        Value::Object(object) => {
            let length = object.get("length").map(|len| to_integer(&len)).unwrap_or(0.0);
            if !(0.0..=4_294_967_295.0).contains(&length) {
                return Err(interp.range_error("Invalid array length"));
            }
            let length = length as usize;
            interp.reserve(length.saturating_mul(SLOT))?;
            (0..length)
                .map(|index| object.get(&index.to_string()).unwrap_or(Value::Undefined))
                .collect()
        }
        Value::Undefined | Value::Null => {
            return Err(interp.type_error("Array.from requires an array-like object"));
        }
        Value::Array(_) | Value::Str(_) => interp.iterate(&source)?,
        _ => Vec::new(),
    };
    let Some(map) = args.get(1).filter(|map| !matches!(map, Value::Undefined)) else {
        return Ok(JsArray::new_value(items));
    };
    if !map.is_callable() {
        return Err(interp.type_error("Array.from: mapper is not a function"));
    }
    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        interp.check_heap()?;
        out.push(interp.call(map, Value::Undefined, vec![item, Value::Number(index as f64)])?);
    }
    Ok(JsArray::new_value(out))
}

pub(super) fn parse_int(text: &str, radix: i64) -> f64 {
    let text = text.trim_start();
    let (negative, mut text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let mut radix = radix;
    if (radix == 0 || radix == 16)
        && let Some(rest) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
    {
        text = rest;
        radix = 16;
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let mut value = 0.0;
    let mut any = false;
    for c in text.chars() {
        let Some(digit) = c.to_digit(radix as u32) else {
            break;
        };
        value = value * radix as f64 + digit as f64;
        any = true;
    }
    match (any, negative) {
        (false, _) => f64::NAN,
        (true, true) => -value,
        (true, false) => value,
    }
}

pub(super) fn parse_float(text: &str) -> f64 {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let digits_from = |mut at: usize| {
        while bytes.get(at).is_some_and(u8::is_ascii_digit) {
            at += 1;
        }
        at
    };
    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    if text.get(end..).is_some_and(|rest| rest.starts_with("Infinity")) {
        return if bytes.first() == Some(&b'-') { f64::NEG_INFINITY } else { f64::INFINITY };
    }
    let int_end = digits_from(end);
    let mut digits = int_end - end;
    end = int_end;
    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        if digits > 0 || frac_end > end + 1 {
            digits += frac_end - end - 1;
            end = frac_end;
        }
    }
    if digits == 0 {
        return f64::NAN;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut at = end + 1;
        if matches!(bytes.get(at), Some(b'+' | b'-')) {
            at += 1;
        }
        let exp_end = digits_from(at);
        if exp_end > at {
            end = exp_end;
        }
    }
    text.get(..end).and_then(|number| number.parse().ok()).unwrap_or(f64::NAN)
}

// ---- strings ----------------------------------------------------------------------------

fn string_method(interp: &mut Interpreter<'_>, text: &JsString, name: &str, args: &[Value]) -> Flow<Value> {
    let s: &str = text;
    let len = char_len(s);
    let string_arg = |interp: &Interpreter<'_>, index: usize| -> Flow<String> {
        match args.get(index) {
            None | Some(Value::Undefined) => Ok("undefined".to_string()),
            Some(value) => interp.display(value),
        }
    };
    Ok(match name {
        "toString" | "valueOf" => Value::Str(text.clone()),
        "charAt" => {
            let index = to_integer(&arg(args, 0));
            let c = (index >= 0.0).then(|| char_at(s, index as usize)).flatten();
            Value::str(c.map(String::from).unwrap_or_default())
        }
        "charCodeAt" | "codePointAt" => {
            let index = to_integer(&arg(args, 0));
            match (index >= 0.0).then(|| char_at(s, index as usize)).flatten() {
                Some(c) => Value::Number(c as u32 as f64),
                None if name == "charCodeAt" => Value::Number(f64::NAN),
                None => Value::Undefined,
            }
        }
        "at" => {
            let index = to_integer(&arg(args, 0));
            let index = if index < 0.0 { len as f64 + index } else { index };
            match (index >= 0.0).then(|| char_at(s, index as usize)).flatten() {
                Some(c) => Value::str(c.to_string()),
                None => Value::Undefined,
            }
        }
        "indexOf" => {
            let needle = string_arg(interp, 0)?;
            let from = byte_offset(s, relative_start(args.get(1), len));
            match tail(s, from).find(&needle) {
                Some(found) => Value::Number(char_index(s, from + found) as f64),
                None => Value::Number(-1.0),
            }
        }
        "lastIndexOf" => {
            let needle = string_arg(interp, 0)?;
            match s.rfind(&needle) {
                Some(found) => Value::Number(char_index(s, found) as f64),
                None => Value::Number(-1.0),
            }
        }
        "includes" => {
            let needle = string_arg(interp, 0)?;
            let from = byte_offset(s, relative_start(args.get(1), len));
            Value::Bool(tail(s, from).contains(&needle))
        }
        "startsWith" => {
            let needle = string_arg(interp, 0)?;
            let from = byte_offset(s, relative_start(args.get(1), len));
            Value::Bool(tail(s, from).starts_with(&needle))
        }
        "endsWith" => {
            let needle = string_arg(interp, 0)?;
            let end = match args.get(1) {
                None | Some(Value::Undefined) => s.len(),
                Some(end) => byte_offset(s, to_integer(end).clamp(0.0, len as f64) as usize),
            };
            Value::Bool(s.get(..end).is_some_and(|head| head.ends_with(&needle)))
        }
        "slice" => {
            let start = relative_index(args.first(), len, 0);
            let end = relative_index(args.get(1), len, len);
            substring(s, start, end)
        }
        "substring" => {
            let clamp = |value: Option<&Value>, default: usize| match value {
                None | Some(Value::Undefined) => default,
                Some(value) => to_integer(value).clamp(0.0, len as f64) as usize,
            };
            let start = clamp(args.first(), 0);
            let end = clamp(args.get(1), len);
            substring(s, start.min(end), start.max(end))
        }
        "substr" => {
            let start = relative_index(args.first(), len, 0);
            let count = match args.get(1) {
                None | Some(Value::Undefined) => len - start,
                Some(count) => to_integer(count).clamp(0.0, (len - start) as f64) as usize,
            };
            substring(s, start, start + count)
        }
        "toUpperCase" => Value::str(s.to_uppercase()),
        "toLowerCase" => Value::str(s.to_lowercase()),
        "trim" => Value::str(s.trim()),
        "trimStart" => Value::str(s.trim_start()),
        "trimEnd" => Value::str(s.trim_end()),
        "padStart" | "padEnd" => {
            let target = to_integer(&arg(args, 0)).max(0.0);
            let pad = match args.get(1) {
                None | Some(Value::Undefined) => " ".to_string(),
                Some(value) => interp.display(value)?,
            };
            if target <= len as f64 || pad.is_empty() {
                return Ok(Value::Str(text.clone()));
            }
            let missing = target - len as f64;
            interp.reserve((missing as usize).saturating_mul(4).saturating_add(s.len()))?;
            let filler: String = pad.chars().cycle().take(missing as usize).collect();
            if name == "padStart" {
                Value::str(filler + s)
            } else {
                Value::str(s.to_string() + &filler)
            }
        }
        "repeat" => {
            let count = to_integer(&arg(args, 0));
            if count < 0.0 || count.is_infinite() {
                return Err(interp.range_error(format!("Invalid count value: {}", number_to_string(count))));
            }
            let count = count as usize;
            interp.reserve(s.len().saturating_mul(count))?;
            Value::str(s.repeat(count))
        }
        "split" => {
            let limit = match args.get(1) {
                None | Some(Value::Undefined) => usize::MAX,
                // Limits wrap like an unsigned 32-bit integer, so -1 means no limit.
                Some(limit) => to_integer(limit).rem_euclid(4_294_967_296.0) as usize,
            };
            let parts: Vec<String> = match args.first() {
                None | Some(Value::Undefined) => vec![s.to_string()],
                Some(separator) => {
                    let separator = interp.display(separator)?;
                    if separator.is_empty() {
                        s.chars().take(limit).map(String::from).collect()
                    } else {
                        s.split(separator.as_str()).take(limit).map(String::from).collect()
                    }
                }
            };
            let mut out = Vec::with_capacity(parts.len().min(limit));
            for part in parts.into_iter().take(limit) {
                interp.check_heap()?;
                out.push(Value::str(part));
            }
            JsArray::new_value(out)
        }
        "replace" | "replaceAll" => {
            let pattern = string_arg(interp, 0)?;
            let replacement = arg(args, 1);
            let all = name == "replaceAll";
            if replacement.is_callable() {
                let matches: Vec<usize> = if all {
                    s.match_indices(pattern.as_str()).map(|(at, _)| at).collect()
                } else {
                    s.find(pattern.as_str()).into_iter().collect()
                };
                let mut out = String::with_capacity(s.len());
                let mut last = 0;
                for at in matches {
                    out.push_str(s.get(last..at).unwrap_or_default());
                    let produced = interp.call(
                        &replacement,
                        Value::Undefined,
                        vec![
                            Value::str(pattern.as_str()),
                            Value::Number(char_index(s, at) as f64),
                            Value::Str(text.clone()),
                        ],
                    )?;
                    out.push_str(&interp.display(&produced)?);
                    interp.reserve(out.len())?;
                    last = at + pattern.len();
                }
                out.push_str(tail(s, last));
                Value::str(out)
            } else {
                let replacement = match replacement {
                    Value::Undefined => "undefined".to_string(),
                    other => interp.display(&other)?,
                };
                let count = if all { s.matches(pattern.as_str()).count() } else { 1 };
                interp.reserve(s.len().saturating_add(count.saturating_mul(replacement.len())))?;
                if all {
                    Value::str(s.replace(pattern.as_str(), &replacement))
                } else {
                    Value::str(s.replacen(pattern.as_str(), &replacement, 1))
                }
            }
        }
        "concat" => {
            let mut out = s.to_string();
            for value in args {
                out.push_str(&interp.display(value)?);
                interp.reserve(out.len())?;
            }
            Value::str(out)
        }
        "localeCompare" => {
            let other = string_arg(interp, 0)?;
            Value::Number(match s.cmp(other.as_str()) {
                Ordering::Less => -1.0,
                Ordering::Equal => 0.0,
                Ordering::Greater => 1.0,
            })
        }
        _ => return Err(interp.type_error(format!("{name} is not a function"))),
    })
}

fn relative_start(value: Option<&Value>, len: usize) -> usize {
    match value {
        None | Some(Value::Undefined) => 0,
        Some(value) => to_integer(value).clamp(0.0, len as f64) as usize,
    }
}

fn substring(text: &str, start: usize, end: usize) -> Value {
    if start >= end {
        return Value::str("");
    }
    let from = byte_offset(text, start);
    let to = byte_offset(text, end);
    Value::str(text.get(from..to).unwrap_or_default())
}

// ---- numbers ------------------------------------------------------------------------------

fn number_method(interp: &Interpreter<'_>, number: f64, name: &str, args: &[Value]) -> Flow<Value> {
    match name {
        "valueOf" => Ok(Value::Number(number)),
        "toFixed" => {
            let digits = to_integer(&arg(args, 0));
            if !(0.0..=100.0).contains(&digits) {
                return Err(interp.range_error("toFixed() digits argument must be between 0 and 100"));
            }
            Ok(Value::str(to_fixed(number, digits as usize)))
        }
        _ => {
            let radix = match args.first() {
                None | Some(Value::Undefined) => 10.0,
                Some(radix) => to_integer(radix),
            };
            if !(2.0..=36.0).contains(&radix) {
                return Err(interp.range_error("toString() radix must be between 2 and 36"));
            }
            Ok(Value::str(to_radix(number, radix as u32)))
        }
    }
}

pub(super) fn to_fixed(number: f64, digits: usize) -> String {
    if !number.is_finite() || number.abs() >= 1e21 {
        return number_to_string(number);
    }
    let scaled = number * 10f64.powi(digits as i32);
    // Exact ties round away from zero.
    let number = if scaled.fract().abs() == 0.5 {
        scaled.round() / 10f64.powi(digits as i32)
    } else {
        number
    };
    format!("{number:.digits$}")
}

pub(super) fn to_radix(number: f64, radix: u32) -> String {
    if radix == 10 || !number.is_finite() {
        return number_to_string(number);
    }
    let mut integer = number.abs().trunc();
    let mut fraction = number.abs().fract();
    let mut digits = Vec::new();
    while integer >= 1.0 {
        let digit = (integer % radix as f64) as u32;
        digits.push(char::from_digit(digit, radix).unwrap_or('0'));
        integer = (integer / radix as f64).trunc();
    }
    if digits.is_empty() {
        digits.push('0');
    }
    if number < 0.0 {
        digits.push('-');
    }
    let mut out: String = digits.into_iter().rev().collect();
    if fraction > 0.0 {
        out.push('.');
        for _ in 0..20 {
            fraction *= radix as f64;
            let digit = fraction.trunc();
            fraction -= digit;
            out.push(char::from_digit(digit as u32, radix).unwrap_or('0'));
            if fraction == 0.0 {
                break;
            }
        }
    }
    out
}

// ---- arrays ---------------------------------------------------------------------------------

fn ensure_mutable(interp: &Interpreter<'_>, array: &JsArray) -> Flow<()> {
    if array.is_frozen() {
        Err(interp.type_error("Cannot modify a frozen array"))
    } else {
        Ok(())
    }
}

fn array_method(
    interp: &mut Interpreter<'_>,
    array: &Rc<JsArray>,
    name: &str,
    args: Vec<Value>,
) -> Flow<Value> {
    let len = array.len();
    let this = Value::Array(array.clone());
    match name {
        "push" => {
            ensure_mutable(interp, array)?;
            interp.reserve(args.len().saturating_mul(SLOT))?;
            let len = array.with_mut(|items| {
                items.extend(args);
                items.len()
            });
            Ok(Value::Number(len as f64))
        }
        "pop" => {
            ensure_mutable(interp, array)?;
            Ok(array.with_mut(Vec::pop).unwrap_or(Value::Undefined))
        }
        "shift" => {
            ensure_mutable(interp, array)?;
            Ok(array
                .with_mut(|items| (!items.is_empty()).then(|| items.remove(0)))
                .unwrap_or(Value::Undefined))
        }
        "unshift" => {
            ensure_mutable(interp, array)?;
            interp.reserve(args.len().saturating_mul(SLOT))?;
            let len = array.with_mut(|items| {
                items.splice(0..0, args);
                items.len()
            });
            Ok(Value::Number(len as f64))
        }
        "slice" => {
            let start = relative_index(args.first(), len, 0);
            let end = relative_index(args.get(1), len, len);
            let items = array.borrow().get(start..end).map(<[Value]>::to_vec).unwrap_or_default();
            interp.reserve(items.len().saturating_mul(SLOT))?;
            Ok(JsArray::new_value(items))
        }
        "splice" => {
            ensure_mutable(interp, array)?;
            let start = relative_index(args.first(), len, 0);
            let delete = match args.get(1) {
                None => len - start,
                Some(count) => to_integer(count).clamp(0.0, (len - start) as f64) as usize,
            };
            let inserted: Vec<Value> = args.into_iter().skip(2).collect();
            interp.reserve(inserted.len().saturating_mul(SLOT))?;
            let removed: Vec<Value> =
                array.with_mut(|items| items.splice(start..start + delete, inserted).collect());
            Ok(JsArray::new_value(removed))
        }
        "concat" => {
            let mut out = array.to_vec();
            for value in args {
                match value {
                    Value::Array(other) => {
                        interp.reserve(other.len().saturating_mul(SLOT))?;
                        out.extend(other.to_vec());
                    }
                    other => out.push(other),
                }
                interp.reserve(out.len().saturating_mul(SLOT))?;
            }
            Ok(JsArray::new_value(out))
        }
        "join" | "toString" => {
            let separator = match args.first() {
                Some(value) if name == "join" && !matches!(value, Value::Undefined) => interp.display(value)?,
                _ => ",".to_string(),
            };
            let mut out = String::new();
            for index in 0..array.len() {
                interp.tick()?;
                if index > 0 {
                    out.push_str(&separator);
                }
                match array.get(index) {
                    Some(Value::Undefined | Value::Null) | None => {}
                    Some(item) => out.push_str(&interp.display(&item)?),
                }
                interp.reserve(out.len())?;
            }
            Ok(Value::str(out))
        }
        "reverse" => {
            ensure_mutable(interp, array)?;
            array.with_mut(|items| items.reverse());
            Ok(this)
        }
        "sort" => {
            ensure_mutable(interp, array)?;
            let comparator = args.first().filter(|value| !matches!(value, Value::Undefined));
            if let Some(comparator) = comparator
                && !comparator.is_callable()
            {
                return Err(interp.type_error(
                    "The comparison function must be either a function or undefined",
                ));
            }
            let sorted = sort_values(interp, array.to_vec(), comparator)?;
            array.with_mut(|items| *items = sorted);
            Ok(this)
        }
        "indexOf" => {
            let needle = arg(&args, 0);
            let from = relative_index(args.get(1), len, 0);
            let items = array.borrow();
            let found = items
                .iter()
                .enumerate()
                .skip(from)
                .find(|(_, item)| strict_equals(item, &needle));
            Ok(Value::Number(found.map(|(index, _)| index as f64).unwrap_or(-1.0)))
        }
        "lastIndexOf" => {
            let needle = arg(&args, 0);
            let items = array.borrow();
            let found = items.iter().rposition(|item| strict_equals(item, &needle));
            Ok(Value::Number(found.map(|index| index as f64).unwrap_or(-1.0)))
        }
        "includes" => {
            let needle = arg(&args, 0);
            let items = array.borrow();
            Ok(Value::Bool(items.iter().any(|item| same_value_zero(item, &needle))))
        }
        "at" => {
            let index = to_integer(&arg(&args, 0));
            let index = if index < 0.0 { len as f64 + index } else { index };
            Ok(if index >= 0.0 {
                array.get(index as usize).unwrap_or(Value::Undefined)
            } else {
                Value::Undefined
            })
        }
        "find" | "findIndex" | "findLast" | "findLastIndex" => {
            let function = callback(interp, &args)?;
            let reverse = name.starts_with("findLast");
            let want_index = name.ends_with("Index");
            for step in 0..len {
                let index = if reverse { len - 1 - step } else { step };
                let item = array.get(index).unwrap_or(Value::Undefined);
                let hit = interp.call(
                    &function,
                    Value::Undefined,
                    vec![item.clone(), Value::Number(index as f64), this.clone()],
                )?;
                if truthy(&hit) {
                    return Ok(if want_index { Value::Number(index as f64) } else { item });
                }
            }
            Ok(if want_index { Value::Number(-1.0) } else { Value::Undefined })
        }
        "filter" | "map" | "forEach" | "some" | "every" | "flatMap" => {
            let function = callback(interp, &args)?;
            if name == "map" {
                interp.reserve(len.saturating_mul(SLOT))?;
            }
            let mut out = Vec::new();
            for index in 0..len {
                let item = array.get(index).unwrap_or(Value::Undefined);
                let result = interp.call(
                    &function,
                    Value::Undefined,
                    vec![item.clone(), Value::Number(index as f64), this.clone()],
                )?;
                interp.check_heap()?;
                match name {
                    "filter" if truthy(&result) => out.push(item),
                    "map" => out.push(result),
                    "some" if truthy(&result) => return Ok(Value::Bool(true)),
                    "every" if !truthy(&result) => return Ok(Value::Bool(false)),
                    "flatMap" => match result {
                        Value::Array(inner) => out.extend(inner.to_vec()),
                        other => out.push(other),
                    },
                    _ => {}
                }
            }
            Ok(match name {
                "forEach" => Value::Undefined,
                "some" => Value::Bool(false),
                "every" => Value::Bool(true),
                _ => JsArray::new_value(out),
            })
        }
        "reduce" | "reduceRight" => {
            let function = callback(interp, &args)?;
            let mut order: Box<dyn Iterator<Item = usize>> = if name == "reduce" {
                Box::new(0..len)
            } else {
                Box::new((0..len).rev())
            };
            let mut accumulator = match args.get(1) {
                Some(initial) => initial.clone(),
                None => match order.next() {
                    Some(index) => array.get(index).unwrap_or(Value::Undefined),
                    None => {
                        return Err(interp.type_error("Reduce of empty array with no initial value"));
                    }
                },
            };
            for index in order {
                let item = array.get(index).unwrap_or(Value::Undefined);
                accumulator = interp.call(
                    &function,
                    Value::Undefined,
                    vec![accumulator, item, Value::Number(index as f64), this.clone()],
                )?;
            }
            Ok(accumulator)
        }
        "flat" => {
            let depth = match args.first() {
                None | Some(Value::Undefined) => 1.0,
                Some(depth) => to_integer(depth).max(0.0),
            };
            let depth = (depth as usize).min(MAX_FLAT_DEPTH);
            let mut out = Vec::new();
            flatten_into(interp, &array.to_vec(), depth, &mut out)?;
            Ok(JsArray::new_value(out))
        }
        "fill" => {
            ensure_mutable(interp, array)?;
            let value = arg(&args, 0);
            let start = relative_index(args.get(1), len, 0);
            let end = relative_index(args.get(2), len, len);
            array.with_mut(|items| {
                for slot in items.iter_mut().take(end).skip(start) {
                    *slot = value.clone();
                }
            });
            Ok(this)
        }
        "keys" => {
            interp.reserve(len.saturating_mul(SLOT))?;
            Ok(JsArray::new_value((0..len).map(|index| Value::Number(index as f64)).collect()))
        }
        "values" => {
            interp.reserve(len.saturating_mul(SLOT))?;
            Ok(JsArray::new_value(array.to_vec()))
        }
        "entries" => {
            let mut out = Vec::with_capacity(len);
            for (index, item) in array.to_vec().into_iter().enumerate() {
                interp.check_heap()?;
                out.push(JsArray::new_value(vec![Value::Number(index as f64), item]));
            }
            Ok(JsArray::new_value(out))
        }
        _ => Err(interp.type_error(format!("{name} is not a function"))),
    }
}

fn flatten_into(interp: &Interpreter<'_>, items: &[Value], depth: usize, out: &mut Vec<Value>) -> Flow<()> {
    for item in items {
        match item {
            Value::Array(inner) if depth > 0 => flatten_into(interp, &inner.to_vec(), depth - 1, out)?,
            other => out.push(other.clone()),
        }
        interp.reserve(out.len().saturating_mul(SLOT))?;
    }
    Ok(())
}

/// Stable bottom-up merge sort; `undefined` sorts last like engines do.
// Every index stays below `end`, which is clamped to `len`.
#[allow(clippy::indexing_slicing)]
fn sort_values(
    interp: &mut Interpreter<'_>,
    items: Vec<Value>,
    comparator: Option<&Value>,
) -> Flow<Vec<Value>> {
    let (mut sorted, undefined): (Vec<Value>, Vec<Value>) =
        items.into_iter().partition(|item| !matches!(item, Value::Undefined));
    let len = sorted.len();
    let mut buffer: Vec<Value> = Vec::with_capacity(len);
    let mut width = 1;
    while width < len {
        buffer.clear();
        let mut start = 0;
        while start < len {
            let mid = (start + width).min(len);
            let end = (start + 2 * width).min(len);
            let (mut left, mut right) = (start, mid);
            while left < mid && right < end {
                let ordering = compare_items(interp, &sorted[right], &sorted[left], comparator)?;
                if ordering == Ordering::Less {
                    buffer.push(sorted[right].clone());
                    right += 1;
                } else {
                    buffer.push(sorted[left].clone());
                    left += 1;
                }
            }
            buffer.extend_from_slice(&sorted[left..mid]);
            buffer.extend_from_slice(&sorted[right..end]);
            start = end;
        }
        std::mem::swap(&mut sorted, &mut buffer);
        width *= 2;
    }
    sorted.extend(undefined);
    Ok(sorted)
}

fn compare_items(
    interp: &mut Interpreter<'_>,
    a: &Value,
    b: &Value,
    comparator: Option<&Value>,
) -> Flow<Ordering> {
    match comparator {
        Some(function) => {
            let result = interp.call(function, Value::Undefined, vec![a.clone(), b.clone()])?;
            let number = to_number(&result);
            Ok(if number < 0.0 {
                Ordering::Less
            } else if number > 0.0 {
                Ordering::Greater
            } else {
                Ordering::Equal
            })
        }
        None => {
            interp.tick()?;
            let a = interp.display(a)?;
            let b = interp.display(b)?;
            Ok(a.cmp(&b))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int_follows_prefix_rules() {
        assert_eq!(parse_int("42px", 0), 42.0);
        assert_eq!(parse_int("  -17", 0), -17.0);
        assert_eq!(parse_int("0x1f", 0), 31.0);
        assert_eq!(parse_int("ff", 16), 255.0);
        assert_eq!(parse_int("101", 2), 5.0);
        assert!(parse_int("abc", 0).is_nan());
        assert!(parse_int("10", 1).is_nan());
    }

    #[test]
    fn parse_float_takes_longest_numeric_prefix() {
        assert_eq!(parse_float("3.14abc"), 3.14);
        assert_eq!(parse_float(".5"), 0.5);
        assert_eq!(parse_float("1e3x"), 1000.0);
        assert_eq!(parse_float("2e"), 2.0);
        assert_eq!(parse_float("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_float("x1").is_nan());
        assert!(parse_float(".").is_nan());
    }

    #[test]
    fn to_fixed_rounds_ties_away_from_zero() {
        assert_eq!(to_fixed(2.5, 0), "3");
        assert_eq!(to_fixed(-2.5, 0), "-3");
        assert_eq!(to_fixed(1.005, 2), "1.00");
        assert_eq!(to_fixed(3.14159, 2), "3.14");
        assert_eq!(to_fixed(f64::NAN, 2), "NaN");
    }

    #[test]
    fn radix_conversion() {
        assert_eq!(to_radix(255.0, 16), "ff");
        assert_eq!(to_radix(-5.0, 2), "-101");
        assert_eq!(to_radix(0.5, 2), "0.1");
        assert_eq!(to_radix(0.0, 36), "0");
    }

    #[test]
    fn char_helpers_handle_multibyte_text() {
        assert_eq!(char_len("héllo"), 5);
        assert_eq!(char_at("héllo", 1), Some('é'));
        assert_eq!(byte_offset("héllo", 2), 3);
        assert_eq!(char_index("héllo", 3), 2);
    }
}
