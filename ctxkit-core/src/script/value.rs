//! Runtime values and the conversions between them and JSON.

use super::ast::{FunctionDef, Name};
use super::heap::{self, CONTAINER_OVERHEAD, ENTRY_OVERHEAD, Garbage, SLOT, STRING_OVERHEAD, Tracked};
use super::scope::ScopeRef;
use crate::sdk::{Namespace, SdkFunction};
use indexmap::IndexMap;
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// Deepest structure [`to_json`] converts.
pub const MAX_JSON_DEPTH: usize = 256;

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(JsString),
    Array(Rc<JsArray>),
    Object(Rc<JsObject>),
    Function(Rc<Closure>),
    Native(Rc<Native>),
    Host(HostObject),
}

pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub scope: ScopeRef,
}

/// Built-in callables and namespaces.
pub enum Native {
    /// `Math`, `JSON`, `Object`, ... Some are callable (`String(x)`).
    Namespace(&'static str),
    /// Free function such as `parseInt` or `Math.max`.
    Function(&'static str),
    /// Method bound to its receiver, e.g. `[1, 2].map`.
    Method(Value, &'static str),
}

/// Pieces of the `ctx` object. They carry no state of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostObject {
    Ctx,
    Namespace(Namespace),
    Function(SdkFunction),
}

// ---- strings ---------------------------------------------------------------

pub struct HeapStr(Box<str>);

impl Drop for HeapStr {
    fn drop(&mut self) {
        heap::release(self.0.len() + STRING_OVERHEAD);
    }
}

#[derive(Clone)]
pub struct JsString(Rc<HeapStr>);

impl JsString {
    pub fn as_str(&self) -> &str {
        &self.0.0
    }
}

impl Deref for JsString {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl From<String> for JsString {
    fn from(text: String) -> Self {
        heap::charge(text.len() + STRING_OVERHEAD);
        JsString(Rc::new(HeapStr(text.into_boxed_str())))
    }
}

impl From<&str> for JsString {
    fn from(text: &str) -> Self {
        JsString::from(text.to_string())
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

// ---- arrays ------------------------------------------------------------------

pub struct JsArray {
    items: RefCell<Vec<Value>>,
    charged: Cell<usize>,
    frozen: Cell<bool>,
}

impl JsArray {
    pub fn new_rc(items: Vec<Value>) -> Rc<JsArray> {
        let charged = CONTAINER_OVERHEAD + items.len() * SLOT;
        heap::charge(charged);
        let array = Rc::new(JsArray {
            items: RefCell::new(items),
            charged: Cell::new(charged),
            frozen: Cell::new(false),
        });
        heap::track(Tracked::Array(Rc::downgrade(&array)));
        array
    }

    pub fn new_value(items: Vec<Value>) -> Value {
        Value::Array(Self::new_rc(items))
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.borrow().get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.items.borrow().clone()
    }

    pub fn borrow(&self) -> Ref<'_, Vec<Value>> {
        self.items.borrow()
    }

    /// Mutate the items and re-charge for the new length. Callers must not
    /// run script code inside `f`.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        let mut items = self.items.borrow_mut();
        let result = f(&mut items);
        let charged = CONTAINER_OVERHEAD + items.len() * SLOT;
        let previous = self.charged.replace(charged);
        if charged > previous {
            heap::charge(charged - previous);
        } else {
            heap::release(previous - charged);
        }
        result
    }

    pub fn freeze(&self) {
        self.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    pub(super) fn take_items(&mut self) -> Vec<Value> {
        std::mem::take(self.items.get_mut())
    }

    pub(super) fn drain(&self) -> Vec<Value> {
        self.with_mut(std::mem::take)
    }
}

impl Drop for JsArray {
    fn drop(&mut self) {
        heap::release(self.charged.get());
        let items = self.take_items();
        if !items.is_empty() {
            heap::dispose(items.into_iter().map(Garbage::Value).collect());
        }
    }
}

// ---- objects -------------------------------------------------------------------

pub type PropMap = IndexMap<Name, Value>;

pub struct JsObject {
    props: RefCell<PropMap>,
    charged: Cell<usize>,
    frozen: Cell<bool>,
}

impl JsObject {
    pub fn new_rc() -> Rc<JsObject> {
        Self::from_props(PropMap::new())
    }

    pub fn from_props(props: PropMap) -> Rc<JsObject> {
        let charged = CONTAINER_OVERHEAD
            + props
                .keys()
                .map(|key| key.len() + ENTRY_OVERHEAD)
                .sum::<usize>();
        heap::charge(charged);
        let object = Rc::new(JsObject {
            props: RefCell::new(props),
            charged: Cell::new(charged),
            frozen: Cell::new(false),
        });
        heap::track(Tracked::Object(Rc::downgrade(&object)));
        object
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.props.borrow().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.props.borrow().contains_key(key)
    }

    pub fn set(&self, key: Name, value: Value) {
        let cost = key.len() + ENTRY_OVERHEAD;
        let previous = self.props.borrow_mut().insert(key, value);
        if previous.is_none() {
            heap::charge(cost);
            self.charged.set(self.charged.get() + cost);
        }
        drop(previous);
    }

    pub fn remove(&self, key: &str) -> bool {
        let removed = self.props.borrow_mut().shift_remove_entry(key);
        match removed {
            Some((key, value)) => {
                let cost = key.len() + ENTRY_OVERHEAD;
                heap::release(cost);
                self.charged.set(self.charged.get() - cost);
                drop(value);
                true
            }
            None => false,
        }
    }

    pub fn keys(&self) -> Vec<Name> {
        self.props.borrow().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(Name, Value)> {
        self.props
            .borrow()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn freeze(&self) {
        self.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    pub(super) fn take_values(&mut self) -> Vec<Value> {
        std::mem::take(self.props.get_mut())
            .into_iter()
            .map(|(_, value)| value)
            .collect()
    }

    pub(super) fn drain(&self) -> Vec<Value> {
        let props = std::mem::take(&mut *self.props.borrow_mut());
        heap::release(self.charged.get() - CONTAINER_OVERHEAD);
        self.charged.set(CONTAINER_OVERHEAD);
        props.into_iter().map(|(_, value)| value).collect()
    }
}

impl Drop for JsObject {
    fn drop(&mut self) {
        heap::release(self.charged.get());
        let values = self.take_values();
        if !values.is_empty() {
            heap::dispose(values.into_iter().map(Garbage::Value).collect());
        }
    }
}

/// Build a plain object from static keys.
pub fn object_value<'a>(entries: impl IntoIterator<Item = (&'a str, Value)>) -> Value {
    let props: PropMap = entries
        .into_iter()
        .map(|(key, value)| (Name::from(key), value))
        .collect();
    Value::Object(JsObject::from_props(props))
}

// ---- value helpers ---------------------------------------------------------------

impl Value {
    pub fn str(text: impl Into<JsString>) -> Value {
        Value::Str(text.into())
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        match self {
            Value::Function(_) => true,
            Value::Native(native) => match &**native {
                Native::Namespace(name) => matches!(*name, "String" | "Number" | "Boolean" | "Array"),
                _ => true,
            },
            Value::Host(HostObject::Function(_)) => true,
            Value::Host(HostObject::Namespace(ns)) => ns.call_target().is_some(),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Number(value) => f.write_str(&number_to_string(*value)),
            Value::Str(text) => write!(f, "{text:?}"),
            Value::Array(array) => write!(f, "Array({})", array.len()),
            Value::Object(object) => write!(f, "Object({:?})", object.keys()),
            Value::Function(closure) => write!(
                f,
                "Function({})",
                closure.def.name.as_deref().unwrap_or("anonymous")
            ),
            Value::Native(native) => match &**native {
                Native::Namespace(name) | Native::Function(name) => write!(f, "Native({name})"),
                Native::Method(_, name) => write!(f, "Method({name})"),
            },
            Value::Host(host) => write!(f, "{host:?}"),
        }
    }
}

pub fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Undefined => "undefined",
        Value::Null => "object",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::Str(_) => "string",
        Value::Array(_) | Value::Object(_) => "object",
        other if other.is_callable() => "function",
        _ => "object",
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Undefined | Value::Null => false,
        Value::Bool(value) => *value,
        Value::Number(value) => *value != 0.0 && !value.is_nan(),
        Value::Str(text) => !text.is_empty(),
        _ => true,
    }
}

/// JavaScript's Number-to-String conversion.
pub fn number_to_string(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    let magnitude = value.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return format!("{value}");
    }
    let formatted = format!("{value:e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => formatted,
    }
}

pub fn string_to_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let radix = match unsigned.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0o" | "0O") => Some(8),
        Some("0b" | "0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        if trimmed.starts_with(['-', '+']) {
            return f64::NAN;
        }
        return u64::from_str_radix(unsigned.get(2..).unwrap_or_default(), radix)
            .map(|value| value as f64)
            .unwrap_or(f64::NAN);
    }
    let magnitude = if unsigned == "Infinity" {
        f64::INFINITY
    } else if unsigned
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        && unsigned.starts_with(|c: char| c.is_ascii_digit() || c == '.')
    {
        unsigned.parse::<f64>().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    };
    if negative { -magnitude } else { magnitude }
}

pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Undefined => f64::NAN,
        Value::Null => 0.0,
        Value::Bool(value) => f64::from(u8::from(*value)),
        Value::Number(value) => *value,
        Value::Str(text) => string_to_number(text),
        Value::Array(array) => {
            let items = array.borrow();
            match items.as_slice() {
                [] => 0.0,
                [single] if !matches!(single, Value::Array(_) | Value::Object(_)) => {
                    to_number(single)
                }
                _ => f64::NAN,
            }
        }
        _ => f64::NAN,
    }
}

/// Integer conversion used by index-like arguments (`slice`, `at`, ...).
pub fn to_integer(value: &Value) -> f64 {
    let number = to_number(value);
    if number.is_nan() { 0.0 } else { number.trunc() }
}

/// Resolve a relative index argument against `len`, clamping into `[0, len]`.
pub fn relative_index(value: Option<&Value>, len: usize, default: usize) -> usize {
    let Some(value) = value.filter(|value| !matches!(value, Value::Undefined)) else {
        return default;
    };
    let index = to_integer(value);
    let len_f = len as f64;
    let resolved = if index < 0.0 { (len_f + index).max(0.0) } else { index.min(len_f) };
    resolved as usize
}

/// Canonical array index for a property key, if it is one.
pub fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

/// ToString for values that need no traversal.
pub fn primitive_to_string(value: &Value) -> Option<String> {
    Some(match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(value) => value.to_string(),
        Value::Number(value) => number_to_string(*value),
        Value::Str(text) => text.to_string(),
        _ => return None,
    })
}

/// ToString, giving up once the result would exceed `max_len` bytes.
pub fn to_display(value: &Value, max_len: usize) -> Option<String> {
    let mut out = String::new();
    if display_into(&mut out, value, &mut Vec::new(), max_len) {
        Some(out)
    } else {
        None
    }
}

fn display_into(out: &mut String, value: &Value, ancestors: &mut Vec<usize>, max_len: usize) -> bool {
    match value {
        Value::Array(array) => {
            // Cyclic or absurdly deep arrays render as empty, like engines do.
            let id = Rc::as_ptr(array) as usize;
            if ancestors.contains(&id) || ancestors.len() > 32 {
                return true;
            }
            ancestors.push(id);
            let len = array.len();
            for index in 0..len {
                if index > 0 {
                    out.push(',');
                }
                match array.get(index) {
                    Some(Value::Undefined | Value::Null) | None => {}
                    Some(item) => {
                        if !display_into(out, &item, ancestors, max_len) {
                            return false;
                        }
                    }
                }
                if out.len() > max_len {
                    return false;
                }
            }
            ancestors.pop();
        }
        Value::Object(object) => match error_parts(object) {
            Some((name, message)) if message.is_empty() => out.push_str(&name),
            Some((name, message)) => {
                out.push_str(&name);
                out.push_str(": ");
                out.push_str(&message);
            }
            None => out.push_str("[object Object]"),
        },
        Value::Function(closure) => {
            out.push_str("function ");
            out.push_str(closure.def.name.as_deref().unwrap_or(""));
            out.push_str("() { [code] }");
        }
        Value::Native(native) => match &**native {
            Native::Namespace(name @ ("Math" | "JSON" | "Promise")) => {
                out.push_str("[object ");
                out.push_str(name);
                out.push(']');
            }
            Native::Namespace(name) | Native::Function(name) | Native::Method(_, name) => {
                out.push_str("function ");
                out.push_str(name);
                out.push_str("() { [native code] }");
            }
        },
        Value::Host(HostObject::Ctx) => out.push_str("[object ctx]"),
        Value::Host(HostObject::Namespace(ns)) => {
            out.push_str("[object ctx.");
            out.push_str(ns.as_str());
            out.push(']');
        }
        Value::Host(HostObject::Function(function)) => {
            out.push_str("function ");
            out.push_str(&function.name());
            out.push_str("() { [native code] }");
        }
        primitive => {
            if let Some(text) = primitive_to_string(primitive) {
                out.push_str(&text);
            }
        }
    }
    out.len() <= max_len
}

/// `(name, message)` of an object shaped like an error.
pub fn error_parts(object: &JsObject) -> Option<(String, String)> {
    let name = object.get("name")?;
    let message = object.get("message")?;
    match (name, message) {
        (Value::Str(name), Value::Str(message)) if name.ends_with("Error") => {
            Some((name.to_string(), message.to_string()))
        }
        _ => None,
    }
}

pub fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a.as_str() == b.as_str(),
        (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
        (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
        (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
        (Value::Native(a), Value::Native(b)) => {
            Rc::ptr_eq(a, b)
                || match (&**a, &**b) {
                    (Native::Namespace(x), Native::Namespace(y))
                    | (Native::Function(x), Native::Function(y)) => x == y,
                    _ => false,
                }
        }
        (Value::Host(a), Value::Host(b)) => a == b,
        _ => false,
    }
}

/// `==` semantics.
pub fn loose_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
        (Value::Number(_), Value::Str(_))
        | (Value::Str(_), Value::Number(_))
        | (Value::Bool(_), _)
        | (_, Value::Bool(_)) => {
            if matches!((left, right), (Value::Bool(_), Value::Bool(_))) {
                return strict_equals(left, right);
            }
            let primitive = |value: &Value| {
                matches!(value, Value::Number(_) | Value::Str(_) | Value::Bool(_))
            };
            if primitive(left) && primitive(right) {
                to_number(left) == to_number(right)
            } else {
                false
            }
        }
        _ => strict_equals(left, right),
    }
}

/// Equality used by `includes`: like `===` but `NaN` equals itself.
pub fn same_value_zero(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
        _ => strict_equals(left, right),
    }
}

// ---- JSON --------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonError {
    Circular,
    TooDeep,
    TooLarge,
}

impl fmt::Display for JsonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JsonError::Circular => "Converting circular structure to JSON",
            JsonError::TooDeep => "Structure is nested too deeply to convert to JSON",
            JsonError::TooLarge => "Value is too large to convert to JSON",
        })
    }
}

struct JsonWriter {
    ancestors: Vec<usize>,
    bytes: usize,
    max_bytes: usize,
}

impl JsonWriter {
    fn account(&mut self, bytes: usize) -> Result<(), JsonError> {
        self.bytes = self.bytes.saturating_add(bytes);
        if self.bytes > self.max_bytes {
            Err(JsonError::TooLarge)
        } else {
            Ok(())
        }
    }
}

/// Convert to JSON. `None` means the value has no JSON form (`undefined`,
/// functions): such properties are dropped and such array items become `null`.
pub fn to_json(value: &Value, max_bytes: usize) -> Result<Option<serde_json::Value>, JsonError> {
    let mut writer = JsonWriter {
        ancestors: Vec::new(),
        bytes: 0,
        max_bytes,
    };
    json_inner(value, &mut writer)
}

fn json_inner(value: &Value, writer: &mut JsonWriter) -> Result<Option<serde_json::Value>, JsonError> {
    use serde_json::Value as Json;
    writer.account(8)?;
    let json = match value {
        Value::Undefined
        | Value::Function(_)
        | Value::Native(_)
        | Value::Host(_) => return Ok(None),
        Value::Null => Json::Null,
        Value::Bool(value) => Json::Bool(*value),
        Value::Number(value) => number_to_json(*value),
        Value::Str(text) => {
            writer.account(text.len())?;
            Json::String(text.to_string())
        }
        Value::Array(array) => {
            let id = Rc::as_ptr(array) as usize;
            enter(writer, id)?;
            let items = array.to_vec();
            let mut out = Vec::with_capacity(items.len());
            for item in &items {
                out.push(json_inner(item, writer)?.unwrap_or(Json::Null));
            }
            writer.ancestors.pop();
            Json::Array(out)
        }
        Value::Object(object) => {
            let id = Rc::as_ptr(object) as usize;
            enter(writer, id)?;
            let mut out = serde_json::Map::new();
            for (key, item) in object.entries() {
                if let Some(json) = json_inner(&item, writer)? {
                    writer.account(key.len())?;
                    out.insert(key.to_string(), json);
                }
            }
            writer.ancestors.pop();
            Json::Object(out)
        }
    };
    Ok(Some(json))
}

fn enter(writer: &mut JsonWriter, id: usize) -> Result<(), JsonError> {
    if writer.ancestors.contains(&id) {
        return Err(JsonError::Circular);
    }
    if writer.ancestors.len() >= MAX_JSON_DEPTH {
        return Err(JsonError::TooDeep);
    }
    writer.ancestors.push(id);
    Ok(())
}

pub fn number_to_json(value: f64) -> serde_json::Value {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.007_199_254_740_992e15 {
        serde_json::Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

pub fn from_json(json: &serde_json::Value) -> Value {
    use serde_json::Value as Json;
    match json {
        Json::Null => Value::Null,
        Json::Bool(value) => Value::Bool(*value),
        Json::Number(number) => Value::Number(number.as_f64().unwrap_or(f64::NAN)),
        Json::String(text) => Value::str(text.as_str()),
        Json::Array(items) => JsArray::new_value(items.iter().map(from_json).collect()),
        Json::Object(map) => {
            let props: PropMap = map
                .iter()
                .map(|(key, value)| (Name::from(key.as_str()), from_json(value)))
                .collect();
            Value::Object(JsObject::from_props(props))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn formats_numbers_like_javascript() {
        assert_eq!(number_to_string(2.0), "2");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(1.5), "1.5");
        assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1.5e-7), "1.5e-7");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(number_to_string(123456789012.0), "123456789012");
    }

    #[test]
    fn converts_strings_to_numbers() {
        assert_eq!(string_to_number(" 42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x1f"), 31.0);
        assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
        assert!(string_to_number("12px").is_nan());
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("nan").is_nan());
    }

    #[test]
    fn equality_follows_javascript_rules() {
        assert!(loose_equals(&Value::Null, &Value::Undefined));
        assert!(!loose_equals(&Value::Null, &Value::Number(0.0)));
        assert!(loose_equals(&Value::str("1"), &Value::Number(1.0)));
        assert!(loose_equals(&Value::Bool(true), &Value::Number(1.0)));
        assert!(!strict_equals(&Value::str("1"), &Value::Number(1.0)));
        assert!(!strict_equals(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
        assert!(same_value_zero(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
    }

    #[test]
    fn json_round_trip_keeps_key_order_and_integers() {
        let json = json!({"b": 1, "a": [1.5, "x", null, true]});
        let value = from_json(&json);
        assert_eq!(to_json(&value, usize::MAX), Ok(Some(json)));
    }

    #[test]
    fn json_drops_undefined_and_nulls_non_finite() {
        let value = object_value([
            ("skip", Value::Undefined),
            ("nan", Value::Number(f64::NAN)),
            ("list", JsArray::new_value(vec![Value::Undefined])),
        ]);
        assert_eq!(
            to_json(&value, usize::MAX),
            Ok(Some(json!({"nan": null, "list": [null]})))
        );
    }

    #[test]
    fn json_rejects_cycles_and_oversized_values() {
        let object = JsObject::new_rc();
        object.set("self".into(), Value::Object(object.clone()));
        assert_eq!(
            to_json(&Value::Object(object.clone()), usize::MAX),
            Err(JsonError::Circular)
        );
        object.remove("self");

        let big = Value::str("x".repeat(100));
        let shared = JsArray::new_value(vec![big.clone(), big.clone(), big]);
        assert_eq!(to_json(&shared, 150), Err(JsonError::TooLarge));
    }

    #[test]
    fn displays_arrays_and_errors() {
        let array = JsArray::new_value(vec![
            Value::Number(1.0),
            Value::Null,
            JsArray::new_value(vec![Value::str("a"), Value::str("b")]),
        ]);
        assert_eq!(to_display(&array, usize::MAX).as_deref(), Some("1,,a,b"));
        let error = object_value([("name", Value::str("TypeError")), ("message", Value::str("bad"))]);
        assert_eq!(to_display(&error, usize::MAX).as_deref(), Some("TypeError: bad"));
        assert_eq!(to_display(&array, 2), None);
    }

    #[test]
    fn array_indices_are_canonical() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("12"), Some(12));
        assert_eq!(array_index("01"), None);
        assert_eq!(array_index("-1"), None);
        assert_eq!(array_index("length"), None);
    }
}
