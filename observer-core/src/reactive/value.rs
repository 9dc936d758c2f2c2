//! Value Model
//!
//! Everything that flows through the observable layer is a [`Value`]: a
//! primitive, a plain container ([`Raw`]), an observable wrapper around one
//! ([`Observed`]), or a single-value box ([`Ref`]).
//!
//! # Equality
//!
//! Values compare with SameValueZero semantics. Primitives compare by value
//! (`NaN` equals itself, `+0` equals `-0`); containers, wrappers and refs
//! compare by identity. This is the equality used both for collection
//! membership and for suppressing no-op writes.
//!
//! # Keys
//!
//! A [`Key`] addresses one slot of a container. Besides the obvious field,
//! index and entry forms there are two reserved keys: [`Key::Length`] for the
//! length slot of a sequence and [`Key::Iterate`], the sentinel that stands
//! for "the membership of this container changed".

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use serde::ser::{Serialize, Serializer};

use super::observed::Observed;
use super::raw::{Container, Raw};
use super::refs::Ref;

/// A dynamically typed value stored in, or read from, a container.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absence of a value. Reads of missing keys yield `Null`.
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    /// A plain container, not observed.
    Raw(Raw),
    /// An observable wrapper around a plain container.
    Observed(Observed),
    /// A single-value observable box (including computed values).
    Ref(Ref),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The number as an integer, if it has no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            // `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
            Value::Number(n)
                if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n < i64::MAX as f64 =>
            {
                Some(*n as i64)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&Raw> {
        match self {
            Value::Raw(raw) => Some(raw),
            _ => None,
        }
    }

    pub fn as_observed(&self) -> Option<&Observed> {
        match self {
            Value::Observed(observed) => Some(observed),
            _ => None,
        }
    }

    pub fn into_observed(self) -> Option<Observed> {
        match self {
            Value::Observed(observed) => Some(observed),
            _ => None,
        }
    }

    pub fn as_ref_handle(&self) -> Option<&Ref> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Whether this value has identity (container, wrapper or ref) rather
    /// than being a primitive.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Raw(_) | Value::Observed(_) | Value::Ref(_))
    }

    /// Whether this value is a container, observed or not.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Raw(_) | Value::Observed(_))
    }

    /// Snapshot this value as JSON without establishing any dependency.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Hash-stable bit pattern for SameValueZero equality.
fn number_bits(n: f64) -> u64 {
    if n == 0.0 {
        0
    } else if n.is_nan() {
        f64::NAN.to_bits()
    } else {
        n.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Raw(a), Value::Raw(b)) => a == b,
            (Value::Observed(a), Value::Observed(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => number_bits(*n).hash(state),
            Value::Str(s) => s.hash(state),
            Value::Raw(raw) => raw.hash(state),
            Value::Observed(observed) => observed.hash(state),
            Value::Ref(r) => r.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) if n.is_finite() && n.abs() >= 1e21 => write!(f, "{n:e}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => f.write_str(s),
            Value::Raw(raw) => write!(f, "[object {}]", raw.kind()),
            Value::Observed(observed) => write!(f, "[object {}]", observed.kind()),
            Value::Ref(_) => f.write_str("[object Ref]"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            // Integral numbers go out as integers so snapshots compare equal
            // to the JSON they were built from.
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 => {
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Raw(raw) => raw.serialize(serializer),
            Value::Observed(observed) => observed.to_raw().serialize(serializer),
            Value::Ref(r) => r.peek().serialize(serializer),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<Raw> for Value {
    fn from(raw: Raw) -> Self {
        Value::Raw(raw)
    }
}

impl From<Observed> for Value {
    fn from(observed: Observed) -> Self {
        Value::Observed(observed)
    }
}

impl From<Ref> for Value {
    fn from(r: Ref) -> Self {
        Value::Ref(r)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Builds plain (unobserved) containers from JSON, preserving object order.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => Value::Raw(Raw::new(Container::Sequence(
                items.into_iter().map(Value::from).collect(),
            ))),
            serde_json::Value::Object(fields) => Value::Raw(Raw::new(Container::Record(
                fields
                    .into_iter()
                    .map(|(name, value)| (Rc::from(name), Value::from(value)))
                    .collect(),
            ))),
        }
    }
}

/// A property key addressing one slot of a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A named record field.
    Field(Rc<str>),
    /// A sequence slot.
    Index(usize),
    /// The length slot of a sequence.
    Length,
    /// A set member or map key.
    Entry(Value),
    /// Reserved sentinel: the container's membership or iteration changed.
    Iterate,
}

impl Key {
    /// The key a ref reads and writes under.
    pub(crate) fn empty() -> Key {
        Key::Field(Rc::from(""))
    }

    /// Normalize for a record: everything addresses a named field.
    pub(crate) fn for_record(self) -> Key {
        match self {
            Key::Field(name) => Key::Field(name),
            Key::Index(i) => Key::Field(Rc::from(i.to_string())),
            Key::Length => Key::Field(Rc::from("length")),
            Key::Entry(Value::Str(name)) => Key::Field(name),
            Key::Entry(other) => Key::Field(Rc::from(other.to_string())),
            Key::Iterate => Key::Iterate,
        }
    }

    /// Normalize for a sequence: numeric names become indices and `"length"`
    /// becomes the length slot.
    pub(crate) fn for_sequence(self) -> Key {
        match self {
            Key::Field(name) if &*name == "length" => Key::Length,
            Key::Field(name) => match name.parse::<usize>() {
                Ok(i) => Key::Index(i),
                Err(_) => Key::Field(name),
            },
            Key::Entry(Value::Number(n)) => match index_from_f64(n) {
                Some(i) => Key::Index(i),
                None => Key::Entry(Value::Number(n)),
            },
            Key::Entry(Value::Str(name)) => Key::Field(name).for_sequence(),
            other => other,
        }
    }

    /// The key as a collection member.
    pub(crate) fn into_entry(self) -> Value {
        match self {
            Key::Field(name) => Value::Str(name),
            Key::Index(i) => Value::from(i),
            Key::Length => Value::from("length"),
            Key::Entry(value) => value,
            Key::Iterate => Value::Null,
        }
    }
}

/// A non-negative integral number that fits in `usize`.
pub(crate) fn index_from_f64(n: f64) -> Option<usize> {
    // `usize::MAX as f64` rounds up, so the bound is exclusive.
    (n >= 0.0 && n.fract() == 0.0 && n < usize::MAX as f64).then(|| n as usize)
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => f.write_str(name),
            Key::Index(i) => write!(f, "{i}"),
            Key::Length => f.write_str("length"),
            Key::Entry(value) => write!(f, "{value}"),
            Key::Iterate => f.write_str("[iterate]"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Field(Rc::from(name))
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Field(Rc::from(name))
    }
}

impl From<Rc<str>> for Key {
    fn from(name: Rc<str>) -> Self {
        Key::Field(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

/// Integers address a sequence slot, a record field named by the number, or
/// a numeric collection key, depending on the container.
impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Entry(Value::from(n))
    }
}

impl From<Value> for Key {
    fn from(value: Value) -> Self {
        Key::Entry(value)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
