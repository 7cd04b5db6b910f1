//! Runtime values.
//!
//! Aggregates (`List`, `Map`, `String`, `Bytes`) are reference-counted so
//! that indexing and comprehension iteration don't need to clone the
//! underlying data; CEL's value model is immutable, which makes sharing
//! behind an `Rc` safe without interior mutability.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{ErrorKind, EvalError};
use crate::types::Type;

/// A wall-clock duration, stored as seconds plus a nanosecond remainder
/// (always `0..1_000_000_000`, sign following `seconds`). No calendar
/// arithmetic (leap seconds, timezones) is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration {
    pub seconds: i64,
    pub nanos: i32,
}

/// A point in time as a Unix epoch offset. Same precision caveat as
/// [`Duration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

/// A hashable map key. CEL restricts map keys to `bool`, `int`, `uint`, and
/// `string`; enforcing that at construction keeps `Value::Map` usable as a
/// plain `HashMap`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    Uint(u64),
    String(Rc<str>),
}

impl MapKey {
    pub fn from_value(value: &Value) -> Result<MapKey, EvalError> {
        match value {
            Value::Bool(b) => Ok(MapKey::Bool(*b)),
            Value::Int(i) => Ok(MapKey::Int(*i)),
            Value::Uint(u) => Ok(MapKey::Uint(*u)),
            Value::String(s) => Ok(MapKey::String(s.clone())),
            other => Err(EvalError::new(ErrorKind::custom(format!(
                "unsupported map key type: {}",
                other.type_of()
            )))),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            MapKey::Bool(b) => Value::Bool(b),
            MapKey::Int(i) => Value::Int(i),
            MapKey::Uint(u) => Value::Uint(u),
            MapKey::String(s) => Value::String(s),
        }
    }
}

pub type MapValue = HashMap<MapKey, Value>;

/// A message value produced by a [`crate::provider::TypeProvider`]. `fields`
/// holds only the fields that are *set*; an absent key means "use the
/// field's zero value", which is what makes proto3 presence testing
/// (`has(msg.field)`) distinguishable from reading the field itself.
#[derive(Debug, Clone)]
pub struct Object {
    pub type_name: Rc<str>,
    pub fields: Rc<HashMap<String, Value>>,
}

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(Rc<str>),
    Bytes(Rc<[u8]>),
    List(Rc<Vec<Value>>),
    Map(Rc<MapValue>),
    Object(Object),
    Duration(Duration),
    Timestamp(Timestamp),
    /// A first-class type value, as produced by the `type()` function.
    Type(Type),
    /// `optional.of(v)` / `optional.none()`.
    Optional(Rc<Option<Value>>),
    /// The result of a failed subexpression. Threaded through the
    /// evaluator like any other value so callers can inspect or propagate it
    /// explicitly, rather than relying solely on `Result` short-circuiting.
    Error(EvalError),
    /// A marker for attributes whose value could not be resolved against a
    /// partial [`crate::activation::Activation`] (see the Unknown-tracking
    /// partial evaluation story). Carries the ids of the expressions that
    /// were unresolved.
    Unknown(Rc<Vec<u64>>),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Value {
        Value::String(s.into())
    }

    pub fn bytes(b: impl Into<Rc<[u8]>>) -> Value {
        Value::Bytes(b.into())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(items))
    }

    pub fn map(entries: MapValue) -> Value {
        Value::Map(Rc::new(entries))
    }

    pub fn error(kind: ErrorKind) -> Value {
        Value::Error(EvalError::new(kind))
    }

    pub fn unknown(ids: Vec<u64>) -> Value {
        Value::Unknown(Rc::new(ids))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown(_))
    }

    /// Unknown dominates error in CEL's propagation rules (see the
    /// evaluator's operand-combination logic): if either operand is
    /// Unknown, the result is Unknown even when the other is Error.
    pub fn combine_unknowns(a: &Value, b: &Value) -> Option<Value> {
        match (a, b) {
            (Value::Unknown(x), Value::Unknown(y)) => {
                let mut merged = x.as_ref().clone();
                merged.extend(y.iter().copied());
                Some(Value::unknown(merged))
            }
            (Value::Unknown(_), _) => Some(a.clone()),
            (_, Value::Unknown(_)) => Some(b.clone()),
            (Value::Error(_), _) => Some(a.clone()),
            (_, Value::Error(_)) => Some(b.clone()),
            _ => None,
        }
    }

    pub fn type_of(&self) -> Type {
        match self {
            Value::Null => Type::Null,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Uint(_) => Type::Uint,
            Value::Double(_) => Type::Double,
            Value::String(_) => Type::String,
            Value::Bytes(_) => Type::Bytes,
            Value::List(items) => {
                Type::list(items.first().map(Value::type_of).unwrap_or(Type::Dyn))
            }
            Value::Map(entries) => {
                let (k, v) = entries
                    .iter()
                    .next()
                    .map(|(k, v)| (k.clone().into_value().type_of(), v.type_of()))
                    .unwrap_or((Type::Dyn, Type::Dyn));
                Type::map(k, v)
            }
            Value::Object(obj) => Type::Message(obj.type_name.to_string()),
            Value::Duration(_) => Type::Duration,
            Value::Timestamp(_) => Type::Timestamp,
            Value::Type(_) => Type::Type(Box::new(Type::Dyn)),
            Value::Optional(inner) => {
                Type::optional(inner.as_ref().as_ref().map(Value::type_of).unwrap_or(Type::Dyn))
            }
            Value::Error(_) => Type::Error,
            Value::Unknown(_) => Type::Dyn,
        }
    }

    pub fn truthy(&self) -> Result<bool, EvalError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(EvalError::new(ErrorKind::custom(format!(
                "expected bool, found {}",
                other.type_of()
            )))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Uint(u) => write!(f, "{u}u"),
            Value::Double(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {v}", k.clone().into_value())?;
                }
                write!(f, "}}")
            }
            Value::Object(obj) => {
                write!(f, "{}{{", obj.type_name)?;
                for (i, (k, v)) in obj.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Duration(d) => write!(f, "{}.{:09}s", d.seconds, d.nanos.unsigned_abs()),
            Value::Timestamp(t) => write!(f, "{}.{:09}", t.seconds, t.nanos),
            Value::Type(t) => write!(f, "type({t})"),
            Value::Optional(inner) => match inner.as_ref() {
                Some(v) => write!(f, "optional({v})"),
                None => write!(f, "optional.none()"),
            },
            Value::Error(e) => write!(f, "error({e})"),
            Value::Unknown(ids) => write!(f, "unknown({ids:?})"),
        }
    }
}

/// Partial ordering used by comparison operators. Returns `None` when the
/// two values aren't comparable (different kinds, NaN on either side).
pub fn partial_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.partial_cmp(y),
        (Value::Uint(x), Value::Uint(y)) => x.partial_cmp(y),
        (Value::Double(x), Value::Double(y)) => x.partial_cmp(y),
        (Value::Int(x), Value::Double(y)) => (*x as f64).partial_cmp(y),
        (Value::Double(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Uint(x), Value::Double(y)) => (*x as f64).partial_cmp(y),
        (Value::Double(x), Value::Uint(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Int(x), Value::Uint(y)) => i128::from(*x).partial_cmp(&i128::from(*y)),
        (Value::Uint(x), Value::Int(y)) => i128::from(*x).partial_cmp(&i128::from(*y)),
        (Value::Bool(x), Value::Bool(y)) => x.partial_cmp(y),
        (Value::String(x), Value::String(y)) => x.partial_cmp(y),
        (Value::Bytes(x), Value::Bytes(y)) => x.partial_cmp(y),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Duration(x), Value::Duration(y)) => x.partial_cmp(y),
        (Value::Timestamp(x), Value::Timestamp(y)) => x.partial_cmp(y),
        (Value::List(x), Value::List(y)) => {
            for (xi, yi) in x.iter().zip(y.iter()) {
                match partial_cmp(xi, yi) {
                    Some(Ordering::Equal) => continue,
                    other => return other,
                }
            }
            x.len().partial_cmp(&y.len())
        }
        _ => None,
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    partial_cmp(a, b) == Some(Ordering::Equal)
        || matches!((a, b), (Value::Map(x), Value::Map(y)) if maps_equal(x, y))
        || matches!(
            (a, b),
            (Value::Object(x), Value::Object(y))
                if x.type_name == y.type_name
                    && x.fields.len() == y.fields.len()
                    && x.fields.iter().all(|(k, v)| y.fields.get(k).is_some_and(|bv| values_equal(v, bv)))
        )
}

fn maps_equal(a: &MapValue, b: &MapValue) -> bool {
    a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|bv| values_equal(v, bv)))
}
