//! The static type lattice used by the checker.
//!
//! `Dyn` is the top type: every other type is assignable to it, and it is
//! assignable to every other type. This is what lets the checker stay quiet
//! about expressions whose shape it can't fully pin down (map values,
//! message fields with no descriptor) instead of forcing a hard failure.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Dyn,
    Null,
    Bool,
    Int,
    Uint,
    Double,
    String,
    Bytes,
    Duration,
    Timestamp,
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
    /// A protobuf-style message type identified by name. Field types are
    /// resolved through a [`crate::provider::TypeProvider`] rather than
    /// tracked inline here.
    Message(String),
    /// A protobuf wrapper type (`google.protobuf.Int32Value`, ...) unwrapping
    /// to either `Null` or the wrapped primitive.
    Nullable(Box<Type>),
    /// `type(x)` — the type of a type.
    Type(Box<Type>),
    /// `optional_type(T)`.
    Optional(Box<Type>),
    /// A checker type variable, resolved during unification.
    TypeParam(String),
    /// The type of an already-failed subexpression; errors propagate through
    /// type-checking without producing secondary diagnostics.
    Error,
}

impl Type {
    pub fn list(elem: Type) -> Type {
        Type::List(Box::new(elem))
    }

    pub fn map(key: Type, value: Type) -> Type {
        Type::Map(Box::new(key), Box::new(value))
    }

    pub fn optional(inner: Type) -> Type {
        Type::Optional(Box::new(inner))
    }

    /// True if a value statically typed `self` may be used wherever `other`
    /// is expected. `Dyn` unifies with everything in both directions;
    /// `Error` likewise, so one bad subexpression doesn't cascade into
    /// unrelated diagnostics.
    pub fn is_assignable_to(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Dyn, _) | (_, Type::Dyn) => true,
            (Type::Error, _) | (_, Type::Error) => true,
            (Type::TypeParam(_), _) | (_, Type::TypeParam(_)) => true,
            (Type::List(a), Type::List(b)) => a.is_assignable_to(b),
            (Type::Map(ak, av), Type::Map(bk, bv)) => ak.is_assignable_to(bk) && av.is_assignable_to(bv),
            (Type::Optional(a), Type::Optional(b)) => a.is_assignable_to(b),
            (Type::Type(a), Type::Type(b)) => a.is_assignable_to(b),
            // Wrapper messages assign to `Nullable(primitive)`, and a
            // nullable accepts either `Null` or its payload type.
            (Type::Null, Type::Nullable(_)) => true,
            (a, Type::Nullable(b)) => a.is_assignable_to(b),
            (Type::Nullable(a), Type::Nullable(b)) => a.is_assignable_to(b),
            (a, b) => a == b,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Uint | Type::Double | Type::Dyn)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Dyn => write!(f, "dyn"),
            Type::Null => write!(f, "null_type"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Uint => write!(f, "uint"),
            Type::Double => write!(f, "double"),
            Type::String => write!(f, "string"),
            Type::Bytes => write!(f, "bytes"),
            Type::Duration => write!(f, "google.protobuf.Duration"),
            Type::Timestamp => write!(f, "google.protobuf.Timestamp"),
            Type::List(t) => write!(f, "list({t})"),
            Type::Map(k, v) => write!(f, "map({k}, {v})"),
            Type::Message(name) => write!(f, "{name}"),
            Type::Nullable(t) => write!(f, "wrapper({t})"),
            Type::Type(t) => write!(f, "type({t})"),
            Type::Optional(t) => write!(f, "optional({t})"),
            Type::TypeParam(name) => write!(f, "{name}"),
            Type::Error => write!(f, "!error!"),
        }
    }
}
