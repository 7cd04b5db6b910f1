//! Type providers: the abstract collaborator the checker and evaluator
//! consult for message-shaped data, in place of runtime reflection over host
//! objects (see the core's "no reflection" design note).
//!
//! The core never introspects host values directly; it asks a
//! [`TypeProvider`] for field types, presence rules, and constructors, and
//! receives already-converted [`Value`]s back. [`DefaultTypeProvider`] is a
//! minimal in-memory registry a host can seed with message and enum
//! descriptors; real embeddings (e.g. backed by protobuf descriptors) supply
//! their own implementation of the trait.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{ErrorKind, EvalError};
use crate::types::Type;
use crate::value::{Object, Value};

/// Describes one field of a registered message type.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub ty: Type,
    /// `true` for proto2-style fields and message/oneof members, where
    /// presence is tracked independently of the zero value; `false` for
    /// proto3 scalars, where `has()` means "not equal to the zero value".
    pub explicit_presence: bool,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, ty: Type, explicit_presence: bool) -> Self {
        Self { name: name.into(), ty, explicit_presence }
    }
}

/// Resolves qualified type names, their fields, and enum constants, and
/// constructs message values. Consumed by the checker (for field typing and
/// identifier resolution) and by the planner/evaluator (for field getters
/// and message literal construction).
pub trait TypeProvider: fmt::Debug {
    fn find_type(&self, qualified_name: &str) -> Option<Type>;
    fn find_field(&self, type_name: &str, field: &str) -> Option<FieldInfo>;
    fn find_enum_value(&self, qualified_name: &str) -> Option<i64>;
    fn new_value(&self, type_name: &str, fields: HashMap<String, Value>) -> Result<Value, EvalError>;

    /// The zero value for a declared field type, used when a proto3 scalar
    /// field is absent from a constructed message.
    fn zero_value(&self, ty: &Type) -> Value {
        zero_value(ty)
    }
}

pub fn zero_value(ty: &Type) -> Value {
    match ty {
        Type::Null | Type::Dyn | Type::Nullable(_) => Value::Null,
        Type::Bool => Value::Bool(false),
        Type::Int => Value::Int(0),
        Type::Uint => Value::Uint(0),
        Type::Double => Value::Double(0.0),
        Type::String => Value::string(""),
        Type::Bytes => Value::bytes(Vec::new()),
        Type::List(_) => Value::list(Vec::new()),
        Type::Map(_, _) => Value::map(HashMap::new()),
        Type::Duration => Value::Duration(crate::value::Duration { seconds: 0, nanos: 0 }),
        Type::Timestamp => Value::Timestamp(crate::value::Timestamp { seconds: 0, nanos: 0 }),
        Type::Message(name) => Value::Object(Object { type_name: Rc::from(name.as_str()), fields: Rc::new(HashMap::new()) }),
        Type::Optional(_) => Value::Optional(Rc::new(None)),
        Type::Type(inner) => Value::Type(inner.as_ref().clone()),
        Type::TypeParam(_) | Type::Error => Value::Null,
    }
}

#[derive(Debug, Clone, Default)]
struct MessageDescriptor {
    fields: Vec<FieldInfo>,
}

/// An in-memory [`TypeProvider`] a host populates by calling
/// [`DefaultTypeProvider::register_message`] / [`register_enum`]. Seeded with
/// nothing by default — `Duration`/`Timestamp`/wrapper types are native
/// [`Value`] variants rather than provider-resolved messages, matching the
/// "default registry seeded with well-known types" design note.
#[derive(Debug, Default)]
pub struct DefaultTypeProvider {
    messages: HashMap<String, MessageDescriptor>,
    enums: HashMap<String, i64>,
}

impl DefaultTypeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_message(&mut self, type_name: impl Into<String>, fields: Vec<FieldInfo>) -> &mut Self {
        self.messages.insert(type_name.into(), MessageDescriptor { fields });
        self
    }

    pub fn register_enum(&mut self, qualified_name: impl Into<String>, value: i64) -> &mut Self {
        self.enums.insert(qualified_name.into(), value);
        self
    }
}

impl TypeProvider for DefaultTypeProvider {
    fn find_type(&self, qualified_name: &str) -> Option<Type> {
        self.messages.contains_key(qualified_name).then(|| Type::Message(qualified_name.to_string()))
    }

    fn find_field(&self, type_name: &str, field: &str) -> Option<FieldInfo> {
        self.messages.get(type_name)?.fields.iter().find(|f| f.name == field).cloned()
    }

    fn find_enum_value(&self, qualified_name: &str) -> Option<i64> {
        self.enums.get(qualified_name).copied()
    }

    fn new_value(&self, type_name: &str, fields: HashMap<String, Value>) -> Result<Value, EvalError> {
        let descriptor = self
            .messages
            .get(type_name)
            .ok_or_else(|| EvalError::new(ErrorKind::custom(format!("unknown message type: {type_name}"))))?;
        for key in fields.keys() {
            if !descriptor.fields.iter().any(|f| &f.name == key) {
                return Err(EvalError::new(ErrorKind::custom(format!("no such field '{key}' on {type_name}"))));
            }
        }
        Ok(Value::Object(Object { type_name: Rc::from(type_name), fields: Rc::new(fields) }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_value_for_proto3_scalar_is_the_default() {
        assert!(matches!(zero_value(&Type::Int), Value::Int(0)));
        assert!(matches!(zero_value(&Type::Bool), Value::Bool(false)));
    }

    #[test]
    fn new_value_rejects_unknown_fields() {
        let mut provider = DefaultTypeProvider::new();
        provider.register_message("pkg.Msg", vec![FieldInfo::new("x", Type::Int, false)]);
        let mut fields = HashMap::new();
        fields.insert("y".to_string(), Value::Int(1));
        assert!(provider.new_value("pkg.Msg", fields).is_err());
    }

    #[test]
    fn new_value_constructs_an_object() {
        let mut provider = DefaultTypeProvider::new();
        provider.register_message("pkg.Msg", vec![FieldInfo::new("x", Type::Int, false)]);
        let mut fields = HashMap::new();
        fields.insert("x".to_string(), Value::Int(42));
        let value = provider.new_value("pkg.Msg", fields).unwrap();
        match value {
            Value::Object(obj) => assert_eq!(obj.type_name.as_ref(), "pkg.Msg"),
            other => panic!("expected Object, got {other:?}"),
        }
    }
}
