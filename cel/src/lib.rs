//! Type checking and evaluation for the Common Expression Language.
//!
//! ```
//! use cel::{Env, DefaultTypeProvider, MapActivation, Program, Type, Value};
//!
//! let mut env = Env::new();
//! env.declare_variable("x", Type::Int);
//! let provider = DefaultTypeProvider::new();
//!
//! let program = Program::compile("x + 1", &env, &provider).expect("valid expression");
//! let activation = MapActivation::new().bind("x", Value::Int(41));
//! assert!(matches!(program.eval(&activation, &provider), Value::Int(42)));
//! ```
//!
//! Parsing and macro expansion live in the `cel-parser` crate; this crate
//! consumes the tree it produces and carries it through checking (`checker`)
//! and planning/evaluation (`planner`).

pub mod activation;
pub mod checker;
pub mod env;
pub mod error;
pub mod functions;
pub mod provider;
pub mod types;
pub mod unparser;
pub mod value;

pub use activation::{Activation, AttributePattern, MapActivation, PatternQualifier};
pub use checker::{CheckedExpr, Reference, ReferenceMap, TypeMap};
pub use env::{Env, Overload};
pub use error::{CheckError, CheckErrors, ErrorKind, EvalError};
pub use planner::{EvalContext, Node, Program, Tracer};
pub use provider::{DefaultTypeProvider, FieldInfo, TypeProvider};
pub use types::Type;
pub use value::{Duration, MapKey, Object, Timestamp, Value};

mod planner;

/// Either a source-level failure (parse diagnostics) or a set of
/// type-checking diagnostics, returned by [`Program::compile`].
#[derive(Debug, Clone)]
pub enum CompileError {
    Parse(cel_parser::ParseErrors),
    Check(CheckErrors),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Parse(errs) => {
                for e in errs.errors() {
                    writeln!(f, "{e}")?;
                }
                Ok(())
            }
            CompileError::Check(errs) => {
                for e in &errs.0 {
                    writeln!(f, "{e}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for CompileError {}

impl Program {
    /// Parse, check, and plan `source` in one call — the entry point most
    /// embedders want. Splitting the three stages (`cel_parser::parse`,
    /// [`checker::check`], [`planner::plan`]) is only useful for tooling that
    /// needs the intermediate `CheckedExpr` (e.g. an unparser or a linter).
    pub fn compile(source: &str, env: &Env, provider: &dyn TypeProvider) -> Result<Program, CompileError> {
        let parsed = cel_parser::parse(source).map_err(CompileError::Parse)?;
        let (checked, errors) = checker::check(&parsed, env, provider);
        if !errors.is_empty() {
            return Err(CompileError::Check(errors));
        }
        Ok(planner::plan(&checked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_and_eval_a_simple_arithmetic_expression() {
        let env = Env::new();
        let provider = DefaultTypeProvider::new();
        let program = Program::compile("1 + 2 * 3", &env, &provider).unwrap();
        let activation = MapActivation::new();
        assert!(matches!(program.eval(&activation, &provider), Value::Int(7)));
    }

    #[test]
    fn compile_rejects_undeclared_variables() {
        let env = Env::new();
        let provider = DefaultTypeProvider::new();
        let err = Program::compile("x + 1", &env, &provider).unwrap_err();
        assert!(matches!(err, CompileError::Check(_)));
    }

    #[test]
    fn bound_variable_resolves_through_activation() {
        let mut env = Env::new();
        env.declare_variable("name", Type::String);
        let provider = DefaultTypeProvider::new();
        let program = Program::compile(r#""hello " + name"#, &env, &provider).unwrap();
        let activation = MapActivation::new().bind("name", Value::string("world"));
        match program.eval(&activation, &provider) {
            Value::String(s) => assert_eq!(s.as_ref(), "hello world"),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn has_macro_tests_map_key_presence() {
        let env = Env::new();
        let provider = DefaultTypeProvider::new();
        let program = Program::compile("has({'a': 1}.a)", &env, &provider).unwrap();
        let activation = MapActivation::new();
        assert!(matches!(program.eval(&activation, &provider), Value::Bool(true)));
    }

    #[test]
    fn exists_macro_short_circuits_over_a_list() {
        let env = Env::new();
        let provider = DefaultTypeProvider::new();
        let program = Program::compile("[1, 2, 3].exists(x, x == 2)", &env, &provider).unwrap();
        let activation = MapActivation::new();
        assert!(matches!(program.eval(&activation, &provider), Value::Bool(true)));
    }

    #[test]
    fn unbound_variable_with_matching_unknown_pattern_yields_unknown() {
        let mut env = Env::new();
        env.declare_variable("req", Type::Dyn);
        let provider = DefaultTypeProvider::new();
        let program = Program::compile("req.user", &env, &provider).unwrap();
        let activation = MapActivation::new().with_unknowns(vec![AttributePattern::new("req").with_field("user")]);
        assert!(program.eval(&activation, &provider).is_unknown());
    }

    fn map_val(pairs: Vec<(&str, Value)>) -> Value {
        let mut entries = std::collections::HashMap::new();
        for (k, v) in pairs {
            entries.insert(MapKey::String(std::rc::Rc::from(k)), v);
        }
        Value::map(entries)
    }

    #[test]
    fn scenario_s1_has_tests_map_key_presence_not_the_stored_value() {
        let mut env = Env::new();
        env.declare_variable("a", Type::Dyn);
        let provider = DefaultTypeProvider::new();
        let program = Program::compile("has(a.b)", &env, &provider).unwrap();

        let present = MapActivation::new().bind("a", map_val(vec![("b", Value::Int(0))]));
        assert!(matches!(program.eval(&present, &provider), Value::Bool(true)));

        let absent = MapActivation::new().bind("a", map_val(vec![]));
        assert!(matches!(program.eval(&absent, &provider), Value::Bool(false)));
    }

    #[test]
    fn scenario_s2_map_macro_transforms_every_element() {
        let env = Env::new();
        let provider = DefaultTypeProvider::new();
        let program = Program::compile("[1, 2, 3].map(i, i * 2)", &env, &provider).unwrap();
        match program.eval(&MapActivation::new(), &provider) {
            Value::List(items) => {
                let doubled: Vec<i64> = items
                    .iter()
                    .map(|v| match v {
                        Value::Int(i) => *i,
                        other => panic!("expected Int, got {other:?}"),
                    })
                    .collect();
                assert_eq!(doubled, vec![2, 4, 6]);
            }
            other => panic!("expected List, got {other:?}"),
        }
    }

    #[test]
    fn scenario_s3_business_hours_check_combines_boolean_logic_and_time_getters() {
        let mut env = Env::new();
        env.declare_variable("request", Type::Dyn);
        let provider = DefaultTypeProvider::new();
        let source = "request.auth.claims.group == 'admin' \
            || request.auth.principal == 'user:me@acme.co' \
            && request.time.getHours() >= 9 && request.time.getHours() <= 17";
        let program = Program::compile(source, &env, &provider).unwrap();

        let request_at = |hour: i64| {
            map_val(vec![
                (
                    "auth",
                    map_val(vec![("claims", map_val(vec![("group", Value::string("user"))])), ("principal", Value::string("user:me@acme.co"))]),
                ),
                ("time", Value::Timestamp(Timestamp { seconds: hour * 3600, nanos: 0 })),
            ])
        };

        let noon = MapActivation::new().bind("request", request_at(12));
        assert!(matches!(program.eval(&noon, &provider), Value::Bool(true)));

        let midnight = MapActivation::new().bind("request", request_at(0));
        assert!(matches!(program.eval(&midnight, &provider), Value::Bool(false)));
    }

    #[test]
    fn scenario_s4_nested_filter_and_exists_keeps_only_sublists_with_a_positive_element() {
        let env = Env::new();
        let provider = DefaultTypeProvider::new();
        let program = Program::compile("[[-1, 0], [0, 1], []].filter(y, y.exists(z, z > 0))", &env, &provider).unwrap();
        match program.eval(&MapActivation::new(), &provider) {
            Value::List(items) => assert_eq!(items.len(), 1),
            other => panic!("expected List, got {other:?}"),
        }
    }

    #[test]
    fn scenario_s5_optional_chaining_yields_none_once_a_later_qualifier_misses() {
        let mut env = Env::new();
        env.declare_variable("a", Type::Dyn);
        let provider = DefaultTypeProvider::new();
        let program = Program::compile("a.?b.c", &env, &provider).unwrap();

        let present = MapActivation::new().bind("a", map_val(vec![("b", map_val(vec![("c", Value::string("world"))]))]));
        match program.eval(&present, &provider) {
            Value::Optional(inner) => match inner.as_ref() {
                Some(Value::String(s)) => assert_eq!(s.as_ref(), "world"),
                other => panic!("expected Some(\"world\"), got {other:?}"),
            },
            other => panic!("expected Optional, got {other:?}"),
        }

        let miss = MapActivation::new().bind("a", map_val(vec![("b", map_val(vec![("random", Value::string("value"))]))]));
        match program.eval(&miss, &provider) {
            Value::Optional(inner) => assert!(inner.is_none()),
            other => panic!("expected Optional::None, got {other:?}"),
        }
    }

    #[test]
    fn scenario_s6_unknown_propagates_through_has_and_optional_index() {
        let mut env = Env::new();
        env.declare_variable("a", Type::Dyn);
        env.declare_variable("m", Type::Dyn);
        let provider = DefaultTypeProvider::new();
        let program = Program::compile("m[?has(a.b.c)]", &env, &provider).unwrap();

        let activation = MapActivation::new()
            .bind("m", map_val(vec![("true", Value::string("world"))]))
            .with_unknowns(vec![AttributePattern::new("a").with_field("b").with_field("c")]);
        assert!(program.eval(&activation, &provider).is_unknown());
    }
}
