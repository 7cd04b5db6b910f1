//! Declarations: variables, function overloads, and the container used for
//! namespace-relative identifier resolution.

use std::collections::HashMap;

use crate::types::Type;

#[derive(Debug, Clone)]
pub struct Overload {
    pub id: String,
    pub arg_types: Vec<Type>,
    pub result_type: Type,
    /// True for `target.function(args)` overloads; false for free functions.
    pub member: bool,
}

impl Overload {
    pub fn function(id: impl Into<String>, arg_types: Vec<Type>, result_type: Type) -> Self {
        Self { id: id.into(), arg_types, result_type, member: false }
    }

    pub fn method(id: impl Into<String>, arg_types: Vec<Type>, result_type: Type) -> Self {
        Self { id: id.into(), arg_types, result_type, member: true }
    }

    /// Arity-and-type match, treating `Dyn` and type params as wildcards in
    /// both directions.
    pub fn matches(&self, args: &[Type]) -> bool {
        self.arg_types.len() == args.len()
            && self.arg_types.iter().zip(args).all(|(expected, found)| {
                found.is_assignable_to(expected) || expected.is_assignable_to(found)
            })
    }
}

/// Declarations available to the checker and evaluator: variables, function
/// overloads, and the package used to resolve unqualified names.
#[derive(Debug, Clone, Default)]
pub struct Env {
    pub container: String,
    /// When set, list/map literals with element types that don't agree
    /// (beyond `Dyn`) are a checker diagnostic instead of silently widening
    /// to `list(dyn)`/`map(dyn, dyn)`.
    pub homogeneous_aggregate_literals: bool,
    variables: HashMap<String, Type>,
    functions: HashMap<String, Vec<Overload>>,
}

impl Env {
    pub fn new() -> Self {
        let mut env = Self::default();
        crate::functions::register_standard_overloads(&mut env);
        env
    }

    pub fn with_container(container: impl Into<String>) -> Self {
        let mut env = Self::new();
        env.container = container.into();
        env
    }

    pub fn enable_homogeneous_aggregate_literals(&mut self) -> &mut Self {
        self.homogeneous_aggregate_literals = true;
        self
    }

    pub fn declare_variable(&mut self, name: impl Into<String>, ty: Type) -> &mut Self {
        self.variables.insert(name.into(), ty);
        self
    }

    pub fn declare_function(&mut self, name: impl Into<String>, overload: Overload) -> &mut Self {
        self.functions.entry(name.into()).or_default().push(overload);
        self
    }

    pub fn overloads(&self, name: &str) -> &[Overload] {
        self.functions.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resolve an identifier against the container namespace, trying
    /// `container.name`, then each successively shorter prefix of
    /// `container`, then the bare name — the same longest-match-first order
    /// CEL uses for qualified identifiers.
    pub fn resolve_variable(&self, name: &str) -> Option<(&str, &Type)> {
        for candidate in self.resolution_candidates(name) {
            if let Some((key, ty)) = self.variables.get_key_value(candidate.as_str()) {
                return Some((key, ty));
            }
        }
        None
    }

    pub fn resolve_function(&self, name: &str) -> Option<(&str, &[Overload])> {
        for candidate in self.resolution_candidates(name) {
            if let Some((key, overloads)) = self.functions.get_key_value(candidate.as_str()) {
                return Some((key, overloads));
            }
        }
        None
    }

    /// The ordered candidate names produced by prefixing `name` with
    /// successively shorter suffixes of the container — e.g. container
    /// `a.b` and name `c` tries `a.b.c`, `a.c`, `c` in that order. A leading
    /// `.` marks `name` as already absolute and short-circuits to itself.
    pub fn resolution_candidates(&self, name: &str) -> Vec<String> {
        if let Some(absolute) = name.strip_prefix('.') {
            return vec![absolute.to_string()];
        }
        let mut candidates = Vec::new();
        let mut prefix = self.container.as_str();
        loop {
            candidates.push(if prefix.is_empty() { name.to_string() } else { format!("{prefix}.{name}") });
            match prefix.rfind('.') {
                Some(idx) => prefix = &prefix[..idx],
                None => {
                    if !prefix.is_empty() {
                        candidates.push(name.to_string());
                    }
                    break;
                }
            }
        }
        candidates
    }
}
