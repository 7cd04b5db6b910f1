//! Activations: the dynamic variable bindings an evaluation runs against.
//!
//! An [`Activation`] is a pure lookup interface (`resolve` + optional
//! `parent`), never mutated during an evaluation — matching the concurrency
//! story in which a compiled [`crate::planner::Program`] is shared across
//! threads evaluating against distinct activations. [`PartialActivation`]
//! layers [`AttributePattern`]s on top, turning matching attribute reads into
//! `Unknown` instead of `NoSuchAttribute` for partial evaluation.

use std::collections::HashMap;

use crate::value::Value;

/// Resolves variable names to values. Implementors are not required to be
/// `Sync`/`Send`; callers sharing an activation across threads must
/// synchronize externally.
pub trait Activation {
    fn resolve(&self, name: &str) -> Option<Value>;

    /// Attribute patterns that should resolve to `Unknown` rather than
    /// `NoSuchAttribute`. Empty for a fully-bound activation.
    fn unknown_patterns(&self) -> &[AttributePattern] {
        &[]
    }
}

/// A plain binding table, usable standalone or chained via
/// [`MapActivation::with_parent`] to layer overrides over a base.
#[derive(Debug, Default)]
pub struct MapActivation {
    bindings: HashMap<String, Value>,
    parent: Option<Box<MapActivation>>,
    patterns: Vec<AttributePattern>,
}

impl MapActivation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bindings.insert(name.into(), value);
        self
    }

    pub fn with_parent(mut self, parent: MapActivation) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    pub fn with_unknowns(mut self, patterns: Vec<AttributePattern>) -> Self {
        self.patterns = patterns;
        self
    }
}

impl Activation for MapActivation {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.bindings.get(name).cloned().or_else(|| self.parent.as_deref().and_then(|p| p.resolve(name)))
    }

    fn unknown_patterns(&self) -> &[AttributePattern] {
        &self.patterns
    }
}

/// One segment of an [`AttributePattern`]: either a concrete field/key name
/// or a wildcard matching any qualifier at that position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternQualifier {
    Field(String),
    Wildcard,
}

/// A partial attribute path: a root variable name plus a prefix of
/// qualifiers, any of which may be a [`PatternQualifier::Wildcard`]. Matches
/// any concrete attribute that shares the same root and agrees with every
/// named qualifier up to the pattern's length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributePattern {
    pub root: String,
    pub qualifiers: Vec<PatternQualifier>,
}

impl AttributePattern {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into(), qualifiers: Vec::new() }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.qualifiers.push(PatternQualifier::Field(field.into()));
        self
    }

    pub fn with_wildcard(mut self) -> Self {
        self.qualifiers.push(PatternQualifier::Wildcard);
        self
    }

    /// True if the *in-progress* attribute path `root.path` (a prefix of the
    /// attribute actually being resolved, of length `path.len()`) already
    /// falls within this pattern — i.e. every qualifier resolved so far
    /// agrees with this pattern's corresponding qualifier, or the pattern
    /// runs out first (a shorter pattern covers every extension of it).
    pub fn matches_prefix(&self, root: &str, path: &[String]) -> bool {
        if self.root != root {
            return false;
        }
        let checked = path.len().min(self.qualifiers.len());
        self.qualifiers[..checked].iter().zip(&path[..checked]).all(|(pat, actual)| match pat {
            PatternQualifier::Wildcard => true,
            PatternQualifier::Field(f) => f == actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_activation_resolves_bound_names() {
        let act = MapActivation::new().bind("x", Value::Int(1));
        assert!(matches!(act.resolve("x"), Some(Value::Int(1))));
        assert!(act.resolve("y").is_none());
    }

    #[test]
    fn map_activation_falls_back_to_parent() {
        let parent = MapActivation::new().bind("x", Value::Int(1));
        let child = MapActivation::new().with_parent(parent);
        assert!(matches!(child.resolve("x"), Some(Value::Int(1))));
    }

    #[test]
    fn attribute_pattern_wildcard_matches_any_qualifier() {
        let pattern = AttributePattern::new("a").with_field("b").with_wildcard();
        assert!(pattern.matches_prefix("a", &["b".to_string()]));
        assert!(pattern.matches_prefix("a", &["b".to_string(), "anything".to_string()]));
        assert!(!pattern.matches_prefix("a", &["other".to_string()]));
    }

    #[test]
    fn shorter_pattern_covers_longer_paths() {
        let pattern = AttributePattern::new("a").with_field("b");
        assert!(pattern.matches_prefix("a", &["b".to_string(), "c".to_string(), "d".to_string()]));
    }
}
