//! The parsed expression tree.
//!
//! Every node carries a monotonically assigned 64-bit id, stable across the
//! checker and planner passes. Macro calls (`has`, `all`, `exists`, ...) are
//! rewritten into [`ExprKind::Comprehension`] nodes during parsing; the
//! original call is preserved in [`SourceInfo::macro_calls`] for unparsing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::span::Span;

pub type ExprId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Null,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub id: ExprId,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Constant),
    Ident(String),
    Select {
        operand: Box<Expr>,
        field: String,
        test_only: bool,
        /// `true` for `e.?f` — threads `Optional` through the result.
        optional: bool,
    },
    Call {
        target: Option<Box<Expr>>,
        function: String,
        args: Vec<Expr>,
    },
    List {
        elements: Vec<Expr>,
        /// Indices (into `elements`) of entries written as `?e`.
        optional_indices: Vec<usize>,
    },
    Struct {
        /// Empty/absent for a map literal (`{}`); a message type name otherwise.
        type_name: Option<String>,
        entries: Vec<StructEntry>,
    },
    Comprehension {
        iter_var: String,
        iter_var2: Option<String>,
        iter_range: Box<Expr>,
        accu_var: String,
        accu_init: Box<Expr>,
        loop_condition: Box<Expr>,
        loop_step: Box<Expr>,
        result: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructEntry {
    pub id: ExprId,
    /// For map literals, the key expression; for message literals, the field name.
    pub key: StructEntryKey,
    pub value: Expr,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StructEntryKey {
    FieldName(String),
    Expr(Box<Expr>),
}

/// Accumulator variable name threaded implicitly through comprehensions
/// lowered from macros (`@result`).
pub const ACCUMULATOR_VAR: &str = "__result__";

/// Per-expression source positions and macro bookkeeping, keyed by [`ExprId`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceInfo {
    pub description: String,
    pub positions: HashMap<ExprId, Span>,
    /// Pre-expansion call for each macro-generated Comprehension id, so the
    /// unparser can print `e.all(x, p)` instead of the desugared loop.
    pub macro_calls: HashMap<ExprId, Expr>,
    pub line_offsets: Vec<usize>,
}

impl SourceInfo {
    pub fn new(description: impl Into<String>, source: &str) -> Self {
        let mut line_offsets = vec![0];
        for (i, c) in source.char_indices() {
            if c == '\n' {
                line_offsets.push(i + 1);
            }
        }
        Self {
            description: description.into(),
            positions: HashMap::new(),
            macro_calls: HashMap::new(),
            line_offsets,
        }
    }

    pub fn record(&mut self, id: ExprId, span: Span) {
        self.positions.insert(id, span);
    }

    pub fn offset(&self, id: ExprId) -> Option<Span> {
        self.positions.get(&id).copied()
    }
}

/// A parsed expression plus its accompanying source metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedExpr {
    pub expr: Expr,
    pub source_info: SourceInfo,
}

impl Expr {
    pub fn new(id: ExprId, kind: ExprKind) -> Self {
        Self { id, kind }
    }

    pub fn is_select(&self) -> bool {
        matches!(self.kind, ExprKind::Select { .. })
    }
}

impl ParsedExpr {
    /// Serialize the AST to JSON, for hosts that cache or transmit parsed
    /// expressions instead of re-parsing source text.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
