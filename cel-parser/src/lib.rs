//! Lexer and parser for the Common Expression Language.
//!
//! ```
//! let parsed = cel_parser::parse("1 + 2 * 3").expect("valid expression");
//! assert!(matches!(parsed.expr.kind, cel_parser::ast::ExprKind::Call { .. }));
//! ```
//!
//! The parser turns source text directly into an [`ast::Expr`] tree with
//! macros (`has`, `all`, `exists`, `exists_one`, `map`, `filter`) already
//! expanded into `Comprehension` nodes. It performs no type checking or
//! evaluation; those live in the `cel` crate, which consumes the tree
//! produced here.

pub mod ast;
pub mod error;
mod ids;
mod lexer;
pub mod macros;
mod parser;
pub mod span;
pub mod token;
mod unescape;

pub use ast::{Expr, ExprId, ExprKind, ParsedExpr, SourceInfo};
pub use error::{ParseError, ParseErrors, ParseResult};
pub use lexer::{tokenize, Lexer, SpannedToken};
pub use parser::{parse, parse_with_limits, Parser, DEFAULT_MAX_RECURSION_DEPTH, DEFAULT_MAX_SOURCE_LEN};
pub use span::{SourceMap, Span};
pub use unescape::{unescape, Literal};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reexport_round_trips_a_simple_expression() {
        let parsed = parse("1 + 1").unwrap();
        assert!(matches!(parsed.expr.kind, ExprKind::Call { .. }));
    }

    #[test]
    fn parse_errors_accumulate_for_malformed_input() {
        let err = parse("1 +").unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn parsed_expr_round_trips_through_json() {
        let parsed = parse("has(m.x) && items.exists(x, x > 0)").unwrap();
        let json = parsed.to_json().unwrap();
        let restored = ParsedExpr::from_json(&json).unwrap();
        assert_eq!(restored.expr, parsed.expr);
        assert_eq!(restored.source_info.macro_calls.len(), parsed.source_info.macro_calls.len());
    }
}
