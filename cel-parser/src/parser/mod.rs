//! Recursive-descent / precedence-climbing parser.
//!
//! Converts a token stream directly into an [`Expr`](crate::ast::Expr) tree —
//! there is no separate concrete syntax tree stage, since CEL's grammar is
//! small enough that AST-producing parsing stays readable. Macro calls
//! (`has`, `all`, `exists`, ...) are expanded into `Comprehension` nodes as
//! soon as their enclosing `Call` is built; see [`crate::macros`].

mod expr;
mod literals;

use crate::ast::{ExprId, ParsedExpr, SourceInfo};
use crate::error::{ParseError, ParseErrors, ParseResult};
use crate::ids::IdGen;
use crate::lexer::{Lexer, SpannedToken};
use crate::span::{SourceMap, Span};
use crate::token::Token;

/// Maximum expression nesting depth, guarding against stack overflow on
/// pathological or adversarial input. Matches the default used by the
/// reference CEL implementations.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 250;

/// Maximum source size in bytes. Past this the parser refuses to run rather
/// than spend unbounded time lexing.
pub const DEFAULT_MAX_SOURCE_LEN: usize = 512 * 1024;

pub struct Parser<'a> {
    source: &'a str,
    lexer: Lexer<'a>,
    source_map: SourceMap,
    current: Option<SpannedToken<'a>>,
    pub(crate) ids: IdGen,
    pub(crate) info: SourceInfo,
    pub(crate) errors: ParseErrors,
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, description: impl Into<String>) -> Self {
        Self::with_max_depth(source, description, DEFAULT_MAX_RECURSION_DEPTH)
    }

    pub fn with_max_depth(source: &'a str, description: impl Into<String>, max_depth: usize) -> Self {
        let mut parser = Self {
            source,
            lexer: Lexer::new(source),
            source_map: SourceMap::new(source),
            current: None,
            ids: IdGen::new(),
            info: SourceInfo::new(description, source),
            errors: ParseErrors::new(),
            depth: 0,
            max_depth,
        };
        parser.advance();
        parser
    }

    /// Parse a full CEL expression, consuming the whole input.
    pub fn parse(mut self) -> Result<ParsedExpr, ParseErrors> {
        if self.source.len() > DEFAULT_MAX_SOURCE_LEN {
            self.errors.push(ParseError::SourceTooLarge {
                limit: DEFAULT_MAX_SOURCE_LEN,
                span: Span::empty(),
            });
            return Err(self.errors);
        }

        let expr = match self.parse_expr() {
            Ok(expr) => expr,
            Err(e) => {
                self.errors.push(e);
                return Err(self.errors);
            }
        };

        if let Some(tok) = &self.current {
            self.errors.push(ParseError::unexpected_token(
                tok.token.describe(),
                "end of input",
                tok.span,
            ));
        }

        if !self.errors.is_empty() {
            return Err(self.errors);
        }

        Ok(ParsedExpr { expr, source_info: self.info })
    }

    // ==================== node construction ====================

    pub(crate) fn new_id(&mut self, span: Span) -> ExprId {
        let id = self.ids.next_id();
        self.info.record(id, span);
        id
    }

    pub(crate) fn enter(&mut self, span: Span) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ParseError::RecursionLimitExceeded { limit: self.max_depth, span });
        }
        Ok(())
    }

    pub(crate) fn exit(&mut self) {
        self.depth -= 1;
    }

    // ==================== token management ====================

    pub(crate) fn advance(&mut self) -> Option<SpannedToken<'a>> {
        let prev = self.current.take();
        loop {
            match self.lexer.next_token() {
                Some(Ok(tok)) => {
                    self.current = Some(tok);
                    break;
                }
                Some(Err(e)) => {
                    self.errors.push(e);
                    continue;
                }
                None => {
                    self.current = None;
                    break;
                }
            }
        }
        prev
    }

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.current.as_ref().map(|t| &t.token)
    }

    pub(crate) fn peek_span(&self) -> Span {
        self.current.as_ref().map(|t| t.span).unwrap_or_else(|| {
            let end = self.source.len();
            self.source_map.span(end, end)
        })
    }

    pub(crate) fn check(&self, tok: &Token) -> bool {
        self.peek() == Some(tok)
    }

    pub(crate) fn eat(&mut self, tok: &Token) -> bool {
        if self.check(tok) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, tok: Token) -> ParseResult<SpannedToken<'a>> {
        match &self.current {
            Some(t) if t.token == tok => Ok(self.advance().unwrap()),
            Some(t) => Err(ParseError::unexpected_token(t.token.describe(), format!("{tok:?}"), t.span)),
            None => Err(ParseError::unexpected_eof(format!("{tok:?}"), self.peek_span())),
        }
    }

    pub(crate) fn current_text(&self) -> &'a str {
        self.current.as_ref().map(|t| t.text).unwrap_or("")
    }

    pub(crate) fn current_span(&self) -> Span {
        self.current.as_ref().map(|t| t.span).unwrap_or_else(|| self.peek_span())
    }
}

/// Parse `source` into an [`ParsedExpr`], or a non-empty [`ParseErrors`].
pub fn parse(source: &str) -> Result<ParsedExpr, ParseErrors> {
    Parser::new(source, "<input>").parse()
}

/// Parse with a named description (used in diagnostics) and recursion limit.
pub fn parse_with_limits(
    source: &str,
    description: impl Into<String>,
    max_depth: usize,
) -> Result<ParsedExpr, ParseErrors> {
    Parser::with_max_depth(source, description, max_depth).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Constant, Expr, ExprKind};

    fn parse_ok(src: &str) -> Expr {
        parse(src).unwrap_or_else(|e| panic!("{}", e.format_all(src))).expr
    }

    #[test]
    fn parses_int_literal() {
        let expr = parse_ok("42");
        assert_eq!(expr.kind, ExprKind::Literal(Constant::Int(42)));
    }

    #[test]
    fn parses_arithmetic_with_precedence() {
        let expr = parse_ok("1 + 2 * 3");
        match expr.kind {
            ExprKind::Call { function, args, .. } => {
                assert_eq!(function, "_+_");
                assert_eq!(args[0].kind, ExprKind::Literal(Constant::Int(1)));
                match &args[1].kind {
                    ExprKind::Call { function, .. } => assert_eq!(function, "_*_"),
                    other => panic!("expected multiplication, got {other:?}"),
                }
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn parses_ternary() {
        let expr = parse_ok("x ? 1 : 2");
        match expr.kind {
            ExprKind::Call { function, args, .. } => {
                assert_eq!(function, "_?_:_");
                assert_eq!(args.len(), 3);
            }
            other => panic!("expected conditional call, got {other:?}"),
        }
    }

    #[test]
    fn parses_field_selection_and_call() {
        let expr = parse_ok("a.b.c(1, 2)");
        match expr.kind {
            ExprKind::Call { target: Some(target), function, args } => {
                assert_eq!(function, "c");
                assert_eq!(args.len(), 2);
                assert!(target.is_select());
            }
            other => panic!("expected method call, got {other:?}"),
        }
    }

    #[test]
    fn parses_index_expression() {
        let expr = parse_ok("m[0]");
        match expr.kind {
            ExprKind::Call { target: None, function, args } => {
                assert_eq!(function, "_[_]");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected index call, got {other:?}"),
        }
    }

    #[test]
    fn parses_has_macro_into_test_only_select() {
        let expr = parse_ok("has(m.field)");
        match expr.kind {
            ExprKind::Select { test_only, .. } => assert!(test_only),
            other => panic!("expected Select, got {other:?}"),
        }
    }

    #[test]
    fn parses_exists_macro_into_comprehension() {
        let expr = parse_ok("items.exists(x, x > 0)");
        assert!(matches!(expr.kind, ExprKind::Comprehension { .. }));
    }

    #[test]
    fn reserved_identifier_is_rejected() {
        let err = parse("if").unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn trailing_garbage_is_an_error() {
        let err = parse("1 2").unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn deeply_nested_parens_hit_recursion_limit() {
        let src = format!("{}1{}", "(".repeat(300), ")".repeat(300));
        let err = parse_with_limits(&src, "<input>", 100).unwrap_err();
        assert!(err.errors().iter().any(|e| matches!(e, ParseError::RecursionLimitExceeded { .. })));
    }
}
