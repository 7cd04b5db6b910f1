//! Binary/ternary/unary/postfix expression parsing.
//!
//! CEL's grammar is small enough to parse with one recursive-descent function
//! per precedence level rather than a table-driven Pratt loop. `&&` and `||`
//! chains are flattened and rebuilt as balanced binary trees so a long chain
//! of `a && b && c && ...` doesn't produce a recursion depth proportional to
//! its length.

use crate::ast::{Expr, ExprKind};
use crate::error::ParseResult;
use crate::token::Token;

use super::Parser;

impl<'a> Parser<'a> {
    pub(crate) fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_conditional()
    }

    fn parse_conditional(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        self.enter(span)?;
        let cond = self.parse_or()?;
        let result = if self.eat(&Token::Question) {
            let then_branch = self.parse_conditional()?;
            self.expect(Token::Colon)?;
            let else_branch = self.parse_conditional()?;
            let id = self.new_id(span);
            Ok(Expr::new(
                id,
                ExprKind::Call {
                    target: None,
                    function: "_?_:_".to_string(),
                    args: vec![cond, then_branch, else_branch],
                },
            ))
        } else {
            Ok(cond)
        };
        self.exit();
        result
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut operands = vec![self.parse_and()?];
        while self.eat(&Token::OrOr) {
            operands.push(self.parse_and()?);
        }
        Ok(self.balance("_||_", operands))
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut operands = vec![self.parse_relation()?];
        while self.eat(&Token::AndAnd) {
            operands.push(self.parse_relation()?);
        }
        Ok(self.balance("_&&_", operands))
    }

    fn parse_relation(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let function = match self.peek() {
                Some(Token::EqEq) => "_==_",
                Some(Token::NotEq) => "_!=_",
                Some(Token::Lt) => "_<_",
                Some(Token::LtEq) => "_<=_",
                Some(Token::Gt) => "_>_",
                Some(Token::GtEq) => "_>=_",
                Some(Token::KwIn) => "@in",
                _ => break,
            };
            let span = self.current_span();
            self.advance();
            let right = self.parse_additive()?;
            let id = self.new_id(span);
            left = Expr::new(
                id,
                ExprKind::Call { target: None, function: function.to_string(), args: vec![left, right] },
            );
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let function = match self.peek() {
                Some(Token::Plus) => "_+_",
                Some(Token::Minus) => "_-_",
                _ => break,
            };
            let span = self.current_span();
            self.advance();
            let right = self.parse_multiplicative()?;
            let id = self.new_id(span);
            left = Expr::new(
                id,
                ExprKind::Call { target: None, function: function.to_string(), args: vec![left, right] },
            );
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let function = match self.peek() {
                Some(Token::Star) => "_*_",
                Some(Token::Slash) => "_/_",
                Some(Token::Percent) => "_%_",
                _ => break,
            };
            let span = self.current_span();
            self.advance();
            let right = self.parse_unary()?;
            let id = self.new_id(span);
            left = Expr::new(
                id,
                ExprKind::Call { target: None, function: function.to_string(), args: vec![left, right] },
            );
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let function = match self.peek() {
            Some(Token::Bang) => Some("!_"),
            Some(Token::Minus) => Some("-_"),
            _ => None,
        };
        let Some(function) = function else {
            return self.parse_postfix();
        };
        let span = self.current_span();
        self.advance();
        if function == "-_" && self.check(&Token::Int) {
            return self.parse_negative_int_literal(span);
        }
        let operand = self.parse_unary()?;
        let id = self.new_id(span);
        Ok(Expr::new(
            id,
            ExprKind::Call { target: None, function: function.to_string(), args: vec![operand] },
        ))
    }

    /// Build a balanced binary tree of `function` calls over `operands`
    /// (left-to-right order preserved). Falls through unchanged for a single
    /// operand.
    fn balance(&mut self, function: &str, operands: Vec<Expr>) -> Expr {
        fn build(parser: &mut Parser, function: &str, items: &[Expr]) -> Expr {
            if items.len() == 1 {
                return items[0].clone();
            }
            let mid = items.len() / 2;
            let left = build(parser, function, &items[..mid]);
            let right = build(parser, function, &items[mid..]);
            let id = parser.ids.next_id();
            Expr::new(
                id,
                ExprKind::Call { target: None, function: function.to_string(), args: vec![left, right] },
            )
        }
        build(self, function, &operands)
    }
}
