//! Primary expressions: literals, identifiers, calls, list/map/message
//! literals, and the postfix chain (`.field`, `.?field`, `[i]`, `[?i]`,
//! `(args)`) that follows them.

use crate::ast::{Constant, Expr, ExprKind, StructEntry, StructEntryKey};
use crate::error::{ParseError, ParseResult};
use crate::span::Span;
use crate::token::Token;
use crate::unescape::{self, Literal};

use super::Parser;

impl<'a> Parser<'a> {
    pub(crate) fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let span = self.current_span();
            self.enter(span)?;
            let advanced = match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let optional = self.eat(&Token::Question);
                    let field = self.expect_field_name()?;
                    if self.check(&Token::LParen) {
                        let args = self.parse_call_args()?;
                        let id = self.new_id(span);
                        // `optional.of`/`optional.none` name the two constructors of
                        // the optional-values library, declared as free functions
                        // rather than methods on a variable named `optional`. Rewrite
                        // the call here rather than teaching the checker about a
                        // pseudo-namespace.
                        let call = if !optional && is_bare_ident(&expr, "optional") && matches!(field.as_str(), "of" | "none") {
                            Expr::new(id, ExprKind::Call { target: None, function: format!("optional.{field}"), args })
                        } else {
                            Expr::new(id, ExprKind::Call { target: Some(Box::new(expr)), function: field, args })
                        };
                        expr = self.maybe_expand_macro(call)?;
                    } else {
                        let id = self.new_id(span);
                        expr = Expr::new(
                            id,
                            ExprKind::Select { operand: Box::new(expr), field, test_only: false, optional },
                        );
                    }
                    true
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let optional = self.eat(&Token::Question);
                    let index = self.parse_expr()?;
                    self.expect(Token::RBracket)?;
                    let id = self.new_id(span);
                    let function = if optional { "_[?_]" } else { "_[_]" };
                    expr = Expr::new(
                        id,
                        ExprKind::Call { target: None, function: function.to_string(), args: vec![expr, index] },
                    );
                    true
                }
                Some(Token::LBrace) => {
                    if let Some(type_name) = flatten_dotted_name(&expr) {
                        expr = self.parse_message_literal(type_name, span)?;
                        true
                    } else {
                        false
                    }
                }
                _ => false,
            };
            self.exit();
            if !advanced {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        match self.peek() {
            Some(Token::Int) => self.parse_int_literal(),
            Some(Token::Float) => self.parse_float_literal(),
            Some(Token::StringLiteral) => self.parse_string_literal(),
            Some(Token::True) => {
                self.advance();
                Ok(Expr::new(self.new_id(span), ExprKind::Literal(Constant::Bool(true))))
            }
            Some(Token::False) => {
                self.advance();
                Ok(Expr::new(self.new_id(span), ExprKind::Literal(Constant::Bool(false))))
            }
            Some(Token::Null) => {
                self.advance();
                Ok(Expr::new(self.new_id(span), ExprKind::Literal(Constant::Null)))
            }
            Some(Token::Ident) => self.parse_ident_or_call(),
            Some(Token::Dot) => self.parse_ident_or_call(),
            Some(Token::LParen) => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => self.parse_list_literal(),
            Some(Token::LBrace) => self.parse_map_literal(),
            Some(Token::KwIn) => Err(ParseError::ReservedIdentifier { name: "in".to_string(), span }),
            Some(_) if self.current_is_keyword() => {
                Err(ParseError::ReservedIdentifier { name: self.current_text().to_string(), span })
            }
            Some(tok) => Err(ParseError::unexpected_token(tok.describe(), "expression", span)),
            None => Err(ParseError::unexpected_eof("expression", span)),
        }
    }

    fn current_is_keyword(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Token::KwAs
                    | Token::KwBreak
                    | Token::KwConst
                    | Token::KwContinue
                    | Token::KwElse
                    | Token::KwFor
                    | Token::KwFunction
                    | Token::KwIf
                    | Token::KwImport
                    | Token::KwLet
                    | Token::KwLoop
                    | Token::KwPackage
                    | Token::KwNamespace
                    | Token::KwReturn
                    | Token::KwVar
                    | Token::KwVoid
                    | Token::KwWhile
            )
        )
    }

    fn parse_ident_or_call(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        let absolute = self.eat(&Token::Dot);
        let name_span = self.current_span();
        if self.current_is_keyword() || self.check(&Token::KwIn) {
            return Err(ParseError::ReservedIdentifier { name: self.current_text().to_string(), span: name_span });
        }
        let tok = self.expect(Token::Ident)?;
        let mut name = tok.text.to_string();
        if absolute {
            name = format!(".{name}");
        }
        if self.check(&Token::LParen) {
            let args = self.parse_call_args()?;
            let id = self.new_id(span);
            let call = Expr::new(id, ExprKind::Call { target: None, function: name, args });
            self.maybe_expand_macro(call)
        } else {
            let id = self.new_id(span);
            Ok(Expr::new(id, ExprKind::Ident(name)))
        }
    }

    /// Accept any "word" token (identifier or keyword) as a field name,
    /// reading its raw source text. Keywords are valid field names in
    /// `.field` position even though they can't stand alone as identifiers.
    fn expect_field_name(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some(
                Token::Ident
                    | Token::True
                    | Token::False
                    | Token::Null
                    | Token::KwAs
                    | Token::KwBreak
                    | Token::KwConst
                    | Token::KwContinue
                    | Token::KwElse
                    | Token::KwFor
                    | Token::KwFunction
                    | Token::KwIf
                    | Token::KwImport
                    | Token::KwIn
                    | Token::KwLet
                    | Token::KwLoop
                    | Token::KwPackage
                    | Token::KwNamespace
                    | Token::KwReturn
                    | Token::KwVar
                    | Token::KwVoid
                    | Token::KwWhile,
            ) => {
                let tok = self.advance().unwrap();
                Ok(tok.text.to_string())
            }
            Some(tok) => Err(ParseError::unexpected_token(tok.describe(), "field name", self.current_span())),
            None => Err(ParseError::unexpected_eof("field name", self.current_span())),
        }
    }

    fn parse_call_args(&mut self) -> ParseResult<Vec<Expr>> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        while !self.check(&Token::RParen) {
            args.push(self.parse_expr()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(args)
    }

    fn parse_list_literal(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        self.expect(Token::LBracket)?;
        let mut elements = Vec::new();
        let mut optional_indices = Vec::new();
        while !self.check(&Token::RBracket) {
            if self.eat(&Token::Question) {
                optional_indices.push(elements.len());
            }
            elements.push(self.parse_expr()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBracket)?;
        let id = self.new_id(span);
        Ok(Expr::new(id, ExprKind::List { elements, optional_indices }))
    }

    fn parse_map_literal(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        self.expect(Token::LBrace)?;
        let mut entries = Vec::new();
        while !self.check(&Token::RBrace) {
            let entry_span = self.current_span();
            let optional = self.eat(&Token::Question);
            let key = self.parse_expr()?;
            self.expect(Token::Colon)?;
            let value = self.parse_expr()?;
            let id = self.new_id(entry_span);
            entries.push(StructEntry { id, key: StructEntryKey::Expr(Box::new(key)), value, optional });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBrace)?;
        let id = self.new_id(span);
        Ok(Expr::new(id, ExprKind::Struct { type_name: None, entries }))
    }

    fn parse_message_literal(&mut self, type_name: String, span: Span) -> ParseResult<Expr> {
        self.expect(Token::LBrace)?;
        let mut entries = Vec::new();
        while !self.check(&Token::RBrace) {
            let entry_span = self.current_span();
            let optional = self.eat(&Token::Question);
            let field = self.expect_field_name()?;
            self.expect(Token::Colon)?;
            let value = self.parse_expr()?;
            let id = self.new_id(entry_span);
            entries.push(StructEntry { id, key: StructEntryKey::FieldName(field), value, optional });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBrace)?;
        let id = self.new_id(span);
        Ok(Expr::new(id, ExprKind::Struct { type_name: Some(type_name), entries }))
    }

    fn maybe_expand_macro(&mut self, call: Expr) -> ParseResult<Expr> {
        let span = self.info.offset(call.id).unwrap_or_default();
        match crate::macros::try_expand(&call, span, &mut self.ids, &mut self.info)? {
            Some(expanded) => Ok(expanded),
            None => Ok(call),
        }
    }

    pub(super) fn parse_int_literal(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        let tok = self.expect(Token::Int)?;
        let (magnitude, unsigned) = parse_int_text(tok.text)
            .ok_or_else(|| ParseError::InvalidNumber { literal: tok.text.to_string(), span })?;
        let constant = int_constant(magnitude, unsigned, false, tok.text, span)?;
        let id = self.new_id(span);
        Ok(Expr::new(id, ExprKind::Literal(constant)))
    }

    /// A unary `-` immediately in front of an integer literal is folded into
    /// the literal rather than a `-_` call, so `-9223372036854775808`
    /// (`i64::MIN`) parses without overflowing while computing its positive
    /// magnitude first.
    pub(super) fn parse_negative_int_literal(&mut self, minus_span: Span) -> ParseResult<Expr> {
        let tok = self.expect(Token::Int)?;
        let span = minus_span.merge(&tok.span);
        let (magnitude, unsigned) = parse_int_text(tok.text)
            .ok_or_else(|| ParseError::InvalidNumber { literal: tok.text.to_string(), span })?;
        let constant = int_constant(magnitude, unsigned, true, tok.text, span)?;
        let id = self.new_id(span);
        Ok(Expr::new(id, ExprKind::Literal(constant)))
    }

    fn parse_float_literal(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        let tok = self.expect(Token::Float)?;
        let value: f64 = tok
            .text
            .parse()
            .map_err(|_| ParseError::InvalidNumber { literal: tok.text.to_string(), span })?;
        let id = self.new_id(span);
        Ok(Expr::new(id, ExprKind::Literal(Constant::Double(value))))
    }

    fn parse_string_literal(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        let tok = self.expect(Token::StringLiteral)?;
        let literal = unescape::unescape(tok.text, span)?;
        let constant = match literal {
            Literal::Str(s) => Constant::String(s),
            Literal::Bytes(b) => Constant::Bytes(b),
        };
        let id = self.new_id(span);
        Ok(Expr::new(id, ExprKind::Literal(constant)))
    }
}

/// Parse the digits of an int token (hex or decimal, optional `u`/`U`
/// suffix) into its unsigned magnitude.
fn parse_int_text(text: &str) -> Option<(u128, bool)> {
    let (text, unsigned) = match text.strip_suffix(['u', 'U']) {
        Some(stripped) => (stripped, true),
        None => (text, false),
    };
    let magnitude = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u128::from_str_radix(hex, 16).ok()?
    } else {
        text.parse::<u128>().ok()?
    };
    Some((magnitude, unsigned))
}

fn int_constant(magnitude: u128, unsigned: bool, negative: bool, literal: &str, span: Span) -> ParseResult<Constant> {
    let overflow = || ParseError::InvalidNumber { literal: literal.to_string(), span };
    if unsigned {
        if negative {
            return Err(overflow());
        }
        let v = u64::try_from(magnitude).map_err(|_| overflow())?;
        Ok(Constant::Uint(v))
    } else if negative {
        if magnitude > i64::MAX as u128 + 1 {
            return Err(overflow());
        }
        let v = if magnitude == i64::MAX as u128 + 1 { i64::MIN } else { -(magnitude as i64) };
        Ok(Constant::Int(v))
    } else {
        let v = i64::try_from(magnitude).map_err(|_| overflow())?;
        Ok(Constant::Int(v))
    }
}

fn is_bare_ident(expr: &Expr, name: &str) -> bool {
    matches!(&expr.kind, ExprKind::Ident(n) if n == name)
}

fn flatten_dotted_name(expr: &Expr) -> Option<String> {
    match &expr.kind {
        ExprKind::Ident(name) => Some(name.clone()),
        ExprKind::Select { operand, field, test_only: false, optional: false } => {
            flatten_dotted_name(operand).map(|prefix| format!("{prefix}.{field}"))
        }
        _ => None,
    }
}
