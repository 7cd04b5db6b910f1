//! Canonical AST-to-source rendering.
//!
//! `unparse` is the inverse of parsing: given the tree `cel_parser::parse`
//! produced (macros already expanded, pre-expansion calls preserved in
//! [`cel_parser::ast::SourceInfo::macro_calls`]), it renders source text that
//! re-parses to a structurally equivalent tree. It over-parenthesizes rather
//! than reproduce minimal precedence-aware grouping — correctness of the
//! round trip matters here, not matching the original byte-for-byte.

use std::fmt::Write as _;

use cel_parser::ast::{Constant, Expr, ExprKind, SourceInfo, StructEntryKey};

pub fn unparse(expr: &Expr, source_info: &SourceInfo) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, source_info);
    out
}

fn write_expr(out: &mut String, expr: &Expr, info: &SourceInfo) {
    if let Some(call) = info.macro_calls.get(&expr.id) {
        write_expr(out, call, info);
        return;
    }
    match &expr.kind {
        ExprKind::Literal(c) => write_literal(out, c),
        ExprKind::Ident(name) => out.push_str(name),
        ExprKind::Select { operand, field, test_only, optional } => {
            if *test_only {
                out.push_str("has(");
                write_expr(out, operand, info);
                let _ = write!(out, ".{field})");
            } else {
                write_operand(out, operand, info);
                out.push_str(if *optional { ".?" } else { "." });
                out.push_str(field);
            }
        }
        ExprKind::Call { target, function, args } => write_call(out, target.as_deref(), function, args, info),
        ExprKind::List { elements, optional_indices } => {
            out.push('[');
            for (i, e) in elements.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if optional_indices.contains(&i) {
                    out.push('?');
                }
                write_expr(out, e, info);
            }
            out.push(']');
        }
        ExprKind::Struct { type_name, entries } => {
            if let Some(name) = type_name {
                out.push_str(name);
                out.push('{');
            } else {
                out.push('{');
            }
            for (i, entry) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if entry.optional {
                    out.push('?');
                }
                match &entry.key {
                    StructEntryKey::FieldName(f) => out.push_str(f),
                    StructEntryKey::Expr(k) => write_expr(out, k, info),
                }
                out.push_str(": ");
                write_expr(out, &entry.value, info);
            }
            out.push('}');
        }
        ExprKind::Comprehension { iter_range, loop_step, result, .. } => {
            // Unrecognized (hand-built) comprehension: no macro form to fall
            // back to, so render the desugared loop as a call-like shape.
            out.push_str("__comprehension__(");
            write_expr(out, iter_range, info);
            out.push_str(", ");
            write_expr(out, loop_step, info);
            out.push_str(", ");
            write_expr(out, result, info);
            out.push(')');
        }
    }
}

fn write_literal(out: &mut String, c: &Constant) {
    match c {
        Constant::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Constant::Int(i) => {
            let _ = write!(out, "{i}");
        }
        Constant::Uint(u) => {
            let _ = write!(out, "{u}u");
        }
        Constant::Double(d) => {
            if d.fract() == 0.0 && d.is_finite() {
                let _ = write!(out, "{d:.1}");
            } else {
                let _ = write!(out, "{d}");
            }
        }
        Constant::String(s) => {
            let _ = write!(out, "{s:?}");
        }
        Constant::Bytes(b) => {
            let _ = write!(out, "b{:?}", String::from_utf8_lossy(b));
        }
        Constant::Null => out.push_str("null"),
    }
}

const BINARY_OPS: &[(&str, &str)] =
    &[("_||_", "||"), ("_&&_", "&&"), ("_==_", "=="), ("_!=_", "!="), ("_<_", "<"), ("_<=_", "<="), ("_>_", ">"), ("_>=_", ">=")];

const ARITH_OPS: &[(&str, &str)] = &[("_+_", "+"), ("_-_", "-"), ("_*_", "*"), ("_/_", "/"), ("_%_", "%")];

fn write_call(out: &mut String, target: Option<&Expr>, function: &str, args: &[Expr], info: &SourceInfo) {
    if target.is_none() {
        if let Some((_, sym)) = BINARY_OPS.iter().chain(ARITH_OPS).find(|(f, _)| *f == function) {
            out.push('(');
            write_expr(out, &args[0], info);
            let _ = write!(out, " {sym} ");
            write_expr(out, &args[1], info);
            out.push(')');
            return;
        }
        match function {
            "_?_:_" => {
                out.push('(');
                write_expr(out, &args[0], info);
                out.push_str(" ? ");
                write_expr(out, &args[1], info);
                out.push_str(" : ");
                write_expr(out, &args[2], info);
                out.push(')');
                return;
            }
            "@in" => {
                out.push('(');
                write_expr(out, &args[0], info);
                out.push_str(" in ");
                write_expr(out, &args[1], info);
                out.push(')');
                return;
            }
            "!_" => {
                out.push('!');
                write_operand(out, &args[0], info);
                return;
            }
            "-_" => {
                out.push('-');
                write_operand(out, &args[0], info);
                return;
            }
            "_[_]" => {
                write_operand(out, &args[0], info);
                out.push('[');
                write_expr(out, &args[1], info);
                out.push(']');
                return;
            }
            "_[?_]" => {
                write_operand(out, &args[0], info);
                out.push_str("[?");
                write_expr(out, &args[1], info);
                out.push(']');
                return;
            }
            _ => {}
        }
    }

    if let Some(t) = target {
        write_operand(out, t, info);
        out.push('.');
    }
    out.push_str(function);
    out.push('(');
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, a, info);
    }
    out.push(')');
}

/// Like [`write_expr`], but parenthesizes any operand that isn't atomic
/// (a literal, identifier, call, or postfix chain) so that rendering e.g.
/// `(a + b).c` doesn't lose its grouping when read back.
fn write_operand(out: &mut String, expr: &Expr, info: &SourceInfo) {
    let needs_parens = matches!(&expr.kind, ExprKind::Comprehension { .. })
        || is_binary_or_conditional_call(expr, info);
    if needs_parens {
        out.push('(');
        write_expr(out, expr, info);
        out.push(')');
    } else {
        write_expr(out, expr, info);
    }
}

fn is_binary_or_conditional_call(expr: &Expr, info: &SourceInfo) -> bool {
    if info.macro_calls.contains_key(&expr.id) {
        return false;
    }
    matches!(
        &expr.kind,
        ExprKind::Call { target: None, function, .. }
            if BINARY_OPS.iter().chain(ARITH_OPS).any(|(f, _)| f == function)
                || matches!(function.as_str(), "_?_:_" | "@in")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(source: &str) {
        let parsed = cel_parser::parse(source).unwrap();
        let rendered = unparse(&parsed.expr, &parsed.source_info);
        let reparsed = cel_parser::parse(&rendered).unwrap_or_else(|e| panic!("{rendered:?} failed to reparse: {e:?}"));
        assert_eq!(strip_ids(&parsed.expr), strip_ids(&reparsed.expr), "{source:?} -> {rendered:?}");
    }

    /// Structural equality ignoring expression ids, which aren't guaranteed
    /// to match between the two parses.
    fn strip_ids(expr: &Expr) -> String {
        format!("{:?}", normalize(expr))
    }

    fn normalize(expr: &Expr) -> Expr {
        let kind = match expr.kind.clone() {
            ExprKind::Select { operand, field, test_only, optional } => {
                ExprKind::Select { operand: Box::new(normalize(&operand)), field, test_only, optional }
            }
            ExprKind::Call { target, function, args } => ExprKind::Call {
                target: target.map(|t| Box::new(normalize(&t))),
                function,
                args: args.iter().map(normalize).collect(),
            },
            ExprKind::List { elements, optional_indices } => {
                ExprKind::List { elements: elements.iter().map(normalize).collect(), optional_indices }
            }
            ExprKind::Struct { type_name, entries } => ExprKind::Struct {
                type_name,
                entries: entries
                    .into_iter()
                    .map(|mut e| {
                        e.id = 0;
                        e.value = normalize(&e.value);
                        if let StructEntryKey::Expr(k) = &e.key {
                            e.key = StructEntryKey::Expr(Box::new(normalize(k)));
                        }
                        e
                    })
                    .collect(),
            },
            ExprKind::Comprehension { iter_var, iter_var2, iter_range, accu_var, accu_init, loop_condition, loop_step, result } => {
                ExprKind::Comprehension {
                    iter_var,
                    iter_var2,
                    iter_range: Box::new(normalize(&iter_range)),
                    accu_var,
                    accu_init: Box::new(normalize(&accu_init)),
                    loop_condition: Box::new(normalize(&loop_condition)),
                    loop_step: Box::new(normalize(&loop_step)),
                    result: Box::new(normalize(&result)),
                }
            }
            other => other,
        };
        Expr::new(0, kind)
    }

    #[test]
    fn roundtrips_arithmetic() {
        roundtrip("1 + 2 * 3 - 4");
    }

    #[test]
    fn roundtrips_logical_operators() {
        roundtrip("a && b || c");
    }

    #[test]
    fn roundtrips_field_selection_and_indexing() {
        roundtrip("a.b.c[0]");
    }

    #[test]
    fn roundtrips_has_macro() {
        roundtrip("has(a.b)");
    }

    #[test]
    fn roundtrips_exists_macro() {
        roundtrip("[1, 2, 3].exists(x, x > 1)");
    }

    #[test]
    fn roundtrips_ternary() {
        roundtrip("a ? b : c");
    }

    #[test]
    fn roundtrips_map_literal() {
        roundtrip("{'a': 1, 'b': 2}");
    }
}
