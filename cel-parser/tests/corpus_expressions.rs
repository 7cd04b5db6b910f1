//! End-to-end parser tests exercising representative expression shapes.

use cel_parser::ast::{Constant, ExprKind};
use cel_parser::parse;

fn expect(source: &str) -> cel_parser::ParsedExpr {
    parse(source).unwrap_or_else(|e| panic!("failed to parse {source:?}: {}", e.format_all(source)))
}

fn expect_err(source: &str) {
    assert!(parse(source).is_err(), "expected {source:?} to fail to parse");
}

#[test]
fn literals() {
    assert_eq!(expect("42").expr.kind, ExprKind::Literal(Constant::Int(42)));
    assert_eq!(expect("42u").expr.kind, ExprKind::Literal(Constant::Uint(42)));
    assert_eq!(expect("0xFF").expr.kind, ExprKind::Literal(Constant::Int(255)));
    assert_eq!(expect("1.5").expr.kind, ExprKind::Literal(Constant::Double(1.5)));
    assert_eq!(expect("true").expr.kind, ExprKind::Literal(Constant::Bool(true)));
    assert_eq!(expect("null").expr.kind, ExprKind::Literal(Constant::Null));
    assert_eq!(expect("'abc'").expr.kind, ExprKind::Literal(Constant::String("abc".into())));
    assert_eq!(expect("b'abc'").expr.kind, ExprKind::Literal(Constant::Bytes(b"abc".to_vec())));
}

#[test]
fn i64_min_parses_without_overflow() {
    match expect("-9223372036854775808").expr.kind {
        ExprKind::Literal(Constant::Int(v)) => assert_eq!(v, i64::MIN),
        other => panic!("expected Int literal, got {other:?}"),
    }
}

#[test]
fn arithmetic_precedence() {
    let expr = expect("2 + 3 * 4").expr;
    let ExprKind::Call { function, args, .. } = expr.kind else { panic!("expected call") };
    assert_eq!(function, "_+_");
    assert!(matches!(args[1].kind, ExprKind::Call { .. }));
}

#[test]
fn logical_chain_is_balanced_not_left_leaning() {
    // A chain of n `&&` operands should not nest n deep on one side; the
    // balanced tree keeps both operands of the top node non-trivial.
    let expr = expect("a && b && c && d").expr;
    let ExprKind::Call { function, args, .. } = expr.kind else { panic!("expected call") };
    assert_eq!(function, "_&&_");
    assert!(matches!(args[0].kind, ExprKind::Call { .. }));
    assert!(matches!(args[1].kind, ExprKind::Call { .. }));
}

#[test]
fn ternary_and_nesting() {
    let expr = expect("a ? b ? 1 : 2 : 3").expr;
    let ExprKind::Call { function, args, .. } = expr.kind else { panic!("expected call") };
    assert_eq!(function, "_?_:_");
    assert!(matches!(args[1].kind, ExprKind::Call { .. }));
}

#[test]
fn member_access_and_method_call() {
    let expr = expect("a.b.startsWith('x')").expr;
    let ExprKind::Call { target: Some(target), function, args } = expr.kind else { panic!("expected method call") };
    assert_eq!(function, "startsWith");
    assert_eq!(args.len(), 1);
    assert!(target.is_select());
}

#[test]
fn indexing_and_optional_indexing() {
    let expr = expect("m[0]").expr;
    assert!(matches!(expr.kind, ExprKind::Call { function, .. } if function == "_[_]"));

    let expr = expect("m[?0]").expr;
    assert!(matches!(expr.kind, ExprKind::Call { function, .. } if function == "_[?_]"));
}

#[test]
fn list_and_map_literals() {
    let expr = expect("[1, 2, ?3]").expr;
    let ExprKind::List { elements, optional_indices } = expr.kind else { panic!("expected list") };
    assert_eq!(elements.len(), 3);
    assert_eq!(optional_indices, vec![2]);

    let expr = expect("{'a': 1, ?'b': 2}").expr;
    let ExprKind::Struct { type_name, entries } = expr.kind else { panic!("expected struct") };
    assert!(type_name.is_none());
    assert_eq!(entries.len(), 2);
    assert!(entries[1].optional);
}

#[test]
fn message_literal_with_qualified_type_name() {
    let expr = expect("pkg.sub.Msg{field: 1}").expr;
    let ExprKind::Struct { type_name, entries } = expr.kind else { panic!("expected struct") };
    assert_eq!(type_name.as_deref(), Some("pkg.sub.Msg"));
    assert_eq!(entries.len(), 1);
}

#[test]
fn has_macro() {
    let expr = expect("has(m.field)").expr;
    assert!(matches!(expr.kind, ExprKind::Select { test_only: true, .. }));

    expect_err("has(m)");
}

#[test]
fn comprehension_macros_expand() {
    for src in ["items.all(x, x > 0)", "items.exists(x, x > 0)", "items.exists_one(x, x > 0)", "items.map(x, x * 2)", "items.filter(x, x > 0)"] {
        let parsed = expect(src);
        assert!(matches!(parsed.expr.kind, ExprKind::Comprehension { .. }), "{src} did not expand");
        assert!(parsed.source_info.macro_calls.contains_key(&parsed.expr.id));
    }
}

#[test]
fn absolute_identifier_keeps_leading_dot() {
    let expr = expect(".pkg.Name").expr;
    match expr.kind {
        ExprKind::Select { field, .. } => assert_eq!(field, "Name"),
        other => panic!("expected Select, got {other:?}"),
    }
}

#[test]
fn reserved_words_cannot_be_used_as_identifiers() {
    for word in ["as", "break", "else", "if", "in", "let", "void"] {
        expect_err(word);
    }
}

#[test]
fn reserved_words_are_valid_field_names() {
    let expr = expect("m.else").expr;
    assert!(matches!(expr.kind, ExprKind::Select { field, .. } if field == "else"));
}

#[test]
fn unterminated_string_reports_error() {
    expect_err("'unterminated");
}

#[test]
fn trailing_tokens_are_rejected() {
    expect_err("1 1");
}
