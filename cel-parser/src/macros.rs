//! Macro recognition and expansion.
//!
//! Macros are recognized by `(name, target-present, arity)` once a
//! [`Call`](ExprKind::Call) node has been built, and rewritten in place into
//! an [`ExprKind::Comprehension`]. The pre-expansion call is kept in
//! [`SourceInfo::macro_calls`] so the unparser can print the macro form back
//! out instead of the desugared loop.

use crate::ast::{Constant, Expr, ExprKind, SourceInfo};
use crate::error::ParseError;
use crate::ids::IdGen;
use crate::span::Span;

/// The non-strict predicate used by `all`/`exists` loop conditions:
/// `true -> true`, `false -> false`, `error|unknown -> true`. Letting errors
/// and unknowns through here is what gives `all`/`exists` their short-circuit
/// behavior without forcing every element to be error-free.
pub const NOT_STRICTLY_FALSE: &str = "@not_strictly_false";

/// Attempt to recognize and expand `call` (a freshly parsed `Call` node) as a
/// macro. Returns `Ok(None)` when the shape isn't a recognized macro — the
/// caller keeps the original `Call` node in that case. On success, the
/// returned `Expr` is a `Comprehension` whose id is new and whose original
/// call form has already been recorded in `info.macro_calls`.
pub fn try_expand(
    call: &Expr,
    span: Span,
    ids: &mut IdGen,
    info: &mut SourceInfo,
) -> Result<Option<Expr>, ParseError> {
    let ExprKind::Call { target, function, args } = &call.kind else {
        return Ok(None);
    };

    if target.is_none() && function == "has" && args.len() == 1 {
        let expanded = expand_has(&args[0], span, ids)?;
        info.macro_calls.insert(expanded.id, call.clone());
        return Ok(Some(expanded));
    }

    let Some(target) = target.as_deref() else {
        return Ok(None);
    };

    let shape = match (function.as_str(), args.len()) {
        ("all", 2) => Shape::All { two_var: false },
        ("all", 3) if is_ident(&args[1]) => Shape::All { two_var: true },
        ("exists", 2) => Shape::Exists { two_var: false },
        ("exists", 3) if is_ident(&args[1]) => Shape::Exists { two_var: true },
        ("exists_one", 2) => Shape::ExistsOne { two_var: false },
        ("exists_one", 3) if is_ident(&args[1]) => Shape::ExistsOne { two_var: true },
        ("map", 2) => Shape::Map { two_var: false, filtered: false },
        // `map(x, y, t)` (two-variable, over a map/indexed list) vs.
        // `map(x, p, t)` (filter-map) are both 3-arg calls; CEL's reference
        // grammar disambiguates using the checked type of the range, which
        // isn't available yet at parse time. We take the common case
        // (filter-map) whenever the middle argument isn't a bare identifier,
        // and the two-variable reading otherwise.
        ("map", 3) if is_ident(&args[1]) => Shape::Map { two_var: true, filtered: false },
        ("map", 3) => Shape::Map { two_var: false, filtered: true },
        ("filter", 2) => Shape::Filter,
        ("optMap", 2) if is_ident(&args[0]) => Shape::OptMap,
        _ => return Ok(None),
    };

    let expanded = expand_shape(shape, target, args, span, ids)?;
    info.macro_calls.insert(expanded.id, call.clone());
    Ok(Some(expanded))
}

fn is_ident(e: &Expr) -> bool {
    matches!(e.kind, ExprKind::Ident(_))
}

fn ident_name(e: &Expr) -> Result<String, ParseError> {
    match &e.kind {
        ExprKind::Ident(n) => Ok(n.clone()),
        _ => Err(ParseError::invalid_syntax(
            "macro iteration variable must be a simple identifier",
            Span::empty(),
        )),
    }
}

enum Shape {
    All { two_var: bool },
    Exists { two_var: bool },
    ExistsOne { two_var: bool },
    Map { two_var: bool, filtered: bool },
    Filter,
    /// `e.optMap(x, transform)`: runs `transform` with `x` bound to `e`'s
    /// inner value only when `e` holds one, producing `optional.none()`
    /// otherwise. Needs lazy, variable-bound evaluation of `transform`, which
    /// a plain builtin function can't express, so it desugars into a
    /// comprehension like every other macro here: iterate over a 0-or-1
    /// element list built from `e`'s presence, wrapping each step's result
    /// back into an optional.
    OptMap,
}

/// Build the four comprehension parts (init, condition, step, result) common
/// to every macro and wrap them into a `Comprehension` node. IDs here are not
/// recorded into `info.positions`; synthesized nodes share the macro call's
/// span only at the top level, matching how the reference planner treats
/// macro-desugared subtrees as a single attribute for tracing purposes.
fn expand_shape(shape: Shape, target: &Expr, args: &[Expr], span: Span, ids: &mut IdGen) -> Result<Expr, ParseError> {
    let iter_var = ident_name(&args[0])?;
    let accu_var = "__result__".to_string();

    let lit = |ids: &mut IdGen, c: Constant| Expr::new(ids.next_id(), ExprKind::Literal(c));
    let id_ref = |ids: &mut IdGen, name: &str| Expr::new(ids.next_id(), ExprKind::Ident(name.to_string()));
    let call0 = |ids: &mut IdGen, function: &str, args: Vec<Expr>| {
        Expr::new(ids.next_id(), ExprKind::Call { target: None, function: function.to_string(), args })
    };
    let list = |ids: &mut IdGen, elements: Vec<Expr>| {
        Expr::new(ids.next_id(), ExprKind::List { elements, optional_indices: vec![] })
    };
    let method = |ids: &mut IdGen, target: &Expr, function: &str, args: Vec<Expr>| {
        Expr::new(ids.next_id(), ExprKind::Call { target: Some(Box::new(target.clone())), function: function.to_string(), args })
    };

    let mut iter_range = target.clone();
    let (iter_var2, accu_init, loop_condition, loop_step, result) = match shape {
        Shape::All { two_var } => {
            let pred = args.last().unwrap().clone();
            let accu_init = lit(ids, Constant::Bool(true));
            let accu_ref = id_ref(ids, &accu_var);
            let cond = call0(ids, NOT_STRICTLY_FALSE, vec![accu_ref]);
            let accu_ref = id_ref(ids, &accu_var);
            let step = call0(ids, "_&&_", vec![accu_ref, pred]);
            let result = id_ref(ids, &accu_var);
            let iter_var2 = two_var.then(|| ident_name(&args[1])).transpose()?;
            (iter_var2, accu_init, cond, step, result)
        }
        Shape::Exists { two_var } => {
            let pred = args.last().unwrap().clone();
            let accu_init = lit(ids, Constant::Bool(false));
            let accu_ref = id_ref(ids, &accu_var);
            let not_accu = call0(ids, "!_", vec![accu_ref]);
            let cond = call0(ids, NOT_STRICTLY_FALSE, vec![not_accu]);
            let accu_ref = id_ref(ids, &accu_var);
            let step = call0(ids, "_||_", vec![accu_ref, pred]);
            let result = id_ref(ids, &accu_var);
            let iter_var2 = two_var.then(|| ident_name(&args[1])).transpose()?;
            (iter_var2, accu_init, cond, step, result)
        }
        Shape::ExistsOne { two_var } => {
            let pred = args.last().unwrap().clone();
            let accu_init = lit(ids, Constant::Int(0));
            let accu_ref = id_ref(ids, &accu_var);
            let one = lit(ids, Constant::Int(1));
            let incremented = call0(ids, "_+_", vec![accu_ref, one]);
            let accu_ref = id_ref(ids, &accu_var);
            let step = call0(ids, "_?_:_", vec![pred, incremented, accu_ref]);
            let cond = lit(ids, Constant::Bool(true));
            let accu_ref = id_ref(ids, &accu_var);
            let one = lit(ids, Constant::Int(1));
            let result = call0(ids, "_==_", vec![accu_ref, one]);
            let iter_var2 = two_var.then(|| ident_name(&args[1])).transpose()?;
            (iter_var2, accu_init, cond, step, result)
        }
        Shape::Map { two_var, filtered } => {
            let transform = args.last().unwrap().clone();
            let accu_init = list(ids, vec![]);
            let cond = lit(ids, Constant::Bool(true));
            let accu_ref = id_ref(ids, &accu_var);
            let transform_list = list(ids, vec![transform]);
            let appended = call0(ids, "_+_", vec![accu_ref, transform_list]);
            let step = if filtered {
                let pred = args[1].clone();
                let accu_ref = id_ref(ids, &accu_var);
                call0(ids, "_?_:_", vec![pred, appended, accu_ref])
            } else {
                appended
            };
            let result = id_ref(ids, &accu_var);
            let iter_var2 = two_var.then(|| ident_name(&args[1])).transpose()?;
            (iter_var2, accu_init, cond, step, result)
        }
        Shape::Filter => {
            let pred = args[1].clone();
            let accu_init = list(ids, vec![]);
            let cond = lit(ids, Constant::Bool(true));
            let accu_ref = id_ref(ids, &accu_var);
            let iter_ref = id_ref(ids, &iter_var);
            let iter_list = list(ids, vec![iter_ref]);
            let appended = call0(ids, "_+_", vec![accu_ref, iter_list]);
            let accu_ref = id_ref(ids, &accu_var);
            let step = call0(ids, "_?_:_", vec![pred, appended, accu_ref]);
            let result = id_ref(ids, &accu_var);
            (None, accu_init, cond, step, result)
        }
        Shape::OptMap => {
            let transform = args.last().unwrap().clone();
            let has_check = method(ids, target, "hasValue", vec![]);
            let inner_value = method(ids, target, "value", vec![]);
            let some_list = list(ids, vec![inner_value]);
            let none_list = list(ids, vec![]);
            iter_range = call0(ids, "_?_:_", vec![has_check, some_list, none_list]);
            let accu_init = call0(ids, "optional.none", vec![]);
            let cond = lit(ids, Constant::Bool(true));
            let step = call0(ids, "optional.of", vec![transform]);
            let result = id_ref(ids, &accu_var);
            (None, accu_init, cond, step, result)
        }
    };

    let _ = span;
    Ok(Expr::new(
        ids.next_id(),
        ExprKind::Comprehension {
            iter_var,
            iter_var2,
            iter_range: Box::new(iter_range),
            accu_var,
            accu_init: Box::new(accu_init),
            loop_condition: Box::new(loop_condition),
            loop_step: Box::new(loop_step),
            result: Box::new(result),
        },
    ))
}

fn expand_has(arg: &Expr, span: Span, ids: &mut IdGen) -> Result<Expr, ParseError> {
    let ExprKind::Select { operand, field, .. } = &arg.kind else {
        return Err(ParseError::InvalidHasArgument { span });
    };
    Ok(Expr::new(
        ids.next_id(),
        ExprKind::Select {
            operand: operand.clone(),
            field: field.clone(),
            test_only: true,
            optional: false,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExprKind;

    fn call(target: Option<Expr>, function: &str, args: Vec<Expr>, ids: &mut IdGen) -> Expr {
        Expr::new(
            ids.next_id(),
            ExprKind::Call { target: target.map(Box::new), function: function.to_string(), args },
        )
    }

    fn ident(name: &str, ids: &mut IdGen) -> Expr {
        Expr::new(ids.next_id(), ExprKind::Ident(name.to_string()))
    }

    #[test]
    fn has_rewrites_select_to_test_only() {
        let mut ids = IdGen::new();
        let mut info = SourceInfo::new("<input>", "has(m.x)");
        let select = Expr::new(
            ids.next_id(),
            ExprKind::Select {
                operand: Box::new(ident("m", &mut ids)),
                field: "x".to_string(),
                test_only: false,
                optional: false,
            },
        );
        let c = call(None, "has", vec![select], &mut ids);
        let expanded = try_expand(&c, Span::empty(), &mut ids, &mut info).unwrap().unwrap();
        match expanded.kind {
            ExprKind::Select { test_only, .. } => assert!(test_only),
            other => panic!("expected Select, got {other:?}"),
        }
    }

    #[test]
    fn has_expansion_allocates_a_fresh_id() {
        let mut ids = IdGen::new();
        let mut info = SourceInfo::new("<input>", "has(m.x)");
        let select = Expr::new(
            ids.next_id(),
            ExprKind::Select {
                operand: Box::new(ident("m", &mut ids)),
                field: "x".to_string(),
                test_only: false,
                optional: false,
            },
        );
        let select_id = select.id;
        let c = call(None, "has", vec![select], &mut ids);
        let expanded = try_expand(&c, Span::empty(), &mut ids, &mut info).unwrap().unwrap();
        assert_ne!(expanded.id, select_id, "has() must not reuse the pre-expansion node's id");
    }

    #[test]
    fn has_on_non_select_is_an_error() {
        let mut ids = IdGen::new();
        let mut info = SourceInfo::new("<input>", "has(m)");
        let c = call(None, "has", vec![ident("m", &mut ids)], &mut ids);
        assert!(try_expand(&c, Span::empty(), &mut ids, &mut info).is_err());
    }

    #[test]
    fn all_expands_to_comprehension_with_conjunction_step() {
        let mut ids = IdGen::new();
        let mut info = SourceInfo::new("<input>", "items.all(x, x > 0)");
        let pred = ident("x", &mut ids);
        let c = call(Some(ident("items", &mut ids)), "all", vec![ident("x", &mut ids), pred], &mut ids);
        let expanded = try_expand(&c, Span::empty(), &mut ids, &mut info).unwrap().unwrap();
        let ExprKind::Comprehension { accu_var, loop_step, .. } = &expanded.kind else {
            panic!("expected Comprehension");
        };
        assert_eq!(accu_var, "__result__");
        match &loop_step.kind {
            ExprKind::Call { function, .. } => assert_eq!(function, "_&&_"),
            other => panic!("expected &&, got {other:?}"),
        }
        assert!(info.macro_calls.contains_key(&expanded.id));
    }

    #[test]
    fn filter_map_three_arg_form_is_distinguished_from_two_variable_map() {
        let mut ids = IdGen::new();
        let mut info = SourceInfo::new("<input>", "items.map(x, x > 0, x)");
        let c = call(
            Some(ident("items", &mut ids)),
            "map",
            vec![ident("x", &mut ids), call(None, "_>_", vec![], &mut ids), ident("x", &mut ids)],
            &mut ids,
        );
        let expanded = try_expand(&c, Span::empty(), &mut ids, &mut info).unwrap().unwrap();
        let ExprKind::Comprehension { iter_var2, loop_step, .. } = &expanded.kind else {
            panic!("expected Comprehension");
        };
        assert!(iter_var2.is_none());
        match &loop_step.kind {
            ExprKind::Call { function, .. } => assert_eq!(function, "_?_:_"),
            other => panic!("expected conditional step, got {other:?}"),
        }
    }

    #[test]
    fn opt_map_expands_to_comprehension_over_presence_checked_list() {
        let mut ids = IdGen::new();
        let mut info = SourceInfo::new("<input>", "m.?x.optMap(v, v + 1)");
        let transform = call(None, "_+_", vec![ident("v", &mut ids), ident("v", &mut ids)], &mut ids);
        let c = call(Some(ident("e", &mut ids)), "optMap", vec![ident("v", &mut ids), transform], &mut ids);
        let expanded = try_expand(&c, Span::empty(), &mut ids, &mut info).unwrap().unwrap();
        let ExprKind::Comprehension { iter_var, accu_init, loop_step, iter_range, .. } = &expanded.kind else {
            panic!("expected Comprehension");
        };
        assert_eq!(iter_var, "v");
        match &accu_init.kind {
            ExprKind::Call { function, target, .. } => {
                assert_eq!(function, "optional.none");
                assert!(target.is_none());
            }
            other => panic!("expected optional.none() accumulator seed, got {other:?}"),
        }
        match &loop_step.kind {
            ExprKind::Call { function, .. } => assert_eq!(function, "optional.of"),
            other => panic!("expected optional.of(..) step, got {other:?}"),
        }
        match &iter_range.kind {
            ExprKind::Call { function, .. } => assert_eq!(function, "_?_:_"),
            other => panic!("expected a presence-checked conditional range, got {other:?}"),
        }
    }

    #[test]
    fn non_macro_call_is_left_alone() {
        let mut ids = IdGen::new();
        let mut info = SourceInfo::new("<input>", "size(x)");
        let c = call(None, "size", vec![ident("x", &mut ids)], &mut ids);
        assert!(try_expand(&c, Span::empty(), &mut ids, &mut info).unwrap().is_none());
    }
}
