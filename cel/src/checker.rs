//! The type checker: a bottom-up pass producing a type map (`id -> Type`)
//! and a reference map (`id -> Reference`) alongside the diagnostics
//! accumulated along the way.
//!
//! Checking never aborts on the first error — every node still gets a type
//! (falling back to [`Type::Error`]) so later diagnostics stay meaningful
//! instead of cascading into "undeclared identifier" noise for everything
//! downstream of one mistake.

use std::collections::HashMap;

use cel_parser::ast::{Constant, Expr, ExprId, ExprKind, ParsedExpr, StructEntryKey};
use cel_parser::span::Span;

use crate::env::Env;
use crate::error::{CheckError, CheckErrors};
use crate::provider::TypeProvider;
use crate::types::Type;
use crate::value::Value;

pub type TypeMap = HashMap<ExprId, Type>;

/// What an `Ident` or `Call` node resolved to: a variable/type/enum name, or
/// the overload id(s) a function call bound to. `constant` is populated for
/// enum identifiers, which check as a statically-known `int`.
#[derive(Debug, Clone, Default)]
pub struct Reference {
    pub name: Option<String>,
    pub overload_ids: Vec<String>,
    pub constant: Option<Value>,
    /// Set when the identifier resolved to a message type name rather than a
    /// variable or enum constant (e.g. `pkg.Msg` used with `type()`).
    pub type_ref: Option<Type>,
}

pub type ReferenceMap = HashMap<ExprId, Reference>;

/// The result of checking an expression: the original parse tree plus the
/// type and reference annotations the planner consumes.
#[derive(Debug, Clone)]
pub struct CheckedExpr {
    pub expr: Expr,
    pub source_info: cel_parser::ast::SourceInfo,
    pub type_map: TypeMap,
    pub reference_map: ReferenceMap,
}

impl CheckedExpr {
    pub fn type_of(&self, id: ExprId) -> Type {
        self.type_map.get(&id).cloned().unwrap_or(Type::Dyn)
    }
}

struct Scope {
    vars: HashMap<String, Type>,
}

struct Checker<'a> {
    env: &'a Env,
    provider: &'a dyn TypeProvider,
    scopes: Vec<Scope>,
    type_map: TypeMap,
    reference_map: ReferenceMap,
    errors: CheckErrors,
    source_info: &'a cel_parser::ast::SourceInfo,
}

pub fn check(parsed: &ParsedExpr, env: &Env, provider: &dyn TypeProvider) -> (CheckedExpr, CheckErrors) {
    let mut checker = Checker {
        env,
        provider,
        scopes: Vec::new(),
        type_map: TypeMap::new(),
        reference_map: ReferenceMap::new(),
        errors: CheckErrors::default(),
        source_info: &parsed.source_info,
    };
    checker.check_expr(&parsed.expr);
    (
        CheckedExpr {
            expr: parsed.expr.clone(),
            source_info: parsed.source_info.clone(),
            type_map: checker.type_map,
            reference_map: checker.reference_map,
        },
        checker.errors,
    )
}

impl<'a> Checker<'a> {
    fn span(&self, id: ExprId) -> Span {
        self.source_info.offset(id).unwrap_or_default()
    }

    fn set_type(&mut self, id: ExprId, ty: Type) -> Type {
        self.type_map.insert(id, ty.clone());
        ty
    }

    fn lookup_local(&self, name: &str) -> Option<Type> {
        self.scopes.iter().rev().find_map(|s| s.vars.get(name).cloned())
    }

    fn check_expr(&mut self, expr: &Expr) -> Type {
        let ty = match &expr.kind {
            ExprKind::Literal(c) => self.check_literal(c),
            ExprKind::Ident(name) => self.check_ident(expr.id, name),
            ExprKind::Select { operand, field, test_only, optional } => {
                self.check_select(expr.id, operand, field, *test_only, *optional)
            }
            ExprKind::Call { target, function, args } => self.check_call(expr.id, target.as_deref(), function, args),
            ExprKind::List { elements, optional_indices } => self.check_list(elements, optional_indices),
            ExprKind::Struct { type_name, entries } => self.check_struct(expr.id, type_name.as_deref(), entries),
            ExprKind::Comprehension { .. } => self.check_comprehension(expr),
        };
        self.set_type(expr.id, ty)
    }

    fn check_literal(&self, c: &Constant) -> Type {
        match c {
            Constant::Bool(_) => Type::Bool,
            Constant::Int(_) => Type::Int,
            Constant::Uint(_) => Type::Uint,
            Constant::Double(_) => Type::Double,
            Constant::String(_) => Type::String,
            Constant::Bytes(_) => Type::Bytes,
            Constant::Null => Type::Null,
        }
    }

    fn check_ident(&mut self, id: ExprId, name: &str) -> Type {
        if let Some(ty) = self.lookup_local(name) {
            self.reference_map.insert(id, Reference { name: Some(name.to_string()), ..Default::default() });
            return ty;
        }
        if let Some((resolved, ty)) = self.env.resolve_variable(name) {
            self.reference_map.insert(id, Reference { name: Some(resolved.to_string()), ..Default::default() });
            return ty.clone();
        }
        for candidate in self.env.resolution_candidates(name) {
            if let Some(ty) = self.provider.find_type(&candidate) {
                self.reference_map.insert(
                    id,
                    Reference { name: Some(candidate.clone()), type_ref: Some(ty.clone()), ..Default::default() },
                );
                return Type::Type(Box::new(ty));
            }
        }
        for candidate in self.env.resolution_candidates(name) {
            if let Some(value) = self.provider.find_enum_value(&candidate) {
                self.reference_map.insert(
                    id,
                    Reference { name: Some(candidate), constant: Some(Value::Int(value)), ..Default::default() },
                );
                return Type::Int;
            }
        }
        self.errors.push(CheckError::UndeclaredVariable { name: name.to_string(), span: self.span(id) });
        Type::Error
    }

    fn check_select(&mut self, id: ExprId, operand: &Expr, field: &str, test_only: bool, optional: bool) -> Type {
        let operand_ty = self.check_expr(operand);
        if test_only {
            return Type::Bool;
        }
        let field_ty = match &operand_ty {
            Type::Dyn | Type::Error => Type::Dyn,
            Type::Map(_, v) => v.as_ref().clone(),
            Type::Message(name) => match self.provider.find_field(name, field) {
                Some(info) => info.ty,
                None => {
                    self.errors.push(CheckError::Custom {
                        message: format!("no such field '{field}' on {name}"),
                        span: self.span(id),
                    });
                    Type::Error
                }
            },
            Type::Optional(inner) => {
                return Type::optional(self.select_into(&inner.clone(), field, id));
            }
            other => {
                self.errors.push(CheckError::Custom {
                    message: format!("type {other} does not support field selection"),
                    span: self.span(id),
                });
                Type::Error
            }
        };
        if optional {
            Type::optional(field_ty)
        } else {
            field_ty
        }
    }

    fn select_into(&mut self, base: &Type, field: &str, id: ExprId) -> Type {
        match base {
            Type::Dyn | Type::Error => Type::Dyn,
            Type::Map(_, v) => v.as_ref().clone(),
            Type::Message(name) => self.provider.find_field(name, field).map(|f| f.ty).unwrap_or_else(|| {
                self.errors.push(CheckError::Custom {
                    message: format!("no such field '{field}' on {name}"),
                    span: self.span(id),
                });
                Type::Error
            }),
            other => {
                self.errors.push(CheckError::Custom {
                    message: format!("type {other} does not support field selection"),
                    span: self.span(id),
                });
                Type::Error
            }
        }
    }

    fn check_call(&mut self, id: ExprId, target: Option<&Expr>, function: &str, args: &[Expr]) -> Type {
        let target_ty = target.map(|t| self.check_expr(t));
        let arg_tys: Vec<Type> = args.iter().map(|a| self.check_expr(a)).collect();

        let mut full_args = Vec::new();
        if let Some(t) = &target_ty {
            full_args.push(t.clone());
        }
        full_args.extend(arg_tys.iter().cloned());

        let Some((resolved_name, overloads)) = self.env.resolve_function(function) else {
            self.errors.push(CheckError::UndeclaredFunction { name: function.to_string(), span: self.span(id) });
            return Type::Error;
        };
        let resolved_name = resolved_name.to_string();

        let matches: Vec<_> = overloads
            .iter()
            .filter(|o| o.member == target.is_some() && o.matches(&full_args))
            .cloned()
            .collect();

        if matches.is_empty() {
            self.errors.push(CheckError::NoMatchingOverload {
                name: function.to_string(),
                args: full_args.iter().map(Type::to_string).collect::<Vec<_>>().join(", "),
                span: self.span(id),
            });
            return Type::Error;
        }

        self.reference_map.insert(
            id,
            Reference {
                name: Some(resolved_name),
                overload_ids: matches.iter().map(|o| o.id.clone()).collect(),
                ..Default::default()
            },
        );

        let refined = refine_result(function, &matches[0].id, &full_args).unwrap_or_else(|| matches[0].result_type.clone());
        if matches.len() == 1 {
            return refined;
        }
        matches.iter().skip(1).fold(refined, |acc, o| join_types(&acc, &o.result_type))
    }

    fn check_list(&mut self, elements: &[Expr], optional_indices: &[usize]) -> Type {
        let mut elem_ty: Option<Type> = None;
        for (i, e) in elements.iter().enumerate() {
            let mut ty = self.check_expr(e);
            if optional_indices.contains(&i) {
                if let Type::Optional(inner) = ty {
                    ty = inner.as_ref().clone();
                }
            }
            elem_ty = Some(match elem_ty {
                None => ty,
                Some(prev) => {
                    if self.env.homogeneous_aggregate_literals && prev != ty && prev != Type::Dyn && ty != Type::Dyn {
                        self.errors.push(CheckError::Custom {
                            message: format!("list literal has mixed element types {prev} and {ty}"),
                            span: self.span(e.id),
                        });
                    }
                    join_types(&prev, &ty)
                }
            });
        }
        Type::list(elem_ty.unwrap_or(Type::Dyn))
    }

    fn check_struct(&mut self, id: ExprId, type_name: Option<&str>, entries: &[cel_parser::ast::StructEntry]) -> Type {
        match type_name {
            None => {
                let mut key_ty: Option<Type> = None;
                let mut val_ty: Option<Type> = None;
                for entry in entries {
                    let kt = match &entry.key {
                        StructEntryKey::Expr(k) => self.check_expr(k),
                        StructEntryKey::FieldName(_) => Type::String,
                    };
                    let mut vt = self.check_expr(&entry.value);
                    if entry.optional {
                        if let Type::Optional(inner) = vt {
                            vt = inner.as_ref().clone();
                        }
                    }
                    key_ty = Some(key_ty.map(|t| join_types(&t, &kt)).unwrap_or(kt));
                    val_ty = Some(val_ty.map(|t| join_types(&t, &vt)).unwrap_or(vt));
                }
                Type::map(key_ty.unwrap_or(Type::Dyn), val_ty.unwrap_or(Type::Dyn))
            }
            Some(name) => {
                for entry in entries {
                    let field = match &entry.key {
                        StructEntryKey::FieldName(f) => f.clone(),
                        StructEntryKey::Expr(_) => {
                            self.errors.push(CheckError::Custom {
                                message: "message literal keys must be field names".to_string(),
                                span: self.span(entry.id),
                            });
                            continue;
                        }
                    };
                    let value_ty = self.check_expr(&entry.value);
                    match self.provider.find_field(name, &field) {
                        Some(info) => {
                            let expected = if entry.optional { Type::optional(info.ty) } else { info.ty };
                            if !value_ty.is_assignable_to(&expected) {
                                self.errors.push(CheckError::TypeMismatch {
                                    expected,
                                    found: value_ty,
                                    span: self.span(entry.id),
                                });
                            }
                        }
                        None => self.errors.push(CheckError::Custom {
                            message: format!("no such field '{field}' on {name}"),
                            span: self.span(entry.id),
                        }),
                    }
                }
                let resolved = self.provider.find_type(name).is_some();
                if !resolved {
                    self.errors.push(CheckError::Custom { message: format!("unknown message type '{name}'"), span: self.span(id) });
                }
                Type::Message(name.to_string())
            }
        }
    }

    fn check_comprehension(&mut self, expr: &Expr) -> Type {
        let ExprKind::Comprehension { iter_var, iter_var2, iter_range, accu_var, accu_init, loop_condition, loop_step, result } =
            &expr.kind
        else {
            unreachable!()
        };

        let range_ty = self.check_expr(iter_range);
        let (var1_ty, var2_ty) = match (&range_ty, iter_var2) {
            (Type::List(elem), Some(_)) => (Type::Int, elem.as_ref().clone()),
            (Type::List(elem), None) => (elem.as_ref().clone(), Type::Dyn),
            (Type::Map(k, v), Some(_)) => (k.as_ref().clone(), v.as_ref().clone()),
            (Type::Map(k, _), None) => (k.as_ref().clone(), Type::Dyn),
            (Type::Dyn | Type::Error, _) => (Type::Dyn, Type::Dyn),
            (other, _) => {
                self.errors.push(CheckError::Custom {
                    message: format!("type {other} is not iterable"),
                    span: self.span(expr.id),
                });
                (Type::Dyn, Type::Dyn)
            }
        };

        let accu_ty = self.check_expr(accu_init);

        let mut vars = HashMap::new();
        vars.insert(iter_var.clone(), var1_ty);
        if let Some(v2) = iter_var2 {
            vars.insert(v2.clone(), var2_ty);
        }
        vars.insert(accu_var.clone(), accu_ty);
        self.scopes.push(Scope { vars });

        self.check_expr(loop_condition);
        self.check_expr(loop_step);
        let result_ty = self.check_expr(result);

        self.scopes.pop();
        result_ty
    }
}

/// Widen two types to their common supertype — `Dyn` for anything that isn't
/// structurally identical, the narrower type otherwise. Used for list/map
/// literal element typing and multi-overload call results.
fn join_types(a: &Type, b: &Type) -> Type {
    if a == b {
        a.clone()
    } else if matches!(a, Type::Error) {
        b.clone()
    } else if matches!(b, Type::Error) {
        a.clone()
    } else {
        Type::Dyn
    }
}

/// A handful of builtin overloads produce a result type more precise than
/// their declared (necessarily `Dyn`-erased) signature once concrete
/// argument types are known — e.g. `[1,2] + [3,4] : list(int)` rather than
/// `list(dyn)`. This recovers that precision without a full unifier.
fn refine_result(function: &str, overload_id: &str, args: &[Type]) -> Option<Type> {
    match (function, overload_id, args) {
        ("_+_", "add_list", [Type::List(a), Type::List(b)]) => Some(Type::list(join_types(a, b))),
        ("_[_]", "index_list", [Type::List(a), _]) => Some(a.as_ref().clone()),
        ("_[_]", "index_map", [Type::Map(_, v), _]) => Some(v.as_ref().clone()),
        ("_[?_]", _, [a, _]) => Some(Type::optional(match a {
            Type::List(elem) => elem.as_ref().clone(),
            Type::Map(_, v) => v.as_ref().clone(),
            _ => Type::Dyn,
        })),
        _ => None,
    }
}
