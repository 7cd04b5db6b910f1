//! The planner lowers a [`CheckedExpr`] into a tree of [`Node`]s — the
//! `Interpretable` of the design: every node keeps its originating
//! expression id and knows how to evaluate itself against an
//! [`Activation`]. Attribute chains (`a.b.c`, `a.b[0]`, `has(a.b)`) are
//! collapsed at plan time into a single [`Attr`] so the evaluator can apply
//! [`AttributePattern`] matching and optional-short-circuiting uniformly
//! instead of re-deriving the qualifier path node by node.

use std::collections::HashMap;
use std::rc::Rc;

use cel_parser::ast::{Constant, Expr, ExprId, ExprKind, StructEntryKey};

use crate::activation::{Activation, AttributePattern};
use crate::checker::CheckedExpr;
use crate::error::{ErrorKind, EvalError};
use crate::functions;
use crate::provider::TypeProvider;
use crate::value::{MapKey, Value};

/// Where an attribute's root value comes from.
#[derive(Debug, Clone)]
pub enum AttrBase {
    /// A namespace-resolved variable name (already disambiguated by the
    /// checker, or — if planned without checking — the raw identifier).
    Name(String),
    /// The root is itself the value of an arbitrary subexpression
    /// (`RelativeAttribute` in the design: e.g. `f(x).field`).
    Expr(Box<Node>),
}

#[derive(Debug, Clone)]
pub enum Qualifier {
    Field(String, bool),
    Index(Box<Node>, bool),
}

#[derive(Debug, Clone)]
pub struct Attr {
    pub id: ExprId,
    pub base: AttrBase,
    pub qualifiers: Vec<Qualifier>,
}

/// A lowered, directly-evaluable node. Mirrors [`cel_parser::ast::ExprKind`]
/// but with macros already gone (they were comprehensions before planning
/// too), attribute chains collapsed, and logical/conditional operators split
/// out from ordinary strict calls so `eval` can give them short-circuit
/// treatment.
#[derive(Debug, Clone)]
pub enum Node {
    Const(ExprId, Value),
    Attr(Attr),
    /// `has(attr)` — presence testing is a property of the qualifier path,
    /// not a function call, so it gets its own node kind.
    Has(Attr, String),
    And(ExprId, Box<Node>, Box<Node>),
    Or(ExprId, Box<Node>, Box<Node>),
    Conditional(ExprId, Box<Node>, Box<Node>, Box<Node>),
    Call { id: ExprId, function: String, target: Option<Box<Node>>, args: Vec<Node> },
    List { id: ExprId, elements: Vec<Node>, optional_indices: Vec<usize> },
    Map { id: ExprId, entries: Vec<(Node, Node, bool)> },
    Object { id: ExprId, type_name: String, entries: Vec<(String, Node, bool)> },
    Comprehension {
        id: ExprId,
        iter_var: String,
        iter_var2: Option<String>,
        iter_range: Box<Node>,
        accu_var: String,
        accu_init: Box<Node>,
        loop_condition: Box<Node>,
        loop_step: Box<Node>,
        result: Box<Node>,
    },
}

impl Node {
    fn id(&self) -> ExprId {
        match self {
            Node::Const(id, _)
            | Node::Has(Attr { id, .. }, _)
            | Node::And(id, ..)
            | Node::Or(id, ..)
            | Node::Conditional(id, ..)
            | Node::Call { id, .. }
            | Node::List { id, .. }
            | Node::Map { id, .. }
            | Node::Object { id, .. }
            | Node::Comprehension { id, .. } => *id,
            Node::Attr(a) => a.id,
        }
    }
}

/// A planner-time observer invoked with every evaluated node's id and
/// result. Cannot alter the value, matching the "observers cannot alter
/// values" tracing contract.
pub type Tracer<'a> = dyn Fn(ExprId, &Value) + 'a;

pub struct EvalContext<'a> {
    pub activation: &'a dyn Activation,
    pub provider: &'a dyn TypeProvider,
    pub tracer: Option<&'a Tracer<'a>>,
    /// Late-bound function overrides consulted before the standard library;
    /// `None` result falls through to [`functions::call_builtin`].
    pub dispatcher: Option<&'a dyn Fn(&str, Option<&Value>, &[Value]) -> Option<Result<Value, ErrorKind>>>,
}

/// An activation layering local bindings (comprehension loop/accumulator
/// variables) over an outer activation, without taking ownership of it.
struct ChainActivation<'a> {
    locals: HashMap<String, Value>,
    parent: &'a dyn Activation,
}

impl<'a> Activation for ChainActivation<'a> {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.locals.get(name).cloned().or_else(|| self.parent.resolve(name))
    }

    fn unknown_patterns(&self) -> &[AttributePattern] {
        self.parent.unknown_patterns()
    }
}

/// A planned, immutable program. Safe to evaluate repeatedly (and, given a
/// thread-safe [`TypeProvider`] and activations confined to one thread each,
/// concurrently) against different activations.
#[derive(Debug)]
pub struct Program {
    root: Node,
}

pub fn plan(checked: &CheckedExpr) -> Program {
    let mut planner = Planner { checked };
    Program { root: planner.plan_node(&checked.expr) }
}

impl Program {
    pub fn eval(&self, activation: &dyn Activation, provider: &dyn TypeProvider) -> Value {
        let ctx = EvalContext { activation, provider, tracer: None, dispatcher: None };
        eval_node(&self.root, &ctx)
    }

    pub fn eval_with(&self, ctx: &EvalContext) -> Value {
        eval_node(&self.root, ctx)
    }
}

struct Planner<'a> {
    checked: &'a CheckedExpr,
}

impl<'a> Planner<'a> {
    fn plan_node(&mut self, expr: &Expr) -> Node {
        match &expr.kind {
            ExprKind::Literal(c) => Node::Const(expr.id, literal_value(c)),
            ExprKind::Ident(name) => self.plan_ident(expr.id, name),
            ExprKind::Select { test_only: true, operand, field, .. } => {
                let attr = self.plan_attr(operand);
                Node::Has(attr, field.clone())
            }
            ExprKind::Select { .. } => Node::Attr(self.plan_attr(expr)),
            ExprKind::Call { target: None, function, args } if function == "_[_]" || function == "_[?_]" => {
                Node::Attr(self.plan_attr(expr))
            }
            ExprKind::Call { target: None, function, args } if function == "_&&_" => {
                Node::And(expr.id, Box::new(self.plan_node(&args[0])), Box::new(self.plan_node(&args[1])))
            }
            ExprKind::Call { target: None, function, args } if function == "_||_" => {
                Node::Or(expr.id, Box::new(self.plan_node(&args[0])), Box::new(self.plan_node(&args[1])))
            }
            ExprKind::Call { target: None, function, args } if function == "_?_:_" => Node::Conditional(
                expr.id,
                Box::new(self.plan_node(&args[0])),
                Box::new(self.plan_node(&args[1])),
                Box::new(self.plan_node(&args[2])),
            ),
            ExprKind::Call { target, function, args } => Node::Call {
                id: expr.id,
                function: function.clone(),
                target: target.as_deref().map(|t| Box::new(self.plan_node(t))),
                args: args.iter().map(|a| self.plan_node(a)).collect(),
            },
            ExprKind::List { elements, optional_indices } => Node::List {
                id: expr.id,
                elements: elements.iter().map(|e| self.plan_node(e)).collect(),
                optional_indices: optional_indices.clone(),
            },
            ExprKind::Struct { type_name: None, entries } => Node::Map {
                id: expr.id,
                entries: entries
                    .iter()
                    .map(|e| {
                        let key = match &e.key {
                            StructEntryKey::Expr(k) => self.plan_node(k),
                            StructEntryKey::FieldName(f) => Node::Const(e.id, Value::string(f.clone())),
                        };
                        (key, self.plan_node(&e.value), e.optional)
                    })
                    .collect(),
            },
            ExprKind::Struct { type_name: Some(name), entries } => Node::Object {
                id: expr.id,
                type_name: name.clone(),
                entries: entries
                    .iter()
                    .map(|e| {
                        let field = match &e.key {
                            StructEntryKey::FieldName(f) => f.clone(),
                            StructEntryKey::Expr(_) => String::new(),
                        };
                        (field, self.plan_node(&e.value), e.optional)
                    })
                    .collect(),
            },
            ExprKind::Comprehension {
                iter_var,
                iter_var2,
                iter_range,
                accu_var,
                accu_init,
                loop_condition,
                loop_step,
                result,
            } => Node::Comprehension {
                id: expr.id,
                iter_var: iter_var.clone(),
                iter_var2: iter_var2.clone(),
                iter_range: Box::new(self.plan_node(iter_range)),
                accu_var: accu_var.clone(),
                accu_init: Box::new(self.plan_node(accu_init)),
                loop_condition: Box::new(self.plan_node(loop_condition)),
                loop_step: Box::new(self.plan_node(loop_step)),
                result: Box::new(self.plan_node(result)),
            },
        }
    }

    fn plan_ident(&mut self, id: ExprId, name: &str) -> Node {
        if let Some(reference) = self.checked.reference_map.get(&id) {
            if let Some(c) = &reference.constant {
                return Node::Const(id, c.clone());
            }
            if let Some(ty) = &reference.type_ref {
                return Node::Const(id, Value::Type(ty.clone()));
            }
            let resolved = reference.name.clone().unwrap_or_else(|| name.to_string());
            return Node::Attr(Attr { id, base: AttrBase::Name(resolved), qualifiers: Vec::new() });
        }
        Node::Attr(Attr { id, base: AttrBase::Name(name.to_string()), qualifiers: Vec::new() })
    }

    /// Collapse a `Select`/index chain rooted at `expr` into a single
    /// [`Attr`], recursing through the operand. Anything that isn't itself
    /// an attribute (a literal, a call, ...) becomes a `RelativeAttribute`
    /// root via [`AttrBase::Expr`].
    fn plan_attr(&mut self, expr: &Expr) -> Attr {
        match &expr.kind {
            ExprKind::Ident(name) => match self.plan_ident(expr.id, name) {
                Node::Attr(attr) => attr,
                other => Attr { id: expr.id, base: AttrBase::Expr(Box::new(other)), qualifiers: Vec::new() },
            },
            ExprKind::Select { test_only: false, operand, field, optional } => {
                let mut attr = self.plan_attr(operand);
                attr.qualifiers.push(Qualifier::Field(field.clone(), *optional));
                attr.id = expr.id;
                attr
            }
            ExprKind::Call { target: None, function, args } if function == "_[_]" || function == "_[?_]" => {
                let mut attr = self.plan_attr(&args[0]);
                let key = self.plan_node(&args[1]);
                attr.qualifiers.push(Qualifier::Index(Box::new(key), function == "_[?_]"));
                attr.id = expr.id;
                attr
            }
            _ => Attr { id: expr.id, base: AttrBase::Expr(Box::new(self.plan_node(expr))), qualifiers: Vec::new() },
        }
    }
}

fn literal_value(c: &Constant) -> Value {
    match c {
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Int(i) => Value::Int(*i),
        Constant::Uint(u) => Value::Uint(*u),
        Constant::Double(d) => Value::Double(*d),
        Constant::String(s) => Value::string(s.clone()),
        Constant::Bytes(b) => Value::bytes(b.clone()),
        Constant::Null => Value::Null,
    }
}

// ==================== evaluation ====================

fn eval_node(node: &Node, ctx: &EvalContext) -> Value {
    let value = eval_node_inner(node, ctx);
    if let Some(tracer) = ctx.tracer {
        tracer(node.id(), &value);
    }
    value
}

fn eval_node_inner(node: &Node, ctx: &EvalContext) -> Value {
    match node {
        Node::Const(_, v) => v.clone(),
        Node::Attr(attr) => eval_attr(attr, ctx).unwrap_or_else(|e| Value::Error(e)),
        Node::Has(attr, field) => eval_has(attr, field, ctx),
        Node::And(id, l, r) => with_id(*id, eval_and(l, r, ctx)),
        Node::Or(id, l, r) => with_id(*id, eval_or(l, r, ctx)),
        Node::Conditional(id, c, t, f) => with_id(*id, eval_conditional(c, t, f, ctx)),
        Node::Call { id, function, target, args } => with_id(*id, eval_call(function, target.as_deref(), args, ctx)),
        Node::List { id, elements, optional_indices } => with_id(*id, eval_list(elements, optional_indices, ctx)),
        Node::Map { id, entries } => with_id(*id, eval_map(entries, ctx)),
        Node::Object { id, type_name, entries } => with_id(*id, eval_object(type_name, entries, ctx)),
        Node::Comprehension {
            id,
            iter_var,
            iter_var2,
            iter_range,
            accu_var,
            accu_init,
            loop_condition,
            loop_step,
            result,
        } => with_id(*id, eval_comprehension(iter_var, iter_var2.as_deref(), iter_range, accu_var, accu_init, loop_condition, loop_step, result, ctx)),
    }
}

fn with_id(id: ExprId, v: Value) -> Value {
    match v {
        Value::Error(e) if e.id.is_none() => Value::Error(e.with_id(id)),
        other => other,
    }
}

/// Combine two operand results the way strict functions do: the first error
/// wins (left-to-right), otherwise unknowns union.
fn strict_combine(values: &[Value]) -> Option<Value> {
    if let Some(err) = values.iter().find(|v| v.is_error()) {
        return Some(err.clone());
    }
    let unknown_ids: Vec<u64> = values
        .iter()
        .filter_map(|v| match v {
            Value::Unknown(ids) => Some(ids.iter().copied()),
            _ => None,
        })
        .flatten()
        .collect();
    (!unknown_ids.is_empty()).then(|| Value::unknown(unknown_ids))
}

fn eval_and(l: &Node, r: &Node, ctx: &EvalContext) -> Value {
    let lv = eval_node(l, ctx);
    if matches!(lv, Value::Bool(false)) {
        return Value::Bool(false);
    }
    let rv = eval_node(r, ctx);
    if matches!(rv, Value::Bool(false)) {
        return Value::Bool(false);
    }
    match (&lv, &rv) {
        (Value::Bool(true), Value::Bool(true)) => Value::Bool(true),
        _ => strict_combine(&[lv.clone(), rv.clone()]).unwrap_or(lv),
    }
}

fn eval_or(l: &Node, r: &Node, ctx: &EvalContext) -> Value {
    let lv = eval_node(l, ctx);
    if matches!(lv, Value::Bool(true)) {
        return Value::Bool(true);
    }
    let rv = eval_node(r, ctx);
    if matches!(rv, Value::Bool(true)) {
        return Value::Bool(true);
    }
    match (&lv, &rv) {
        (Value::Bool(false), Value::Bool(false)) => Value::Bool(false),
        _ => strict_combine(&[lv.clone(), rv.clone()]).unwrap_or(lv),
    }
}

fn eval_conditional(c: &Node, t: &Node, f: &Node, ctx: &EvalContext) -> Value {
    match eval_node(c, ctx) {
        Value::Bool(true) => eval_node(t, ctx),
        Value::Bool(false) => eval_node(f, ctx),
        other => other,
    }
}

fn eval_call(function: &str, target: Option<&Node>, args: &[Node], ctx: &EvalContext) -> Value {
    let target_val = target.map(|t| eval_node(t, ctx));
    let arg_vals: Vec<Value> = args.iter().map(|a| eval_node(a, ctx)).collect();

    let mut all = Vec::new();
    if let Some(t) = &target_val {
        all.push(t.clone());
    }
    all.extend(arg_vals.iter().cloned());
    if let Some(combined) = strict_combine(&all) {
        return combined;
    }

    if let Some(dispatcher) = ctx.dispatcher {
        if let Some(result) = dispatcher(function, target_val.as_ref(), &arg_vals) {
            return result.unwrap_or_else(Value::error);
        }
    }

    match functions::call_builtin(function, target_val.as_ref(), &arg_vals) {
        Some(Ok(v)) => v,
        Some(Err(e)) => Value::error(e),
        None => Value::error(ErrorKind::UnknownFunction { name: function.to_string() }),
    }
}

fn eval_list(elements: &[Node], optional_indices: &[usize], ctx: &EvalContext) -> Value {
    let mut out = Vec::with_capacity(elements.len());
    for (i, e) in elements.iter().enumerate() {
        let v = eval_node(e, ctx);
        if v.is_error() || v.is_unknown() {
            return v;
        }
        if optional_indices.contains(&i) {
            match v {
                Value::Optional(opt) => {
                    if let Some(inner) = opt.as_ref() {
                        out.push(inner.clone());
                    }
                }
                other => out.push(other),
            }
        } else {
            out.push(v);
        }
    }
    Value::list(out)
}

fn eval_map(entries: &[(Node, Node, bool)], ctx: &EvalContext) -> Value {
    let mut out = HashMap::new();
    for (k, v, optional) in entries {
        let kv = eval_node(k, ctx);
        if kv.is_error() || kv.is_unknown() {
            return kv;
        }
        let vv = eval_node(v, ctx);
        if vv.is_error() || vv.is_unknown() {
            return vv;
        }
        let (kv, vv) = if *optional {
            match vv {
                Value::Optional(opt) => match opt.as_ref() {
                    Some(inner) => (kv, inner.clone()),
                    None => continue,
                },
                other => (kv, other),
            }
        } else {
            (kv, vv)
        };
        let key = match MapKey::from_value(&kv) {
            Ok(k) => k,
            Err(e) => return Value::Error(e),
        };
        if out.insert(key, vv).is_some() {
            return Value::error(ErrorKind::DuplicateKey { key: format!("{kv}") });
        }
    }
    Value::map(out)
}

fn eval_object(type_name: &str, entries: &[(String, Node, bool)], ctx: &EvalContext) -> Value {
    let mut fields = HashMap::new();
    for (name, v, optional) in entries {
        let vv = eval_node(v, ctx);
        if vv.is_error() || vv.is_unknown() {
            return vv;
        }
        let vv = if *optional {
            match vv {
                Value::Optional(opt) => match opt.as_ref() {
                    Some(inner) => inner.clone(),
                    None => continue,
                },
                other => other,
            }
        } else {
            vv
        };
        fields.insert(name.clone(), vv);
    }
    match ctx.provider.new_value(type_name, fields) {
        Ok(v) => v,
        Err(e) => Value::Error(e),
    }
}

#[allow(clippy::too_many_arguments)]
fn eval_comprehension(
    iter_var: &str,
    iter_var2: Option<&str>,
    iter_range: &Node,
    accu_var: &str,
    accu_init: &Node,
    loop_condition: &Node,
    loop_step: &Node,
    result: &Node,
    ctx: &EvalContext,
) -> Value {
    let range = eval_node(iter_range, ctx);
    if range.is_error() || range.is_unknown() {
        return range;
    }

    let items: Vec<(Value, Value)> = match &range {
        Value::List(items) => items.iter().enumerate().map(|(i, v)| (Value::Int(i as i64), v.clone())).collect(),
        Value::Map(entries) => entries.iter().map(|(k, v)| (k.clone().into_value(), v.clone())).collect(),
        other => return Value::error(ErrorKind::custom(format!("type {} is not iterable", other.type_of()))),
    };

    let mut accu = eval_node(accu_init, ctx);
    if accu.is_error() || accu.is_unknown() {
        return accu;
    }

    for (key, value) in items {
        let mut locals = HashMap::new();
        if let Some(v2) = iter_var2 {
            locals.insert(iter_var.to_string(), key);
            locals.insert(v2.to_string(), value);
        } else {
            locals.insert(iter_var.to_string(), value);
        }
        locals.insert(accu_var.to_string(), accu.clone());
        let child = ChainActivation { locals, parent: ctx.activation };
        let child_ctx = EvalContext { activation: &child, provider: ctx.provider, tracer: ctx.tracer, dispatcher: ctx.dispatcher };

        let cond = eval_node(loop_condition, &child_ctx);
        match cond {
            Value::Bool(true) => {}
            Value::Bool(false) => break,
            other => return other,
        }

        let step = eval_node(loop_step, &child_ctx);
        if step.is_error() || step.is_unknown() {
            return step;
        }
        accu = step;
    }

    let mut locals = HashMap::new();
    locals.insert(accu_var.to_string(), accu);
    let final_act = ChainActivation { locals, parent: ctx.activation };
    let final_ctx = EvalContext { activation: &final_act, provider: ctx.provider, tracer: ctx.tracer, dispatcher: ctx.dispatcher };
    eval_node(result, &final_ctx)
}

// ==================== attribute resolution ====================

fn eval_has(attr: &Attr, field: &str, ctx: &EvalContext) -> Value {
    match eval_attr_base(attr, ctx) {
        Ok((mut current, mut path)) => {
            let mut optional_seen = false;
            for q in &attr.qualifiers {
                match step_qualifier(&mut current, q, &mut path, attr, ctx, optional_seen) {
                    Ok(StepOutcome::Continue { optional }) => optional_seen |= optional,
                    Ok(StepOutcome::Stop) => return current,
                    Err(e) => return Value::Error(e),
                }
            }
            match current {
                Value::Error(_) | Value::Unknown(_) => current,
                other => match test_presence(&other, field, ctx) {
                    Ok(b) => Value::Bool(b),
                    Err(e) => Value::error(e).with_id_value(attr.id),
                },
            }
        }
        Err(v) => v,
    }
}

/// Resolve `attr`'s full qualifier chain to a concrete value, `Error`, or
/// `Unknown`, applying optional-chaining short-circuit and
/// `AttributePattern` matching along the way.
fn eval_attr(attr: &Attr, ctx: &EvalContext) -> Result<Value, EvalError> {
    let (mut current, mut path) = match eval_attr_base(attr, ctx) {
        Ok(pair) => pair,
        Err(v) => return Ok(v),
    };
    let mut optional_seen = false;
    for q in &attr.qualifiers {
        match step_qualifier(&mut current, q, &mut path, attr, ctx, optional_seen)? {
            StepOutcome::Continue { optional } => {
                optional_seen |= optional;
            }
            StepOutcome::Stop => return Ok(current),
        }
    }
    if optional_seen && !matches!(current, Value::Optional(_)) {
        Ok(Value::Optional(Rc::new(Some(current))))
    } else {
        Ok(current)
    }
}

fn eval_attr_base(attr: &Attr, ctx: &EvalContext) -> Result<(Value, Vec<String>), Value> {
    match &attr.base {
        AttrBase::Name(name) => match ctx.activation.resolve(name) {
            Some(v) => Ok((v, Vec::new())),
            None => {
                if ctx.activation.unknown_patterns().iter().any(|p| p.matches_prefix(name, &[])) {
                    Err(Value::unknown(vec![attr.id]))
                } else {
                    Err(Value::error(ErrorKind::NoSuchAttribute { name: name.clone() }).with_id_value(attr.id))
                }
            }
        },
        AttrBase::Expr(node) => {
            let v = eval_node(node, ctx);
            if v.is_error() || v.is_unknown() {
                Err(v)
            } else {
                Ok((v, Vec::new()))
            }
        }
    }
}

/// Outcome of applying one qualifier to an in-progress attribute resolution.
/// `Continue` carries whether that qualifier was itself optional (`.?field`
/// / `[?key]`), so the caller can decide whether the final value needs
/// wrapping in `Optional::Some`. `Stop` means `current` now holds a terminal
/// value (an `Error`, `Unknown`, or a short-circuited `Optional::None`) and
/// the caller should return immediately without consulting more qualifiers.
enum StepOutcome {
    Continue { optional: bool },
    Stop,
}

/// Apply one qualifier to `current` in place. `optional_so_far` is whether
/// any *earlier* qualifier in this chain was optional (`.?field`/`[?key]`) —
/// once that's true, a miss on a later, non-optional qualifier must also
/// short-circuit to `None` rather than error, since the chain as a whole is
/// already in "maybe absent" territory (spec scenario: `a.?b.c` with
/// `a = {b: {random: 'value'}}` must yield `None`, not `NoSuchKey` on `c`).
fn step_qualifier(
    current: &mut Value,
    q: &Qualifier,
    path: &mut Vec<String>,
    attr: &Attr,
    ctx: &EvalContext,
    optional_so_far: bool,
) -> Result<StepOutcome, EvalError> {
    if current.is_error() || current.is_unknown() {
        return Ok(StepOutcome::Stop);
    }
    if let Value::Optional(opt) = current {
        match opt.as_ref() {
            None => return Ok(StepOutcome::Stop),
            Some(inner) => *current = inner.clone(),
        }
    }

    enum Key {
        Field(String),
        Index(Value),
    }
    let (key, key_repr, optional) = match q {
        Qualifier::Field(name, optional) => (Key::Field(name.clone()), name.clone(), *optional),
        Qualifier::Index(key_node, optional) => {
            let key = eval_node(key_node, ctx);
            if key.is_error() || key.is_unknown() {
                *current = key;
                return Ok(StepOutcome::Stop);
            }
            let repr = format!("{key}");
            (Key::Index(key), repr, *optional)
        }
    };
    path.push(key_repr);

    if let AttrBase::Name(root) = &attr.base {
        if ctx.activation.unknown_patterns().iter().any(|p| p.matches_prefix(root, path)) {
            *current = Value::unknown(vec![attr.id]);
            return Ok(StepOutcome::Continue { optional });
        }
    }

    let result = match &key {
        Key::Field(name) => select_field(current, name, ctx),
        Key::Index(key) => index_value(current, key),
    };

    match result {
        Ok(v) => {
            *current = v;
            Ok(StepOutcome::Continue { optional })
        }
        Err(_) if optional || optional_so_far => {
            *current = Value::Optional(Rc::new(None));
            Ok(StepOutcome::Continue { optional: true })
        }
        Err(e) => Err(e.with_id(attr.id)),
    }
}

fn select_field(base: &Value, field: &str, ctx: &EvalContext) -> Result<Value, EvalError> {
    match base {
        Value::Map(m) => {
            let key = MapKey::String(Rc::from(field));
            m.get(&key).cloned().ok_or_else(|| EvalError::new(ErrorKind::NoSuchKey { key: field.to_string() }))
        }
        Value::Object(obj) => {
            if let Some(v) = obj.fields.get(field) {
                return Ok(v.clone());
            }
            match ctx.provider.find_field(&obj.type_name, field) {
                Some(info) => Ok(ctx.provider.zero_value(&info.ty)),
                None => Err(EvalError::new(ErrorKind::NoSuchField { type_name: obj.type_name.to_string(), field: field.to_string() })),
            }
        }
        other => Err(EvalError::new(ErrorKind::UnsupportedFieldSelection { ty: other.type_of().to_string() })),
    }
}

fn test_presence(base: &Value, field: &str, ctx: &EvalContext) -> Result<bool, ErrorKind> {
    match base {
        Value::Map(m) => Ok(m.contains_key(&MapKey::String(Rc::from(field)))),
        Value::Object(obj) => match ctx.provider.find_field(&obj.type_name, field) {
            Some(info) if info.explicit_presence => Ok(obj.fields.contains_key(field)),
            Some(info) => Ok(obj
                .fields
                .get(field)
                .map(|v| !crate::value::values_equal(v, &ctx.provider.zero_value(&info.ty)))
                .unwrap_or(false)),
            None => Err(ErrorKind::NoSuchField { type_name: obj.type_name.to_string(), field: field.to_string() }),
        },
        other => Err(ErrorKind::UnsupportedFieldSelection { ty: other.type_of().to_string() }),
    }
}

fn index_value(coll: &Value, key: &Value) -> Result<Value, EvalError> {
    match (coll, key) {
        (Value::List(items), Value::Int(i)) => {
            let idx = if *i < 0 { None } else { usize::try_from(*i).ok() };
            idx.and_then(|idx| items.get(idx).cloned())
                .ok_or_else(|| EvalError::new(ErrorKind::IndexOutOfBounds { index: *i }))
        }
        (Value::Map(entries), key) => {
            let map_key = MapKey::from_value(key)?;
            entries.get(&map_key).cloned().ok_or_else(|| EvalError::new(ErrorKind::NoSuchKey { key: format!("{key}") }))
        }
        _ => Err(EvalError::new(ErrorKind::NoSuchOverload { function: "_[_]".to_string(), args: coll.type_of().to_string() })),
    }
}

// Small helper trait so error construction at attribute-resolution call
// sites can stay terse — wrapping `Value::Error` in an id without a
// round-trip through `EvalError::with_id`.
trait WithIdValue {
    fn with_id_value(self, id: ExprId) -> Value;
}

impl WithIdValue for Value {
    fn with_id_value(self, id: ExprId) -> Value {
        match self {
            Value::Error(e) => Value::Error(e.with_id(id)),
            other => other,
        }
    }
}
