//! The standard function library: overload declarations for the checker and
//! their runtime implementations for the evaluator.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::env::{Env, Overload};
use crate::error::ErrorKind;
use crate::types::Type;
use crate::value::{partial_cmp, values_equal, Duration, MapKey, Timestamp, Value};

pub fn register_standard_overloads(env: &mut Env) {
    use self::Type::*;

    for (op, numeric_result) in [("_+_", true), ("_-_", true), ("_*_", true), ("_/_", true)] {
        for ty in [Int, Uint, Double] {
            env.declare_function(op, Overload::function(format!("{op}_{ty}"), vec![ty.clone(), ty.clone()], if numeric_result { ty } else { Bool }));
        }
    }
    env.declare_function("_+_", Overload::function("add_string", vec![String, String], String));
    env.declare_function("_+_", Overload::function("add_bytes", vec![Bytes, Bytes], Bytes));
    env.declare_function("_+_", Overload::function("add_list", vec![self::Type::list(Dyn), self::Type::list(Dyn)], self::Type::list(Dyn)));
    env.declare_function("_+_", Overload::function("add_duration", vec![Duration, Duration], Duration));
    env.declare_function("_+_", Overload::function("add_timestamp_duration", vec![Timestamp, Duration], Timestamp));
    env.declare_function("_-_", Overload::function("sub_duration", vec![Duration, Duration], Duration));
    env.declare_function("_-_", Overload::function("sub_timestamp_duration", vec![Timestamp, Duration], Timestamp));
    env.declare_function("_-_", Overload::function("sub_timestamp_timestamp", vec![Timestamp, Timestamp], Duration));
    env.declare_function("_%_", Overload::function("mod_int", vec![Int, Int], Int));
    env.declare_function("_%_", Overload::function("mod_uint", vec![Uint, Uint], Uint));
    env.declare_function("-_", Overload::function("neg_int", vec![Int], Int));
    env.declare_function("-_", Overload::function("neg_double", vec![Double], Double));
    env.declare_function("!_", Overload::function("logical_not", vec![Bool], Bool));
    env.declare_function("_&&_", Overload::function("logical_and", vec![Bool, Bool], Bool));
    env.declare_function("_||_", Overload::function("logical_or", vec![Bool, Bool], Bool));
    env.declare_function("_?_:_", Overload::function("conditional", vec![Bool, Dyn, Dyn], Dyn));
    env.declare_function("@not_strictly_false", Overload::function("not_strictly_false", vec![Bool], Bool));

    for op in ["_==_", "_!=_", "_<_", "_<=_", "_>_", "_>=_"] {
        env.declare_function(op, Overload::function(op, vec![Dyn, Dyn], Bool));
    }
    env.declare_function("@in", Overload::function("in_list", vec![Dyn, self::Type::list(Dyn)], Bool));
    env.declare_function("@in", Overload::function("in_map", vec![Dyn, self::Type::map(Dyn, Dyn)], Bool));

    env.declare_function("_[_]", Overload::function("index_list", vec![self::Type::list(Dyn), Int], Dyn));
    env.declare_function("_[_]", Overload::function("index_map", vec![self::Type::map(Dyn, Dyn), Dyn], Dyn));
    env.declare_function("_[?_]", Overload::function("opt_index", vec![Dyn, Dyn], self::Type::optional(Dyn)));

    env.declare_function("size", Overload::function("size_string", vec![String], Int));
    env.declare_function("size", Overload::function("size_bytes", vec![Bytes], Int));
    env.declare_function("size", Overload::function("size_list", vec![self::Type::list(Dyn)], Int));
    env.declare_function("size", Overload::function("size_map", vec![self::Type::map(Dyn, Dyn)], Int));
    env.declare_function("size", Overload::method("size_string_m", vec![String], Int));
    env.declare_function("size", Overload::method("size_list_m", vec![self::Type::list(Dyn)], Int));

    env.declare_function("contains", Overload::method("string_contains", vec![String, String], Bool));
    env.declare_function("startsWith", Overload::method("string_starts_with", vec![String, String], Bool));
    env.declare_function("endsWith", Overload::method("string_ends_with", vec![String, String], Bool));
    env.declare_function("matches", Overload::method("string_matches", vec![String, String], Bool));
    env.declare_function("matches", Overload::function("matches_fn", vec![String, String], Bool));

    for (name, result) in [("int", Int), ("uint", Uint), ("double", Double), ("string", String), ("bytes", Bytes), ("bool", Bool)] {
        env.declare_function(name, Overload::function(format!("to_{name}"), vec![Dyn], result));
    }
    env.declare_function("type", Overload::function("type_of", vec![Dyn], self::Type::Type(Box::new(Dyn))));
    env.declare_function("has", Overload::function("has_marker", vec![Dyn], Bool));

    env.declare_function("duration", Overload::function("make_duration", vec![String], Duration));
    env.declare_function("timestamp", Overload::function("make_timestamp", vec![String], Timestamp));

    // Duration getters report total unit counts of the whole span (a 90000s
    // duration's getHours() is 25), never a timezone-dependent calendar
    // breakdown, so they take no timezone argument.
    for (name, id) in [("getHours", "duration_hours"), ("getMinutes", "duration_minutes"), ("getSeconds", "duration_seconds"), ("getMilliseconds", "duration_millis")] {
        env.declare_function(name, Overload::method(id, vec![Duration], Int));
    }

    // Timestamp getters report calendar components (0-based month/day-of-month/
    // day-of-week/day-of-year; Sunday = 0), each with a same-named overload
    // taking a fixed UTC-offset timezone string ("Z"/"UTC"/""/"+HH:MM"/"-HH:MM").
    for (name, (id, id_tz)) in [
        ("getFullYear", ("timestamp_full_year", "timestamp_full_year_tz")),
        ("getMonth", ("timestamp_month", "timestamp_month_tz")),
        ("getDayOfMonth", ("timestamp_day_of_month", "timestamp_day_of_month_tz")),
        ("getDayOfWeek", ("timestamp_day_of_week", "timestamp_day_of_week_tz")),
        ("getDayOfYear", ("timestamp_day_of_year", "timestamp_day_of_year_tz")),
        ("getHours", ("timestamp_hours", "timestamp_hours_tz")),
        ("getMinutes", ("timestamp_minutes", "timestamp_minutes_tz")),
        ("getSeconds", ("timestamp_seconds", "timestamp_seconds_tz")),
        ("getMilliseconds", ("timestamp_millis", "timestamp_millis_tz")),
    ] {
        env.declare_function(name, Overload::method(id, vec![Timestamp], Int));
        env.declare_function(name, Overload::method(id_tz, vec![Timestamp, String], Int));
    }

    // The optional-values library. `optional.of`/`optional.none` are parsed
    // as free functions (see
    // cel-parser's postfix handling of the bare `optional` identifier); the
    // rest are ordinary methods on an `optional(T)` receiver.
    env.declare_function("optional.of", Overload::function("optional_of", vec![Dyn], self::Type::optional(Dyn)));
    env.declare_function("optional.none", Overload::function("optional_none", vec![], self::Type::optional(Dyn)));
    env.declare_function("value", Overload::method("optional_value", vec![self::Type::optional(Dyn)], Dyn));
    env.declare_function("hasValue", Overload::method("optional_has_value", vec![self::Type::optional(Dyn)], Bool));
    env.declare_function("or", Overload::method("optional_or", vec![self::Type::optional(Dyn), self::Type::optional(Dyn)], self::Type::optional(Dyn)));
    env.declare_function("orValue", Overload::method("optional_or_value", vec![self::Type::optional(Dyn), Dyn], Dyn));
}

/// Dispatch a builtin call. `target` is `Some` for `x.f(args)` method
/// syntax. Returns `None` when no builtin matches `function`, letting the
/// evaluator fall back to a `NoSuchOverload`/`UnknownFunction` error.
pub fn call_builtin(function: &str, target: Option<&Value>, args: &[Value]) -> Option<Result<Value, ErrorKind>> {
    match (function, target, args) {
        ("_+_", None, [a, b]) => Some(add(a, b)),
        ("_-_", None, [a, b]) => Some(sub(a, b)),
        ("_*_", None, [a, b]) => Some(mul(a, b)),
        ("_/_", None, [a, b]) => Some(div(a, b)),
        ("_%_", None, [a, b]) => Some(rem(a, b)),
        ("-_", None, [a]) => Some(neg(a)),
        ("!_", None, [Value::Bool(b)]) => Some(Ok(Value::Bool(!b))),
        ("@not_strictly_false", None, [v]) => Some(Ok(Value::Bool(!matches!(v, Value::Bool(false))))),
        ("_==_", None, [a, b]) => Some(Ok(Value::Bool(values_equal(a, b)))),
        ("_!=_", None, [a, b]) => Some(Ok(Value::Bool(!values_equal(a, b)))),
        ("_<_", None, [a, b]) => Some(compare(a, b, |o| o.is_lt())),
        ("_<=_", None, [a, b]) => Some(compare(a, b, |o| o.is_le())),
        ("_>_", None, [a, b]) => Some(compare(a, b, |o| o.is_gt())),
        ("_>=_", None, [a, b]) => Some(compare(a, b, |o| o.is_ge())),
        ("@in", None, [needle, haystack]) => Some(contains_value(haystack, needle)),
        ("_[_]", None, [coll, key]) => Some(index(coll, key)),
        ("_[?_]", None, [coll, key]) => Some(Ok(match index(coll, key) {
            Ok(v) => Value::Optional(Rc::new(Some(v))),
            Err(_) => Value::Optional(Rc::new(None)),
        })),
        ("size", Some(v), []) => Some(size_of(v)),
        ("size", None, [v]) => Some(size_of(v)),
        ("contains", Some(Value::String(s)), [Value::String(needle)]) => Some(Ok(Value::Bool(s.contains(needle.as_ref())))),
        ("startsWith", Some(Value::String(s)), [Value::String(prefix)]) => Some(Ok(Value::Bool(s.starts_with(prefix.as_ref())))),
        ("endsWith", Some(Value::String(s)), [Value::String(suffix)]) => Some(Ok(Value::Bool(s.ends_with(suffix.as_ref())))),
        ("matches", Some(Value::String(s)), [Value::String(pattern)]) => Some(regex_matches(s, pattern)),
        ("matches", None, [Value::String(s), Value::String(pattern)]) => Some(regex_matches(s, pattern)),
        ("int", None, [v]) => Some(to_int(v)),
        ("uint", None, [v]) => Some(to_uint(v)),
        ("double", None, [v]) => Some(to_double(v)),
        ("string", None, [v]) => Some(to_string_value(v)),
        ("bytes", None, [v]) => Some(to_bytes(v)),
        ("bool", None, [v]) => Some(to_bool(v)),
        ("type", None, [v]) => Some(Ok(Value::Type(v.type_of()))),
        ("duration", None, [Value::String(s)]) => Some(parse_duration(s)),
        ("timestamp", None, [Value::String(s)]) => Some(parse_timestamp(s)),

        ("getHours", Some(Value::Duration(d)), []) => Some(Ok(Value::Int(d.seconds / 3600))),
        ("getMinutes", Some(Value::Duration(d)), []) => Some(Ok(Value::Int(d.seconds / 60))),
        ("getSeconds", Some(Value::Duration(d)), []) => Some(Ok(Value::Int(d.seconds))),
        ("getMilliseconds", Some(Value::Duration(d)), []) => Some(Ok(Value::Int(d.seconds * 1000 + (d.nanos as i64) / 1_000_000))),

        ("getFullYear", Some(Value::Timestamp(t)), rest) => Some(timestamp_component(t, rest, |c| c.year)),
        ("getMonth", Some(Value::Timestamp(t)), rest) => Some(timestamp_component(t, rest, |c| c.month)),
        ("getDayOfMonth", Some(Value::Timestamp(t)), rest) => Some(timestamp_component(t, rest, |c| c.day_of_month)),
        ("getDayOfWeek", Some(Value::Timestamp(t)), rest) => Some(timestamp_component(t, rest, |c| c.day_of_week)),
        ("getDayOfYear", Some(Value::Timestamp(t)), rest) => Some(timestamp_component(t, rest, |c| c.day_of_year)),
        ("getHours", Some(Value::Timestamp(t)), rest) => Some(timestamp_component(t, rest, |c| c.hour)),
        ("getMinutes", Some(Value::Timestamp(t)), rest) => Some(timestamp_component(t, rest, |c| c.minute)),
        ("getSeconds", Some(Value::Timestamp(t)), rest) => Some(timestamp_component(t, rest, |c| c.second)),
        ("getMilliseconds", Some(Value::Timestamp(t)), rest) => Some(timestamp_millis(t, rest)),

        ("optional.of", None, [v]) => Some(Ok(Value::Optional(Rc::new(Some(v.clone()))))),
        ("optional.none", None, []) => Some(Ok(Value::Optional(Rc::new(None)))),
        ("value", Some(Value::Optional(opt)), []) => Some(match opt.as_ref() {
            Some(v) => Ok(v.clone()),
            None => Err(ErrorKind::custom("value() called on an absent optional")),
        }),
        ("hasValue", Some(Value::Optional(opt)), []) => Some(Ok(Value::Bool(opt.is_some()))),
        ("or", Some(Value::Optional(a)), [Value::Optional(b)]) => Some(Ok(Value::Optional(if a.is_some() { a.clone() } else { b.clone() }))),
        ("orValue", Some(Value::Optional(a)), [v]) => Some(Ok(match a.as_ref() {
            Some(x) => x.clone(),
            None => v.clone(),
        })),
        _ => None,
    }
}

fn numeric_error(function: &str, a: &Value, b: &Value) -> ErrorKind {
    ErrorKind::NoSuchOverload { function: function.to_string(), args: format!("{}, {}", a.type_of(), b.type_of()) }
}

fn add(a: &Value, b: &Value) -> Result<Value, ErrorKind> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.checked_add(*y).map(Value::Int).ok_or(ErrorKind::Overflow),
        (Value::Uint(x), Value::Uint(y)) => x.checked_add(*y).map(Value::Uint).ok_or(ErrorKind::Overflow),
        (Value::Double(x), Value::Double(y)) => Ok(Value::Double(x + y)),
        (Value::String(x), Value::String(y)) => Ok(Value::string(format!("{x}{y}"))),
        (Value::Bytes(x), Value::Bytes(y)) => {
            let mut out = x.to_vec();
            out.extend_from_slice(y);
            Ok(Value::bytes(out))
        }
        (Value::List(x), Value::List(y)) => {
            let mut out = x.as_ref().clone();
            out.extend(y.iter().cloned());
            Ok(Value::list(out))
        }
        (Value::Duration(x), Value::Duration(y)) => Ok(Value::Duration(add_duration(*x, *y))),
        (Value::Timestamp(x), Value::Duration(y)) => Ok(Value::Timestamp(Timestamp { seconds: x.seconds + y.seconds, nanos: x.nanos + y.nanos })),
        _ => Err(numeric_error("_+_", a, b)),
    }
}

fn sub(a: &Value, b: &Value) -> Result<Value, ErrorKind> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.checked_sub(*y).map(Value::Int).ok_or(ErrorKind::Overflow),
        (Value::Uint(x), Value::Uint(y)) => x.checked_sub(*y).map(Value::Uint).ok_or(ErrorKind::Overflow),
        (Value::Double(x), Value::Double(y)) => Ok(Value::Double(x - y)),
        (Value::Duration(x), Value::Duration(y)) => Ok(Value::Duration(Duration { seconds: x.seconds - y.seconds, nanos: x.nanos - y.nanos })),
        (Value::Timestamp(x), Value::Duration(y)) => Ok(Value::Timestamp(Timestamp { seconds: x.seconds - y.seconds, nanos: x.nanos - y.nanos })),
        (Value::Timestamp(x), Value::Timestamp(y)) => Ok(Value::Duration(Duration { seconds: x.seconds - y.seconds, nanos: x.nanos - y.nanos })),
        _ => Err(numeric_error("_-_", a, b)),
    }
}

fn mul(a: &Value, b: &Value) -> Result<Value, ErrorKind> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.checked_mul(*y).map(Value::Int).ok_or(ErrorKind::Overflow),
        (Value::Uint(x), Value::Uint(y)) => x.checked_mul(*y).map(Value::Uint).ok_or(ErrorKind::Overflow),
        (Value::Double(x), Value::Double(y)) => Ok(Value::Double(x * y)),
        _ => Err(numeric_error("_*_", a, b)),
    }
}

fn div(a: &Value, b: &Value) -> Result<Value, ErrorKind> {
    match (a, b) {
        (Value::Int(_), Value::Int(0)) => Err(ErrorKind::DivideByZero),
        (Value::Int(x), Value::Int(y)) => x.checked_div(*y).map(Value::Int).ok_or(ErrorKind::Overflow),
        (Value::Uint(_), Value::Uint(0)) => Err(ErrorKind::DivideByZero),
        (Value::Uint(x), Value::Uint(y)) => Ok(Value::Uint(x / y)),
        (Value::Double(x), Value::Double(y)) => Ok(Value::Double(x / y)),
        _ => Err(numeric_error("_/_", a, b)),
    }
}

fn rem(a: &Value, b: &Value) -> Result<Value, ErrorKind> {
    match (a, b) {
        (Value::Int(_), Value::Int(0)) => Err(ErrorKind::ModulusByZero),
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x % y)),
        (Value::Uint(_), Value::Uint(0)) => Err(ErrorKind::ModulusByZero),
        (Value::Uint(x), Value::Uint(y)) => Ok(Value::Uint(x % y)),
        _ => Err(numeric_error("_%_", a, b)),
    }
}

fn neg(a: &Value) -> Result<Value, ErrorKind> {
    match a {
        Value::Int(x) => x.checked_neg().map(Value::Int).ok_or(ErrorKind::Overflow),
        Value::Double(x) => Ok(Value::Double(-x)),
        other => Err(ErrorKind::NoSuchOverload { function: "-_".to_string(), args: other.type_of().to_string() }),
    }
}

fn add_duration(a: Duration, b: Duration) -> Duration {
    Duration { seconds: a.seconds + b.seconds, nanos: a.nanos + b.nanos }
}

fn compare(a: &Value, b: &Value, pred: impl Fn(std::cmp::Ordering) -> bool) -> Result<Value, ErrorKind> {
    match partial_cmp(a, b) {
        Some(ordering) => Ok(Value::Bool(pred(ordering))),
        None => Err(ErrorKind::NoSuchOverload { function: "comparison".to_string(), args: format!("{}, {}", a.type_of(), b.type_of()) }),
    }
}

fn contains_value(haystack: &Value, needle: &Value) -> Result<Value, ErrorKind> {
    match haystack {
        Value::List(items) => Ok(Value::Bool(items.iter().any(|v| values_equal(v, needle)))),
        Value::Map(entries) => {
            let key = MapKey::from_value(needle).map_err(|e| (*e.kind).clone())?;
            Ok(Value::Bool(entries.contains_key(&key)))
        }
        Value::String(s) => match needle {
            Value::String(n) => Ok(Value::Bool(s.contains(n.as_ref()))),
            _ => Err(ErrorKind::NoSuchOverload { function: "@in".to_string(), args: haystack.type_of().to_string() }),
        },
        other => Err(ErrorKind::NoSuchOverload { function: "@in".to_string(), args: other.type_of().to_string() }),
    }
}

fn index(coll: &Value, key: &Value) -> Result<Value, ErrorKind> {
    match (coll, key) {
        (Value::List(items), Value::Int(i)) => {
            let idx = if *i < 0 { None } else { usize::try_from(*i).ok() };
            idx.and_then(|idx| items.get(idx).cloned()).ok_or(ErrorKind::IndexOutOfBounds { index: *i })
        }
        (Value::Map(entries), key) => {
            let map_key = MapKey::from_value(key).map_err(|e| (*e.kind).clone())?;
            entries.get(&map_key).cloned().ok_or_else(|| ErrorKind::NoSuchKey { key: format!("{key}") })
        }
        _ => Err(ErrorKind::NoSuchOverload { function: "_[_]".to_string(), args: coll.type_of().to_string() }),
    }
}

fn size_of(v: &Value) -> Result<Value, ErrorKind> {
    match v {
        Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::Bytes(b) => Ok(Value::Int(b.len() as i64)),
        Value::List(items) => Ok(Value::Int(items.len() as i64)),
        Value::Map(entries) => Ok(Value::Int(entries.len() as i64)),
        other => Err(ErrorKind::NoSuchOverload { function: "size".to_string(), args: other.type_of().to_string() }),
    }
}

thread_local! {
    /// `matches()` patterns are arbitrary runtime strings, unlike the fixed
    /// duration/timestamp grammars below, so they're cached behind a
    /// pattern-keyed table instead of a single `Lazy<Regex>`.
    static REGEX_CACHE: RefCell<HashMap<String, Regex>> = RefCell::new(HashMap::new());
}

fn regex_matches(s: &str, pattern: &str) -> Result<Value, ErrorKind> {
    REGEX_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        if !cache.contains_key(pattern) {
            let re = Regex::new(pattern).map_err(|e| ErrorKind::custom(format!("invalid regex '{pattern}': {e}")))?;
            cache.insert(pattern.to_string(), re);
        }
        Ok(Value::Bool(cache[pattern].is_match(s)))
    })
}

fn to_int(v: &Value) -> Result<Value, ErrorKind> {
    match v {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Uint(u) => i64::try_from(*u).map(Value::Int).map_err(|_| ErrorKind::Overflow),
        Value::Double(d) if d.is_finite() && *d >= i64::MIN as f64 && *d <= i64::MAX as f64 => Ok(Value::Int(*d as i64)),
        Value::String(s) => s.parse::<i64>().map(Value::Int).map_err(|_| conversion_error(v, "int")),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        _ => Err(conversion_error(v, "int")),
    }
}

fn to_uint(v: &Value) -> Result<Value, ErrorKind> {
    match v {
        Value::Uint(u) => Ok(Value::Uint(*u)),
        Value::Int(i) => u64::try_from(*i).map(Value::Uint).map_err(|_| ErrorKind::Overflow),
        Value::Double(d) if d.is_finite() && *d >= 0.0 && *d <= u64::MAX as f64 => Ok(Value::Uint(*d as u64)),
        Value::String(s) => s.parse::<u64>().map(Value::Uint).map_err(|_| conversion_error(v, "uint")),
        _ => Err(conversion_error(v, "uint")),
    }
}

fn to_double(v: &Value) -> Result<Value, ErrorKind> {
    match v {
        Value::Double(d) => Ok(Value::Double(*d)),
        Value::Int(i) => Ok(Value::Double(*i as f64)),
        Value::Uint(u) => Ok(Value::Double(*u as f64)),
        Value::String(s) => s.parse::<f64>().map(Value::Double).map_err(|_| conversion_error(v, "double")),
        _ => Err(conversion_error(v, "double")),
    }
}

fn to_string_value(v: &Value) -> Result<Value, ErrorKind> {
    match v {
        Value::String(s) => Ok(Value::String(s.clone())),
        Value::Bytes(b) => String::from_utf8(b.to_vec()).map(Value::string).map_err(|_| conversion_error(v, "string")),
        other => Ok(Value::string(other.to_string())),
    }
}

fn to_bytes(v: &Value) -> Result<Value, ErrorKind> {
    match v {
        Value::Bytes(b) => Ok(Value::Bytes(b.clone())),
        Value::String(s) => Ok(Value::bytes(s.as_bytes().to_vec())),
        _ => Err(conversion_error(v, "bytes")),
    }
}

fn to_bool(v: &Value) -> Result<Value, ErrorKind> {
    match v {
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::String(s) => match s.as_ref() {
            "true" | "True" | "TRUE" => Ok(Value::Bool(true)),
            "false" | "False" | "FALSE" => Ok(Value::Bool(false)),
            _ => Err(conversion_error(v, "bool")),
        },
        _ => Err(conversion_error(v, "bool")),
    }
}

fn conversion_error(v: &Value, to: &str) -> ErrorKind {
    ErrorKind::UnsupportedConversion { from: v.type_of().to_string(), to: to.to_string() }
}

/// `<seconds>s` or `<seconds>.<fraction>s`; the only duration string form
/// this crate accepts, matching the subset the planner needs for constant
/// folding rather than the full protobuf duration grammar.
static DURATION_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(-?\d+)(?:\.(\d{1,9}))?s$").unwrap());

fn parse_duration(s: &str) -> Result<Value, ErrorKind> {
    let caps = DURATION_PATTERN.captures(s).ok_or_else(|| ErrorKind::custom(format!("invalid duration: {s}")))?;
    let seconds: i64 = caps[1].parse().map_err(|_| ErrorKind::custom(format!("invalid duration: {s}")))?;
    let nanos = caps
        .get(2)
        .map(|m| format!("{:0<9}", m.as_str()).parse::<i32>().unwrap_or(0))
        .unwrap_or(0);
    Ok(Value::Duration(Duration { seconds, nanos: if seconds < 0 { -nanos } else { nanos } }))
}

fn parse_timestamp(s: &str) -> Result<Value, ErrorKind> {
    // RFC3339 without timezone offsets beyond `Z`: `YYYY-MM-DDTHH:MM:SS[.fff]Z`.
    static PATTERN: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})T(\d{2}):(\d{2}):(\d{2})(?:\.(\d+))?Z$").unwrap());
    let caps = PATTERN.captures(s).ok_or_else(|| ErrorKind::custom(format!("invalid timestamp: {s}")))?;
    let (y, mo, d, h, mi, se): (i64, i64, i64, i64, i64, i64) = (
        caps[1].parse().unwrap(),
        caps[2].parse().unwrap(),
        caps[3].parse().unwrap(),
        caps[4].parse().unwrap(),
        caps[5].parse().unwrap(),
        caps[6].parse().unwrap(),
    );
    let nanos = caps.get(7).map(|m| format!("{:0<9}", m.as_str())[..9].parse::<i32>().unwrap_or(0)).unwrap_or(0);
    let days = days_since_epoch(y, mo, d);
    let seconds = days * 86_400 + h * 3600 + mi * 60 + se;
    Ok(Value::Timestamp(Timestamp { seconds, nanos }))
}

/// Proleptic Gregorian day count since 1970-01-01, used only by
/// [`parse_timestamp`] — no calendar-aware arithmetic beyond this.
fn days_since_epoch(year: i64, month: i64, day: i64) -> i64 {
    let a = (14 - month) / 12;
    let y = year + 4800 - a;
    let m = month + 12 * a - 3;
    let jdn = day + (153 * m + 2) / 5 + 365 * y + y / 4 - y / 100 + y / 400 - 32045;
    jdn - 2440588
}

/// Inverse of [`days_since_epoch`] (Fliegel & Van Flandern), returning
/// 1-based `(year, month, day)`.
fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let jdn = days + 2440588;
    let l = jdn + 68569;
    let n = (4 * l) / 146097;
    let l = l - (146097 * n + 3) / 4;
    let i = (4000 * (l + 1)) / 1461001;
    let l = l - (1461 * i) / 4 + 31;
    let j = (80 * l) / 2447;
    let day = l - (2447 * j) / 80;
    let l = j / 11;
    let month = j + 2 - 12 * l;
    let year = 100 * (n - 49) + i + l;
    (year, month, day)
}

/// The calendar components of a `Timestamp`, at a fixed UTC offset.
struct CivilTime {
    year: i64,
    /// 0-based (January = 0), matching CEL's `getMonth()`.
    month: i64,
    day_of_month: i64,
    /// 0-based, Sunday = 0.
    day_of_week: i64,
    /// 0-based day count within the year.
    day_of_year: i64,
    hour: i64,
    minute: i64,
    second: i64,
}

/// `""`/`"UTC"`/`"Z"` or a fixed `+HH:MM`/`-HH:MM` offset. This crate carries
/// no IANA timezone database, so DST-aware and named-zone offsets beyond a
/// fixed UTC shift aren't supported (see DESIGN.md).
static TZ_OFFSET_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([+-])(\d{2}):(\d{2})$").unwrap());

fn parse_tz_offset(s: &str) -> Result<i64, ErrorKind> {
    match s {
        "" | "UTC" | "Z" => Ok(0),
        _ => {
            let caps = TZ_OFFSET_PATTERN
                .captures(s)
                .ok_or_else(|| ErrorKind::custom(format!("unsupported timezone '{s}': only fixed UTC offsets are supported")))?;
            let sign = if &caps[1] == "-" { -1 } else { 1 };
            let hours: i64 = caps[2].parse().unwrap();
            let minutes: i64 = caps[3].parse().unwrap();
            Ok(sign * (hours * 3600 + minutes * 60))
        }
    }
}

fn civil_time(t: Timestamp, tz: Option<&str>) -> Result<CivilTime, ErrorKind> {
    let offset = tz.map(parse_tz_offset).transpose()?.unwrap_or(0);
    let local_seconds = t.seconds + offset;
    let days = local_seconds.div_euclid(86_400);
    let seconds_of_day = local_seconds.rem_euclid(86_400);
    let (year, month, day_of_month) = civil_from_days(days);
    // 1970-01-01 (days = 0) was a Thursday.
    let day_of_week = (days.rem_euclid(7) + 4) % 7;
    let day_of_year = days - days_since_epoch(year, 1, 1);
    Ok(CivilTime {
        year,
        month: month - 1,
        day_of_month,
        day_of_week,
        day_of_year,
        hour: seconds_of_day / 3600,
        minute: (seconds_of_day % 3600) / 60,
        second: seconds_of_day % 60,
    })
}

fn timestamp_tz_arg(args: &[Value]) -> Result<Option<&str>, ErrorKind> {
    match args {
        [] => Ok(None),
        [Value::String(s)] => Ok(Some(s.as_ref())),
        _ => Err(ErrorKind::custom("expected an optional timezone string argument")),
    }
}

fn timestamp_component(t: &Timestamp, args: &[Value], get: impl Fn(&CivilTime) -> i64) -> Result<Value, ErrorKind> {
    let tz = timestamp_tz_arg(args)?;
    civil_time(*t, tz).map(|c| Value::Int(get(&c)))
}

fn timestamp_millis(t: &Timestamp, args: &[Value]) -> Result<Value, ErrorKind> {
    timestamp_tz_arg(args)?;
    Ok(Value::Int((t.nanos as i64) / 1_000_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_int(result: Option<Result<Value, ErrorKind>>) -> i64 {
        match result.expect("builtin should dispatch").expect("builtin should succeed") {
            Value::Int(i) => i,
            other => panic!("expected Int, got {other:?}"),
        }
    }

    fn as_bool(result: Option<Result<Value, ErrorKind>>) -> bool {
        match result.expect("builtin should dispatch").expect("builtin should succeed") {
            Value::Bool(b) => b,
            other => panic!("expected Bool, got {other:?}"),
        }
    }

    fn parsed_timestamp(s: &str) -> Value {
        match parse_timestamp(s).unwrap() {
            v @ Value::Timestamp(_) => v,
            other => panic!("expected Timestamp, got {other:?}"),
        }
    }

    #[test]
    fn timestamp_get_hours_matches_noon_utc() {
        let noon = parsed_timestamp("2023-06-15T12:00:00Z");
        assert_eq!(as_int(call_builtin("getHours", Some(&noon), &[])), 12);
    }

    #[test]
    fn timestamp_get_hours_honors_fixed_utc_offset() {
        let noon = parsed_timestamp("2023-06-15T12:00:00Z");
        let tz = Value::string("-08:00");
        assert_eq!(as_int(call_builtin("getHours", Some(&noon), std::slice::from_ref(&tz))), 4);
    }

    #[test]
    fn timestamp_calendar_components_round_trip_a_known_date() {
        // 2023-06-15 is a Thursday, the 166th day of a non-leap year (0-based 165).
        let v = parsed_timestamp("2023-06-15T00:00:00Z");
        assert_eq!(as_int(call_builtin("getFullYear", Some(&v), &[])), 2023);
        assert_eq!(as_int(call_builtin("getMonth", Some(&v), &[])), 5);
        assert_eq!(as_int(call_builtin("getDayOfMonth", Some(&v), &[])), 15);
        assert_eq!(as_int(call_builtin("getDayOfWeek", Some(&v), &[])), 4);
        assert_eq!(as_int(call_builtin("getDayOfYear", Some(&v), &[])), 165);
    }

    #[test]
    fn duration_getters_report_total_unit_counts_not_calendar_breakdown() {
        let d = Value::Duration(Duration { seconds: 90_000, nanos: 0 });
        assert_eq!(as_int(call_builtin("getHours", Some(&d), &[])), 25);
        assert_eq!(as_int(call_builtin("getMinutes", Some(&d), &[])), 1500);
    }

    #[test]
    fn optional_of_and_value_round_trip() {
        let opt = call_builtin("optional.of", None, &[Value::Int(7)]).unwrap().unwrap();
        assert!(matches!(&opt, Value::Optional(inner) if inner.is_some()));
        assert_eq!(as_int(call_builtin("value", Some(&opt), &[])), 7);
        assert!(as_bool(call_builtin("hasValue", Some(&opt), &[])));
    }

    #[test]
    fn optional_none_value_is_an_error() {
        let none = call_builtin("optional.none", None, &[]).unwrap().unwrap();
        assert!(!as_bool(call_builtin("hasValue", Some(&none), &[])));
        assert!(call_builtin("value", Some(&none), &[]).unwrap().is_err());
    }

    #[test]
    fn optional_or_value_falls_back_when_absent() {
        let none = Value::Optional(Rc::new(None));
        let fallback = Value::Int(42);
        assert_eq!(as_int(call_builtin("orValue", Some(&none), std::slice::from_ref(&fallback))), 42);
        let some = Value::Optional(Rc::new(Some(Value::Int(1))));
        assert_eq!(as_int(call_builtin("orValue", Some(&some), std::slice::from_ref(&fallback))), 1);
    }

    #[test]
    fn optional_or_prefers_the_left_when_present() {
        let some = Value::Optional(Rc::new(Some(Value::Int(1))));
        let none = Value::Optional(Rc::new(None));
        assert_eq!(as_int(call_builtin("value", Some(&call_builtin("or", Some(&none), std::slice::from_ref(&some)).unwrap().unwrap()), &[])), 1);
        assert_eq!(as_int(call_builtin("value", Some(&call_builtin("or", Some(&some), std::slice::from_ref(&none)).unwrap().unwrap()), &[])), 1);
    }

    #[test]
    fn regex_matches_caches_compiled_patterns_across_calls() {
        assert!(as_bool(Some(regex_matches("hello", "^h.*o$"))));
        assert!(!as_bool(Some(regex_matches("goodbye", "^h.*o$"))));
        REGEX_CACHE.with(|cache| assert!(cache.borrow().contains_key("^h.*o$")));
    }

    #[test]
    fn size_dispatches_for_both_method_and_free_function_syntax() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(as_int(call_builtin("size", Some(&list), &[])), 2);
        assert_eq!(as_int(call_builtin("size", None, std::slice::from_ref(&list))), 2);
    }

    #[test]
    fn parse_tz_offset_rejects_named_zones() {
        assert!(parse_tz_offset("America/Los_Angeles").is_err());
        assert_eq!(parse_tz_offset("+05:30").unwrap(), 5 * 3600 + 30 * 60);
        assert_eq!(parse_tz_offset("-08:00").unwrap(), -8 * 3600);
        assert_eq!(parse_tz_offset("Z").unwrap(), 0);
    }

    #[test]
    fn civil_from_days_is_the_inverse_of_days_since_epoch() {
        for (y, m, d) in [(1970, 1, 1), (2000, 2, 29), (2023, 6, 15), (1969, 12, 31)] {
            let days = days_since_epoch(y, m, d);
            assert_eq!(civil_from_days(days), (y, m, d));
        }
    }
}
