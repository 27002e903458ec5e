//! Built-in methods on strings, arrays, numbers and objects.

use std::cmp::Ordering;
use std::rc::Rc;

use indexmap::IndexMap;

use super::environment::Environment;
use super::error::{limit_exceeded, type_error, EvalError};
use super::eval::call::call_value;
use super::eval::control::iter_values;
use super::eval::ops::{apply_binary, compare, BinaryOp};
use super::eval::EvalContext;
use super::value::{Value, MAX_STRING_BYTES};

/// Result of a method call.
#[derive(Debug)]
pub struct MethodOutcome {
    /// Value the call evaluates to.
    pub value: Value,
    /// New receiver, for methods that modify it.
    pub updated: Option<Value>,
}

impl MethodOutcome {
    /// A call that leaves the receiver alone.
    #[must_use]
    pub fn value(value: Value) -> Self {
        Self {
            value,
            updated: None,
        }
    }

    /// A call that replaces the receiver.
    #[must_use]
    pub fn updated(value: Value, updated: Value) -> Self {
        Self {
            value,
            updated: Some(updated),
        }
    }
}

/// Try a built-in method on `receiver`.
///
/// Returns `Ok(None)` when the receiver's type has no method called `name`.
///
/// # Errors
///
/// Returns `ArityMismatch` or `TypeError` for bad arguments, and anything
/// raised by callbacks passed to `map`, `filter` and friends.
pub fn builtin_method(
    receiver: &Value,
    name: &str,
    args: &[Value],
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Option<MethodOutcome>, EvalError> {
    match name {
        "to_string" => {
            expect_args(name, args, 0)?;
            return Ok(Some(MethodOutcome::value(Value::string(receiver.to_string()))));
        }
        "clone" => {
            expect_args(name, args, 0)?;
            return Ok(Some(MethodOutcome::value(receiver.clone())));
        }
        _ => {}
    }

    let value = match receiver {
        Value::String(s) => string_method(s, name, args)?,
        Value::Array(items) => return array_method(items, name, args, env, ctx),
        Value::Range { start, end } => match name {
            "len" => {
                expect_args(name, args, 0)?;
                let len = Value::range_len(*start, *end);
                Some(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
            }
            "is_empty" => {
                expect_args(name, args, 0)?;
                Some(Value::Bool(start >= end))
            }
            "contains" => {
                expect_args(name, args, 1)?;
                Some(Value::Bool(matches!(args[0], Value::Int(i) if *start <= i && i < *end)))
            }
            _ => {
                let items = Rc::new(iter_values(receiver)?);
                return array_method(&items, name, args, env, ctx)
                    .map(|outcome| outcome.map(|o| MethodOutcome::value(o.value)));
            }
        },
        Value::Int(_) | Value::Float(_) => number_method(receiver, name, args)?,
        Value::Object(obj) => return object_method(receiver, &obj.fields, name, args),
        _ => None,
    };
    Ok(value.map(MethodOutcome::value))
}

fn expect_args(name: &str, args: &[Value], expected: usize) -> Result<(), EvalError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(EvalError::ArityMismatch {
            name: name.to_owned(),
            expected,
            got: args.len(),
        })
    }
}

fn str_arg<'a>(name: &str, args: &'a [Value], i: usize) -> Result<&'a str, EvalError> {
    match args.get(i) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(type_error(format!(
            "`{name}` expects a string argument, found {}",
            other.type_tag()
        ))),
        None => Err(type_error(format!("`{name}` is missing an argument"))),
    }
}

fn int_arg(name: &str, args: &[Value], i: usize) -> Result<i64, EvalError> {
    match args.get(i) {
        Some(Value::Int(n)) => Ok(*n),
        Some(other) => Err(type_error(format!(
            "`{name}` expects an integer argument, found {}",
            other.type_tag()
        ))),
        None => Err(type_error(format!("`{name}` is missing an argument"))),
    }
}

fn usize_value(n: usize) -> Value {
    Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Result<Option<Value>, EvalError> {
    let arity = |n| expect_args(name, args, n);
    let strings = |parts: Vec<&str>| Value::array(parts.into_iter().map(Value::string).collect());

    Ok(Some(match name {
        "len" => {
            arity(0)?;
            usize_value(s.chars().count())
        }
        "is_empty" => {
            arity(0)?;
            Value::Bool(s.is_empty())
        }
        "to_uppercase" => {
            arity(0)?;
            Value::string(s.to_uppercase())
        }
        "to_lowercase" => {
            arity(0)?;
            Value::string(s.to_lowercase())
        }
        "trim" => {
            arity(0)?;
            Value::string(s.trim())
        }
        "trim_start" => {
            arity(0)?;
            Value::string(s.trim_start())
        }
        "trim_end" => {
            arity(0)?;
            Value::string(s.trim_end())
        }
        "contains" => {
            arity(1)?;
            Value::Bool(s.contains(str_arg(name, args, 0)?))
        }
        "starts_with" => {
            arity(1)?;
            Value::Bool(s.starts_with(str_arg(name, args, 0)?))
        }
        "ends_with" => {
            arity(1)?;
            Value::Bool(s.ends_with(str_arg(name, args, 0)?))
        }
        "find" => {
            arity(1)?;
            let needle = str_arg(name, args, 0)?;
            s.find(needle)
                .map_or(Value::Null, |byte| usize_value(s[..byte].chars().count()))
        }
        "replace" => {
            arity(2)?;
            Value::string(s.replace(str_arg(name, args, 0)?, str_arg(name, args, 1)?))
        }
        "split" => {
            arity(1)?;
            strings(s.split(str_arg(name, args, 0)?).collect())
        }
        "lines" => {
            arity(0)?;
            strings(s.lines().collect())
        }
        "chars" => {
            arity(0)?;
            Value::array(s.chars().map(|c| Value::string(c.to_string())).collect())
        }
        "repeat" => {
            arity(1)?;
            let count = usize::try_from(int_arg(name, args, 0)?)
                .map_err(|_| type_error("`repeat` count must not be negative"))?;
            match s.len().checked_mul(count) {
                Some(total) if total <= MAX_STRING_BYTES => Value::string(s.repeat(count)),
                _ => return Err(limit_exceeded("`repeat` result", MAX_STRING_BYTES)),
            }
        }
        "parse" => {
            arity(0)?;
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .map(Value::Int)
                .or_else(|_| trimmed.parse::<f64>().map(Value::Float))
                .map_err(|_| type_error(format!("cannot parse {s:?} as a number")))?
        }
        _ => return Ok(None),
    }))
}

#[allow(clippy::too_many_lines)]
fn array_method(
    items: &Rc<Vec<Value>>,
    name: &str,
    args: &[Value],
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Option<MethodOutcome>, EvalError> {
    let arity = |n| expect_args(name, args, n);
    let call = |f: &Value, call_args: Vec<Value>, env: &mut Environment| {
        call_value(f, call_args, env, ctx)
    };

    let value = match name {
        "len" => {
            arity(0)?;
            usize_value(items.len())
        }
        "is_empty" => {
            arity(0)?;
            Value::Bool(items.is_empty())
        }
        "first" => {
            arity(0)?;
            items.first().cloned().unwrap_or(Value::Null)
        }
        "last" => {
            arity(0)?;
            items.last().cloned().unwrap_or(Value::Null)
        }
        "get" => {
            arity(1)?;
            let index = int_arg(name, args, 0)?;
            usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(Value::Null)
        }
        "contains" => {
            arity(1)?;
            Value::Bool(items.contains(&args[0]))
        }
        "join" => {
            arity(1)?;
            let sep = str_arg(name, args, 0)?;
            Value::string(
                items
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(sep),
            )
        }
        "reverse" => {
            arity(0)?;
            Value::array(items.iter().rev().cloned().collect())
        }
        "iter" | "into_iter" | "collect" | "to_vec" => {
            arity(0)?;
            Value::Array(Rc::clone(items))
        }
        "enumerate" => {
            arity(0)?;
            Value::array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| Value::array(vec![usize_value(i), v.clone()]))
                    .collect(),
            )
        }
        "slice" => {
            arity(2)?;
            let len = items.len();
            let clamp = |n: i64| usize::try_from(n).unwrap_or(0).min(len);
            let start = clamp(int_arg(name, args, 0)?);
            let end = clamp(int_arg(name, args, 1)?).max(start);
            Value::array(items[start..end].to_vec())
        }
        "concat" => {
            arity(1)?;
            let Value::Array(other) = &args[0] else {
                return Err(type_error("`concat` expects an array"));
            };
            Value::array(items.iter().chain(other.iter()).cloned().collect())
        }
        "push" => {
            arity(1)?;
            let mut updated = items.as_ref().clone();
            updated.push(args[0].clone());
            return Ok(Some(MethodOutcome::updated(
                Value::Unit,
                Value::array(updated),
            )));
        }
        "pop" => {
            arity(0)?;
            let mut updated = items.as_ref().clone();
            let last = updated.pop().unwrap_or(Value::Null);
            return Ok(Some(MethodOutcome::updated(last, Value::array(updated))));
        }
        "map" => {
            arity(1)?;
            let mapped = items
                .iter()
                .map(|item| call(&args[0], vec![item.clone()], env))
                .collect::<Result<Vec<_>, _>>()?;
            Value::array(mapped)
        }
        "filter" => {
            arity(1)?;
            let mut kept = Vec::new();
            for item in items.iter() {
                if call(&args[0], vec![item.clone()], env)?.is_truthy() {
                    kept.push(item.clone());
                }
            }
            Value::array(kept)
        }
        "for_each" => {
            arity(1)?;
            for item in items.iter() {
                call(&args[0], vec![item.clone()], env)?;
            }
            Value::Unit
        }
        "fold" => {
            arity(2)?;
            let mut acc = args[0].clone();
            for item in items.iter() {
                acc = call(&args[1], vec![acc, item.clone()], env)?;
            }
            acc
        }
        "any" | "all" | "find" | "position" => {
            arity(1)?;
            let mut hit = None;
            for (i, item) in items.iter().enumerate() {
                let matched = call(&args[0], vec![item.clone()], env)?.is_truthy();
                if matched != (name == "all") {
                    hit = Some((i, item.clone()));
                    break;
                }
            }
            match (name, hit) {
                ("any", hit) => Value::Bool(hit.is_some()),
                ("all", hit) => Value::Bool(hit.is_none()),
                ("find", Some((_, item))) => item,
                ("position", Some((i, _))) => usize_value(i),
                _ => Value::Null,
            }
        }
        "sum" => {
            arity(0)?;
            let mut total = Value::Int(0);
            for item in items.iter() {
                total = apply_binary(BinaryOp::Add, total, item.clone())?;
            }
            total
        }
        "min" | "max" => {
            arity(0)?;
            let wanted = if name == "min" {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut best: Option<&Value> = None;
            for item in items.iter() {
                best = match best {
                    Some(current) => {
                        let ordering = compare(item, current)
                            .ok_or_else(|| type_error("values are not comparable"))?;
                        Some(if ordering == wanted { item } else { current })
                    }
                    None => Some(item),
                };
            }
            best.cloned().unwrap_or(Value::Null)
        }
        "sort" => {
            arity(0)?;
            let mut sorted = items.as_ref().clone();
            let mut incomparable = false;
            sorted.sort_by(|a, b| {
                compare(a, b).unwrap_or_else(|| {
                    incomparable = true;
                    Ordering::Equal
                })
            });
            if incomparable {
                return Err(type_error("values are not comparable"));
            }
            Value::array(sorted)
        }
        _ => return Ok(None),
    };
    Ok(Some(MethodOutcome::value(value)))
}

fn number_method(receiver: &Value, name: &str, args: &[Value]) -> Result<Option<Value>, EvalError> {
    let arity = |n| expect_args(name, args, n);
    let Some(x) = receiver.as_f64() else {
        return Ok(None);
    };

    let other = || {
        args.first()
            .and_then(Value::as_f64)
            .ok_or_else(|| type_error(format!("`{name}` expects a numeric argument")))
    };

    Ok(Some(match (name, receiver) {
        ("abs", Value::Int(i)) => {
            arity(0)?;
            i.checked_abs()
                .map(Value::Int)
                .ok_or_else(|| EvalError::IntegerOverflow {
                    op: "abs".to_owned(),
                })?
        }
        ("abs", _) => {
            arity(0)?;
            Value::Float(x.abs())
        }
        ("pow", Value::Int(i)) if matches!(args.first(), Some(Value::Int(_))) => {
            arity(1)?;
            let exp = u32::try_from(int_arg(name, args, 0)?)
                .map_err(|_| type_error("`pow` exponent must fit in u32"))?;
            i.checked_pow(exp)
                .map(Value::Int)
                .ok_or_else(|| EvalError::IntegerOverflow {
                    op: "pow".to_owned(),
                })?
        }
        ("pow" | "powf", _) => {
            arity(1)?;
            Value::Float(x.powf(other()?))
        }
        ("sqrt", _) => {
            arity(0)?;
            Value::Float(x.sqrt())
        }
        ("floor" | "ceil" | "round", Value::Int(i)) => {
            arity(0)?;
            Value::Int(*i)
        }
        ("floor", _) => {
            arity(0)?;
            Value::Float(x.floor())
        }
        ("ceil", _) => {
            arity(0)?;
            Value::Float(x.ceil())
        }
        ("round", _) => {
            arity(0)?;
            Value::Float(x.round())
        }
        ("min" | "max", _) => {
            arity(1)?;
            let y = other()?;
            let pick_self = if name == "min" { x <= y } else { x >= y };
            if pick_self {
                receiver.clone()
            } else {
                args[0].clone()
            }
        }
        ("is_nan", _) => {
            arity(0)?;
            Value::Bool(x.is_nan())
        }
        ("to_fixed", _) => {
            arity(1)?;
            let digits = usize::try_from(int_arg(name, args, 0)?)
                .map_err(|_| type_error("`to_fixed` digits must not be negative"))?;
            Value::string(format!("{x:.digits$}"))
        }
        _ => return Ok(None),
    }))
}

fn object_method(
    receiver: &Value,
    fields: &IndexMap<String, Value>,
    name: &str,
    args: &[Value],
) -> Result<Option<MethodOutcome>, EvalError> {
    let arity = |n| expect_args(name, args, n);

    let value = match name {
        "keys" => {
            arity(0)?;
            Value::array(fields.keys().map(Value::string).collect())
        }
        "values" => {
            arity(0)?;
            Value::array(fields.values().cloned().collect())
        }
        "len" => {
            arity(0)?;
            usize_value(fields.len())
        }
        "contains_key" | "has" => {
            arity(1)?;
            Value::Bool(fields.contains_key(str_arg(name, args, 0)?))
        }
        "get" => {
            arity(1)?;
            fields
                .get(str_arg(name, args, 0)?)
                .cloned()
                .unwrap_or(Value::Null)
        }
        "insert" | "remove" => {
            let Value::Object(obj) = receiver else {
                return Ok(None);
            };
            let mut updated = obj.as_ref().clone();
            let key = str_arg(name, args, 0)?.to_owned();
            let previous = if name == "insert" {
                arity(2)?;
                updated.fields.insert(key, args[1].clone())
            } else {
                arity(1)?;
                updated.fields.shift_remove(&key)
            };
            return Ok(Some(MethodOutcome::updated(
                previous.unwrap_or(Value::Null),
                Value::Object(Rc::new(updated)),
            )));
        }
        _ => return Ok(None),
    };
    Ok(Some(MethodOutcome::value(value)))
}
