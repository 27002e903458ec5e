//! Paths, fields, indexing, literals of compound values and assignment.

use std::rc::Rc;

use indexmap::IndexMap;
use syn::punctuated::Punctuated;

use super::{expr_kind_name, EvalContext, Evaluate};
use crate::runtime::environment::Environment;
use crate::runtime::error::{type_error, EvalError};
use crate::runtime::value::Value;

/// Resolve a path such as `x` or `math::PI`.
///
/// # Errors
///
/// Returns `UndefinedVariable` naming the whole path when the first segment
/// is unbound.
pub fn eval_path(path: &syn::Path, env: &Environment) -> Result<Value, EvalError> {
    let mut segments = path.segments.iter().map(|s| s.ident.to_string());
    let first = segments.next().unwrap_or_default();

    let undefined = || EvalError::UndefinedVariable {
        name: path
            .segments
            .iter()
            .map(|s| s.ident.to_string())
            .collect::<Vec<_>>()
            .join("::"),
    };

    let mut value = env.get(&first).cloned().ok_or_else(undefined)?;
    for segment in segments {
        value = read_property(&value, &segment)?;
    }
    Ok(value)
}

/// Read a named property.
///
/// Objects expose their fields, modules their members, and arrays and
/// strings a `len` / `length` property.
///
/// # Errors
///
/// Returns `UndefinedField` when the property does not exist.
pub fn read_property(value: &Value, name: &str) -> Result<Value, EvalError> {
    let found = match value {
        Value::Object(obj) => obj.fields.get(name).cloned(),
        Value::Module(module) => module.members.get(name).cloned(),
        Value::Array(items) => match name {
            "len" | "length" => Some(len_value(items.len())),
            _ => name
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i).cloned()),
        },
        Value::String(s) if matches!(name, "len" | "length") => Some(len_value(s.chars().count())),
        _ => None,
    };

    found.ok_or_else(|| EvalError::UndefinedField {
        field: name.to_owned(),
        type_name: value.type_tag(),
    })
}

/// Read `base.member`, where the member may be a name or a tuple index.
///
/// # Errors
///
/// Same as [`read_property`] and [`read_index`].
pub fn read_member(base: &Value, member: &syn::Member) -> Result<Value, EvalError> {
    match member {
        syn::Member::Named(ident) => read_property(base, &ident.to_string()),
        syn::Member::Unnamed(index) => read_index(base, &Value::Int(i64::from(index.index))),
    }
}

/// Read `base[index]`.
///
/// # Errors
///
/// Returns `IndexOutOfBounds`, `UndefinedField` or `TypeError`.
pub fn read_index(base: &Value, index: &Value) -> Result<Value, EvalError> {
    match (base, index) {
        (Value::Array(items), Value::Int(i)) => {
            let pos = checked_index(*i, items.len())?;
            Ok(items[pos].clone())
        }
        (Value::Array(items), Value::Range { start, end }) => {
            let start = checked_index(*start, items.len() + 1)?;
            let end = checked_index(*end, items.len() + 1)?.max(start);
            Ok(Value::array(items[start..end].to_vec()))
        }
        (Value::String(s), Value::Int(i)) => {
            let len = s.chars().count();
            let pos = checked_index(*i, len)?;
            Ok(s.chars()
                .nth(pos)
                .map_or(Value::Unit, |c| Value::string(c.to_string())))
        }
        (Value::Object(_), Value::String(key)) => read_property(base, key),
        (base, index) => Err(type_error(format!(
            "cannot index {} with {}",
            base.type_tag(),
            index.type_tag()
        ))),
    }
}

fn checked_index(index: i64, len: usize) -> Result<usize, EvalError> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < len)
        .ok_or(EvalError::IndexOutOfBounds { index, len })
}

fn len_value(len: usize) -> Value {
    Value::Int(i64::try_from(len).unwrap_or(i64::MAX))
}

/// Evaluate array and tuple element lists.
///
/// # Errors
///
/// Propagates element errors.
pub fn eval_elements(
    elems: &Punctuated<syn::Expr, syn::Token![,]>,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    let items = elems
        .iter()
        .map(|e| e.eval(env, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::array(items))
}

/// Evaluate a struct literal into an object named after the struct.
///
/// `..base` copies the fields of another object first.
///
/// # Errors
///
/// Propagates field errors; returns `TypeError` for a non-object base.
pub fn eval_struct(
    expr: &syn::ExprStruct,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    let type_name = expr
        .path
        .segments
        .last()
        .map_or_else(|| "Object".to_owned(), |s| s.ident.to_string());

    let mut fields = match &expr.rest {
        Some(rest) => match rest.eval(env, ctx)? {
            Value::Object(obj) => obj.fields.clone(),
            other => {
                return Err(type_error(format!(
                    "struct base must be an object, found {}",
                    other.type_tag()
                )))
            }
        },
        None => IndexMap::new(),
    };

    for field in &expr.fields {
        let value = field.expr.eval(env, ctx)?;
        fields.insert(member_name(&field.member), value);
    }

    Ok(Value::object(type_name, fields))
}

fn member_name(member: &syn::Member) -> String {
    match member {
        syn::Member::Named(ident) => ident.to_string(),
        syn::Member::Unnamed(index) => index.index.to_string(),
    }
}

/// Evaluate `a..b` and `a..=b` over integers.
///
/// # Errors
///
/// Returns `Unsupported` for open ranges and `TypeError` for non-integer bounds.
pub fn eval_range(
    expr: &syn::ExprRange,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    let (Some(start), Some(end)) = (&expr.start, &expr.end) else {
        return Err(EvalError::Unsupported {
            kind: "open range".to_owned(),
        });
    };

    let (Value::Int(start), Value::Int(end)) = (start.eval(env, ctx)?, end.eval(env, ctx)?) else {
        return Err(type_error("range bounds must be integers"));
    };

    let end = match expr.limits {
        syn::RangeLimits::HalfOpen(_) => end,
        syn::RangeLimits::Closed(_) => end.checked_add(1).ok_or(EvalError::IntegerOverflow {
            op: "..=".to_owned(),
        })?,
    };
    Ok(Value::Range { start, end })
}

/// Store `value` into the place named by `target`.
///
/// Supports variables, fields and indexes, nested to any depth. Compound
/// values are copied on write, so the update is written back along the path.
///
/// # Errors
///
/// Returns `InvalidAssignTarget` for expressions that are not places, and the
/// binding errors of [`Environment::assign`].
pub fn assign_place(
    target: &syn::Expr,
    value: Value,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<(), EvalError> {
    match target {
        syn::Expr::Path(path) => match path.path.get_ident() {
            Some(ident) => env.assign(&ident.to_string(), value),
            None => Err(EvalError::InvalidAssignTarget {
                kind: "qualified path".to_owned(),
            }),
        },
        syn::Expr::Field(field) => {
            let current = field.base.eval(env, ctx)?;
            let updated = match &field.member {
                syn::Member::Named(ident) => with_field(current, &ident.to_string(), value)?,
                syn::Member::Unnamed(index) => {
                    with_index(current, &Value::Int(i64::from(index.index)), value)?
                }
            };
            assign_place(&field.base, updated, env, ctx)
        }
        syn::Expr::Index(index) => {
            let current = index.expr.eval(env, ctx)?;
            let key = index.index.eval(env, ctx)?;
            let updated = with_index(current, &key, value)?;
            assign_place(&index.expr, updated, env, ctx)
        }
        syn::Expr::Paren(inner) => assign_place(&inner.expr, value, env, ctx),
        syn::Expr::Unary(unary) if matches!(unary.op, syn::UnOp::Deref(_)) => {
            assign_place(&unary.expr, value, env, ctx)
        }
        other => Err(EvalError::InvalidAssignTarget {
            kind: expr_kind_name(other).to_owned(),
        }),
    }
}

fn with_field(base: Value, name: &str, value: Value) -> Result<Value, EvalError> {
    match base {
        Value::Object(mut obj) => {
            Rc::make_mut(&mut obj).fields.insert(name.to_owned(), value);
            Ok(Value::Object(obj))
        }
        other => Err(type_error(format!(
            "cannot set field `{name}` on {}",
            other.type_tag()
        ))),
    }
}

fn with_index(base: Value, index: &Value, value: Value) -> Result<Value, EvalError> {
    match (base, index) {
        (Value::Array(mut items), Value::Int(i)) => {
            let pos = checked_index(*i, items.len())?;
            Rc::make_mut(&mut items)[pos] = value;
            Ok(Value::Array(items))
        }
        (base @ Value::Object(_), Value::String(key)) => with_field(base, key, value),
        (base, index) => Err(type_error(format!(
            "cannot index {} with {}",
            base.type_tag(),
            index.type_tag()
        ))),
    }
}
