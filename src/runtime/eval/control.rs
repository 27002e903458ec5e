//! Blocks, statements, conditionals and loops.

use std::rc::Rc;

use super::call::{eval_macro, function_from_item};
use super::{EvalContext, Evaluate};
use crate::runtime::environment::Environment;
use crate::runtime::error::{type_error, ControlFlow, EvalError};
use crate::runtime::value::Value;

/// Evaluate a block in a fresh scope.
///
/// # Errors
///
/// Propagates statement errors and control flow signals.
pub fn eval_block(
    block: &syn::Block,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    env.scoped(|env| eval_stmts(&block.stmts, env, ctx))
}

/// Evaluate statements in the current scope.
///
/// The value is that of a trailing expression without a semicolon, or unit.
///
/// # Errors
///
/// Propagates statement errors and control flow signals.
pub fn eval_stmts(
    stmts: &[syn::Stmt],
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    // Items are visible to every statement in the block, as in Rust.
    for stmt in stmts {
        if let syn::Stmt::Item(syn::Item::Fn(item)) = stmt {
            let func = function_from_item(item)?;
            env.define(func.name.clone(), Value::Function(Rc::new(func)));
        }
    }

    let mut last = Value::Unit;
    for stmt in stmts {
        last = match stmt {
            syn::Stmt::Local(local) => {
                eval_local(local, env, ctx)?;
                Value::Unit
            }
            syn::Stmt::Item(syn::Item::Fn(_)) => Value::Unit,
            syn::Stmt::Item(_) => {
                return Err(EvalError::Unsupported {
                    kind: "item other than `fn`".to_owned(),
                })
            }
            syn::Stmt::Expr(expr, semi) => {
                let value = expr.eval(env, ctx)?;
                if semi.is_some() {
                    Value::Unit
                } else {
                    value
                }
            }
            syn::Stmt::Macro(stmt) => {
                let value = eval_macro(&stmt.mac, env, ctx)?;
                if stmt.semi_token.is_some() {
                    Value::Unit
                } else {
                    value
                }
            }
        };
    }
    Ok(last)
}

/// Evaluate `let` with an identifier, typed identifier or wildcard pattern.
fn eval_local(
    local: &syn::Local,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<(), EvalError> {
    let value = match &local.init {
        Some(init) => {
            if init.diverge.is_some() {
                return Err(EvalError::Unsupported {
                    kind: "let-else".to_owned(),
                });
            }
            init.expr.eval(env, ctx)?
        }
        None => Value::Unit,
    };
    bind_pattern(&local.pat, value, env)
}

/// Bind `value` to a simple pattern.
///
/// # Errors
///
/// Returns `Unsupported` for destructuring patterns.
pub fn bind_pattern(pat: &syn::Pat, value: Value, env: &mut Environment) -> Result<(), EvalError> {
    match pat {
        syn::Pat::Ident(ident) => {
            env.define_with_mode(
                ident.ident.to_string(),
                value,
                ident.mutability.is_some(),
            );
            Ok(())
        }
        syn::Pat::Type(typed) => bind_pattern(&typed.pat, value, env),
        syn::Pat::Wild(_) => Ok(()),
        _ => Err(EvalError::Unsupported {
            kind: "destructuring pattern".to_owned(),
        }),
    }
}

/// Evaluate a block expression, handling `break 'label value` for labelled blocks.
///
/// # Errors
///
/// Propagates statement errors and unrelated control flow signals.
pub fn eval_labeled_block(
    expr: &syn::ExprBlock,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    let Some(label) = &expr.label else {
        return eval_block(&expr.block, env, ctx);
    };

    let name = label.name.ident.to_string();
    match eval_block(&expr.block, env, ctx) {
        Err(EvalError::ControlFlow(ControlFlow::Break {
            value,
            label: Some(target),
        })) if target == name => Ok(value),
        other => other,
    }
}

/// Evaluate `if` / `else if` / `else`.
///
/// # Errors
///
/// Returns `TypeError` when the condition is not a boolean.
pub fn eval_if(
    expr: &syn::ExprIf,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    if eval_condition(&expr.cond, env, ctx)? {
        eval_block(&expr.then_branch, env, ctx)
    } else if let Some((_, else_branch)) = &expr.else_branch {
        else_branch.eval(env, ctx)
    } else {
        Ok(Value::Unit)
    }
}

fn eval_condition(
    cond: &syn::Expr,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<bool, EvalError> {
    match cond.eval(env, ctx)? {
        Value::Bool(b) => Ok(b),
        other => Err(type_error(format!(
            "expected `bool` condition, found {}",
            other.type_tag()
        ))),
    }
}

/// What a loop does after one iteration.
enum Step {
    Next,
    Exit(Value),
}

/// Run one loop body and interpret any control flow aimed at this loop.
fn run_body(
    body: &syn::Block,
    label: Option<&str>,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Step, EvalError> {
    match eval_block(body, env, ctx) {
        Ok(_) => Ok(Step::Next),
        Err(EvalError::ControlFlow(flow)) if flow.targets(label) => match flow {
            ControlFlow::Break { value, .. } => Ok(Step::Exit(value)),
            _ => Ok(Step::Next),
        },
        Err(e) => Err(e),
    }
}

fn label_name(label: Option<&syn::Label>) -> Option<String> {
    label.map(|l| l.name.ident.to_string())
}

/// Evaluate `while cond { .. }`.
///
/// # Errors
///
/// Propagates condition and body errors.
pub fn eval_while(
    expr: &syn::ExprWhile,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    let label = label_name(expr.label.as_ref());
    while eval_condition(&expr.cond, env, ctx)? {
        if let Step::Exit(_) = run_body(&expr.body, label.as_deref(), env, ctx)? {
            break;
        }
    }
    Ok(Value::Unit)
}

/// Evaluate `loop { .. }`; its value is the one given to `break`.
///
/// # Errors
///
/// Propagates body errors.
pub fn eval_loop(
    expr: &syn::ExprLoop,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    let label = label_name(expr.label.as_ref());
    loop {
        if let Step::Exit(value) = run_body(&expr.body, label.as_deref(), env, ctx)? {
            return Ok(value);
        }
    }
}

/// Evaluate `for pat in iterable { .. }` over ranges, arrays, strings and
/// object keys.
///
/// # Errors
///
/// Returns `TypeError` for values that cannot be iterated.
pub fn eval_for(
    expr: &syn::ExprForLoop,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    let label = label_name(expr.label.as_ref());
    let iterable = expr.expr.eval(env, ctx)?;

    let run = |item: Value, env: &mut Environment| -> Result<bool, EvalError> {
        let step = env.scoped(|env| {
            bind_pattern(&expr.pat, item, env)?;
            run_body(&expr.body, label.as_deref(), env, ctx)
        })?;
        Ok(matches!(step, Step::Next))
    };

    match iterable {
        Value::Range { start, end } => {
            for i in start..end {
                if !run(Value::Int(i), env)? {
                    break;
                }
            }
        }
        other => {
            for item in iter_values(&other)? {
                if !run(item, env)? {
                    break;
                }
            }
        }
    }
    Ok(Value::Unit)
}

/// Materialize the items of an iterable value.
///
/// # Errors
///
/// Returns `TypeError` for values that cannot be iterated and
/// `LimitExceeded` for ranges too large to expand.
pub fn iter_values(value: &Value) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::Array(items) => Ok(items.as_ref().clone()),
        Value::Range { start, end } => Ok(Value::range_items(*start, *end)?.map(Value::Int).collect()),
        Value::String(s) => Ok(s.chars().map(|c| Value::string(c.to_string())).collect()),
        Value::Object(obj) => Ok(obj.fields.keys().map(Value::string).collect()),
        other => Err(type_error(format!("{} is not iterable", other.type_tag()))),
    }
}

/// Evaluate `break`, optionally labelled and with a value.
///
/// # Errors
///
/// Always returns the break signal, or the error raised by its value.
pub fn eval_break(
    expr: &syn::ExprBreak,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    let value = match &expr.expr {
        Some(value) => value.eval(env, ctx)?,
        None => Value::Unit,
    };
    Err(EvalError::ControlFlow(ControlFlow::Break {
        value,
        label: expr.label.as_ref().map(|l| l.ident.to_string()),
    }))
}

/// Build the signal for `continue`.
#[must_use]
pub fn continue_signal(expr: &syn::ExprContinue) -> EvalError {
    EvalError::ControlFlow(ControlFlow::Continue {
        label: expr.label.as_ref().map(|l| l.ident.to_string()),
    })
}

/// Evaluate `return`.
///
/// # Errors
///
/// Always returns the return signal, or the error raised by its value.
pub fn eval_return(
    expr: &syn::ExprReturn,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    let value = match &expr.expr {
        Some(value) => value.eval(env, ctx)?,
        None => Value::Unit,
    };
    Err(EvalError::ControlFlow(ControlFlow::Return { value }))
}
