//! Calls, closures, futures and the few supported macros.

use std::rc::Rc;

use syn::punctuated::Punctuated;

use super::access::assign_place;
use super::control::eval_stmts;
use super::{EvalContext, Evaluate};
use crate::runtime::environment::Environment;
use crate::runtime::error::{type_error, ControlFlow, EvalError};
use crate::runtime::methods::{builtin_method, MethodOutcome};
use crate::runtime::value::{ClosureValue, FunctionValue, FutureValue, Value};

/// Evaluate `f(args..)`.
///
/// # Errors
///
/// Returns `TypeError` when the callee is not callable, plus anything the
/// callee raises.
pub fn eval_call(
    expr: &syn::ExprCall,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    let func = expr.func.eval(env, ctx)?;
    let args = expr
        .args
        .iter()
        .map(|arg| arg.eval(env, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    call_value(&func, args, env, ctx)
}

/// Evaluate `receiver.method(args..)`.
///
/// Methods that update their receiver, such as `push`, write the new value
/// back when the receiver is a place.
///
/// # Errors
///
/// Returns `UndefinedMethod` when nothing named `method` applies.
pub fn eval_method_call(
    expr: &syn::ExprMethodCall,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    let receiver = expr.receiver.eval(env, ctx)?;
    let args = expr
        .args
        .iter()
        .map(|arg| arg.eval(env, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    let method = expr.method.to_string();

    let outcome = invoke_method(&receiver, &method, args, env, ctx)?.ok_or_else(|| {
        EvalError::UndefinedMethod {
            method: method.clone(),
            type_name: receiver.type_tag(),
        }
    })?;

    if let Some(updated) = outcome.updated {
        if is_place(&expr.receiver) {
            assign_place(&expr.receiver, updated, env, ctx)?;
        }
    }
    Ok(outcome.value)
}

fn is_place(expr: &syn::Expr) -> bool {
    match expr {
        syn::Expr::Path(_) => true,
        syn::Expr::Field(field) => is_place(&field.base),
        syn::Expr::Index(index) => is_place(&index.expr),
        syn::Expr::Paren(inner) => is_place(&inner.expr),
        _ => false,
    }
}

/// Find and call `name` on `receiver`.
///
/// Lookup order: a callable object field, a callable module member, a
/// built-in method for the receiver's type, then a global function taking the
/// receiver as its first argument. Returns `Ok(None)` when none apply.
///
/// # Errors
///
/// Propagates errors raised by the method itself.
pub fn invoke_method(
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Option<MethodOutcome>, EvalError> {
    let member = match receiver {
        Value::Object(obj) => obj.fields.get(name).filter(|v| v.is_callable()).cloned(),
        Value::Module(module) => module.members.get(name).filter(|v| v.is_callable()).cloned(),
        _ => None,
    };
    if let Some(func) = member {
        return call_value(&func, args, env, ctx).map(|v| Some(MethodOutcome::value(v)));
    }

    if let Some(outcome) = builtin_method(receiver, name, &args, env, ctx)? {
        return Ok(Some(outcome));
    }

    match env.get(name).filter(|v| v.is_callable()).cloned() {
        Some(func) => {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(receiver.clone());
            full.extend(args);
            call_value(&func, full, env, ctx).map(|v| Some(MethodOutcome::value(v)))
        }
        None => Ok(None),
    }
}

/// Call a value as a function.
///
/// # Errors
///
/// Returns `TypeError` if the value is not callable and `ArityMismatch` if
/// the argument count is wrong.
pub fn call_value(
    func: &Value,
    args: Vec<Value>,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    match func {
        Value::Function(f) => {
            check_arity(&f.name, f.params.len(), args.len())?;
            let locals = f.params.iter().cloned().zip(args);
            if f.is_async {
                let body = syn::Expr::Block(syn::ExprBlock {
                    attrs: Vec::new(),
                    label: None,
                    block: f.body.as_ref().clone(),
                });
                return Ok(deferred(Rc::new(body), locals.collect()));
            }
            env.call_frame(locals, |env| catch_return(eval_stmts(&f.body.stmts, env, ctx)))
        }
        Value::Closure(c) => {
            check_arity("closure", c.params.len(), args.len())?;
            let locals = c
                .captures
                .iter()
                .cloned()
                .chain(c.params.iter().cloned().zip(args));
            if c.is_async {
                return Ok(deferred(Rc::clone(&c.body), locals.collect()));
            }
            env.call_frame(locals, |env| catch_return(c.body.eval(env, ctx)))
        }
        Value::Builtin(b) => {
            if let Ok(arity) = usize::try_from(b.arity) {
                check_arity(&b.name, arity, args.len())?;
            }
            (b.func)(&args)
        }
        other => Err(type_error(format!(
            "expected function, found {}",
            other.type_tag()
        ))),
    }
}

fn check_arity(name: &str, expected: usize, got: usize) -> Result<(), EvalError> {
    if expected == got {
        Ok(())
    } else {
        Err(EvalError::ArityMismatch {
            name: name.to_owned(),
            expected,
            got,
        })
    }
}

fn catch_return(result: Result<Value, EvalError>) -> Result<Value, EvalError> {
    match result {
        Err(EvalError::ControlFlow(ControlFlow::Return { value })) => Ok(value),
        other => other,
    }
}

fn deferred(body: Rc<syn::Expr>, captures: Vec<(String, Value)>) -> Value {
    Value::Future(Rc::new(FutureValue::Deferred {
        body,
        captures: Rc::new(captures),
    }))
}

/// Build a closure value capturing the current call's locals.
///
/// # Errors
///
/// Returns `Unsupported` for destructuring parameters.
pub fn eval_closure(expr: &syn::ExprClosure, env: &Environment) -> Result<Value, EvalError> {
    let params = expr
        .inputs
        .iter()
        .map(extract_pat_name)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Value::Closure(Rc::new(ClosureValue {
        params,
        body: Rc::new(expr.body.as_ref().clone()),
        captures: Rc::new(env.capture()),
        is_async: expr.asyncness.is_some(),
    })))
}

/// Build the future for an `async { .. }` block.
#[must_use]
pub fn async_block(expr: &syn::ExprAsync, env: &Environment) -> Value {
    let body = syn::Expr::Block(syn::ExprBlock {
        attrs: Vec::new(),
        label: None,
        block: expr.block.clone(),
    });
    deferred(Rc::new(body), env.capture())
}

/// Settle `value` if it is a future; other values are returned unchanged.
///
/// Timers do not block here. Their delay is recorded on `ctx` and paid by
/// whoever drives the evaluation asynchronously.
///
/// # Errors
///
/// Propagates errors raised by deferred bodies.
pub fn await_value(
    mut value: Value,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    while let Value::Future(future) = &value {
        value = match future.as_ref() {
            FutureValue::Timer { delay, output } => {
                ctx.defer(*delay)?;
                output.clone()
            }
            FutureValue::Deferred { body, captures } => {
                let body = Rc::clone(body);
                let captures = Rc::clone(captures);
                env.call_frame(captures.iter().cloned(), |env| {
                    catch_return(body.eval(env, ctx))
                })?
            }
        };
    }
    Ok(value)
}

/// Convert an `fn` item into a function value.
///
/// # Errors
///
/// Returns `Unsupported` for destructuring parameters.
pub fn function_from_item(item_fn: &syn::ItemFn) -> Result<FunctionValue, EvalError> {
    let params = item_fn
        .sig
        .inputs
        .iter()
        .map(|input| match input {
            syn::FnArg::Typed(pat_type) => extract_pat_name(&pat_type.pat),
            syn::FnArg::Receiver(_) => Ok("self".to_owned()),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(FunctionValue {
        name: item_fn.sig.ident.to_string(),
        params,
        body: Rc::new(item_fn.block.as_ref().clone()),
        is_async: item_fn.sig.asyncness.is_some(),
    })
}

/// Extract a parameter name from a simple pattern.
fn extract_pat_name(pat: &syn::Pat) -> Result<String, EvalError> {
    match pat {
        syn::Pat::Ident(pat_ident) => Ok(pat_ident.ident.to_string()),
        syn::Pat::Wild(_) => Ok("_".to_owned()),
        syn::Pat::Reference(pat_ref) => extract_pat_name(&pat_ref.pat),
        syn::Pat::Type(pat_type) => extract_pat_name(&pat_type.pat),
        _ => Err(EvalError::Unsupported {
            kind: "destructuring parameter".to_owned(),
        }),
    }
}

/// Evaluate `vec!`, `format!`, the printing macros and `panic!`.
///
/// Printing goes to standard error; standard output belongs to the protocol.
///
/// # Errors
///
/// Returns `Unsupported` for other macros and `Parse` for malformed bodies.
pub fn eval_macro(
    mac: &syn::Macro,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    let name = mac
        .path
        .segments
        .last()
        .map(|s| s.ident.to_string())
        .unwrap_or_default();

    let args = mac
        .parse_body_with(Punctuated::<syn::Expr, syn::Token![,]>::parse_terminated)
        .map_err(|e| EvalError::Parse {
            message: e.to_string(),
        })?;
    let mut args = args.iter();

    if name == "vec" {
        let items = args
            .map(|e| e.eval(env, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Value::array(items));
    }

    if !matches!(
        name.as_str(),
        "format" | "print" | "println" | "eprint" | "eprintln" | "panic"
    ) {
        return Err(EvalError::Unsupported {
            kind: format!("macro `{name}!`"),
        });
    }

    let text = match args.next() {
        Some(syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Str(template),
            ..
        })) => {
            let values = args.map(|e| e.eval(env, ctx)).collect::<Result<Vec<_>, _>>()?;
            format_template(&template.value(), &values, env)?
        }
        Some(_) => return Err(type_error(format!("`{name}!` expects a format string"))),
        None => String::new(),
    };

    match name.as_str() {
        "format" => Ok(Value::string(text)),
        "print" | "eprint" => {
            eprint!("{text}");
            Ok(Value::Unit)
        }
        "panic" => Err(EvalError::BuiltinError {
            name: "panic".to_owned(),
            message: if text.is_empty() {
                "explicit panic".to_owned()
            } else {
                text
            },
        }),
        _ => {
            eprintln!("{text}");
            Ok(Value::Unit)
        }
    }
}

/// Substitute `{}`, `{:?}` and `{name}` placeholders.
fn format_template(template: &str, values: &[Value], env: &Environment) -> Result<String, EvalError> {
    let mut out = String::with_capacity(template.len());
    let mut positional = values.iter();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut spec = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    spec.push(c);
                }
                let (name, debug) = match spec.split_once(':') {
                    Some((name, fmt)) => (name, fmt == "?"),
                    None => (spec.as_str(), false),
                };
                let value = if name.is_empty() {
                    positional
                        .next()
                        .cloned()
                        .ok_or_else(|| type_error("missing format argument"))?
                } else {
                    env.get(name)
                        .cloned()
                        .ok_or_else(|| EvalError::UndefinedVariable {
                            name: name.to_owned(),
                        })?
                };
                match (&value, debug) {
                    (Value::String(s), true) => out.push_str(&format!("{:?}", &**s)),
                    _ => out.push_str(&value.to_string()),
                }
            }
            c => out.push(c),
        }
    }
    Ok(out)
}
