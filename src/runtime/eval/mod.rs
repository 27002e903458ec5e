//! Expression evaluation.

pub mod access;
pub mod call;
pub mod control;
pub mod ops;

use std::cell::Cell;
use std::time::Duration;

use super::environment::Environment;
use super::error::EvalError;
use super::value::Value;

/// Per-evaluation state threaded through every call.
#[derive(Debug, Default)]
pub struct EvalContext {
    /// Time owed by timers awaited during synchronous evaluation.
    delay: Cell<Duration>,
}

impl EvalContext {
    /// Create a context with nothing owed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a timer was awaited.
    ///
    /// # Errors
    ///
    /// Returns `IntegerOverflow` when the total owed no longer fits a
    /// [`Duration`].
    pub fn defer(&self, delay: Duration) -> Result<(), EvalError> {
        let total = self
            .delay
            .get()
            .checked_add(delay)
            .ok_or_else(|| EvalError::IntegerOverflow {
                op: "sleep".to_owned(),
            })?;
        self.delay.set(total);
        Ok(())
    }

    /// Take the time owed so far, resetting it to zero.
    pub fn take_delay(&self) -> Duration {
        self.delay.take()
    }
}

/// Trait for evaluating AST nodes to values.
///
/// Each supported `syn` expression type implements this trait.
pub trait Evaluate {
    /// Evaluate this node in the given environment.
    ///
    /// # Errors
    ///
    /// Returns the [`EvalError`] raised while evaluating.
    fn eval(&self, env: &mut Environment, ctx: &EvalContext) -> Result<Value, EvalError>;
}

impl Evaluate for syn::Expr {
    fn eval(&self, env: &mut Environment, ctx: &EvalContext) -> Result<Value, EvalError> {
        match self {
            syn::Expr::Lit(expr) => ops::eval_lit(&expr.lit),
            syn::Expr::Path(expr) => access::eval_path(&expr.path, env),
            syn::Expr::Unary(expr) => ops::eval_unary(expr, env, ctx),
            syn::Expr::Binary(expr) => ops::eval_binary(expr, env, ctx),
            syn::Expr::Assign(expr) => {
                let value = expr.right.eval(env, ctx)?;
                access::assign_place(&expr.left, value, env, ctx)?;
                Ok(Value::Unit)
            }
            syn::Expr::Cast(expr) => ops::eval_cast(expr, env, ctx),

            syn::Expr::Block(expr) => control::eval_labeled_block(expr, env, ctx),
            syn::Expr::If(expr) => control::eval_if(expr, env, ctx),
            syn::Expr::While(expr) => control::eval_while(expr, env, ctx),
            syn::Expr::Loop(expr) => control::eval_loop(expr, env, ctx),
            syn::Expr::ForLoop(expr) => control::eval_for(expr, env, ctx),
            syn::Expr::Break(expr) => control::eval_break(expr, env, ctx),
            syn::Expr::Continue(expr) => Err(control::continue_signal(expr)),
            syn::Expr::Return(expr) => control::eval_return(expr, env, ctx),

            syn::Expr::Call(expr) => call::eval_call(expr, env, ctx),
            syn::Expr::MethodCall(expr) => call::eval_method_call(expr, env, ctx),
            syn::Expr::Closure(expr) => call::eval_closure(expr, env),
            syn::Expr::Async(expr) => Ok(call::async_block(expr, env)),
            syn::Expr::Await(expr) => {
                let value = expr.base.eval(env, ctx)?;
                call::await_value(value, env, ctx)
            }
            syn::Expr::Macro(expr) => call::eval_macro(&expr.mac, env, ctx),

            syn::Expr::Field(expr) => {
                let base = expr.base.eval(env, ctx)?;
                access::read_member(&base, &expr.member)
            }
            syn::Expr::Index(expr) => {
                let base = expr.expr.eval(env, ctx)?;
                let index = expr.index.eval(env, ctx)?;
                access::read_index(&base, &index)
            }
            syn::Expr::Array(expr) => access::eval_elements(&expr.elems, env, ctx),
            syn::Expr::Tuple(expr) if expr.elems.is_empty() => Ok(Value::Unit),
            syn::Expr::Tuple(expr) => access::eval_elements(&expr.elems, env, ctx),
            syn::Expr::Struct(expr) => access::eval_struct(expr, env, ctx),
            syn::Expr::Range(expr) => access::eval_range(expr, env, ctx),

            syn::Expr::Paren(expr) => expr.expr.eval(env, ctx),
            syn::Expr::Group(expr) => expr.expr.eval(env, ctx),
            syn::Expr::Reference(expr) => expr.expr.eval(env, ctx),

            other => Err(EvalError::Unsupported {
                kind: expr_kind_name(other).to_owned(),
            }),
        }
    }
}

/// Human-readable name for an expression kind.
pub(crate) fn expr_kind_name(expr: &syn::Expr) -> &'static str {
    match expr {
        syn::Expr::Array(_) => "array",
        syn::Expr::Assign(_) => "assignment",
        syn::Expr::Async(_) => "async block",
        syn::Expr::Await(_) => "await",
        syn::Expr::Binary(_) => "binary operation",
        syn::Expr::Block(_) => "block",
        syn::Expr::Break(_) => "break",
        syn::Expr::Call(_) => "function call",
        syn::Expr::Cast(_) => "cast",
        syn::Expr::Closure(_) => "closure",
        syn::Expr::Const(_) => "const block",
        syn::Expr::Continue(_) => "continue",
        syn::Expr::Field(_) => "field access",
        syn::Expr::ForLoop(_) => "for loop",
        syn::Expr::If(_) => "if",
        syn::Expr::Index(_) => "index",
        syn::Expr::Let(_) => "let guard",
        syn::Expr::Lit(_) => "literal",
        syn::Expr::Loop(_) => "loop",
        syn::Expr::Macro(_) => "macro invocation",
        syn::Expr::Match(_) => "match",
        syn::Expr::MethodCall(_) => "method call",
        syn::Expr::Path(_) => "path",
        syn::Expr::Range(_) => "range",
        syn::Expr::Reference(_) => "reference",
        syn::Expr::Repeat(_) => "repeat",
        syn::Expr::Return(_) => "return",
        syn::Expr::Struct(_) => "struct literal",
        syn::Expr::Try(_) => "try operator",
        syn::Expr::TryBlock(_) => "try block",
        syn::Expr::Tuple(_) => "tuple",
        syn::Expr::Unary(_) => "unary operation",
        syn::Expr::Unsafe(_) => "unsafe block",
        syn::Expr::While(_) => "while",
        syn::Expr::Yield(_) => "yield",
        _ => "expression",
    }
}
