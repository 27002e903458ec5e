//! Rust-syntax evaluation runtime used by the executor.
//!
//! Source text is parsed with `syn` and walked directly. The runtime has no
//! access to the file system, the environment or the process; the only way
//! out is the standard error stream used by the printing builtins.

pub mod environment;
pub mod error;
pub mod eval;
pub mod methods;
pub mod prelude;
pub mod value;

use tracing::debug;

use self::environment::Environment;
use self::error::{type_error, ControlFlow, EvalError};
use self::eval::access::read_property;
use self::eval::call::{await_value, call_value, function_from_item, invoke_method};
use self::eval::control::eval_stmts;
use self::eval::{EvalContext, Evaluate};
use self::methods::MethodOutcome;
use self::value::Value;

/// Default limit on nested calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

/// A shared execution context.
///
/// Top-level `let` bindings and `fn` items persist between evaluations.
#[derive(Debug)]
pub struct Runtime {
    env: Environment,
    ctx: EvalContext,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Create a runtime with the prelude loaded.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_call_depth(DEFAULT_MAX_CALL_DEPTH)
    }

    /// Create a runtime with a custom call depth limit.
    #[must_use]
    pub fn with_max_call_depth(max_call_depth: usize) -> Self {
        let mut env = Environment::with_max_call_depth(max_call_depth);
        prelude::install(&mut env);
        Self {
            env,
            ctx: EvalContext::new(),
        }
    }

    /// Evaluate a sequence of statements at top level.
    ///
    /// The result is the value of the trailing expression, or of a top-level
    /// `return`. Futures are returned unsettled; see [`Runtime::settle`].
    ///
    /// # Errors
    ///
    /// Returns `Parse` for invalid source and whatever evaluation raises.
    pub fn eval_source(&mut self, code: &str) -> Result<Value, EvalError> {
        let block: syn::Block = syn::parse_str(&format!("{{\n{code}\n}}")).map_err(|e| {
            EvalError::Parse {
                message: e.to_string(),
            }
        })?;

        match eval_stmts(&block.stmts, &mut self.env, &self.ctx) {
            Err(EvalError::ControlFlow(ControlFlow::Return { value })) => Ok(value),
            other => other,
        }
    }

    /// Compile a function literal: a closure expression or an `fn` item.
    ///
    /// An `fn` item is returned as a value without being bound globally.
    ///
    /// # Errors
    ///
    /// Returns `Parse` for invalid source and `TypeError` when the source
    /// does not evaluate to something callable.
    pub fn compile_function(&mut self, source: &str) -> Result<Value, EvalError> {
        let trimmed = source.trim_start();
        if trimmed.starts_with("fn") || trimmed.starts_with("async fn") {
            let item: syn::ItemFn = syn::parse_str(source).map_err(|e| EvalError::Parse {
                message: e.to_string(),
            })?;
            let func = function_from_item(&item)?;
            debug!(name = %func.name, "compiled fn item");
            return Ok(Value::Function(std::rc::Rc::new(func)));
        }

        let expr: syn::Expr = syn::parse_str(source).map_err(|e| EvalError::Parse {
            message: e.to_string(),
        })?;
        let value = expr.eval(&mut self.env, &self.ctx)?;
        if value.is_callable() {
            Ok(value)
        } else {
            Err(type_error(format!(
                "expected a function literal, found {}",
                value.type_tag()
            )))
        }
    }

    /// Call a function value with `args`.
    ///
    /// # Errors
    ///
    /// Returns whatever the call raises.
    pub fn call(&mut self, func: &Value, args: Vec<Value>) -> Result<Value, EvalError> {
        call_value(func, args, &mut self.env, &self.ctx)
    }

    /// Call method `name` on `receiver`; `Ok(None)` when there is no such
    /// method.
    ///
    /// # Errors
    ///
    /// Returns whatever the method raises.
    pub fn call_method(
        &mut self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Option<MethodOutcome>, EvalError> {
        invoke_method(receiver, name, args, &mut self.env, &self.ctx)
    }

    /// Read property `name` of `value`.
    ///
    /// # Errors
    ///
    /// Returns `UndefinedField` when it does not exist.
    pub fn property(&self, value: &Value, name: &str) -> Result<Value, EvalError> {
        read_property(value, name)
    }

    /// Settle `value` if it is a future, then wait for any timers awaited
    /// along the way.
    ///
    /// # Errors
    ///
    /// Returns whatever the future's body raises.
    pub async fn settle(&mut self, value: Value) -> Result<Value, EvalError> {
        let result = await_value(value, &mut self.env, &self.ctx);
        let owed = self.ctx.take_delay();
        if !owed.is_zero() {
            debug!(delay_ms = owed.as_millis(), "waiting for timers");
            tokio::time::sleep(owed).await;
        }
        result
    }

    /// Restore a usable state after an evaluation was abandoned midway.
    ///
    /// Globals defined before the failure are kept; locals, call frames and
    /// time owed by timers are dropped.
    pub fn recover(&mut self) {
        self.env.unwind_to_global();
        self.ctx.take_delay();
    }

    /// Look up a global binding.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.env.get(name)
    }
}
