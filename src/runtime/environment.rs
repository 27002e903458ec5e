//! Variable and function bindings.

use super::error::EvalError;
use super::value::{BuiltinFn, Value};

/// A single binding.
#[derive(Debug, Clone)]
pub struct Binding {
    /// Name.
    pub name: String,
    /// Bound value.
    pub value: Value,
    /// Declared with `mut`.
    pub mutable: bool,
}

/// Bindings for the shared execution context.
///
/// Uses a flat binding list with frame boundaries. Function calls open a call
/// frame that hides the caller's locals: lookups inside a call see the
/// callee's locals first and then the global frame.
#[derive(Debug, Clone)]
pub struct Environment {
    /// All bindings, most recent last.
    bindings: Vec<Binding>,
    /// Indices into `bindings` where each scope begins.
    frames: Vec<usize>,
    /// Indices where each active call's locals begin.
    calls: Vec<usize>,
    /// Maximum number of nested calls.
    max_call_depth: usize,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// Create an empty environment with the default call depth limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_call_depth(1000)
    }

    /// Create an empty environment with a custom call depth limit.
    #[must_use]
    pub fn with_max_call_depth(max_call_depth: usize) -> Self {
        Self {
            bindings: Vec::new(),
            frames: vec![0],
            calls: Vec::new(),
            max_call_depth,
        }
    }

    /// Run `f` in a nested block scope.
    ///
    /// Bindings made inside are removed afterwards, whether `f` fails or not.
    pub fn scoped<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, EvalError>,
    ) -> Result<T, EvalError> {
        self.frames.push(self.bindings.len());
        let result = f(self);
        self.pop_frame();
        result
    }

    /// Run `f` as a function call with `locals` pre-bound.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::StackOverflow`] when the call depth limit is hit.
    pub fn call_frame<T>(
        &mut self,
        locals: impl IntoIterator<Item = (String, Value)>,
        f: impl FnOnce(&mut Self) -> Result<T, EvalError>,
    ) -> Result<T, EvalError> {
        if self.calls.len() >= self.max_call_depth {
            return Err(EvalError::StackOverflow {
                depth: self.calls.len(),
                max: self.max_call_depth,
            });
        }

        let base = self.bindings.len();
        self.frames.push(base);
        self.calls.push(base);
        for (name, value) in locals {
            self.define(name, value);
        }

        let result = f(self);

        self.calls.pop();
        self.pop_frame();
        result
    }

    fn pop_frame(&mut self) {
        // The global frame is never popped.
        if self.frames.len() > 1 {
            if let Some(boundary) = self.frames.pop() {
                self.bindings.truncate(boundary);
            }
        }
    }

    /// Drop every scope and call frame above the global one.
    ///
    /// Used after an evaluation was abandoned midway.
    pub fn unwind_to_global(&mut self) {
        if let Some(&boundary) = self.frames.get(1) {
            self.bindings.truncate(boundary);
        }
        self.frames.truncate(1);
        self.calls.clear();
    }

    /// Current number of nested calls.
    #[must_use]
    pub fn call_depth(&self) -> usize {
        self.calls.len()
    }

    /// Define an immutable binding in the current scope, shadowing any other.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.define_with_mode(name, value, false);
    }

    /// Define a binding with explicit mutability.
    pub fn define_with_mode(&mut self, name: impl Into<String>, value: Value, mutable: bool) {
        self.bindings.push(Binding {
            name: name.into(),
            value,
            mutable,
        });
    }

    /// Register a native function.
    pub fn define_builtin(&mut self, builtin: BuiltinFn) {
        let name = builtin.name.clone();
        self.define(name, Value::Builtin(builtin));
    }

    /// Index of the binding `name` resolves to.
    fn resolve(&self, name: &str) -> Option<usize> {
        let base = self.calls.last().copied().unwrap_or(0);
        let local = self.bindings[base..]
            .iter()
            .rposition(|b| b.name == name)
            .map(|i| i + base);

        local.or_else(|| {
            let global_end = self.frames.get(1).copied().unwrap_or(base).min(base);
            self.bindings[..global_end]
                .iter()
                .rposition(|b| b.name == name)
        })
    }

    /// Look up a binding by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.resolve(name).map(|i| &self.bindings[i].value)
    }

    /// Mutable access to a binding's value.
    ///
    /// # Errors
    ///
    /// - `UndefinedVariable` if the binding doesn't exist
    /// - `ImmutableBinding` if the binding is not mutable
    pub fn get_mut(&mut self, name: &str) -> Result<&mut Value, EvalError> {
        let i = self
            .resolve(name)
            .ok_or_else(|| EvalError::UndefinedVariable {
                name: name.to_owned(),
            })?;

        let binding = &mut self.bindings[i];
        if !binding.mutable {
            return Err(EvalError::ImmutableBinding {
                name: name.to_owned(),
            });
        }
        Ok(&mut binding.value)
    }

    /// Assign a new value to an existing mutable binding.
    ///
    /// # Errors
    ///
    /// Same as [`Environment::get_mut`].
    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        *self.get_mut(name)? = value;
        Ok(())
    }

    /// Bindings local to the current call, outermost first.
    ///
    /// At top level this is every binding inside nested blocks. Globals are not
    /// captured; closures resolve them when they run.
    #[must_use]
    pub fn capture(&self) -> Vec<(String, Value)> {
        let start = self
            .calls
            .last()
            .copied()
            .unwrap_or_else(|| self.frames.get(1).copied().unwrap_or(self.bindings.len()));
        self.bindings[start..]
            .iter()
            .map(|b| (b.name.clone(), b.value.clone()))
            .collect()
    }
}
