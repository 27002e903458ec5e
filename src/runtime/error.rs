//! Evaluation errors and non-local control flow.

use thiserror::Error;

use super::value::Value;

/// Errors raised while evaluating code.
#[derive(Error, Debug, Clone)]
pub enum EvalError {
    /// Name not bound in scope.
    #[error("undefined variable `{name}`")]
    UndefinedVariable {
        /// The missing name.
        name: String,
    },

    /// Value of the wrong type.
    #[error("type error: {message}")]
    TypeError {
        /// What was expected and what was found.
        message: String,
    },

    /// Wrong number of arguments.
    #[error("`{name}` expects {expected} argument(s), got {got}")]
    ArityMismatch {
        /// Callee name.
        name: String,
        /// Declared parameter count.
        expected: usize,
        /// Supplied argument count.
        got: usize,
    },

    /// Binary operator applied to incompatible operands.
    #[error("cannot apply `{op}` to {left} and {right}")]
    InvalidBinaryOperands {
        /// Operator.
        op: String,
        /// Left operand type.
        left: String,
        /// Right operand type.
        right: String,
    },

    /// Unary operator applied to an incompatible operand.
    #[error("cannot apply `{op}` to {operand}")]
    InvalidUnaryOperand {
        /// Operator.
        op: String,
        /// Operand type.
        operand: String,
    },

    /// Integer division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Checked integer arithmetic overflowed.
    #[error("integer overflow in `{op}`")]
    IntegerOverflow {
        /// Operator.
        op: String,
    },

    /// Index past the end of an array or string.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds {
        /// Requested index.
        index: i64,
        /// Actual length.
        len: usize,
    },

    /// Missing field or property.
    #[error("no field `{field}` on {type_name}")]
    UndefinedField {
        /// Requested field.
        field: String,
        /// Type of the receiver.
        type_name: String,
    },

    /// Missing method.
    #[error("no method `{method}` on {type_name}")]
    UndefinedMethod {
        /// Requested method.
        method: String,
        /// Type of the receiver.
        type_name: String,
    },

    /// Assignment to a binding declared without `mut`.
    #[error("cannot assign twice to immutable variable `{name}`")]
    ImmutableBinding {
        /// Binding name.
        name: String,
    },

    /// Left-hand side that cannot be assigned to.
    #[error("invalid assignment target: {kind}")]
    InvalidAssignTarget {
        /// Kind of expression found.
        kind: String,
    },

    /// Syntax the runtime does not implement.
    #[error("unsupported {kind}")]
    Unsupported {
        /// Kind of syntax.
        kind: String,
    },

    /// Source text failed to parse.
    #[error("parse error: {message}")]
    Parse {
        /// Parser message.
        message: String,
    },

    /// Call depth limit reached.
    #[error("stack overflow: call depth {depth} exceeds maximum {max}")]
    StackOverflow {
        /// Depth reached.
        depth: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A value would grow past a runtime size limit.
    #[error("{what} exceeds the limit of {limit}")]
    LimitExceeded {
        /// What was being built.
        what: String,
        /// The limit that applies.
        limit: usize,
    },

    /// A native function failed.
    #[error("{name}: {message}")]
    BuiltinError {
        /// Function name.
        name: String,
        /// Failure message.
        message: String,
    },

    /// Value that cannot cross the wire as data.
    #[error("value of type `{type_name}` cannot be serialized")]
    NotSerializable {
        /// Type tag of the value.
        type_name: String,
    },

    /// A value raised with `throw`.
    #[error("uncaught {0}")]
    Thrown(Value),

    /// `break`, `continue` or `return` travelling to its target.
    #[error("{0} outside of a loop or function")]
    ControlFlow(ControlFlow),
}

impl EvalError {
    /// Short classification reported as the error's name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UndefinedVariable { .. }
            | Self::UndefinedField { .. }
            | Self::UndefinedMethod { .. } => "ReferenceError",
            Self::TypeError { .. }
            | Self::ArityMismatch { .. }
            | Self::InvalidBinaryOperands { .. }
            | Self::InvalidUnaryOperand { .. }
            | Self::ImmutableBinding { .. }
            | Self::InvalidAssignTarget { .. }
            | Self::NotSerializable { .. } => "TypeError",
            Self::DivisionByZero
            | Self::IntegerOverflow { .. }
            | Self::IndexOutOfBounds { .. }
            | Self::StackOverflow { .. }
            | Self::LimitExceeded { .. } => "RangeError",
            Self::Unsupported { .. } | Self::Parse { .. } | Self::ControlFlow(_) => "SyntaxError",
            Self::BuiltinError { .. } | Self::Thrown(_) => "Error",
        }
    }
}

/// Control flow signal for non-local jumps.
///
/// Travels up as `Err(EvalError::ControlFlow(..))` until the enclosing loop
/// or function catches it.
#[derive(Debug, Clone)]
pub enum ControlFlow {
    /// Leave a loop, optionally with a value.
    Break {
        /// Value the loop evaluates to.
        value: Value,
        /// Target loop label.
        label: Option<String>,
    },
    /// Skip to the next iteration.
    Continue {
        /// Target loop label.
        label: Option<String>,
    },
    /// Leave the current function.
    Return {
        /// Returned value.
        value: Value,
    },
}

impl ControlFlow {
    /// Whether a loop labelled `loop_label` should handle this signal.
    #[must_use]
    pub fn targets(&self, loop_label: Option<&str>) -> bool {
        match self {
            Self::Break { label, .. } | Self::Continue { label } => {
                label.is_none() || label.as_deref() == loop_label
            }
            Self::Return { .. } => false,
        }
    }
}

impl std::fmt::Display for ControlFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Break { .. } => f.write_str("`break`"),
            Self::Continue { .. } => f.write_str("`continue`"),
            Self::Return { .. } => f.write_str("`return`"),
        }
    }
}

/// Shorthand for a type error.
pub(crate) fn type_error(message: impl Into<String>) -> EvalError {
    EvalError::TypeError {
        message: message.into(),
    }
}

/// Shorthand for a size limit violation.
pub(crate) fn limit_exceeded(what: impl Into<String>, limit: usize) -> EvalError {
    EvalError::LimitExceeded {
        what: what.into(),
        limit,
    }
}
