//! Literals, unary, binary and cast operators.

use std::cmp::Ordering;

use super::access::assign_place;
use super::{EvalContext, Evaluate};
use crate::runtime::environment::Environment;
use crate::runtime::error::EvalError;
use crate::runtime::value::Value;

/// Binary operators after compound assignment has been desugared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Map a `syn` operator, reporting whether it was a compound assignment.
    fn from_syn(op: &syn::BinOp) -> Option<(Self, bool)> {
        Some(match op {
            syn::BinOp::Add(_) => (Self::Add, false),
            syn::BinOp::Sub(_) => (Self::Sub, false),
            syn::BinOp::Mul(_) => (Self::Mul, false),
            syn::BinOp::Div(_) => (Self::Div, false),
            syn::BinOp::Rem(_) => (Self::Rem, false),
            syn::BinOp::BitAnd(_) => (Self::BitAnd, false),
            syn::BinOp::BitOr(_) => (Self::BitOr, false),
            syn::BinOp::BitXor(_) => (Self::BitXor, false),
            syn::BinOp::Shl(_) => (Self::Shl, false),
            syn::BinOp::Shr(_) => (Self::Shr, false),
            syn::BinOp::Eq(_) => (Self::Eq, false),
            syn::BinOp::Ne(_) => (Self::Ne, false),
            syn::BinOp::Lt(_) => (Self::Lt, false),
            syn::BinOp::Le(_) => (Self::Le, false),
            syn::BinOp::Gt(_) => (Self::Gt, false),
            syn::BinOp::Ge(_) => (Self::Ge, false),
            syn::BinOp::AddAssign(_) => (Self::Add, true),
            syn::BinOp::SubAssign(_) => (Self::Sub, true),
            syn::BinOp::MulAssign(_) => (Self::Mul, true),
            syn::BinOp::DivAssign(_) => (Self::Div, true),
            syn::BinOp::RemAssign(_) => (Self::Rem, true),
            syn::BinOp::BitAndAssign(_) => (Self::BitAnd, true),
            syn::BinOp::BitOrAssign(_) => (Self::BitOr, true),
            syn::BinOp::BitXorAssign(_) => (Self::BitXor, true),
            syn::BinOp::ShlAssign(_) => (Self::Shl, true),
            syn::BinOp::ShrAssign(_) => (Self::Shr, true),
            _ => return None,
        })
    }
}

/// Evaluate a literal.
///
/// # Errors
///
/// Returns `Parse` for numbers out of range and `Unsupported` for byte literals.
pub fn eval_lit(lit: &syn::Lit) -> Result<Value, EvalError> {
    match lit {
        syn::Lit::Str(s) => Ok(Value::string(s.value())),
        syn::Lit::Char(c) => Ok(Value::string(c.value().to_string())),
        syn::Lit::Bool(b) => Ok(Value::Bool(b.value)),
        syn::Lit::Int(i) => i
            .base10_parse::<i64>()
            .map(Value::Int)
            .map_err(|e| EvalError::Parse {
                message: e.to_string(),
            }),
        syn::Lit::Float(f) => f
            .base10_parse::<f64>()
            .map(Value::Float)
            .map_err(|e| EvalError::Parse {
                message: e.to_string(),
            }),
        _ => Err(EvalError::Unsupported {
            kind: "byte literal".to_owned(),
        }),
    }
}

/// Evaluate `-x`, `!x` and `*x`.
///
/// # Errors
///
/// Returns `InvalidUnaryOperand` when the operand type does not support the
/// operator.
pub fn eval_unary(
    expr: &syn::ExprUnary,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    let operand = expr.expr.eval(env, ctx)?;
    match (&expr.op, operand) {
        (syn::UnOp::Neg(_), Value::Int(i)) => {
            i.checked_neg()
                .map(Value::Int)
                .ok_or_else(|| EvalError::IntegerOverflow {
                    op: "-".to_owned(),
                })
        }
        (syn::UnOp::Neg(_), Value::Float(f)) => Ok(Value::Float(-f)),
        (syn::UnOp::Not(_), Value::Bool(b)) => Ok(Value::Bool(!b)),
        (syn::UnOp::Not(_), Value::Int(i)) => Ok(Value::Int(!i)),
        (syn::UnOp::Deref(_), value) => Ok(value),
        (op, other) => Err(EvalError::InvalidUnaryOperand {
            op: match op {
                syn::UnOp::Neg(_) => "-",
                _ => "!",
            }
            .to_owned(),
            operand: other.type_tag(),
        }),
    }
}

/// Evaluate a binary expression, including `&&`, `||` and compound assignment.
///
/// # Errors
///
/// Returns the operand or assignment error raised.
pub fn eval_binary(
    expr: &syn::ExprBinary,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    match &expr.op {
        syn::BinOp::And(_) => {
            let left = expect_bool("&&", expr.left.eval(env, ctx)?)?;
            if !left {
                return Ok(Value::Bool(false));
            }
            return expect_bool("&&", expr.right.eval(env, ctx)?).map(Value::Bool);
        }
        syn::BinOp::Or(_) => {
            let left = expect_bool("||", expr.left.eval(env, ctx)?)?;
            if left {
                return Ok(Value::Bool(true));
            }
            return expect_bool("||", expr.right.eval(env, ctx)?).map(Value::Bool);
        }
        _ => {}
    }

    let (op, is_assign) = BinaryOp::from_syn(&expr.op).ok_or_else(|| EvalError::Unsupported {
        kind: "binary operator".to_owned(),
    })?;

    let left = expr.left.eval(env, ctx)?;
    let right = expr.right.eval(env, ctx)?;
    let result = apply_binary(op, left, right)?;

    if is_assign {
        assign_place(&expr.left, result, env, ctx)?;
        Ok(Value::Unit)
    } else {
        Ok(result)
    }
}

fn expect_bool(op: &str, value: Value) -> Result<bool, EvalError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::InvalidUnaryOperand {
            op: op.to_owned(),
            operand: other.type_tag(),
        }),
    }
}

/// Apply a binary operator to two evaluated operands.
///
/// `+` concatenates when either side is a string, and joins two arrays.
/// Mixed integer and float arithmetic promotes to float.
///
/// # Errors
///
/// Returns `InvalidBinaryOperands`, `DivisionByZero` or `IntegerOverflow`.
pub fn apply_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(left == right)),
        BinaryOp::Ne => return Ok(Value::Bool(left != right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&left, &right)
                .ok_or_else(|| invalid_operands(op, &left, &right))?;
            return Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }));
        }
        _ => {}
    }

    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_op(op, a, b),
        (Value::String(a), b) if op == BinaryOp::Add => Ok(Value::string(format!("{a}{b}"))),
        (a, Value::String(b)) if op == BinaryOp::Add => Ok(Value::string(format!("{a}{b}"))),
        (Value::Array(a), Value::Array(b)) if op == BinaryOp::Add => {
            let mut items = Vec::with_capacity(a.len() + b.len());
            items.extend(a.iter().cloned());
            items.extend(b.iter().cloned());
            Ok(Value::array(items))
        }
        (Value::Bool(a), Value::Bool(b)) => match op {
            BinaryOp::BitAnd => Ok(Value::Bool(a & b)),
            BinaryOp::BitOr => Ok(Value::Bool(a | b)),
            BinaryOp::BitXor => Ok(Value::Bool(a ^ b)),
            _ => Err(invalid_operands(op, &Value::Bool(a), &Value::Bool(b))),
        },
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => float_op(op, x, y).ok_or_else(|| invalid_operands(op, &a, &b)),
            _ => Err(invalid_operands(op, &a, &b)),
        },
    }
}

fn int_op(op: BinaryOp, a: i64, b: i64) -> Result<Value, EvalError> {
    let overflow = || EvalError::IntegerOverflow {
        op: op.symbol().to_owned(),
    };
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div | BinaryOp::Rem if b == 0 => return Err(EvalError::DivisionByZero),
        BinaryOp::Div => a.checked_div(b),
        BinaryOp::Rem => a.checked_rem(b),
        BinaryOp::BitAnd => Some(a & b),
        BinaryOp::BitOr => Some(a | b),
        BinaryOp::BitXor => Some(a ^ b),
        BinaryOp::Shl => u32::try_from(b).ok().and_then(|s| a.checked_shl(s)),
        BinaryOp::Shr => u32::try_from(b).ok().and_then(|s| a.checked_shr(s)),
        _ => None,
    };
    result.map(Value::Int).ok_or_else(overflow)
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> Option<Value> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => return None,
    };
    Some(Value::Float(result))
}

fn invalid_operands(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    EvalError::InvalidBinaryOperands {
        op: op.symbol().to_owned(),
        left: left.type_tag(),
        right: right.type_tag(),
    }
}

/// Order two values of comparable types.
#[must_use]
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

/// Evaluate `expr as ty` for numeric and boolean conversions.
///
/// # Errors
///
/// Returns `Unsupported` for non-primitive target types and `TypeError` for
/// operands that cannot be converted.
pub fn eval_cast(
    expr: &syn::ExprCast,
    env: &mut Environment,
    ctx: &EvalContext,
) -> Result<Value, EvalError> {
    let value = expr.expr.eval(env, ctx)?;
    let target = match expr.ty.as_ref() {
        syn::Type::Path(path) => path
            .path
            .get_ident()
            .map(ToString::to_string)
            .unwrap_or_default(),
        _ => String::new(),
    };

    match target.as_str() {
        "f32" | "f64" => value.as_f64().map(Value::Float).ok_or_else(|| {
            crate::runtime::error::type_error(format!("cannot cast {} to {target}", value.type_tag()))
        }),
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
        | "u128" | "usize" => match value {
            Value::Int(i) => Ok(Value::Int(i)),
            #[allow(clippy::cast_possible_truncation)]
            Value::Float(f) => Ok(Value::Int(f as i64)),
            Value::Bool(b) => Ok(Value::Int(i64::from(b))),
            other => Err(crate::runtime::error::type_error(format!(
                "cannot cast {} to {target}",
                other.type_tag()
            ))),
        },
        _ => Err(EvalError::Unsupported {
            kind: format!("cast to `{target}`"),
        }),
    }
}
