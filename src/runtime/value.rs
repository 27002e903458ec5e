//! Runtime value representation.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use indexmap::IndexMap;

use super::error::{limit_exceeded, EvalError};

/// Most items a range may expand into.
pub const MAX_ITEMS: usize = 1 << 22;

/// Longest string a builtin may produce, in bytes.
pub const MAX_STRING_BYTES: usize = 1 << 26;

/// Native function signature used by the prelude and modules.
pub type BuiltinFnPtr = Rc<dyn Fn(&[Value]) -> Result<Value, EvalError>>;

/// A value living inside the runtime.
///
/// Compound values are reference counted and copied on write, so cloning a
/// value is cheap. Syntax trees are not `Send`, which keeps the whole runtime
/// on one thread.
#[derive(Debug, Clone)]
pub enum Value {
    /// The unit value `()`, reported as `undefined`.
    Unit,
    /// `None`, reported as `null`.
    Null,
    /// `true` or `false`.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// Immutable string.
    String(Rc<str>),
    /// Ordered list of values.
    Array(Rc<Vec<Value>>),
    /// Half-open integer range.
    Range {
        /// First value.
        start: i64,
        /// One past the last value.
        end: i64,
    },
    /// Struct literal or decoded JSON object.
    Object(Rc<ObjectValue>),
    /// Named function from an `fn` item.
    Function(Rc<FunctionValue>),
    /// Closure with captured bindings.
    Closure(Rc<ClosureValue>),
    /// Native function.
    Builtin(BuiltinFn),
    /// Module returned by `require`.
    Module(Rc<ModuleValue>),
    /// Deferred computation settled by `.await`.
    Future(Rc<FutureValue>),
}

/// Fields of an object, in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectValue {
    /// Struct name used in the literal, `Object` for plain objects.
    pub type_name: String,
    /// Field values.
    pub fields: IndexMap<String, Value>,
}

impl ObjectValue {
    /// A plain `Object` with the given fields.
    #[must_use]
    pub fn plain(fields: IndexMap<String, Value>) -> Self {
        Self {
            type_name: "Object".to_owned(),
            fields,
        }
    }
}

/// A function defined by an `fn` item.
#[derive(Debug)]
pub struct FunctionValue {
    /// Function name.
    pub name: String,
    /// Parameter names; types are erased.
    pub params: Vec<String>,
    /// Body.
    pub body: Rc<syn::Block>,
    /// `async fn` returns a future instead of running the body.
    pub is_async: bool,
}

/// A closure expression with the local bindings it saw when created.
#[derive(Debug)]
pub struct ClosureValue {
    /// Parameter names.
    pub params: Vec<String>,
    /// Body expression.
    pub body: Rc<syn::Expr>,
    /// Local bindings visible at creation. Globals are resolved at call time.
    pub captures: Rc<Vec<(String, Value)>>,
    /// `async |..|` closures return a future.
    pub is_async: bool,
}

/// A native function.
#[derive(Clone)]
pub struct BuiltinFn {
    /// Name for display and errors.
    pub name: String,
    /// Arity, -1 for variadic.
    pub arity: i32,
    /// Implementation.
    pub func: BuiltinFnPtr,
}

impl fmt::Debug for BuiltinFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BuiltinFn({})", self.name)
    }
}

/// A namespace of values returned by `require`.
#[derive(Debug)]
pub struct ModuleValue {
    /// Module name.
    pub name: String,
    /// Exported members.
    pub members: IndexMap<String, Value>,
}

/// Pending work settled by `.await` or by the dispatch loop.
#[derive(Debug)]
pub enum FutureValue {
    /// Resolves to `output` once `delay` has elapsed.
    Timer {
        /// How long to wait.
        delay: Duration,
        /// Value produced afterwards.
        output: Value,
    },
    /// Body of an `async` block, closure or function.
    Deferred {
        /// Code to run.
        body: Rc<syn::Expr>,
        /// Bindings the body runs with.
        captures: Rc<Vec<(String, Value)>>,
    },
}

impl Value {
    /// Build a string value.
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::String(Rc::from(s.as_ref()))
    }

    /// Build an array value.
    #[must_use]
    pub fn array(items: Vec<Value>) -> Self {
        Self::Array(Rc::new(items))
    }

    /// Build an object value.
    #[must_use]
    pub fn object(type_name: impl Into<String>, fields: IndexMap<String, Value>) -> Self {
        Self::Object(Rc::new(ObjectValue {
            type_name: type_name.into(),
            fields,
        }))
    }

    /// Coarse type name reported instead of the value itself.
    #[must_use]
    pub fn type_tag(&self) -> String {
        match self {
            Self::Unit => "undefined".to_owned(),
            Self::Null => "null".to_owned(),
            Self::Bool(_) => "boolean".to_owned(),
            Self::Int(_) | Self::Float(_) => "number".to_owned(),
            Self::String(_) => "string".to_owned(),
            Self::Array(_) => "Array".to_owned(),
            Self::Range { .. } => "Range".to_owned(),
            Self::Object(obj) => obj.type_name.clone(),
            Self::Function(_) | Self::Closure(_) | Self::Builtin(_) => "function".to_owned(),
            Self::Module(_) => "Module".to_owned(),
            Self::Future(_) => "Future".to_owned(),
        }
    }

    /// Number of integers in `start..end`.
    #[must_use]
    pub fn range_len(start: i64, end: i64) -> u64 {
        u64::try_from(i128::from(end) - i128::from(start)).unwrap_or(0)
    }

    /// The integers in `start..end`, for ranges small enough to expand.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::LimitExceeded`] past [`MAX_ITEMS`] items.
    pub fn range_items(start: i64, end: i64) -> Result<std::ops::Range<i64>, EvalError> {
        let len = Self::range_len(start, end);
        if usize::try_from(len).map_or(true, |len| len > MAX_ITEMS) {
            return Err(limit_exceeded(format!("range of {len} items"), MAX_ITEMS));
        }
        Ok(start..end)
    }

    /// Whether the value can be called.
    #[must_use]
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_) | Self::Closure(_) | Self::Builtin(_))
    }

    /// Build a value from plain JSON.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN)), Self::Int),
            serde_json::Value::String(s) => Self::string(s),
            serde_json::Value::Array(items) => {
                Self::array(items.iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(fields) => Self::object(
                "Object",
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Serialize to JSON.
    ///
    /// Unit becomes `null`, ranges become arrays, and non-finite floats become
    /// `null`.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::NotSerializable`] for callables, modules and
    /// futures, anywhere in the value.
    pub fn to_json(&self) -> Result<serde_json::Value, EvalError> {
        Ok(match self {
            Self::Unit | Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.to_string()),
            Self::Array(items) => serde_json::Value::Array(
                items.iter().map(Self::to_json).collect::<Result<_, _>>()?,
            ),
            Self::Range { start, end } => serde_json::Value::Array(
                Self::range_items(*start, *end)?
                    .map(serde_json::Value::from)
                    .collect(),
            ),
            Self::Object(obj) => serde_json::Value::Object(
                obj.fields
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
                    .collect::<Result<_, EvalError>>()?,
            ),
            Self::Function(_)
            | Self::Closure(_)
            | Self::Builtin(_)
            | Self::Module(_)
            | Self::Future(_) => {
                return Err(EvalError::NotSerializable {
                    type_name: self.type_tag(),
                })
            }
        })
    }

    /// Numeric view used by mixed int/float arithmetic.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Truthiness used by conditions that accept non-booleans.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Unit | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0 && !f.is_nan(),
            Self::String(s) => !s.is_empty(),
            _ => true,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unit, Self::Unit) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Range { start: s1, end: e1 }, Self::Range { start: s2, end: e2 }) => {
                s1 == s2 && e1 == e2
            }
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Closure(a), Self::Closure(b)) => Rc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => Rc::ptr_eq(&a.func, &b.func),
            (Self::Module(a), Self::Module(b)) => a.name == b.name,
            (Self::Future(a), Self::Future(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_nested(f, item)?;
                }
                f.write_str("]")
            }
            Self::Range { start, end } => write!(f, "{start}..{end}"),
            Self::Object(obj) => {
                write!(f, "{} {{", obj.type_name)?;
                for (i, (name, value)) in obj.fields.iter().enumerate() {
                    f.write_str(if i == 0 { " " } else { ", " })?;
                    write!(f, "{name}: ")?;
                    write_nested(f, value)?;
                }
                f.write_str(if obj.fields.is_empty() { "}" } else { " }" })
            }
            Self::Function(func) => write!(f, "<fn {}>", func.name),
            Self::Closure(_) => f.write_str("<closure>"),
            Self::Builtin(b) => write!(f, "<builtin {}>", b.name),
            Self::Module(m) => write!(f, "<module {}>", m.name),
            Self::Future(_) => f.write_str("<future>"),
        }
    }
}

/// Strings nested in containers are shown quoted.
fn write_nested(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => write!(f, "{:?}", &**s),
        other => write!(f, "{other}"),
    }
}
