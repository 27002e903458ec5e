//! Global functions and the modules reachable through `require`.
//!
//! Nothing here touches the file system, the environment or the process.
//! Output goes to standard error because standard output carries protocol
//! traffic.

use std::rc::Rc;
use std::time::Duration;

use indexmap::IndexMap;

use super::environment::Environment;
use super::error::{limit_exceeded, type_error, EvalError};
use super::value::{BuiltinFn, FutureValue, ModuleValue, Value};

/// Longest delay `sleep` accepts, in milliseconds.
pub const MAX_SLEEP_MS: u32 = 2_147_483_647;

fn builtin(
    name: &str,
    arity: i32,
    func: impl Fn(&[Value]) -> Result<Value, EvalError> + 'static,
) -> BuiltinFn {
    BuiltinFn {
        name: name.to_owned(),
        arity,
        func: Rc::new(func),
    }
}

fn fail(name: &str, message: impl Into<String>) -> EvalError {
    EvalError::BuiltinError {
        name: name.to_owned(),
        message: message.into(),
    }
}

/// Bind the prelude into `env`.
pub fn install(env: &mut Environment) {
    env.define("None", Value::Null);

    env.define_builtin(builtin("type_of", 1, |args| {
        Ok(Value::string(args[0].type_tag()))
    }));

    env.define_builtin(builtin("print", -1, |args| {
        eprint!("{}", joined(args));
        Ok(Value::Unit)
    }));
    env.define_builtin(builtin("println", -1, |args| {
        eprintln!("{}", joined(args));
        Ok(Value::Unit)
    }));
    env.define_builtin(builtin("dbg", 1, |args| {
        eprintln!("[dbg] {}", debug_repr(&args[0]));
        Ok(args[0].clone())
    }));

    env.define_builtin(builtin("throw", 1, |args| Err(EvalError::Thrown(args[0].clone()))));
    env.define_builtin(builtin("error", -1, make_error));
    env.define_builtin(builtin("panic", -1, |args| {
        let message = if args.is_empty() {
            "explicit panic".to_owned()
        } else {
            joined(args)
        };
        Err(fail("panic", message))
    }));
    env.define_builtin(builtin("assert", -1, |args| match args {
        [cond] | [cond, _] if cond.is_truthy() => Ok(Value::Unit),
        [_] => Err(fail("assert", "assertion failed")),
        [_, message] => Err(fail("assert", message.to_string())),
        _ => Err(type_error("`assert` expects a condition and an optional message")),
    }));
    env.define_builtin(builtin("assert_eq", 2, |args| {
        if args[0] == args[1] {
            Ok(Value::Unit)
        } else {
            Err(fail(
                "assert_eq",
                format!(
                    "left: {}, right: {}",
                    debug_repr(&args[0]),
                    debug_repr(&args[1])
                ),
            ))
        }
    }));

    env.define_builtin(builtin("sleep", -1, sleep));
    env.define_builtin(builtin("require", 1, |args| match &args[0] {
        Value::String(name) => require(name),
        other => Err(type_error(format!(
            "`require` expects a module name, found {}",
            other.type_tag()
        ))),
    }));
}

fn joined(args: &[Value]) -> String {
    args.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn debug_repr(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{:?}", &**s),
        other => other.to_string(),
    }
}

/// `error(message)` or `error(message, code)`.
fn make_error(args: &[Value]) -> Result<Value, EvalError> {
    let (message, code) = match args {
        [message] => (message, None),
        [message, code] => (message, Some(code)),
        _ => return Err(type_error("`error` expects a message and an optional code")),
    };

    let mut fields = IndexMap::new();
    fields.insert("name".to_owned(), Value::string("Error"));
    fields.insert("message".to_owned(), Value::string(message.to_string()));
    if let Some(code) = code {
        fields.insert("code".to_owned(), code.clone());
    }
    Ok(Value::object("Error", fields))
}

/// `sleep(ms)` or `sleep(ms, value)`; the future resolves to `value` or unit.
fn sleep(args: &[Value]) -> Result<Value, EvalError> {
    let (ms, output) = match args {
        [ms] => (ms, Value::Unit),
        [ms, output] => (ms, output.clone()),
        _ => return Err(type_error("`sleep` expects a delay and an optional value")),
    };

    let ms = match ms.as_f64() {
        Some(ms) if ms.is_finite() && ms >= 0.0 => ms,
        _ => return Err(type_error("`sleep` delay must be a non-negative number")),
    };
    if ms > f64::from(MAX_SLEEP_MS) {
        return Err(limit_exceeded("`sleep` delay in milliseconds", MAX_SLEEP_MS as usize));
    }
    let delay = Duration::try_from_secs_f64(ms / 1000.0)
        .map_err(|err| type_error(format!("invalid `sleep` delay: {err}")))?;
    Ok(Value::Future(Rc::new(FutureValue::Timer { delay, output })))
}

/// Load a module by name.
///
/// # Errors
///
/// Throws an `Error` object when the module is unknown.
pub fn require(name: &str) -> Result<Value, EvalError> {
    let members = match name {
        "path" => path_module(),
        "math" => math_module(),
        _ => {
            let mut fields = IndexMap::new();
            fields.insert("name".to_owned(), Value::string("Error"));
            fields.insert(
                "message".to_owned(),
                Value::string(format!("cannot find module '{name}'")),
            );
            fields.insert("code".to_owned(), Value::string("MODULE_NOT_FOUND"));
            return Err(EvalError::Thrown(Value::object("Error", fields)));
        }
    };
    Ok(Value::Module(Rc::new(ModuleValue {
        name: name.to_owned(),
        members,
    })))
}

fn members(builtins: Vec<BuiltinFn>) -> IndexMap<String, Value> {
    builtins
        .into_iter()
        .map(|b| (b.name.clone(), Value::Builtin(b)))
        .collect()
}

fn strings<'a>(name: &str, args: &'a [Value]) -> Result<Vec<&'a str>, EvalError> {
    args.iter()
        .map(|arg| match arg {
            Value::String(s) => Ok(&**s),
            other => Err(type_error(format!(
                "`{name}` expects string arguments, found {}",
                other.type_tag()
            ))),
        })
        .collect()
}

fn path_module() -> IndexMap<String, Value> {
    members(vec![
        builtin("join", -1, |args| {
            let parts = strings("join", args)?;
            let joined = parts
                .into_iter()
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join("/");
            Ok(Value::string(normalize(&joined)))
        }),
        builtin("normalize", 1, |args| {
            Ok(Value::string(normalize(strings("normalize", args)?[0])))
        }),
        builtin("basename", -1, |args| {
            let parts = strings("basename", args)?;
            let (path, ext) = match parts.as_slice() {
                [path] => (*path, None),
                [path, ext] => (*path, Some(*ext)),
                _ => return Err(type_error("`basename` expects a path and an optional extension")),
            };
            Ok(Value::string(basename(path, ext)))
        }),
        builtin("dirname", 1, |args| {
            Ok(Value::string(dirname(strings("dirname", args)?[0])))
        }),
        builtin("extname", 1, |args| {
            Ok(Value::string(extname(strings("extname", args)?[0])))
        }),
        builtin("is_absolute", 1, |args| {
            Ok(Value::Bool(strings("is_absolute", args)?[0].starts_with('/')))
        }),
    ])
}

/// Collapse separators and resolve `.` and `..` segments.
fn normalize(path: &str) -> String {
    if path.is_empty() {
        return ".".to_owned();
    }
    let absolute = path.starts_with('/');
    let trailing = path.ends_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let mut out = segments.join("/");
    if absolute {
        out.insert(0, '/');
    }
    if out.is_empty() {
        return ".".to_owned();
    }
    if trailing && !out.ends_with('/') {
        out.push('/');
    }
    out
}

fn basename<'a>(path: &'a str, ext: Option<&str>) -> &'a str {
    let trimmed = path.trim_end_matches('/');
    let base = trimmed.rsplit('/').next().unwrap_or(trimmed);
    match ext {
        Some(ext) if base != ext => base.strip_suffix(ext).unwrap_or(base),
        _ => base,
    }
}

fn dirname(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        let root = if path.starts_with('/') { "/" } else { "." };
        return root.to_owned();
    }
    match trimmed.rfind('/') {
        None => ".".to_owned(),
        Some(0) => "/".to_owned(),
        Some(i) => trimmed[..i].trim_end_matches('/').to_owned(),
    }
}

fn extname(path: &str) -> &str {
    let base = basename(path, None);
    match base.rfind('.') {
        Some(i) if i > 0 => &base[i..],
        _ => "",
    }
}

fn number(name: &str, value: &Value) -> Result<f64, EvalError> {
    value
        .as_f64()
        .ok_or_else(|| type_error(format!("`{name}` expects numbers, found {}", value.type_tag())))
}

fn float_fn(name: &'static str, op: fn(f64) -> f64) -> BuiltinFn {
    builtin(name, 1, move |args| match &args[0] {
        Value::Int(i) if name != "sqrt" => Ok(Value::Int(*i)),
        other => Ok(Value::Float(op(number(name, other)?))),
    })
}

fn extremum(name: &'static str, pick_left: fn(f64, f64) -> bool) -> BuiltinFn {
    builtin(name, -1, move |args| {
        let mut best: Option<&Value> = None;
        for arg in args {
            let x = number(name, arg)?;
            let keep = match best {
                Some(current) => pick_left(number(name, current)?, x),
                None => false,
            };
            if !keep {
                best = Some(arg);
            }
        }
        best.cloned()
            .ok_or_else(|| type_error(format!("`{name}` expects at least one argument")))
    })
}

fn math_module() -> IndexMap<String, Value> {
    let mut math = members(vec![
        builtin("abs", 1, |args| match &args[0] {
            Value::Int(i) => i
                .checked_abs()
                .map(Value::Int)
                .ok_or_else(|| EvalError::IntegerOverflow {
                    op: "abs".to_owned(),
                }),
            other => Ok(Value::Float(number("abs", other)?.abs())),
        }),
        extremum("max", |best, x| best >= x),
        extremum("min", |best, x| best <= x),
        builtin("pow", 2, |args| match (&args[0], &args[1]) {
            (Value::Int(base), Value::Int(exp)) if *exp >= 0 => u32::try_from(*exp)
                .ok()
                .and_then(|exp| base.checked_pow(exp))
                .map(Value::Int)
                .ok_or_else(|| EvalError::IntegerOverflow {
                    op: "pow".to_owned(),
                }),
            (base, exp) => Ok(Value::Float(
                number("pow", base)?.powf(number("pow", exp)?),
            )),
        }),
        float_fn("sqrt", f64::sqrt),
        float_fn("floor", f64::floor),
        float_fn("ceil", f64::ceil),
        float_fn("round", f64::round),
    ]);
    math.insert("PI".to_owned(), Value::Float(std::f64::consts::PI));
    math.insert("E".to_owned(), Value::Float(std::f64::consts::E));
    math
}
