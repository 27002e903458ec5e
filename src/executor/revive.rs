//! Turning request arguments into runtime values.

use indexmap::IndexMap;
use serde_json::Value as Json;

use super::table::ReferenceTable;
use crate::protocol::payload::{self, Payload};
use crate::runtime::error::EvalError;
use crate::runtime::value::Value;
use crate::runtime::Runtime;

/// Revive one argument, replacing payloads at any depth.
///
/// Function payloads are compiled in `runtime`; reference payloads are
/// replaced by the live table entry, or `null` when there is none.
///
/// # Errors
///
/// Returns the compile error of a malformed function payload.
pub fn revive(json: &Json, runtime: &mut Runtime, table: &ReferenceTable) -> Result<Value, EvalError> {
    match payload::parse(json) {
        Some(Payload::Function(source)) => return runtime.compile_function(source),
        Some(Payload::Reference(id)) => return Ok(table.get(id).cloned().unwrap_or(Value::Null)),
        None => {}
    }

    match json {
        Json::Array(items) => Ok(Value::array(
            items
                .iter()
                .map(|item| revive(item, runtime, table))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        Json::Object(fields) => {
            let mut revived = IndexMap::with_capacity(fields.len());
            for (key, value) in fields {
                revived.insert(key.clone(), revive(value, runtime, table)?);
            }
            Ok(Value::object("Object", revived))
        }
        scalar => Ok(Value::from_json(scalar)),
    }
}

/// Revive every argument of a request.
///
/// # Errors
///
/// Same as [`revive`].
pub fn revive_args(
    args: &[Json],
    runtime: &mut Runtime,
    table: &ReferenceTable,
) -> Result<Vec<Value>, EvalError> {
    args.iter().map(|arg| revive(arg, runtime, table)).collect()
}
