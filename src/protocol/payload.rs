//! Tagged argument payloads that stand in for executor-side values.
//!
//! A payload is an ordinary JSON object of the shape
//! `{ "#": "farside", "#type": "function" | "reference", "#data": ... }`.
//! It may appear anywhere inside a request's `args`, including nested in
//! arrays and objects. The executor replaces it before the call happens:
//!
//! | `#type`     | `#data`          | Replaced with                           |
//! |-------------|------------------|-----------------------------------------|
//! | `function`  | source text      | the compiled function literal           |
//! | `reference` | request id       | the live reference table entry          |

use serde_json::{json, Value};

/// Value of the `#` key identifying a payload.
pub const MARKER: &str = "farside";

/// A recognized payload, borrowed from the JSON it was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload<'a> {
    /// Source text of a function literal.
    Function(&'a str),
    /// Id of a reference table entry.
    Reference(u64),
}

/// Encode a function literal payload.
#[must_use]
pub fn function(source: &str) -> Value {
    json!({ "#": MARKER, "#type": "function", "#data": source })
}

/// Encode a back-reference payload.
#[must_use]
pub fn reference(id: u64) -> Value {
    json!({ "#": MARKER, "#type": "reference", "#data": id })
}

/// Recognize a payload object.
///
/// Returns `None` for every other value, including objects that carry the
/// marker with an unknown `#type` or a `#data` of the wrong kind.
#[must_use]
pub fn parse(value: &Value) -> Option<Payload<'_>> {
    let fields = value.as_object()?;
    if fields.get("#").and_then(Value::as_str) != Some(MARKER) {
        return None;
    }

    let data = fields.get("#data")?;
    match fields.get("#type").and_then(Value::as_str)? {
        "function" => data.as_str().map(Payload::Function),
        "reference" => data.as_u64().map(Payload::Reference),
        _ => None,
    }
}
