//! Wire packets exchanged between the host and the executor.
//!
//! Every packet is one JSON object on one `\n`-terminated line. Requests flow
//! host → executor on the executor's stdin; responses flow back on its
//! stdout. Which operation a request performs is selected by which fields are
//! present, see [`crate::executor::dispatch`].

pub mod codec;
pub mod payload;

use serde::{Deserialize, Serialize};

use crate::errors::RemoteError;

/// How the executor hands back the result of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMode {
    /// Serialize the literal result back.
    Value,
    /// Keep the result executor-side and answer with its type tag.
    Reference,
}

/// A host → executor packet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id echoed in the response. Absent on `destroy` packets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Source text to evaluate in the shared context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Source text of a function literal to invoke with `args`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Arguments, literal JSON or [`payload`] markers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<serde_json::Value>,
    /// Reference table entry the request operates on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<u64>,
    /// Method to call on the referenced value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Property to read on the referenced value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    /// Requested return mode; see [`Request::effective_return`].
    #[serde(rename = "return", default, skip_serializing_if = "Option::is_none")]
    pub return_mode: Option<ReturnMode>,
    /// Remove `reference` from the table. No response is sent.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub destroy: bool,
}

impl Request {
    /// Evaluate `code` in the shared context.
    #[must_use]
    pub fn code(id: u64, code: impl Into<String>, return_mode: ReturnMode) -> Self {
        Self {
            id: Some(id),
            code: Some(code.into()),
            return_mode: Some(return_mode),
            ..Self::default()
        }
    }

    /// Compile `function` and invoke it with `args`.
    #[must_use]
    pub fn function(
        id: u64,
        source: impl Into<String>,
        args: Vec<serde_json::Value>,
        return_mode: ReturnMode,
    ) -> Self {
        Self {
            id: Some(id),
            function: Some(source.into()),
            args,
            return_mode: Some(return_mode),
            ..Self::default()
        }
    }

    /// Call `method` on the value stored under `reference`.
    #[must_use]
    pub fn method(
        id: u64,
        reference: u64,
        method: impl Into<String>,
        args: Vec<serde_json::Value>,
    ) -> Self {
        Self {
            id: Some(id),
            reference: Some(reference),
            method: Some(method.into()),
            args,
            return_mode: Some(ReturnMode::Reference),
            ..Self::default()
        }
    }

    /// Read `property` on the value stored under `reference`.
    #[must_use]
    pub fn property(id: u64, reference: u64, property: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            reference: Some(reference),
            property: Some(property.into()),
            return_mode: Some(ReturnMode::Reference),
            ..Self::default()
        }
    }

    /// Fetch the value stored under `reference`.
    #[must_use]
    pub fn value_of(id: u64, reference: u64) -> Self {
        Self {
            id: Some(id),
            reference: Some(reference),
            return_mode: Some(ReturnMode::Value),
            ..Self::default()
        }
    }

    /// Remove `reference` from the table.
    #[must_use]
    pub fn destroy(reference: u64) -> Self {
        Self {
            reference: Some(reference),
            destroy: true,
            ..Self::default()
        }
    }

    /// Return mode after applying defaults.
    ///
    /// Requests on existing references default to [`ReturnMode::Reference`];
    /// `code` and `function` requests default to [`ReturnMode::Value`].
    #[must_use]
    pub fn effective_return(&self) -> ReturnMode {
        self.return_mode.unwrap_or(if self.reference.is_some() {
            ReturnMode::Reference
        } else {
            ReturnMode::Value
        })
    }
}

/// An executor → host packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request this answers.
    pub id: u64,
    /// Successful result: a literal value or a type tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Failure description. Mutually exclusive with `result`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl Response {
    /// A successful response.
    #[must_use]
    pub fn success(id: u64, result: serde_json::Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// A failed response.
    #[must_use]
    pub fn failure(id: u64, error: impl Into<WireError>) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Error payload of a response: a bare string or a structured object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireError {
    /// A plain message.
    Message(String),
    /// A structured error.
    Details(ErrorDetails),
}

/// Structured error shape produced by the executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Type name of the thrown value, `null` for thrown primitives.
    #[serde(default)]
    pub class: Option<String>,
    /// Value of the thrown object's `name` field.
    #[serde(default)]
    pub name: Option<String>,
    /// Value of the thrown object's `code` field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<serde_json::Value>,
    /// Message text.
    #[serde(default)]
    pub message: Option<String>,
    /// Diagnostic trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl From<ErrorDetails> for WireError {
    fn from(details: ErrorDetails) -> Self {
        Self::Details(details)
    }
}

impl From<WireError> for RemoteError {
    fn from(error: WireError) -> Self {
        match error {
            WireError::Message(message) => RemoteError::message(message),
            WireError::Details(details) => RemoteError {
                class: details.class,
                name: details.name,
                code: details.code,
                message: details.message.unwrap_or_default(),
                stack: details.stack,
            },
        }
    }
}

/// Whether a decoded line is unusable as a packet.
///
/// `null`, `false`, zero, the empty string and empty containers all count as
/// noise rather than packets.
#[must_use]
pub fn is_falsy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Bool(b) => !b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f == 0.0),
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::Object(fields) => fields.is_empty(),
    }
}

/// Outcome of decoding one inbound line.
#[derive(Debug)]
pub enum Decoded<T> {
    /// A usable packet.
    Packet(T),
    /// Invalid JSON, a falsy value, or the wrong shape; the reason is for logs.
    Noise(String),
}

/// Decode one line into a packet of type `T`.
#[must_use]
pub fn decode_line<T: serde::de::DeserializeOwned>(line: &str) -> Decoded<T> {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => return Decoded::Noise(format!("malformed json: {e}")),
    };

    if is_falsy(&value) {
        return Decoded::Noise("empty packet".into());
    }

    match serde_json::from_value(value) {
        Ok(packet) => Decoded::Packet(packet),
        Err(e) => Decoded::Noise(format!("unexpected packet shape: {e}")),
    }
}
