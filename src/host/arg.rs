//! Arguments passed from the host into executor calls.

use serde_json::Value as Json;

use super::reference::Reference;
use crate::protocol::payload;

/// One call argument.
///
/// Literals travel as plain JSON. References and function literals travel as
/// tagged payloads that the executor swaps for the live value or the
/// compiled function before the call.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// A literal JSON value.
    Value(Json),
    /// An executor-side value by reference id.
    Reference(u64),
    /// Source text of a function literal, compiled by the executor.
    Function(String),
}

impl Arg {
    /// A function literal such as `|x| x * 2`.
    #[must_use]
    pub fn function(source: impl Into<String>) -> Self {
        Self::Function(source.into())
    }

    /// Wire form of the argument.
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Self::Value(value) => value.clone(),
            Self::Reference(id) => payload::reference(*id),
            Self::Function(source) => payload::function(source),
        }
    }

    /// Reference this argument depends on, if any.
    #[must_use]
    pub fn reference_id(&self) -> Option<u64> {
        match self {
            Self::Reference(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<Json> for Arg {
    fn from(value: Json) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::Value(Json::from(value))
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Self::Value(Json::from(value))
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Self::Value(Json::from(value))
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Self::Value(Json::from(value))
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Self::Value(Json::from(value))
    }
}

impl From<u64> for Arg {
    fn from(value: u64) -> Self {
        Self::Value(Json::from(value))
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Self::Value(Json::from(value))
    }
}

impl From<&Reference> for Arg {
    fn from(reference: &Reference) -> Self {
        Self::Reference(reference.id())
    }
}
