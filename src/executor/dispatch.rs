//! Request interpretation.
//!
//! Which operation a request performs is decided by the fields it carries,
//! in this order:
//!
//! | Fields                          | Operation                               |
//! |---------------------------------|-----------------------------------------|
//! | `reference` + `destroy`         | drop the entry, no response             |
//! | `reference` + `return: "value"` | serialize the entry                     |
//! | `reference` + `method`          | call the method with revived `args`     |
//! | `reference` + `property`        | read the property                       |
//! | `function`                      | compile and call with revived `args`    |
//! | *(otherwise)*                   | evaluate `code` in the shared context   |
//!
//! Every failure past the destroy step becomes an error response, panics
//! included; nothing here stops the dispatch loop. `destroy` without a
//! `reference` is ignored and the request is dispatched as usual.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use serde_json::Value as Json;
use tracing::{debug, warn};

use super::revive::revive_args;
use super::table::ReferenceTable;
use crate::protocol::{ErrorDetails, Request, Response, ReturnMode, WireError};
use crate::runtime::error::EvalError;
use crate::runtime::value::Value;
use crate::runtime::Runtime;

/// Why a request failed.
#[derive(Debug)]
enum Failure {
    /// The request named something that does not exist.
    Lookup(String),
    /// Evaluation raised an error.
    Eval(EvalError),
    /// Evaluation panicked.
    Panic(String),
}

impl From<EvalError> for Failure {
    fn from(err: EvalError) -> Self {
        Self::Eval(err)
    }
}

impl From<Failure> for WireError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Lookup(message) => ErrorDetails {
                class: Some("Error".into()),
                name: Some("Error".into()),
                message: Some(message),
                ..ErrorDetails::default()
            }
            .into(),
            Failure::Eval(err) => error_details(&err).into(),
            Failure::Panic(message) => ErrorDetails {
                class: Some("InternalError".into()),
                name: Some("InternalError".into()),
                message: Some(format!("executor panicked: {message}")),
                ..ErrorDetails::default()
            }
            .into(),
        }
    }
}

/// Describe an evaluation error for the wire.
///
/// Thrown objects contribute their type name as `class` and their `name`,
/// `code`, `message` and `stack` fields. Other thrown values become a bare
/// message. Runtime errors are classified by [`EvalError::kind`].
#[must_use]
pub fn error_details(err: &EvalError) -> ErrorDetails {
    match err {
        EvalError::Thrown(Value::Object(obj)) => {
            let text = |key: &str| obj.fields.get(key).map(ToString::to_string);
            ErrorDetails {
                class: Some(obj.type_name.clone()),
                name: text("name"),
                code: obj.fields.get("code").and_then(|code| code.to_json().ok()),
                message: Some(text("message").unwrap_or_else(|| Value::Object(obj.clone()).to_string())),
                stack: text("stack"),
            }
        }
        EvalError::Thrown(other) => ErrorDetails {
            message: Some(other.to_string()),
            ..ErrorDetails::default()
        },
        other => ErrorDetails {
            class: Some(other.kind().to_owned()),
            name: Some(other.kind().to_owned()),
            message: Some(other.to_string()),
            ..ErrorDetails::default()
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

/// Interprets requests against a runtime and its reference table.
#[derive(Debug, Default)]
pub struct Dispatcher {
    runtime: Runtime,
    table: ReferenceTable,
}

impl Dispatcher {
    /// Create a dispatcher around `runtime` with an empty table.
    #[must_use]
    pub fn new(runtime: Runtime) -> Self {
        Self {
            runtime,
            table: ReferenceTable::new(),
        }
    }

    /// The reference table.
    #[must_use]
    pub fn table(&self) -> &ReferenceTable {
        &self.table
    }

    /// Handle one request to completion, settling any future it produces.
    ///
    /// Returns `None` for `destroy` packets and for requests without an id.
    /// A panic during evaluation is answered as an error and the runtime's
    /// scopes are reset to the global frame.
    pub async fn dispatch(&mut self, request: Request) -> Option<Response> {
        if let (true, Some(reference)) = (request.destroy, request.reference) {
            let existed = self.table.remove(reference).is_some();
            debug!(reference, existed, "reference destroyed");
            return None;
        }

        let Some(id) = request.id else {
            warn!("request without id, ignoring");
            return None;
        };

        let caught = AssertUnwindSafe(self.run(id, &request)).catch_unwind().await;
        let outcome = caught.unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            warn!(id, message = %message, "evaluation panicked, resetting runtime scopes");
            self.runtime.recover();
            Err(Failure::Panic(message))
        });

        let response = match outcome {
            Ok(result) => Response::success(id, result),
            Err(failure) => {
                debug!(id, ?failure, "request failed");
                Response::failure(id, failure)
            }
        };
        Some(response)
    }

    async fn run(&mut self, id: u64, request: &Request) -> Result<Json, Failure> {
        let value = self.produce(request)?;
        let value = self.runtime.settle(value).await?;
        self.shape(id, request.effective_return(), value)
    }

    fn produce(&mut self, request: &Request) -> Result<Value, Failure> {
        if let Some(reference) = request.reference {
            return self.on_reference(reference, request);
        }

        if let Some(source) = &request.function {
            let func = self.runtime.compile_function(source)?;
            let args = revive_args(&request.args, &mut self.runtime, &self.table)?;
            return Ok(self.runtime.call(&func, args)?);
        }

        let code = request.code.as_deref().unwrap_or_default();
        Ok(self.runtime.eval_source(code)?)
    }

    fn on_reference(&mut self, reference: u64, request: &Request) -> Result<Value, Failure> {
        if request.return_mode == Some(ReturnMode::Value) {
            return self
                .table
                .get(reference)
                .cloned()
                .ok_or_else(|| Failure::Lookup("instance not found".to_owned()));
        }

        let Some(target) = self.table.get(reference).cloned() else {
            let message = match (&request.method, &request.property) {
                (Some(method), _) => format!("instance #{reference} not found: cannot call `{method}`"),
                (None, Some(property)) => {
                    format!("instance #{reference} not found: cannot read `{property}`")
                }
                (None, None) => format!("instance #{reference} not found"),
            };
            return Err(Failure::Lookup(message));
        };

        if let Some(method) = &request.method {
            let args = revive_args(&request.args, &mut self.runtime, &self.table)?;
            let outcome = self
                .runtime
                .call_method(&target, method, args)?
                .ok_or_else(|| {
                    Failure::Lookup(format!(
                        "method `{method}` not found on {}",
                        target.type_tag()
                    ))
                })?;
            if let Some(updated) = outcome.updated {
                self.table.insert(reference, updated);
            }
            return Ok(outcome.value);
        }

        if let Some(property) = &request.property {
            return Ok(self.runtime.property(&target, property)?);
        }

        Err(Failure::Lookup("no method or property given".to_owned()))
    }

    fn shape(&mut self, id: u64, mode: ReturnMode, value: Value) -> Result<Json, Failure> {
        match mode {
            ReturnMode::Reference => {
                let tag = value.type_tag();
                self.table.insert(id, value);
                debug!(id, tag = %tag, "result retained");
                Ok(Json::String(tag))
            }
            ReturnMode::Value => Ok(value.to_json()?),
        }
    }
}
