//! Unit tests for executor-side request dispatch.
//!
//! Drives a `Dispatcher` directly, without any streams, to check field
//! precedence, return modes, reference table bookkeeping and error shapes.

use serde_json::{json, Value as Json};

use farside::executor::Dispatcher;
use farside::protocol::payload;
use farside::protocol::{ErrorDetails, Request, Response, ReturnMode, WireError};
use farside::runtime::Runtime;

fn dispatcher() -> Dispatcher {
    Dispatcher::new(Runtime::new())
}

async fn send(dispatcher: &mut Dispatcher, request: Request) -> Response {
    dispatcher
        .dispatch(request)
        .await
        .expect("request with an id must be answered")
}

async fn ok(dispatcher: &mut Dispatcher, request: Request) -> Json {
    let response = send(dispatcher, request).await;
    assert!(response.error.is_none(), "unexpected error: {:?}", response.error);
    response.result.expect("success must carry a result")
}

async fn fail(dispatcher: &mut Dispatcher, request: Request) -> ErrorDetails {
    let response = send(dispatcher, request).await;
    assert!(response.result.is_none(), "unexpected result: {:?}", response.result);
    match response.error.expect("failure must carry an error") {
        WireError::Details(details) => details,
        WireError::Message(message) => panic!("executor must send structured errors, got {message}"),
    }
}

// ── Code and functions ────────────────────────────────────────────────────────

/// The response id echoes the request id.
#[tokio::test]
async fn response_echoes_id() {
    let mut d = dispatcher();
    let response = send(&mut d, Request::code(77, "1 + 1", ReturnMode::Value)).await;
    assert_eq!(response.id, 77);
    assert_eq!(response.result, Some(json!(2)));
}

/// `return: "reference"` keeps the value and answers with its type tag.
#[tokio::test]
async fn reference_mode_returns_type_tag() {
    let mut d = dispatcher();
    let tag = ok(&mut d, Request::code(1, "\"\"", ReturnMode::Reference)).await;
    assert_eq!(tag, json!("string"));
    assert!(d.table().contains(1));

    let value = ok(&mut d, Request::value_of(2, 1)).await;
    assert_eq!(value, json!(""));
}

/// A request with neither code nor function evaluates empty code.
#[tokio::test]
async fn missing_code_evaluates_to_null() {
    let mut d = dispatcher();
    let request = Request {
        id: Some(3),
        ..Request::default()
    };
    assert_eq!(ok(&mut d, request).await, Json::Null);
}

/// Function literals are compiled and called with revived arguments.
#[tokio::test]
async fn function_is_called_with_args() {
    let mut d = dispatcher();
    let result = ok(
        &mut d,
        Request::function(1, "|a, b| a * b", vec![json!(6), json!(7)], ReturnMode::Value),
    )
    .await;
    assert_eq!(result, json!(42));
}

/// Function payloads arrive as callables.
#[tokio::test]
async fn function_payload_is_callable() {
    let mut d = dispatcher();
    let result = ok(
        &mut d,
        Request::function(
            1,
            "|f| format!(\"{} {}\", type_of(f), f(20) + 1)",
            vec![payload::function("|x| x * 2")],
            ReturnMode::Value,
        ),
    )
    .await;
    assert_eq!(result, json!("function 41"));
}

/// Reference payloads revive to the live value, not its text.
#[tokio::test]
async fn reference_payload_revives_value() {
    let mut d = dispatcher();
    ok(&mut d, Request::code(1, "vec![1, 2, 3]", ReturnMode::Reference)).await;

    let result = ok(
        &mut d,
        Request::function(
            2,
            "|items| items.len()",
            vec![json!({ "nested": [payload::reference(1)] })],
            ReturnMode::Value,
        ),
    )
    .await;
    // The payload sits inside an object, so the closure gets the object.
    assert_eq!(result, json!(1));

    let result = ok(
        &mut d,
        Request::function(3, "|items| items.sum()", vec![payload::reference(1)], ReturnMode::Value),
    )
    .await;
    assert_eq!(result, json!(6));
}

/// A reference payload naming nothing revives to null.
#[tokio::test]
async fn dangling_reference_payload_is_null() {
    let mut d = dispatcher();
    let result = ok(
        &mut d,
        Request::function(1, "|x| type_of(x)", vec![payload::reference(404)], ReturnMode::Value),
    )
    .await;
    assert_eq!(result, json!("null"));
}

/// Futures are settled before the response is written.
#[tokio::test]
async fn futures_are_settled() {
    let mut d = dispatcher();
    let result = ok(&mut d, Request::code(1, "sleep(5, \"late\")", ReturnMode::Value)).await;
    assert_eq!(result, json!("late"));

    let tag = ok(&mut d, Request::code(2, "async { 40 + 2 }", ReturnMode::Reference)).await;
    assert_eq!(tag, json!("number"));
}

// ── References ────────────────────────────────────────────────────────────────

/// Chained method calls run against the entries they name.
#[tokio::test]
async fn method_chain_round_trips() {
    let mut d = dispatcher();
    ok(&mut d, Request::code(1, "\"farside\"", ReturnMode::Reference)).await;

    let tag = ok(&mut d, Request::method(2, 1, "to_uppercase", Vec::new())).await;
    assert_eq!(tag, json!("string"));
    ok(&mut d, Request::method(3, 2, "to_lowercase", Vec::new())).await;

    assert_eq!(ok(&mut d, Request::value_of(4, 2)).await, json!("FARSIDE"));
    assert_eq!(ok(&mut d, Request::value_of(5, 3)).await, json!("farside"));
}

/// Properties of objects are read into new entries.
#[tokio::test]
async fn property_reads_field() {
    let mut d = dispatcher();
    let tag = ok(&mut d, Request::code(1, "Point { x: 1, y: 2 }", ReturnMode::Reference)).await;
    assert_eq!(tag, json!("Point"));

    let tag = ok(&mut d, Request::property(2, 1, "y")).await;
    assert_eq!(tag, json!("number"));
    assert_eq!(ok(&mut d, Request::value_of(3, 2)).await, json!(2));
    assert_eq!(ok(&mut d, Request::value_of(4, 1)).await, json!({ "x": 1, "y": 2 }));
}

/// Methods that mutate their receiver update the stored entry.
#[tokio::test]
async fn mutating_method_updates_entry() {
    let mut d = dispatcher();
    ok(&mut d, Request::code(1, "vec![1, 2]", ReturnMode::Reference)).await;
    ok(&mut d, Request::method(2, 1, "push", vec![json!(3)])).await;
    assert_eq!(ok(&mut d, Request::value_of(3, 1)).await, json!([1, 2, 3]));
}

/// Function-valued object fields are callable through references.
#[tokio::test]
async fn object_method_through_reference() {
    let mut d = dispatcher();
    ok(
        &mut d,
        Request::code(1, "Greeter { greet: |name| \"hi \" + name }", ReturnMode::Reference),
    )
    .await;
    ok(&mut d, Request::method(2, 1, "greet", vec![json!("ann")])).await;
    assert_eq!(ok(&mut d, Request::value_of(3, 2)).await, json!("hi ann"));
}

/// `destroy` removes the entry and is never answered.
#[tokio::test]
async fn destroy_is_silent() {
    let mut d = dispatcher();
    ok(&mut d, Request::code(1, "42", ReturnMode::Reference)).await;
    assert!(d.dispatch(Request::destroy(1)).await.is_none());
    assert!(!d.table().contains(1));

    // Destroying again is harmless.
    assert!(d.dispatch(Request::destroy(1)).await.is_none());
}

/// Requests without an id are ignored.
#[tokio::test]
async fn request_without_id_is_ignored() {
    let mut d = dispatcher();
    let request = Request {
        code: Some("1".into()),
        ..Request::default()
    };
    assert!(d.dispatch(request).await.is_none());
}

/// `destroy` without a `reference` is dispatched like any other request.
#[tokio::test]
async fn destroy_without_reference_is_answered() {
    let mut d = dispatcher();
    let request = Request {
        id: Some(5),
        code: Some("1 + 1".into()),
        destroy: true,
        ..Request::default()
    };
    let response = send(&mut d, request).await;
    assert_eq!(response.id, 5);
    assert_eq!(response.result, Some(json!(2)));
}

// ── Lookup failures ───────────────────────────────────────────────────────────

/// A missing entry is reported before a missing method.
#[tokio::test]
async fn missing_instance_precedes_missing_method() {
    let mut d = dispatcher();
    let err = fail(&mut d, Request::method(1, 99, "no_such_method", Vec::new())).await;
    assert_eq!(err.class.as_deref(), Some("Error"));
    assert_eq!(
        err.message.as_deref(),
        Some("instance #99 not found: cannot call `no_such_method`")
    );

    let err = fail(&mut d, Request::property(2, 99, "len")).await;
    assert_eq!(
        err.message.as_deref(),
        Some("instance #99 not found: cannot read `len`")
    );
}

/// `return: "value"` on a missing entry.
#[tokio::test]
async fn value_of_missing_instance() {
    let mut d = dispatcher();
    let err = fail(&mut d, Request::value_of(1, 5)).await;
    assert_eq!(err.message.as_deref(), Some("instance not found"));
}

/// Entry presence, not truthiness, decides whether it exists.
#[tokio::test]
async fn falsy_entries_exist() {
    let mut d = dispatcher();
    ok(&mut d, Request::code(1, "0", ReturnMode::Reference)).await;
    assert_eq!(ok(&mut d, Request::value_of(2, 1)).await, json!(0));
    assert_eq!(
        ok(&mut d, Request::method(3, 1, "to_string", Vec::new())).await,
        json!("string")
    );
}

/// An unknown method on an existing entry.
#[tokio::test]
async fn missing_method() {
    let mut d = dispatcher();
    ok(&mut d, Request::code(1, "\"x\"", ReturnMode::Reference)).await;
    let err = fail(&mut d, Request::method(2, 1, "frobnicate", Vec::new())).await;
    assert_eq!(
        err.message.as_deref(),
        Some("method `frobnicate` not found on string")
    );
}

// ── Evaluation failures ───────────────────────────────────────────────────────

/// A thrown string arrives as a message-only error.
#[tokio::test]
async fn thrown_string_is_message() {
    let mut d = dispatcher();
    let err = fail(&mut d, Request::code(1, "throw(\"boom\")", ReturnMode::Value)).await;
    assert_eq!(err.message.as_deref(), Some("boom"));
    assert_eq!(err.class, None);
    assert_eq!(err.name, None);
}

/// A thrown error object keeps its class, name and code.
#[tokio::test]
async fn thrown_object_keeps_fields() {
    let mut d = dispatcher();
    let err = fail(&mut d, Request::code(1, "require(\"net\")", ReturnMode::Value)).await;
    assert_eq!(err.class.as_deref(), Some("Error"));
    assert_eq!(err.name.as_deref(), Some("Error"));
    assert_eq!(err.code, Some(json!("MODULE_NOT_FOUND")));
    assert_eq!(err.message.as_deref(), Some("cannot find module 'net'"));
}

/// Runtime errors are classified by kind.
#[tokio::test]
async fn runtime_errors_are_classified() {
    let mut d = dispatcher();
    let err = fail(&mut d, Request::code(1, "process.stdout.write(\"x\")", ReturnMode::Value)).await;
    assert_eq!(err.class.as_deref(), Some("ReferenceError"));

    let err = fail(&mut d, Request::code(2, "1 / 0", ReturnMode::Value)).await;
    assert_eq!(err.class.as_deref(), Some("RangeError"));
}

/// Callables cannot be returned by value.
#[tokio::test]
async fn functions_are_not_serializable() {
    let mut d = dispatcher();
    let err = fail(&mut d, Request::code(1, "|x| x", ReturnMode::Value)).await;
    assert_eq!(err.class.as_deref(), Some("TypeError"));

    // The same value can still be kept by reference.
    let tag = ok(&mut d, Request::code(2, "|x| x", ReturnMode::Reference)).await;
    assert_eq!(tag, json!("function"));
}

/// A failed request leaves no entry behind.
#[tokio::test]
async fn failed_request_stores_nothing() {
    let mut d = dispatcher();
    fail(&mut d, Request::code(1, "throw(1)", ReturnMode::Reference)).await;
    assert!(!d.table().contains(1));
    assert!(d.table().is_empty());
}

// ── Resource limits ───────────────────────────────────────────────────────────

/// An oversized `repeat` is a RangeError and the dispatcher keeps working.
#[tokio::test]
async fn oversized_repeat_is_rejected() {
    let mut d = dispatcher();
    let err = fail(
        &mut d,
        Request::code(1, "\"ab\".repeat(9223372036854775807)", ReturnMode::Value),
    )
    .await;
    assert_eq!(err.class.as_deref(), Some("RangeError"));
    assert!(
        err.message.as_deref().is_some_and(|m| m.contains("`repeat` result")),
        "got {:?}",
        err.message
    );

    assert_eq!(ok(&mut d, Request::code(2, "1 + 1", ReturnMode::Value)).await, json!(2));
}

/// Delays beyond the timer limit are rejected before anything waits.
#[tokio::test]
async fn oversized_sleep_is_rejected() {
    let mut d = dispatcher();
    let err = fail(&mut d, Request::code(1, "sleep(1e300)", ReturnMode::Value)).await;
    assert_eq!(err.class.as_deref(), Some("RangeError"));

    let err = fail(&mut d, Request::code(2, "sleep(-1)", ReturnMode::Value)).await;
    assert_eq!(err.class.as_deref(), Some("TypeError"));

    assert_eq!(ok(&mut d, Request::code(3, "sleep(0, 7)", ReturnMode::Value)).await, json!(7));
}

/// Huge ranges answer `len` directly but refuse to expand.
#[tokio::test]
async fn huge_ranges_do_not_expand() {
    let mut d = dispatcher();
    let len = ok(
        &mut d,
        Request::code(1, "(0..9223372036854775807).len()", ReturnMode::Value),
    )
    .await;
    assert_eq!(len, json!(9_223_372_036_854_775_807_i64));

    let err = fail(
        &mut d,
        Request::code(2, "(0..9223372036854775807).sum()", ReturnMode::Value),
    )
    .await;
    assert_eq!(err.class.as_deref(), Some("RangeError"));

    // Serializing by value is bounded too; keeping it by reference is fine.
    let err = fail(&mut d, Request::code(3, "0..9223372036854775807", ReturnMode::Value)).await;
    assert_eq!(err.class.as_deref(), Some("RangeError"));
    let tag = ok(&mut d, Request::code(4, "0..9223372036854775807", ReturnMode::Reference)).await;
    assert_eq!(tag, json!("Range"));

    assert_eq!(ok(&mut d, Request::code(5, "(0..4).len()", ReturnMode::Value)).await, json!(4));
}
