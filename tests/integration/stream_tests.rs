//! Host-side bridge behaviour against a scripted in-memory executor.
//!
//! Covers:
//! - Correlation of responses to requests, in any arrival order.
//! - Ids reach the executor in increasing order, even from several threads.
//! - Noise: malformed lines, falsy packets and stray ids are counted only.
//! - Deferral: requests on a reference are written after it settles.
//! - Failure cascade: derived requests on a failed reference are never written.
//! - Disposal ordering and skipping for failed references.
//! - Close and executor EOF reject pending and later requests.

use serde_json::json;

use farside::protocol::{payload, ErrorDetails, Request, Response, ReturnMode, WireError};
use farside::{Arg, BridgeError};

use super::test_helpers::{scripted_bridge, scripted_bridge_with_limit, within};

// ── Correlation ───────────────────────────────────────────────────────────────

/// `evaluate` writes a value-mode code request and resolves with its result.
#[tokio::test]
async fn evaluate_resolves_with_result() {
    let (bridge, mut executor) = scripted_bridge();
    let pending = bridge.evaluate("1 + 1");

    let request = executor.next_request().await;
    assert_eq!(request.id, Some(pending.id()));
    assert_eq!(request.code.as_deref(), Some("1 + 1"));
    assert_eq!(request.return_mode, Some(ReturnMode::Value));

    executor.respond(Response::success(pending.id(), json!(2))).await;
    assert_eq!(within(pending).await.expect("evaluate must succeed"), json!(2));
}

/// Ids are unique and responses may arrive out of order.
#[tokio::test]
async fn responses_match_by_id() {
    let (bridge, mut executor) = scripted_bridge();
    let first = bridge.evaluate("\"a\"");
    let second = bridge.evaluate("\"b\"");
    assert_ne!(first.id(), second.id());

    let a = executor.next_request().await;
    let b = executor.next_request().await;
    executor
        .respond(Response::success(b.id.expect("id"), json!("b")))
        .await;
    executor
        .respond(Response::success(a.id.expect("id"), json!("a")))
        .await;

    assert_eq!(within(first).await.expect("first must succeed"), json!("a"));
    assert_eq!(within(second).await.expect("second must succeed"), json!("b"));
}

/// Clones issuing from several threads still write ids in increasing order.
#[tokio::test]
async fn concurrent_issuers_write_ids_in_order() {
    let (bridge, mut executor) = scripted_bridge();
    std::thread::scope(|scope| {
        for _ in 0..4 {
            let bridge = bridge.clone();
            scope.spawn(move || {
                for _ in 0..50 {
                    drop(bridge.evaluate("1"));
                }
            });
        }
    });

    let mut last = 0;
    for _ in 0..200 {
        let id = executor.next_request().await.id.expect("request must carry an id");
        assert!(id > last, "id {id} written after {last}");
        last = id;
    }
}

/// Error responses reject with the normalized remote error.
#[tokio::test]
async fn error_responses_reject() {
    let (bridge, mut executor) = scripted_bridge();
    let plain = bridge.evaluate("throw(\"oops\")");
    let structured = bridge.evaluate("require(\"net\")");
    executor.next_request().await;
    executor.next_request().await;

    executor
        .send_line(&format!(r#"{{"id":{},"error":"oops"}}"#, plain.id()))
        .await;
    executor
        .respond(Response::failure(
            structured.id(),
            ErrorDetails {
                class: Some("Error".into()),
                name: Some("Error".into()),
                code: Some(json!("MODULE_NOT_FOUND")),
                message: Some("cannot find module 'net'".into()),
                stack: None,
            },
        ))
        .await;

    let Err(BridgeError::Remote(err)) = within(plain).await else {
        panic!("plain error must reject with a remote error");
    };
    assert_eq!(err.message, "oops");
    assert_eq!(err.class, None);

    let Err(BridgeError::Remote(err)) = within(structured).await else {
        panic!("structured error must reject with a remote error");
    };
    assert_eq!(err.code, Some(json!("MODULE_NOT_FOUND")));
    assert_eq!(err.to_string(), "cannot find module 'net'");
}

// ── Noise ─────────────────────────────────────────────────────────────────────

/// Malformed, falsy and stray lines bump the counter and change nothing else.
#[tokio::test]
async fn noise_is_counted_and_skipped() {
    let (bridge, mut executor) = scripted_bridge();
    let pending = bridge.evaluate("7");
    let id = executor.next_request().await.id.expect("id");

    executor.send_line("debug output from somewhere").await;
    executor.send_line("null").await;
    executor.send_line(r#"{"id":9999,"result":1}"#).await;
    executor.respond(Response::success(id, json!(7))).await;

    assert_eq!(within(pending).await.expect("evaluate must succeed"), json!(7));
    assert_eq!(bridge.noise(), 3);
    assert!(!bridge.is_closed());
}

/// A duplicate response for a settled id is noise, not a second settlement.
#[tokio::test]
async fn duplicate_response_is_noise() {
    let (bridge, mut executor) = scripted_bridge();
    let pending = bridge.evaluate("1");
    let id = executor.next_request().await.id.expect("id");
    executor.respond(Response::success(id, json!(1))).await;
    assert_eq!(within(pending).await.expect("evaluate must succeed"), json!(1));

    executor.respond(Response::success(id, json!(2))).await;
    let after = bridge.evaluate("2");
    let next = executor.next_request().await.id.expect("id");
    executor.respond(Response::success(next, json!(2))).await;
    within(after).await.expect("later request must succeed");
    assert_eq!(bridge.noise(), 1);
}

/// Over-long response lines are noise; the reader keeps going.
#[tokio::test]
async fn over_long_response_is_noise() {
    let (bridge, mut executor) = scripted_bridge_with_limit(64);
    let pending = bridge.evaluate("1");
    let id = executor.next_request().await.id.expect("id");

    executor
        .send_line(&format!(r#"{{"id":{id},"result":"{}"}}"#, "x".repeat(500)))
        .await;
    executor.respond(Response::success(id, json!(1))).await;

    assert_eq!(within(pending).await.expect("evaluate must succeed"), json!(1));
    assert_eq!(bridge.noise(), 1);
}

// ── References ────────────────────────────────────────────────────────────────

/// Calls on a reference wait for its creation, then go out in issue order.
#[tokio::test]
async fn calls_wait_for_creation() {
    let (bridge, mut executor) = scripted_bridge();
    let text = bridge.evaluate_to_ref("\"Hello\"", Vec::new());
    let upper = text.call("to_uppercase", Vec::new());
    let lower = upper.call("to_lowercase", Vec::new());

    let create = executor.next_request().await;
    assert_eq!(create.id, Some(text.id()));
    assert_eq!(create.return_mode, Some(ReturnMode::Reference));
    executor.expect_silence().await;

    executor.respond(Response::success(text.id(), json!("string"))).await;
    let call = executor.next_request().await;
    assert_eq!(call.id, Some(upper.id()));
    assert_eq!(call.reference, Some(text.id()));
    assert_eq!(call.method.as_deref(), Some("to_uppercase"));
    executor.expect_silence().await;

    executor.respond(Response::success(upper.id(), json!("string"))).await;
    let call = executor.next_request().await;
    assert_eq!(call.id, Some(lower.id()));
    assert_eq!(call.reference, Some(upper.id()));

    executor.respond(Response::success(lower.id(), json!("string"))).await;
    assert_eq!(within(lower.settled()).await.expect("settled"), json!("string"));
}

/// `settled` resolves with the type tag of the created value.
#[tokio::test]
async fn settled_resolves_with_tag() {
    let (bridge, mut executor) = scripted_bridge();
    let list = bridge.evaluate_to_ref("vec![1]", Vec::new());
    let waiter = list.settled();

    executor.next_request().await;
    executor.respond(Response::success(list.id(), json!("Array"))).await;
    assert_eq!(within(waiter).await.expect("settled"), json!("Array"));

    // Asking again answers from the memoized outcome.
    assert_eq!(within(list.settled()).await.expect("settled"), json!("Array"));
}

/// Function literals go out as function requests, other source as code.
#[tokio::test]
async fn evaluate_to_ref_picks_request_kind() {
    let (bridge, mut executor) = scripted_bridge();
    let func = bridge.evaluate_to_ref("|n| n + 1", vec![Arg::from(41)]);
    let code = bridge.evaluate_to_ref("1 + 1", vec![Arg::from(5)]);

    let request = executor.next_request().await;
    assert_eq!(request.id, Some(func.id()));
    assert_eq!(request.function.as_deref(), Some("|n| n + 1"));
    assert_eq!(request.args, vec![json!(41)]);
    assert_eq!(request.return_mode, Some(ReturnMode::Reference));

    let request = executor.next_request().await;
    assert_eq!(request.id, Some(code.id()));
    assert_eq!(request.code.as_deref(), Some("1 + 1"));
    assert!(request.args.is_empty());
}

/// References passed as arguments travel as payloads after they settle.
#[tokio::test]
async fn reference_arguments_become_payloads() {
    let (bridge, mut executor) = scripted_bridge();
    let text = bridge.evaluate_to_ref("\"abc\"", Vec::new());
    let upper = bridge.evaluate_function(
        "|s, f| f(s)",
        vec![text.as_arg(), Arg::function("|s| s.to_uppercase()")],
    );

    executor.next_request().await;
    executor.expect_silence().await;
    executor.respond(Response::success(text.id(), json!("string"))).await;

    let request = executor.next_request().await;
    assert_eq!(request.id, Some(upper.id()));
    assert_eq!(request.function.as_deref(), Some("|s, f| f(s)"));
    assert_eq!(
        request.args,
        vec![
            payload::reference(text.id()),
            payload::function("|s| s.to_uppercase()")
        ]
    );
    assert_eq!(request.return_mode, Some(ReturnMode::Value));
}

/// Requests chained on a failed reference reject with its error unwritten.
#[tokio::test]
async fn failed_reference_cascades() {
    let (bridge, mut executor) = scripted_bridge();
    let broken = bridge.evaluate_to_ref("throw(\"nope\")", Vec::new());
    let derived = broken.call("len", Vec::new());
    let value = derived.value();

    executor.next_request().await;
    executor.respond(Response::failure(broken.id(), WireError::Message("nope".into()))).await;

    let Err(BridgeError::Remote(err)) = within(value).await else {
        panic!("derived value must reject with the creation error");
    };
    assert_eq!(err.message, "nope");
    let Err(BridgeError::Remote(err)) = within(derived.settled()).await else {
        panic!("derived reference must reject with the creation error");
    };
    assert_eq!(err.message, "nope");

    // Issued after the failure is known: rejected without a round trip.
    let late = broken.property("length");
    assert!(within(late.settled()).await.is_err());

    // Nothing derived was written and nothing needs destroying.
    drop(late);
    drop(derived);
    drop(broken);
    executor.expect_silence().await;
}

/// Overrides replace forwarding for one method name.
#[tokio::test]
async fn overrides_intercept_calls() {
    let (bridge, mut executor) = scripted_bridge();
    let mut text = bridge.evaluate_to_ref("\"hi\"", Vec::new());
    text.set_override("shout", |this, args| this.forward("to_uppercase", args));

    executor.next_request().await;
    executor.respond(Response::success(text.id(), json!("string"))).await;

    let shouted = text.call("shout", Vec::new());
    let request = executor.next_request().await;
    assert_eq!(request.id, Some(shouted.id()));
    assert_eq!(request.method.as_deref(), Some("to_uppercase"));

    text.clear_override("shout");
    let raw = text.call("shout", Vec::new());
    let request = executor.next_request().await;
    assert_eq!(request.id, Some(raw.id()));
    assert_eq!(request.method.as_deref(), Some("shout"));
}

// ── Disposal ──────────────────────────────────────────────────────────────────

/// Releasing a settled reference writes one destroy packet.
#[tokio::test]
async fn release_writes_destroy() {
    let (bridge, mut executor) = scripted_bridge();
    let value = bridge.evaluate_to_ref("42", Vec::new());
    let id = value.id();

    executor.next_request().await;
    executor.respond(Response::success(id, json!("number"))).await;
    within(value.settled()).await.expect("settled");

    value.release();
    assert_eq!(executor.next_request().await, Request::destroy(id));
}

/// Destroy waits for the creation and for requests chained on the reference.
#[tokio::test]
async fn destroy_waits_for_chained_requests() {
    let (bridge, mut executor) = scripted_bridge();
    let text = bridge.evaluate_to_ref("\"x\"", Vec::new());
    let text_id = text.id();
    let upper = text.call("to_uppercase", Vec::new());
    drop(text);

    executor.next_request().await;
    executor.expect_silence().await;
    executor.respond(Response::success(text_id, json!("string"))).await;

    let call = executor.next_request().await;
    assert_eq!(call.id, Some(upper.id()));
    executor.expect_silence().await;

    executor.respond(Response::success(upper.id(), json!("string"))).await;
    assert_eq!(executor.next_request().await, Request::destroy(text_id));
}

/// Releasing a reference that failed to be created writes nothing.
#[tokio::test]
async fn release_of_failed_reference_is_silent() {
    let (bridge, mut executor) = scripted_bridge();
    let broken = bridge.evaluate_to_ref("throw(1)", Vec::new());
    executor.next_request().await;
    executor
        .respond(Response::failure(broken.id(), WireError::Message("1".into())))
        .await;
    assert!(within(broken.settled()).await.is_err());

    broken.release();
    executor.expect_silence().await;
}

// ── Termination ───────────────────────────────────────────────────────────────

/// `close` rejects pending work and everything issued afterwards.
#[tokio::test]
async fn close_rejects_pending_and_later_requests() {
    let (bridge, mut executor) = scripted_bridge();
    let pending = bridge.evaluate("sleep(10000)");
    executor.next_request().await;

    bridge.close();
    assert!(bridge.is_closed());
    assert_eq!(within(pending).await, Err(BridgeError::ProcessTerminated));

    let later = bridge.evaluate("1");
    assert_eq!(within(later).await, Err(BridgeError::ProcessTerminated));
    let reference = bridge.evaluate_to_ref("1", Vec::new());
    assert_eq!(
        within(reference.value()).await,
        Err(BridgeError::ProcessTerminated)
    );

    // Idempotent.
    bridge.close();
    assert!(bridge.is_closed());
}

/// Executor EOF ends the bridge like `close`.
#[tokio::test]
async fn executor_eof_terminates_bridge() {
    let (bridge, mut executor) = scripted_bridge();
    let pending = bridge.evaluate("1");
    executor.next_request().await;

    drop(executor);
    assert_eq!(within(pending).await, Err(BridgeError::ProcessTerminated));
    assert!(bridge.is_closed());
    assert_eq!(
        within(bridge.evaluate("2")).await,
        Err(BridgeError::ProcessTerminated)
    );
}

/// `after_settled` actions run in registration order with the outcome.
#[tokio::test]
async fn after_settled_runs_in_order() {
    let (bridge, mut executor) = scripted_bridge();
    let pending = bridge.evaluate("3");
    let id = pending.id();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    for tag in ["first", "second"] {
        let tx = tx.clone();
        bridge.after_settled(id, move |outcome| {
            let _ = tx.send((tag, outcome));
        });
    }

    executor.next_request().await;
    executor.respond(Response::success(id, json!(3))).await;
    within(pending).await.expect("evaluate must succeed");

    let (tag, outcome) = within(rx.recv()).await.expect("first action must run");
    assert_eq!(tag, "first");
    assert_eq!(outcome, Some(Ok(json!(3))));
    let (tag, _) = within(rx.recv()).await.expect("second action must run");
    assert_eq!(tag, "second");

    // Not pending anymore: runs right away with no outcome.
    bridge.after_settled(id, move |outcome| {
        let _ = tx.send(("late", outcome));
    });
    assert_eq!(within(rx.recv()).await, Some(("late", None)));
}
