//! End-to-end tests against a real `farside-executor` process.
//!
//! Each test spawns its own executor, so bridges never share state.

use std::time::Duration;

use serde_json::json;

use farside::config::BridgeConfig;
use farside::{Arg, Bridge, BridgeError};

use super::test_helpers::{executor_config, spawn_bridge, within};

// ── Evaluation ────────────────────────────────────────────────────────────────

/// Primitive results come back unchanged.
#[tokio::test]
async fn evaluate_returns_primitives() {
    let bridge = spawn_bridge().await;
    assert_eq!(within(bridge.evaluate("1 + 1")).await.expect("eval"), json!(2));
    assert_eq!(within(bridge.evaluate("\"a\" + \"b\"")).await.expect("eval"), json!("ab"));
    assert_eq!(within(bridge.evaluate("vec![1, 2.5, true]")).await.expect("eval"), json!([1, 2.5, true]));
    assert_eq!(within(bridge.evaluate("None")).await.expect("eval"), json!(null));
    bridge.close();
}

/// Top-level bindings persist across requests in the shared context.
#[tokio::test]
async fn shared_context_persists() {
    let bridge = spawn_bridge().await;
    within(bridge.evaluate("let mut hits = 0; fn bump(n: i64) -> i64 { n + 1 }"))
        .await
        .expect("definitions must evaluate");
    within(bridge.evaluate("hits = bump(hits);")).await.expect("eval");
    assert_eq!(within(bridge.evaluate("hits")).await.expect("eval"), json!(1));
    bridge.close();
}

/// A type tag comes back in reference mode and the value on request.
#[tokio::test]
async fn reference_to_empty_string() {
    let bridge = spawn_bridge().await;
    let text = bridge.evaluate_to_ref("\"\"", Vec::new());
    assert_eq!(within(text.settled()).await.expect("settled"), json!("string"));
    assert_eq!(within(text.value()).await.expect("value"), json!(""));
    bridge.close();
}

/// Futures are awaited before the response is sent.
#[tokio::test]
async fn futures_are_awaited() {
    let bridge = spawn_bridge().await;
    let started = std::time::Instant::now();
    let value = within(bridge.evaluate("async { sleep(50).await; \"done\" }"))
        .await
        .expect("eval");
    assert_eq!(value, json!("done"));
    assert!(started.elapsed() >= Duration::from_millis(50));
    bridge.close();
}

/// Long results arrive intact.
#[tokio::test]
async fn long_results_arrive_intact() {
    let bridge = spawn_bridge().await;
    let value = within(bridge.evaluate("\"0123456789\".repeat(2000)"))
        .await
        .expect("eval");
    assert_eq!(value, json!("0123456789".repeat(2000)));

    let items = within(bridge.evaluate("(0..3000).collect()")).await.expect("eval");
    let expected: Vec<i64> = (0..3000).collect();
    assert_eq!(items, json!(expected));
    bridge.close();
}

// ── References ────────────────────────────────────────────────────────────────

/// Two calls issued back to back run in order on the right receivers.
#[tokio::test]
async fn chained_calls_run_in_order() {
    let bridge = spawn_bridge().await;
    let original = bridge.evaluate_to_ref("\"Mixed Case\"", Vec::new());
    let upper = original.call("to_uppercase", Vec::new());
    let lower = upper.call("to_lowercase", Vec::new());

    assert_eq!(within(upper.value()).await.expect("value"), json!("MIXED CASE"));
    assert_eq!(within(lower.value()).await.expect("value"), json!("mixed case"));
    assert_eq!(within(original.value()).await.expect("value"), json!("Mixed Case"));
    bridge.close();
}

/// A reference argument delivers the live value, not its text.
#[tokio::test]
async fn reference_argument_is_live_value() {
    let bridge = spawn_bridge().await;
    let text = bridge.evaluate_to_ref("\"shout\"", Vec::new());
    let upper = bridge.evaluate_function("|arg| arg.to_uppercase()", vec![text.as_arg()]);
    assert_eq!(within(upper).await.expect("call"), json!("SHOUT"));

    let list = bridge.evaluate_to_ref("vec![1, 2, 3]", Vec::new());
    let total = bridge.evaluate_function("|xs| xs.sum()", vec![list.as_arg()]);
    assert_eq!(within(total).await.expect("call"), json!(6));
    bridge.close();
}

/// Function arguments arrive as callables.
#[tokio::test]
async fn function_argument_is_callable() {
    let bridge = spawn_bridge().await;
    let kind = bridge.evaluate_function("|f| type_of(f)", vec![Arg::function("|x| x")]);
    assert_eq!(within(kind).await.expect("call"), json!("function"));

    let applied = bridge.evaluate_function(
        "|f, xs| xs.map(f)",
        vec![Arg::function("|x| x * 10"), Arg::from(json!([1, 2]))],
    );
    assert_eq!(within(applied).await.expect("call"), json!([10, 20]));
    bridge.close();
}

/// Mutating methods update the referenced value.
#[tokio::test]
async fn mutation_through_reference() {
    let bridge = spawn_bridge().await;
    let list = bridge.evaluate_to_ref("vec![]", Vec::new());
    let _pushed = list.call("push", vec![Arg::from("a")]);
    let _pushed_again = list.call("push", vec![Arg::from("b")]);
    assert_eq!(within(list.value()).await.expect("value"), json!(["a", "b"]));
    bridge.close();
}

/// `require` loads built-in modules.
#[tokio::test]
async fn require_path_join() {
    let bridge = spawn_bridge().await;
    let path = bridge.require("path");
    assert_eq!(within(path.settled()).await.expect("settled"), json!("Module"));

    let joined = path.call("join", vec![Arg::from("a"), Arg::from("b"), Arg::from("c")]);
    assert_eq!(within(joined.value()).await.expect("value"), json!("a/b/c"));

    let pi = bridge.require("math").property("PI");
    assert_eq!(
        within(pi.value()).await.expect("value"),
        json!(std::f64::consts::PI)
    );
    bridge.close();
}

/// Properties of objects are readable through references.
#[tokio::test]
async fn property_through_reference() {
    let bridge = spawn_bridge().await;
    let point = bridge.evaluate_to_ref("Point { x: 3, y: 4 }", Vec::new());
    assert_eq!(within(point.settled()).await.expect("settled"), json!("Point"));
    assert_eq!(within(point.property("y").value()).await.expect("value"), json!(4));
    bridge.close();
}

/// Released references are destroyed; the executor keeps working.
#[tokio::test]
async fn release_then_continue() {
    let bridge = spawn_bridge().await;
    for i in 0..20 {
        let value = bridge.evaluate_to_ref(&format!("{i} * 2"), Vec::new());
        assert_eq!(within(value.value()).await.expect("value"), json!(i * 2));
        value.release();
    }
    assert_eq!(within(bridge.evaluate("\"still here\"")).await.expect("eval"), json!("still here"));
    bridge.close();
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// A thrown string arrives as a structured error with that message.
#[tokio::test]
async fn thrown_string_arrives_as_message() {
    let bridge = spawn_bridge().await;
    let Err(BridgeError::Remote(err)) = within(bridge.evaluate("throw(\"plain failure\")")).await
    else {
        panic!("throw must reject with a remote error");
    };
    assert_eq!(err.message, "plain failure");
    assert_eq!(err.class, None);
    bridge.close();
}

/// Unknown modules reject with their code.
#[tokio::test]
async fn unknown_module_has_code() {
    let bridge = spawn_bridge().await;
    let missing = bridge.require("fs");
    let Err(BridgeError::Remote(err)) = within(missing.settled()).await else {
        panic!("require must reject");
    };
    assert_eq!(err.code, Some(json!("MODULE_NOT_FOUND")));

    // Derived calls reject with the same error.
    let Err(BridgeError::Remote(derived)) = within(missing.call("read", Vec::new()).value()).await
    else {
        panic!("derived call must reject");
    };
    assert_eq!(derived, err);
    bridge.close();
}

/// Process capabilities are unreachable from evaluated code.
#[tokio::test]
async fn process_is_unreachable() {
    let bridge = spawn_bridge().await;
    let Err(BridgeError::Remote(err)) =
        within(bridge.evaluate("process.stdout.write(\"x\")")).await
    else {
        panic!("process access must reject");
    };
    assert_eq!(err.class.as_deref(), Some("ReferenceError"));

    // Printing goes to stderr and never corrupts the response stream.
    within(bridge.evaluate("println!(\"noise on stderr\"); print(\"more\")"))
        .await
        .expect("printing must succeed");
    assert_eq!(bridge.noise(), 0);
    bridge.close();
}

/// Missing instances and methods are reported distinctly.
#[tokio::test]
async fn missing_method_message() {
    let bridge = spawn_bridge().await;
    let text = bridge.evaluate_to_ref("\"x\"", Vec::new());
    let Err(BridgeError::Remote(err)) = within(text.call("frobnicate", Vec::new()).settled()).await
    else {
        panic!("unknown method must reject");
    };
    assert_eq!(err.message, "method `frobnicate` not found on string");
    bridge.close();
}

/// Deep recursion stops at the configured depth instead of crashing.
#[tokio::test]
async fn recursion_limit_is_configurable() {
    let config = BridgeConfig {
        max_call_depth: 50,
        ..executor_config()
    };
    let bridge = Bridge::spawn(&config).await.expect("executor must spawn");
    within(bridge.evaluate("fn down(n: i64) -> i64 { down(n + 1) }"))
        .await
        .expect("definition must evaluate");

    let Err(BridgeError::Remote(err)) = within(bridge.evaluate("down(0)")).await else {
        panic!("recursion must reject");
    };
    assert_eq!(err.class.as_deref(), Some("RangeError"));
    assert!(err.message.contains("50"), "got {}", err.message);

    assert_eq!(within(bridge.evaluate("1")).await.expect("eval"), json!(1));
    bridge.close();
}

/// Oversized work is rejected and the executor stays up.
#[tokio::test]
async fn oversized_work_keeps_executor_alive() {
    let bridge = spawn_bridge().await;
    for code in [
        "\"ab\".repeat(9223372036854775807)",
        "sleep(1e300)",
        "(0..9223372036854775807).map(|x| x)",
    ] {
        let Err(BridgeError::Remote(err)) = within(bridge.evaluate(code)).await else {
            panic!("{code} must reject with a remote error");
        };
        assert_eq!(err.class.as_deref(), Some("RangeError"), "{code}");
        assert_eq!(within(bridge.evaluate("1 + 1")).await.expect("eval"), json!(2));
    }
    assert!(!bridge.is_closed());
    bridge.close();
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

/// After close, every request fails immediately; close is idempotent.
#[tokio::test]
async fn close_is_final_and_idempotent() {
    let bridge = spawn_bridge().await;
    assert_eq!(within(bridge.evaluate("1")).await.expect("eval"), json!(1));

    bridge.close();
    bridge.close();
    assert!(bridge.is_closed());
    assert_eq!(
        within(bridge.evaluate("2")).await,
        Err(BridgeError::ProcessTerminated)
    );
    let reference = bridge.evaluate_to_ref("3", Vec::new());
    assert_eq!(
        within(reference.settled()).await,
        Err(BridgeError::ProcessTerminated)
    );
}

/// A missing executor binary is a spawn error.
#[tokio::test]
async fn missing_executor_fails_to_spawn() {
    let config = BridgeConfig::with_executor("/nonexistent/farside-executor");
    let err = Bridge::spawn(&config).await.expect_err("spawn must fail");
    assert!(matches!(err, BridgeError::Spawn(_)), "got {err:?}");
}

/// An invalid configuration is rejected before spawning.
#[tokio::test]
async fn invalid_config_fails_before_spawn() {
    let config = BridgeConfig {
        max_line_bytes: 0,
        ..executor_config()
    };
    let err = Bridge::spawn(&config).await.expect_err("spawn must fail");
    assert!(matches!(err, BridgeError::Config(_)), "got {err:?}");
}

/// Independent bridges do not share state.
#[tokio::test]
async fn bridges_are_isolated() {
    let one = spawn_bridge().await;
    let two = spawn_bridge().await;
    within(one.evaluate("let marker = 1;")).await.expect("eval");

    let Err(BridgeError::Remote(err)) = within(two.evaluate("marker")).await else {
        panic!("second bridge must not see the first one's bindings");
    };
    assert_eq!(err.class.as_deref(), Some("ReferenceError"));
    one.close();
    two.close();
}
