//! End-to-end tests for the guest bridge.
//!
//! These tests drive the full construct → invoke → close lifecycle against
//! WAT guests speaking the guest call protocol, including host callbacks
//! routed through a dispatcher.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use guest_bridge::{
    BridgeConfig, BridgeError, EngineConfig, GuestBridge, HostCall, HostCallError, HostDispatcher,
    PoolConfig,
};

/// Echoes the payload for operations starting with 'e', reports
/// "unknown operation" otherwise.
const ECHO_WAT: &str = r#"
    (module
        (import "wapc" "__guest_request" (func $guest_request (param i32 i32)))
        (import "wapc" "__guest_response" (func $guest_response (param i32 i32)))
        (import "wapc" "__guest_error" (func $guest_error (param i32 i32)))
        (memory (export "memory") 1)
        (data (i32.const 8192) "unknown operation")

        (func (export "__guest_call") (param $op_len i32) (param $req_len i32) (result i32)
            ;; operation written at 0, payload at 4096
            (call $guest_request (i32.const 0) (i32.const 4096))
            (if (result i32)
                (i32.eq (i32.load8_u (i32.const 0)) (i32.const 101)) ;; 'e'
                (then
                    (call $guest_response (i32.const 4096) (local.get $req_len))
                    (i32.const 1))
                (else
                    (call $guest_error (i32.const 8192) (i32.const 17))
                    (i32.const 0))))
    )
"#;

/// Forwards every operation to the host via `__host_call` (namespace and
/// operation both set to the invoked operation name) and relays the
/// host's response or error back to the caller.
const RELAY_WAT: &str = r#"
    (module
        (import "wapc" "__guest_request" (func $guest_request (param i32 i32)))
        (import "wapc" "__guest_response" (func $guest_response (param i32 i32)))
        (import "wapc" "__guest_error" (func $guest_error (param i32 i32)))
        (import "wapc" "__host_call"
            (func $host_call (param i32 i32 i32 i32 i32 i32 i32 i32) (result i32)))
        (import "wapc" "__host_response_len" (func $host_response_len (result i32)))
        (import "wapc" "__host_response" (func $host_response (param i32)))
        (import "wapc" "__host_error_len" (func $host_error_len (result i32)))
        (import "wapc" "__host_error" (func $host_error (param i32)))
        (memory (export "memory") 1)

        (func (export "__guest_call") (param $op_len i32) (param $req_len i32) (result i32)
            (local $len i32)
            ;; operation at 0, payload at 4096
            (call $guest_request (i32.const 0) (i32.const 4096))
            (if (result i32)
                (call $host_call
                    (i32.const 0) (i32.const 0)         ;; binding: empty
                    (i32.const 0) (local.get $op_len)   ;; namespace: operation name
                    (i32.const 0) (local.get $op_len)   ;; operation: operation name
                    (i32.const 4096) (local.get $req_len))
                (then
                    (local.set $len (call $host_response_len))
                    (call $host_response (i32.const 16384))
                    (call $guest_response (i32.const 16384) (local.get $len))
                    (i32.const 1))
                (else
                    (local.set $len (call $host_error_len))
                    (call $host_error (i32.const 16384))
                    (call $guest_error (i32.const 16384) (local.get $len))
                    (i32.const 0))))
    )
"#;

/// Traps as soon as it is invoked.
const TRAP_WAT: &str = r#"
    (module
        (memory (export "memory") 1)
        (func (export "__guest_call") (param i32 i32) (result i32)
            unreachable)
    )
"#;

/// Spins forever; only terminates through fuel exhaustion.
const SPIN_WAT: &str = r#"
    (module
        (memory (export "memory") 1)
        (func (export "__guest_call") (param i32 i32) (result i32)
            (loop $forever (br $forever))
            (i32.const 1))
    )
"#;

/// Dispatcher that records every call and relays or fails on demand.
struct RecordingDispatcher {
    calls: Mutex<Vec<String>>,
}

impl RecordingDispatcher {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl HostDispatcher for RecordingDispatcher {
    fn dispatch(&self, call: HostCall<'_>) -> Result<Vec<u8>, HostCallError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}/{}", call.namespace, call.operation));
        match call.operation {
            "relay" => Ok(call.payload.iter().rev().copied().collect()),
            _ => Err(HostCallError::failed("backend unavailable")),
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn unused_dispatcher() -> Arc<dyn HostDispatcher> {
    Arc::new(|call: HostCall<'_>| -> Result<Vec<u8>, HostCallError> {
        Err(HostCallError::UnknownOperation {
            namespace: call.namespace.into(),
            operation: call.operation.into(),
        })
    })
}

fn wasm(wat: &str) -> Vec<u8> {
    wat::parse_str(wat).unwrap()
}

fn config(capacity: usize) -> BridgeConfig {
    BridgeConfig {
        pool: PoolConfig {
            capacity,
            ..Default::default()
        },
        ..Default::default()
    }
}

// ============================================================================
// Test: Invocation
// ============================================================================

#[tokio::test]
async fn test_echo_round_trip() {
    init_tracing();

    let bridge = GuestBridge::new(&wasm(ECHO_WAT), unused_dispatcher(), config(2))
        .await
        .unwrap();

    let result = bridge.invoke("echo", b"ping").await.unwrap();
    assert_eq!(result, b"ping");
    assert!(!bridge.content_hash().is_empty());
}

#[tokio::test]
async fn test_unknown_operation_carries_name() {
    let bridge = GuestBridge::new(&wasm(ECHO_WAT), unused_dispatcher(), config(1))
        .await
        .unwrap();

    let err = bridge.invoke("frobnicate", b"ping").await.unwrap_err();
    match err {
        BridgeError::Invocation { operation, reason } => {
            assert_eq!(operation, "frobnicate");
            assert_eq!(reason, "unknown operation");
        }
        other => panic!("expected Invocation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_trap_surfaces_as_invocation() {
    let bridge = GuestBridge::new(&wasm(TRAP_WAT), unused_dispatcher(), config(1))
        .await
        .unwrap();

    let err = bridge.invoke("anything", b"").await.unwrap_err();
    match err {
        BridgeError::Invocation { operation, reason } => {
            assert_eq!(operation, "anything");
            assert!(reason.contains("trapped"), "unexpected reason: {reason}");
        }
        other => panic!("expected Invocation, got {other:?}"),
    }

    // the instance is back in the pool and further calls still fail cleanly
    let err = bridge.invoke("again", b"").await.unwrap_err();
    assert!(matches!(err, BridgeError::Invocation { .. }));
}

#[tokio::test]
async fn test_fuel_exhaustion_surfaces_as_invocation() {
    let bridge = GuestBridge::new(
        &wasm(SPIN_WAT),
        unused_dispatcher(),
        BridgeConfig {
            engine: EngineConfig {
                fuel_metering: true,
                max_fuel_per_call: 10_000,
            },
            pool: PoolConfig {
                capacity: 1,
                ..Default::default()
            },
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let err = bridge.invoke("spin", b"").await.unwrap_err();
    match err {
        BridgeError::Invocation { operation, reason } => {
            assert_eq!(operation, "spin");
            assert!(reason.contains("fuel"), "unexpected reason: {reason}");
        }
        other => panic!("expected Invocation, got {other:?}"),
    }
}

// ============================================================================
// Test: Concurrency
// ============================================================================

#[tokio::test]
async fn test_three_concurrent_invocations_on_capacity_two() {
    let bridge = Arc::new(
        GuestBridge::new(&wasm(ECHO_WAT), unused_dispatcher(), config(2))
            .await
            .unwrap(),
    );

    let mut tasks = Vec::new();
    for _ in 0..3 {
        let bridge = Arc::clone(&bridge);
        tasks.push(tokio::spawn(
            async move { bridge.invoke("echo", b"ping").await },
        ));
    }

    let mut successes = 0;
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), b"ping");
        successes += 1;
    }
    assert_eq!(successes, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_exhaustion_while_guest_is_busy() {
    // dispatcher blocks its worker long enough for the second call's
    // acquisition window to elapse
    let blocking: Arc<dyn HostDispatcher> =
        Arc::new(|call: HostCall<'_>| -> Result<Vec<u8>, HostCallError> {
            if call.operation == "block" {
                std::thread::sleep(Duration::from_millis(400));
                Ok(b"done".to_vec())
            } else {
                Err(HostCallError::failed("unexpected operation"))
            }
        });

    let bridge = Arc::new(
        GuestBridge::new(
            &wasm(RELAY_WAT),
            blocking,
            BridgeConfig {
                pool: PoolConfig {
                    capacity: 1,
                    acquire_timeout_ms: 100,
                },
                ..Default::default()
            },
        )
        .await
        .unwrap(),
    );

    let busy = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.invoke("block", b"").await })
    };

    // let the first invocation check out the only instance
    tokio::time::sleep(Duration::from_millis(150)).await;

    let err = bridge.invoke("block", b"").await.unwrap_err();
    assert!(matches!(err, BridgeError::PoolExhausted { timeout_ms: 100 }));
    assert!(err.is_retryable());

    assert_eq!(busy.await.unwrap().unwrap(), b"done");
}

// ============================================================================
// Test: Host Callbacks
// ============================================================================

#[tokio::test]
async fn test_host_call_round_trip() {
    let dispatcher = RecordingDispatcher::new();
    let bridge = GuestBridge::new(&wasm(RELAY_WAT), dispatcher.clone(), config(1))
        .await
        .unwrap();

    let result = bridge.invoke("relay", b"ping").await.unwrap();
    assert_eq!(result, b"gnip");

    assert_eq!(dispatcher.calls(), vec!["relay/relay".to_string()]);
}

#[tokio::test]
async fn test_host_call_error_reaches_caller() {
    let dispatcher = RecordingDispatcher::new();
    let bridge = GuestBridge::new(&wasm(RELAY_WAT), dispatcher.clone(), config(1))
        .await
        .unwrap();

    let err = bridge.invoke("fail", b"ping").await.unwrap_err();
    match err {
        BridgeError::Invocation { operation, reason } => {
            assert_eq!(operation, "fail");
            assert!(
                reason.contains("backend unavailable"),
                "unexpected reason: {reason}"
            );
        }
        other => panic!("expected Invocation, got {other:?}"),
    }
}

// ============================================================================
// Test: Lifecycle
// ============================================================================

#[tokio::test]
async fn test_malformed_bytecode_fails_with_load() {
    let result =
        GuestBridge::new(b"definitely not wasm", unused_dispatcher(), config(1)).await;

    assert!(matches!(result, Err(BridgeError::Load { .. })));
}

#[tokio::test]
async fn test_zero_capacity_rejected() {
    let result = GuestBridge::new(&wasm(ECHO_WAT), unused_dispatcher(), config(0)).await;

    assert!(matches!(result, Err(BridgeError::InvalidConfig { .. })));
}

#[tokio::test]
async fn test_invoke_after_close_fails_with_closed() {
    let bridge = GuestBridge::new(&wasm(ECHO_WAT), unused_dispatcher(), config(2))
        .await
        .unwrap();

    assert_eq!(bridge.invoke("echo", b"ping").await.unwrap(), b"ping");

    bridge.close();
    assert!(bridge.is_closed());

    let err = bridge.invoke("echo", b"ping").await.unwrap_err();
    assert!(err.is_closed());

    // close is idempotent
    bridge.close();
    let err = bridge.invoke("echo", b"ping").await.unwrap_err();
    assert!(err.is_closed());
}
