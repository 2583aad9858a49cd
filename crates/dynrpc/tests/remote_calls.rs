// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::missing_panics_doc)] // Tests panic on failure
#![allow(clippy::too_many_lines)] // Scenario tests
#![allow(clippy::cast_possible_wrap)] // Test conversions

//! End-to-end calls between a `Server` and a `Connection` over a loopback
//! link.
//!
//! The exposed object mirrors a typical example service:
//! - `hello`, `adder` and `subtracter` answer with one value
//! - `streamer` yields ten `{index}` dictionaries
//! - `mixed` streams integers with a string in the middle
//! - `error` always fails with `EPERM`
//! - `slow` blocks until the test opens its gate
//! - `endless` counts forever and records when it is released

use dynrpc::rpc::{
    errno, loopback, CallResult, Connection, Instance, RemoteError, Reply, RpcError, Server, StreamState,
    DISCOVERABLE_INTERFACE, INTROSPECTABLE_INTERFACE, OBSERVABLE_INTERFACE, TYPING_INTERFACE,
};
use dynrpc::{RuntimeConfig, Typing, Value, ValueKind};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

const EXAMPLE_PATH: &str = "/example";
const EXAMPLE_INTERFACE: &str = "com.twoporeguys.librpc.ExampleServer";

const EXAMPLE_SCHEMA: &str = r#"
meta:
  version: 1
  namespace: com.twoporeguys.librpc
  description: Example service
interface ExampleServer:
  description: Greets and adds
  members:
    method hello:
      args:
        - { name: name, type: string }
      return: { type: string }
    method adder:
      args:
        - { name: a, type: int64 }
        - { name: b, type: int64 }
      return: { type: int64 }
    method mixed:
      return: { type: int64 }
    property name: { type: string, constraints: { min-length: 1 } }
    property count: { type: int64, read-only: true }
    event pinged: { type: string }
"#;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn schema() -> Typing {
    let typing = Typing::new();
    typing
        .load_str(EXAMPLE_SCHEMA, "example.yaml")
        .expect("load example schema");
    typing
}

/// Endless counter that records how far it was pulled and when it is
/// released.
struct Counter {
    next: i64,
    produced: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

impl Iterator for Counter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        self.produced.fetch_add(1, Ordering::SeqCst);
        self.next += 1;
        Some(Value::from(self.next - 1))
    }
}

impl Drop for Counter {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

struct Example {
    server: Server,
    connection: Connection,
    name: Arc<Mutex<String>>,
    gate: mpsc::Sender<()>,
    produced: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

impl Example {
    fn start(client_typing: Typing, config: RuntimeConfig) -> Self {
        init_logging();
        let name = Arc::new(Mutex::new(String::from("example")));
        let (gate, gate_rx) = mpsc::channel::<()>();
        let gate_rx = Arc::new(Mutex::new(gate_rx));
        let produced = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicBool::new(false));

        let instance = Instance::builder(EXAMPLE_PATH, "Example server")
            .interface(EXAMPLE_INTERFACE, |iface| {
                let reader = name.clone();
                let writer = name.clone();
                let produced = produced.clone();
                let released = released.clone();
                iface
                    .method("hello", |_ctx, args| {
                        let who = args.first().and_then(Value::as_str).unwrap_or("world");
                        Ok(Reply::from(Value::from(format!("Hello {who}"))))
                    })
                    .method("adder", |_ctx, args| {
                        let a = args.first().and_then(Value::as_i64).unwrap_or_default();
                        let b = args.get(1).and_then(Value::as_i64).unwrap_or_default();
                        Ok(Reply::from(Value::from(a + b)))
                    })
                    .method("subtracter", |_ctx, args| {
                        let a = args.first().and_then(Value::as_i64).unwrap_or_default();
                        let b = args.get(1).and_then(Value::as_i64).unwrap_or_default();
                        Ok(Reply::from(Value::from(a - b)))
                    })
                    .method("streamer", |_ctx, _args| {
                        Ok(Reply::stream(
                            (0..10i64).map(|i| Value::from_entries([("index", Value::from(i))])),
                        ))
                    })
                    .method("mixed", |_ctx, _args| {
                        Ok(Reply::stream(
                            [Value::from(1i64), Value::from(2u64), Value::from("three"), Value::from(4i64)]
                                .into_iter(),
                        ))
                    })
                    .method("error", |_ctx, _args| {
                        Err(RemoteError::new(errno::EPERM, "Not allowed here"))
                    })
                    .method("slow", move |_ctx, _args| {
                        // A dropped gate releases the handler too.
                        drop(gate_rx.lock().recv());
                        Ok(Reply::from(Value::from("done")))
                    })
                    .method("endless", move |_ctx, _args| {
                        Ok(Reply::stream(Counter {
                            next: 0,
                            produced: produced.clone(),
                            released: released.clone(),
                        }))
                    })
                    .method("ping", |ctx, args| {
                        let delivered = ctx.emit("pinged", args.into_iter().next().unwrap_or_default());
                        Ok(Reply::from(Value::from(delivered)))
                    })
                    .writable_property(
                        "name",
                        move |_ctx| Ok(Value::from(reader.lock().clone())),
                        move |_ctx, value| {
                            let text = value
                                .as_str()
                                .ok_or_else(|| RemoteError::new(errno::EINVAL, "name must be a string"))?;
                            *writer.lock() = text.to_string();
                            Ok(())
                        },
                    )
                    .property("count", |_ctx| Ok(Value::from(42i64)))
            })
            .build();

        let server = Server::new(schema(), RuntimeConfig::default());
        server.register(instance);
        server.register(Instance::builder("/example/sub/deep", "Nested").build());

        let (client_link, server_link) = loopback::pair(64);
        server.serve(server_link);
        let connection = Connection::with_typing(client_link, client_typing, config);

        Self {
            server,
            connection,
            name,
            gate,
            produced,
            released,
        }
    }

    fn untyped() -> Self {
        Self::start(Typing::new(), RuntimeConfig::default())
    }

    async fn call(&self, method: &str, args: Vec<Value>) -> Result<CallResult, RpcError> {
        self.connection.call(EXAMPLE_PATH, EXAMPLE_INTERFACE, method, args).await
    }

    async fn single(&self, method: &str, args: Vec<Value>) -> Value {
        self.call(method, args)
            .await
            .expect("call")
            .single()
            .expect("single reply")
    }
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

// -----------------------------------------------------------------------------
// Calls
// -----------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn test_simple_calls() {
    let example = Example::untyped();

    assert_eq!(
        example.single("hello", vec![Value::from("world")]).await,
        Value::from("Hello world")
    );
    assert_eq!(
        example.single("adder", vec![Value::from(5i64), Value::from(6i64)]).await,
        Value::from(11i64)
    );
    assert_eq!(
        example.single("subtracter", vec![Value::from(5i64), Value::from(6i64)]).await,
        Value::from(-1i64)
    );
    assert_eq!(example.connection.pending_calls(), 0);
    assert!(example.server.calls_processed() >= 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_error() {
    let example = Example::untyped();

    match example.call("error", Vec::new()).await {
        Err(RpcError::Remote(err)) => {
            assert_eq!(err.code, errno::EPERM);
            assert_eq!(err.message, "Not allowed here");
        }
        other => panic!("expected a remote error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_method_not_found() {
    let example = Example::untyped();

    let missing_method = example.call("nope", Vec::new()).await;
    assert!(matches!(missing_method, Err(RpcError::MethodNotFound(_))));

    let missing_path = example
        .connection
        .call("/nowhere", EXAMPLE_INTERFACE, "hello", Vec::new())
        .await;
    assert!(matches!(missing_path, Err(RpcError::MethodNotFound(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fast_call_completes_while_slow_blocks() {
    let example = Example::untyped();

    let slow = tokio::spawn({
        let connection = example.connection.clone();
        async move {
            connection
                .call(EXAMPLE_PATH, EXAMPLE_INTERFACE, "slow", Vec::new())
                .await
        }
    });
    assert!(eventually(|| example.connection.pending_calls() == 1).await);

    assert_eq!(
        example.single("adder", vec![Value::from(1i64), Value::from(2i64)]).await,
        Value::from(3i64)
    );
    assert!(!slow.is_finished());

    example.gate.send(()).expect("open gate");
    let reply = slow.await.expect("join").expect("slow").single().expect("single");
    assert_eq!(reply, Value::from("done"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_call_timeout() {
    let config = RuntimeConfig::default().call_timeout(Duration::from_millis(100));
    let example = Example::start(Typing::new(), config);

    let result = example.call("slow", Vec::new()).await;
    assert!(matches!(result, Err(RpcError::Timeout)));
    assert_eq!(example.connection.pending_calls(), 0);

    // The connection stays usable.
    example.gate.send(()).expect("open gate");
    assert_eq!(
        example.single("adder", vec![Value::from(2i64), Value::from(2i64)]).await,
        Value::from(4i64)
    );
}

// -----------------------------------------------------------------------------
// Streams
// -----------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn test_stream_in_order() {
    let example = Example::untyped();

    let mut stream = example
        .call("streamer", Vec::new())
        .await
        .expect("call")
        .stream()
        .expect("stream");
    assert_eq!(stream.state(), StreamState::Idle);

    let mut indices = Vec::new();
    while let Some(item) = stream.next().await {
        let item = item.expect("fragment");
        indices.push(item.get_key("index").and_then(Value::as_i64).expect("index"));
    }
    assert_eq!(indices, (0..10).collect::<Vec<i64>>());
    assert_eq!(stream.state(), StreamState::Closed);
    assert_eq!(example.connection.pending_calls(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stream_collect_with_window() {
    let config = RuntimeConfig::default().stream_window(4);
    let example = Example::start(Typing::new(), config);

    let values = example
        .call("streamer", Vec::new())
        .await
        .expect("call")
        .stream()
        .expect("stream")
        .collect()
        .await
        .expect("collect");
    assert_eq!(values.len(), 10);
    assert_eq!(values[9].get_key("index"), Some(&Value::from(9i64)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_typed_stream_checks_each_item() {
    let example = Example::start(schema(), RuntimeConfig::default());

    let root = example.connection.introspect().await.expect("introspect");
    let mixed = root
        .find(EXAMPLE_PATH)
        .and_then(|node| node.interface(EXAMPLE_INTERFACE))
        .and_then(|iface| iface.method("mixed"))
        .expect("mixed")
        .clone();
    assert!(mixed.is_typed());

    let mut stream = mixed.call(Vec::new()).await.expect("call").stream().expect("stream");
    assert_eq!(stream.next().await.expect("first").expect("int"), Value::from(1i64));
    let second = stream.next().await.expect("second").expect("coerced");
    assert_eq!(second.kind(), ValueKind::Int64);
    assert!(matches!(stream.next().await, Some(Err(RpcError::Value(_)))));
    assert!(stream.next().await.is_none());
    assert_eq!(stream.state(), StreamState::Closed);
    assert!(eventually(|| example.connection.pending_calls() == 0).await);

    // The untyped call path delivers the stream as sent.
    let values = example
        .call("mixed", Vec::new())
        .await
        .expect("call")
        .stream()
        .expect("stream")
        .collect()
        .await
        .expect("collect");
    assert_eq!(values.len(), 4);
    assert_eq!(values[2], Value::from("three"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_abandoned_stream_releases_producer() {
    let example = Example::untyped();

    let mut stream = example
        .call("endless", Vec::new())
        .await
        .expect("call")
        .stream()
        .expect("stream");
    for expected in 0..3i64 {
        let value = stream.next().await.expect("item").expect("value");
        assert_eq!(value, Value::from(expected));
    }
    drop(stream);

    let released = example.released.clone();
    assert!(eventually(|| released.load(Ordering::SeqCst)).await);
    // One item of credit at a time: nothing is produced far ahead.
    assert!(example.produced.load(Ordering::SeqCst) <= 4);
    assert_eq!(example.connection.pending_calls(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_server_shutdown_mid_stream() {
    let example = Example::untyped();

    let mut stream = example
        .call("endless", Vec::new())
        .await
        .expect("call")
        .stream()
        .expect("stream");
    stream.next().await.expect("item").expect("value");

    example.server.shutdown();
    assert!(!example.server.is_running());

    let failure = loop {
        match stream.next().await {
            Some(Ok(_)) => continue,
            Some(Err(err)) => break err,
            None => panic!("stream ended without an error"),
        }
    };
    assert!(matches!(failure, RpcError::ConnectionClosed));
    let connection = example.connection.clone();
    assert!(eventually(|| connection.is_closed()).await);

    let after = example.call("hello", Vec::new()).await;
    assert!(matches!(after, Err(RpcError::ConnectionClosed)));

    let released = example.released.clone();
    assert!(eventually(|| released.load(Ordering::SeqCst)).await);
}

// -----------------------------------------------------------------------------
// Introspection and proxies
// -----------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn test_builtin_interfaces() {
    let example = Example::untyped();
    let connection = &example.connection;

    let names = connection
        .call(EXAMPLE_PATH, INTROSPECTABLE_INTERFACE, "get_interfaces", Vec::new())
        .await
        .expect("call")
        .single()
        .expect("single");
    let names: Vec<&str> = names
        .as_array()
        .expect("array")
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(names.contains(&EXAMPLE_INTERFACE));
    assert!(names.contains(&OBSERVABLE_INTERFACE));
    assert!(!names.contains(&DISCOVERABLE_INTERFACE));

    let exists = connection
        .call(EXAMPLE_PATH, INTROSPECTABLE_INTERFACE, "interface_exists", vec![Value::from("x.Y")])
        .await
        .expect("call")
        .single()
        .expect("single");
    assert_eq!(exists, Value::from(false));

    let all = connection
        .call(EXAMPLE_PATH, OBSERVABLE_INTERFACE, "get_all", vec![Value::from(EXAMPLE_INTERFACE)])
        .await
        .expect("call")
        .single()
        .expect("single");
    let props = all.as_array().expect("array");
    assert_eq!(props.len(), 2);
    assert!(props
        .iter()
        .any(|p| p.get_key("name") == Some(&Value::from("count")) && p.get_key("value") == Some(&Value::from(42i64))));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_introspect_tree() {
    let example = Example::untyped();

    let root = example.connection.introspect().await.expect("introspect");
    assert_eq!(root.path(), "/");
    assert!(root.interface(DISCOVERABLE_INTERFACE).is_some());
    assert!(root.interface(TYPING_INTERFACE).is_some());

    let node = root.find(EXAMPLE_PATH).expect("example node");
    assert_eq!(node.description(), "Example server");
    let iface = node.interface(EXAMPLE_INTERFACE).expect("example interface");
    let methods: Vec<&str> = iface.methods().map(|m| m.name()).collect();
    for expected in ["adder", "error", "hello", "streamer", "subtracter"] {
        assert!(methods.contains(&expected), "missing {expected}");
    }
    assert!(iface.property("count").expect("count").is_read_only());
    assert!(!iface.property("name").expect("name").is_read_only());
    assert!(iface.description().is_none());

    let deep = root.find("/example/sub/deep").expect("deep node");
    assert_eq!(deep.description(), "Nested");
    let intermediate = root.find("/example/sub").expect("intermediate node");
    assert!(intermediate.interfaces().next().is_none());
    assert!(root.find("/example/other").is_none());

    let paths: Vec<&str> = root.walk().into_iter().map(|n| n.path()).collect();
    assert_eq!(paths, ["/", "/example", "/example/sub", "/example/sub/deep"]);

    let reply = iface
        .call("adder", vec![Value::from(20i64), Value::from(22i64)])
        .await
        .expect("call")
        .single()
        .expect("single");
    assert_eq!(reply, Value::from(42i64));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_typed_methods_validate_arguments() {
    let example = Example::start(schema(), RuntimeConfig::default());

    let root = example.connection.introspect().await.expect("introspect");
    let iface = root
        .find(EXAMPLE_PATH)
        .and_then(|node| node.interface(EXAMPLE_INTERFACE))
        .expect("example interface");
    assert_eq!(iface.description(), Some("Greets and adds"));

    let adder = iface.method("adder").expect("adder");
    assert!(adder.is_typed());
    let args: Vec<&str> = adder.arguments().into_iter().map(|(name, _)| name).collect();
    assert_eq!(args, ["a", "b"]);

    let sum = adder
        .call(vec![Value::from(1i64), Value::from(2u64)])
        .await
        .expect("call")
        .single()
        .expect("single");
    assert_eq!(sum, Value::from(3i64));

    let wrong_type = adder.call(vec![Value::from("one"), Value::from(2i64)]).await;
    assert!(matches!(wrong_type, Err(RpcError::InvalidArguments(_))));
    let wrong_count = adder.call(vec![Value::from(1i64)]).await;
    assert!(matches!(wrong_count, Err(RpcError::InvalidArguments(_))));

    // Undeclared methods are passed through unchecked.
    let subtracter = iface.method("subtracter").expect("subtracter");
    assert!(!subtracter.is_typed());

    let count = iface.property("count").expect("count");
    assert!(count.type_instance().is_some());
    assert_eq!(count.get().await.expect("get"), Value::from(42i64));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_property_access() {
    let example = Example::untyped();

    let root = example.connection.introspect().await.expect("introspect");
    let iface = root
        .find(EXAMPLE_PATH)
        .and_then(|node| node.interface(EXAMPLE_INTERFACE))
        .expect("example interface");

    let name = iface.property("name").expect("name");
    assert_eq!(name.get().await.expect("get"), Value::from("example"));
    name.set("renamed").await.expect("set");
    assert_eq!(name.get().await.expect("get"), Value::from("renamed"));
    assert_eq!(*example.name.lock(), "renamed");

    // Checked by the server against its schema.
    match name.set(5i64).await {
        Err(RpcError::Remote(err)) => assert_eq!(err.code, errno::EINVAL),
        other => panic!("expected EINVAL, got {other:?}"),
    }
    match name.set("").await {
        Err(RpcError::Remote(err)) => {
            assert_eq!(err.code, errno::EINVAL);
            assert!(err.message.contains("min-length"), "{}", err.message);
        }
        other => panic!("expected EINVAL, got {other:?}"),
    }

    let count = iface.property("count").expect("count");
    match count.set(1i64).await {
        Err(RpcError::Remote(err)) => assert_eq!(err.code, errno::EPERM),
        other => panic!("expected EPERM, got {other:?}"),
    }
    assert_eq!(*example.name.lock(), "renamed");
}

// -----------------------------------------------------------------------------
// Events and typing
// -----------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn test_property_change_event() {
    let example = Example::untyped();

    let mut changes = example
        .connection
        .subscribe(EXAMPLE_PATH, OBSERVABLE_INTERFACE, "changed")
        .await
        .expect("subscribe");

    example
        .connection
        .call(
            EXAMPLE_PATH,
            OBSERVABLE_INTERFACE,
            "set",
            vec![Value::from(EXAMPLE_INTERFACE), Value::from("name"), Value::from("fresh")],
        )
        .await
        .expect("set");

    let event = tokio::time::timeout(Duration::from_secs(5), changes.recv())
        .await
        .expect("event in time")
        .expect("event");
    assert_eq!(event.path, EXAMPLE_PATH);
    assert_eq!(event.args.get_key("name"), Some(&Value::from("name")));
    assert_eq!(event.args.get_key("value"), Some(&Value::from("fresh")));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_handler_emits_event() {
    let example = Example::untyped();

    let mut pings = example
        .connection
        .subscribe(EXAMPLE_PATH, EXAMPLE_INTERFACE, "pinged")
        .await
        .expect("subscribe");

    let delivered = example.single("ping", vec![Value::from("hi")]).await;
    assert_eq!(delivered, Value::from(1usize));

    let event = tokio::time::timeout(Duration::from_secs(5), pings.recv())
        .await
        .expect("event in time")
        .expect("event");
    assert_eq!(event.args, Value::from("hi"));

    example
        .connection
        .unsubscribe(EXAMPLE_PATH, EXAMPLE_INTERFACE, "pinged")
        .await
        .expect("unsubscribe");
    assert!(eventually(|| example.server.emit(EXAMPLE_PATH, EXAMPLE_INTERFACE, "pinged", Value::null()) == 0).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_download_types() {
    let example = Example::untyped();
    assert!(!example.connection.typing().contains(EXAMPLE_INTERFACE));

    let report = example.connection.download_types().await.expect("download");
    assert!(report.is_ok(), "{:?}", report.failures);
    assert_eq!(report.loaded.len(), 1);
    assert!(example.connection.typing().contains(EXAMPLE_INTERFACE));

    // Proxies built afterwards are typed.
    let root = example.connection.introspect().await.expect("introspect");
    let hello = root
        .find(EXAMPLE_PATH)
        .and_then(|node| node.interface(EXAMPLE_INTERFACE))
        .and_then(|iface| iface.method("hello"))
        .expect("hello");
    assert!(hello.is_typed());
}
