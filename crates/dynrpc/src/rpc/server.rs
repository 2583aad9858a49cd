// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPC server: instance table, per-connection sessions and call dispatch.
//!
//! Every inbound call runs on its own task and host handlers run on the
//! blocking pool, so a slow handler never stalls other calls or sessions.

use crate::config::{RuntimeConfig, MAX_STREAM_WINDOW};
use crate::dynamic::{conform_member, Value};
use crate::rpc::error::{errno, RemoteError};
use crate::rpc::frame::{Event, EventKey, Frame, Link, Message};
use crate::rpc::service::{Capability, CallContext, Instance, Interface, PropertyGetter, PropertySetter, Reply};
use crate::rpc::{DISCOVERABLE_INTERFACE, INTROSPECTABLE_INTERFACE, OBSERVABLE_INTERFACE, ROOT_PATH, TYPING_INTERFACE};
use crate::typing::{MemberRole, TypeClass, Typing};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;

type Producer = Box<dyn Iterator<Item = Result<Value, RemoteError>> + Send>;

/// Why a call produced no reply.
enum Failure {
    /// Dispatch miss.
    NotFound(String),
    Remote(RemoteError),
}

impl From<RemoteError> for Failure {
    fn from(err: RemoteError) -> Self {
        Self::Remote(err)
    }
}

struct CallRequest {
    path: String,
    interface: String,
    method: String,
    args: Vec<Value>,
}

/// State of one served connection.
struct Session {
    id: u64,
    out: mpsc::UnboundedSender<Frame>,
    subscriptions: Mutex<HashSet<EventKey>>,
    /// Calls in flight; streams hold their credit channel.
    calls: DashMap<u64, Option<mpsc::UnboundedSender<u32>>>,
}

impl Session {
    fn send(&self, id: u64, message: Message) -> bool {
        self.out.send(Frame::new(id, message)).is_ok()
    }

    /// Send the final frame of a call unless the peer aborted it.
    fn finish(&self, id: u64, message: Message) {
        if self.calls.remove(&id).is_some() {
            self.send(id, message);
        }
    }
}

struct ServerInner {
    instances: RwLock<BTreeMap<String, Arc<Instance>>>,
    typing: Typing,
    config: RuntimeConfig,
    sessions: DashMap<u64, Arc<Session>>,
    next_session: AtomicU64,
    inflight: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    calls_processed: AtomicU64,
}

/// Serves registered instances over any number of links.
///
/// Cloning gives another handle to the same server.
///
/// # Example
///
/// ```rust,no_run
/// use dynrpc::rpc::{loopback, Connection, Instance, Reply, Server};
/// use dynrpc::{RuntimeConfig, Typing, Value};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let server = Server::new(Typing::new(), RuntimeConfig::default());
/// server.register(
///     Instance::builder("/echo", "Echo service")
///         .interface("com.example.Echo", |iface| {
///             iface.method("echo", |_ctx, args| Ok(Reply::from(Value::from(args))))
///         })
///         .build(),
/// );
///
/// let (client_link, server_link) = loopback::pair(64);
/// server.serve(server_link);
/// let connection = Connection::connect(client_link, RuntimeConfig::default());
/// let reply = connection.call("/echo", "com.example.Echo", "echo", vec![Value::from(1i64)]).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    pub fn new(typing: Typing, config: RuntimeConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        let inflight = Arc::new(Semaphore::new(config.max_inflight_calls.max(1)));
        Self {
            inner: Arc::new(ServerInner {
                instances: RwLock::new(BTreeMap::new()),
                typing,
                config,
                sessions: DashMap::new(),
                next_session: AtomicU64::new(1),
                inflight,
                shutdown,
                calls_processed: AtomicU64::new(0),
            }),
        }
    }

    /// Bind an instance at its path, replacing (and returning) any
    /// previous binding.
    pub fn register(&self, instance: Instance) -> Option<Arc<Instance>> {
        let path = instance.path().to_string();
        let previous = self.inner.instances.write().insert(path.clone(), Arc::new(instance));
        match previous {
            Some(_) => log::info!("[rpc] instance {} replaced", path),
            None => log::info!("[rpc] instance {} registered", path),
        }
        previous
    }

    pub fn unregister(&self, path: &str) -> Option<Arc<Instance>> {
        let removed = self.inner.instances.write().remove(path);
        if removed.is_some() {
            log::info!("[rpc] instance {} unregistered", path);
        }
        removed
    }

    pub fn instance(&self, path: &str) -> Option<Arc<Instance>> {
        self.inner.instances.read().get(path).cloned()
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.inner.instances.read().keys().cloned().collect()
    }

    pub fn typing(&self) -> &Typing {
        &self.inner.typing
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Serve one connection until the peer hangs up or the server shuts
    /// down. Must be called from within a tokio runtime.
    pub fn serve(&self, link: Link) -> JoinHandle<()> {
        let (tx, rx) = link.split();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session {
            id,
            out: out_tx,
            subscriptions: Mutex::new(HashSet::new()),
            calls: DashMap::new(),
        });
        self.inner.sessions.insert(id, session.clone());
        log::info!("[rpc] session {} opened", id);

        let shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(self.clone().run_session(session, tx, rx, out_rx, shutdown))
    }

    /// Deliver an event to every connection subscribed to
    /// `(path, interface, name)`. Returns the number of deliveries.
    pub fn emit(&self, path: &str, interface: &str, name: &str, args: impl Into<Value>) -> usize {
        let event = Event {
            path: path.to_string(),
            interface: interface.to_string(),
            name: name.to_string(),
            args: args.into(),
        };
        let key = event.key();

        let mut delivered = 0;
        for session in self.inner.sessions.iter() {
            if session.subscriptions.lock().contains(&key) && session.send(0, Message::Event(event.clone())) {
                delivered += 1;
            }
        }
        log::debug!("[rpc] event {}.{} on {} delivered {} times", interface, name, path, delivered);
        delivered
    }

    /// Close every session. Pending calls see their connection drop.
    pub fn shutdown(&self) {
        log::info!("[rpc] server shutting down ({} sessions)", self.inner.sessions.len());
        self.inner.shutdown.send_replace(true);
    }

    pub fn is_running(&self) -> bool {
        !*self.inner.shutdown.borrow()
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Get the number of calls processed
    pub fn calls_processed(&self) -> u64 {
        self.inner.calls_processed.load(Ordering::Relaxed)
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    async fn run_session(
        self,
        session: Arc<Session>,
        tx: mpsc::Sender<Frame>,
        mut rx: mpsc::Receiver<Frame>,
        mut out_rx: mpsc::UnboundedReceiver<Frame>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                frame = rx.recv() => match frame {
                    Some(frame) => self.dispatch(&session, frame),
                    None => break,
                },
                Some(frame) = out_rx.recv() => {
                    if let Err(e) = tx.send(frame).await {
                        log::error!("[rpc] session {}: failed to send frame: {}", session.id, e);
                        break;
                    }
                }
            }
        }

        self.inner.sessions.remove(&session.id);
        // Dropping the credit channels releases every open stream producer.
        session.calls.clear();
        log::info!("[rpc] session {} closed", session.id);
    }

    fn dispatch(&self, session: &Arc<Session>, frame: Frame) {
        let Frame { id, message } = frame;
        match message {
            Message::Call {
                path,
                interface,
                method,
                args,
            } => {
                let request = CallRequest {
                    path,
                    interface,
                    method,
                    args,
                };
                self.spawn_call(session.clone(), id, request);
            }
            Message::Continue { credit } => {
                if let Some(entry) = session.calls.get(&id) {
                    if let Some(ctrl) = entry.value() {
                        // Ignore send error - producer may have finished
                        drop(ctrl.send(credit.min(MAX_STREAM_WINDOW)));
                    }
                }
            }
            Message::Abort => {
                if session.calls.remove(&id).is_some() {
                    log::debug!("[rpc] session {}: call {} aborted by peer", session.id, id);
                }
            }
            Message::Subscribe(key) => {
                session.subscriptions.lock().insert(key);
            }
            Message::Unsubscribe(key) => {
                session.subscriptions.lock().remove(&key);
            }
            other => log::warn!("[rpc] session {}: unexpected {} frame", session.id, other.name()),
        }
    }

    fn spawn_call(&self, session: Arc<Session>, id: u64, request: CallRequest) {
        session.calls.insert(id, None);
        let server = self.clone();

        tokio::spawn(async move {
            let Ok(permit) = server.inner.inflight.clone().acquire_owned().await else {
                return;
            };
            log::debug!(
                "[rpc] session {} call {}: {} {}.{}",
                session.id,
                id,
                request.path,
                request.interface,
                request.method
            );
            let outcome = server
                .invoke(&request.path, &request.interface, &request.method, request.args)
                .await;
            drop(permit);
            server.inner.calls_processed.fetch_add(1, Ordering::Relaxed);

            match outcome {
                Ok(Reply::Single(value)) => session.finish(id, Message::Response(value)),
                Ok(Reply::Stream(items)) => produce(session, id, items).await,
                Err(Failure::NotFound(what)) => {
                    log::debug!("[rpc] call {}: {} not found", id, what);
                    session.finish(id, Message::NotFound(what));
                }
                Err(Failure::Remote(err)) => {
                    log::warn!(
                        "[rpc] {}.{} on {} failed: {}",
                        request.interface,
                        request.method,
                        request.path,
                        err
                    );
                    session.finish(id, Message::Error(err));
                }
            }
        });
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    async fn invoke(&self, path: &str, interface: &str, method: &str, args: Vec<Value>) -> Result<Reply, Failure> {
        match interface {
            INTROSPECTABLE_INTERFACE => self.introspectable(path, method, &args).map(Reply::Single),
            OBSERVABLE_INTERFACE => self.observable(path, method, args).await.map(Reply::Single),
            DISCOVERABLE_INTERFACE if path == ROOT_PATH => self.discoverable(method).map(Reply::Single),
            TYPING_INTERFACE if path == ROOT_PATH => self.typing_unit(method).map(Reply::Single),
            _ => {
                let instance = self
                    .instance(path)
                    .ok_or_else(|| Failure::NotFound(format!("no instance at {path}")))?;
                let capability = instance
                    .interface(interface)
                    .and_then(|iface| iface.member(method))
                    .cloned()
                    .ok_or_else(|| Failure::NotFound(format!("{interface}.{method} at {path}")))?;
                let Capability::Method(handler) = capability else {
                    return Err(Failure::NotFound(format!("{interface}.{method} is a property")));
                };

                let ctx = CallContext::new(path, interface, method, Some(self.clone()));
                blocking(move || handler.call(&ctx, args)).await
            }
        }
    }

    /// Interfaces served at `path`, builtins included.
    fn interface_names(&self, path: &str) -> Option<(Option<Arc<Instance>>, BTreeSet<String>)> {
        let instance = self.instance(path);
        if instance.is_none() && path != ROOT_PATH {
            return None;
        }

        let mut names: BTreeSet<String> = [INTROSPECTABLE_INTERFACE, OBSERVABLE_INTERFACE]
            .iter()
            .map(|s| s.to_string())
            .collect();
        if path == ROOT_PATH {
            names.insert(DISCOVERABLE_INTERFACE.to_string());
            names.insert(TYPING_INTERFACE.to_string());
        }
        if let Some(instance) = &instance {
            names.extend(instance.interfaces().map(str::to_string));
        }
        Some((instance, names))
    }

    fn introspectable(&self, path: &str, method: &str, args: &[Value]) -> Result<Value, Failure> {
        let (instance, names) = self
            .interface_names(path)
            .ok_or_else(|| Failure::NotFound(format!("no instance at {path}")))?;

        match method {
            "get_interfaces" => Ok(Value::array(names)),
            "interface_exists" => {
                let name = string_arg(args, 0, "interface")?;
                Ok(Value::from(names.contains(&name)))
            }
            "get_methods" | "get_properties" => {
                let name = string_arg(args, 0, "interface")?;
                if !names.contains(&name) {
                    return Err(interface_not_found(&name));
                }
                let interface = instance.as_ref().and_then(|i| i.interface(&name));
                if method == "get_methods" {
                    let methods: Vec<String> = match (builtin_methods(&name), interface) {
                        (Some(builtin), _) => builtin.iter().map(|m| m.to_string()).collect(),
                        (None, Some(iface)) => iface.methods().map(str::to_string).collect(),
                        (None, None) => Vec::new(),
                    };
                    Ok(Value::array(methods))
                } else {
                    let properties = interface
                        .into_iter()
                        .flat_map(|iface| iface.properties())
                        .map(|(name, read_only)| {
                            Value::from_entries([("name", Value::from(name)), ("read_only", Value::from(read_only))])
                        });
                    Ok(Value::array(properties))
                }
            }
            other => Err(Failure::NotFound(format!("{INTROSPECTABLE_INTERFACE}.{other}"))),
        }
    }

    async fn observable(&self, path: &str, method: &str, args: Vec<Value>) -> Result<Value, Failure> {
        let (instance, _) = self
            .interface_names(path)
            .ok_or_else(|| Failure::NotFound(format!("no instance at {path}")))?;
        let iface_name = string_arg(&args, 0, "interface")?;
        let interface = instance
            .as_ref()
            .and_then(|i| i.interface(&iface_name))
            .cloned()
            .ok_or_else(|| interface_not_found(&iface_name))?;

        match method {
            "get" => {
                let name = string_arg(&args, 1, "property")?;
                let (getter, _) = property(&interface, &name)?;
                let ctx = CallContext::new(path, &iface_name, &name, Some(self.clone()));
                blocking(move || getter(&ctx)).await
            }
            "get_all" => {
                let mut readers: Vec<(String, PropertyGetter)> = Vec::new();
                for (name, _) in interface.properties() {
                    let (getter, _) = property(&interface, name)?;
                    readers.push((name.to_string(), getter));
                }
                let server = self.clone();
                let path = path.to_string();
                blocking(move || {
                    let mut values = Vec::with_capacity(readers.len());
                    for (name, getter) in readers {
                        let ctx = CallContext::new(&path, &iface_name, &name, Some(server.clone()));
                        let value = getter(&ctx)?;
                        values.push(Value::from_entries([("name", Value::from(name)), ("value", value)]));
                    }
                    Ok(Value::from(values))
                })
                .await
            }
            "set" => {
                let name = string_arg(&args, 1, "property")?;
                let value = args
                    .get(2)
                    .cloned()
                    .ok_or_else(|| RemoteError::new(errno::EINVAL, "missing value argument"))?;
                let (_, setter) = property(&interface, &name)?;
                let setter = setter
                    .ok_or_else(|| RemoteError::new(errno::EPERM, format!("property {name} is read-only")))?;
                let value = self.check_property(&iface_name, &name, value)?;

                let ctx = CallContext::new(path, &iface_name, &name, Some(self.clone()));
                let stored = value.clone();
                blocking(move || setter(&ctx, stored)).await?;

                let change = Value::from_entries([
                    ("interface", Value::from(iface_name)),
                    ("name", Value::from(name)),
                    ("value", value),
                ]);
                self.emit(path, OBSERVABLE_INTERFACE, "changed", change);
                Ok(Value::null())
            }
            other => Err(Failure::NotFound(format!("{OBSERVABLE_INTERFACE}.{other}"))),
        }
    }

    /// Validate a property value against the schema, when the interface
    /// is declared in the registry.
    fn check_property(&self, interface: &str, name: &str, value: Value) -> Result<Value, Failure> {
        let Ok(instance) = self.inner.typing.instantiate(interface) else {
            return Ok(value);
        };
        if instance.class() != TypeClass::Interface {
            return Ok(value);
        }
        let Ok(Some((member, owner))) = instance.lookup_member(name) else {
            return Ok(value);
        };
        if !matches!(member.role(), MemberRole::Property { .. }) {
            return Ok(value);
        }

        let invalid = |reason: String| Failure::Remote(RemoteError::new(errno::EINVAL, reason));
        conform_member(&owner, &member, value).map_err(|e| invalid(e.to_string()))
    }

    fn discoverable(&self, method: &str) -> Result<Value, Failure> {
        match method {
            "get_instances" => {
                let instances = self.inner.instances.read();
                Ok(Value::array(instances.values().map(|instance| {
                    Value::from_entries([
                        ("path", Value::from(instance.path())),
                        ("description", Value::from(instance.description())),
                    ])
                })))
            }
            other => Err(Failure::NotFound(format!("{DISCOVERABLE_INTERFACE}.{other}"))),
        }
    }

    fn typing_unit(&self, method: &str) -> Result<Value, Failure> {
        match method {
            "download" => {
                let mut units = Vec::new();
                for unit in self.inner.typing.units() {
                    let source = unit
                        .document
                        .to_yaml_string()
                        .map_err(|e| RemoteError::new(errno::EIO, e.to_string()))?;
                    units.push(Value::from_entries([
                        ("origin", Value::from(unit.origin)),
                        ("source", Value::from(source)),
                    ]));
                }
                Ok(Value::from(units))
            }
            other => Err(Failure::NotFound(format!("{TYPING_INTERFACE}.{other}"))),
        }
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("instances", &self.inner.instances.read().len())
            .field("sessions", &self.inner.sessions.len())
            .field("calls_processed", &self.calls_processed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run host code on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, Failure>
where
    F: FnOnce() -> Result<T, RemoteError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(Failure::Remote),
        Err(e) => {
            log::error!("[rpc] handler task failed: {}", e);
            Err(Failure::Remote(RemoteError::new(errno::EIO, "handler panicked")))
        }
    }
}

/// Feed a stream to the peer, `credit` items per `Continue`.
async fn produce(session: Arc<Session>, id: u64, items: Producer) {
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel();
    match session.calls.get_mut(&id) {
        Some(mut entry) => *entry = Some(ctrl_tx),
        None => {
            log::debug!("[rpc] call {} aborted before its stream started", id);
            return;
        }
    }
    if !session.send(id, Message::StartStream) {
        return;
    }

    let mut items = Some(items);
    let mut seqno = 0u64;
    while let Some(credit) = ctrl_rx.recv().await {
        let Some(producer) = items.take() else {
            break;
        };
        let Ok((producer, batch, finished)) = tokio::task::spawn_blocking(move || pull(producer, credit)).await
        else {
            log::error!("[rpc] stream {}: producer panicked", id);
            session.finish(id, Message::Error(RemoteError::new(errno::EIO, "stream producer panicked")));
            return;
        };

        for item in batch {
            match item {
                Ok(value) => {
                    session.send(id, Message::Fragment { seqno, value });
                    seqno += 1;
                }
                Err(err) => {
                    log::warn!("[rpc] stream {} failed after {} fragments: {}", id, seqno, err);
                    session.finish(id, Message::Error(err));
                    return;
                }
            }
        }
        if finished {
            log::debug!("[rpc] stream {} ended after {} fragments", id, seqno);
            session.finish(id, Message::End);
            return;
        }
        items = Some(producer);
    }

    log::debug!("[rpc] stream {} released after {} fragments", id, seqno);
}

/// Take up to `credit` items. The flag is set when the stream is over.
fn pull(mut producer: Producer, credit: u32) -> (Producer, Vec<Result<Value, RemoteError>>, bool) {
    let mut batch = Vec::new();
    for _ in 0..credit.min(MAX_STREAM_WINDOW) {
        match producer.next() {
            Some(item) => {
                let failed = item.is_err();
                batch.push(item);
                if failed {
                    return (producer, batch, true);
                }
            }
            None => return (producer, batch, true),
        }
    }
    (producer, batch, false)
}

fn builtin_methods(interface: &str) -> Option<&'static [&'static str]> {
    match interface {
        INTROSPECTABLE_INTERFACE => Some(&["get_interfaces", "get_methods", "get_properties", "interface_exists"]),
        OBSERVABLE_INTERFACE => Some(&["get", "get_all", "set"]),
        DISCOVERABLE_INTERFACE => Some(&["get_instances"]),
        TYPING_INTERFACE => Some(&["download"]),
        _ => None,
    }
}

fn string_arg(args: &[Value], index: usize, what: &str) -> Result<String, Failure> {
    args.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Failure::Remote(RemoteError::new(errno::EINVAL, format!("missing {what} argument"))))
}

fn interface_not_found(name: &str) -> Failure {
    Failure::Remote(RemoteError::new(errno::ENOENT, format!("interface {name} not found")))
}

fn property(interface: &Interface, name: &str) -> Result<(PropertyGetter, Option<PropertySetter>), Failure> {
    match interface.member(name) {
        Some(Capability::Property { getter, setter }) => Ok((getter.clone(), setter.clone())),
        _ => Err(Failure::Remote(RemoteError::new(
            errno::ENOENT,
            format!("property {name} not found on {}", interface.name()),
        ))),
    }
}
