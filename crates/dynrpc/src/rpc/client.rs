// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPC client: one connection to a peer.
//!
//! Calls are correlated by id. A reader task routes every inbound frame to
//! the call that owns its id, so replies may arrive in any order.

use crate::config::RuntimeConfig;
use crate::dynamic::Value;
use crate::rpc::error::{RpcError, RpcResult};
use crate::rpc::frame::{Event, EventKey, Frame, Link, Message};
use crate::rpc::proxy::{RemoteInstance, RemoteInterface};
use crate::rpc::stream::ValueStream;
use crate::rpc::{DISCOVERABLE_INTERFACE, INTROSPECTABLE_INTERFACE, ROOT_PATH};
use crate::typing::{BatchReport, Typing};
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type Pending = Arc<DashMap<u64, mpsc::UnboundedSender<Message>>>;
type Subscribers = Arc<DashMap<EventKey, Vec<mpsc::UnboundedSender<Event>>>>;

/// Reply to a call.
pub enum CallResult {
    Single(Value),
    Stream(ValueStream),
}

impl CallResult {
    /// The single value, or a protocol error for a stream.
    pub fn single(self) -> RpcResult<Value> {
        match self {
            Self::Single(value) => Ok(value),
            Self::Stream(_) => Err(RpcError::Protocol("expected a single value, got a stream".into())),
        }
    }

    /// The stream, or a protocol error for a single value.
    pub fn stream(self) -> RpcResult<ValueStream> {
        match self {
            Self::Stream(stream) => Ok(stream),
            Self::Single(_) => Err(RpcError::Protocol("expected a stream, got a single value".into())),
        }
    }
}

impl fmt::Debug for CallResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(value) => f.debug_tuple("Single").field(value).finish(),
            Self::Stream(stream) => f.debug_tuple("Stream").field(stream).finish(),
        }
    }
}

pub(crate) struct ConnInner {
    tx: mpsc::Sender<Frame>,
    /// Call id counter (0 is reserved for events)
    next_id: AtomicU64,
    pending: Pending,
    subscribers: Subscribers,
    closed: Arc<AtomicBool>,
    config: RuntimeConfig,
    typing: Typing,
    reader: JoinHandle<()>,
}

impl ConnInner {
    async fn send(&self, frame: Frame) -> RpcResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RpcError::ConnectionClosed);
        }
        self.tx.send(frame).await.map_err(|_| RpcError::ConnectionClosed)
    }

    /// Send from a synchronous context such as `Drop`.
    fn send_detached(&self, frame: Frame) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Err(mpsc::error::TrySendError::Full(frame)) = self.tx.try_send(frame) {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let tx = self.tx.clone();
                handle.spawn(async move {
                    // Ignore send error - peer may be gone
                    drop(tx.send(frame).await);
                });
            }
        }
    }
}

impl Drop for ConnInner {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Pending-call registration. Dropping it before the call finished
/// removes the entry and tells the peer to abort.
pub(crate) struct CallSlot {
    id: u64,
    inner: Arc<ConnInner>,
    done: bool,
}

impl CallSlot {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Mark the call as completed by the peer.
    pub(crate) fn finish(&mut self) {
        self.done = true;
    }

    /// Stop a call the peer has not finished. No-op once finished.
    pub(crate) async fn abort(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.inner.pending.remove(&self.id);
        // Ignore send error - peer may be gone
        drop(self.inner.send(Frame::new(self.id, Message::Abort)).await);
    }

    /// Allow the producer to send `credit` more fragments.
    pub(crate) async fn grant(&self, credit: u32) -> RpcResult<()> {
        self.inner.send(Frame::new(self.id, Message::Continue { credit })).await
    }
}

impl Drop for CallSlot {
    fn drop(&mut self) {
        self.inner.pending.remove(&self.id);
        if !self.done {
            self.inner.send_detached(Frame::new(self.id, Message::Abort));
        }
    }
}

/// Client side of a link.
///
/// Cloning gives another handle to the same connection.
///
/// # Example
///
/// ```rust,no_run
/// use dynrpc::rpc::{loopback, CallResult, Connection};
/// use dynrpc::{RuntimeConfig, Value};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let (link, _peer) = loopback::pair(64);
/// let connection = Connection::connect(link, RuntimeConfig::default());
///
/// match connection.call("/example", "com.example.Stream", "numbers", Vec::new()).await? {
///     CallResult::Single(value) => println!("{value}"),
///     CallResult::Stream(mut stream) => {
///         while let Some(item) = stream.next().await {
///             println!("{}", item?);
///         }
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnInner>,
}

impl Connection {
    /// Start a connection over `link` with an empty type registry.
    /// Must be called from within a tokio runtime.
    pub fn connect(link: Link, config: RuntimeConfig) -> Self {
        Self::with_typing(link, Typing::new(), config)
    }

    /// Start a connection whose proxies validate against `typing`.
    pub fn with_typing(link: Link, typing: Typing, config: RuntimeConfig) -> Self {
        let (tx, rx) = link.split();
        let pending: Pending = Arc::new(DashMap::new());
        let subscribers: Subscribers = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(read_frames(rx, pending.clone(), subscribers.clone(), closed.clone()));

        Self {
            inner: Arc::new(ConnInner {
                tx,
                next_id: AtomicU64::new(1),
                pending,
                subscribers,
                closed,
                config,
                typing,
                reader,
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Registry used to type remote methods and properties.
    pub fn typing(&self) -> &Typing {
        &self.inner.typing
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of calls awaiting a reply or streaming.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Call `interface.method` on the instance at `path`.
    ///
    /// The configured timeout covers the wait for the first reply frame;
    /// a stream, once started, is pulled at the caller's pace.
    pub async fn call(&self, path: &str, interface: &str, method: &str, args: Vec<Value>) -> RpcResult<CallResult> {
        if self.is_closed() {
            return Err(RpcError::ConnectionClosed);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (inbox_tx, mut inbox) = mpsc::unbounded_channel();
        self.inner.pending.insert(id, inbox_tx);
        let mut slot = CallSlot {
            id,
            inner: self.inner.clone(),
            done: false,
        };

        log::debug!("[rpc] call {}: {} {}.{}", id, path, interface, method);
        let call = Message::Call {
            path: path.to_string(),
            interface: interface.to_string(),
            method: method.to_string(),
            args,
        };
        self.inner.send(Frame::new(id, call)).await?;

        let first = match self.inner.config.timeout() {
            Some(limit) => tokio::time::timeout(limit, inbox.recv())
                .await
                .map_err(|_| RpcError::Timeout)?,
            None => inbox.recv().await,
        };

        match first {
            None => Err(RpcError::ConnectionClosed),
            Some(Message::StartStream) => Ok(CallResult::Stream(ValueStream::new(
                slot,
                inbox,
                self.inner.config.stream_window,
            ))),
            Some(message) => {
                slot.finish();
                match message {
                    Message::Response(value) => Ok(CallResult::Single(value)),
                    Message::Error(err) => Err(RpcError::Remote(err)),
                    Message::NotFound(what) => Err(RpcError::MethodNotFound(what)),
                    Message::Abort => Err(RpcError::Aborted),
                    other => Err(RpcError::Protocol(format!("unexpected {} reply", other.name()))),
                }
            }
        }
    }

    /// Receive events raised as `(path, interface, name)`.
    pub async fn subscribe(&self, path: &str, interface: &str, name: &str) -> RpcResult<EventStream> {
        if self.is_closed() {
            return Err(RpcError::ConnectionClosed);
        }

        let key = EventKey::new(path, interface, name);
        let (tx, rx) = mpsc::unbounded_channel();
        let first = {
            let mut subscribers = self.inner.subscribers.entry(key.clone()).or_default();
            subscribers.push(tx);
            subscribers.len() == 1
        };
        if first {
            self.inner.send(Frame::new(0, Message::Subscribe(key.clone()))).await?;
        }
        Ok(EventStream {
            key,
            rx,
            inner: Arc::downgrade(&self.inner),
        })
    }

    /// Drop every local subscriber of `(path, interface, name)`.
    pub async fn unsubscribe(&self, path: &str, interface: &str, name: &str) -> RpcResult<()> {
        let key = EventKey::new(path, interface, name);
        if self.inner.subscribers.remove(&key).is_some() {
            self.inner.send(Frame::new(0, Message::Unsubscribe(key))).await?;
        }
        Ok(())
    }

    /// Stop routing replies. Pending calls and open streams fail with
    /// `ConnectionClosed`; the link itself is released with the last
    /// handle.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.reader.abort();
        self.inner.pending.clear();
        self.inner.subscribers.clear();
        log::info!("[rpc] connection closed");
    }

    /// Fetch the peer's schema units into this connection's registry.
    pub async fn download_types(&self) -> RpcResult<BatchReport> {
        self.inner.typing.download(self).await
    }

    /// Mirror the peer's object tree, rooted at `/`.
    pub async fn introspect(&self) -> RpcResult<RemoteInstance> {
        let listing = self
            .call(ROOT_PATH, DISCOVERABLE_INTERFACE, "get_instances", Vec::new())
            .await?
            .single()?;
        let entries = listing
            .as_array()
            .ok_or_else(|| RpcError::Protocol("get_instances must return an array".into()))?;

        let mut root = RemoteInstance::new(ROOT_PATH, "");
        self.populate(&mut root).await?;

        for entry in entries {
            let path = entry
                .get_key("path")
                .and_then(Value::as_str)
                .ok_or_else(|| RpcError::Protocol("instance entry without a path".into()))?;
            let description = entry.get_key("description").and_then(Value::as_str).unwrap_or_default();

            if path == ROOT_PATH {
                root.set_description(description);
                continue;
            }
            let mut instance = RemoteInstance::new(path, description);
            match self.populate(&mut instance).await {
                Ok(()) => root.insert(instance),
                // Unregistered while we were looking.
                Err(RpcError::MethodNotFound(_)) => log::debug!("[rpc] instance {} vanished", path),
                Err(err) => return Err(err),
            }
        }
        Ok(root)
    }

    async fn populate(&self, instance: &mut RemoteInstance) -> RpcResult<()> {
        let path = instance.path().to_string();
        let names = self.strings(&path, "get_interfaces", Vec::new()).await?;

        for name in names {
            let arg = vec![Value::from(name.as_str())];
            let methods = self.strings(&path, "get_methods", arg.clone()).await?;
            let listing = self
                .call(&path, INTROSPECTABLE_INTERFACE, "get_properties", arg)
                .await?
                .single()?;
            let properties: Vec<(String, bool)> = listing
                .as_array()
                .unwrap_or_default()
                .iter()
                .filter_map(|entry| {
                    let name = entry.get_key("name")?.as_str()?.to_string();
                    let read_only = entry.get_key("read_only").and_then(Value::as_bool).unwrap_or(false);
                    Some((name, read_only))
                })
                .collect();

            let interface = RemoteInterface::build(self, &path, &name, methods, properties);
            instance.add_interface(interface);
        }
        Ok(())
    }

    async fn strings(&self, path: &str, method: &str, args: Vec<Value>) -> RpcResult<Vec<String>> {
        let value = self
            .call(path, INTROSPECTABLE_INTERFACE, method, args)
            .await?
            .single()?;
        let items = value
            .as_array()
            .ok_or_else(|| RpcError::Protocol(format!("{method} must return an array")))?;
        Ok(items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .field("pending", &self.pending_calls())
            .finish()
    }
}

/// Events delivered to one subscriber.
///
/// Dropping the last stream of a key unsubscribes from the peer.
#[derive(Debug)]
pub struct EventStream {
    key: EventKey,
    rx: mpsc::UnboundedReceiver<Event>,
    inner: Weak<ConnInner>,
}

impl EventStream {
    pub fn key(&self) -> &EventKey {
        &self.key
    }

    /// Next event, `None` once unsubscribed or disconnected.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.rx.close();
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let emptied = inner.subscribers.remove_if_mut(&self.key, |_, listeners| {
            listeners.retain(|listener| !listener.is_closed());
            listeners.is_empty()
        });
        if emptied.is_some() {
            log::debug!(
                "[rpc] last subscriber of {}.{} at {} dropped",
                self.key.interface,
                self.key.name,
                self.key.path
            );
            inner.send_detached(Frame::new(0, Message::Unsubscribe(self.key.clone())));
        }
    }
}

/// Route inbound frames until the link closes.
async fn read_frames(
    mut rx: mpsc::Receiver<Frame>,
    pending: Pending,
    subscribers: Subscribers,
    closed: Arc<AtomicBool>,
) {
    while let Some(frame) = rx.recv().await {
        let Frame { id, message } = frame;

        if let Message::Event(event) = message {
            if let Some(mut listeners) = subscribers.get_mut(&event.key()) {
                listeners.retain(|listener| listener.send(event.clone()).is_ok());
            }
            continue;
        }

        let kind = message.name();
        let terminal = message.is_terminal();
        let delivered = match pending.get(&id) {
            Some(inbox) => inbox.send(message).is_ok(),
            None => false,
        };
        if !delivered {
            log::debug!("[rpc] dropping {} frame for call {}", kind, id);
        }
        if terminal {
            pending.remove(&id);
        }
    }

    closed.store(true, Ordering::Release);
    pending.clear();
    subscribers.clear();
    log::info!("[rpc] connection closed by peer");
}
