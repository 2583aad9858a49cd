// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Exposed instances and their capability tables.
//!
//! ```rust
//! use dynrpc::rpc::{errno, Instance, RemoteError, Reply};
//! use dynrpc::Value;
//!
//! let instance = Instance::builder("/example", "Example service")
//!     .interface("com.example.Greeter", |iface| {
//!         iface
//!             .method("hello", |_ctx, args| {
//!                 let name = args.first().and_then(|v| v.as_str()).unwrap_or("world");
//!                 Ok(Reply::from(Value::from(format!("Hello {name}"))))
//!             })
//!             .method("fail", |_ctx, _args| Err(RemoteError::new(errno::EPERM, "Not allowed here")))
//!             .property("version", |_ctx| Ok(Value::from(1i64)))
//!     })
//!     .build();
//!
//! assert_eq!(instance.path(), "/example");
//! assert!(instance.interface("com.example.Greeter").is_some());
//! ```

use crate::dynamic::Value;
use crate::rpc::error::RemoteError;
use crate::rpc::server::Server;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Outcome of a method: one value, or a lazily produced sequence.
pub enum Reply {
    Single(Value),
    Stream(Box<dyn Iterator<Item = Result<Value, RemoteError>> + Send>),
}

impl Reply {
    /// Stream the items of `items`. The iterator is only advanced as the
    /// caller pulls, and dropped when the caller abandons the stream.
    pub fn stream<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: Send + 'static,
    {
        Self::Stream(Box::new(items.into_iter().map(Ok)))
    }

    /// Stream that may fail part-way; the first error ends it.
    pub fn try_stream<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Result<Value, RemoteError>>,
        I::IntoIter: Send + 'static,
    {
        Self::Stream(Box::new(items.into_iter()))
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Self::Single(value)
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(value) => f.debug_tuple("Single").field(value).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Handler trait for exposed methods.
///
/// Handlers run on the blocking pool and may block.
pub trait MethodHandler: Send + Sync + 'static {
    fn call(&self, ctx: &CallContext, args: Vec<Value>) -> Result<Reply, RemoteError>;
}

/// A function-based method handler.
impl<F> MethodHandler for F
where
    F: Fn(&CallContext, Vec<Value>) -> Result<Reply, RemoteError> + Send + Sync + 'static,
{
    fn call(&self, ctx: &CallContext, args: Vec<Value>) -> Result<Reply, RemoteError> {
        self(ctx, args)
    }
}

pub type PropertyGetter = Arc<dyn Fn(&CallContext) -> Result<Value, RemoteError> + Send + Sync>;
pub type PropertySetter = Arc<dyn Fn(&CallContext, Value) -> Result<(), RemoteError> + Send + Sync>;

/// One entry of an interface's capability table.
#[derive(Clone)]
pub enum Capability {
    Method(Arc<dyn MethodHandler>),
    /// Readable property, writable when a setter is present.
    Property {
        getter: PropertyGetter,
        setter: Option<PropertySetter>,
    },
}

impl Capability {
    pub fn is_method(&self) -> bool {
        matches!(self, Self::Method(_))
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Method(_) => f.write_str("Method"),
            Self::Property { setter, .. } => f
                .debug_struct("Property")
                .field("writable", &setter.is_some())
                .finish(),
        }
    }
}

/// Named capability table.
#[derive(Debug, Clone)]
pub struct Interface {
    name: String,
    members: BTreeMap<String, Capability>,
}

impl Interface {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn member(&self, name: &str) -> Option<&Capability> {
        self.members.get(name)
    }

    /// Method names, sorted.
    pub fn methods(&self) -> impl Iterator<Item = &str> + '_ {
        self.members
            .iter()
            .filter(|(_, c)| c.is_method())
            .map(|(name, _)| name.as_str())
    }

    /// Property names with their read-only flag, sorted.
    pub fn properties(&self) -> impl Iterator<Item = (&str, bool)> + '_ {
        self.members.iter().filter_map(|(name, c)| match c {
            Capability::Property { setter, .. } => Some((name.as_str(), setter.is_none())),
            Capability::Method(_) => None,
        })
    }
}

/// Builder for one interface of an [`Instance`].
pub struct InterfaceBuilder {
    interface: Interface,
}

impl InterfaceBuilder {
    fn new(name: &str) -> Self {
        Self {
            interface: Interface {
                name: name.to_string(),
                members: BTreeMap::new(),
            },
        }
    }

    /// Expose a closure as a method.
    pub fn method<F>(self, name: &str, handler: F) -> Self
    where
        F: Fn(&CallContext, Vec<Value>) -> Result<Reply, RemoteError> + Send + Sync + 'static,
    {
        self.handler(name, handler)
    }

    /// Expose any [`MethodHandler`] as a method.
    pub fn handler<H: MethodHandler>(mut self, name: &str, handler: H) -> Self {
        self.interface
            .members
            .insert(name.to_string(), Capability::Method(Arc::new(handler)));
        self
    }

    /// Read-only property.
    pub fn property<G>(mut self, name: &str, getter: G) -> Self
    where
        G: Fn(&CallContext) -> Result<Value, RemoteError> + Send + Sync + 'static,
    {
        self.interface.members.insert(
            name.to_string(),
            Capability::Property {
                getter: Arc::new(getter),
                setter: None,
            },
        );
        self
    }

    pub fn writable_property<G, S>(mut self, name: &str, getter: G, setter: S) -> Self
    where
        G: Fn(&CallContext) -> Result<Value, RemoteError> + Send + Sync + 'static,
        S: Fn(&CallContext, Value) -> Result<(), RemoteError> + Send + Sync + 'static,
    {
        self.interface.members.insert(
            name.to_string(),
            Capability::Property {
                getter: Arc::new(getter),
                setter: Some(Arc::new(setter)),
            },
        );
        self
    }
}

/// A host object exposed at a path.
#[derive(Debug, Clone)]
pub struct Instance {
    path: String,
    description: String,
    interfaces: BTreeMap<String, Interface>,
}

impl Instance {
    pub fn builder(path: &str, description: &str) -> InstanceBuilder {
        InstanceBuilder {
            instance: Instance {
                path: path.to_string(),
                description: description.to_string(),
                interfaces: BTreeMap::new(),
            },
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.get(name)
    }

    /// Interface names, sorted.
    pub fn interfaces(&self) -> impl Iterator<Item = &str> + '_ {
        self.interfaces.keys().map(String::as_str)
    }
}

pub struct InstanceBuilder {
    instance: Instance,
}

impl InstanceBuilder {
    /// Add (or replace) an interface.
    pub fn interface<F>(mut self, name: &str, build: F) -> Self
    where
        F: FnOnce(InterfaceBuilder) -> InterfaceBuilder,
    {
        let interface = build(InterfaceBuilder::new(name)).interface;
        self.instance.interfaces.insert(name.to_string(), interface);
        self
    }

    pub fn build(self) -> Instance {
        self.instance
    }
}

/// What a handler knows about the call it serves.
#[derive(Clone)]
pub struct CallContext {
    path: String,
    interface: String,
    member: String,
    server: Option<Server>,
}

impl CallContext {
    pub(crate) fn new(path: &str, interface: &str, member: &str, server: Option<Server>) -> Self {
        Self {
            path: path.to_string(),
            interface: interface.to_string(),
            member: member.to_string(),
            server,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Method or property being served.
    pub fn member(&self) -> &str {
        &self.member
    }

    /// Raise an event on this instance and interface. Returns the number
    /// of connections it was delivered to.
    pub fn emit(&self, name: &str, args: impl Into<Value>) -> usize {
        match &self.server {
            Some(server) => server.emit(&self.path, &self.interface, name, args),
            None => 0,
        }
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("path", &self.path)
            .field("interface", &self.interface)
            .field("member", &self.member)
            .finish()
    }
}
