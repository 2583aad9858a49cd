// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service exposition and remote proxies over a frame link.
//!
//! # Overview
//!
//! - A [`Server`] owns a table of [`Instance`]s keyed by path. Each instance
//!   exposes named interfaces made of methods and properties backed by
//!   host closures.
//! - A [`Connection`] calls methods on a peer and mirrors its object tree as
//!   [`RemoteInstance`]s.
//! - Both ends exchange [`Frame`]s over a [`Link`]; [`loopback::pair`]
//!   connects them in-process.
//!
//! # Builtin interfaces
//!
//! Every instance also serves [`INTROSPECTABLE_INTERFACE`] and
//! [`OBSERVABLE_INTERFACE`]. The root path additionally serves
//! [`DISCOVERABLE_INTERFACE`] (instance listing) and [`TYPING_INTERFACE`]
//! (schema download).
//!
//! # Correlation
//!
//! Each call carries a caller-chosen `u64` id and every reply frame echoes
//! it, so replies may arrive in any order.

mod client;
mod error;
mod frame;
mod proxy;
mod server;
mod service;
mod stream;

pub use client::{CallResult, Connection, EventStream};
pub use error::{errno, RemoteError, RpcError, RpcResult};
pub use frame::{loopback, Event, EventKey, Frame, Link, Message};
pub use proxy::{RemoteInstance, RemoteInterface, RemoteMethod, RemoteProperty};
pub use server::Server;
pub use service::{
    CallContext, Capability, Instance, InstanceBuilder, Interface, InterfaceBuilder, MethodHandler, PropertyGetter,
    PropertySetter, Reply,
};
pub use stream::{StreamState, ValueStream};

/// Path of the root instance.
pub const ROOT_PATH: &str = "/";

/// Interface listing, method and property discovery.
pub const INTROSPECTABLE_INTERFACE: &str = "com.twoporeguys.librpc.Introspectable";

/// Generic property access and change events.
pub const OBSERVABLE_INTERFACE: &str = "com.twoporeguys.librpc.Observable";

/// Instance listing, served at the root.
pub const DISCOVERABLE_INTERFACE: &str = "com.twoporeguys.librpc.Discoverable";

/// Schema unit download, served at the root.
pub const TYPING_INTERFACE: &str = "com.twoporeguys.librpc.Typing";
