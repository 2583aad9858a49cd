// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # dynrpc - dynamic types and object proxies for schema-driven RPC
//!
//! Data structures are described by schema documents loaded into a
//! [`Typing`] registry. Values of those types are built and mutated at
//! runtime through [`Value`] and [`ValueFactory`], without compiled accessor
//! code. Host objects are exposed to peers by registering [`rpc::Instance`]s
//! on a [`rpc::Server`], and a peer's object tree is mirrored locally by
//! [`rpc::Connection::introspect`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dynrpc::{Typing, Value};
//!
//! fn main() -> dynrpc::Result<()> {
//!     let typing = Typing::new();
//!     typing.load_str(
//!         "struct Point:\n  members:\n    x: { type: int64 }\n    y: { type: int64 }\n",
//!         "point.yaml",
//!     )?;
//!
//!     let point = typing.build("Point")?.create([("x", 1i64), ("y", 2i64)])?;
//!     point.set("x", 10i64)?;
//!     assert_eq!(point.get("x")?, Value::from(10i64));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |  rpc::proxy   RemoteInstance -> RemoteInterface -> Method/Property  |
//! |  rpc::server  Server -> Instance -> Interface -> handlers           |
//! +---------------------------------------------------------------------+
//! |  rpc::client / rpc::stream   calls, credit-based value streams      |
//! |  rpc::frame                  Frame / Message / Link (mpsc pair)     |
//! +---------------------------------------------------------------------+
//! |  query      dotted paths, rule filters                              |
//! |  dynamic    Value, ValueFactory, validation                         |
//! |  typing     Typing registry, TypeDecl, TypeInstance, schema docs    |
//! +---------------------------------------------------------------------+
//! ```

pub mod config;
pub mod dynamic;
mod error;
pub mod query;
pub mod rpc;
pub mod typing;

pub use config::{ConfigError, RuntimeConfig, MAX_STREAM_WINDOW};
pub use dynamic::{Data, FromValue, Value, ValueError, ValueFactory, ValueKind};
pub use error::{Error, Result};
pub use typing::{TypeClass, TypeDecl, TypeInstance, Typing, TypingError};
