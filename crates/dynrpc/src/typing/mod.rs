// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema registry.
//!
//! A [`Typing`] registry holds every type and interface declaration loaded
//! from schema documents, plus the builtin types. Declarations reference
//! each other by name; references are resolved lazily when a
//! [`TypeInstance`] is dereferenced, so forward and mutually recursive
//! references load in any order.
//!
//! # Example
//!
//! ```rust
//! use dynrpc::typing::{TypeClass, Typing};
//!
//! let typing = Typing::new();
//! typing
//!     .load_str(
//!         "meta:\n  namespace: com.example\n\
//!          struct Pair<K, V>:\n  members:\n    key: { type: K }\n    value: { type: V }\n",
//!         "pair.yaml",
//!     )
//!     .expect("load");
//!
//! let decl = typing.resolve("com.example.Pair").expect("declared");
//! assert_eq!(decl.class(), TypeClass::Struct);
//!
//! let inst = typing.instantiate("com.example.Pair<string, int64>").expect("instantiate");
//! assert_eq!(inst.canonical(), "com.example.Pair<string,int64>");
//! ```

mod decl;
mod document;
mod error;
mod expr;
mod instance;
mod registry;

pub use decl::{Argument, Constraint, Member, MemberRole, MethodSignature, TypeClass, TypeDecl};
pub use document::{ArgumentBody, DeclarationBody, MemberBody, ReturnBody, SchemaDocument, SchemaMeta};
pub use error::TypingError;
pub use expr::TypeExpr;
pub use instance::TypeInstance;
pub use registry::{BatchReport, Declarations, SchemaUnit, Typing, BUILTIN_TYPES};

pub(crate) use document::value_from_yaml;
pub(crate) use registry::Shared;

#[cfg(test)]
mod tests;
