// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dynamic values.
//!
//! Runtime construction and mutation of schema-typed data without compiled
//! accessor code.
//!
//! # Features
//!
//! - **Value**: tagged variant over scalars, arrays, dictionaries, structs and unions
//! - **ValueFactory**: validated constructor bound to one declaration
//! - **Sharing**: a struct or union assigned into another is shared, not copied
//!
//! # Example
//!
//! ```rust
//! use dynrpc::{Typing, Value};
//!
//! let typing = Typing::new();
//! typing
//!     .load_str(
//!         "struct Reading:\n  members:\n    sensor: { type: string }\n    celsius: { type: double }\n",
//!         "reading.yaml",
//!     )
//!     .unwrap();
//!
//! let reading = typing
//!     .build("Reading")
//!     .unwrap()
//!     .create([("sensor", Value::from("t1")), ("celsius", Value::from(21))])
//!     .unwrap();
//!
//! // integers are widened for double members
//! let celsius: f64 = reading.get_as("celsius").unwrap();
//! assert_eq!(celsius, 21.0);
//! ```

mod convert;
mod error;
mod factory;
mod validate;
mod value;

pub use convert::FromValue;
pub use error::ValueError;
pub use factory::ValueFactory;
pub use value::{Compound, Data, Value, ValueKind};

pub(crate) use validate::{conform, conform_member};
