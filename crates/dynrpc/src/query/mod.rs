// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Path navigation and rule filters over values.
//!
//! A path is a dot-separated list of segments: struct/union member names,
//! dictionary keys and array indices, e.g. `"devices.0.name"`. The empty
//! path addresses the value itself.
//!
//! Rules filter arrays of values:
//!
//! ```rust
//! use dynrpc::query::{self, QueryParams, Rule};
//! use dynrpc::Value;
//!
//! let people = Value::array([
//!     Value::from_entries([("name", Value::from("ann")), ("age", Value::from(31i64))]),
//!     Value::from_entries([("name", Value::from("bob")), ("age", Value::from(17i64))]),
//! ]);
//!
//! let adults: Vec<Value> = query::query(
//!     &people,
//!     vec![Rule::compare("age", ">=", 18i64).unwrap()],
//!     QueryParams::default(),
//! )
//! .unwrap()
//! .collect();
//! assert_eq!(adults.len(), 1);
//! assert_eq!(query::get(&adults[0], "name").unwrap(), Value::from("ann"));
//! ```

mod iter;
mod path;
mod rules;

pub use iter::{query, QueryIter, QueryParams, SortFn};
pub use path::{contains, delete, get, set};
pub use rules::{apply, Comparison, Operator, Rule};
