// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Errors for value construction, member access and path navigation.

use crate::dynamic::ValueKind;
use crate::typing::TypingError;
use thiserror::Error;

/// Errors raised by [`Value`](crate::Value) operations.
#[derive(Debug, Error)]
pub enum ValueError {
    #[error("{type_name} has no member '{member}'")]
    UnknownMember { type_name: String, member: String },

    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Cannot descend into {kind} at '{path}'")]
    NotIndexable { path: String, kind: ValueKind },

    #[error("Index {index} out of range (length {length}) at '{path}'")]
    IndexOutOfRange {
        path: String,
        index: usize,
        length: usize,
    },

    #[error("Constraint {constraint} on '{member}' violated: {reason}")]
    ConstraintViolation {
        member: String,
        constraint: String,
        reason: String,
    },

    #[error("Union {type_name} takes at most one branch, got {count}")]
    UnionArity { type_name: String, count: usize },

    #[error("Values of {0} cannot be constructed")]
    NotConstructible(String),

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error(transparent)]
    Typing(#[from] TypingError),
}

impl ValueError {
    pub(crate) fn mismatch(expected: impl Into<String>, got: impl ToString) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            got: got.to_string(),
        }
    }
}
