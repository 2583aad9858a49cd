// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema registry errors.

use crate::typing::TypeClass;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or resolving schema declarations.
#[derive(Debug, Error)]
pub enum TypingError {
    #[error("Type not found: {0}")]
    NotFound(String),

    #[error("Conflicting definition of {name}: declared as {existing}, redeclared as {new}")]
    Conflict {
        name: String,
        existing: TypeClass,
        new: TypeClass,
    },

    #[error("Unresolved type {reference} referenced from {declaration}")]
    Unresolved {
        declaration: String,
        reference: String,
    },

    #[error("Malformed declaration '{declaration}': {reason}")]
    Malformed { declaration: String, reason: String },

    #[error("Schema parse error in {origin}: {reason}")]
    Parse { origin: String, reason: String },

    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TypingError {
    pub(crate) fn malformed(declaration: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            declaration: declaration.into(),
            reason: reason.into(),
        }
    }
}
