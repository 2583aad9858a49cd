// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for RPC operations.

use crate::dynamic::{Value, ValueError};
use crate::typing::TypingError;
use std::fmt;
use thiserror::Error;

/// Result type for RPC operations
pub type RpcResult<T> = Result<T, RpcError>;

/// Error codes commonly carried by [`RemoteError`] (POSIX errno values).
pub mod errno {
    pub const EPERM: i32 = 1;
    pub const ENOENT: i32 = 2;
    pub const EIO: i32 = 5;
    pub const EINVAL: i32 = 22;
    pub const ENOTSUP: i32 = 95;
}

/// Error raised by a handler, sent to the caller verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    pub code: i32,
    pub message: String,
    pub extra: Option<Value>,
}

impl RemoteError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            extra: None,
        }
    }

    /// Attach a structured payload.
    pub fn with_extra(mut self, extra: impl Into<Value>) -> Self {
        self.extra = Some(extra.into());
        self
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for RemoteError {}

/// Errors that can occur during RPC operations
#[derive(Debug, Error)]
pub enum RpcError {
    /// The link to the peer is gone
    #[error("Connection closed")]
    ConnectionClosed,

    /// No reply within the configured call timeout
    #[error("RPC call timed out")]
    Timeout,

    /// The handler failed
    #[error("Remote error {0}")]
    Remote(RemoteError),

    /// No such instance, interface or method on the peer
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Arguments rejected before sending
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The call was cancelled by the peer
    #[error("Call aborted")]
    Aborted,

    /// Unexpected frame sequence
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Typing(#[from] TypingError),
}

impl RpcError {
    /// Remote error code, when the peer reported one.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Remote(err) => Some(err.code),
            _ => None,
        }
    }
}

impl From<RemoteError> for RpcError {
    fn from(err: RemoteError) -> Self {
        Self::Remote(err)
    }
}
