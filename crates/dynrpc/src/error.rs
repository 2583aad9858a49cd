// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate-level error type.

use crate::config::ConfigError;
use crate::dynamic::ValueError;
use crate::rpc::RpcError;
use crate::typing::TypingError;
use thiserror::Error;

/// Result alias used by operations that may fail in more than one layer.
pub type Result<T> = std::result::Result<T, Error>;

/// Any error raised by this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Typing(#[from] TypingError),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
