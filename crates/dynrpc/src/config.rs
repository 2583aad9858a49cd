// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime configuration.
//!
//! Supports both programmatic and file-based configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings shared by [`Server`](crate::rpc::Server) and
/// [`Connection`](crate::rpc::Connection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Time to wait for the first reply of a call (milliseconds, 0 = forever).
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Fragments granted to a stream producer per pull.
    #[serde(default = "default_stream_window")]
    pub stream_window: u32,

    /// Capacity of the frame channels created for in-process links.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Calls dispatched concurrently per server.
    #[serde(default = "default_max_inflight_calls")]
    pub max_inflight_calls: usize,
}

/// Largest credit a stream consumer may grant in one pull. Servers clamp
/// peer grants to this value.
pub const MAX_STREAM_WINDOW: u32 = 4096;

fn default_call_timeout_ms() -> u64 {
    10_000
}

fn default_stream_window() -> u32 {
    1
}

fn default_channel_capacity() -> usize {
    256
}

fn default_max_inflight_calls() -> usize {
    1024
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            stream_window: default_stream_window(),
            channel_capacity: default_channel_capacity(),
            max_inflight_calls: default_max_inflight_calls(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream_window == 0 {
            return Err(ConfigError::Invalid(
                "stream_window must be at least 1".into(),
            ));
        }
        if self.stream_window > MAX_STREAM_WINDOW {
            return Err(ConfigError::Invalid(format!(
                "stream_window must be at most {MAX_STREAM_WINDOW}"
            )));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "channel_capacity must be at least 1".into(),
            ));
        }
        if self.max_inflight_calls == 0 {
            return Err(ConfigError::Invalid(
                "max_inflight_calls must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Set the call timeout.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the stream credit window.
    pub fn stream_window(mut self, window: u32) -> Self {
        self.stream_window = window;
        self
    }

    /// Call timeout as a duration, `None` when calls wait forever.
    pub fn timeout(&self) -> Option<Duration> {
        match self.call_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}
