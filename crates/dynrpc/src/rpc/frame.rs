// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection boundary: frames exchanged over a pair of channels.
//!
//! Calls are correlated by the frame `id` chosen by the caller. A call is
//! answered either by one terminal frame (`Response`, `Error`, `NotFound`)
//! or by `StartStream`, after which the caller pulls with `Continue` and
//! the producer answers with at most that many `Fragment`s, then `End` or
//! `Error`. `Abort` cancels a call. Events travel with id 0.

use crate::dynamic::Value;
use crate::rpc::error::RemoteError;
use tokio::sync::mpsc;

/// One unit on the wire.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: u64,
    pub message: Message,
}

impl Frame {
    pub fn new(id: u64, message: Message) -> Self {
        Self { id, message }
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    Call {
        path: String,
        interface: String,
        method: String,
        args: Vec<Value>,
    },
    Response(Value),
    StartStream,
    Fragment {
        seqno: u64,
        value: Value,
    },
    /// Credit granted to a stream producer.
    Continue {
        credit: u32,
    },
    End,
    Abort,
    Error(RemoteError),
    /// Dispatch miss (unknown instance, interface or method).
    NotFound(String),
    Subscribe(EventKey),
    Unsubscribe(EventKey),
    Event(Event),
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Call { .. } => "call",
            Self::Response(_) => "response",
            Self::StartStream => "start_stream",
            Self::Fragment { .. } => "fragment",
            Self::Continue { .. } => "continue",
            Self::End => "end",
            Self::Abort => "abort",
            Self::Error(_) => "error",
            Self::NotFound(_) => "not_found",
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
            Self::Event(_) => "event",
        }
    }

    /// True for frames that end a call.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Response(_) | Self::End | Self::Error(_) | Self::NotFound(_) | Self::Abort
        )
    }
}

/// Event address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub path: String,
    pub interface: String,
    pub name: String,
}

impl EventKey {
    pub fn new(path: &str, interface: &str, name: &str) -> Self {
        Self {
            path: path.to_string(),
            interface: interface.to_string(),
            name: name.to_string(),
        }
    }
}

/// Event raised by an instance.
#[derive(Debug, Clone)]
pub struct Event {
    pub path: String,
    pub interface: String,
    pub name: String,
    pub args: Value,
}

impl Event {
    pub fn key(&self) -> EventKey {
        EventKey::new(&self.path, &self.interface, &self.name)
    }
}

/// One endpoint of a bidirectional frame channel.
///
/// Transports adapt their medium to a `Link`; dropping the sender side
/// is how an endpoint hangs up.
#[derive(Debug)]
pub struct Link {
    pub tx: mpsc::Sender<Frame>,
    pub rx: mpsc::Receiver<Frame>,
}

impl Link {
    pub fn new(tx: mpsc::Sender<Frame>, rx: mpsc::Receiver<Frame>) -> Self {
        Self { tx, rx }
    }

    pub fn split(self) -> (mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
        (self.tx, self.rx)
    }
}

/// In-process transport.
pub mod loopback {
    use super::Link;
    use crate::config::RuntimeConfig;
    use tokio::sync::mpsc;

    /// Two connected links. Capacity is clamped to at least 1.
    pub fn pair(capacity: usize) -> (Link, Link) {
        let (a_tx, a_rx) = mpsc::channel(capacity.max(1));
        let (b_tx, b_rx) = mpsc::channel(capacity.max(1));
        (Link::new(a_tx, b_rx), Link::new(b_tx, a_rx))
    }

    /// Two connected links sized by `config.channel_capacity`.
    pub fn configured(config: &RuntimeConfig) -> (Link, Link) {
        pair(config.channel_capacity)
    }
}
