// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pull-based streamed results.
//!
//! ```text
//! Idle --first pull--> Open --End--> Draining --buffer empty--> Closed
//!                       |                                         ^
//!                       +---------------- error / drop -----------+
//! ```
//!
//! The producer is granted `window` fragments at a time, and only once the
//! previous grant has been consumed. Streams returned by typed methods
//! check every item against the declared result type; the first item
//! that fails aborts the producer.

use crate::config::MAX_STREAM_WINDOW;
use crate::dynamic::{conform, Value};
use crate::rpc::client::CallSlot;
use crate::rpc::error::{RpcError, RpcResult};
use crate::rpc::frame::Message;
use crate::typing::TypeInstance;
use std::collections::VecDeque;
use std::fmt;
use tokio::sync::mpsc;

/// Lifecycle of a [`ValueStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Not pulled yet; the producer holds no credit.
    Idle,
    Open,
    /// Producer finished, buffered items remain.
    Draining,
    Closed,
}

/// Values of a streamed call, in producer order.
pub struct ValueStream {
    slot: CallSlot,
    inbox: mpsc::UnboundedReceiver<Message>,
    state: StreamState,
    buffered: VecDeque<Value>,
    /// Error to report once the buffer is drained.
    failure: Option<RpcError>,
    /// Fragments granted and not yet received.
    outstanding: u32,
    window: u32,
    next_seqno: u64,
    item_type: Option<TypeInstance>,
}

impl ValueStream {
    pub(crate) fn new(slot: CallSlot, inbox: mpsc::UnboundedReceiver<Message>, window: u32) -> Self {
        Self {
            slot,
            inbox,
            state: StreamState::Idle,
            buffered: VecDeque::new(),
            failure: None,
            outstanding: 0,
            window: window.clamp(1, MAX_STREAM_WINDOW),
            next_seqno: 0,
            item_type: None,
        }
    }

    /// Check each item against `ty` as it is pulled.
    pub(crate) fn with_item_type(mut self, ty: TypeInstance) -> Self {
        self.item_type = Some(ty);
        self
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Next value. An error is returned once and closes the stream;
    /// `None` after that, or after the producer ended.
    pub async fn next(&mut self) -> Option<RpcResult<Value>> {
        loop {
            if let Some(value) = self.buffered.pop_front() {
                let checked = match &self.item_type {
                    Some(expected) => conform(expected, value),
                    None => Ok(value),
                };
                let value = match checked {
                    Ok(value) => value,
                    Err(err) => {
                        self.reject().await;
                        return Some(Err(err.into()));
                    }
                };
                if self.buffered.is_empty() && self.state == StreamState::Draining && self.failure.is_none() {
                    self.state = StreamState::Closed;
                }
                return Some(Ok(value));
            }
            if let Some(err) = self.failure.take() {
                self.state = StreamState::Closed;
                return Some(Err(err));
            }

            match self.state {
                StreamState::Closed => return None,
                StreamState::Draining => {
                    self.state = StreamState::Closed;
                    return None;
                }
                StreamState::Idle | StreamState::Open => {}
            }

            if self.outstanding == 0 {
                self.state = StreamState::Open;
                if let Err(err) = self.slot.grant(self.window).await {
                    self.fail(err);
                    continue;
                }
                self.outstanding = self.window;
            }

            match self.inbox.recv().await {
                Some(message) => self.accept(message),
                None => self.fail(RpcError::ConnectionClosed),
            }
            while let Ok(message) = self.inbox.try_recv() {
                self.accept(message);
            }
        }
    }

    /// Pull every remaining value.
    pub async fn collect(mut self) -> RpcResult<Vec<Value>> {
        let mut values = Vec::new();
        while let Some(item) = self.next().await {
            values.push(item?);
        }
        Ok(values)
    }

    fn accept(&mut self, message: Message) {
        if matches!(self.state, StreamState::Closed | StreamState::Draining) || self.failure.is_some() {
            return;
        }

        match message {
            Message::Fragment { seqno, value } => {
                if seqno != self.next_seqno {
                    log::warn!(
                        "[rpc] stream {}: fragment {} out of order (expected {})",
                        self.slot.id(),
                        seqno,
                        self.next_seqno
                    );
                }
                self.next_seqno = seqno + 1;
                self.outstanding = self.outstanding.saturating_sub(1);
                self.buffered.push_back(value);
            }
            Message::End => {
                self.slot.finish();
                self.state = if self.buffered.is_empty() {
                    StreamState::Closed
                } else {
                    StreamState::Draining
                };
            }
            Message::Error(err) => self.fail(RpcError::Remote(err)),
            Message::Abort => self.fail(RpcError::Aborted),
            other => self.fail(RpcError::Protocol(format!("unexpected {} frame in stream", other.name()))),
        }
    }

    /// Drop everything after an ill-typed item and stop the producer.
    async fn reject(&mut self) {
        log::debug!("[rpc] stream {}: ill-typed item, aborting", self.slot.id());
        self.buffered.clear();
        self.failure = None;
        self.state = StreamState::Closed;
        self.slot.abort().await;
    }

    /// Record a terminal error; buffered values are still delivered first.
    fn fail(&mut self, err: RpcError) {
        self.slot.finish();
        self.state = StreamState::Draining;
        self.failure = Some(err);
    }
}

impl fmt::Debug for ValueStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueStream")
            .field("id", &self.slot.id())
            .field("state", &self.state)
            .field("buffered", &self.buffered.len())
            .finish()
    }
}
