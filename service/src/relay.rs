//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! Relay queue
//!
//! The relay queue carries [`RelayMessage`]s from every connection worker to
//! the single relay consumer. It is a bounded multi-producer, single-consumer
//! FIFO built on a tokio channel:
//!
//! - insertion order is consumption order, nothing is reordered or dropped
//! - a full queue suspends producers until the consumer catches up
//! - an empty queue suspends the consumer until a producer enqueues
//!
//! The backlog (messages queued plus producers waiting to queue) is tracked
//! in [`RelayMetrics`] and a warning is logged each time it crosses the
//! configured threshold.

use crate::{ConnectionId, RelayError, RelayMetrics, Result};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One chunk of data read from a connection
///
/// Messages are immutable once built; the producer hands ownership to the
/// queue and the consumer receives it exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    connection: ConnectionId,
    payload: Bytes,
}

impl RelayMessage {
    /// Create a message for `connection`
    pub fn new(connection: ConnectionId, payload: impl Into<Bytes>) -> Self {
        Self {
            connection,
            payload: payload.into(),
        }
    }

    /// Connection the payload was read from
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Raw payload bytes
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload decoded as UTF-8, with invalid sequences replaced
    pub fn payload_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Split into connection and payload
    pub fn into_parts(self) -> (ConnectionId, Bytes) {
        (self.connection, self.payload)
    }
}

impl fmt::Display for RelayMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message from Client {} : {}",
            self.connection,
            self.payload_text()
        )
    }
}

/// Builder for a relay queue
///
/// # Example
///
/// ```
/// use linerelay_service::{ConnectionId, RelayMessage, RelayQueue};
///
/// # #[tokio::main]
/// # async fn main() -> linerelay_service::Result<()> {
/// let (sender, mut receiver) = RelayQueue::bounded(16).split();
///
/// sender.enqueue(RelayMessage::new(ConnectionId::new(1), "hello")).await?;
/// drop(sender);
///
/// let message = receiver.dequeue().await.unwrap();
/// assert_eq!(message.payload_text(), "hello");
/// assert!(receiver.dequeue().await.is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RelayQueue {
    capacity: usize,
    warn_threshold: usize,
    metrics: Arc<RelayMetrics>,
}

impl RelayQueue {
    /// A queue holding at most `capacity` messages (at least one)
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            warn_threshold: capacity / 4 * 3,
            metrics: Arc::new(RelayMetrics::new()),
        }
    }

    /// Record backlog into `metrics`
    pub fn with_metrics(mut self, metrics: Arc<RelayMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Warn when the backlog reaches `threshold` (0 disables the warning)
    pub fn with_warn_threshold(mut self, threshold: usize) -> Self {
        self.warn_threshold = threshold;
        self
    }

    /// Queue capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Create the producer and consumer ends
    pub fn split(self) -> (RelaySender, RelayReceiver) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let shared = Arc::new(QueueShared {
            metrics: self.metrics,
            warn_threshold: self.warn_threshold as u64,
        });

        (
            RelaySender {
                tx,
                shared: shared.clone(),
            },
            RelayReceiver { rx, shared },
        )
    }
}

struct QueueShared {
    metrics: Arc<RelayMetrics>,
    warn_threshold: u64,
}

impl QueueShared {
    // Each step of the backlog counter is observed by exactly one caller, so
    // a crossing is detected from the returned depth alone.
    fn entered(&self, depth: u64) {
        if self.warn_threshold != 0 && depth == self.warn_threshold {
            warn!(
                backlog = depth,
                threshold = self.warn_threshold,
                "Relay backlog above threshold, producers may be suspended"
            );
        }
    }

    fn left(&self, depth: u64) {
        if self.warn_threshold != 0 && depth + 1 == self.warn_threshold {
            info!(backlog = depth, "Relay backlog back below threshold");
        }
    }
}

/// Producer end of the relay queue
///
/// Cloned once per connection worker. The queue closes for good when the
/// last sender is dropped.
#[derive(Clone)]
pub struct RelaySender {
    tx: mpsc::Sender<RelayMessage>,
    shared: Arc<QueueShared>,
}

impl RelaySender {
    /// Append `message` at the tail of the queue
    ///
    /// Waits while the queue is full. Fails with [`RelayError::QueueClosed`]
    /// only when the consumer is gone.
    pub async fn enqueue(&self, message: RelayMessage) -> Result<()> {
        let depth = self.shared.metrics.backlog_increment();
        self.shared.entered(depth);

        if self.tx.send(message).await.is_err() {
            let depth = self.shared.metrics.backlog_decrement();
            self.shared.left(depth);
            return Err(RelayError::QueueClosed);
        }
        Ok(())
    }

    /// Blocking variant of [`RelaySender::enqueue`] for non-async producers
    ///
    /// Must not be called from within an async execution context.
    pub fn blocking_enqueue(&self, message: RelayMessage) -> Result<()> {
        let depth = self.shared.metrics.backlog_increment();
        self.shared.entered(depth);

        if self.tx.blocking_send(message).is_err() {
            let depth = self.shared.metrics.backlog_decrement();
            self.shared.left(depth);
            return Err(RelayError::QueueClosed);
        }
        Ok(())
    }

    /// Check whether the consumer end has been dropped or closed
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Wait until the consumer end has been dropped or closed
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

impl fmt::Debug for RelaySender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelaySender")
            .field("closed", &self.is_closed())
            .field("backlog", &self.shared.metrics.backlog())
            .finish()
    }
}

/// Consumer end of the relay queue
///
/// There is exactly one receiver per queue; it is not `Clone`.
pub struct RelayReceiver {
    rx: mpsc::Receiver<RelayMessage>,
    shared: Arc<QueueShared>,
}

impl RelayReceiver {
    /// Remove the message at the head of the queue
    ///
    /// Waits until a message is available. Returns `None` once every sender
    /// has been dropped and the queue is drained.
    pub async fn dequeue(&mut self) -> Option<RelayMessage> {
        let message = self.rx.recv().await?;
        self.dequeued();
        Some(message)
    }

    /// Blocking variant of [`RelayReceiver::dequeue`]
    ///
    /// Must not be called from within an async execution context.
    pub fn blocking_dequeue(&mut self) -> Option<RelayMessage> {
        let message = self.rx.blocking_recv()?;
        self.dequeued();
        Some(message)
    }

    /// Stop accepting new messages while keeping queued ones available
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Number of messages currently queued
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    fn dequeued(&self) {
        let depth = self.shared.metrics.backlog_decrement();
        self.shared.left(depth);
    }
}

impl fmt::Debug for RelayReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayReceiver")
            .field("queued", &self.len())
            .finish()
    }
}
