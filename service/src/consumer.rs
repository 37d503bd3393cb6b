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


//! Relay consumer
//!
//! A single long-lived task drains the relay queue and hands each message to
//! the [`MessageHandler`]. It waits on the queue without polling and stops
//! only once every producer is gone and the queue is empty, so no message
//! accepted by the queue is skipped.

use crate::{MessageHandler, RelayError, RelayMetrics, RelayReceiver, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

/// Drains the relay queue in FIFO order
pub struct RelayConsumer {
    receiver: RelayReceiver,
    handler: Arc<dyn MessageHandler>,
    metrics: Arc<RelayMetrics>,
}

impl RelayConsumer {
    /// Create a consumer for `receiver`
    pub fn new(
        receiver: RelayReceiver,
        handler: Arc<dyn MessageHandler>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            receiver,
            handler,
            metrics,
        }
    }

    /// Process messages until the queue is closed and drained
    ///
    /// Returns the number of messages handled.
    #[instrument(name = "relay_consumer", skip(self))]
    pub async fn run(mut self) -> u64 {
        info!("Relay consumer started");
        let mut consumed = 0u64;

        while let Some(message) = self.receiver.dequeue().await {
            debug!(
                connection_id = %message.connection(),
                bytes = message.payload().len(),
                "Relaying message"
            );
            self.handler.on_message(message).await;
            self.metrics.message_consumed();
            consumed += 1;
        }

        self.handler.on_drained(consumed).await;
        info!(consumed, "Relay consumer drained");
        consumed
    }

    /// Run the consumer on its own task
    pub fn spawn(self) -> ConsumerHandle {
        ConsumerHandle {
            handle: tokio::spawn(self.run()),
        }
    }
}

impl std::fmt::Debug for RelayConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConsumer")
            .field("receiver", &self.receiver)
            .finish()
    }
}

/// Handle to a running relay consumer
#[derive(Debug)]
pub struct ConsumerHandle {
    handle: JoinHandle<u64>,
}

impl ConsumerHandle {
    /// Check whether the consumer has stopped
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the consumer to drain and stop
    ///
    /// The consumer only stops once all senders are dropped; callers must
    /// release theirs first.
    pub async fn join(self) -> Result<u64> {
        self.handle
            .await
            .map_err(|e| RelayError::Join(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConnectionId, RelayMessage, RelayQueue};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Collecting {
        seen: Mutex<Vec<String>>,
        drained: AtomicU64,
    }

    #[async_trait]
    impl MessageHandler for Collecting {
        async fn on_message(&self, message: RelayMessage) {
            self.seen
                .lock()
                .unwrap()
                .push(message.payload_text().into_owned());
        }

        async fn on_drained(&self, consumed: u64) {
            self.drained.store(consumed, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_consumer_processes_in_order_and_drains() {
        let metrics = Arc::new(RelayMetrics::new());
        let (sender, receiver) = RelayQueue::bounded(8)
            .with_metrics(metrics.clone())
            .split();
        let handler = Arc::new(Collecting::default());
        let consumer = RelayConsumer::new(receiver, handler.clone(), metrics.clone()).spawn();

        for payload in ["A", "B", "C"] {
            sender
                .enqueue(RelayMessage::new(ConnectionId::new(1), payload))
                .await
                .unwrap();
        }
        drop(sender);

        assert_eq!(consumer.join().await.unwrap(), 3);
        assert_eq!(*handler.seen.lock().unwrap(), ["A", "B", "C"]);
        assert_eq!(handler.drained.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.messages_consumed(), 3);
        assert_eq!(metrics.backlog(), 0);
    }

    #[tokio::test]
    async fn test_consumer_waits_while_senders_alive() {
        let metrics = Arc::new(RelayMetrics::new());
        let (sender, receiver) = RelayQueue::bounded(8).split();
        let consumer =
            RelayConsumer::new(receiver, Arc::new(Collecting::default()), metrics).spawn();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        drop(sender);
        assert_eq!(consumer.join().await.unwrap(), 0);
    }

    struct Slow(Arc<AtomicU64>);

    #[async_trait]
    impl MessageHandler for Slow {
        async fn on_message(&self, _message: RelayMessage) {
            tokio::time::sleep(Duration::from_millis(1)).await;
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_slow_consumer_does_not_drop_messages() {
        let count = Arc::new(AtomicU64::new(0));
        let metrics = Arc::new(RelayMetrics::new());
        let (sender, receiver) = RelayQueue::bounded(2)
            .with_metrics(metrics.clone())
            .split();
        let consumer =
            RelayConsumer::new(receiver, Arc::new(Slow(count.clone())), metrics.clone()).spawn();

        for n in 0..20u64 {
            sender
                .enqueue(RelayMessage::new(ConnectionId::new(n), "x"))
                .await
                .unwrap();
        }
        drop(sender);

        assert_eq!(consumer.join().await.unwrap(), 20);
        assert_eq!(count.load(Ordering::SeqCst), 20);
        assert!(metrics.snapshot().peak_backlog >= 2);
    }
}
