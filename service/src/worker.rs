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


//! Connection worker implementation
//!
//! A ConnectionWorker owns one accepted connection for its whole life:
//!
//! ```text
//! Reading ──chunk──▶ enqueue ──▶ Reading
//!    │
//!    ├── zero-length read ──▶ Disconnected
//!    ├── read/enqueue error ──▶ Failed
//!    └── shutdown signal ──▶ Cancelled
//! ```
//!
//! Whatever the exit, the connection is closed before `run` returns. Errors
//! stay inside the worker; the listener only learns the outcome when it
//! joins the task.

use crate::{
    ChannelStream, ConnectionId, RelayError, RelayMessage, RelayMetrics, RelaySender,
    WorkerExit, WorkerOutcome,
};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum bytes per read; every read becomes one relay message
    pub read_chunk_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: crate::config::DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

/// Reads one connection and relays each chunk to the relay queue
pub struct ConnectionWorker<S> {
    /// Connection ID
    id: ConnectionId,
    /// The connection, owned exclusively by this worker
    stream: S,
    /// Producer end of the relay queue
    sender: RelaySender,
    /// Shared metrics
    metrics: Arc<RelayMetrics>,
    /// Configuration
    config: WorkerConfig,
    /// Fired when the server shuts down or restarts
    shutdown: CancellationToken,
    chunks: u64,
    bytes: u64,
}

impl<S: ChannelStream> ConnectionWorker<S> {
    /// Create a new connection worker
    ///
    /// The stream is moved into the worker; nothing it needs is borrowed
    /// from the caller.
    pub fn new(
        id: ConnectionId,
        stream: S,
        sender: RelaySender,
        metrics: Arc<RelayMetrics>,
        config: WorkerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            stream,
            sender,
            metrics,
            config,
            shutdown,
            chunks: 0,
            bytes: 0,
        }
    }

    /// Connection this worker owns
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Run the worker until the connection ends
    #[instrument(name = "connection_worker", skip(self), fields(connection_id = %self.id))]
    pub async fn run(mut self) -> WorkerOutcome {
        let started = Instant::now();
        let peer = self.stream.peer();
        info!(%peer, "Client {} connected.", self.id);

        let exit = self.read_loop().await;
        self.stream.close().await;

        match exit {
            WorkerExit::Disconnected => info!(%peer, "Client {} disconnected.", self.id),
            WorkerExit::Failed => info!(%peer, "Client {} closed after failure.", self.id),
            WorkerExit::Cancelled => debug!(%peer, "Client {} closed by shutdown.", self.id),
        }
        self.metrics.connection_closed(started.elapsed());

        WorkerOutcome {
            id: self.id,
            exit,
            chunks: self.chunks,
            bytes: self.bytes,
        }
    }

    async fn read_loop(&mut self) -> WorkerExit {
        let mut buffer = vec![0u8; self.config.read_chunk_size.max(1)];

        loop {
            let read = select! {
                biased;
                _ = self.shutdown.cancelled() => return WorkerExit::Cancelled,
                read = self.stream.read(&mut buffer) => read,
            };

            match read {
                Ok(0) => return WorkerExit::Disconnected,
                Ok(n) => {
                    let message = RelayMessage::new(self.id, Bytes::copy_from_slice(&buffer[..n]));
                    if let Err(e) = self.sender.enqueue(message).await {
                        error!(error = %e, "Dropping connection, relay queue unavailable");
                        return WorkerExit::Failed;
                    }
                    debug!(bytes = n, "Chunk relayed");
                    self.metrics.chunk_relayed(n);
                    self.chunks += 1;
                    self.bytes += n as u64;
                }
                Err(source) => {
                    let e = RelayError::ConnectionIo {
                        id: self.id,
                        source,
                    };
                    error!(error = %e, "Connection read failed");
                    self.metrics.connection_error();
                    return WorkerExit::Failed;
                }
            }
        }
    }
}

impl<S> std::fmt::Debug for ConnectionWorker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionWorker")
            .field("id", &self.id)
            .field("chunks", &self.chunks)
            .field("bytes", &self.bytes)
            .finish()
    }
}
