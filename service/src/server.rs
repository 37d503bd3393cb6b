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


//! Relay server implementation
//!
//! The RelayServer is the lifecycle manager. It owns the listening socket,
//! runs the accept loop, spawns a ConnectionWorker per accepted connection
//! and keeps the single RelayConsumer alive across restarts.
//!
//! ```text
//! Stopped ─▶ Binding ─▶ Listening ─▶ ShuttingDown ─▶ Stopped
//!               ▲           │
//!               └─ restart ─┘   (listener-fatal error + RestartDecision::Restart)
//! ```

use crate::lifecycle::Lifecycle;
use crate::{
    ChannelListener, ChannelStream, ConnectionId, ConnectionRegistry, ConnectionWorker,
    LifecycleState, LifecycleWatch, MessageHandler, RelayConsumer, RelayError, RelayMetrics,
    RelayQueue, RelaySender, RestartDecision, RestartPolicy, Result, ServerConfig, ServerReport,
    ShutdownHandle, TcpTransport, Transport, WorkerConfig, WorkerOutcome,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Relay server
///
/// # Example
///
/// ```no_run
/// use linerelay_service::{NeverRestart, RelayServer, ServerConfig, StdoutHandler};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = RelayServer::tcp(ServerConfig::new(4000), Arc::new(StdoutHandler::new()));
///     let shutdown = server.shutdown_handle();
///
///     tokio::spawn(async move {
///         let _ = tokio::signal::ctrl_c().await;
///         shutdown.shutdown();
///     });
///
///     let report = server.run(NeverRestart).await?;
///     println!("{report}");
///     Ok(())
/// }
/// ```
pub struct RelayServer<T: Transport> {
    /// Server configuration
    config: ServerConfig,
    /// Socket factory
    transport: T,
    /// Side effect applied by the consumer
    handler: Arc<dyn MessageHandler>,
    /// Server metrics
    metrics: Arc<RelayMetrics>,
    /// Fired to request a graceful shutdown
    shutdown: CancellationToken,
    /// Published lifecycle state
    lifecycle: Arc<Lifecycle>,
    /// Next connection ID (monotonically increasing across restarts)
    next_id: AtomicU64,
}

impl RelayServer<TcpTransport> {
    /// Create a server listening on TCP
    pub fn tcp(config: ServerConfig, handler: Arc<dyn MessageHandler>) -> Self {
        Self::new(config, TcpTransport, handler)
    }
}

impl<T: Transport> RelayServer<T> {
    /// Create a new server
    ///
    /// Nothing is bound until [`RelayServer::run`] is called.
    pub fn new(config: ServerConfig, transport: T, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            config,
            transport,
            handler,
            metrics: Arc::new(RelayMetrics::new()),
            shutdown: CancellationToken::new(),
            lifecycle: Arc::new(Lifecycle::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Use an externally owned metrics instance
    pub fn with_metrics(mut self, metrics: Arc<RelayMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Handle that requests a graceful shutdown
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(self.shutdown.clone())
    }

    /// Observer for the lifecycle state
    pub fn lifecycle(&self) -> LifecycleWatch {
        LifecycleWatch::new(self.lifecycle.clone())
    }

    /// Get the server metrics
    pub fn metrics(&self) -> Arc<RelayMetrics> {
        self.metrics.clone()
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run the server until shutdown or until `policy` declines a restart
    ///
    /// The relay consumer is started once and survives restarts. On exit all
    /// workers and the consumer have been joined and every queued message
    /// has been handed to the handler. An `Err` is returned only for an
    /// invalid configuration or a consumer that could not be joined; the
    /// failure that ended the server is recorded in
    /// [`ServerReport::last_error`]. A consumer that dies ends the server
    /// without consulting `policy`.
    pub async fn run<P: RestartPolicy>(self, mut policy: P) -> Result<ServerReport> {
        self.config.validate()?;

        let (sender, receiver) = RelayQueue::bounded(self.config.queue_capacity)
            .with_warn_threshold(self.config.backlog_warn_threshold)
            .with_metrics(self.metrics.clone())
            .split();
        let consumer =
            RelayConsumer::new(receiver, self.handler.clone(), self.metrics.clone()).spawn();

        let mut report = ServerReport::default();
        let addr = self.config.bind_address();
        let mut held_listener = None;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            self.lifecycle.transition(LifecycleState::Binding);
            report.bind_attempts += 1;

            let failure = match self.transport.open(addr, self.config.backlog).await {
                Ok(listener) => {
                    self.lifecycle.set_local_addr(Some(listener.local_addr()));
                    self.lifecycle.transition(LifecycleState::Listening);
                    let (result, listener) = self.listen(listener, &sender, &mut report).await;
                    match result {
                        Ok(()) => {
                            held_listener = Some(listener);
                            break;
                        }
                        Err(e) => {
                            drop(listener);
                            self.lifecycle.set_local_addr(None);
                            e
                        }
                    }
                }
                Err(e) => e,
            };

            error!(error = %failure, port = addr.port(), "Server instance failed");

            // Without a consumer nothing can be relayed, so a restart cannot help.
            if matches!(failure, RelayError::QueueClosed) {
                report.last_error = Some(failure.to_string());
                break;
            }

            let decision = select! {
                decision = policy.decide(&failure) => decision,
                _ = self.shutdown.cancelled() => RestartDecision::Stop,
            };

            match decision {
                RestartDecision::Restart => {
                    report.restarts += 1;
                    self.metrics.restarted();
                    info!(port = addr.port(), "Restarting server");
                }
                RestartDecision::Stop => {
                    report.last_error = Some(failure.to_string());
                    break;
                }
            }
        }

        self.lifecycle.transition(LifecycleState::ShuttingDown);
        info!("Server is shutting down.");

        // The consumer stops once the last sender is gone and the queue is drained.
        drop(sender);
        let consumed = consumer.join().await;

        if let Some(listener) = held_listener.take() {
            debug!(addr = %listener.local_addr(), "Closing listening socket");
            drop(listener);
            self.lifecycle.set_local_addr(None);
        }
        self.lifecycle.transition(LifecycleState::Stopped);

        report.messages_consumed = consumed?;
        info!(%report, "Server stopped");
        Ok(report)
    }

    /// Run the accept loop of one server instance
    ///
    /// Returns `Ok` when shutdown was requested. Returns the listener-fatal
    /// error, or [`RelayError::QueueClosed`] once the consumer is gone,
    /// otherwise. In both cases every worker spawned by this instance has
    /// been joined and the registry discarded before returning.
    async fn listen(
        &self,
        mut listener: T::Listener,
        sender: &RelaySender,
        report: &mut ServerReport,
    ) -> (Result<()>, T::Listener) {
        let port = listener.local_addr().port();
        info!(port, "Server is listening for connections on Port {}", port);

        let instance = self.shutdown.child_token();
        let mut registry = ConnectionRegistry::new();

        let result = loop {
            let accepted = select! {
                biased;
                _ = self.shutdown.cancelled() => break Ok(()),
                _ = sender.closed() => {
                    error!("Relay consumer stopped, closing listener");
                    break Err(RelayError::QueueClosed);
                }
                accepted = listener.accept() => accepted,
            };

            report.workers_joined += self.reap(&mut registry).await;

            match accepted {
                Ok(stream) => self.spawn_worker(stream, sender, &instance, &mut registry).await,
                Err(e) if e.is_listener_fatal() => break Err(e),
                Err(e) => {
                    error!(error = %e, "Failed to accept request from a client.");
                    self.metrics.accept_error();
                    select! {
                        _ = tokio::time::sleep(self.config.accept_backoff) => {}
                        _ = self.shutdown.cancelled() => {}
                    }
                }
            }
        };

        // Workers of this instance end with it; nothing outlives the registry.
        instance.cancel();
        let tracked = registry.len();
        let joined = registry.join_all().await;
        report.workers_joined += joined.len();
        self.lifecycle.set_tracked(0);
        debug!(tracked, "Joined connection workers");

        (result, listener)
    }

    async fn spawn_worker(
        &self,
        mut stream: <T::Listener as ChannelListener>::Stream,
        sender: &RelaySender,
        instance: &CancellationToken,
        registry: &mut ConnectionRegistry,
    ) {
        if sender.is_closed() {
            let e = RelayError::Spawn("relay queue is closed".to_string());
            error!(error = %e, peer = %stream.peer(), "Thread could not be created.");
            self.metrics.spawn_error();
            stream.close().await;
            return;
        }

        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let worker = ConnectionWorker::new(
            id,
            stream,
            sender.clone(),
            self.metrics.clone(),
            WorkerConfig {
                read_chunk_size: self.config.read_chunk_size,
            },
            instance.clone(),
        );

        self.metrics.connection_opened();
        if let Err(handle) = registry.insert(id, tokio::spawn(worker.run())) {
            warn!(connection_id = %id, "Connection id already tracked, aborting worker");
            handle.abort();
        }
        self.lifecycle.set_tracked(registry.len());
    }

    async fn reap(&self, registry: &mut ConnectionRegistry) -> usize {
        let reaped: Vec<Result<WorkerOutcome>> = registry.reap_finished().await;
        if !reaped.is_empty() {
            self.lifecycle.set_tracked(registry.len());
        }
        reaped.len()
    }
}

impl<T: Transport> std::fmt::Debug for RelayServer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayServer")
            .field("bind_address", &self.config.bind_address())
            .field("state", &self.lifecycle.state())
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

impl<T: Transport> Drop for RelayServer<T> {
    fn drop(&mut self) {
        // Anything spawned from this server must not outlive it.
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CallbackHandler, StreamChannel};
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    async fn tcp_pair() -> (StreamChannel<TcpStream>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        (StreamChannel::new(server, peer.to_string()), client)
    }

    #[tokio::test]
    async fn test_spawn_worker_closes_stream_when_queue_closed() {
        let server = RelayServer::tcp(
            ServerConfig::new(0),
            Arc::new(CallbackHandler::new(|_, _| {})),
        );
        let (sender, receiver) = RelayQueue::bounded(4).split();
        drop(receiver);

        let (stream, mut client) = tcp_pair().await;
        let instance = CancellationToken::new();
        let mut registry = ConnectionRegistry::new();
        server
            .spawn_worker(stream, &sender, &instance, &mut registry)
            .await;

        assert!(registry.is_empty());
        assert_eq!(server.metrics().snapshot().spawn_errors, 1);
        assert_eq!(server.metrics().total_connections(), 0);

        let mut buf = [0u8; 4];
        let n = tokio::time::timeout(std::time::Duration::from_secs(1), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_spawn_worker_assigns_increasing_ids() {
        let server = RelayServer::tcp(
            ServerConfig::new(0),
            Arc::new(CallbackHandler::new(|_, _| {})),
        );
        let (sender, _receiver) = RelayQueue::bounded(4).split();
        let instance = CancellationToken::new();
        let mut registry = ConnectionRegistry::new();

        let mut clients = Vec::new();
        for _ in 0..2 {
            let (stream, client) = tcp_pair().await;
            clients.push(client);
            server
                .spawn_worker(stream, &sender, &instance, &mut registry)
                .await;
        }

        assert_eq!(registry.ids(), [ConnectionId::new(1), ConnectionId::new(2)]);
        assert_eq!(server.lifecycle().tracked_connections(), 2);

        instance.cancel();
        assert_eq!(registry.join_all().await.len(), 2);
    }
}
