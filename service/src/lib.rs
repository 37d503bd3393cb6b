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


//! TCP Message Relay Service
//!
//! This crate accepts many TCP clients, reads raw bytes from each one on its
//! own task, and relays every chunk read to a single consumer in the order
//! the chunks were queued:
//!
//! - Bounded relay queue with producer backpressure, no busy waiting
//! - Per-connection failures stay with that connection
//! - Deterministic shutdown that joins every worker and drains the queue
//! - Operator driven restart of a failed listener through [`RestartPolicy`]
//!
//! # Architecture
//!
//! ```text
//! RelayServer (Binding → Listening → ShuttingDown)
//!     ↓ accept
//! ConnectionWorker ×N ──enqueue──▶ RelayQueue ──dequeue──▶ RelayConsumer → MessageHandler
//!     ↑
//! ConnectionRegistry (joined by the RelayServer)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use linerelay_service::{NeverRestart, RelayServer, ServerConfig, StdoutHandler};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = RelayServer::tcp(ServerConfig::new(4000), Arc::new(StdoutHandler::new()));
//!     let report = server.run(NeverRestart).await?;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```

mod channel;
mod config;
mod consumer;
mod error;
mod handler;
mod lifecycle;
mod metrics;
mod registry;
mod relay;
mod server;
mod types;
mod worker;

pub use channel::{
    ChannelListener, ChannelStream, StreamChannel, TcpChannelListener, TcpTransport, Transport,
};
pub use config::{DEFAULT_BACKLOG, DEFAULT_QUEUE_CAPACITY, DEFAULT_READ_CHUNK_SIZE, ServerConfig};
pub use consumer::{ConsumerHandle, RelayConsumer};
pub use error::{RelayError, Result};
pub use handler::{CallbackHandler, MessageHandler, StdoutHandler};
pub use lifecycle::{
    FnPolicy, LifecycleWatch, NeverRestart, RestartDecision, RestartLimit, RestartPolicy,
    ShutdownHandle,
};
pub use self::metrics::{MetricsSnapshot, RelayMetrics};
pub use registry::ConnectionRegistry;
pub use relay::{RelayMessage, RelayQueue, RelayReceiver, RelaySender};
pub use server::RelayServer;
pub use types::{ConnectionId, LifecycleState, ServerReport, WorkerExit, WorkerOutcome};
pub use worker::{ConnectionWorker, WorkerConfig};
