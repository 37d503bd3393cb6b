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


//! Handler traits for relayed messages

use crate::{ConnectionId, RelayMessage};
use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Side effect applied by the relay consumer to each message
///
/// Messages arrive one at a time in queue order; the next message is not
/// dequeued until `on_message` returns.
///
/// # Example
///
/// ```no_run
/// use linerelay_service::{MessageHandler, RelayMessage};
/// use async_trait::async_trait;
///
/// struct Logger;
///
/// #[async_trait]
/// impl MessageHandler for Logger {
///     async fn on_message(&self, message: RelayMessage) {
///         tracing::info!(connection = %message.connection(), "{}", message.payload_text());
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Called for every message taken off the relay queue
    async fn on_message(&self, message: RelayMessage);

    /// Called once after the queue is closed and fully drained
    async fn on_drained(&self, _consumed: u64) {}
}

/// Prints every message to standard output
///
/// Output format is `Message from Client <id> : <payload>`; the payload is
/// written as received, so a trailing newline sent by the client ends the
/// line.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutHandler;

impl StdoutHandler {
    /// Create a new stdout handler
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageHandler for StdoutHandler {
    async fn on_message(&self, message: RelayMessage) {
        let mut out = tokio::io::stdout();
        if let Err(e) = write_message(&mut out, &message).await {
            tracing::error!(error = %e, "Failed to write relay message to stdout");
        }
    }
}

async fn write_message<W>(out: &mut W, message: &RelayMessage) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(message.to_string().as_bytes()).await?;
    out.flush().await
}

/// Closure-based handler
///
/// # Example
///
/// ```no_run
/// use linerelay_service::CallbackHandler;
/// use std::sync::Arc;
///
/// let handler = Arc::new(CallbackHandler::new(|id, payload| {
///     println!("{id}: {} bytes", payload.len());
/// }));
/// ```
pub struct CallbackHandler {
    on_message: Box<dyn Fn(ConnectionId, &[u8]) + Send + Sync + 'static>,
}

impl CallbackHandler {
    /// Wrap a closure receiving the connection id and payload
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(ConnectionId, &[u8]) + Send + Sync + 'static,
    {
        Self {
            on_message: Box::new(f),
        }
    }
}

#[async_trait]
impl MessageHandler for CallbackHandler {
    async fn on_message(&self, message: RelayMessage) {
        (self.on_message)(message.connection(), message.payload());
    }
}

impl std::fmt::Debug for CallbackHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandler").finish_non_exhaustive()
    }
}
